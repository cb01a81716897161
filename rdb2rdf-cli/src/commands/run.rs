use crate::cli::RunArgs;
use crate::config::ConfigFile;
use crate::error::CliResult;
use crate::{input, output};
use colored::Colorize;
use rdb2rdf_engine::Orchestrator;
use rdb2rdf_tabular::SqliteSource;

pub fn run(args: &RunArgs, config: &ConfigFile, verbose: bool, quiet: bool) -> CliResult<()> {
    let settings = config.resolve_run(args, verbose)?;
    let document = input::load_mapping(&settings.mapping, settings.namespace.as_deref())?;
    let source = SqliteSource::open(&settings.database)?;

    let report = Orchestrator::new(&settings.engine).run(&document, &source)?;

    for mapping in report.failed() {
        eprintln!(
            "{} mapping {mapping} failed; its previous statements were kept",
            "warning:".yellow().bold()
        );
    }
    if quiet {
        return Ok(());
    }
    if verbose {
        println!("{}", output::run_table(&report));
    }
    println!("{}", output::run_summary(&report));
    println!("Output: {}", settings.engine.output().path().display());
    Ok(())
}
