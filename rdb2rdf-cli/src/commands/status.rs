use crate::cli::StatusArgs;
use crate::config::ConfigFile;
use crate::error::{CliError, CliResult};
use crate::output;
use rdb2rdf_engine::RunLog;

pub fn run(args: &StatusArgs, config: &ConfigFile) -> CliResult<()> {
    let path = config.resolve_run_log(args)?;
    if !path.exists() {
        return Err(CliError::Input(format!(
            "no run log at {}; run 'rdb2rdf run' first",
            path.display()
        )));
    }
    let log = RunLog::load(&path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&log)?);
        return Ok(());
    }
    if log.mappings.is_empty() {
        println!("No mappings recorded in {}", path.display());
        return Ok(());
    }

    println!("{}", output::status_table(&log));
    let size = |s: Option<u64>| s.map_or_else(|| "-".to_string(), |s| format!("{s} bytes"));
    println!(
        "Output: {}, provenance: {}",
        size(log.destination_file_size),
        size(log.provenance_file_size)
    );
    Ok(())
}
