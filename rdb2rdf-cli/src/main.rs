use clap::Parser;
use rdb2rdf_cli::cli::Cli;
use rdb2rdf_cli::error::exit_with_error;

const VERBOSE_FILTER: &str = "info,rdb2rdf_engine=debug";

fn init_tracing(cli: &Cli) {
    // --quiet silences everything; --verbose honours RUST_LOG or shows info
    // plus the engine's per-statement debug lines; otherwise only warnings
    // (forced full runs, failed mappings) come through.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| VERBOSE_FILTER.into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = rdb2rdf_cli::run(cli) {
        exit_with_error(e);
    }
}
