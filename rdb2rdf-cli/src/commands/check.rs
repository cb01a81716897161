use crate::config::ConfigFile;
use crate::error::{CliError, CliResult};
use crate::{input, output};
use std::path::Path;

pub fn run(
    mapping: Option<&Path>,
    namespace: Option<&str>,
    config: &ConfigFile,
    quiet: bool,
) -> CliResult<()> {
    let path = mapping
        .or(config.mapping.as_deref())
        .ok_or_else(|| CliError::Usage("no mapping document given; pass --mapping".into()))?;
    let namespace = namespace.or(config.namespace.as_deref());

    let document = input::load_mapping(path, namespace)?;
    let order = document.execution_order()?;

    if !quiet {
        println!("{}", output::order_table(&order, &document));
    }
    println!("{} is valid: {} mapping(s)", path.display(), document.len());
    Ok(())
}
