use crate::error::{CliError, CliResult};
use rdb2rdf_engine::{MappingDefinition, MappingDocument};
use std::path::Path;

/// Read a mapping definition, JSON or TOML by extension.
pub fn read_definition(path: &Path) -> CliResult<MappingDefinition> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Input(format!("failed to read {}: {e}", path.display())))?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(&text).map_err(|e| {
            CliError::Input(format!("invalid mapping document {}: {e}", path.display()))
        })
    } else {
        Ok(MappingDefinition::from_json(&text)?)
    }
}

/// Load and validate a mapping document. `namespace` replaces the document's
/// own base namespace when given.
pub fn load_mapping(path: &Path, namespace: Option<&str>) -> CliResult<MappingDocument> {
    let mut definition = read_definition(path)?;
    if let Some(ns) = namespace {
        definition.namespace = Some(ns.to_string());
    }
    Ok(MappingDocument::from_definition(&definition)?)
}
