//! TOML config file and its merge with command-line flags.
//!
//! Every setting is optional in the file; a flag given on the command line
//! always wins. Relative paths in the file are resolved against the file's
//! directory.

use crate::cli::{RunArgs, StatusArgs};
use crate::error::{CliError, CliResult};
use rdb2rdf_engine::{EngineConfig, GraphFormat, OutputTarget};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "rdb2rdf.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ConfigFile {
    pub database: Option<PathBuf>,
    pub mapping: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: Option<GraphFormat>,
    pub store: Option<PathBuf>,
    pub incremental: Option<bool>,
    pub encode_urls: Option<bool>,
    pub namespace: Option<String>,
    pub run_log: Option<PathBuf>,
    pub write_provenance: Option<bool>,
    pub continue_on_error: Option<bool>,
    pub seed_graph: Option<PathBuf>,
    pub clean_store: Option<bool>,
}

/// Everything `run` needs, after merging.
#[derive(Debug)]
pub struct RunSettings {
    pub database: PathBuf,
    pub mapping: PathBuf,
    pub namespace: Option<String>,
    pub engine: EngineConfig,
}

impl ConfigFile {
    /// Load `explicit`, or `./rdb2rdf.toml` when it exists, or defaults.
    pub fn discover(explicit: Option<&Path>) -> CliResult<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config: ConfigFile = toml::from_str(&text)
            .map_err(|e| CliError::Config(format!("invalid config {}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.relative_to(base))
    }

    fn relative_to(mut self, base: &Path) -> Self {
        for path in [
            &mut self.database,
            &mut self.mapping,
            &mut self.output,
            &mut self.store,
            &mut self.run_log,
            &mut self.seed_graph,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Merge with `run` flags into a runnable configuration.
    pub fn resolve_run(&self, args: &RunArgs, verbose: bool) -> CliResult<RunSettings> {
        let database = args
            .database
            .clone()
            .or_else(|| self.database.clone())
            .ok_or_else(|| missing("database", "--database"))?;
        let mapping = args
            .mapping
            .clone()
            .or_else(|| self.mapping.clone())
            .ok_or_else(|| missing("mapping document", "--mapping"))?;

        let output = self.output_target(args.output.as_deref(), args.store.as_deref(), args.format)?;
        let mut engine = EngineConfig::new(output)
            .with_incremental(args.incremental || self.incremental.unwrap_or(false))
            .with_encode_urls(args.encode_urls || self.encode_urls.unwrap_or(false))
            .with_write_provenance(args.provenance || self.write_provenance.unwrap_or(false))
            .with_continue_on_error(
                args.continue_on_error || self.continue_on_error.unwrap_or(false),
            )
            .with_clean_store(args.clean_store || self.clean_store.unwrap_or(false))
            .with_verbose(verbose);
        if let Some(seed) = args.seed.clone().or_else(|| self.seed_graph.clone()) {
            engine = engine.with_seed_graph(seed);
        }
        if let Some(run_log) = args.run_log.clone().or_else(|| self.run_log.clone()) {
            engine = engine.with_run_log(run_log);
        }

        Ok(RunSettings {
            database,
            mapping,
            namespace: args.namespace.clone().or_else(|| self.namespace.clone()),
            engine,
        })
    }

    /// Run log location for `status`, derived the same way `run` derives it.
    pub fn resolve_run_log(&self, args: &StatusArgs) -> CliResult<PathBuf> {
        if let Some(run_log) = args.run_log.clone().or_else(|| self.run_log.clone()) {
            return Ok(run_log);
        }
        let output = self.output_target(args.output.as_deref(), None, None)?;
        Ok(EngineConfig::new(output).run_log().to_path_buf())
    }

    fn output_target(
        &self,
        output: Option<&Path>,
        store: Option<&Path>,
        format: Option<crate::cli::FormatArg>,
    ) -> CliResult<OutputTarget> {
        let file_target = |path: &Path| {
            let format = format
                .map(GraphFormat::from)
                .or(self.format)
                .or_else(|| GraphFormat::from_path(path))
                .unwrap_or_default();
            OutputTarget::File {
                path: path.to_path_buf(),
                format,
            }
        };

        if let Some(path) = output {
            return Ok(file_target(path));
        }
        if let Some(path) = store {
            return Ok(OutputTarget::Store {
                path: path.to_path_buf(),
            });
        }
        if let Some(path) = &self.output {
            return Ok(file_target(path));
        }
        if let Some(path) = &self.store {
            return Ok(OutputTarget::Store { path: path.clone() });
        }
        Err(missing("output", "--output or --store"))
    }
}

fn missing(what: &str, flag: &str) -> CliError {
    CliError::Usage(format!(
        "no {what} given; pass {flag} or set it in {DEFAULT_CONFIG_FILE}"
    ))
}
