//! Engine configuration
//!
//! [`EngineConfig`] is assembled once (builder-style `with_*` calls) and then
//! only ever shared by reference. No component mutates it during a run.

use std::path::{Path, PathBuf};

use crate::sync::GraphFormat;

/// Suffix appended to the destination file stem for the provenance side-table.
const PROVENANCE_SUFFIX: &str = "-provenance.nq";

/// Extension used for the default run log next to the output.
const RUN_LOG_EXTENSION: &str = "runlog.json";

/// Where the computed graph is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A serialized graph file.
    File { path: PathBuf, format: GraphFormat },
    /// A SQLite-backed statement store, updated with add/remove deltas.
    Store { path: PathBuf },
}

impl OutputTarget {
    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::File { path, .. } | OutputTarget::Store { path } => path,
        }
    }

    pub fn is_store(&self) -> bool {
        matches!(self, OutputTarget::Store { .. })
    }
}

/// Immutable engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    incremental: bool,
    encode_urls: bool,
    output: OutputTarget,
    verbose: bool,
    run_log: PathBuf,
    write_provenance: bool,
    continue_on_error: bool,
    /// Graph file merged into every run's output
    seed_graph: Option<PathBuf>,
    clean_store: bool,
}

impl EngineConfig {
    /// Configuration with defaults: full runs, no URL encoding, abort on the
    /// first error, run log next to the output.
    pub fn new(output: OutputTarget) -> Self {
        let run_log = output.path().with_extension(RUN_LOG_EXTENSION);
        Self {
            incremental: false,
            encode_urls: false,
            output,
            verbose: false,
            run_log,
            write_provenance: false,
            continue_on_error: false,
            seed_graph: None,
            clean_store: false,
        }
    }

    /// File output, syntax picked from the extension (N-Triples by default).
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = GraphFormat::from_path(&path).unwrap_or_default();
        Self::new(OutputTarget::File { path, format })
    }

    /// SQLite store output.
    pub fn to_store(path: impl Into<PathBuf>) -> Self {
        Self::new(OutputTarget::Store { path: path.into() })
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_encode_urls(mut self, encode_urls: bool) -> Self {
        self.encode_urls = encode_urls;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_run_log(mut self, run_log: impl Into<PathBuf>) -> Self {
        self.run_log = run_log.into();
        self
    }

    pub fn with_write_provenance(mut self, write_provenance: bool) -> Self {
        self.write_provenance = write_provenance;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Merge the statements of a graph file (N-Triples, or Turtle by `.ttl`
    /// extension) into the output.
    pub fn with_seed_graph(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_graph = Some(path.into());
        self
    }

    /// Empty a store target before writing the run's statements into it.
    pub fn with_clean_store(mut self, clean_store: bool) -> Self {
        self.clean_store = clean_store;
        self
    }

    /// Incremental mode as requested.
    pub fn incremental(&self) -> bool {
        self.incremental
    }

    /// Incremental mode as it will actually run. Store targets always run in
    /// full and reconcile through set differences instead.
    pub fn incremental_effective(&self) -> bool {
        self.incremental && !self.output.is_store()
    }

    pub fn encode_urls(&self) -> bool {
        self.encode_urls
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn run_log(&self) -> &Path {
        &self.run_log
    }

    /// True when the provenance side-table is persisted: always for
    /// incremental file runs, on request for full runs.
    pub fn write_provenance(&self) -> bool {
        !self.output.is_store() && (self.write_provenance || self.incremental)
    }

    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }

    pub fn seed_graph(&self) -> Option<&Path> {
        self.seed_graph.as_deref()
    }

    /// Only meaningful for store targets.
    pub fn clean_store(&self) -> bool {
        self.clean_store && self.output.is_store()
    }

    /// Path of the provenance side-table, `<dest stem>-provenance.nq` next to
    /// the destination file. `None` for store targets.
    pub fn provenance_path(&self) -> Option<PathBuf> {
        match &self.output {
            OutputTarget::File { path, .. } => Some(provenance_path_for(path)),
            OutputTarget::Store { .. } => None,
        }
    }
}

fn provenance_path_for(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    destination.with_file_name(format!("{stem}{PROVENANCE_SUFFIX}"))
}
