//! Model synchronization
//!
//! Reconciles freshly generated statements with what was persisted before:
//!
//! - file outputs keep a [`ProvenanceIndex`] next to the graph; statements of
//!   regenerated or removed mappings are purged by mapping id and the graph is
//!   rewritten from the merged index
//! - store outputs receive only the add/remove delta against their current
//!   content, or are emptied and refilled when `clean_store` is set

mod format;
mod provenance;
mod store;

pub use format::{read_statements, write_graph, write_statements, GraphFormat};
pub use provenance::{graph_name, mapping_id_from_graph, ProvenanceIndex, SEED_ID};
pub use store::{GraphStore, MemoryStore, SqliteStore};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::R2rmlResult;
use crate::mapping::Prefixes;
use crate::materialize::Statement;

/// Statement counts of one synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    /// Statements in the output after synchronization
    pub total: usize,
}

/// Outcome of a file synchronization.
#[derive(Debug, Clone)]
pub struct FileSync {
    pub report: SyncReport,
    /// Provenance of everything now in the destination
    pub index: ProvenanceIndex,
    pub destination_size: Option<u64>,
    pub provenance_size: Option<u64>,
    /// False when the output was already up to date and left untouched
    pub written: bool,
}

pub struct ModelSynchronizer<'c> {
    config: &'c EngineConfig,
    prefixes: Prefixes,
}

impl<'c> ModelSynchronizer<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self {
            config,
            prefixes: Prefixes::new(),
        }
    }

    /// Prefixes declared in Turtle output.
    pub fn with_prefixes(mut self, prefixes: &Prefixes) -> Self {
        self.prefixes = prefixes.clone();
        self
    }

    /// Merge fresh per-mapping statements into the prior index.
    ///
    /// Prior statements survive only for ids in `retained` (mappings skipped
    /// or failed this run). Returns the merged index and the ids whose prior
    /// statements were purged.
    pub fn merge(
        prior: Option<&ProvenanceIndex>,
        fresh: BTreeMap<String, BTreeSet<Statement>>,
        retained: &BTreeSet<String>,
    ) -> (ProvenanceIndex, Vec<String>) {
        let mut next = prior.cloned().unwrap_or_default();
        let purged = next.retain_mappings(|id| retained.contains(id));
        for (mapping_id, statements) in fresh {
            next.insert(mapping_id, statements);
        }
        (next, purged)
    }

    /// Write the merged graph (and provenance, when enabled) to `path`.
    pub fn sync_file(
        &self,
        path: &Path,
        format: GraphFormat,
        prior: Option<&ProvenanceIndex>,
        fresh: BTreeMap<String, BTreeSet<Statement>>,
        retained: &BTreeSet<String>,
    ) -> R2rmlResult<FileSync> {
        let executed_any = !fresh.is_empty();
        let (index, purged) = Self::merge(prior, fresh, retained);
        let provenance_path = self.config.provenance_path();

        if prior.is_some() && !executed_any && purged.is_empty() && path.exists() {
            info!(destination = %path.display(), "output up to date, left untouched");
            let total = index.union().len();
            return Ok(FileSync {
                report: SyncReport {
                    added: 0,
                    removed: 0,
                    total,
                },
                index,
                destination_size: file_size(path),
                provenance_size: provenance_path.as_deref().and_then(file_size),
                written: false,
            });
        }

        let previous = match prior {
            Some(prior) => prior.union(),
            None => previous_content(path, format),
        };
        let computed = index.union();
        let report = SyncReport {
            added: computed.difference(&previous).count(),
            removed: previous.difference(&computed).count(),
            total: computed.len(),
        };

        let destination_size = write_graph(path, format, &computed, &self.prefixes)?;
        let provenance_size = match provenance_path {
            Some(p) if self.config.write_provenance() => Some(index.save(&p)?),
            _ => None,
        };
        info!(
            destination = %path.display(),
            added = report.added,
            removed = report.removed,
            total = report.total,
            purged = purged.len(),
            "output written"
        );

        Ok(FileSync {
            report,
            index,
            destination_size: Some(destination_size),
            provenance_size,
            written: true,
        })
    }

    /// Bring `store` to `computed` with minimal deltas. Without
    /// `allow_remove` nothing is deleted. With `clean_store` configured the
    /// whole content is replaced instead, in the same single update.
    pub fn sync_store<G: GraphStore + ?Sized>(
        &self,
        store: &mut G,
        computed: &BTreeSet<Statement>,
        allow_remove: bool,
    ) -> R2rmlResult<SyncReport> {
        let existing = store.statements()?;
        let (remove, add) = if self.config.clean_store() {
            info!(cleared = existing.len(), "cleaning store before writing");
            (existing, computed.clone())
        } else {
            let remove: BTreeSet<Statement> = if allow_remove {
                existing.difference(computed).cloned().collect()
            } else {
                BTreeSet::new()
            };
            let add: BTreeSet<Statement> = computed.difference(&existing).cloned().collect();
            (remove, add)
        };
        store.apply(&remove, &add)?;

        let report = SyncReport {
            added: add.len(),
            removed: remove.len(),
            total: store.len()?,
        };
        info!(
            added = report.added,
            removed = report.removed,
            total = report.total,
            "store synchronized"
        );
        Ok(report)
    }
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// Current destination content for full runs; unreadable output counts as empty.
fn previous_content(path: &Path, format: GraphFormat) -> BTreeSet<Statement> {
    if !path.exists() {
        return BTreeSet::new();
    }
    read_statements(path, format).unwrap_or_else(|e| {
        warn!(destination = %path.display(), error = %e, "previous output unreadable, counting it as empty");
        BTreeSet::new()
    })
}
