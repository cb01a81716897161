//! Execution orchestration
//!
//! [`Orchestrator::run`] executes a mapping document against a source:
//!
//! 1. order mappings parents-first
//! 2. load the previous run (incremental file outputs only)
//! 3. per mapping: fingerprint, then skip or regenerate
//! 4. merge the seed graph, synchronize the output and rewrite the run log
//!
//! Nothing is written when a mapping fails, unless `continue_on_error` is set;
//! then the failed mapping and its dependents keep their previous statements
//! and are left out of the run log so the next run retries them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use chrono::Utc;
use rdb2rdf_tabular::SqlSource;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{EngineConfig, OutputTarget};
use crate::error::{R2rmlError, R2rmlResult};
use crate::mapping::{MappingDocument, MappingRule};
use crate::materialize::{ProducedSubjects, Resource, Statement, SubjectList, TermBuilder};
use crate::runlog::{MappingLogEntry, PreviousState, RunLog};
use crate::signature::{ChangeDetector, RunSignature};
use crate::sync::{
    read_statements, GraphFormat, GraphStore, ModelSynchronizer, ProvenanceIndex, SqliteStore,
    SyncReport, SEED_ID,
};

/// Rows between progress messages
const PROGRESS_INTERVAL: usize = 1000;

/// What happened to one mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum MappingOutcome {
    /// Regenerated from the source
    Executed { statements: usize },
    /// Unchanged since the previous run; prior statements reused
    Skipped { statements: usize },
    /// Failed (or depends on a failed mapping); prior statements kept
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingReport {
    pub id: String,
    #[serde(flatten)]
    pub outcome: MappingOutcome,
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Per mapping, in execution order
    pub mappings: Vec<MappingReport>,
    /// Statements generated by executed mappings
    pub statement_count: usize,
    pub sync: SyncReport,
    /// True when no previous state was reused
    pub full_run: bool,
}

impl RunReport {
    fn ids(&self, pred: impl Fn(&MappingOutcome) -> bool) -> Vec<&str> {
        self.mappings
            .iter()
            .filter(|m| pred(&m.outcome))
            .map(|m| m.id.as_str())
            .collect()
    }

    pub fn executed(&self) -> Vec<&str> {
        self.ids(|o| matches!(o, MappingOutcome::Executed { .. }))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.ids(|o| matches!(o, MappingOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.ids(|o| matches!(o, MappingOutcome::Failed { .. }))
    }

    pub fn outcome(&self, mapping_id: &str) -> Option<&MappingOutcome> {
        self.mappings
            .iter()
            .find(|m| m.id == mapping_id)
            .map(|m| &m.outcome)
    }
}

/// Per-mapping results before synchronization.
#[derive(Default)]
struct Generation {
    fresh: BTreeMap<String, BTreeSet<Statement>>,
    signatures: BTreeMap<String, RunSignature>,
    reports: Vec<MappingReport>,
    /// Mappings whose prior statements stay: skipped and failed
    retained: BTreeSet<String>,
    failed: HashSet<String>,
}

enum Step {
    Executed(BTreeSet<Statement>),
    Skipped(usize),
}

pub struct Orchestrator<'c> {
    config: &'c EngineConfig,
}

impl<'c> Orchestrator<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    /// Execute `document` against `source` and persist to the configured output.
    pub fn run<S: SqlSource + ?Sized>(
        &self,
        document: &MappingDocument,
        source: &S,
    ) -> R2rmlResult<RunReport> {
        match self.config.output() {
            OutputTarget::File { path, format } => self.run_to_file(document, source, path, *format),
            OutputTarget::Store { path } => {
                let mut store = SqliteStore::open(path)?;
                self.run_to_store(document, source, &mut store)
            }
        }
    }

    /// Execute against an already opened store. Always a full run; the store
    /// receives only the delta.
    pub fn run_to_store<S: SqlSource + ?Sized, G: GraphStore + ?Sized>(
        &self,
        document: &MappingDocument,
        source: &S,
        store: &mut G,
    ) -> R2rmlResult<RunReport> {
        if self.config.incremental() {
            warn!("incremental mode is not available for store outputs, running in full");
        }
        let seed = self.load_seed()?;
        let generation = self.generate(document, source, &PreviousState::None)?;

        let mut computed: BTreeSet<Statement> = generation.fresh.values().flatten().cloned().collect();
        computed.extend(seed.into_iter().flatten());
        // with failed mappings the computed set is incomplete; never delete
        let allow_remove = generation.failed.is_empty();
        let sync = ModelSynchronizer::new(self.config)
            .with_prefixes(document.prefixes())
            .sync_store(store, &computed, allow_remove)?;

        let counts: BTreeMap<&str, usize> = generation
            .fresh
            .iter()
            .map(|(id, s)| (id.as_str(), s.len()))
            .collect();
        self.write_log(&generation, &PreviousState::None, |id| counts.get(id).copied().unwrap_or(0), None, None)?;

        Ok(self.report(generation, sync, true))
    }

    fn run_to_file<S: SqlSource + ?Sized>(
        &self,
        document: &MappingDocument,
        source: &S,
        path: &Path,
        format: GraphFormat,
    ) -> R2rmlResult<RunReport> {
        let seed = self.load_seed()?;
        let previous = PreviousState::load(self.config);
        let mut generation = self.generate(document, source, &previous)?;

        let fallback;
        let prior = match previous.provenance() {
            Some(p) => Some(p),
            None if !generation.failed.is_empty() => {
                fallback = self.provenance_for_failed();
                fallback.as_ref()
            }
            None => None,
        };

        if let Some(seed) = seed {
            // an unchanged seed must not force a rewrite
            if prior.and_then(|p| p.get(SEED_ID)) == Some(&seed) {
                generation.retained.insert(SEED_ID.to_string());
            } else {
                generation.fresh.insert(SEED_ID.to_string(), seed);
            }
        }

        let file = ModelSynchronizer::new(self.config)
            .with_prefixes(document.prefixes())
            .sync_file(
                path,
                format,
                prior,
                std::mem::take(&mut generation.fresh),
                &generation.retained,
            )?;
        self.write_log(
            &generation,
            &previous,
            |id| file.index.statement_count(id),
            file.destination_size,
            file.provenance_size,
        )?;

        let full_run = !previous.is_valid();
        Ok(self.report(generation, file.report, full_run))
    }

    /// Statements of the configured seed graph, read before any mapping runs.
    fn load_seed(&self) -> R2rmlResult<Option<BTreeSet<Statement>>> {
        let Some(path) = self.config.seed_graph() else {
            return Ok(None);
        };
        let format = GraphFormat::from_path(path).unwrap_or_default();
        let seed = read_statements(path, format)
            .map_err(|e| R2rmlError::Config(format!("seed graph {}: {e}", path.display())))?;
        info!(seed = %path.display(), statements = seed.len(), "seed graph loaded");
        Ok(Some(seed))
    }

    /// Prior provenance for a run that did not load it, so failed mappings
    /// can keep their statements.
    fn provenance_for_failed(&self) -> Option<ProvenanceIndex> {
        let path = self.config.provenance_path()?;
        if !path.exists() {
            return None;
        }
        match ProvenanceIndex::load(&path) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(error = %e, "cannot recover statements of failed mappings");
                None
            }
        }
    }

    fn generate<S: SqlSource + ?Sized>(
        &self,
        document: &MappingDocument,
        source: &S,
        previous: &PreviousState,
    ) -> R2rmlResult<Generation> {
        let order = document.execution_order()?;
        let builder = TermBuilder::new(document, source, self.config);
        let mut produced = ProducedSubjects::new();
        let mut executed: HashSet<&str> = HashSet::new();
        let mut generation = Generation::default();

        for rule in order {
            let id = rule.id();

            let failed_parent = rule
                .parents()
                .into_iter()
                .find(|p| *p != id && generation.failed.contains(*p));
            if let Some(parent) = failed_parent {
                warn!(mapping = id, parent, "skipping mapping, its parent failed");
                generation.fail(id, format!("depends on failed mapping {parent}"));
                continue;
            }

            let parent_ran = rule
                .parents()
                .into_iter()
                .any(|p| p != id && executed.contains(p));

            match self.process(rule, source, &builder, &mut produced, previous, parent_ran) {
                Ok((signature, Step::Executed(statements))) => {
                    info!(mapping = id, statements = statements.len(), "mapping executed");
                    executed.insert(id);
                    generation.reports.push(MappingReport {
                        id: id.to_string(),
                        outcome: MappingOutcome::Executed {
                            statements: statements.len(),
                        },
                    });
                    generation.signatures.insert(id.to_string(), signature);
                    generation.fresh.insert(id.to_string(), statements);
                }
                Ok((signature, Step::Skipped(statements))) => {
                    generation.reports.push(MappingReport {
                        id: id.to_string(),
                        outcome: MappingOutcome::Skipped { statements },
                    });
                    generation.signatures.insert(id.to_string(), signature);
                    generation.retained.insert(id.to_string());
                }
                Err(e) if self.config.continue_on_error() => {
                    warn!(mapping = id, error = %e, "mapping failed, keeping its previous statements");
                    generation.fail(id, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(generation)
    }

    /// Fingerprint one mapping and regenerate it unless it can be reused.
    fn process<S: SqlSource + ?Sized>(
        &self,
        rule: &MappingRule,
        source: &S,
        builder: &TermBuilder<'_, S>,
        produced: &mut ProducedSubjects,
        previous: &PreviousState,
        parent_ran: bool,
    ) -> R2rmlResult<(RunSignature, Step)> {
        let id = rule.id();
        let mut cursor = source.execute(rule.view().sql())?;
        let signature = ChangeDetector::signature(rule, &mut cursor)?;

        if !parent_ran && !ChangeDetector::should_execute(id, &signature, previous) {
            info!("Skipping statement generation from {id}. Nothing changed here.");
            let prior = previous.provenance().and_then(|p| p.get(id));
            let subjects: SubjectList = prior
                .map(|statements| statements.iter().map(|s| s.subject.clone()).collect())
                .unwrap_or_default();
            produced.seal(id, subjects);
            return Ok((signature, Step::Skipped(previous.statement_count(id))));
        }

        let plan = builder.prepare(rule, cursor.schema())?;
        let mut subjects = SubjectList::new();
        let mut statements = BTreeSet::new();
        let mut rows = 0usize;
        while cursor.next() {
            let row = cursor.row()?;
            builder.build_statements(&plan, &row, produced, &mut subjects, &mut statements)?;
            rows += 1;
            if rows % PROGRESS_INTERVAL == 0 {
                info!(mapping = id, statements = statements.len(), "At {rows} rows");
            }
        }
        // subjects without statements cannot be recovered on a later skip
        let stated: HashSet<&Resource> = statements.iter().map(|s| &s.subject).collect();
        subjects.retain(|s| stated.contains(s));
        produced.seal(id, subjects);
        Ok((signature, Step::Executed(statements)))
    }

    fn write_log(
        &self,
        generation: &Generation,
        previous: &PreviousState,
        statement_count: impl Fn(&str) -> usize,
        destination_file_size: Option<u64>,
        provenance_file_size: Option<u64>,
    ) -> R2rmlResult<()> {
        let now = Utc::now();
        let mappings = generation
            .signatures
            .iter()
            .map(|(id, signature)| {
                let timestamp = match previous.entry(id) {
                    Some(entry) if generation.retained.contains(id) => entry.timestamp,
                    _ => now,
                };
                let entry = MappingLogEntry::new(signature.clone(), statement_count(id), timestamp);
                (id.clone(), entry)
            })
            .collect();

        let log = RunLog {
            destination_file_size,
            provenance_file_size,
            mappings,
        };
        log.save(self.config.run_log())
            .map_err(|e| R2rmlError::RunLog(format!("cannot write run log: {e}")))
    }

    fn report(&self, generation: Generation, sync: SyncReport, full_run: bool) -> RunReport {
        let mut executed = 0;
        let mut statement_count = 0;
        for report in &generation.reports {
            if let MappingOutcome::Executed { statements } = report.outcome {
                executed += 1;
                statement_count += statements;
            }
        }
        info!(
            executed,
            failed = generation.failed.len(),
            added = sync.added,
            removed = sync.removed,
            "run complete"
        );
        RunReport {
            mappings: generation.reports,
            statement_count,
            sync,
            full_run,
        }
    }
}

impl Generation {
    fn fail(&mut self, id: &str, error: String) {
        self.failed.insert(id.to_string());
        self.retained.insert(id.to_string());
        self.reports.push(MappingReport {
            id: id.to_string(),
            outcome: MappingOutcome::Failed { error },
        });
    }
}
