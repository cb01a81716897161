//! Run log
//!
//! JSON record of the last successful run: per-mapping signatures plus the
//! sizes of the files it wrote. An incremental run trusts prior output only
//! when the log parses and the files on disk still have the logged sizes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EngineConfig, OutputTarget};
use crate::error::{R2rmlError, R2rmlResult};
use crate::signature::RunSignature;
use crate::sync::ProvenanceIndex;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLog {
    #[serde(default)]
    pub destination_file_size: Option<u64>,
    #[serde(default)]
    pub provenance_file_size: Option<u64>,
    #[serde(default)]
    pub mappings: BTreeMap<String, MappingLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingLogEntry {
    pub select_query_hash: String,
    pub mapping_hash: String,
    pub select_query_results_hash: String,
    pub statement_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl MappingLogEntry {
    pub fn new(signature: RunSignature, statement_count: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            select_query_hash: signature.query_hash,
            mapping_hash: signature.mapping_hash,
            select_query_results_hash: signature.results_hash,
            statement_count,
            timestamp,
        }
    }

    pub fn signature(&self) -> RunSignature {
        RunSignature {
            query_hash: self.select_query_hash.clone(),
            mapping_hash: self.mapping_hash.clone(),
            results_hash: self.select_query_results_hash.clone(),
        }
    }
}

impl RunLog {
    pub fn load(path: &Path) -> R2rmlResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| R2rmlError::RunLog(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> R2rmlResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, json + "\n")
            .map_err(|e| R2rmlError::RunLog(format!("{}: {e}", path.display())))
    }
}

/// What an incremental run may reuse from the previous one.
#[derive(Debug, Clone, Default)]
pub enum PreviousState {
    /// No previous run on record
    #[default]
    None,
    /// A previous run exists but cannot be trusted; everything executes
    Invalid(String),
    Valid {
        log: RunLog,
        provenance: ProvenanceIndex,
    },
}

impl PreviousState {
    /// Load and validate the previous run for `config`'s output.
    ///
    /// Only file outputs in incremental mode reuse prior state; anything else
    /// is `None`.
    pub fn load(config: &EngineConfig) -> Self {
        if !config.incremental_effective() {
            return PreviousState::None;
        }
        let OutputTarget::File { path: destination, .. } = config.output() else {
            return PreviousState::None;
        };
        let log_path = config.run_log();
        if !log_path.exists() {
            debug!(run_log = %log_path.display(), "no run log, first run");
            return PreviousState::None;
        }

        let state = Self::validate(config, log_path, destination);
        if let PreviousState::Invalid(reason) = &state {
            warn!(%reason, "previous run unusable, regenerating every mapping");
        }
        state
    }

    fn validate(config: &EngineConfig, log_path: &Path, destination: &Path) -> Self {
        let log = match RunLog::load(log_path) {
            Ok(log) => log,
            Err(e) => return PreviousState::Invalid(e.to_string()),
        };

        if let Err(reason) = check_size(destination, log.destination_file_size) {
            return PreviousState::Invalid(reason);
        }
        let Some(provenance_path) = config.provenance_path() else {
            return PreviousState::Invalid("no provenance path for output".into());
        };
        if let Err(reason) = check_size(&provenance_path, log.provenance_file_size) {
            return PreviousState::Invalid(reason);
        }

        match ProvenanceIndex::load(&provenance_path) {
            Ok(provenance) => PreviousState::Valid { log, provenance },
            Err(e) => PreviousState::Invalid(format!(
                "{}: {e}",
                provenance_path.display()
            )),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, PreviousState::Valid { .. })
    }

    pub fn entry(&self, mapping_id: &str) -> Option<&MappingLogEntry> {
        match self {
            PreviousState::Valid { log, .. } => log.mappings.get(mapping_id),
            _ => None,
        }
    }

    pub fn provenance(&self) -> Option<&ProvenanceIndex> {
        match self {
            PreviousState::Valid { provenance, .. } => Some(provenance),
            _ => None,
        }
    }

    /// Statements on record for a mapping in the prior provenance.
    pub fn statement_count(&self, mapping_id: &str) -> usize {
        self.provenance()
            .map_or(0, |p| p.statement_count(mapping_id))
    }
}

fn check_size(path: &Path, logged: Option<u64>) -> Result<(), String> {
    let actual = fs::metadata(path)
        .map_err(|e| format!("{}: {e}", path.display()))?
        .len();
    match logged {
        Some(logged) if logged == actual => Ok(()),
        Some(logged) => Err(format!(
            "{} is {actual} bytes, run log recorded {logged}",
            path.display()
        )),
        None => Err(format!("run log has no size for {}", path.display())),
    }
}
