use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::LoaderError;
use crate::loader::{ImportStats, LoadOutcome};
use crate::reconcile::MapSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Load,
    Audit,
}

/// Final summary of a run; also the JSON report written with `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub mode: RunMode,
    pub tool: String,
    pub source: String,
    pub destination: String,
    pub started_at: String,
    pub finished_at: String,
    pub map: MapSummary,
    pub counters: BTreeMap<String, u64>,
    pub problems: Vec<String>,
    pub unresolved_phenotypes: Vec<String>,
    pub unresolved_diseases: Vec<String>,
    #[serde(skip)]
    pub stats: ImportStats,
}

impl ImportReport {
    pub fn new(
        mode: RunMode,
        source: &str,
        destination: &str,
        started_at: DateTime<Utc>,
        map: MapSummary,
        outcome: LoadOutcome,
    ) -> Self {
        Self {
            mode,
            tool: format!("rarekb/{}", env!("CARGO_PKG_VERSION")),
            source: source.to_string(),
            destination: destination.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            map,
            counters: outcome.stats.counters(),
            problems: outcome.problems,
            unresolved_phenotypes: outcome.unresolved_phenotypes.into_iter().collect(),
            unresolved_diseases: outcome.unresolved_diseases.into_iter().collect(),
            stats: outcome.stats,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.stats.errored > 0
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), LoaderError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("rarekb-report")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
