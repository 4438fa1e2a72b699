use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::destination::{Association, DestinationStore};
use crate::domain::{DiseaseCode, Frequency, HpoTermCode, Namespace, normalize_evidence};
use crate::error::InsertError;
use crate::fields::{AssociationFields, SourceRow};
use crate::reconcile::{ReconciliationMap, Resolution};

pub const MAX_PROBLEMS: usize = 100;
pub const MAX_UNRESOLVED_SAMPLES: usize = 50;
const MAX_MESSAGE_LEN: usize = 200;

/// Retry for single-row inserts that failed with `InsertError::Unavailable`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub batch_size: usize,
    pub progress_every: usize,
    pub default_namespace: Namespace,
    pub create_placeholders: bool,
    pub dry_run: bool,
    pub retry: RetryPolicy,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            progress_every: crate::config::DEFAULT_PROGRESS_EVERY,
            default_namespace: Namespace::Orpha,
            create_placeholders: false,
            dry_run: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Duplicate,
    SkippedMissingLeft,
    SkippedMissingRight,
    Errored,
}

/// Run counters. Every processed row lands in exactly one outcome bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub total_seen: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped_missing_left: u64,
    pub skipped_missing_right: u64,
    pub errored: u64,
    pub placeholders_created: u64,
    pub batches: u64,
}

impl ImportStats {
    #[must_use]
    pub fn record(self, outcome: RowOutcome) -> Self {
        let mut next = Self {
            total_seen: self.total_seen + 1,
            ..self
        };
        match outcome {
            RowOutcome::Inserted => next.inserted += 1,
            RowOutcome::Duplicate => next.duplicates += 1,
            RowOutcome::SkippedMissingLeft => next.skipped_missing_left += 1,
            RowOutcome::SkippedMissingRight => next.skipped_missing_right += 1,
            RowOutcome::Errored => next.errored += 1,
        }
        next
    }

    #[must_use]
    pub fn with_placeholder(self) -> Self {
        Self {
            placeholders_created: self.placeholders_created + 1,
            ..self
        }
    }

    #[must_use]
    pub fn with_batch(self) -> Self {
        Self {
            batches: self.batches + 1,
            ..self
        }
    }

    /// Rows present in the destination after the run, new or already there.
    pub fn imported(&self) -> u64 {
        self.inserted + self.duplicates
    }

    pub fn is_balanced(&self) -> bool {
        self.imported() + self.skipped_missing_left + self.skipped_missing_right + self.errored
            == self.total_seen
    }

    pub fn counters(&self) -> BTreeMap<String, u64> {
        [
            ("total_seen", self.total_seen),
            ("imported", self.imported()),
            ("inserted", self.inserted),
            ("duplicates", self.duplicates),
            ("skipped_missing_left", self.skipped_missing_left),
            ("skipped_missing_right", self.skipped_missing_right),
            ("errored", self.errored),
            ("placeholders_created", self.placeholders_created),
            ("batches", self.batches),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadOutcome {
    pub stats: ImportStats,
    pub problems: Vec<String>,
    pub unresolved_phenotypes: BTreeSet<String>,
    pub unresolved_diseases: BTreeSet<String>,
}

pub struct Loader<'a, D: DestinationStore> {
    map: &'a ReconciliationMap,
    destination: &'a mut D,
    fields: AssociationFields,
    settings: LoadSettings,
    placeholders: HashMap<DiseaseCode, i64>,
    problems: Vec<String>,
    unresolved_phenotypes: BTreeSet<String>,
    unresolved_diseases: BTreeSet<String>,
    next_progress: u64,
}

impl<'a, D: DestinationStore> Loader<'a, D> {
    pub fn new(
        map: &'a ReconciliationMap,
        destination: &'a mut D,
        fields: AssociationFields,
        settings: LoadSettings,
    ) -> Self {
        let settings = LoadSettings {
            batch_size: settings.batch_size.max(1),
            progress_every: settings.progress_every.max(1),
            ..settings
        };
        let next_progress = settings.progress_every as u64;
        Self {
            map,
            destination,
            fields,
            settings,
            placeholders: HashMap::new(),
            problems: Vec::new(),
            unresolved_phenotypes: BTreeSet::new(),
            unresolved_diseases: BTreeSet::new(),
            next_progress,
        }
    }

    pub fn run(mut self, rows: &[SourceRow], sink: &dyn ProgressSink) -> LoadOutcome {
        let start = Instant::now();
        let mut stats = ImportStats::default();
        let mut buffer = Vec::with_capacity(self.settings.batch_size);

        for row in rows {
            let Some(hpo_term_id) = self.resolve_phenotype(row) else {
                stats = stats.record(RowOutcome::SkippedMissingLeft);
                continue;
            };

            let disease_id = match self.resolve_disease(row, stats) {
                Ok((Some(id), next)) => {
                    stats = next;
                    id
                }
                Ok((None, next)) => {
                    stats = next.record(RowOutcome::SkippedMissingRight);
                    continue;
                }
                Err(err) => {
                    self.row_failed(&format!("placeholder creation failed: {err}"));
                    stats = stats.record(RowOutcome::Errored);
                    continue;
                }
            };

            buffer.push(Association {
                hpo_term_id,
                disease_id,
                evidence: self
                    .fields
                    .evidence
                    .as_deref()
                    .and_then(|column| row.text(column))
                    .and_then(|value| normalize_evidence(&value)),
                frequency: self
                    .fields
                    .frequency
                    .as_deref()
                    .and_then(|column| row.text(column))
                    .and_then(|value| Frequency::coerce(&value))
                    .map(|frequency| frequency.to_string()),
            });

            if buffer.len() >= self.settings.batch_size {
                stats = self.flush(&mut buffer, stats);
                self.report_progress(stats, start, sink);
            }
        }

        stats = self.flush(&mut buffer, stats);
        self.report_progress(stats, start, sink);

        LoadOutcome {
            stats,
            problems: self.problems,
            unresolved_phenotypes: self.unresolved_phenotypes,
            unresolved_diseases: self.unresolved_diseases,
        }
    }

    fn resolve_phenotype(&mut self, row: &SourceRow) -> Option<i64> {
        let raw = row.text(&self.fields.phenotype)?.into_owned();
        let resolved = raw
            .parse::<HpoTermCode>()
            .ok()
            .and_then(|code| self.map.resolve_hpo(&code));
        if resolved.is_none() {
            sample(&mut self.unresolved_phenotypes, raw);
        }
        resolved
    }

    fn resolve_disease(
        &mut self,
        row: &SourceRow,
        stats: ImportStats,
    ) -> Result<(Option<i64>, ImportStats), InsertError> {
        let Some(raw) = row.text(&self.fields.disease).map(|value| value.into_owned()) else {
            return Ok((None, stats));
        };
        let Ok(code) = DiseaseCode::parse_with_default(&raw, self.settings.default_namespace)
        else {
            sample(&mut self.unresolved_diseases, raw);
            return Ok((None, stats));
        };

        let (resolution, stats) = match self.map.resolve_disease(&code) {
            Resolution::NotFound => self.placeholder_for(code, stats)?,
            found => (found, stats),
        };
        if resolution == Resolution::NotFound {
            sample(&mut self.unresolved_diseases, raw);
        }
        Ok((resolution.id(), stats))
    }

    fn placeholder_for(
        &mut self,
        code: DiseaseCode,
        stats: ImportStats,
    ) -> Result<(Resolution, ImportStats), InsertError> {
        if let Some(&id) = self.placeholders.get(&code) {
            return Ok((Resolution::SyntheticallyCreated(id), stats));
        }
        if !self.settings.create_placeholders || self.settings.dry_run {
            return Ok((Resolution::NotFound, stats));
        }
        let id = self.destination.create_placeholder(&code)?;
        self.placeholders.insert(code, id);
        Ok((Resolution::SyntheticallyCreated(id), stats.with_placeholder()))
    }

    fn flush(&mut self, buffer: &mut Vec<Association>, stats: ImportStats) -> ImportStats {
        if buffer.is_empty() {
            return stats;
        }
        let records = std::mem::take(buffer);

        if self.settings.dry_run {
            return records
                .iter()
                .fold(stats, |stats, _| stats.record(RowOutcome::Inserted));
        }

        let stats = stats.with_batch();
        match self.destination.bulk_insert(&records) {
            Ok(()) => {
                debug!(size = records.len(), "bulk insert committed");
                records
                    .iter()
                    .fold(stats, |stats, _| stats.record(RowOutcome::Inserted))
            }
            Err(err) => {
                debug!(
                    size = records.len(),
                    error = %err,
                    "bulk insert failed, inserting rows one by one"
                );
                let mut stats = stats;
                for record in &records {
                    let outcome = match self.insert_with_retry(record) {
                        Ok(()) => RowOutcome::Inserted,
                        Err(InsertError::Duplicate) => RowOutcome::Duplicate,
                        Err(err) => {
                            self.row_failed(&format!(
                                "hpo_term_id={} disease_id={}: {err}",
                                record.hpo_term_id, record.disease_id
                            ));
                            RowOutcome::Errored
                        }
                    };
                    stats = stats.record(outcome);
                }
                stats
            }
        }
    }

    fn insert_with_retry(&mut self, record: &Association) -> Result<(), InsertError> {
        let mut attempt = 0;
        loop {
            match self.destination.insert_one(record) {
                Err(InsertError::Unavailable(message))
                    if attempt < self.settings.retry.attempts =>
                {
                    attempt += 1;
                    debug!(attempt, %message, "retrying insert");
                    std::thread::sleep(self.settings.retry.backoff * attempt);
                }
                result => return result,
            }
        }
    }

    fn report_progress(&mut self, stats: ImportStats, start: Instant, sink: &dyn ProgressSink) {
        if stats.imported() < self.next_progress {
            return;
        }
        let every = self.settings.progress_every as u64;
        self.next_progress = (stats.imported() / every + 1) * every;
        let verb = if self.settings.dry_run {
            "resolvable"
        } else {
            "imported"
        };
        sink.event(ProgressEvent {
            message: format!(
                "{verb}={} seen={} skipped_left={} skipped_right={} errored={}",
                stats.imported(),
                stats.total_seen,
                stats.skipped_missing_left,
                stats.skipped_missing_right,
                stats.errored
            ),
            elapsed: Some(start.elapsed()),
        });
    }

    /// Logs a row-level failure and keeps it, truncated, for the report.
    fn row_failed(&mut self, message: &str) {
        let message = truncate_message(message, MAX_MESSAGE_LEN);
        warn!("{message}");
        if self.problems.len() < MAX_PROBLEMS {
            self.problems.push(message);
        }
    }
}

fn sample(samples: &mut BTreeSet<String>, value: String) {
    if samples.len() < MAX_UNRESOLVED_SAMPLES {
        samples.insert(value);
    }
}

pub fn truncate_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    let mut truncated = message.chars().take(limit).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_record_by_value() {
        let stats = ImportStats::default()
            .record(RowOutcome::Inserted)
            .record(RowOutcome::Duplicate)
            .record(RowOutcome::SkippedMissingRight);
        assert_eq!(stats.total_seen, 3);
        assert_eq!(stats.imported(), 2);
        assert!(stats.is_balanced());
        assert_eq!(stats.counters()["skipped_missing_right"], 1);
    }

    #[test]
    fn truncates_long_messages() {
        let message = "x".repeat(300);
        let truncated = truncate_message(&message, 200);
        assert_eq!(truncated.len(), 203);
        assert_eq!(truncate_message("short", 200), "short");
    }
}
