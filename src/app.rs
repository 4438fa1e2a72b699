use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::ResolvedConfig;
use crate::destination::DestinationStore;
use crate::domain::{DiseaseCode, HpoTermCode, Namespace};
use crate::error::LoaderError;
use crate::fields::FieldMap;
use crate::loader::{LoadOutcome, LoadSettings, Loader};
use crate::reconcile::{CrossReference, MatchPath, ReconciliationMap};
use crate::report::{ImportReport, RunMode};
use crate::source::{Dataset, SourceStore};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub batch_size: Option<usize>,
    pub create_placeholders: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub query: String,
    pub namespace: Namespace,
    pub normalized: String,
    pub destination_id: Option<i64>,
    pub matched_by: Option<MatchPath>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Everything a run needs besides the two stores.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub source_label: String,
    pub destination_label: String,
    pub fields: FieldMap,
    pub numeric_fallback: bool,
    pub load: LoadSettings,
}

impl AppSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            source_label: config.source.describe(),
            destination_label: config.destination.to_string(),
            fields: config.fields.clone(),
            numeric_fallback: config.numeric_fallback,
            load: LoadSettings {
                batch_size: config.batch_size,
                progress_every: config.progress_every,
                default_namespace: config.default_namespace,
                create_placeholders: config.create_placeholders,
                dry_run: false,
                retry: config.retry,
            },
        }
    }
}

pub struct App<S: SourceStore, D: DestinationStore> {
    source: S,
    destination: D,
    settings: AppSettings,
}

impl<S: SourceStore, D: DestinationStore> App<S, D> {
    pub fn new(source: S, destination: D, settings: AppSettings) -> Self {
        Self {
            source,
            destination,
            settings,
        }
    }

    pub fn into_parts(self) -> (S, D) {
        (self.source, self.destination)
    }

    pub fn build_map(
        &mut self,
        sink: &dyn ProgressSink,
    ) -> Result<ReconciliationMap, LoaderError> {
        sink.event(ProgressEvent {
            message: "phase=Reconcile; loading destination diseases and HPO terms".to_string(),
            elapsed: None,
        });
        let diseases = self.destination.load_diseases()?;
        let hpo_terms = self.destination.load_hpo_terms()?;

        sink.event(ProgressEvent {
            message: "phase=Reconcile; loading cross-references".to_string(),
            elapsed: None,
        });
        let table = self.source.fetch(Dataset::CrossReferences)?;
        let mut cross_references = Vec::with_capacity(table.len());
        if !table.is_empty() {
            let fields = self.settings.fields.resolve_cross_references(&table.columns)?;
            let mut invalid = 0usize;
            for row in &table.rows {
                let parsed = match (row.text(&fields.omim), row.text(&fields.orpha)) {
                    (Some(omim), Some(orpha)) => CrossReference::parse(&omim, &orpha),
                    _ => None,
                };
                match parsed {
                    Some(xref) => cross_references.push(xref),
                    None => invalid += 1,
                }
            }
            if invalid > 0 {
                debug!(invalid, "ignored malformed cross-reference rows");
            }
        }

        let map = ReconciliationMap::build(
            &diseases,
            &hpo_terms,
            &cross_references,
            self.settings.numeric_fallback,
        );
        let summary = map.summary();
        info!(
            orpha = summary.orpha_codes,
            omim = summary.omim_codes,
            hpo = summary.hpo_terms,
            placeholders = summary.placeholder_codes,
            "reconciliation map built"
        );
        Ok(map)
    }

    pub fn load(
        &mut self,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ImportReport, LoaderError> {
        let started_at = chrono::Utc::now();
        let mode = if options.dry_run {
            RunMode::Audit
        } else {
            RunMode::Load
        };
        let map = self.build_map(sink)?;

        sink.event(ProgressEvent {
            message: "phase=Read; fetching source associations".to_string(),
            elapsed: None,
        });
        let table = self.source.fetch(Dataset::Associations)?;
        info!(rows = table.len(), "source associations fetched");

        let outcome = if table.is_empty() {
            LoadOutcome::default()
        } else {
            let fields = self.settings.fields.resolve_associations(&table.columns)?;
            let settings = LoadSettings {
                batch_size: options.batch_size.unwrap_or(self.settings.load.batch_size),
                create_placeholders: options
                    .create_placeholders
                    .unwrap_or(self.settings.load.create_placeholders),
                dry_run: options.dry_run,
                ..self.settings.load.clone()
            };
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Load; {} rows, batch size {}",
                    table.len(),
                    settings.batch_size
                ),
                elapsed: None,
            });
            Loader::new(&map, &mut self.destination, fields, settings).run(&table.rows, sink)
        };

        info!(
            imported = outcome.stats.imported(),
            errored = outcome.stats.errored,
            "run finished"
        );
        Ok(ImportReport::new(
            mode,
            &self.settings.source_label,
            &self.settings.destination_label,
            started_at,
            map.summary(),
            outcome,
        ))
    }

    pub fn lookup(
        &mut self,
        query: &str,
        namespace: Option<Namespace>,
        sink: &dyn ProgressSink,
    ) -> Result<LookupResult, LoaderError> {
        let map = self.build_map(sink)?;

        let looks_like_hpo = query.trim().to_uppercase().starts_with("HP");
        if namespace == Some(Namespace::Hpo) || (namespace.is_none() && looks_like_hpo) {
            let code = query.parse::<HpoTermCode>()?;
            return Ok(LookupResult {
                query: query.to_string(),
                namespace: Namespace::Hpo,
                normalized: code.to_string(),
                destination_id: map.resolve_hpo(&code),
                matched_by: map.resolve_hpo(&code).map(|_| MatchPath::Direct),
            });
        }

        let default = namespace.unwrap_or(self.settings.load.default_namespace);
        let code = DiseaseCode::parse_with_default(query, default)?;
        let traced = map.trace_disease(&code);
        Ok(LookupResult {
            query: query.to_string(),
            namespace: code.namespace(),
            normalized: code.to_string(),
            destination_id: traced.map(|(id, _)| id),
            matched_by: traced.map(|(_, path)| path),
        })
    }
}
