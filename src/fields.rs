use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::LoaderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Int(i64),
    Text(String),
}

impl FieldValue {
    /// Text form of the value; blank strings read as missing.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Null => None,
            FieldValue::Int(value) => Some(Cow::Owned(value.to_string())),
            FieldValue::Text(value) if value.trim().is_empty() => None,
            FieldValue::Text(value) => Some(Cow::Borrowed(value.as_str())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    values: HashMap<String, FieldValue>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: FieldValue) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: FieldValue) {
        self.values.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    pub fn text(&self, column: &str) -> Option<Cow<'_, str>> {
        self.get(column).and_then(FieldValue::as_text)
    }
}

/// Fully materialised result of one source query, in source order.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    pub columns: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Destination field -> accepted source column names, tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default = "default_phenotype_columns")]
    pub phenotype: Vec<String>,
    #[serde(default = "default_disease_columns")]
    pub disease: Vec<String>,
    #[serde(default = "default_evidence_columns")]
    pub evidence: Vec<String>,
    #[serde(default = "default_frequency_columns")]
    pub frequency: Vec<String>,
    #[serde(default = "default_omim_columns")]
    pub omim: Vec<String>,
    #[serde(default = "default_orpha_columns")]
    pub orpha: Vec<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            phenotype: default_phenotype_columns(),
            disease: default_disease_columns(),
            evidence: default_evidence_columns(),
            frequency: default_frequency_columns(),
            omim: default_omim_columns(),
            orpha: default_orpha_columns(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationFields {
    pub phenotype: String,
    pub disease: String,
    pub evidence: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossReferenceFields {
    pub omim: String,
    pub orpha: String,
}

impl FieldMap {
    pub fn resolve_associations(
        &self,
        columns: &[String],
    ) -> Result<AssociationFields, LoaderError> {
        Ok(AssociationFields {
            phenotype: required("associations", "phenotype", &self.phenotype, columns)?,
            disease: required("associations", "disease", &self.disease, columns)?,
            evidence: pick(&self.evidence, columns),
            frequency: pick(&self.frequency, columns),
        })
    }

    pub fn resolve_cross_references(
        &self,
        columns: &[String],
    ) -> Result<CrossReferenceFields, LoaderError> {
        Ok(CrossReferenceFields {
            omim: required("cross_references", "omim", &self.omim, columns)?,
            orpha: required("cross_references", "orpha", &self.orpha, columns)?,
        })
    }
}

fn pick(candidates: &[String], columns: &[String]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        columns
            .iter()
            .find(|column| column.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}

fn required(
    dataset: &str,
    field: &str,
    candidates: &[String],
    columns: &[String],
) -> Result<String, LoaderError> {
    pick(candidates, columns).ok_or_else(|| LoaderError::MissingColumn {
        dataset: dataset.to_string(),
        field: field.to_string(),
        candidates: candidates.join(", "),
    })
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn default_phenotype_columns() -> Vec<String> {
    names(&["hpo_id", "hpoTermId", "hpo_term_id", "hpoId", "phenotype"])
}

fn default_disease_columns() -> Vec<String> {
    names(&["database_id", "disease_id", "diseaseId", "orpha_code", "orphaCode", "disease"])
}

fn default_evidence_columns() -> Vec<String> {
    names(&["evidence", "evidence_code", "evidenceCode"])
}

fn default_frequency_columns() -> Vec<String> {
    names(&["frequency", "frequency_id", "frequencyId", "freq"])
}

fn default_omim_columns() -> Vec<String> {
    names(&["omim_code", "omimCode", "omim_id", "mim_number", "omim"])
}

fn default_orpha_columns() -> Vec<String> {
    names(&["orpha_code", "orphaCode", "orpha_number", "orpha"])
}
