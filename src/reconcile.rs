//! Read-only lookup tables translating external disease and phenotype codes
//! into destination ids.
//!
//! Disease codes resolve in a fixed order:
//!
//! 1. direct match in the code's own namespace (ORPHA codes only),
//! 2. OMIM -> ORPHA cross-reference for OMIM codes,
//! 3. numeric suffix read as an ORPHA code, when numeric fallback is enabled,
//! 4. a placeholder disease created for exactly this code by an earlier run.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::destination::{DiseaseRecord, HpoTermRecord};
use crate::domain::{DiseaseCode, HpoTermCode, Namespace};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrossReference {
    pub omim: String,
    pub orpha: String,
}

impl CrossReference {
    /// Normalises both sides; returns `None` when either is not a valid code.
    pub fn parse(omim: &str, orpha: &str) -> Option<Self> {
        let omim = match DiseaseCode::parse_with_default(omim, Namespace::Omim).ok()? {
            DiseaseCode::Omim(code) => code,
            _ => return None,
        };
        let orpha = match DiseaseCode::parse_with_default(orpha, Namespace::Orpha).ok()? {
            DiseaseCode::Orpha(code) => code,
            _ => return None,
        };
        Some(Self { omim, orpha })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(i64),
    NotFound,
    SyntheticallyCreated(i64),
}

impl Resolution {
    pub fn id(&self) -> Option<i64> {
        match self {
            Resolution::Found(id) | Resolution::SyntheticallyCreated(id) => Some(*id),
            Resolution::NotFound => None,
        }
    }
}

/// Which lookup step produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPath {
    Direct,
    CrossReference,
    NumericFallback,
    Placeholder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapSummary {
    pub orpha_codes: usize,
    pub omim_codes: usize,
    pub placeholder_codes: usize,
    pub hpo_terms: usize,
    pub cross_references: usize,
    /// Cross-references whose ORPHA side is not in the destination.
    pub dangling_cross_references: usize,
    /// OMIM codes that map to more than one destination disease.
    pub ambiguous_omim_codes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationMap {
    orpha: HashMap<String, i64>,
    omim: HashMap<String, i64>,
    placeholders: HashMap<String, i64>,
    hpo: HashMap<String, i64>,
    numeric_fallback: bool,
    summary: MapSummary,
}

impl ReconciliationMap {
    pub fn build(
        diseases: &[DiseaseRecord],
        hpo_terms: &[HpoTermRecord],
        cross_references: &[CrossReference],
        numeric_fallback: bool,
    ) -> Self {
        let mut summary = MapSummary {
            cross_references: cross_references.len(),
            ..MapSummary::default()
        };

        let mut orpha = HashMap::new();
        let mut placeholders = HashMap::new();
        for disease in diseases {
            if let Some(code) = &disease.orpha_code {
                let key = match DiseaseCode::parse_with_default(code, Namespace::Orpha) {
                    Ok(DiseaseCode::Orpha(key)) => key,
                    _ => code.trim().to_string(),
                };
                keep_smallest(&mut orpha, key, disease.id);
            }
            if let Some(code) = &disease.placeholder_code {
                keep_smallest(&mut placeholders, code.clone(), disease.id);
            }
        }

        let mut omim: HashMap<String, i64> = HashMap::new();
        let mut ambiguous = HashSet::new();
        for xref in cross_references {
            let Some(&id) = orpha.get(&xref.orpha) else {
                summary.dangling_cross_references += 1;
                continue;
            };
            match omim.get(&xref.omim) {
                Some(&existing) if existing != id => {
                    ambiguous.insert(xref.omim.clone());
                    keep_smallest(&mut omim, xref.omim.clone(), id);
                }
                Some(_) => {}
                None => {
                    omim.insert(xref.omim.clone(), id);
                }
            }
        }

        let mut hpo = HashMap::new();
        for term in hpo_terms {
            let key = term
                .code
                .parse::<HpoTermCode>()
                .map(|code| code.as_str().to_string())
                .unwrap_or_else(|_| term.code.trim().to_string());
            keep_smallest(&mut hpo, key, term.id);
        }

        summary.orpha_codes = orpha.len();
        summary.omim_codes = omim.len();
        summary.ambiguous_omim_codes = ambiguous.len();
        summary.placeholder_codes = placeholders.len();
        summary.hpo_terms = hpo.len();

        Self {
            orpha,
            omim,
            placeholders,
            hpo,
            numeric_fallback,
            summary,
        }
    }

    pub fn summary(&self) -> MapSummary {
        self.summary
    }

    pub fn resolve_disease(&self, code: &DiseaseCode) -> Resolution {
        match self.trace_disease(code) {
            Some((id, _)) => Resolution::Found(id),
            None => Resolution::NotFound,
        }
    }

    /// Resolves a disease code and reports the lookup step that matched.
    pub fn trace_disease(&self, code: &DiseaseCode) -> Option<(i64, MatchPath)> {
        if let DiseaseCode::Orpha(value) = code {
            if let Some(&id) = self.orpha.get(value) {
                return Some((id, MatchPath::Direct));
            }
        }
        if let DiseaseCode::Omim(value) = code {
            if let Some(&id) = self.omim.get(value) {
                return Some((id, MatchPath::CrossReference));
            }
        }
        if self.numeric_fallback && !matches!(code, DiseaseCode::Orpha(_)) {
            if let Some(id) = code
                .numeric_suffix()
                .and_then(|suffix| self.orpha.get(&suffix).copied())
            {
                return Some((id, MatchPath::NumericFallback));
            }
        }
        self.placeholders
            .get(&code.to_string())
            .map(|&id| (id, MatchPath::Placeholder))
    }

    pub fn resolve_hpo(&self, code: &HpoTermCode) -> Option<i64> {
        self.hpo.get(code.as_str()).copied()
    }
}

fn keep_smallest(map: &mut HashMap<String, i64>, key: String, id: i64) {
    map.entry(key)
        .and_modify(|existing| *existing = (*existing).min(id))
        .or_insert(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disease(id: i64, orpha: &str) -> DiseaseRecord {
        DiseaseRecord {
            id,
            orpha_code: Some(orpha.to_string()),
            placeholder_code: None,
        }
    }

    #[test]
    fn omim_resolves_through_cross_reference() {
        let map = ReconciliationMap::build(
            &[disease(1, "558")],
            &[],
            &[CrossReference::parse("154700", "ORPHA:558").unwrap()],
            false,
        );
        let code: DiseaseCode = "OMIM:154700".parse().unwrap();
        assert_eq!(map.trace_disease(&code), Some((1, MatchPath::CrossReference)));
    }

    #[test]
    fn numeric_fallback_only_when_enabled() {
        let diseases = [disease(7, "166024")];
        let code: DiseaseCode = "DECIPHER:166024".parse().unwrap();

        let strict = ReconciliationMap::build(&diseases, &[], &[], false);
        assert_eq!(strict.resolve_disease(&code), Resolution::NotFound);

        let lenient = ReconciliationMap::build(&diseases, &[], &[], true);
        assert_eq!(
            lenient.trace_disease(&code),
            Some((7, MatchPath::NumericFallback))
        );
    }

    #[test]
    fn ambiguous_omim_keeps_smallest_id() {
        let map = ReconciliationMap::build(
            &[disease(4, "100"), disease(2, "200")],
            &[],
            &[
                CrossReference::parse("300", "100").unwrap(),
                CrossReference::parse("300", "200").unwrap(),
                CrossReference::parse("301", "999").unwrap(),
            ],
            false,
        );
        let code: DiseaseCode = "OMIM:300".parse().unwrap();
        assert_eq!(map.resolve_disease(&code), Resolution::Found(2));
        assert_eq!(map.summary().ambiguous_omim_codes, 1);
        assert_eq!(map.summary().dangling_cross_references, 1);
    }

    #[test]
    fn placeholder_codes_resolve_last() {
        let placeholder = DiseaseRecord {
            id: 9,
            orpha_code: None,
            placeholder_code: Some("OMIM:999999".to_string()),
        };
        let map = ReconciliationMap::build(&[placeholder], &[], &[], false);
        let code: DiseaseCode = "OMIM:999999".parse().unwrap();
        assert_eq!(map.trace_disease(&code), Some((9, MatchPath::Placeholder)));
    }
}
