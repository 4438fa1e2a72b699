use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LoaderError;

static PREFIXED_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9]*)\s*[:_]\s*(\S+)$").expect("valid prefixed code regex")
});
static HPO_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:hp)?[:_]?(\d{7})$").expect("valid HPO code regex")
});
static RATIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*/\s*(\d+)$").expect("valid ratio regex"));
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*%$").expect("valid percent regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Orpha,
    Omim,
    Hpo,
    Other,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Orpha => write!(f, "ORPHA"),
            Namespace::Omim => write!(f, "OMIM"),
            Namespace::Hpo => write!(f, "HPO"),
            Namespace::Other => write!(f, "OTHER"),
        }
    }
}

/// External disease identifier; the variant selects the reconciliation table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiseaseCode {
    Orpha(String),
    Omim(String),
    Other { prefix: String, code: String },
}

impl DiseaseCode {
    /// Parses a code, reading bare numbers as belonging to `default`.
    pub fn parse_with_default(value: &str, default: Namespace) -> Result<Self, LoaderError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(LoaderError::InvalidDiseaseCode(value.to_string()));
        }

        if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            let code = strip_leading_zeros(trimmed);
            return Ok(match default {
                Namespace::Omim => DiseaseCode::Omim(code),
                _ => DiseaseCode::Orpha(code),
            });
        }

        let captures = PREFIXED_CODE
            .captures(trimmed)
            .ok_or_else(|| LoaderError::InvalidDiseaseCode(value.to_string()))?;
        let prefix = captures[1].to_uppercase();
        let rest = &captures[2];

        match prefix.as_str() {
            "ORPHA" | "ORPHANET" | "ORPHACODE" => {
                numeric_code(rest, value).map(DiseaseCode::Orpha)
            }
            "OMIM" | "MIM" => numeric_code(rest, value).map(DiseaseCode::Omim),
            _ => Ok(DiseaseCode::Other {
                prefix,
                code: rest.to_string(),
            }),
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            DiseaseCode::Orpha(_) => Namespace::Orpha,
            DiseaseCode::Omim(_) => Namespace::Omim,
            DiseaseCode::Other { .. } => Namespace::Other,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            DiseaseCode::Orpha(code) | DiseaseCode::Omim(code) => code,
            DiseaseCode::Other { code, .. } => code,
        }
    }

    /// Trailing digits of the code, without leading zeros.
    pub fn numeric_suffix(&self) -> Option<String> {
        let code = self.code();
        let start = code
            .char_indices()
            .rev()
            .take_while(|(_, ch)| ch.is_ascii_digit())
            .last()
            .map(|(idx, _)| idx)?;
        Some(strip_leading_zeros(&code[start..]))
    }
}

impl fmt::Display for DiseaseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiseaseCode::Orpha(code) => write!(f, "ORPHA:{code}"),
            DiseaseCode::Omim(code) => write!(f, "OMIM:{code}"),
            DiseaseCode::Other { prefix, code } => write!(f, "{prefix}:{code}"),
        }
    }
}

impl FromStr for DiseaseCode {
    type Err = LoaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(value, Namespace::Orpha)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HpoTermCode(String);

impl HpoTermCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HpoTermCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HpoTermCode {
    type Err = LoaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = HPO_CODE
            .captures(value.trim())
            .ok_or_else(|| LoaderError::InvalidHpoCode(value.to_string()))?;
        Ok(Self(format!("HP:{}", &captures[1])))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frequency {
    Term(HpoTermCode),
    Ratio { numerator: u32, denominator: u32 },
    Percent(f64),
    Raw(String),
}

impl Frequency {
    /// Coerces a free-text frequency column; blank input means no frequency.
    pub fn coerce(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(term) = trimmed.parse::<HpoTermCode>() {
            if trimmed.contains(':') || trimmed.contains('_') {
                return Some(Frequency::Term(term));
            }
        }
        if let Some(captures) = RATIO.captures(trimmed) {
            let numerator = captures[1].parse().ok();
            let denominator = captures[2].parse().ok().filter(|d: &u32| *d > 0);
            if let (Some(numerator), Some(denominator)) = (numerator, denominator) {
                return Some(Frequency::Ratio {
                    numerator,
                    denominator,
                });
            }
        }
        if let Some(captures) = PERCENT.captures(trimmed) {
            if let Ok(percent) = captures[1].parse::<f64>() {
                if percent <= 100.0 {
                    return Some(Frequency::Percent(percent));
                }
            }
        }
        Some(Frequency::Raw(trimmed.to_string()))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Term(term) => write!(f, "{term}"),
            Frequency::Ratio {
                numerator,
                denominator,
            } => write!(f, "{numerator}/{denominator}"),
            Frequency::Percent(percent) => write!(f, "{percent}%"),
            Frequency::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

pub fn normalize_evidence(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_uppercase())
}

fn numeric_code(rest: &str, original: &str) -> Result<String, LoaderError> {
    if rest.is_empty() || !rest.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(LoaderError::InvalidDiseaseCode(original.to_string()));
    }
    Ok(strip_leading_zeros(rest))
}

fn strip_leading_zeros(digits: &str) -> String {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_orpha_variants() {
        for raw in ["ORPHA:558", "Orphanet:558", "ORPHA_558", "orpha:0558", "558"] {
            let code: DiseaseCode = raw.parse().unwrap();
            assert_eq!(code, DiseaseCode::Orpha("558".to_string()), "{raw}");
        }
    }

    #[test]
    fn parse_omim_and_other() {
        let omim: DiseaseCode = "MIM:154700".parse().unwrap();
        assert_eq!(omim.to_string(), "OMIM:154700");

        let other: DiseaseCode = "decipher:12".parse().unwrap();
        assert_eq!(other.namespace(), Namespace::Other);
        assert_eq!(other.to_string(), "DECIPHER:12");
    }

    #[test]
    fn bare_number_uses_default_namespace() {
        let code = DiseaseCode::parse_with_default("154700", Namespace::Omim).unwrap();
        assert_eq!(code, DiseaseCode::Omim("154700".to_string()));
    }

    #[test]
    fn reject_non_numeric_orpha() {
        let err = "ORPHA:abc".parse::<DiseaseCode>().unwrap_err();
        assert_matches!(err, LoaderError::InvalidDiseaseCode(_));
    }

    #[test]
    fn numeric_suffix_of_other_code() {
        let code: DiseaseCode = "DECIPHER:X0042".parse().unwrap();
        assert_eq!(code.numeric_suffix().as_deref(), Some("42"));
        let code: DiseaseCode = "DECIPHER:X".parse().unwrap();
        assert_eq!(code.numeric_suffix(), None);
    }

    #[test]
    fn parse_hpo_variants() {
        for raw in ["HP:0001166", "hp:0001166", "HP_0001166", "0001166"] {
            let code: HpoTermCode = raw.parse().unwrap();
            assert_eq!(code.as_str(), "HP:0001166", "{raw}");
        }
        assert_matches!(
            "HP:123".parse::<HpoTermCode>(),
            Err(LoaderError::InvalidHpoCode(_))
        );
    }

    #[test]
    fn coerce_frequency() {
        assert_eq!(
            Frequency::coerce("HP:0040281").map(|f| f.to_string()).as_deref(),
            Some("HP:0040281")
        );
        assert_eq!(
            Frequency::coerce(" 3 / 5 ").map(|f| f.to_string()).as_deref(),
            Some("3/5")
        );
        assert_eq!(
            Frequency::coerce("40%").map(|f| f.to_string()).as_deref(),
            Some("40%")
        );
        assert_eq!(Frequency::coerce("  "), None);
        assert_matches!(Frequency::coerce("1/0"), Some(Frequency::Raw(_)));
    }
}
