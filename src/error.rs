use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("invalid disease code: {0}")]
    InvalidDiseaseCode(String),

    #[error("invalid HPO term code: {0}")]
    InvalidHpoCode(String),

    #[error("missing config file rarekb.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot connect to source store: {0}")]
    SourceConnect(String),

    #[error("source query failed: {0}")]
    SourceQuery(String),

    #[error("failed to read source file {path}: {message}")]
    SourceRead { path: String, message: String },

    #[error("cannot open destination store: {0}")]
    DestinationOpen(String),

    #[error("destination store error: {0}")]
    Destination(String),

    #[error("{dataset} source has no column for `{field}` (tried: {candidates})")]
    #[diagnostic(help("add the column name to the `fields` section of rarekb.json"))]
    MissingColumn {
        dataset: String,
        field: String,
        candidates: String,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Failure of a single destination write; reported as a value, never panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error("record already present")]
    Duplicate,

    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("destination unavailable: {0}")]
    Unavailable(String),
}
