use std::fs::File;
use std::io::{BufReader, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::error::LoaderError;
use crate::fields::{FieldValue, SourceRow, SourceTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Associations,
    CrossReferences,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Associations => "associations",
            Dataset::CrossReferences => "cross_references",
        }
    }
}

/// Row-returning side of a run. Results are fully materialised, in source order.
pub trait SourceStore {
    fn fetch(&mut self, dataset: Dataset) -> Result<SourceTable, LoaderError>;
}

/// Tab-separated annotation files (`phenotype.hpoa` style), optionally gzipped.
#[derive(Debug, Clone)]
pub struct TsvSource {
    associations: Utf8PathBuf,
    cross_references: Option<Utf8PathBuf>,
}

impl TsvSource {
    pub fn new(associations: Utf8PathBuf, cross_references: Option<Utf8PathBuf>) -> Self {
        Self {
            associations,
            cross_references,
        }
    }
}

impl SourceStore for TsvSource {
    fn fetch(&mut self, dataset: Dataset) -> Result<SourceTable, LoaderError> {
        match dataset {
            Dataset::Associations => read_tsv(&self.associations),
            Dataset::CrossReferences => match &self.cross_references {
                Some(path) => read_tsv(path),
                None => Ok(SourceTable::default()),
            },
        }
    }
}

pub fn read_tsv(path: &Utf8Path) -> Result<SourceTable, LoaderError> {
    let read_err = |message: String| LoaderError::SourceRead {
        path: path.to_string(),
        message,
    };
    let file = File::open(path.as_std_path()).map_err(|err| read_err(err.to_string()))?;
    let reader: Box<dyn Read> = if path.extension() == Some("gz") {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let table = parse_tsv(reader).map_err(|err| read_err(err.to_string()))?;
    debug!(path = %path, rows = table.len(), "read tsv source");
    Ok(table)
}

pub fn parse_tsv<R: Read>(reader: R) -> Result<SourceTable, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .quoting(false)
        .flexible(true)
        .from_reader(reader);

    let columns = reader
        .headers()?
        .iter()
        .map(|name| name.trim().to_string())
        .collect::<Vec<_>>();
    let mut table = SourceTable::new(columns);

    for record in reader.records() {
        let record = record?;
        let mut row = SourceRow::new();
        for (column, value) in table.columns.iter().zip(record.iter()) {
            row.insert(column, FieldValue::Text(value.to_string()));
        }
        table.rows.push(row);
    }
    Ok(table)
}
