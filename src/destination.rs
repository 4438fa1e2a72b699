use camino::Utf8Path;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::domain::DiseaseCode;
use crate::error::{InsertError, LoaderError};

/// Disease row as stored in the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiseaseRecord {
    pub id: i64,
    pub orpha_code: Option<String>,
    /// External code a placeholder disease was created for.
    pub placeholder_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpoTermRecord {
    pub id: i64,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Association {
    pub hpo_term_id: i64,
    pub disease_id: i64,
    pub evidence: Option<String>,
    pub frequency: Option<String>,
}

pub trait DestinationStore {
    fn load_diseases(&self) -> Result<Vec<DiseaseRecord>, LoaderError>;
    fn load_hpo_terms(&self) -> Result<Vec<HpoTermRecord>, LoaderError>;
    /// Writes every record or none of them.
    fn bulk_insert(&mut self, records: &[Association]) -> Result<(), InsertError>;
    fn insert_one(&mut self, record: &Association) -> Result<(), InsertError>;
    fn create_placeholder(&mut self, code: &DiseaseCode) -> Result<i64, InsertError>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS disease (
        id INTEGER PRIMARY KEY,
        orpha_code TEXT UNIQUE,
        name TEXT,
        is_virtual INTEGER NOT NULL DEFAULT 0,
        placeholder_code TEXT UNIQUE
    );
    CREATE TABLE IF NOT EXISTS hpo_term (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT
    );
    CREATE TABLE IF NOT EXISTS disease_phenotype (
        id INTEGER PRIMARY KEY,
        hpo_term_id INTEGER NOT NULL REFERENCES hpo_term(id),
        disease_id INTEGER NOT NULL REFERENCES disease(id),
        evidence TEXT,
        frequency TEXT,
        UNIQUE (hpo_term_id, disease_id)
    );
";

const INSERT_ASSOCIATION: &str = "
    INSERT INTO disease_phenotype (hpo_term_id, disease_id, evidence, frequency)
    VALUES (?1, ?2, ?3, ?4)
";

#[derive(Debug)]
pub struct SqliteDestination {
    conn: Connection,
}

impl SqliteDestination {
    pub fn open(path: &Utf8Path) -> Result<Self, LoaderError> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
            }
        }
        let conn = Connection::open(path.as_std_path())
            .map_err(|err| LoaderError::DestinationOpen(format!("{path}: {err}")))?;
        Self::from_connection(conn)
    }

    /// Opens an existing destination without write access; never creates the file.
    pub fn open_read_only(path: &Utf8Path) -> Result<Self, LoaderError> {
        let conn = Connection::open_with_flags(
            path.as_std_path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| LoaderError::DestinationOpen(format!("{path}: {err}")))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, LoaderError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| LoaderError::DestinationOpen(err.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LoaderError> {
        conn.pragma_update(None, "foreign_keys", 1)
            .map_err(|err| LoaderError::DestinationOpen(err.to_string()))?;
        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> Result<(), LoaderError> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|err| LoaderError::Destination(format!("create schema: {err}")))
    }

    pub fn add_disease(&self, orpha_code: &str, name: Option<&str>) -> Result<i64, LoaderError> {
        self.conn
            .execute(
                "INSERT INTO disease (orpha_code, name) VALUES (?1, ?2)",
                params![orpha_code, name],
            )
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_hpo_term(&self, code: &str, name: Option<&str>) -> Result<i64, LoaderError> {
        self.conn
            .execute(
                "INSERT INTO hpo_term (code, name) VALUES (?1, ?2)",
                params![code, name],
            )
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count_associations(&self) -> Result<u64, LoaderError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM disease_phenotype", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|count| count as u64)
            .map_err(|err| LoaderError::Destination(err.to_string()))
    }

    pub fn associations(&self) -> Result<Vec<Association>, LoaderError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT hpo_term_id, disease_id, evidence, frequency
                 FROM disease_phenotype ORDER BY hpo_term_id, disease_id",
            )
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Association {
                    hpo_term_id: row.get(0)?,
                    disease_id: row.get(1)?,
                    evidence: row.get(2)?,
                    frequency: row.get(3)?,
                })
            })
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| LoaderError::Destination(err.to_string()))
    }

    pub fn close(self) -> Result<(), LoaderError> {
        self.conn
            .close()
            .map_err(|(_, err)| LoaderError::Destination(format!("close: {err}")))
    }
}

impl DestinationStore for SqliteDestination {
    fn load_diseases(&self) -> Result<Vec<DiseaseRecord>, LoaderError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, orpha_code, placeholder_code FROM disease")
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DiseaseRecord {
                    id: row.get(0)?,
                    orpha_code: row.get(1)?,
                    placeholder_code: row.get(2)?,
                })
            })
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| LoaderError::Destination(err.to_string()))
    }

    fn load_hpo_terms(&self) -> Result<Vec<HpoTermRecord>, LoaderError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code FROM hpo_term")
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(HpoTermRecord {
                    id: row.get(0)?,
                    code: row.get(1)?,
                })
            })
            .map_err(|err| LoaderError::Destination(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| LoaderError::Destination(err.to_string()))
    }

    fn bulk_insert(&mut self, records: &[Association]) -> Result<(), InsertError> {
        let tx = self.conn.transaction().map_err(classify)?;
        {
            let mut stmt = tx.prepare_cached(INSERT_ASSOCIATION).map_err(classify)?;
            for record in records {
                stmt.execute(params![
                    record.hpo_term_id,
                    record.disease_id,
                    record.evidence,
                    record.frequency
                ])
                .map_err(classify)?;
            }
        }
        tx.commit().map_err(classify)
    }

    fn insert_one(&mut self, record: &Association) -> Result<(), InsertError> {
        self.conn
            .execute(
                INSERT_ASSOCIATION,
                params![
                    record.hpo_term_id,
                    record.disease_id,
                    record.evidence,
                    record.frequency
                ],
            )
            .map(|_| ())
            .map_err(classify)
    }

    fn create_placeholder(&mut self, code: &DiseaseCode) -> Result<i64, InsertError> {
        let key = code.to_string();
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM disease WHERE placeholder_code = ?1",
                [&key],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify)?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn
            .execute(
                "INSERT INTO disease (name, is_virtual, placeholder_code) VALUES (?1, 1, ?2)",
                params![format!("Unmapped disease {key}"), key],
            )
            .map_err(classify)?;
        let id = self.conn.last_insert_rowid();
        debug!(code = %key, id, "created placeholder disease");
        Ok(id)
    }
}

fn classify(err: rusqlite::Error) -> InsertError {
    if let Some(sqlite) = err.sqlite_error() {
        match sqlite.code {
            ErrorCode::ConstraintViolation
                if matches!(
                    sqlite.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
            {
                return InsertError::Duplicate;
            }
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure => return InsertError::Unavailable(err.to_string()),
            _ => {}
        }
    }
    InsertError::Rejected(err.to_string())
}
