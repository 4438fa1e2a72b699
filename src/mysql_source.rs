use mysql::prelude::Queryable;
use mysql::{Opts, OptsBuilder, Params, Pool, PooledConn, Row, Value as MyValue};
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::error::LoaderError;
use crate::fields::{FieldValue, SourceRow, SourceTable};
use crate::source::{Dataset, SourceStore};

/// Relational source reached over a single MySQL connection.
pub struct MysqlSource {
    conn: PooledConn,
    associations_query: String,
    cross_references_query: String,
}

impl std::fmt::Debug for MysqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlSource").finish()
    }
}

impl MysqlSource {
    pub fn connect(
        settings: &ConnectionSettings,
        associations_query: String,
        cross_references_query: String,
    ) -> Result<Self, LoaderError> {
        let builder = OptsBuilder::new()
            .ip_or_hostname(Some(settings.host.clone()))
            .tcp_port(settings.port)
            .user(Some(settings.user.clone()))
            .pass(settings.password.clone())
            .db_name(Some(settings.database.clone()));
        let pool = Pool::new(Opts::from(builder)).map_err(|err| {
            LoaderError::SourceConnect(format!("{}: {err}", settings.display_target()))
        })?;
        let conn = pool.get_conn().map_err(|err| {
            LoaderError::SourceConnect(format!("{}: {err}", settings.display_target()))
        })?;
        info!(target = %settings.display_target(), "connected to source");
        Ok(Self {
            conn,
            associations_query,
            cross_references_query,
        })
    }

    /// Runs a parameterised row-returning query.
    pub fn query(&mut self, sql: &str, params: Params) -> Result<SourceTable, LoaderError> {
        let rows: Vec<Row> = self
            .conn
            .exec(sql, params)
            .map_err(|err| LoaderError::SourceQuery(err.to_string()))?;
        Ok(rows_to_table(rows))
    }
}

impl SourceStore for MysqlSource {
    fn fetch(&mut self, dataset: Dataset) -> Result<SourceTable, LoaderError> {
        let sql = match dataset {
            Dataset::Associations => self.associations_query.clone(),
            Dataset::CrossReferences => self.cross_references_query.clone(),
        };
        let table = self.query(&sql, Params::Empty)?;
        debug!(dataset = dataset.name(), rows = table.len(), "fetched source rows");
        Ok(table)
    }
}

fn rows_to_table(rows: Vec<Row>) -> SourceTable {
    let columns = rows
        .first()
        .map(|row| {
            row.columns_ref()
                .iter()
                .map(|column| column.name_str().into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let mut table = SourceTable::new(columns);
    for row in rows {
        let mut source_row = SourceRow::new();
        for (idx, column) in table.columns.iter().enumerate() {
            let value = row.as_ref(idx).map(convert_value).unwrap_or(FieldValue::Null);
            source_row.insert(column, value);
        }
        table.rows.push(source_row);
    }
    table
}

pub fn convert_value(value: &MyValue) -> FieldValue {
    match value {
        MyValue::NULL => FieldValue::Null,
        MyValue::Int(value) => FieldValue::Int(*value),
        MyValue::UInt(value) => match i64::try_from(*value) {
            Ok(value) => FieldValue::Int(value),
            Err(_) => FieldValue::Text(value.to_string()),
        },
        MyValue::Bytes(bytes) => FieldValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        MyValue::Float(value) => FieldValue::Text(value.to_string()),
        MyValue::Double(value) => FieldValue::Text(value.to_string()),
        other => FieldValue::Text(other.as_sql(true).trim_matches('\'').to_string()),
    }
}
