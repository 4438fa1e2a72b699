use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Namespace;
use crate::error::LoaderError;
use crate::fields::FieldMap;
use crate::loader::RetryPolicy;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PROGRESS_EVERY: usize = 5000;
pub const DEFAULT_ASSOCIATIONS_QUERY: &str =
    "SELECT hpo_id, disease_id, evidence, frequency FROM hpo_disease_annotation ORDER BY id";
pub const DEFAULT_CROSS_REFERENCES_QUERY: &str =
    "SELECT omim_code, orpha_code FROM orpha_omim_mapping";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    #[serde(default, alias = "batchSize")]
    pub batch_size: Option<usize>,
    #[serde(default, alias = "progressEvery")]
    pub progress_every: Option<usize>,
    #[serde(default)]
    pub default_namespace: Option<Namespace>,
    #[serde(default)]
    pub numeric_fallback: Option<bool>,
    #[serde(default)]
    pub create_placeholders: Option<bool>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub fields: Option<FieldMap>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Mysql(MysqlSourceConfig),
    Tsv(TsvSourceConfig),
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MysqlSourceConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub associations_query: Option<String>,
    #[serde(default)]
    pub cross_references_query: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TsvSourceConfig {
    pub associations: Utf8PathBuf,
    #[serde(default)]
    pub cross_references: Option<Utf8PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DestinationConfig {
    pub path: Utf8PathBuf,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl ConnectionSettings {
    /// Connection target for logs; never includes the password.
    pub fn display_target(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSettings {
    Mysql {
        connection: ConnectionSettings,
        associations_query: String,
        cross_references_query: String,
    },
    Tsv {
        associations: Utf8PathBuf,
        cross_references: Option<Utf8PathBuf>,
    },
}

impl SourceSettings {
    pub fn describe(&self) -> String {
        match self {
            SourceSettings::Mysql { connection, .. } => connection.display_target(),
            SourceSettings::Tsv { associations, .. } => format!("tsv:{associations}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub source: SourceSettings,
    pub destination: Utf8PathBuf,
    pub batch_size: usize,
    pub progress_every: usize,
    pub default_namespace: Namespace,
    pub numeric_fallback: bool,
    pub create_placeholders: bool,
    pub retry: RetryPolicy,
    pub fields: FieldMap,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LoaderError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("rarekb.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(LoaderError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LoaderError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LoaderError::ConfigParse(err.to_string()))?;

        Self::resolve_config_with_env(config, |key| std::env::var(key).ok())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LoaderError> {
        Self::resolve_config_with_env(config, |_| None)
    }

    /// Resolves defaults, then applies `RAREKB_*` overrides read through `env`.
    pub fn resolve_config_with_env<F>(
        config: Config,
        env: F,
    ) -> Result<ResolvedConfig, LoaderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let schema_version = config.schema_version.unwrap_or(1);

        let source = match config.source {
            SourceConfig::Mysql(mysql) => {
                let port = match env("RAREKB_PORT") {
                    Some(value) => value.trim().parse::<u16>().map_err(|_| {
                        LoaderError::InvalidConfig(format!("RAREKB_PORT is not a port: {value}"))
                    })?,
                    None => mysql.port.unwrap_or(3306),
                };
                let connection = ConnectionSettings {
                    host: env("RAREKB_HOST")
                        .or(mysql.host)
                        .unwrap_or_else(|| "127.0.0.1".to_string()),
                    port,
                    user: env("RAREKB_USER")
                        .or(mysql.user)
                        .unwrap_or_else(|| "root".to_string()),
                    password: env("RAREKB_PASSWORD").or(mysql.password),
                    database: env("RAREKB_DATABASE")
                        .or(mysql.database)
                        .unwrap_or_else(|| "rarekb".to_string()),
                };
                SourceSettings::Mysql {
                    connection,
                    associations_query: mysql
                        .associations_query
                        .unwrap_or_else(|| DEFAULT_ASSOCIATIONS_QUERY.to_string()),
                    cross_references_query: mysql
                        .cross_references_query
                        .unwrap_or_else(|| DEFAULT_CROSS_REFERENCES_QUERY.to_string()),
                }
            }
            SourceConfig::Tsv(tsv) => SourceSettings::Tsv {
                associations: tsv.associations,
                cross_references: tsv.cross_references,
            },
        };

        let batch_size = match env("RAREKB_BATCH_SIZE") {
            Some(value) => value.trim().parse::<usize>().map_err(|_| {
                LoaderError::InvalidConfig(format!("RAREKB_BATCH_SIZE is not a number: {value}"))
            })?,
            None => config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        };
        if batch_size == 0 {
            return Err(LoaderError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let progress_every = config.progress_every.unwrap_or(DEFAULT_PROGRESS_EVERY);
        if progress_every == 0 {
            return Err(LoaderError::InvalidConfig(
                "progress_every must be at least 1".to_string(),
            ));
        }

        let default_namespace = config.default_namespace.unwrap_or(Namespace::Orpha);
        if !matches!(default_namespace, Namespace::Orpha | Namespace::Omim) {
            return Err(LoaderError::InvalidConfig(format!(
                "default_namespace must be orpha or omim, got {default_namespace}"
            )));
        }

        let retry = config
            .retry
            .map(|retry| RetryPolicy {
                attempts: retry.attempts,
                backoff: Duration::from_millis(retry.backoff_ms),
            })
            .unwrap_or_default();

        Ok(ResolvedConfig {
            schema_version,
            source,
            destination: config.destination.path,
            batch_size,
            progress_every,
            default_namespace,
            numeric_fallback: config.numeric_fallback.unwrap_or(false),
            create_placeholders: config.create_placeholders.unwrap_or(false),
            retry,
            fields: config.fields.unwrap_or_default(),
        })
    }
}
