pub mod app;
pub mod config;
pub mod destination;
pub mod domain;
pub mod error;
pub mod fields;
pub mod loader;
pub mod mysql_source;
pub mod output;
pub mod reconcile;
pub mod report;
pub mod source;
