//! Core configuration and bootstrap.
//!
//! # Responsibility
//! - Deserialize `CoreConfig` from JSON with defaults for every field.
//! - Bring up logging and the database from one configuration value.
//!
//! # Invariants
//! - Configuration is validated before anything is initialized.
//! - `completion_policy.min_documents` defaults to 1.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::{default_log_level, init_logging, normalize_level, LoggingConfig, LoggingError};
use crate::model::attachment::AttachmentType;
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Minimum live documents required before a PPA may be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionPolicy {
    pub min_documents: u32,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self { min_documents: 1 }
    }
}

impl CompletionPolicy {
    /// Attachment type counted by this policy.
    pub fn required_type(&self) -> AttachmentType {
        AttachmentType::Document
    }

    pub fn is_satisfied_by(&self, live_documents: u64) -> bool {
        live_documents >= u64::from(self.min_documents)
    }
}

/// Process-level configuration for the PPA core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub log_level: String,
    /// Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    /// In-memory database when unset.
    pub db_path: Option<PathBuf>,
    pub completion_policy: CompletionPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            db_path: None,
            completion_policy: CompletionPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl CoreConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.log_level).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Logger settings, or `None` when no directory is configured.
    pub fn logging(&self) -> Option<LoggingConfig> {
        self.log_dir
            .as_ref()
            .map(|dir| LoggingConfig::new(self.log_level.clone(), dir.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Validates `config`, starts logging when configured and opens the
/// migrated database.
pub fn bootstrap(config: &CoreConfig) -> Result<Connection, BootstrapError> {
    config.validate()?;
    if let Some(logging) = config.logging() {
        init_logging(&logging)?;
    }

    let conn = match &config.db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    info!(
        "event=bootstrap module=config status=ok db={} min_documents={}",
        if config.db_path.is_some() { "file" } else { "memory" },
        config.completion_policy.min_documents
    );
    Ok(conn)
}
