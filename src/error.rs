use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::source::SourceError;
use crate::store::StoreError;

/// Exit code for a run that never started processing
pub const EXIT_STARTUP: u8 = 1;
/// Exit code for a run aborted after it started writing (rejected batch, or
/// a source read failing between steps of a multi-step plan)
pub const EXIT_FLUSH: u8 = 2;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("cannot open document store: {0}")]
    Connect(#[source] StoreError),

    #[error("cannot open sqlite database {path}: {source}")]
    Database {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    #[error("cannot read confirmation: {0}")]
    Confirm(#[source] io::Error),

    #[error("cannot read source data: {0}")]
    Source(#[from] SourceError),

    #[error("cannot read document store: {0}")]
    Read(#[source] StoreError),

    #[error("aborted at step [{step}] after {completed} completed step(s): {source}")]
    Interrupted {
        step: String,
        completed: usize,
        #[source]
        source: SourceError,
    },

    #[error("[{label}] batch #{batch} with {} documents was rejected: {source}", .documents.len())]
    Flush {
        label: String,
        batch: usize,
        documents: Vec<String>,
        #[source]
        source: StoreError,
    },
}

impl MigrateError {
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Flush { .. } | MigrateError::Interrupted { .. } => EXIT_FLUSH,
            _ => EXIT_STARTUP,
        }
    }
}
