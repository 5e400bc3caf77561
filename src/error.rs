use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write auto-login credential: {0}")]
    CredentialWrite(String),

    #[error("Process control failed: {0}")]
    ProcessControl(#[from] ProcessError),

    #[error("Settings store error: {0}")]
    Settings(#[from] rusqlite::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the process-control primitives. None of these abort a switch.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{0} is not running")]
    NotRunning(String),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },

    #[error("Failed to query process table: {0}")]
    Query(String),

    #[error("Process task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Unrecoverable KeyValues syntax. Recovered inside the parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}
