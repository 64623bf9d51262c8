use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("cannot read spreadsheet {}: {reason}", .path.display())]
    FatalInput { path: PathBuf, reason: String },

    #[error("cannot write {}: {reason}", .path.display())]
    WriteFailure { path: PathBuf, reason: String },

    #[error("config error: {0}")]
    Config(String),
}

impl MatchError {
    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        MatchError::WriteFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn input(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        MatchError::FatalInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Why a single row ended up not found. Never aborts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowFailure {
    #[error("date '{0}' could not be parsed")]
    InvalidDate(String),

    #[error("amount '{0}' could not be parsed")]
    InvalidAmount(String),

    #[error("no receipt at {}", .0.display())]
    MissingDocument(PathBuf),

    #[error("receipt {} is unreadable: {reason}", .path.display())]
    UnreadableDocument { path: PathBuf, reason: String },

    #[error("{key} not found in {}", .path.display())]
    NoPageMatch { path: PathBuf, key: String },
}
