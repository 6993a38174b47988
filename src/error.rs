use std::path::PathBuf;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("a mod from {path} version {version} is already active")]
    DuplicateMod { path: PathBuf, version: String },

    #[error("unknown mod key: {0}")]
    UnknownMod(String),

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("failed to create link at {path}: {reason}")]
    LinkCreationFailed { path: PathBuf, reason: String },

    #[error("failed to remove link at {path}: destination content diverged")]
    LinkRemovalFailed { path: PathBuf },

    #[error("staged source missing: {path}")]
    StagingCorrupt { path: PathBuf },

    #[error("ledger io: {0}")]
    LedgerIo(String),

    #[error("ledger is locked by another process")]
    LedgerBusy,

    #[error("transaction aborted: {0}")]
    TransactionAborted(Box<CoreError>),

    #[error("operation cancelled, no changes made")]
    Cancelled,
}

impl CoreError {
    pub fn aborted(cause: CoreError) -> Self {
        match cause {
            already @ CoreError::TransactionAborted(_) => already,
            cancelled @ CoreError::Cancelled => cancelled,
            other => CoreError::TransactionAborted(Box::new(other)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::LedgerIo(err.to_string())
    }
}
