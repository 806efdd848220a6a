use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{LogIndex, ResponseKind, TermIndex};

pub type FlushResult<T> = Result<T, FlushError>;

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("heed error: {0}")]
    Heed(#[from] heed::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("invalid configuration: {field} must be at least {min}, got {value}")]
    InvalidConfiguration {
        field: &'static str,
        min: usize,
        value: usize,
    },

    #[error("invalid configuration: {reason}")]
    MissingHook { reason: &'static str },

    #[error("response kind mismatch (expected {expected:?}, found {found:?})")]
    UnexpectedResponseKind {
        expected: ResponseKind,
        found: ResponseKind,
    },

    #[error("log index {index} must be greater than last accepted index {last}")]
    IndexNotIncreasing { index: LogIndex, last: LogIndex },

    #[error("commit failure at {at}: {reason}")]
    CommitFailure { at: TermIndex, reason: String },

    #[error("checkpoint already exists at {path:?}")]
    CheckpointExists { path: PathBuf },

    #[error("checkpoint label {label:?} must be a single plain path component")]
    InvalidCheckpointLabel { label: String },

    #[error("commit run is empty or malformed")]
    EmptyRun,

    #[error("double buffer is closed")]
    BufferClosed,

}

impl FlushError {
    /// Returns true for failures worth retrying with a fresh batch.
    ///
    /// Everything else escalates straight to a fatal commit failure.
    pub fn is_transient(&self) -> bool {
        match self {
            FlushError::Io(err) => matches!(
                err.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ),
            FlushError::Heed(heed::Error::Io(err)) => matches!(
                err.kind(),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
            ),
            FlushError::Heed(heed::Error::Mdb(mdb)) => matches!(
                mdb,
                heed::MdbError::ReadersFull | heed::MdbError::TxnFull
            ),
            _ => false,
        }
    }
}
