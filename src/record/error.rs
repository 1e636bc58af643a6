use crate::file::{BlockId, FileError};
use thiserror::Error;

use super::layout::FileKind;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Not a {expected} (block 0 starts with {found:?})")]
    FormatMismatch { expected: FileKind, found: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Block chain loops back to block {0}")]
    CorruptChain(BlockId),
}

impl RecordError {
    /// Process exit code; record layer codes are 20 to 23
    pub fn exit_code(&self) -> u8 {
        match self {
            RecordError::File(e) => e.exit_code(),
            RecordError::FormatMismatch { .. } => 20,
            RecordError::InvalidRecord(_) => 21,
            RecordError::Deserialization(_) => 22,
            RecordError::CorruptChain(_) => 23,
        }
    }
}

pub type RecordResult<T> = Result<T, RecordError>;
