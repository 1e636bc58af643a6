use thiserror::Error;

use crate::file::{BlockId, FileError};
use crate::record::RecordError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during hash file operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Bucket count must be at least 1")]
    InvalidBucketCount,

    #[error("{requested} buckets do not fit in the header block (max {max})")]
    TooManyBuckets { requested: usize, max: usize },

    #[error("Index entry points at block {block_id} but the primary file has {block_count} blocks")]
    DanglingEntry { block_id: BlockId, block_count: usize },
}

impl IndexError {
    /// Process exit code; index layer codes are 30 to 32
    pub fn exit_code(&self) -> u8 {
        match self {
            IndexError::File(e) => e.exit_code(),
            IndexError::Record(e) => e.exit_code(),
            IndexError::InvalidBucketCount => 30,
            IndexError::TooManyBuckets { .. } => 31,
            IndexError::DanglingEntry { .. } => 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileKind;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_distinct_across_layers() {
        let errors = vec![
            IndexError::File(FileError::PoolActive),
            IndexError::File(FileError::PoolInactive),
            IndexError::File(FileError::PinnedBlocks { handle: 0, pinned: 2 }),
            IndexError::File(FileError::BlockNotPinned { handle: 0, block_id: 1 }),
            IndexError::File(FileError::InvalidConfig("capacity".into())),
            IndexError::Record(RecordError::FormatMismatch {
                expected: FileKind::HashTable,
                found: "Heap file".into(),
            }),
            IndexError::Record(RecordError::InvalidRecord("name".into())),
            IndexError::Record(RecordError::Deserialization("count".into())),
            IndexError::Record(RecordError::CorruptChain(2)),
            IndexError::InvalidBucketCount,
            IndexError::TooManyBuckets { requested: 200, max: 117 },
            IndexError::DanglingEntry { block_id: 9, block_count: 1 },
        ];
        let codes: HashSet<u8> = errors.iter().map(IndexError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_wrapped_file_errors_keep_their_code() {
        let direct = IndexError::File(FileError::TooManyOpenFiles);
        let nested = IndexError::Record(RecordError::File(FileError::TooManyOpenFiles));
        assert_eq!(direct.exit_code(), 1);
        assert_eq!(nested.exit_code(), 1);
    }
}
