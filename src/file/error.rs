use std::io;
use thiserror::Error;

use super::BlockId;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("File is still open: {0}")]
    FileInUse(String),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Invalid block number {block_id}: file has {block_count} blocks")]
    InvalidBlockNumber { block_id: BlockId, block_count: usize },

    #[error("Buffer pool is full: every frame is pinned")]
    BufferPoolFull,

    #[error("File handle limit reached")]
    TooManyOpenFiles,

    #[error("Cannot close file {handle}: {pinned} block(s) still pinned")]
    PinnedBlocks { handle: usize, pinned: usize },

    #[error("Block {block_id} of file {handle} is not pinned")]
    BlockNotPinned { handle: usize, block_id: BlockId },

    #[error("Buffer pool is already active")]
    PoolActive,

    #[error("Buffer pool is not active")]
    PoolInactive,

    #[error("Invalid block size: expected {expected}, got {actual}")]
    InvalidBlockSize { expected: usize, actual: usize },

    #[error("Invalid buffer configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl FileError {
    /// Process exit code for this failure. Block layer codes are 1 to 15.
    pub fn exit_code(&self) -> u8 {
        match self {
            FileError::TooManyOpenFiles => 1,
            FileError::InvalidHandle(_) => 2,
            FileError::PoolActive => 3,
            FileError::FileAlreadyExists(_) => 4,
            FileError::BufferPoolFull => 5,
            FileError::InvalidBlockNumber { .. } => 6,
            FileError::PinnedBlocks { .. } => 7,
            FileError::Io(_) => 8,
            FileError::FileNotFound(_) => 9,
            FileError::FileInUse(_) => 10,
            FileError::PoolInactive => 11,
            FileError::BlockNotPinned { .. } => 12,
            FileError::InvalidBlockSize { .. } => 13,
            FileError::InvalidConfig(_) => 14,
            FileError::Config(_) => 15,
        }
    }
}

pub type FileResult<T> = Result<T, FileError>;
