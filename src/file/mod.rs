mod buffer_manager;
mod config;
mod error;
mod file_manager;

pub use buffer_manager::{BlockRef, BufferManager};
pub use config::{BufferConfig, ReplacementPolicy};
pub use error::{FileError, FileResult};
pub use file_manager::{BlockFileManager, FileHandle};

/// Block size in bytes
pub const BLOCK_SIZE: usize = 512;

/// Default number of blocks held by the buffer pool
pub const BUFFER_POOL_SIZE: usize = 100;

/// Default limit on simultaneously open files
pub const MAX_OPEN_FILES: usize = 100;

/// Block index within a file
pub type BlockId = usize;
