pub mod file;
pub mod index;
pub mod record;

pub use file::{
    BLOCK_SIZE, BUFFER_POOL_SIZE, BlockFileManager, BlockId, BlockRef, BufferConfig,
    BufferManager, FileError, FileHandle, FileResult, ReplacementPolicy,
};
pub use index::{
    HashStatistics, HashTable, IndexError, IndexResult, SecondaryEntry, SecondaryIndex,
};
pub use record::{
    FileKind, HeapFile, LookupResult, Record, RecordError, RecordGenerator, RecordResult,
};
