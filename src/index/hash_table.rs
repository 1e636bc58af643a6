use std::path::Path;

use super::error::IndexResult;
use super::hash_file::{HashFile, HashSchema};
use crate::file::{BlockId, BufferManager, FileHandle};
use crate::record::layout::HashHeader;
use crate::record::{ChainBlock, FileKind, LookupResult, Record};

/// Records hashed on their integer id
pub struct PrimaryKey;

impl HashSchema for PrimaryKey {
    const KIND: FileKind = FileKind::HashTable;

    type Key = i32;
    type Entry = Record;

    fn hash_key(key: &i32, bucket_count: usize) -> usize {
        // rem_euclid keeps negative keys in range
        key.rem_euclid(bucket_count as i32) as usize
    }

    fn hash_entry(entry: &Record, bucket_count: usize) -> usize {
        Self::hash_key(&entry.id(), bucket_count)
    }

    fn matches(entry: &Record, key: &i32) -> bool {
        entry.id() == *key
    }
}

/// Static hash table of full records keyed by `Record::id`
pub struct HashTable {
    inner: HashFile<PrimaryKey>,
}

impl HashTable {
    /// Create a table with a fixed number of buckets
    pub fn create<P: AsRef<Path>>(
        buffer: &mut BufferManager,
        path: P,
        bucket_count: usize,
    ) -> IndexResult<()> {
        HashFile::<PrimaryKey>::create(buffer, path, bucket_count)
    }

    pub fn open<P: AsRef<Path>>(buffer: &mut BufferManager, path: P) -> IndexResult<Self> {
        Ok(Self {
            inner: HashFile::open(buffer, path)?,
        })
    }

    pub fn close(self, buffer: &mut BufferManager) -> IndexResult<()> {
        self.inner.close(buffer)
    }

    pub fn file(&self) -> FileHandle {
        self.inner.file()
    }

    pub fn header(&self) -> &HashHeader {
        self.inner.header()
    }

    pub fn bucket_count(&self) -> usize {
        self.inner.bucket_count()
    }

    pub fn bucket_of(&self, key: i32) -> usize {
        self.inner.bucket_of(&key)
    }

    /// Insert a record and return the id of the block it was written to
    pub fn insert(&mut self, buffer: &mut BufferManager, record: &Record) -> IndexResult<BlockId> {
        self.inner.put(buffer, record)
    }

    /// Every record with `key`, and the number of blocks read to find them
    pub fn lookup(&self, buffer: &mut BufferManager, key: i32) -> IndexResult<LookupResult> {
        let scan = self.inner.find(buffer, &key)?;
        Ok(LookupResult {
            blocks_visited: scan.blocks_visited,
            records: scan.entries,
        })
    }

    /// Read one block of the table, e.g. one referenced by a secondary index
    pub fn read_block(
        &self,
        buffer: &mut BufferManager,
        block_id: BlockId,
    ) -> IndexResult<ChainBlock> {
        self.inner.read_block(buffer, block_id)
    }

    pub fn as_hash_file(&self) -> &HashFile<PrimaryKey> {
        &self.inner
    }
}
