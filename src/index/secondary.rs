use log::debug;
use std::path::Path;

use super::error::{IndexError, IndexResult};
use super::hash_file::{HashFile, HashSchema};
use super::hash_table::HashTable;
use crate::file::{BlockId, BufferManager, FileHandle};
use crate::record::layout::{
    HashHeader, check_str_len, decode_str, encode_str, read_i32, write_i32,
};
use crate::record::{
    BlockEntry, FileKind, LookupResult, NAME_LEN, Record, RecordError, RecordResult,
};

/// A name and the primary-file block holding a record with that name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryEntry {
    pub name: String,
    pub block_id: BlockId,
}

impl SecondaryEntry {
    pub fn new(name: impl Into<String>, block_id: BlockId) -> RecordResult<Self> {
        let name = name.into();
        check_str_len("name", &name, NAME_LEN)?;
        Ok(Self { name, block_id })
    }
}

impl BlockEntry for SecondaryEntry {
    const SIZE: usize = NAME_LEN + 4;

    fn encode(&self, buf: &mut [u8]) {
        encode_str(&mut buf[..NAME_LEN], &self.name);
        write_i32(buf, NAME_LEN, self.block_id as i32);
    }

    fn decode(buf: &[u8]) -> RecordResult<Self> {
        let raw = read_i32(buf, NAME_LEN);
        let block_id = usize::try_from(raw).map_err(|_| {
            RecordError::Deserialization(format!("negative primary block id {}", raw))
        })?;
        Ok(Self {
            name: decode_str(&buf[..NAME_LEN])?,
            block_id,
        })
    }
}

/// Entries hashed on the byte sum of the name
pub struct SecondaryKey;

impl HashSchema for SecondaryKey {
    const KIND: FileKind = FileKind::SecondaryIndex;

    type Key = str;
    type Entry = SecondaryEntry;

    fn hash_key(key: &str, bucket_count: usize) -> usize {
        key.bytes().map(usize::from).sum::<usize>() % bucket_count
    }

    fn hash_entry(entry: &SecondaryEntry, bucket_count: usize) -> usize {
        Self::hash_key(&entry.name, bucket_count)
    }

    fn matches(entry: &SecondaryEntry, key: &str) -> bool {
        entry.name == key
    }
}

/// Static hash index from record names to primary hash table blocks
pub struct SecondaryIndex {
    inner: HashFile<SecondaryKey>,
}

impl SecondaryIndex {
    /// Create an index over the hash table at `primary_path`.
    ///
    /// The primary file must already exist and be a hash table. It may be
    /// open at the same time.
    pub fn create<P: AsRef<Path>, Q: AsRef<Path>>(
        buffer: &mut BufferManager,
        path: P,
        bucket_count: usize,
        primary_path: Q,
    ) -> IndexResult<()> {
        let primary = buffer.open_file(primary_path)?;
        let checked = buffer.with_block(primary, 0, |data| FileKind::HashTable.check(data));
        buffer.close_file(primary)?;
        checked?;
        HashFile::<SecondaryKey>::create(buffer, path, bucket_count)
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

    pub fn bucket_of(&self, name: &str) -> usize {
        self.inner.bucket_of(name)
    }

    /// Index `record`, which was stored in `primary_block_id` of the primary file
    pub fn insert_entry(
        &mut self,
        buffer: &mut BufferManager,
        record: &Record,
        primary_block_id: BlockId,
    ) -> IndexResult<BlockId> {
        let entry = SecondaryEntry::new(record.name(), primary_block_id)?;
        self.inner.put(buffer, &entry)
    }

    /// Every primary record named `name`.
    ///
    /// Each referenced primary block is read at most once, however many index
    /// entries point at it. `blocks_visited` counts index and primary blocks.
    pub fn lookup_by_name(
        &self,
        buffer: &mut BufferManager,
        primary: &HashTable,
        name: &str,
    ) -> IndexResult<LookupResult> {
        let block_count = buffer.block_count(primary.file())?;
        let mut seen = vec![false; block_count];
        let mut result = LookupResult::default();

        let mut chain = self.inner.bucket_chain(self.bucket_of(name));
        while let Some(block) = chain.next_block(buffer)? {
            result.blocks_visited += 1;

            for entry in block.entries::<SecondaryEntry>()? {
                if entry.name != name {
                    continue;
                }
                let block_id = entry.block_id;
                if block_id == 0 || block_id >= block_count {
                    return Err(IndexError::DanglingEntry {
                        block_id,
                        block_count,
                    });
                }
                if seen[block_id] {
                    continue;
                }
                seen[block_id] = true;

                let primary_block = primary.read_block(buffer, block_id)?;
                result.blocks_visited += 1;
                result.records.extend(
                    primary_block
                        .entries::<Record>()?
                        .into_iter()
                        .filter(|record| record.name() == name),
                );
            }
        }

        debug!(
            "Name {:?}: {} records in {} blocks",
            name,
            result.records.len(),
            result.blocks_visited
        );
        Ok(result)
    }

    pub fn as_hash_file(&self) -> &HashFile<SecondaryKey> {
        &self.inner
    }
}
