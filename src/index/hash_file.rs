//! Static hash file with per-bucket overflow chains.
//!
//! Block 0 stores the tag and a [`HashHeader`] whose directory maps every
//! bucket to the most recently allocated block of its chain. Blocks of a
//! bucket are linked newest to oldest through their trailers, so a lookup
//! starts at the directory entry and follows links until the `-1` sentinel.
//! The bucket count is fixed when the file is created.

use log::{debug, warn};
use std::marker::PhantomData;
use std::path::Path;

use super::error::{IndexError, IndexResult};
use super::stats::BucketStats;
use crate::file::{BlockId, BufferManager, FileHandle};
use crate::record::layout::{HashHeader, capacity, write_entry};
use crate::record::{
    BlockChain, BlockEntry, BlockInfo, ChainBlock, ChainEnd, FileKind, RecordError,
    RecordResult, read_chain_block,
};

const END: ChainEnd = ChainEnd::MinusOne;

/// Key type, payload type and hash function of a hash file
pub trait HashSchema {
    /// Tag written to block 0
    const KIND: FileKind;

    type Key: ?Sized;
    type Entry: BlockEntry;

    /// Bucket of a lookup key
    fn hash_key(key: &Self::Key, bucket_count: usize) -> usize;

    /// Bucket an entry is stored in
    fn hash_entry(entry: &Self::Entry, bucket_count: usize) -> usize;

    fn matches(entry: &Self::Entry, key: &Self::Key) -> bool;
}

/// Entries found in one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketScan<E> {
    pub blocks_visited: usize,
    pub entries: Vec<E>,
}

impl<E> Default for BucketScan<E> {
    fn default() -> Self {
        Self {
            blocks_visited: 0,
            entries: Vec::new(),
        }
    }
}

/// An open hash file
pub struct HashFile<S: HashSchema> {
    file: FileHandle,
    header: HashHeader,
    _schema: PhantomData<S>,
}

impl<S: HashSchema> HashFile<S> {
    /// Create a file whose directory has `bucket_count` empty buckets
    pub fn create<P: AsRef<Path>>(
        buffer: &mut BufferManager,
        path: P,
        bucket_count: usize,
    ) -> IndexResult<()> {
        let max = HashHeader::max_buckets(S::KIND);
        if bucket_count == 0 {
            return Err(IndexError::InvalidBucketCount);
        }
        if bucket_count > max {
            return Err(IndexError::TooManyBuckets {
                requested: bucket_count,
                max,
            });
        }

        let path = path.as_ref();
        buffer.create_file(path)?;
        let file = buffer.open_file(path)?;

        let header = HashHeader::new(file.as_usize(), capacity::<S::Entry>(), bucket_count);
        let written = buffer.with_new_block(file, |_, data| -> IndexResult<()> {
            S::KIND.write_tag(data);
            header.write(S::KIND, data);
            BlockInfo::default().write(data, END);
            Ok(())
        });
        buffer.close_file(file)?;
        written?;

        debug!(
            "Created {} {} with {} buckets",
            S::KIND,
            path.display(),
            bucket_count
        );
        Ok(())
    }

    /// Open a hash file for writing and load its directory.
    ///
    /// The directory is cached in the returned value, so a path that is
    /// already open fails with `FileInUse`.
    pub fn open<P: AsRef<Path>>(buffer: &mut BufferManager, path: P) -> IndexResult<Self> {
        let file = buffer.open_file_exclusive(path)?;
        Self::open_handle(buffer, file)
    }

    /// Open a hash file that may already be open elsewhere, for reading only
    pub(crate) fn open_shared<P: AsRef<Path>>(
        buffer: &mut BufferManager,
        path: P,
    ) -> IndexResult<Self> {
        let file = buffer.open_file(path)?;
        Self::open_handle(buffer, file)
    }

    fn open_handle(buffer: &mut BufferManager, file: FileHandle) -> IndexResult<Self> {
        match Self::load(buffer, file) {
            Ok(hash_file) => Ok(hash_file),
            Err(e) => {
                if let Err(close_err) = buffer.close_file(file) {
                    warn!("Failed to close {:?} after open error: {}", file, close_err);
                }
                Err(e)
            }
        }
    }

    fn load(buffer: &mut BufferManager, file: FileHandle) -> IndexResult<Self> {
        let mut header = buffer.with_block(file, 0, |data| -> RecordResult<HashHeader> {
            S::KIND.check(data)?;
            HashHeader::read(S::KIND, data)
        })?;

        if header.max_records != capacity::<S::Entry>() {
            return Err(RecordError::Deserialization(format!(
                "{} header claims {} entries per block, expected {}",
                S::KIND,
                header.max_records,
                capacity::<S::Entry>()
            ))
            .into());
        }

        header.file_id = file.as_usize();
        Ok(Self {
            file,
            header,
            _schema: PhantomData,
        })
    }

    pub fn close(self, buffer: &mut BufferManager) -> IndexResult<()> {
        buffer.close_file(self.file)?;
        Ok(())
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn header(&self) -> &HashHeader {
        &self.header
    }

    pub fn bucket_count(&self) -> usize {
        self.header.bucket_count()
    }

    pub fn bucket_of(&self, key: &S::Key) -> usize {
        S::hash_key(key, self.bucket_count())
    }

    /// Store an entry in its bucket and return the block it was written to.
    ///
    /// The entry goes into the bucket's head block while it has room;
    /// otherwise a new block is allocated, linked to the old head and made
    /// the new head.
    pub fn put(&mut self, buffer: &mut BufferManager, entry: &S::Entry) -> IndexResult<BlockId> {
        let bucket = S::hash_entry(entry, self.bucket_count());
        let head = self.header.directory[bucket];

        if let Some(head_id) = head {
            let info = buffer.with_block(self.file, head_id, |data| {
                BlockInfo::read_for::<S::Entry>(data, END)
            })?;
            if info.record_count < self.header.max_records {
                buffer.with_block_mut(self.file, head_id, |data| -> RecordResult<()> {
                    write_entry(data, info.record_count, entry)?;
                    BlockInfo::new(info.record_count + 1, info.link).write(data, END);
                    Ok(())
                })?;
                return Ok(head_id);
            }
        }

        let (block_id, ()) = buffer.with_new_block(self.file, |_, data| -> RecordResult<()> {
            write_entry(data, 0, entry)?;
            BlockInfo::new(1, head).write(data, END);
            Ok(())
        })?;
        self.header.directory[bucket] = Some(block_id);
        self.header.last_block_id = block_id;
        self.write_header(buffer)?;

        if head.is_some() {
            debug!("Bucket {} overflowed into block {}", bucket, block_id);
        }
        Ok(block_id)
    }

    fn write_header(&self, buffer: &mut BufferManager) -> IndexResult<()> {
        buffer.with_block_mut(self.file, 0, |data| -> IndexResult<()> {
            self.header.write(S::KIND, data);
            Ok(())
        })
    }

    /// Cursor over a bucket's blocks, newest first
    pub fn bucket_chain(&self, bucket: usize) -> BlockChain {
        let head = self.header.directory.get(bucket).copied().flatten();
        BlockChain::new(self.file, head, END)
    }

    /// Scan the whole chain of `key`'s bucket for matching entries.
    ///
    /// Every block of the chain is read, so duplicate keys are all returned.
    /// An empty bucket visits no blocks.
    pub fn find(
        &self,
        buffer: &mut BufferManager,
        key: &S::Key,
    ) -> IndexResult<BucketScan<S::Entry>> {
        let mut chain = self.bucket_chain(self.bucket_of(key));
        let mut scan = BucketScan::default();
        for block in chain.iter(buffer) {
            let block = block?;
            scan.blocks_visited += 1;
            scan.entries.extend(
                block
                    .entries::<S::Entry>()?
                    .into_iter()
                    .filter(|entry| S::matches(entry, key)),
            );
        }
        Ok(scan)
    }

    /// Read one data block of this file
    pub fn read_block(
        &self,
        buffer: &mut BufferManager,
        block_id: BlockId,
    ) -> IndexResult<ChainBlock> {
        Ok(read_chain_block(buffer, self.file, block_id, END)?)
    }

    /// Record and block counts of every bucket
    pub fn bucket_stats(&self, buffer: &mut BufferManager) -> IndexResult<Vec<BucketStats>> {
        let mut stats = Vec::with_capacity(self.bucket_count());
        for bucket in 0..self.bucket_count() {
            let mut chain = self.bucket_chain(bucket);
            let mut bucket_stats = BucketStats {
                bucket,
                records: 0,
                blocks: 0,
            };
            for block in chain.iter(buffer) {
                bucket_stats.records += block?.info.record_count;
                bucket_stats.blocks += 1;
            }
            stats.push(bucket_stats);
        }
        Ok(stats)
    }
}
