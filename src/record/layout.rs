//! On-disk block layout.
//!
//! Every file starts with a header block (block 0): a NUL-terminated tag
//! naming the file kind, immediately followed by the kind-specific header.
//! Every block, block 0 included, ends with a [`BlockInfo`] trailer at
//! [`BlockInfo::OFFSET`]. Data blocks pack fixed-width entries from offset 0
//! upwards. All integers are little-endian `i32`.

use std::fmt;

use super::error::{RecordError, RecordResult};
use crate::file::{BLOCK_SIZE, BlockId};

/// Kind of structured file, identified by the tag at the start of block 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Heap,
    HashTable,
    SecondaryIndex,
}

impl FileKind {
    const ALL: [FileKind; 3] = [FileKind::Heap, FileKind::HashTable, FileKind::SecondaryIndex];

    pub fn tag(self) -> &'static str {
        match self {
            FileKind::Heap => "Heap file",
            FileKind::HashTable => "Hashtable file",
            FileKind::SecondaryIndex => "SHash file",
        }
    }

    /// How a missing link is encoded in this kind's block trailers
    pub fn chain_end(self) -> ChainEnd {
        match self {
            FileKind::Heap => ChainEnd::Zero,
            FileKind::HashTable | FileKind::SecondaryIndex => ChainEnd::MinusOne,
        }
    }

    /// Offset of the kind-specific header in block 0
    pub fn header_offset(self) -> usize {
        self.tag().len() + 1
    }

    /// Identify a header block by its tag
    pub fn detect(block: &[u8]) -> Option<FileKind> {
        let tag = tag_bytes(block);
        Self::ALL.into_iter().find(|kind| kind.tag().as_bytes() == tag)
    }

    pub fn write_tag(self, block: &mut [u8]) {
        let tag = self.tag().as_bytes();
        block[..tag.len()].copy_from_slice(tag);
        block[tag.len()] = 0;
    }

    /// Fail with `FormatMismatch` unless the block carries this kind's tag
    pub fn check(self, block: &[u8]) -> RecordResult<()> {
        if Self::detect(block) == Some(self) {
            Ok(())
        } else {
            Err(RecordError::FormatMismatch {
                expected: self,
                found: String::from_utf8_lossy(tag_bytes(block)).into_owned(),
            })
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Heap => write!(f, "heap file"),
            FileKind::HashTable => write!(f, "hash table file"),
            FileKind::SecondaryIndex => write!(f, "secondary index file"),
        }
    }
}

/// Bytes of the tag at the start of a block, without the terminator
fn tag_bytes(block: &[u8]) -> &[u8] {
    let window = &block[..block.len().min(32)];
    let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
    &window[..end]
}

/// Encoding of "no next block" in a trailer link field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEnd {
    /// Heap files: block 0 can never be a successor, so 0 ends the chain
    Zero,
    /// Hash files: -1 ends an overflow chain
    MinusOne,
}

impl ChainEnd {
    pub fn encode(self, link: Option<BlockId>) -> i32 {
        match (link, self) {
            (Some(block_id), _) => to_raw(block_id),
            (None, ChainEnd::Zero) => 0,
            (None, ChainEnd::MinusOne) => -1,
        }
    }

    pub fn decode(self, raw: i32) -> RecordResult<Option<BlockId>> {
        match (self, raw) {
            (ChainEnd::Zero, 0) | (ChainEnd::MinusOne, -1) => Ok(None),
            (_, raw) if raw > 0 => Ok(Some(raw as BlockId)),
            (_, raw) => Err(RecordError::Deserialization(format!(
                "invalid block link {}",
                raw
            ))),
        }
    }
}

/// Trailer stored at the tail of every block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInfo {
    /// Number of entries packed at the start of the block
    pub record_count: usize,
    /// Next block in the chain
    pub link: Option<BlockId>,
}

impl BlockInfo {
    pub const SIZE: usize = 8;
    pub const OFFSET: usize = BLOCK_SIZE - Self::SIZE;

    pub fn new(record_count: usize, link: Option<BlockId>) -> Self {
        Self { record_count, link }
    }

    pub fn read(block: &[u8], end: ChainEnd) -> RecordResult<Self> {
        let record_count = from_raw(read_i32(block, Self::OFFSET), "record count")?;
        let link = end.decode(read_i32(block, Self::OFFSET + 4))?;
        Ok(Self { record_count, link })
    }

    /// Read the trailer of a block holding `E` entries, rejecting counts
    /// the block cannot hold
    pub fn read_for<E: BlockEntry>(block: &[u8], end: ChainEnd) -> RecordResult<Self> {
        let info = Self::read(block, end)?;
        if info.record_count > capacity::<E>() {
            return Err(RecordError::Deserialization(format!(
                "record count {} exceeds block capacity {}",
                info.record_count,
                capacity::<E>()
            )));
        }
        Ok(info)
    }

    pub fn write(&self, block: &mut [u8], end: ChainEnd) {
        write_i32(block, Self::OFFSET, to_raw(self.record_count));
        write_i32(block, Self::OFFSET + 4, end.encode(self.link));
    }
}

/// A fixed-width payload packed into data blocks
pub trait BlockEntry: Sized {
    /// Encoded width in bytes
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);

    fn decode(buf: &[u8]) -> RecordResult<Self>;
}

/// Number of entries of type `E` that fit in front of the trailer
pub fn capacity<E: BlockEntry>() -> usize {
    BlockInfo::OFFSET / E::SIZE
}

pub fn write_entry<E: BlockEntry>(block: &mut [u8], slot: usize, entry: &E) -> RecordResult<()> {
    if slot >= capacity::<E>() {
        return Err(RecordError::InvalidRecord(format!(
            "slot {} is beyond block capacity {}",
            slot,
            capacity::<E>()
        )));
    }
    let start = slot * E::SIZE;
    entry.encode(&mut block[start..start + E::SIZE]);
    Ok(())
}

pub fn read_entry<E: BlockEntry>(block: &[u8], slot: usize) -> RecordResult<E> {
    if slot >= capacity::<E>() {
        return Err(RecordError::Deserialization(format!(
            "slot {} is beyond block capacity {}",
            slot,
            capacity::<E>()
        )));
    }
    let start = slot * E::SIZE;
    E::decode(&block[start..start + E::SIZE])
}

/// Decode the first `count` entries of a block
pub fn read_entries<E: BlockEntry>(block: &[u8], count: usize) -> RecordResult<Vec<E>> {
    if count > capacity::<E>() {
        return Err(RecordError::Deserialization(format!(
            "record count {} exceeds block capacity {}",
            count,
            capacity::<E>()
        )));
    }
    (0..count).map(|slot| read_entry(block, slot)).collect()
}

/// Header of a heap file, stored in block 0 after the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapHeader {
    pub block_id: BlockId,
    /// File id the file had when the header was last written
    pub file_id: usize,
    pub last_block_id: BlockId,
    pub max_records: usize,
}

impl HeapHeader {
    pub const SIZE: usize = 16;

    pub fn new(file_id: usize, max_records: usize) -> Self {
        Self {
            block_id: 0,
            file_id,
            last_block_id: 0,
            max_records,
        }
    }

    pub fn read(block: &[u8]) -> RecordResult<Self> {
        let base = FileKind::Heap.header_offset();
        Ok(Self {
            block_id: from_raw(read_i32(block, base), "block id")?,
            file_id: from_raw(read_i32(block, base + 4), "file id")?,
            last_block_id: from_raw(read_i32(block, base + 8), "last block id")?,
            max_records: from_raw(read_i32(block, base + 12), "max records")?,
        })
    }

    pub fn write(&self, block: &mut [u8]) {
        let base = FileKind::Heap.header_offset();
        write_i32(block, base, to_raw(self.block_id));
        write_i32(block, base + 4, to_raw(self.file_id));
        write_i32(block, base + 8, to_raw(self.last_block_id));
        write_i32(block, base + 12, to_raw(self.max_records));
    }
}

/// Header of a hash file, stored in block 0 after the tag.
///
/// The bucket directory holds the most recently allocated block of each
/// bucket. Its length is fixed when the file is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashHeader {
    pub block_id: BlockId,
    pub file_id: usize,
    pub last_block_id: BlockId,
    pub max_records: usize,
    pub directory: Box<[Option<BlockId>]>,
}

impl HashHeader {
    /// Bytes before the directory: five `i32` fields
    pub const FIXED_SIZE: usize = 20;

    pub fn new(file_id: usize, max_records: usize, bucket_count: usize) -> Self {
        Self {
            block_id: 0,
            file_id,
            last_block_id: 0,
            max_records,
            directory: vec![None; bucket_count].into_boxed_slice(),
        }
    }

    /// Largest directory that fits in block 0 next to the tag and trailer
    pub fn max_buckets(kind: FileKind) -> usize {
        (BlockInfo::OFFSET - kind.header_offset() - Self::FIXED_SIZE) / 4
    }

    pub fn bucket_count(&self) -> usize {
        self.directory.len()
    }

    pub fn read(kind: FileKind, block: &[u8]) -> RecordResult<Self> {
        let base = kind.header_offset();
        let bucket_count = from_raw(read_i32(block, base + 16), "bucket count")?;
        if bucket_count == 0 || bucket_count > Self::max_buckets(kind) {
            return Err(RecordError::Deserialization(format!(
                "bucket count {} out of range",
                bucket_count
            )));
        }

        let dir_base = base + Self::FIXED_SIZE;
        let directory = (0..bucket_count)
            .map(|i| ChainEnd::MinusOne.decode(read_i32(block, dir_base + i * 4)))
            .collect::<RecordResult<Vec<_>>>()?;

        Ok(Self {
            block_id: from_raw(read_i32(block, base), "block id")?,
            file_id: from_raw(read_i32(block, base + 4), "file id")?,
            last_block_id: from_raw(read_i32(block, base + 8), "last block id")?,
            max_records: from_raw(read_i32(block, base + 12), "max records")?,
            directory: directory.into_boxed_slice(),
        })
    }

    pub fn write(&self, kind: FileKind, block: &mut [u8]) {
        let base = kind.header_offset();
        write_i32(block, base, to_raw(self.block_id));
        write_i32(block, base + 4, to_raw(self.file_id));
        write_i32(block, base + 8, to_raw(self.last_block_id));
        write_i32(block, base + 12, to_raw(self.max_records));
        write_i32(block, base + 16, to_raw(self.bucket_count()));

        let dir_base = base + Self::FIXED_SIZE;
        for (i, head) in self.directory.iter().enumerate() {
            write_i32(block, dir_base + i * 4, ChainEnd::MinusOne.encode(*head));
        }
    }
}

/// Copy a string into a fixed-width, NUL-padded field.
///
/// The caller guarantees `value` fits; see `check_str_len`.
pub fn encode_str(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    field[..bytes.len()].copy_from_slice(bytes);
    field[bytes.len()..].fill(0);
}

/// Read a fixed-width, NUL-padded field
pub fn decode_str(field: &[u8]) -> RecordResult<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| RecordError::Deserialization(format!("invalid string field: {}", e)))
}

/// Validate that `value` fits a field of `width` bytes
pub fn check_str_len(field_name: &str, value: &str, width: usize) -> RecordResult<()> {
    if value.len() > width {
        return Err(RecordError::InvalidRecord(format!(
            "{} {:?} is longer than {} bytes",
            field_name, value, width
        )));
    }
    if value.as_bytes().contains(&0) {
        return Err(RecordError::InvalidRecord(format!(
            "{} {:?} contains a NUL byte",
            field_name, value
        )));
    }
    Ok(())
}

pub fn read_i32(block: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        block[offset],
        block[offset + 1],
        block[offset + 2],
        block[offset + 3],
    ])
}

pub fn write_i32(block: &mut [u8], offset: usize, value: i32) {
    block[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn to_raw(value: usize) -> i32 {
    // Block ids and counts are bounded by file sizes far below i32::MAX
    value as i32
}

fn from_raw(raw: i32, field: &str) -> RecordResult<usize> {
    usize::try_from(raw)
        .map_err(|_| RecordError::Deserialization(format!("negative {}: {}", field, raw)))
}
