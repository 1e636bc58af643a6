use log::{debug, warn};
use std::path::Path;

use super::chain::{BlockChain, read_chain_block};
use super::error::{RecordError, RecordResult};
use super::layout::{BlockInfo, ChainEnd, FileKind, HeapHeader, capacity, write_entry};
use super::record::{LookupResult, Record};
use crate::file::{BlockId, BufferManager, FileHandle};

const END: ChainEnd = ChainEnd::Zero;

/// Unordered, append-only record file.
///
/// Block 0 holds the header and points at the first data block; data blocks
/// form a single chain ending at `last_block_id`, and records are only ever
/// appended to that tail block.
pub struct HeapFile {
    file: FileHandle,
    header: HeapHeader,
    /// Records in the tail block
    tail_records: usize,
}

impl HeapFile {
    /// Create a heap file holding only its header block
    pub fn create<P: AsRef<Path>>(buffer: &mut BufferManager, path: P) -> RecordResult<()> {
        let path = path.as_ref();
        buffer.create_file(path)?;
        let file = buffer.open_file(path)?;

        let header = HeapHeader::new(file.as_usize(), capacity::<Record>());
        let written = buffer.with_new_block(file, |_, data| -> RecordResult<()> {
            FileKind::Heap.write_tag(data);
            header.write(data);
            BlockInfo::default().write(data, END);
            Ok(())
        });
        buffer.close_file(file)?;
        written?;

        debug!("Created heap file {}", path.display());
        Ok(())
    }

    /// Open a heap file, rejecting files with any other tag.
    ///
    /// The tail position is cached, so a path that is already open fails
    /// with `FileInUse`.
    pub fn open<P: AsRef<Path>>(buffer: &mut BufferManager, path: P) -> RecordResult<Self> {
        let file = buffer.open_file_exclusive(path)?;
        match Self::load(buffer, file) {
            Ok(heap) => Ok(heap),
            Err(e) => {
                if let Err(close_err) = buffer.close_file(file) {
                    warn!("Failed to close {:?} after open error: {}", file, close_err);
                }
                Err(e)
            }
        }
    }

    fn load(buffer: &mut BufferManager, file: FileHandle) -> RecordResult<Self> {
        let mut header = buffer.with_block(file, 0, |data| -> RecordResult<HeapHeader> {
            FileKind::Heap.check(data)?;
            HeapHeader::read(data)
        })?;

        if header.max_records != capacity::<Record>() {
            return Err(RecordError::Deserialization(format!(
                "heap header claims {} records per block, expected {}",
                header.max_records,
                capacity::<Record>()
            )));
        }

        let tail_records = if header.last_block_id == 0 {
            0
        } else {
            buffer
                .with_block(file, header.last_block_id, |data| {
                    BlockInfo::read_for::<Record>(data, END)
                })?
                .record_count
        };

        header.file_id = file.as_usize();
        Ok(Self {
            file,
            header,
            tail_records,
        })
    }

    /// Close the file; every block was already written through the pool
    pub fn close(self, buffer: &mut BufferManager) -> RecordResult<()> {
        buffer.close_file(self.file)?;
        Ok(())
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn header(&self) -> &HeapHeader {
        &self.header
    }

    /// Append a record and return the block it landed in
    pub fn insert_record(
        &mut self,
        buffer: &mut BufferManager,
        record: &Record,
    ) -> RecordResult<BlockId> {
        if self.header.last_block_id == 0 || self.tail_records == self.header.max_records {
            self.append_block(buffer)?;
        }

        let block_id = self.header.last_block_id;
        let slot = self.tail_records;
        buffer.with_block_mut(self.file, block_id, |data| -> RecordResult<()> {
            write_entry(data, slot, record)?;
            BlockInfo::new(slot + 1, None).write(data, END);
            Ok(())
        })?;

        self.tail_records += 1;
        Ok(block_id)
    }

    /// Allocate a new tail block and link the old tail (or block 0) to it
    fn append_block(&mut self, buffer: &mut BufferManager) -> RecordResult<()> {
        let previous = self.header.last_block_id;
        let (block_id, ()) = buffer.with_new_block(self.file, |_, data| -> RecordResult<()> {
            BlockInfo::new(0, None).write(data, END);
            Ok(())
        })?;

        buffer.with_block_mut(self.file, previous, |data| -> RecordResult<()> {
            let mut info = BlockInfo::read(data, END)?;
            info.link = Some(block_id);
            info.write(data, END);
            Ok(())
        })?;

        self.header.last_block_id = block_id;
        self.tail_records = 0;
        let header = self.header;
        buffer.with_block_mut(self.file, 0, |data| -> RecordResult<()> {
            header.write(data);
            Ok(())
        })?;

        debug!("Heap file {:?} grew to block {}", self.file, block_id);
        Ok(())
    }

    /// Cursor over the data blocks, starting at block 0's forward pointer
    pub fn chain(&self, buffer: &mut BufferManager) -> RecordResult<BlockChain> {
        let head = read_chain_block(buffer, self.file, 0, END)?.info.link;
        Ok(BlockChain::new(self.file, head, END))
    }

    /// Scan every data block for records with `key`.
    ///
    /// `blocks_visited` counts data blocks only; an empty file visits none.
    pub fn scan_by_key(&self, buffer: &mut BufferManager, key: i32) -> RecordResult<LookupResult> {
        let mut chain = self.chain(buffer)?;
        let mut result = LookupResult::default();
        for block in chain.iter(buffer) {
            let block = block?;
            result.blocks_visited += 1;
            result.records.extend(
                block
                    .entries::<Record>()?
                    .into_iter()
                    .filter(|record| record.id() == key),
            );
        }
        Ok(result)
    }

    /// Every record in insertion order
    pub fn records(&self, buffer: &mut BufferManager) -> RecordResult<Vec<Record>> {
        let mut chain = self.chain(buffer)?;
        let mut records = Vec::new();
        for block in chain.iter(buffer) {
            records.extend(block?.entries::<Record>()?);
        }
        Ok(records)
    }
}
