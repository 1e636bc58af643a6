use super::error::{RecordError, RecordResult};
use super::layout::{BlockEntry, BlockInfo, ChainEnd, read_entries};
use crate::file::{BlockId, BufferManager, FileHandle};

/// Snapshot of one block taken while walking a chain
#[derive(Debug, Clone)]
pub struct ChainBlock {
    pub block_id: BlockId,
    pub info: BlockInfo,
    data: Box<[u8]>,
}

impl ChainBlock {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decode the entries the trailer says are present
    pub fn entries<E: BlockEntry>(&self) -> RecordResult<Vec<E>> {
        read_entries(&self.data, self.info.record_count)
    }
}

/// Pin a block, copy it and its trailer out, and unpin it again
pub fn read_chain_block(
    buffer: &mut BufferManager,
    file: FileHandle,
    block_id: BlockId,
    end: ChainEnd,
) -> RecordResult<ChainBlock> {
    buffer.with_block(file, block_id, |data| -> RecordResult<ChainBlock> {
        let info = BlockInfo::read(data, end)?;
        Ok(ChainBlock {
            block_id,
            info,
            data: data.into(),
        })
    })
}

/// Restartable cursor over a linked list of blocks.
///
/// No pin is held between steps, so the caller is free to touch other blocks
/// (even of other files) while walking. A chain longer than the file itself
/// must contain a cycle and is reported as `CorruptChain`.
#[derive(Debug, Clone)]
pub struct BlockChain {
    file: FileHandle,
    head: Option<BlockId>,
    next: Option<BlockId>,
    end: ChainEnd,
    steps: usize,
}

impl BlockChain {
    pub fn new(file: FileHandle, head: Option<BlockId>, end: ChainEnd) -> Self {
        Self {
            file,
            head,
            next: head,
            end,
            steps: 0,
        }
    }

    pub fn head(&self) -> Option<BlockId> {
        self.head
    }

    /// Rewind to the head block
    pub fn restart(&mut self) {
        self.next = self.head;
        self.steps = 0;
    }

    /// Read the next block, or `None` once the end sentinel is reached
    pub fn next_block(&mut self, buffer: &mut BufferManager) -> RecordResult<Option<ChainBlock>> {
        let Some(block_id) = self.next else {
            return Ok(None);
        };

        match self.step(buffer, block_id) {
            Ok(block) => {
                self.next = block.info.link;
                Ok(Some(block))
            }
            Err(e) => {
                self.next = None;
                Err(e)
            }
        }
    }

    fn step(&mut self, buffer: &mut BufferManager, block_id: BlockId) -> RecordResult<ChainBlock> {
        if self.steps >= buffer.block_count(self.file)? {
            return Err(RecordError::CorruptChain(block_id));
        }
        let block = read_chain_block(buffer, self.file, block_id, self.end)?;
        self.steps += 1;
        Ok(block)
    }

    /// Iterate over the remaining blocks
    pub fn iter<'a>(&'a mut self, buffer: &'a mut BufferManager) -> ChainIter<'a> {
        ChainIter {
            chain: self,
            buffer,
        }
    }
}

pub struct ChainIter<'a> {
    chain: &'a mut BlockChain,
    buffer: &'a mut BufferManager,
}

impl Iterator for ChainIter<'_> {
    type Item = RecordResult<ChainBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chain.next_block(self.buffer).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileResult, ReplacementPolicy};
    use tempfile::TempDir;

    /// Allocate `count` data blocks after block 0, linked by `links`
    fn build_file(
        buffer: &mut BufferManager,
        temp_dir: &TempDir,
        count: usize,
        links: &[Option<BlockId>],
        end: ChainEnd,
    ) -> FileHandle {
        let path = temp_dir.path().join("chain.db");
        buffer.create_file(&path).unwrap();
        let file = buffer.open_file(&path).unwrap();
        for i in 0..=count {
            buffer
                .with_new_block(file, |_, data| -> FileResult<()> {
                    let link = if i == 0 { None } else { links[i - 1] };
                    BlockInfo::new(i, link).write(data, end);
                    Ok(())
                })
                .unwrap();
        }
        file
    }

    #[test]
    fn test_walks_links_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(4, ReplacementPolicy::Lru).unwrap();
        // 3 -> 1 -> 2 -> end
        let file = build_file(
            &mut buffer,
            &temp_dir,
            3,
            &[Some(2), None, Some(1)],
            ChainEnd::MinusOne,
        );

        let mut chain = BlockChain::new(file, Some(3), ChainEnd::MinusOne);
        let ids: Vec<BlockId> = chain
            .iter(&mut buffer)
            .map(|block| block.unwrap().block_id)
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(buffer.pinned_block_count(), 0);

        chain.restart();
        let first = chain.next_block(&mut buffer).unwrap().unwrap();
        assert_eq!(first.block_id, 3);
        assert_eq!(first.info.record_count, 3);
        assert_eq!(first.data().len(), crate::file::BLOCK_SIZE);
    }

    #[test]
    fn test_empty_chain() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(4, ReplacementPolicy::Lru).unwrap();
        let file = build_file(&mut buffer, &temp_dir, 0, &[], ChainEnd::Zero);

        let mut chain = BlockChain::new(file, None, ChainEnd::Zero);
        assert!(chain.next_block(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_cycle_detected() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(4, ReplacementPolicy::Mru).unwrap();
        // 1 -> 2 -> 1
        let file = build_file(&mut buffer, &temp_dir, 2, &[Some(2), Some(1)], ChainEnd::Zero);

        let mut chain = BlockChain::new(file, Some(1), ChainEnd::Zero);
        let results: Vec<_> = chain.iter(&mut buffer).collect();
        assert!(matches!(
            results.last(),
            Some(Err(RecordError::CorruptChain(_)))
        ));
        // The cursor stops after reporting the error
        assert!(chain.next_block(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.pinned_block_count(), 0);
    }
}
