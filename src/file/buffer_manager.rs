use ahash::RandomState;
use log::{debug, trace, warn};
use lru::LruCache;
use std::path::Path;

use super::config::{BufferConfig, ReplacementPolicy};
use super::error::{FileError, FileResult};
use super::file_manager::{BlockFileManager, FileHandle};
use super::{BLOCK_SIZE, BlockId};

/// A block pinned in the buffer pool.
///
/// Returned by `get_block` and `allocate_block`; every one of those calls must
/// be matched by exactly one `unpin_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    file: FileHandle,
    block_id: BlockId,
}

impl BlockRef {
    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }
}

/// Entry in the buffer pool
struct Frame {
    /// The actual block data
    data: Box<[u8]>,
    /// Outstanding pins; a pinned frame is never evicted
    pin_count: usize,
    /// Whether this block has been modified since it was read
    dirty: bool,
}

/// Bounded block cache shared by every open file.
///
/// Frames are kept in recency order by a single `LruCache`. The cache is
/// unbounded on its own; the manager enforces `capacity` and picks victims
/// among unpinned frames according to the configured policy.
pub struct BufferManager {
    /// Underlying block store
    file_manager: BlockFileManager,
    /// Cached frames, most recently touched first
    frames: LruCache<BlockRef, Frame, RandomState>,
    /// Maximum number of cached frames
    capacity: usize,
    policy: ReplacementPolicy,
    active: bool,
    /// Buffer recycled from the last evicted frame
    spare: Option<Box<[u8]>>,
}

impl BufferManager {
    /// Create an active buffer manager
    pub fn new(config: BufferConfig) -> FileResult<Self> {
        config.validate()?;
        debug!(
            "buffer pool initialised: {} frames, {} policy",
            config.capacity, config.policy
        );
        Ok(Self {
            file_manager: BlockFileManager::with_max_files(config.max_open_files),
            frames: LruCache::unbounded_with_hasher(RandomState::new()),
            capacity: config.capacity,
            policy: config.policy,
            active: true,
            spare: None,
        })
    }

    /// Create a buffer manager with specified capacity and policy
    pub fn with_capacity(capacity: usize, policy: ReplacementPolicy) -> FileResult<Self> {
        Self::new(BufferConfig {
            capacity,
            policy,
            ..BufferConfig::default()
        })
    }

    /// Re-activate the pool after `shutdown`
    pub fn init(&mut self, policy: ReplacementPolicy) -> FileResult<()> {
        if self.active {
            return Err(FileError::PoolActive);
        }
        self.policy = policy;
        self.active = true;
        debug!("buffer pool re-initialised with {} policy", policy);
        Ok(())
    }

    /// Flush every dirty frame, close every file and release all frames
    pub fn shutdown(&mut self) -> FileResult<()> {
        self.ensure_active()?;

        let pinned = self.pinned_block_count();
        if pinned > 0 {
            warn!("shutting down with {} pinned block(s)", pinned);
        }

        self.flush_all()?;
        self.frames.clear();
        self.spare = None;
        self.file_manager.close_all()?;
        self.active = false;
        debug!("buffer pool shut down");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a reference to the block store
    pub fn file_manager(&self) -> &BlockFileManager {
        &self.file_manager
    }

    /// Create a new, empty file
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        self.ensure_active()?;
        self.file_manager.create_file(path)
    }

    /// Open an existing file
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        self.ensure_active()?;
        let handle = self.file_manager.open_file(path.as_ref())?;
        debug!("opened {} as file {}", path.as_ref().display(), handle.as_usize());
        Ok(handle)
    }

    /// Open a file that no one else holds open.
    ///
    /// Fails with `FileInUse` when the path is already open, leaving the
    /// existing open untouched.
    pub fn open_file_exclusive<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let handle = self.open_file(path.as_ref())?;
        if self.file_manager.open_count(handle)? > 1 {
            // Only drops the count we just added
            self.file_manager.close_file(handle)?;
            return Err(FileError::FileInUse(path.as_ref().display().to_string()));
        }
        Ok(handle)
    }

    /// Flush and drop every frame of the file, then release its handle.
    ///
    /// Closing one of several opens of a path only drops its open count.
    /// Fails without side effects while any of the file's blocks is pinned.
    pub fn close_file(&mut self, file: FileHandle) -> FileResult<()> {
        self.ensure_active()?;
        if self.file_manager.open_count(file)? > 1 {
            self.file_manager.close_file(file)?;
            return Ok(());
        }

        let keys: Vec<BlockRef> = self
            .frames
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, _)| *key)
            .collect();

        let pinned = keys
            .iter()
            .filter(|key| self.frames.peek(*key).is_some_and(|f| f.pin_count > 0))
            .count();
        if pinned > 0 {
            return Err(FileError::PinnedBlocks {
                handle: file.as_usize(),
                pinned,
            });
        }

        for key in keys {
            self.evict(key)?;
        }
        self.file_manager.sync_file(file)?;
        if self.file_manager.close_file(file)? {
            debug!("closed file {}", file.as_usize());
        }
        Ok(())
    }

    /// Delete a file that is not open
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        self.ensure_active()?;
        self.file_manager.remove_file(path)
    }

    /// Number of blocks allocated in a file
    pub fn block_count(&self, file: FileHandle) -> FileResult<usize> {
        self.ensure_active()?;
        self.file_manager.block_count(file)
    }

    /// Grow the file by one zeroed block and return it pinned
    pub fn allocate_block(&mut self, file: FileHandle) -> FileResult<BlockRef> {
        self.ensure_active()?;
        // Validate the handle before touching the pool
        self.file_manager.block_count(file)?;

        self.make_room()?;
        let block_id = self.file_manager.allocate_block(file)?;
        let key = BlockRef { file, block_id };

        let mut data = self.take_buffer();
        data.fill(0);
        // The block is already zeroed on disk, so the frame starts clean
        self.frames.put(
            key,
            Frame {
                data,
                pin_count: 1,
                dirty: false,
            },
        );
        trace!("allocated block {} of file {}", block_id, file.as_usize());
        Ok(key)
    }

    /// Pin a block, loading it from disk if it is not cached
    pub fn get_block(&mut self, file: FileHandle, block_id: BlockId) -> FileResult<BlockRef> {
        self.ensure_active()?;
        let block_count = self.file_manager.block_count(file)?;
        if block_id >= block_count {
            return Err(FileError::InvalidBlockNumber {
                block_id,
                block_count,
            });
        }

        let key = BlockRef { file, block_id };

        // get_mut also moves the frame to the most recently used position
        if let Some(frame) = self.frames.get_mut(&key) {
            frame.pin_count += 1;
            return Ok(key);
        }

        self.make_room()?;
        let mut data = self.take_buffer();
        if let Err(e) = self.file_manager.read_block(file, block_id, &mut data) {
            self.spare = Some(data);
            return Err(e);
        }

        self.frames.put(
            key,
            Frame {
                data,
                pin_count: 1,
                dirty: false,
            },
        );
        trace!("loaded block {} of file {}", block_id, file.as_usize());
        Ok(key)
    }

    /// Release one pin on a block
    pub fn unpin_block(&mut self, block: BlockRef) -> FileResult<()> {
        self.ensure_active()?;
        match self.frames.peek_mut(&block) {
            Some(frame) if frame.pin_count > 0 => {
                frame.pin_count -= 1;
                Ok(())
            }
            _ => Err(Self::not_pinned(block)),
        }
    }

    /// Mark a pinned block as modified so it is written back before reuse
    pub fn set_dirty(&mut self, block: BlockRef) -> FileResult<()> {
        self.ensure_active()?;
        match self.frames.get_mut(&block) {
            Some(frame) if frame.pin_count > 0 => {
                frame.dirty = true;
                Ok(())
            }
            _ => Err(Self::not_pinned(block)),
        }
    }

    /// Read access to a pinned block
    pub fn data(&self, block: BlockRef) -> FileResult<&[u8]> {
        self.ensure_active()?;
        match self.frames.peek(&block) {
            Some(frame) if frame.pin_count > 0 => Ok(&frame.data[..]),
            _ => Err(Self::not_pinned(block)),
        }
    }

    /// Write access to a pinned block; this marks the block dirty
    pub fn data_mut(&mut self, block: BlockRef) -> FileResult<&mut [u8]> {
        self.ensure_active()?;
        match self.frames.get_mut(&block) {
            Some(frame) if frame.pin_count > 0 => {
                frame.dirty = true;
                Ok(&mut frame.data[..])
            }
            _ => Err(Self::not_pinned(block)),
        }
    }

    /// Pin a block, run `f` over its bytes and unpin it again
    pub fn with_block<T, E, F>(&mut self, file: FileHandle, block_id: BlockId, f: F) -> Result<T, E>
    where
        E: From<FileError>,
        F: FnOnce(&[u8]) -> Result<T, E>,
    {
        let block = self.get_block(file, block_id)?;
        let result = self.data(block).map_err(E::from).and_then(f);
        self.unpin_block(block)?;
        result
    }

    /// Like `with_block`, but `f` may modify the block, which is marked dirty
    pub fn with_block_mut<T, E, F>(
        &mut self,
        file: FileHandle,
        block_id: BlockId,
        f: F,
    ) -> Result<T, E>
    where
        E: From<FileError>,
        F: FnOnce(&mut [u8]) -> Result<T, E>,
    {
        let block = self.get_block(file, block_id)?;
        let result = self.data_mut(block).map_err(E::from).and_then(f);
        self.unpin_block(block)?;
        result
    }

    /// Allocate a block, let `f` initialise it and unpin it again
    pub fn with_new_block<T, E, F>(&mut self, file: FileHandle, f: F) -> Result<(BlockId, T), E>
    where
        E: From<FileError>,
        F: FnOnce(BlockId, &mut [u8]) -> Result<T, E>,
    {
        let block = self.allocate_block(file)?;
        let result = self
            .data_mut(block)
            .map_err(E::from)
            .and_then(|data| f(block.block_id, data));
        self.unpin_block(block)?;
        result.map(|value| (block.block_id, value))
    }

    /// Write a block back to disk if it is dirty
    pub fn flush_block(&mut self, block: BlockRef) -> FileResult<()> {
        self.ensure_active()?;
        if let Some(frame) = self.frames.peek_mut(&block)
            && frame.dirty
        {
            self.file_manager
                .write_block(block.file, block.block_id, &frame.data)?;
            frame.dirty = false;
        }
        Ok(())
    }

    /// Write every dirty block back to disk
    pub fn flush_all(&mut self) -> FileResult<()> {
        self.ensure_active()?;
        // iter() does not change recency order
        let dirty: Vec<BlockRef> = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.dirty)
            .map(|(key, _)| *key)
            .collect();

        for key in dirty {
            self.flush_block(key)?;
        }

        self.file_manager.sync_all()?;
        Ok(())
    }

    /// Get the number of blocks currently in the buffer pool
    pub fn cached_block_count(&self) -> usize {
        self.frames.len()
    }

    /// Check if a block is in the buffer pool
    pub fn is_block_cached(&self, file: FileHandle, block_id: BlockId) -> bool {
        self.frames.contains(&BlockRef { file, block_id })
    }

    /// Pin count of a cached block
    pub fn pin_count(&self, file: FileHandle, block_id: BlockId) -> Option<usize> {
        self.frames
            .peek(&BlockRef { file, block_id })
            .map(|frame| frame.pin_count)
    }

    /// Get the number of dirty blocks in the buffer pool
    pub fn dirty_block_count(&self) -> usize {
        self.frames.iter().filter(|(_, f)| f.dirty).count()
    }

    /// Get the number of frames with at least one pin
    pub fn pinned_block_count(&self) -> usize {
        self.frames.iter().filter(|(_, f)| f.pin_count > 0).count()
    }

    fn ensure_active(&self) -> FileResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(FileError::PoolInactive)
        }
    }

    fn not_pinned(block: BlockRef) -> FileError {
        FileError::BlockNotPinned {
            handle: block.file.as_usize(),
            block_id: block.block_id,
        }
    }

    /// Evict frames until one more block fits
    fn make_room(&mut self) -> FileResult<()> {
        while self.frames.len() >= self.capacity {
            let victim = self.select_victim().ok_or(FileError::BufferPoolFull)?;
            self.evict(victim)?;
        }
        Ok(())
    }

    /// Pick an unpinned frame according to the replacement policy
    fn select_victim(&self) -> Option<BlockRef> {
        let unpinned = |(key, frame): (&BlockRef, &Frame)| (frame.pin_count == 0).then_some(*key);
        match self.policy {
            ReplacementPolicy::Lru => self.frames.iter().rev().find_map(unpinned),
            ReplacementPolicy::Mru => self.frames.iter().find_map(unpinned),
        }
    }

    /// Write back (if dirty) and drop a frame
    fn evict(&mut self, key: BlockRef) -> FileResult<()> {
        self.flush_block(key)?;
        if let Some(frame) = self.frames.pop(&key) {
            trace!(
                "evicted block {} of file {}",
                key.block_id,
                key.file.as_usize()
            );
            // Recycle the evicted buffer for the next load
            self.spare = Some(frame.data);
        }
        Ok(())
    }

    fn take_buffer(&mut self) -> Box<[u8]> {
        self.spare
            .take()
            .unwrap_or_else(|| vec![0u8; BLOCK_SIZE].into_boxed_slice())
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Flush all dirty blocks when the buffer manager is dropped
        if self.active {
            let _ = self.flush_all();
        }
    }
}
