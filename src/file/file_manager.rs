use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{BLOCK_SIZE, BlockId, MAX_OPEN_FILES};

/// Small integer id of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Manages block-structured files on disk
pub struct BlockFileManager {
    /// Open files by id
    open_files: HashMap<FileHandle, FileEntry>,
    /// Canonical path of every open file, so a second open shares the id
    path_to_handle: HashMap<PathBuf, FileHandle>,
    max_open_files: usize,
}

struct FileEntry {
    file: File,
    path: PathBuf,
    /// Number of blocks allocated in the file
    block_count: usize,
    /// Number of outstanding opens of the same path
    open_count: usize,
}

impl BlockFileManager {
    /// Create a new block file manager
    pub fn new() -> Self {
        Self::with_max_files(MAX_OPEN_FILES)
    }

    /// Create a new block file manager with specified max open files
    pub fn with_max_files(max_open_files: usize) -> Self {
        Self {
            open_files: HashMap::new(),
            path_to_handle: HashMap::new(),
            max_open_files,
        }
    }

    /// Create a new, empty file
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        File::create(path)?;
        Ok(())
    }

    /// Open an existing file.
    ///
    /// Opening a path that is already open returns the same handle and must
    /// be matched by one more `close_file`.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        if let Some(&handle) = self.path_to_handle.get(&path) {
            if let Some(entry) = self.open_files.get_mut(&handle) {
                entry.open_count += 1;
            }
            return Ok(handle);
        }

        if self.open_files.len() >= self.max_open_files {
            return Err(FileError::TooManyOpenFiles);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_size = file.metadata()?.len();
        let block_count = file_size.div_ceil(BLOCK_SIZE as u64) as usize;

        // Lowest free id, so ids are reused only once their file is closed
        let handle = (0..)
            .map(FileHandle)
            .find(|h| !self.open_files.contains_key(h))
            .ok_or(FileError::TooManyOpenFiles)?;

        self.open_files.insert(
            handle,
            FileEntry {
                file,
                path: path.clone(),
                block_count,
                open_count: 1,
            },
        );
        self.path_to_handle.insert(path, handle);

        Ok(handle)
    }

    /// Close a file. Returns `true` when the last open of the path was
    /// released and the handle is no longer valid.
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<bool> {
        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))?;

        if entry.open_count > 1 {
            entry.open_count -= 1;
            return Ok(false);
        }

        if let Some(entry) = self.open_files.remove(&handle) {
            self.path_to_handle.remove(&entry.path);
        }
        Ok(true)
    }

    /// Close every open file regardless of open counts
    pub fn close_all(&mut self) -> FileResult<()> {
        self.sync_all()?;
        self.open_files.clear();
        self.path_to_handle.clear();
        Ok(())
    }

    /// Remove (delete) a file that is not open
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if let Ok(canonical_path) = path.canonicalize()
            && self.path_to_handle.contains_key(&canonical_path)
        {
            return Err(FileError::FileInUse(path.display().to_string()));
        }

        std::fs::remove_file(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileError::FileNotFound(path.display().to_string()),
            _ => FileError::Io(e),
        })
    }

    /// Read a block from a file
    pub fn read_block(
        &mut self,
        handle: FileHandle,
        block_id: BlockId,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        if buffer.len() != BLOCK_SIZE {
            return Err(FileError::InvalidBlockSize {
                expected: BLOCK_SIZE,
                actual: buffer.len(),
            });
        }

        let entry = self.entry_mut(handle)?;
        if block_id >= entry.block_count {
            return Err(FileError::InvalidBlockNumber {
                block_id,
                block_count: entry.block_count,
            });
        }

        let offset = (block_id * BLOCK_SIZE) as u64;
        entry.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let bytes_read = entry.file.read(&mut buffer[filled..])?;
            if bytes_read == 0 {
                break;
            }
            filled += bytes_read;
        }
        buffer[filled..].fill(0);

        Ok(())
    }

    /// Write a block to a file
    pub fn write_block(
        &mut self,
        handle: FileHandle,
        block_id: BlockId,
        buffer: &[u8],
    ) -> FileResult<()> {
        if buffer.len() != BLOCK_SIZE {
            return Err(FileError::InvalidBlockSize {
                expected: BLOCK_SIZE,
                actual: buffer.len(),
            });
        }

        let entry = self.entry_mut(handle)?;
        if block_id >= entry.block_count {
            return Err(FileError::InvalidBlockNumber {
                block_id,
                block_count: entry.block_count,
            });
        }

        let offset = (block_id * BLOCK_SIZE) as u64;
        entry.file.seek(SeekFrom::Start(offset))?;
        entry.file.write_all(buffer)?;
        // No sync here; sync_all runs on flush and shutdown

        Ok(())
    }

    /// Append one zeroed block at the end of the file and return its index
    pub fn allocate_block(&mut self, handle: FileHandle) -> FileResult<BlockId> {
        let entry = self.entry_mut(handle)?;
        let block_id = entry.block_count;
        entry
            .file
            .set_len(((block_id + 1) * BLOCK_SIZE) as u64)?;
        entry.block_count += 1;
        Ok(block_id)
    }

    /// Blocks currently in the file, header block included
    pub fn block_count(&self, handle: FileHandle) -> FileResult<usize> {
        self.open_files
            .get(&handle)
            .map(|entry| entry.block_count)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    /// Path a handle was opened with
    pub fn path(&self, handle: FileHandle) -> FileResult<&Path> {
        self.open_files
            .get(&handle)
            .map(|entry| entry.path.as_path())
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    /// Flush one file's OS buffers to disk
    pub fn sync_file(&mut self, handle: FileHandle) -> FileResult<()> {
        self.entry_mut(handle)?.file.sync_data()?;
        Ok(())
    }

    /// Flush every open file
    pub fn sync_all(&mut self) -> FileResult<()> {
        for entry in self.open_files.values_mut() {
            entry.file.sync_data()?;
        }
        Ok(())
    }

    /// Outstanding opens of the file behind `handle`
    pub fn open_count(&self, handle: FileHandle) -> FileResult<usize> {
        self.open_files
            .get(&handle)
            .map(|entry| entry.open_count)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    /// Whether `handle` names an open file
    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.open_files.contains_key(&handle)
    }

    /// Number of distinct files open right now
    pub fn open_file_count(&self) -> usize {
        self.open_files.len()
    }

    /// Handles of all open files
    pub fn open_handles(&self) -> Vec<FileHandle> {
        let mut handles: Vec<_> = self.open_files.keys().copied().collect();
        handles.sort();
        handles
    }

    fn entry_mut(&mut self, handle: FileHandle) -> FileResult<&mut FileEntry> {
        self.open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))
    }
}

impl Default for BlockFileManager {
    fn default() -> Self {
        Self::new()
    }
}
