use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use super::error::{FileError, FileResult};
use super::{BUFFER_POOL_SIZE, MAX_OPEN_FILES};

/// Which unpinned frame gets reused when the pool is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    /// Evict the least recently touched frame
    #[default]
    Lru,
    /// Evict the most recently touched frame
    Mru,
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Lru => write!(f, "LRU"),
            ReplacementPolicy::Mru => write!(f, "MRU"),
        }
    }
}

/// Buffer pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Number of block frames held in memory
    pub capacity: usize,
    /// Maximum number of simultaneously open files
    pub max_open_files: usize,
    pub policy: ReplacementPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: BUFFER_POOL_SIZE,
            max_open_files: MAX_OPEN_FILES,
            policy: ReplacementPolicy::Lru,
        }
    }
}

impl BufferConfig {
    pub fn with_policy(policy: ReplacementPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Load settings from a JSON file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> FileResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileError::FileNotFound(path.display().to_string()),
            _ => FileError::Io(e),
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> FileResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> FileResult<()> {
        if self.capacity == 0 {
            return Err(FileError::InvalidConfig(
                "capacity must be at least one block".to_string(),
            ));
        }
        if self.max_open_files == 0 {
            return Err(FileError::InvalidConfig(
                "max_open_files must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}
