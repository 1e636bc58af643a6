use std::path::Path;

use super::error::IndexResult;
use super::hash_file::HashFile;
use super::hash_table::PrimaryKey;
use super::secondary::SecondaryKey;
use crate::file::{BlockId, BufferManager};
use crate::record::{FileKind, RecordResult};

/// Occupancy of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    pub bucket: usize,
    pub records: usize,
    pub blocks: usize,
}

impl BucketStats {
    /// Blocks beyond the bucket's first
    pub fn overflow_blocks(&self) -> usize {
        self.blocks.saturating_sub(1)
    }
}

/// Bucket occupancy summary of a primary or secondary hash file
#[derive(Debug, Clone, PartialEq)]
pub struct HashStatistics {
    pub kind: FileKind,
    /// Last allocated block, i.e. the number of data blocks
    pub last_block_id: BlockId,
    pub buckets: Vec<BucketStats>,
}

impl HashStatistics {
    /// Read the statistics of the hash file at `path`, which may be open.
    ///
    /// The file kind is taken from its tag; heap files are rejected with
    /// `FormatMismatch`.
    pub fn collect<P: AsRef<Path>>(buffer: &mut BufferManager, path: P) -> IndexResult<Self> {
        let path = path.as_ref();
        let kind = detect_hash_kind(buffer, path)?;

        let (buckets, last_block_id) = match kind {
            FileKind::SecondaryIndex => {
                let index = HashFile::<SecondaryKey>::open_shared(buffer, path)?;
                let buckets = index.bucket_stats(buffer);
                let last_block_id = index.header().last_block_id;
                index.close(buffer)?;
                (buckets?, last_block_id)
            }
            _ => {
                let table = HashFile::<PrimaryKey>::open_shared(buffer, path)?;
                let buckets = table.bucket_stats(buffer);
                let last_block_id = table.header().last_block_id;
                table.close(buffer)?;
                (buckets?, last_block_id)
            }
        };

        Ok(Self {
            kind,
            last_block_id,
            buckets,
        })
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Blocks reachable from the directory
    pub fn data_blocks(&self) -> usize {
        self.buckets.iter().map(|b| b.blocks).sum()
    }

    pub fn total_records(&self) -> usize {
        self.buckets.iter().map(|b| b.records).sum()
    }

    pub fn min_records(&self) -> usize {
        self.buckets.iter().map(|b| b.records).min().unwrap_or(0)
    }

    pub fn max_records(&self) -> usize {
        self.buckets.iter().map(|b| b.records).max().unwrap_or(0)
    }

    pub fn avg_records(&self) -> f64 {
        if self.buckets.is_empty() {
            return 0.0;
        }
        self.total_records() as f64 / self.buckets.len() as f64
    }

    /// Number of buckets that needed at least one overflow block
    pub fn overflowed_buckets(&self) -> usize {
        self.buckets.iter().filter(|b| b.overflow_blocks() > 0).count()
    }

    pub fn avg_blocks_per_bucket(&self) -> f64 {
        if self.buckets.is_empty() {
            return 0.0;
        }
        self.data_blocks() as f64 / self.buckets.len() as f64
    }
}

/// Peek at block 0 and return the hash kind it is tagged with
fn detect_hash_kind(buffer: &mut BufferManager, path: &Path) -> IndexResult<FileKind> {
    let file = buffer.open_file(path)?;
    let kind = buffer.with_block(file, 0, |data| -> RecordResult<FileKind> {
        match FileKind::detect(data) {
            Some(kind @ (FileKind::HashTable | FileKind::SecondaryIndex)) => Ok(kind),
            _ => FileKind::HashTable.check(data).map(|()| FileKind::HashTable),
        }
    });
    buffer.close_file(file)?;
    Ok(kind?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::ReplacementPolicy;
    use crate::index::{HashTable, IndexError};
    use crate::record::{HeapFile, Record, RecordError};
    use tempfile::TempDir;

    #[test]
    fn test_summary_values() {
        let stats = HashStatistics {
            kind: FileKind::HashTable,
            last_block_id: 5,
            buckets: vec![
                BucketStats { bucket: 0, records: 10, blocks: 2 },
                BucketStats { bucket: 1, records: 0, blocks: 0 },
                BucketStats { bucket: 2, records: 17, blocks: 3 },
            ],
        };
        assert_eq!(stats.data_blocks(), 5);
        assert_eq!(stats.min_records(), 0);
        assert_eq!(stats.max_records(), 17);
        assert!((stats.avg_records() - 9.0).abs() < f64::EPSILON);
        assert_eq!(stats.overflowed_buckets(), 2);
        assert!((stats.avg_blocks_per_bucket() - 5.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.buckets[2].overflow_blocks(), 2);
    }

    #[test]
    fn test_collect_from_hash_table() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(8, ReplacementPolicy::Lru).unwrap();
        let path = temp_dir.path().join("data.db");
        HashTable::create(&mut buffer, &path, 2).unwrap();
        let mut table = HashTable::open(&mut buffer, &path).unwrap();
        // 10 records in bucket 0, 1 in bucket 1
        for id in 0..10 {
            table
                .insert(&mut buffer, &Record::new(id * 2, "a", "b", "c").unwrap())
                .unwrap();
        }
        table
            .insert(&mut buffer, &Record::new(1, "a", "b", "c").unwrap())
            .unwrap();
        table.close(&mut buffer).unwrap();

        let stats = HashStatistics::collect(&mut buffer, &path).unwrap();
        assert_eq!(stats.kind, FileKind::HashTable);
        assert_eq!(stats.last_block_id, 3);
        assert_eq!(
            stats.buckets,
            vec![
                BucketStats { bucket: 0, records: 10, blocks: 2 },
                BucketStats { bucket: 1, records: 1, blocks: 1 },
            ]
        );
        assert_eq!(stats.overflowed_buckets(), 1);
        assert_eq!(buffer.file_manager().open_file_count(), 0);
    }

    #[test]
    fn test_collect_while_table_is_open() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(8, ReplacementPolicy::Lru).unwrap();
        let path = temp_dir.path().join("data.db");
        HashTable::create(&mut buffer, &path, 3).unwrap();
        let mut table = HashTable::open(&mut buffer, &path).unwrap();
        for id in 0..4 {
            table
                .insert(&mut buffer, &Record::new(id, "a", "b", "c").unwrap())
                .unwrap();
        }

        let stats = HashStatistics::collect(&mut buffer, &path).unwrap();
        assert_eq!(stats.total_records(), 4);
        assert_eq!(stats.last_block_id, 3);

        // The table still owns its handle and keeps growing
        table
            .insert(&mut buffer, &Record::new(7, "a", "b", "c").unwrap())
            .unwrap();
        assert_eq!(buffer.file_manager().open_count(table.file()).unwrap(), 1);
        table.close(&mut buffer).unwrap();
        assert_eq!(HashStatistics::collect(&mut buffer, &path).unwrap().total_records(), 5);
    }

    #[test]
    fn test_collect_rejects_heap_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(8, ReplacementPolicy::Lru).unwrap();
        let path = temp_dir.path().join("data.heap");
        HeapFile::create(&mut buffer, &path).unwrap();

        let result = HashStatistics::collect(&mut buffer, &path);
        assert!(matches!(
            result,
            Err(IndexError::Record(RecordError::FormatMismatch { .. }))
        ));
        assert_eq!(buffer.file_manager().open_file_count(), 0);
    }
}
