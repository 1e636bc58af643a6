//! Integration tests for the hash file layer

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::file::{BufferManager, ReplacementPolicy};
    use crate::index::{HashStatistics, HashTable, SecondaryIndex};
    use crate::record::layout::capacity;
    use crate::record::{HeapFile, Record, RecordGenerator};
    use tempfile::TempDir;

    fn record(id: i32, name: &str) -> Record {
        Record::new(id, name, "Halatsis", "Athens").unwrap()
    }

    fn table_with_keys(
        buffer: &mut BufferManager,
        temp_dir: &TempDir,
        buckets: usize,
        keys: impl Iterator<Item = i32>,
    ) -> (PathBuf, HashTable) {
        let path = temp_dir.path().join("data.db");
        HashTable::create(buffer, &path, buckets).unwrap();
        let mut table = HashTable::open(buffer, &path).unwrap();
        for key in keys {
            table.insert(buffer, &record(key, "Sofia")).unwrap();
        }
        (path, table)
    }

    #[test]
    fn test_lookup_hit_and_guaranteed_miss() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(100, ReplacementPolicy::Lru).unwrap();
        let (_, table) = table_with_keys(&mut buffer, &temp_dir, 10, 0..200);

        let hit = table.lookup(&mut buffer, 57).unwrap();
        assert_eq!(hit.records, vec![record(57, "Sofia")]);
        assert!(hit.blocks_visited >= 1);

        let miss = table.lookup(&mut buffer, 400).unwrap();
        assert!(miss.records.is_empty());
        assert!(miss.blocks_visited >= 1);

        table.close(&mut buffer).unwrap();
        assert_eq!(buffer.pinned_block_count(), 0);
    }

    #[test]
    fn test_records_live_in_their_key_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(20, ReplacementPolicy::Lru).unwrap();
        let (_, table) = table_with_keys(&mut buffer, &temp_dir, 7, (-30..170).rev());

        let mut seen = 0;
        for bucket in 0..table.bucket_count() {
            let mut chain = table.as_hash_file().bucket_chain(bucket);
            for block in chain.iter(&mut buffer) {
                for record in block.unwrap().entries::<Record>().unwrap() {
                    assert_eq!(record.id().rem_euclid(7) as usize, bucket);
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, 200);
    }

    #[test]
    fn test_overflow_blocks_per_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(20, ReplacementPolicy::Mru).unwrap();
        // Bucket b of 4 receives 5 * (b + 1) records
        let keys = (0..4).flat_map(|b| (0..5 * (b + 1)).map(move |i| b + 4 * i));
        let (path, table) = table_with_keys(&mut buffer, &temp_dir, 4, keys);
        table.close(&mut buffer).unwrap();

        let max = capacity::<Record>();
        let stats = HashStatistics::collect(&mut buffer, &path).unwrap();
        for bucket in &stats.buckets {
            assert_eq!(bucket.records, 5 * (bucket.bucket + 1));
            assert_eq!(bucket.overflow_blocks(), bucket.records.div_ceil(max) - 1);
        }
        assert_eq!(stats.data_blocks(), stats.last_block_id);
        assert_eq!(stats.min_records(), 5);
        assert_eq!(stats.max_records(), 20);
    }

    #[test]
    fn test_hash_table_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(10, ReplacementPolicy::Lru).unwrap();
        let records = RecordGenerator::new(3).take(150).unwrap();

        let path = temp_dir.path().join("data.db");
        HashTable::create(&mut buffer, &path, 13).unwrap();
        let mut table = HashTable::open(&mut buffer, &path).unwrap();
        for record in &records {
            table.insert(&mut buffer, record).unwrap();
        }
        table.close(&mut buffer).unwrap();
        buffer.shutdown().unwrap();

        buffer.init(ReplacementPolicy::Mru).unwrap();
        let table = HashTable::open(&mut buffer, &path).unwrap();
        assert_eq!(table.bucket_count(), 13);
        for record in &records {
            let result = table.lookup(&mut buffer, record.id()).unwrap();
            assert_eq!(result.records, vec![record.clone()]);
        }
        table.close(&mut buffer).unwrap();
    }

    #[test]
    fn test_heap_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(4, ReplacementPolicy::Lru).unwrap();
        let records = RecordGenerator::default().take(100).unwrap();

        let path = temp_dir.path().join("data.heap");
        HeapFile::create(&mut buffer, &path).unwrap();
        let mut heap = HeapFile::open(&mut buffer, &path).unwrap();
        for record in &records {
            heap.insert_record(&mut buffer, record).unwrap();
        }
        heap.close(&mut buffer).unwrap();
        buffer.shutdown().unwrap();

        buffer.init(ReplacementPolicy::Lru).unwrap();
        let heap = HeapFile::open(&mut buffer, &path).unwrap();
        for record in &records {
            let result = heap.scan_by_key(&mut buffer, record.id()).unwrap();
            assert_eq!(result.records, vec![record.clone()]);
            assert_eq!(result.blocks_visited, 100usize.div_ceil(8));
        }
        heap.close(&mut buffer).unwrap();
    }

    #[test]
    fn test_secondary_lookup_reads_each_primary_block_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(10, ReplacementPolicy::Lru).unwrap();
        let data_path = temp_dir.path().join("data.db");
        let index_path = temp_dir.path().join("index.db");
        HashTable::create(&mut buffer, &data_path, 1).unwrap();
        SecondaryIndex::create(&mut buffer, &index_path, 5, &data_path).unwrap();

        let mut table = HashTable::open(&mut buffer, &data_path).unwrap();
        let mut index = SecondaryIndex::open(&mut buffer, &index_path).unwrap();

        // Three "Iosif" records share block 1, one more lands in block 2
        let names = [
            "Iosif", "Maria", "Iosif", "Iosif", "Maria", "Sofia", "Maria", "Yannis", "Iosif",
        ];
        for (id, name) in names.iter().enumerate() {
            let record = record(id as i32, name);
            let block_id = table.insert(&mut buffer, &record).unwrap();
            index.insert_entry(&mut buffer, &record, block_id).unwrap();
        }

        let result = index.lookup_by_name(&mut buffer, &table, "Iosif").unwrap();
        let ids: Vec<i32> = result.records.iter().map(Record::id).collect();
        assert_eq!(ids.len(), 4);
        for id in [0, 2, 3, 8] {
            assert!(ids.contains(&id));
        }
        // One index block plus primary blocks 1 and 2
        assert_eq!(result.blocks_visited, 3);

        let miss = index
            .lookup_by_name(&mut buffer, &table, "Christos")
            .unwrap();
        assert!(miss.records.is_empty());
        assert!(miss.blocks_visited <= 1);

        index.close(&mut buffer).unwrap();
        table.close(&mut buffer).unwrap();
        assert_eq!(buffer.pinned_block_count(), 0);
    }

    #[test]
    fn test_secondary_matches_brute_force() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(100, ReplacementPolicy::Lru).unwrap();
        let data_path = temp_dir.path().join("data.db");
        let index_path = temp_dir.path().join("index.db");
        HashTable::create(&mut buffer, &data_path, 10).unwrap();
        SecondaryIndex::create(&mut buffer, &index_path, 10, &data_path).unwrap();

        let mut table = HashTable::open(&mut buffer, &data_path).unwrap();
        let mut index = SecondaryIndex::open(&mut buffer, &index_path).unwrap();
        let records = RecordGenerator::default().take(200).unwrap();
        for record in &records {
            let block_id = table.insert(&mut buffer, record).unwrap();
            index.insert_entry(&mut buffer, record, block_id).unwrap();
        }

        for name in ["Vagelis", "Christofos", "Marianna", "Konstantina", "Iosif", "Christos"] {
            let mut expected: Vec<i32> = records
                .iter()
                .filter(|r| r.name() == name)
                .map(Record::id)
                .collect();
            let mut found: Vec<i32> = index
                .lookup_by_name(&mut buffer, &table, name)
                .unwrap()
                .records
                .iter()
                .map(Record::id)
                .collect();
            expected.sort_unstable();
            found.sort_unstable();
            assert_eq!(found, expected, "records named {}", name);
        }

        let stats = HashStatistics::collect(&mut buffer, &index_path).unwrap();
        assert_eq!(stats.total_records(), 200);
    }

    #[test]
    fn test_secondary_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut buffer = BufferManager::with_capacity(10, ReplacementPolicy::Lru).unwrap();
        let data_path = temp_dir.path().join("data.db");
        let index_path = temp_dir.path().join("index.db");
        HashTable::create(&mut buffer, &data_path, 7).unwrap();
        SecondaryIndex::create(&mut buffer, &index_path, 5, &data_path).unwrap();

        let records = RecordGenerator::new(42).take(150).unwrap();
        let mut table = HashTable::open(&mut buffer, &data_path).unwrap();
        let mut index = SecondaryIndex::open(&mut buffer, &index_path).unwrap();
        for record in &records {
            let block_id = table.insert(&mut buffer, record).unwrap();
            index.insert_entry(&mut buffer, record, block_id).unwrap();
        }
        index.close(&mut buffer).unwrap();
        table.close(&mut buffer).unwrap();
        buffer.shutdown().unwrap();

        buffer.init(ReplacementPolicy::Mru).unwrap();
        let table = HashTable::open(&mut buffer, &data_path).unwrap();
        let index = SecondaryIndex::open(&mut buffer, &index_path).unwrap();
        assert_eq!(index.header().bucket_count(), 5);

        let mut names: Vec<&str> = records.iter().map(Record::name).collect();
        names.sort_unstable();
        names.dedup();
        names.push("Christos");
        for name in names {
            let mut expected: Vec<Record> = records
                .iter()
                .filter(|r| r.name() == name)
                .cloned()
                .collect();
            let mut found = index.lookup_by_name(&mut buffer, &table, name).unwrap().records;
            expected.sort_by_key(Record::id);
            found.sort_by_key(Record::id);
            assert_eq!(found, expected, "records named {}", name);
        }

        index.close(&mut buffer).unwrap();
        table.close(&mut buffer).unwrap();
        assert_eq!(buffer.pinned_block_count(), 0);
    }

    #[test]
    fn test_tiny_pool_never_exhausts() {
        let temp_dir = TempDir::new().unwrap();
        // Every operation releases its pins, so three frames are plenty
        let mut buffer = BufferManager::with_capacity(3, ReplacementPolicy::Mru).unwrap();
        let data_path = temp_dir.path().join("data.db");
        let index_path = temp_dir.path().join("index.db");
        HashTable::create(&mut buffer, &data_path, 10).unwrap();
        SecondaryIndex::create(&mut buffer, &index_path, 10, &data_path).unwrap();

        let mut table = HashTable::open(&mut buffer, &data_path).unwrap();
        let mut index = SecondaryIndex::open(&mut buffer, &index_path).unwrap();
        for record in RecordGenerator::new(1).take(200).unwrap() {
            let block_id = table.insert(&mut buffer, &record).unwrap();
            index.insert_entry(&mut buffer, &record, block_id).unwrap();
        }

        assert_eq!(table.lookup(&mut buffer, 57).unwrap().records.len(), 1);
        index.lookup_by_name(&mut buffer, &table, "Maria").unwrap();
        assert!(buffer.cached_block_count() <= 3);
        assert_eq!(buffer.pinned_block_count(), 0);

        index.close(&mut buffer).unwrap();
        table.close(&mut buffer).unwrap();
    }
}
