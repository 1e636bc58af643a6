use clap::{Parser, Subcommand};
use log::{LevelFilter, Log, Metadata, info};
use prettytable::{Table, row};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hashdb::index::IndexResult;
use hashdb::record::layout::{read_entry, write_entry};
use hashdb::record::DEFAULT_SEED;
use hashdb::{
    BufferConfig, BufferManager, FileResult, HashStatistics, HashTable, HeapFile, LookupResult,
    Record, RecordGenerator, ReplacementPolicy, SecondaryIndex,
};

const BLOCKS_FILE: &str = "block_example.db";
const HEAP_FILE: &str = "data.heap";
const DATA_FILE: &str = "data.db";
const INDEX_FILE: &str = "index.db";

/// Names searched by the secondary index demo; the last one is never generated
const SEARCH_NAMES: &[&str] = &[
    "Vagelis",
    "Christofos",
    "Marianna",
    "Konstantina",
    "Iosif",
    "Christos",
];

#[derive(Parser)]
#[command(author, version, about = "Buffer-pooled heap and hash files")]
struct Cli {
    /// Directory the demo files are created in
    #[arg(short, long, default_value = ".", global = true)]
    dir: PathBuf,

    /// Number of records to insert
    #[arg(short = 'n', long, default_value_t = 200, global = true)]
    records: usize,

    /// Bucket count of the hash files
    #[arg(short, long, default_value_t = 10, global = true)]
    buckets: usize,

    /// Seed for record generation
    #[arg(long, default_value_t = DEFAULT_SEED, global = true)]
    seed: u64,

    /// Replacement policy: lru or mru
    #[arg(long, value_parser = parse_policy, global = true)]
    policy: Option<ReplacementPolicy>,

    /// Buffer pool capacity in blocks
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// JSON buffer pool configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write records into raw blocks, restart the pool and read them back
    Blocks,
    /// Insert into a heap file and scan it by id
    Heap,
    /// Insert into a hash table and look records up by id
    Hash,
    /// Build a hash table with a secondary name index and search by name
    Secondary,
    /// Print bucket statistics of a hash table and its secondary index
    Stats,
}

fn parse_policy(value: &str) -> Result<ReplacementPolicy, String> {
    match value.to_ascii_lowercase().as_str() {
        "lru" => Ok(ReplacementPolicy::Lru),
        "mru" => Ok(ReplacementPolicy::Mru),
        other => Err(format!("unknown policy {:?}, expected lru or mru", other)),
    }
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn buffer_config(cli: &Cli) -> FileResult<BufferConfig> {
    let mut config = match &cli.config {
        Some(path) => BufferConfig::load(path)?,
        None => BufferConfig::default(),
    };
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> IndexResult<()> {
    let config = buffer_config(cli)?;
    info!(
        "buffer pool: {} frames, {} policy",
        config.capacity, config.policy
    );
    let mut buffer = BufferManager::new(config)?;

    match cli.command {
        Command::Blocks => blocks_demo(cli, &mut buffer)?,
        Command::Heap => heap_demo(cli, &mut buffer)?,
        Command::Hash => hash_demo(cli, &mut buffer)?,
        Command::Secondary => secondary_demo(cli, &mut buffer)?,
        Command::Stats => stats_demo(cli, &mut buffer)?,
    }

    buffer.shutdown()?;
    Ok(())
}

fn print_lookup(what: &str, result: &LookupResult) {
    for record in &result.records {
        println!("{}", record);
    }
    if result.is_empty() {
        println!("There is no entry with this {}.", what);
    }
    println!("Visited : {} blocks.", result.blocks_visited);
}

/// Ids to look up: a few drawn from the inserted range plus one never inserted
fn search_ids(cli: &Cli) -> Vec<i32> {
    let upper = cli.records.max(1) as i32;
    let mut rng = StdRng::seed_from_u64(cli.seed.wrapping_add(1));
    let mut ids: Vec<i32> = (0..5).map(|_| rng.gen_range(0..upper)).collect();
    ids.push(upper.saturating_mul(2));
    ids
}

fn blocks_demo(cli: &Cli, buffer: &mut BufferManager) -> IndexResult<()> {
    let path = cli.dir.join(BLOCKS_FILE);
    let mut generator = RecordGenerator::new(cli.seed);
    let policy = buffer.policy();

    buffer.create_file(&path)?;
    let file = buffer.open_file(&path)?;
    for _ in 0..10 {
        let pair = [generator.next_record()?, generator.next_record()?];
        buffer.with_new_block(file, |_, data| -> IndexResult<()> {
            for (slot, record) in pair.iter().enumerate() {
                write_entry(data, slot, record)?;
            }
            Ok(())
        })?;
    }
    buffer.close_file(file)?;

    // Restart the pool so every block comes back from disk
    buffer.shutdown()?;
    buffer.init(policy)?;

    let file = buffer.open_file(&path)?;
    for block_id in 0..buffer.block_count(file)? {
        let pair = buffer.with_block(file, block_id, |data| -> IndexResult<[Record; 2]> {
            Ok([read_entry(data, 0)?, read_entry(data, 1)?])
        })?;
        println!("Contents of Block {}", block_id);
        for record in &pair {
            println!("\t{}", record);
        }
    }
    buffer.close_file(file)?;
    buffer.remove_file(&path)?;
    Ok(())
}

fn heap_demo(cli: &Cli, buffer: &mut BufferManager) -> IndexResult<()> {
    let path = cli.dir.join(HEAP_FILE);
    HeapFile::create(buffer, &path)?;
    let mut heap = HeapFile::open(buffer, &path)?;

    println!("Inserting {} records.", cli.records);
    for record in RecordGenerator::new(cli.seed).take(cli.records)? {
        heap.insert_record(buffer, &record)?;
    }

    for id in search_ids(cli) {
        println!("\nSearching for: {}", id);
        print_lookup("id", &heap.scan_by_key(buffer, id)?);
    }

    heap.close(buffer)?;
    buffer.remove_file(&path)?;
    Ok(())
}

fn hash_demo(cli: &Cli, buffer: &mut BufferManager) -> IndexResult<()> {
    let path = cli.dir.join(DATA_FILE);
    HashTable::create(buffer, &path, cli.buckets)?;
    let mut table = HashTable::open(buffer, &path)?;

    println!("Inserting {} records.", cli.records);
    for record in RecordGenerator::new(cli.seed).take(cli.records)? {
        table.insert(buffer, &record)?;
    }

    for id in search_ids(cli) {
        println!("\nSearching for: {}", id);
        print_lookup("id", &table.lookup(buffer, id)?);
    }

    table.close(buffer)?;
    buffer.remove_file(&path)?;
    Ok(())
}

/// Create a hash table and its secondary index and fill both
fn build_indexed(
    cli: &Cli,
    buffer: &mut BufferManager,
    data_path: &Path,
    index_path: &Path,
) -> IndexResult<(HashTable, SecondaryIndex)> {
    HashTable::create(buffer, data_path, cli.buckets)?;
    SecondaryIndex::create(buffer, index_path, cli.buckets, data_path)?;
    let mut table = HashTable::open(buffer, data_path)?;
    let mut index = SecondaryIndex::open(buffer, index_path)?;

    println!("Inserting {} records.", cli.records);
    for record in RecordGenerator::new(cli.seed).take(cli.records)? {
        let block_id = table.insert(buffer, &record)?;
        index.insert_entry(buffer, &record, block_id)?;
    }
    Ok((table, index))
}

fn secondary_demo(cli: &Cli, buffer: &mut BufferManager) -> IndexResult<()> {
    let data_path = cli.dir.join(DATA_FILE);
    let index_path = cli.dir.join(INDEX_FILE);
    let (table, index) = build_indexed(cli, buffer, &data_path, &index_path)?;

    for name in SEARCH_NAMES {
        println!("\nSearching for: {}", name);
        print_lookup("name", &index.lookup_by_name(buffer, &table, name)?);
    }

    index.close(buffer)?;
    table.close(buffer)?;
    buffer.remove_file(&index_path)?;
    buffer.remove_file(&data_path)?;
    Ok(())
}

fn stats_demo(cli: &Cli, buffer: &mut BufferManager) -> IndexResult<()> {
    let data_path = cli.dir.join(DATA_FILE);
    let index_path = cli.dir.join(INDEX_FILE);
    let (table, index) = build_indexed(cli, buffer, &data_path, &index_path)?;
    index.close(buffer)?;
    table.close(buffer)?;

    for path in [&data_path, &index_path] {
        let stats = HashStatistics::collect(buffer, path)?;
        println!("\nStatistics for {} ({})", path.display(), stats.kind);
        print_stats(&stats);
    }

    buffer.remove_file(&index_path)?;
    buffer.remove_file(&data_path)?;
    Ok(())
}

fn print_stats(stats: &HashStatistics) {
    let mut table = Table::new();
    table.add_row(row!["Bucket", "Records", "Blocks", "Overflow blocks"]);
    for bucket in &stats.buckets {
        table.add_row(row![
            bucket.bucket,
            bucket.records,
            bucket.blocks,
            bucket.overflow_blocks()
        ]);
    }
    table.printstd();

    println!("Data blocks: {}", stats.last_block_id);
    println!(
        "Records per bucket: min {}, max {}, avg {:.2}",
        stats.min_records(),
        stats.max_records(),
        stats.avg_records()
    );
    println!(
        "Average blocks per bucket: {:.2}",
        stats.avg_blocks_per_bucket()
    );
    println!(
        "Buckets with overflow blocks: {} of {}",
        stats.overflowed_buckets(),
        stats.bucket_count()
    );
}
