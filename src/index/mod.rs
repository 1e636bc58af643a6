//! Static hash files: the primary hash table and the secondary name index

mod error;
mod hash_file;
mod hash_table;
mod secondary;
mod stats;
#[cfg(test)]
mod tests;

pub use error::{IndexError, IndexResult};
pub use hash_file::{BucketScan, HashFile, HashSchema};
pub use hash_table::{HashTable, PrimaryKey};
pub use secondary::{SecondaryEntry, SecondaryIndex, SecondaryKey};
pub use stats::{BucketStats, HashStatistics};
