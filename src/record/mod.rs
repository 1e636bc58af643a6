mod chain;
mod error;
mod generator;
mod heap_file;
pub mod layout;
mod record;

pub use chain::{BlockChain, ChainBlock, ChainIter, read_chain_block};
pub use error::{RecordError, RecordResult};
pub use generator::{DEFAULT_SEED, RecordGenerator};
pub use heap_file::HeapFile;
pub use layout::{BlockEntry, BlockInfo, ChainEnd, FileKind};
pub use record::{CITY_LEN, LookupResult, NAME_LEN, Record, SURNAME_LEN};
