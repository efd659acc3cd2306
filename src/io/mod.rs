mod block_cache;
mod local_reader;
mod range_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use local_reader::{LocalFileReader, MemoryReader};
pub use range_reader::{read_i32_le, RangeReader};
