use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::Mutex;

use super::RangeReader;
use crate::error::IoError;

/// Default block size: 64KB
/// Index.dat pages are a few hundred bytes each and usually laid out
/// back to back, so one block covers many of them.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default cache capacity in number of blocks.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 64;

/// Block-based caching layer that wraps any RangeReader.
///
/// Walking the index page chain issues one tiny read per page header and
/// per entry list. The cache turns those into a handful of block reads.
///
/// - Fixed-size blocks, LRU eviction at capacity
/// - Reads spanning several blocks are stitched together
pub struct BlockCache<R> {
    /// The underlying reader
    inner: R,
    /// Block size in bytes
    block_size: usize,
    /// Cached blocks indexed by block number
    cache: Mutex<LruCache<u64, Bytes>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Create a new BlockCache with the default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CACHE_CAPACITY)
    }

    /// Create a new BlockCache with custom block size and capacity.
    ///
    /// A capacity of zero is treated as one block.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            block_size: block_size.max(1),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get the wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Get a block from cache or fetch it from the underlying reader.
    async fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let mut cache = self.cache.lock().await;
        if let Some(data) = cache.get(&block_idx) {
            return Ok(data.clone());
        }

        let data = self.fetch_block_from_source(block_idx).await?;
        cache.put(block_idx, data.clone());
        Ok(data)
    }

    /// Fetch a block directly from the underlying reader.
    async fn fetch_block_from_source(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let offset = block_idx * self.block_size as u64;
        let size = self.inner.size();

        // The last block may be short
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = std::cmp::min(self.block_size as u64, remaining) as usize;
        self.inner.read_exact_at(offset, len).await
    }

    #[inline]
    fn block_for_offset(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    #[inline]
    fn offset_within_block(&self, offset: u64) -> usize {
        (offset % self.block_size as u64) as usize
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        if offset + len as u64 > size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let start_block = self.block_for_offset(offset);
        let end_block = self.block_for_offset(offset + len as u64 - 1);

        if start_block == end_block {
            let block = self.get_block(start_block).await?;
            let block_offset = self.offset_within_block(offset);
            return Ok(block.slice(block_offset..block_offset + len));
        }

        let mut result = BytesMut::with_capacity(len);
        let mut remaining = len;
        let mut current_offset = offset;

        for block_idx in start_block..=end_block {
            let block = self.get_block(block_idx).await?;
            let block_offset = self.offset_within_block(current_offset);
            let bytes_in_block = std::cmp::min(block.len() - block_offset, remaining);

            result.extend_from_slice(&block[block_offset..block_offset + bytes_in_block]);

            remaining -= bytes_in_block;
            current_offset += bytes_in_block as u64;
        }

        Ok(result.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
