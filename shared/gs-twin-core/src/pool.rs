//! Dynamic memory pool: a process-wide bucket allocator.
//!
//! Mirrors the source system's size-bucketed arenas without the global
//! mutable singleton (see REDESIGN FLAGS): a [`MemoryPool`] is an explicit
//! value a `SimContext` owns, not a `static`. Each bucket is
//! `(object_size, count)`; an allocation routes to the smallest bucket
//! whose chunk size accommodates `request + 16` bytes (the 16 bytes are
//! the same bookkeeping slack the source reserves per allocation).
//! Allocations that fit no bucket are a hard error — in the source system
//! this is fatal; here it is a typed `PoolError` the caller turns into an
//! invariant violation.

/// One size-bucketed arena: `chunk_size` bytes per slot, `capacity` slots.
struct Bucket {
    chunk_size: usize,
    capacity: usize,
    free_stack: Vec<u32>,
    in_use: usize,
}

impl Bucket {
    fn new(chunk_size: usize, capacity: usize) -> Self {
        Self {
            chunk_size,
            capacity,
            free_stack: (0..capacity as u32).rev().collect(),
            in_use: 0,
        }
    }

    fn alloc(&mut self) -> Option<u32> {
        let slot = self.free_stack.pop()?;
        self.in_use += 1;
        Some(slot)
    }

    fn free(&mut self, slot: u32) {
        debug_assert!(self.in_use > 0, "double free into empty bucket");
        self.in_use -= 1;
        self.free_stack.push(slot);
    }
}

/// A handle into a specific bucket's specific slot. Opaque to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolHandle {
    bucket: u8,
    slot: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// No configured bucket's chunk size accommodates the request.
    #[error("allocation of {0} bytes fits no configured bucket")]
    OutOfBucket(usize),
    /// The matching bucket is fully allocated.
    #[error("bucket for {0} bytes is exhausted")]
    BucketExhausted(usize),
}

/// A bucket allocator initialized at startup with `(object_size, count)`
/// pairs, e.g. the source system's typical `512/1024/1024/1024/4096/1024`
/// sizing (four buckets: 512B×1024, 1024B×1024, 1024B×1024, 4096B×1024).
pub struct MemoryPool {
    buckets: Vec<Bucket>,
}

impl MemoryPool {
    /// Creates a pool from `(chunk_size, capacity)` pairs, sorted smallest
    /// chunk first so routing always finds the tightest fit.
    #[must_use]
    pub fn new(buckets: &[(usize, usize)]) -> Self {
        let mut buckets: Vec<Bucket> = buckets
            .iter()
            .map(|&(size, cap)| Bucket::new(size, cap))
            .collect();
        buckets.sort_by_key(|b| b.chunk_size);
        Self { buckets }
    }

    /// The pool sizing used throughout the source system's examples:
    /// 512, 1024, 1024, 1024, 4096 bytes, 1024 slots each.
    #[must_use]
    pub fn with_default_buckets() -> Self {
        Self::new(&[(512, 1024), (1024, 1024), (1024, 1024), (4096, 1024)])
    }

    /// Allocates `request + 16` bytes of bookkeeping slack in the smallest
    /// bucket that fits, O(1) via a free-index stack.
    pub fn alloc(&mut self, request: usize) -> Result<PoolHandle, PoolError> {
        let needed = request + 16;
        let (idx, bucket) = self
            .buckets
            .iter_mut()
            .enumerate()
            .find(|(_, b)| b.chunk_size >= needed)
            .ok_or(PoolError::OutOfBucket(request))?;
        let slot = bucket
            .alloc()
            .ok_or(PoolError::BucketExhausted(bucket.chunk_size))?;
        Ok(PoolHandle {
            bucket: idx as u8,
            slot,
        })
    }

    /// Returns a previously allocated handle to its bucket's free stack.
    /// O(1).
    pub fn free(&mut self, handle: PoolHandle) {
        self.buckets[handle.bucket as usize].free(handle.slot);
    }

    /// Total slots currently allocated across all buckets.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.buckets.iter().map(|b| b.in_use).sum()
    }

    /// Total slot capacity across all buckets.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buckets.iter().map(|b| b.capacity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_to_smallest_fitting_bucket() {
        let mut pool = MemoryPool::with_default_buckets();
        let h = pool.alloc(100).expect("fits in 512B bucket");
        assert_eq!(h.bucket, 0);
        pool.free(h);
    }

    #[test]
    fn out_of_bucket_is_fatal_error() {
        let mut pool = MemoryPool::with_default_buckets();
        assert_eq!(pool.alloc(1_000_000), Err(PoolError::OutOfBucket(1_000_000)));
    }

    #[test]
    fn exhaustion_is_reported_not_panicked() {
        let mut pool = MemoryPool::new(&[(64, 1)]);
        let h = pool.alloc(32).unwrap();
        assert_eq!(pool.alloc(32), Err(PoolError::BucketExhausted(64)));
        pool.free(h);
        assert!(pool.alloc(32).is_ok());
    }

    #[test]
    fn free_then_realloc_reuses_slot() {
        let mut pool = MemoryPool::with_default_buckets();
        let before = pool.in_use();
        let h = pool.alloc(10).unwrap();
        assert_eq!(pool.in_use(), before + 1);
        pool.free(h);
        assert_eq!(pool.in_use(), before);
    }
}
