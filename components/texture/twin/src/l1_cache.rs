//! L1 texture cache: small, fully-associative, checked first by every
//! sample. Misses fall through to [`crate::l2_cache::L2Cache`], which in
//! turn talks to the memory controller. There is no write path — texture
//! memory is read-only from the pipeline's point of view.

use gs_memory::MemoryController;
use gs_twin_core::memory_if::MemoryReply;

use crate::l2_cache::{L2Cache, L2Config};

struct Way {
    tag: Option<u32>,
    bytes: Vec<u8>,
}

/// Configuration for one L1 texture cache instance.
#[derive(Clone, Copy, Debug)]
pub struct L1Config {
    pub ways: u32,
    pub block_bytes: u32,
    pub l2: L2Config,
}

pub struct L1Cache {
    config: L1Config,
    ways: Vec<Way>,
    l2: L2Cache,
    lru: Vec<u32>,
}

impl L1Cache {
    #[must_use]
    pub fn new(config: L1Config) -> Self {
        let ways = (0..config.ways)
            .map(|_| Way {
                tag: None,
                bytes: vec![0; config.block_bytes as usize],
            })
            .collect();
        Self {
            l2: L2Cache::new(config.l2),
            lru: (0..config.ways).collect(),
            ways,
            config,
        }
    }

    #[must_use]
    pub fn block_bytes(&self) -> u32 {
        self.config.block_bytes
    }

    fn hit_way(&self, tag: u32) -> Option<usize> {
        self.ways.iter().position(|w| w.tag == Some(tag))
    }

    fn touch(&mut self, way: usize) {
        self.lru.retain(|&w| w != way as u32);
        self.lru.push(way as u32);
    }

    fn victim(&self) -> usize {
        self.lru[0] as usize
    }

    /// Attempts to fetch `block_address`'s block. Returns the block bytes
    /// immediately on an L1 hit; otherwise falls through to the L2 cache
    /// (and its memory request), returning `None` until the block has
    /// arrived and been installed.
    pub fn fetch(&mut self, block_address: u32, mc: &mut MemoryController, cycle: u64) -> Option<Vec<u8>> {
        let tag = block_address / self.config.block_bytes.max(1);
        if let Some(way) = self.hit_way(tag) {
            self.touch(way);
            return Some(self.ways[way].bytes.clone());
        }
        let block = self.l2.fetch(block_address, mc, cycle)?;
        let way = self.victim();
        self.ways[way].tag = Some(tag);
        self.ways[way].bytes = block.clone();
        self.touch(way);
        Some(block)
    }

    pub fn process_memory_transaction(&mut self, reply: &MemoryReply) {
        self.l2.process_memory_transaction(reply);
    }

    pub fn reset(&mut self) {
        for way in &mut self.ways {
            way.tag = None;
        }
        self.lru = (0..self.config.ways).collect();
        self.l2.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_memory::BackingStore;

    fn config() -> L1Config {
        L1Config {
            ways: 2,
            block_bytes: 64,
            l2: L2Config { lines: 4, block_bytes: 64 },
        }
    }

    #[test]
    fn repeated_fetch_of_same_block_hits_without_new_transaction() {
        let mut cache = L1Cache::new(config());
        let mut mc = MemoryController::new(BackingStore::new(1 << 16), 2, 4);
        assert!(cache.fetch(0, &mut mc, 0).is_none());
        let reply = loop {
            if let Some(r) = mc.tick(1) {
                break r;
            }
        };
        cache.process_memory_transaction(&reply);
        assert!(cache.fetch(0, &mut mc, 3).is_some());
        // second fetch is an L1 hit, no new memory transaction needed
        assert!(cache.fetch(0, &mut mc, 4).is_some());
    }

    #[test]
    fn lru_evicts_oldest_way_when_full() {
        let mut cache = L1Cache::new(config());
        let mut mc = MemoryController::new(BackingStore::new(1 << 16), 2, 4);
        for addr in [0u32, 64] {
            cache.fetch(addr, &mut mc, 0);
            while let Some(reply) = mc.tick(3) {
                cache.process_memory_transaction(&reply);
            }
            cache.fetch(addr, &mut mc, 3);
        }
        assert!(cache.hit_way(0).is_some());
        assert!(cache.hit_way(1).is_some());
        // third distinct block evicts the LRU way (tag 0, block 0)
        cache.fetch(128, &mut mc, 4);
        while let Some(reply) = mc.tick(7) {
            cache.process_memory_transaction(&reply);
        }
        cache.fetch(128, &mut mc, 7);
        assert!(cache.hit_way(0).is_none());
    }
}
