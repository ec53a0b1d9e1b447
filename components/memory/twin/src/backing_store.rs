//! Flat backing byte store plus a minimal memory-controller model that
//! answers [`gs_twin_core::memory_if::MemoryTransaction`]s after a
//! configurable round-trip latency. No row/bank/refresh timing is
//! modeled (spec Section 1's scope boundary).

use std::collections::VecDeque;

use gs_twin_core::memory_if::{MemoryReply, MemoryState, MemoryTransaction};

/// A flat, growable byte array addressed by `u32` offset — the
/// simulator's entire addressable memory space (color/depth buffers,
/// textures, register-written data).
pub struct BackingStore {
    bytes: Vec<u8>,
}

impl BackingStore {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn read(&self, address: u32, len: u32) -> Vec<u8> {
        let start = address as usize;
        let end = (start + len as usize).min(self.bytes.len());
        if start >= self.bytes.len() {
            return vec![0; len as usize];
        }
        let mut out = self.bytes[start..end].to_vec();
        out.resize(len as usize, 0);
        out
    }

    pub fn write(&mut self, address: u32, bytes: &[u8]) {
        let start = address as usize;
        let end = (start + bytes.len()).min(self.bytes.len());
        if start >= self.bytes.len() {
            return;
        }
        let n = end - start;
        self.bytes[start..start + n].copy_from_slice(&bytes[..n]);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

struct InFlight {
    tx: MemoryTransaction,
    ready_at: u64,
}

/// Accepts one [`MemoryTransaction`] per cycle (while accepting), applies
/// a fixed round-trip latency, and returns a reply for reads. Writes are
/// applied to the backing store immediately and acknowledged with an
/// empty-bytes reply once their latency elapses, matching the cache's
/// "merge an incoming reply into the waiting line" contract for both
/// directions.
pub struct MemoryController {
    store: BackingStore,
    latency: u64,
    in_flight: VecDeque<InFlight>,
    max_in_flight: usize,
}

impl MemoryController {
    #[must_use]
    pub fn new(store: BackingStore, latency: u64, max_in_flight: usize) -> Self {
        Self {
            store,
            latency,
            in_flight: VecDeque::new(),
            max_in_flight,
        }
    }

    #[must_use]
    pub fn store(&self) -> &BackingStore {
        &self.store
    }

    #[must_use]
    pub fn state(&self) -> MemoryState {
        MemoryState {
            accepting_requests: self.in_flight.len() < self.max_in_flight,
        }
    }

    /// Accepts a transaction if the controller has room in flight.
    /// Returns `false` if the caller should retry next cycle.
    #[must_use]
    pub fn submit(&mut self, cycle: u64, tx: MemoryTransaction) -> bool {
        if self.in_flight.len() >= self.max_in_flight {
            return false;
        }
        if let MemoryTransaction::Write { address, ref bytes, .. } = tx {
            self.store.write(address, bytes);
        }
        self.in_flight.push_back(InFlight {
            tx,
            ready_at: cycle + self.latency,
        });
        true
    }

    /// Advances the controller by one cycle, returning a reply if the
    /// oldest in-flight transaction has completed.
    pub fn tick(&mut self, cycle: u64) -> Option<MemoryReply> {
        let ready = matches!(self.in_flight.front(), Some(f) if f.ready_at <= cycle);
        if !ready {
            return None;
        }
        let completed = self.in_flight.pop_front()?;
        let bytes = match completed.tx {
            MemoryTransaction::Read { address, len, .. } => self.store.read(address, len),
            MemoryTransaction::Write { .. } => Vec::new(),
        };
        Some(MemoryReply {
            tag: completed.tx.tag(),
            bytes,
        })
    }
}
