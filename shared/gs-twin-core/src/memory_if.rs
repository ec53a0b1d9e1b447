//! Memory-controller handshake: request/reply types shared by every ROP
//! cache front and the texture block fetcher.
//!
//! Per the spec's scope boundary this models only the handshake — a
//! request carries an address and size, a reply carries the bytes and a
//! line state; there is no DRAM row/bank timing here, only a
//! configurable round-trip latency the memory backend (`gs-memory`)
//! applies.

/// One outstanding read or write request issued to the memory backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryTransaction {
    Read { address: u32, len: u32, tag: u32 },
    Write { address: u32, bytes: Vec<u8>, tag: u32 },
}

impl MemoryTransaction {
    #[must_use]
    pub fn tag(&self) -> u32 {
        match self {
            MemoryTransaction::Read { tag, .. } | MemoryTransaction::Write { tag, .. } => *tag,
        }
    }

    #[must_use]
    pub fn address(&self) -> u32 {
        match self {
            MemoryTransaction::Read { address, .. } | MemoryTransaction::Write { address, .. } => {
                *address
            }
        }
    }
}

/// The reply to a [`MemoryTransaction`], matched back to its request by
/// `tag`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryReply {
    pub tag: u32,
    pub bytes: Vec<u8>,
}

/// Coarse state of the memory subsystem a cache's `update` call observes
/// each cycle — e.g. whether it may issue a new transaction this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryState {
    pub accepting_requests: bool,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            accepting_requests: true,
        }
    }
}
