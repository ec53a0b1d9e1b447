//! Memory controller model and the generic ROP buffer-mode cache (spec
//! Sections 4.9 and 5's "memory-controller handshake"/"dynamic-memory
//! pool" scope boundary: DRAM row/bank timing itself is out of scope —
//! this crate models only the request/reply handshake and a flat backing
//! byte store with a configurable round-trip latency).

#![forbid(unsafe_code)]

pub mod backing_store;
pub mod rop_cache;

pub use backing_store::{BackingStore, MemoryController};
pub use rop_cache::{BlockState, CacheConfig, CacheError, LineState, RopCache};
