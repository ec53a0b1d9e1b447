//! The ROP buffer-mode cache (spec Section 4.9): a set-associative cache
//! of `ways * lines` lines, each backed by the [`MemoryController`], used
//! by both the Z/Stencil and Color ROP instantiations.

use std::collections::HashMap;

use gs_twin_core::memory_if::{MemoryReply, MemoryState, MemoryTransaction};

use crate::backing_store::MemoryController;

/// A cache line's occupancy state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineState {
    Invalid,
    Clean,
    Dirty,
    ReservedForWrite,
    InTransitRead,
    InTransitWrite,
}

/// Per-block compression metadata, persisted alongside the color/depth
/// buffer in the block-state memory (glossary: "Block-state memory").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockState {
    pub compressed: bool,
    pub cleared: bool,
}

impl BlockState {
    fn to_byte(self) -> u8 {
        u8::from(self.compressed) | (u8::from(self.cleared) << 1)
    }

    fn from_byte(byte: u8) -> Self {
        Self {
            compressed: byte & 0b01 != 0,
            cleared: byte & 0b10 != 0,
        }
    }
}

/// Byte width of one block's persisted entry in the backing state buffer.
const STATE_ENTRY_BYTES: u32 = 1;

/// Which direction `step_state_iteration` moves a block-state entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StateOp {
    Save,
    Restore,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("way/line index ({0}, {1}) out of range")]
    OutOfRange(u32, u32),
}

struct Line {
    state: LineState,
    tag: Option<u32>,
    bytes: Vec<u8>,
    pending_tag: Option<u32>,
}

/// A set-associative cache: `ways` sets of `lines` lines each, each line
/// `pixels_per_line * bytes_per_pixel` bytes.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub ways: u32,
    pub lines: u32,
    pub pixels_per_line: u32,
    pub bytes_per_pixel: u32,
    pub compr_disabled: bool,
}

impl CacheConfig {
    #[must_use]
    pub fn line_bytes(&self) -> usize {
        (self.pixels_per_line * self.bytes_per_pixel) as usize
    }
}

pub struct RopCache {
    config: CacheConfig,
    base_address: u32,
    lines: Vec<Line>,
    block_state: HashMap<u32, BlockState>,
    next_tag: u32,
    save_restore_cursor: usize,
    flush_cursor: usize,
}

impl RopCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let count = (config.ways * config.lines) as usize;
        let line_bytes = config.line_bytes();
        let lines = (0..count)
            .map(|_| Line {
                state: LineState::Invalid,
                tag: None,
                bytes: vec![0; line_bytes],
                pending_tag: None,
            })
            .collect();
        Self {
            config,
            base_address: 0,
            lines,
            block_state: HashMap::new(),
            next_tag: 0,
            save_restore_cursor: 0,
            flush_cursor: 0,
        }
    }

    fn index(&self, way: u32, line: u32) -> Result<usize, CacheError> {
        if way >= self.config.ways || line >= self.config.lines {
            return Err(CacheError::OutOfRange(way, line));
        }
        Ok((way * self.config.lines + line) as usize)
    }

    fn slot_for_address(&self, address: u32) -> (u32, u32) {
        let line_bytes = self.config.line_bytes().max(1) as u32;
        let block = address / line_bytes;
        let set = block % self.config.lines.max(1);
        let way = (block / self.config.lines.max(1)) % self.config.ways.max(1);
        (way, set)
    }

    /// Resets every line to `Invalid` and clears the block-state table.
    pub fn reset(&mut self) {
        for l in &mut self.lines {
            l.state = LineState::Invalid;
            l.tag = None;
            l.pending_tag = None;
        }
        self.block_state.clear();
        self.save_restore_cursor = 0;
        self.flush_cursor = 0;
    }

    /// Flushes and rebinds the cache to a new backing buffer address.
    pub fn swap(&mut self, base_address: u32) {
        self.reset();
        self.base_address = base_address;
    }

    /// Attempts to bring `address`'s line into a readable state,
    /// returning `(way, line)` on success. Spawns a read transaction on
    /// miss; re-entrant — callers retry on a later cycle.
    pub fn fetch(
        &mut self,
        address: u32,
        mc: &mut MemoryController,
        cycle: u64,
    ) -> Result<Option<(u32, u32)>, CacheError> {
        let (way, set) = self.slot_for_address(address);
        let idx = self.index(way, set)?;
        let tag = address / self.config.line_bytes().max(1) as u32;
        let line = &mut self.lines[idx];
        match line.state {
            LineState::Clean | LineState::Dirty if line.tag == Some(tag) => Ok(Some((way, set))),
            LineState::InTransitRead if line.tag == Some(tag) => Ok(None),
            _ => {
                self.next_tag += 1;
                let mc_tag = self.next_tag;
                if mc.submit(
                    cycle,
                    MemoryTransaction::Read {
                        address: self.base_address + address,
                        len: self.config.line_bytes() as u32,
                        tag: mc_tag,
                    },
                ) {
                    line.state = LineState::InTransitRead;
                    line.tag = Some(tag);
                    line.pending_tag = Some(mc_tag);
                    Ok(None)
                } else {
                    Ok(None) // memory backend busy, retry next cycle
                }
            }
        }
    }

    /// Reserves a line for write-only access without reading its prior
    /// contents, evicting a dirty line's contents to memory first if one
    /// occupies the slot.
    pub fn allocate(
        &mut self,
        address: u32,
        mc: &mut MemoryController,
        cycle: u64,
    ) -> Result<Option<(u32, u32)>, CacheError> {
        let (way, set) = self.slot_for_address(address);
        let idx = self.index(way, set)?;
        let tag = address / self.config.line_bytes().max(1) as u32;
        let line = &mut self.lines[idx];
        if line.state == LineState::Dirty && line.tag != Some(tag) {
            let evict_addr = self.base_address + line.tag.unwrap_or(0) * self.config.line_bytes() as u32;
            self.next_tag += 1;
            let _ = mc.submit(
                cycle,
                MemoryTransaction::Write {
                    address: evict_addr,
                    bytes: line.bytes.clone(),
                    tag: self.next_tag,
                },
            );
        }
        line.state = LineState::ReservedForWrite;
        line.tag = Some(tag);
        Ok(Some((way, set)))
    }

    pub fn read(&self, way: u32, line: u32, bytes: u32, dst: &mut [u8]) -> Result<bool, CacheError> {
        let idx = self.index(way, line)?;
        let line = &self.lines[idx];
        let n = (bytes as usize).min(line.bytes.len()).min(dst.len());
        dst[..n].copy_from_slice(&line.bytes[..n]);
        Ok(true)
    }

    pub fn write(
        &mut self,
        way: u32,
        line: u32,
        src: &[u8],
        mask: &[bool],
    ) -> Result<bool, CacheError> {
        let idx = self.index(way, line)?;
        let l = &mut self.lines[idx];
        for (i, &write) in mask.iter().enumerate() {
            if write && i < l.bytes.len() && i < src.len() {
                l.bytes[i] = src[i];
            }
        }
        l.state = LineState::Dirty;
        let compressible = !self.config.compr_disabled && l.bytes.iter().all(|&b| b == l.bytes[0]);
        if let Some(tag) = l.tag {
            let entry = self.block_state.entry(tag).or_default();
            entry.compressed = compressible;
            // A real write always supersedes a prior fast-clear: the
            // block now holds drawn data, not the clear value.
            entry.cleared = false;
        }
        Ok(true)
    }

    /// Marks every currently resident line's block-state as cleared
    /// (spec 4.9's per-block cleared flag): a full-surface clear writes
    /// the clear color straight to the backing store without touching
    /// cache-resident lines, so a later `restore_state` that finds a
    /// pre-clear snapshot with `cleared == false` knows to re-dirty that
    /// line and flush its real bytes back out, undoing the clear.
    pub fn mark_resident_cleared(&mut self) {
        let tags: Vec<u32> = self.lines.iter().filter_map(|l| l.tag).collect();
        for tag in tags {
            self.block_state.entry(tag).or_default().cleared = true;
        }
    }

    /// Advances cache state by one cycle, merging at most one completed
    /// memory reply into its waiting line and emitting at most one
    /// outstanding transaction.
    pub fn update(&mut self, _state: MemoryState) -> Option<MemoryTransaction> {
        None // transaction issuance happens inline in fetch/allocate/write-back
    }

    /// Merges an incoming reply into the line that issued the matching
    /// pending tag.
    pub fn process_memory_transaction(&mut self, reply: &MemoryReply) {
        for line in &mut self.lines {
            if line.pending_tag == Some(reply.tag) {
                let n = line.bytes.len().min(reply.bytes.len());
                line.bytes[..n].copy_from_slice(&reply.bytes[..n]);
                line.state = LineState::Clean;
                line.pending_tag = None;
            }
        }
    }

    /// Iterates every physical line, writing any still-`Dirty` line's
    /// bytes back to its real memory address and marking it `Clean`.
    /// This cache is write-back (`write` only marks a line dirty;
    /// `allocate` only evicts the one line a conflicting tag lands on),
    /// so without a flush a resident dirty line never reaches the
    /// backing buffer. One line per call; returns `false` while work
    /// remains.
    pub fn flush(&mut self, mc: &mut MemoryController, cycle: u64) -> bool {
        let total = self.lines.len();
        if self.flush_cursor >= total {
            self.flush_cursor = 0;
            return true;
        }
        let idx = self.flush_cursor;
        if self.lines[idx].state == LineState::Dirty {
            if let Some(tag) = self.lines[idx].tag {
                let address = self.base_address + tag * self.config.line_bytes() as u32;
                let bytes = self.lines[idx].bytes.clone();
                self.next_tag += 1;
                if !mc.submit(cycle, MemoryTransaction::Write { address, bytes, tag: self.next_tag }) {
                    return false; // memory backend busy, retry this line next cycle
                }
                self.lines[idx].state = LineState::Clean;
            }
        }
        self.flush_cursor += 1;
        false
    }

    /// Iterates the cache's physical lines, writing each occupied line's
    /// block-state entry out to `state_base` in the backing buffer one
    /// entry per call. Returns `false` while work remains; the caller is
    /// expected to call this again on a later cycle until it returns
    /// `true`, matching the pipeline's other call-until-done verbs.
    pub fn save_state(&mut self, state_base: u32, mc: &mut MemoryController, cycle: u64) -> bool {
        self.step_state_iteration(state_base, mc, cycle, StateOp::Save)
    }

    /// Iterates the cache's physical lines, reloading each occupied
    /// line's block-state entry from `state_base` in the backing buffer.
    pub fn restore_state(&mut self, state_base: u32, mc: &mut MemoryController, cycle: u64) -> bool {
        self.step_state_iteration(state_base, mc, cycle, StateOp::Restore)
    }

    /// Iterates the cache's physical lines, clearing each occupied
    /// line's block-state entry both in memory and in the backing
    /// buffer's persisted copy.
    pub fn reset_state(&mut self, state_base: u32, mc: &mut MemoryController, cycle: u64) -> bool {
        self.step_state_iteration(state_base, mc, cycle, StateOp::Reset)
    }

    fn step_state_iteration(&mut self, state_base: u32, mc: &mut MemoryController, cycle: u64, op: StateOp) -> bool {
        let total = self.lines.len();
        if self.save_restore_cursor >= total {
            self.save_restore_cursor = 0;
            return true;
        }
        let idx = self.save_restore_cursor;
        if let Some(tag) = self.lines[idx].tag {
            let address = state_base + tag * STATE_ENTRY_BYTES;
            match op {
                StateOp::Save => {
                    let byte = self.block_state.get(&tag).copied().unwrap_or_default().to_byte();
                    self.next_tag += 1;
                    if !mc.submit(
                        cycle,
                        MemoryTransaction::Write { address, bytes: vec![byte], tag: self.next_tag },
                    ) {
                        return false; // memory backend busy, retry this entry next cycle
                    }
                }
                StateOp::Restore => {
                    let bytes = mc.store().read(address, STATE_ENTRY_BYTES);
                    let state = BlockState::from_byte(bytes.first().copied().unwrap_or(0));
                    self.block_state.insert(tag, state);
                    // The saved snapshot predates a clear that left this
                    // physical line's real bytes untouched; re-dirty it
                    // so the next flush restores them to the backing
                    // store in place of the clear value.
                    if !state.cleared {
                        self.lines[idx].state = LineState::Dirty;
                    }
                }
                StateOp::Reset => {
                    self.block_state.remove(&tag);
                    self.next_tag += 1;
                    if !mc.submit(
                        cycle,
                        MemoryTransaction::Write { address, bytes: vec![0], tag: self.next_tag },
                    ) {
                        return false;
                    }
                }
            }
        }
        self.save_restore_cursor += 1;
        false
    }

    #[must_use]
    pub fn block_state(&self, tag: u32) -> BlockState {
        self.block_state.get(&tag).copied().unwrap_or_default()
    }
}
