//! Texture sampling unit: UV wrap/tile resolution, an L1/L2 block cache
//! over the shared memory controller, block decode and a bilinear
//! filter, combined into one `sample` entry point the fragment-shader
//! interpreter's `TEX` opcode and the color ROP's texture-enable path
//! both call.
//!
//! Split across submodules the way the rest of this workspace's fixed-
//! function stages are, rather than as five separate crates: the cache
//! levels, decode and filter are each simple enough that the crate
//! boundary would add indirection without adding reuse.

#![forbid(unsafe_code)]

pub mod bilinear_filter;
pub mod block_decoder;
pub mod l1_cache;
pub mod l2_cache;
pub mod uv_coord;

use gpu_registers::{TexFilter, TextureFormat, WrapMode};
use gs_memory::MemoryController;

use l1_cache::{L1Cache, L1Config};
use uv_coord::TextureDims;

/// Static binding state for one bound texture, set by register writes
/// (`TEX_BASE_ADDRESS`, `TEX_FORMAT`, `TEX_DIMS`, `TEX_WRAP_U/V`,
/// `TEX_FILTER`, `TEX_TILE_LOG2`).
#[derive(Clone, Copy, Debug)]
pub struct TextureBinding {
    pub base_address: u32,
    pub format: TextureFormat,
    pub dims: TextureDims,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub filter: TexFilter,
    pub tile_log2: u32,
}

/// Configuration for one texture sampling unit, independent of which
/// texture is currently bound.
#[derive(Clone, Copy, Debug)]
pub struct TextureUnitConfig {
    pub l1: L1Config,
}

/// A fully assembled texture sampling unit: address resolution, cache
/// and filter chained together behind one `sample` call.
pub struct TextureUnit {
    cache: L1Cache,
}

impl TextureUnit {
    #[must_use]
    pub fn new(config: TextureUnitConfig) -> Self {
        Self {
            cache: L1Cache::new(config.l1),
        }
    }

    pub fn reset(&mut self) {
        self.cache.reset();
    }

    pub fn process_memory_transaction(&mut self, reply: &gs_twin_core::memory_if::MemoryReply) {
        self.cache.process_memory_transaction(reply);
    }

    fn texel_address(binding: &TextureBinding, x: u32, y: u32) -> u32 {
        let bytes_per_texel = block_decoder::bytes_per_texel(binding.format);
        binding.base_address + (y * binding.dims.width() + x) * bytes_per_texel
    }

    fn fetch_texel(
        &mut self,
        binding: &TextureBinding,
        x: u32,
        y: u32,
        mc: &mut MemoryController,
        cycle: u64,
    ) -> Option<[f32; 4]> {
        let bytes_per_texel = block_decoder::bytes_per_texel(binding.format) as usize;
        let address = Self::texel_address(binding, x, y);
        let block_bytes = self.block_bytes();
        let aligned = (address / block_bytes) * block_bytes;
        let offset = (address - aligned) as usize;
        let block = self.cache.fetch(aligned, mc, cycle)?;
        let end = (offset + bytes_per_texel).min(block.len());
        Some(block_decoder::decode_texel(binding.format, &block[offset.min(block.len())..end]))
    }

    fn block_bytes(&self) -> u32 {
        self.cache.block_bytes()
    }

    /// Samples `binding` at normalized `(u, v)`, applying the bound
    /// filter. Returns `None` if any texel needed is not yet resident —
    /// the caller (the color ROP's operate stage) must retry the same
    /// fragment next cycle, the same backpressure contract `gs-rop`
    /// applies to its own cache misses.
    pub fn sample(
        &mut self,
        binding: &TextureBinding,
        u: f32,
        v: f32,
        mc: &mut MemoryController,
        cycle: u64,
    ) -> Option<[f32; 4]> {
        let addr = uv_coord::resolve(u, v, binding.tile_log2, binding.dims, binding.wrap_u, binding.wrap_v);
        if matches!(binding.filter, TexFilter::Nearest) {
            return self.fetch_texel(binding, addr.x, addr.y, mc, cycle);
        }

        let x1 = (addr.x + 1) % binding.dims.width();
        let y1 = (addr.y + 1) % binding.dims.height();
        let tl = self.fetch_texel(binding, addr.x, addr.y, mc, cycle)?;
        let tr = self.fetch_texel(binding, x1, addr.y, mc, cycle)?;
        let bl = self.fetch_texel(binding, addr.x, y1, mc, cycle)?;
        let br = self.fetch_texel(binding, x1, y1, mc, cycle)?;
        Some(bilinear_filter::bilinear(addr, tl, tr, bl, br))
    }
}
