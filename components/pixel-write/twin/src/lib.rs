//! The Color instantiation of the generic ROP engine (spec Section 4.8):
//! wires the fixed-function stipple test, texture sample, color
//! combiner, alpha blend and dither stages into `gs-rop`'s read-modify-
//! write choreography in the order this workspace's existing
//! fixed-function stages already assume: stipple -> texture -> combine
//! -> blend -> dither -> write.
//!
//! Texture sampling here is synchronous against a texture image decoded
//! once at bind time, not re-derived through `gs-texture`'s own L1/L2
//! cache latency model: `RopOperation::operate` runs to completion in a
//! single call with no per-cycle retry contract (unlike `gs-zbuf`'s
//! Z-test, which only ever touches the cache `gs-rop` itself drives),
//! so there is nowhere in this hook to stall a stamp on a texture cache
//! miss. `gs-texture`'s cache-latency behavior is exercised directly by
//! its own unit tests; see `DESIGN.md`.

#![forbid(unsafe_code)]

use gpu_registers::{TexFilter, TextureFormat, WrapMode};
use gs_alpha_blend::{blend, AlphaBlendConfig};
use gs_color_combiner::{combine, ColorCombinerConfig};
use gs_dither::{dither, DitherConfig};
use gs_memory::CacheConfig;
use gs_rop::{BufferSlot, RopConfig, RopEngine, RopOperation, RopStampData};
use gs_stipple::{test as stipple_test, StippleConfig, StipplePattern};
use gs_texture::bilinear_filter::bilinear;
use gs_texture::block_decoder::decode_block;
use gs_texture::uv_coord::{resolve, TextureDims};
use gs_rasterizer::vertex::slot;

/// A texture bound for synchronous sampling: decoded once (the
/// `TEX_*` register writes' effective "bind" point) rather than fetched
/// block-by-block per sample.
#[derive(Clone, Debug)]
pub struct BoundTexture {
    pub dims: TextureDims,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub filter: TexFilter,
    pub tile_log2: u32,
    texels: Vec<[f32; 4]>,
}

impl BoundTexture {
    #[must_use]
    pub fn decode(format: TextureFormat, bytes: &[u8], dims: TextureDims, wrap_u: WrapMode, wrap_v: WrapMode, filter: TexFilter, tile_log2: u32) -> Self {
        let pixels = (dims.width() * dims.height()) as usize;
        Self {
            dims,
            wrap_u,
            wrap_v,
            filter,
            tile_log2,
            texels: decode_block(format, bytes, pixels),
        }
    }

    fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let idx = (y * self.dims.width() + x) as usize;
        self.texels.get(idx).copied().unwrap_or([0.0; 4])
    }

    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let addr = resolve(u, v, self.tile_log2, self.dims, self.wrap_u, self.wrap_v);
        if matches!(self.filter, TexFilter::Nearest) {
            return self.texel(addr.x, addr.y);
        }
        let x1 = (addr.x + 1) % self.dims.width();
        let y1 = (addr.y + 1) % self.dims.height();
        bilinear(
            addr,
            self.texel(addr.x, addr.y),
            self.texel(x1, addr.y),
            self.texel(addr.x, y1),
            self.texel(x1, y1),
        )
    }
}

/// Static fixed-function configuration for the Color ROP's operate chain.
#[derive(Clone, Debug, Default)]
pub struct ColorPipelineConfig {
    pub stipple: StippleConfig,
    pub pattern: StipplePattern,
    pub combiner: ColorCombinerConfig,
    pub blend: AlphaBlendConfig,
    pub dither: DitherConfig,
    pub texture: Option<BoundTexture>,
}

/// Per-fragment byte stride within a stamp's packed buffer word (four
/// RGBA8888 words, one per fragment lane).
const FRAGMENT_STRIDE: usize = 4;

/// The Color ROP's operate callback: stipple-tests, samples the bound
/// texture, combines with the interpolated vertex color, blends against
/// the existing framebuffer color and dithers, per spec 4.8's
/// fixed-function operate chain.
pub struct ColorOperation {
    pub config: ColorPipelineConfig,
}

impl ColorOperation {
    #[must_use]
    pub fn new(config: ColorPipelineConfig) -> Self {
        Self { config }
    }
}

fn to_bytes(color: [f32; 4]) -> [u8; 4] {
    std::array::from_fn(|i| (color[i].clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn from_bytes(bytes: &[u8]) -> [f32; 4] {
    std::array::from_fn(|i| f32::from(bytes.get(i).copied().unwrap_or(0)) / 255.0)
}

impl RopOperation for ColorOperation {
    fn operate(&mut self, data: &mut RopStampData) {
        // Snapshot coverage up front: stippling can clear
        // `inside_triangle` below, but every sample plane of a
        // multisampled fragment must still be judged against the
        // fragment's original per-sample coverage, not against state a
        // prior sample iteration already mutated.
        let initial_inside: [bool; 4] = std::array::from_fn(|i| data.stamp.fragments[i].inside_triangle);
        let samples_per_fragment: [Option<[gs_rasterizer::fragment::SamplePoint; gs_twin_core::MAX_MSAA_SAMPLES]>; 4] =
            std::array::from_fn(|i| data.stamp.fragments[i].samples);

        let Some(buf) = data.buffers.first_mut() else {
            data.survives = false;
            return;
        };
        let mut any_pass = false;
        for (sample_idx, sample_bytes) in buf.bytes.iter_mut().enumerate() {
            for (i, fragment) in data.stamp.fragments.iter_mut().enumerate() {
                if !initial_inside[i] {
                    continue;
                }
                if let Some(samples) = &samples_per_fragment[i] {
                    let point = samples[sample_idx.min(samples.len() - 1)];
                    if !point.covered {
                        continue;
                    }
                }
                if !stipple_test(&self.config.stipple, &self.config.pattern, fragment.x, fragment.y) {
                    fragment.inside_triangle = false;
                    continue;
                }
                let attrs = fragment.attributes.unwrap_or_default();
                let fragment_color = attrs[slot::COLOR];
                let texel = self.config.texture.as_ref().map_or([1.0; 4], |texture| {
                    let uv = attrs[slot::TEXCOORD0];
                    texture.sample(uv[0], uv[1])
                });
                let shaded = combine(&self.config.combiner, fragment_color, texel);

                let lo = i * FRAGMENT_STRIDE;
                let hi = (lo + FRAGMENT_STRIDE).min(sample_bytes.len());
                if lo >= hi {
                    continue;
                }
                let existing = from_bytes(&sample_bytes[lo..hi]);
                let blended = blend(&self.config.blend, shaded, existing);
                let dithered = dither(&self.config.dither, blended, fragment.x, fragment.y);
                sample_bytes[lo..hi].copy_from_slice(&to_bytes(dithered)[..hi - lo]);
                any_pass = true;
            }
        }
        for (sample_idx, sample_mask) in buf.mask.iter_mut().enumerate() {
            for (i, fragment) in data.stamp.fragments.iter().enumerate() {
                let covered = match &samples_per_fragment[i] {
                    Some(samples) => fragment.inside_triangle && samples[sample_idx.min(samples.len() - 1)].covered,
                    None => fragment.inside_triangle,
                };
                let lo = i * FRAGMENT_STRIDE;
                let hi = (lo + FRAGMENT_STRIDE).min(sample_mask.len());
                if lo >= hi {
                    continue;
                }
                sample_mask[lo..hi].iter_mut().for_each(|m| *m = covered);
            }
        }
        data.survives = any_pass || data.stamp.last_fragment;
    }
}

/// Configuration for one Color ROP instance.
#[derive(Clone, Debug)]
pub struct PixelWriteConfig {
    pub cache: CacheConfig,
    pub base_address: u32,
    pub bypass: bool,
    pub multisampling: bool,
    pub msaa_samples: u32,
    pub rop_rate: u32,
    pub queue_capacity: usize,
    /// Framebuffer width in pixels, used to derive each stamp's
    /// destination address; see `RopConfig::stamp_address`.
    pub fb_width: u32,
}

impl PixelWriteConfig {
    fn rop_config(&self) -> RopConfig {
        RopConfig {
            cache: self.cache,
            buffers: vec![BufferSlot {
                bypass: self.bypass,
                read_data: true,
                bytes_per_pixel: 4 * FRAGMENT_STRIDE as u32,
                base_address: self.base_address,
            }],
            multisampling: self.multisampling,
            msaa_samples: self.msaa_samples,
            rop_rate: self.rop_rate,
            input_queue_capacity: self.queue_capacity,
            read_queue_capacity: self.queue_capacity,
            op_queue_capacity: self.queue_capacity,
            write_queue_capacity: self.queue_capacity,
            stride_pixels: self.fb_width,
        }
    }
}

/// The Color ROP engine, the pipeline's final fixed-function write
/// stage: `pixel_write.engine.input_signal_mut()` accepts the stamps the
/// integration layer re-wrote from `gs-zbuf`'s surviving output.
pub struct PixelWrite {
    pub engine: RopEngine<ColorOperation>,
}

impl PixelWrite {
    #[must_use]
    pub fn new(config: PixelWriteConfig, pipeline: ColorPipelineConfig) -> Self {
        Self {
            engine: RopEngine::new(config.rop_config(), ColorOperation::new(pipeline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_registers::BlendFactor;
    use gs_color_combiner::CombineMode;
    use gs_memory::{BackingStore, MemoryController};
    use gs_rasterizer::fragment::{Fragment, Stamp};
    use gs_rop::RopCommand;
    use gs_twin_core::MAX_VERTEX_ATTRIBUTES;
    use qfixed::UDepth24;

    fn cache_config() -> CacheConfig {
        CacheConfig {
            ways: 2,
            lines: 4,
            pixels_per_line: 4,
            bytes_per_pixel: 4,
            compr_disabled: false,
        }
    }

    fn red_stamp() -> Stamp {
        let mut attrs = [[0.0f32; 4]; MAX_VERTEX_ATTRIBUTES];
        attrs[slot::COLOR] = [1.0, 0.0, 0.0, 1.0];
        Stamp {
            fragments: std::array::from_fn(|_| Fragment {
                x: 0,
                y: 0,
                z: UDepth24::default(),
                edge_coords: [0.0; 3],
                z_over_w: 0.0,
                parent: None,
                inside_triangle: true,
                last_fragment: false,
                samples: None,
                attributes: Some(attrs),
            }),
            parent: None,
            last_fragment: false,
        }
    }

    fn pipeline() -> ColorPipelineConfig {
        ColorPipelineConfig {
            stipple: StippleConfig { enable: false },
            pattern: StipplePattern::solid(),
            combiner: ColorCombinerConfig { mode: CombineMode::Replace, texture_enable: false },
            blend: AlphaBlendConfig { enable: false, src_factor: BlendFactor::One, dst_factor: BlendFactor::Zero },
            dither: DitherConfig { enable: false, bits_per_channel: 8 },
            texture: None,
        }
    }

    #[test]
    fn opaque_red_fragment_writes_red_bytes() {
        let config = PixelWriteConfig {
            cache: cache_config(),
            base_address: 0,
            bypass: false,
            multisampling: false,
            msaa_samples: 1,
            rop_rate: 1,
            queue_capacity: 4,
            fb_width: 64,
        };
        let mut pw = PixelWrite::new(config, pipeline());
        pw.engine.apply_command(RopCommand::Reset);
        pw.engine.apply_command(RopCommand::Draw);
        let mut mc = MemoryController::new(BackingStore::new(1 << 16), 1, 8);

        pw.engine.input_signal_mut().write(0, red_stamp(), 0);
        let mut out = None;
        for cycle in 0..30 {
            pw.engine.tick(cycle, &mut mc, true);
            if let Some(reply) = mc.tick(cycle) {
                pw.engine.cache_mut().process_memory_transaction(&reply);
            }
            if let Some(reply) = pw.engine.output_signal_mut().read(cycle) {
                out = Some(reply);
            }
        }
        let out = out.expect("stamp must terminate");
        let expected_pixel = [255u8, 0, 0, 255];
        for fragment in 0..4 {
            let lo = fragment * FRAGMENT_STRIDE;
            let hi = lo + FRAGMENT_STRIDE;
            assert_eq!(
                out.buffers[0].bytes[0][lo..hi],
                expected_pixel,
                "fragment {fragment} should hold opaque red"
            );
            assert!(
                out.buffers[0].mask[0][lo..hi].iter().all(|&m| m),
                "fragment {fragment} should be marked written"
            );
        }
    }

    fn single_sample_covered_stamp() -> Stamp {
        use gs_rasterizer::fragment::SamplePoint;
        let mut attrs = [[0.0f32; 4]; MAX_VERTEX_ATTRIBUTES];
        attrs[slot::COLOR] = [1.0, 0.0, 0.0, 1.0];
        let mut samples = [SamplePoint::default(); gs_twin_core::MAX_MSAA_SAMPLES];
        samples[1] = SamplePoint { depth: UDepth24::default(), covered: true };
        Stamp {
            fragments: std::array::from_fn(|i| Fragment {
                x: 0,
                y: 0,
                z: UDepth24::default(),
                edge_coords: [0.0; 3],
                z_over_w: 0.0,
                parent: None,
                inside_triangle: i == 0,
                last_fragment: false,
                samples: if i == 0 { Some(samples) } else { None },
                attributes: Some(attrs),
            }),
            parent: None,
            last_fragment: false,
        }
    }

    #[test]
    fn partially_covered_multisample_fragment_writes_only_its_covered_sample_plane() {
        let config = PixelWriteConfig {
            cache: cache_config(),
            base_address: 0,
            bypass: false,
            multisampling: true,
            msaa_samples: 4,
            rop_rate: 1,
            queue_capacity: 4,
            fb_width: 64,
        };
        let mut pw = PixelWrite::new(config, pipeline());
        pw.engine.apply_command(RopCommand::Reset);
        pw.engine.apply_command(RopCommand::Draw);
        let mut mc = MemoryController::new(BackingStore::new(1 << 16), 1, 8);

        pw.engine.input_signal_mut().write(0, single_sample_covered_stamp(), 0);
        let mut out = None;
        for cycle in 0..30 {
            pw.engine.tick(cycle, &mut mc, true);
            if let Some(reply) = mc.tick(cycle) {
                pw.engine.cache_mut().process_memory_transaction(&reply);
            }
            if let Some(reply) = pw.engine.output_signal_mut().read(cycle) {
                out = Some(reply);
            }
        }
        let out = out.expect("stamp must terminate");
        let covered_planes = out
            .buffers[0]
            .mask
            .iter()
            .filter(|plane| plane[0..FRAGMENT_STRIDE].iter().any(|&m| m))
            .count();
        assert_eq!(covered_planes, 1, "only the one covered sample plane (weight 1/4) should be marked written");
        assert!(out.buffers[0].mask[1][0], "sample index 1 is the covered plane");
    }
}
