//! The Z/Stencil instantiation of the generic ROP engine (spec Section
//! 4.8): wires `gs-early-z`'s per-pixel compare into `gs-rop`'s
//! read-modify-write choreography and `gs-memory`'s cache, and forwards
//! surviving fragments into the color unit on terminate.

#![forbid(unsafe_code)]

use gs_early_z::{test_fragment, EarlyZConfig};
use gs_memory::CacheConfig;
use gs_rop::{BufferSlot, RopConfig, RopEngine, RopOperation, RopStampData};

/// The Z/Stencil ROP's single operate callback: tests each of a stamp's
/// four fragments against the depth/stencil buffer and culls the ones
/// that fail (clearing `inside_triangle` so the color unit never
/// processes them), matching "Z-test forwards a surviving stamp into the
/// color unit" (spec 4.8 step 7).
pub struct ZStencilOperation {
    pub config: EarlyZConfig,
}

impl ZStencilOperation {
    #[must_use]
    pub fn new(config: EarlyZConfig) -> Self {
        Self { config }
    }
}

/// Per-fragment byte stride within a stamp's packed buffer word (four
/// 4-byte depth/stencil words, one per fragment lane).
const FRAGMENT_STRIDE: usize = 4;

impl RopOperation for ZStencilOperation {
    fn operate(&mut self, data: &mut RopStampData) {
        // Snapshot per-fragment depth inputs before mutating the cache
        // bytes, since a fragment's `inside_triangle` must stay stable
        // across every sample of this stamp (a covered-but-failing
        // sample in buffer 0 must not short-circuit testing buffer 1).
        let initial_inside: [bool; 4] = std::array::from_fn(|i| data.stamp.fragments[i].inside_triangle);
        let samples_per_fragment: [Option<[gs_rasterizer::fragment::SamplePoint; gs_twin_core::MAX_MSAA_SAMPLES]>; 4] =
            std::array::from_fn(|i| data.stamp.fragments[i].samples);
        let single_depth: [qfixed::UDepth24; 4] = std::array::from_fn(|i| data.stamp.fragments[i].z);

        let mut fragment_passed = [false; 4];

        let Some(buf) = data.buffers.first_mut() else {
            data.survives = false;
            return;
        };
        for (sample_idx, (sample_bytes, sample_mask)) in
            buf.bytes.iter_mut().zip(buf.mask.iter_mut()).enumerate()
        {
            for i in 0..4 {
                if !initial_inside[i] {
                    continue;
                }
                let lo = i * FRAGMENT_STRIDE;
                let hi = (lo + FRAGMENT_STRIDE).min(sample_bytes.len());
                if lo >= hi {
                    continue;
                }
                let depth = match &samples_per_fragment[i] {
                    Some(samples) => {
                        let point = samples[sample_idx.min(samples.len() - 1)];
                        if !point.covered {
                            continue;
                        }
                        point.depth
                    }
                    None => single_depth[i],
                };
                let existing = sample_bytes[lo..hi].to_vec();
                let result = test_fragment(&self.config, &existing, depth);
                sample_bytes[lo..hi].copy_from_slice(&result.bytes[..hi - lo]);
                sample_mask[lo..hi].copy_from_slice(&result.mask[..hi - lo]);
                if result.pass {
                    fragment_passed[i] = true;
                }
            }
        }

        let mut any_pass = false;
        for (i, fragment) in data.stamp.fragments.iter_mut().enumerate() {
            if !initial_inside[i] {
                continue;
            }
            // A fragment with no multisample coverage at all (every
            // sample point uncovered) never got tested; treat it like a
            // depth-test failure rather than a pass.
            if fragment_passed[i] {
                any_pass = true;
            } else {
                fragment.inside_triangle = false;
            }
        }
        data.survives = any_pass || data.stamp.last_fragment;
    }
}

/// Configuration for one Z/Stencil ROP instance.
#[derive(Clone, Debug)]
pub struct ZBufConfig {
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

impl ZBufConfig {
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

/// The Z/Stencil ROP engine, ready to wire into the pipeline's signal
/// graph: `zbuf.engine.input_signal_mut()` accepts stamps from the
/// interpolator, `zbuf.engine.output_signal_mut()` is read by the
/// integration layer and re-written (with culled fragments marked) into
/// the color unit's input.
pub struct ZBuf {
    pub engine: RopEngine<ZStencilOperation>,
}

impl ZBuf {
    #[must_use]
    pub fn new(config: ZBufConfig, test_config: EarlyZConfig) -> Self {
        Self {
            engine: RopEngine::new(config.rop_config(), ZStencilOperation::new(test_config)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_memory::{BackingStore, MemoryController};
    use gs_rasterizer::Fragment;
    use gs_rasterizer::Stamp;
    use gs_rop::RopCommand;
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

    fn stamp_at_depth(z: u32) -> Stamp {
        Stamp {
            fragments: std::array::from_fn(|_| Fragment {
                x: 0,
                y: 0,
                z: UDepth24::new(z),
                edge_coords: [0.0; 3],
                z_over_w: 0.0,
                parent: None,
                inside_triangle: true,
                last_fragment: false,
                samples: None,
                attributes: None,
            }),
            parent: None,
            last_fragment: false,
        }
    }

    #[test]
    fn nearer_fragment_passes_and_updates_buffer() {
        let config = ZBufConfig {
            cache: cache_config(),
            base_address: 0,
            bypass: false,
            multisampling: false,
            msaa_samples: 1,
            rop_rate: 1,
            queue_capacity: 4,
            fb_width: 64,
        };
        let mut zbuf = ZBuf::new(config, EarlyZConfig::default());
        zbuf.engine.apply_command(RopCommand::Reset);
        zbuf.engine.apply_command(RopCommand::Draw);
        let mut mc = MemoryController::new(BackingStore::new(1 << 16), 1, 8);

        zbuf.engine.input_signal_mut().write(0, stamp_at_depth(100), 0);
        let mut out = None;
        for cycle in 0..30 {
            zbuf.engine.tick(cycle, &mut mc, true);
            if let Some(reply) = mc.tick(cycle) {
                zbuf.engine.cache_mut().process_memory_transaction(&reply);
            }
            if let Some(reply) = zbuf.engine.output_signal_mut().read(cycle) {
                out = Some(reply);
            }
        }
        let out = out.expect("stamp must terminate");
        assert!(out.stamp.fragments.iter().all(|f| f.inside_triangle));
    }
}
