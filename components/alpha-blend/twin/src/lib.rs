//! Fixed-function alpha blend: the second stage of the Color ROP's
//! operate-stamp callback chain, blending the color-combiner's output
//! against the existing framebuffer color using the configured
//! src/dst [`BlendFactor`] pair.

#![forbid(unsafe_code)]

use gpu_registers::BlendFactor;

#[derive(Clone, Copy, Debug)]
pub struct AlphaBlendConfig {
    pub enable: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl Default for AlphaBlendConfig {
    fn default() -> Self {
        Self {
            enable: false,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
        }
    }
}

fn factor(which: BlendFactor, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    match which {
        BlendFactor::Zero => [0.0; 4],
        BlendFactor::One => [1.0; 4],
        BlendFactor::SrcAlpha => [src[3]; 4],
        BlendFactor::OneMinusSrcAlpha => [1.0 - src[3]; 4],
        BlendFactor::DstAlpha => [dst[3]; 4],
        BlendFactor::OneMinusDstAlpha => [1.0 - dst[3]; 4],
        BlendFactor::SrcColor => src,
        BlendFactor::OneMinusSrcColor => std::array::from_fn(|i| 1.0 - src[i]),
    }
}

/// Blends `src` over `dst`; when blending is disabled, `src` replaces
/// `dst` outright (the pass-through case every "not blended" scenario
/// relies on).
#[must_use]
pub fn blend(config: &AlphaBlendConfig, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    if !config.enable {
        return src;
    }
    let sf = factor(config.src_factor, src, dst);
    let df = factor(config.dst_factor, src, dst);
    std::array::from_fn(|i| (src[i] * sf[i] + dst[i] * df[i]).clamp(0.0, 1.0))
}
