//! Fixed-function color combiner: the first stage of the Color ROP's
//! operate-stamp callback chain (spec 4.8's per-instance operation,
//! instantiated as the modulate/replace/add combine of the interpolated
//! fragment color with a sampled texel). Pure per-pixel math; no cache
//! or signal state of its own.

#![forbid(unsafe_code)]

/// Which inputs the combiner multiplies/adds together to produce the
/// combined RGBA color handed to the alpha-blend stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineMode {
    /// Use the interpolated fragment color verbatim.
    Replace,
    /// `fragment_color * texel` componentwise (the textured-quad
    /// scenario's default).
    Modulate,
    /// `fragment_color + texel`, clamped to `[0, 1]`.
    Add,
}

#[derive(Clone, Copy, Debug)]
pub struct ColorCombinerConfig {
    pub mode: CombineMode,
    pub texture_enable: bool,
}

impl Default for ColorCombinerConfig {
    fn default() -> Self {
        Self {
            mode: CombineMode::Replace,
            texture_enable: false,
        }
    }
}

/// Combines a fragment's interpolated color with an optional sampled
/// texel, per `config.mode`.
#[must_use]
pub fn combine(config: &ColorCombinerConfig, fragment_color: [f32; 4], texel: [f32; 4]) -> [f32; 4] {
    if !config.texture_enable {
        return fragment_color;
    }
    match config.mode {
        CombineMode::Replace => texel,
        CombineMode::Modulate => std::array::from_fn(|i| fragment_color[i] * texel[i]),
        CombineMode::Add => std::array::from_fn(|i| (fragment_color[i] + texel[i]).clamp(0.0, 1.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_disabled_passes_fragment_color_through() {
        let config = ColorCombinerConfig::default();
        let out = combine(&config, [1.0, 0.5, 0.25, 1.0], [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(out, [1.0, 0.5, 0.25, 1.0]);
    }

    #[test]
    fn modulate_multiplies_componentwise() {
        let config = ColorCombinerConfig {
            mode: CombineMode::Modulate,
            texture_enable: true,
        };
        let out = combine(&config, [1.0, 0.5, 1.0, 1.0], [0.5, 0.5, 0.0, 1.0]);
        assert_eq!(out, [0.5, 0.25, 0.0, 1.0]);
    }

    #[test]
    fn add_clamps_to_one() {
        let config = ColorCombinerConfig {
            mode: CombineMode::Add,
            texture_enable: true,
        };
        let out = combine(&config, [0.8, 0.0, 0.0, 1.0], [0.8, 0.0, 0.0, 1.0]);
        assert_eq!(out[0], 1.0);
    }
}
