//! Fixed-function dither: the final stage of the Color ROP's
//! operate-stamp callback chain, applied just before quantizing the
//! blended float color down to the framebuffer's integer pixel format.
//! An ordered (Bayer) dither avoids visible banding when the target
//! format has fewer bits than the blend precision.

#![forbid(unsafe_code)]

/// 4x4 Bayer dither matrix, values in `0..16` normalized to `[0, 1)` at
/// lookup time.
const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

#[derive(Clone, Copy, Debug)]
pub struct DitherConfig {
    pub enable: bool,
    /// Bits per channel of the destination format (e.g. 8 for RGBA8888,
    /// 5/6/5 averaged to 6 for RGB565).
    pub bits_per_channel: u32,
}

impl Default for DitherConfig {
    fn default() -> Self {
        Self {
            enable: false,
            bits_per_channel: 8,
        }
    }
}

fn threshold(x: i32, y: i32) -> f32 {
    let bx = (x.rem_euclid(4)) as usize;
    let by = (y.rem_euclid(4)) as usize;
    (f32::from(BAYER_4X4[by][bx]) + 0.5) / 16.0
}

/// Applies ordered dither to `color` at screen position `(x, y)`, then
/// quantizes to `bits_per_channel` and back to `[0, 1]` float so callers
/// can pack it with whatever byte layout the destination format uses.
#[must_use]
pub fn dither(config: &DitherConfig, color: [f32; 4], x: i32, y: i32) -> [f32; 4] {
    let levels = (1u32 << config.bits_per_channel.clamp(1, 16)) - 1;
    let bias = if config.enable {
        (threshold(x, y) - 0.5) / levels as f32
    } else {
        0.0
    };
    std::array::from_fn(|i| {
        let biased = (color[i] + bias).clamp(0.0, 1.0);
        (biased * levels as f32).round() / levels as f32
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_dither_only_quantizes() {
        let config = DitherConfig {
            enable: false,
            bits_per_channel: 1,
        };
        let out = dither(&config, [0.6, 0.4, 1.0, 1.0], 0, 0);
        assert_eq!(out, [1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn threshold_pattern_is_deterministic_across_the_4x4_tile() {
        let mut seen = std::collections::HashSet::new();
        for y in 0..4 {
            for x in 0..4 {
                seen.insert((threshold(x, y) * 1000.0) as i32);
            }
        }
        assert_eq!(seen.len(), 16, "every Bayer matrix cell should be distinct");
    }

    #[test]
    fn output_always_within_unit_range() {
        let config = DitherConfig {
            enable: true,
            bits_per_channel: 8,
        };
        for y in 0..8 {
            for x in 0..8 {
                let out = dither(&config, [0.999, 0.001, 0.5, 1.0], x, y);
                assert!(out.iter().all(|&c| (0.0..=1.0).contains(&c)));
            }
        }
    }
}
