//! Bilinear filter: blends the four texels surrounding a sample point by
//! the fractional `(frac_x, frac_y)` weights `gs-texture::uv_coord`
//! resolves. `GPU_NEAREST` simply skips this and takes the top-left
//! texel verbatim.

use crate::uv_coord::TexelAddress;

/// Blends four texels in raster order (top-left, top-right, bottom-left,
/// bottom-right) by `addr`'s fractional offsets.
#[must_use]
pub fn bilinear(addr: TexelAddress, tl: [f32; 4], tr: [f32; 4], bl: [f32; 4], br: [f32; 4]) -> [f32; 4] {
    let top: [f32; 4] = std::array::from_fn(|i| tl[i] + (tr[i] - tl[i]) * addr.frac_x);
    let bottom: [f32; 4] = std::array::from_fn(|i| bl[i] + (br[i] - bl[i]) * addr.frac_x);
    std::array::from_fn(|i| top[i] + (bottom[i] - top[i]) * addr.frac_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_texel_center_returns_top_left_unchanged() {
        let addr = TexelAddress { x: 0, y: 0, frac_x: 0.0, frac_y: 0.0 };
        let out = bilinear(addr, [1.0, 0.0, 0.0, 1.0], [0.0; 4], [0.0; 4], [0.0; 4]);
        assert_eq!(out, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn midpoint_averages_all_four_texels() {
        let addr = TexelAddress { x: 0, y: 0, frac_x: 0.5, frac_y: 0.5 };
        let out = bilinear(addr, [1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert!((out[3] - 0.25).abs() < 1e-6);
    }
}
