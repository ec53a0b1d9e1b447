//! Block decode: turns raw bytes fetched from a texture's backing memory
//! into a normalized RGBA float texel, per the bound [`TextureFormat`].

use gpu_registers::TextureFormat;

#[must_use]
pub fn bytes_per_texel(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Rgba8888 => 4,
        TextureFormat::Rgb565 => 2,
        TextureFormat::R8 => 1,
    }
}

/// Decodes one texel's raw bytes into normalized RGBA `[0, 1]`.
#[must_use]
pub fn decode_texel(format: TextureFormat, bytes: &[u8]) -> [f32; 4] {
    match format {
        TextureFormat::Rgba8888 => std::array::from_fn(|i| {
            f32::from(bytes.get(i).copied().unwrap_or(0)) / 255.0
        }),
        TextureFormat::Rgb565 => {
            let word = u16::from_le_bytes([bytes.first().copied().unwrap_or(0), bytes.get(1).copied().unwrap_or(0)]);
            let r = (word >> 11) & 0x1F;
            let g = (word >> 5) & 0x3F;
            let b = word & 0x1F;
            [f32::from(r) / 31.0, f32::from(g) / 63.0, f32::from(b) / 31.0, 1.0]
        }
        TextureFormat::R8 => {
            let v = f32::from(bytes.first().copied().unwrap_or(0)) / 255.0;
            [v, v, v, 1.0]
        }
    }
}

/// Decodes an entire block of `pixels * bytes_per_texel(format)` bytes
/// into texels, in raster order.
#[must_use]
pub fn decode_block(format: TextureFormat, bytes: &[u8], pixels: usize) -> Vec<[f32; 4]> {
    let stride = bytes_per_texel(format) as usize;
    (0..pixels)
        .map(|i| {
            let start = i * stride;
            let end = (start + stride).min(bytes.len());
            decode_texel(format, bytes.get(start..end).unwrap_or(&[]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8888_round_trips_to_unit_float() {
        let out = decode_texel(TextureFormat::Rgba8888, &[255, 128, 0, 255]);
        assert_eq!(out[0], 1.0);
        assert!((out[1] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn rgb565_splits_channels_and_forces_opaque() {
        // all-white: r=0x1F, g=0x3F, b=0x1F -> 0xFFFF
        let out = decode_texel(TextureFormat::Rgb565, &0xFFFFu16.to_le_bytes());
        assert!((out[0] - 1.0).abs() < 1e-5);
        assert!((out[1] - 1.0).abs() < 1e-5);
        assert_eq!(out[3], 1.0);
    }

    #[test]
    fn r8_replicates_into_rgb() {
        let out = decode_texel(TextureFormat::R8, &[64]);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[1], out[2]);
    }

    #[test]
    fn decode_block_produces_requested_pixel_count() {
        let bytes = vec![0u8; 4 * 9];
        let block = decode_block(TextureFormat::Rgba8888, &bytes, 9);
        assert_eq!(block.len(), 9);
    }
}
