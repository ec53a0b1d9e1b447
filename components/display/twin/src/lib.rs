//! Display scanout: swap/present bookkeeping only — no scanout timing is
//! modeled (Section 2's component table marks this "ambient only"). A
//! `SWAP_BUFFERS` verb flips which of the two color buffer addresses is
//! "front" (the one a present reads) and which is "back" (the one the
//! Color ROP currently writes); `present` copies the front buffer out of
//! the backing store into an `image::RgbaImage` for golden-image test
//! comparisons and post-mortem snapshotting.

#![forbid(unsafe_code)]

use gs_memory::BackingStore;
use image::RgbaImage;
use thiserror::Error;

/// Double-buffered color buffer addressing.
#[derive(Clone, Copy, Debug)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub buffer_a_address: u32,
    pub buffer_b_address: u32,
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("backing store too small for a {width}x{height} present (needs {needed} bytes at {address})")]
    BackingStoreTooSmall {
        width: u32,
        height: u32,
        address: u32,
        needed: usize,
    },
}

/// Which of the two color buffers is currently front (scanned out /
/// presented) versus back (written by the Color ROP).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    A,
    B,
}

pub struct Display {
    config: DisplayConfig,
    front: Slot,
    swap_count: u64,
}

impl Display {
    #[must_use]
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            front: Slot::B,
            swap_count: 0,
        }
    }

    /// Address of the buffer the Color ROP should currently be writing.
    #[must_use]
    pub fn back_buffer_address(&self) -> u32 {
        match self.front {
            Slot::A => self.config.buffer_b_address,
            Slot::B => self.config.buffer_a_address,
        }
    }

    /// Address of the buffer a present should currently read.
    #[must_use]
    pub fn front_buffer_address(&self) -> u32 {
        match self.front {
            Slot::A => self.config.buffer_a_address,
            Slot::B => self.config.buffer_b_address,
        }
    }

    /// Flips front/back — the `SWAP_BUFFERS` verb's effect.
    pub fn swap(&mut self) {
        self.front = match self.front {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        };
        self.swap_count += 1;
    }

    #[must_use]
    pub fn swap_count(&self) -> u64 {
        self.swap_count
    }

    /// Reads the current front buffer out of `store` as RGBA8888 and
    /// builds an in-memory image, for golden-image comparisons and
    /// post-mortem snapshot dumps (Section 6: "not required for replay;
    /// only for post-mortem inspection", so no bespoke binary format is
    /// implemented here, just a standard PNG-capable image buffer).
    ///
    /// # Errors
    /// Returns [`DisplayError::BackingStoreTooSmall`] if the backing
    /// store does not hold a full frame at the front buffer's address.
    pub fn present(&self, store: &BackingStore) -> Result<RgbaImage, DisplayError> {
        let address = self.front_buffer_address();
        let pixel_count = (self.config.width * self.config.height) as usize;
        let needed = pixel_count * 4;
        if address as usize + needed > store.len() {
            return Err(DisplayError::BackingStoreTooSmall {
                width: self.config.width,
                height: self.config.height,
                address,
                needed,
            });
        }
        let bytes = store.read(address, needed as u32);
        RgbaImage::from_raw(self.config.width, self.config.height, bytes)
            .ok_or(DisplayError::BackingStoreTooSmall {
                width: self.config.width,
                height: self.config.height,
                address,
                needed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DisplayConfig {
        DisplayConfig {
            width: 4,
            height: 4,
            buffer_a_address: 0,
            buffer_b_address: 256,
        }
    }

    #[test]
    fn swap_flips_front_and_back() {
        let mut display = Display::new(config());
        let back_before = display.back_buffer_address();
        display.swap();
        assert_ne!(display.back_buffer_address(), back_before);
        assert_eq!(display.swap_count(), 1);
    }

    #[test]
    fn front_and_back_are_always_distinct() {
        let mut display = Display::new(config());
        for _ in 0..5 {
            assert_ne!(display.front_buffer_address(), display.back_buffer_address());
            display.swap();
        }
    }

    #[test]
    fn present_reads_full_frame_from_front_buffer() {
        let mut store = BackingStore::new(1024);
        store.write(0, &[255u8; 64]); // 4x4 RGBA8888
        let display = Display::new(config());
        let img = display.present(&store).expect("present should succeed");
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn present_rejects_undersized_backing_store() {
        let store = BackingStore::new(4);
        let display = Display::new(config());
        assert!(matches!(display.present(&store), Err(DisplayError::BackingStoreTooSmall { .. })));
    }
}
