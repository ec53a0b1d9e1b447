//! Stipple pattern test: a per-fragment screen-space mask test that runs
//! ahead of the Color ROP's read-modify-write (a fragment that fails the
//! stipple test is culled the same way a failed Z test culls it — spec
//! 4.8's "cull flag" carried per fragment into the ROP).

#![forbid(unsafe_code)]

/// A 32x32 repeating bit pattern, one bit per pixel; a set bit means the
/// fragment at that `(x mod 32, y mod 32)` passes.
#[derive(Clone, Debug)]
pub struct StipplePattern {
    /// Row-major, 32 rows of 32 bits packed into a `u32` each.
    rows: [u32; 32],
}

impl Default for StipplePattern {
    fn default() -> Self {
        Self::solid()
    }
}

impl StipplePattern {
    #[must_use]
    pub fn solid() -> Self {
        Self { rows: [u32::MAX; 32] }
    }

    #[must_use]
    pub fn from_rows(rows: [u32; 32]) -> Self {
        Self { rows }
    }

    /// A 50% checkerboard, useful for alpha-test-style dissolve effects.
    #[must_use]
    pub fn checkerboard() -> Self {
        let mut rows = [0u32; 32];
        for (y, row) in rows.iter_mut().enumerate() {
            *row = if y % 2 == 0 { 0xAAAA_AAAA } else { 0x5555_5555 };
        }
        Self { rows }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StippleConfig {
    pub enable: bool,
}

/// Whether a fragment at `(x, y)` passes the stipple test.
#[must_use]
pub fn test(config: &StippleConfig, pattern: &StipplePattern, x: i32, y: i32) -> bool {
    if !config.enable {
        return true;
    }
    let col = x.rem_euclid(32) as u32;
    let row = y.rem_euclid(32) as usize;
    (pattern.rows[row] >> col) & 1 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_test_always_passes() {
        let config = StippleConfig { enable: false };
        let pattern = StipplePattern::from_rows([0; 32]);
        assert!(test(&config, &pattern, 5, 5));
    }

    #[test]
    fn checkerboard_alternates_by_parity() {
        let config = StippleConfig { enable: true };
        let pattern = StipplePattern::checkerboard();
        assert!(test(&config, &pattern, 0, 0));
        assert!(!test(&config, &pattern, 1, 0));
        assert!(!test(&config, &pattern, 0, 1));
        assert!(test(&config, &pattern, 1, 1));
    }

    #[test]
    fn pattern_wraps_every_32_pixels() {
        let config = StippleConfig { enable: true };
        let pattern = StipplePattern::checkerboard();
        assert_eq!(test(&config, &pattern, 0, 0), test(&config, &pattern, 32, 32));
    }
}
