//! `RasterDirection` and `BorderDirection` — resolving the distilled
//! spec's Open Question 1.
//!
//! The source carries two incompatible encodings of rasterization
//! direction: an earlier nine-named-state enum and a later bitmask,
//! partially coexisting. Per `examples/original_source`, the traversal
//! code that survived into the bitmask era uses `UP=0x01, DOWN=0x02,
//! LEFT=0x04, RIGHT=0x08`, with composite states formed by bitwise OR
//! (`CENTER = UP|DOWN`, `UP_LEFT = UP|LEFT`, ...), and a disjoint
//! `*_BORDER` family in the `0x10..=0x14` range that the traversal code
//! never combines with the basic/composite bitmask by OR — it is checked
//! on its own as a separate "are we walking off the edge of the tile"
//! signal. This module keeps that as two non-overlapping types instead
//! of one field that conflates them.

/// Basic and composite rasterization directions, OR-combinable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterDirection(u8);

impl RasterDirection {
    pub const NONE: Self = Self(0x00);
    pub const UP: Self = Self(0x01);
    pub const DOWN: Self = Self(0x02);
    pub const LEFT: Self = Self(0x04);
    pub const RIGHT: Self = Self(0x08);

    pub const CENTER: Self = Self(Self::UP.0 | Self::DOWN.0);
    pub const CENTER_LEFT: Self = Self(Self::CENTER.0 | Self::LEFT.0);
    pub const CENTER_RIGHT: Self = Self(Self::CENTER.0 | Self::RIGHT.0);
    pub const UP_LEFT: Self = Self(Self::UP.0 | Self::LEFT.0);
    pub const UP_RIGHT: Self = Self(Self::UP.0 | Self::RIGHT.0);
    pub const DOWN_LEFT: Self = Self(Self::DOWN.0 | Self::LEFT.0);
    pub const DOWN_RIGHT: Self = Self(Self::DOWN.0 | Self::RIGHT.0);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for RasterDirection {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// The tile-edge-crossing signal, a disjoint value range (`0x10..=0x14`)
/// from [`RasterDirection`] that the original traversal never ORs into
/// the basic/composite bitmask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BorderDirection {
    Border = 0x10,
    TopBorder = 0x11,
    BottomBorder = 0x12,
    LeftBorder = 0x13,
    RightBorder = 0x14,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_states_contain_their_parts() {
        assert!(RasterDirection::UP_LEFT.contains(RasterDirection::UP));
        assert!(RasterDirection::UP_LEFT.contains(RasterDirection::LEFT));
        assert!(!RasterDirection::UP_LEFT.contains(RasterDirection::RIGHT));
    }

    #[test]
    fn border_range_is_disjoint_from_direction_bits() {
        let border = BorderDirection::TopBorder as u8;
        assert!(border > RasterDirection::RIGHT.bits());
    }
}
