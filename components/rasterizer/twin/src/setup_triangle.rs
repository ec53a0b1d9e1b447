//! `SetupTriangle`: the core geometric entity (Section 3), stored in a
//! [`gs_twin_core::arena::Arena`] and addressed everywhere downstream by
//! [`TriangleHandle`] instead of a pointer (REDESIGN FLAGS: "cyclic
//! refcount between `SetupTriangle` and its consumers").

use gs_twin_core::arena::{Arena, Handle};
use gs_twin_core::MAX_VERTEX_ATTRIBUTES;
use qfixed::Q12_4;

use crate::direction::RasterDirection;
use crate::vertex::Attribute;

/// A stable handle to a live [`SetupTriangle`] in a [`TriangleArena`].
pub type TriangleHandle = Handle<SetupTriangle>;

/// An arena owning every `SetupTriangle` currently in flight.
pub type TriangleArena = Arena<SetupTriangle>;

/// `edge.a * x + edge.b * y + edge.c`: one triangle-edge or Z-interpolation
/// half-plane equation, evaluated in the rasterizer's screen coordinate
/// system.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Equation {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Equation {
    #[must_use]
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }

    /// Negates all three coefficients — used to invert an edge equation
    /// when a back-facing triangle is not culled, so downstream
    /// traversal math can always assume front-facing winding.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            a: -self.a,
            b: -self.b,
            c: -self.c,
        }
    }
}

/// One of the up-to-eight saved rasterization positions (right/down/up,
/// four tile-save slots, raster-start), each a snapshot of the three edge
/// equations' `c` term, the Z equation's `c` term, and the `(x, y)`
/// position they were evaluated at.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SavedPosition {
    pub edge_c: [f64; 3],
    pub z_c: f64,
    pub x: i32,
    pub y: i32,
    pub valid: bool,
}

/// Index into `SetupTriangle::saved` — the eight named slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum SavedSlot {
    Right = 0,
    Down = 1,
    Up = 2,
    Tile0 = 3,
    Tile1 = 4,
    Tile2 = 5,
    Tile3 = 6,
    RasterStart = 7,
}

pub const NUM_SAVED_POSITIONS: usize = 8;

/// Integer screen-space bounding box, inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBoxI {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

/// Sub-pixel fixed-point bounding box in `Q12_4` screen units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBoxQ {
    pub min_x: Q12_4,
    pub min_y: Q12_4,
    pub max_x: Q12_4,
    pub max_y: Q12_4,
}

/// Per-triangle bit flags (Section 3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriangleFlags {
    pub first_stamp: bool,
    pub last_fragment: bool,
    pub pre_bound_triangle: bool,
}

/// The core geometric entity flowing from Triangle Setup through the
/// rasterizer to the interpolator.
#[derive(Clone, Debug)]
pub struct SetupTriangle {
    pub id: u64,
    pub attributes: [[Attribute; MAX_VERTEX_ATTRIBUTES]; 3],
    /// Non-homogeneous per-vertex `(x/w, y/w, z/w, 1/w)`.
    pub inv_w: [[f64; 4]; 3],
    pub edges: [Equation; 3],
    pub z_eq: Equation,
    pub bbox_i: BoundingBoxI,
    pub bbox_q: BoundingBoxQ,
    pub signed_area: f64,
    pub screen_area_fraction: f64,
    pub pos_x: i32,
    pub pos_y: i32,
    pub saved: [SavedPosition; NUM_SAVED_POSITIONS],
    pub direction: RasterDirection,
    pub tile_direction: RasterDirection,
    pub flags: TriangleFlags,
    /// Whether this is the last triangle of its batch — propagated
    /// through every stamp lane as the last-fragment sentinel once
    /// traversal finishes this triangle.
    pub last_triangle: bool,
    /// Set by Triangle Setup when face-culling rejects this triangle.
    /// A culled triangle still occupies the arena and still flushes the
    /// last-triangle sentinel, but every fragment generated from it
    /// reports `inside_triangle = false` so it never reaches a ROP
    /// (Section 8: "a batch whose entire geometry is backface-culled
    /// produces zero fragments at the interpolator").
    pub culled: bool,
}

impl SetupTriangle {
    /// Inverts all three edge equations (but not the Z equation), per
    /// the data-model invariant "inverting edge equations negates a, b, c
    /// of all three."
    pub fn invert_edges(&mut self) {
        for e in &mut self.edges {
            *e = e.inverted();
        }
    }

    #[must_use]
    pub fn save(&self, slot: SavedSlot, x: i32, y: i32) -> SavedPosition {
        let _ = slot;
        SavedPosition {
            edge_c: [self.edges[0].c, self.edges[1].c, self.edges[2].c],
            z_c: self.z_eq.c,
            x,
            y,
            valid: true,
        }
    }

    pub fn store_saved(&mut self, slot: SavedSlot, pos: SavedPosition) {
        self.saved[slot as usize] = pos;
    }

    #[must_use]
    pub fn restore(&self, slot: SavedSlot) -> Option<SavedPosition> {
        let pos = self.saved[slot as usize];
        pos.valid.then_some(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(id: u64) -> SetupTriangle {
        SetupTriangle {
            id,
            attributes: [[[0.0; 4]; MAX_VERTEX_ATTRIBUTES]; 3],
            inv_w: [[1.0; 4]; 3],
            edges: [Equation { a: 1.0, b: 0.0, c: 0.0 }; 3],
            z_eq: Equation::default(),
            bbox_i: BoundingBoxI::default(),
            bbox_q: BoundingBoxQ::default(),
            signed_area: 10.0,
            screen_area_fraction: 0.1,
            pos_x: 0,
            pos_y: 0,
            saved: [SavedPosition::default(); NUM_SAVED_POSITIONS],
            direction: RasterDirection::NONE,
            tile_direction: RasterDirection::NONE,
            flags: TriangleFlags::default(),
            last_triangle: false,
            culled: false,
        }
    }

    #[test]
    fn invert_edges_negates_abc_but_not_z() {
        let mut t = dummy(1);
        t.z_eq = Equation { a: 2.0, b: 3.0, c: 4.0 };
        t.invert_edges();
        assert_eq!(t.edges[0], Equation { a: -1.0, b: 0.0, c: 0.0 });
        assert_eq!(t.z_eq, Equation { a: 2.0, b: 3.0, c: 4.0 });
    }

    #[test]
    fn saved_slot_valid_iff_flag_set() {
        let t = dummy(1);
        assert_eq!(t.restore(SavedSlot::Right), None);
        let mut t = t;
        let pos = t.save(SavedSlot::Right, 4, 5);
        t.store_saved(SavedSlot::Right, pos);
        assert_eq!(t.restore(SavedSlot::Right).map(|p| (p.x, p.y)), Some((4, 5)));
    }

    #[test]
    fn arena_refcount_lifecycle() {
        let mut arena: TriangleArena = TriangleArena::new();
        let h = arena.insert(dummy(1));
        assert_eq!(arena.refcount(h), Some(1));
        arena.acquire(h); // a Fragment takes a handle
        arena.acquire(h); // a Tile takes a handle
        arena.release(h); // fragment done
        assert!(arena.get(h).is_some());
        arena.release(h); // tile done
        arena.release(h); // setup's own handle drops
        assert!(arena.get(h).is_none());
    }
}
