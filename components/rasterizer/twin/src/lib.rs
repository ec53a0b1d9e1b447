//! Rasterizer: Triangle Setup, traversal (scanline and recursive descent),
//! and the `SetupTriangle`/`Fragment`/`Stamp` data model shared by every
//! stage downstream of Primitive Assembly (spec Sections 3, 4.4-4.6).

#![forbid(unsafe_code)]

pub mod direction;
pub mod fragment;
pub mod recursive;
pub mod setup_triangle;
pub mod traversal_scanline;
pub mod triangle_setup;
pub mod vertex;

pub use direction::{BorderDirection, RasterDirection};
pub use fragment::{Fragment, SamplePoint, Stamp};
pub use setup_triangle::{
    BoundingBoxI, BoundingBoxQ, Equation, SavedPosition, SavedSlot, SetupTriangle, TriangleArena,
    TriangleFlags, TriangleHandle,
};
pub use triangle_setup::{SetupConfig, SetupOutput, TriangleSetup};
pub use vertex::{AssembledTriangle, Attribute, Vertex};

/// Unifies the two traversal strategies a configured rasterizer can run
/// (REDESIGN FLAGS: "traversal strategy selected at configuration time
/// rather than compiled as two separate binaries").
pub trait Rasterizer {
    /// Advances the rasterizer by one cycle, given the shared triangle
    /// arena and the current Hi-Z ready signal from the interpolator.
    fn tick(&mut self, cycle: u64, arena: &mut TriangleArena, hi_z_ready: bool);

    /// Whether the rasterizer currently has no triangle in flight and no
    /// buffered work — used by the scheduler to detect quiescence.
    fn is_idle(&self) -> bool;
}

impl Rasterizer for traversal_scanline::ScanlineTraversal {
    fn tick(&mut self, cycle: u64, arena: &mut TriangleArena, hi_z_ready: bool) {
        self.tick(cycle, arena, hi_z_ready);
    }

    fn is_idle(&self) -> bool {
        self.is_idle()
    }
}

impl Rasterizer for recursive::RecursiveDescent {
    fn tick(&mut self, cycle: u64, arena: &mut TriangleArena, hi_z_ready: bool) {
        self.tick(cycle, arena, hi_z_ready);
    }

    fn is_idle(&self) -> bool {
        self.is_idle()
    }
}
