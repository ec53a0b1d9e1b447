//! `Fragment` and `Stamp` (Section 3).

use gs_twin_core::{MAX_MSAA_SAMPLES, MAX_VERTEX_ATTRIBUTES};
use qfixed::UDepth24;

use crate::setup_triangle::TriangleHandle;
use crate::vertex::Attribute;

/// Per-sample depth + coverage, used only when multisampling is enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SamplePoint {
    pub depth: UDepth24,
    pub covered: bool,
}

/// One rasterized sample point: screen coordinate, depth, barycentric
/// coordinates, a non-owning handle to its parent triangle, and (when
/// multisampling is enabled) per-sample depth/coverage.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub x: i32,
    pub y: i32,
    pub z: UDepth24,
    /// The three edge-equation (barycentric-ish) values at this pixel.
    pub edge_coords: [f64; 3],
    pub z_over_w: f64,
    pub parent: Option<TriangleHandle>,
    pub inside_triangle: bool,
    pub last_fragment: bool,
    pub samples: Option<[SamplePoint; MAX_MSAA_SAMPLES]>,
    /// Attributes filled in by the interpolator; `None` until then.
    pub attributes: Option<[Attribute; MAX_VERTEX_ATTRIBUTES]>,
}

impl Fragment {
    /// The sentinel "empty" fragment used to flush per-triangle state
    /// through the downstream pipeline (the "last-fragment sentinel" in
    /// the glossary): no parent, no attributes, `last_fragment` set.
    #[must_use]
    pub fn sentinel() -> Self {
        Self {
            x: 0,
            y: 0,
            z: UDepth24::default(),
            edge_coords: [0.0; 3],
            z_over_w: 0.0,
            parent: None,
            inside_triangle: false,
            last_fragment: true,
            samples: None,
            attributes: None,
        }
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.parent.is_none()
    }
}

/// A 2x2 group of four fragments sharing a triangle and a tile — the
/// atomic unit passed through the rasterizer downstream and processed in
/// lock-step by the fragment shader.
#[derive(Clone, Debug)]
pub struct Stamp {
    pub fragments: [Fragment; 4],
    pub parent: Option<TriangleHandle>,
    pub last_fragment: bool,
}

impl Stamp {
    #[must_use]
    pub fn all_culled(&self) -> bool {
        self.fragments.iter().all(|f| !f.inside_triangle)
    }
}
