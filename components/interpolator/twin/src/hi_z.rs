//! Hierarchical-Z (spec 4.7): an early coarse-grained depth rejection
//! over stamps, gating traversal's backpressure signal to the
//! rasterizer.
//!
//! This is modeled as a direct pass-through cache of per-tile coarse
//! depth bounds rather than a full memory-backed structure — the
//! authoritative depth test still happens in the Z/Stencil ROP; Hi-Z
//! only answers "could this stamp possibly pass" so traversal can skip
//! emitting fragments that are guaranteed to fail.

use std::collections::HashMap;

use gs_rasterizer::Stamp;
use qfixed::UDepth24;

/// Hierarchical-Z configuration: tile granularity and compare function
/// direction (mirrors the Z/Stencil ROP's `CompareFunc`).
#[derive(Clone, Copy, Debug)]
pub struct HiZConfig {
    pub tile_size: u32,
    pub less_passes: bool,
}

impl Default for HiZConfig {
    fn default() -> Self {
        Self {
            tile_size: 8,
            less_passes: true,
        }
    }
}

/// Per-tile coarse depth bound: the farthest depth known to have passed
/// in this tile so far (a conservative "cannot possibly be occluded
/// past this" bound in the configured compare direction).
pub struct HierarchicalZ {
    config: HiZConfig,
    bounds: HashMap<(u32, u32), UDepth24>,
    ready: bool,
}

impl HierarchicalZ {
    #[must_use]
    pub fn new(config: HiZConfig) -> Self {
        Self {
            config,
            bounds: HashMap::new(),
            ready: true,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    fn tile_of(&self, x: i32, y: i32) -> (u32, u32) {
        let t = self.config.tile_size.max(1) as i32;
        ((x / t).max(0) as u32, (y / t).max(0) as u32)
    }

    /// Coarse-rejects a stamp whose every fragment is farther than the
    /// known tile bound; otherwise forwards it unchanged.
    #[must_use]
    pub fn test_stamp(&mut self, stamp: Stamp) -> Option<Stamp> {
        if stamp.parent.is_none() {
            return Some(stamp); // sentinel always forwards
        }
        let any_possible = stamp.fragments.iter().any(|f| {
            if !f.inside_triangle {
                return false;
            }
            let tile = self.tile_of(f.x, f.y);
            match self.bounds.get(&tile) {
                None => true,
                Some(&bound) => {
                    if self.config.less_passes {
                        f.z < bound
                    } else {
                        f.z > bound
                    }
                }
            }
        });
        if !any_possible {
            return None;
        }
        for f in &stamp.fragments {
            if !f.inside_triangle {
                continue;
            }
            let tile = self.tile_of(f.x, f.y);
            self.bounds
                .entry(tile)
                .and_modify(|b| {
                    if self.config.less_passes {
                        *b = (*b).max(f.z);
                    } else {
                        *b = (*b).min(f.z);
                    }
                })
                .or_insert(f.z);
        }
        Some(stamp)
    }

    pub fn reset(&mut self) {
        self.bounds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_rasterizer::{Fragment, SetupTriangle};

    fn dummy_handle() -> Option<gs_rasterizer::TriangleHandle> {
        let mut arena = gs_rasterizer::TriangleArena::new();
        Some(arena.insert(dummy_triangle()))
    }

    fn dummy_triangle() -> SetupTriangle {
        use gs_rasterizer::{BoundingBoxI, BoundingBoxQ, Equation, SavedPosition, TriangleFlags, RasterDirection};
        SetupTriangle {
            id: 1,
            attributes: [[[0.0; 4]; gs_twin_core::MAX_VERTEX_ATTRIBUTES]; 3],
            inv_w: [[1.0; 4]; 3],
            edges: [Equation::default(); 3],
            z_eq: Equation::default(),
            bbox_i: BoundingBoxI::default(),
            bbox_q: BoundingBoxQ::default(),
            signed_area: 1.0,
            screen_area_fraction: 0.1,
            pos_x: 0,
            pos_y: 0,
            saved: [SavedPosition::default(); gs_rasterizer::setup_triangle::NUM_SAVED_POSITIONS],
            direction: RasterDirection::NONE,
            tile_direction: RasterDirection::NONE,
            flags: TriangleFlags::default(),
            last_triangle: false,
            culled: false,
        }
    }

    fn frag(x: i32, y: i32, z: u32, inside: bool) -> Fragment {
        Fragment {
            x,
            y,
            z: UDepth24::new(z),
            edge_coords: [0.0; 3],
            z_over_w: 0.0,
            parent: dummy_handle(),
            inside_triangle: inside,
            last_fragment: false,
            samples: None,
            attributes: None,
        }
    }

    #[test]
    fn rejects_stamp_farther_than_known_bound() {
        let mut hz = HierarchicalZ::new(HiZConfig::default());
        let near = Stamp {
            fragments: std::array::from_fn(|_| frag(0, 0, 10, true)),
            parent: dummy_handle(),
            last_fragment: false,
        };
        assert!(hz.test_stamp(near).is_some());

        let far = Stamp {
            fragments: std::array::from_fn(|_| frag(0, 0, 20, true)),
            parent: dummy_handle(),
            last_fragment: false,
        };
        assert!(hz.test_stamp(far).is_none(), "farther stamp must be coarsely rejected");
    }

    #[test]
    fn sentinel_always_forwards() {
        let mut hz = HierarchicalZ::new(HiZConfig::default());
        let sentinel = Stamp {
            fragments: std::array::from_fn(|_| Fragment {
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
            }),
            parent: None,
            last_fragment: true,
        };
        assert!(hz.test_stamp(sentinel).is_some());
    }
}
