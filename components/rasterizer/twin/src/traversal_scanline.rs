//! Scanline traversal (Section 4.5): walks a triangle's bounding box in
//! raster order, emitting one [`Stamp`] (2x2 fragment group) per cycle,
//! bounded by `stamps_per_cycle`, and stalling whenever the Hi-Z stage is
//! not ready to accept more stamps.

use gs_twin_core::queue::Queue;
use gs_twin_core::signal::Signal;
use gs_twin_core::tile::{MapperPolicy, PixelMapper};
use gs_twin_core::MAX_MSAA_SAMPLES;
use qfixed::UDepth24;

use crate::fragment::{Fragment, SamplePoint, Stamp};
use crate::setup_triangle::{SetupTriangle, TriangleArena, TriangleHandle};
use crate::triangle_setup::SetupOutput;

/// Traversal configuration (Section 6 parameters this stage consumes).
#[derive(Clone, Copy, Debug)]
pub struct TraversalConfig {
    pub stamps_per_cycle: u32,
    pub msaa_samples: usize,
    pub unit_count: u32,
    pub mapper_policy: MapperPolicy,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            stamps_per_cycle: 1,
            msaa_samples: 1,
            unit_count: 1,
            mapper_policy: MapperPolicy::HorizontalStripes,
        }
    }
}

/// State of the triangle currently being walked.
struct ActiveTriangle {
    handle: TriangleHandle,
    x: i32,
    y: i32,
    min_x: i32,
    max_x: i32,
    max_y: i32,
    last_triangle: bool,
}

/// Scanline rasterizer traversal: a single FIFO of triangles, walked one
/// at a time in raster order, two rows and two columns at a time (a
/// stamp), subject to the Hi-Z backpressure signal.
pub struct ScanlineTraversal {
    pub config: TraversalConfig,
    pub input: Signal<SetupOutput>,
    pub output: Signal<Stamp>,
    pub backlog: Queue<SetupOutput>,
    mapper: PixelMapper,
    active: Option<ActiveTriangle>,
}

impl ScanlineTraversal {
    #[must_use]
    pub fn new(config: TraversalConfig, backlog_capacity: usize) -> Self {
        let mapper = PixelMapper::new(config.mapper_policy, config.unit_count)
            .expect("traversal configured with an invalid unit count/policy combination");
        Self {
            config,
            input: Signal::new("traversal.in", 4, 1),
            output: Signal::new("traversal.out", 4, 1),
            backlog: Queue::new(backlog_capacity),
            mapper,
            active: None,
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.backlog.empty()
    }

    pub fn tick(&mut self, cycle: u64, arena: &mut TriangleArena, hi_z_ready: bool) {
        while let Some(out) = self.input.read(cycle) {
            if !self.backlog.add(out) {
                log::warn!("scanline traversal backlog full, stalling input acceptance");
            }
        }

        if !hi_z_ready {
            return;
        }

        for _ in 0..self.config.stamps_per_cycle {
            if self.active.is_none() && !self.start_next(arena) {
                break;
            }
            if !self.emit_one_stamp(cycle, arena) {
                break;
            }
        }
    }

    fn start_next(&mut self, arena: &mut TriangleArena) -> bool {
        let Some(out) = self.backlog.remove() else {
            return false;
        };
        let Some(t) = arena.get(out.triangle) else {
            // Triangle already destroyed (zero-area/culled with no
            // fragments to emit); forward the sentinel immediately if
            // this was the batch's last triangle.
            if out.last_triangle {
                self.output.write(0, Stamp::sentinel(None, true), 0);
            }
            return false;
        };
        self.active = Some(ActiveTriangle {
            handle: out.triangle,
            x: t.bbox_i.min_x,
            y: t.bbox_i.min_y,
            min_x: t.bbox_i.min_x,
            max_x: t.bbox_i.max_x,
            max_y: t.bbox_i.max_y,
            last_triangle: out.last_triangle,
        });
        true
    }

    fn emit_one_stamp(&mut self, cycle: u64, arena: &mut TriangleArena) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let Some(t) = arena.get(active.handle) else {
            self.active = None;
            return true;
        };

        let stamp = build_stamp(t, active.handle, active.x, active.y, self.config.msaa_samples);
        let done_with_triangle = advance_cursor(active);

        let tile = gs_twin_core::tile::TileIdentifier::new(active.x as u32, active.y as u32, 0);
        let _unit = self.mapper.assign(tile); // recorded for stats/backpressure bookkeeping downstream

        if done_with_triangle {
            let last_triangle = active.last_triangle;
            let handle = active.handle;
            self.active = None;
            arena.release(handle);
            self.output.write(cycle, stamp.with_last_fragment(true), 0);
            if last_triangle {
                self.output.write(cycle, Stamp::sentinel(None, true), 0);
            }
        } else {
            self.output.write(cycle, stamp, 0);
        }
        true
    }
}

fn advance_cursor(active: &mut ActiveTriangle) -> bool {
    active.x += 2;
    if active.x > active.max_x {
        active.x = active.min_x;
        active.y += 2;
    }
    active.y > active.max_y
}

/// Builds a single stamp at `(base_x, base_y)` with multisampling
/// disabled — used by recursive-descent tile evaluators, which handle
/// MSAA sample generation as a separate per-stamp cycle stall rather
/// than inline.
#[must_use]
pub(crate) fn build_stamp_for_tile(
    t: &SetupTriangle,
    handle: TriangleHandle,
    base_x: i32,
    base_y: i32,
) -> Stamp {
    build_stamp(t, handle, base_x, base_y, 1)
}

/// Sub-pixel offsets (within a pixel's `[0,1) x [0,1)` square) for each
/// multisample position, laid out as an evenly spaced grid so any
/// requested sample count gets a deterministic, well-spread pattern.
fn sample_offset(index: usize, count: usize) -> (f64, f64) {
    if count <= 1 {
        return (0.5, 0.5);
    }
    let cols = (count as f64).sqrt().ceil() as usize;
    let cols = cols.max(1);
    let rows = count.div_ceil(cols);
    let col = index % cols;
    let row = index / cols;
    ((col as f64 + 0.5) / cols as f64, (row as f64 + 0.5) / rows as f64)
}

pub(crate) fn build_stamp(
    t: &SetupTriangle,
    handle: TriangleHandle,
    base_x: i32,
    base_y: i32,
    msaa_samples: usize,
) -> Stamp {
    let offsets = [(0, 0), (1, 0), (0, 1), (1, 1)];
    let fragments = std::array::from_fn(|i| {
        let (dx, dy) = offsets[i];
        let x = base_x + dx;
        let y = base_y + dy;
        let fx = x as f64 + 0.5;
        let fy = y as f64 + 0.5;
        let edge_coords = [
            t.edges[0].eval(fx, fy),
            t.edges[1].eval(fx, fy),
            t.edges[2].eval(fx, fy),
        ];
        let center_inside = !t.culled && edge_coords.iter().all(|&e| e >= 0.0);
        let z_over_w = t.z_eq.eval(fx, fy);
        let samples = (msaa_samples > 1).then(|| {
            let mut s = [SamplePoint::default(); MAX_MSAA_SAMPLES];
            for (k, slot) in s.iter_mut().take(msaa_samples).enumerate() {
                let (ox, oy) = sample_offset(k, msaa_samples);
                let sx = x as f64 + ox;
                let sy = y as f64 + oy;
                let covered = !t.culled && t.edges.iter().all(|e| e.eval(sx, sy) >= 0.0);
                *slot = SamplePoint {
                    depth: UDepth24::from_normalized(t.z_eq.eval(sx, sy)),
                    covered,
                };
            }
            s
        });
        let inside = match &samples {
            Some(s) => s.iter().take(msaa_samples).any(|p| p.covered),
            None => center_inside,
        };
        Fragment {
            x,
            y,
            z: UDepth24::from_normalized(z_over_w),
            edge_coords,
            z_over_w,
            parent: Some(handle),
            inside_triangle: inside,
            last_fragment: false,
            samples,
            attributes: None,
        }
    });
    Stamp {
        fragments,
        parent: Some(handle),
        last_fragment: false,
    }
}

impl Stamp {
    /// Builds the sentinel stamp forwarded after a triangle's (or a
    /// culled batch's) final fragment to flush per-triangle state
    /// through the interpolator and ROP.
    #[must_use]
    pub fn sentinel(parent: Option<TriangleHandle>, last_fragment: bool) -> Self {
        Self {
            fragments: std::array::from_fn(|_| Fragment::sentinel()),
            parent,
            last_fragment,
        }
    }

    #[must_use]
    pub fn with_last_fragment(mut self, last_fragment: bool) -> Self {
        self.last_fragment = last_fragment;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup_triangle::{BoundingBoxI, BoundingBoxQ, Equation, SavedPosition, TriangleFlags, NUM_SAVED_POSITIONS};
    use crate::direction::RasterDirection;
    use gs_twin_core::MAX_VERTEX_ATTRIBUTES;

    fn big_triangle() -> SetupTriangle {
        SetupTriangle {
            id: 1,
            attributes: [[[0.0; 4]; MAX_VERTEX_ATTRIBUTES]; 3],
            inv_w: [[1.0; 4]; 3],
            edges: [Equation { a: 1.0, b: 0.0, c: 100.0 }; 3],
            z_eq: Equation::default(),
            bbox_i: BoundingBoxI {
                min_x: 0,
                min_y: 0,
                max_x: 3,
                max_y: 3,
            },
            bbox_q: BoundingBoxQ::default(),
            signed_area: 16.0,
            screen_area_fraction: 0.1,
            pos_x: 0,
            pos_y: 0,
            saved: [SavedPosition::default(); NUM_SAVED_POSITIONS],
            direction: RasterDirection::NONE,
            tile_direction: RasterDirection::NONE,
            flags: TriangleFlags::default(),
            last_triangle: true,
            culled: false,
        }
    }

    fn edge_at_x(threshold: f64) -> SetupTriangle {
        let mut t = big_triangle();
        t.edges = [
            Equation { a: 1.0, b: 0.0, c: -threshold },
            Equation { a: 0.0, b: 0.0, c: 100.0 },
            Equation { a: 0.0, b: 0.0, c: 100.0 },
        ];
        t
    }

    #[test]
    fn four_sample_offsets_cover_distinct_quadrants() {
        let offsets: Vec<(f64, f64)> = (0..4).map(|i| sample_offset(i, 4)).collect();
        assert_eq!(offsets[0], (0.25, 0.25));
        assert_eq!(offsets[1], (0.75, 0.25));
        assert_eq!(offsets[2], (0.25, 0.75));
        assert_eq!(offsets[3], (0.75, 0.75));
    }

    #[test]
    fn edge_crossing_pixel_covers_exactly_one_of_four_samples() {
        // An edge at x=0.6 only contains sample 1's quadrant offset
        // (0.75, 0.25) within fragment (0, 0); the pixel center (0.5,
        // 0.5) itself falls outside, so the aggregate single-sample
        // `inside` test alone would miss this fragment entirely.
        let t = edge_at_x(0.6);
        let stamp = build_stamp(&t, TriangleArena::new().insert(big_triangle()), 0, 0, 4);
        let fragment = &stamp.fragments[0];
        let samples = fragment.samples.expect("multisampling requested");
        let covered_count = samples.iter().take(4).filter(|s| s.covered).count();
        assert_eq!(covered_count, 1, "exactly one of four samples should be covered");
        assert!(samples[1].covered, "the top-right quadrant sample crosses the edge");
        assert!(fragment.inside_triangle, "a fragment with any covered sample must still be processed downstream");
    }

    #[test]
    fn walks_bbox_in_two_by_two_stamps_and_flushes_sentinel() {
        let mut trav = ScanlineTraversal::new(TraversalConfig::default(), 8);
        let mut arena = TriangleArena::new();
        let handle = arena.insert(big_triangle());
        trav.input.write(
            0,
            SetupOutput {
                triangle: handle,
                last_triangle: true,
            },
            0,
        );
        let mut stamps = Vec::new();
        for cycle in 1..40 {
            trav.tick(cycle, &mut arena, true);
            while let Some(s) = trav.output.read(cycle + 1) {
                stamps.push(s);
            }
        }
        assert!(stamps.len() >= 4, "a 4x4 bbox should emit at least 4 stamps");
        assert!(stamps.last().unwrap().last_fragment);
        assert!(stamps.last().unwrap().parent.is_none(), "final stamp is the sentinel");
    }

    #[test]
    fn stalls_entirely_while_hi_z_not_ready() {
        let mut trav = ScanlineTraversal::new(TraversalConfig::default(), 8);
        let mut arena = TriangleArena::new();
        let handle = arena.insert(big_triangle());
        trav.input.write(
            0,
            SetupOutput {
                triangle: handle,
                last_triangle: false,
            },
            0,
        );
        trav.tick(1, &mut arena, false);
        assert!(trav.output.read(2).is_none());
    }
}
