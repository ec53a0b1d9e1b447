//! Recursive descent traversal (Section 4.6): a hierarchical
//! divide-and-conquer alternative to [`crate::traversal_scanline`]. A
//! triangle's bounding box is subdivided into power-of-two tiles; each
//! tile is tested against the triangle's edge equations and either
//! trivially accepted, trivially rejected, or queued for further
//! subdivision down to stamp-level tiles, which are then handed to a
//! load-balanced pool of [`TileEvaluator`]s.

use gs_twin_core::queue::Queue;
use gs_twin_core::signal::Signal;
use gs_twin_core::tile::{MapperPolicy, PixelMapper, TileIdentifier};

use crate::fragment::Stamp;
use crate::setup_triangle::{SetupTriangle, TriangleArena, TriangleHandle};
use crate::traversal_scanline::build_stamp_for_tile;
use crate::triangle_setup::SetupOutput;

#[derive(Clone, Copy, Debug)]
pub struct RecursiveConfig {
    pub tile_stack_size: usize,
    pub fragment_buffer_size: usize,
    pub output_buffer_size: usize,
    pub unit_count: u32,
    pub mapper_policy: MapperPolicy,
    pub base_level: u8,
}

impl Default for RecursiveConfig {
    fn default() -> Self {
        Self {
            tile_stack_size: 16,
            fragment_buffer_size: 16,
            output_buffer_size: 8,
            unit_count: 1,
            mapper_policy: MapperPolicy::Morton,
            base_level: 3,
        }
    }
}

/// Work item pushed on a [`TileEvaluator`]'s stack: a tile to test
/// against one triangle's edge equations.
#[derive(Clone, Copy, Debug)]
struct TileJob {
    tile: TileIdentifier,
    triangle: TriangleHandle,
    last_triangle: bool,
}

/// Trivial-accept / trivial-reject / needs-subdivision classification of
/// a tile against a triangle's three edge half-planes, evaluated at the
/// tile's four corners.
enum Classification {
    Reject,
    Accept,
    Split,
}

fn classify(t: &SetupTriangle, tile: TileIdentifier, tile_px: i32) -> Classification {
    let x0 = (tile.x as i32) * tile_px;
    let y0 = (tile.y as i32) * tile_px;
    let x1 = x0 + tile_px;
    let y1 = y0 + tile_px;
    let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)];

    let mut any_in = false;
    let mut all_in = true;
    for edge in &t.edges {
        let mut edge_all_out = true;
        for &(cx, cy) in &corners {
            let v = edge.eval(cx as f64, cy as f64);
            if v >= 0.0 {
                edge_all_out = false;
            }
        }
        if edge_all_out {
            return Classification::Reject;
        }
    }
    for &(cx, cy) in &corners {
        let inside = t.edges.iter().all(|e| e.eval(cx as f64, cy as f64) >= 0.0);
        any_in |= inside;
        all_in &= inside;
    }
    if all_in {
        Classification::Accept
    } else if any_in {
        Classification::Split
    } else {
        Classification::Split // straddling tile with no corner inside: still needs finer testing
    }
}

/// One evaluator unit: owns a LIFO tile stack and a fragment reorder
/// buffer, and is assigned tiles by the dispatcher's load-balancer.
struct TileEvaluator {
    stack: Vec<TileJob>,
    reorder: Queue<Stamp>,
}

impl TileEvaluator {
    fn new(config: &RecursiveConfig) -> Self {
        Self {
            stack: Vec::with_capacity(config.tile_stack_size),
            reorder: Queue::new(config.fragment_buffer_size),
        }
    }

    fn is_idle(&self) -> bool {
        self.stack.is_empty() && self.reorder.empty()
    }

    /// Processes the top-of-stack tile, descending one level if it needs
    /// splitting, or emitting a stamp into the reorder buffer if it's a
    /// stamp-level trivial accept.
    fn step(&mut self, arena: &mut TriangleArena, config: &RecursiveConfig) {
        let Some(job) = self.stack.pop() else {
            return;
        };
        let Some(t) = arena.get(job.triangle) else {
            return;
        };
        let tile_px = 1i32 << job.tile.level;
        match classify(t, job.tile, tile_px) {
            Classification::Reject => {
                arena.release(job.triangle);
            }
            Classification::Accept | Classification::Split if job.tile.is_stamp_level() => {
                let base_x = (job.tile.x as i32) * tile_px;
                let base_y = (job.tile.y as i32) * tile_px;
                let stamp = build_stamp_for_tile(t, job.triangle, base_x, base_y);
                if !self.reorder.add(stamp) {
                    log::warn!("tile evaluator reorder buffer full, dropping stamp");
                }
                arena.release(job.triangle);
            }
            Classification::Accept | Classification::Split => {
                let next_level = job.tile.level - 1;
                let children = [
                    (job.tile.x * 2, job.tile.y * 2),
                    (job.tile.x * 2 + 1, job.tile.y * 2),
                    (job.tile.x * 2, job.tile.y * 2 + 1),
                    (job.tile.x * 2 + 1, job.tile.y * 2 + 1),
                ];
                for (i, (cx, cy)) in children.into_iter().enumerate() {
                    if self.stack.len() >= config.tile_stack_size {
                        log::warn!("tile stack exhausted, dropping a child tile");
                        break;
                    }
                    if i > 0 {
                        arena.acquire(job.triangle);
                    }
                    self.stack.push(TileJob {
                        tile: TileIdentifier::new(cx, cy, next_level),
                        triangle: job.triangle,
                        last_triangle: job.last_triangle,
                    });
                }
            }
        }
    }
}

/// Recursive-descent rasterizer traversal dispatcher: a queue of
/// incoming triangles, a per-triangle root tile push, and a pool of
/// load-balanced [`TileEvaluator`]s.
pub struct RecursiveDescent {
    pub config: RecursiveConfig,
    pub input: Signal<SetupOutput>,
    pub output: Signal<Stamp>,
    pub backlog: Queue<SetupOutput>,
    evaluators: Vec<TileEvaluator>,
    mapper: PixelMapper,
    root_tiles_per_side: u32,
    screen_tiles_x: u32,
    screen_tiles_y: u32,
}

impl RecursiveDescent {
    #[must_use]
    pub fn new(config: RecursiveConfig, backlog_capacity: usize, unit_count: usize) -> Self {
        let mapper = PixelMapper::new(config.mapper_policy, config.unit_count)
            .expect("recursive descent configured with an invalid unit count/policy combination");
        let evaluators = (0..unit_count.max(1)).map(|_| TileEvaluator::new(&config)).collect();
        Self {
            config,
            input: Signal::new("recursive.in", 4, 1),
            output: Signal::new("recursive.out", 4, 1),
            backlog: Queue::new(backlog_capacity),
            evaluators,
            mapper,
            root_tiles_per_side: 1,
            screen_tiles_x: 0,
            screen_tiles_y: 0,
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.backlog.empty() && self.evaluators.iter().all(TileEvaluator::is_idle)
    }

    /// Output-buffer backpressure invariant the dispatcher must hold:
    /// `outputTiles + reservedOutputs <= outputBufferSize` for every
    /// evaluator's reorder buffer.
    #[must_use]
    pub fn backpressure_ok(&self) -> bool {
        self.evaluators
            .iter()
            .all(|e| e.reorder.items() <= self.config.output_buffer_size)
    }

    pub fn tick(&mut self, cycle: u64, arena: &mut TriangleArena, hi_z_ready: bool) {
        while let Some(out) = self.input.read(cycle) {
            if !self.backlog.add(out) {
                log::warn!("recursive descent backlog full, stalling input acceptance");
            }
        }
        if !hi_z_ready {
            return;
        }

        if let Some(out) = self.backlog.remove() {
            self.dispatch_root(out, arena);
        }

        for evaluator in &mut self.evaluators {
            evaluator.step(arena, &self.config);
            while let Some(stamp) = evaluator.reorder.remove() {
                self.output.write(cycle, stamp, 0);
            }
        }
    }

    fn dispatch_root(&mut self, out: SetupOutput, arena: &mut TriangleArena) {
        let Some(t) = arena.get(out.triangle) else {
            if out.last_triangle {
                self.output.write(0, Stamp::sentinel(None, true), 0);
            }
            return;
        };
        let tile_px = 1i32 << self.config.base_level;
        let tiles_x = (t.bbox_i.max_x - t.bbox_i.min_x).max(0) as u32 / tile_px.max(1) as u32 + 1;
        let tiles_y = (t.bbox_i.max_y - t.bbox_i.min_y).max(0) as u32 / tile_px.max(1) as u32 + 1;
        self.screen_tiles_x = tiles_x;
        self.screen_tiles_y = tiles_y;
        self.root_tiles_per_side = tiles_x.max(tiles_y).max(1);

        let min_tx = (t.bbox_i.min_x / tile_px.max(1)) as u32;
        let min_ty = (t.bbox_i.min_y / tile_px.max(1)) as u32;

        let mut first = true;
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let tile = TileIdentifier::new(min_tx + tx, min_ty + ty, self.config.base_level);
                let unit = self.mapper.assign(tile) as usize % self.evaluators.len().max(1);
                if !first {
                    arena.acquire(out.triangle);
                }
                first = false;
                if let Some(evaluator) = self.evaluators.get_mut(unit) {
                    if evaluator.stack.len() < self.config.tile_stack_size {
                        evaluator.stack.push(TileJob {
                            tile,
                            triangle: out.triangle,
                            last_triangle: out.last_triangle,
                        });
                        continue;
                    }
                }
                // Preferred unit's stack is full: redirect to the least
                // loaded evaluator instead of dropping the tile.
                if let Some((idx, least_loaded)) = self
                    .evaluators
                    .iter_mut()
                    .enumerate()
                    .min_by_key(|(_, e)| e.stack.len())
                {
                    let _ = idx;
                    least_loaded.stack.push(TileJob {
                        tile,
                        triangle: out.triangle,
                        last_triangle: out.last_triangle,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup_triangle::{BoundingBoxI, BoundingBoxQ, Equation, SavedPosition, TriangleFlags, NUM_SAVED_POSITIONS};
    use crate::direction::RasterDirection;
    use gs_twin_core::MAX_VERTEX_ATTRIBUTES;

    fn full_cover_triangle(min: i32, max: i32) -> SetupTriangle {
        SetupTriangle {
            id: 1,
            attributes: [[[0.0; 4]; MAX_VERTEX_ATTRIBUTES]; 3],
            inv_w: [[1.0; 4]; 3],
            // Edges chosen so every point in [min, max]^2 is inside.
            edges: [
                Equation { a: 1.0, b: 0.0, c: -(min as f64) + 10000.0 },
                Equation { a: 0.0, b: 1.0, c: -(min as f64) + 10000.0 },
                Equation { a: -1.0, b: -1.0, c: (max as f64) * 2.0 + 10000.0 },
            ],
            z_eq: Equation::default(),
            bbox_i: BoundingBoxI { min_x: min, min_y: min, max_x: max, max_y: max },
            bbox_q: BoundingBoxQ::default(),
            signed_area: 1000.0,
            screen_area_fraction: 0.5,
            pos_x: min,
            pos_y: min,
            saved: [SavedPosition::default(); NUM_SAVED_POSITIONS],
            direction: RasterDirection::NONE,
            tile_direction: RasterDirection::NONE,
            flags: TriangleFlags::default(),
            last_triangle: true,
            culled: false,
        }
    }

    #[test]
    fn backpressure_holds_as_stamps_accumulate() {
        let mut rd = RecursiveDescent::new(RecursiveConfig::default(), 8, 2);
        let mut arena = TriangleArena::new();
        let handle = arena.insert(full_cover_triangle(0, 7));
        rd.input.write(0, SetupOutput { triangle: handle, last_triangle: true }, 0);
        for cycle in 1..200 {
            rd.tick(cycle, &mut arena, true);
            assert!(rd.backpressure_ok());
            while rd.output.read(cycle + 1).is_some() {}
        }
    }

    #[test]
    fn idle_dispatcher_accepts_nothing_mid_flight_cleanly() {
        let rd = RecursiveDescent::new(RecursiveConfig::default(), 8, 1);
        assert!(rd.is_idle());
    }
}
