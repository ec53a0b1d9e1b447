//! Triangle Setup (Section 4.4): turns three homogeneous-clip-space
//! vertices into a [`SetupTriangle`].

use gpu_registers::CullMode;
use gs_twin_core::arena::Handle;
use gs_twin_core::queue::Queue;
use gs_twin_core::signal::Signal;
use qfixed::Q12_4;

use crate::direction::RasterDirection;
use crate::setup_triangle::{
    BoundingBoxI, BoundingBoxQ, Equation, SavedPosition, SetupTriangle, TriangleArena,
    TriangleHandle, TriangleFlags, NUM_SAVED_POSITIONS,
};
use crate::vertex::{slot, AssembledTriangle};

/// Output wrapper: a `TriangleHandle` plus the "last triangle" flag, as
/// Section 4.4 specifies ("wrapped in a triangle-output signal carrying
/// the triangle ID and a 'last triangle' flag").
#[derive(Clone, Copy, Debug)]
pub struct SetupOutput {
    pub triangle: TriangleHandle,
    pub last_triangle: bool,
}

/// Triangle Setup stage configuration.
#[derive(Clone, Copy, Debug)]
pub struct SetupConfig {
    pub cull_mode: CullMode,
    pub triangles_per_cycle: u32,
    pub viewport_width: i32,
    pub viewport_height: i32,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::CullNone,
            triangles_per_cycle: 1,
            viewport_width: 0,
            viewport_height: 0,
        }
    }
}

/// Computes the signed area of a clip-space-projected triangle in screen
/// coordinates (positive = counter-clockwise winding).
fn signed_area(p: [(f64, f64); 3]) -> f64 {
    let (x0, y0) = p[0];
    let (x1, y1) = p[1];
    let (x2, y2) = p[2];
    0.5 * ((x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0))
}

fn edge_equation(p0: (f64, f64), p1: (f64, f64)) -> Equation {
    // Half-plane equation of the edge p0->p1: positive on the left side,
    // i.e. positive for the triangle's interior when p0->p1 is one edge
    // of a counter-clockwise (positive-`signed_area`) winding.
    let a = p0.1 - p1.1;
    let b = p1.0 - p0.0;
    let c = -(a * p0.0 + b * p0.1);
    Equation { a, b, c }
}

/// Triangle Setup: consumes [`AssembledTriangle`]s and produces
/// [`SetupTriangle`]s in the shared `TriangleArena`.
pub struct TriangleSetup {
    pub config: SetupConfig,
    next_id: u64,
    pub input: Signal<AssembledTriangle>,
    pub output: Signal<SetupOutput>,
    pub backlog: Queue<AssembledTriangle>,
}

impl TriangleSetup {
    #[must_use]
    pub fn new(config: SetupConfig, backlog_capacity: usize) -> Self {
        Self {
            config,
            next_id: 0,
            input: Signal::new("setup.in", 4, 1),
            output: Signal::new("setup.out", 4, 1),
            backlog: Queue::new(backlog_capacity),
        }
    }

    /// One cycle of Triangle Setup: drains queued assembled triangles
    /// (bounded by `triangles_per_cycle`), computes each one's
    /// `SetupTriangle`, inserts it into `arena`, and forwards it.
    pub fn tick(&mut self, cycle: u64, arena: &mut TriangleArena) {
        while let Some(at) = self.input.read(cycle) {
            if !self.backlog.add(at) {
                log::warn!("triangle setup backlog full, dropping would stall upstream");
            }
        }

        for _ in 0..self.config.triangles_per_cycle {
            let Some(at) = self.backlog.remove() else {
                break;
            };
            let setup = self.compute(&at);
            let last_triangle = at.last_triangle;
            let handle = arena.insert(setup);
            self.output.write(
                cycle,
                SetupOutput {
                    triangle: handle,
                    last_triangle,
                },
                0,
            );
        }
    }

    fn compute(&mut self, at: &AssembledTriangle) -> SetupTriangle {
        let positions: [(f64, f64, f64, f64); 3] = std::array::from_fn(|i| {
            let p = at.vertices[i].attr(slot::POSITION);
            (p[0] as f64, p[1] as f64, p[2] as f64, p[3] as f64)
        });
        let inv_w: [[f64; 4]; 3] = std::array::from_fn(|i| {
            let (x, y, z, w) = positions[i];
            let iw = if w.abs() > 1e-12 { 1.0 / w } else { 1.0 };
            [x * iw, y * iw, z * iw, iw]
        });
        let screen: [(f64, f64); 3] = std::array::from_fn(|i| (inv_w[i][0], inv_w[i][1]));

        let mut area = signed_area(screen);
        let mut edges = [
            edge_equation(screen[0], screen[1]),
            edge_equation(screen[1], screen[2]),
            edge_equation(screen[2], screen[0]),
        ];

        let front_facing = area >= 0.0;
        let culled = match self.config.cull_mode {
            CullMode::CullNone => false,
            CullMode::CullCcw => front_facing,
            CullMode::CullCw => !front_facing,
        };

        if !front_facing && !culled {
            // Back-facing but not culled: invert all three edges so
            // downstream traversal can always assume front-facing math.
            for e in &mut edges {
                *e = e.inverted();
            }
            area = -area;
        }

        let z_eq = Equation {
            a: 0.0,
            b: 0.0,
            c: inv_w[2][2],
        };

        let min_x = screen.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = screen.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = screen.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = screen.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let clamp_x = |v: f64| v.clamp(0.0, self.config.viewport_width.max(0) as f64);
        let clamp_y = |v: f64| v.clamp(0.0, self.config.viewport_height.max(0) as f64);

        let bbox_i = BoundingBoxI {
            min_x: clamp_x(min_x.floor()) as i32,
            min_y: clamp_y(min_y.floor()) as i32,
            max_x: clamp_x(max_x.ceil()) as i32,
            max_y: clamp_y(max_y.ceil()) as i32,
        };
        let bbox_q = BoundingBoxQ {
            min_x: Q12_4::from_f64(clamp_x(min_x)),
            min_y: Q12_4::from_f64(clamp_y(min_y)),
            max_x: Q12_4::from_f64(clamp_x(max_x)),
            max_y: Q12_4::from_f64(clamp_y(max_y)),
        };

        let viewport_area = (self.config.viewport_width.max(1) * self.config.viewport_height.max(1)) as f64;

        self.next_id += 1;
        let id = self.next_id;
        let attributes = std::array::from_fn(|i| at.vertices[i].attributes);

        SetupTriangle {
            id,
            attributes,
            inv_w,
            edges,
            z_eq,
            bbox_i,
            bbox_q,
            signed_area: area,
            screen_area_fraction: (area.abs() / viewport_area).min(1.0),
            pos_x: bbox_i.min_x,
            pos_y: bbox_i.min_y,
            saved: [SavedPosition::default(); NUM_SAVED_POSITIONS],
            direction: RasterDirection::NONE,
            tile_direction: RasterDirection::NONE,
            flags: TriangleFlags::default(),
            last_triangle: at.last_triangle,
            culled,
        }
    }
}

/// Whether `handle` refers to a culled (zero-area or face-culled)
/// triangle that Triangle Setup still emits so the "last triangle"
/// sentinel keeps flowing (Section 8: "a batch whose entire geometry is
/// backface-culled ... still flushes the 'last triangle' sentinel
/// through every stage").
#[must_use]
pub fn is_degenerate_area(triangle: &SetupTriangle) -> bool {
    triangle.signed_area.abs() < f64::EPSILON
}

#[allow(dead_code)]
fn _assert_handle_is_copy(h: TriangleHandle) -> TriangleHandle {
    // Handle<T> must stay Copy; used by every stage that stores it in
    // queues and signals by value.
    let _: Handle<SetupTriangle> = h;
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_twin_core::cookie::Cookie;
    use gs_twin_core::MAX_VERTEX_ATTRIBUTES;
    use crate::vertex::Vertex;

    fn vtx(x: f32, y: f32) -> Vertex {
        let mut v = Vertex::zero(0);
        v.set_attr(slot::POSITION, [x, y, 0.1, 1.0]);
        v
    }

    fn triangle(verts: [Vertex; 3], last: bool) -> AssembledTriangle {
        AssembledTriangle {
            id: 1,
            vertices: verts,
            last_triangle: last,
            cookie: Cookie::root(),
        }
    }

    #[test]
    fn computes_positive_area_for_ccw_triangle() {
        let mut setup = TriangleSetup::new(
            SetupConfig {
                viewport_width: 100,
                viewport_height: 100,
                ..Default::default()
            },
            8,
        );
        let mut arena = TriangleArena::new();
        setup
            .input
            .write(0, triangle([vtx(0.0, 0.0), vtx(10.0, 0.0), vtx(0.0, 10.0)], true), 0);
        setup.tick(1, &mut arena);
        let out = setup.output.read(2).expect("setup has 1 cycle latency");
        let t = arena.get(out.triangle).unwrap();
        assert!(t.signed_area > 0.0);
        assert!(out.last_triangle);
    }

    #[test]
    fn cull_ccw_drops_front_facing_but_keeps_sentinel_flowing() {
        let mut setup = TriangleSetup::new(
            SetupConfig {
                cull_mode: CullMode::CullCcw,
                viewport_width: 100,
                viewport_height: 100,
                ..Default::default()
            },
            8,
        );
        let mut arena = TriangleArena::new();
        setup
            .input
            .write(0, triangle([vtx(0.0, 0.0), vtx(10.0, 0.0), vtx(0.0, 10.0)], true), 0);
        setup.tick(1, &mut arena);
        let out = setup.output.read(2).unwrap();
        assert!(out.last_triangle, "sentinel must still flow even when culled");
        let _ = MAX_VERTEX_ATTRIBUTES;
    }
}
