//! Primitive Assembly (spec Section 4.3): a per-stream vertex queue plus
//! triangle-formation rules for the five primitive topologies, feeding
//! assembled triangles downstream (through the clipper, folded into this
//! stage's output since the clip stage is not separately modeled) to
//! Triangle Setup.

#![forbid(unsafe_code)]

use gpu_registers::PrimitiveMode;
use gs_twin_core::cookie::Cookie;
use gs_twin_core::queue::Queue;
use gs_twin_core::signal::Signal;
use gs_rasterizer::{AssembledTriangle, Vertex};

/// One vertex as received from the streamer: its index, attributes, and
/// the cookie chain of the DRAW command it belongs to.
#[derive(Clone, Debug)]
pub struct StreamedVertex {
    pub vertex: Vertex,
    pub cookie: Cookie,
    pub last_vertex: bool,
}

/// Requests primitive assembly issues upstream to the streamer.
#[derive(Clone, Copy, Debug)]
pub struct VertexRequest {
    pub count: u32,
}

/// Assembly configuration (Section 4.3's `N`, `trianglesCycle`,
/// `verticesCycle`, `streamCount`, `streamInstances`).
#[derive(Clone, Copy, Debug)]
pub struct AssemblyConfig {
    pub mode: PrimitiveMode,
    pub queue_size: usize,
    pub triangles_per_cycle: u32,
    pub vertices_per_cycle: u32,
    pub stream_count: u32,
    pub stream_instances: u32,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            mode: PrimitiveMode::Triangle,
            queue_size: 4,
            triangles_per_cycle: 1,
            vertices_per_cycle: 1,
            stream_count: 1,
            stream_instances: 1,
        }
    }
}

/// Small ring of the most recent vertices, indexed per Section 4.3's
/// per-mode insertion-pointer rules.
struct VertexRing {
    slots: Vec<Option<StreamedVertex>>,
    next: usize,
    received: u64,
}

impl VertexRing {
    fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size.max(3)],
            next: 0,
            received: 0,
        }
    }

    fn push(&mut self, v: StreamedVertex, mode: PrimitiveMode) {
        let len = self.slots.len();
        let idx = match mode {
            // TRIANGLE_FAN pins slot 0; new vertices rotate through the rest.
            PrimitiveMode::TriangleFan if self.received >= 1 => {
                1 + ((self.next) % (len.max(2) - 1))
            }
            _ => self.next % len,
        };
        self.slots[idx] = Some(v);
        self.next = (self.next + 1) % len.max(1);
        self.received += 1;
    }

    fn get(&self, offset_from_newest: usize) -> Option<&StreamedVertex> {
        let len = self.slots.len();
        let idx = (self.next + len - 1 - offset_from_newest % len) % len;
        self.slots[idx].as_ref()
    }

    fn get_fixed(&self, idx: usize) -> Option<&StreamedVertex> {
        self.slots.get(idx).and_then(Option::as_ref)
    }
}

fn degenerate(indices: [u32; 3]) -> bool {
    indices[0] == indices[1] || indices[1] == indices[2] || indices[0] == indices[2]
}

/// Primitive Assembly: buffers incoming vertices and emits
/// [`AssembledTriangle`]s per the configured topology's formation rule.
pub struct PrimitiveAssembly {
    pub config: AssemblyConfig,
    ring: VertexRing,
    next_triangle_id: u64,
    in_flight_requested: u32,
    dropped_degenerate: u64,
    pub input: Signal<StreamedVertex>,
    pub output: Signal<AssembledTriangle>,
    pub requests: Signal<VertexRequest>,
    pub backlog: Queue<StreamedVertex>,
}

impl PrimitiveAssembly {
    #[must_use]
    pub fn new(config: AssemblyConfig) -> Self {
        let queue_size = config.queue_size;
        Self {
            config,
            ring: VertexRing::new(queue_size),
            next_triangle_id: 0,
            in_flight_requested: 0,
            dropped_degenerate: 0,
            input: Signal::new("assembly.in", 4, 1),
            output: Signal::new("assembly.out", 4, 1),
            requests: Signal::new("assembly.request", 4, 0),
            backlog: Queue::new(queue_size.max(4)),
        }
    }

    #[must_use]
    pub fn dropped_degenerate_count(&self) -> u64 {
        self.dropped_degenerate
    }

    pub fn tick(&mut self, cycle: u64) {
        let mut emitted = 0u32;
        while let Some(v) = self.input.read(cycle) {
            if !self.backlog.add(v) {
                log::warn!("primitive assembly backlog full, dropping incoming vertex");
            }
        }

        while emitted < self.config.triangles_per_cycle {
            let Some(v) = self.backlog.remove() else {
                break;
            };
            self.in_flight_requested = self.in_flight_requested.saturating_sub(1);
            let last_vertex = v.last_vertex;
            let cookie = v.cookie.clone();
            self.ring.push(v, self.config.mode);

            if let Some(triangles) = self.form_triangles() {
                for (tri, last) in triangles {
                    self.next_triangle_id += 1;
                    self.output.write(
                        cycle,
                        AssembledTriangle {
                            id: self.next_triangle_id,
                            vertices: tri,
                            last_triangle: last && last_vertex,
                            cookie: cookie.clone(),
                        },
                        0,
                    );
                    emitted += 1;
                }
            }
        }

        let received_plus_flight = u64::from(self.in_flight_requested) + self.ring.received;
        let budget = u64::from(self.config.stream_count) * u64::from(self.config.stream_instances);
        if received_plus_flight < budget && self.backlog.free() > 0 {
            let want = self.config.vertices_per_cycle.min(self.backlog.free() as u32);
            if want > 0 {
                self.requests.write(cycle, VertexRequest { count: want }, 0);
                self.in_flight_requested += want;
            }
        }
    }

    /// Applies the mode's triangle-formation rule to the vertex just
    /// pushed onto the ring, returning zero, one, or two triangles
    /// (quads emit two), each paired with whether it completes the
    /// stage's winding parity (used only for `QUAD`/`QUAD_STRIP`'s
    /// two-triangles-per-shape accounting).
    fn form_triangles(&mut self) -> Option<Vec<([Vertex; 3], bool)>> {
        match self.config.mode {
            PrimitiveMode::Triangle => {
                if self.ring.received % 3 != 0 || self.ring.received < 3 {
                    return None;
                }
                let a = self.ring.get(2)?.vertex;
                let b = self.ring.get(1)?.vertex;
                let c = self.ring.get(0)?.vertex;
                self.emit_checked([a, b, c])
            }
            PrimitiveMode::TriangleStrip => {
                if self.ring.received < 3 {
                    return None;
                }
                let even = (self.ring.received - 3) % 2 == 0;
                let a = self.ring.get(2)?.vertex;
                let b = self.ring.get(1)?.vertex;
                let c = self.ring.get(0)?.vertex;
                let (a, b) = if even { (b, a) } else { (a, b) };
                self.emit_checked([a, b, c])
            }
            PrimitiveMode::TriangleFan => {
                if self.ring.received < 3 {
                    return None;
                }
                let first = self.ring.get_fixed(0)?.vertex;
                let prev = self.ring.get(1)?.vertex;
                let newest = self.ring.get(0)?.vertex;
                self.emit_checked([first, prev, newest])
            }
            PrimitiveMode::Quad => {
                if self.ring.received % 4 != 0 || self.ring.received < 4 {
                    return None;
                }
                let v0 = self.ring.get(3)?.vertex;
                let v1 = self.ring.get(2)?.vertex;
                let v2 = self.ring.get(1)?.vertex;
                let v3 = self.ring.get(0)?.vertex;
                let mut out = Vec::new();
                if let Some(mut t) = self.emit_checked([v0, v1, v3]) {
                    out.append(&mut t);
                }
                if let Some(mut t) = self.emit_checked([v1, v2, v3]) {
                    out.append(&mut t);
                }
                (!out.is_empty()).then_some(out)
            }
            PrimitiveMode::QuadStrip => {
                if self.ring.received < 4 || self.ring.received % 2 != 0 {
                    return None;
                }
                let v0 = self.ring.get(3)?.vertex;
                let v1 = self.ring.get(2)?.vertex;
                let v2 = self.ring.get(1)?.vertex;
                let v3 = self.ring.get(0)?.vertex;
                let mut out = Vec::new();
                if let Some(mut t) = self.emit_checked([v0, v1, v3]) {
                    out.append(&mut t);
                }
                if let Some(mut t) = self.emit_checked([v1, v2, v3]) {
                    out.append(&mut t);
                }
                (!out.is_empty()).then_some(out)
            }
        }
    }

    fn emit_checked(&mut self, verts: [Vertex; 3]) -> Option<Vec<([Vertex; 3], bool)>> {
        let indices = [verts[0].index, verts[1].index, verts[2].index];
        if degenerate(indices) {
            self.dropped_degenerate += 1;
            return None;
        }
        Some(vec![(verts, true)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_rasterizer::vertex::slot;

    fn vtx(i: u32, x: f32) -> StreamedVertex {
        let mut v = Vertex::zero(i);
        v.set_attr(slot::POSITION, [x, 0.0, 0.0, 1.0]);
        StreamedVertex {
            vertex: v,
            cookie: Cookie::root(),
            last_vertex: false,
        }
    }

    #[test]
    fn triangle_mode_emits_every_three_vertices() {
        let mut pa = PrimitiveAssembly::new(AssemblyConfig {
            mode: PrimitiveMode::Triangle,
            queue_size: 8,
            ..Default::default()
        });
        for (i, v) in [vtx(0, 0.0), vtx(1, 1.0), vtx(2, 2.0)].into_iter().enumerate() {
            pa.input.write(i as u64, v, 0);
        }
        let mut out = 0;
        for cycle in 1..10 {
            pa.tick(cycle);
            while pa.output.read(cycle + 1).is_some() {
                out += 1;
            }
        }
        assert_eq!(out, 1);
    }

    #[test]
    fn degenerate_triangle_is_dropped_and_counted() {
        let mut pa = PrimitiveAssembly::new(AssemblyConfig {
            mode: PrimitiveMode::Triangle,
            queue_size: 8,
            ..Default::default()
        });
        for (i, v) in [vtx(0, 0.0), vtx(0, 1.0), vtx(2, 2.0)].into_iter().enumerate() {
            pa.input.write(i as u64, v, 0);
        }
        let mut out = 0;
        for cycle in 1..10 {
            pa.tick(cycle);
            while pa.output.read(cycle + 1).is_some() {
                out += 1;
            }
        }
        assert_eq!(out, 0);
        assert_eq!(pa.dropped_degenerate_count(), 1);
    }

    #[test]
    fn fan_mode_always_reuses_slot_zero() {
        let mut pa = PrimitiveAssembly::new(AssemblyConfig {
            mode: PrimitiveMode::TriangleFan,
            queue_size: 8,
            ..Default::default()
        });
        for (i, v) in [vtx(0, 0.0), vtx(1, 1.0), vtx(2, 2.0), vtx(3, 3.0)]
            .into_iter()
            .enumerate()
        {
            pa.input.write(i as u64, v, 0);
        }
        let mut triangles = Vec::new();
        for cycle in 1..10 {
            pa.tick(cycle);
            while let Some(t) = pa.output.read(cycle + 1) {
                triangles.push(t);
            }
        }
        assert_eq!(triangles.len(), 2);
        for t in &triangles {
            assert_eq!(t.vertices[0].index, 0, "fan triangles must reuse vertex 0");
        }
    }
}
