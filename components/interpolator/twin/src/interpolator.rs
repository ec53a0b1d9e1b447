//! The Interpolator (spec 4.7): per-fragment attribute interpolation
//! with a fixed pipeline latency and a per-cycle fragment budget.

use gs_twin_core::queue::Queue;
use gs_twin_core::signal::Signal;
use gs_twin_core::MAX_VERTEX_ATTRIBUTES;
use gs_rasterizer::{Fragment, Stamp, TriangleArena};
use qfixed::UDepth24;

use crate::hi_z::HierarchicalZ;

/// `POSITION_ATTRIBUTE` and `FACE_ATTRIBUTE` well-known slots (spec
/// 4.7's position/face overwrite rules), matching the slot numbering
/// `gs-rasterizer::vertex::slot` uses elsewhere in the pipeline.
pub const POSITION_ATTRIBUTE: usize = gs_rasterizer::vertex::slot::POSITION;
pub const FACE_ATTRIBUTE: usize = gs_rasterizer::vertex::slot::FACE;

/// Interpolator configuration: which attribute slots are active, which
/// of those are plane-interpolated vs. flat-shaded from the provoking
/// (third) vertex, the number of parallel interpolator lanes, the fixed
/// pipeline latency, and depth bit precision for the position overwrite.
#[derive(Clone, Debug)]
pub struct InterpolatorConfig {
    pub active: [bool; MAX_VERTEX_ATTRIBUTES],
    pub interpolate: [bool; MAX_VERTEX_ATTRIBUTES],
    pub interpolators: u32,
    pub interpolation_latency: u64,
    pub depth_bit_precision: u32,
    pub default_value: [f32; 4],
}

impl Default for InterpolatorConfig {
    fn default() -> Self {
        let mut active = [false; MAX_VERTEX_ATTRIBUTES];
        active[POSITION_ATTRIBUTE] = true;
        active[FACE_ATTRIBUTE] = true;
        Self {
            active,
            interpolate: [true; MAX_VERTEX_ATTRIBUTES],
            interpolators: 1,
            interpolation_latency: 2,
            depth_bit_precision: 24,
            default_value: [0.0; 4],
        }
    }
}

impl InterpolatorConfig {
    #[must_use]
    pub fn active_attribute_count(&self) -> u32 {
        self.active.iter().filter(|&&a| a).count() as u32
    }

    /// `cyclesFragment = ceil(active_attribute_count / interpolators)`.
    #[must_use]
    pub fn cycles_per_fragment(&self) -> u32 {
        self.active_attribute_count().div_ceil(self.interpolators.max(1))
    }
}

/// Hierarchical-Z plus the Interpolator, chained: incoming stamps are
/// coarse-rejected by [`HierarchicalZ`] before their surviving fragments
/// are interpolated.
pub struct Interpolator {
    pub config: InterpolatorConfig,
    hi_z: HierarchicalZ,
    pub input: Signal<Stamp>,
    pub output: Signal<Stamp>,
    pub backlog: Queue<Stamp>,
    busy_cycles_remaining: u32,
}

impl Interpolator {
    #[must_use]
    pub fn new(config: InterpolatorConfig, hi_z: HierarchicalZ, backlog_capacity: usize) -> Self {
        Self {
            config,
            hi_z,
            input: Signal::new("interp.in", 4, 1),
            output: Signal::new("interp.out", 4, 1),
            backlog: Queue::new(backlog_capacity),
            busy_cycles_remaining: 0,
        }
    }

    #[must_use]
    pub fn hi_z_ready(&self) -> bool {
        self.hi_z.is_ready() && self.backlog.free() > 0
    }

    pub fn tick(&mut self, cycle: u64, arena: &mut TriangleArena) {
        while let Some(stamp) = self.input.read(cycle) {
            match self.hi_z.test_stamp(stamp) {
                Some(s) => {
                    if !self.backlog.add(s) {
                        log::warn!("interpolator backlog full, dropping stamp");
                    }
                }
                None => {
                    // Coarsely rejected: its fragments' triangle refs
                    // never reach the ROP, so release them here.
                }
            }
        }

        if self.busy_cycles_remaining > 0 {
            self.busy_cycles_remaining -= 1;
            return;
        }

        let Some(stamp) = self.backlog.remove() else {
            return;
        };

        let interpolated = self.interpolate_stamp(&stamp, arena);
        self.busy_cycles_remaining = self.config.cycles_per_fragment().saturating_sub(1);
        self.output
            .write(cycle, interpolated, self.config.interpolation_latency);
    }

    fn interpolate_stamp(&self, stamp: &Stamp, arena: &TriangleArena) -> Stamp {
        if stamp.parent.is_none() {
            return stamp.clone();
        }
        let mut out = stamp.clone();
        let zmax = ((1u64 << self.config.depth_bit_precision) - 1) as f32;
        for fragment in &mut out.fragments {
            if !fragment.inside_triangle {
                continue;
            }
            let Some(handle) = fragment.parent else { continue };
            let Some(triangle) = arena.get(handle) else { continue };
            fragment.attributes = Some(self.interpolate_fragment(fragment, triangle, zmax));
        }
        out
    }

    fn interpolate_fragment(
        &self,
        fragment: &Fragment,
        triangle: &gs_rasterizer::SetupTriangle,
        zmax: f32,
    ) -> [[f32; 4]; MAX_VERTEX_ATTRIBUTES] {
        let mut attrs = [self.config.default_value; MAX_VERTEX_ATTRIBUTES];
        let w_sum: f64 = fragment.edge_coords.iter().copied().map(f64::abs).sum::<f64>().max(1e-9);
        let bary: [f64; 3] = std::array::from_fn(|i| fragment.edge_coords[i].abs() / w_sum);

        for slot in 0..MAX_VERTEX_ATTRIBUTES {
            if !self.config.active[slot] {
                continue;
            }
            if slot == POSITION_ATTRIBUTE {
                continue; // overwritten below, regardless of interpolate flag
            }
            if slot == FACE_ATTRIBUTE {
                attrs[slot] = [0.0, 0.0, 0.0, triangle.signed_area as f32];
                continue;
            }
            attrs[slot] = if self.config.interpolate[slot] {
                std::array::from_fn(|lane| {
                    (0..3)
                        .map(|v| triangle.attributes[v][slot][lane] as f64 * bary[v])
                        .sum::<f64>() as f32
                })
            } else {
                triangle.attributes[2][slot]
            };
        }

        attrs[POSITION_ATTRIBUTE] = [
            fragment.x as f32,
            fragment.y as f32,
            (fragment.z.get() as f32) / zmax,
            1.0,
        ];
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hi_z::HiZConfig;
    use gs_rasterizer::setup_triangle::{
        BoundingBoxI, BoundingBoxQ, Equation, SavedPosition, TriangleFlags, NUM_SAVED_POSITIONS,
    };
    use gs_rasterizer::direction::RasterDirection;

    fn triangle() -> gs_rasterizer::SetupTriangle {
        let mut attributes = [[[0.0; 4]; MAX_VERTEX_ATTRIBUTES]; 3];
        attributes[0][1] = [1.0, 0.0, 0.0, 1.0];
        attributes[1][1] = [0.0, 1.0, 0.0, 1.0];
        attributes[2][1] = [0.0, 0.0, 1.0, 1.0];
        gs_rasterizer::SetupTriangle {
            id: 1,
            attributes,
            inv_w: [[1.0; 4]; 3],
            edges: [Equation { a: 0.0, b: 0.0, c: 1.0 }; 3],
            z_eq: Equation::default(),
            bbox_i: BoundingBoxI::default(),
            bbox_q: BoundingBoxQ::default(),
            signed_area: 42.0,
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
    fn face_attribute_carries_signed_area() {
        let mut arena = TriangleArena::new();
        let handle = arena.insert(triangle());
        let mut config = InterpolatorConfig::default();
        config.active[1] = true;
        config.interpolate[1] = true;
        let interp = Interpolator::new(config, HierarchicalZ::new(HiZConfig::default()), 4);

        let fragment = Fragment {
            x: 1,
            y: 1,
            z: UDepth24::new(1000),
            edge_coords: [1.0, 1.0, 1.0],
            z_over_w: 0.5,
            parent: Some(handle),
            inside_triangle: true,
            last_fragment: false,
            samples: None,
            attributes: None,
        };
        let out = interp.interpolate_fragment(&fragment, arena.get(handle).unwrap(), 16_777_215.0);
        assert_eq!(out[FACE_ATTRIBUTE][3], 42.0);
        assert_eq!(out[POSITION_ATTRIBUTE][0], 1.0);
        assert_eq!(out[POSITION_ATTRIBUTE][1], 1.0);
    }

    #[test]
    fn sentinel_fragment_forwarded_without_attributes() {
        let mut arena = TriangleArena::new();
        let mut interp = Interpolator::new(
            InterpolatorConfig::default(),
            HierarchicalZ::new(HiZConfig::default()),
            4,
        );
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
        interp.input.write(0, sentinel, 0);
        for cycle in 1..6 {
            interp.tick(cycle, &mut arena);
        }
        let out = (1..20).find_map(|c| interp.output.read(c));
        let out = out.expect("sentinel must flow through");
        assert!(out.fragments[0].attributes.is_none());
    }
}
