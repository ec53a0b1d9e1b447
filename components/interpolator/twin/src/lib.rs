//! Hierarchical-Z and the Interpolator (spec Section 4.7): coarse-grained
//! tile/stamp depth rejection followed by per-fragment attribute
//! interpolation.

#![forbid(unsafe_code)]

pub mod hi_z;
pub mod interpolator;

pub use hi_z::{HiZConfig, HierarchicalZ};
pub use interpolator::{Interpolator, InterpolatorConfig};
