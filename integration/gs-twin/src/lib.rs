//! `gs-twin`: a cycle-accurate functional simulator of a tile-based GPU's
//! 3D rendering pipeline (spec Sections 1-5). Every fixed-function stage
//! lives in its own component crate under `components/`; this crate's
//! job is purely integration — [`pipeline::Pipeline`] wires those stages
//! into one signal graph and drives a command trace through it one
//! cycle at a time.
//!
//! Module map:
//! - [`trace`] decodes a recorded command trace file into a sequence of
//!   [`gs_twin_core::command::CommandRecord`]s.
//! - [`sim_params`] loads the flat simulation parameter table used to
//!   configure a run.
//! - [`gpu_state`] derives each draw's fixed-function configuration from
//!   the command processor's live register file.
//! - [`shader`] executes loaded vertex/fragment microcode programs.
//! - [`pipeline`] assembles and drives the whole simulator.
//! - [`snapshot`] renders a human-readable debug dump of pipeline state.

#![forbid(unsafe_code)]

pub mod gpu_state;
pub mod pipeline;
pub mod shader;
pub mod sim_params;
pub mod snapshot;
pub mod trace;

pub use pipeline::{Pipeline, PipelineConfig, RasterizerChoice, RasterizerStage};
pub use sim_params::{ParamError, ParamTable, ParamValue};
pub use trace::{read_trace, TraceHeader, TraceRecord};
