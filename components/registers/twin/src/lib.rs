//! Register value domain for the `gs-twin` pipeline.
//!
//! This crate used to be generated straight from a SystemRDL register map
//! for the `pico-gs` fixed-function hardware (memory-mapped bitfield
//! structs accessed through raw pointers). The simulator core has no
//! memory-mapped registers to generate against — it receives typed
//! `(register, sub-index, value)` triples over a command stream (Section
//! 4.2 / 6) — so this crate is hand-written instead of `peakrdl-rust`
//! generated, dropping that code-generation dependency; see `DESIGN.md`
//! for the note. What survives from the generated style is the encoded
//! field-enum pattern (`from_bits`/`bits`, `#[repr(u8)]`) used throughout
//! `registers/src/components/*_e.rs` in this workspace's hardware twin —
//! the command-stream enums below follow the same shape.

#![forbid(unsafe_code)]

mod enums;
mod file;
mod value;

pub use enums::*;
pub use file::{RegisterFile, StageState};
pub use value::RegValue;

/// A register identity: which register, and which sub-index within it
/// (array registers — viewport, blend constant color, per-texture-unit
/// state — are addressed by sub-index; scalar registers always use 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegId {
    pub register: Register,
    pub sub_index: u8,
}

impl RegId {
    #[must_use]
    pub const fn scalar(register: Register) -> Self {
        Self {
            register,
            sub_index: 0,
        }
    }

    #[must_use]
    pub const fn indexed(register: Register, sub_index: u8) -> Self {
        Self {
            register,
            sub_index,
        }
    }
}

/// Every register the command processor distributes writes to. Stages
/// subscribe to the subset they own; an update to a register nobody owns
/// is accepted and ignored (it simply never changes observable behavior).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Register {
    ViewportWidth = 0,
    ViewportHeight = 1,
    ClearColor = 2,
    ClearDepth = 3,
    ClearStencil = 4,
    ZCompare = 5,
    ZWriteEnable = 6,
    StencilCompare = 7,
    CullMode = 8,
    FaceMode = 9,
    BlendEnable = 10,
    BlendSrcFactor = 11,
    BlendDstFactor = 12,
    PrimitiveMode = 13,
    DepthBitPrecision = 14,
    MultisampleEnable = 15,
    MultisampleCount = 16,
    FbColorBase = 17,
    FbZBase = 18,
    FbWidthLog2 = 19,
    FbHeightLog2 = 20,
    Tex0BaseAddr = 21,
    Tex0Format = 22,
    Tex0WidthLog2 = 23,
    Tex0HeightLog2 = 24,
    Tex0Filter = 25,
    Tex0WrapU = 26,
    Tex0WrapV = 27,
    Tex0TileLog2 = 28,
    InterpolationMode = 29,
    FragmentInputActive = 30,
    ComprDisabled = 31,
    StateBufferAddress = 32,
}
