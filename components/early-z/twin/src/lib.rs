//! Early-Z: the per-pixel depth/stencil compare-and-update math consumed
//! by `gs-zbuf`'s ROP operation callback (spec Section 4.8's "the
//! callback updates per-pixel result bytes and the mask"). This crate
//! owns only the test itself — byte layout in/out, compare function,
//! stencil op — not cache choreography, which lives in `gs-memory`/
//! `gs-zbuf`.

#![forbid(unsafe_code)]

use gpu_registers::CompareFunc;
use qfixed::UDepth24;

/// Depth+stencil pixel layout: `depth_bytes` little-endian depth value
/// packed into the low `depth_bytes` of each 4-byte word, stencil in the
/// remaining byte.
#[derive(Clone, Copy, Debug)]
pub struct DepthStencilFormat {
    pub depth_bytes: u32,
    pub stencil_enable: bool,
}

impl Default for DepthStencilFormat {
    fn default() -> Self {
        Self {
            depth_bytes: 3,
            stencil_enable: false,
        }
    }
}

impl DepthStencilFormat {
    #[must_use]
    pub fn bytes_per_pixel(&self) -> u32 {
        4
    }

    #[must_use]
    pub fn unpack(&self, word: &[u8]) -> (UDepth24, u8) {
        let mut raw = [0u8; 4];
        raw[..word.len().min(4)].copy_from_slice(&word[..word.len().min(4)]);
        let depth = u32::from_le_bytes(raw) & UDepth24::MAX;
        (UDepth24::new(depth), word.get(3).copied().unwrap_or(0))
    }

    #[must_use]
    pub fn pack(&self, depth: UDepth24, stencil: u8) -> [u8; 4] {
        let mut out = depth.get().to_le_bytes();
        out[3] = stencil;
        out
    }
}

/// Stencil operation applied when the stencil test passes/fails (the
/// subset used by the end-to-end scenarios: keep the existing value or
/// replace it with the reference).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    Replace,
    Zero,
    Increment,
}

impl StencilOp {
    #[must_use]
    pub fn apply(self, current: u8, reference: u8) -> u8 {
        match self {
            StencilOp::Keep => current,
            StencilOp::Replace => reference,
            StencilOp::Zero => 0,
            StencilOp::Increment => current.saturating_add(1),
        }
    }
}

/// The Z/Stencil test configuration a single fragment is evaluated
/// against.
#[derive(Clone, Copy, Debug)]
pub struct EarlyZConfig {
    pub format: DepthStencilFormat,
    pub depth_compare: CompareFunc,
    pub depth_write: bool,
    pub stencil_compare: CompareFunc,
    pub stencil_reference: u8,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_pass_op: StencilOp,
    pub stencil_fail_op: StencilOp,
}

impl Default for EarlyZConfig {
    fn default() -> Self {
        Self {
            format: DepthStencilFormat::default(),
            depth_compare: CompareFunc::Less,
            depth_write: true,
            stencil_compare: CompareFunc::Always,
            stencil_reference: 0,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_pass_op: StencilOp::Keep,
            stencil_fail_op: StencilOp::Keep,
        }
    }
}

fn compare(func: CompareFunc, incoming: u32, existing: u32) -> bool {
    match func {
        CompareFunc::Less => incoming < existing,
        CompareFunc::Lequal => incoming <= existing,
        CompareFunc::Equal => incoming == existing,
        CompareFunc::Gequal => incoming >= existing,
        CompareFunc::Greater => incoming > existing,
        CompareFunc::Notequal => incoming != existing,
        CompareFunc::Always => true,
        CompareFunc::Never => false,
    }
}

/// The result of testing one fragment: whether it survives, the bytes to
/// write back (meaningless if `!pass`), and the write mask.
#[derive(Clone, Copy, Debug)]
pub struct EarlyZResult {
    pub pass: bool,
    pub bytes: [u8; 4],
    pub mask: [bool; 4],
}

/// Runs the depth test (and, if enabled, the stencil test) for one
/// fragment against the current depth/stencil word.
#[must_use]
pub fn test_fragment(config: &EarlyZConfig, existing: &[u8], incoming_depth: UDepth24) -> EarlyZResult {
    let (existing_depth, existing_stencil) = config.format.unpack(existing);

    let stencil_pass = !config.format.stencil_enable
        || compare(
            config.stencil_compare,
            u32::from(config.stencil_reference & config.stencil_read_mask),
            u32::from(existing_stencil & config.stencil_read_mask),
        );

    let depth_pass = stencil_pass && compare(config.depth_compare, incoming_depth.get(), existing_depth.get());

    let new_stencil = if config.format.stencil_enable {
        let op = if depth_pass {
            config.stencil_pass_op
        } else {
            config.stencil_fail_op
        };
        let applied = op.apply(existing_stencil, config.stencil_reference);
        (applied & config.stencil_write_mask) | (existing_stencil & !config.stencil_write_mask)
    } else {
        existing_stencil
    };

    let out_depth = if depth_pass && config.depth_write {
        incoming_depth
    } else {
        existing_depth
    };
    let bytes = config.format.pack(out_depth, new_stencil);
    let depth_mask = depth_pass && config.depth_write;
    let stencil_mask = config.format.stencil_enable && new_stencil != existing_stencil;
    EarlyZResult {
        pass: depth_pass,
        bytes,
        mask: [depth_mask, depth_mask, depth_mask, stencil_mask],
    }
}
