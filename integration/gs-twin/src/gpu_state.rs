//! Derives each downstream stage's per-draw fixed-function configuration
//! from the command processor's live [`RegisterFile`] (Section 4.2):
//! the register file itself carries no interpretation, so this is where
//! a `Register::CullMode` write actually becomes Triangle Setup's
//! `cull_mode`, a `Register::Tex0BaseAddr` write becomes a bound
//! texture, and so on.

use gpu_registers::{
    BlendFactor, CompareFunc, CullMode, PrimitiveMode, RegId, RegValue, Register, RegisterFile,
    TexFilter, TextureFormat, WrapMode,
};
use gs_twin_core::MAX_VERTEX_ATTRIBUTES;

fn get(registers: &RegisterFile, register: Register) -> Option<RegValue> {
    registers.get(RegId::scalar(register)).copied()
}

/// One bound texture unit's register-derived state, or `None` if
/// `Tex0BaseAddr` has never been written (texturing disabled).
#[derive(Clone, Copy, Debug)]
pub struct TextureBindingState {
    pub base_address: u32,
    pub format: TextureFormat,
    pub width_log2: u32,
    pub height_log2: u32,
    pub filter: TexFilter,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub tile_log2: u32,
}

/// Everything a draw needs pulled out of the register file once, at the
/// moment `DRAW` is dispatched — matching the data model's expectation
/// that a stage's fixed-function behavior is frozen for the duration of
/// the batch it is currently processing.
#[derive(Clone, Copy, Debug)]
pub struct DrawConfig {
    pub viewport_width: i32,
    pub viewport_height: i32,
    pub cull_mode: CullMode,
    pub primitive_mode: PrimitiveMode,
    pub depth_compare: CompareFunc,
    pub depth_write: bool,
    pub stencil_compare: CompareFunc,
    pub blend_enable: bool,
    pub blend_src: BlendFactor,
    pub blend_dst: BlendFactor,
    pub multisample_enable: bool,
    pub multisample_count: u32,
    pub fb_color_base: u32,
    pub fb_z_base: u32,
    pub fb_width_log2: u32,
    pub fb_height_log2: u32,
    pub texture: Option<TextureBindingState>,
    pub depth_bit_precision: u32,
    pub fragment_input_active: u32,
    pub compr_disabled: bool,
    pub state_buffer_address: u32,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u8,
}

impl DrawConfig {
    /// The compiled default for `Register::FbWidthLog2` when it has never
    /// been written, shared with construction-time config that needs a
    /// framebuffer width before any draw has run.
    #[must_use]
    pub const fn default_fb_width_log2() -> u32 {
        6
    }

    /// Reads every register this pipeline interprets, falling back to
    /// the compiled defaults named inline for any register never
    /// written this run (Section 6: "missing params use compiled
    /// default" applies equally to never-written registers).
    #[must_use]
    pub fn derive(registers: &RegisterFile) -> Self {
        let tex_base = get(registers, Register::Tex0BaseAddr).and_then(|v| v.as_uint()).unwrap_or(0);
        let texture = (tex_base != 0).then(|| TextureBindingState {
            base_address: tex_base,
            format: match get(registers, Register::Tex0Format) {
                Some(RegValue::TextureFormat(f)) => f,
                _ => TextureFormat::Rgba8888,
            },
            width_log2: get(registers, Register::Tex0WidthLog2).and_then(|v| v.as_uint()).unwrap_or(0),
            height_log2: get(registers, Register::Tex0HeightLog2).and_then(|v| v.as_uint()).unwrap_or(0),
            filter: match get(registers, Register::Tex0Filter) {
                Some(RegValue::TexFilter(f)) => f,
                _ => TexFilter::Nearest,
            },
            wrap_u: match get(registers, Register::Tex0WrapU) {
                Some(RegValue::WrapMode(w)) => w,
                _ => WrapMode::Repeat,
            },
            wrap_v: match get(registers, Register::Tex0WrapV) {
                Some(RegValue::WrapMode(w)) => w,
                _ => WrapMode::Repeat,
            },
            tile_log2: get(registers, Register::Tex0TileLog2).and_then(|v| v.as_uint()).unwrap_or(0),
        });

        Self {
            viewport_width: get(registers, Register::ViewportWidth).and_then(|v| v.as_uint()).unwrap_or(64) as i32,
            viewport_height: get(registers, Register::ViewportHeight).and_then(|v| v.as_uint()).unwrap_or(64) as i32,
            cull_mode: match get(registers, Register::CullMode) {
                Some(RegValue::CullMode(m)) => m,
                _ => CullMode::CullNone,
            },
            primitive_mode: match get(registers, Register::PrimitiveMode) {
                Some(RegValue::PrimitiveMode(m)) => m,
                _ => PrimitiveMode::Triangle,
            },
            depth_compare: match get(registers, Register::ZCompare) {
                Some(RegValue::CompareFunc(c)) => c,
                _ => CompareFunc::Less,
            },
            depth_write: get(registers, Register::ZWriteEnable).and_then(|v| v.as_bool()).unwrap_or(true),
            stencil_compare: match get(registers, Register::StencilCompare) {
                Some(RegValue::CompareFunc(c)) => c,
                _ => CompareFunc::Always,
            },
            blend_enable: get(registers, Register::BlendEnable).and_then(|v| v.as_bool()).unwrap_or(false),
            blend_src: match get(registers, Register::BlendSrcFactor) {
                Some(RegValue::BlendFactor(f)) => f,
                _ => BlendFactor::One,
            },
            blend_dst: match get(registers, Register::BlendDstFactor) {
                Some(RegValue::BlendFactor(f)) => f,
                _ => BlendFactor::Zero,
            },
            multisample_enable: get(registers, Register::MultisampleEnable).and_then(|v| v.as_bool()).unwrap_or(false),
            multisample_count: get(registers, Register::MultisampleCount).and_then(|v| v.as_uint()).unwrap_or(1),
            fb_color_base: get(registers, Register::FbColorBase).and_then(|v| v.as_uint()).unwrap_or(0),
            fb_z_base: get(registers, Register::FbZBase).and_then(|v| v.as_uint()).unwrap_or(0),
            fb_width_log2: get(registers, Register::FbWidthLog2).and_then(|v| v.as_uint()).unwrap_or(Self::default_fb_width_log2()),
            fb_height_log2: get(registers, Register::FbHeightLog2).and_then(|v| v.as_uint()).unwrap_or(6),
            texture,
            depth_bit_precision: get(registers, Register::DepthBitPrecision).and_then(|v| v.as_uint()).unwrap_or(24),
            fragment_input_active: get(registers, Register::FragmentInputActive).and_then(|v| v.as_uint()).unwrap_or(0b11),
            compr_disabled: get(registers, Register::ComprDisabled).and_then(|v| v.as_bool()).unwrap_or(false),
            state_buffer_address: get(registers, Register::StateBufferAddress).and_then(|v| v.as_uint()).unwrap_or(0),
            clear_color: get(registers, Register::ClearColor).and_then(|v| v.as_vec4()).unwrap_or([0.0; 4]),
            clear_depth: get(registers, Register::ClearDepth).and_then(|v| v.as_float()).unwrap_or(1.0),
            clear_stencil: get(registers, Register::ClearStencil).and_then(|v| v.as_uint()).unwrap_or(0) as u8,
        }
    }

    /// Decodes `fragment_input_active`'s bitmask into a per-slot active
    /// array, with `slot::POSITION` and `slot::FACE` always forced on
    /// regardless of the bitmask (the interpolator overwrites both
    /// unconditionally; see `gs-interpolator`).
    #[must_use]
    pub fn active_attributes(&self) -> [bool; MAX_VERTEX_ATTRIBUTES] {
        let mut active = [false; MAX_VERTEX_ATTRIBUTES];
        for (slot, flag) in active.iter_mut().enumerate() {
            *flag = (self.fragment_input_active >> slot) & 1 != 0;
        }
        active[gs_rasterizer::vertex::slot::POSITION] = true;
        active[gs_rasterizer::vertex::slot::FACE] = true;
        active
    }
}
