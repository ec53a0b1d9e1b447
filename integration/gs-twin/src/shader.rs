//! Shader execution (Section 4.11): vertex and fragment programs are
//! opaque binary blobs loaded through `LOAD_VERTEX_PROGRAM` /
//! `LOAD_FRAGMENT_PROGRAM` and executed once per vertex or fragment.
//! `gs-spi::CommandProcessor` already stores the loaded bytes as an
//! opaque `Vec<u8>`; this module is what gives that byte stream meaning.
//!
//! [`ShaderUnit`] is the seam: the pipeline only ever calls
//! `run_vertex`/`run_fragment` against a loaded program, never against a
//! concrete interpreter. [`MicrocodeShader`] is the reference
//! interpreter for the small encoded instruction set a trace's shader
//! bytes actually contain (Section 4.11's "MOV/MUL/ADD/TEX/END" ISA);
//! swapping in a JIT or a native-code path later only means a new
//! `ShaderUnit` impl, not a change to the stages that call it.

use gs_twin_core::MAX_VERTEX_ATTRIBUTES;

/// A 4-lane attribute vector, matching `gs_rasterizer::vertex::Attribute`.
pub type Attribute = [f32; 4];

/// Per-vertex shader input: the streamer's raw attribute fetch for one
/// vertex, before any interpolation.
#[derive(Clone, Debug)]
pub struct VertexContext {
    pub inputs: [Attribute; MAX_VERTEX_ATTRIBUTES],
}

/// Per-vertex shader output: written back into the vertex Primitive
/// Assembly consumes, always including a homogeneous-clip-space
/// position in `slot::POSITION`.
#[derive(Clone, Debug)]
pub struct VertexOutput {
    pub outputs: [Attribute; MAX_VERTEX_ATTRIBUTES],
}

/// Samples a bound texture unit during fragment shading. Implemented by
/// the integration layer over whatever texture binding is active for
/// the current draw; kept as a trait object so `FragmentContext` does
/// not need to know about `gs-pixel-write`'s `BoundTexture` type.
pub trait FragmentTexture {
    fn sample(&self, unit: u32, u: f32, v: f32) -> Attribute;
}

/// No bound texture: every `TEX` sample resolves to opaque white,
/// matching "texture disabled" in the color combiner.
pub struct NoTexture;

impl FragmentTexture for NoTexture {
    fn sample(&self, _unit: u32, _u: f32, _v: f32) -> Attribute {
        [1.0, 1.0, 1.0, 1.0]
    }
}

/// Per-fragment shader input: the interpolator's already-interpolated
/// attribute set for one fragment, plus whatever texture units are
/// bound for this draw.
pub struct FragmentContext<'a> {
    pub inputs: [Attribute; MAX_VERTEX_ATTRIBUTES],
    pub texture: &'a dyn FragmentTexture,
}

/// Per-fragment shader output: the shaded color (and any other output
/// attribute slots a program chooses to write) handed to the color
/// combiner in place of the raw interpolated vertex color.
#[derive(Clone, Debug)]
pub struct FragmentOutput {
    pub outputs: [Attribute; MAX_VERTEX_ATTRIBUTES],
}

/// Unifies whatever concrete program representation a loaded shader
/// byte blob decodes to, so Primitive Assembly's vertex stage and
/// `gs-pixel-write`'s operate callback can run a program without
/// knowing its instruction set.
pub trait ShaderUnit {
    fn run_vertex(&self, ctx: &VertexContext) -> VertexOutput;
    fn run_fragment(&self, ctx: &FragmentContext) -> FragmentOutput;
}

/// A shader that forwards `slot::POSITION` (and every other active
/// input slot) unchanged — the "passthrough" program a trace with no
/// `LOAD_*_PROGRAM` record implicitly runs, and scenario 2's exact
/// program.
pub struct PassthroughShader;

impl ShaderUnit for PassthroughShader {
    fn run_vertex(&self, ctx: &VertexContext) -> VertexOutput {
        VertexOutput { outputs: ctx.inputs }
    }

    fn run_fragment(&self, ctx: &FragmentContext) -> FragmentOutput {
        FragmentOutput { outputs: ctx.inputs }
    }
}

/// One decoded microcode instruction: 4 bytes, `[opcode, dst, src_a, src_b]`.
#[derive(Clone, Copy, Debug)]
struct Instruction {
    op: Opcode,
    dst: u8,
    src_a: u8,
    src_b: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Opcode {
    Mov,
    Mul,
    Add,
    Tex,
    End,
}

impl Opcode {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Opcode::Mov),
            1 => Some(Opcode::Mul),
            2 => Some(Opcode::Add),
            3 => Some(Opcode::Tex),
            4 => Some(Opcode::End),
            _ => None,
        }
    }
}

/// Register addressing: a single byte selects one of the input attribute
/// slots (`0..16`), a general-purpose temporary (`16..32`), or an output
/// attribute slot (`32..48`). Anything else reads/writes as the zero
/// vector, matching an unused register lane rather than a fault.
const TEMP_BASE: u8 = MAX_VERTEX_ATTRIBUTES as u8;
const OUTPUT_BASE: u8 = TEMP_BASE + MAX_VERTEX_ATTRIBUTES as u8;
const NUM_TEMPS: usize = MAX_VERTEX_ATTRIBUTES;

/// Decoded, ready-to-run microcode program: the reference interpreter
/// for Section 4.11's fixed ISA.
#[derive(Clone, Debug, Default)]
pub struct MicrocodeShader {
    instructions: Vec<Instruction>,
}

impl MicrocodeShader {
    /// Decodes a loaded program's raw bytes (as `gs-spi` stores them)
    /// into instructions, four bytes at a time. A trailing partial
    /// instruction (fewer than 4 bytes left) is dropped; an empty or
    /// all-zero program decodes to a single implicit `END`.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let mut instructions = Vec::with_capacity(bytes.len() / 4);
        for chunk in bytes.chunks_exact(4) {
            let Some(op) = Opcode::from_byte(chunk[0]) else {
                log::warn!("microcode shader: unknown opcode {}, truncating program", chunk[0]);
                break;
            };
            instructions.push(Instruction {
                op,
                dst: chunk[1],
                src_a: chunk[2],
                src_b: chunk[3],
            });
        }
        if instructions.last().map(|i| i.op) != Some(Opcode::End) {
            instructions.push(Instruction { op: Opcode::End, dst: 0, src_a: 0, src_b: 0 });
        }
        Self { instructions }
    }

    fn run(&self, inputs: &[Attribute; MAX_VERTEX_ATTRIBUTES], texture: &dyn FragmentTexture) -> [Attribute; MAX_VERTEX_ATTRIBUTES] {
        let mut temps = [[0.0f32; 4]; NUM_TEMPS];
        let mut outputs = [[0.0f32; 4]; MAX_VERTEX_ATTRIBUTES];

        let read = |reg: u8, temps: &[Attribute; NUM_TEMPS], outputs: &[Attribute; MAX_VERTEX_ATTRIBUTES]| -> Attribute {
            if (reg as usize) < MAX_VERTEX_ATTRIBUTES {
                inputs[reg as usize]
            } else if reg >= TEMP_BASE && (reg - TEMP_BASE) as usize < NUM_TEMPS {
                temps[(reg - TEMP_BASE) as usize]
            } else if reg >= OUTPUT_BASE && (reg - OUTPUT_BASE) as usize < MAX_VERTEX_ATTRIBUTES {
                outputs[(reg - OUTPUT_BASE) as usize]
            } else {
                [0.0; 4]
            }
        };

        let mut write = |reg: u8, value: Attribute, temps: &mut [Attribute; NUM_TEMPS], outputs: &mut [Attribute; MAX_VERTEX_ATTRIBUTES]| {
            if reg >= TEMP_BASE && (reg - TEMP_BASE) as usize < NUM_TEMPS {
                temps[(reg - TEMP_BASE) as usize] = value;
            } else if reg >= OUTPUT_BASE && (reg - OUTPUT_BASE) as usize < MAX_VERTEX_ATTRIBUTES {
                outputs[(reg - OUTPUT_BASE) as usize] = value;
            }
            // Writes targeting an input slot are dropped: inputs are read-only.
        };

        for inst in &self.instructions {
            match inst.op {
                Opcode::Mov => {
                    let v = read(inst.src_a, &temps, &outputs);
                    write(inst.dst, v, &mut temps, &mut outputs);
                }
                Opcode::Mul => {
                    let a = read(inst.src_a, &temps, &outputs);
                    let b = read(inst.src_b, &temps, &outputs);
                    let v = std::array::from_fn(|i| a[i] * b[i]);
                    write(inst.dst, v, &mut temps, &mut outputs);
                }
                Opcode::Add => {
                    let a = read(inst.src_a, &temps, &outputs);
                    let b = read(inst.src_b, &temps, &outputs);
                    let v = std::array::from_fn(|i| a[i] + b[i]);
                    write(inst.dst, v, &mut temps, &mut outputs);
                }
                Opcode::Tex => {
                    let uv = read(inst.src_a, &temps, &outputs);
                    let v = texture.sample(u32::from(inst.src_b), uv[0], uv[1]);
                    write(inst.dst, v, &mut temps, &mut outputs);
                }
                Opcode::End => break,
            }
        }

        outputs
    }
}

impl ShaderUnit for MicrocodeShader {
    fn run_vertex(&self, ctx: &VertexContext) -> VertexOutput {
        VertexOutput {
            outputs: self.run(&ctx.inputs, &NoTexture),
        }
    }

    fn run_fragment(&self, ctx: &FragmentContext) -> FragmentOutput {
        FragmentOutput {
            outputs: self.run(&ctx.inputs, ctx.texture),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_rasterizer::vertex::slot;

    fn inputs_with_position(p: Attribute) -> [Attribute; MAX_VERTEX_ATTRIBUTES] {
        let mut inputs = [[0.0f32; 4]; MAX_VERTEX_ATTRIBUTES];
        inputs[slot::POSITION] = p;
        inputs
    }

    #[test]
    fn empty_program_decodes_to_implicit_end() {
        let program = MicrocodeShader::decode(&[]);
        let ctx = VertexContext { inputs: inputs_with_position([1.0, 2.0, 3.0, 1.0]) };
        let out = program.run_vertex(&ctx);
        assert_eq!(out.outputs[slot::POSITION], [0.0; 4]);
    }

    #[test]
    fn mov_copies_input_position_to_output() {
        // MOV dst=OUTPUT_BASE+POSITION, src_a=POSITION ; END
        let bytes = vec![0, OUTPUT_BASE + slot::POSITION as u8, slot::POSITION as u8, 0, 4, 0, 0, 0];
        let program = MicrocodeShader::decode(&bytes);
        let ctx = VertexContext { inputs: inputs_with_position([1.0, 2.0, 3.0, 1.0]) };
        let out = program.run_vertex(&ctx);
        assert_eq!(out.outputs[slot::POSITION], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn mul_then_add_combines_two_temporaries() {
        // temp0 = input[POSITION] * input[POSITION]
        // temp1 = temp0 + input[POSITION]
        // out[COLOR] = temp1
        let t0 = TEMP_BASE;
        let t1 = TEMP_BASE + 1;
        let pos = slot::POSITION as u8;
        let bytes = vec![
            1, t0, pos, pos, // MUL t0, pos, pos
            2, t1, t0, pos, // ADD t1, t0, pos
            0, OUTPUT_BASE + slot::COLOR as u8, t1, 0, // MOV out[COLOR], t1
            4, 0, 0, 0, // END
        ];
        let program = MicrocodeShader::decode(&bytes);
        let ctx = VertexContext { inputs: inputs_with_position([2.0, 0.0, 0.0, 0.0]) };
        let out = program.run_vertex(&ctx);
        assert_eq!(out.outputs[slot::COLOR][0], 6.0); // 2*2 + 2
    }

    #[test]
    fn tex_samples_bound_texture_into_destination() {
        struct Solid;
        impl FragmentTexture for Solid {
            fn sample(&self, _unit: u32, _u: f32, _v: f32) -> Attribute {
                [0.25, 0.5, 0.75, 1.0]
            }
        }
        let bytes = vec![3, OUTPUT_BASE + slot::COLOR as u8, slot::TEXCOORD0 as u8, 0, 4, 0, 0, 0];
        let program = MicrocodeShader::decode(&bytes);
        let mut inputs = [[0.0f32; 4]; MAX_VERTEX_ATTRIBUTES];
        inputs[slot::TEXCOORD0] = [0.5, 0.5, 0.0, 0.0];
        let ctx = FragmentContext { inputs, texture: &Solid };
        let out = program.run_fragment(&ctx);
        assert_eq!(out.outputs[slot::COLOR], [0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn unknown_opcode_truncates_rather_than_panics() {
        let bytes = vec![255, 0, 0, 0];
        let program = MicrocodeShader::decode(&bytes);
        let ctx = VertexContext { inputs: inputs_with_position([9.0; 4]) };
        let out = program.run_vertex(&ctx);
        assert_eq!(out.outputs[slot::POSITION], [0.0; 4]);
    }
}
