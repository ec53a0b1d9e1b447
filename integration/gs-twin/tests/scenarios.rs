//! End-to-end pipeline scenarios (spec Section 8), driving a fully wired
//! [`Pipeline`] through `submit`/`drain` rather than poking individual
//! component crates directly. Scenario numbering follows the spec.

use gpu_registers::{CompareFunc, RegId, RegValue, Register};
use gs_twin::{Pipeline, PipelineConfig};
use gs_twin_core::command::{CommandRecord, Verb};
use gs_twin_core::cookie::Cookie;

fn vertex_bytes(x: f32, y: f32, z: f32, w: f32) -> Vec<u8> {
    let mut bytes = vec![0u8; 256];
    bytes[0..4].copy_from_slice(&x.to_le_bytes());
    bytes[4..8].copy_from_slice(&y.to_le_bytes());
    bytes[8..12].copy_from_slice(&z.to_le_bytes());
    bytes[12..16].copy_from_slice(&w.to_le_bytes());
    bytes
}

/// Same vertex layout as `vertex_bytes`, with slot 1 (`COLOR`) also
/// populated so `PassthroughShader` carries it straight through to the
/// fragment stage without loading any microcode program.
fn vertex_bytes_colored(x: f32, y: f32, z: f32, w: f32, color: [f32; 4]) -> Vec<u8> {
    let mut bytes = vertex_bytes(x, y, z, w);
    for (lane, component) in color.iter().enumerate() {
        let off = 16 + lane * 4;
        bytes[off..off + 4].copy_from_slice(&component.to_le_bytes());
    }
    bytes
}

fn write_reg(pipeline: &mut Pipeline, register: Register, value: RegValue) {
    pipeline.submit(
        CommandRecord::RegisterWrite { id: RegId::scalar(register), value },
        None,
    );
}

/// Mirrors `RopConfig::stamp_address`'s stamp-tiled layout (Section
/// 4.8): the framebuffer is packed four pixels (one 2x2 stamp) per
/// 16-byte cache line rather than plain row-major order, so reading an
/// individual pixel's color back out of raw memory has to replicate the
/// same addressing the ROP used to write it.
fn stamp_pixel_address(x: u32, y: u32, width: u32) -> u32 {
    let stride_stamps = width.max(2).div_ceil(2);
    let stamp_col = x / 2;
    let stamp_row = y / 2;
    let base = (stamp_row * stride_stamps + stamp_col) * 16;
    let frag_idx = (y % 2) * 2 + (x % 2);
    base + frag_idx * 4
}

fn submit_draw(pipeline: &mut Pipeline, first_vertex: u32, vertex_count: u32) {
    pipeline.submit(
        CommandRecord::Verb {
            verb: Verb::Draw,
            first_vertex,
            vertex_count,
            buffer_id: None,
            cookie: Cookie::root(),
        },
        None,
    );
}

/// Submits scenario 2's geometry on a 16x16 viewport: a red quad built
/// from two triangles split along `x + y = 16`, with a small green
/// triangle drawn on top and interior to it. The viewport is kept small
/// so the whole framebuffer stays cache-resident (64 stamps, well under
/// the default 256-slot cache), which scenario 3 below relies on.
fn draw_scenario_two(pipeline: &mut Pipeline) {
    write_reg(pipeline, Register::ViewportWidth, RegValue::Uint(16));
    write_reg(pipeline, Register::ViewportHeight, RegValue::Uint(16));
    write_reg(pipeline, Register::FbWidthLog2, RegValue::Uint(4));
    write_reg(pipeline, Register::FbColorBase, RegValue::Uint(2 << 20));
    write_reg(pipeline, Register::ZCompare, RegValue::CompareFunc(CompareFunc::Lequal));

    let red = [1.0, 0.0, 0.0, 1.0];
    let green = [0.0, 1.0, 0.0, 1.0];
    let vertices = [
        (0.0, 0.0, red),
        (16.0, 0.0, red),
        (0.0, 16.0, red),
        (16.0, 0.0, red),
        (16.0, 16.0, red),
        (0.0, 16.0, red),
        (2.0, 2.0, green),
        (6.0, 2.0, green),
        (2.0, 6.0, green),
    ];
    for (index, (x, y, color)) in vertices.into_iter().enumerate() {
        pipeline.submit(
            CommandRecord::MemoryWrite {
                address: index as u32 * 256,
                bytes: vertex_bytes_colored(x, y, 0.1, 1.0, color),
            },
            None,
        );
    }

    submit_draw(pipeline, 0, 9);
    pipeline.submit(CommandRecord::verb(Verb::SwapBuffers, Cookie::root()), None);
    pipeline.drain(200_000);
}

/// Scenario 1: a clear-only frame on a 100x100 viewport writes 10,000
/// pixels of the cleared color and assembles zero triangles.
#[test]
fn clear_only_frame_writes_expected_pixel_pattern() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());

    write_reg(&mut pipeline, Register::ViewportWidth, RegValue::Uint(100));
    write_reg(&mut pipeline, Register::ViewportHeight, RegValue::Uint(100));
    write_reg(&mut pipeline, Register::ClearColor, RegValue::Vec4F([0.0, 1.0, 0.0, 0.0]));
    write_reg(&mut pipeline, Register::FbColorBase, RegValue::Uint(0));

    pipeline.submit(CommandRecord::verb(Verb::ClearColor, Cookie::root()), None);
    pipeline.submit(CommandRecord::verb(Verb::SwapBuffers, Cookie::root()), None);
    pipeline.drain(64);

    let bytes = pipeline.memory().store().read(0, 100 * 100 * 4);
    for pixel in bytes.chunks_exact(4) {
        assert_eq!(pixel, [0, 255, 0, 0]);
    }
    assert_eq!(pipeline.triangles_submitted(), 0);
    assert_eq!(pipeline.frames_presented(), 1);
}

/// Scenario 2: two triangles forming a red quad with a smaller green
/// triangle drawn over it produce the expected per-pixel colors at
/// sample points inside and outside the green triangle's area.
#[test]
fn two_triangles_produce_red_quad_with_green_triangle() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    draw_scenario_two(&mut pipeline);

    let base = 2u32 << 20;
    let read_pixel = |pipeline: &Pipeline, x: u32, y: u32| {
        pipeline.memory().store().read(base + stamp_pixel_address(x, y, 16), 4)
    };

    assert_eq!(read_pixel(&pipeline, 3, 3), vec![0, 255, 0, 255], "inside the green triangle");
    assert_eq!(read_pixel(&pipeline, 10, 10), vec![255, 0, 0, 255], "inside the quad, outside the triangle");
    assert_eq!(read_pixel(&pipeline, 1, 1), vec![255, 0, 0, 255], "near the quad's corner, outside the triangle");
    assert_eq!(pipeline.triangles_submitted(), 3);
}

/// Scenario 3: save/restore color state around an intervening clear
/// leaves the final frame byte-identical to scenario 2's drawn result,
/// since the saved block-state is restored before the next swap.
#[test]
fn save_then_restore_color_state_undoes_intervening_clear() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());
    write_reg(&mut pipeline, Register::StateBufferAddress, RegValue::Uint(0x0100_0000));

    draw_scenario_two(&mut pipeline);
    let base = 2u32 << 20;
    let region_len = 16 * 16 * 4;
    let scenario_two_frame = pipeline.memory().store().read(base, region_len);

    // Save/restore iterate one physical cache line per cycle (256 lines
    // at the default cache config), so these need a much larger budget
    // than a single draw's settle time.
    const STATE_OP_BUDGET: u64 = 4096;

    pipeline.submit(CommandRecord::verb(Verb::SaveColorState, Cookie::root()), None);
    pipeline.drain(STATE_OP_BUDGET);

    write_reg(&mut pipeline, Register::ClearColor, RegValue::Vec4F([0.0, 0.0, 1.0, 0.0]));
    pipeline.submit(CommandRecord::verb(Verb::ClearColor, Cookie::root()), None);
    pipeline.submit(CommandRecord::verb(Verb::SwapBuffers, Cookie::root()), None);
    pipeline.drain(STATE_OP_BUDGET);

    pipeline.submit(CommandRecord::verb(Verb::RestoreColorState, Cookie::root()), None);
    pipeline.drain(STATE_OP_BUDGET);
    pipeline.submit(CommandRecord::verb(Verb::SwapBuffers, Cookie::root()), None);
    pipeline.drain(STATE_OP_BUDGET);

    let restored_frame = pipeline.memory().store().read(base, region_len);
    assert_eq!(scenario_two_frame, restored_frame);
}

/// Boundary behavior: a batch with exactly one (non-degenerate) triangle
/// assembles exactly one triangle and drains to an idle pipeline well
/// within a generous cycle budget, even though every downstream unit
/// starts out idle (Section 8: "terminates in bounded cycles after the
/// last-triangle sentinel even if all downstream units are idle").
#[test]
fn single_triangle_batch_terminates_in_bounded_cycles() {
    let mut pipeline = Pipeline::new(PipelineConfig::default());

    for (index, (x, y)) in [(10.0, 10.0), (50.0, 10.0), (10.0, 50.0)].into_iter().enumerate() {
        pipeline.submit(
            CommandRecord::MemoryWrite {
                address: index as u32 * 256,
                bytes: vertex_bytes(x, y, 0.1, 1.0),
            },
            None,
        );
    }

    pipeline.submit(
        CommandRecord::Verb {
            verb: Verb::Draw,
            first_vertex: 0,
            vertex_count: 3,
            buffer_id: None,
            cookie: Cookie::root(),
        },
        None,
    );

    const BUDGET: u64 = 200_000;
    pipeline.drain(BUDGET);

    assert_eq!(pipeline.triangles_submitted(), 1);
    assert!(
        pipeline.cycle() < BUDGET,
        "pipeline should reach idle well before the cycle budget, stalled at cycle {}",
        pipeline.cycle()
    );
}
