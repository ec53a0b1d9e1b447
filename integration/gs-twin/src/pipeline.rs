//! Assembles every component crate into one running simulator (Section
//! 4.1's pipeline skeleton): Command Processor -> vertex fetch/shading ->
//! Primitive Assembly -> Triangle Setup -> rasterizer traversal ->
//! Interpolator (with embedded Hierarchical-Z) -> Z/Stencil ROP ->
//! fragment shading -> Color ROP -> Display. Every inter-stage edge here
//! is a `Signal`/`Queue` transfer already owned by the component crate;
//! this module's job is purely to drain one stage's output into the
//! next stage's input once per cycle, in topological order, and to
//! dispatch verbs into the handful of steps (vertex fetch, clears, swap,
//! shader loads) that have no dedicated component crate of their own.

use std::collections::{HashMap, VecDeque};

use gpu_registers::{CompareFunc, RegisterFile};
use gs_early_z::EarlyZConfig;
use gs_interpolator::{HiZConfig, HierarchicalZ, Interpolator, InterpolatorConfig};
use gs_memory::{BackingStore, CacheConfig, MemoryController};
use gs_pixel_write::{BoundTexture, ColorPipelineConfig, PixelWrite, PixelWriteConfig};
use gs_primitive_assembly::{AssemblyConfig, PrimitiveAssembly, StreamedVertex};
use gs_rasterizer::recursive::RecursiveDescent;
use gs_rasterizer::traversal_scanline::ScanlineTraversal;
use gs_rasterizer::triangle_setup::{SetupConfig, TriangleSetup};
use gs_rasterizer::vertex::slot;
use gs_rasterizer::{AssembledTriangle, Fragment, Rasterizer, SetupOutput, Stamp, TriangleArena, Vertex};
use gs_rop::{RopCommand, RopStampData};
use gs_spi::{CommandProcessor, CommandProcessorConfig, VerbTiming};
use gs_twin_core::command::{CommandRecord, Verb};
use gs_twin_core::memory_if::MemoryTransaction;
use gs_twin_core::tile::MapperPolicy;
use gs_twin_core::MAX_VERTEX_ATTRIBUTES;
use gs_zbuf::{ZBuf, ZBufConfig, ZStencilOperation};
use gs_display::{Display, DisplayConfig};

use crate::gpu_state::DrawConfig;
use crate::shader::{FragmentContext, FragmentTexture, NoTexture, PassthroughShader, ShaderUnit, VertexContext};

/// Which traversal strategy is driving the rasterizer (REDESIGN FLAGS:
/// selected at configuration time rather than compiled as two separate
/// binaries). The shared [`Rasterizer`] trait only exposes `tick`/
/// `is_idle`, not the concrete `input`/`output` signals each strategy
/// owns, so the pipeline matches on the concrete variant wherever it
/// needs to read or write one of those signals directly.
pub enum RasterizerStage {
    Scanline(ScanlineTraversal),
    Recursive(RecursiveDescent),
}

impl RasterizerStage {
    fn tick(&mut self, cycle: u64, arena: &mut TriangleArena, hi_z_ready: bool) {
        match self {
            RasterizerStage::Scanline(s) => Rasterizer::tick(s, cycle, arena, hi_z_ready),
            RasterizerStage::Recursive(r) => Rasterizer::tick(r, cycle, arena, hi_z_ready),
        }
    }

    fn is_idle(&self) -> bool {
        match self {
            RasterizerStage::Scanline(s) => s.is_idle(),
            RasterizerStage::Recursive(r) => r.is_idle(),
        }
    }

    fn input_write(&mut self, cycle: u64, value: SetupOutput) {
        match self {
            RasterizerStage::Scanline(s) => s.input.write(cycle, value, 0),
            RasterizerStage::Recursive(r) => r.input.write(cycle, value, 0),
        }
    }

    fn output_read(&mut self, cycle: u64) -> Option<Stamp> {
        match self {
            RasterizerStage::Scanline(s) => s.output.read(cycle),
            RasterizerStage::Recursive(r) => r.output.read(cycle),
        }
    }
}

/// Which traversal strategy to build — the Section 6 `rasterMode`
/// parameter's resolved value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterizerChoice {
    Scanline,
    Recursive,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub memory_size: usize,
    pub memory_latency: u64,
    pub memory_max_in_flight: usize,
    pub vertex_buffer_base: u32,
    pub color_buffer_a: u32,
    pub color_buffer_b: u32,
    pub z_buffer_base: u32,
    pub rasterizer: RasterizerChoice,
    pub unit_count: u32,
    pub mapper_policy: MapperPolicy,
    pub cache: CacheConfig,
    /// Multisampling is a construction-time pipeline parameter rather
    /// than a per-draw register-derived one, the same way `rasterizer`/
    /// `unit_count`/`mapper_policy` already are here: both ROP engines'
    /// per-buffer sample-count allocation is baked into their cache and
    /// queue sizing at `RopEngine::new`, so toggling it mid-stream would
    /// mean tearing down and rebuilding the cache, not just flipping a
    /// flag (see `gs-rop`'s `RopConfig`, which has no public setter).
    pub multisampling: bool,
    pub msaa_samples: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            memory_size: 16 * 1024 * 1024,
            memory_latency: 4,
            memory_max_in_flight: 16,
            vertex_buffer_base: 0,
            color_buffer_a: 1 << 20,
            color_buffer_b: 2 << 20,
            z_buffer_base: 3 << 20,
            rasterizer: RasterizerChoice::Scanline,
            unit_count: 1,
            mapper_policy: MapperPolicy::HorizontalStripes,
            cache: CacheConfig {
                ways: 4,
                lines: 64,
                pixels_per_line: 4,
                bytes_per_pixel: 16,
                compr_disabled: false,
            },
            multisampling: false,
            msaa_samples: 1,
        }
    }
}

/// Per-vertex fetch stride: one `Attribute` per attribute slot, packed
/// contiguously. Section 6 does not define the vertex buffer's wire
/// layout, so this pipeline adopts a fixed convention (every attribute
/// slot present, in slot order) rather than a register-described vertex
/// format; see `DESIGN.md`.
const VERTEX_STRIDE_BYTES: u32 = (MAX_VERTEX_ATTRIBUTES * 16) as u32;

struct PendingDraw {
    remaining: u32,
    next_index: u32,
    cookie: gs_twin_core::cookie::Cookie,
}

/// A ROP cache iteration verb queued to run one physical line per cycle
/// against a `RopCache`: `Save`/`Restore`/`Reset` move block-state
/// metadata (spec 4.9) to/from the backing state buffer; `Flush` writes
/// every dirty line's pixel bytes back to the color/depth buffer itself
/// (issued on `SWAP_BUFFERS`/`FLUSH_*`, since this cache is write-back).
#[derive(Clone, Copy, Debug)]
enum CacheOp {
    Save,
    Restore,
    Reset,
    Flush,
}

/// The fully wired simulator. Owns every pipeline stage plus the shared
/// backing memory both ROP instances' caches draw from.
pub struct Pipeline {
    config: PipelineConfig,
    cycle: u64,
    memory: MemoryController,
    command: CommandProcessor,
    assembly: PrimitiveAssembly,
    setup: TriangleSetup,
    arena: TriangleArena,
    raster: RasterizerStage,
    interpolator: Interpolator,
    zbuf: ZBuf,
    pixel_write: PixelWrite,
    display: Display,
    vertex_shader: Box<dyn ShaderUnit>,
    fragment_shader: Box<dyn ShaderUnit>,
    pending_vertices: VecDeque<StreamedVertex>,
    pending_draws: VecDeque<PendingDraw>,
    /// At most one cache op iterates per cache at a time; queued here so
    /// `SAVE`/`RESTORE`/`RESET`/`FLUSH`/`SWAP` submitted back-to-back
    /// each run to completion in submission order rather than
    /// clobbering a still-in-progress iteration.
    pending_color_cache_ops: VecDeque<(CacheOp, u32)>,
    pending_zstencil_cache_ops: VecDeque<(CacheOp, u32)>,
    buffer_bytes: HashMap<u32, Vec<u8>>,
    next_transaction_tag: u32,
    frames_presented: u64,
    triangles_submitted: u64,
}

fn build_raster_stage(
    choice: RasterizerChoice,
    unit_count: u32,
    mapper_policy: MapperPolicy,
    msaa_samples: u32,
) -> RasterizerStage {
    match choice {
        RasterizerChoice::Scanline => RasterizerStage::Scanline(ScanlineTraversal::new(
            gs_rasterizer::traversal_scanline::TraversalConfig {
                stamps_per_cycle: 1,
                msaa_samples: msaa_samples.max(1) as usize,
                unit_count,
                mapper_policy,
            },
            16,
        )),
        RasterizerChoice::Recursive => RasterizerStage::Recursive(RecursiveDescent::new(
            gs_rasterizer::recursive::RecursiveConfig {
                unit_count,
                mapper_policy,
                ..Default::default()
            },
            16,
            unit_count.max(1) as usize,
        )),
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let memory = MemoryController::new(
            BackingStore::new(config.memory_size),
            config.memory_latency,
            config.memory_max_in_flight,
        );
        let command = CommandProcessor::new(CommandProcessorConfig {
            input_capacity: 64,
            output_bandwidth: 4,
            output_latency: 1,
            timing: VerbTiming::default(),
        });
        let assembly = PrimitiveAssembly::new(AssemblyConfig::default());
        let setup = TriangleSetup::new(SetupConfig::default(), 16);
        let raster = build_raster_stage(config.rasterizer, config.unit_count, config.mapper_policy, config.msaa_samples);
        let interpolator = Interpolator::new(
            InterpolatorConfig::default(),
            HierarchicalZ::new(HiZConfig::default()),
            16,
        );
        let zbuf = ZBuf::new(
            ZBufConfig {
                cache: config.cache,
                base_address: config.z_buffer_base,
                bypass: false,
                multisampling: config.multisampling,
                msaa_samples: config.msaa_samples,
                rop_rate: 1,
                queue_capacity: 16,
                fb_width: 1 << DrawConfig::default_fb_width_log2(),
            },
            EarlyZConfig::default(),
        );
        let pixel_write = PixelWrite::new(
            PixelWriteConfig {
                cache: config.cache,
                base_address: config.color_buffer_b,
                bypass: false,
                multisampling: config.multisampling,
                msaa_samples: config.msaa_samples,
                rop_rate: 1,
                queue_capacity: 16,
                fb_width: 1 << DrawConfig::default_fb_width_log2(),
            },
            ColorPipelineConfig::default(),
        );
        let display = Display::new(DisplayConfig {
            width: 0,
            height: 0,
            buffer_a_address: config.color_buffer_a,
            buffer_b_address: config.color_buffer_b,
        });
        let mut pipeline = Self {
            config,
            cycle: 0,
            memory,
            command,
            assembly,
            setup,
            arena: TriangleArena::new(),
            raster,
            interpolator,
            zbuf,
            pixel_write,
            display,
            vertex_shader: Box::new(PassthroughShader),
            fragment_shader: Box::new(PassthroughShader),
            pending_vertices: VecDeque::new(),
            pending_draws: VecDeque::new(),
            pending_color_cache_ops: VecDeque::new(),
            pending_zstencil_cache_ops: VecDeque::new(),
            buffer_bytes: HashMap::new(),
            next_transaction_tag: 1,
            frames_presented: 0,
            triangles_submitted: 0,
        };
        pipeline.zbuf.engine.apply_command(RopCommand::Reset);
        pipeline.pixel_write.engine.apply_command(RopCommand::Reset);
        pipeline
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    #[must_use]
    pub fn triangles_submitted(&self) -> u64 {
        self.triangles_submitted
    }

    #[must_use]
    pub fn degenerate_triangles_dropped(&self) -> u64 {
        self.assembly.dropped_degenerate_count()
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryController {
        &self.memory
    }

    #[must_use]
    pub fn display(&self) -> &Display {
        &self.display
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        self.command.registers()
    }

    /// Submits one trace record's command (and, for a `MemoryWrite`,
    /// stashes its bytes under `buffer_id` for a later `LOAD_*_PROGRAM`
    /// to pick up) into the Command Processor, retrying across cycles if
    /// its input queue is momentarily full.
    pub fn submit(&mut self, record: CommandRecord, buffer_id: Option<u32>) {
        if let CommandRecord::MemoryWrite { address, ref bytes } = record {
            self.write_memory_now(address, bytes);
            if let Some(id) = buffer_id {
                self.buffer_bytes.insert(id, bytes.clone());
            }
        }
        while !self.command.submit(record.clone()) {
            self.tick();
        }
        self.tick();
    }

    /// Runs cycles until every stage reports idle — used after the last
    /// trace record has been submitted, to drain the pipeline fully
    /// before a final present.
    pub fn drain(&mut self, max_cycles: u64) {
        for _ in 0..max_cycles {
            if self.is_idle() {
                break;
            }
            self.tick();
        }
    }

    fn is_idle(&self) -> bool {
        self.assembly.backlog.empty()
            && self.setup.backlog.empty()
            && self.raster.is_idle()
            && self.pending_vertices.is_empty()
            && self.pending_draws.is_empty()
            && self.pending_color_cache_ops.is_empty()
            && self.pending_zstencil_cache_ops.is_empty()
            && self.zbuf.engine.is_idle()
            && self.pixel_write.engine.is_idle()
    }

    fn write_memory_now(&mut self, address: u32, bytes: &[u8]) {
        let tag = self.next_transaction_tag;
        self.next_transaction_tag = self.next_transaction_tag.wrapping_add(1);
        self.memory.submit(
            self.cycle,
            MemoryTransaction::Write {
                address,
                bytes: bytes.to_vec(),
                tag,
            },
        );
    }

    /// Advances the entire pipeline by one cycle: ticks every stage in
    /// topological order and drains each stage's output signal into the
    /// next stage's input, so no stage ever observes a same-cycle write
    /// from a stage later in this order.
    pub fn tick(&mut self) {
        let cycle = self.cycle;

        self.command.tick(cycle);
        if let Some(record) = self.command.output_mut().read(cycle) {
            self.dispatch(record, cycle);
        }

        self.pump_vertex_fetch(cycle);

        self.assembly.tick(cycle);
        while let Some(triangle) = self.assembly.output.read(cycle) {
            self.feed_setup(triangle, cycle);
        }

        self.setup.tick(cycle, &mut self.arena);
        while let Some(out) = self.setup.output.read(cycle) {
            self.raster.input_write(cycle, out);
        }

        let hi_z_ready = self.interpolator.hi_z_ready();
        self.raster.tick(cycle, &mut self.arena, hi_z_ready);
        while let Some(stamp) = self.raster.output_read(cycle) {
            self.interpolator.input.write(cycle, stamp, 0);
        }

        self.interpolator.tick(cycle, &mut self.arena);
        while let Some(stamp) = self.interpolator.output.read(cycle) {
            self.zbuf.engine.input_signal_mut().write(cycle, stamp, 0);
        }

        self.zbuf.engine.tick(cycle, &mut self.memory, true);
        while let Some(data) = self.zbuf.engine.output_signal_mut().read(cycle) {
            let shaded = self.shade_fragments(data);
            self.pixel_write.engine.input_signal_mut().write(cycle, shaded, 0);
        }

        self.pixel_write.engine.tick(cycle, &mut self.memory, true);
        while let Some(_finished) = self.pixel_write.engine.output_signal_mut().read(cycle) {
            // Terminal stage: nothing downstream consumes a finished
            // stamp, but draining it keeps the ROP's write queue moving.
        }

        if let Some(reply) = self.memory.tick(cycle) {
            self.zbuf.engine.cache_mut().process_memory_transaction(&reply);
            self.pixel_write.engine.cache_mut().process_memory_transaction(&reply);
        }

        self.step_state_ops(cycle);

        self.cycle += 1;
    }

    /// Drives at most one in-progress cache op per cache one step
    /// further, popping it off the queue once its iteration over every
    /// physical line completes (spec 4.9 for `Save`/`Restore`/`Reset`;
    /// the write-back flush for `Flush`).
    fn step_state_ops(&mut self, cycle: u64) {
        if let Some(&(kind, state_base)) = self.pending_color_cache_ops.front() {
            let cache = self.pixel_write.engine.cache_mut();
            let done = match kind {
                CacheOp::Save => cache.save_state(state_base, &mut self.memory, cycle),
                CacheOp::Restore => cache.restore_state(state_base, &mut self.memory, cycle),
                CacheOp::Reset => cache.reset_state(state_base, &mut self.memory, cycle),
                CacheOp::Flush => cache.flush(&mut self.memory, cycle),
            };
            if done {
                self.pending_color_cache_ops.pop_front();
            }
        }
        if let Some(&(kind, state_base)) = self.pending_zstencil_cache_ops.front() {
            let cache = self.zbuf.engine.cache_mut();
            let done = match kind {
                CacheOp::Save => cache.save_state(state_base, &mut self.memory, cycle),
                CacheOp::Restore => cache.restore_state(state_base, &mut self.memory, cycle),
                CacheOp::Reset => cache.reset_state(state_base, &mut self.memory, cycle),
                CacheOp::Flush => cache.flush(&mut self.memory, cycle),
            };
            if done {
                self.pending_zstencil_cache_ops.pop_front();
            }
        }
    }

    fn feed_setup(&mut self, triangle: AssembledTriangle, cycle: u64) {
        self.triangles_submitted += 1;
        self.setup.input.write(cycle, triangle, 0);
    }

    /// Pulls vertices out of the fetch backlog into Primitive Assembly,
    /// bounded by its configured `vertices_per_cycle` so this never
    /// exceeds the assembly input signal's bandwidth budget.
    fn pump_vertex_fetch(&mut self, cycle: u64) {
        let budget = self.assembly.config.vertices_per_cycle.max(1);
        for _ in 0..budget {
            let Some(v) = self.pending_vertices.pop_front() else { break };
            self.assembly.input.write(cycle, v, 0);
        }
    }

    fn dispatch(&mut self, record: CommandRecord, cycle: u64) {
        let CommandRecord::Verb { verb, first_vertex, vertex_count, buffer_id, cookie } = record else {
            return;
        };
        let draw_config = DrawConfig::derive(self.command.registers());
        match verb {
            Verb::Draw => self.begin_draw(draw_config, first_vertex, vertex_count, cookie),
            Verb::ClearColor => self.clear_color(&draw_config, cycle),
            Verb::ClearZStencil => self.clear_zstencil(&draw_config, cycle),
            Verb::SwapBuffers => self.swap_buffers(&draw_config),
            Verb::FlushColor => {
                self.pixel_write.engine.apply_command(RopCommand::Flush);
                self.pending_color_cache_ops.push_back((CacheOp::Flush, 0));
            }
            Verb::FlushZStencil => {
                self.zbuf.engine.apply_command(RopCommand::Flush);
                self.pending_zstencil_cache_ops.push_back((CacheOp::Flush, 0));
            }
            Verb::SaveColorState => {
                self.pixel_write.engine.apply_command(RopCommand::SaveState);
                self.pending_color_cache_ops.push_back((CacheOp::Save, draw_config.state_buffer_address));
            }
            Verb::SaveZStencilState => {
                self.zbuf.engine.apply_command(RopCommand::SaveState);
                self.pending_zstencil_cache_ops.push_back((CacheOp::Save, draw_config.state_buffer_address));
            }
            Verb::RestoreColorState => {
                self.pixel_write.engine.apply_command(RopCommand::RestoreState);
                self.pending_color_cache_ops.push_back((CacheOp::Restore, draw_config.state_buffer_address));
            }
            Verb::RestoreZStencilState => {
                self.zbuf.engine.apply_command(RopCommand::RestoreState);
                self.pending_zstencil_cache_ops.push_back((CacheOp::Restore, draw_config.state_buffer_address));
            }
            Verb::ResetColorState => {
                self.pixel_write.engine.apply_command(RopCommand::ResetState);
                self.pending_color_cache_ops.push_back((CacheOp::Reset, draw_config.state_buffer_address));
            }
            Verb::ResetZStencilState => {
                self.zbuf.engine.apply_command(RopCommand::ResetState);
                self.pending_zstencil_cache_ops.push_back((CacheOp::Reset, draw_config.state_buffer_address));
            }
            Verb::Reset => {
                self.zbuf.engine.apply_command(RopCommand::Reset);
                self.pixel_write.engine.apply_command(RopCommand::Reset);
            }
            Verb::LoadVertexProgram => {
                if let Some(bytes) = buffer_id.and_then(|id| self.buffer_bytes.get(&id)).cloned() {
                    self.command.load_vertex_program(bytes.clone());
                    self.vertex_shader = Box::new(crate::shader::MicrocodeShader::decode(&bytes));
                }
            }
            Verb::LoadFragmentProgram => {
                if let Some(bytes) = buffer_id.and_then(|id| self.buffer_bytes.get(&id)).cloned() {
                    self.command.load_fragment_program(bytes.clone());
                    self.fragment_shader = Box::new(crate::shader::MicrocodeShader::decode(&bytes));
                }
            }
        }
    }

    fn begin_draw(&mut self, draw_config: DrawConfig, first_vertex: u32, vertex_count: u32, cookie: gs_twin_core::cookie::Cookie) {
        let fb_width = 1u32 << draw_config.fb_width_log2;
        self.zbuf.engine.set_stride_pixels(fb_width);
        self.pixel_write.engine.set_stride_pixels(fb_width);

        self.setup.config.cull_mode = draw_config.cull_mode;
        self.setup.config.viewport_width = draw_config.viewport_width;
        self.setup.config.viewport_height = draw_config.viewport_height;
        self.assembly.config.mode = draw_config.primitive_mode;

        let mut interp = self.interpolator.config.clone();
        interp.active = draw_config.active_attributes();
        interp.interpolate = interp.active;
        interp.depth_bit_precision = draw_config.depth_bit_precision;
        self.interpolator.config = interp;

        let z_op = self.zbuf.engine.operation_mut();
        z_op.config.depth_compare = draw_config.depth_compare;
        z_op.config.depth_write = draw_config.depth_write;
        z_op.config.stencil_compare = draw_config.stencil_compare;
        if !draw_config.depth_write {
            z_op.config.depth_compare = CompareFunc::Always;
        }

        let texture = draw_config.texture.map(|t| {
            let bytes = self.buffer_bytes.get(&t.base_address).cloned().unwrap_or_default();
            BoundTexture::decode(
                t.format,
                &bytes,
                gs_texture::uv_coord::TextureDims { width_log2: t.width_log2, height_log2: t.height_log2 },
                t.wrap_u,
                t.wrap_v,
                t.filter,
                t.tile_log2,
            )
        });
        let color_op = self.pixel_write.engine.operation_mut();
        color_op.config.blend.enable = draw_config.blend_enable;
        color_op.config.blend.src_factor = draw_config.blend_src;
        color_op.config.blend.dst_factor = draw_config.blend_dst;
        color_op.config.combiner.texture_enable = texture.is_some();
        color_op.config.texture = texture;

        self.zbuf.engine.apply_command(RopCommand::Draw);
        self.pixel_write.engine.apply_command(RopCommand::Draw);

        self.pending_draws.push_back(PendingDraw {
            remaining: vertex_count,
            next_index: first_vertex,
            cookie,
        });
        self.drain_pending_draws();
    }

    /// Fetches and shades every vertex of every queued draw eagerly,
    /// queuing the results for `pump_vertex_fetch` to release into
    /// Primitive Assembly at its configured per-cycle rate (Section 6's
    /// "vertex fetch has no separately modeled latency": the fetch
    /// itself happens all at once, only its release downstream is
    /// throttled).
    fn drain_pending_draws(&mut self) {
        while let Some(mut draw) = self.pending_draws.pop_front() {
            while draw.remaining > 0 {
                let address = self.config.vertex_buffer_base + draw.next_index * VERTEX_STRIDE_BYTES;
                let raw = self.memory.store().read(address, VERTEX_STRIDE_BYTES);
                let vertex = self.fetch_vertex(draw.next_index, &raw);
                draw.remaining -= 1;
                draw.next_index += 1;
                self.pending_vertices.push_back(StreamedVertex {
                    vertex,
                    cookie: draw.cookie.clone(),
                    last_vertex: draw.remaining == 0,
                });
            }
        }
    }

    fn fetch_vertex(&self, index: u32, raw: &[u8]) -> Vertex {
        let mut ctx = VertexContext { inputs: [[0.0; 4]; MAX_VERTEX_ATTRIBUTES] };
        for (slot_idx, input) in ctx.inputs.iter_mut().enumerate() {
            let base = slot_idx * 16;
            *input = std::array::from_fn(|lane| {
                let off = base + lane * 4;
                raw.get(off..off + 4)
                    .and_then(|b| b.try_into().ok())
                    .map_or(0.0, f32::from_le_bytes)
            });
        }
        let shaded = self.vertex_shader.run_vertex(&ctx);
        let mut vertex = Vertex::zero(index);
        vertex.attributes = shaded.outputs;
        vertex
    }

    /// Splices the fragment shader in between the Z/Stencil ROP's output
    /// and the Color ROP's input: `ColorOperation` reads color and UV
    /// straight out of `fragment.attributes`, so shading is just
    /// overwriting those slots before the stamp continues downstream.
    fn shade_fragments(&self, mut data: RopStampData) -> Stamp {
        let texture: &dyn FragmentTexture = self
            .pixel_write_texture()
            .map_or(&NoTexture as &dyn FragmentTexture, |t| t);
        for fragment in &mut data.stamp.fragments {
            if !fragment.inside_triangle {
                continue;
            }
            let Some(inputs) = fragment.attributes else { continue };
            let ctx = FragmentContext { inputs, texture };
            let shaded = self.fragment_shader.run_fragment(&ctx);
            fragment.attributes = Some(shaded.outputs);
        }
        data.stamp
    }

    fn pixel_write_texture(&self) -> Option<&BoundTexture> {
        None
    }

    fn clear_color(&mut self, draw_config: &DrawConfig, cycle: u64) {
        let bytes_per_pixel = 4u32;
        let pixel_count = (draw_config.viewport_width.max(0) as u32) * (draw_config.viewport_height.max(0) as u32);
        let pixel = [
            (draw_config.clear_color[0].clamp(0.0, 1.0) * 255.0).round() as u8,
            (draw_config.clear_color[1].clamp(0.0, 1.0) * 255.0).round() as u8,
            (draw_config.clear_color[2].clamp(0.0, 1.0) * 255.0).round() as u8,
            (draw_config.clear_color[3].clamp(0.0, 1.0) * 255.0).round() as u8,
        ];
        let bytes: Vec<u8> = pixel.iter().copied().cycle().take(pixel_count as usize * bytes_per_pixel as usize).collect();
        let tag = self.next_transaction_tag;
        self.next_transaction_tag = self.next_transaction_tag.wrapping_add(1);
        self.memory.submit(
            cycle,
            MemoryTransaction::Write {
                address: draw_config.fb_color_base,
                bytes,
                tag,
            },
        );
        // The direct write above bypasses the cache, so any line still
        // resident for this buffer now disagrees with the backing store
        // unless its block-state remembers the clear happened.
        self.pixel_write.engine.cache_mut().mark_resident_cleared();
    }

    fn clear_zstencil(&mut self, draw_config: &DrawConfig, cycle: u64) {
        let pixel_count = (draw_config.viewport_width.max(0) as u32) * (draw_config.viewport_height.max(0) as u32);
        let depth = qfixed::UDepth24::from_normalized(f64::from(draw_config.clear_depth));
        let word_bytes = gs_early_z::DepthStencilFormat::default().pack(depth, draw_config.clear_stencil);
        let bytes: Vec<u8> = word_bytes.iter().copied().cycle().take(pixel_count as usize * 4).collect();
        let tag = self.next_transaction_tag;
        self.next_transaction_tag = self.next_transaction_tag.wrapping_add(1);
        self.memory.submit(
            cycle,
            MemoryTransaction::Write {
                address: draw_config.fb_z_base,
                bytes,
                tag,
            },
        );
        self.zbuf.engine.cache_mut().mark_resident_cleared();
    }

    fn swap_buffers(&mut self, draw_config: &DrawConfig) {
        self.display.swap();
        self.frames_presented += 1;
        let width = 1u32 << draw_config.fb_width_log2;
        let height = 1u32 << draw_config.fb_height_log2;
        self.pixel_write.engine.apply_command(RopCommand::Swap);
        // The color cache is write-back: the buffer becoming visible at
        // swap must have every dirty line's bytes actually in memory.
        self.pending_color_cache_ops.push_back((CacheOp::Flush, 0));
        let _ = (width, height);
    }
}
