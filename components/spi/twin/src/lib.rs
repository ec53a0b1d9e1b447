//! Command Processor & Register File front end (Section 4.2): the single
//! entry point the trace reader feeds, distributing register writes into
//! the shared [`RegisterFile`] and dispatching verbs (`DRAW`,
//! `CLEAR_COLOR`, `CLEAR_ZSTENCIL`, `SWAP_BUFFERS`, `FLUSH_COLOR`,
//! `FLUSH_ZSTENCIL`, `SAVE_*_STATE`, `RESTORE_*_STATE`, `RESET_*_STATE`,
//! `LOAD_VERTEX_PROGRAM`, `LOAD_FRAGMENT_PROGRAM`, `RESET`) into the state
//! machine every downstream stage reads.
//!
//! This crate generalizes the workspace's original fixed-function SPI
//! register-block component: instead of decoding raw SPI words into a
//! hardware bitfield struct, it decodes [`CommandRecord`]s into
//! [`RegValue`] writes and verb dispatch, but keeps the same one-record-
//! at-a-time, `READY`-gated processing shape.

#![forbid(unsafe_code)]

use gpu_registers::{RegisterFile, StageState};
use gs_twin_core::command::{CommandRecord, Verb};
use gs_twin_core::queue::Queue;
use gs_twin_core::signal::Signal;
use gs_twin_core::stage::Stage;

/// How many cycles a dispatched verb holds the command processor in a
/// non-`READY` state before returning to `READY`, modeling the verb's
/// real latency (a `DRAW` walks a vertex range, `FLUSH` drains a cache) at
/// a coarse, configurable granularity rather than deriving it from
/// downstream stage occupancy.
#[derive(Clone, Copy, Debug)]
pub struct VerbTiming {
    pub draw_cycles: u64,
    pub clear_cycles: u64,
    pub swap_cycles: u64,
    pub flush_cycles: u64,
    pub state_cycles: u64,
}

impl Default for VerbTiming {
    fn default() -> Self {
        Self {
            draw_cycles: 1,
            clear_cycles: 1,
            swap_cycles: 1,
            flush_cycles: 4,
            state_cycles: 1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CommandProcessorConfig {
    pub input_capacity: usize,
    pub output_bandwidth: u32,
    pub output_latency: u64,
    pub timing: VerbTiming,
}

/// Loaded shader program bytes, held opaque until a dispatch call reads
/// them (Section 4.11: "the core consumes already-encoded binary shader
/// bytes").
#[derive(Clone, Debug, Default)]
pub struct ShaderPrograms {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

struct Busy {
    until: u64,
    resume: StageState,
}

/// The command processor: owns the GPU's global register file, the
/// saved-state snapshots `SAVE_COLOR_STATE`/`SAVE_ZSTENCIL_STATE`
/// restore from, and the loaded shader program bytes.
pub struct CommandProcessor {
    config: CommandProcessorConfig,
    input: Queue<CommandRecord>,
    output: Signal<CommandRecord>,
    registers: RegisterFile,
    saved_color_state: Option<RegisterFile>,
    saved_zstencil_state: Option<RegisterFile>,
    programs: ShaderPrograms,
    busy: Option<Busy>,
}

impl CommandProcessor {
    #[must_use]
    pub fn new(config: CommandProcessorConfig) -> Self {
        let mut registers = RegisterFile::new();
        registers.set_state(StageState::Ready);
        Self {
            output: Signal::new("command_processor.out", config.output_bandwidth, config.output_latency),
            input: Queue::new(config.input_capacity),
            registers,
            saved_color_state: None,
            saved_zstencil_state: None,
            programs: ShaderPrograms::default(),
            busy: None,
            config,
        }
    }

    /// Enqueues one command record from the trace reader. Returns `false`
    /// if the input queue is full and the caller should retry next cycle.
    #[must_use]
    pub fn submit(&mut self, record: CommandRecord) -> bool {
        self.input.add(record)
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    #[must_use]
    pub fn programs(&self) -> &ShaderPrograms {
        &self.programs
    }

    #[must_use]
    pub fn output_mut(&mut self) -> &mut Signal<CommandRecord> {
        &mut self.output
    }

    #[must_use]
    pub fn input_queue_full(&self) -> bool {
        self.input.full()
    }

    fn busy_state(verb: Verb) -> StageState {
        match verb {
            Verb::Draw => StageState::Drawing,
            Verb::ClearColor | Verb::ClearZStencil => StageState::Clear,
            Verb::SwapBuffers => StageState::Swap,
            Verb::FlushColor | Verb::FlushZStencil => StageState::Flush,
            Verb::SaveColorState | Verb::SaveZStencilState => StageState::SaveState,
            Verb::RestoreColorState | Verb::RestoreZStencilState => StageState::RestoreState,
            Verb::ResetColorState | Verb::ResetZStencilState | Verb::Reset => StageState::ResetState,
            Verb::LoadVertexProgram | Verb::LoadFragmentProgram => StageState::End,
        }
    }

    fn busy_cycles(&self, verb: Verb) -> u64 {
        let t = self.config.timing;
        match verb {
            Verb::Draw => t.draw_cycles,
            Verb::ClearColor | Verb::ClearZStencil => t.clear_cycles,
            Verb::SwapBuffers => t.swap_cycles,
            Verb::FlushColor | Verb::FlushZStencil => t.flush_cycles,
            _ => t.state_cycles,
        }
    }

    fn dispatch_verb(&mut self, verb: Verb, cycle: u64) {
        match verb {
            Verb::SaveColorState => self.saved_color_state = Some(self.registers.clone()),
            Verb::SaveZStencilState => self.saved_zstencil_state = Some(self.registers.clone()),
            Verb::RestoreColorState => {
                if let Some(saved) = self.saved_color_state.clone() {
                    self.registers = saved;
                } else {
                    log::warn!("RESTORE_COLOR_STATE with no prior SAVE_COLOR_STATE");
                }
            }
            Verb::RestoreZStencilState => {
                if let Some(saved) = self.saved_zstencil_state.clone() {
                    self.registers = saved;
                } else {
                    log::warn!("RESTORE_ZSTENCIL_STATE with no prior SAVE_ZSTENCIL_STATE");
                }
            }
            Verb::ResetColorState | Verb::ResetZStencilState | Verb::Reset => {
                let saved_programs = self.programs.clone();
                self.registers = RegisterFile::new();
                self.registers.set_state(Self::busy_state(verb));
                if !matches!(verb, Verb::Reset) {
                    self.programs = saved_programs;
                }
            }
            _ => {}
        }
        self.busy = Some(Busy {
            until: cycle + self.busy_cycles(verb),
            resume: StageState::Ready,
        });
        self.registers.set_state(Self::busy_state(verb));
    }
}

impl Stage for CommandProcessor {
    fn name(&self) -> &'static str {
        "command_processor"
    }

    fn tick(&mut self, cycle: u64) {
        if let Some(busy) = &self.busy {
            if cycle < busy.until {
                return;
            }
            self.registers.set_state(self.busy.take().expect("checked above").resume);
        }

        let Some(record) = self.input.remove() else {
            return;
        };

        match &record {
            CommandRecord::RegisterWrite { id, value } => {
                if self.registers.apply(*id, *value).is_err() {
                    log::error!("dropped register write to {id:?}, processor not READY");
                }
            }
            CommandRecord::MemoryWrite { .. } => {}
            CommandRecord::Verb { verb, first_vertex: _, vertex_count: _, buffer_id: _, cookie: _ } => {
                self.dispatch_verb(*verb, cycle);
            }
        }

        self.output.write(cycle, record, 0);
    }
}

/// Records a just-loaded shader program, bypassing the register/verb
/// dispatch path the way `LOAD_VERTEX_PROGRAM`/`LOAD_FRAGMENT_PROGRAM`'s
/// payload (carried out of band from the fixed 32-bit register words)
/// does in the trace format (Section 6).
impl CommandProcessor {
    pub fn load_vertex_program(&mut self, bytes: Vec<u8>) {
        self.programs.vertex = bytes;
    }

    pub fn load_fragment_program(&mut self, bytes: Vec<u8>) {
        self.programs.fragment = bytes;
    }
}
