//! The command-stream vocabulary the Command Processor (Section 4.2)
//! distributes: register writes, memory writes, and verbs.

use gpu_registers::{RegId, RegValue};

use crate::cookie::Cookie;

/// One opcode-only command. Verbs with payloads (`DRAW`'s vertex-count
/// range) carry their payload as fields on [`CommandRecord::Verb`]
/// instead of on the verb itself, mirroring the trace format's
/// self-delimited record layout (Section 6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Draw,
    ClearColor,
    ClearZStencil,
    SwapBuffers,
    FlushColor,
    FlushZStencil,
    SaveColorState,
    SaveZStencilState,
    RestoreColorState,
    RestoreZStencilState,
    ResetColorState,
    ResetZStencilState,
    LoadVertexProgram,
    LoadFragmentProgram,
    Reset,
}

/// One record of the command stream the Command Processor consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandRecord {
    RegisterWrite {
        id: RegId,
        value: RegValue,
    },
    MemoryWrite {
        address: u32,
        bytes: Vec<u8>,
    },
    Verb {
        verb: Verb,
        /// `DRAW`'s vertex range; unused by other verbs.
        first_vertex: u32,
        vertex_count: u32,
        /// Buffer id used for cross-frame dedup, and the cookie chain
        /// inherited by everything the record produces downstream.
        buffer_id: Option<u32>,
        cookie: Cookie,
    },
}

impl CommandRecord {
    #[must_use]
    pub fn verb(verb: Verb, cookie: Cookie) -> Self {
        CommandRecord::Verb {
            verb,
            first_vertex: 0,
            vertex_count: 0,
            buffer_id: None,
            cookie,
        }
    }

    #[must_use]
    pub fn draw(first_vertex: u32, vertex_count: u32, cookie: Cookie) -> Self {
        CommandRecord::Verb {
            verb: Verb::Draw,
            first_vertex,
            vertex_count,
            buffer_id: None,
            cookie,
        }
    }
}
