//! Trace file reader (Section 6): the binary meta-stream a captured
//! hardware or reference-model run is replayed from. A trace is a fixed
//! 16,384-byte header followed by a flat sequence of self-delimited
//! records, each a register write, a memory write, or a verb dispatch.

use std::io::Read;
use std::path::Path;

use gpu_registers::{RegId, RegValue, Register};
use gs_twin_core::command::{CommandRecord, Verb};
use gs_twin_core::cookie::Cookie;

/// Byte length of the trace header, fixed regardless of how much of it
/// a given capture actually populates.
pub const HEADER_LEN: usize = 16_384;

/// The 20-byte signature every valid trace begins with, null-padded to
/// the full field width.
const SIGNATURE: &[u8; 20] = b"computGeneral.com\0\0";

/// The only trace format version this reader understands.
const SUPPORTED_VERSION: u32 = 0x0100;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("could not read trace file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("trace file shorter than the {HEADER_LEN}-byte header")]
    Truncated,
    #[error("trace signature mismatch: expected \"computGeneral.com\"")]
    BadSignature,
    #[error("unsupported trace version 0x{0:04X}, expected 0x{SUPPORTED_VERSION:04X}")]
    UnsupportedVersion(u32),
    #[error("record truncated at byte offset {0}")]
    TruncatedRecord(usize),
    #[error("unknown record opcode {0}")]
    UnknownRecord(u8),
}

/// The trace header's parameter struct, decoded from the bytes
/// immediately following the signature and version fields.
#[derive(Clone, Copy, Debug)]
pub struct TraceHeader {
    pub start_frame: u32,
    pub frame_count: u32,
    pub memory_size: u32,
    pub mapped_memory_size: u32,
    pub texture_block_width: u32,
    pub texture_block_height: u32,
    pub scan_tile_width: u32,
    pub scan_tile_height: u32,
    pub over_scan_tile_width: u32,
    pub over_scan_tile_height: u32,
    pub double_buffer: bool,
    pub fetch_rate: u32,
    pub memory_controller_v2: bool,
    pub second_interleaving: bool,
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

impl TraceHeader {
    fn parse(bytes: &[u8]) -> Result<Self, TraceError> {
        if &bytes[..20] != SIGNATURE {
            return Err(TraceError::BadSignature);
        }
        let version = read_u32(bytes, 20);
        if version != SUPPORTED_VERSION {
            return Err(TraceError::UnsupportedVersion(version));
        }
        let mut off = 24;
        let mut next_u32 = || {
            let v = read_u32(bytes, off);
            off += 4;
            v
        };
        Ok(Self {
            start_frame: next_u32(),
            frame_count: next_u32(),
            memory_size: next_u32(),
            mapped_memory_size: next_u32(),
            texture_block_width: next_u32(),
            texture_block_height: next_u32(),
            scan_tile_width: next_u32(),
            scan_tile_height: next_u32(),
            over_scan_tile_width: next_u32(),
            over_scan_tile_height: next_u32(),
            double_buffer: next_u32() != 0,
            fetch_rate: next_u32(),
            memory_controller_v2: next_u32() != 0,
            second_interleaving: next_u32() != 0,
        })
    }
}

/// One decoded trace record plus the optional buffer-id tag the format
/// carries on every record (used upstream to dedup repeated captures of
/// the same buffer across frames; the reader itself does not dedup).
#[derive(Clone, Debug)]
pub struct TraceRecord {
    pub command: CommandRecord,
    pub buffer_id: Option<u32>,
}

const REC_REGISTER_WRITE: u8 = 0;
const REC_MEMORY_WRITE: u8 = 1;
const REC_VERB: u8 = 2;

fn register_from_u16(code: u16) -> Option<Register> {
    const TABLE: &[Register] = &[
        Register::ViewportWidth,
        Register::ViewportHeight,
        Register::ClearColor,
        Register::ClearDepth,
        Register::ClearStencil,
        Register::ZCompare,
        Register::ZWriteEnable,
        Register::StencilCompare,
        Register::CullMode,
        Register::FaceMode,
        Register::BlendEnable,
        Register::BlendSrcFactor,
        Register::BlendDstFactor,
        Register::PrimitiveMode,
        Register::DepthBitPrecision,
        Register::MultisampleEnable,
        Register::MultisampleCount,
        Register::FbColorBase,
        Register::FbZBase,
        Register::FbWidthLog2,
        Register::FbHeightLog2,
        Register::Tex0BaseAddr,
        Register::Tex0Format,
        Register::Tex0WidthLog2,
        Register::Tex0HeightLog2,
        Register::Tex0Filter,
        Register::Tex0WrapU,
        Register::Tex0WrapV,
        Register::Tex0TileLog2,
        Register::InterpolationMode,
        Register::FragmentInputActive,
        Register::ComprDisabled,
        Register::StateBufferAddress,
    ];
    TABLE.get(code as usize).copied()
}

fn verb_from_u8(code: u8) -> Option<Verb> {
    const TABLE: &[Verb] = &[
        Verb::Draw,
        Verb::ClearColor,
        Verb::ClearZStencil,
        Verb::SwapBuffers,
        Verb::FlushColor,
        Verb::FlushZStencil,
        Verb::SaveColorState,
        Verb::SaveZStencilState,
        Verb::RestoreColorState,
        Verb::RestoreZStencilState,
        Verb::ResetColorState,
        Verb::ResetZStencilState,
        Verb::LoadVertexProgram,
        Verb::LoadFragmentProgram,
        Verb::Reset,
    ];
    TABLE.get(code as usize).copied()
}

/// Reads and decodes an entire trace file: the header plus every
/// following record, in order.
///
/// # Errors
/// Returns a [`TraceError`] if the file is unreadable, too short, has a
/// bad signature/version, or contains a malformed record.
pub fn read_trace(path: &Path) -> Result<(TraceHeader, Vec<TraceRecord>), TraceError> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|source| TraceError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if bytes.len() < HEADER_LEN {
        return Err(TraceError::Truncated);
    }
    let header = TraceHeader::parse(&bytes)?;
    let records = decode_records(&bytes[HEADER_LEN..])?;
    Ok((header, records))
}

fn decode_records(body: &[u8]) -> Result<Vec<TraceRecord>, TraceError> {
    let mut records = Vec::new();
    let mut cursor = 0usize;
    let mut next_triangle_cookie = 0u64;
    while cursor < body.len() {
        let tag = body[cursor];
        let need = |n: usize| -> Result<(), TraceError> {
            if cursor + n > body.len() {
                Err(TraceError::TruncatedRecord(cursor))
            } else {
                Ok(())
            }
        };
        match tag {
            REC_REGISTER_WRITE => {
                need(1 + 2 + 1 + 4 + 4)?;
                let register_code = u16::from_le_bytes([body[cursor + 1], body[cursor + 2]]);
                let sub_index = body[cursor + 3];
                let tag_byte = body[cursor + 4];
                let payload = u32::from_le_bytes(body[cursor + 5..cursor + 9].try_into().unwrap());
                let buffer_id = u32::from_le_bytes(body[cursor + 9..cursor + 13].try_into().unwrap());
                cursor += 13;
                let Some(register) = register_from_u16(register_code) else {
                    return Err(TraceError::UnknownRecord(tag));
                };
                let value = decode_reg_value(tag_byte, payload);
                records.push(TraceRecord {
                    command: CommandRecord::RegisterWrite {
                        id: RegId::indexed(register, sub_index),
                        value,
                    },
                    buffer_id: (buffer_id != u32::MAX).then_some(buffer_id),
                });
            }
            REC_MEMORY_WRITE => {
                need(1 + 4 + 4 + 4)?;
                let address = u32::from_le_bytes(body[cursor + 1..cursor + 5].try_into().unwrap());
                let size = u32::from_le_bytes(body[cursor + 5..cursor + 9].try_into().unwrap()) as usize;
                let buffer_id = u32::from_le_bytes(body[cursor + 9..cursor + 13].try_into().unwrap());
                cursor += 13;
                need(size)?;
                let payload = body[cursor..cursor + size].to_vec();
                cursor += size;
                records.push(TraceRecord {
                    command: CommandRecord::MemoryWrite { address, bytes: payload },
                    buffer_id: (buffer_id != u32::MAX).then_some(buffer_id),
                });
            }
            REC_VERB => {
                need(1 + 1 + 4 + 4 + 4)?;
                let opcode = body[cursor + 1];
                let first_vertex = u32::from_le_bytes(body[cursor + 2..cursor + 6].try_into().unwrap());
                let vertex_count = u32::from_le_bytes(body[cursor + 6..cursor + 10].try_into().unwrap());
                let buffer_id = u32::from_le_bytes(body[cursor + 10..cursor + 14].try_into().unwrap());
                cursor += 14;
                let Some(verb) = verb_from_u8(opcode) else {
                    return Err(TraceError::UnknownRecord(opcode));
                };
                next_triangle_cookie += 1;
                records.push(TraceRecord {
                    command: CommandRecord::Verb {
                        verb,
                        first_vertex,
                        vertex_count,
                        buffer_id: (buffer_id != u32::MAX).then_some(buffer_id),
                        cookie: Cookie::root().child(next_triangle_cookie),
                    },
                    buffer_id: (buffer_id != u32::MAX).then_some(buffer_id),
                });
            }
            other => return Err(TraceError::UnknownRecord(other)),
        }
    }
    Ok(records)
}

fn decode_reg_value(tag: u8, payload: u32) -> RegValue {
    match tag {
        0 => RegValue::Bool(payload != 0),
        1 => RegValue::Uint(payload),
        2 => RegValue::Int(payload as i32),
        3 => RegValue::Float(f32::from_bits(payload)),
        _ => RegValue::Uint(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(frame_count: u32) -> Vec<u8> {
        let mut header = vec![0u8; HEADER_LEN];
        header[..20].copy_from_slice(SIGNATURE);
        header[20..24].copy_from_slice(&SUPPORTED_VERSION.to_le_bytes());
        header[24..28].copy_from_slice(&0u32.to_le_bytes()); // start_frame
        header[28..32].copy_from_slice(&frame_count.to_le_bytes());
        header
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = header_bytes(1);
        bytes[0] = b'X';
        assert!(matches!(TraceHeader::parse(&bytes), Err(TraceError::BadSignature)));
    }

    #[test]
    fn decodes_register_write_record() {
        let mut body = vec![REC_REGISTER_WRITE];
        body.extend_from_slice(&2u16.to_le_bytes()); // ClearColor
        body.push(0); // sub_index
        body.push(1); // tag = Uint
        body.extend_from_slice(&0xFF00_0000u32.to_le_bytes());
        body.extend_from_slice(&u32::MAX.to_le_bytes()); // buffer_id: none
        let records = decode_records(&body).unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0].command,
            CommandRecord::RegisterWrite { value: RegValue::Uint(0xFF00_0000), .. }
        ));
        assert!(records[0].buffer_id.is_none());
    }

    #[test]
    fn decodes_verb_record() {
        let mut body = vec![REC_VERB];
        body.push(0); // Draw
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&3u32.to_le_bytes());
        body.extend_from_slice(&7u32.to_le_bytes());
        let records = decode_records(&body).unwrap();
        assert!(matches!(
            records[0].command,
            CommandRecord::Verb { verb: Verb::Draw, vertex_count: 3, .. }
        ));
        assert_eq!(records[0].buffer_id, Some(7));
    }

    #[test]
    fn truncated_record_reported_with_offset() {
        let body = vec![REC_MEMORY_WRITE, 0, 0];
        assert!(matches!(decode_records(&body), Err(TraceError::TruncatedRecord(0))));
    }
}
