//! `RegValue`: the tagged union every register write carries (REDESIGN
//! FLAGS: "Tagged-union register values" — `enum RegValue = Bool | Uint |
//! Int | Float | Vec4F | ...`, pattern-matched by whichever stage owns
//! the register).

use crate::{BlendFactor, CompareFunc, CullMode, PrimitiveMode, TexFilter, TextureFormat, WrapMode};

/// A typed register value. Every register write record in the command
/// stream carries exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegValue {
    Bool(bool),
    Uint(u32),
    Int(i32),
    Float(f32),
    Vec4F([f32; 4]),
    PrimitiveMode(PrimitiveMode),
    CompareFunc(CompareFunc),
    CullMode(CullMode),
    BlendFactor(BlendFactor),
    TextureFormat(TextureFormat),
    TexFilter(TexFilter),
    WrapMode(WrapMode),
}

impl RegValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RegValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            RegValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            RegValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            RegValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vec4(&self) -> Option<[f32; 4]> {
        match self {
            RegValue::Vec4F(v) => Some(*v),
            _ => None,
        }
    }
}
