//! Dynamic value model shared by members and the graph serializer.
//!
//! Every member read produces a [`Value`] and every member write consumes
//! one. Objects are carried as owned [`Reflect`] trait objects, so moving a
//! `Value::Object` into a parent field is a move, never an alias.

use std::fmt;

use crate::decimal::Decimal;
use crate::reflect::Reflect;

/// Scalar token kinds of the wire grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Char,
    String,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Char => "Char",
            Self::String => "String",
            Self::I8 => "Int8",
            Self::I16 => "Int16",
            Self::I32 => "Int32",
            Self::I64 => "Int64",
            Self::U8 => "UInt8",
            Self::U16 => "UInt16",
            Self::U32 => "UInt32",
            Self::U64 => "UInt64",
            Self::F32 => "Single",
            Self::F64 => "Double",
            Self::Decimal => "Decimal",
        }
    }
}

/// A value in flight between an instance and a token stream.
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    String(String),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Object(Box<dyn Reflect>),
    Array(Vec<Value>),
}

impl Value {
    /// The scalar kind of this value, or `None` for null, objects and arrays.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        Some(match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::Char(_) => ScalarKind::Char,
            Self::String(_) => ScalarKind::String,
            Self::I8(_) => ScalarKind::I8,
            Self::I16(_) => ScalarKind::I16,
            Self::I32(_) => ScalarKind::I32,
            Self::I64(_) => ScalarKind::I64,
            Self::U8(_) => ScalarKind::U8,
            Self::U16(_) => ScalarKind::U16,
            Self::U32(_) => ScalarKind::U32,
            Self::U64(_) => ScalarKind::U64,
            Self::F32(_) => ScalarKind::F32,
            Self::F64(_) => ScalarKind::F64,
            Self::Decimal(_) => ScalarKind::Decimal,
            Self::Null | Self::Object(_) | Self::Array(_) => return None,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short description used in mismatch errors.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Null => "Null".into(),
            Self::Object(obj) => format!("Object({})", obj.descriptor().name()),
            Self::Array(items) => format!("Array(len {})", items.len()),
            scalar => scalar
                .scalar_kind()
                .map(ScalarKind::name)
                .unwrap_or("?")
                .into(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Bool(v) => Self::Bool(*v),
            Self::Char(v) => Self::Char(*v),
            Self::String(v) => Self::String(v.clone()),
            Self::I8(v) => Self::I8(*v),
            Self::I16(v) => Self::I16(*v),
            Self::I32(v) => Self::I32(*v),
            Self::I64(v) => Self::I64(*v),
            Self::U8(v) => Self::U8(*v),
            Self::U16(v) => Self::U16(*v),
            Self::U32(v) => Self::U32(*v),
            Self::U64(v) => Self::U64(*v),
            Self::F32(v) => Self::F32(*v),
            Self::F64(v) => Self::F64(*v),
            Self::Decimal(v) => Self::Decimal(*v),
            Self::Object(obj) => Self::Object(obj.clone_reflect()),
            Self::Array(items) => Self::Array(items.clone()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Char(v) => write!(f, "Char({v:?})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::I8(v) => write!(f, "I8({v})"),
            Self::I16(v) => write!(f, "I16({v})"),
            Self::I32(v) => write!(f, "I32({v})"),
            Self::I64(v) => write!(f, "I64({v})"),
            Self::U8(v) => write!(f, "U8({v})"),
            Self::U16(v) => write!(f, "U16({v})"),
            Self::U32(v) => write!(f, "U32({v})"),
            Self::U64(v) => write!(f, "U64({v})"),
            Self::F32(v) => write!(f, "F32({v})"),
            Self::F64(v) => write!(f, "F64({v})"),
            Self::Decimal(v) => write!(f, "Decimal({v})"),
            Self::Object(obj) => write!(f, "Object({})", obj.descriptor().name()),
            Self::Array(items) => f.debug_tuple("Array").field(items).finish(),
        }
    }
}
