//! Token stream protocol.
//!
//! Every serialized graph is a sequence of tokens following this grammar:
//!
//! ```text
//! value  := Null | scalar | object | array
//! object := ObjectStart(type_id?) (PropertyName value)* ObjectEnd
//! array  := ArrayStart(count) value{count} ArrayEnd
//! ```
//!
//! [`TokenWriter`] and [`TokenReader`] are implemented by the
//! [`binary`] and [`text`] backends. Typed reads are *try-reads*: they
//! return `Ok(None)` without consuming anything when the next token is of a
//! different kind, so callers can try alternatives in turn (Null first, then
//! the declared type).

pub mod binary;
pub mod text;

use std::fmt;

use crate::decimal::Decimal;
use crate::error::SerializeError;

/// Kinds of tokens; the discriminants are the binary wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    Null = 0,
    Bool = 1,
    Char = 2,
    String = 3,
    I8 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    U8 = 8,
    U16 = 9,
    U32 = 10,
    U64 = 11,
    Single = 12,
    Double = 13,
    Decimal = 14,
    PropertyName = 15,
    ObjectStart = 16,
    ObjectEnd = 17,
    ArrayStart = 18,
    ArrayEnd = 19,
}

impl TokenKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Null,
            1 => Self::Bool,
            2 => Self::Char,
            3 => Self::String,
            4 => Self::I8,
            5 => Self::I16,
            6 => Self::I32,
            7 => Self::I64,
            8 => Self::U8,
            9 => Self::U16,
            10 => Self::U32,
            11 => Self::U64,
            12 => Self::Single,
            13 => Self::Double,
            14 => Self::Decimal,
            15 => Self::PropertyName,
            16 => Self::ObjectStart,
            17 => Self::ObjectEnd,
            18 => Self::ArrayStart,
            19 => Self::ArrayEnd,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
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
            Self::Single => "Single",
            Self::Double => "Double",
            Self::Decimal => "Decimal",
            Self::PropertyName => "PropertyName",
            Self::ObjectStart => "ObjectStart",
            Self::ObjectEnd => "ObjectEnd",
            Self::ArrayStart => "ArrayStart",
            Self::ArrayEnd => "ArrayEnd",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deepest container nesting a reader accepts before giving up on a stream.
pub const MAX_NESTING_DEPTH: usize = 512;

/// An owned token, as produced by [`TokenReader::next_token`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Token {
    #[default]
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
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    PropertyName(String),
    ObjectStart(Option<String>),
    ObjectEnd,
    ArrayStart(usize),
    ArrayEnd,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Null => TokenKind::Null,
            Self::Bool(_) => TokenKind::Bool,
            Self::Char(_) => TokenKind::Char,
            Self::String(_) => TokenKind::String,
            Self::I8(_) => TokenKind::I8,
            Self::I16(_) => TokenKind::I16,
            Self::I32(_) => TokenKind::I32,
            Self::I64(_) => TokenKind::I64,
            Self::U8(_) => TokenKind::U8,
            Self::U16(_) => TokenKind::U16,
            Self::U32(_) => TokenKind::U32,
            Self::U64(_) => TokenKind::U64,
            Self::Single(_) => TokenKind::Single,
            Self::Double(_) => TokenKind::Double,
            Self::Decimal(_) => TokenKind::Decimal,
            Self::PropertyName(_) => TokenKind::PropertyName,
            Self::ObjectStart(_) => TokenKind::ObjectStart,
            Self::ObjectEnd => TokenKind::ObjectEnd,
            Self::ArrayStart(_) => TokenKind::ArrayStart,
            Self::ArrayEnd => TokenKind::ArrayEnd,
        }
    }
}

/// Header of an object token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectHeader {
    /// Runtime type name, present when it differs from the declared type.
    pub type_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Sink side of the token protocol.
pub trait TokenWriter {
    fn write_null(&mut self) -> Result<(), SerializeError>;
    fn write_bool(&mut self, value: bool) -> Result<(), SerializeError>;
    fn write_char(&mut self, value: char) -> Result<(), SerializeError>;
    fn write_string(&mut self, value: &str) -> Result<(), SerializeError>;
    fn write_i8(&mut self, value: i8) -> Result<(), SerializeError>;
    fn write_i16(&mut self, value: i16) -> Result<(), SerializeError>;
    fn write_i32(&mut self, value: i32) -> Result<(), SerializeError>;
    fn write_i64(&mut self, value: i64) -> Result<(), SerializeError>;
    fn write_u8(&mut self, value: u8) -> Result<(), SerializeError>;
    fn write_u16(&mut self, value: u16) -> Result<(), SerializeError>;
    fn write_u32(&mut self, value: u32) -> Result<(), SerializeError>;
    fn write_u64(&mut self, value: u64) -> Result<(), SerializeError>;
    fn write_f32(&mut self, value: f32) -> Result<(), SerializeError>;
    fn write_f64(&mut self, value: f64) -> Result<(), SerializeError>;
    fn write_decimal(&mut self, value: Decimal) -> Result<(), SerializeError>;

    fn write_property_name(&mut self, name: &str) -> Result<(), SerializeError>;
    fn write_object_start(&mut self, type_id: Option<&str>) -> Result<(), SerializeError>;
    fn write_object_end(&mut self) -> Result<(), SerializeError>;
    fn write_array_start(&mut self, len: usize) -> Result<(), SerializeError>;
    fn write_array_end(&mut self) -> Result<(), SerializeError>;

    /// Flush buffered output to the underlying sink.
    fn flush(&mut self) -> Result<(), SerializeError>;

    fn write_token(&mut self, token: &Token) -> Result<(), SerializeError> {
        match token {
            Token::Null => self.write_null(),
            Token::Bool(v) => self.write_bool(*v),
            Token::Char(v) => self.write_char(*v),
            Token::String(v) => self.write_string(v),
            Token::I8(v) => self.write_i8(*v),
            Token::I16(v) => self.write_i16(*v),
            Token::I32(v) => self.write_i32(*v),
            Token::I64(v) => self.write_i64(*v),
            Token::U8(v) => self.write_u8(*v),
            Token::U16(v) => self.write_u16(*v),
            Token::U32(v) => self.write_u32(*v),
            Token::U64(v) => self.write_u64(*v),
            Token::Single(v) => self.write_f32(*v),
            Token::Double(v) => self.write_f64(*v),
            Token::Decimal(v) => self.write_decimal(*v),
            Token::PropertyName(name) => self.write_property_name(name),
            Token::ObjectStart(type_id) => self.write_object_start(type_id.as_deref()),
            Token::ObjectEnd => self.write_object_end(),
            Token::ArrayStart(len) => self.write_array_start(*len),
            Token::ArrayEnd => self.write_array_end(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Source side of the token protocol.
pub trait TokenReader {
    /// Kind of the next token, or `None` at end of stream.
    fn peek_kind(&mut self) -> Result<Option<TokenKind>, SerializeError>;

    /// Consume a Null token if one is next.
    fn read_null(&mut self) -> Result<bool, SerializeError>;
    fn read_bool(&mut self) -> Result<Option<bool>, SerializeError>;
    fn read_char(&mut self) -> Result<Option<char>, SerializeError>;
    fn read_string(&mut self) -> Result<Option<String>, SerializeError>;
    fn read_i8(&mut self) -> Result<Option<i8>, SerializeError>;
    fn read_i16(&mut self) -> Result<Option<i16>, SerializeError>;
    fn read_i32(&mut self) -> Result<Option<i32>, SerializeError>;
    fn read_i64(&mut self) -> Result<Option<i64>, SerializeError>;
    fn read_u8(&mut self) -> Result<Option<u8>, SerializeError>;
    fn read_u16(&mut self) -> Result<Option<u16>, SerializeError>;
    fn read_u32(&mut self) -> Result<Option<u32>, SerializeError>;
    fn read_u64(&mut self) -> Result<Option<u64>, SerializeError>;
    fn read_f32(&mut self) -> Result<Option<f32>, SerializeError>;
    fn read_f64(&mut self) -> Result<Option<f64>, SerializeError>;
    fn read_decimal(&mut self) -> Result<Option<Decimal>, SerializeError>;

    fn read_property_name(&mut self) -> Result<Option<String>, SerializeError>;
    fn read_object_start(&mut self) -> Result<Option<ObjectHeader>, SerializeError>;
    fn read_object_end(&mut self) -> Result<bool, SerializeError>;
    fn read_array_start(&mut self) -> Result<Option<usize>, SerializeError>;
    fn read_array_end(&mut self) -> Result<bool, SerializeError>;

    /// Consume the next token whatever its kind.
    fn next_token(&mut self) -> Result<Option<Token>, SerializeError>;

    /// Consume one complete value, including any nested object or array.
    ///
    /// Fails with [`SerializeError::Malformed`] when containers nest deeper
    /// than [`MAX_NESTING_DEPTH`].
    fn skip(&mut self) -> Result<(), SerializeError> {
        // One entry per open container: `None` for an object, or the number
        // of elements an array still has to yield.
        let mut open: Vec<Option<usize>> = Vec::new();
        loop {
            match self.next_token()? {
                None => {
                    return Err(SerializeError::Malformed(
                        "unexpected end of stream while skipping a value".into(),
                    ));
                }
                Some(Token::ObjectStart(_)) => open_container(&mut open, None)?,
                Some(Token::ArrayStart(len)) => open_container(&mut open, Some(len))?,
                Some(token @ (Token::PropertyName(_) | Token::ObjectEnd | Token::ArrayEnd)) => {
                    return Err(SerializeError::mismatch("a value", token.kind()));
                }
                Some(_) => {}
            }

            // Close finished containers until one expects another value.
            loop {
                match open.last_mut() {
                    None => return Ok(()),
                    Some(Some(0)) => {
                        if !self.read_array_end()? {
                            return Err(SerializeError::mismatch("ArrayEnd", self.peek_kind()?));
                        }
                        open.pop();
                    }
                    Some(Some(remaining)) => {
                        *remaining -= 1;
                        break;
                    }
                    Some(None) => match self.next_token()? {
                        Some(Token::PropertyName(_)) => break,
                        Some(Token::ObjectEnd) => {
                            open.pop();
                        }
                        other => {
                            return Err(SerializeError::mismatch(
                                "PropertyName or ObjectEnd",
                                other.map(|t| t.kind()),
                            ));
                        }
                    },
                }
            }
        }
    }
}

fn open_container(open: &mut Vec<Option<usize>>, len: Option<usize>) -> Result<(), SerializeError> {
    if open.len() >= MAX_NESTING_DEPTH {
        return Err(too_deep());
    }
    open.push(len);
    Ok(())
}

pub(crate) fn too_deep() -> SerializeError {
    SerializeError::Malformed(format!("values nested deeper than {MAX_NESTING_DEPTH} levels"))
}

/// Copy every remaining token from `reader` to `writer`.
///
/// Returns the number of tokens copied. Numeric kinds are preserved when
/// reading binary; text streams only carry 64-bit integers and doubles, so
/// a text-to-binary transcode widens numbers.
pub fn transcode(
    reader: &mut dyn TokenReader,
    writer: &mut dyn TokenWriter,
) -> Result<usize, SerializeError> {
    let mut copied = 0;
    while let Some(token) = reader.next_token()? {
        writer.write_token(&token)?;
        copied += 1;
    }
    writer.flush()?;
    Ok(copied)
}
