//! Compact binary token backend.
//!
//! Each token is a one-byte [`TokenKind`] tag followed by its payload, all
//! little-endian:
//!
//! | token        | payload                                      |
//! |--------------|----------------------------------------------|
//! | Bool         | `u8` (0 or 1)                                |
//! | Char         | `u32` scalar value                           |
//! | String       | `u32` byte length, UTF-8 bytes               |
//! | integers     | fixed width                                  |
//! | Single/Double| IEEE 754                                     |
//! | Decimal      | `i128` mantissa, `u8` scale                  |
//! | PropertyName | as String                                    |
//! | ObjectStart  | `u8` flag, then a String if the flag is 1    |
//! | ArrayStart   | `u32` element count                          |
//!
//! Typed reads are exact: an `Int32` read never accepts an `Int64` token.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{ObjectHeader, Token, TokenKind, TokenReader, TokenWriter};
use crate::decimal::Decimal;
use crate::error::SerializeError;

fn truncated(err: io::Error) -> SerializeError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SerializeError::Malformed("stream ends inside a token".into())
    } else {
        SerializeError::Io(err)
    }
}

fn length_prefix(len: usize) -> Result<u32, SerializeError> {
    u32::try_from(len)
        .map_err(|_| SerializeError::Malformed(format!("length {len} does not fit in u32")))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub struct BinaryWriter<W: Write> {
    sink: W,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn tag(&mut self, kind: TokenKind) -> Result<(), SerializeError> {
        self.sink.write_u8(kind as u8)?;
        Ok(())
    }

    fn raw_string(&mut self, value: &str) -> Result<(), SerializeError> {
        self.sink
            .write_u32::<LittleEndian>(length_prefix(value.len())?)?;
        self.sink.write_all(value.as_bytes())?;
        Ok(())
    }
}

impl<W: Write> TokenWriter for BinaryWriter<W> {
    fn write_null(&mut self) -> Result<(), SerializeError> {
        self.tag(TokenKind::Null)
    }

    fn write_bool(&mut self, value: bool) -> Result<(), SerializeError> {
        self.tag(TokenKind::Bool)?;
        self.sink.write_u8(value as u8)?;
        Ok(())
    }

    fn write_char(&mut self, value: char) -> Result<(), SerializeError> {
        self.tag(TokenKind::Char)?;
        self.sink.write_u32::<LittleEndian>(value as u32)?;
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<(), SerializeError> {
        self.tag(TokenKind::String)?;
        self.raw_string(value)
    }

    fn write_i8(&mut self, value: i8) -> Result<(), SerializeError> {
        self.tag(TokenKind::I8)?;
        self.sink.write_i8(value)?;
        Ok(())
    }

    fn write_i16(&mut self, value: i16) -> Result<(), SerializeError> {
        self.tag(TokenKind::I16)?;
        self.sink.write_i16::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), SerializeError> {
        self.tag(TokenKind::I32)?;
        self.sink.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), SerializeError> {
        self.tag(TokenKind::I64)?;
        self.sink.write_i64::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_u8(&mut self, value: u8) -> Result<(), SerializeError> {
        self.tag(TokenKind::U8)?;
        self.sink.write_u8(value)?;
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), SerializeError> {
        self.tag(TokenKind::U16)?;
        self.sink.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<(), SerializeError> {
        self.tag(TokenKind::U32)?;
        self.sink.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), SerializeError> {
        self.tag(TokenKind::U64)?;
        self.sink.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_f32(&mut self, value: f32) -> Result<(), SerializeError> {
        self.tag(TokenKind::Single)?;
        self.sink.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_f64(&mut self, value: f64) -> Result<(), SerializeError> {
        self.tag(TokenKind::Double)?;
        self.sink.write_f64::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_decimal(&mut self, value: Decimal) -> Result<(), SerializeError> {
        self.tag(TokenKind::Decimal)?;
        self.sink.write_i128::<LittleEndian>(value.mantissa())?;
        self.sink.write_u8(value.scale())?;
        Ok(())
    }

    fn write_property_name(&mut self, name: &str) -> Result<(), SerializeError> {
        self.tag(TokenKind::PropertyName)?;
        self.raw_string(name)
    }

    fn write_object_start(&mut self, type_id: Option<&str>) -> Result<(), SerializeError> {
        self.tag(TokenKind::ObjectStart)?;
        match type_id {
            Some(name) => {
                self.sink.write_u8(1)?;
                self.raw_string(name)
            }
            None => {
                self.sink.write_u8(0)?;
                Ok(())
            }
        }
    }

    fn write_object_end(&mut self) -> Result<(), SerializeError> {
        self.tag(TokenKind::ObjectEnd)
    }

    fn write_array_start(&mut self, len: usize) -> Result<(), SerializeError> {
        self.tag(TokenKind::ArrayStart)?;
        self.sink.write_u32::<LittleEndian>(length_prefix(len)?)?;
        Ok(())
    }

    fn write_array_end(&mut self) -> Result<(), SerializeError> {
        self.tag(TokenKind::ArrayEnd)
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        self.sink.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Reads binary tokens with one tag of lookahead.
pub struct BinaryReader<R: Read> {
    source: R,
    peeked: Option<TokenKind>,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            peeked: None,
        }
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Consume the peeked tag if it is `kind`.
    fn take(&mut self, kind: TokenKind) -> Result<bool, SerializeError> {
        if self.peek_kind()? == Some(kind) {
            self.peeked = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn raw_string(&mut self) -> Result<String, SerializeError> {
        let len = self.source.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let mut bytes = Vec::new();
        (&mut self.source)
            .take(len as u64)
            .read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(SerializeError::Malformed(format!(
                "string of {len} bytes truncated to {}",
                bytes.len()
            )));
        }
        String::from_utf8(bytes)
            .map_err(|err| SerializeError::Malformed(format!("invalid UTF-8 in string: {err}")))
    }

    fn raw_char(&mut self) -> Result<char, SerializeError> {
        let scalar = self.source.read_u32::<LittleEndian>().map_err(truncated)?;
        char::from_u32(scalar)
            .ok_or_else(|| SerializeError::Malformed(format!("invalid char scalar 0x{scalar:x}")))
    }

    fn raw_decimal(&mut self) -> Result<Decimal, SerializeError> {
        let mantissa = self.source.read_i128::<LittleEndian>().map_err(truncated)?;
        let scale = self.source.read_u8().map_err(truncated)?;
        Decimal::new(mantissa, scale)
            .ok_or_else(|| SerializeError::Malformed(format!("decimal scale {scale} out of range")))
    }

    fn raw_header(&mut self) -> Result<ObjectHeader, SerializeError> {
        let type_id = match self.source.read_u8().map_err(truncated)? {
            0 => None,
            1 => Some(self.raw_string()?),
            flag => {
                return Err(SerializeError::Malformed(format!(
                    "invalid type id flag {flag}"
                )));
            }
        };
        Ok(ObjectHeader { type_id })
    }
}

/// Fixed-width scalar try-reads.
macro_rules! read_fixed {
    ($($method:ident: $ty:ty => $kind:ident, $read:expr;)*) => {
        $(
            fn $method(&mut self) -> Result<Option<$ty>, SerializeError> {
                if !self.take(TokenKind::$kind)? {
                    return Ok(None);
                }
                let read: fn(&mut R) -> io::Result<$ty> = $read;
                read(&mut self.source).map(Some).map_err(truncated)
            }
        )*
    };
}

impl<R: Read> TokenReader for BinaryReader<R> {
    fn peek_kind(&mut self) -> Result<Option<TokenKind>, SerializeError> {
        if let Some(kind) = self.peeked {
            return Ok(Some(kind));
        }
        let tag = match self.source.read_u8() {
            Ok(tag) => tag,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let kind = TokenKind::from_byte(tag).ok_or_else(|| {
            SerializeError::Malformed(format!("unknown token discriminant 0x{tag:02x}"))
        })?;
        self.peeked = Some(kind);
        Ok(Some(kind))
    }

    fn read_null(&mut self) -> Result<bool, SerializeError> {
        self.take(TokenKind::Null)
    }

    fn read_bool(&mut self) -> Result<Option<bool>, SerializeError> {
        if !self.take(TokenKind::Bool)? {
            return Ok(None);
        }
        match self.source.read_u8().map_err(truncated)? {
            0 => Ok(Some(false)),
            1 => Ok(Some(true)),
            other => Err(SerializeError::Malformed(format!("invalid bool byte {other}"))),
        }
    }

    fn read_char(&mut self) -> Result<Option<char>, SerializeError> {
        if !self.take(TokenKind::Char)? {
            return Ok(None);
        }
        self.raw_char().map(Some)
    }

    fn read_string(&mut self) -> Result<Option<String>, SerializeError> {
        if !self.take(TokenKind::String)? {
            return Ok(None);
        }
        self.raw_string().map(Some)
    }

    read_fixed! {
        read_i8: i8 => I8, |r| r.read_i8();
        read_i16: i16 => I16, |r| r.read_i16::<LittleEndian>();
        read_i32: i32 => I32, |r| r.read_i32::<LittleEndian>();
        read_i64: i64 => I64, |r| r.read_i64::<LittleEndian>();
        read_u8: u8 => U8, |r| r.read_u8();
        read_u16: u16 => U16, |r| r.read_u16::<LittleEndian>();
        read_u32: u32 => U32, |r| r.read_u32::<LittleEndian>();
        read_u64: u64 => U64, |r| r.read_u64::<LittleEndian>();
        read_f32: f32 => Single, |r| r.read_f32::<LittleEndian>();
        read_f64: f64 => Double, |r| r.read_f64::<LittleEndian>();
    }

    fn read_decimal(&mut self) -> Result<Option<Decimal>, SerializeError> {
        if !self.take(TokenKind::Decimal)? {
            return Ok(None);
        }
        self.raw_decimal().map(Some)
    }

    fn read_property_name(&mut self) -> Result<Option<String>, SerializeError> {
        if !self.take(TokenKind::PropertyName)? {
            return Ok(None);
        }
        self.raw_string().map(Some)
    }

    fn read_object_start(&mut self) -> Result<Option<ObjectHeader>, SerializeError> {
        if !self.take(TokenKind::ObjectStart)? {
            return Ok(None);
        }
        self.raw_header().map(Some)
    }

    fn read_object_end(&mut self) -> Result<bool, SerializeError> {
        self.take(TokenKind::ObjectEnd)
    }

    fn read_array_start(&mut self) -> Result<Option<usize>, SerializeError> {
        if !self.take(TokenKind::ArrayStart)? {
            return Ok(None);
        }
        let len = self.source.read_u32::<LittleEndian>().map_err(truncated)?;
        Ok(Some(len as usize))
    }

    fn read_array_end(&mut self) -> Result<bool, SerializeError> {
        self.take(TokenKind::ArrayEnd)
    }

    fn next_token(&mut self) -> Result<Option<Token>, SerializeError> {
        let Some(kind) = self.peek_kind()? else {
            return Ok(None);
        };
        let token = match kind {
            TokenKind::Null => {
                self.peeked = None;
                Some(Token::Null)
            }
            TokenKind::Bool => self.read_bool()?.map(Token::Bool),
            TokenKind::Char => self.read_char()?.map(Token::Char),
            TokenKind::String => self.read_string()?.map(Token::String),
            TokenKind::I8 => self.read_i8()?.map(Token::I8),
            TokenKind::I16 => self.read_i16()?.map(Token::I16),
            TokenKind::I32 => self.read_i32()?.map(Token::I32),
            TokenKind::I64 => self.read_i64()?.map(Token::I64),
            TokenKind::U8 => self.read_u8()?.map(Token::U8),
            TokenKind::U16 => self.read_u16()?.map(Token::U16),
            TokenKind::U32 => self.read_u32()?.map(Token::U32),
            TokenKind::U64 => self.read_u64()?.map(Token::U64),
            TokenKind::Single => self.read_f32()?.map(Token::Single),
            TokenKind::Double => self.read_f64()?.map(Token::Double),
            TokenKind::Decimal => self.read_decimal()?.map(Token::Decimal),
            TokenKind::PropertyName => self.read_property_name()?.map(Token::PropertyName),
            TokenKind::ObjectStart => self
                .read_object_start()?
                .map(|header| Token::ObjectStart(header.type_id)),
            TokenKind::ObjectEnd => {
                self.peeked = None;
                Some(Token::ObjectEnd)
            }
            TokenKind::ArrayStart => self.read_array_start()?.map(Token::ArrayStart),
            TokenKind::ArrayEnd => {
                self.peeked = None;
                Some(Token::ArrayEnd)
            }
        };
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::MAX_NESTING_DEPTH;

    fn reader(bytes: &[u8]) -> BinaryReader<&[u8]> {
        BinaryReader::new(bytes)
    }

    #[test]
    fn point_layout() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_object_start(None).unwrap();
        writer.write_property_name("x").unwrap();
        writer.write_i32(3).unwrap();
        writer.write_property_name("y").unwrap();
        writer.write_i32(4).unwrap();
        writer.write_object_end().unwrap();

        assert_eq!(
            writer.into_inner(),
            [
                16, 0, 15, 1, 0, 0, 0, b'x', 6, 3, 0, 0, 0, 15, 1, 0, 0, 0, b'y', 6, 4, 0, 0, 0,
                17
            ]
        );
    }

    #[test]
    fn try_read_does_not_consume_on_mismatch() {
        let mut r = reader(&[6, 42, 0, 0, 0]);
        assert_eq!(r.read_i64().unwrap(), None);
        assert_eq!(r.read_string().unwrap(), None);
        assert_eq!(r.read_i32().unwrap(), Some(42));
        assert_eq!(r.peek_kind().unwrap(), None);
    }

    #[test]
    fn unknown_discriminant_is_malformed() {
        let err = reader(&[0xEE]).peek_kind().unwrap_err();
        assert!(matches!(err, SerializeError::Malformed(_)));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let err = reader(&[6, 1, 0]).read_i32().unwrap_err();
        assert!(matches!(err, SerializeError::Malformed(_)));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = reader(&[3, 2, 0, 0, 0, 0xC3, 0x28]).read_string().unwrap_err();
        assert!(matches!(err, SerializeError::Malformed(_)));
    }

    #[test]
    fn typed_object_header() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_object_start(Some("Circle")).unwrap();
        writer.write_object_end().unwrap();
        let bytes = writer.into_inner();

        let mut r = reader(&bytes);
        let header = r.read_object_start().unwrap().unwrap();
        assert_eq!(header.type_id.as_deref(), Some("Circle"));
        assert!(r.read_object_end().unwrap());
    }

    #[test]
    fn skip_consumes_nested_value() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_object_start(None).unwrap();
        writer.write_property_name("items").unwrap();
        writer.write_array_start(2).unwrap();
        writer.write_decimal(Decimal::new(15, 1).unwrap()).unwrap();
        writer.write_null().unwrap();
        writer.write_array_end().unwrap();
        writer.write_object_end().unwrap();
        writer.write_bool(true).unwrap();
        let bytes = writer.into_inner();

        let mut r = reader(&bytes);
        r.skip().unwrap();
        assert_eq!(r.read_bool().unwrap(), Some(true));
    }

    fn nested_arrays(depth: usize) -> Vec<u8> {
        let mut writer = BinaryWriter::new(Vec::new());
        for _ in 0..depth {
            writer.write_array_start(1).unwrap();
        }
        writer.write_null().unwrap();
        for _ in 0..depth {
            writer.write_array_end().unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn skip_accepts_nesting_up_to_the_limit() {
        let mut bytes = nested_arrays(MAX_NESTING_DEPTH);
        bytes.push(TokenKind::Bool as u8);
        bytes.push(1);
        let mut r = reader(&bytes);
        r.skip().unwrap();
        assert_eq!(r.read_bool().unwrap(), Some(true));
    }

    #[test]
    fn skip_rejects_runaway_nesting() {
        let bytes = nested_arrays(200_000);
        let err = reader(&bytes).skip().unwrap_err();
        assert!(matches!(err, SerializeError::Malformed(_)), "{err}");
    }
}
