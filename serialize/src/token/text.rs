//! Human-readable token backend on top of RON.
//!
//! Objects become RON maps keyed by property name, arrays become sequences
//! and Null becomes `()`. A polymorphic type id is stored under the reserved
//! `"$type"` key. RON comments are accepted and ignored on read.
//!
//! The text form does not keep numeric widths: integers are read back as
//! `Int64` and floats as `Double`, and typed reads narrow them with `as`
//! casts. `u64` values above `i64::MAX` wrap through `i64` and back.
//! Decimals are written as strings to keep their exact digits.
//!
//! ```text
//! {
//!     "$type": "Circle",
//!     "radius": 2.5,
//!     "tags": ["round"],
//! }
//! ```

use std::io::{Read, Write};

use ron::ser::PrettyConfig;
use ron::value::Float;
use ron::{Map, Number, Value};

use super::{ObjectHeader, Token, TokenKind, TokenReader, TokenWriter};
use crate::decimal::Decimal;
use crate::error::SerializeError;
use crate::value::ScalarKind;

/// Reserved key holding the runtime type name of an object.
pub const TYPE_KEY: &str = "$type";

fn text_error(err: impl std::fmt::Display) -> SerializeError {
    SerializeError::Malformed(err.to_string())
}

/// Output layout of [`TextWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextStyle {
    pub pretty: bool,
    pub indent: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            pretty: true,
            indent: "    ".into(),
        }
    }
}

impl TextStyle {
    pub fn compact() -> Self {
        Self {
            pretty: false,
            indent: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

enum Frame {
    Object {
        fields: Map,
        pending: Option<String>,
    },
    Array(Vec<Value>),
}

/// Collects a document and renders it once the root value is complete.
pub struct TextWriter<W: Write> {
    sink: W,
    style: TextStyle,
    stack: Vec<Frame>,
    written: bool,
}

impl<W: Write> TextWriter<W> {
    pub fn new(sink: W) -> Self {
        Self::with_style(sink, TextStyle::default())
    }

    pub fn with_style(sink: W, style: TextStyle) -> Self {
        Self {
            sink,
            style,
            stack: Vec::new(),
            written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn emit(&mut self, value: Value) -> Result<(), SerializeError> {
        match self.stack.last_mut() {
            Some(Frame::Array(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Frame::Object { fields, pending }) => {
                let key = pending.take().ok_or_else(|| {
                    SerializeError::Malformed("object value without a property name".into())
                })?;
                fields.insert(Value::String(key), value);
                Ok(())
            }
            None => self.render(value),
        }
    }

    fn render(&mut self, root: Value) -> Result<(), SerializeError> {
        if self.written {
            return Err(SerializeError::Malformed(
                "a text document holds a single root value".into(),
            ));
        }
        let text = if self.style.pretty {
            let config = PrettyConfig::default().indentor(self.style.indent.clone());
            ron::ser::to_string_pretty(&root, config)
        } else {
            ron::ser::to_string(&root)
        }
        .map_err(text_error)?;
        self.sink.write_all(text.as_bytes())?;
        self.sink.write_all(b"\n")?;
        self.written = true;
        Ok(())
    }

    fn integer(&mut self, value: i64) -> Result<(), SerializeError> {
        self.emit(Value::Number(Number::Integer(value)))
    }

    fn float(&mut self, value: f64) -> Result<(), SerializeError> {
        self.emit(Value::Number(Number::Float(Float::new(value))))
    }
}

impl<W: Write> TokenWriter for TextWriter<W> {
    fn write_null(&mut self) -> Result<(), SerializeError> {
        self.emit(Value::Unit)
    }

    fn write_bool(&mut self, value: bool) -> Result<(), SerializeError> {
        self.emit(Value::Bool(value))
    }

    fn write_char(&mut self, value: char) -> Result<(), SerializeError> {
        self.emit(Value::Char(value))
    }

    fn write_string(&mut self, value: &str) -> Result<(), SerializeError> {
        self.emit(Value::String(value.to_owned()))
    }

    fn write_i8(&mut self, value: i8) -> Result<(), SerializeError> {
        self.integer(value.into())
    }

    fn write_i16(&mut self, value: i16) -> Result<(), SerializeError> {
        self.integer(value.into())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), SerializeError> {
        self.integer(value.into())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), SerializeError> {
        self.integer(value)
    }

    fn write_u8(&mut self, value: u8) -> Result<(), SerializeError> {
        self.integer(value.into())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), SerializeError> {
        self.integer(value.into())
    }

    fn write_u32(&mut self, value: u32) -> Result<(), SerializeError> {
        self.integer(value.into())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), SerializeError> {
        self.integer(value as i64)
    }

    fn write_f32(&mut self, value: f32) -> Result<(), SerializeError> {
        self.float(value.into())
    }

    fn write_f64(&mut self, value: f64) -> Result<(), SerializeError> {
        self.float(value)
    }

    fn write_decimal(&mut self, value: Decimal) -> Result<(), SerializeError> {
        self.emit(Value::String(value.to_string()))
    }

    fn write_property_name(&mut self, name: &str) -> Result<(), SerializeError> {
        match self.stack.last_mut() {
            Some(Frame::Object { pending, .. }) if pending.is_none() => {
                *pending = Some(name.to_owned());
                Ok(())
            }
            _ => Err(SerializeError::Malformed(format!(
                "property name '{name}' outside an object"
            ))),
        }
    }

    fn write_object_start(&mut self, type_id: Option<&str>) -> Result<(), SerializeError> {
        let mut fields = Map::new();
        if let Some(type_id) = type_id {
            fields.insert(
                Value::String(TYPE_KEY.to_owned()),
                Value::String(type_id.to_owned()),
            );
        }
        self.stack.push(Frame::Object {
            fields,
            pending: None,
        });
        Ok(())
    }

    fn write_object_end(&mut self) -> Result<(), SerializeError> {
        match self.stack.pop() {
            Some(Frame::Object {
                fields,
                pending: None,
            }) => self.emit(Value::Map(fields)),
            _ => Err(SerializeError::Malformed(
                "object end without a matching start".into(),
            )),
        }
    }

    fn write_array_start(&mut self, len: usize) -> Result<(), SerializeError> {
        self.stack.push(Frame::Array(Vec::with_capacity(len)));
        Ok(())
    }

    fn write_array_end(&mut self) -> Result<(), SerializeError> {
        match self.stack.pop() {
            Some(Frame::Array(items)) => self.emit(Value::Seq(items)),
            _ => Err(SerializeError::Malformed(
                "array end without a matching start".into(),
            )),
        }
    }

    fn flush(&mut self) -> Result<(), SerializeError> {
        if !self.stack.is_empty() {
            return Err(SerializeError::Malformed(format!(
                "{} unterminated object or array",
                self.stack.len()
            )));
        }
        self.sink.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parses a whole document up front and replays it as tokens.
pub struct TextReader {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TextReader {
    pub fn parse(text: &str) -> Result<Self, SerializeError> {
        let root: Value = ron::from_str(text).map_err(text_error)?;
        let mut tokens = Vec::new();
        flatten(root, &mut tokens)?;
        Ok(Self { tokens, cursor: 0 })
    }

    pub fn from_reader<R: Read>(mut source: R) -> Result<Self, SerializeError> {
        let mut text = String::new();
        source.read_to_string(&mut text).map_err(|err| {
            if err.kind() == std::io::ErrorKind::InvalidData {
                SerializeError::Malformed("text document is not valid UTF-8".into())
            } else {
                SerializeError::Io(err)
            }
        })?;
        Self::parse(&text)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    /// Consume the next token if `pick` maps it to a value.
    fn take_if<T>(&mut self, pick: impl FnOnce(&Token) -> Option<T>) -> Option<T> {
        let picked = self.peek().and_then(pick)?;
        self.cursor += 1;
        Some(picked)
    }

    /// Read a number as integer kind `T`.
    ///
    /// Floats must be whole. Values `T` cannot hold fail with
    /// [`SerializeError::TypeMismatch`] and leave the token unread.
    fn integer<T: TryFrom<i64>>(
        &mut self,
        kind: ScalarKind,
    ) -> Result<Option<T>, SerializeError> {
        let whole = match self.peek() {
            Some(Token::I64(v)) => *v,
            Some(Token::Double(v)) => {
                let v = *v;
                whole_number(v).ok_or_else(|| out_of_range(kind, v))?
            }
            _ => return Ok(None),
        };
        let narrowed = T::try_from(whole).map_err(|_| out_of_range(kind, whole))?;
        self.cursor += 1;
        Ok(Some(narrowed))
    }

    fn float(&mut self, kind: ScalarKind) -> Result<Option<f64>, SerializeError> {
        let value = match self.peek() {
            Some(Token::I64(v)) => *v as f64,
            Some(Token::Double(v)) => *v,
            _ => return Ok(None),
        };
        if kind == ScalarKind::F32 && value.is_finite() && (value as f32).is_infinite() {
            return Err(out_of_range(kind, value));
        }
        self.cursor += 1;
        Ok(Some(value))
    }
}

/// `v` as an `i64` when it is a whole number in range.
fn whole_number(v: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (v.is_finite() && v.fract() == 0.0 && (-LIMIT..LIMIT).contains(&v)).then_some(v as i64)
}

fn out_of_range(kind: ScalarKind, value: impl std::fmt::Display) -> SerializeError {
    SerializeError::TypeMismatch {
        expected: kind.name().to_owned(),
        found: format!("number {value}"),
    }
}

fn flatten(value: Value, tokens: &mut Vec<Token>) -> Result<(), SerializeError> {
    match value {
        Value::Unit | Value::Option(None) => tokens.push(Token::Null),
        Value::Option(Some(inner)) => flatten(*inner, tokens)?,
        Value::Bool(v) => tokens.push(Token::Bool(v)),
        Value::Char(v) => tokens.push(Token::Char(v)),
        Value::String(v) => tokens.push(Token::String(v)),
        Value::Number(Number::Integer(v)) => tokens.push(Token::I64(v)),
        Value::Number(Number::Float(v)) => tokens.push(Token::Double(v.get())),
        Value::Seq(items) => {
            tokens.push(Token::ArrayStart(items.len()));
            for item in items {
                flatten(item, tokens)?;
            }
            tokens.push(Token::ArrayEnd);
        }
        Value::Map(map) => {
            let mut type_id = None;
            let mut fields = Vec::with_capacity(map.len());
            for (key, value) in map.iter() {
                let key = match key {
                    Value::String(key) => key.clone(),
                    Value::Char(key) => key.to_string(),
                    other => {
                        return Err(SerializeError::Malformed(format!(
                            "property names must be strings, found {other:?}"
                        )));
                    }
                };
                if key == TYPE_KEY {
                    match value {
                        Value::String(name) => type_id = Some(name.clone()),
                        other => {
                            return Err(SerializeError::Malformed(format!(
                                "'{TYPE_KEY}' must be a string, found {other:?}"
                            )));
                        }
                    }
                } else {
                    fields.push((key, value.clone()));
                }
            }
            tokens.push(Token::ObjectStart(type_id));
            for (key, value) in fields {
                tokens.push(Token::PropertyName(key));
                flatten(value, tokens)?;
            }
            tokens.push(Token::ObjectEnd);
        }
    }
    Ok(())
}

impl TokenReader for TextReader {
    fn peek_kind(&mut self) -> Result<Option<TokenKind>, SerializeError> {
        Ok(self.peek().map(Token::kind))
    }

    fn read_null(&mut self) -> Result<bool, SerializeError> {
        Ok(self
            .take_if(|token| matches!(token, Token::Null).then_some(()))
            .is_some())
    }

    fn read_bool(&mut self) -> Result<Option<bool>, SerializeError> {
        Ok(self.take_if(|token| match token {
            Token::Bool(v) => Some(*v),
            _ => None,
        }))
    }

    fn read_char(&mut self) -> Result<Option<char>, SerializeError> {
        Ok(self.take_if(|token| match token {
            Token::Char(v) => Some(*v),
            Token::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            _ => None,
        }))
    }

    fn read_string(&mut self) -> Result<Option<String>, SerializeError> {
        Ok(self.take_if(|token| match token {
            Token::String(v) => Some(v.clone()),
            Token::Char(v) => Some(v.to_string()),
            _ => None,
        }))
    }

    fn read_i8(&mut self) -> Result<Option<i8>, SerializeError> {
        self.integer(ScalarKind::I8)
    }

    fn read_i16(&mut self) -> Result<Option<i16>, SerializeError> {
        self.integer(ScalarKind::I16)
    }

    fn read_i32(&mut self) -> Result<Option<i32>, SerializeError> {
        self.integer(ScalarKind::I32)
    }

    fn read_i64(&mut self) -> Result<Option<i64>, SerializeError> {
        self.integer(ScalarKind::I64)
    }

    fn read_u8(&mut self) -> Result<Option<u8>, SerializeError> {
        self.integer(ScalarKind::U8)
    }

    fn read_u16(&mut self) -> Result<Option<u16>, SerializeError> {
        self.integer(ScalarKind::U16)
    }

    fn read_u32(&mut self) -> Result<Option<u32>, SerializeError> {
        self.integer(ScalarKind::U32)
    }

    /// The text wire carries `u64` as the `i64` with the same bits, so
    /// negative numbers read back as values above `i64::MAX`.
    fn read_u64(&mut self) -> Result<Option<u64>, SerializeError> {
        Ok(self.integer::<i64>(ScalarKind::U64)?.map(|v| v as u64))
    }

    fn read_f32(&mut self) -> Result<Option<f32>, SerializeError> {
        Ok(self.float(ScalarKind::F32)?.map(|v| v as f32))
    }

    fn read_f64(&mut self) -> Result<Option<f64>, SerializeError> {
        self.float(ScalarKind::F64)
    }

    fn read_decimal(&mut self) -> Result<Option<Decimal>, SerializeError> {
        Ok(self.take_if(|token| match token {
            Token::String(s) => s.parse().ok(),
            Token::I64(v) => Decimal::new(*v as i128, 0),
            Token::Double(v) => v.to_string().parse().ok(),
            _ => None,
        }))
    }

    fn read_property_name(&mut self) -> Result<Option<String>, SerializeError> {
        Ok(self.take_if(|token| match token {
            Token::PropertyName(name) => Some(name.clone()),
            _ => None,
        }))
    }

    fn read_object_start(&mut self) -> Result<Option<ObjectHeader>, SerializeError> {
        Ok(self.take_if(|token| match token {
            Token::ObjectStart(type_id) => Some(ObjectHeader {
                type_id: type_id.clone(),
            }),
            _ => None,
        }))
    }

    fn read_object_end(&mut self) -> Result<bool, SerializeError> {
        Ok(self
            .take_if(|token| matches!(token, Token::ObjectEnd).then_some(()))
            .is_some())
    }

    fn read_array_start(&mut self) -> Result<Option<usize>, SerializeError> {
        Ok(self.take_if(|token| match token {
            Token::ArrayStart(len) => Some(*len),
            _ => None,
        }))
    }

    fn read_array_end(&mut self) -> Result<bool, SerializeError> {
        Ok(self
            .take_if(|token| matches!(token, Token::ArrayEnd).then_some(()))
            .is_some())
    }

    fn next_token(&mut self) -> Result<Option<Token>, SerializeError> {
        let token = self.tokens.get_mut(self.cursor).map(std::mem::take);
        if token.is_some() {
            self.cursor += 1;
        }
        Ok(token)
    }
}
