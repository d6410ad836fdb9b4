//! Backend selection and in-memory encoding.
//!
//! Provides [`encode`] and [`decode`] functions that convert between
//! reflected values and byte buffers in either token backend.

use std::path::Path;

use serde::Deserialize;

use crate::error::SerializeError;
use crate::field::FieldValue;
use crate::graph::GraphSerializer;
use crate::token::binary::{BinaryReader, BinaryWriter};
use crate::token::text::{TextReader, TextStyle, TextWriter};

/// Supported token backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Compact tagged binary.
    #[default]
    Binary,
    /// RON text, for inspection and hand editing.
    Text,
}

impl Format {
    /// Default file extension for the format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::Text => "ron",
        }
    }

    /// Guess the format from a path's default extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "bin" => Some(Self::Binary),
            "ron" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Encode `value` with the global registry.
pub fn encode<T: FieldValue>(value: &T, format: Format) -> Result<Vec<u8>, SerializeError> {
    encode_with(&GraphSerializer::global(), value, format, &TextStyle::default())
}

pub fn encode_with<T: FieldValue>(
    serializer: &GraphSerializer<'_>,
    value: &T,
    format: Format,
    style: &TextStyle,
) -> Result<Vec<u8>, SerializeError> {
    match format {
        Format::Binary => {
            let mut writer = BinaryWriter::new(Vec::new());
            serializer.serialize(&mut writer, value)?;
            Ok(writer.into_inner())
        }
        Format::Text => {
            let mut writer = TextWriter::with_style(Vec::new(), style.clone());
            serializer.serialize(&mut writer, value)?;
            Ok(writer.into_inner())
        }
    }
}

/// Decode a `T` with the global registry.
pub fn decode<T: FieldValue>(bytes: &[u8], format: Format) -> Result<T, SerializeError> {
    decode_with(&GraphSerializer::global(), bytes, format)
}

pub fn decode_with<T: FieldValue>(
    serializer: &GraphSerializer<'_>,
    bytes: &[u8],
    format: Format,
) -> Result<T, SerializeError> {
    match format {
        Format::Binary => serializer.deserialize(&mut BinaryReader::new(bytes)),
        Format::Text => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| SerializeError::Malformed(e.to_string()))?;
            serializer.deserialize(&mut TextReader::parse(text)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_round_trip() {
        for format in [Format::Binary, Format::Text] {
            let path = Path::new("asset").with_extension(format.extension());
            assert_eq!(Format::from_path(&path), Some(format));
        }
        assert_eq!(Format::from_path(Path::new("asset.txt")), None);
    }

    #[test]
    fn list_through_both_formats() {
        let values = vec![1u32, 2, 3];
        for format in [Format::Binary, Format::Text] {
            let bytes = encode(&values, format).unwrap();
            assert_eq!(decode::<Vec<u32>>(&bytes, format).unwrap(), values);
        }
    }
}
