//! Error types for object graph serialization.

use std::fmt;
use std::io;

/// Errors that can occur while writing or reading an object graph.
#[derive(Debug)]
pub enum SerializeError {
    /// Read of a write-only member, or write of a read-only member.
    AccessDenied {
        member: String,
        owner: &'static str,
        operation: &'static str,
    },
    /// The token stream did not contain the expected token kind.
    TokenMismatch {
        expected: &'static str,
        found: String,
    },
    /// A polymorphic type id on the stream could not be resolved.
    UnknownType { type_name: String },
    /// An in-memory value did not match its declared type.
    TypeMismatch { expected: String, found: String },
    /// Attempted to write an object whose type is not serializable.
    NotSerializable { type_name: &'static str },
    /// The stream is structurally invalid (bad discriminant, bad UTF-8,
    /// tokens out of grammar order, ...).
    Malformed(String),
    /// The underlying sink or source failed.
    Io(io::Error),
    /// A failure that happened while processing a nested member.
    InMember {
        path: String,
        source: Box<SerializeError>,
    },
}

impl SerializeError {
    pub(crate) fn mismatch(expected: &'static str, found: impl fmt::Debug) -> Self {
        Self::TokenMismatch {
            expected,
            found: format!("{found:?}"),
        }
    }

    /// Attach a member name to this error, extending an existing path.
    ///
    /// Element slots (`[3]`) are appended without a separating dot.
    pub fn in_member(self, member: &str) -> Self {
        match self {
            Self::InMember { path, source } => {
                let path = if path.starts_with('[') {
                    format!("{member}{path}")
                } else {
                    format!("{member}.{path}")
                };
                Self::InMember { path, source }
            }
            other => Self::InMember {
                path: member.to_owned(),
                source: Box::new(other),
            },
        }
    }

    /// The member path the error occurred at, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::InMember { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The underlying error with any member path context stripped.
    pub fn root_cause(&self) -> &SerializeError {
        match self {
            Self::InMember { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessDenied {
                member,
                owner,
                operation,
            } => {
                write!(f, "member '{owner}.{member}' does not allow {operation}")
            }
            Self::TokenMismatch { expected, found } => {
                write!(f, "token mismatch: expected {expected}, found {found}")
            }
            Self::UnknownType { type_name } => {
                write!(f, "unknown type '{type_name}'")
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Self::NotSerializable { type_name } => {
                write!(f, "type '{type_name}' is not serializable")
            }
            Self::Malformed(msg) => write!(f, "malformed stream: {msg}"),
            Self::Io(err) => write!(f, "i/o failure: {err}"),
            Self::InMember { path, source } => write!(f, "at '{path}': {source}"),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::InMember { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for SerializeError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// A late-bound reference that could not be re-resolved after a load.
///
/// Not fatal: the load completes and the reference stays unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub type_name: String,
    pub member_name: String,
    pub reason: String,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not resolve '{}::{}': {}",
            self.type_name, self.member_name, self.reason
        )
    }
}

impl std::error::Error for ResolutionFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_path_accumulates_outwards() {
        let err = SerializeError::UnknownType {
            type_name: "Ghost".into(),
        }
        .in_member("radius")
        .in_member("[2]")
        .in_member("shapes");

        assert_eq!(err.path(), Some("shapes[2].radius"));
        assert!(matches!(
            err.root_cause(),
            SerializeError::UnknownType { type_name } if type_name == "Ghost"
        ));
        assert_eq!(
            err.to_string(),
            "at 'shapes[2].radius': unknown type 'Ghost'"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: SerializeError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, SerializeError::Io(_)));
    }
}
