//! # RedLilium Serialize
//!
//! Contract-driven object graph serialization over pluggable token streams.
//!
//! ## Reflection
//!
//! - [`Reflect`]: Object-safe view of a reflected instance (derive it)
//! - [`TypeDescriptor`] / [`MemberDescriptor`]: Registration data per type
//! - [`Marker`]: Serializable / include / exclude / read-only / rename
//! - [`FieldValue`]: Conversion of field types to and from [`Value`]
//! - [`Poly`]: Member declared as a base type, holding a derived instance
//!
//! ## Contracts
//!
//! - [`Contract`]: Ordered serializable members of a type
//! - [`Member`]: Uniform get/set access to one member
//! - [`ContractRegistry`]: Thread-safe contract cache and name resolution
//!
//! ## Streams
//!
//! - [`TokenWriter`] / [`TokenReader`]: Token protocol
//! - [`BinaryWriter`] / [`BinaryReader`]: Compact tagged binary
//! - [`TextWriter`] / [`TextReader`]: RON text
//! - [`transcode`]: Copy a token stream between backends
//!
//! ## Graphs
//!
//! - [`GraphSerializer`]: Writes and reads object graphs by contract
//! - [`MethodRef`]: Late-bound method reference, resolved after load
//! - [`SerializationCallbacks`]: Before-serialize and after-load hooks
//! - [`AssetPipeline`]: Atomic file save and extension-based load
//!
//! ```ignore
//! #[derive(Reflect, Clone, Default)]
//! #[reflect(serializable)]
//! struct Point {
//!     pub x: i32,
//!     pub y: i32,
//! }
//!
//! let bytes = encode(&Point { x: 3, y: 4 }, Format::Binary)?;
//! let point: Point = decode(&bytes, Format::Binary)?;
//! ```

extern crate self as redlilium_serialize;

pub mod config;
mod contract;
mod decimal;
mod error;
mod field;
pub mod format;
mod graph;
pub mod late_bound;
mod pipeline;
mod poly;
pub mod reflect;
mod registry;
pub mod token;
mod value;

pub use config::{OutputConfig, PipelineConfig, load_config, load_or_default};
pub use contract::{Access, Category, Contract, Member};
pub use decimal::{Decimal, ParseDecimalError};
pub use error::{ResolutionFailure, SerializeError};
pub use field::{FieldValue, object_from_value};
pub use format::{Format, decode, encode};
pub use graph::{GraphSerializer, LoadReport, Loaded};
pub use late_bound::{
    Invocable, LoadContext, MethodHandle, MethodRef, SerializationCallbacks,
};
pub use pipeline::AssetPipeline;
pub use poly::Poly;
pub use reflect::{
    BaseLink, Marker, MemberDescriptor, Reflect, SlotAccess, TypeDescriptor, TypeRef, Visibility,
    find_marker, markers,
};
pub use registry::ContractRegistry;
pub use serialize_macro::{EnumField, Reflect};
pub use token::binary::{BinaryReader, BinaryWriter};
pub use token::text::{TextReader, TextStyle, TextWriter};
pub use token::{
    MAX_NESTING_DEPTH, ObjectHeader, Token, TokenKind, TokenReader, TokenWriter, transcode,
};
pub use value::{ScalarKind, Value};
