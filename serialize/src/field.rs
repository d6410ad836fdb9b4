//! Conversion between Rust field types and the dynamic [`Value`] model.
//!
//! `#[derive(Reflect)]` generates member accessors that go through
//! [`FieldValue`]: the getter calls [`to_value`](FieldValue::to_value), the
//! setter [`from_value`](FieldValue::from_value), and the declared type
//! recorded in the member descriptor is [`type_ref`](FieldValue::type_ref).
//!
//! # Adding a custom field type
//!
//! ```ignore
//! impl FieldValue for AssetPath {
//!     fn type_ref() -> TypeRef {
//!         TypeRef::Scalar(ScalarKind::String)
//!     }
//!
//!     fn to_value(&self) -> Value {
//!         Value::String(self.0.clone())
//!     }
//!
//!     fn from_value(value: Value) -> Result<Self, SerializeError> {
//!         String::from_value(value).map(AssetPath)
//!     }
//! }
//! ```

use crate::decimal::Decimal;
use crate::error::SerializeError;
use crate::reflect::{Reflect, TypeRef, downcast_box};
use crate::value::{ScalarKind, Value};

/// A type that can be stored in a serializable member.
pub trait FieldValue: Sized + Send + Sync + 'static {
    /// The declared type recorded for members of this type.
    fn type_ref() -> TypeRef;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, SerializeError>;

    /// Move the value out, leaving a default behind.
    ///
    /// The write path calls this on its own copy of the graph. Defaults to
    /// [`to_value`](FieldValue::to_value).
    fn take_value(&mut self) -> Value {
        self.to_value()
    }

    /// Visit every reflected instance stored in this value.
    ///
    /// Used by the post-load pass; scalars have nothing to visit.
    fn visit_objects_mut(&mut self, _visitor: &mut dyn FnMut(&mut dyn Reflect)) {}
}

fn value_mismatch(expected: TypeRef, found: &Value) -> SerializeError {
    SerializeError::TypeMismatch {
        expected: expected.describe(),
        found: found.kind_name(),
    }
}

/// Take a `Value::Object` holding exactly a `T`.
///
/// Used by derived [`FieldValue`] impls for reflected structs.
pub fn object_from_value<T: Reflect>(value: Value) -> Result<T, SerializeError> {
    match value {
        Value::Object(instance) => downcast_box::<T>(instance).map(|boxed| *boxed),
        other => Err(SerializeError::TypeMismatch {
            expected: T::type_descriptor().name().to_owned(),
            found: other.kind_name(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

macro_rules! scalar_field {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn type_ref() -> TypeRef {
                    TypeRef::Scalar(ScalarKind::$kind)
                }

                fn to_value(&self) -> Value {
                    Value::$kind(self.clone())
                }

                fn from_value(value: Value) -> Result<Self, SerializeError> {
                    match value {
                        Value::$kind(v) => Ok(v),
                        other => Err(value_mismatch(Self::type_ref(), &other)),
                    }
                }

                fn take_value(&mut self) -> Value {
                    Value::$kind(std::mem::take(self))
                }
            }
        )*
    };
}

scalar_field! {
    bool => Bool,
    char => Char,
    String => String,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

/// `None` is written as a Null token; the declared type is the inner type.
impl<T: FieldValue> FieldValue for Option<T> {
    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, SerializeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn take_value(&mut self) -> Value {
        match self {
            Some(inner) => inner.take_value(),
            None => Value::Null,
        }
    }

    fn visit_objects_mut(&mut self, visitor: &mut dyn FnMut(&mut dyn Reflect)) {
        if let Some(inner) = self {
            inner.visit_objects_mut(visitor);
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::List(T::type_ref)
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, SerializeError> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(value_mismatch(Self::type_ref(), &other)),
        }
    }

    fn take_value(&mut self) -> Value {
        let items = std::mem::take(self);
        Value::Array(items.into_iter().map(|mut item| item.take_value()).collect())
    }

    fn visit_objects_mut(&mut self, visitor: &mut dyn FnMut(&mut dyn Reflect)) {
        for item in self {
            item.visit_objects_mut(visitor);
        }
    }
}

impl<T: FieldValue, const N: usize> FieldValue for [T; N] {
    fn type_ref() -> TypeRef {
        TypeRef::NativeArray(T::type_ref, N)
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, SerializeError> {
        let Value::Array(items) = value else {
            return Err(value_mismatch(Self::type_ref(), &value));
        };
        let found = items.len();
        let items = items
            .into_iter()
            .map(T::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        items.try_into().map_err(|_| SerializeError::TypeMismatch {
            expected: Self::type_ref().describe(),
            found: format!("Array(len {found})"),
        })
    }

    fn take_value(&mut self) -> Value {
        Value::Array(self.iter_mut().map(FieldValue::take_value).collect())
    }

    fn visit_objects_mut(&mut self, visitor: &mut dyn FnMut(&mut dyn Reflect)) {
        for item in self {
            item.visit_objects_mut(visitor);
        }
    }
}
