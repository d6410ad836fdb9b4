//! Polymorphic references.
//!
//! A [`Poly<T>`] member is declared as `T` but may hold an instance of any
//! reflected type whose base chain reaches `T`. When the runtime type
//! differs from `T`, the serializer writes the runtime type name on the
//! object header and resolves it again on load.

use std::fmt;
use std::marker::PhantomData;

use crate::error::SerializeError;
use crate::field::FieldValue;
use crate::reflect::{Reflect, TypeDescriptor, TypeRef};
use crate::value::Value;

/// Owned instance of `T` or of a type derived from `T`.
pub struct Poly<T: Reflect> {
    inner: Box<dyn Reflect>,
    _declared: PhantomData<fn() -> T>,
}

impl<T: Reflect> Poly<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Box::new(value),
            _declared: PhantomData,
        }
    }

    /// Wrap a value of a derived type.
    ///
    /// Fails with [`SerializeError::TypeMismatch`] if `U` does not derive from `T`.
    pub fn from_derived<U: Reflect>(value: U) -> Result<Self, SerializeError> {
        Self::from_boxed(Box::new(value))
    }

    pub fn from_boxed(inner: Box<dyn Reflect>) -> Result<Self, SerializeError> {
        let runtime = inner.descriptor();
        let declared = T::type_descriptor();
        if !runtime.derives_from(declared) {
            return Err(SerializeError::TypeMismatch {
                expected: format!("{} or a derived type", declared.name()),
                found: runtime.name().to_owned(),
            });
        }
        Ok(Self {
            inner,
            _declared: PhantomData,
        })
    }

    /// Descriptor of the instance's runtime type.
    pub fn runtime_descriptor(&self) -> &'static TypeDescriptor {
        self.inner.descriptor()
    }

    pub fn is<U: Reflect>(&self) -> bool {
        self.inner.is::<U>()
    }

    pub fn downcast_ref<U: Reflect>(&self) -> Option<&U> {
        self.inner.downcast_ref::<U>()
    }

    pub fn downcast_mut<U: Reflect>(&mut self) -> Option<&mut U> {
        self.inner.downcast_mut::<U>()
    }

    /// View the instance as its declared type.
    pub fn declared(&self) -> Option<&T> {
        self.runtime_descriptor()
            .upcast(self.inner.as_ref(), T::type_descriptor())?
            .downcast_ref::<T>()
    }

    pub fn declared_mut(&mut self) -> Option<&mut T> {
        let runtime = self.runtime_descriptor();
        runtime
            .upcast_mut(self.inner.as_mut(), T::type_descriptor())?
            .downcast_mut::<T>()
    }

    pub fn as_reflect(&self) -> &dyn Reflect {
        self.inner.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn Reflect> {
        self.inner
    }
}

impl<T: Reflect> Clone for Poly<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_reflect(),
            _declared: PhantomData,
        }
    }
}

impl<T: Reflect> fmt::Debug for Poly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Poly<{}>({})",
            T::type_descriptor().name(),
            self.runtime_descriptor().name()
        )
    }
}

impl<T: Reflect> FieldValue for Poly<T> {
    fn type_ref() -> TypeRef {
        TypeRef::Object(T::type_descriptor)
    }

    fn to_value(&self) -> Value {
        Value::Object(self.inner.clone_reflect())
    }

    fn from_value(value: Value) -> Result<Self, SerializeError> {
        match value {
            Value::Object(inner) => Self::from_boxed(inner),
            other => Err(SerializeError::TypeMismatch {
                expected: T::type_descriptor().name().to_owned(),
                found: other.kind_name(),
            }),
        }
    }

    fn take_value(&mut self) -> Value {
        Value::Object(std::mem::replace(
            &mut self.inner,
            T::type_descriptor().construct(),
        ))
    }

    fn visit_objects_mut(&mut self, visitor: &mut dyn FnMut(&mut dyn Reflect)) {
        visitor(self.inner.as_mut());
    }
}
