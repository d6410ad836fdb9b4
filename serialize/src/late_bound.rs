//! Post-load callbacks and late-bound method references.
//!
//! A [`MethodRef`] names a method by `(type name, method name)` and, once
//! resolved against a [`ContractRegistry`], carries a callable handle. Only
//! the names are serialized; after a load the graph serializer runs every
//! loaded instance's after-load hook, which is where a `MethodRef` looks its
//! handle up again. A failed lookup is reported, not raised: the reference
//! stays unresolved and the rest of the graph loads normally.

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::error::{ResolutionFailure, SerializeError};
use crate::field::{FieldValue, object_from_value};
use crate::reflect::{
    Marker, MemberDescriptor, Reflect, TypeDescriptor, TypeRef, Visibility, downcast_owner,
    downcast_owner_mut,
};
use crate::registry::ContractRegistry;
use crate::value::Value;

/// A registered method, callable with dynamic arguments.
pub type Invocable = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// What a post-load hook can see.
pub struct LoadContext<'r> {
    registry: &'r ContractRegistry,
}

impl<'r> LoadContext<'r> {
    pub fn new(registry: &'r ContractRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r ContractRegistry {
        self.registry
    }

    pub fn resolve_method(&self, type_name: &str, method_name: &str) -> Option<Invocable> {
        self.registry.resolve_method(type_name, method_name)
    }
}

/// Serialization callbacks for a reflected type.
///
/// Enable with `#[reflect(callbacks)]` on a derived type.
pub trait SerializationCallbacks {
    /// Runs on the value about to be written, before its members are read.
    fn before_serialize(&mut self) {}

    /// Runs once the whole graph has been loaded.
    fn after_load(&mut self, _ctx: &LoadContext<'_>) -> Result<(), ResolutionFailure> {
        Ok(())
    }
}

/// Type-erased adapter for [`SerializationCallbacks::before_serialize`].
pub fn before_serialize_hook<T: Reflect + SerializationCallbacks>(owner: &mut dyn Reflect) {
    if let Some(this) = owner.downcast_mut::<T>() {
        this.before_serialize();
    }
}

/// Type-erased adapter for [`SerializationCallbacks::after_load`].
pub fn after_load_hook<T: Reflect + SerializationCallbacks>(
    owner: &mut dyn Reflect,
    ctx: &LoadContext<'_>,
) -> Result<(), ResolutionFailure> {
    match owner.downcast_mut::<T>() {
        Some(this) => this.after_load(ctx),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// MethodRef
// ---------------------------------------------------------------------------

/// A resolved method reference.
#[derive(Clone)]
pub struct MethodHandle {
    type_name: String,
    method_name: String,
    invoke: Invocable,
}

impl MethodHandle {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn invoke(&self, args: &[Value]) -> Value {
        (self.invoke)(args)
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodHandle({}::{})", self.type_name, self.method_name)
    }
}

/// Serializable reference to a registered method.
///
/// Serialized as an object with `type` and `method` string members. The
/// default value is an unresolved reference with empty names.
#[derive(Clone)]
pub enum MethodRef {
    Unresolved {
        type_name: String,
        method_name: String,
    },
    Resolved(MethodHandle),
}

impl Default for MethodRef {
    fn default() -> Self {
        Self::unresolved("", "")
    }
}

impl MethodRef {
    pub fn unresolved(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::Unresolved {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Look the method up now; `None` if it is not registered.
    pub fn bind(registry: &ContractRegistry, type_name: &str, method_name: &str) -> Option<Self> {
        let invoke = registry.resolve_method(type_name, method_name)?;
        Some(Self::Resolved(MethodHandle {
            type_name: type_name.to_owned(),
            method_name: method_name.to_owned(),
            invoke,
        }))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Unresolved { type_name, .. } => type_name,
            Self::Resolved(handle) => &handle.type_name,
        }
    }

    pub fn method_name(&self) -> &str {
        match self {
            Self::Unresolved { method_name, .. } => method_name,
            Self::Resolved(handle) => &handle.method_name,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn handle(&self) -> Option<&MethodHandle> {
        match self {
            Self::Resolved(handle) => Some(handle),
            Self::Unresolved { .. } => None,
        }
    }

    /// Call the method; `None` while unresolved.
    pub fn invoke(&self, args: &[Value]) -> Option<Value> {
        self.handle().map(|handle| handle.invoke(args))
    }

    /// Re-resolve against the registry in `ctx`.
    ///
    /// On failure the reference is left unresolved.
    pub fn resolve(&mut self, ctx: &LoadContext<'_>) -> Result<(), ResolutionFailure> {
        let (type_name, method_name) = (self.type_name().to_owned(), self.method_name().to_owned());
        match ctx.resolve_method(&type_name, &method_name) {
            Some(invoke) => {
                *self = Self::Resolved(MethodHandle {
                    type_name,
                    method_name,
                    invoke,
                });
                Ok(())
            }
            None => {
                *self = Self::Unresolved {
                    type_name: type_name.clone(),
                    method_name: method_name.clone(),
                };
                let reason = if ctx.registry().resolve_type(&type_name).is_some() {
                    "no such method registered"
                } else {
                    "type not registered"
                };
                Err(ResolutionFailure {
                    type_name,
                    member_name: method_name,
                    reason: reason.to_owned(),
                })
            }
        }
    }

    fn rename(&mut self, type_name: Option<String>, method_name: Option<String>) {
        let type_name = type_name.unwrap_or_else(|| self.type_name().to_owned());
        let method_name = method_name.unwrap_or_else(|| self.method_name().to_owned());
        *self = Self::Unresolved {
            type_name,
            method_name,
        };
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_resolved() {
            "resolved"
        } else {
            "unresolved"
        };
        write!(
            f,
            "MethodRef({}::{}, {state})",
            self.type_name(),
            self.method_name()
        )
    }
}

impl SerializationCallbacks for MethodRef {
    fn after_load(&mut self, ctx: &LoadContext<'_>) -> Result<(), ResolutionFailure> {
        self.resolve(ctx)
    }
}

fn get_type_name(owner: &dyn Reflect) -> Result<Value, SerializeError> {
    let this = downcast_owner::<MethodRef>(owner)?;
    Ok(Value::String(this.type_name().to_owned()))
}

fn set_type_name(owner: &mut dyn Reflect, value: Value) -> Result<(), SerializeError> {
    let name = String::from_value(value)?;
    downcast_owner_mut::<MethodRef>(owner)?.rename(Some(name), None);
    Ok(())
}

fn get_method_name(owner: &dyn Reflect) -> Result<Value, SerializeError> {
    let this = downcast_owner::<MethodRef>(owner)?;
    Ok(Value::String(this.method_name().to_owned()))
}

fn set_method_name(owner: &mut dyn Reflect, value: Value) -> Result<(), SerializeError> {
    let name = String::from_value(value)?;
    downcast_owner_mut::<MethodRef>(owner)?.rename(None, Some(name));
    Ok(())
}

impl Reflect for MethodRef {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: LazyLock<TypeDescriptor> = LazyLock::new(|| {
            TypeDescriptor::builder::<MethodRef>("MethodRef")
                .marker(Marker::Serializable)
                .member(MemberDescriptor::accessor(
                    "type",
                    Visibility::Public,
                    String::type_ref,
                    Some(get_type_name),
                    Some(set_type_name),
                ))
                .member(MemberDescriptor::accessor(
                    "method",
                    Visibility::Public,
                    String::type_ref,
                    Some(get_method_name),
                    Some(set_method_name),
                ))
                .after_load(after_load_hook::<MethodRef>)
                .build()
        });
        &DESCRIPTOR
    }

    fn descriptor(&self) -> &'static TypeDescriptor {
        Self::type_descriptor()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    fn clone_reflect(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }
}

impl FieldValue for MethodRef {
    fn type_ref() -> TypeRef {
        TypeRef::Object(Self::type_descriptor)
    }

    fn to_value(&self) -> Value {
        Value::Object(Box::new(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, SerializeError> {
        object_from_value(value)
    }

    fn take_value(&mut self) -> Value {
        Value::Object(Box::new(std::mem::take(self)))
    }

    fn visit_objects_mut(&mut self, visitor: &mut dyn FnMut(&mut dyn Reflect)) {
        visitor(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_greet() -> ContractRegistry {
        let registry = ContractRegistry::new();
        registry.register_method("Greeter", "greet", |args: &[Value]| match args {
            [Value::String(name)] => Value::String(format!("hello {name}")),
            _ => Value::Null,
        });
        registry
    }

    #[test]
    fn bind_and_invoke() {
        let registry = registry_with_greet();
        let method = MethodRef::bind(&registry, "Greeter", "greet").unwrap();
        assert!(method.is_resolved());
        let result = method.invoke(&[Value::String("world".into())]).unwrap();
        assert!(matches!(result, Value::String(s) if s == "hello world"));
    }

    #[test]
    fn resolve_failure_leaves_reference_unresolved() {
        let registry = registry_with_greet();
        let ctx = LoadContext::new(&registry);
        let mut method = MethodRef::unresolved("Greeter", "wave");
        let failure = method.resolve(&ctx).unwrap_err();
        assert_eq!(failure.member_name, "wave");
        assert!(!method.is_resolved());
        assert!(method.invoke(&[]).is_none());
    }

    #[test]
    fn renaming_drops_the_handle() {
        let registry = registry_with_greet();
        let mut method = MethodRef::bind(&registry, "Greeter", "greet").unwrap();
        set_method_name(&mut method, Value::String("other".into())).unwrap();
        assert!(!method.is_resolved());
        assert_eq!(method.type_name(), "Greeter");
        assert_eq!(method.method_name(), "other");
    }
}
