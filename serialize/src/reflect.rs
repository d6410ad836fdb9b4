//! Runtime type descriptors for reflected types.
//!
//! The [`Reflect`] trait is the object-safe view of an instance the
//! serializer works with. Each reflected type owns exactly one
//! [`TypeDescriptor`], registered lazily in a static by
//! `#[derive(Reflect)]` or built by hand with [`TypeDescriptor::builder`].
//!
//! A descriptor is pure registration data: what the type declares. The
//! serializable shape derived from it (member filtering, base chain
//! flattening, wire names) lives in [`Contract`](crate::Contract).
//!
//! # Manual registration
//!
//! ```ignore
//! impl Reflect for Marker {
//!     fn type_descriptor() -> &'static TypeDescriptor {
//!         static DESCRIPTOR: LazyLock<TypeDescriptor> = LazyLock::new(|| {
//!             TypeDescriptor::builder::<Marker>("Marker")
//!                 .marker(Marker::Serializable)
//!                 .member(MemberDescriptor::accessor("label", ...))
//!                 .build()
//!         });
//!         &DESCRIPTOR
//!     }
//!     // ...
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;

use crate::error::{ResolutionFailure, SerializeError};
use crate::late_bound::LoadContext;
use crate::value::{ScalarKind, Value};

// ---------------------------------------------------------------------------
// Reflect
// ---------------------------------------------------------------------------

/// Object-safe access to a reflected instance.
///
/// Use `#[derive(Reflect)]` to implement it. The derive requires
/// `Clone + Default` and a named-field (or unit) struct without generics.
pub trait Reflect: Any + Send + Sync {
    /// The descriptor of this type.
    fn type_descriptor() -> &'static TypeDescriptor
    where
        Self: Sized;

    /// The descriptor of the instance's runtime type.
    fn descriptor(&self) -> &'static TypeDescriptor;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Deep copy into a new heap allocation.
    fn clone_reflect(&self) -> Box<dyn Reflect>;
}

impl dyn Reflect {
    pub fn is<T: Reflect>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl fmt::Debug for dyn Reflect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.descriptor().name())
    }
}

/// Downcast a member owner, reporting a [`SerializeError::TypeMismatch`].
pub fn downcast_owner<T: Reflect>(owner: &dyn Reflect) -> Result<&T, SerializeError> {
    let found = owner.descriptor().name();
    owner
        .downcast_ref::<T>()
        .ok_or_else(|| SerializeError::TypeMismatch {
            expected: T::type_descriptor().name().to_owned(),
            found: found.to_owned(),
        })
}

/// Mutable counterpart of [`downcast_owner`].
pub fn downcast_owner_mut<T: Reflect>(owner: &mut dyn Reflect) -> Result<&mut T, SerializeError> {
    let found = owner.descriptor().name();
    owner
        .downcast_mut::<T>()
        .ok_or_else(|| SerializeError::TypeMismatch {
            expected: T::type_descriptor().name().to_owned(),
            found: found.to_owned(),
        })
}

/// Take ownership of a boxed instance as its concrete type.
pub fn downcast_box<T: Reflect>(boxed: Box<dyn Reflect>) -> Result<Box<T>, SerializeError> {
    let found = boxed.descriptor().name();
    boxed
        .into_any()
        .downcast::<T>()
        .map_err(|_| SerializeError::TypeMismatch {
            expected: T::type_descriptor().name().to_owned(),
            found: found.to_owned(),
        })
}

fn construct_default<T: Reflect + Default>() -> Box<dyn Reflect> {
    Box::new(T::default())
}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Declarative configuration attached to a type or member at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Type opts in to serialization without deriving from an element type.
    Serializable,
    /// Non-public member opts in to serialization.
    Include,
    /// Member opts out of serialization.
    Exclude,
    /// Member is written but never assigned on load.
    ReadOnly,
    /// Member uses a different name on the wire.
    Rename(&'static str),
}

/// A kind of [`Marker`] that can be looked up by type.
pub trait MarkerKind {
    type Payload;

    fn extract(marker: &Marker) -> Option<Self::Payload>;
}

/// Marker kinds for [`find_marker`] and `Member::get_marker`.
pub mod markers {
    use super::{Marker, MarkerKind};

    pub struct Serializable;
    pub struct Include;
    pub struct Exclude;
    pub struct ReadOnly;
    pub struct Rename;

    macro_rules! flag_marker {
        ($kind:ident) => {
            impl MarkerKind for $kind {
                type Payload = ();

                fn extract(marker: &Marker) -> Option<()> {
                    matches!(marker, Marker::$kind).then_some(())
                }
            }
        };
    }

    flag_marker!(Serializable);
    flag_marker!(Include);
    flag_marker!(Exclude);
    flag_marker!(ReadOnly);

    impl MarkerKind for Rename {
        type Payload = &'static str;

        fn extract(marker: &Marker) -> Option<&'static str> {
            match marker {
                Marker::Rename(name) => Some(name),
                _ => None,
            }
        }
    }
}

/// Find the first marker of kind `M` in a marker list.
pub fn find_marker<M: MarkerKind>(markers: &[Marker]) -> Option<M::Payload> {
    markers.iter().find_map(M::extract)
}

// ---------------------------------------------------------------------------
// TypeRef
// ---------------------------------------------------------------------------

/// The statically declared type of a member or root value.
///
/// Object and element types are resolved through function pointers so
/// self-referential types can be described.
#[derive(Clone, Copy)]
pub enum TypeRef {
    Scalar(ScalarKind),
    Object(fn() -> &'static TypeDescriptor),
    /// Growable ordered list (`Vec<T>`).
    List(fn() -> TypeRef),
    /// Fixed-length native array (`[T; N]`).
    NativeArray(fn() -> TypeRef, usize),
}

impl TypeRef {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::List(_) | Self::NativeArray(..))
    }

    pub fn element(&self) -> Option<TypeRef> {
        match self {
            Self::List(element) | Self::NativeArray(element, _) => Some(element()),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&'static TypeDescriptor> {
        match self {
            Self::Object(descriptor) => Some(descriptor()),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Scalar(kind) => kind.name().to_owned(),
            Self::Object(descriptor) => descriptor().name().to_owned(),
            Self::List(element) => format!("List<{}>", element().describe()),
            Self::NativeArray(element, len) => format!("[{}; {len}]", element().describe()),
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

// ---------------------------------------------------------------------------
// Member descriptors
// ---------------------------------------------------------------------------

pub type GetFn = fn(&dyn Reflect) -> Result<Value, SerializeError>;
pub type SetFn = fn(&mut dyn Reflect, Value) -> Result<(), SerializeError>;
pub type TakeFn = fn(&mut dyn Reflect) -> Result<Value, SerializeError>;
pub type VisitFn = fn(&mut dyn Reflect, &mut dyn FnMut(&mut dyn Reflect));
pub type ProjectFn = fn(&dyn Reflect) -> Option<&dyn Reflect>;
pub type ProjectMutFn = fn(&mut dyn Reflect) -> Option<&mut dyn Reflect>;
pub type BeforeSerializeFn = fn(&mut dyn Reflect);
pub type AfterLoadFn = fn(&mut dyn Reflect, &LoadContext<'_>) -> Result<(), ResolutionFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Accessors for a member stored directly in a field.
#[derive(Clone, Copy)]
pub struct SlotAccess {
    pub get: GetFn,
    pub set: SetFn,
    /// Moves the field's value out, leaving a default behind.
    pub take: TakeFn,
    /// Visits reflected instances stored in the field.
    pub visit: VisitFn,
}

/// A getter/setter pair; either side may be missing.
#[derive(Clone, Copy)]
pub struct AccessorPair {
    pub get: Option<GetFn>,
    pub set: Option<SetFn>,
}

#[derive(Clone, Copy)]
pub enum MemberShape {
    Slot(SlotAccess),
    Accessor(AccessorPair),
    /// Declared, but carries no accessor (excluded or non-serializable storage).
    Opaque,
}

/// Registration data for one declared member.
#[derive(Clone)]
pub struct MemberDescriptor {
    name: &'static str,
    visibility: Visibility,
    declared: Option<fn() -> TypeRef>,
    markers: Vec<Marker>,
    shape: MemberShape,
}

impl MemberDescriptor {
    pub fn slot(
        name: &'static str,
        visibility: Visibility,
        declared: fn() -> TypeRef,
        access: SlotAccess,
    ) -> Self {
        Self {
            name,
            visibility,
            declared: Some(declared),
            markers: Vec::new(),
            shape: MemberShape::Slot(access),
        }
    }

    pub fn accessor(
        name: &'static str,
        visibility: Visibility,
        declared: fn() -> TypeRef,
        get: Option<GetFn>,
        set: Option<SetFn>,
    ) -> Self {
        Self {
            name,
            visibility,
            declared: Some(declared),
            markers: Vec::new(),
            shape: MemberShape::Accessor(AccessorPair { get, set }),
        }
    }

    pub fn opaque(name: &'static str, visibility: Visibility) -> Self {
        Self {
            name,
            visibility,
            declared: None,
            markers: Vec::new(),
            shape: MemberShape::Opaque,
        }
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn declared(&self) -> Option<TypeRef> {
        self.declared.map(|declared| declared())
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn shape(&self) -> &MemberShape {
        &self.shape
    }
}

// ---------------------------------------------------------------------------
// TypeDescriptor
// ---------------------------------------------------------------------------

/// Link from a derived type to the base value it embeds.
#[derive(Clone, Copy)]
pub struct BaseLink {
    pub descriptor: fn() -> &'static TypeDescriptor,
    pub project: ProjectFn,
    pub project_mut: ProjectMutFn,
}

/// Registration data for one reflected type.
pub struct TypeDescriptor {
    name: &'static str,
    type_id: TypeId,
    construct: fn() -> Box<dyn Reflect>,
    markers: Vec<Marker>,
    element: bool,
    base: Option<BaseLink>,
    members: Vec<MemberDescriptor>,
    before_serialize: Option<BeforeSerializeFn>,
    after_load: Option<AfterLoadFn>,
}

impl TypeDescriptor {
    /// Start describing `T`, published on the wire as `name`.
    pub fn builder<T: Reflect + Default>(name: &'static str) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            descriptor: TypeDescriptor {
                name,
                type_id: TypeId::of::<T>(),
                construct: construct_default::<T>,
                markers: Vec::new(),
                element: false,
                base: None,
                members: Vec::new(),
                before_serialize: None,
                after_load: None,
            },
        }
    }

    /// Wire name of the type (used as the polymorphic type id).
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Whether the type itself declares that it derives from the engine's
    /// base element type.
    pub fn is_element(&self) -> bool {
        self.element
    }

    pub fn base(&self) -> Option<&BaseLink> {
        self.base.as_ref()
    }

    pub fn base_descriptor(&self) -> Option<&'static TypeDescriptor> {
        self.base.map(|link| (link.descriptor)())
    }

    /// Declared members, in declaration order, excluding base members.
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    pub fn before_serialize_hook(&self) -> Option<BeforeSerializeFn> {
        self.before_serialize
    }

    pub fn after_load_hook(&self) -> Option<AfterLoadFn> {
        self.after_load
    }

    /// Construct a blank (default) instance.
    pub fn construct(&self) -> Box<dyn Reflect> {
        (self.construct)()
    }

    pub fn same_type(&self, other: &TypeDescriptor) -> bool {
        self.type_id == other.type_id
    }

    /// Whether `ancestor` is this type or appears on its base chain.
    pub fn derives_from(&self, ancestor: &TypeDescriptor) -> bool {
        let mut current = Some(self);
        while let Some(descriptor) = current {
            if descriptor.same_type(ancestor) {
                return true;
            }
            current = descriptor.base_descriptor();
        }
        false
    }

    /// Whether this type or any base carries the element flag.
    pub fn extends_element(&self) -> bool {
        let mut current = Some(self);
        while let Some(descriptor) = current {
            if descriptor.element {
                return true;
            }
            current = descriptor.base_descriptor();
        }
        false
    }

    /// View `instance` (of this type) as its embedded `target` base value.
    pub fn upcast<'a>(
        &self,
        instance: &'a dyn Reflect,
        target: &TypeDescriptor,
    ) -> Option<&'a dyn Reflect> {
        if self.same_type(target) {
            return Some(instance);
        }
        let link = self.base?;
        let base = (link.project)(instance)?;
        (link.descriptor)().upcast(base, target)
    }

    /// Mutable counterpart of [`upcast`](Self::upcast).
    pub fn upcast_mut<'a>(
        &self,
        instance: &'a mut dyn Reflect,
        target: &TypeDescriptor,
    ) -> Option<&'a mut dyn Reflect> {
        if self.same_type(target) {
            return Some(instance);
        }
        let link = self.base?;
        let base = (link.project_mut)(instance)?;
        (link.descriptor)().upcast_mut(base, target)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("element", &self.element)
            .field("markers", &self.markers)
            .field("base", &self.base_descriptor().map(|b| b.name))
            .field(
                "members",
                &self.members.iter().map(|m| m.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder returned by [`TypeDescriptor::builder`].
pub struct TypeDescriptorBuilder {
    descriptor: TypeDescriptor,
}

impl TypeDescriptorBuilder {
    pub fn marker(mut self, marker: Marker) -> Self {
        self.descriptor.markers.push(marker);
        self
    }

    /// Declare that the type derives from the engine's base element type.
    pub fn element(mut self) -> Self {
        self.descriptor.element = true;
        self
    }

    pub fn base(mut self, link: BaseLink) -> Self {
        self.descriptor.base = Some(link);
        self
    }

    pub fn member(mut self, member: MemberDescriptor) -> Self {
        self.descriptor.members.push(member);
        self
    }

    pub fn before_serialize(mut self, hook: BeforeSerializeFn) -> Self {
        self.descriptor.before_serialize = Some(hook);
        self
    }

    pub fn after_load(mut self, hook: AfterLoadFn) -> Self {
        self.descriptor.after_load = Some(hook);
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}
