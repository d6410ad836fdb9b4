//! A single serializable member of a contract.

use std::fmt;

use crate::error::SerializeError;
use crate::reflect::{
    BaseLink, MarkerKind, MemberDescriptor, MemberShape, Reflect, TypeDescriptor, TypeRef,
    find_marker, markers,
};
use crate::value::Value;

/// Classification of a member's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Scalar,
    Object,
    Array,
    /// Synthetic member standing for one slot of an array.
    ArrayElement,
}

impl Category {
    fn of(declared: &TypeRef) -> Self {
        match declared {
            TypeRef::Scalar(_) => Self::Scalar,
            TypeRef::Object(_) => Self::Object,
            TypeRef::List(_) | TypeRef::NativeArray(..) => Self::Array,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    fn from_flags(read: bool, write: bool) -> Option<Self> {
        match (read, write) {
            (true, true) => Some(Self::ReadWrite),
            (true, false) => Some(Self::Read),
            (false, true) => Some(Self::Write),
            (false, false) => None,
        }
    }

    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

#[derive(Clone)]
enum Binding {
    Declared {
        descriptor: &'static MemberDescriptor,
        /// Base projections from the contract's type to the declaring type.
        via: Vec<BaseLink>,
    },
    Element {
        index: usize,
    },
}

/// Uniform read/write access to one member of an instance.
#[derive(Clone)]
pub struct Member {
    name: String,
    wire_name: String,
    owner: &'static str,
    declared_type: TypeRef,
    element_type: Option<TypeRef>,
    category: Category,
    access: Access,
    binding: Binding,
}

impl Member {
    /// Build from a declared member of `owner`.
    ///
    /// Returns `None` for members without any usable accessor.
    pub(crate) fn declared(
        owner: &'static TypeDescriptor,
        descriptor: &'static MemberDescriptor,
        via: Vec<BaseLink>,
    ) -> Option<Self> {
        let declared_type = descriptor.declared()?;
        let (read, write) = match descriptor.shape() {
            MemberShape::Slot(_) => (true, true),
            MemberShape::Accessor(pair) => (pair.get.is_some(), pair.set.is_some()),
            MemberShape::Opaque => return None,
        };
        let read_only = find_marker::<markers::ReadOnly>(descriptor.markers()).is_some();
        let access = Access::from_flags(read, write && !read_only)?;
        let wire_name = find_marker::<markers::Rename>(descriptor.markers())
            .unwrap_or(descriptor.name())
            .to_owned();

        Some(Self {
            name: descriptor.name().to_owned(),
            wire_name,
            owner: owner.name(),
            element_type: declared_type.element(),
            category: Category::of(&declared_type),
            declared_type,
            access,
            binding: Binding::Declared { descriptor, via },
        })
    }

    /// Synthetic member for slot `index` of an array whose elements are `element_type`.
    pub fn array_element(index: usize, element_type: TypeRef) -> Self {
        let name = format!("[{index}]");
        Self {
            wire_name: name.clone(),
            name,
            owner: "array",
            element_type: element_type.element(),
            declared_type: element_type,
            category: Category::ArrayElement,
            access: Access::ReadWrite,
            binding: Binding::Element { index },
        }
    }

    /// Logical name (the declared field name, or `[i]` for elements).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name used on the wire; differs from [`name`](Self::name) when renamed.
    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    /// Name of the type that declares this member.
    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn declared_type(&self) -> TypeRef {
        self.declared_type
    }

    /// Element type when the declared type is an array.
    pub fn element_type(&self) -> Option<TypeRef> {
        self.element_type
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Whether the member is inherited through the base chain.
    pub fn is_inherited(&self) -> bool {
        matches!(&self.binding, Binding::Declared { via, .. } if !via.is_empty())
    }

    /// Look up a marker attached at registration.
    pub fn get_marker<M: MarkerKind>(&self) -> Option<M::Payload> {
        match &self.binding {
            Binding::Declared { descriptor, .. } => find_marker::<M>(descriptor.markers()),
            Binding::Element { .. } => None,
        }
    }

    fn denied(&self, operation: &'static str) -> SerializeError {
        SerializeError::AccessDenied {
            member: self.name.clone(),
            owner: self.owner,
            operation,
        }
    }

    fn not_an_object_member(&self) -> SerializeError {
        SerializeError::TypeMismatch {
            expected: "object member".into(),
            found: format!("array slot {}", self.name),
        }
    }

    fn project<'a>(
        &self,
        via: &[BaseLink],
        instance: &'a dyn Reflect,
    ) -> Result<&'a dyn Reflect, SerializeError> {
        let found = instance.descriptor().name();
        let mut current = instance;
        for link in via {
            current = (link.project)(current).ok_or_else(|| SerializeError::TypeMismatch {
                expected: self.owner.to_owned(),
                found: found.to_owned(),
            })?;
        }
        Ok(current)
    }

    fn project_mut<'a>(
        &self,
        via: &[BaseLink],
        instance: &'a mut dyn Reflect,
    ) -> Result<&'a mut dyn Reflect, SerializeError> {
        let found = instance.descriptor().name();
        let mut current = instance;
        for link in via {
            current = match (link.project_mut)(current) {
                Some(next) => next,
                None => {
                    return Err(SerializeError::TypeMismatch {
                        expected: self.owner.to_owned(),
                        found: found.to_owned(),
                    });
                }
            };
        }
        Ok(current)
    }

    /// Read the member's current value from `instance`.
    pub fn get(&self, instance: &dyn Reflect) -> Result<Value, SerializeError> {
        if !self.access.can_read() {
            return Err(self.denied("read"));
        }
        let Binding::Declared { descriptor, via } = &self.binding else {
            return Err(self.not_an_object_member());
        };
        let target = self.project(via, instance)?;
        match descriptor.shape() {
            MemberShape::Slot(slot) => (slot.get)(target),
            MemberShape::Accessor(pair) => match pair.get {
                Some(get) => get(target),
                None => Err(self.denied("read")),
            },
            MemberShape::Opaque => Err(self.denied("read")),
        }
    }

    /// Move the member's value out of `instance`.
    ///
    /// Field-backed members are left holding their default; accessor members
    /// are read as by [`get`](Self::get).
    pub fn take(&self, instance: &mut dyn Reflect) -> Result<Value, SerializeError> {
        if !self.access.can_read() {
            return Err(self.denied("read"));
        }
        let Binding::Declared { descriptor, via } = &self.binding else {
            return Err(self.not_an_object_member());
        };
        match descriptor.shape() {
            MemberShape::Slot(slot) => (slot.take)(self.project_mut(via, instance)?),
            _ => self.get(instance),
        }
    }

    /// Assign `value` to the member of `instance` and hand the instance back.
    pub fn set(
        &self,
        mut instance: Box<dyn Reflect>,
        value: Value,
    ) -> Result<Box<dyn Reflect>, SerializeError> {
        self.assign(instance.as_mut(), value)?;
        Ok(instance)
    }

    /// Assign `value` to the member of `instance` in place.
    pub(crate) fn assign(
        &self,
        instance: &mut dyn Reflect,
        value: Value,
    ) -> Result<(), SerializeError> {
        if !self.access.can_write() {
            return Err(self.denied("write"));
        }
        let Binding::Declared { descriptor, via } = &self.binding else {
            return Err(self.not_an_object_member());
        };
        let target = self.project_mut(via, instance)?;
        match descriptor.shape() {
            MemberShape::Slot(slot) => (slot.set)(target, value),
            MemberShape::Accessor(pair) => match pair.set {
                Some(set) => set(target, value),
                None => Err(self.denied("write")),
            },
            MemberShape::Opaque => Err(self.denied("write")),
        }
    }

    /// Whether the member is backed by a field rather than accessor functions.
    pub fn is_field(&self) -> bool {
        match &self.binding {
            Binding::Declared { descriptor, .. } => {
                matches!(descriptor.shape(), MemberShape::Slot(_))
            }
            Binding::Element { .. } => false,
        }
    }

    /// Visit reflected instances stored in this member of `instance`.
    ///
    /// Only field-backed members are visited; accessor members own no storage
    /// and have to be read and written back instead.
    pub fn visit_objects(
        &self,
        instance: &mut dyn Reflect,
        visitor: &mut dyn FnMut(&mut dyn Reflect),
    ) {
        let Binding::Declared { descriptor, via } = &self.binding else {
            return;
        };
        let MemberShape::Slot(slot) = descriptor.shape() else {
            return;
        };
        if let Ok(target) = self.project_mut(via, instance) {
            (slot.visit)(target, visitor);
        }
    }

    /// Move this slot's value out of `items`, leaving Null behind.
    pub fn take_element(&self, items: &mut [Value]) -> Result<Value, SerializeError> {
        let Binding::Element { index } = self.binding else {
            return Err(self.denied("element read"));
        };
        let len = items.len();
        items
            .get_mut(index)
            .map(std::mem::take)
            .ok_or_else(|| SerializeError::TypeMismatch {
                expected: format!("index {index} in bounds"),
                found: format!("Array(len {len})"),
            })
    }

    /// Store `value` at this slot, appending when the slot is one past the end.
    pub fn set_element(
        &self,
        mut items: Vec<Value>,
        value: Value,
    ) -> Result<Vec<Value>, SerializeError> {
        let Binding::Element { index } = self.binding else {
            return Err(self.denied("element write"));
        };
        match index.cmp(&items.len()) {
            std::cmp::Ordering::Less => items[index] = value,
            std::cmp::Ordering::Equal => items.push(value),
            std::cmp::Ordering::Greater => {
                return Err(SerializeError::TypeMismatch {
                    expected: format!("index {index} at most {}", items.len()),
                    found: format!("Array(len {})", items.len()),
                });
            }
        }
        Ok(items)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("wire_name", &self.wire_name)
            .field("owner", &self.owner)
            .field("declared_type", &self.declared_type)
            .field("category", &self.category)
            .field("access", &self.access)
            .finish()
    }
}
