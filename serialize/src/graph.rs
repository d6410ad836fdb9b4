//! Contract-driven object graph serializer.
//!
//! [`GraphSerializer`] walks a value against its declared [`TypeRef`] and
//! drives a [`TokenWriter`] or [`TokenReader`]:
//!
//! - Null is always a single Null token, whatever the declared type.
//! - Arrays carry their length up front; elements are written against the
//!   array's element type.
//! - Objects are written with their runtime type's contract. When the
//!   runtime type differs from the declared type, the object header carries
//!   the runtime type name; on load that name is resolved through the
//!   [`ContractRegistry`].
//! - Unknown and read-only members found on load are skipped, so older
//!   readers can load newer data.
//!
//! After a successful read the serializer walks the loaded graph once and
//! runs each instance's after-load hooks (this is where late-bound
//! references resolve). Hook failures are logged and collected into a
//! [`LoadReport`]; they never fail the load.

use crate::contract::{Category, Member};
use crate::error::{ResolutionFailure, SerializeError};
use crate::field::FieldValue;
use crate::late_bound::LoadContext;
use crate::reflect::{Reflect, TypeDescriptor, TypeRef};
use crate::registry::ContractRegistry;
use crate::token::{MAX_NESTING_DEPTH, TokenReader, TokenWriter, too_deep};
use crate::value::{ScalarKind, Value};

/// Upper bound on up-front element allocation, whatever length the stream claims.
const MAX_PREALLOCATED_ELEMENTS: usize = 1 << 16;

/// What happened during a load besides producing the value.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Number of object instances constructed.
    pub constructed: usize,
    /// Late-bound references that could not be re-resolved.
    pub unresolved: Vec<ResolutionFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// A loaded value together with its [`LoadReport`].
#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    pub report: LoadReport,
}

fn found(reader: &mut dyn TokenReader) -> String {
    match reader.peek_kind() {
        Ok(Some(kind)) => kind.name().to_owned(),
        Ok(None) => "end of stream".to_owned(),
        Err(err) => format!("unreadable token ({err})"),
    }
}

fn expected_token(expected: &'static str, reader: &mut dyn TokenReader) -> SerializeError {
    SerializeError::TokenMismatch {
        expected,
        found: found(reader),
    }
}

pub struct GraphSerializer<'r> {
    registry: &'r ContractRegistry,
}

impl GraphSerializer<'static> {
    /// A serializer over the process-wide registry.
    pub fn global() -> Self {
        Self::new(ContractRegistry::global())
    }
}

impl<'r> GraphSerializer<'r> {
    pub fn new(registry: &'r ContractRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r ContractRegistry {
        self.registry
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Write `root` and flush the writer.
    ///
    /// `root` is copied once; members are then moved out of that copy as
    /// they are written.
    pub fn serialize<T: FieldValue>(
        &self,
        writer: &mut dyn TokenWriter,
        root: &T,
    ) -> Result<(), SerializeError> {
        self.serialize_value(writer, root.to_value(), T::type_ref())
    }

    /// Write a dynamic value against `declared` and flush the writer.
    pub fn serialize_value(
        &self,
        writer: &mut dyn TokenWriter,
        root: Value,
        declared: TypeRef,
    ) -> Result<(), SerializeError> {
        self.write_value(writer, root, declared)?;
        writer.flush()
    }

    /// Read one value of type `T`, discarding the load report.
    pub fn deserialize<T: FieldValue>(
        &self,
        reader: &mut dyn TokenReader,
    ) -> Result<T, SerializeError> {
        self.deserialize_reported(reader).map(|loaded| loaded.value)
    }

    /// Read one value of type `T` and report unresolved references.
    pub fn deserialize_reported<T: FieldValue>(
        &self,
        reader: &mut dyn TokenReader,
    ) -> Result<Loaded<T>, SerializeError> {
        let loaded = self.deserialize_value(reader, T::type_ref())?;
        Ok(Loaded {
            value: T::from_value(loaded.value)?,
            report: loaded.report,
        })
    }

    /// Read one dynamic value against `declared`, running post-load hooks.
    pub fn deserialize_value(
        &self,
        reader: &mut dyn TokenReader,
        declared: TypeRef,
    ) -> Result<Loaded<Value>, SerializeError> {
        let mut report = LoadReport::default();
        let mut value = self.read_value(reader, declared, &mut report)?;
        let ctx = LoadContext::new(self.registry);
        self.notify_value(&mut value, &ctx, &mut report);
        Ok(Loaded { value, report })
    }

    // -----------------------------------------------------------------------
    // Write
    // -----------------------------------------------------------------------

    /// Write one value without flushing.
    pub fn write_value(
        &self,
        writer: &mut dyn TokenWriter,
        value: Value,
        declared: TypeRef,
    ) -> Result<(), SerializeError> {
        if value.is_null() {
            return writer.write_null();
        }
        match declared {
            TypeRef::List(_) | TypeRef::NativeArray(..) => {
                self.write_array(writer, value, declared)
            }
            TypeRef::Object(descriptor) => self.write_object(writer, value, descriptor()),
            TypeRef::Scalar(kind) => write_scalar(writer, value, kind),
        }
    }

    fn write_array(
        &self,
        writer: &mut dyn TokenWriter,
        value: Value,
        declared: TypeRef,
    ) -> Result<(), SerializeError> {
        let (Value::Array(mut items), Some(element)) = (value, declared.element()) else {
            return Err(SerializeError::TypeMismatch {
                expected: declared.describe(),
                found: "a non-array value".into(),
            });
        };
        if matches!(declared, TypeRef::NativeArray(_, len) if len != items.len()) {
            return Err(SerializeError::TypeMismatch {
                expected: declared.describe(),
                found: format!("Array(len {})", items.len()),
            });
        }

        writer.write_array_start(items.len())?;
        for index in 0..items.len() {
            let slot = Member::array_element(index, element);
            let item = slot.take_element(&mut items)?;
            self.write_value(writer, item, element)
                .map_err(|err| err.in_member(slot.name()))?;
        }
        writer.write_array_end()
    }

    fn write_object(
        &self,
        writer: &mut dyn TokenWriter,
        value: Value,
        declared: &'static TypeDescriptor,
    ) -> Result<(), SerializeError> {
        let mut instance = match value {
            Value::Object(instance) => instance,
            other => {
                return Err(SerializeError::TypeMismatch {
                    expected: declared.name().to_owned(),
                    found: other.kind_name(),
                });
            }
        };
        let runtime = instance.descriptor();
        if !runtime.derives_from(declared) {
            return Err(SerializeError::TypeMismatch {
                expected: format!("{} or a derived type", declared.name()),
                found: runtime.name().to_owned(),
            });
        }
        let contract = self.registry.get_or_build(runtime);
        if !contract.is_serializable() {
            return Err(SerializeError::NotSerializable {
                type_name: runtime.name(),
            });
        }

        contract.before_serialize(instance.as_mut());

        let type_id = (!runtime.same_type(declared)).then(|| runtime.name());
        let members: Vec<&Member> = contract
            .members()
            .iter()
            .filter(|m| m.access().can_read())
            .collect();
        // Accessors may compute from fields, so they are read before any
        // field is moved out.
        let mut computed = Vec::with_capacity(members.len());
        for member in &members {
            if member.is_field() {
                computed.push(None);
            } else {
                let value = member
                    .get(instance.as_ref())
                    .map_err(|err| err.in_member(member.name()))?;
                computed.push(Some(value));
            }
        }

        writer.write_object_start(type_id)?;
        for (member, value) in members.into_iter().zip(computed) {
            writer.write_property_name(member.wire_name())?;
            let value = match value {
                Some(value) => value,
                None => member
                    .take(instance.as_mut())
                    .map_err(|err| err.in_member(member.name()))?,
            };
            self.write_value(writer, value, member.declared_type())
                .map_err(|err| err.in_member(member.name()))?;
        }
        writer.write_object_end()
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    /// Read one value without running post-load hooks.
    ///
    /// Streams nesting objects or arrays deeper than [`MAX_NESTING_DEPTH`]
    /// fail with [`SerializeError::Malformed`].
    pub fn read_value(
        &self,
        reader: &mut dyn TokenReader,
        declared: TypeRef,
        report: &mut LoadReport,
    ) -> Result<Value, SerializeError> {
        self.read_nested(reader, declared, report, 0)
    }

    /// `depth` counts the containers already open around this value.
    fn read_nested(
        &self,
        reader: &mut dyn TokenReader,
        declared: TypeRef,
        report: &mut LoadReport,
        depth: usize,
    ) -> Result<Value, SerializeError> {
        if reader.read_null()? {
            return Ok(Value::Null);
        }
        if depth >= MAX_NESTING_DEPTH && !matches!(declared, TypeRef::Scalar(_)) {
            return Err(too_deep());
        }
        match declared {
            TypeRef::List(_) | TypeRef::NativeArray(..) => {
                self.read_array(reader, declared, report, depth + 1)
            }
            TypeRef::Object(descriptor) => {
                self.read_object(reader, descriptor(), report, depth + 1)
            }
            TypeRef::Scalar(kind) => read_scalar(reader, kind),
        }
    }

    fn read_array(
        &self,
        reader: &mut dyn TokenReader,
        declared: TypeRef,
        report: &mut LoadReport,
        depth: usize,
    ) -> Result<Value, SerializeError> {
        let Some(element) = declared.element() else {
            return Err(SerializeError::TypeMismatch {
                expected: "an array type".into(),
                found: declared.describe(),
            });
        };
        let Some(len) = reader.read_array_start()? else {
            return Err(expected_token("ArrayStart", reader));
        };
        if matches!(declared, TypeRef::NativeArray(_, expected) if expected != len) {
            return Err(SerializeError::TypeMismatch {
                expected: declared.describe(),
                found: format!("Array(len {len})"),
            });
        }

        let mut items = Vec::with_capacity(len.min(MAX_PREALLOCATED_ELEMENTS));
        for index in 0..len {
            let slot = Member::array_element(index, element);
            let item = self
                .read_nested(reader, element, report, depth)
                .map_err(|err| err.in_member(slot.name()))?;
            items = slot.set_element(items, item)?;
        }
        if !reader.read_array_end()? {
            return Err(expected_token("ArrayEnd", reader));
        }
        Ok(Value::Array(items))
    }

    fn read_object(
        &self,
        reader: &mut dyn TokenReader,
        declared: &'static TypeDescriptor,
        report: &mut LoadReport,
        depth: usize,
    ) -> Result<Value, SerializeError> {
        let Some(header) = reader.read_object_start()? else {
            return Err(expected_token("ObjectStart", reader));
        };
        let descriptor = match header.type_id {
            Some(type_name) => {
                let Some(resolved) = self.registry.resolve_type(&type_name) else {
                    return Err(SerializeError::UnknownType { type_name });
                };
                if !resolved.derives_from(declared) {
                    return Err(SerializeError::TypeMismatch {
                        expected: format!("{} or a derived type", declared.name()),
                        found: type_name,
                    });
                }
                resolved
            }
            None => declared,
        };
        let contract = self.registry.get_or_build(descriptor);
        if !contract.is_serializable() {
            return Err(SerializeError::NotSerializable {
                type_name: descriptor.name(),
            });
        }

        let mut instance = descriptor.construct();
        report.constructed += 1;

        while let Some(name) = reader.read_property_name()? {
            match contract.member(&name) {
                Some(member) if member.access().can_write() => {
                    let value = self
                        .read_nested(reader, member.declared_type(), report, depth)
                        .map_err(|err| err.in_member(member.name()))?;
                    instance = member
                        .set(instance, value)
                        .map_err(|err| err.in_member(member.name()))?;
                }
                Some(member) => {
                    log::debug!(
                        "skipping read-only member '{}.{}'",
                        descriptor.name(),
                        member.name()
                    );
                    reader.skip().map_err(|err| err.in_member(&name))?;
                }
                None => {
                    log::debug!("skipping unknown member '{}.{name}'", descriptor.name());
                    reader.skip().map_err(|err| err.in_member(&name))?;
                }
            }
        }
        if !reader.read_object_end()? {
            return Err(expected_token("ObjectEnd", reader));
        }
        Ok(Value::Object(instance))
    }

    // -----------------------------------------------------------------------
    // Post-load
    // -----------------------------------------------------------------------

    fn notify_value(&self, value: &mut Value, ctx: &LoadContext<'_>, report: &mut LoadReport) {
        match value {
            Value::Object(instance) => self.notify_instance(instance.as_mut(), ctx, report),
            Value::Array(items) => {
                for item in items {
                    self.notify_value(item, ctx, report);
                }
            }
            _ => {}
        }
    }

    /// Run hooks on `instance`, then on every instance it holds, in load order.
    fn notify_instance(
        &self,
        instance: &mut dyn Reflect,
        ctx: &LoadContext<'_>,
        report: &mut LoadReport,
    ) {
        let contract = self.registry.get_or_build(instance.descriptor());
        for failure in contract.after_load(instance, ctx) {
            log::warn!("{failure}");
            report.unresolved.push(failure);
        }
        for member in contract.members().iter().filter(|m| m.access().can_write()) {
            if member.is_field() {
                member.visit_objects(instance, &mut |child| {
                    self.notify_instance(child, ctx, report);
                });
            } else if member.access().can_read()
                && matches!(member.category(), Category::Object | Category::Array)
            {
                self.notify_accessor(member, instance, ctx, report);
            }
        }
    }

    /// Accessor members own no storage, so their value is read out, notified
    /// and written back.
    fn notify_accessor(
        &self,
        member: &Member,
        instance: &mut dyn Reflect,
        ctx: &LoadContext<'_>,
        report: &mut LoadReport,
    ) {
        let mut value = match member.get(&*instance) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("post-load: cannot read '{}': {err}", member.name());
                return;
            }
        };
        if value.is_null() {
            return;
        }
        self.notify_value(&mut value, ctx, report);
        if let Err(err) = member.assign(instance, value) {
            log::warn!("post-load: cannot write back '{}': {err}", member.name());
        }
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

fn write_scalar(
    writer: &mut dyn TokenWriter,
    value: Value,
    kind: ScalarKind,
) -> Result<(), SerializeError> {
    match (kind, value) {
        (ScalarKind::Bool, Value::Bool(v)) => writer.write_bool(v),
        (ScalarKind::Char, Value::Char(v)) => writer.write_char(v),
        (ScalarKind::String, Value::String(v)) => writer.write_string(&v),
        (ScalarKind::I8, Value::I8(v)) => writer.write_i8(v),
        (ScalarKind::I16, Value::I16(v)) => writer.write_i16(v),
        (ScalarKind::I32, Value::I32(v)) => writer.write_i32(v),
        (ScalarKind::I64, Value::I64(v)) => writer.write_i64(v),
        (ScalarKind::U8, Value::U8(v)) => writer.write_u8(v),
        (ScalarKind::U16, Value::U16(v)) => writer.write_u16(v),
        (ScalarKind::U32, Value::U32(v)) => writer.write_u32(v),
        (ScalarKind::U64, Value::U64(v)) => writer.write_u64(v),
        (ScalarKind::F32, Value::F32(v)) => writer.write_f32(v),
        (ScalarKind::F64, Value::F64(v)) => writer.write_f64(v),
        (ScalarKind::Decimal, Value::Decimal(v)) => writer.write_decimal(v),
        (kind, other) => Err(SerializeError::TypeMismatch {
            expected: kind.name().to_owned(),
            found: other.kind_name(),
        }),
    }
}

fn read_scalar(reader: &mut dyn TokenReader, kind: ScalarKind) -> Result<Value, SerializeError> {
    let value = match kind {
        ScalarKind::Bool => reader.read_bool()?.map(Value::Bool),
        ScalarKind::Char => reader.read_char()?.map(Value::Char),
        ScalarKind::String => reader.read_string()?.map(Value::String),
        ScalarKind::I8 => reader.read_i8()?.map(Value::I8),
        ScalarKind::I16 => reader.read_i16()?.map(Value::I16),
        ScalarKind::I32 => reader.read_i32()?.map(Value::I32),
        ScalarKind::I64 => reader.read_i64()?.map(Value::I64),
        ScalarKind::U8 => reader.read_u8()?.map(Value::U8),
        ScalarKind::U16 => reader.read_u16()?.map(Value::U16),
        ScalarKind::U32 => reader.read_u32()?.map(Value::U32),
        ScalarKind::U64 => reader.read_u64()?.map(Value::U64),
        ScalarKind::F32 => reader.read_f32()?.map(Value::F32),
        ScalarKind::F64 => reader.read_f64()?.map(Value::F64),
        ScalarKind::Decimal => reader.read_decimal()?.map(Value::Decimal),
    };
    value.ok_or_else(|| expected_token(kind.name(), reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;
    use crate::token::binary::{BinaryReader, BinaryWriter};

    #[test]
    fn scalar_root_round_trip() {
        let serializer = GraphSerializer::new(ContractRegistry::global());
        let mut writer = BinaryWriter::new(Vec::new());
        serializer.serialize(&mut writer, &-17i16).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes, [5, 0xEF, 0xFF]);

        let mut reader = BinaryReader::new(bytes.as_slice());
        assert_eq!(serializer.deserialize::<i16>(&mut reader).unwrap(), -17);
    }

    #[test]
    fn scalar_kind_mismatch_reports_found_token() {
        let serializer = GraphSerializer::global();
        let bytes = [6u8, 1, 0, 0, 0];
        let mut reader = BinaryReader::new(&bytes[..]);
        let err = serializer.deserialize::<i64>(&mut reader).unwrap_err();
        match err {
            SerializeError::TokenMismatch { expected, found } => {
                assert_eq!(expected, TokenKind::I64.name());
                assert_eq!(found, "Int32");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn null_root_for_option() {
        let serializer = GraphSerializer::global();
        let mut writer = BinaryWriter::new(Vec::new());
        serializer.serialize(&mut writer, &Option::<String>::None).unwrap();
        assert_eq!(writer.get_ref().as_slice(), [0]);
    }
}
