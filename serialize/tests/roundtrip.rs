//! Object graph round trips through both token backends.

use std::any::Any;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use redlilium_serialize::format::{decode_with, encode_with};
use redlilium_serialize::reflect::{downcast_owner, downcast_owner_mut};
use redlilium_serialize::{
    BinaryReader, BinaryWriter, ContractRegistry, Decimal, EnumField, FieldValue, Format,
    GraphSerializer, LoadContext, Loaded, Marker, MemberDescriptor, MethodRef, Poly, Reflect,
    ResolutionFailure, SerializationCallbacks, SerializeError, TextReader, TextStyle,
    TokenWriter, TypeDescriptor, TypeRef, Value, Visibility, decode, encode, object_from_value,
};
use rstest::rstest;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Point {
    pub x: i32,
    pub y: i32,
}

/// A later revision of `Point` with extra members an older reader does not know.
#[derive(Reflect, Clone, Default, Debug)]
#[reflect(serializable)]
struct PointV2 {
    pub x: i32,
    pub history: Vec<Point>,
    pub meta: Option<Shape>,
    pub y: i32,
    pub note: String,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Shape {
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Circle {
    #[reflect(base)]
    shape: Shape,
    pub radius: f32,
}

#[derive(EnumField, Clone, Copy, Default, Debug, PartialEq)]
enum Blend {
    #[default]
    Opaque,
    Additive,
    Multiply,
}

#[derive(Reflect, Clone, Default, Debug)]
#[reflect(serializable)]
struct Drawing {
    pub shapes: Vec<Poly<Shape>>,
    pub origin: Option<Point>,
    pub grid: [u8; 3],
    pub scale: Decimal,
    pub blend: Blend,
    pub label: Option<String>,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Bag {
    pub items: Option<Vec<i32>>,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Scalars {
    pub flag: bool,
    pub letter: char,
    pub tiny: i8,
    pub small: i16,
    pub byte: u8,
    pub word: u16,
    pub count: u32,
    pub big: u64,
    pub ratio: f32,
    pub precise: f64,
    pub money: Decimal,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Counter {
    pub value: u32,
    #[reflect(read_only)]
    pub computed: u32,
}

#[derive(Reflect, Clone, Default, Debug)]
#[reflect(serializable)]
struct Button {
    pub label: String,
    pub on_click: Option<MethodRef>,
}

/// Hand-registered type exposing its handler only through accessor functions.
#[derive(Clone, Default, Debug)]
struct Trigger {
    handler: Option<MethodRef>,
}

fn get_handler(owner: &dyn Reflect) -> Result<Value, SerializeError> {
    Ok(downcast_owner::<Trigger>(owner)?.handler.to_value())
}

fn set_handler(owner: &mut dyn Reflect, value: Value) -> Result<(), SerializeError> {
    downcast_owner_mut::<Trigger>(owner)?.handler = FieldValue::from_value(value)?;
    Ok(())
}

impl Reflect for Trigger {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: LazyLock<TypeDescriptor> = LazyLock::new(|| {
            TypeDescriptor::builder::<Trigger>("Trigger")
                .marker(Marker::Serializable)
                .member(MemberDescriptor::accessor(
                    "handler",
                    Visibility::Public,
                    <Option<MethodRef> as FieldValue>::type_ref,
                    Some(get_handler),
                    Some(set_handler),
                ))
                .build()
        });
        &DESCRIPTOR
    }

    fn descriptor(&self) -> &'static TypeDescriptor {
        Self::type_descriptor()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_reflect(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }
}

impl FieldValue for Trigger {
    fn type_ref() -> TypeRef {
        TypeRef::Object(Self::type_descriptor)
    }

    fn to_value(&self) -> Value {
        Value::Object(Box::new(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, SerializeError> {
        object_from_value(value)
    }

    fn visit_objects_mut(&mut self, visitor: &mut dyn FnMut(&mut dyn Reflect)) {
        visitor(self);
    }
}

#[derive(Reflect, Clone, Default, Debug)]
#[reflect(serializable, callbacks)]
struct Stats {
    pub samples: Vec<i64>,
    pub checksum: i64,
    loaded: bool,
}

impl SerializationCallbacks for Stats {
    fn before_serialize(&mut self) {
        self.checksum = self.samples.iter().sum();
    }

    fn after_load(&mut self, _ctx: &LoadContext<'_>) -> Result<(), ResolutionFailure> {
        self.loaded = true;
        Ok(())
    }
}

fn circle(name: &str, radius: f32) -> Circle {
    Circle {
        shape: Shape {
            name: name.into(),
            tags: vec!["round".into()],
        },
        radius,
    }
}

fn round_trip<T: FieldValue>(serializer: &GraphSerializer<'_>, value: &T, format: Format) -> T {
    let bytes = encode_with(serializer, value, format, &TextStyle::default()).unwrap();
    decode_with(serializer, &bytes, format).unwrap()
}

fn load_reported<T: FieldValue>(
    serializer: &GraphSerializer<'_>,
    bytes: &[u8],
    format: Format,
) -> Loaded<T> {
    match format {
        Format::Binary => serializer
            .deserialize_reported(&mut BinaryReader::new(bytes))
            .unwrap(),
        Format::Text => {
            let mut reader = TextReader::parse(std::str::from_utf8(bytes).unwrap()).unwrap();
            serializer.deserialize_reported(&mut reader).unwrap()
        }
    }
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_point_round_trip(#[case] format: Format) {
    let bytes = encode(&Point { x: 3, y: 4 }, format).unwrap();
    let point: Point = decode(&bytes, format).unwrap();
    assert_eq!(point, Point { x: 3, y: 4 });
}

#[test]
fn test_point_binary_layout() {
    let bytes = encode(&Point { x: 3, y: 4 }, Format::Binary).unwrap();
    assert_eq!(
        bytes,
        [
            16, 0, 15, 1, 0, 0, 0, b'x', 6, 3, 0, 0, 0, 15, 1, 0, 0, 0, b'y', 6, 4, 0, 0, 0, 17
        ]
    );
}

#[test]
fn test_point_text_layout() {
    let bytes = encode(&Point { x: 3, y: 4 }, Format::Text).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("\"x\": 3"), "{text}");
    assert!(text.contains("\"y\": 4"), "{text}");
    assert!(!text.contains("$type"), "{text}");
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_scalar_members(#[case] format: Format) {
    let registry = ContractRegistry::new();
    let serializer = GraphSerializer::new(&registry);
    let scalars = Scalars {
        flag: true,
        letter: 'λ',
        tiny: -8,
        small: -1234,
        byte: 200,
        word: 60_000,
        count: 4_000_000_000,
        big: 1 << 40,
        ratio: 0.25,
        precise: -1.5e-3,
        money: "1999.95".parse().unwrap(),
    };
    assert_eq!(round_trip(&serializer, &scalars, format), scalars);
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_polymorphic_members(#[case] format: Format) {
    let registry = ContractRegistry::new();
    registry.register::<Circle>();
    let serializer = GraphSerializer::new(&registry);

    let drawing = Drawing {
        shapes: vec![
            Poly::new(Shape {
                name: "plain".into(),
                tags: Vec::new(),
            }),
            Poly::from_derived(circle("disc", 2.0)).unwrap(),
        ],
        origin: Some(Point { x: -1, y: 1 }),
        grid: [1, 2, 3],
        scale: Decimal::new(125, 2).unwrap(),
        blend: Blend::Multiply,
        label: None,
    };
    let loaded = round_trip(&serializer, &drawing, format);

    assert_eq!(loaded.shapes.len(), 2);
    assert!(loaded.shapes[0].is::<Shape>());
    assert_eq!(loaded.shapes[0].declared().unwrap().name, "plain");

    let disc = loaded.shapes[1].downcast_ref::<Circle>().unwrap();
    assert_eq!(disc, &circle("disc", 2.0));
    assert_eq!(loaded.shapes[1].declared().unwrap().name, "disc");

    assert_eq!(loaded.origin, Some(Point { x: -1, y: 1 }));
    assert_eq!(loaded.grid, [1, 2, 3]);
    assert_eq!(loaded.scale.to_string(), "1.25");
    assert_eq!(loaded.blend, Blend::Multiply);
    assert_eq!(loaded.label, None);
}

#[test]
fn test_type_id_written_only_when_runtime_type_differs() {
    let registry = ContractRegistry::new();
    let serializer = GraphSerializer::new(&registry);
    let drawing = Drawing {
        shapes: vec![Poly::from_derived(circle("c", 1.0)).unwrap()],
        ..Drawing::default()
    };

    let bytes = encode_with(&serializer, &drawing, Format::Text, &TextStyle::default()).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text.matches("$type").count(), 1, "{text}");
    assert!(text.contains("\"Circle\""), "{text}");
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_list_null_empty_and_filled(
    #[case] format: Format,
    #[values(None, Some(vec![]), Some(vec![7]), Some(vec![1, 2, 3]))] items: Option<Vec<i32>>,
) {
    let registry = ContractRegistry::new();
    let serializer = GraphSerializer::new(&registry);
    let bag = Bag { items };
    assert_eq!(round_trip(&serializer, &bag, format), bag);
}

#[test]
fn test_null_member_is_a_single_token() {
    let bytes = encode(&Bag { items: None }, Format::Binary).unwrap();
    let mut expected = vec![16, 0, 15, 5, 0, 0, 0];
    expected.extend_from_slice(b"items");
    expected.extend_from_slice(&[0, 17]);
    assert_eq!(bytes, expected);
}

#[test]
fn test_native_array_length_is_checked_on_read() {
    #[derive(Reflect, Clone, Default)]
    #[reflect(serializable, name = "Grid")]
    struct Wide {
        pub grid: [u8; 4],
    }
    #[derive(Reflect, Clone, Default, Debug)]
    #[reflect(serializable, name = "Grid")]
    struct Narrow {
        pub grid: [u8; 3],
    }

    let bytes = encode(&Wide { grid: [1, 2, 3, 4] }, Format::Binary).unwrap();
    let err = decode::<Narrow>(&bytes, Format::Binary).unwrap_err();
    assert_eq!(err.path(), Some("grid"));
    assert!(matches!(err.root_cause(), SerializeError::TypeMismatch { .. }));
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Small {
    pub v: i8,
    pub w: u32,
}

#[rstest]
#[case::too_big(r#"{"v": 300, "w": 1}"#, "v")]
#[case::negative_unsigned(r#"{"v": 1, "w": -1}"#, "w")]
#[case::fractional(r#"{"v": 1.5, "w": 1}"#, "v")]
#[case::float_out_of_range(r#"{"v": 1, "w": 1.0e12}"#, "w")]
fn test_text_numbers_must_fit_the_member(#[case] text: &str, #[case] member: &str) {
    let err = decode::<Small>(text.as_bytes(), Format::Text).unwrap_err();
    assert_eq!(err.path(), Some(member));
    assert!(
        matches!(err.root_cause(), SerializeError::TypeMismatch { .. }),
        "{err}"
    );
}

#[test]
fn test_text_whole_floats_load_as_integers() {
    let small: Small = decode(br#"{"v": -2.0, "w": 7}"#, Format::Text).unwrap();
    assert_eq!(small, Small { v: -2, w: 7 });
}

static LEAF_CLONES: AtomicUsize = AtomicUsize::new(0);

#[derive(Reflect, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Leaf {
    pub id: i32,
}

impl Clone for Leaf {
    fn clone(&self) -> Self {
        LEAF_CLONES.fetch_add(1, Ordering::Relaxed);
        Self { id: self.id }
    }
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Branch {
    pub leaves: Vec<Leaf>,
}

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Trunk {
    pub branch: Branch,
    pub spare: Option<Branch>,
}

#[test]
fn test_writing_copies_the_graph_once() {
    let branch = || Branch {
        leaves: (0..4).map(|id| Leaf { id }).collect(),
    };
    let trunk = Trunk {
        branch: branch(),
        spare: Some(branch()),
    };

    LEAF_CLONES.store(0, Ordering::Relaxed);
    let bytes = encode(&trunk, Format::Binary).unwrap();
    assert_eq!(LEAF_CLONES.load(Ordering::Relaxed), 8);

    let loaded: Trunk = decode(&bytes, Format::Binary).unwrap();
    assert_eq!(loaded.branch.leaves[3].id, 3);
    assert_eq!(loaded.spare.unwrap().leaves.len(), 4);
}

// ---------------------------------------------------------------------------
// Nesting limits
// ---------------------------------------------------------------------------

#[derive(Reflect, Clone, Default, Debug, PartialEq)]
#[reflect(serializable)]
struct Tree {
    pub children: Vec<Tree>,
}

fn chain(depth: usize) -> Tree {
    let mut tree = Tree::default();
    for _ in 0..depth {
        tree = Tree {
            children: vec![tree],
        };
    }
    tree
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_nested_graph_round_trip(#[case] format: Format) {
    let tree = chain(40);
    let bytes = encode(&tree, format).unwrap();
    assert_eq!(decode::<Tree>(&bytes, format).unwrap(), tree);
}

#[test]
fn test_runaway_nesting_is_malformed() {
    let mut writer = BinaryWriter::new(Vec::new());
    for _ in 0..100_000 {
        writer.write_object_start(None).unwrap();
        writer.write_property_name("children").unwrap();
        writer.write_array_start(1).unwrap();
    }
    writer.write_null().unwrap();
    let bytes = writer.into_inner();

    let err = decode::<Tree>(&bytes, Format::Binary).unwrap_err();
    assert!(
        matches!(err.root_cause(), SerializeError::Malformed(_)),
        "{}",
        err.root_cause()
    );
}

#[test]
fn test_runaway_nesting_in_unknown_member_is_malformed() {
    let mut writer = BinaryWriter::new(Vec::new());
    writer.write_object_start(None).unwrap();
    writer.write_property_name("junk").unwrap();
    for _ in 0..200_000 {
        writer.write_array_start(1).unwrap();
    }
    writer.write_null().unwrap();
    for _ in 0..200_000 {
        writer.write_array_end().unwrap();
    }
    writer.write_object_end().unwrap();
    let bytes = writer.into_inner();

    let err = decode::<Point>(&bytes, Format::Binary).unwrap_err();
    assert_eq!(err.path(), Some("junk"));
    assert!(matches!(err.root_cause(), SerializeError::Malformed(_)));
}

// ---------------------------------------------------------------------------
// Versioning and access
// ---------------------------------------------------------------------------

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_unknown_members_are_skipped(#[case] format: Format) {
    let newer = PointV2 {
        x: 10,
        history: vec![Point { x: 1, y: 1 }, Point { x: 2, y: 2 }],
        meta: Some(Shape {
            name: "meta".into(),
            tags: vec!["a".into(), "b".into()],
        }),
        y: 20,
        note: "added later".into(),
    };
    let bytes = encode(&newer, format).unwrap();
    let older: Point = decode(&bytes, format).unwrap();
    assert_eq!(older, Point { x: 10, y: 20 });
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_read_only_members_are_written_but_not_loaded(#[case] format: Format) {
    let bytes = encode(
        &Counter {
            value: 2,
            computed: 99,
        },
        format,
    )
    .unwrap();
    let loaded: Counter = decode(&bytes, format).unwrap();
    assert_eq!(
        loaded,
        Counter {
            value: 2,
            computed: 0
        }
    );
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_unknown_type_id_fails_with_path(#[case] format: Format) {
    let writer_registry = ContractRegistry::new();
    let drawing = Drawing {
        shapes: vec![Poly::from_derived(circle("lost", 1.0)).unwrap()],
        ..Drawing::default()
    };
    let bytes = encode_with(
        &GraphSerializer::new(&writer_registry),
        &drawing,
        format,
        &TextStyle::default(),
    )
    .unwrap();

    let reader_registry = ContractRegistry::new();
    let err = decode_with::<Drawing>(&GraphSerializer::new(&reader_registry), &bytes, format)
        .unwrap_err();
    assert_eq!(err.path(), Some("shapes[0]"));
    assert!(matches!(
        err.root_cause(),
        SerializeError::UnknownType { type_name } if type_name == "Circle"
    ));
}

#[test]
fn test_wrong_root_token_is_a_mismatch() {
    let bytes = encode(&vec![1i32, 2], Format::Binary).unwrap();
    let err = decode::<Point>(&bytes, Format::Binary).unwrap_err();
    assert!(matches!(
        err,
        SerializeError::TokenMismatch {
            expected: "ObjectStart",
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Post-load
// ---------------------------------------------------------------------------

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_callbacks_run_around_serialization(#[case] format: Format) {
    let stats = Stats {
        samples: vec![3, 4, 5],
        ..Stats::default()
    };
    let bytes = encode(&stats, format).unwrap();
    assert_eq!(stats.checksum, 0);

    let loaded: Stats = decode(&bytes, format).unwrap();
    assert_eq!(loaded.checksum, 12);
    assert!(loaded.loaded);
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_method_references_resolve_after_load(#[case] format: Format) {
    let registry = ContractRegistry::new();
    registry.register_method("Handlers", "click", |_: &[Value]| Value::I32(7));
    let serializer = GraphSerializer::new(&registry);

    let button = Button {
        label: "OK".into(),
        on_click: MethodRef::bind(&registry, "Handlers", "click"),
    };
    let bytes = encode_with(&serializer, &button, format, &TextStyle::default()).unwrap();
    let loaded: Loaded<Button> = load_reported(&serializer, &bytes, format);

    assert!(loaded.report.is_clean());
    let on_click = loaded.value.on_click.unwrap();
    assert!(on_click.is_resolved());
    assert!(matches!(on_click.invoke(&[]), Some(Value::I32(7))));
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_unresolvable_method_reference_is_reported(#[case] format: Format) {
    let registry = ContractRegistry::new();
    let serializer = GraphSerializer::new(&registry);
    let button = Button {
        label: "Later".into(),
        on_click: Some(MethodRef::unresolved("Handlers", "missing")),
    };
    let bytes = encode_with(&serializer, &button, format, &TextStyle::default()).unwrap();
    let loaded: Loaded<Button> = load_reported(&serializer, &bytes, format);

    assert_eq!(loaded.value.label, "Later");
    let on_click = loaded.value.on_click.unwrap();
    assert!(!on_click.is_resolved());
    assert!(on_click.handle().is_none());
    assert_eq!(on_click.method_name(), "missing");

    assert_eq!(loaded.report.unresolved.len(), 1);
    assert_eq!(loaded.report.unresolved[0].type_name, "Handlers");
    assert_eq!(loaded.report.unresolved[0].member_name, "missing");
}

#[rstest]
#[case::binary(Format::Binary)]
#[case::text(Format::Text)]
fn test_method_references_behind_accessors_resolve(#[case] format: Format) {
    let registry = ContractRegistry::new();
    registry.register_method("Handlers", "fire", |_: &[Value]| Value::Bool(true));
    let serializer = GraphSerializer::new(&registry);

    let trigger = Trigger {
        handler: MethodRef::bind(&registry, "Handlers", "fire"),
    };
    let bytes = encode_with(&serializer, &trigger, format, &TextStyle::default()).unwrap();
    let loaded: Loaded<Trigger> = load_reported(&serializer, &bytes, format);

    assert!(loaded.report.is_clean());
    let handler = loaded.value.handler.unwrap();
    assert!(handler.is_resolved());
    assert!(matches!(handler.invoke(&[]), Some(Value::Bool(true))));
}

#[test]
fn test_null_method_reference_stays_null() {
    let registry = ContractRegistry::new();
    let serializer = GraphSerializer::new(&registry);
    let button = Button {
        label: "None".into(),
        on_click: None,
    };
    let bytes = encode_with(&serializer, &button, Format::Binary, &TextStyle::default()).unwrap();
    let loaded: Loaded<Button> = load_reported(&serializer, &bytes, Format::Binary);
    assert!(loaded.value.on_click.is_none());
    assert!(loaded.report.is_clean());
    assert_eq!(loaded.report.constructed, 1);
}
