use proc_macro::TokenStream;
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

/// Derive the `Reflect` and `FieldValue` traits for a named-field struct.
///
/// The struct must also implement `Clone` and `Default`, and must not be
/// generic. Field types must implement `FieldValue`.
///
/// # Type attributes
///
/// - `#[reflect(serializable)]`: opt in to serialization
/// - `#[reflect(element)]`: derive from the engine's base element type
///   (implies serializable)
/// - `#[reflect(callbacks)]`: call `SerializationCallbacks` hooks
/// - `#[reflect(name = "...")]`: wire name, defaults to the struct name
///
/// # Field attributes
///
/// - `#[reflect(base)]`: this field embeds the base type; its members come first
/// - `#[reflect(include)]`: serialize a private field
/// - `#[reflect(exclude)]`: never serialize this field
/// - `#[reflect(read_only)]`: write the field but never assign it on load
/// - `#[reflect(rename = "...")]`: wire name of the member
///
/// ```ignore
/// #[derive(Reflect, Clone, Default)]
/// #[reflect(serializable, name = "Circle")]
/// struct Circle {
///     #[reflect(base)]
///     shape: Shape,
///     pub radius: f32,
///     #[reflect(include, rename = "tint")]
///     color: u32,
/// }
/// ```
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_reflect(&input) {
        Ok(expanded) => expanded.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derive `FieldValue` for a fieldless enum, stored as its `Int32` variant index.
///
/// ```ignore
/// #[derive(EnumField, Clone, Copy, Default)]
/// enum Blend {
///     #[default]
///     Opaque,
///     Additive,
/// }
/// ```
#[proc_macro_derive(EnumField)]
pub fn derive_enum_field(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_enum_field(&input) {
        Ok(expanded) => expanded.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct TypeOptions {
    serializable: bool,
    element: bool,
    callbacks: bool,
    name: Option<LitStr>,
}

#[derive(Default)]
struct FieldOptions {
    base: bool,
    include: bool,
    exclude: bool,
    read_only: bool,
    rename: Option<LitStr>,
}

fn reflect_attrs(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|attr| attr.path().is_ident("reflect"))
}

fn parse_type_options(input: &DeriveInput) -> syn::Result<TypeOptions> {
    let mut options = TypeOptions::default();
    for attr in reflect_attrs(&input.attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("serializable") {
                options.serializable = true;
            } else if meta.path.is_ident("element") {
                options.element = true;
            } else if meta.path.is_ident("callbacks") {
                options.callbacks = true;
            } else if meta.path.is_ident("name") {
                options.name = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown reflect type attribute"));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

fn parse_field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in reflect_attrs(&field.attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("base") {
                options.base = true;
            } else if meta.path.is_ident("include") {
                options.include = true;
            } else if meta.path.is_ident("exclude") {
                options.exclude = true;
            } else if meta.path.is_ident("read_only") {
                options.read_only = true;
            } else if meta.path.is_ident("rename") {
                options.rename = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown reflect field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

fn expand_reflect(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Reflect cannot be derived for generic types",
        ));
    }
    let fields: Vec<&Field> = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.iter().collect(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Reflect requires named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Reflect can only be derived for structs",
            ));
        }
    };

    let options = parse_type_options(input)?;
    let type_name = options
        .name
        .clone()
        .unwrap_or_else(|| LitStr::new(&name.to_string(), name.span()));

    let mut helpers = Vec::new();
    let mut links = Vec::new();
    let mut members = Vec::new();

    for field in fields {
        let field_options = parse_field_options(field)?;
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;
        let field_str = ident.to_string();

        if field_options.base {
            if !links.is_empty() {
                return Err(syn::Error::new_spanned(
                    ident,
                    "only one field can be marked #[reflect(base)]",
                ));
            }
            let project = format_ident!("__reflect_project_{}", ident);
            let project_mut = format_ident!("__reflect_project_mut_{}", ident);
            helpers.push(quote! {
                fn #project(
                    owner: &dyn redlilium_serialize::Reflect,
                ) -> ::core::option::Option<&dyn redlilium_serialize::Reflect> {
                    owner
                        .downcast_ref::<#name>()
                        .map(|this| &this.#ident as &dyn redlilium_serialize::Reflect)
                }

                fn #project_mut(
                    owner: &mut dyn redlilium_serialize::Reflect,
                ) -> ::core::option::Option<&mut dyn redlilium_serialize::Reflect> {
                    owner
                        .downcast_mut::<#name>()
                        .map(|this| &mut this.#ident as &mut dyn redlilium_serialize::Reflect)
                }
            });
            links.push(quote! {
                .base(redlilium_serialize::BaseLink {
                    descriptor: <#ty as redlilium_serialize::Reflect>::type_descriptor,
                    project: #project,
                    project_mut: #project_mut,
                })
            });
            continue;
        }

        let public = matches!(field.vis, syn::Visibility::Public(_));
        let visibility = if public {
            quote! { redlilium_serialize::Visibility::Public }
        } else {
            quote! { redlilium_serialize::Visibility::Private }
        };

        let mut markers = Vec::new();
        if field_options.include {
            markers.push(quote! { .marker(redlilium_serialize::Marker::Include) });
        }
        if field_options.exclude {
            markers.push(quote! { .marker(redlilium_serialize::Marker::Exclude) });
        }
        if field_options.read_only {
            markers.push(quote! { .marker(redlilium_serialize::Marker::ReadOnly) });
        }
        if let Some(rename) = &field_options.rename {
            markers.push(quote! { .marker(redlilium_serialize::Marker::Rename(#rename)) });
        }

        // Fields that can never be serialized get no accessors, so their
        // types do not need to implement FieldValue.
        let accessible = !field_options.exclude && (field_options.include || public);
        if !accessible {
            members.push(quote! {
                .member(
                    redlilium_serialize::MemberDescriptor::opaque(#field_str, #visibility)
                        #(#markers)*
                )
            });
            continue;
        }

        let get = format_ident!("__reflect_get_{}", ident);
        let set = format_ident!("__reflect_set_{}", ident);
        let take = format_ident!("__reflect_take_{}", ident);
        let visit = format_ident!("__reflect_visit_{}", ident);
        helpers.push(quote! {
            fn #get(
                owner: &dyn redlilium_serialize::Reflect,
            ) -> ::core::result::Result<
                redlilium_serialize::Value,
                redlilium_serialize::SerializeError,
            > {
                let this = redlilium_serialize::reflect::downcast_owner::<#name>(owner)?;
                ::core::result::Result::Ok(redlilium_serialize::FieldValue::to_value(&this.#ident))
            }

            fn #set(
                owner: &mut dyn redlilium_serialize::Reflect,
                value: redlilium_serialize::Value,
            ) -> ::core::result::Result<(), redlilium_serialize::SerializeError> {
                let this = redlilium_serialize::reflect::downcast_owner_mut::<#name>(owner)?;
                this.#ident = <#ty as redlilium_serialize::FieldValue>::from_value(value)?;
                ::core::result::Result::Ok(())
            }

            fn #take(
                owner: &mut dyn redlilium_serialize::Reflect,
            ) -> ::core::result::Result<
                redlilium_serialize::Value,
                redlilium_serialize::SerializeError,
            > {
                let this = redlilium_serialize::reflect::downcast_owner_mut::<#name>(owner)?;
                ::core::result::Result::Ok(redlilium_serialize::FieldValue::take_value(
                    &mut this.#ident,
                ))
            }

            fn #visit(
                owner: &mut dyn redlilium_serialize::Reflect,
                visitor: &mut dyn FnMut(&mut dyn redlilium_serialize::Reflect),
            ) {
                if let ::core::option::Option::Some(this) = owner.downcast_mut::<#name>() {
                    redlilium_serialize::FieldValue::visit_objects_mut(&mut this.#ident, visitor);
                }
            }
        });
        members.push(quote! {
            .member(
                redlilium_serialize::MemberDescriptor::slot(
                    #field_str,
                    #visibility,
                    <#ty as redlilium_serialize::FieldValue>::type_ref,
                    redlilium_serialize::SlotAccess {
                        get: #get,
                        set: #set,
                        take: #take,
                        visit: #visit,
                    },
                )
                #(#markers)*
            )
        });
    }

    let mut type_markers = Vec::new();
    if options.serializable {
        type_markers.push(quote! { .marker(redlilium_serialize::Marker::Serializable) });
    }
    if options.element {
        type_markers.push(quote! { .element() });
    }
    if options.callbacks {
        type_markers.push(quote! {
            .before_serialize(redlilium_serialize::late_bound::before_serialize_hook::<#name>)
            .after_load(redlilium_serialize::late_bound::after_load_hook::<#name>)
        });
    }

    Ok(quote! {
        impl redlilium_serialize::Reflect for #name {
            fn type_descriptor() -> &'static redlilium_serialize::TypeDescriptor {
                #(#helpers)*

                static DESCRIPTOR: ::std::sync::LazyLock<redlilium_serialize::TypeDescriptor> =
                    ::std::sync::LazyLock::new(|| {
                        redlilium_serialize::TypeDescriptor::builder::<#name>(#type_name)
                            #(#type_markers)*
                            #(#links)*
                            #(#members)*
                            .build()
                    });
                &DESCRIPTOR
            }

            fn descriptor(&self) -> &'static redlilium_serialize::TypeDescriptor {
                <Self as redlilium_serialize::Reflect>::type_descriptor()
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::core::any::Any> {
                self
            }

            fn clone_reflect(&self) -> ::std::boxed::Box<dyn redlilium_serialize::Reflect> {
                ::std::boxed::Box::new(::core::clone::Clone::clone(self))
            }
        }

        impl redlilium_serialize::FieldValue for #name {
            fn type_ref() -> redlilium_serialize::TypeRef {
                redlilium_serialize::TypeRef::Object(
                    <Self as redlilium_serialize::Reflect>::type_descriptor,
                )
            }

            fn to_value(&self) -> redlilium_serialize::Value {
                redlilium_serialize::Value::Object(::std::boxed::Box::new(
                    ::core::clone::Clone::clone(self),
                ))
            }

            fn from_value(
                value: redlilium_serialize::Value,
            ) -> ::core::result::Result<Self, redlilium_serialize::SerializeError> {
                redlilium_serialize::object_from_value::<Self>(value)
            }

            fn take_value(&mut self) -> redlilium_serialize::Value {
                redlilium_serialize::Value::Object(::std::boxed::Box::new(
                    ::core::mem::take(self),
                ))
            }

            fn visit_objects_mut(
                &mut self,
                visitor: &mut dyn FnMut(&mut dyn redlilium_serialize::Reflect),
            ) {
                visitor(self);
            }
        }
    })
}

fn expand_enum_field(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "EnumField can only be derived for enums",
        ));
    };

    let mut variants = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                &variant.ident,
                "EnumField variants must not carry data",
            ));
        }
        variants.push(&variant.ident);
    }
    let indices: Vec<Literal> = (0..variants.len())
        .map(|i| Literal::i32_unsuffixed(i as i32))
        .collect();

    Ok(quote! {
        impl redlilium_serialize::FieldValue for #name {
            fn type_ref() -> redlilium_serialize::TypeRef {
                redlilium_serialize::TypeRef::Scalar(redlilium_serialize::ScalarKind::I32)
            }

            fn to_value(&self) -> redlilium_serialize::Value {
                redlilium_serialize::Value::I32(match self {
                    #(Self::#variants => #indices,)*
                })
            }

            fn from_value(
                value: redlilium_serialize::Value,
            ) -> ::core::result::Result<Self, redlilium_serialize::SerializeError> {
                match value {
                    redlilium_serialize::Value::I32(index) => match index {
                        #(#indices => ::core::result::Result::Ok(Self::#variants),)*
                        other => ::core::result::Result::Err(
                            redlilium_serialize::SerializeError::TypeMismatch {
                                expected: ::std::string::String::from(#name_str),
                                found: ::std::format!("variant index {other}"),
                            },
                        ),
                    },
                    other => ::core::result::Result::Err(
                        redlilium_serialize::SerializeError::TypeMismatch {
                            expected: ::std::string::String::from(#name_str),
                            found: other.kind_name(),
                        },
                    ),
                }
            }
        }
    })
}
