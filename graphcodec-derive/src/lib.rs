//! # Graphcodec Derive Macros
//!
//! This crate provides the procedural macros for `graphcodec`. `#[derive(GraphType)]`
//! implements `graphcodec::reflect::Reflect`, publishing a type's ordered fields and their
//! declared types so the codec can walk instances of it.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Type, parse_macro_input};

/// Derives `graphcodec::reflect::Reflect`.
///
/// Struct attributes:
/// * `#[graph(name = "ns.Type")]` overrides the qualified name (default: module path + ident,
///   with `::` replaced by `.`).
/// * `#[graph(collection)]` declares the type as a collection rather than an instance.
///
/// Field attributes:
/// * `#[graph(transient)]` excludes the field from serialization.
/// * `#[graph(declared = "ns.Other")]` overrides the declared type name.
///
/// Without `declared`, a field declares its own spelling with `Option` and `Box` wrappers
/// peeled: `Option<String>` declares `String`, `Option<Box<Player>>` declares `Player`. The
/// macro cannot see another type's qualified graph name, so fields that reference other
/// graph types should name it with `declared`.
///
/// Fields typed as `fn` pointers or `Fn`/`FnMut`/`FnOnce` trait objects are never serialized.
///
/// Fieldless enums derive an enumeration shape carried by their `#[repr]` integer (`i32` if
/// none is given).
#[proc_macro_derive(GraphType, attributes(graph))]
pub fn derive_graph_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let type_attrs = parse_type_attributes(&input.attrs)?;

    let name_expr = match &type_attrs.name {
        Some(name) => quote! { ::std::string::String::from(#name) },
        None => quote! {
            ::std::format!("{}::{}", ::std::module_path!(), ::std::stringify!(#ident))
                .replace("::", ".")
        },
    };

    let body = match &input.data {
        Data::Struct(ds) => {
            let constructor = if type_attrs.collection {
                quote! { ::graphcodec::reflect::TypeShape::collection(#name_expr) }
            } else {
                quote! { ::graphcodec::reflect::TypeShape::instance(#name_expr) }
            };
            let fields = generate_fields(&ds.fields)?;
            quote! { #constructor #(#fields)* }
        }
        Data::Enum(de) => {
            if let Some(variant) = de.variants.iter().find(|v| !matches!(v.fields, Fields::Unit)) {
                return Err(syn::Error::new_spanned(
                    &variant.ident,
                    "GraphType enums must be fieldless",
                ));
            }
            let repr = enum_repr(&input.attrs)?;
            quote! {
                ::graphcodec::reflect::TypeShape::enumeration(
                    #name_expr,
                    ::graphcodec::value::IntKind::#repr,
                )
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new(
                ident.span(),
                "GraphType only supports structs and fieldless enums",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::graphcodec::reflect::Reflect for #ident #ty_generics #where_clause {
            fn shape() -> ::graphcodec::reflect::TypeShape {
                #body
            }
        }
    })
}

struct TypeAttributes {
    name: Option<String>,
    collection: bool,
}

fn parse_type_attributes(attrs: &[Attribute]) -> syn::Result<TypeAttributes> {
    let mut parsed = TypeAttributes {
        name: None,
        collection: false,
    };

    for attr in attrs {
        if attr.path().is_ident("graph") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let s: LitStr = meta.value()?.parse()?;
                    parsed.name = Some(s.value());
                    return Ok(());
                }
                if meta.path.is_ident("collection") {
                    parsed.collection = true;
                    return Ok(());
                }
                Err(meta.error("Unknown graph attribute key. Supported on types: name, collection"))
            })?;
        }
    }
    Ok(parsed)
}

struct FieldAttributes {
    transient: bool,
    declared: Option<String>,
}

fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut parsed = FieldAttributes {
        transient: false,
        declared: None,
    };

    for attr in attrs {
        if attr.path().is_ident("graph") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("transient") {
                    parsed.transient = true;
                    return Ok(());
                }
                if meta.path.is_ident("declared") {
                    let s: LitStr = meta.value()?.parse()?;
                    parsed.declared = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown graph attribute key. Supported on fields: transient, declared"))
            })?;
        }
    }
    Ok(parsed)
}

fn generate_fields(fields: &Fields) -> syn::Result<Vec<proc_macro2::TokenStream>> {
    let mut out = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let attrs = parse_field_attributes(&field.attrs)?;
        let name = field
            .ident
            .as_ref()
            .map_or_else(|| index.to_string(), ToString::to_string);
        let declared = attrs.declared.unwrap_or_else(|| declared_name(&field.ty));
        let transient = attrs.transient;
        let delegate = is_delegate(&field.ty);

        out.push(quote! {
            .with_field(
                ::graphcodec::reflect::FieldShape::new(#name, #declared)
                    .transient(#transient)
                    .delegate(#delegate)
            )
        });
    }
    Ok(out)
}

/// Token spelling of a type with whitespace removed, e.g. `Vec<u8>`.
fn type_name(ty: &Type) -> String {
    quote!(#ty).to_string().chars().filter(|c| !c.is_whitespace()).collect()
}

/// Spelling of `ty` after peeling `Option<..>` and `Box<..>` layers.
fn declared_name(ty: &Type) -> String {
    let mut ty = ty;
    while let Some(inner) = wrapped(ty) {
        ty = inner;
    }
    type_name(ty)
}

fn wrapped(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" && segment.ident != "Box" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match (args.args.len(), args.args.first()) {
        (1, Some(syn::GenericArgument::Type(inner))) => Some(inner),
        _ => None,
    }
}

fn is_delegate(ty: &Type) -> bool {
    match ty {
        Type::BareFn(_) => true,
        Type::Paren(inner) => is_delegate(&inner.elem),
        Type::Group(inner) => is_delegate(&inner.elem),
        _ => {
            let spelled = type_name(ty);
            ["Fn(", "FnMut(", "FnOnce("]
                .iter()
                .any(|marker| spelled.contains(marker))
        }
    }
}

fn enum_repr(attrs: &[Attribute]) -> syn::Result<syn::Ident> {
    let mut repr = None;
    for attr in attrs {
        if attr.path().is_ident("repr") {
            attr.parse_nested_meta(|meta| {
                let kind = match meta.path.get_ident().map(ToString::to_string).as_deref() {
                    Some("u8") => "U8",
                    Some("i8") => "I8",
                    Some("u16") => "U16",
                    Some("i16") => "I16",
                    Some("u32") => "U32",
                    Some("i32") => "I32",
                    Some("u64") => "U64",
                    Some("i64") => "I64",
                    // `#[repr(C)]`, `#[repr(align(N))]` and friends do not name an integer.
                    _ => {
                        if meta.input.peek(syn::token::Paren) {
                            let content;
                            syn::parenthesized!(content in meta.input);
                            content.parse::<proc_macro2::TokenStream>()?;
                        }
                        return Ok(());
                    }
                };
                repr = Some(syn::Ident::new(kind, meta.path.span()));
                Ok(())
            })?;
        }
    }
    Ok(repr.unwrap_or_else(|| syn::Ident::new("I32", proc_macro2::Span::call_site())))
}
