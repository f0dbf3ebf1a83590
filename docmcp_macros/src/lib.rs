//! `#[derive(Schema)]` for docmcp.
//!
//! Generates a flat JSON object schema from a struct with named fields. The same
//! schema shape serves two purposes: the `inputSchema` of a tool and the
//! `requestedSchema` of an elicitation form.

extern crate proc_macro;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::{
    parse_macro_input, Data, DeriveInput, Field, Fields, GenericArgument, Ident, Lit, LitBool,
    LitStr, Meta, PathArguments, Result as SynResult, Token, Type,
};

#[derive(Default)]
struct SchemaAttrs {
    desc: Option<String>,
    rename: Option<String>,
    skip: bool,
    required: Option<bool>,
    default: Option<Lit>,
}

impl Parse for SchemaAttrs {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let mut attrs = SchemaAttrs::default();
        while !input.is_empty() {
            let key: Ident = input.call(Ident::parse_any)?;
            match key.to_string().as_str() {
                "desc" => {
                    input.parse::<Token![=]>()?;
                    attrs.desc = Some(input.parse::<LitStr>()?.value());
                }
                "rename" => {
                    input.parse::<Token![=]>()?;
                    attrs.rename = Some(input.parse::<LitStr>()?.value());
                }
                "skip" => {
                    attrs.skip = if input.peek(Token![=]) {
                        input.parse::<Token![=]>()?;
                        input.parse::<LitBool>()?.value
                    } else {
                        true
                    };
                }
                "required" => {
                    input.parse::<Token![=]>()?;
                    attrs.required = Some(input.parse::<LitBool>()?.value);
                }
                "default" => {
                    input.parse::<Token![=]>()?;
                    attrs.default = Some(input.parse::<Lit>()?);
                }
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown schema attribute key: {}", other),
                    ));
                }
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(attrs)
    }
}

fn field_attrs(field: &Field) -> SynResult<SchemaAttrs> {
    let mut merged = SchemaAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("schema")) {
        let Meta::List(list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                attr.meta.to_token_stream(),
                "expected #[schema(key = value, ...)]",
            ));
        };
        let parsed = list.parse_args::<SchemaAttrs>()?;
        merged.desc = parsed.desc.or(merged.desc);
        merged.rename = parsed.rename.or(merged.rename);
        merged.skip |= parsed.skip;
        merged.required = parsed.required.or(merged.required);
        merged.default = parsed.default.or(merged.default);
    }
    Ok(merged)
}

/// Returns the `T` of a single-segment `Wrapper<T>` path such as `Option<T>` or `Vec<T>`.
fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    if type_path.qself.is_some() || type_path.path.segments.len() != 1 {
        return None;
    }
    let segment = &type_path.path.segments[0];
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

fn schema_for(ty: &Type, owner: &Ident) -> TokenStream2 {
    if let Some(inner) = generic_inner(ty, "Option") {
        return schema_for(inner, owner);
    }
    if let Some(inner) = generic_inner(ty, "Vec") {
        let items = schema_for(inner, owner);
        return quote! { ::docmcp::__private::serde_json::json!({ "type": "array", "items": #items }) };
    }

    let Type::Path(type_path) = ty else {
        let msg = format!("unsupported field type for Schema: {}", ty.to_token_stream());
        return quote! { compile_error!(#msg) };
    };
    if type_path.qself.is_some() {
        return quote! { compile_error!("qualified type paths are not supported by Schema") };
    }

    let path = &type_path.path;
    let primitive = match path.get_ident().map(|i| i.to_string()).as_deref() {
        Some("String") | Some("str") => Some("string"),
        Some("bool") => Some("boolean"),
        Some("f32") | Some("f64") => Some("number"),
        Some("i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize") => {
            Some("integer")
        }
        _ => None,
    };
    if let Some(kind) = primitive {
        return quote! { ::docmcp::__private::serde_json::json!({ "type": #kind }) };
    }

    if path.is_ident(owner) {
        let msg = format!("recursive Schema type: {}", owner);
        return quote! { compile_error!(#msg) };
    }
    quote! { <#path as ::docmcp::SchemaDescriptor>::schema() }
}

#[proc_macro_derive(Schema, attributes(schema))]
pub fn schema_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return quote! { compile_error!("Schema can only be derived for structs with named fields."); }
                    .into();
            }
        },
        _ => return quote! { compile_error!("Schema can only be derived for structs."); }.into(),
    };

    let mut inserts = Vec::new();
    let mut required = Vec::new();
    let mut errors = TokenStream2::new();

    for field in fields {
        let attrs = match field_attrs(field) {
            Ok(attrs) => attrs,
            Err(e) => {
                errors.extend(e.to_compile_error());
                continue;
            }
        };
        if attrs.skip {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };

        let key = attrs.rename.clone().unwrap_or_else(|| ident.unraw().to_string());
        let base = schema_for(&field.ty, name);
        let desc = attrs
            .desc
            .as_ref()
            .map(|d| quote! { obj.insert("description".to_string(), ::docmcp::__private::serde_json::json!(#d)); });
        let default = attrs
            .default
            .as_ref()
            .map(|lit| quote! { obj.insert("default".to_string(), ::docmcp::__private::serde_json::json!(#lit)); });

        inserts.push(quote! {
            {
                let mut property = #base;
                if let Some(obj) = property.as_object_mut() {
                    #desc
                    #default
                }
                properties.insert(#key.to_string(), property);
            }
        });

        let optional = generic_inner(&field.ty, "Option").is_some() || attrs.default.is_some();
        if attrs.required.unwrap_or(!optional) {
            required.push(key);
        }
    }

    if !errors.is_empty() {
        return errors.into();
    }

    let expanded = quote! {
        impl ::docmcp::SchemaDescriptor for #name {
            fn schema() -> ::docmcp::__private::serde_json::Value {
                static SCHEMA: ::docmcp::__private::Lazy<::docmcp::__private::serde_json::Value> =
                    ::docmcp::__private::Lazy::new(|| {
                        #[allow(unused_mut)]
                        let mut properties = ::docmcp::__private::serde_json::Map::new();
                        #(#inserts)*
                        let mut schema = ::docmcp::__private::serde_json::Map::new();
                        schema.insert("type".to_string(), ::docmcp::__private::serde_json::json!("object"));
                        schema.insert("properties".to_string(), ::docmcp::__private::serde_json::Value::Object(properties));
                        let required: ::std::vec::Vec<&str> = vec![#(#required),*];
                        if !required.is_empty() {
                            schema.insert("required".to_string(), ::docmcp::__private::serde_json::json!(required));
                        }
                        ::docmcp::__private::serde_json::Value::Object(schema)
                    });
                SCHEMA.clone()
            }
        }
    };

    expanded.into()
}
