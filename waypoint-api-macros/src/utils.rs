//! 宏辅助工具函数

use proc_macro2::TokenStream;
use quote::quote;
use syn::{GenericArgument, PathArguments, ReturnType, Type, TypePath};

/// 类型路径的最后一段，例如 `std::collections::HashMap<K, V>` → `HashMap`
fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(TypePath { qself: None, path }) => path.segments.last(),
        _ => None,
    }
}

/// `Option<T>` → `T`
fn option_inner(ty: &Type) -> Option<&Type> {
    let segment = last_segment(ty)?;
    if segment.ident != "Option" {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}

/// 参数类型 → `(ParamKind 表达式, 是否可空)`
pub fn classify_param(ty: &Type) -> (TokenStream, bool) {
    if let Some(inner) = option_inner(ty) {
        let (kind, _) = classify_param(inner);
        return (kind, true);
    }

    let kind = quote!(::waypoint_api::endpoint::ParamKind);
    let Some(segment) = last_segment(ty) else {
        let name = quote!(#ty).to_string();
        return (quote!(#kind::Object(#name)), false);
    };

    let tokens = match segment.ident.to_string().as_str() {
        "bool" => quote!(#kind::Bool),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128"
        | "usize" => quote!(#kind::Int),
        "f32" | "f64" => quote!(#kind::Float),
        "String" => quote!(#kind::String),
        "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => quote!(#kind::List),
        "HashMap" | "BTreeMap" | "Map" | "RequestParams" => quote!(#kind::Map),
        "Value" => quote!(#kind::Any),
        other => quote!(#kind::Object(#other)),
    };
    (tokens, false)
}

/// `&mut ActionContext`
pub fn is_action_context(ty: &Type) -> bool {
    match ty {
        Type::Reference(reference) => {
            reference.mutability.is_some()
                && last_segment(&reference.elem).is_some_and(|s| s.ident == "ActionContext")
        }
        _ => false,
    }
}

/// 返回值是否为 `Result`/`ActionResult`，是则调用后需要 `?`
pub fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => {
            last_segment(ty).is_some_and(|s| s.ident == "Result" || s.ident == "ActionResult")
        }
    }
}
