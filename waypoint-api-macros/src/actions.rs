//! 动作表宏实现
//!
//! 扫描 `impl` 块中的 `pub fn(&self, ...)` 方法，为每个方法生成：
//! - 参数描述（名称、形态、是否可空、默认值）
//! - 调用入口：取回具体端点类型，逐个反序列化已绑定的参数，再把返回值转换为 `Reply`

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use proc_macro_error::abort;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, Attribute, Expr, FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, Token,
    Type, Visibility,
};

use crate::utils;

/// 方法参数
enum ActionArg {
    /// `&mut ActionContext`
    Context,
    Bound {
        name: String,
        ty: Type,
        default: Option<Expr>,
    },
}

pub fn actions_impl(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as ItemImpl);

    if input.trait_.is_some() {
        abort!(input.span(), "#[actions] must be placed on an inherent impl block");
    }
    if !input.generics.params.is_empty() {
        abort!(input.generics.span(), "endpoints can not be generic");
    }

    let self_ty = input.self_ty.clone();
    let mut descriptors = Vec::new();

    for item in &mut input.items {
        if let ImplItem::Fn(method) = item {
            if !is_action(method) {
                continue;
            }
            let roles = take_roles(&mut method.attrs);
            let args = extract_args(method);
            descriptors.push(action_descriptor(&self_ty, method, &args, &roles));
        }
    }

    let expanded = quote! {
        #input

        impl ::waypoint_api::endpoint::EndpointActions for #self_ty {
            fn actions() -> ::std::vec::Vec<::waypoint_api::endpoint::ActionDescriptor> {
                ::std::vec![#(#descriptors),*]
            }
        }

        // 提交到全局端点注册表
        ::waypoint_api::inventory::submit! {
            ::waypoint_api::endpoint::EndpointRegistration {
                describe: || ::waypoint_api::endpoint::EndpointDescriptor::of::<#self_ty>(),
            }
        }
    };

    TokenStream::from(expanded)
}

/// `pub fn name(&self, ...)` 才是动作
fn is_action(method: &ImplItemFn) -> bool {
    if !matches!(method.vis, Visibility::Public(_)) {
        return false;
    }
    let Some(FnArg::Receiver(receiver)) = method.sig.inputs.first() else {
        return false;
    };
    if receiver.reference.is_none() || receiver.mutability.is_some() {
        abort!(
            receiver.span(),
            "action `{}` must take `&self`",
            method.sig.ident;
            help = "keep mutable state behind a lock inside the endpoint"
        );
    }
    if method.sig.asyncness.is_some() {
        abort!(method.sig.asyncness.span(), "actions must be synchronous");
    }
    true
}

/// 取出并移除 `#[role("a", "b")]`
fn take_roles(attrs: &mut Vec<Attribute>) -> Vec<LitStr> {
    let mut roles = Vec::new();
    attrs.retain(|attr| {
        if !attr.path().is_ident("role") {
            return true;
        }
        match attr.parse_args_with(Punctuated::<LitStr, Token![,]>::parse_terminated) {
            Ok(list) => roles.extend(list),
            Err(e) => abort!(e.span(), "expected #[role(\"name\", ...)]: {}", e),
        }
        false
    });
    roles
}

/// 提取参数并移除其中的 `#[default(...)]`
fn extract_args(method: &mut ImplItemFn) -> Vec<ActionArg> {
    let mut args = Vec::new();

    for input in method.sig.inputs.iter_mut() {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };

        let mut default = None;
        pat_type.attrs.retain(|attr| {
            if !attr.path().is_ident("default") {
                return true;
            }
            match attr.parse_args::<Expr>() {
                Ok(expr) => default = Some(expr),
                Err(e) => abort!(e.span(), "expected #[default(<value>)]: {}", e),
            }
            false
        });

        if utils::is_action_context(&pat_type.ty) {
            args.push(ActionArg::Context);
            continue;
        }

        let name = match pat_type.pat.as_ref() {
            Pat::Ident(ident) => ident.ident.to_string(),
            other => abort!(
                other.span(),
                "action parameters must be plain identifiers";
                help = "the identifier is used as the request parameter name"
            ),
        };
        if let Type::Reference(reference) = pat_type.ty.as_ref() {
            abort!(
                reference.span(),
                "parameter `{}` can not be a reference",
                name;
                help = "use an owned type such as `String`"
            );
        }

        args.push(ActionArg::Bound {
            name,
            ty: (*pat_type.ty).clone(),
            default,
        });
    }

    args
}

fn action_descriptor(
    self_ty: &Type,
    method: &ImplItemFn,
    args: &[ActionArg],
    roles: &[LitStr],
) -> TokenStream2 {
    let method_ident = &method.sig.ident;
    let rust_name = method_ident.to_string();

    let mut param_specs = Vec::new();
    let mut bindings = Vec::new();
    let mut call_args = Vec::new();

    for (index, arg) in args.iter().enumerate() {
        match arg {
            ActionArg::Context => call_args.push(quote!(ctx)),
            ActionArg::Bound { name, ty, default } => {
                let local = format_ident!("__arg{}", index, span = Span::call_site());
                let (kind, nullable) = utils::classify_param(ty);

                let nullable = nullable.then(|| quote!(.nullable()));
                let default = default
                    .as_ref()
                    .map(|expr| quote!(.with_default(::waypoint_api::serde_json::json!(#expr))));
                param_specs.push(quote! {
                    .param(::waypoint_api::endpoint::ParamSpec::new(#name, #kind) #nullable #default)
                });

                bindings.push(quote! {
                    let #local: #ty = ::waypoint_api::binder::take_arg(&mut args, #name)?;
                });
                call_args.push(quote!(#local));
            }
        }
    }

    let call = if utils::returns_result(&method.sig.output) {
        quote!(endpoint.#method_ident(#(#call_args),*)?)
    } else {
        quote!(endpoint.#method_ident(#(#call_args),*))
    };

    let roles = (!roles.is_empty()).then(|| quote!(.roles([#(#roles),*])));

    quote! {
        {
            #[allow(unused_variables, unused_mut)]
            fn invoke(
                endpoint: &dyn ::waypoint_api::endpoint::Endpoint,
                ctx: &mut ::waypoint_api::context::ActionContext,
                args: ::std::vec::Vec<::waypoint_api::serde_json::Value>,
            ) -> ::waypoint_api::error::ActionResult<::waypoint_api::endpoint::Reply> {
                let endpoint = ::waypoint_api::endpoint::downcast::<#self_ty>(endpoint)?;
                let mut args = args.into_iter();
                #(#bindings)*
                let output = #call;
                ::waypoint_api::endpoint::IntoReply::into_reply(output)
            }

            ::waypoint_api::endpoint::ActionDescriptor::new(#rust_name, invoke)
                #(#param_specs)*
                #roles
        }
    }
}
