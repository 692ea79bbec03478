//! Endpoint 宏实现

use proc_macro::TokenStream;
use proc_macro_error::abort;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse_macro_input, DeriveInput, Ident, LitStr};

/// `#[endpoint(...)]` 中的配置
#[derive(Default)]
struct EndpointArgs {
    public: bool,
    roles: Vec<LitStr>,
    on_save: Option<Ident>,
}

fn parse_endpoint_args(input: &DeriveInput) -> EndpointArgs {
    let mut args = EndpointArgs::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("endpoint")) {
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("public") {
                args.public = true;
                Ok(())
            } else if meta.path.is_ident("role") {
                args.roles.push(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("on_save") {
                let method: LitStr = meta.value()?.parse()?;
                args.on_save = Some(method.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `public`, `role = \"...\"` or `on_save = \"...\"`"))
            }
        });

        if let Err(e) = result {
            abort!(e.span(), "invalid #[endpoint] attribute: {}", e);
        }
    }

    args
}

pub fn derive_endpoint_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        abort!(
            input.generics.span(),
            "endpoints can not be generic";
            help = "register a concrete type for each route"
        );
    }

    let args = parse_endpoint_args(&input);
    let type_name = name.to_string();
    let public = args.public;
    let roles = &args.roles;

    let save_state = args.on_save.map(|method| {
        quote! {
            fn save_state(&self) {
                self.#method()
            }
        }
    });

    let expanded = quote! {
        impl ::waypoint_api::endpoint::Endpoint for #name {
            #save_state

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        impl ::waypoint_api::endpoint::EndpointMeta for #name {
            fn type_name() -> &'static str {
                #type_name
            }

            fn is_public() -> bool {
                #public
            }

            fn roles() -> &'static [&'static str] {
                &[#(#roles),*]
            }
        }
    };

    TokenStream::from(expanded)
}
