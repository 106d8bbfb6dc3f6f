use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, DeriveInput, LitStr, Path, Token, Type};

/// Derives a plugin registration for a type.
///
/// # Usage
///
/// ```ignore
/// #[derive(Default, Plugin)]
/// #[tether(interfaces(dyn Shape, dyn Named), aliases("square", "box"))]
/// pub struct Square;
/// ```
///
/// This will generate:
///
/// ```ignore
/// ::tether_plugin_sdk::register_plugin!(Square, dyn Shape, dyn Named);
/// ::tether_plugin_sdk::register_alias!(Square, "square", "box");
/// ```
///
/// The sdk path can be changed with `#[tether(crate = my_sdk)]`.
#[proc_macro_derive(Plugin, attributes(tether))]
pub fn derive_plugin(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Everything collected from `#[tether(...)]` attributes
struct PluginAttrs {
    krate: Path,
    interfaces: Vec<Type>,
    aliases: Vec<LitStr>,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Plugin cannot be derived for generic types",
        ));
    }

    let name = &input.ident;
    let attrs = extract_attrs(&input.attrs)?;
    let krate = &attrs.krate;
    let interfaces = &attrs.interfaces;

    let aliases = if attrs.aliases.is_empty() {
        quote! {}
    } else {
        let aliases = &attrs.aliases;
        quote! {
            #krate::register_alias!(#name, #(#aliases),*);
        }
    };

    Ok(quote! {
        #krate::register_plugin!(#name #(, #interfaces)*);
        #aliases
    })
}

/// Collect interfaces, aliases and the sdk path from every #[tether(...)]
fn extract_attrs(attrs: &[syn::Attribute]) -> syn::Result<PluginAttrs> {
    let mut collected = PluginAttrs {
        krate: syn::parse_quote!(::tether_plugin_sdk),
        interfaces: Vec::new(),
        aliases: Vec::new(),
    };

    for attr in attrs {
        if !attr.path().is_ident("tether") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("interfaces") {
                let content;
                syn::parenthesized!(content in meta.input);
                let types = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
                collected.interfaces.extend(types);
                Ok(())
            } else if meta.path.is_ident("aliases") {
                let content;
                syn::parenthesized!(content in meta.input);
                let aliases = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
                collected.aliases.extend(aliases);
                Ok(())
            } else if meta.path.is_ident("crate") {
                collected.krate = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("expected `interfaces(...)`, `aliases(...)` or `crate = path`"))
            }
        })?;
    }

    Ok(collected)
}
