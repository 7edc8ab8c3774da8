//! Derive macros for the Refract event pipeline
//!
//! # Available Macros
//!
//! - `#[derive(Event)]` - Implements `refract_core::Event` for an event enum
//!
//! # Example
//!
//! ```ignore
//! use refract_macros::Event;
//!
//! #[derive(Event, Clone, Debug)]
//! enum TodoEvent {
//!     ToggleDone { id: TaskId },
//!
//!     #[event(name = "clear-completed")]
//!     ClearDone,
//! }
//!
//! assert_eq!(TodoEvent::ToggleDone { id }.name(), "toggle-done");
//! assert_eq!(TodoEvent::ClearDone.name(), "clear-completed");
//! assert_eq!(TodoEvent::EVENT_NAMES, &["toggle-done", "clear-completed"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derive macro for event enums
///
/// Generates:
/// - `impl refract_core::Event` whose `name()` returns the variant's event name
/// - an inherent `EVENT_NAMES` constant listing every name in declaration order
///
/// Names default to the variant identifier in kebab-case (`CreateTodo` becomes
/// `create-todo`).
///
/// # Attributes
///
/// - `#[event(name = "...")]` - Override the name of one variant
///
/// # Panics
///
/// This macro will produce a compile error (not a runtime panic) if:
/// - Applied to a non-enum type
/// - Two variants end up with the same name
/// - An `#[event(...)]` attribute is malformed
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(Event)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut names: Vec<String> = Vec::new();
    let mut arms = Vec::new();

    for variant in &data_enum.variants {
        let variant_name = &variant.ident;
        let event_name = match name_override(&variant.attrs) {
            Ok(Some(explicit)) => explicit,
            Ok(None) => kebab_case(&variant_name.to_string()),
            Err(error) => return error.to_compile_error().into(),
        };

        if names.contains(&event_name) {
            return syn::Error::new_spanned(
                variant,
                format!("duplicate event name \"{event_name}\""),
            )
            .to_compile_error()
            .into();
        }

        arms.push(match &variant.fields {
            Fields::Named(_) => quote! { Self::#variant_name { .. } => #event_name, },
            Fields::Unnamed(_) => quote! { Self::#variant_name(..) => #event_name, },
            Fields::Unit => quote! { Self::#variant_name => #event_name, },
        });
        names.push(event_name);
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            /// Every event name this enum can produce, in declaration order
            pub const EVENT_NAMES: &'static [&'static str] = &[#(#names),*];
        }

        impl #impl_generics ::refract_core::event::Event for #name #ty_generics #where_clause {
            fn name(&self) -> &'static str {
                match self {
                    #(#arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Read `#[event(name = "...")]` if present
fn name_override(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut found = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("event")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("event name cannot be empty"));
                }
                found = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported event attribute, expected `name = \"...\"`"))
            }
        })?;
    }

    Ok(found)
}

/// `CompleteAllToggle` -> `complete-all-toggle`
fn kebab_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let chars: Vec<char> = ident.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            out.push('-');
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::kebab_case;

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("Initialize"), "initialize");
        assert_eq!(kebab_case("ToggleDone"), "toggle-done");
        assert_eq!(kebab_case("CompleteAllToggle"), "complete-all-toggle");
        assert_eq!(kebab_case("LoadHTTPResponse"), "load-http-response");
        assert_eq!(kebab_case("Set_Showing"), "set-showing");
    }
}
