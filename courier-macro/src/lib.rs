/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Courier Macro Library
//!
//! Procedural macros for the Courier routing engine.
//!
//! # Payload Macro
//!
//! [`courier_payload`] turns a plain struct or enum into a payload that can be
//! carried inside a JSON envelope:
//!
//! ```ignore
//! #[courier_payload]
//! pub struct PriceQuery {
//!     pub symbol: String,
//! }
//!
//! let envelope = Envelope::json(&PriceQuery { symbol: "AAPL".into() })?;
//! ```
//!
//! # Component Macro
//!
//! [`courier_component`] prepares a component type for installation:
//!
//! ```ignore
//! #[courier_component]
//! pub struct Echo;
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Options parsed from `#[courier_component(...)]`.
#[derive(Default)]
struct ComponentOptions {
    /// Skip deriving `Default`.
    no_default: bool,
}

impl ComponentOptions {
    fn parse(attr: &TokenStream) -> Self {
        let mut options = Self::default();
        for part in attr.to_string().split(',') {
            if part.trim() == "no_default" {
                options.no_default = true;
            }
        }
        options
    }
}

/// Declares a type as an envelope payload.
///
/// Expands to:
/// - `#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]`, skipping
///   any of those already derived
/// - a compile-time assertion that the type is `Send + Sync + 'static`
///
/// `serde` must be reachable by name from the call site.
///
/// ```ignore
/// use courier_macro::courier_payload;
///
/// #[courier_payload]
/// pub struct Quote {
///     pub symbol: String,
///     pub price: u64,
/// }
/// ```
#[proc_macro_attribute]
pub fn courier_payload(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if !has_derive(&input, "Serialize") {
            traits.push(quote!(serde::Serialize));
        }
        if !has_derive(&input, "Deserialize") {
            traits.push(quote!(serde::Deserialize));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertCourierPayload_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

/// Prepares a type for use as an installed component.
///
/// Components are shared between the dispatch task and the host, so they must
/// be `Send + Sync + 'static`. This macro derives `Default` and `Debug` (unless
/// already present, or `no_default` is given) and asserts those bounds at
/// compile time. The `Component` trait itself is still implemented by hand.
///
/// ```ignore
/// use courier_macro::courier_component;
///
/// #[courier_component]
/// pub struct Counter {
///     seen: std::sync::atomic::AtomicUsize,
/// }
///
/// #[courier_component(no_default)]
/// pub struct Forwarder {
///     next: ComponentId,
/// }
/// ```
#[proc_macro_attribute]
pub fn courier_component(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = ComponentOptions::parse(&attr);
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !options.no_default && !has_derive(&input, "Default") {
            traits.push(quote!(Default));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertCourierComponent_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}
