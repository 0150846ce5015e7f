//! Derive macros for boilerplate trait implementation in the `sidforge-io`
//! and `sidforge-ops` crates.

#[macro_use]
extern crate quote;
#[macro_use]
extern crate syn;

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::DeriveInput;

/// Derives the standard implementation of `sidforge_io::Encode` for a type
/// (i.e. calling `bincode::serialize`).
#[proc_macro_derive(Encodeable)]
pub fn encode_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let expanded = quote! {
        impl crate::Encode for #name {}
    };
    TokenStream::from(expanded)
}

/// Derives the standard implementation of `sidforge_io::Decode` for a type
/// (i.e. calling `bincode::deserialize`).
#[proc_macro_derive(Decodeable)]
pub fn decode_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let expanded = quote! {
        impl crate::Decode for #name {}
    };
    TokenStream::from(expanded)
}

/// Derives the standard implementation of `sidforge_io::DefaultsArray` on a
/// type (i.e. an array with inferred length based on type hints).
#[proc_macro_derive(DefaultsAsArray)]
pub fn defaults_as_array_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let expanded = quote! {
        impl crate::DefaultsArray for #name {}
    };
    TokenStream::from(expanded)
}

/// Derives the standard implementation of `sidforge_io::DefaultsArrayBoxed`
/// on a type (i.e. a boxed `serde-big-array` `Array` with inferred length
/// based on type hints).
#[proc_macro_derive(DefaultsAsBoxedBigArray)]
pub fn defaults_as_boxed_array_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let expanded = quote! {
        impl crate::DefaultsArrayBoxed for #name {}
    };
    TokenStream::from(expanded)
}
