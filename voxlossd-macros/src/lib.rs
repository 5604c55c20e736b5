use darling::Error;
use darling::ast::NestedMeta;
use quote::quote;
use syn::{Data, DeriveInput, Fields, ItemStruct, parse_macro_input};

use proc_macro::TokenStream;

/// Implements `WriteBytesLe` and `ReadBytesLe` for a struct by visiting its
/// fields in declaration order.
#[proc_macro_derive(LeBytes)]
pub fn derive_le_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Struct(ref data) = input.data else {
        return syn::Error::new_spanned(&input.ident, "LeBytes can only be derived for structs")
            .to_compile_error()
            .into();
    };

    let members: Vec<syn::Member> = match data.fields {
        Fields::Named(ref nf) => nf
            .named
            .iter()
            .filter_map(|f| f.ident.clone())
            .map(syn::Member::from)
            .collect(),
        Fields::Unnamed(ref uf) => (0..uf.unnamed.len())
            .map(|i| syn::Index::from(i).into())
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let read = quote! { crate::byteorder::ReadBytesLe::read_le(src)? };
    let reads = members.iter().map(|_| &read);
    let construct = match data.fields {
        Fields::Named(_) => quote! { Self { #( #members: #reads, )* } },
        Fields::Unnamed(_) => quote! { Self( #( #reads, )* ) },
        Fields::Unit => quote! { Self },
    };

    let expanded = quote! {
        impl crate::byteorder::WriteBytesLe for #name {
            fn write_le(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesLe::write_le(&self.#members, dst); )*
            }
        }

        impl crate::byteorder::ReadBytesLe for #name {
            fn read_le(src: &mut &[u8]) -> std::io::Result<Self> {
                Ok(#construct)
            }
        }
    };

    TokenStream::from(expanded)
}

/// Tags a struct as the body of a RIFF chunk with the given four-byte id,
/// e.g. `#[riff_chunk(b"fmt ")]`.
#[proc_macro_attribute]
pub fn riff_chunk(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };

    let id = match args.first() {
        Some(NestedMeta::Lit(syn::Lit::ByteStr(bs))) if bs.value().len() == 4 => bs.value(),
        Some(other) => {
            return syn::Error::new_spanned(other, "riff_chunk expects a 4-byte string")
                .to_compile_error()
                .into();
        }
        None => {
            return syn::Error::new(
                proc_macro::Span::call_site().into(),
                "riff_chunk expects a chunk id, e.g. b\"fmt \"",
            )
            .to_compile_error()
            .into();
        }
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let expanded = quote! {
        #input

        impl crate::wav::RiffChunk for #name {
            const ID: [u8; 4] = [#(#id),*];

            fn chunk_body(&self) -> Vec<u8> {
                let mut vec = Vec::new();
                crate::byteorder::WriteBytesLe::write_le(self, &mut vec);
                vec
            }
        }
    };
    TokenStream::from(expanded)
}
