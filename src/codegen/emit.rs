//! Token emission for parsed templates.
//!
//! Interface items are plain struct declarations. Implementation items are
//! `Marshal`/`Unmarshal` impls that call the runtime helpers in
//! `marshal`, addressed through the configured crate path.

use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

use crate::codegen::template::{FieldDef, FieldKind, RecordDef};

/// One struct declaration per record.
pub fn interface_items(records: &[RecordDef]) -> Vec<TokenStream> {
    records.iter().map(record_struct).collect()
}

/// One `Marshal` and one `Unmarshal` impl per record.
pub fn implementation_items(records: &[RecordDef], krate: &TokenStream) -> Vec<TokenStream> {
    records
        .iter()
        .flat_map(|record| [marshal_impl(record, krate), unmarshal_impl(record, krate)])
        .collect()
}

fn record_struct(record: &RecordDef) -> TokenStream {
    let name = format_ident!("{}", record.name);
    let fields = record.fields.iter().flat_map(struct_fields);
    quote! {
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct #name {
            #(#fields,)*
        }
    }
}

fn struct_fields(field: &FieldDef) -> Vec<TokenStream> {
    let name = format_ident!("{}", field.name);
    match &field.kind {
        FieldKind::Int => vec![quote! { pub #name: i32 }],
        FieldKind::Long => vec![quote! { pub #name: i64 }],
        FieldKind::Text => vec![quote! { pub #name: String }],
        FieldKind::SizedText { length } | FieldKind::Blob { length } => {
            let length = format_ident!("{}", length);
            vec![quote! { pub #name: Vec<u8> }, quote! { pub #length: usize }]
        }
        FieldKind::Record(ty) => {
            let ty = format_ident!("{}", ty);
            vec![quote! { pub #name: #ty }]
        }
        FieldKind::OptionalRecord(ty) => {
            let ty = format_ident!("{}", ty);
            vec![quote! { pub #name: Option<Box<#ty>> }]
        }
        FieldKind::Ignored => vec![quote! { pub #name: Option<Vec<u8>> }],
    }
}

fn marshal_impl(record: &RecordDef, krate: &TokenStream) -> TokenStream {
    let name = format_ident!("{}", record.name);
    let writes: Vec<TokenStream> = record
        .wire_fields()
        .map(|field| write_field(field, krate))
        .collect();

    let body = if writes.is_empty() {
        quote! { #krate::marshal::StructWriter::new(out).finish() }
    } else {
        quote! {
            let mut w = #krate::marshal::StructWriter::new(out);
            #(#writes)*
            w.finish()
        }
    };

    quote! {
        impl #krate::marshal::Marshal for #name {
            fn marshal(&self, out: Option<&mut #krate::bytes::BytesMut>) -> usize {
                #body
            }
        }
    }
}

fn write_field(field: &FieldDef, krate: &TokenStream) -> TokenStream {
    let name = format_ident!("{}", field.name);
    match &field.kind {
        FieldKind::Int => quote! { w.int(self.#name); },
        FieldKind::Long => quote! { w.long(self.#name); },
        FieldKind::Text => quote! { w.string(&self.#name); },
        FieldKind::SizedText { length } => {
            let length = format_ident!("{}", length);
            quote! { w.sized(#krate::ipc::value::TypeCode::String, &self.#name, self.#length); }
        }
        FieldKind::Blob { length } => {
            let length = format_ident!("{}", length);
            quote! { w.sized(#krate::ipc::value::TypeCode::Blob, &self.#name, self.#length); }
        }
        FieldKind::Record(_) => quote! { w.record(&self.#name); },
        FieldKind::OptionalRecord(_) => quote! { w.optional(self.#name.as_deref()); },
        FieldKind::Ignored => TokenStream::new(),
    }
}

fn unmarshal_impl(record: &RecordDef, krate: &TokenStream) -> TokenStream {
    let name = format_ident!("{}", record.name);
    let type_name = &record.name;
    let expected = Literal::usize_unsuffixed(record.wire_count());
    let reads: Vec<TokenStream> = record
        .fields
        .iter()
        .map(|field| read_field(field, krate))
        .collect();
    let locals = record.fields.iter().flat_map(|field| {
        let name = format_ident!("{}", field.name);
        let length = field.kind.length_field().map(|length| format_ident!("{}", length));
        std::iter::once(name).chain(length)
    });

    let reader = if record.wire_count() == 0 {
        quote! { #krate::marshal::StructReader::new(#type_name, payload, #expected)?; }
    } else {
        quote! { let mut r = #krate::marshal::StructReader::new(#type_name, payload, #expected)?; }
    };

    quote! {
        impl #krate::marshal::Unmarshal for #name {
            fn unmarshal(payload: &[u8]) -> #krate::Result<Self> {
                #reader
                #(#reads)*
                Ok(Self {
                    #(#locals,)*
                })
            }
        }
    }
}

fn read_field(field: &FieldDef, krate: &TokenStream) -> TokenStream {
    let name = format_ident!("{}", field.name);
    let label = &field.name;
    match &field.kind {
        FieldKind::Int => quote! { let #name = r.int(#label)?; },
        FieldKind::Long => quote! { let #name = r.long(#label)?; },
        FieldKind::Text => quote! { let #name = r.string(#label)?; },
        FieldKind::SizedText { length } => {
            let length = format_ident!("{}", length);
            quote! { let (#name, #length) = r.sized(#label, #krate::ipc::value::TypeCode::String)?; }
        }
        FieldKind::Blob { length } => {
            let length = format_ident!("{}", length);
            quote! { let (#name, #length) = r.sized(#label, #krate::ipc::value::TypeCode::Blob)?; }
        }
        FieldKind::Record(ty) => {
            let ty = format_ident!("{}", ty);
            quote! { let #name = r.record::<#ty>(#label)?; }
        }
        FieldKind::OptionalRecord(ty) => {
            let ty = format_ident!("{}", ty);
            quote! { let #name = r.optional::<#ty>(#label)?; }
        }
        FieldKind::Ignored => quote! { let #name = None; },
    }
}
