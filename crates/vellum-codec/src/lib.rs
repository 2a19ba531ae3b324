//! Byte codecs for the Vellum document database.
//!
//! Two distinct formats live here:
//!
//! - the **row codec** ([`encode_document`] / [`decode_document`]): a compact
//!   tag-length-value format used for stored rows and catalog records. Not
//!   order-preserving; optimized for size and stable output.
//! - the **key codec** ([`encode_key`] / [`decode_key`]): an order-preserving
//!   encoding used for document keys and index entries, where
//!   byte-lexicographic order must match the logical value order.

mod key;
mod row;
mod varint;

pub use key::{decode_key, decode_key_prefix, encode_key};
pub use row::{decode_document, decode_value, encode_document, encode_value};
pub use varint::{read_varint, varint_len, write_varint};
