//! Row codec: compact tag-length-value encoding for stored documents.
//!
//! One tag byte per value, varint lengths and counts, zigzag varints for
//! integers. Field order is preserved, so identical documents always produce
//! identical bytes.

use vellum_error::{Result, VellumError};
use vellum_types::{Document, Value};

use crate::varint::{read_varint, write_varint};

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_TEXT: u8 = 0x05;
const TAG_BLOB: u8 = 0x06;
const TAG_ARRAY: u8 = 0x07;
const TAG_DOCUMENT: u8 = 0x08;

/// Encode a document to bytes.
pub fn encode_document(doc: &Document) -> Vec<u8> {
    let mut out = Vec::new();
    write_document(&mut out, doc);
    out
}

/// Decode a document from bytes produced by [`encode_document`].
pub fn decode_document(data: &[u8]) -> Result<Document> {
    let mut pos = 0;
    let doc = read_document(data, &mut pos)?;
    if pos != data.len() {
        return Err(VellumError::corrupted("trailing bytes after document"));
    }
    Ok(doc)
}

/// Encode a single value to bytes.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

/// Decode a single value from bytes produced by [`encode_value`].
pub fn decode_value(data: &[u8]) -> Result<Value> {
    let mut pos = 0;
    let value = read_value(data, &mut pos)?;
    if pos != data.len() {
        return Err(VellumError::corrupted("trailing bytes after value"));
    }
    Ok(value)
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Int(i) => {
            out.push(TAG_INT);
            write_varint(out, zigzag(*i));
        }
        Value::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            out.push(TAG_TEXT);
            write_varint(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            out.push(TAG_BLOB);
            write_varint(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::Array(a) => {
            out.push(TAG_ARRAY);
            write_varint(out, a.len() as u64);
            for v in a {
                write_value(out, v);
            }
        }
        Value::Document(d) => write_document(out, d),
    }
}

fn write_document(out: &mut Vec<u8>, doc: &Document) {
    out.push(TAG_DOCUMENT);
    write_varint(out, doc.len() as u64);
    for (name, value) in doc.iter() {
        write_varint(out, name.len() as u64);
        out.extend_from_slice(name.as_bytes());
        write_value(out, value);
    }
}

fn read_value(data: &[u8], pos: &mut usize) -> Result<Value> {
    let tag = *data
        .get(*pos)
        .ok_or_else(|| VellumError::corrupted("unexpected end of value"))?;
    *pos += 1;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_INT => {
            let raw = read_varint_at(data, pos)?;
            Ok(Value::Int(unzigzag(raw)))
        }
        TAG_FLOAT => {
            let bytes = take(data, pos, 8)?;
            let bits = u64::from_be_bytes(bytes.try_into().expect("8 bytes"));
            Ok(Value::Float(f64::from_bits(bits)))
        }
        TAG_TEXT => {
            let len = read_varint_at(data, pos)? as usize;
            let bytes = take(data, pos, len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| VellumError::corrupted("invalid UTF-8 in text value"))?;
            Ok(Value::Text(s.to_owned()))
        }
        TAG_BLOB => {
            let len = read_varint_at(data, pos)? as usize;
            let bytes = take(data, pos, len)?;
            Ok(Value::Blob(bytes.to_vec()))
        }
        TAG_ARRAY => {
            let count = read_varint_at(data, pos)? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_value(data, pos)?);
            }
            Ok(Value::Array(items))
        }
        TAG_DOCUMENT => {
            *pos -= 1;
            Ok(Value::Document(read_document(data, pos)?))
        }
        other => Err(VellumError::corrupted(format!(
            "unknown value tag {other:#04x}"
        ))),
    }
}

fn read_document(data: &[u8], pos: &mut usize) -> Result<Document> {
    let tag = *data
        .get(*pos)
        .ok_or_else(|| VellumError::corrupted("unexpected end of document"))?;
    if tag != TAG_DOCUMENT {
        return Err(VellumError::corrupted(format!(
            "expected document tag, found {tag:#04x}"
        )));
    }
    *pos += 1;
    let count = read_varint_at(data, pos)? as usize;
    let mut fields = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name_len = read_varint_at(data, pos)? as usize;
        let name_bytes = take(data, pos, name_len)?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| VellumError::corrupted("invalid UTF-8 in field name"))?
            .to_owned();
        let value = read_value(data, pos)?;
        fields.push((name, value));
    }
    Ok(fields.into_iter().collect())
}

fn read_varint_at(data: &[u8], pos: &mut usize) -> Result<u64> {
    let (value, consumed) =
        read_varint(&data[*pos..]).ok_or_else(|| VellumError::corrupted("truncated varint"))?;
    *pos += consumed;
    Ok(value)
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| VellumError::corrupted("truncated value payload"))?;
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

const fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

const fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vellum_types::Document;

    fn nested_doc() -> Document {
        Document::from_fields([
            ("a", Value::Int(5)),
            ("b", Value::from(vec![6i64, 7, 8])),
            (
                "c",
                Value::Document(Document::from_fields([("foo", "bar")])),
            ),
            ("d", Value::Null),
            ("e", Value::Float(-2.5)),
            ("f", Value::Blob(vec![0xDE, 0xAD])),
        ])
    }

    #[test]
    fn document_roundtrip() {
        let doc = nested_doc();
        let bytes = encode_document(&doc);
        assert_eq!(decode_document(&bytes).unwrap(), doc);
    }

    #[test]
    fn empty_document_roundtrip() {
        let doc = Document::new();
        let bytes = encode_document(&doc);
        assert_eq!(decode_document(&bytes).unwrap(), doc);
    }

    #[test]
    fn encoding_is_stable() {
        let a = encode_document(&nested_doc());
        let b = encode_document(&nested_doc());
        assert_eq!(a, b);
    }

    #[test]
    fn field_order_is_preserved() {
        let doc = Document::from_fields([("z", 1i64), ("a", 2i64)]);
        let decoded = decode_document(&encode_document(&doc)).unwrap();
        let names: Vec<_> = decoded.iter().map(|(n, _)| n.to_owned()).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn zigzag_boundaries() {
        for v in [0i64, 1, -1, i64::MAX, i64::MIN, 42, -42] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }

    #[test]
    fn truncated_input_is_corrupted_not_panic() {
        let bytes = encode_document(&nested_doc());
        for cut in 0..bytes.len() {
            // Every truncation must produce an error, never a panic.
            assert!(decode_document(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn unknown_tag_is_corrupted() {
        assert!(decode_value(&[0x7F]).is_err());
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            // Excludes NaN, which is normalized away before storage.
            (-1e15_f64..1e15_f64).prop_map(Value::Float),
            "[a-zA-Z0-9 _]{0,40}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..40).prop_map(Value::Blob),
        ];
        leaf.prop_recursive(3, 64, 8, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                proptest::collection::vec(("[a-z]{1,8}", inner), 0..8)
                    .prop_map(|fields| Value::Document(fields.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_value_roundtrip(value in arb_value()) {
            let bytes = encode_value(&value);
            let decoded = decode_value(&bytes).expect("encode output must decode");
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn prop_document_roundtrip(
            fields in proptest::collection::vec(("[a-z]{1,8}", arb_value()), 0..16)
        ) {
            let doc: Document = fields.into_iter().collect();
            let bytes = encode_document(&doc);
            let decoded = decode_document(&bytes).expect("encode output must decode");
            prop_assert_eq!(decoded, doc);
        }
    }
}
