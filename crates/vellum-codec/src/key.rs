//! Order-preserving key codec.
//!
//! Index entries and primary keys are compared as raw bytes by the engine,
//! so this encoding must satisfy: `a < b  ⇔  encode_key(a) < encode_key(b)`
//! byte-lexicographically, under the total value order (Null < Bool < Number
//! < Text < Blob < Array < Document).
//!
//! Numbers are normalized before encoding: a float with no fractional part
//! that fits in i64 becomes an Int, so `2` and `2.0` produce identical key
//! bytes. Every number carries an order-preserving f64 approximation followed
//! by an exact payload; ordering between an int above 2^53 and a float that
//! collides with its approximation is deterministic but approximate.

use vellum_error::{Result, VellumError};
use vellum_types::{Document, Value};

const TAG_NULL: u8 = 0x05;
const TAG_BOOL: u8 = 0x10;
const TAG_NUMBER: u8 = 0x20;
const TAG_TEXT: u8 = 0x30;
const TAG_BLOB: u8 = 0x38;
const TAG_ARRAY: u8 = 0x40;
const TAG_DOCUMENT: u8 = 0x48;

const SUBTAG_INT: u8 = 0x00;
const SUBTAG_FLOAT: u8 = 0x01;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0xFF;

/// Encode a value into order-preserving key bytes.
pub fn encode_key(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_key(&mut out, value);
    out
}

/// Decode a full key buffer back into a value.
pub fn decode_key(data: &[u8]) -> Result<Value> {
    let (value, consumed) = decode_key_prefix(data)?;
    if consumed != data.len() {
        return Err(VellumError::corrupted("trailing bytes after key"));
    }
    Ok(value)
}

/// Decode the leading value of a composite key, returning the value and the
/// number of bytes it occupied. Non-unique index keys append the document key
/// after the encoded value; the remainder starts at the returned offset.
pub fn decode_key_prefix(data: &[u8]) -> Result<(Value, usize)> {
    let mut pos = 0;
    let value = read_key(data, &mut pos)?;
    Ok((value, pos))
}

fn write_key(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int(i) => write_number(out, Num::Int(*i)),
        Value::Float(f) => write_number(out, normalize_float(*f)),
        Value::Text(s) => {
            out.push(TAG_TEXT);
            write_escaped(out, s.as_bytes());
        }
        Value::Blob(b) => {
            out.push(TAG_BLOB);
            write_escaped(out, b);
        }
        Value::Array(a) => {
            out.push(TAG_ARRAY);
            for v in a {
                write_key(out, v);
            }
            out.push(TERMINATOR);
        }
        Value::Document(d) => {
            out.push(TAG_DOCUMENT);
            for (name, v) in d.iter() {
                out.push(TAG_TEXT);
                write_escaped(out, name.as_bytes());
                write_key(out, v);
            }
            out.push(TERMINATOR);
        }
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

/// Floats with no fractional part collapse to Int so that equal numbers
/// produce equal bytes.
fn normalize_float(f: f64) -> Num {
    if f.is_finite() && f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
        Num::Int(f as i64)
    } else {
        Num::Float(f)
    }
}

fn write_number(out: &mut Vec<u8>, num: Num) {
    out.push(TAG_NUMBER);
    match num {
        Num::Int(i) => {
            out.extend_from_slice(&ordered_f64(i as f64));
            out.push(SUBTAG_INT);
            out.extend_from_slice(&ordered_i64(i));
        }
        Num::Float(f) => {
            out.extend_from_slice(&ordered_f64(f));
            out.push(SUBTAG_FLOAT);
            out.extend_from_slice(&ordered_f64(f));
        }
    }
}

/// Map an f64 to 8 bytes whose lexicographic order matches numeric order.
/// NaN (normalized below every number by the value order) maps to all zeros.
fn ordered_f64(f: f64) -> [u8; 8] {
    if f.is_nan() {
        return [0u8; 8];
    }
    let bits = f.to_bits();
    let flipped = if bits & 0x8000_0000_0000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000_0000_0000
    };
    flipped.to_be_bytes()
}

fn unordered_f64(bytes: [u8; 8]) -> f64 {
    let flipped = u64::from_be_bytes(bytes);
    if flipped == 0 {
        return f64::NAN;
    }
    let bits = if flipped & 0x8000_0000_0000_0000 != 0 {
        flipped & 0x7FFF_FFFF_FFFF_FFFF
    } else {
        !flipped
    };
    f64::from_bits(bits)
}

/// Map an i64 to 8 bytes whose lexicographic order matches numeric order.
fn ordered_i64(i: i64) -> [u8; 8] {
    ((i as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

fn unordered_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ 0x8000_0000_0000_0000) as i64
}

/// Escape and terminate a byte string: `0x00` becomes `0x00 0xFF`, and the
/// string ends with `0x00 0x00`. Preserves lexicographic order and keeps the
/// encoding self-delimiting inside composite keys.
fn write_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        out.push(b);
        if b == TERMINATOR {
            out.push(ESCAPE);
        }
    }
    out.push(TERMINATOR);
    out.push(TERMINATOR);
}

fn read_escaped(data: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let b = *data
            .get(*pos)
            .ok_or_else(|| VellumError::corrupted("unterminated key string"))?;
        *pos += 1;
        if b != TERMINATOR {
            out.push(b);
            continue;
        }
        let next = *data
            .get(*pos)
            .ok_or_else(|| VellumError::corrupted("unterminated key string"))?;
        *pos += 1;
        match next {
            ESCAPE => out.push(TERMINATOR),
            TERMINATOR => return Ok(out),
            other => {
                return Err(VellumError::corrupted(format!(
                    "invalid escape byte {other:#04x} in key string"
                )))
            }
        }
    }
}

fn read_key(data: &[u8], pos: &mut usize) -> Result<Value> {
    let tag = *data
        .get(*pos)
        .ok_or_else(|| VellumError::corrupted("unexpected end of key"))?;
    *pos += 1;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => {
            let b = *data
                .get(*pos)
                .ok_or_else(|| VellumError::corrupted("truncated bool key"))?;
            *pos += 1;
            Ok(Value::Bool(b != 0))
        }
        TAG_NUMBER => {
            if data.len() < *pos + 17 {
                return Err(VellumError::corrupted("truncated number key"));
            }
            let subtag = data[*pos + 8];
            let exact: [u8; 8] = data[*pos + 9..*pos + 17].try_into().expect("8 bytes");
            *pos += 17;
            match subtag {
                SUBTAG_INT => Ok(Value::Int(unordered_i64(exact))),
                SUBTAG_FLOAT => Ok(Value::Float(unordered_f64(exact))),
                other => Err(VellumError::corrupted(format!(
                    "unknown number subtag {other:#04x}"
                ))),
            }
        }
        TAG_TEXT => {
            let bytes = read_escaped(data, pos)?;
            let s = String::from_utf8(bytes)
                .map_err(|_| VellumError::corrupted("invalid UTF-8 in text key"))?;
            Ok(Value::Text(s))
        }
        TAG_BLOB => Ok(Value::Blob(read_escaped(data, pos)?)),
        TAG_ARRAY => {
            let mut items = Vec::new();
            loop {
                let next = *data
                    .get(*pos)
                    .ok_or_else(|| VellumError::corrupted("unterminated array key"))?;
                if next == TERMINATOR {
                    *pos += 1;
                    return Ok(Value::Array(items));
                }
                items.push(read_key(data, pos)?);
            }
        }
        TAG_DOCUMENT => {
            let mut fields = Vec::new();
            loop {
                let next = *data
                    .get(*pos)
                    .ok_or_else(|| VellumError::corrupted("unterminated document key"))?;
                if next == TERMINATOR {
                    *pos += 1;
                    let doc: Document = fields.into_iter().collect();
                    return Ok(Value::Document(doc));
                }
                if next != TAG_TEXT {
                    return Err(VellumError::corrupted("document key field name missing"));
                }
                *pos += 1;
                let name_bytes = read_escaped(data, pos)?;
                let name = String::from_utf8(name_bytes)
                    .map_err(|_| VellumError::corrupted("invalid UTF-8 in field name"))?;
                let value = read_key(data, pos)?;
                fields.push((name, value));
            }
        }
        other => Err(VellumError::corrupted(format!(
            "unknown key tag {other:#04x}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_order(a: &Value, b: &Value) {
        let (ea, eb) = (encode_key(a), encode_key(b));
        assert_eq!(
            a.order_cmp(b),
            ea.cmp(&eb),
            "encoding order mismatch: {a} vs {b}\n  {ea:02x?}\n  {eb:02x?}"
        );
    }

    #[test]
    fn class_order_matches_encoding() {
        let values = [
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Int(-5),
            Value::Int(0),
            Value::Float(0.5),
            Value::Int(7),
            Value::Text("a".to_owned()),
            Value::Text("ab".to_owned()),
            Value::Blob(vec![0x00]),
            Value::Blob(vec![0x01]),
            Value::Array(vec![Value::Int(1)]),
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
            Value::Document(Document::from_fields([("a", 1i64)])),
        ];
        for a in &values {
            for b in &values {
                assert_order(a, b);
            }
        }
    }

    #[test]
    fn int_and_equal_float_share_bytes() {
        assert_eq!(encode_key(&Value::Int(2)), encode_key(&Value::Float(2.0)));
        assert_eq!(
            encode_key(&Value::Int(-3)),
            encode_key(&Value::Float(-3.0))
        );
    }

    #[test]
    fn number_roundtrip_exact() {
        for v in [
            Value::Int(0),
            Value::Int(1),
            Value::Int(-1),
            Value::Int(i64::MAX),
            Value::Int(i64::MIN),
            Value::Float(2.5),
            Value::Float(-0.125),
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
        ] {
            let decoded = decode_key(&encode_key(&v)).unwrap();
            assert!(
                decoded.order_eq(&v),
                "roundtrip changed {v:?} into {decoded:?}"
            );
        }
    }

    #[test]
    fn text_with_zero_bytes() {
        let v = Value::Blob(vec![0x00, 0x01, 0x00]);
        assert_eq!(decode_key(&encode_key(&v)).unwrap(), v);
        // Embedded zero sorts before a longer continuation.
        assert_order(&Value::Blob(vec![0x00]), &Value::Blob(vec![0x00, 0x00]));
        assert_order(&Value::Blob(vec![]), &Value::Blob(vec![0x00]));
    }

    #[test]
    fn composite_key_prefix_decodes() {
        // Non-unique index entries append the document key after the value.
        let mut key = encode_key(&Value::Text("user".to_owned()));
        let value_len = key.len();
        key.extend_from_slice(&[0xFF, 0x00, 0xAB]);
        let (decoded, consumed) = decode_key_prefix(&key).unwrap();
        assert_eq!(decoded, Value::Text("user".to_owned()));
        assert_eq!(consumed, value_len);
        assert_eq!(&key[consumed..], &[0xFF, 0x00, 0xAB]);
    }

    #[test]
    fn nested_roundtrip() {
        let v = Value::Document(Document::from_fields([
            ("name", Value::Text("a\0b".to_owned())),
            ("tags", Value::from(vec!["x", "y"])),
            ("n", Value::Int(12)),
        ]));
        assert_eq!(decode_key(&encode_key(&v)).unwrap(), v);
    }

    #[test]
    fn array_prefix_sorts_first() {
        let short = Value::from(vec![1i64]);
        let long = Value::from(vec![1i64, 0]);
        assert_order(&short, &long);
    }

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            // Stay inside 2^53 where int/float ordering is exact.
            (-9_007_199_254_740_992_i64..9_007_199_254_740_992).prop_map(Value::Int),
            (-1e12_f64..1e12_f64).prop_map(Value::Float),
            "[a-zA-Z0-9]{0,24}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..24).prop_map(Value::Blob),
        ]
    }

    fn arb_key_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(2, 24, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                proptest::collection::vec(("[a-z]{1,6}", inner), 0..6)
                    .prop_map(|fields| Value::Document(fields.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_encoding_preserves_order(a in arb_key_value(), b in arb_key_value()) {
            let (ea, eb) = (encode_key(&a), encode_key(&b));
            prop_assert_eq!(a.order_cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn prop_key_roundtrip(v in arb_key_value()) {
            let decoded = decode_key(&encode_key(&v)).expect("key must decode");
            prop_assert!(decoded.order_eq(&v), "roundtrip changed {:?} into {:?}", v, decoded);
        }
    }
}
