//! Order-preserving binary encoding
//!
//! Unsigned lexicographic comparison of two encodings gives the same result
//! as [`Value`]'s total order, across every type. Each encoding is
//! self-delimiting, so composite keys are plain concatenations and a prefix
//! scan over the first N components is a byte prefix scan.
//!
//! # Layout
//!
//! ```text
//! null      05
//! false     10
//! true      11
//! double    20 <image:8> 01
//! integer   20 <image:8> <rel:1> <offset-binary i64:8>
//! text      30 <escaped bytes> 00 01
//! blob      40 <escaped bytes> 00 01
//! array     50 <element>* 00
//! document  60 (01 <escaped name> 00 01 <value>)* 00
//! ```
//!
//! `image` is the double order key of the number (integers are rounded to
//! the nearest double). `rel` places an integer below (`00`), on (`02`) or
//! above (`03`) its image; doubles carry `01`, so `2.0` sorts just before `2`.
//! Escaping replaces every `00` byte by `00 ff`.
//!
//! Stored rows use the same format with document fields kept in insertion
//! order ([`encode_document`]); keys sort fields by name ([`encode_value`]).

pub mod varint;

use std::cmp::Ordering;

use crate::error::{DocqlError, DocqlResult};
use crate::value::compare::{double_from_key, double_key};
use crate::value::{Document, Value};

const TAG_NULL: u8 = 0x05;
const TAG_FALSE: u8 = 0x10;
const TAG_TRUE: u8 = 0x11;
const TAG_NUMBER: u8 = 0x20;
const TAG_TEXT: u8 = 0x30;
const TAG_BLOB: u8 = 0x40;
const TAG_ARRAY: u8 = 0x50;
const TAG_DOCUMENT: u8 = 0x60;

const END: u8 = 0x00;
const FIELD: u8 = 0x01;

const REL_BELOW: u8 = 0x00;
const REL_DOUBLE: u8 = 0x01;
const REL_EXACT: u8 = 0x02;
const REL_ABOVE: u8 = 0x03;

/// Encodes a value with canonical (name-sorted) document fields.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    write_value(&mut buf, value, true);
    buf
}

/// Appends the canonical encoding of `value` to `buf`.
pub fn append_value(buf: &mut Vec<u8>, value: &Value) {
    write_value(buf, value, true);
}

/// Concatenated encoding of several values (composite keys).
pub fn encode_values(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 * values.len());
    for v in values {
        write_value(&mut buf, v, true);
    }
    buf
}

/// Encodes a stored row. Field order is preserved.
pub fn encode_document(doc: &Document) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    write_document(&mut buf, doc, false);
    buf
}

pub fn decode_document(bytes: &[u8]) -> DocqlResult<Document> {
    match decode_value(bytes)? {
        Value::Document(doc) => Ok(doc),
        other => Err(DocqlError::encoding(format!(
            "expected an encoded document, found {}",
            other.value_type()
        ))),
    }
}

/// Decodes exactly one value; trailing bytes are an error.
pub fn decode_value(bytes: &[u8]) -> DocqlResult<Value> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    let v = reader.read_value()?;
    if reader.pos != bytes.len() {
        return Err(DocqlError::encoding("trailing bytes after value"));
    }
    Ok(v)
}

/// Decodes every value of a concatenated key.
pub fn decode_values(bytes: &[u8]) -> DocqlResult<Vec<Value>> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    let mut out = Vec::new();
    while reader.pos < bytes.len() {
        out.push(reader.read_value()?);
    }
    Ok(out)
}

/// Decodes the first `n` values of a key and returns the unread remainder.
pub fn decode_prefix(bytes: &[u8], n: usize) -> DocqlResult<(Vec<Value>, &[u8])> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(reader.read_value()?);
    }
    Ok((out, &bytes[reader.pos..]))
}

/// Seek pivot for a range starting at `values`.
///
/// A trailing number is cut after its image, so the pivot sorts before
/// every integer and double numerically equal to it.
pub fn encode_seek_prefix(values: &[Value]) -> Vec<u8> {
    let Some((last, head)) = values.split_last() else {
        return Vec::new();
    };
    let mut buf = encode_values(head);
    match last {
        Value::Integer(i) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&double_key(*i as f64).to_be_bytes());
        }
        Value::Double(d) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&double_key(*d).to_be_bytes());
        }
        v => write_value(&mut buf, v, true),
    }
    buf
}

/// Primary key encoding. Integral doubles are written as integers so that
/// numerically equal keys (`2` and `2.0`) share one key.
pub fn encode_key(values: &[Value]) -> Vec<u8> {
    let canonical: Vec<Value> = values.iter().map(integral_as_integer).collect();
    encode_values(&canonical)
}

fn integral_as_integer(value: &Value) -> Value {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    match value {
        Value::Double(d) if d.fract() == 0.0 && *d >= -LIMIT && *d < LIMIT => {
            Value::Integer(*d as i64)
        }
        Value::Array(items) => Value::Array(items.iter().map(integral_as_integer).collect()),
        Value::Document(doc) => {
            let mut out = Document::new();
            for (name, v) in doc.iter() {
                out.set(name.to_string(), integral_as_integer(v));
            }
            Value::Document(out)
        }
        v => v.clone(),
    }
}

/// Byte prefix shared by every encoding SQL-equal to `values`.
///
/// Values are written in full up to the first number or container, which
/// contributes only its tag and, for numbers, its image. Callers compare
/// the decoded candidates to filter the remaining matches.
pub fn encode_equality_prefix(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 * values.len());
    for v in values {
        match v {
            Value::Integer(i) => {
                buf.push(TAG_NUMBER);
                buf.extend_from_slice(&double_key(*i as f64).to_be_bytes());
                break;
            }
            Value::Double(d) => {
                buf.push(TAG_NUMBER);
                buf.extend_from_slice(&double_key(*d).to_be_bytes());
                break;
            }
            Value::Array(_) => {
                buf.push(TAG_ARRAY);
                break;
            }
            Value::Document(_) => {
                buf.push(TAG_DOCUMENT);
                break;
            }
            v => write_value(&mut buf, v, true),
        }
    }
    buf
}

fn write_value(buf: &mut Vec<u8>, value: &Value, canonical: bool) {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(false) => buf.push(TAG_FALSE),
        Value::Bool(true) => buf.push(TAG_TRUE),
        Value::Double(d) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&double_key(*d).to_be_bytes());
            buf.push(REL_DOUBLE);
        }
        Value::Integer(i) => {
            let image = *i as f64;
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&double_key(image).to_be_bytes());
            let rel = match crate::value::compare::cmp_int_double(*i, image) {
                Ordering::Less => REL_BELOW,
                Ordering::Equal => REL_EXACT,
                Ordering::Greater => REL_ABOVE,
            };
            buf.push(rel);
            buf.extend_from_slice(&((*i as u64) ^ (1 << 63)).to_be_bytes());
        }
        Value::Text(s) => {
            buf.push(TAG_TEXT);
            write_escaped(buf, s.as_bytes());
        }
        Value::Blob(b) => {
            buf.push(TAG_BLOB);
            write_escaped(buf, b);
        }
        Value::Array(items) => {
            buf.push(TAG_ARRAY);
            for item in items {
                write_value(buf, item, canonical);
            }
            buf.push(END);
        }
        Value::Document(doc) => write_document(buf, doc, canonical),
    }
}

fn write_document(buf: &mut Vec<u8>, doc: &Document, canonical: bool) {
    buf.push(TAG_DOCUMENT);
    if canonical {
        for (name, value) in doc.sorted_fields() {
            write_field(buf, name, value, canonical);
        }
    } else {
        for (name, value) in doc.iter() {
            write_field(buf, name, value, canonical);
        }
    }
    buf.push(END);
}

fn write_field(buf: &mut Vec<u8>, name: &str, value: &Value, canonical: bool) {
    buf.push(FIELD);
    write_escaped(buf, name.as_bytes());
    write_value(buf, value, canonical);
}

fn write_escaped(buf: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        buf.push(b);
        if b == 0x00 {
            buf.push(0xff);
        }
    }
    buf.push(0x00);
    buf.push(0x01);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> DocqlResult<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| DocqlError::encoding("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn u64(&mut self) -> DocqlResult<u64> {
        let end = self.pos + 8;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| DocqlError::encoding("truncated number"))?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(slice);
        self.pos = end;
        Ok(u64::from_be_bytes(raw))
    }

    fn escaped(&mut self) -> DocqlResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = self.byte()?;
            if b != 0x00 {
                out.push(b);
                continue;
            }
            match self.byte()? {
                0xff => out.push(0x00),
                0x01 => return Ok(out),
                other => {
                    return Err(DocqlError::encoding(format!(
                        "invalid escape sequence 00 {other:02x}"
                    )));
                }
            }
        }
    }

    fn peek(&self) -> DocqlResult<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| DocqlError::encoding("unexpected end of input"))
    }

    fn read_value(&mut self) -> DocqlResult<Value> {
        let tag = self.byte()?;
        let v = match tag {
            TAG_NULL => Value::Null,
            TAG_FALSE => Value::Bool(false),
            TAG_TRUE => Value::Bool(true),
            TAG_NUMBER => {
                let image = self.u64()?;
                match self.byte()? {
                    REL_DOUBLE => Value::Double(double_from_key(image)),
                    REL_BELOW | REL_EXACT | REL_ABOVE => {
                        Value::Integer((self.u64()? ^ (1 << 63)) as i64)
                    }
                    other => {
                        return Err(DocqlError::encoding(format!("invalid number marker {other:02x}")));
                    }
                }
            }
            TAG_TEXT => {
                let bytes = self.escaped()?;
                Value::Text(
                    String::from_utf8(bytes).map_err(|_| DocqlError::encoding("invalid utf-8 text"))?,
                )
            }
            TAG_BLOB => Value::Blob(self.escaped()?),
            TAG_ARRAY => {
                let mut items = Vec::new();
                while self.peek()? != END {
                    items.push(self.read_value()?);
                }
                self.pos += 1;
                Value::Array(items)
            }
            TAG_DOCUMENT => {
                let mut doc = Document::new();
                loop {
                    match self.byte()? {
                        END => break,
                        FIELD => {
                            let name = String::from_utf8(self.escaped()?)
                                .map_err(|_| DocqlError::encoding("invalid utf-8 field name"))?;
                            let value = self.read_value()?;
                            doc.set(name, value);
                        }
                        other => {
                            return Err(DocqlError::encoding(format!("invalid field marker {other:02x}")));
                        }
                    }
                }
                Value::Document(doc)
            }
            other => return Err(DocqlError::encoding(format!("unknown type tag {other:02x}"))),
        };
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(v: impl Into<Value>) -> Vec<u8> {
        encode_value(&v.into())
    }

    #[test]
    fn numbers_interleave() {
        assert!(enc(1) < enc(1.5));
        assert!(enc(1.5) < enc(2));
        assert!(enc(2.0) < enc(2));
        assert!(enc(2) < enc(2.5));
        assert!(enc(-3) < enc(-2.5));
        assert!(enc(i64::MIN) < enc(-1e10));
        assert!(enc(i64::MAX) < enc(f64::INFINITY));
    }

    #[test]
    fn large_integers_sharing_an_image() {
        let base: i64 = 1 << 53;
        // base + 3 rounds up to base + 4
        assert!(enc(base + 3) < enc((base + 4) as f64));
        assert!(enc(base + 1) < enc(base + 2));
        assert!(enc(base + 3) < enc(base + 4));
        assert!(enc((base + 4) as f64) < enc(base + 4));
    }

    #[test]
    fn text_with_nul_bytes() {
        assert!(enc("a") < enc("a\0"));
        assert!(enc("a\0") < enc("a\0\0"));
        assert!(enc("a\0b") < enc("ab"));
        assert_eq!(decode_value(&enc("x\0y")).unwrap(), Value::from("x\0y"));
    }

    #[test]
    fn composite_keys_keep_component_order() {
        let a = encode_values(&[Value::from("a"), Value::Integer(9)]);
        let b = encode_values(&[Value::from("ab"), Value::Integer(1)]);
        assert!(a < b);
        let (prefix, rest) = decode_prefix(&a, 1).unwrap();
        assert_eq!(prefix, vec![Value::from("a")]);
        assert_eq!(decode_values(rest).unwrap(), vec![Value::Integer(9)]);
    }

    #[test]
    fn row_encoding_keeps_field_order() {
        let doc = Document::new()
            .with("z", 1)
            .with("a", vec![Value::Null, Value::Bool(true)]);
        let decoded = decode_document(&encode_document(&doc)).unwrap();
        let names: Vec<_> = decoded.field_names().collect();
        assert_eq!(names, vec!["z", "a"]);
        assert_eq!(decoded, doc);
    }

    #[test]
    fn canonical_document_keys_ignore_field_order() {
        let a = Value::Document(Document::new().with("x", 1).with("y", 2));
        let b = Value::Document(Document::new().with("y", 2).with("x", 1));
        assert_eq!(encode_value(&a), encode_value(&b));
    }

    #[test]
    fn corrupt_input_is_an_error() {
        assert!(decode_value(&[]).is_err());
        assert!(decode_value(&[0x99]).is_err());
        assert!(decode_value(&[TAG_TEXT, b'a']).is_err());
        assert!(decode_value(&[TAG_NULL, TAG_NULL]).is_err());
    }

    #[test]
    fn integral_doubles_share_the_integer_key() {
        assert_eq!(
            encode_key(&[Value::Double(2.0)]),
            encode_key(&[Value::Integer(2)])
        );
        assert_eq!(encode_key(&[Value::Double(-0.0)]), encode_key(&[Value::Integer(0)]));
        assert_ne!(encode_key(&[Value::Double(2.5)]), encode_key(&[Value::Integer(2)]));
        let nested = Value::Array(vec![Value::Double(1.0)]);
        assert_eq!(
            encode_key(&[nested]),
            encode_key(&[Value::Array(vec![Value::Integer(1)])])
        );
        // out of i64 range stays a double
        assert_eq!(
            decode_values(&encode_key(&[Value::Double(1e19)])).unwrap(),
            vec![Value::Double(1e19)]
        );
    }

    #[test]
    fn equality_prefix_covers_equal_numbers() {
        let prefix = encode_equality_prefix(&[Value::from("k"), Value::Integer(2), Value::from("z")]);
        for v in [Value::Integer(2), Value::Double(2.0)] {
            let entry = encode_values(&[Value::from("k"), v, Value::from("z")]);
            assert!(entry.starts_with(&prefix));
        }
        let other = encode_values(&[Value::from("k"), Value::Double(2.5)]);
        assert!(!other.starts_with(&prefix));
        assert_eq!(encode_equality_prefix(&[Value::from("x")]), enc("x"));
    }

    #[test]
    fn seek_prefix_precedes_equal_numbers() {
        let pivot = encode_seek_prefix(&[Value::from("k"), Value::Integer(2)]);
        let double = encode_values(&[Value::from("k"), Value::Double(2.0)]);
        let int = encode_values(&[Value::from("k"), Value::Integer(2)]);
        let below = encode_values(&[Value::from("k"), Value::Double(1.5)]);
        assert!(below < pivot);
        assert!(pivot < double);
        assert!(pivot < int);
        assert!(encode_seek_prefix(&[]).is_empty());
        assert_eq!(encode_seek_prefix(&[Value::from("x")]), enc("x"));
    }
}
