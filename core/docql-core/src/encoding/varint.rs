//! Unsigned LEB128 varints, used for generated store names.

use crate::error::{DocqlError, DocqlResult};

pub fn put_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Returns the decoded value and the number of bytes read.
pub fn uvarint(bytes: &[u8]) -> DocqlResult<(u64, usize)> {
    let mut v: u64 = 0;
    for (i, &b) in bytes.iter().enumerate().take(10) {
        v |= ((b & 0x7f) as u64) << (7 * i);
        if b < 0x80 {
            return Ok((v, i + 1));
        }
    }
    Err(DocqlError::encoding("invalid uvarint"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for v in [0u64, 1, 127, 128, 300, 1 << 40, u64::MAX] {
            let mut buf = Vec::new();
            put_uvarint(&mut buf, v);
            assert_eq!(uvarint(&buf).unwrap(), (v, buf.len()));
        }
    }

    #[test]
    fn truncated() {
        assert!(uvarint(&[0x80, 0x80]).is_err());
        assert!(uvarint(&[]).is_err());
    }
}
