//! `BYTEA` converter. Binary format is the raw bytes; text format is
//! PostgreSQL's `\x`-prefixed hex encoding (the modern default; the legacy
//! escape format is not produced by any server this crate targets and is
//! not accepted on decode).

use crate::error::{Error, Result};
use crate::field::{Deserializer, Serializer, Value};
use crate::message::types::FormatCode;

impl Serializer for &[u8] {
    fn size(&self) -> Option<usize> {
        Some(self.len())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.extend_from_slice(self);
        Ok(self.len())
    }
}

impl Serializer for Vec<u8> {
    fn size(&self) -> Option<usize> {
        Some(self.len())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.extend_from_slice(self);
        Ok(self.len())
    }
}

fn hex_digit(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::Deserialize(format!("bytea: invalid hex digit {b:#x}"))),
    }
}

fn decode_hex(digits: &[u8]) -> Result<Vec<u8>> {
    if digits.len() % 2 != 0 {
        return Err(Error::Deserialize("bytea: odd number of hex digits".into()));
    }
    digits
        .chunks_exact(2)
        .map(|pair| Ok(hex_digit(pair[0])? << 4 | hex_digit(pair[1])?))
        .collect()
}

impl<'a> Deserializer<'a> for Vec<u8> {
    fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self> {
        if is_null {
            return Err(Error::Deserialize("bytea: unexpected NULL".into()));
        }
        match format {
            FormatCode::Binary => Ok(bytes.to_vec()),
            FormatCode::Text => match bytes.strip_prefix(b"\\x") {
                Some(digits) => decode_hex(digits),
                None => Err(Error::Deserialize(
                    "bytea: expected \\x-prefixed hex text encoding".into(),
                )),
            },
        }
    }
}

pub(super) fn decode_bytea(is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
    if is_null {
        return Ok(Value::Null);
    }
    Vec::<u8>::deserialize(is_null, bytes, format).map(Value::Bytea)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::serialize_param;

    #[test]
    fn binary_round_trips_raw_bytes() {
        let value: Vec<u8> = vec![0xde, 0xad, 0xbe, 0xef];
        let encoded = serialize_param(&value).unwrap().unwrap();
        assert_eq!(encoded, value);
        let decoded = Vec::<u8>::deserialize(false, &encoded, FormatCode::Binary).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn text_hex_decodes() {
        let decoded = Vec::<u8>::deserialize(false, b"\\xdeadbeef", FormatCode::Text).unwrap();
        assert_eq!(decoded, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn text_without_prefix_is_rejected() {
        let err = Vec::<u8>::deserialize(false, b"deadbeef", FormatCode::Text).unwrap_err();
        assert!(matches!(err, Error::Deserialize(_)));
    }

    #[test]
    fn odd_length_hex_is_rejected() {
        let err = Vec::<u8>::deserialize(false, b"\\xabc", FormatCode::Text).unwrap_err();
        assert!(matches!(err, Error::Deserialize(_)));
    }
}
