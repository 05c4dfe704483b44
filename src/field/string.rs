//! `TEXT`/`VARCHAR`/`BPCHAR`/`NAME` converters. PostgreSQL's binary and text
//! representations for these types are both just UTF-8 bytes, so one code
//! path serves both formats.

use crate::error::{Error, Result};
use crate::field::{Deserializer, Serializer, Value};
use crate::message::types::FormatCode;

impl Serializer for &str {
    fn size(&self) -> Option<usize> {
        Some((*self).len())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.extend_from_slice(self.as_bytes());
        Ok(self.len())
    }
}

impl Serializer for String {
    fn size(&self) -> Option<usize> {
        Some(self.len())
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.extend_from_slice(self.as_bytes());
        Ok(self.len())
    }
}

impl<'a> Deserializer<'a> for String {
    fn deserialize(is_null: bool, bytes: &'a [u8], _format: FormatCode) -> Result<Self> {
        if is_null {
            return Err(Error::Deserialize("text: unexpected NULL".into()));
        }
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| Error::Deserialize(format!("text: invalid utf-8: {e}")))
    }
}

impl<'a> Deserializer<'a> for &'a str {
    fn deserialize(is_null: bool, bytes: &'a [u8], _format: FormatCode) -> Result<Self> {
        if is_null {
            return Err(Error::Deserialize("text: unexpected NULL".into()));
        }
        std::str::from_utf8(bytes).map_err(|e| Error::Deserialize(format!("text: invalid utf-8: {e}")))
    }
}

pub(super) fn decode_text(is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
    if is_null {
        return Ok(Value::Null);
    }
    String::deserialize(is_null, bytes, format).map(Value::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::serialize_param;

    #[test]
    fn owned_and_borrowed_str_serialize_identically() {
        let owned = String::from("hello");
        let borrowed: &str = "hello";
        assert_eq!(
            serialize_param(&owned).unwrap(),
            serialize_param(&borrowed).unwrap()
        );
    }

    #[test]
    fn deserialize_rejects_invalid_utf8() {
        let err = String::deserialize(false, &[0xff, 0xfe], FormatCode::Text).unwrap_err();
        assert!(matches!(err, Error::Deserialize(_)));
    }

    #[test]
    fn borrowed_str_deserializes_without_copy() {
        let bytes = b"hi there";
        let value = <&str>::deserialize(false, bytes, FormatCode::Text).unwrap();
        assert_eq!(value, "hi there");
    }
}
