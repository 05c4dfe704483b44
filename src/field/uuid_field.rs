//! `UUID` converter, gated behind the `with-uuid` feature.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::field::{Deserializer, Serializer, Value};
use crate::message::types::FormatCode;

impl Serializer for Uuid {
    fn size(&self) -> Option<usize> {
        Some(16)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.extend_from_slice(self.as_bytes());
        Ok(16)
    }
}

impl<'a> Deserializer<'a> for Uuid {
    fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self> {
        if is_null {
            return Err(Error::Deserialize("uuid: unexpected NULL".into()));
        }
        match format {
            FormatCode::Binary => Uuid::from_slice(bytes)
                .map_err(|e| Error::Deserialize(format!("uuid: {e}"))),
            FormatCode::Text => std::str::from_utf8(bytes)
                .map_err(|e| Error::Deserialize(format!("uuid: invalid utf-8: {e}")))
                .and_then(|s| Uuid::parse_str(s).map_err(|e| Error::Deserialize(format!("uuid: {e}")))),
        }
    }
}

pub(super) fn decode_uuid(is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
    if is_null {
        return Ok(Value::Null);
    }
    Uuid::deserialize(is_null, bytes, format).map(Value::Uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::serialize_param;

    #[test]
    fn binary_round_trips() {
        let value = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let encoded = serialize_param(&value).unwrap().unwrap();
        let decoded = Uuid::deserialize(false, &encoded, FormatCode::Binary).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn text_parses_hyphenated_form() {
        let decoded = Uuid::deserialize(
            false,
            b"550e8400-e29b-41d4-a716-446655440000",
            FormatCode::Text,
        )
        .unwrap();
        assert_eq!(decoded.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }
}
