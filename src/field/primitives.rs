//! Fixed-width numeric and boolean converters.

use crate::error::{Error, Result};
use crate::field::{Deserializer, Serializer, Value};
use crate::message::types::FormatCode;

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::Deserialize(format!("invalid utf-8: {e}")))
}

impl Serializer for bool {
    fn size(&self) -> Option<usize> {
        Some(1)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.push(if *self { 1 } else { 0 });
        Ok(1)
    }
}

impl<'a> Deserializer<'a> for bool {
    fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self> {
        if is_null {
            return Err(Error::Deserialize("bool: unexpected NULL".into()));
        }
        match format {
            FormatCode::Binary => match bytes {
                [0] => Ok(false),
                [_] => Ok(true),
                _ => Err(Error::Deserialize(format!(
                    "bool: expected 1 byte, got {}",
                    bytes.len()
                ))),
            },
            FormatCode::Text => match utf8(bytes)? {
                "t" | "true" | "TRUE" | "1" => Ok(true),
                "f" | "false" | "FALSE" | "0" => Ok(false),
                other => Err(Error::Deserialize(format!("bool: invalid text {other:?}"))),
            },
        }
    }
}

pub(super) fn decode_bool(is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
    if is_null {
        return Ok(Value::Null);
    }
    <bool as Deserializer>::deserialize(is_null, bytes, format).map(Value::Bool)
}

macro_rules! impl_int {
    ($ty:ty, $decode_fn:ident, $variant:ident) => {
        impl Serializer for $ty {
            fn size(&self) -> Option<usize> {
                Some(std::mem::size_of::<$ty>())
            }

            fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
                let bytes = self.to_be_bytes();
                out.extend_from_slice(&bytes);
                Ok(bytes.len())
            }
        }

        impl<'a> Deserializer<'a> for $ty {
            fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self> {
                if is_null {
                    return Err(Error::Deserialize(concat!(
                        stringify!($ty),
                        ": unexpected NULL"
                    )
                    .to_string()));
                }
                match format {
                    FormatCode::Binary => {
                        let arr: [u8; std::mem::size_of::<$ty>()] =
                            bytes.try_into().map_err(|_| {
                                Error::Deserialize(format!(
                                    concat!(stringify!($ty), ": expected {} bytes, got {}"),
                                    std::mem::size_of::<$ty>(),
                                    bytes.len()
                                ))
                            })?;
                        Ok(<$ty>::from_be_bytes(arr))
                    }
                    FormatCode::Text => utf8(bytes)?
                        .parse::<$ty>()
                        .map_err(|e| Error::Deserialize(e.to_string())),
                }
            }
        }

        pub(super) fn $decode_fn(is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
            if is_null {
                return Ok(Value::Null);
            }
            <$ty as Deserializer>::deserialize(is_null, bytes, format).map(Value::$variant)
        }
    };
}

impl_int!(i16, decode_i16, Int2);
impl_int!(i32, decode_i32, Int4);
impl_int!(i64, decode_i64, Int8);
impl_int!(u32, decode_oid, Oid);

impl Serializer for f32 {
    fn size(&self) -> Option<usize> {
        Some(4)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.extend_from_slice(&self.to_be_bytes());
        Ok(4)
    }
}

impl<'a> Deserializer<'a> for f32 {
    fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self> {
        if is_null {
            return Err(Error::Deserialize("f32: unexpected NULL".into()));
        }
        match format {
            FormatCode::Binary => {
                let arr: [u8; 4] = bytes
                    .try_into()
                    .map_err(|_| Error::Deserialize("f32: expected 4 bytes".into()))?;
                Ok(f32::from_be_bytes(arr))
            }
            FormatCode::Text => utf8(bytes)?
                .parse::<f32>()
                .map_err(|e| Error::Deserialize(e.to_string())),
        }
    }
}

pub(super) fn decode_f32(is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
    if is_null {
        return Ok(Value::Null);
    }
    <f32 as Deserializer>::deserialize(is_null, bytes, format).map(Value::Float4)
}

impl Serializer for f64 {
    fn size(&self) -> Option<usize> {
        Some(8)
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<usize> {
        out.extend_from_slice(&self.to_be_bytes());
        Ok(8)
    }
}

impl<'a> Deserializer<'a> for f64 {
    fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self> {
        if is_null {
            return Err(Error::Deserialize("f64: unexpected NULL".into()));
        }
        match format {
            FormatCode::Binary => {
                let arr: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| Error::Deserialize("f64: expected 8 bytes".into()))?;
                Ok(f64::from_be_bytes(arr))
            }
            FormatCode::Text => utf8(bytes)?
                .parse::<f64>()
                .map_err(|e| Error::Deserialize(e.to_string())),
        }
    }
}

pub(super) fn decode_f64(is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
    if is_null {
        return Ok(Value::Null);
    }
    <f64 as Deserializer>::deserialize(is_null, bytes, format).map(Value::Float8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::serialize_param;

    #[test]
    fn bool_binary_round_trips() {
        let encoded = serialize_param(&true).unwrap().unwrap();
        let decoded = bool::deserialize(false, &encoded, FormatCode::Binary).unwrap();
        assert!(decoded);
    }

    #[test]
    fn i32_text_and_binary_agree() {
        let value: i32 = -7;
        let encoded = serialize_param(&value).unwrap().unwrap();
        let from_binary = i32::deserialize(false, &encoded, FormatCode::Binary).unwrap();
        let from_text = i32::deserialize(false, b"-7", FormatCode::Text).unwrap();
        assert_eq!(from_binary, value);
        assert_eq!(from_text, value);
    }

    #[test]
    fn f64_binary_round_trips() {
        let value: f64 = 3.5;
        let encoded = serialize_param(&value).unwrap().unwrap();
        let decoded = f64::deserialize(false, &encoded, FormatCode::Binary).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn null_is_rejected_by_non_option_deserializer() {
        let err = i32::deserialize(true, &[], FormatCode::Binary).unwrap_err();
        assert!(matches!(err, Error::Deserialize(_)));
    }
}
