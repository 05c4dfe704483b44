//! Field (de)serialization: the `Serializer`/`Deserializer` contract used
//! by `Bind` parameter encoding and `DataRow` column decoding, plus a
//! static OID → `Value` decoder registry for callers that want a
//! dynamically-typed view of a row instead of a statically-typed one.

mod bytes;
mod primitives;
mod string;
#[cfg(feature = "with-uuid")]
mod uuid_field;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::message::types::{FormatCode, Oid, oid};

/// Wire length used for SQL NULL in any length-prefixed field (`Bind`
/// parameters, `DataRow` columns).
pub const NULL_LENGTH: i32 = -1;

/// Encodes a Rust value into the wire representation of one `Bind`
/// parameter.
///
/// Two passes, matching how `Bind` must be built: `size()` is called
/// first to learn how many bytes the value needs (or that it's SQL NULL,
/// encoded as length `-1` with no body), then `write()` appends exactly
/// that many bytes.
pub trait Serializer {
    /// Byte length of the encoded value, or `None` for SQL NULL.
    fn size(&self) -> Option<usize>;

    /// Append the encoded value to `out`. Only called when `size()`
    /// returned `Some`. Returns the number of bytes appended, which must
    /// equal `size()`'s result.
    fn write(&self, out: &mut Vec<u8>) -> Result<usize>;
}

/// Encode `value` as a `Bind` parameter: `None` for SQL NULL, `Some(bytes)`
/// otherwise.
pub fn serialize_param<S: Serializer>(value: &S) -> Result<Option<Vec<u8>>> {
    let Some(size) = value.size() else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(size);
    let written = value.write(&mut out)?;
    if written != size {
        return Err(Error::Serialize(format!(
            "size()/write() disagreed: size={size} written={written}"
        )));
    }
    Ok(Some(out))
}

/// Decodes a `DataRow` column into a Rust value.
///
/// `is_null` mirrors the wire's length `-1` marker; when true, `bytes` is
/// empty and carries no information. `format` tells the implementation
/// whether `bytes` is PostgreSQL's text or binary representation.
pub trait Deserializer<'a>: Sized {
    fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self>;
}

impl<'a, T: Deserializer<'a>> Deserializer<'a> for Option<T> {
    fn deserialize(is_null: bool, bytes: &'a [u8], format: FormatCode) -> Result<Self> {
        if is_null {
            Ok(None)
        } else {
            T::deserialize(false, bytes, format).map(Some)
        }
    }
}

/// A dynamically-typed column value, for callers that want to inspect a
/// row without picking a Rust type with `Deserializer::deserialize` ahead
/// of time. Covers the natively-supported scalar set plus SQL NULL and
/// text decoded for an OID the `Registry` has no dedicated converter for.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Oid(Oid),
    Text(String),
    Bytea(Vec<u8>),
    #[cfg(feature = "with-uuid")]
    Uuid(uuid::Uuid),
    /// Text-format bytes decoded for an OID the registry has no
    /// dedicated converter for (the unknown-OID fallback rule).
    UnknownText(String),
}

/// A column decoder producing a dynamically-typed `Value`.
pub type DecodeFn = fn(bool, &[u8], FormatCode) -> Result<Value>;

/// OID → decoder registry, with the fallback rule: an unrecognized OID in
/// TEXT format decodes as `Value::UnknownText` (PostgreSQL's text encoding
/// is the type's own display form, so this is almost always usable as-is);
/// an unrecognized OID in BINARY format cannot be safely interpreted and
/// is a `DeserializationError`.
pub struct Registry {
    deserializers: HashMap<Oid, DecodeFn>,
}

impl Registry {
    /// A registry pre-populated with this crate's built-in converters.
    pub fn new() -> Self {
        let mut registry = Self {
            deserializers: HashMap::new(),
        };
        registry.register(oid::BOOL, primitives::decode_bool);
        registry.register(oid::INT2, primitives::decode_i16);
        registry.register(oid::INT4, primitives::decode_i32);
        registry.register(oid::INT8, primitives::decode_i64);
        registry.register(oid::FLOAT4, primitives::decode_f32);
        registry.register(oid::FLOAT8, primitives::decode_f64);
        registry.register(oid::OID, primitives::decode_oid);
        registry.register(oid::TEXT, string::decode_text);
        registry.register(oid::VARCHAR, string::decode_text);
        registry.register(oid::BPCHAR, string::decode_text);
        registry.register(oid::NAME, string::decode_text);
        registry.register(oid::BYTEA, bytes::decode_bytea);
        #[cfg(feature = "with-uuid")]
        registry.register(oid::UUID, uuid_field::decode_uuid);
        registry
    }

    /// Register (or override) the decoder used for `type_oid`. Lets
    /// callers teach the registry about extension types without forking
    /// the crate.
    pub fn register(&mut self, type_oid: Oid, decode: DecodeFn) {
        self.deserializers.insert(type_oid, decode);
    }

    /// Decode one column to a `Value`, applying the unknown-OID fallback
    /// rule.
    pub fn decode(&self, type_oid: Oid, is_null: bool, bytes: &[u8], format: FormatCode) -> Result<Value> {
        if is_null {
            return Ok(Value::Null);
        }
        match self.deserializers.get(&type_oid) {
            Some(decode) => decode(is_null, bytes, format),
            None => match format {
                FormatCode::Text => {
                    let text = match string::decode_text(is_null, bytes, format)? {
                        Value::Text(s) => s,
                        _ => unreachable!("decode_text always returns Value::Text"),
                    };
                    Ok(Value::UnknownText(text))
                }
                FormatCode::Binary => Err(Error::Deserialize(format!(
                    "no binary deserializer registered for oid {type_oid}"
                ))),
            },
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_oid_text_falls_back_to_unknown_text() {
        let registry = Registry::new();
        let decoded = registry
            .decode(999_999, false, b"hello", FormatCode::Text)
            .unwrap();
        assert_eq!(decoded, Value::UnknownText("hello".to_string()));
    }

    #[test]
    fn unknown_oid_binary_is_an_error() {
        let registry = Registry::new();
        let err = registry
            .decode(999_999, false, b"\x00\x00\x00\x01", FormatCode::Binary)
            .unwrap_err();
        assert!(matches!(err, Error::Deserialize(_)));
    }

    #[test]
    fn null_short_circuits_before_lookup() {
        let registry = Registry::new();
        let decoded = registry.decode(oid::INT4, true, &[], FormatCode::Binary).unwrap();
        assert_eq!(decoded, Value::Null);
    }

    #[test]
    fn known_oid_decodes_to_native_variant() {
        let registry = Registry::new();
        let decoded = registry
            .decode(oid::INT4, false, b"42", FormatCode::Text)
            .unwrap();
        assert_eq!(decoded, Value::Int4(42));
    }

    #[test]
    fn serialize_param_roundtrips_size_and_write() {
        let value: i32 = 42;
        let encoded = serialize_param(&value).unwrap().unwrap();
        assert_eq!(encoded, 42i32.to_be_bytes());
    }

    #[test]
    fn serialize_param_none_is_null() {
        let value: Option<i32> = None;
        assert_eq!(serialize_param(&value).unwrap(), None);
    }
}
