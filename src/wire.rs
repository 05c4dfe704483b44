//! Big-endian wire primitives shared by frontend encoders and backend
//! decoders.
//!
//! PostgreSQL uses network byte order (big-endian) for every integer on
//! the wire.

use crate::error::{Error, Result};
use zerocopy::FromBytes;

use crate::message::types::{I16Be, I32Be, U16Be, U32Be};

#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    if data.is_empty() {
        return Err(Error::Protocol("read_u8: empty buffer".into()));
    }
    Ok((data[0], &data[1..]))
}

#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::Protocol(format!(
            "read_i16: buffer too short: {} < 2",
            data.len()
        )));
    }
    let value = I16Be::ref_from_bytes(&data[..2])
        .map_err(|e| Error::Protocol(format!("read_i16: {e:?}")))?
        .get();
    Ok((value, &data[2..]))
}

#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::Protocol(format!(
            "read_u16: buffer too short: {} < 2",
            data.len()
        )));
    }
    let value = U16Be::ref_from_bytes(&data[..2])
        .map_err(|e| Error::Protocol(format!("read_u16: {e:?}")))?
        .get();
    Ok((value, &data[2..]))
}

#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::Protocol(format!(
            "read_i32: buffer too short: {} < 4",
            data.len()
        )));
    }
    let value = I32Be::ref_from_bytes(&data[..4])
        .map_err(|e| Error::Protocol(format!("read_i32: {e:?}")))?
        .get();
    Ok((value, &data[4..]))
}

#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::Protocol(format!(
            "read_u32: buffer too short: {} < 4",
            data.len()
        )));
    }
    let value = U32Be::ref_from_bytes(&data[..4])
        .map_err(|e| Error::Protocol(format!("read_u32: {e:?}")))?
        .get();
    Ok((value, &data[4..]))
}

#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::Protocol(format!(
            "read_bytes: buffer too short: {} < {len}",
            data.len()
        )));
    }
    Ok((&data[..len], &data[len..]))
}

/// Read a null-terminated string, returning the bytes before the NUL
/// (exclusive) and the remainder after it.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::Protocol(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = std::str::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

#[inline]
pub fn write_cstring(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(s);
    out.push(0);
}

#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    write_cstring(out, s.as_bytes());
}

/// Builds a single frontend message: a type byte (optional, for the
/// startup-family messages which have none), a 4-byte length prefix that
/// includes itself, and a payload. `finish()` backpatches the length once
/// the payload is fully written.
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Begin a message with a leading type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    /// Begin a message with no type byte (StartupMessage, SSLRequest,
    /// CancelRequest).
    pub fn new_untyped(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    pub fn buf(&mut self) -> &mut Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    pub fn write_i16(&mut self, value: i16) {
        write_i16(self.buf, value);
    }

    pub fn write_u16(&mut self, value: u16) {
        write_u16(self.buf, value);
    }

    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        write_bytes(self.buf, data);
    }

    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Backpatch the 4-byte length field and consume the builder.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fixed_width_ints() {
        let mut buf = Vec::new();
        write_i16(&mut buf, -42);
        write_u16(&mut buf, 42);
        write_i32(&mut buf, -1);
        write_u32(&mut buf, 196608);
        let (v, rest) = read_i16(&buf).unwrap();
        assert_eq!(v, -42);
        let (v, rest) = read_u16(rest).unwrap();
        assert_eq!(v, 42);
        let (v, rest) = read_i32(rest).unwrap();
        assert_eq!(v, -1);
        let (v, rest) = read_u32(rest).unwrap();
        assert_eq!(v, 196608);
        assert!(rest.is_empty());
    }

    #[test]
    fn cstring_round_trip() {
        let mut buf = Vec::new();
        write_cstr(&mut buf, "hello");
        buf.push(b'X');
        let (s, rest) = read_cstr(&buf).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(rest, b"X");
    }

    #[test]
    fn cstring_missing_terminator_errors() {
        let buf = b"no-terminator".to_vec();
        assert!(read_cstring(&buf).is_err());
    }

    #[test]
    fn message_builder_backpatches_length() {
        let mut buf = Vec::new();
        let mut mb = MessageBuilder::new(&mut buf, b'Q');
        mb.write_cstr("SELECT 1");
        mb.finish();
        assert_eq!(buf[0], b'Q');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
    }
}
