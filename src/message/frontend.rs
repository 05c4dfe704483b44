//! Client-to-server message encoders.

use crate::message::types::{FormatCode, Oid};
use crate::wire::MessageBuilder;

/// Frontend message type bytes.
pub mod msg_type {
    pub const PASSWORD: u8 = b'p';
    pub const QUERY: u8 = b'Q';
    pub const PARSE: u8 = b'P';
    pub const BIND: u8 = b'B';
    pub const EXECUTE: u8 = b'E';
    pub const DESCRIBE: u8 = b'D';
    pub const CLOSE: u8 = b'C';
    pub const SYNC: u8 = b'S';
    pub const FLUSH: u8 = b'H';
    pub const COPY_DATA: u8 = b'd';
    pub const COPY_DONE: u8 = b'c';
    pub const COPY_FAIL: u8 = b'f';
    pub const TERMINATE: u8 = b'X';
}

pub const PROTOCOL_VERSION_3_0: i32 = 196_608;
pub const SSL_REQUEST_CODE: i32 = 80_877_103;
pub const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// `SSLRequest`: sent in place of a `StartupMessage` to ask for TLS before
/// the real startup. The server answers with a single byte, 'S' or 'N',
/// read directly off the wire rather than framed as a normal message.
pub fn build_ssl_request(buf: &mut Vec<u8>) {
    let mut msg = MessageBuilder::new_untyped(buf);
    msg.write_i32(SSL_REQUEST_CODE);
    msg.finish();
}

/// `StartupMessage`: protocol version followed by a NUL-terminated list of
/// `(name, value)` pairs, NUL-terminated itself.
pub fn build_startup(buf: &mut Vec<u8>, params: &[(&str, &str)]) {
    let mut msg = MessageBuilder::new_untyped(buf);
    msg.write_i32(PROTOCOL_VERSION_3_0);
    for (name, value) in params {
        msg.write_cstr(name);
        msg.write_cstr(value);
    }
    msg.write_u8(0);
    msg.finish();
}

/// `CancelRequest`: sent on a freshly-opened, unauthenticated connection
/// (the transport's `duplicate()`) to ask the server to cancel the query
/// in progress on the connection identified by `pid`/`secret_key`. The
/// server closes this connection without responding.
pub fn build_cancel_request(buf: &mut Vec<u8>, pid: u32, secret_key: u32) {
    let mut msg = MessageBuilder::new_untyped(buf);
    msg.write_i32(CANCEL_REQUEST_CODE);
    msg.write_i32(pid as i32);
    msg.write_i32(secret_key as i32);
    msg.finish();
}

/// `PasswordMessage`. Used for both cleartext and MD5 authentication; the
/// caller pre-hashes for MD5.
pub fn build_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish();
}

/// `Terminate`: the clean-shutdown frame. Idempotent at the session layer;
/// always a fixed 5 bytes on the wire.
pub fn build_terminate(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::TERMINATE);
    msg.finish();
}

/// `Query` (simple query protocol). May contain several `;`-separated
/// statements; the backend responds to each in turn before `ReadyForQuery`.
pub fn build_query(buf: &mut Vec<u8>, query: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::QUERY);
    msg.write_cstr(query);
    msg.finish();
}

/// `Parse`: compiles `query` into a named (or unnamed, `""`) prepared
/// statement. `param_oids` may contain `0` entries to let the server infer
/// the parameter's type.
pub fn build_parse(buf: &mut Vec<u8>, statement_name: &str, query: &str, param_oids: &[Oid]) {
    let mut msg = MessageBuilder::new(buf, msg_type::PARSE);
    msg.write_cstr(statement_name);
    msg.write_cstr(query);
    msg.write_i16(param_oids.len() as i16);
    for &oid in param_oids {
        msg.write_i32(oid as i32);
    }
    msg.finish();
}

/// `Bind`: creates a named (or unnamed) portal from a prepared statement.
/// `params` holds one already-`Serializer`-encoded value per parameter
/// (`None` for SQL NULL); `param_formats`/`result_formats` must either be
/// empty (meaning "all text"), length 1 (meaning "all this format"), or
/// exactly match the parameter/result column count.
pub fn build_bind(
    buf: &mut Vec<u8>,
    portal_name: &str,
    statement_name: &str,
    params: &[Option<Vec<u8>>],
    param_formats: &[FormatCode],
    result_formats: &[FormatCode],
) {
    let mut msg = MessageBuilder::new(buf, msg_type::BIND);
    msg.write_cstr(portal_name);
    msg.write_cstr(statement_name);

    msg.write_i16(param_formats.len() as i16);
    for &fmt in param_formats {
        msg.write_i16(fmt as i16);
    }

    msg.write_i16(params.len() as i16);
    for param in params {
        match param {
            Some(bytes) => {
                msg.write_i32(bytes.len() as i32);
                msg.write_bytes(bytes);
            }
            None => msg.write_i32(-1),
        }
    }

    msg.write_i16(result_formats.len() as i16);
    for &fmt in result_formats {
        msg.write_i16(fmt as i16);
    }

    msg.finish();
}

/// `Execute`: runs a portal. `max_rows` of `0` means unlimited.
pub fn build_execute(buf: &mut Vec<u8>, portal_name: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, msg_type::EXECUTE);
    msg.write_cstr(portal_name);
    msg.write_i32(max_rows as i32);
    msg.finish();
}

/// Discriminator for `Describe`/`Close`'s target kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    Statement,
    Portal,
}

impl DescribeTarget {
    fn as_byte(self) -> u8 {
        match self {
            DescribeTarget::Statement => b'S',
            DescribeTarget::Portal => b'P',
        }
    }
}

/// `Describe`: asks for a statement's `ParameterDescription`+
/// `RowDescription`, or a portal's `RowDescription` alone.
pub fn build_describe(buf: &mut Vec<u8>, target: DescribeTarget, name: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::DESCRIBE);
    msg.write_u8(target.as_byte());
    msg.write_cstr(name);
    msg.finish();
}

/// `Close`: releases a named statement or portal.
pub fn build_close(buf: &mut Vec<u8>, target: DescribeTarget, name: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::CLOSE);
    msg.write_u8(target.as_byte());
    msg.write_cstr(name);
    msg.finish();
}

/// `Sync`: ends an extended-query sequence. Always triggers a matching
/// `ReadyForQuery`, even after an error aborted the sequence.
pub fn build_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::SYNC);
    msg.finish();
}

/// `Flush`: asks the server to send everything buffered so far without
/// ending the extended-query sequence (no `ReadyForQuery` follows).
pub fn build_flush(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::FLUSH);
    msg.finish();
}

/// `CopyData` (frontend → backend direction, during `CopyIn`/`CopyBoth`).
pub fn build_copy_data(buf: &mut Vec<u8>, data: &[u8]) {
    let mut msg = MessageBuilder::new(buf, msg_type::COPY_DATA);
    msg.write_bytes(data);
    msg.finish();
}

/// `CopyDone`: signals a clean end to a `CopyIn`/`CopyBoth` stream.
pub fn build_copy_done(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::COPY_DONE);
    msg.finish();
}

/// `CopyFail`: aborts a `CopyIn`/`CopyBoth` stream with a client-supplied
/// error message; the server turns this into an `ErrorResponse`.
pub fn build_copy_fail(buf: &mut Vec<u8>, error_message: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::COPY_FAIL);
    msg.write_cstr(error_message);
    msg.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssl_request_is_fixed_eight_bytes() {
        let mut buf = Vec::new();
        build_ssl_request(&mut buf);
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[0..4], &8_i32.to_be_bytes());
        assert_eq!(&buf[4..8], &SSL_REQUEST_CODE.to_be_bytes());
    }

    #[test]
    fn startup_carries_protocol_version_and_params() {
        let mut buf = Vec::new();
        build_startup(&mut buf, &[("user", "postgres"), ("database", "test")]);
        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len());
        let version = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(version, PROTOCOL_VERSION_3_0);
    }

    #[test]
    fn terminate_is_fixed_five_bytes() {
        let mut buf = Vec::new();
        build_terminate(&mut buf);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], b'X');
        assert_eq!(&buf[1..5], &4_i32.to_be_bytes());
    }

    #[test]
    fn query_length_matches_payload() {
        let mut buf = Vec::new();
        build_query(&mut buf, "SELECT 1");
        assert_eq!(buf[0], b'Q');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len, 13);
        assert_eq!(&buf[5..14], b"SELECT 1\0");
    }

    #[test]
    fn bind_encodes_null_and_present_params() {
        let mut buf = Vec::new();
        build_bind(
            &mut buf,
            "",
            "stmt1",
            &[Some(vec![0, 0, 0, 42]), None],
            &[FormatCode::Binary],
            &[FormatCode::Binary],
        );
        assert_eq!(buf[0], b'B');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
    }

    #[test]
    fn sync_and_flush_are_fixed_five_bytes() {
        let mut buf = Vec::new();
        build_sync(&mut buf);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], b'S');

        let mut buf = Vec::new();
        build_flush(&mut buf);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], b'H');
    }

    #[test]
    fn execute_length_matches_payload() {
        let mut buf = Vec::new();
        build_execute(&mut buf, "", 0);
        assert_eq!(buf[0], b'E');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len, 9);
    }

    #[test]
    fn copy_messages_round_trip_length() {
        let mut buf = Vec::new();
        build_copy_data(&mut buf, b"hello\tworld\n");
        assert_eq!(buf[0], b'd');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);

        let mut buf = Vec::new();
        build_copy_done(&mut buf);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], b'c');

        let mut buf = Vec::new();
        build_copy_fail(&mut buf, "aborted");
        assert_eq!(buf[0], b'f');
    }
}
