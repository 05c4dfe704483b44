//! Server-to-client message decoders.

use std::collections::HashMap;
use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result, ServerError};
use crate::message::types::{FormatCode, I16Be, I32Be, Oid, U16Be, U32Be};
use crate::wire::{read_cstr, read_u8, read_u16, read_u32};

/// Backend message type bytes.
pub mod msg_type {
    pub const AUTHENTICATION: u8 = b'R';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ROW_DESCRIPTION: u8 = b'T';
    pub const DATA_ROW: u8 = b'D';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    pub const PARSE_COMPLETE: u8 = b'1';
    pub const BIND_COMPLETE: u8 = b'2';
    pub const CLOSE_COMPLETE: u8 = b'3';
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    pub const NO_DATA: u8 = b'n';
    pub const PORTAL_SUSPENDED: u8 = b's';
    pub const COPY_IN_RESPONSE: u8 = b'G';
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    pub const COPY_BOTH_RESPONSE: u8 = b'W';
    pub const COPY_DATA: u8 = b'd';
    pub const COPY_DONE: u8 = b'c';
    pub const NEGOTIATE_PROTOCOL_VERSION: u8 = b'v';
}

/// An unparsed backend frame: type byte plus the payload that followed the
/// 4-byte length prefix. Individual message bodies are parsed on demand.
#[derive(Debug, Clone, Copy)]
pub struct RawBackendMessage<'a> {
    pub type_byte: u8,
    pub payload: &'a [u8],
}

impl<'a> RawBackendMessage<'a> {
    pub fn new(type_byte: u8, payload: &'a [u8]) -> Self {
        Self { type_byte, payload }
    }

    pub fn is_error(&self) -> bool {
        self.type_byte == msg_type::ERROR_RESPONSE
    }

    pub fn is_notice(&self) -> bool {
        self.type_byte == msg_type::NOTICE_RESPONSE
    }

    pub fn is_notification(&self) -> bool {
        self.type_byte == msg_type::NOTIFICATION_RESPONSE
    }

    pub fn is_parameter_status(&self) -> bool {
        self.type_byte == msg_type::PARAMETER_STATUS
    }

    /// True for the message kinds that may arrive unsolicited at any point
    /// in the protocol: notices, notifications, and parameter changes.
    pub fn is_async(&self) -> bool {
        Self::is_async_type(self.type_byte)
    }

    pub fn is_async_type(type_byte: u8) -> bool {
        matches!(
            type_byte,
            msg_type::NOTICE_RESPONSE | msg_type::NOTIFICATION_RESPONSE | msg_type::PARAMETER_STATUS
        )
    }
}

/// Authentication discriminator values (`Authentication*` messages'
/// leading `i32`). Only `OK`/`CLEARTEXT_PASSWORD`/`MD5_PASSWORD` are
/// actionable here; every other value surfaces as `Error::Unsupported`.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const GSS: i32 = 7;
    pub const GSS_CONTINUE: i32 = 8;
    pub const SSPI: i32 = 9;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// An `Authentication*` message. Kerberos/GSS/SSPI/SASL variants are
/// parsed (so a caller can report *which* mechanism was demanded) but have
/// no frontend response support in this crate.
#[derive(Debug)]
pub enum AuthenticationMessage<'a> {
    Ok,
    KerberosV5,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Gss,
    GssContinue { data: &'a [u8] },
    Sspi,
    Sasl { mechanisms: Vec<&'a str> },
    SaslContinue { data: &'a [u8] },
    SaslFinal { data: &'a [u8] },
}

impl<'a> AuthenticationMessage<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (discriminator, rest) = crate::wire::read_i32(payload)?;
        match discriminator {
            auth_type::OK => Ok(AuthenticationMessage::Ok),
            auth_type::KERBEROS_V5 => Ok(AuthenticationMessage::KerberosV5),
            auth_type::CLEARTEXT_PASSWORD => Ok(AuthenticationMessage::CleartextPassword),
            auth_type::MD5_PASSWORD => {
                if rest.len() < 4 {
                    return Err(Error::Protocol("AuthenticationMD5Password: missing salt".into()));
                }
                let mut salt = [0u8; 4];
                salt.copy_from_slice(&rest[..4]);
                Ok(AuthenticationMessage::Md5Password { salt })
            }
            auth_type::GSS => Ok(AuthenticationMessage::Gss),
            auth_type::GSS_CONTINUE => Ok(AuthenticationMessage::GssContinue { data: rest }),
            auth_type::SSPI => Ok(AuthenticationMessage::Sspi),
            auth_type::SASL => {
                let mut mechanisms = Vec::new();
                let mut data = rest;
                while !data.is_empty() && data[0] != 0 {
                    let (mechanism, remaining) = read_cstr(data)?;
                    mechanisms.push(mechanism);
                    data = remaining;
                }
                Ok(AuthenticationMessage::Sasl { mechanisms })
            }
            auth_type::SASL_CONTINUE => Ok(AuthenticationMessage::SaslContinue { data: rest }),
            auth_type::SASL_FINAL => Ok(AuthenticationMessage::SaslFinal { data: rest }),
            other => Err(Error::Protocol(format!(
                "unknown authentication discriminator: {other}"
            ))),
        }
    }
}

/// `BackendKeyData`: the process id and secret key later used to build a
/// `CancelRequest` on a fresh connection.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    pub pid: U32Be,
    pub secret_key: U32Be,
}

impl BackendKeyData {
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload).map_err(|e| Error::Protocol(format!("BackendKeyData: {e:?}")))
    }

    pub fn process_id(&self) -> u32 {
        self.pid.get()
    }

    pub fn secret(&self) -> u32 {
        self.secret_key.get()
    }
}

/// `ParameterStatus`: a server run-time parameter name/value pair, sent at
/// startup and whenever the value changes thereafter (`SET`, session
/// defaults, etc).
#[derive(Debug, Clone, Copy)]
pub struct ParameterStatus<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> ParameterStatus<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (name, rest) = read_cstr(payload)?;
        let (value, _) = read_cstr(rest)?;
        Ok(Self { name, value })
    }
}

/// `ReadyForQuery`: the server is idle and will accept the next query or
/// `Sync`. Closes out one unit of the `expected_rfq`/`buffered_rfq` count.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct ReadyForQuery {
    pub status: u8,
}

impl ReadyForQuery {
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload).map_err(|e| Error::Protocol(format!("ReadyForQuery: {e:?}")))
    }

    pub fn transaction_status(&self) -> Option<crate::message::types::TransactionStatus> {
        crate::message::types::TransactionStatus::from_byte(self.status)
    }
}

/// `NotificationResponse`: an asynchronous `NOTIFY` delivered to a
/// listening session.
#[derive(Debug, Clone)]
pub struct NotificationResponse<'a> {
    pub pid: u32,
    pub channel: &'a str,
    pub payload: &'a str,
}

impl<'a> NotificationResponse<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (pid, rest) = read_u32(payload)?;
        let (channel, rest) = read_cstr(rest)?;
        let (payload_str, _) = read_cstr(rest)?;
        Ok(Self {
            pid,
            channel,
            payload: payload_str,
        })
    }
}

/// `NegotiateProtocolVersion`: the server doesn't support the requested
/// minor protocol version or one of the requested startup options. This
/// crate treats it as an unconditional startup failure.
#[derive(Debug, Clone)]
pub struct NegotiateProtocolVersion<'a> {
    pub newest_minor_version: u32,
    pub unrecognized_options: Vec<&'a str>,
}

impl<'a> NegotiateProtocolVersion<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (newest_minor_version, rest) = read_u32(payload)?;
        let (num_options, mut rest) = read_u32(rest)?;
        let mut unrecognized_options = Vec::with_capacity(num_options as usize);
        for _ in 0..num_options {
            let (option, remaining) = read_cstr(rest)?;
            unrecognized_options.push(option);
            rest = remaining;
        }
        Ok(Self {
            newest_minor_version,
            unrecognized_options,
        })
    }
}

/// `RowDescription` header: field count.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct RowDescriptionHead {
    num_fields: U16Be,
}

/// Fixed-width tail of one field descriptor (18 bytes), following its
/// NUL-terminated name.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    pub table_oid: U32Be,
    pub column_id: I16Be,
    pub type_oid: U32Be,
    pub type_size: I16Be,
    pub type_modifier: I32Be,
    pub format: U16Be,
}

/// One column descriptor within a `RowDescription`.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescription<'a> {
    pub name: &'a str,
    tail: &'a FieldDescriptionTail,
}

impl FieldDescription<'_> {
    pub fn table_oid(&self) -> Oid {
        self.tail.table_oid.get()
    }

    pub fn column_id(&self) -> i16 {
        self.tail.column_id.get()
    }

    pub fn type_oid(&self) -> Oid {
        self.tail.type_oid.get()
    }

    pub fn type_size(&self) -> i16 {
        self.tail.type_size.get()
    }

    pub fn type_modifier(&self) -> i32 {
        self.tail.type_modifier.get()
    }

    pub fn format(&self) -> FormatCode {
        FormatCode::from_u16(self.tail.format.get())
    }
}

/// `RowDescription`: column metadata preceding a run of `DataRow`s. A
/// zero-length `RowDescription` is valid (a result set with no columns);
/// the field count itself is carried as an unsigned 16-bit value, so
/// 65535 columns is the maximum a single message can describe.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::Protocol("RowDescription: truncated header".into()));
        }
        let head = RowDescriptionHead::ref_from_bytes(&payload[..2])
            .map_err(|e| Error::Protocol(format!("RowDescription header: {e:?}")))?;

        let num_fields = head.num_fields.get() as usize;
        let mut fields = Vec::with_capacity(num_fields);
        let mut data = &payload[2..];

        const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            if rest.len() < TAIL_SIZE {
                return Err(Error::Protocol("RowDescription: truncated field tail".into()));
            }
            let tail = FieldDescriptionTail::ref_from_bytes(&rest[..TAIL_SIZE])
                .map_err(|e| Error::Protocol(format!("FieldDescription tail: {e:?}")))?;
            fields.push(FieldDescription { name, tail });
            data = &rest[TAIL_SIZE..];
        }

        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescription<'a>> {
        self.fields.iter()
    }
}

#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct DataRowHead {
    num_columns: U16Be,
}

/// `DataRow`: one result row. Column values are accessed lazily via
/// `iter()`/`get()` rather than eagerly copied out.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    num_columns: u16,
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::Protocol("DataRow: truncated header".into()));
        }
        let head = DataRowHead::ref_from_bytes(&payload[..2])
            .map_err(|e| Error::Protocol(format!("DataRow header: {e:?}")))?;

        Ok(Self {
            num_columns: head.num_columns.get(),
            columns_data: &payload[2..],
        })
    }

    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Iterate column values; `None` is SQL NULL (wire length `-1`).
    pub fn iter(&self) -> DataRowIter<'a> {
        DataRowIter {
            remaining: self.columns_data,
        }
    }

    pub fn get(&self, index: usize) -> Option<Option<&'a [u8]>> {
        self.iter().nth(index)
    }
}

#[derive(Debug, Clone)]
pub struct DataRowIter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for DataRowIter<'a> {
    type Item = Option<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let len;
        (len, self.remaining) = self.remaining.split_at_checked(4)?;
        let len = i32::from_be_bytes([len[0], len[1], len[2], len[3]]);

        if len == -1 {
            Some(None)
        } else {
            let len = len as usize;
            if self.remaining.len() < len {
                return None;
            }
            let value;
            (value, self.remaining) = self.remaining.split_at_checked(len)?;
            Some(Some(value))
        }
    }
}

/// `CommandComplete`: a command tag closing out a simple-query result
/// block or an extended-query portal's execution.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self { tag })
    }

    /// Rows affected, parsed out of tags like `"SELECT 5"`, `"INSERT 0 1"`,
    /// `"UPDATE 10"`. `None` for tags with no row count (e.g. `"BEGIN"`).
    pub fn rows_affected(&self) -> Option<u64> {
        let parts: Vec<&str> = self.tag.split_whitespace().collect();
        match parts.as_slice() {
            ["SELECT", count]
            | ["UPDATE", count]
            | ["DELETE", count]
            | ["COPY", count]
            | ["MOVE", count]
            | ["FETCH", count] => count.parse().ok(),
            ["INSERT", _oid, count] => count.parse().ok(),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<&str> {
        self.tag.split_whitespace().next()
    }
}

/// `EmptyQueryResponse`: the query string was empty (zero-length, not
/// merely whitespace).
#[derive(Debug, Clone, Copy)]
pub struct EmptyQueryResponse;

impl EmptyQueryResponse {
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// `ParseComplete`.
#[derive(Debug, Clone, Copy)]
pub struct ParseComplete;

impl ParseComplete {
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// `BindComplete`.
#[derive(Debug, Clone, Copy)]
pub struct BindComplete;

impl BindComplete {
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// `CloseComplete`.
#[derive(Debug, Clone, Copy)]
pub struct CloseComplete;

impl CloseComplete {
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// `NoData`: the described statement/portal returns no rows.
#[derive(Debug, Clone, Copy)]
pub struct NoData;

impl NoData {
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// `PortalSuspended`: `Execute`'s row limit was hit before the portal was
/// exhausted.
#[derive(Debug, Clone, Copy)]
pub struct PortalSuspended;

impl PortalSuspended {
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct ParameterDescriptionHead {
    num_params: U16Be,
}

/// `ParameterDescription`: the inferred/declared types of a prepared
/// statement's placeholders, in `$1, $2, ...` order.
#[derive(Debug, Clone)]
pub struct ParameterDescription {
    param_oids: Vec<Oid>,
}

impl ParameterDescription {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::Protocol("ParameterDescription: truncated header".into()));
        }
        let head = ParameterDescriptionHead::ref_from_bytes(&payload[..2])
            .map_err(|e| Error::Protocol(format!("ParameterDescription header: {e:?}")))?;

        let num_params = head.num_params.get() as usize;
        let mut param_oids = Vec::with_capacity(num_params);
        let mut data = &payload[2..];
        for _ in 0..num_params {
            let (oid, rest) = read_u32(data)?;
            param_oids.push(oid);
            data = rest;
        }
        Ok(Self { param_oids })
    }

    pub fn len(&self) -> usize {
        self.param_oids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.param_oids.is_empty()
    }

    pub fn oids(&self) -> &[Oid] {
        &self.param_oids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Oid> {
        self.param_oids.iter()
    }
}

fn parse_copy_response(payload: &[u8]) -> Result<(FormatCode, Vec<FormatCode>)> {
    let (format_byte, rest) = read_u8(payload)?;
    let format = FormatCode::from_u16(format_byte as u16);
    let (num_columns, mut rest) = read_u16(rest)?;
    let mut column_formats = Vec::with_capacity(num_columns as usize);
    for _ in 0..num_columns {
        let (fmt, remaining) = read_u16(rest)?;
        column_formats.push(FormatCode::from_u16(fmt));
        rest = remaining;
    }
    Ok((format, column_formats))
}

/// `CopyInResponse`: the server is ready to receive `CopyData` frames.
#[derive(Debug, Clone)]
pub struct CopyInResponse {
    pub format: FormatCode,
    pub column_formats: Vec<FormatCode>,
}

impl CopyInResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (format, column_formats) = parse_copy_response(payload)?;
        Ok(Self { format, column_formats })
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.format, FormatCode::Binary)
    }
}

/// `CopyOutResponse`: the server is about to send `CopyData` frames.
#[derive(Debug, Clone)]
pub struct CopyOutResponse {
    pub format: FormatCode,
    pub column_formats: Vec<FormatCode>,
}

impl CopyOutResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (format, column_formats) = parse_copy_response(payload)?;
        Ok(Self { format, column_formats })
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.format, FormatCode::Binary)
    }
}

/// `CopyBothResponse`: bidirectional COPY, used by logical replication.
#[derive(Debug, Clone)]
pub struct CopyBothResponse {
    pub format: FormatCode,
    pub column_formats: Vec<FormatCode>,
}

impl CopyBothResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (format, column_formats) = parse_copy_response(payload)?;
        Ok(Self { format, column_formats })
    }
}

/// `CopyData` (backend → frontend direction, during `CopyOut`/`CopyBoth`).
#[derive(Debug, Clone, Copy)]
pub struct CopyData<'a> {
    pub data: &'a [u8],
}

impl<'a> CopyData<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        Ok(Self { data: payload })
    }
}

/// `CopyDone` (backend → frontend direction).
#[derive(Debug, Clone, Copy)]
pub struct CopyDone;

impl CopyDone {
    pub fn parse(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

fn is_known_field_type(field_type: u8) -> bool {
    use crate::error::field_type::*;
    matches!(
        field_type,
        SEVERITY | SEVERITY_V | CODE | MESSAGE | DETAIL | HINT | POSITION | INTERNAL_POSITION
            | INTERNAL_QUERY | WHERE | SCHEMA | TABLE | COLUMN | DATA_TYPE | CONSTRAINT | FILE
            | LINE | ROUTINE
    )
}

fn parse_fields(payload: &[u8]) -> Result<HashMap<u8, String>> {
    let mut fields = HashMap::new();
    let mut data = payload;
    while !data.is_empty() && data[0] != 0 {
        let field_type = data[0];
        data = &data[1..];
        let (value, rest) = read_cstr(data)?;
        data = rest;
        if !is_known_field_type(field_type) {
            tracing::debug!("unrecognized error/notice field type: {}", field_type as char);
        }
        fields.insert(field_type, value.to_string());
    }
    Ok(fields)
}

/// `ErrorResponse`: a fatal error terminating the current command (and, if
/// FATAL/PANIC, the session).
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    error: ServerError,
}

impl ErrorResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            error: ServerError::from_fields(parse_fields(payload)?),
        })
    }

    /// Consume this message, turning it into the `Error` it represents.
    pub fn into_error(self) -> Error {
        Error::Server(self.error)
    }

    pub fn server_error(&self) -> &ServerError {
        &self.error
    }
}

/// `NoticeResponse`: a non-fatal warning or informational message, same
/// wire shape as `ErrorResponse`.
#[derive(Debug, Clone)]
pub struct NoticeResponse {
    error: ServerError,
}

impl NoticeResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            error: ServerError::from_fields(parse_fields(payload)?),
        })
    }

    pub fn into_server_error(self) -> ServerError {
        self.error
    }

    pub fn server_error(&self) -> &ServerError {
        &self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::frontend::{build_query, build_sync};

    #[test]
    fn authentication_ok_has_no_trailing_data() {
        let payload = 0i32.to_be_bytes();
        let msg = AuthenticationMessage::parse(&payload).unwrap();
        assert!(matches!(msg, AuthenticationMessage::Ok));
    }

    #[test]
    fn authentication_md5_carries_salt() {
        let mut payload = 5i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[1, 2, 3, 4]);
        let msg = AuthenticationMessage::parse(&payload).unwrap();
        match msg {
            AuthenticationMessage::Md5Password { salt } => assert_eq!(salt, [1, 2, 3, 4]),
            _ => panic!("expected Md5Password"),
        }
    }

    #[test]
    fn authentication_sasl_rejects_as_unknown_path() {
        let mut payload = 10i32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"SCRAM-SHA-256\0");
        payload.push(0);
        let msg = AuthenticationMessage::parse(&payload).unwrap();
        assert!(matches!(msg, AuthenticationMessage::Sasl { .. }));
    }

    #[test]
    fn command_complete_parses_row_counts() {
        let payload = b"SELECT 5\0";
        let cc = CommandComplete::parse(payload).unwrap();
        assert_eq!(cc.rows_affected(), Some(5));
        assert_eq!(cc.command(), Some("SELECT"));

        let payload = b"INSERT 0 3\0";
        let cc = CommandComplete::parse(payload).unwrap();
        assert_eq!(cc.rows_affected(), Some(3));
    }

    #[test]
    fn data_row_iter_distinguishes_null_from_empty() {
        let mut payload = 2u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&(-1i32).to_be_bytes());
        payload.extend_from_slice(&0i32.to_be_bytes());
        let row = DataRow::parse(&payload).unwrap();
        let values: Vec<_> = row.iter().collect();
        assert_eq!(values, vec![None, Some(&[][..])]);
    }

    #[test]
    fn zero_column_data_row_parses() {
        let payload = 0u16.to_be_bytes();
        let row = DataRow::parse(&payload).unwrap();
        assert!(row.is_empty());
        assert_eq!(row.iter().count(), 0);
    }

    #[test]
    fn error_response_into_error_exposes_fields() {
        let mut payload = Vec::new();
        payload.push(b'S');
        payload.extend_from_slice(b"FATAL\0");
        payload.push(b'C');
        payload.extend_from_slice(b"57P01\0");
        payload.push(b'M');
        payload.extend_from_slice(b"terminating\0");
        payload.push(0);

        let err = ErrorResponse::parse(&payload).unwrap().into_error();
        assert!(err.is_connection_broken());
        assert_eq!(err.sqlstate(), Some("57P01"));
    }

    #[test]
    fn frontend_build_and_backend_parse_agree_on_framing() {
        let mut buf = Vec::new();
        build_query(&mut buf, "SELECT 1");
        build_sync(&mut buf);
        assert_eq!(buf[0], b'Q');
    }
}
