//! Error types.

use std::collections::HashMap;
use thiserror::Error;

/// Result type for protogres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field type codes (`ErrorResponse`/`NoticeResponse`).
pub mod field_type {
    pub const SEVERITY: u8 = b'S';
    pub const SEVERITY_V: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const INTERNAL_POSITION: u8 = b'p';
    pub const INTERNAL_QUERY: u8 = b'q';
    pub const WHERE: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// A PostgreSQL server error or notice. Backs both `ErrorResponse` and
/// `NoticeResponse`: the wire shape of the two messages is identical, only
/// the handling differs.
#[derive(Debug, Clone, Default)]
pub struct ServerError(pub(crate) HashMap<u8, String>);

impl ServerError {
    pub fn from_fields(fields: HashMap<u8, String>) -> Self {
        Self(fields)
    }

    pub fn severity(&self) -> &str {
        self.get(field_type::SEVERITY).unwrap_or_default()
    }

    /// Non-localized severity (PostgreSQL 9.6+); falls back to `severity()`
    /// for servers that don't send it.
    pub fn severity_v(&self) -> &str {
        self.get(field_type::SEVERITY_V)
            .unwrap_or_else(|| self.severity())
    }

    pub fn code(&self) -> &str {
        self.get(field_type::CODE).unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        self.get(field_type::MESSAGE).unwrap_or_default()
    }

    pub fn detail(&self) -> Option<&str> {
        self.get(field_type::DETAIL)
    }

    pub fn hint(&self) -> Option<&str> {
        self.get(field_type::HINT)
    }

    pub fn position(&self) -> Option<u32> {
        self.get(field_type::POSITION).and_then(|s| s.parse().ok())
    }

    pub fn internal_position(&self) -> Option<u32> {
        self.get(field_type::INTERNAL_POSITION)
            .and_then(|s| s.parse().ok())
    }

    pub fn internal_query(&self) -> Option<&str> {
        self.get(field_type::INTERNAL_QUERY)
    }

    pub fn where_(&self) -> Option<&str> {
        self.get(field_type::WHERE)
    }

    pub fn schema(&self) -> Option<&str> {
        self.get(field_type::SCHEMA)
    }

    pub fn table(&self) -> Option<&str> {
        self.get(field_type::TABLE)
    }

    pub fn column(&self) -> Option<&str> {
        self.get(field_type::COLUMN)
    }

    pub fn data_type(&self) -> Option<&str> {
        self.get(field_type::DATA_TYPE)
    }

    pub fn constraint(&self) -> Option<&str> {
        self.get(field_type::CONSTRAINT)
    }

    pub fn file(&self) -> Option<&str> {
        self.get(field_type::FILE)
    }

    pub fn line(&self) -> Option<u32> {
        self.get(field_type::LINE).and_then(|s| s.parse().ok())
    }

    pub fn routine(&self) -> Option<&str> {
        self.get(field_type::ROUTINE)
    }

    /// Raw field access by PostgreSQL field type byte.
    pub fn get(&self, field_type: u8) -> Option<&str> {
        self.0.get(&field_type).map(String::as_str)
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (SQLSTATE {})",
            self.severity_v(),
            self.message(),
            self.code()
        )?;
        if let Some(detail) = self.detail() {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

/// Error type for protogres.
#[derive(Debug, Error)]
pub enum Error {
    /// A backend `ErrorResponse`, carrying the full server error.
    #[error("server error: {0}")]
    Server(ServerError),

    /// Malformed frame, unexpected message for the current state, trailing
    /// bytes after a parse, or a second `ErrorResponse` before `Sync`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote closed the connection while more bytes were expected.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Unsupported authentication mechanism, or rejection outside of an
    /// `ErrorResponse`.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// TLS handshake failure.
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Feature not supported by this client (e.g. an unrecognized
    /// authentication discriminator, or a SASL/negotiate-protocol-version
    /// response).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A `Serializer` was asked to encode an oversize or unrepresentable
    /// value.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// A `Deserializer` hit a size mismatch, unsupported format code, or
    /// unparsable text.
    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// Caller misuse, e.g. `Bind` issued on a statement whose `Parse`
    /// hasn't been confirmed, or a write issued after close.
    #[error("client error: {0}")]
    Client(String),
}

impl Error {
    /// True if the session that produced this error must be treated as
    /// closed: transport failures and FATAL/PANIC backend errors.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionClosed => true,
            Error::Server(err) => matches!(err.severity_v(), "FATAL" | "PANIC"),
            _ => false,
        }
    }

    /// SQLSTATE of the wrapped server error, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(err) => Some(err.code()),
            _ => None,
        }
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized> From<zerocopy::error::CastError<Src, Dst>>
    for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}
