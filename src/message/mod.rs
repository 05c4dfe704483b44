//! PostgreSQL v3 wire message definitions: types shared by both
//! directions, frontend (client → server) encoders, and backend
//! (server → client) decoders.

pub mod backend;
pub mod frontend;
pub mod types;

pub use backend::{
    AuthenticationMessage, BackendKeyData, BindComplete, CloseComplete, CommandComplete, CopyData,
    CopyBothResponse, CopyDone, CopyInResponse, CopyOutResponse, DataRow, DataRowIter,
    EmptyQueryResponse, ErrorResponse, FieldDescription, NegotiateProtocolVersion, NoData,
    NoticeResponse, NotificationResponse, ParameterDescription, ParameterStatus, ParseComplete,
    PortalSuspended, RawBackendMessage, ReadyForQuery, RowDescription,
};
pub use frontend::DescribeTarget;
pub use types::{FormatCode, Oid, TransactionStatus, oid, preferred_format};
