//! A synchronous, pipelined PostgreSQL v3 wire protocol client.
//!
//! # Features
//!
//! - **Zero-copy backend parsing**: message bodies are read into a reusable
//!   buffer and decoded in place, not copied out field-by-field.
//! - **Explicit request/response accounting**: `Session` tracks exactly how
//!   many `ReadyForQuery` replies are outstanding, so pipelined requests
//!   (several `Query`/`Sync` frames sent before reading any reply) stay
//!   consistent.
//! - **Save/restore around frame assembly**: a failed `Bind`/`Parse` never
//!   leaves partial bytes staged for the next flush.
//!
//! # Example
//!
//! ```no_run
//! use protogres::{Opts, Session, helpers};
//!
//! fn main() -> protogres::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "postgres".into(),
//!         database: Some("postgres".into()),
//!         password: Some("secret".into()),
//!         ..Default::default()
//!     };
//!
//!     let transport = Box::new(protogres::transport::TcpTransport::connect(
//!         &opts.host, opts.port,
//!     )?);
//!     let mut session = Session::handshake(transport, &opts)?;
//!
//!     session.stage_query("SELECT 1")?;
//!     session.flush()?;
//!     let result = helpers::get_query_results(&mut session, false)?;
//!     println!("{:?}", result.blocks);
//!
//!     session.terminate()?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod buffer;
pub mod error;
pub mod field;
pub mod helpers;
pub mod message;
pub mod opts;
pub mod session;
pub mod transport;
mod wire;

pub use buffer::{BufferPool, BufferSet, PooledBufferSet};
pub use error::{Error, Result, ServerError};
pub use field::{Deserializer, Serializer, Value};
pub use helpers::{BlockState, FieldSpec, PreparedStatement, Portal, QueryResult, RowBlock};
pub use message::{FormatCode, Oid, TransactionStatus};
pub use opts::{Opts, SslPolicy};
pub use session::{ControlFlow, CopyMode, NotificationInfo, PumpOutcome, SavePoint, Session};
pub use transport::Transport;
