//! The session engine: handshake, authenticated request/response
//! accounting, the message pump, cancellation, COPY, and termination.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::auth::{self, Response as AuthResponse};
use crate::buffer::{BufferPool, PooledBufferSet};
use crate::error::{Error, Result, ServerError};
use crate::message::backend::{
    AuthenticationMessage, BackendKeyData, ErrorResponse, NoticeResponse, NotificationResponse,
    ParameterStatus, ReadyForQuery, msg_type,
};
use crate::message::frontend;
use crate::message::{RawBackendMessage, TransactionStatus};
use crate::opts::{Opts, SslPolicy};
use crate::transport::Transport;

/// The process-wide buffer pool every `Session` acquires its scratch
/// buffers from, so repeated connect/close cycles reuse allocations
/// instead of paying for fresh `Vec`s each time.
fn buffer_pool() -> &'static Arc<BufferPool> {
    static POOL: OnceLock<Arc<BufferPool>> = OnceLock::new();
    POOL.get_or_init(|| Arc::new(BufferPool::default()))
}

/// Whether a pump loop or notification callback should keep going or
/// return control to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Break,
}

/// Why `poll_messages` returned.
#[derive(Debug)]
pub enum PumpOutcome {
    /// `ReadyForQuery` was consumed; carries the transaction status it
    /// reported.
    ReadyForQuery(TransactionStatus),
    /// An `ErrorResponse` was consumed with `finish_on_error` set.
    Error(ServerError),
    /// The notification callback asked to stop.
    NotificationBreak,
    /// The interceptor asked to stop.
    InterceptorBreak,
}

/// A LISTEN/NOTIFY delivery.
#[derive(Debug, Clone)]
pub struct NotificationInfo {
    pub pid: u32,
    pub channel: String,
    pub payload: String,
}

/// A snapshot of the write buffer's head and the buffered RFQ count,
/// taken before assembling a frame. `restore` rewinds to it if assembly
/// fails partway through, so a half-written frame is never flushed.
#[derive(Debug, Clone, Copy)]
pub struct SavePoint {
    write_head: usize,
    buffered_rfq: u32,
}

/// Which COPY mode, if any, the session is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    None,
    CopyIn,
    CopyOut,
    CopyBoth,
}

type NoticeCallback<'a> = Box<dyn FnMut(ServerError) + 'a>;
type NotificationCallback<'a> = Box<dyn FnMut(NotificationInfo) -> ControlFlow + 'a>;

/// One authenticated (or authenticating) connection to a PostgreSQL
/// server.
pub struct Session<'a> {
    transport: Box<dyn Transport>,
    buffers: PooledBufferSet,
    expected_rfq: u32,
    buffered_rfq: u32,
    backend_pid: Option<u32>,
    backend_secret: Option<u32>,
    server_params: HashMap<String, String>,
    next_statement_id: u64,
    next_portal_id: u64,
    transaction_status: TransactionStatus,
    open: bool,
    authenticated: bool,
    copy_mode: CopyMode,
    notice_callback: Option<NoticeCallback<'a>>,
    notification_callback: Option<NotificationCallback<'a>>,
}

fn read_message(transport: &mut dyn Transport, read_buffer: &mut Vec<u8>) -> Result<u8> {
    let mut type_byte = [0u8; 1];
    transport.receive_exact(&mut type_byte)?;
    let mut length_bytes = [0u8; 4];
    transport.receive_exact(&mut length_bytes)?;
    let length = i32::from_be_bytes(length_bytes);
    if length < 4 {
        return Err(Error::Protocol(format!("invalid message length: {length}")));
    }
    let payload_len = (length as usize) - 4;
    read_buffer.clear();
    read_buffer.resize(payload_len, 0);
    transport.receive_exact(read_buffer)?;
    Ok(type_byte[0])
}

impl<'a> Session<'a> {
    /// Perform the startup handshake over an already-connected transport:
    /// optional SSL negotiation, `StartupMessage`, authentication, and the
    /// initial run of `BackendKeyData`/`ParameterStatus` up to the first
    /// `ReadyForQuery`.
    pub fn handshake(mut transport: Box<dyn Transport>, opts: &Opts) -> Result<Self> {
        tracing::debug!(
            "starting handshake: host={} port={} user={}",
            opts.host,
            opts.port,
            opts.user
        );
        if opts.ssl_policy != SslPolicy::Disabled {
            let mut buf = Vec::new();
            frontend::build_ssl_request(&mut buf);
            transport.send_all(&buf)?;
            let mut reply = [0u8; 1];
            transport.receive_exact(&mut reply)?;
            match reply[0] {
                b'S' => {
                    transport = transport.tls_handshake(&opts.host)?;
                }
                b'N' if opts.ssl_policy == SslPolicy::Require => {
                    return Err(Error::Client(
                        "server refused TLS but ssl_policy is Require".into(),
                    ));
                }
                b'N' => {}
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected SSLRequest reply byte {other:#x}"
                    )));
                }
            }
        }

        let mut buffers = buffer_pool().acquire();
        let mut params: Vec<(&str, &str)> = vec![("user", opts.user.as_str())];
        if let Some(database) = &opts.database {
            params.push(("database", database.as_str()));
        }
        if let Some(app) = &opts.application_name {
            params.push(("application_name", app.as_str()));
        }
        for (k, v) in &opts.params {
            params.push((k.as_str(), v.as_str()));
        }
        frontend::build_startup(&mut buffers.write_buffer, &params);
        transport.send_all(&buffers.write_buffer)?;
        buffers.write_buffer.clear();

        let mut session = Session {
            transport,
            buffers,
            expected_rfq: 1,
            buffered_rfq: 0,
            backend_pid: None,
            backend_secret: None,
            server_params: HashMap::new(),
            next_statement_id: 0,
            next_portal_id: 0,
            transaction_status: TransactionStatus::Idle,
            open: true,
            authenticated: false,
            copy_mode: CopyMode::None,
            notice_callback: None,
            notification_callback: None,
        };

        loop {
            let type_byte =
                match read_message(session.transport.as_mut(), &mut session.buffers.read_buffer) {
                    Ok(b) => b,
                    Err(e) => {
                        session.open = false;
                        return Err(e);
                    }
                };

            // Async messages (notices, notifications, parameter changes) can
            // arrive unsolicited at any stage of the protocol, startup
            // included; dispatch them before the handshake-specific match so
            // a server-side encoding/locale notice never kills the connect.
            if RawBackendMessage::is_async_type(type_byte) {
                match type_byte {
                    msg_type::PARAMETER_STATUS => {
                        let status = ParameterStatus::parse(&session.buffers.read_buffer)?;
                        session
                            .server_params
                            .insert(status.name.to_string(), status.value.to_string());
                    }
                    msg_type::NOTICE_RESPONSE => {
                        let notice =
                            NoticeResponse::parse(&session.buffers.read_buffer)?.into_server_error();
                        tracing::debug!("notice during handshake: {}", notice.message());
                        if let Some(callback) = session.notice_callback.as_mut() {
                            callback(notice);
                        }
                    }
                    msg_type::NOTIFICATION_RESPONSE => {
                        let parsed = NotificationResponse::parse(&session.buffers.read_buffer)?;
                        let info = NotificationInfo {
                            pid: parsed.pid,
                            channel: parsed.channel.to_string(),
                            payload: parsed.payload.to_string(),
                        };
                        tracing::debug!("notification during handshake on channel {}", info.channel);
                        if let Some(callback) = session.notification_callback.as_mut() {
                            let _ = callback(info);
                        }
                    }
                    _ => unreachable!("is_async_type only matches the three arms above"),
                }
                continue;
            }

            match type_byte {
                msg_type::AUTHENTICATION => {
                    let message = AuthenticationMessage::parse(&session.buffers.read_buffer)?;
                    if matches!(message, AuthenticationMessage::Ok) {
                        session.authenticated = true;
                        tracing::debug!("authentication succeeded");
                        continue;
                    }
                    match auth::respond_to(&message, &opts.user, opts.password.as_deref())? {
                        AuthResponse::None => {}
                        AuthResponse::Password(password) => {
                            let mut buf = Vec::new();
                            frontend::build_password(&mut buf, &password);
                            session.transport.send_all(&buf)?;
                        }
                    }
                }
                msg_type::BACKEND_KEY_DATA => {
                    let key = BackendKeyData::parse(&session.buffers.read_buffer)?;
                    session.backend_pid = Some(key.process_id());
                    session.backend_secret = Some(key.secret());
                }
                msg_type::READY_FOR_QUERY => {
                    let rfq = ReadyForQuery::parse(&session.buffers.read_buffer)?;
                    session.transaction_status = rfq
                        .transaction_status()
                        .ok_or_else(|| Error::Protocol("invalid transaction status byte".into()))?;
                    session.expected_rfq = 0;
                    break;
                }
                msg_type::ERROR_RESPONSE => {
                    let error = ErrorResponse::parse(&session.buffers.read_buffer)?;
                    session.open = false;
                    return Err(error.into_error());
                }
                msg_type::NEGOTIATE_PROTOCOL_VERSION => {
                    session.open = false;
                    return Err(Error::Protocol(
                        "server does not support the requested protocol version".into(),
                    ));
                }
                other => {
                    session.open = false;
                    return Err(Error::Protocol(format!(
                        "unexpected message {other:#x} ({}) during handshake",
                        other as char
                    )));
                }
            }
        }

        if !session.authenticated {
            session.open = false;
            return Err(Error::Auth("handshake completed without AuthenticationOk".into()));
        }

        tracing::info!(
            "handshake complete: backend_pid={:?}",
            session.backend_pid
        );
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn backend_key_data(&self) -> Option<(u32, u32)> {
        Some((self.backend_pid?, self.backend_secret?))
    }

    pub fn server_params(&self) -> &HashMap<String, String> {
        &self.server_params
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub fn copy_mode(&self) -> CopyMode {
        self.copy_mode
    }

    pub fn on_notice(&mut self, callback: impl FnMut(ServerError) + 'a) {
        self.notice_callback = Some(Box::new(callback));
    }

    pub fn on_notification(&mut self, callback: impl FnMut(NotificationInfo) -> ControlFlow + 'a) {
        self.notification_callback = Some(Box::new(callback));
    }

    /// A name guaranteed unused by this session so far, for an unnamed
    /// prepared statement caller that still wants a durable name.
    pub fn next_statement_name(&mut self) -> String {
        let name = format!("stmt_{}", self.next_statement_id);
        self.next_statement_id += 1;
        name
    }

    pub fn next_portal_name(&mut self) -> String {
        let name = format!("portal_{}", self.next_portal_id);
        self.next_portal_id += 1;
        name
    }

    fn require_open(&self) -> Result<()> {
        if !self.open {
            return Err(Error::Client("session is closed".into()));
        }
        Ok(())
    }

    /// Snapshot the write buffer's head and `buffered_rfq`.
    pub fn save(&self) -> SavePoint {
        SavePoint {
            write_head: self.buffers.write_buffer.len(),
            buffered_rfq: self.buffered_rfq,
        }
    }

    /// Rewind to a prior `SavePoint`, discarding any bytes staged since.
    pub fn restore(&mut self, point: SavePoint) {
        self.buffers.write_buffer.truncate(point.write_head);
        self.buffered_rfq = point.buffered_rfq;
    }

    /// Stage a `Query` message. Elicits exactly one `ReadyForQuery`.
    pub fn stage_query(&mut self, sql: &str) -> Result<()> {
        self.require_open()?;
        frontend::build_query(&mut self.buffers.write_buffer, sql);
        self.buffered_rfq += 1;
        Ok(())
    }

    /// Stage a `Sync`. Elicits exactly one `ReadyForQuery`, even after an
    /// error aborted the extended-query sequence.
    pub fn stage_sync(&mut self) -> Result<()> {
        self.require_open()?;
        frontend::build_sync(&mut self.buffers.write_buffer);
        self.buffered_rfq += 1;
        Ok(())
    }

    /// Stage any other frontend frame that does not itself elicit a
    /// `ReadyForQuery` (`Parse`, `Bind`, `Describe`, `Execute`, `Close`,
    /// `Flush`, `CopyData`, `CopyDone`, `CopyFail`). The closure receives
    /// the write buffer to build into.
    pub fn stage(&mut self, build: impl FnOnce(&mut Vec<u8>)) -> Result<()> {
        self.require_open()?;
        build(&mut self.buffers.write_buffer);
        Ok(())
    }

    /// Write the staged buffer to the transport and move `buffered_rfq`
    /// into `expected_rfq` atomically.
    pub fn flush(&mut self) -> Result<()> {
        self.require_open()?;
        if !self.buffers.write_buffer.is_empty() {
            tracing::trace!("flushing {} bytes", self.buffers.write_buffer.len());
            if let Err(e) = self.transport.send_all(&self.buffers.write_buffer) {
                self.open = false;
                return Err(e);
            }
            self.buffers.write_buffer.clear();
        }
        self.expected_rfq += self.buffered_rfq;
        self.buffered_rfq = 0;
        Ok(())
    }

    /// Drop any staged-but-unflushed bytes and reset `buffered_rfq`.
    pub fn discard(&mut self) {
        self.buffers.write_buffer.clear();
        self.buffered_rfq = 0;
    }

    /// Run the message pump until one of the four documented exits fires:
    /// `ReadyForQuery`, `ErrorResponse` with `finish_on_error` set, the
    /// notification callback breaking, or the interceptor breaking.
    pub fn poll_messages(
        &mut self,
        mut interceptor: impl FnMut(RawBackendMessage<'_>) -> ControlFlow,
        finish_on_error: bool,
    ) -> Result<PumpOutcome> {
        self.require_open()?;
        let mut error_seen = false;
        loop {
            let type_byte =
                match read_message(self.transport.as_mut(), &mut self.buffers.read_buffer) {
                    Ok(b) => b,
                    Err(e) => {
                        self.open = false;
                        return Err(e);
                    }
                };
            let raw = RawBackendMessage::new(type_byte, &self.buffers.read_buffer);

            if raw.is_notice() {
                let notice = NoticeResponse::parse(raw.payload)?.into_server_error();
                if let Some(callback) = self.notice_callback.as_mut() {
                    callback(notice);
                }
                continue;
            }

            if raw.is_notification() {
                let parsed = NotificationResponse::parse(raw.payload)?;
                let info = NotificationInfo {
                    pid: parsed.pid,
                    channel: parsed.channel.to_string(),
                    payload: parsed.payload.to_string(),
                };
                if let Some(callback) = self.notification_callback.as_mut() {
                    if callback(info) == ControlFlow::Break {
                        tracing::debug!("pump exit: notification callback asked to stop");
                        return Ok(PumpOutcome::NotificationBreak);
                    }
                }
                continue;
            }

            if raw.is_error() {
                if error_seen {
                    self.open = false;
                    return Err(Error::Protocol(
                        "second ErrorResponse before ReadyForQuery".into(),
                    ));
                }
                error_seen = true;
                if finish_on_error {
                    let error = ErrorResponse::parse(raw.payload)?;
                    tracing::debug!("pump exit: ErrorResponse with finish_on_error set");
                    return Ok(PumpOutcome::Error(error.server_error().clone()));
                }
            }

            if type_byte == msg_type::READY_FOR_QUERY {
                if self.expected_rfq == 0 {
                    self.open = false;
                    return Err(Error::Protocol(
                        "ReadyForQuery received with no request outstanding".into(),
                    ));
                }
                let rfq = ReadyForQuery::parse(raw.payload)?;
                self.transaction_status = rfq
                    .transaction_status()
                    .ok_or_else(|| Error::Protocol("invalid transaction status byte".into()))?;
                self.expected_rfq -= 1;
                tracing::debug!("pump exit: ReadyForQuery, {} outstanding", self.expected_rfq);
                return Ok(PumpOutcome::ReadyForQuery(self.transaction_status));
            }

            if type_byte == msg_type::PARAMETER_STATUS {
                let status = ParameterStatus::parse(raw.payload)?;
                self.server_params
                    .insert(status.name.to_string(), status.value.to_string());
            }

            match type_byte {
                msg_type::COPY_IN_RESPONSE => self.copy_mode = CopyMode::CopyIn,
                msg_type::COPY_OUT_RESPONSE => self.copy_mode = CopyMode::CopyOut,
                msg_type::COPY_BOTH_RESPONSE => self.copy_mode = CopyMode::CopyBoth,
                msg_type::COPY_DONE | msg_type::COMMAND_COMPLETE => self.copy_mode = CopyMode::None,
                _ => {}
            }

            if interceptor(raw) == ControlFlow::Break {
                tracing::debug!("pump exit: interceptor asked to stop");
                return Ok(PumpOutcome::InterceptorBreak);
            }
        }
    }

    /// Stage a `CopyData` frame. Only meaningful while `copy_mode()` is
    /// `CopyIn` or `CopyBoth`, i.e. after a `CopyInResponse`/`CopyBothResponse`
    /// has been observed via `poll_messages`.
    pub fn stage_copy_data(&mut self, data: &[u8]) -> Result<()> {
        if !matches!(self.copy_mode, CopyMode::CopyIn | CopyMode::CopyBoth) {
            return Err(Error::Client(
                "stage_copy_data called outside CopyIn/CopyBoth mode".into(),
            ));
        }
        self.stage(|buf| frontend::build_copy_data(buf, data))
    }

    pub fn stage_copy_done(&mut self) -> Result<()> {
        self.stage(frontend::build_copy_done)
    }

    pub fn stage_copy_fail(&mut self, reason: &str) -> Result<()> {
        self.stage(|buf| frontend::build_copy_fail(buf, reason))
    }

    /// Send `CancelRequest` for this session's backend over a brand-new
    /// transport. Never touches the primary connection.
    pub fn cancel_request(&self) -> Result<()> {
        let (pid, secret) = self
            .backend_key_data()
            .ok_or_else(|| Error::Client("no BackendKeyData to cancel with".into()))?;
        tracing::debug!("sending cancel request for backend pid={pid}");
        let mut cancel_transport = self.transport.duplicate()?;
        let mut buf = Vec::new();
        frontend::build_cancel_request(&mut buf, pid, secret);
        cancel_transport.send_all(&buf)?;
        cancel_transport.close()
    }

    /// Send `Terminate` (best-effort), flush, and close the transport.
    /// Idempotent.
    pub fn terminate(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        tracing::debug!("terminating session");
        let mut buf = Vec::new();
        frontend::build_terminate(&mut buf);
        let _ = self.transport.send_all(&buf);
        self.close()
    }

    /// Close the transport without sending `Terminate`. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        tracing::debug!("closing session transport");
        self.open = false;
        self.transport.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MockTransport {
        inbox: VecDeque<u8>,
        outbox: Vec<u8>,
    }

    impl MockTransport {
        fn new(inbox: Vec<u8>) -> Self {
            Self {
                inbox: inbox.into(),
                outbox: Vec::new(),
            }
        }
    }

    impl Transport for MockTransport {
        fn send_all(&mut self, buf: &[u8]) -> Result<()> {
            self.outbox.extend_from_slice(buf);
            Ok(())
        }

        fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.inbox.len() < buf.len() {
                return Err(Error::ConnectionClosed);
            }
            for slot in buf {
                *slot = self.inbox.pop_front().unwrap();
            }
            Ok(())
        }

        fn duplicate(&self) -> Result<Box<dyn Transport>> {
            Err(Error::Unsupported("mock transport cannot duplicate".into()))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn frame(type_byte: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![type_byte];
        out.extend_from_slice(&((body.len() as i32) + 4).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn handshake_trust_auth_reaches_ready_for_query() {
        let mut inbox = Vec::new();
        inbox.extend(frame(b'R', &0i32.to_be_bytes()));
        inbox.extend(frame(b'K', &[0, 0, 48, 57, 0, 0, 0xab, 0xcd]));
        inbox.extend(frame(b'S', b"server_version\015.2\0"));
        inbox.extend(frame(b'Z', b"I"));

        let transport: Box<dyn Transport> = Box::new(MockTransport::new(inbox));
        let opts = Opts {
            user: "postgres".into(),
            ..Default::default()
        };
        let session = Session::handshake(transport, &opts).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.backend_key_data(), Some((12345, 0xabcd)));
        assert_eq!(session.transaction_status(), TransactionStatus::Idle);
    }

    #[test]
    fn save_restore_is_identity_with_no_intervening_writes() {
        let transport: Box<dyn Transport> = Box::new(MockTransport::new(Vec::new()));
        let mut session = handshook_session(transport);
        let point = session.save();
        session.restore(point);
        assert!(session.buffers.write_buffer.is_empty());
        assert_eq!(session.buffered_rfq, 0);
    }

    #[test]
    fn flush_moves_buffered_into_expected() {
        let transport: Box<dyn Transport> = Box::new(MockTransport::new(Vec::new()));
        let mut session = handshook_session(transport);
        session.stage_query("SELECT 1").unwrap();
        assert_eq!(session.buffered_rfq, 1);
        session.flush().unwrap();
        assert_eq!(session.buffered_rfq, 0);
        assert_eq!(session.expected_rfq, 1);
    }

    #[test]
    fn restore_undoes_a_partially_staged_frame() {
        let transport: Box<dyn Transport> = Box::new(MockTransport::new(Vec::new()));
        let mut session = handshook_session(transport);
        let point = session.save();
        session.stage_query("SELECT 1").unwrap();
        session.restore(point);
        assert!(session.buffers.write_buffer.is_empty());
        assert_eq!(session.buffered_rfq, 0);
    }

    #[test]
    fn double_terminate_is_a_no_op() {
        let transport: Box<dyn Transport> = Box::new(MockTransport::new(Vec::new()));
        let mut session = handshook_session(transport);
        session.terminate().unwrap();
        assert!(!session.is_open());
        session.terminate().unwrap();
    }

    #[test]
    fn rfq_without_outstanding_request_is_protocol_error() {
        let inbox = frame(b'Z', b"I");
        let transport: Box<dyn Transport> = Box::new(MockTransport::new(inbox));
        let mut session = handshook_session(transport);
        let err = session.poll_messages(|_| ControlFlow::Continue, false).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    fn handshook_session(transport: Box<dyn Transport>) -> Session<'static> {
        Session {
            transport,
            buffers: buffer_pool().acquire(),
            expected_rfq: 0,
            buffered_rfq: 0,
            backend_pid: Some(1),
            backend_secret: Some(2),
            server_params: HashMap::new(),
            next_statement_id: 0,
            next_portal_id: 0,
            transaction_status: TransactionStatus::Idle,
            open: true,
            authenticated: true,
            copy_mode: CopyMode::None,
            notice_callback: None,
            notification_callback: None,
        }
    }
}
