//! The byte-stream abstraction a session drives: plain TCP, Unix domain
//! sockets, and (behind the `tls` feature) TLS over TCP.

use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::{Error, Result};

/// One byte-stream connection to a server.
///
/// A session only ever calls these six operations; it never touches a
/// concrete socket type, which is what lets the TLS upgrade and
/// cancellation's side-channel connection reuse the same driving code as
/// a plain TCP session.
pub trait Transport: Send {
    /// Write the entirety of `buf`, blocking until it's all been accepted
    /// by the OS (or handed to the TLS layer).
    fn send_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Fill `buf` completely, blocking until it has, or fail with
    /// `Error::ConnectionClosed` on EOF before `buf` is full.
    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Open a second connection to the same peer, used for `CancelRequest`
    /// (which must run on its own connection, never the one being
    /// cancelled).
    fn duplicate(&self) -> Result<Box<dyn Transport>>;

    /// Shut down the connection. Idempotent from the caller's point of
    /// view: a session only calls this once per transport.
    fn close(&mut self) -> Result<()>;

    /// Whether this transport can be upgraded in place via
    /// `tls_handshake`. Plain TCP/Unix transports return `false`; an
    /// already-TLS transport also returns `false` (no double upgrade).
    fn supports_tls(&self) -> bool {
        false
    }

    /// Consume `self` and return a TLS-wrapped transport speaking to
    /// `server_name`. Only called after the server has answered
    /// `SSLRequest` with `'S'`. The default implementation is for
    /// transports that never support TLS.
    fn tls_handshake(self: Box<Self>, server_name: &str) -> Result<Box<dyn Transport>> {
        let _ = server_name;
        Err(Error::Unsupported(
            "this transport does not support TLS".into(),
        ))
    }
}

/// A plain TCP connection.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream
            .read_exact(buf)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
                _ => Error::Io(e),
            })
    }

    fn duplicate(&self) -> Result<Box<dyn Transport>> {
        let stream = self.stream.try_clone()?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpTransport { stream }))
    }

    fn close(&mut self) -> Result<()> {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }

    #[cfg(feature = "tls")]
    fn supports_tls(&self) -> bool {
        true
    }

    #[cfg(feature = "tls")]
    fn tls_handshake(self: Box<Self>, server_name: &str) -> Result<Box<dyn Transport>> {
        let connector = native_tls::TlsConnector::new()?;
        let tls_stream = connector.connect(server_name, self.stream)?;
        Ok(Box::new(TlsTransport { stream: tls_stream }))
    }
}

/// A TLS connection established over TCP, after the server has accepted
/// an `SSLRequest`.
#[cfg(feature = "tls")]
pub struct TlsTransport {
    stream: native_tls::TlsStream<TcpStream>,
}

#[cfg(feature = "tls")]
impl Transport for TlsTransport {
    fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream
            .read_exact(buf)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
                _ => Error::Io(e),
            })
    }

    fn duplicate(&self) -> Result<Box<dyn Transport>> {
        let tcp = self.stream.get_ref().try_clone()?;
        tcp.set_nodelay(true)?;
        Ok(Box::new(TcpTransport { stream: tcp }))
    }

    fn close(&mut self) -> Result<()> {
        let _ = self.stream.shutdown();
        Ok(())
    }
}

/// A Unix domain socket connection.
#[cfg(unix)]
pub struct UnixTransport {
    stream: UnixStream,
}

#[cfg(unix)]
impl UnixTransport {
    pub fn connect(path: &str) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        Ok(Self { stream })
    }
}

#[cfg(unix)]
impl Transport for UnixTransport {
    fn send_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream
            .read_exact(buf)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
                _ => Error::Io(e),
            })
    }

    fn duplicate(&self) -> Result<Box<dyn Transport>> {
        let stream = self.stream.try_clone()?;
        Ok(Box::new(UnixTransport { stream }))
    }

    fn close(&mut self) -> Result<()> {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}
