//! End-to-end tests driving a real `Session` against a hand-scripted fake
//! server over a loopback TCP socket, covering the handshake, simple and
//! extended query protocols, LISTEN/NOTIFY, COPY, and cancellation.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::thread::JoinHandle;

use protogres::opts::{Opts, SslPolicy};
use protogres::session::{ControlFlow, PumpOutcome, Session};
use protogres::transport::TcpTransport;
use protogres::{Error, helpers};

fn frame(type_byte: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![type_byte];
    out.extend_from_slice(&((body.len() as i32) + 4).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn cstr(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

/// Start a fake server on an ephemeral port and hand its connected socket
/// to `server_fn` on a background thread. Returns the port to connect to
/// and a handle to join once the test has driven the client side.
fn spawn_server(
    server_fn: impl FnOnce(TcpStream) + Send + 'static,
) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (socket, _) = listener.accept().unwrap();
        server_fn(socket);
    });
    (port, handle)
}

fn read_frontend_message(socket: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut type_byte = [0u8; 1];
    socket.read_exact(&mut type_byte).unwrap();
    let mut len_bytes = [0u8; 4];
    socket.read_exact(&mut len_bytes).unwrap();
    let len = i32::from_be_bytes(len_bytes) as usize - 4;
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).unwrap();
    (type_byte[0], body)
}

/// Consume the `StartupMessage` (no leading type byte) and answer with a
/// trust-auth handshake: `AuthenticationOk`, `BackendKeyData`,
/// `ParameterStatus`, `ReadyForQuery`.
fn serve_trust_handshake(socket: &mut TcpStream) {
    let mut len_bytes = [0u8; 4];
    socket.read_exact(&mut len_bytes).unwrap();
    let len = i32::from_be_bytes(len_bytes) as usize - 4;
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).unwrap();

    socket.write_all(&frame(b'R', &0i32.to_be_bytes())).unwrap();
    let mut key_data = 4242i32.to_be_bytes().to_vec();
    key_data.extend_from_slice(&9999i32.to_be_bytes());
    socket.write_all(&frame(b'K', &key_data)).unwrap();
    let mut param = cstr("server_version");
    param.extend(cstr("16.2"));
    socket.write_all(&frame(b'S', &param)).unwrap();
    socket.write_all(&frame(b'Z', b"I")).unwrap();
}

fn connect_and_handshake(port: u16) -> Session<'static> {
    let transport = Box::new(TcpTransport::connect("127.0.0.1", port).unwrap());
    let opts = Opts {
        host: "127.0.0.1".into(),
        port,
        user: "postgres".into(),
        ssl_policy: SslPolicy::Disabled,
        ..Default::default()
    };
    Session::handshake(transport, &opts).unwrap()
}

#[test]
fn login_handshake_then_simple_query_returns_rows() {
    let (port, server) = spawn_server(|mut socket| {
        serve_trust_handshake(&mut socket);

        let (type_byte, _body) = read_frontend_message(&mut socket);
        assert_eq!(type_byte, b'Q');

        let mut row_desc = 1u16.to_be_bytes().to_vec();
        row_desc.extend(cstr("n"));
        row_desc.extend_from_slice(&0i32.to_be_bytes());
        row_desc.extend_from_slice(&0i16.to_be_bytes());
        row_desc.extend_from_slice(&23i32.to_be_bytes());
        row_desc.extend_from_slice(&4i16.to_be_bytes());
        row_desc.extend_from_slice(&(-1i32).to_be_bytes());
        row_desc.extend_from_slice(&0u16.to_be_bytes());
        socket.write_all(&frame(b'T', &row_desc)).unwrap();

        let mut data_row = 1u16.to_be_bytes().to_vec();
        data_row.extend_from_slice(&1i32.to_be_bytes());
        data_row.push(b'1');
        socket.write_all(&frame(b'D', &data_row)).unwrap();

        socket.write_all(&frame(b'C', &cstr("SELECT 1"))).unwrap();
        socket.write_all(&frame(b'Z', b"I")).unwrap();
    });

    let mut session = connect_and_handshake(port);
    session.stage_query("SELECT 1").unwrap();
    session.flush().unwrap();
    let result = helpers::get_query_results(&mut session, false).unwrap();

    assert_eq!(result.blocks.len(), 1);
    let block = &result.blocks[0];
    assert_eq!(block.rows.len(), 1);
    assert_eq!(block.rows[0][0].as_deref(), Some(b"1".as_slice()));

    session.terminate().unwrap();
    server.join().unwrap();
}

#[test]
fn simple_query_error_is_reported_with_finish_on_error() {
    let (port, server) = spawn_server(|mut socket| {
        serve_trust_handshake(&mut socket);
        let (type_byte, _) = read_frontend_message(&mut socket);
        assert_eq!(type_byte, b'Q');

        let mut fields = Vec::new();
        fields.push(b'S');
        fields.extend(cstr("ERROR"));
        fields.push(b'C');
        fields.extend(cstr("42601"));
        fields.push(b'M');
        fields.extend(cstr("syntax error"));
        fields.push(0);
        socket.write_all(&frame(b'E', &fields)).unwrap();
        socket.write_all(&frame(b'Z', b"I")).unwrap();
    });

    let mut session = connect_and_handshake(port);
    session.stage_query("SELECT ???").unwrap();
    session.flush().unwrap();
    let err = helpers::get_query_results(&mut session, false).unwrap_err();
    match err {
        Error::Server(server_err) => assert_eq!(server_err.code(), "42601"),
        other => panic!("expected Error::Server, got {other:?}"),
    }

    session.terminate().unwrap();
    server.join().unwrap();
}

#[test]
fn copy_in_round_trip_sends_data_and_done() {
    let (port, server) = spawn_server(|mut socket| {
        serve_trust_handshake(&mut socket);
        let (type_byte, _) = read_frontend_message(&mut socket);
        assert_eq!(type_byte, b'Q');

        let copy_in = {
            let mut body = vec![0u8];
            body.extend_from_slice(&0u16.to_be_bytes());
            body
        };
        socket.write_all(&frame(b'G', &copy_in)).unwrap();

        let (type_byte, body) = read_frontend_message(&mut socket);
        assert_eq!(type_byte, b'd');
        assert_eq!(body, b"1\t2\n");

        let (type_byte, _) = read_frontend_message(&mut socket);
        assert_eq!(type_byte, b'c');

        socket.write_all(&frame(b'C', &cstr("COPY 1"))).unwrap();
        socket.write_all(&frame(b'Z', b"I")).unwrap();
    });

    let mut session = connect_and_handshake(port);
    session.stage_query("COPY t FROM STDIN").unwrap();
    session.flush().unwrap();

    let mut saw_copy_in = false;
    let outcome = session
        .poll_messages(
            |raw| {
                if raw.type_byte == b'G' {
                    saw_copy_in = true;
                    ControlFlow::Break
                } else {
                    ControlFlow::Continue
                }
            },
            true,
        )
        .unwrap();
    assert!(saw_copy_in);
    assert!(matches!(outcome, PumpOutcome::InterceptorBreak));

    session.stage_copy_data(b"1\t2\n").unwrap();
    session.stage_copy_done().unwrap();
    session.flush().unwrap();

    let result = helpers::get_query_results(&mut session, false).unwrap();
    assert_eq!(result.blocks.len(), 1);

    session.terminate().unwrap();
    server.join().unwrap();
}

#[test]
fn notification_callback_can_stop_the_pump() {
    let (port, server) = spawn_server(|mut socket| {
        serve_trust_handshake(&mut socket);
        let (type_byte, _) = read_frontend_message(&mut socket);
        assert_eq!(type_byte, b'Q');

        let mut body = 777i32.to_be_bytes().to_vec();
        body.extend(cstr("channel_a"));
        body.extend(cstr("payload_a"));
        socket.write_all(&frame(b'A', &body)).unwrap();

        socket.write_all(&frame(b'C', &cstr("LISTEN"))).unwrap();
        socket.write_all(&frame(b'Z', b"I")).unwrap();
    });

    let mut session = connect_and_handshake(port);
    session.stage_query("LISTEN channel_a").unwrap();
    session.flush().unwrap();

    let mut received = None;
    session.on_notification(|info| {
        received = Some(info);
        ControlFlow::Break
    });

    let outcome = session.poll_messages(|_| ControlFlow::Continue, true).unwrap();
    assert!(matches!(outcome, PumpOutcome::NotificationBreak));
    let info = received.unwrap();
    assert_eq!(info.channel, "channel_a");
    assert_eq!(info.payload, "payload_a");

    session.terminate().unwrap();
    server.join().unwrap();
}

#[test]
fn cancel_request_is_sent_on_a_duplicated_connection() {
    let (port, server) = spawn_server(|mut socket| {
        serve_trust_handshake(&mut socket);

        let mut cancel_len = [0u8; 4];
        socket.read_exact(&mut cancel_len).unwrap();
        let len = i32::from_be_bytes(cancel_len) as usize - 4;
        let mut body = vec![0u8; len];
        socket.read_exact(&mut body).unwrap();
        assert_eq!(&body[0..4], &80_877_102i32.to_be_bytes());
        assert_eq!(&body[4..8], &4242i32.to_be_bytes());
        assert_eq!(&body[8..12], &9999i32.to_be_bytes());
    });

    let session = connect_and_handshake(port);
    assert_eq!(session.backend_key_data(), Some((4242, 9999)));
    session.cancel_request().unwrap();

    server.join().unwrap();
}
