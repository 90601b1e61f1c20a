//! End-to-end tests for sessmux.
//!
//! Real client and server controllers talk over loopback TCP, Unix domain
//! sockets and TLS; scripted raw peers built from the crate's own codec
//! cover the silent-peer and protocol-violation paths.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use sessmux::protocol::messages::{
    build_frame, SessionIdChange, SessionIdConfirm, SessionInitReply, SessionInitStart,
    ErrorMessage,
};
use sessmux::protocol::{flags, msg_type, sub_type, Frame, FrameBuffer, MessageHeader};
use sessmux::{ErrorCode, Session, SessionConfig, SessionController, SessionEventSink};

// ----------------------------------------------------------------------
// Test plumbing
// ----------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Event {
    Session {
        opened: bool,
        session_id: u32,
        identifier: u64,
    },
    Data {
        is_stream: bool,
        data: Vec<u8>,
    },
    Error {
        code: ErrorCode,
    },
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl SessionEventSink for ChannelSink {
    fn on_session(&self, opened: bool, session: &Arc<Session>, identifier: u64) {
        let _ = self.tx.send(Event::Session {
            opened,
            session_id: session.session_id(),
            identifier,
        });
    }

    fn on_data(&self, _session: &Arc<Session>, is_stream: bool, data: &[u8]) {
        let _ = self.tx.send(Event::Data {
            is_stream,
            data: data.to_vec(),
        });
    }

    fn on_error(&self, _session: &Arc<Session>, code: ErrorCode, _message: &str) {
        let _ = self.tx.send(Event::Error { code });
    }
}

fn channel_sink() -> (Arc<ChannelSink>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSink { tx }), rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn expect_session_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> (bool, u32, u64) {
    match next_event(rx).await {
        Event::Session {
            opened,
            session_id,
            identifier,
        } => (opened, session_id, identifier),
        other => panic!("expected session event, got {:?}", other),
    }
}

async fn expect_data_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> (bool, Vec<u8>) {
    match next_event(rx).await {
        Event::Data { is_stream, data } => (is_stream, data),
        other => panic!("expected data event, got {:?}", other),
    }
}

async fn expect_error_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> ErrorCode {
    match next_event(rx).await {
        Event::Error { code } => code,
        other => panic!("expected error event, got {:?}", other),
    }
}

/// Config with fast timers for timeout scenarios and heartbeats pushed out
/// of the way.
fn fast_timer_config() -> SessionConfig {
    SessionConfig {
        reply_timeout: Duration::from_millis(200),
        heartbeat_interval: Duration::from_secs(120),
        timer_tick: Duration::from_millis(50),
        ..SessionConfig::default()
    }
}

/// Deterministic pseudo-random payload (xorshift over the seed).
fn pseudo_random_payload(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// A scripted peer speaking the wire protocol directly over TCP.
struct RawPeer {
    stream: TcpStream,
    parser: FrameBuffer,
    pending: VecDeque<Frame>,
}

impl RawPeer {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            parser: FrameBuffer::new(),
            pending: VecDeque::new(),
        }
    }

    async fn next_frame(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return frame;
            }
            let mut buf = [0u8; 4096];
            let n = timeout(Duration::from_secs(10), self.stream.read(&mut buf))
                .await
                .expect("raw peer read timed out")
                .expect("raw peer read failed");
            assert!(n > 0, "peer closed the connection unexpectedly");
            self.pending.extend(self.parser.push(&buf[..n]).unwrap());
        }
    }

    async fn send(&mut self, header: MessageHeader, body: &[u8]) {
        self.stream
            .write_all(&build_frame(&header, body))
            .await
            .unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Read frames until EOF, returning everything seen on the way.
    async fn drain_until_eof(&mut self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.pending.drain(..).collect();
        loop {
            let mut buf = [0u8; 4096];
            let n = timeout(Duration::from_secs(10), self.stream.read(&mut buf))
                .await
                .expect("raw peer read timed out")
                .expect("raw peer read failed");
            if n == 0 {
                return frames;
            }
            if let Ok(parsed) = self.parser.push(&buf[..n]) {
                frames.extend(parsed);
            }
        }
    }

    /// Play the server half of the session bring-up, confirming the
    /// client's offered id unchanged.
    async fn serve_handshake(&mut self) -> u32 {
        let frame = self.next_frame().await;
        assert_eq!(frame.msg_type(), msg_type::SESSION);
        assert_eq!(frame.sub_type(), sub_type::session::INIT_START);
        let init = SessionInitStart::decode(&frame.body).unwrap();

        let body = SessionIdChange {
            old_id: init.offered_session_id,
            new_id: init.offered_session_id,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::ID_CHANGE,
            flags::IS_REPLY,
            frame.message_id(),
            init.offered_session_id,
            body.len(),
        );
        self.send(header, &body).await;

        let frame = self.next_frame().await;
        assert_eq!(frame.sub_type(), sub_type::session::ID_CONFIRM);
        let confirm = SessionIdConfirm::decode(&frame.body).unwrap();

        let body = SessionInitReply {
            new_id: confirm.new_id,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::INIT_REPLY,
            flags::IS_REPLY,
            frame.message_id(),
            confirm.new_id,
            body.len(),
        );
        self.send(header, &body).await;

        confirm.new_id
    }

    /// Play the client half of the bring-up with the given offered id.
    async fn client_handshake(&mut self, offered_id: u32, identifier: u64) -> u32 {
        let body = SessionInitStart {
            offered_session_id: offered_id,
            session_identifier: identifier,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::INIT_START,
            flags::REPLY_EXPECTED,
            1,
            offered_id,
            body.len(),
        );
        self.send(header, &body).await;

        let frame = self.next_frame().await;
        assert_eq!(frame.sub_type(), sub_type::session::ID_CHANGE);
        let change = SessionIdChange::decode(&frame.body).unwrap();

        let body = SessionIdConfirm {
            new_id: change.new_id,
            session_identifier: identifier,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::ID_CONFIRM,
            flags::REPLY_EXPECTED,
            2,
            change.new_id,
            body.len(),
        );
        self.send(header, &body).await;

        let frame = self.next_frame().await;
        assert_eq!(frame.sub_type(), sub_type::session::INIT_REPLY);
        change.new_id
    }
}

// ----------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_loopback_handshake_tcp() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client
        .start_tcp_session("127.0.0.1", port, 0xDEADBEEF)
        .await
        .unwrap();

    let (opened, client_sid, identifier) = expect_session_event(&mut client_events).await;
    assert!(opened);
    assert_ne!(client_sid, 0);
    assert_eq!(identifier, 0xDEADBEEF);

    let (opened, server_sid, identifier) = expect_session_event(&mut server_events).await;
    assert!(opened);
    assert_eq!(server_sid, client_sid);
    assert_eq!(identifier, 0xDEADBEEF);

    assert_eq!(session.session_id(), client_sid);
    assert!(session.is_active());
    assert!(client.get_session(client_sid).is_some());
    assert!(server.get_session(server_sid).is_some());
}

#[tokio::test]
async fn test_single_block_echo_dynamic_and_static() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    let payload = b"hello world! this is exactly 42 bytes.....";
    assert_eq!(payload.len(), 42);
    session.send_stream_data(payload, true, false).await.unwrap();

    let (is_stream, data) = expect_data_event(&mut server_events).await;
    assert!(is_stream);
    assert_eq!(&data, payload);

    // The static path pads on the wire but delivers the exact bytes.
    session.send_stream_data(b"static", false, false).await.unwrap();
    let (is_stream, data) = expect_data_event(&mut server_events).await;
    assert!(is_stream);
    assert_eq!(&data, b"static");
}

#[tokio::test]
async fn test_stream_data_with_reply_clears_timer() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::with_config(server_sink, fast_timer_config());
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::with_config(client_sink, fast_timer_config());
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    session.send_stream_data(b"ping", true, true).await.unwrap();
    expect_data_event(&mut server_events).await;

    // The receipt confirmation must arrive well within the timeout window;
    // no MESSAGE_TIMEOUT may fire afterwards.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(client_events.try_recv().is_err());
}

#[tokio::test]
async fn test_reply_timeout_against_silent_peer() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Scripted server: complete the handshake, then go silent.
    let peer_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = RawPeer::new(stream);
        peer.serve_handshake().await;
        // Swallow everything without ever replying.
        loop {
            peer.next_frame().await;
        }
    });

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::with_config(client_sink, fast_timer_config());
    let session = client.start_tcp_session("127.0.0.1", port, 7).await.unwrap();

    let (opened, _, _) = expect_session_event(&mut client_events).await;
    assert!(opened);

    session.send_stream_data(b"anyone there?", true, true).await.unwrap();

    let code = expect_error_event(&mut client_events).await;
    assert_eq!(code, ErrorCode::MessageTimeout);

    // Exactly one timeout per reply-expected message.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(client_events.try_recv().is_err());
    assert!(session.is_active(), "timeout must not close the session");

    peer_task.abort();
}

#[tokio::test]
async fn test_multiblock_one_mebibyte_transfer() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    let payload = pseudo_random_payload(0xC0FFEE, 1_048_576);
    let multiblock_id = session.send_multiblock_data(&payload).await.unwrap();
    assert_ne!(multiblock_id, 0);

    let (is_stream, data) = expect_data_event(&mut server_events).await;
    assert!(!is_stream);
    assert_eq!(data.len(), 1_048_576);
    assert_eq!(data, payload);
}

#[tokio::test]
async fn test_multiblock_just_above_single_block_ceiling() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    // 1001 bytes: rejected by the stream path, accepted by multi-block.
    let payload = pseudo_random_payload(0xBEEF, 1001);
    assert!(session.send_stream_data(&payload, true, false).await.is_err());

    session.send_multiblock_data(&payload).await.unwrap();
    let (is_stream, data) = expect_data_event(&mut server_events).await;
    assert!(!is_stream);
    assert_eq!(data, payload);
}

#[tokio::test]
async fn test_multiblock_abort_mid_transfer() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    let payload = pseudo_random_payload(0xABAD1DEA, 10 * 1_048_576);
    let multiblock_id = session.send_multiblock_data(&payload).await.unwrap();
    session.abort_messages(multiblock_id).await.unwrap();

    // The receiver drops its buffer and reports the failure; the payload
    // never reaches the data callback.
    let code = expect_error_event(&mut server_events).await;
    assert_eq!(code, ErrorCode::MultiblockFailed);

    tokio::time::sleep(Duration::from_millis(300)).await;
    loop {
        match server_events.try_recv() {
            Ok(Event::Data { .. }) => panic!("aborted transfer must not deliver data"),
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}

#[tokio::test]
async fn test_multiblock_refused_by_receiver() {
    let (server_sink, mut server_events) = channel_sink();
    let server_config = SessionConfig {
        max_multiblock_size: 1024,
        ..SessionConfig::default()
    };
    let server = SessionController::with_config(server_sink, server_config);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    session.send_multiblock_data(&vec![0u8; 4096]).await.unwrap();

    let code = expect_error_event(&mut client_events).await;
    assert_eq!(code, ErrorCode::MultiblockFailed);
}

#[tokio::test]
async fn test_version_mismatch_tears_session_down() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut peer = RawPeer::new(stream);
    let session_id = peer.client_handshake(0x1234_5678, 0xFEED).await;

    let (opened, server_sid, _) = expect_session_event(&mut server_events).await;
    assert!(opened);
    assert_eq!(server_sid, session_id);

    // Forge a frame claiming protocol version 2.
    let header = MessageHeader::new(
        msg_type::HEARTBEAT,
        sub_type::heartbeat::START,
        0,
        3,
        session_id,
        0,
    );
    let mut bytes = build_frame(&header, b"").to_vec();
    bytes[0] = 2;
    peer.send_raw(&bytes).await;

    // The server answers with the error frame and closes the connection.
    let frames = peer.drain_until_eof().await;
    let error_frame = frames
        .iter()
        .find(|f| f.msg_type() == msg_type::ERROR)
        .expect("expected an error frame before EOF");
    assert_eq!(error_frame.sub_type(), sub_type::error::FALSE_VERSION);
    let error = ErrorMessage::decode(&error_frame.body).unwrap();
    assert_eq!(error.code, ErrorCode::FalseVersion);

    // Locally: error callback, then the session-closed callback.
    let code = expect_error_event(&mut server_events).await;
    assert_eq!(code, ErrorCode::FalseVersion);
    let (opened, _, _) = expect_session_event(&mut server_events).await;
    assert!(!opened);

    assert!(server.get_session(session_id).is_none());
}

#[tokio::test]
async fn test_graceful_close_with_reply() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 0xC10E).await.unwrap();

    let (_, session_id, _) = expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    session.close_session(true).await.unwrap();

    let (opened, sid, identifier) = expect_session_event(&mut server_events).await;
    assert!(!opened);
    assert_eq!(sid, session_id);
    assert_eq!(identifier, 0xC10E);

    let (opened, sid, _) = expect_session_event(&mut client_events).await;
    assert!(!opened);
    assert_eq!(sid, session_id);

    // Exactly one closed event per side, registries empty on both.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(client_events.try_recv().is_err());
    assert!(server_events.try_recv().is_err());
    assert_eq!(client.session_count(), 0);
    assert_eq!(server.session_count(), 0);
    assert!(!session.is_session_ready());
}

#[tokio::test]
async fn test_immediate_close_without_reply() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 3).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    session.close_session(false).await.unwrap();

    let (opened, _, _) = expect_session_event(&mut client_events).await;
    assert!(!opened);
    let (opened, _, _) = expect_session_event(&mut server_events).await;
    assert!(!opened);

    assert_eq!(client.session_count(), 0);
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
async fn test_heartbeats_keep_the_session_quiet() {
    let config = SessionConfig {
        reply_timeout: Duration::from_millis(300),
        heartbeat_interval: Duration::from_millis(100),
        timer_tick: Duration::from_millis(50),
        ..SessionConfig::default()
    };

    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::with_config(server_sink, config.clone());
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::with_config(client_sink, config);
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    // Several heartbeat rounds pass; replies keep both sides silent.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(client_events.try_recv().is_err());
    assert!(server_events.try_recv().is_err());
    assert!(session.is_active());
}

#[cfg(unix)]
#[tokio::test]
async fn test_loopback_handshake_and_echo_unix() {
    let path = std::env::temp_dir().join(format!("sessmux-itest-{}.sock", std::process::id()));

    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    server.add_unix_server(&path).await.unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_unix_session(&path, 0xFACE).await.unwrap();

    let (opened, _, identifier) = expect_session_event(&mut client_events).await;
    assert!(opened);
    assert_eq!(identifier, 0xFACE);
    expect_session_event(&mut server_events).await;

    session.send_stream_data(b"over the socket file", true, false).await.unwrap();
    let (is_stream, data) = expect_data_event(&mut server_events).await;
    assert!(is_stream);
    assert_eq!(&data, b"over the socket file");
}

#[tokio::test]
async fn test_loopback_handshake_and_echo_tls() {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let dir = std::env::temp_dir();
    let cert_path = dir.join(format!("sessmux-itest-{}-cert.pem", std::process::id()));
    let key_path = dir.join(format!("sessmux-itest-{}-key.pem", std::process::id()));
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server
        .add_tls_tcp_server(0, &cert_path, &key_path)
        .await
        .unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client
        .start_tls_tcp_session("localhost", port, &cert_path, 0x7152)
        .await
        .unwrap();

    let (opened, _, identifier) = expect_session_event(&mut client_events).await;
    assert!(opened);
    assert_eq!(identifier, 0x7152);
    expect_session_event(&mut server_events).await;

    session.send_stream_data(b"encrypted hello", true, false).await.unwrap();
    let (is_stream, data) = expect_data_event(&mut server_events).await;
    assert!(is_stream);
    assert_eq!(&data, b"encrypted hello");

    let _ = std::fs::remove_file(&cert_path);
    let _ = std::fs::remove_file(&key_path);
}

#[tokio::test]
async fn test_close_server_stops_accepting() {
    let (server_sink, _server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    assert!(server.close_server(server_id));
    assert!(!server.close_server(server_id));

    tokio::time::sleep(Duration::from_millis(100)).await;

    // The listener is gone; a fresh connection attempt must fail.
    let result = TcpStream::connect(("127.0.0.1", port)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_stream_ordering_within_session() {
    let (server_sink, mut server_events) = channel_sink();
    let server = SessionController::new(server_sink);
    let server_id = server.add_tcp_server(0).await.unwrap();
    let port = server.server_port(server_id).unwrap();

    let (client_sink, mut client_events) = channel_sink();
    let client = SessionController::new(client_sink);
    let session = client.start_tcp_session("127.0.0.1", port, 1).await.unwrap();

    expect_session_event(&mut client_events).await;
    expect_session_event(&mut server_events).await;

    for i in 0u32..50 {
        session
            .send_stream_data(&i.to_le_bytes(), true, false)
            .await
            .unwrap();
    }

    for i in 0u32..50 {
        let (_, data) = expect_data_event(&mut server_events).await;
        assert_eq!(data, i.to_le_bytes());
    }
}
