//! Per-connection session object.
//!
//! A [`Session`] binds one transport connection to one logical channel: it
//! owns the state machine guarding every operation, the writer task that
//! serializes socket writes, the multi-block engine and the read task that
//! feeds the dispatcher. Public API calls are rejected with
//! [`SessionError::InvalidState`] whenever the state machine says the
//! operation is not admissible; they never block waiting for a state change.
//!
//! Lifecycle methods (`connect_session`, `make_session_ready`,
//! `end_session`, `disconnect_session`) are crate-internal and driven by the
//! dispatcher and controller.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::task::AbortHandle;

use crate::config::SessionConfig;
use crate::dispatch;
use crate::error::{ErrorCode, Result, SessionError};
use crate::handler::SessionHandler;
use crate::multiblock::{total_part_number, MultiblockIo, OutgoingMessage};
use crate::protocol::messages::{
    DataMultiId, DataMultiInit, DataMultiInitReply, DataMultiStatic, DataSingleStatic,
    ErrorMessage, SessionCloseStart, SessionIdChange, SessionIdConfirm, SessionInitReply,
    SessionInitStart,
};
use crate::protocol::{
    flags, msg_type, sub_type, FrameBuffer, MessageHeader, STATIC_PAYLOAD_SIZE,
};
use crate::sink::SessionEventSink;
use crate::statemachine::{Event, State, StateMachine};
use crate::transport::{BoxedReader, SessionStream};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// A logical bidirectional channel between two peers over one connection.
pub struct Session {
    session_id: AtomicU32,
    session_identifier: AtomicU64,
    identifier_set: AtomicBool,
    client_side: bool,
    statemachine: StateMachine,
    message_id_counter: AtomicU32,
    writer: WriterHandle,
    pub(crate) multiblock: MultiblockIo,
    pub(crate) handler: Weak<SessionHandler>,
    pub(crate) sink: Arc<dyn SessionEventSink>,
    pub(crate) config: SessionConfig,
    /// Read half, parked here until `connect_session` spawns the read task.
    reader: Mutex<Option<BoxedReader>>,
    read_task: Mutex<Option<AbortHandle>>,
    worker_task: Mutex<Option<AbortHandle>>,
}

impl Session {
    /// Create a session around a connected stream.
    ///
    /// The writer task starts immediately; the read task and the multi-block
    /// worker start in [`connect_session`](Self::connect_session).
    pub(crate) fn new(
        stream: SessionStream,
        client_side: bool,
        handler: Weak<SessionHandler>,
        sink: Arc<dyn SessionEventSink>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (reader, write_half) = stream.into_split();
        let (writer, _writer_task) = spawn_writer_task(write_half);

        Arc::new(Self {
            session_id: AtomicU32::new(0),
            session_identifier: AtomicU64::new(0),
            identifier_set: AtomicBool::new(false),
            client_side,
            statemachine: StateMachine::new(),
            message_id_counter: AtomicU32::new(0),
            writer,
            multiblock: MultiblockIo::new(),
            handler,
            sink,
            config,
            reader: Mutex::new(Some(reader)),
            read_task: Mutex::new(None),
            worker_task: Mutex::new(None),
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current session id (0 until bring-up assigns one).
    pub fn session_id(&self) -> u32 {
        self.session_id.load(Ordering::SeqCst)
    }

    /// Whether this endpoint opened the connection.
    pub fn is_client_side(&self) -> bool {
        self.client_side
    }

    /// The opaque identifier supplied at session start.
    pub fn session_identifier(&self) -> u64 {
        self.session_identifier.load(Ordering::SeqCst)
    }

    /// Whether user data may currently flow.
    pub fn is_active(&self) -> bool {
        self.statemachine.is_in_state(State::Active)
    }

    /// Whether the session finished bring-up and was not closed since.
    pub fn is_session_ready(&self) -> bool {
        self.statemachine.is_in_state(State::SessionReady)
    }

    /// Current state-machine leaf, for diagnostics.
    pub fn current_state(&self) -> State {
        self.statemachine.current()
    }

    /// Increment the per-session message counter and return the new value.
    pub fn next_message_id(&self) -> u32 {
        self.message_id_counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub(crate) fn set_session_id(&self, id: u32) {
        self.session_id.store(id, Ordering::SeqCst);
    }

    /// Record the identifier; only the first assignment sticks.
    pub(crate) fn set_identifier(&self, identifier: u64) {
        if self
            .identifier_set
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.session_identifier.store(identifier, Ordering::SeqCst);
        }
    }

    // ------------------------------------------------------------------
    // Public API
    // ------------------------------------------------------------------

    /// Send a payload as a single stream frame.
    ///
    /// `dynamic=false` sends the fixed-size frame, `dynamic=true` the
    /// smallest-fit one. With `reply_expected` the peer's receipt
    /// confirmation is awaited by the timer; a missing reply surfaces as
    /// MESSAGE_TIMEOUT on the error callback.
    pub async fn send_stream_data(
        self: &Arc<Self>,
        data: &[u8],
        dynamic: bool,
        reply_expected: bool,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(SessionError::EmptyPayload);
        }
        if data.len() > STATIC_PAYLOAD_SIZE {
            return Err(SessionError::PayloadTooLarge {
                size: data.len(),
                max: STATIC_PAYLOAD_SIZE,
            });
        }
        if !self.statemachine.is_in_state(State::Active) {
            return Err(SessionError::InvalidState("send stream data"));
        }

        let mut flag_bits = flags::END_OF_STREAM;
        if reply_expected {
            flag_bits |= flags::REPLY_EXPECTED;
        }

        let (sub, body) = if dynamic {
            (
                sub_type::data_single::DYNAMIC,
                Bytes::copy_from_slice(data),
            )
        } else {
            let message = DataSingleStatic {
                payload: Bytes::copy_from_slice(data),
            };
            (sub_type::data_single::STATIC, message.encode_body())
        };

        let header = MessageHeader::new(
            msg_type::SINGLEBLOCK_DATA,
            sub,
            flag_bits,
            self.next_message_id(),
            self.session_id(),
            body.len(),
        );
        self.send_message(header, body).await
    }

    /// Start a multi-block transfer and return its id.
    ///
    /// The payload is queued immediately; chunking begins once the peer has
    /// acknowledged the announcement.
    pub async fn send_multiblock_data(self: &Arc<Self>, data: &[u8]) -> Result<u64> {
        if data.is_empty() {
            return Err(SessionError::EmptyPayload);
        }
        if !self.statemachine.is_in_state(State::Active) {
            return Err(SessionError::InvalidState("send multiblock data"));
        }

        let multiblock_id = self.multiblock.create_outgoing(data);

        let body = DataMultiInit {
            multiblock_id,
            total_size: data.len() as u64,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::MULTIBLOCK_DATA,
            sub_type::data_multi::INIT,
            flags::REPLY_EXPECTED,
            self.next_message_id(),
            self.session_id(),
            body.len(),
        )
        .with_total_message_id(multiblock_id);
        self.send_message(header, body).await?;

        Ok(multiblock_id)
    }

    /// Abort a multi-block transfer.
    ///
    /// The entry leaves the backlog (or the worker drops the remainder
    /// between chunks) and the peer is told to discard its reassembly
    /// buffer.
    pub async fn abort_messages(self: &Arc<Self>, multiblock_id: u64) -> Result<()> {
        if self.multiblock.is_still_active(multiblock_id) {
            // The worker notices the removal between chunks and emits the
            // abort frame itself.
            self.multiblock.remove_outgoing(multiblock_id);
            return Ok(());
        }

        self.multiblock.remove_outgoing(multiblock_id);
        self.send_multi_abort_init(multiblock_id).await
    }

    /// Close the session.
    ///
    /// With `reply_expected` the peer's `Session_Close_Reply` drives the
    /// teardown; without, teardown runs immediately.
    pub async fn close_session(self: &Arc<Self>, reply_expected: bool) -> Result<()> {
        if !self.statemachine.is_in_state(State::SessionReady) {
            return Err(SessionError::InvalidState("close session"));
        }

        self.multiblock.clear_outgoing();

        if reply_expected {
            self.send_session_close_start(true, true).await
        } else {
            self.end_session(true).await
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle internals, driven by the dispatcher and controller
    // ------------------------------------------------------------------

    /// Bring the connection up: CONNECT transition, read task, multi-block
    /// worker, and (for the initiating side) the init-start frame.
    pub(crate) async fn connect_session(
        self: &Arc<Self>,
        session_id: u32,
        session_identifier: u64,
        init: bool,
    ) -> Result<()> {
        tracing::debug!(session_id, client_side = self.client_side, "session connect");

        if !self.statemachine.go_to_next_state(Event::Connect, None) {
            return Err(SessionError::InvalidState("connect session"));
        }
        self.set_session_id(session_id);

        let reader = self
            .reader
            .lock()
            .unwrap()
            .take()
            .ok_or(SessionError::ConnectionClosed)?;

        let read_task = tokio::spawn(read_loop(self.clone(), reader));
        *self.read_task.lock().unwrap() = Some(read_task.abort_handle());

        let worker = tokio::spawn(multiblock_worker(self.clone()));
        *self.worker_task.lock().unwrap() = Some(worker.abort_handle());

        if init {
            self.set_identifier(session_identifier);
            self.send_session_init_start(session_id, session_identifier)
                .await?;
        }

        Ok(())
    }

    /// Enter ready state and deliver the session-opened callback.
    pub(crate) fn make_session_ready(
        self: &Arc<Self>,
        session_id: u32,
        session_identifier: u64,
    ) -> Result<()> {
        tracing::debug!(session_id, "make session ready");

        if !self
            .statemachine
            .go_to_next_state(Event::StartSession, Some(State::SessionNotReady))
        {
            return Err(SessionError::InvalidState("make session ready"));
        }

        self.set_session_id(session_id);
        self.set_identifier(session_identifier);
        self.sink.on_session(true, self, self.session_identifier());
        Ok(())
    }

    /// Stop the session: callback, optional courtesy close-start,
    /// deregistration, disconnect.
    pub(crate) async fn end_session(self: &Arc<Self>, init: bool) -> Result<()> {
        tracing::debug!(session_id = self.session_id(), init, "session close");

        if !self.statemachine.go_to_next_state(Event::StopSession, None) {
            return Err(SessionError::InvalidState("end session"));
        }

        self.multiblock.clear_outgoing();
        self.sink
            .on_session(false, self, self.session_identifier());

        if init {
            // Courtesy notification; the peer must not reply to it. A dead
            // socket is tolerated here.
            let _ = self.send_session_close_start(false, false).await;
        }

        if let Some(handler) = self.handler.upgrade() {
            handler.remove_session(self.session_id());
            handler
                .reply_handler()
                .remove_session_entries(self.session_id());
        }

        self.disconnect_session()
    }

    /// DISCONNECT transition and socket close.
    pub(crate) fn disconnect_session(&self) -> Result<()> {
        tracing::debug!(session_id = self.session_id(), "session disconnect");

        if !self.statemachine.go_to_next_state(Event::Disconnect, None) {
            return Err(SessionError::InvalidState("disconnect session"));
        }

        // Queued frames (close-reply, courtesy close-start) still flush
        // before the write half shuts down.
        self.writer.shutdown();
        if let Some(task) = self.read_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = self.worker_task.lock().unwrap().take() {
            task.abort();
        }
        Ok(())
    }

    /// Tear the session down, whatever state it is in.
    pub(crate) async fn teardown(self: &Arc<Self>, init: bool) {
        if self.end_session(init).await.is_err() {
            // Not in ready state; fall back to a bare disconnect.
            let _ = self.disconnect_session();
            if let Some(handler) = self.handler.upgrade() {
                handler.remove_session(self.session_id());
                handler
                    .reply_handler()
                    .remove_session_entries(self.session_id());
            }
        }
    }

    /// Send a heartbeat probe. The timer watches for the reply.
    pub(crate) async fn send_heartbeat(self: &Arc<Self>) -> Result<()> {
        if !self.statemachine.is_in_state(State::SessionReady) {
            return Err(SessionError::InvalidState("send heartbeat"));
        }

        let header = MessageHeader::new(
            msg_type::HEARTBEAT,
            sub_type::heartbeat::START,
            flags::REPLY_EXPECTED,
            self.next_message_id(),
            self.session_id(),
            0,
        );
        self.send_message(header, Bytes::new()).await
    }

    /// Report an error on the error callback.
    pub(crate) fn emit_error(self: &Arc<Self>, code: ErrorCode, message: &str) {
        tracing::debug!(session_id = self.session_id(), %code, message, "session error");
        self.sink.on_error(self, code, message);
    }

    // ------------------------------------------------------------------
    // Frame sending
    // ------------------------------------------------------------------

    /// Queue a frame; reply-expected frames register with the timer first.
    pub(crate) async fn send_message(
        self: &Arc<Self>,
        header: MessageHeader,
        body: Bytes,
    ) -> Result<()> {
        if header.is_reply_expected() {
            if let Some(handler) = self.handler.upgrade() {
                handler.reply_handler().add_message(
                    header.msg_type,
                    header.session_id,
                    header.message_id,
                    self.config.reply_timeout_ticks(),
                    Arc::downgrade(self),
                );
            }
        }
        self.writer.send(OutboundFrame::new(&header, body)).await
    }

    pub(crate) async fn send_session_init_start(
        self: &Arc<Self>,
        offered_session_id: u32,
        session_identifier: u64,
    ) -> Result<()> {
        tracing::debug!(offered_session_id, "send session init start");
        let body = SessionInitStart {
            offered_session_id,
            session_identifier,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::INIT_START,
            flags::REPLY_EXPECTED,
            self.next_message_id(),
            offered_session_id,
            body.len(),
        );
        self.send_message(header, body).await
    }

    /// The id-change answers init-start, addressed to the id the client
    /// still knows itself by.
    pub(crate) async fn send_session_id_change(
        self: &Arc<Self>,
        old_id: u32,
        new_id: u32,
        reply_to: u32,
    ) -> Result<()> {
        tracing::debug!(old_id, new_id, "send session id change");
        let body = SessionIdChange { old_id, new_id }.encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::ID_CHANGE,
            flags::IS_REPLY,
            reply_to,
            old_id,
            body.len(),
        );
        self.send_message(header, body).await
    }

    pub(crate) async fn send_session_id_confirm(
        self: &Arc<Self>,
        new_id: u32,
        session_identifier: u64,
    ) -> Result<()> {
        tracing::debug!(new_id, "send session id confirm");
        let body = SessionIdConfirm {
            new_id,
            session_identifier,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::ID_CONFIRM,
            flags::REPLY_EXPECTED,
            self.next_message_id(),
            new_id,
            body.len(),
        );
        self.send_message(header, body).await
    }

    pub(crate) async fn send_session_init_reply(
        self: &Arc<Self>,
        new_id: u32,
        reply_to: u32,
    ) -> Result<()> {
        tracing::debug!(new_id, "send session init reply");
        let body = SessionInitReply { new_id }.encode_body();
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::INIT_REPLY,
            flags::IS_REPLY,
            reply_to,
            new_id,
            body.len(),
        );
        self.send_message(header, body).await
    }

    pub(crate) async fn send_session_close_start(
        self: &Arc<Self>,
        initiator: bool,
        reply_expected: bool,
    ) -> Result<()> {
        tracing::debug!(session_id = self.session_id(), initiator, "send session close start");
        let body = SessionCloseStart { initiator }.encode_body();
        let mut flag_bits = 0;
        if reply_expected {
            flag_bits |= flags::REPLY_EXPECTED;
        }
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::CLOSE_START,
            flag_bits,
            self.next_message_id(),
            self.session_id(),
            body.len(),
        );
        self.send_message(header, body).await
    }

    pub(crate) async fn send_session_close_reply(self: &Arc<Self>, reply_to: u32) -> Result<()> {
        tracing::debug!(session_id = self.session_id(), "send session close reply");
        let header = MessageHeader::new(
            msg_type::SESSION,
            sub_type::session::CLOSE_REPLY,
            flags::IS_REPLY,
            reply_to,
            self.session_id(),
            0,
        );
        self.send_message(header, Bytes::new()).await
    }

    pub(crate) async fn send_heartbeat_reply(self: &Arc<Self>, reply_to: u32) -> Result<()> {
        let header = MessageHeader::new(
            msg_type::HEARTBEAT,
            sub_type::heartbeat::REPLY,
            flags::IS_REPLY,
            reply_to,
            self.session_id(),
            0,
        );
        self.send_message(header, Bytes::new()).await
    }

    pub(crate) async fn send_data_single_reply(self: &Arc<Self>, reply_to: u32) -> Result<()> {
        let header = MessageHeader::new(
            msg_type::SINGLEBLOCK_DATA,
            sub_type::data_single::REPLY,
            flags::IS_REPLY,
            reply_to,
            self.session_id(),
            0,
        );
        self.send_message(header, Bytes::new()).await
    }

    pub(crate) async fn send_multi_init_reply(
        self: &Arc<Self>,
        multiblock_id: u64,
        status: u8,
        reply_to: u32,
    ) -> Result<()> {
        let body = DataMultiInitReply {
            multiblock_id,
            status,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::MULTIBLOCK_DATA,
            sub_type::data_multi::INIT_REPLY,
            flags::IS_REPLY,
            reply_to,
            self.session_id(),
            body.len(),
        )
        .with_total_message_id(multiblock_id);
        self.send_message(header, body).await
    }

    pub(crate) async fn send_multi_abort_init(self: &Arc<Self>, multiblock_id: u64) -> Result<()> {
        tracing::debug!(multiblock_id, "send multi abort init");
        let body = DataMultiId { multiblock_id }.encode_body();
        let header = MessageHeader::new(
            msg_type::MULTIBLOCK_DATA,
            sub_type::data_multi::ABORT_INIT,
            0,
            self.next_message_id(),
            self.session_id(),
            body.len(),
        )
        .with_total_message_id(multiblock_id);
        self.send_message(header, body).await
    }

    pub(crate) async fn send_multi_abort_reply(self: &Arc<Self>, multiblock_id: u64) -> Result<()> {
        let body = DataMultiId { multiblock_id }.encode_body();
        let header = MessageHeader::new(
            msg_type::MULTIBLOCK_DATA,
            sub_type::data_multi::ABORT_REPLY,
            0,
            self.next_message_id(),
            self.session_id(),
            body.len(),
        )
        .with_total_message_id(multiblock_id);
        self.send_message(header, body).await
    }

    /// Answer a protocol violation with the matching error frame.
    pub(crate) async fn send_error_message(
        self: &Arc<Self>,
        code: ErrorCode,
        message: &str,
    ) -> Result<()> {
        let sub = match code {
            ErrorCode::FalseVersion => sub_type::error::FALSE_VERSION,
            ErrorCode::UnknownSession => sub_type::error::UNKNOWN_SESSION,
            _ => sub_type::error::INVALID_MESSAGE,
        };
        let body = ErrorMessage {
            code,
            message: message.to_string(),
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::ERROR,
            sub,
            0,
            self.next_message_id(),
            self.session_id(),
            body.len(),
        );
        self.send_message(header, body).await
    }

    /// Chunk one outgoing transfer onto the wire.
    ///
    /// Checks the active set between chunks so an abort can cut the
    /// transfer short; in that case the remainder is dropped and the abort
    /// frame goes out instead of the finish.
    async fn send_multiblock_chunks(self: &Arc<Self>, message: &OutgoingMessage) -> Result<()> {
        let total_size = message.payload.len() as u64;
        let parts_field = total_part_number(total_size);
        let mut part_id: u32 = 0;
        let mut offset = 0usize;

        while offset < message.payload.len() {
            if !self.multiblock.is_still_active(message.multiblock_id) {
                return self.send_multi_abort_init(message.multiblock_id).await;
            }

            let end = (offset + STATIC_PAYLOAD_SIZE).min(message.payload.len());
            let body = DataMultiStatic {
                multiblock_id: message.multiblock_id,
                total_part_number: parts_field,
                part_id,
                payload: message.payload.slice(offset..end),
            }
            .encode_body();
            let header = MessageHeader::new(
                msg_type::MULTIBLOCK_DATA,
                sub_type::data_multi::STATIC,
                0,
                self.next_message_id(),
                self.session_id(),
                body.len(),
            )
            .with_total_message_id(message.multiblock_id);
            self.writer.send(OutboundFrame::new(&header, body)).await?;

            offset = end;
            part_id += 1;
        }

        if !self.multiblock.is_still_active(message.multiblock_id) {
            return self.send_multi_abort_init(message.multiblock_id).await;
        }

        let body = DataMultiId {
            multiblock_id: message.multiblock_id,
        }
        .encode_body();
        let header = MessageHeader::new(
            msg_type::MULTIBLOCK_DATA,
            sub_type::data_multi::FINISH,
            flags::END_OF_STREAM,
            self.next_message_id(),
            self.session_id(),
            body.len(),
        )
        .with_total_message_id(message.multiblock_id);
        self.writer.send(OutboundFrame::new(&header, body)).await?;

        self.multiblock.finish_active(message.multiblock_id);
        Ok(())
    }
}

/// Read task: bytes → frame buffer → dispatcher.
///
/// Framing violations are answered on the wire and tear the session down;
/// transport errors surface on the error callback first.
pub(crate) async fn read_loop(session: Arc<Session>, mut reader: BoxedReader) {
    let mut frame_buffer = FrameBuffer::with_max_frame_size(session.config.max_frame_size);
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!(session_id = session.session_id(), "peer closed the connection");
                session.teardown(false).await;
                return;
            }
            Ok(n) => match frame_buffer.push(&buf[..n]) {
                Ok(frames) => {
                    for frame in frames {
                        dispatch::process_frame(&session, frame).await;
                    }
                }
                Err(SessionError::ProtocolViolation { code, message }) => {
                    let _ = session.send_error_message(code, &message).await;
                    session.emit_error(code, &message);
                    session.teardown(true).await;
                    return;
                }
                Err(e) => {
                    session.emit_error(ErrorCode::Undefined, &e.to_string());
                    session.teardown(true).await;
                    return;
                }
            },
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                session.emit_error(ErrorCode::Undefined, &format!("transport error: {}", e));
                session.teardown(true).await;
                return;
            }
        }
    }
}

/// Multi-block worker task: drains the backlog, one ready transfer at a
/// time, in enqueue order.
pub(crate) async fn multiblock_worker(session: Arc<Session>) {
    loop {
        let message = loop {
            if let Some(message) = session.multiblock.pop_ready() {
                break message;
            }
            session.multiblock.wait_for_work().await;
        };

        if let Err(e) = session.send_multiblock_chunks(&message).await {
            tracing::debug!("multiblock worker stopping: {}", e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SessionEventSink;

    struct NullSink;

    impl SessionEventSink for NullSink {
        fn on_session(&self, _opened: bool, _session: &Arc<Session>, _identifier: u64) {}
        fn on_data(&self, _session: &Arc<Session>, _is_stream: bool, _data: &[u8]) {}
        fn on_error(&self, _session: &Arc<Session>, _code: ErrorCode, _message: &str) {}
    }

    /// Session over an in-memory stream; the peer half must stay alive for
    /// writes to succeed.
    fn test_session() -> (Arc<Session>, tokio::io::DuplexStream) {
        let (stream, peer) = tokio::io::duplex(64 * 1024);
        let session = Session::new(
            SessionStream::from_duplex(stream),
            true,
            Weak::new(),
            Arc::new(NullSink),
            SessionConfig::default(),
        );
        (session, peer)
    }

    #[tokio::test]
    async fn test_message_id_counter_is_monotonic() {
        let (session, _peer) = test_session();
        let first = session.next_message_id();
        let second = session.next_message_id();
        let third = session.next_message_id();
        assert_eq!(second, first + 1);
        assert_eq!(third, second + 1);
    }

    #[tokio::test]
    async fn test_identifier_set_at_most_once() {
        let (session, _peer) = test_session();
        session.set_identifier(0xAAAA);
        session.set_identifier(0xBBBB);
        assert_eq!(session.session_identifier(), 0xAAAA);
    }

    #[tokio::test]
    async fn test_send_rejected_outside_active() {
        let (session, _peer) = test_session();
        let result = session.send_stream_data(b"data", false, false).await;
        assert!(matches!(result, Err(SessionError::InvalidState(_))));

        let result = session.send_multiblock_data(b"data").await;
        assert!(matches!(result, Err(SessionError::InvalidState(_))));

        let result = session.close_session(false).await;
        assert!(matches!(result, Err(SessionError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let (session, _peer) = test_session();
        assert!(matches!(
            session.send_stream_data(b"", false, false).await,
            Err(SessionError::EmptyPayload)
        ));
        assert!(matches!(
            session.send_multiblock_data(b"").await,
            Err(SessionError::EmptyPayload)
        ));
    }

    #[tokio::test]
    async fn test_oversized_stream_payload_rejected() {
        let (session, _peer) = test_session();
        session.connect_session(5, 0, false).await.unwrap();
        session.make_session_ready(5, 0).unwrap();

        let just_fits = vec![0u8; STATIC_PAYLOAD_SIZE];
        assert!(session.send_stream_data(&just_fits, true, false).await.is_ok());

        let one_over = vec![0u8; STATIC_PAYLOAD_SIZE + 1];
        assert!(matches!(
            session.send_stream_data(&one_over, true, false).await,
            Err(SessionError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let (session, _peer) = test_session();
        session.connect_session(5, 0, false).await.unwrap();
        let result = session.connect_session(5, 0, false).await;
        assert!(matches!(result, Err(SessionError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_session_id_stable_after_ready() {
        let (session, _peer) = test_session();
        session.connect_session(17, 0xFEED, true).await.unwrap();
        session.make_session_ready(17, 0xFEED).unwrap();
        assert_eq!(session.session_id(), 17);
        assert!(session.is_active());

        // A second ready attempt must not change anything.
        assert!(session.make_session_ready(99, 1).is_err());
        assert_eq!(session.session_id(), 17);
    }
}
