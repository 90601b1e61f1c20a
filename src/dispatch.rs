//! Inbound frame dispatcher.
//!
//! Runs synchronously on the session's read task: every complete frame is
//! first checked for reply bookkeeping and session-id consistency, then
//! routed to the typed handler of its message family. Handlers send
//! protocol replies through the session and drive its state machine;
//! whether a frame may reach the user is decided here, not in the state
//! machine itself.

use std::sync::Arc;

use crate::error::{ErrorCode, Result, SessionError};
use crate::protocol::messages::{
    DataMultiId, DataMultiInit, DataMultiInitReply, DataMultiStatic, DataSingleStatic,
    ErrorMessage, SessionCloseStart, SessionIdChange, SessionIdConfirm, SessionInitReply,
    SessionInitStart, MULTI_INIT_FAIL, MULTI_INIT_OK,
};
use crate::protocol::{msg_type, sub_type, Frame};
use crate::session::Session;

/// Route one frame through reply clearing, validation and the family
/// handlers.
pub(crate) async fn process_frame(session: &Arc<Session>, frame: Frame) {
    // A reply releases its pending-timer entry no matter what else the
    // frame triggers.
    if frame.is_reply() {
        if let Some(handler) = session.handler.upgrade() {
            handler
                .reply_handler()
                .remove_message(frame.session_id(), frame.message_id());
        }
    }

    // After bring-up every frame must carry our session id.
    if session.is_session_ready() && frame.session_id() != session.session_id() {
        let message = format!("frame for unknown session {}", frame.session_id());
        let _ = session
            .send_error_message(ErrorCode::UnknownSession, &message)
            .await;
        session.emit_error(ErrorCode::UnknownSession, &message);
        session.teardown(true).await;
        return;
    }

    let result = match frame.msg_type() {
        msg_type::SESSION => process_session_type(session, &frame).await,
        msg_type::HEARTBEAT => process_heartbeat_type(session, &frame).await,
        msg_type::ERROR => process_error_type(session, &frame).await,
        msg_type::SINGLEBLOCK_DATA => process_singleblock_type(session, &frame).await,
        msg_type::MULTIBLOCK_DATA => process_multiblock_type(session, &frame).await,
        unknown => {
            let message = format!("unknown message type 0x{:02X}", unknown);
            let _ = session
                .send_error_message(ErrorCode::InvalidMessageSize, &message)
                .await;
            session.emit_error(ErrorCode::InvalidMessageSize, &message);
            session.teardown(true).await;
            return;
        }
    };

    if let Err(e) = result {
        tracing::debug!(
            session_id = session.session_id(),
            msg_type = frame.msg_type(),
            sub_type = frame.sub_type(),
            "dispatch failed: {}",
            e
        );
    }
}

async fn unknown_sub_type(session: &Arc<Session>, frame: &Frame) -> Result<()> {
    let message = format!(
        "unknown subtype 0x{:02X} for message type 0x{:02X}",
        frame.sub_type(),
        frame.msg_type()
    );
    let _ = session
        .send_error_message(ErrorCode::InvalidMessageSize, &message)
        .await;
    session.emit_error(ErrorCode::InvalidMessageSize, &message);
    session.teardown(true).await;
    Ok(())
}

// ----------------------------------------------------------------------
// Session control
// ----------------------------------------------------------------------

async fn process_session_type(session: &Arc<Session>, frame: &Frame) -> Result<()> {
    match frame.sub_type() {
        sub_type::session::INIT_START => {
            let message = SessionInitStart::decode(&frame.body)?;
            process_session_init_start(session, frame, message).await
        }
        sub_type::session::ID_CHANGE => {
            let message = SessionIdChange::decode(&frame.body)?;
            process_session_id_change(session, message).await
        }
        sub_type::session::ID_CONFIRM => {
            let message = SessionIdConfirm::decode(&frame.body)?;
            process_session_id_confirm(session, frame, message).await
        }
        sub_type::session::INIT_REPLY => {
            let message = SessionInitReply::decode(&frame.body)?;
            tracing::debug!(new_id = message.new_id, "session init reply");
            Ok(())
        }
        sub_type::session::CLOSE_START => {
            let message = SessionCloseStart::decode(&frame.body)?;
            process_session_close_start(session, frame, message).await
        }
        sub_type::session::CLOSE_REPLY => {
            tracing::debug!(session_id = session.session_id(), "session close reply");
            session.end_session(false).await
        }
        _ => unknown_sub_type(session, frame).await,
    }
}

/// Server half of the bring-up: choose the final id, register, answer with
/// the id-change.
async fn process_session_init_start(
    session: &Arc<Session>,
    frame: &Frame,
    message: SessionInitStart,
) -> Result<()> {
    tracing::debug!(
        offered = message.offered_session_id,
        "process session init start"
    );

    // Only the accepting side may be asked to open a session; a concurrent
    // double-init lost the tie-break.
    if session.is_client_side() {
        session.emit_error(
            ErrorCode::Undefined,
            "received session init on the client side",
        );
        return Ok(());
    }

    let handler = session
        .handler
        .upgrade()
        .ok_or(SessionError::ConnectionClosed)?;

    let offered = message.offered_session_id;
    let new_id = if offered == 0 || handler.contains_session(offered) {
        handler.next_unique_session_id()
    } else {
        offered
    };

    session.set_session_id(new_id);
    handler.add_session(new_id, session.clone());

    session
        .send_session_id_change(offered, new_id, frame.message_id())
        .await
}

/// Client half: re-key to the server-chosen id, confirm, go ready.
async fn process_session_id_change(session: &Arc<Session>, message: SessionIdChange) -> Result<()> {
    tracing::debug!(
        old_id = message.old_id,
        new_id = message.new_id,
        "process session id change"
    );

    let handler = session
        .handler
        .upgrade()
        .ok_or(SessionError::ConnectionClosed)?;

    if message.old_id != message.new_id {
        handler.rekey_session(message.old_id, message.new_id);
    }
    session.set_session_id(message.new_id);

    let identifier = session.session_identifier();
    session
        .send_session_id_confirm(message.new_id, identifier)
        .await?;
    session.make_session_ready(message.new_id, identifier)?;
    Ok(())
}

/// Server side goes ready once the client confirmed the id.
async fn process_session_id_confirm(
    session: &Arc<Session>,
    frame: &Frame,
    message: SessionIdConfirm,
) -> Result<()> {
    tracing::debug!(new_id = message.new_id, "process session id confirm");

    session.make_session_ready(message.new_id, message.session_identifier)?;
    session
        .send_session_init_reply(message.new_id, frame.message_id())
        .await
}

async fn process_session_close_start(
    session: &Arc<Session>,
    frame: &Frame,
    message: SessionCloseStart,
) -> Result<()> {
    tracing::debug!(
        session_id = session.session_id(),
        initiator = message.initiator,
        "process session close start"
    );

    if message.initiator {
        session.send_session_close_reply(frame.message_id()).await?;
    }
    session.end_session(false).await
}

// ----------------------------------------------------------------------
// Heartbeat
// ----------------------------------------------------------------------

async fn process_heartbeat_type(session: &Arc<Session>, frame: &Frame) -> Result<()> {
    match frame.sub_type() {
        sub_type::heartbeat::START => session.send_heartbeat_reply(frame.message_id()).await,
        sub_type::heartbeat::REPLY => Ok(()),
        _ => unknown_sub_type(session, frame).await,
    }
}

// ----------------------------------------------------------------------
// Error
// ----------------------------------------------------------------------

/// The peer reported a protocol violation and is tearing its side down;
/// mirror that locally.
async fn process_error_type(session: &Arc<Session>, frame: &Frame) -> Result<()> {
    let message = ErrorMessage::decode(&frame.body)?;
    tracing::debug!(
        session_id = session.session_id(),
        code = %message.code,
        "received error frame"
    );

    session.emit_error(message.code, &message.message);
    session.teardown(false).await;
    Ok(())
}

// ----------------------------------------------------------------------
// Single-block data
// ----------------------------------------------------------------------

async fn process_singleblock_type(session: &Arc<Session>, frame: &Frame) -> Result<()> {
    match frame.sub_type() {
        sub_type::data_single::STATIC => {
            let message = DataSingleStatic::decode(&frame.body)?;
            deliver_stream_data(session, frame, &message.payload).await
        }
        sub_type::data_single::DYNAMIC => {
            let body = frame.body.clone();
            deliver_stream_data(session, frame, &body).await
        }
        sub_type::data_single::REPLY => Ok(()),
        _ => unknown_sub_type(session, frame).await,
    }
}

async fn deliver_stream_data(session: &Arc<Session>, frame: &Frame, payload: &[u8]) -> Result<()> {
    if !session.is_active() {
        tracing::debug!(
            session_id = session.session_id(),
            "dropping stream data outside active state"
        );
        return Ok(());
    }

    session.sink.on_data(session, true, payload);

    if frame.is_reply_expected() {
        session.send_data_single_reply(frame.message_id()).await?;
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Multi-block data
// ----------------------------------------------------------------------

async fn process_multiblock_type(session: &Arc<Session>, frame: &Frame) -> Result<()> {
    match frame.sub_type() {
        sub_type::data_multi::INIT => {
            let message = DataMultiInit::decode(&frame.body)?;
            process_multi_init(session, frame, message).await
        }
        sub_type::data_multi::INIT_REPLY => {
            let message = DataMultiInitReply::decode(&frame.body)?;
            process_multi_init_reply(session, message)
        }
        sub_type::data_multi::STATIC => {
            let message = DataMultiStatic::decode(&frame.body)?;
            if !session
                .multiblock
                .append_incoming(message.multiblock_id, &message.payload)
            {
                // Chunks of an aborted or never-announced transfer.
                tracing::debug!(
                    multiblock_id = message.multiblock_id,
                    part_id = message.part_id,
                    "dropping chunk without reassembly entry"
                );
            }
            Ok(())
        }
        sub_type::data_multi::FINISH => {
            let message = DataMultiId::decode(&frame.body)?;
            process_multi_finish(session, message)
        }
        sub_type::data_multi::ABORT_INIT => {
            let message = DataMultiId::decode(&frame.body)?;
            process_multi_abort_init(session, message).await
        }
        sub_type::data_multi::ABORT_REPLY => {
            let message = DataMultiId::decode(&frame.body)?;
            session.multiblock.remove_outgoing(message.multiblock_id);
            session.emit_error(
                ErrorCode::MultiblockFailed,
                "multi-block transfer aborted by the receiver",
            );
            Ok(())
        }
        _ => unknown_sub_type(session, frame).await,
    }
}

/// Receiver side of an announcement: try to allocate, answer OK or FAIL.
async fn process_multi_init(
    session: &Arc<Session>,
    frame: &Frame,
    message: DataMultiInit,
) -> Result<()> {
    tracing::debug!(
        multiblock_id = message.multiblock_id,
        total_size = message.total_size,
        "process multi init"
    );

    let ok = session.multiblock.create_incoming(
        message.multiblock_id,
        message.total_size,
        session.config.max_multiblock_size,
    );
    let status = if ok { MULTI_INIT_OK } else { MULTI_INIT_FAIL };
    session
        .send_multi_init_reply(message.multiblock_id, status, frame.message_id())
        .await
}

/// Sender side: the peer accepted (wake the worker) or refused (drop).
fn process_multi_init_reply(session: &Arc<Session>, message: DataMultiInitReply) -> Result<()> {
    tracing::debug!(
        multiblock_id = message.multiblock_id,
        status = message.status,
        "process multi init reply"
    );

    if message.is_ok() {
        session.multiblock.make_ready(message.multiblock_id);
    } else {
        session.multiblock.remove_outgoing(message.multiblock_id);
        session.emit_error(
            ErrorCode::MultiblockFailed,
            "peer refused the multi-block transfer",
        );
    }
    Ok(())
}

fn process_multi_finish(session: &Arc<Session>, message: DataMultiId) -> Result<()> {
    tracing::debug!(multiblock_id = message.multiblock_id, "process multi finish");

    let Some(payload) = session.multiblock.take_incoming(message.multiblock_id) else {
        tracing::debug!(
            multiblock_id = message.multiblock_id,
            "finish without reassembly entry"
        );
        return Ok(());
    };

    if !session.is_active() {
        tracing::debug!(
            session_id = session.session_id(),
            "dropping multi-block data outside active state"
        );
        return Ok(());
    }

    session.sink.on_data(session, false, &payload);
    Ok(())
}

/// The sender gave up: discard the reassembly buffer and acknowledge.
async fn process_multi_abort_init(session: &Arc<Session>, message: DataMultiId) -> Result<()> {
    tracing::debug!(multiblock_id = message.multiblock_id, "process multi abort init");

    if session.multiblock.remove_incoming(message.multiblock_id) {
        session.emit_error(ErrorCode::MultiblockFailed, "multi-block transfer aborted");
        session.send_multi_abort_reply(message.multiblock_id).await?;
    }
    Ok(())
}
