//! Pending-reply deadlines and heartbeat cadence.
//!
//! Every reply-expected frame registers an entry here before it goes out.
//! The timer task decrements the countdowns once per tick; an entry that
//! reaches zero fires MESSAGE_TIMEOUT on its session exactly once. Inbound
//! replies clear their entry through the dispatcher before that happens.
//!
//! The same task drives heartbeats: at the configured cadence every session
//! in ready state gets a Heartbeat_Start, whose reply clears its entry like
//! any other.

use std::sync::{Arc, Mutex, Weak};

use crate::config::SessionConfig;
use crate::error::ErrorCode;
use crate::handler::SessionHandler;
use crate::session::Session;

/// One awaited reply.
#[derive(Debug)]
struct PendingReply {
    msg_type: u8,
    session_id: u32,
    message_id: u32,
    ticks_remaining: u32,
    session: Weak<Session>,
}

/// An expired entry, handed to the timer task for the error callback.
pub(crate) struct ExpiredReply {
    pub msg_type: u8,
    pub message_id: u32,
    pub session: Weak<Session>,
}

/// The ordered pending-reply table.
pub struct ReplyHandler {
    entries: Mutex<Vec<PendingReply>>,
}

impl ReplyHandler {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register an awaited reply.
    pub(crate) fn add_message(
        &self,
        msg_type: u8,
        session_id: u32,
        message_id: u32,
        ticks: u32,
        session: Weak<Session>,
    ) {
        self.entries.lock().unwrap().push(PendingReply {
            msg_type,
            session_id,
            message_id,
            ticks_remaining: ticks.max(1),
            session,
        });
    }

    /// Clear the entry matched by an inbound reply. Returns true if one was
    /// pending.
    pub(crate) fn remove_message(&self, session_id: u32, message_id: u32) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !(e.session_id == session_id && e.message_id == message_id));
        entries.len() != before
    }

    /// Drop all entries of a closing session so no timeout fires after it.
    pub(crate) fn remove_session_entries(&self, session_id: u32) {
        self.entries
            .lock()
            .unwrap()
            .retain(|e| e.session_id != session_id);
    }

    /// Decrement every countdown; remove and return the expired entries.
    pub(crate) fn advance_tick(&self) -> Vec<ExpiredReply> {
        let mut entries = self.entries.lock().unwrap();
        let mut expired = Vec::new();

        entries.retain_mut(|entry| {
            entry.ticks_remaining -= 1;
            if entry.ticks_remaining == 0 {
                expired.push(ExpiredReply {
                    msg_type: entry.msg_type,
                    message_id: entry.message_id,
                    session: entry.session.clone(),
                });
                false
            } else {
                true
            }
        });

        expired
    }

    /// Number of awaited replies.
    pub fn pending_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Process-wide timer task: one tick per `config.timer_tick`.
pub(crate) async fn timer_loop(handler: Arc<SessionHandler>, config: SessionConfig) {
    let mut interval = tokio::time::interval(config.timer_tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let heartbeat_ticks = config.heartbeat_ticks();
    let mut tick_count: u32 = 0;

    loop {
        interval.tick().await;
        tick_count = tick_count.wrapping_add(1);

        for expired in handler.reply_handler().advance_tick() {
            if let Some(session) = expired.session.upgrade() {
                tracing::debug!(
                    session_id = session.session_id(),
                    message_id = expired.message_id,
                    msg_type = expired.msg_type,
                    "reply timeout"
                );
                session.emit_error(
                    ErrorCode::MessageTimeout,
                    "no reply received within the timeout window",
                );
            }
        }

        if tick_count % heartbeat_ticks == 0 {
            for session in handler.sessions_snapshot() {
                if session.is_session_ready() {
                    let _ = session.send_heartbeat().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expires_after_countdown() {
        let handler = ReplyHandler::new();
        handler.add_message(1, 10, 100, 3, Weak::new());

        assert!(handler.advance_tick().is_empty());
        assert!(handler.advance_tick().is_empty());

        let expired = handler.advance_tick();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].message_id, 100);
        assert_eq!(handler.pending_count(), 0);
    }

    #[test]
    fn test_reply_clears_entry_before_expiry() {
        let handler = ReplyHandler::new();
        handler.add_message(1, 10, 100, 3, Weak::new());

        assert!(handler.remove_message(10, 100));
        assert!(!handler.remove_message(10, 100));
        assert!(handler.advance_tick().is_empty());
        assert!(handler.advance_tick().is_empty());
        assert!(handler.advance_tick().is_empty());
    }

    #[test]
    fn test_remove_matches_session_and_message() {
        let handler = ReplyHandler::new();
        handler.add_message(1, 10, 100, 5, Weak::new());
        handler.add_message(1, 11, 100, 5, Weak::new());

        assert!(handler.remove_message(10, 100));
        assert_eq!(handler.pending_count(), 1);
    }

    #[test]
    fn test_each_entry_expires_exactly_once() {
        let handler = ReplyHandler::new();
        handler.add_message(1, 10, 100, 1, Weak::new());

        assert_eq!(handler.advance_tick().len(), 1);
        assert!(handler.advance_tick().is_empty());
        assert!(handler.advance_tick().is_empty());
    }

    #[test]
    fn test_session_entries_dropped_on_close() {
        let handler = ReplyHandler::new();
        handler.add_message(1, 10, 100, 5, Weak::new());
        handler.add_message(2, 10, 101, 5, Weak::new());
        handler.add_message(1, 11, 102, 5, Weak::new());

        handler.remove_session_entries(10);
        assert_eq!(handler.pending_count(), 1);
    }

    #[test]
    fn test_zero_tick_entries_get_at_least_one_tick() {
        let handler = ReplyHandler::new();
        handler.add_message(1, 10, 100, 0, Weak::new());
        assert_eq!(handler.advance_tick().len(), 1);
    }
}
