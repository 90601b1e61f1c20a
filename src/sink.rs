//! Event sink - the application-facing callback surface.

use std::sync::Arc;

use crate::error::ErrorCode;
use crate::session::Session;

/// Receives session lifecycle, data and error events.
///
/// One sink instance is shared by every session of a controller; any state
/// the application needs per event is reachable through the session handle
/// (its id and identifier). Callbacks run inline on the session's read task
/// or the timer task, so implementations should return quickly and hand
/// heavy work to their own tasks.
pub trait SessionEventSink: Send + Sync {
    /// A session became ready (`opened=true`, state reached ACTIVE) or was
    /// closed (`opened=false`). `identifier` is the opaque value supplied by
    /// the client at session start.
    fn on_session(&self, opened: bool, session: &Arc<Session>, identifier: u64);

    /// A complete payload arrived: a single-block frame (`is_stream=true`)
    /// or a reassembled multi-block transfer (`is_stream=false`).
    fn on_data(&self, session: &Arc<Session>, is_stream: bool, data: &[u8]);

    /// A failure was detected locally or reported by the peer.
    fn on_error(&self, session: &Arc<Session>, code: ErrorCode, message: &str);
}
