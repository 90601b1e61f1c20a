//! Handler module - process-wide registries and the timer.
//!
//! Provides:
//! - [`SessionHandler`] - sessions and servers by id, id allocation
//! - [`ReplyHandler`] - pending-reply deadlines and heartbeat cadence

mod reply_handler;
mod session_handler;

pub use reply_handler::ReplyHandler;
pub(crate) use reply_handler::timer_loop;
pub use session_handler::SessionHandler;
pub(crate) use session_handler::ServerEntry;
