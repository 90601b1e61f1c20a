//! # sessmux
//!
//! Session-layer message multiplexing over stream transports.
//!
//! sessmux lets two peers establish logical sessions over TCP, TLS or Unix
//! domain sockets and exchange framed binary messages: single-block stream
//! frames for small payloads, chunked multi-block transfers for anything
//! above the single-frame ceiling. Silent peers are detected by periodic
//! heartbeats and per-message reply timeouts.
//!
//! ## Architecture
//!
//! - **Wire protocol**: every frame is a 24-byte common header, a typed
//!   body and a 4-byte end marker, parsed off the byte stream by a frame
//!   buffer that never surfaces partial frames.
//! - **Session state machine**: a hierarchical machine
//!   (`NOT_CONNECTED` / `CONNECTED{SESSION_NOT_READY, SESSION_READY{ACTIVE}}`)
//!   guards every operation; user data only flows in ACTIVE.
//! - **Multi-block engine**: large payloads are announced, acknowledged,
//!   chunked by a per-session worker task and reassembled on the far side.
//! - **Handler & timer**: sessions and servers live in registries owned by
//!   the controller; a timer task tracks reply deadlines and heartbeats.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sessmux::{ErrorCode, Session, SessionController, SessionEventSink};
//!
//! struct EchoSink;
//!
//! impl SessionEventSink for EchoSink {
//!     fn on_session(&self, opened: bool, session: &Arc<Session>, identifier: u64) {
//!         println!("session {} open={} id=0x{:X}", session.session_id(), opened, identifier);
//!     }
//!     fn on_data(&self, _session: &Arc<Session>, is_stream: bool, data: &[u8]) {
//!         println!("got {} bytes (stream={})", data.len(), is_stream);
//!     }
//!     fn on_error(&self, _session: &Arc<Session>, code: ErrorCode, message: &str) {
//!         eprintln!("error {}: {}", code, message);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> sessmux::Result<()> {
//!     let controller = SessionController::new(Arc::new(EchoSink));
//!     controller.add_tcp_server(1337).await?;
//!
//!     let session = controller.start_tcp_session("127.0.0.1", 1337, 0xDEADBEEF).await?;
//!     session.send_stream_data(b"hello world", true, false).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod statemachine;
pub mod transport;

mod controller;
mod dispatch;
mod handler;
mod multiblock;
mod session;
mod sink;
mod writer;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::{ErrorCode, Result, SessionError};
pub use handler::SessionHandler;
pub use session::Session;
pub use sink::SessionEventSink;
