//! Transport module - stream sockets and listeners.
//!
//! Provides a uniform surface over the three supported transports:
//! - TCP
//! - TLS 1.3 over TCP (rustls)
//! - Unix Domain Sockets
//!
//! Sessions only ever see the type-erased [`SessionStream`] halves; the
//! choice of transport is made once, at connect or accept time.

mod listener;
mod stream;
mod tls;

pub use listener::SessionListener;
pub use stream::{BoxedReader, BoxedWriter, SessionStream};
pub use tls::{client_tls_connector, server_tls_acceptor};
