//! Session controller - the public entry point.
//!
//! A controller bundles the event sink, the configuration, the session
//! handler and the timer task. Servers and client sessions created through
//! it share that plumbing; nothing in the crate is a process-wide global.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sessmux::{SessionController, SessionEventSink};
//!
//! let controller = SessionController::new(Arc::new(MySink));
//! let server_id = controller.add_tcp_server(1337).await?;
//! let session = controller.start_tcp_session("127.0.0.1", 1337, 0xDEADBEEF).await?;
//! session.send_stream_data(b"hello", true, false).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tokio_rustls::rustls::pki_types::ServerName;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::handler::{timer_loop, ServerEntry, SessionHandler};
use crate::session::Session;
use crate::sink::SessionEventSink;
use crate::transport::{client_tls_connector, SessionListener, SessionStream};

/// Creates servers and sessions and owns the shared machinery behind them.
pub struct SessionController {
    handler: Arc<SessionHandler>,
    sink: Arc<dyn SessionEventSink>,
    config: SessionConfig,
    timer_task: AbortHandle,
}

impl SessionController {
    /// Create a controller with default configuration.
    pub fn new(sink: Arc<dyn SessionEventSink>) -> Self {
        Self::with_config(sink, SessionConfig::default())
    }

    /// Create a controller with explicit configuration.
    pub fn with_config(sink: Arc<dyn SessionEventSink>, config: SessionConfig) -> Self {
        let handler = Arc::new(SessionHandler::new());
        let timer = tokio::spawn(timer_loop(handler.clone(), config.clone()));

        Self {
            handler,
            sink,
            config,
            timer_task: timer.abort_handle(),
        }
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    /// Start a TCP server; returns its server id.
    ///
    /// Port 0 picks a free port; see [`server_port`](Self::server_port).
    pub async fn add_tcp_server(&self, port: u16) -> Result<u32> {
        let listener = SessionListener::bind_tcp(port).await?;
        Ok(self.spawn_server(listener))
    }

    /// Start a TLS server with the given PEM certificate and key files.
    pub async fn add_tls_tcp_server(
        &self,
        port: u16,
        cert_file: impl AsRef<Path>,
        key_file: impl AsRef<Path>,
    ) -> Result<u32> {
        let listener =
            SessionListener::bind_tls_tcp(port, cert_file.as_ref(), key_file.as_ref()).await?;
        Ok(self.spawn_server(listener))
    }

    /// Start a Unix domain socket server.
    #[cfg(unix)]
    pub async fn add_unix_server(&self, path: impl AsRef<Path>) -> Result<u32> {
        let listener = SessionListener::bind_unix(path.as_ref()).await?;
        Ok(self.spawn_server(listener))
    }

    fn spawn_server(&self, listener: SessionListener) -> u32 {
        let local_port = listener.local_port();
        let task = tokio::spawn(accept_loop(
            listener,
            self.handler.clone(),
            self.sink.clone(),
            self.config.clone(),
        ));
        self.handler.add_server(ServerEntry {
            accept_task: task.abort_handle(),
            local_port,
        })
    }

    /// Stop a server. Established sessions stay open.
    pub fn close_server(&self, id: u32) -> bool {
        match self.handler.remove_server(id) {
            Some(entry) => {
                entry.accept_task.abort();
                true
            }
            None => false,
        }
    }

    /// The locally bound port of a TCP-family server.
    pub fn server_port(&self, id: u32) -> Option<u16> {
        self.handler.server_port(id)
    }

    // ------------------------------------------------------------------
    // Client sessions
    // ------------------------------------------------------------------

    /// Open a session over TCP.
    ///
    /// Returns once the connection is up and the init frame is out;
    /// readiness arrives on the session callback.
    pub async fn start_tcp_session(
        &self,
        host: &str,
        port: u16,
        identifier: u64,
    ) -> Result<Arc<Session>> {
        let stream = TcpStream::connect((host, port)).await?;
        self.start_session(SessionStream::from_tcp(stream), identifier)
            .await
    }

    /// Open a session over TLS, trusting the certificate(s) in `cert_file`.
    pub async fn start_tls_tcp_session(
        &self,
        host: &str,
        port: u16,
        cert_file: impl AsRef<Path>,
        identifier: u64,
    ) -> Result<Arc<Session>> {
        let connector = client_tls_connector(cert_file.as_ref())?;
        let stream = TcpStream::connect((host, port)).await?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| SessionError::Tls(format!("invalid server name {}: {}", host, e)))?;
        let tls = connector.connect(server_name, stream).await?;
        self.start_session(SessionStream::from_tls_client(tls), identifier)
            .await
    }

    /// Open a session over a Unix domain socket.
    #[cfg(unix)]
    pub async fn start_unix_session(
        &self,
        path: impl AsRef<Path>,
        identifier: u64,
    ) -> Result<Arc<Session>> {
        let stream = tokio::net::UnixStream::connect(path.as_ref()).await?;
        self.start_session(SessionStream::from_unix(stream), identifier)
            .await
    }

    async fn start_session(&self, stream: SessionStream, identifier: u64) -> Result<Arc<Session>> {
        let session = Session::new(
            stream,
            true,
            Arc::downgrade(&self.handler),
            self.sink.clone(),
            self.config.clone(),
        );

        let offered_id = self.handler.random_offered_id();
        self.handler.add_session(offered_id, session.clone());
        if let Err(e) = session.connect_session(offered_id, identifier, true).await {
            self.handler.remove_session(offered_id);
            return Err(e);
        }

        Ok(session)
    }

    // ------------------------------------------------------------------
    // Lookup and shutdown
    // ------------------------------------------------------------------

    /// Look up a session by id.
    pub fn get_session(&self, id: u32) -> Option<Arc<Session>> {
        self.handler.get_session(id)
    }

    /// Close a session by id.
    pub async fn close_session(&self, id: u32) -> Result<()> {
        let session = self
            .get_session(id)
            .ok_or_else(|| SessionError::Protocol(format!("no session with id {}", id)))?;
        session.close_session(false).await
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.handler.session_count()
    }

    /// Close every session and server.
    pub async fn close_all(&self) {
        self.handler.clear_all_sessions().await;
        self.handler.clear_all_servers();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.timer_task.abort();
        self.handler.clear_all_servers();
    }
}

/// Accept loop of one server: every connection becomes a server-side
/// session waiting for the client's init frame.
async fn accept_loop(
    listener: SessionListener,
    handler: Arc<SessionHandler>,
    sink: Arc<dyn SessionEventSink>,
    config: SessionConfig,
) {
    loop {
        match listener.accept().await {
            Ok(stream) => {
                let session = Session::new(
                    stream,
                    false,
                    Arc::downgrade(&handler),
                    sink.clone(),
                    config.clone(),
                );
                if let Err(e) = session.connect_session(0, 0, false).await {
                    tracing::error!("failed to start accepted session: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("accept error: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}
