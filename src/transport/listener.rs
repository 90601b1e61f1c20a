//! Listeners for the three supported transports.

use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio_rustls::TlsAcceptor;

use super::stream::SessionStream;
use super::tls::server_tls_acceptor;
use crate::error::Result;

/// A bound server socket accepting session connections.
pub enum SessionListener {
    Tcp(TcpListener),
    TlsTcp {
        listener: TcpListener,
        acceptor: TlsAcceptor,
    },
    #[cfg(unix)]
    Unix(UnixListenerGuard),
}

/// Unix listener that removes its socket file again on drop.
#[cfg(unix)]
pub struct UnixListenerGuard {
    listener: UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for UnixListenerGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl SessionListener {
    /// Bind a plain TCP listener on all interfaces.
    ///
    /// Port 0 asks the OS for a free port; see [`local_port`](Self::local_port).
    pub async fn bind_tcp(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self::Tcp(listener))
    }

    /// Bind a TLS listener with the given PEM certificate and key files.
    pub async fn bind_tls_tcp(port: u16, cert_file: &Path, key_file: &Path) -> Result<Self> {
        let acceptor = server_tls_acceptor(cert_file, key_file)?;
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self::TlsTcp { listener, acceptor })
    }

    /// Bind a Unix domain socket listener.
    ///
    /// Removes any stale socket file at the path before binding.
    #[cfg(unix)]
    pub async fn bind_unix(path: &Path) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        Ok(Self::Unix(UnixListenerGuard {
            listener,
            path: path.to_path_buf(),
        }))
    }

    /// Accept one connection, completing the TLS handshake where needed.
    pub async fn accept(&self) -> Result<SessionStream> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(SessionStream::from_tcp(stream))
            }
            Self::TlsTcp { listener, acceptor } => {
                let (stream, _addr) = listener.accept().await?;
                let tls = acceptor.accept(stream).await?;
                Ok(SessionStream::from_tls_server(tls))
            }
            #[cfg(unix)]
            Self::Unix(guard) => {
                let (stream, _addr) = guard.listener.accept().await?;
                Ok(SessionStream::from_unix(stream))
            }
        }
    }

    /// The locally bound TCP port, for TCP-family listeners.
    pub fn local_port(&self) -> Option<u16> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok().map(|a| a.port()),
            Self::TlsTcp { listener, .. } => listener.local_addr().ok().map(|a| a.port()),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }
}
