//! Type-erased connected stream.
//!
//! A session owns exactly one connected socket for its lifetime; the read
//! half feeds the frame buffer and the write half is handed to the writer
//! task. Type erasure keeps the session code independent of which of the
//! three transports produced the connection.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::{client, server};

/// Read half of a connected transport stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a connected transport stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected byte stream, ready to be split for a session.
pub struct SessionStream {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl SessionStream {
    /// Wrap a plain TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wrap a client-side TLS stream.
    pub fn from_tls_client(stream: client::TlsStream<TcpStream>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wrap a server-side TLS stream.
    pub fn from_tls_server(stream: server::TlsStream<TcpStream>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wrap a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wrap an arbitrary duplex stream (in-memory pipes in tests).
    pub fn from_duplex<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split into read and write halves.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_duplex_split_roundtrip() {
        let (a, b) = tokio::io::duplex(256);
        let (mut reader, _writer_a) = SessionStream::from_duplex(a).into_split();
        let (_reader_b, mut writer) = SessionStream::from_duplex(b).into_split();

        writer.write_all(b"ping").await.unwrap();
        writer.flush().await.unwrap();

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
