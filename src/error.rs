//! Error types for sessmux.

use thiserror::Error;

/// Error codes shared between the wire protocol and the error callback.
///
/// The numeric values are part of the wire format: `ERROR`-family frames
/// carry them in their body, and the error callback reports the same codes
/// for locally detected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Catch-all for failures without a more specific code.
    Undefined = 0,
    /// Peer announced an unsupported protocol version.
    FalseVersion = 1,
    /// Frame referenced a session id this endpoint does not know.
    UnknownSession = 2,
    /// Frame size below the minimum or end marker mismatch.
    InvalidMessageSize = 3,
    /// A reply-expected message saw no reply within the timeout window.
    MessageTimeout = 4,
    /// A multi-block transfer was refused, aborted or could not allocate.
    MultiblockFailed = 5,
}

impl ErrorCode {
    /// Decode a wire byte into an error code, falling back to `Undefined`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ErrorCode::FalseVersion,
            2 => ErrorCode::UnknownSession,
            3 => ErrorCode::InvalidMessageSize,
            4 => ErrorCode::MessageTimeout,
            5 => ErrorCode::MultiblockFailed,
            _ => ErrorCode::Undefined,
        }
    }

    /// Wire representation of this code.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::Undefined => "undefined error",
            ErrorCode::FalseVersion => "false version",
            ErrorCode::UnknownSession => "unknown session",
            ErrorCode::InvalidMessageSize => "invalid message size",
            ErrorCode::MessageTimeout => "message timeout",
            ErrorCode::MultiblockFailed => "multiblock failed",
        };
        write!(f, "{}", name)
    }
}

/// Main error type for all sessmux operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed message body or other protocol-shape problem.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A framing-level violation that maps onto a wire error code.
    ///
    /// The dispatcher answers these with the matching `ERROR`-family frame
    /// before tearing the session down.
    #[error("Protocol violation ({code}): {message}")]
    ProtocolViolation { code: ErrorCode, message: String },

    /// The session state machine rejected the operation.
    #[error("Invalid session state for {0}")]
    InvalidState(&'static str),

    /// Payload exceeds the single-block ceiling.
    #[error("Payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// Zero-length payloads are not accepted by the data APIs.
    #[error("Empty payload")]
    EmptyPayload,

    /// The session's socket or writer is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// TLS configuration could not be built.
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Result type alias using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;
