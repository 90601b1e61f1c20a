//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and body.
//! Uses `bytes::Bytes` for zero-copy body sharing.

use bytes::Bytes;

use super::wire_format::MessageHeader;

/// A complete protocol frame as extracted by the frame buffer.
///
/// The end marker has already been validated and stripped; `body` holds
/// only the family-specific message record.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded common header.
    pub header: MessageHeader,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from header and body.
    pub fn new(header: MessageHeader, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Get the message family.
    #[inline]
    pub fn msg_type(&self) -> u8 {
        self.header.msg_type
    }

    /// Get the family-specific subtype.
    #[inline]
    pub fn sub_type(&self) -> u8 {
        self.header.sub_type
    }

    /// Get the per-session message id.
    #[inline]
    pub fn message_id(&self) -> u32 {
        self.header.message_id
    }

    /// Get the session id carried by the frame.
    #[inline]
    pub fn session_id(&self) -> u32 {
        self.header.session_id
    }

    /// Check if the sender expects a reply.
    #[inline]
    pub fn is_reply_expected(&self) -> bool {
        self.header.is_reply_expected()
    }

    /// Check if this frame is a reply.
    #[inline]
    pub fn is_reply(&self) -> bool {
        self.header.is_reply()
    }
}
