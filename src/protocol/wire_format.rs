//! Wire format encoding and decoding.
//!
//! Implements the 24-byte common header that starts every frame:
//! ```text
//! ┌─────────┬──────┬─────────┬───────┬──────┬────────────┬────────────┬──────────────────┐
//! │ version │ type │ subType │ flags │ size │ message id │ session id │ total message id │
//! │ 1 byte  │ 1 B  │ 1 byte  │ 1 B   │ u32  │ u32        │ u32        │ u64              │
//! └─────────┴──────┴─────────┴───────┴──────┴────────────┴────────────┴──────────────────┘
//! ```
//! All multi-byte integers are Little Endian. `size` covers the whole frame
//! including the header and the 4-byte end marker that closes every frame.

/// Protocol version carried in every header.
pub const MESSAGE_VERSION: u8 = 1;

/// Marker closing every frame, used for cheap resync and truncation checks.
pub const MESSAGE_END_MARKER: u32 = 0x0313_5181;

/// Header size in bytes (fixed, exactly 24).
pub const HEADER_SIZE: usize = 24;

/// End marker size in bytes.
pub const END_MARKER_SIZE: usize = 4;

/// Fixed per-frame overhead: header plus end marker.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + END_MARKER_SIZE;

/// Single-block payload ceiling and multi-block chunk payload size.
pub const STATIC_PAYLOAD_SIZE: usize = 1000;

/// Page size used when sizing multi-block buffers.
pub const BUFFER_PAGE_SIZE: usize = 4096;

/// Flag constants for the common header.
pub mod flags {
    /// The sender expects a reply; the timer watches for it.
    pub const REPLY_EXPECTED: u8 = 0x01;
    /// This frame answers an earlier message with the same message id.
    pub const IS_REPLY: u8 = 0x02;
    /// This frame completes a logical payload.
    pub const END_OF_STREAM: u8 = 0x04;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Message family constants for the header `type` field.
pub mod msg_type {
    pub const SESSION: u8 = 0x01;
    pub const HEARTBEAT: u8 = 0x02;
    pub const ERROR: u8 = 0x03;
    pub const SINGLEBLOCK_DATA: u8 = 0x04;
    pub const MULTIBLOCK_DATA: u8 = 0x05;
}

/// Subtype constants, per family.
pub mod sub_type {
    /// Session-control subtypes.
    pub mod session {
        pub const INIT_START: u8 = 0x01;
        pub const ID_CHANGE: u8 = 0x02;
        pub const ID_CONFIRM: u8 = 0x03;
        pub const INIT_REPLY: u8 = 0x04;
        pub const CLOSE_START: u8 = 0x05;
        pub const CLOSE_REPLY: u8 = 0x06;
    }

    /// Heartbeat subtypes.
    pub mod heartbeat {
        pub const START: u8 = 0x01;
        pub const REPLY: u8 = 0x02;
    }

    /// Error subtypes.
    pub mod error {
        pub const FALSE_VERSION: u8 = 0x01;
        pub const UNKNOWN_SESSION: u8 = 0x02;
        pub const INVALID_MESSAGE: u8 = 0x03;
    }

    /// Single-block data subtypes.
    pub mod data_single {
        pub const STATIC: u8 = 0x01;
        pub const DYNAMIC: u8 = 0x02;
        pub const REPLY: u8 = 0x03;
    }

    /// Multi-block data subtypes.
    pub mod data_multi {
        pub const INIT: u8 = 0x01;
        pub const INIT_REPLY: u8 = 0x02;
        pub const STATIC: u8 = 0x03;
        pub const FINISH: u8 = 0x04;
        pub const ABORT_INIT: u8 = 0x05;
        pub const ABORT_REPLY: u8 = 0x06;
    }
}

/// Decoded common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Protocol version (must equal [`MESSAGE_VERSION`]).
    pub version: u8,
    /// Message family (see [`msg_type`]).
    pub msg_type: u8,
    /// Family-specific subtype (see [`sub_type`]).
    pub sub_type: u8,
    /// Flag bits (see [`flags`]).
    pub flags: u8,
    /// Total frame size including header and end marker.
    pub size: u32,
    /// Per-session message counter value.
    pub message_id: u32,
    /// Session the frame belongs to (0 during early bring-up).
    pub session_id: u32,
    /// Correlates replies across multi-block transfers.
    pub total_message_id: u64,
}

impl MessageHeader {
    /// Create a header for a frame with `body_len` body bytes.
    ///
    /// `size` is derived from the body length and the fixed overhead.
    pub fn new(
        msg_type: u8,
        sub_type: u8,
        flags: u8,
        message_id: u32,
        session_id: u32,
        body_len: usize,
    ) -> Self {
        Self {
            version: MESSAGE_VERSION,
            msg_type,
            sub_type,
            flags,
            size: (FRAME_OVERHEAD + body_len) as u32,
            message_id,
            session_id,
            total_message_id: 0,
        }
    }

    /// Set the multi-block correlation id.
    pub fn with_total_message_id(mut self, total_message_id: u64) -> Self {
        self.total_message_id = total_message_id;
        self
    }

    /// Encode header to bytes (Little Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (24 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.version;
        buf[1] = self.msg_type;
        buf[2] = self.sub_type;
        buf[3] = self.flags;
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.message_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.session_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.total_message_id.to_le_bytes());
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            msg_type: buf[1],
            sub_type: buf[2],
            flags: buf[3],
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            message_id: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            session_id: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            total_message_id: u64::from_le_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
        })
    }

    /// Length of the body, derived from `size`.
    #[inline]
    pub fn body_len(&self) -> usize {
        (self.size as usize).saturating_sub(FRAME_OVERHEAD)
    }

    /// Check if the sender expects a reply.
    #[inline]
    pub fn is_reply_expected(&self) -> bool {
        flags::has_flag(self.flags, flags::REPLY_EXPECTED)
    }

    /// Check if this frame is a reply.
    #[inline]
    pub fn is_reply(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_REPLY)
    }

    /// Check if this frame completes a logical payload.
    #[inline]
    pub fn is_end_of_stream(&self) -> bool {
        flags::has_flag(self.flags, flags::END_OF_STREAM)
    }
}
