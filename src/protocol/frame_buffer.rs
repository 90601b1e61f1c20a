//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Parsing peeks at
//! the buffered bytes without consuming anything until a whole frame is
//! present:
//! 1. header present? (need 24 bytes)
//! 2. version supported?
//! 3. `size` within `[FRAME_OVERHEAD, max_frame_size]`?
//! 4. whole frame buffered?
//! 5. end marker at `size - 4`?
//!
//! Steps 1 and 4 signal need-more-data (no advance); 2, 3 and 5 are protocol
//! violations that carry the wire error code for the dispatcher's reply.

use bytes::{Bytes, BytesMut};

use super::frame::Frame;
use super::wire_format::{
    MessageHeader, FRAME_OVERHEAD, HEADER_SIZE, MESSAGE_END_MARKER, MESSAGE_VERSION,
};
use crate::config::DEFAULT_MAX_FRAME_SIZE;
use crate::error::{ErrorCode, Result, SessionError};

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Frames larger than this are rejected.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom frame-size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the complete frames found so far; partial data stays buffered
    /// for the next push. A protocol violation poisons the connection: the
    /// caller must answer with the matching error frame and tear down.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Peek the header without consuming; nothing advances until the
        // whole frame checks out.
        let header = MessageHeader::decode(&self.buffer[..HEADER_SIZE])
            .expect("buffer has enough bytes for a header");

        if header.version != MESSAGE_VERSION {
            return Err(SessionError::ProtocolViolation {
                code: ErrorCode::FalseVersion,
                message: format!("unsupported protocol version {}", header.version),
            });
        }

        let size = header.size as usize;
        if size < FRAME_OVERHEAD || header.size > self.max_frame_size {
            return Err(SessionError::ProtocolViolation {
                code: ErrorCode::InvalidMessageSize,
                message: format!(
                    "frame size {} outside [{}, {}]",
                    size, FRAME_OVERHEAD, self.max_frame_size
                ),
            });
        }

        if self.buffer.len() < size {
            return Ok(None);
        }

        let marker = u32::from_le_bytes([
            self.buffer[size - 4],
            self.buffer[size - 3],
            self.buffer[size - 2],
            self.buffer[size - 1],
        ]);
        if marker != MESSAGE_END_MARKER {
            return Err(SessionError::ProtocolViolation {
                code: ErrorCode::InvalidMessageSize,
                message: format!("end marker mismatch: 0x{:08X}", marker),
            });
        }

        let mut frame_bytes = self.buffer.split_to(size);
        let _ = frame_bytes.split_to(HEADER_SIZE);
        frame_bytes.truncate(size - FRAME_OVERHEAD);
        let body: Bytes = frame_bytes.freeze();

        Ok(Some(Frame::new(header, body)))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::build_frame;
    use crate::protocol::wire_format::{flags, msg_type, sub_type};

    /// Helper to build a valid heartbeat-family frame with the given body.
    fn make_frame_bytes(message_id: u32, body: &[u8]) -> Bytes {
        let header = MessageHeader::new(
            msg_type::HEARTBEAT,
            sub_type::heartbeat::START,
            flags::REPLY_EXPECTED,
            message_id,
            9,
            body.len(),
        );
        build_frame(&header, body)
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(42, b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_id(), 42);
        assert_eq!(frames[0].session_id(), 9);
        assert_eq!(&frames[0].body[..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut combined = Vec::new();
        for id in 1..=3u32 {
            combined.extend_from_slice(&make_frame_bytes(id, b"x"));
        }

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].message_id(), 1);
        assert_eq!(frames[1].message_id(), 2);
        assert_eq!(frames[2].message_id(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header_needs_more_data() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, b"test");

        let frames = buffer.push(&bytes[..10]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.len(), 10);

        let frames = buffer.push(&bytes[10..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_body_needs_more_data() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, b"a longer body that gets split");

        let frames = buffer.push(&bytes[..HEADER_SIZE + 5]).unwrap();
        assert!(frames.is_empty());

        let frames = buffer.push(&bytes[HEADER_SIZE + 5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].body[..], b"a longer body that gets split");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, b"hi");

        let mut all_frames = Vec::new();
        for byte in bytes.iter() {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(&all_frames[0].body[..], b"hi");
    }

    #[test]
    fn test_empty_body_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(1, b"")).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].body.is_empty());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = make_frame_bytes(1, b"data").to_vec();
        bytes[0] = 2; // forged version

        let err = buffer.push(&bytes).unwrap_err();
        match err {
            SessionError::ProtocolViolation { code, .. } => {
                assert_eq!(code, ErrorCode::FalseVersion);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undersized_frame_rejected() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = make_frame_bytes(1, b"").to_vec();
        // Claim a size below header + marker.
        bytes[4..8].copy_from_slice(&(FRAME_OVERHEAD as u32 - 1).to_le_bytes());

        let err = buffer.push(&bytes).unwrap_err();
        match err {
            SessionError::ProtocolViolation { code, .. } => {
                assert_eq!(code, ErrorCode::InvalidMessageSize);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buffer = FrameBuffer::with_max_frame_size(128);
        let header = MessageHeader::new(msg_type::HEARTBEAT, 1, 0, 1, 1, 200);
        let err = buffer.push(&header.encode()).unwrap_err();
        match err {
            SessionError::ProtocolViolation { code, .. } => {
                assert_eq!(code, ErrorCode::InvalidMessageSize);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_end_marker_mismatch_rejected() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = make_frame_bytes(1, b"data").to_vec();
        let len = bytes.len();
        bytes[len - 1] ^= 0xFF;

        let err = buffer.push(&bytes).unwrap_err();
        match err {
            SessionError::ProtocolViolation { code, .. } => {
                assert_eq!(code, ErrorCode::InvalidMessageSize);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();
        let first = make_frame_bytes(1, b"first");
        let second = make_frame_bytes(2, b"second");

        let mut data = first.to_vec();
        data.extend_from_slice(&second[..8]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_id(), 1);

        let frames = buffer.push(&second[8..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_id(), 2);
    }

    #[test]
    fn test_no_advance_before_complete_frame() {
        // A partial frame must leave the buffer untouched so a later push
        // can complete it.
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, &vec![0x55u8; 500]);

        buffer.push(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(buffer.len(), HEADER_SIZE);

        buffer.push(&bytes[HEADER_SIZE..HEADER_SIZE + 100]).unwrap();
        assert_eq!(buffer.len(), HEADER_SIZE + 100);

        let frames = buffer.push(&bytes[HEADER_SIZE + 100..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body.len(), 500);
    }
}
