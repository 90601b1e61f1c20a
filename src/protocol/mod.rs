//! Protocol module - wire format, framing, and typed message records.
//!
//! This module implements the binary session protocol:
//! - 24-byte common header plus 4-byte end marker encoding/decoding
//! - Frame buffer for accumulating partial reads off the socket
//! - Typed message records for every family and subtype

mod frame;
mod frame_buffer;
pub mod messages;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, msg_type, sub_type, MessageHeader, BUFFER_PAGE_SIZE, END_MARKER_SIZE, FRAME_OVERHEAD,
    HEADER_SIZE, MESSAGE_END_MARKER, MESSAGE_VERSION, STATIC_PAYLOAD_SIZE,
};
