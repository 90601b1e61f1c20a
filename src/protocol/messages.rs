//! Typed message records for every frame family.
//!
//! Each record encodes and decodes only its body; the common header and the
//! end marker are added by [`build_frame`] (or, on the hot path, by the
//! writer task's vectored write). All integers are Little Endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::wire_format::{
    MessageHeader, END_MARKER_SIZE, FRAME_OVERHEAD, HEADER_SIZE, MESSAGE_END_MARKER,
    STATIC_PAYLOAD_SIZE,
};
use crate::error::{ErrorCode, Result, SessionError};

/// Status byte of a multi-block init reply.
pub const MULTI_INIT_OK: u8 = 0;
/// Rejection status of a multi-block init reply.
pub const MULTI_INIT_FAIL: u8 = 1;

fn short_body(what: &'static str, need: usize, have: usize) -> SessionError {
    SessionError::Protocol(format!(
        "{} body too short: need {} bytes, have {}",
        what, need, have
    ))
}

/// Assemble a complete wire frame from header and body.
///
/// Intended for tests and scripted peers; the writer task assembles frames
/// from parts instead to avoid the copy.
pub fn build_frame(header: &MessageHeader, body: &[u8]) -> Bytes {
    debug_assert_eq!(header.size as usize, FRAME_OVERHEAD + body.len());
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len() + END_MARKER_SIZE);
    buf.put_slice(&header.encode());
    buf.put_slice(body);
    buf.put_u32_le(MESSAGE_END_MARKER);
    buf.freeze()
}

/// Opens the three-way session bring-up (client to server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInitStart {
    /// Random non-zero id offered by the client.
    pub offered_session_id: u32,
    /// Opaque client token echoed back at session-ready.
    pub session_identifier: u64,
}

impl SessionInitStart {
    pub const BODY_LEN: usize = 16;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u32_le(self.offered_session_id);
        buf.put_u32_le(0); // padding keeps the identifier 8-byte aligned
        buf.put_u64_le(self.session_identifier);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body("Session_Init_Start", Self::BODY_LEN, body.len()));
        }
        let offered_session_id = body.get_u32_le();
        let _pad = body.get_u32_le();
        let session_identifier = body.get_u64_le();
        Ok(Self {
            offered_session_id,
            session_identifier,
        })
    }
}

/// Server's answer to init-start: the id the session will live under.
///
/// `new_id == old_id` when the offered id had no collision on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdChange {
    pub old_id: u32,
    pub new_id: u32,
}

impl SessionIdChange {
    pub const BODY_LEN: usize = 8;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u32_le(self.old_id);
        buf.put_u32_le(self.new_id);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body("Session_IdChange", Self::BODY_LEN, body.len()));
        }
        Ok(Self {
            old_id: body.get_u32_le(),
            new_id: body.get_u32_le(),
        })
    }
}

/// Client's confirmation that it re-keyed to the server-chosen id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdConfirm {
    pub new_id: u32,
    pub session_identifier: u64,
}

impl SessionIdConfirm {
    pub const BODY_LEN: usize = 16;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u32_le(self.new_id);
        buf.put_u32_le(0);
        buf.put_u64_le(self.session_identifier);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body("Session_IdConfirm", Self::BODY_LEN, body.len()));
        }
        let new_id = body.get_u32_le();
        let _pad = body.get_u32_le();
        let session_identifier = body.get_u64_le();
        Ok(Self {
            new_id,
            session_identifier,
        })
    }
}

/// Final server frame of the bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInitReply {
    pub new_id: u32,
}

impl SessionInitReply {
    pub const BODY_LEN: usize = 4;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u32_le(self.new_id);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body("Session_InitReply", Self::BODY_LEN, body.len()));
        }
        Ok(Self {
            new_id: body.get_u32_le(),
        })
    }
}

/// Starts a graceful teardown.
///
/// `initiator=false` marks the courtesy notification sent from within an
/// already-running teardown; it must not be replied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCloseStart {
    pub initiator: bool,
}

impl SessionCloseStart {
    pub const BODY_LEN: usize = 1;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u8(self.initiator as u8);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Err(short_body("Session_Close_Start", Self::BODY_LEN, 0));
        }
        Ok(Self {
            initiator: body.get_u8() != 0,
        })
    }
}

/// Error frame body: wire error code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorMessage {
    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.message.len());
        buf.put_u8(self.code.as_u8());
        buf.put_slice(self.message.as_bytes());
        buf.freeze()
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Err(short_body("Error", 1, 0));
        }
        let code = ErrorCode::from_u8(body[0]);
        let message = String::from_utf8_lossy(&body[1..]).into_owned();
        Ok(Self { code, message })
    }
}

/// Fixed-size single-block data frame: 1000-byte payload field, zero padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSingleStatic {
    pub payload: Bytes,
}

impl DataSingleStatic {
    pub const BODY_LEN: usize = 4 + STATIC_PAYLOAD_SIZE;

    pub fn encode_body(&self) -> Bytes {
        debug_assert!(self.payload.len() <= STATIC_PAYLOAD_SIZE);
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.resize(Self::BODY_LEN, 0);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body("Data_Single_Static", Self::BODY_LEN, body.len()));
        }
        let payload_size = body.get_u32_le() as usize;
        if payload_size > STATIC_PAYLOAD_SIZE {
            return Err(SessionError::Protocol(format!(
                "static payload size {} exceeds {}",
                payload_size, STATIC_PAYLOAD_SIZE
            )));
        }
        Ok(Self {
            payload: Bytes::copy_from_slice(&body[..payload_size]),
        })
    }
}

/// Announces a multi-block transfer of `total_size` payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataMultiInit {
    pub multiblock_id: u64,
    pub total_size: u64,
}

impl DataMultiInit {
    pub const BODY_LEN: usize = 16;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u64_le(self.multiblock_id);
        buf.put_u64_le(self.total_size);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body("Data_Multi_Init", Self::BODY_LEN, body.len()));
        }
        Ok(Self {
            multiblock_id: body.get_u64_le(),
            total_size: body.get_u64_le(),
        })
    }
}

/// Receiver's verdict on a multi-block init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataMultiInitReply {
    pub multiblock_id: u64,
    pub status: u8,
}

impl DataMultiInitReply {
    pub const BODY_LEN: usize = 9;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u64_le(self.multiblock_id);
        buf.put_u8(self.status);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body(
                "Data_Multi_InitReply",
                Self::BODY_LEN,
                body.len(),
            ));
        }
        Ok(Self {
            multiblock_id: body.get_u64_le(),
            status: body.get_u8(),
        })
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == MULTI_INIT_OK
    }
}

/// One chunk of a multi-block transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMultiStatic {
    pub multiblock_id: u64,
    pub total_part_number: u32,
    pub part_id: u32,
    pub payload: Bytes,
}

impl DataMultiStatic {
    pub const FIXED_LEN: usize = 16;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::FIXED_LEN + self.payload.len());
        buf.put_u64_le(self.multiblock_id);
        buf.put_u32_le(self.total_part_number);
        buf.put_u32_le(self.part_id);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < Self::FIXED_LEN {
            return Err(short_body("Data_Multi_Static", Self::FIXED_LEN, body.len()));
        }
        let mut fixed = &body[..Self::FIXED_LEN];
        Ok(Self {
            multiblock_id: fixed.get_u64_le(),
            total_part_number: fixed.get_u32_le(),
            part_id: fixed.get_u32_le(),
            payload: Bytes::copy_from_slice(&body[Self::FIXED_LEN..]),
        })
    }
}

/// Body shared by finish, abort-init and abort-reply: just the transfer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataMultiId {
    pub multiblock_id: u64,
}

impl DataMultiId {
    pub const BODY_LEN: usize = 8;

    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::BODY_LEN);
        buf.put_u64_le(self.multiblock_id);
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self> {
        if body.len() < Self::BODY_LEN {
            return Err(short_body("Data_Multi id", Self::BODY_LEN, body.len()));
        }
        Ok(Self {
            multiblock_id: body.get_u64_le(),
        })
    }
}
