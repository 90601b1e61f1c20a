//! Multi-block transfer engine.
//!
//! Payloads above the single-block ceiling travel as a `Multi_Init`
//! announcement, a run of 1000-byte `Multi_Static` chunks and a
//! `Multi_Finish`. This module owns both directions of that machinery for
//! one session:
//!
//! - the outgoing backlog: a deque of pending transfers, each waiting for
//!   the peer's init-reply before the worker task chunks it onto the wire,
//! - the incoming table: reassembly buffers keyed by multiblock id.
//!
//! Both sides are guarded by short mutex sections; the worker never holds a
//! lock while sending. An actively transmitting transfer is tracked
//! separately from the backlog so an abort can reach it between chunks.

use std::collections::{HashMap, VecDeque};

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::protocol::{BUFFER_PAGE_SIZE, STATIC_PAYLOAD_SIZE};

/// Round `size` up to whole buffer pages.
fn page_aligned(size: usize) -> usize {
    size.div_ceil(BUFFER_PAGE_SIZE).max(1) * BUFFER_PAGE_SIZE
}

/// Wire value of the total-part-number field for a transfer of `size` bytes.
///
/// Kept as `size/1000 + 1` for compatibility; the number of chunks actually
/// emitted is `ceil(size/1000)`, and receivers use the field only for
/// completeness checks.
pub fn total_part_number(size: u64) -> u32 {
    (size / STATIC_PAYLOAD_SIZE as u64 + 1) as u32
}

/// An outgoing transfer waiting in or moving through the backlog.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub multiblock_id: u64,
    pub payload: Bytes,
}

#[derive(Debug)]
struct BacklogEntry {
    message: OutgoingMessage,
    is_ready: bool,
}

#[derive(Debug, Default)]
struct OutgoingQueue {
    backlog: VecDeque<BacklogEntry>,
    /// Id of the transfer the worker is currently chunking, if any.
    active: Option<u64>,
}

#[derive(Debug)]
struct IncomingMessage {
    buffer: Vec<u8>,
    total_size: u64,
}

/// Per-session multi-block state: outgoing backlog plus incoming table.
pub struct MultiblockIo {
    outgoing: Mutex<OutgoingQueue>,
    incoming: Mutex<HashMap<u64, IncomingMessage>>,
    /// Wakes the worker when a backlog entry becomes ready.
    work_available: Notify,
}

impl MultiblockIo {
    pub fn new() -> Self {
        Self {
            outgoing: Mutex::new(OutgoingQueue::default()),
            incoming: Mutex::new(HashMap::new()),
            work_available: Notify::new(),
        }
    }

    /// Pick a random non-zero id not colliding with any live outgoing entry.
    fn generate_id(queue: &OutgoingQueue) -> u64 {
        loop {
            let id: u64 = rand::random();
            if id == 0 {
                continue;
            }
            let collides = queue.active == Some(id)
                || queue.backlog.iter().any(|e| e.message.multiblock_id == id);
            if !collides {
                return id;
            }
        }
    }

    /// Copy `data` into a page-aligned buffer and enqueue it, not yet ready.
    ///
    /// Returns the new transfer's id; the caller announces it to the peer
    /// with `Data_Multi_Init`.
    pub fn create_outgoing(&self, data: &[u8]) -> u64 {
        let mut buffer = BytesMut::with_capacity(page_aligned(data.len()));
        buffer.put_slice(data);

        let mut queue = self.outgoing.lock().unwrap();
        let multiblock_id = Self::generate_id(&queue);
        queue.backlog.push_back(BacklogEntry {
            message: OutgoingMessage {
                multiblock_id,
                payload: buffer.freeze(),
            },
            is_ready: false,
        });
        multiblock_id
    }

    /// Mark a backlog entry ready after the peer's init-reply and wake the
    /// worker.
    pub fn make_ready(&self, multiblock_id: u64) -> bool {
        let mut queue = self.outgoing.lock().unwrap();
        let found = queue
            .backlog
            .iter_mut()
            .find(|e| e.message.multiblock_id == multiblock_id)
            .map(|e| e.is_ready = true)
            .is_some();
        drop(queue);

        if found {
            self.work_available.notify_one();
        }
        found
    }

    /// Remove an outgoing transfer, queued or actively transmitting.
    ///
    /// Returns true if something was removed. Removing the active id is what
    /// makes the worker emit the abort between chunks.
    pub fn remove_outgoing(&self, multiblock_id: u64) -> bool {
        let mut queue = self.outgoing.lock().unwrap();
        if queue.active == Some(multiblock_id) {
            queue.active = None;
            return true;
        }
        let before = queue.backlog.len();
        queue
            .backlog
            .retain(|e| e.message.multiblock_id != multiblock_id);
        queue.backlog.len() != before
    }

    /// Drop every outgoing transfer (session close).
    pub fn clear_outgoing(&self) {
        let mut queue = self.outgoing.lock().unwrap();
        queue.backlog.clear();
        queue.active = None;
    }

    /// Dequeue the head if it is ready, marking it active.
    pub fn pop_ready(&self) -> Option<OutgoingMessage> {
        let mut queue = self.outgoing.lock().unwrap();
        if queue.backlog.front().is_some_and(|e| e.is_ready) {
            let entry = queue.backlog.pop_front().unwrap();
            queue.active = Some(entry.message.multiblock_id);
            Some(entry.message)
        } else {
            None
        }
    }

    /// Check whether the given transfer is still the active one.
    pub fn is_still_active(&self, multiblock_id: u64) -> bool {
        self.outgoing.lock().unwrap().active == Some(multiblock_id)
    }

    /// Clear the active slot after a completed transmission.
    pub fn finish_active(&self, multiblock_id: u64) {
        let mut queue = self.outgoing.lock().unwrap();
        if queue.active == Some(multiblock_id) {
            queue.active = None;
        }
    }

    /// Wait until [`make_ready`](Self::make_ready) signals new work.
    pub async fn wait_for_work(&self) {
        self.work_available.notified().await;
    }

    /// Allocate a reassembly buffer for an announced transfer.
    ///
    /// Fails (FAIL init-reply) on duplicate ids, oversized announcements or
    /// allocation failure.
    pub fn create_incoming(&self, multiblock_id: u64, total_size: u64, max_size: u64) -> bool {
        if total_size == 0 || total_size > max_size {
            return false;
        }

        let mut incoming = self.incoming.lock().unwrap();
        if incoming.contains_key(&multiblock_id) {
            return false;
        }

        let mut buffer = Vec::new();
        if buffer.try_reserve_exact(page_aligned(total_size as usize)).is_err() {
            return false;
        }

        incoming.insert(
            multiblock_id,
            IncomingMessage {
                buffer,
                total_size,
            },
        );
        true
    }

    /// Append one chunk to a reassembly buffer, in arrival order.
    pub fn append_incoming(&self, multiblock_id: u64, data: &[u8]) -> bool {
        let mut incoming = self.incoming.lock().unwrap();
        match incoming.get_mut(&multiblock_id) {
            Some(entry) => {
                if entry.buffer.len() + data.len() > entry.total_size as usize {
                    return false;
                }
                entry.buffer.extend_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Remove and return a completed reassembly buffer.
    pub fn take_incoming(&self, multiblock_id: u64) -> Option<Vec<u8>> {
        self.incoming
            .lock()
            .unwrap()
            .remove(&multiblock_id)
            .map(|entry| entry.buffer)
    }

    /// Drop an incoming transfer (abort). Returns true if it existed.
    pub fn remove_incoming(&self, multiblock_id: u64) -> bool {
        self.incoming.lock().unwrap().remove(&multiblock_id).is_some()
    }

    /// Check whether any reassembly is in progress.
    pub fn incoming_is_empty(&self) -> bool {
        self.incoming.lock().unwrap().is_empty()
    }
}

impl Default for MultiblockIo {
    fn default() -> Self {
        Self::new()
    }
}
