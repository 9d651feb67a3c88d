//! Shared latest-frame slot.
//!
//! `SharedSlot` is the hand-off point between the capture loop and however
//! many consumers the host runs: a single-slot mailbox holding the most
//! recently published encoded frame. Publishing replaces the previous frame
//! atomically under the mutex and wakes every waiter.
//!
//! Readers either copy the frame out (`latest`, `wait_newer`) or borrow it
//! strictly within the locked critical section (`with_latest`); they must not
//! block inside `with_latest`. The slot is closed by the producer on exit,
//! which unblocks all waiters instead of leaving them stuck on a stopped
//! producer.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// One published frame: an owned encoded byte buffer plus its sequence number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Publish sequence number, starting at 1.
    pub seq: u64,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<EncodedFrame>,
    seq: u64,
    closed: bool,
}

/// Single-writer, many-reader mailbox for the latest encoded frame.
#[derive(Debug, Default)]
pub struct SharedSlot {
    state: Mutex<SlotState>,
    fresh: Condvar,
}

impl SharedSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A writer panicking mid-publish leaves the state consistent (the
        // frame is replaced in one assignment), so poisoning is ignored.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a new frame, replacing (and thereby freeing) the previous one.
    /// Wakes all waiters. Returns the frame's sequence number.
    pub fn publish(&self, data: Vec<u8>) -> u64 {
        let mut state = self.lock();
        state.seq += 1;
        state.frame = Some(EncodedFrame {
            seq: state.seq,
            data,
        });
        self.fresh.notify_all();
        state.seq
    }

    /// Copy out the most recent frame, if any has been published.
    pub fn latest(&self) -> Option<EncodedFrame> {
        self.lock().frame.clone()
    }

    /// Borrow the most recent frame within the locked critical section.
    ///
    /// `f` runs with the slot mutex held and must not block.
    pub fn with_latest<R>(&self, f: impl FnOnce(&EncodedFrame) -> R) -> Option<R> {
        let state = self.lock();
        state.frame.as_ref().map(f)
    }

    /// Block until a frame newer than `last_seq` is published, then copy it
    /// out. Returns `None` once the slot is closed and no newer frame exists.
    pub fn wait_newer(&self, last_seq: u64) -> Option<EncodedFrame> {
        let mut state = self.lock();
        loop {
            if state.seq > last_seq {
                return state.frame.clone();
            }
            if state.closed {
                return None;
            }
            state = self
                .fresh
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sequence number of the most recent publish (0 before the first).
    pub fn seq(&self) -> u64 {
        self.lock().seq
    }

    /// Mark the slot closed and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.fresh.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
