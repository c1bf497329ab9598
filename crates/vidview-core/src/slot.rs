//! Single-slot, latest-wins frame buffer between the decode and presentation threads.
//!
//! The producer never blocks on the consumer: publishing over an unconsumed frame
//! replaces it and counts a drop. Frames older than the newest one ever published
//! are rejected, so the consumer never regresses in source time.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::VideoFrame;

#[derive(Default)]
struct SlotState {
    pending: Option<VideoFrame>,
    newest_sequence: u64,
    published: u64,
    dropped: u64,
}

/// Latest-wins handoff for decoded frames
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    sequence: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number. Shared by every source feeding this
    /// slot, so a new source keeps counting where the previous one stopped.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Publish a frame. Returns `false` when it is not newer than the last one.
    pub fn publish(&self, frame: VideoFrame) -> bool {
        let mut state = self.state.lock();
        if frame.sequence <= state.newest_sequence {
            return false;
        }
        state.newest_sequence = frame.sequence;
        state.published += 1;
        if state.pending.replace(frame).is_some() {
            state.dropped += 1;
        }
        true
    }

    /// Take the pending frame, if any. Never blocks on the producer.
    pub fn take(&self) -> Option<VideoFrame> {
        self.state.lock().pending.take()
    }

    /// Sequence number of the newest frame ever published (0 if none).
    pub fn newest_sequence(&self) -> u64 {
        self.state.lock().newest_sequence
    }

    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    pub fn published(&self) -> u64 {
        self.state.lock().published
    }
}
