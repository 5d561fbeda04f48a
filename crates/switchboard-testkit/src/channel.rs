//! Recording channel
//!
//! Stands in for one direction of a transport. Frames are kept in order
//! until the test takes them; a closed channel refuses further sends the
//! way a dropped port would.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use switchboard_core::{Channel, ChannelError};

/// In-memory channel that records every frame sent over it
#[derive(Debug)]
pub struct RecordingChannel<F> {
    frames: Mutex<Vec<F>>,
    closed: AtomicBool,
}

impl<F> RecordingChannel<F> {
    /// Create an open channel
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Drain the recorded frames
    pub fn take(&self) -> Vec<F> {
        std::mem::take(&mut *self.frames.lock())
    }

    /// Number of frames not yet taken
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether no frames are waiting
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Refuse every later send
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl<F: Clone> RecordingChannel<F> {
    /// Copy of the recorded frames, leaving them in place
    pub fn frames(&self) -> Vec<F> {
        self.frames.lock().clone()
    }
}

impl<F: Send> Channel<F> for RecordingChannel<F> {
    fn send(&self, frame: F) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}
