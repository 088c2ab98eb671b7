//! Conversion progress reporting.
//!
//! The pipeline writes progress through a [`ProgressSink`] and the HTTP layer
//! reads it back. [`SharedProgress`] is a single mutex-guarded slot shared by
//! every conversion in the process: concurrent conversions overwrite each
//! other and the last write wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use framereel_models::ProgressSnapshot;
use tracing::debug;

/// Destination for progress updates.
pub trait ProgressSink: Send + Sync {
    /// Record a new percentage and message.
    fn set(&self, percent: f64, message: &str);

    /// Current percentage.
    fn get(&self) -> f64 {
        self.snapshot().percent
    }

    /// Current percentage and message.
    fn snapshot(&self) -> ProgressSnapshot;
}

/// Shared handle to a progress sink.
pub type SharedProgressSink = Arc<dyn ProgressSink>;

/// Process-wide single-slot progress state.
#[derive(Debug, Default)]
pub struct SharedProgress {
    state: Mutex<ProgressSnapshot>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        // A panicking writer cannot leave a half-written scalar behind.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for SharedProgress {
    fn set(&self, percent: f64, message: &str) {
        {
            let mut state = self.lock();
            state.percent = percent;
            state.message.clear();
            state.message.push_str(message);
        }
        debug!("Progress: {:.1}% - {}", percent, message);
    }

    fn get(&self) -> f64 {
        self.lock().percent
    }

    fn snapshot(&self) -> ProgressSnapshot {
        self.lock().clone()
    }
}

/// Sink that keeps every update, for asserting on progress sequences.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct RecordingProgress {
    history: Mutex<Vec<ProgressSnapshot>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update in the order it was written.
    pub fn history(&self) -> Vec<ProgressSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Percentages in the order they were written.
    pub fn percents(&self) -> Vec<f64> {
        self.history().into_iter().map(|s| s.percent).collect()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl ProgressSink for RecordingProgress {
    fn set(&self, percent: f64, message: &str) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProgressSnapshot::new(percent, message));
    }

    fn snapshot(&self) -> ProgressSnapshot {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or_default()
    }
}
