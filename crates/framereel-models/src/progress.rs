//! Conversion progress as exposed to pollers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upper bound of the frame staging phase.
pub const STAGING_PROGRESS_MAX: f64 = 60.0;
/// Progress reported when the encoder is launched.
pub const ENCODE_PROGRESS_START: f64 = 70.0;
/// Upper bound of the encode phase.
pub const ENCODE_PROGRESS_MAX: f64 = 95.0;
/// Progress reported while scratch files are removed after a successful encode.
pub const CLEANUP_PROGRESS: f64 = 98.0;
/// Progress of a finished conversion.
pub const COMPLETE_PROGRESS: f64 = 100.0;

/// Point-in-time copy of the progress slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProgressSnapshot {
    /// Percentage in [0, 100]
    pub percent: f64,
    /// Human-readable description of the current step
    pub message: String,
}

impl ProgressSnapshot {
    pub fn new(percent: f64, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }
}

/// Progress after staging `staged` of `total` frames.
pub fn staging_progress(staged: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    staged as f64 / total as f64 * STAGING_PROGRESS_MAX
}

/// Progress once the encoder has reported `frame` of `total` frames.
pub fn encode_progress(frame: u64, total: usize) -> f64 {
    if total == 0 {
        return ENCODE_PROGRESS_START;
    }
    let span = ENCODE_PROGRESS_MAX - ENCODE_PROGRESS_START;
    (ENCODE_PROGRESS_START + frame as f64 / total as f64 * span).min(ENCODE_PROGRESS_MAX)
}
