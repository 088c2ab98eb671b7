//! Shared data models for the framereel conversion service.
//!
//! This crate provides:
//! - Output targets and their fixed encoder presets
//! - Uploaded frame types and sequence naming
//! - Progress snapshots and phase arithmetic

pub mod encoding;
pub mod frame;
pub mod progress;

// Re-export common types
pub use encoding::{EncodePreset, EncodeTarget, QualityMode, UnsupportedTarget};
pub use frame::{canonical_frame_name, UploadedFrame, FRAME_PATTERN, MAX_FRAMES};
pub use progress::ProgressSnapshot;
