#![deny(unreachable_patterns)]
//! Frame sequence to video conversion.
//!
//! This crate provides:
//! - Ordering and validation of uploaded frames by filename digits
//! - Staging of frames as normalized, canonically named PNGs
//! - Type-safe FFmpeg command building and a pluggable encoder driver
//! - Progress reporting through an injectable sink
//! - Scratch directories that are removed on every exit path

pub mod command;
pub mod encoder;
pub mod error;
pub mod ordering;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod stager;

pub use command::{ffmpeg_version, resolve_ffmpeg, FfmpegCommand};
pub use encoder::{EncodeJob, EncodeOutcome, EncodeState, Encoder, EncoderDriver, EncoderExit, EncoderProcess, FfmpegEncoder};
pub use error::{ConversionError, ConversionResult};
pub use ordering::{order_frames, FrameSequence, OrderingKey, SequencedFrame};
pub use pipeline::{ConverterConfig, EncodedFile, FrameConverter};
pub use progress::{ProgressSink, SharedProgress, SharedProgressSink};
pub use session::ConversionSession;
pub use stager::{FrameStager, StagedFrames};

#[cfg(any(test, feature = "test-util"))]
pub use encoder::ScriptedEncoder;
#[cfg(any(test, feature = "test-util"))]
pub use progress::RecordingProgress;
