//! Error types for conversion operations.

use thiserror::Error;

/// Result type for conversion operations.
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Errors that can end a conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("No valid PNG files found")]
    NoValidFrames,

    #[error("Maximum {max} files allowed, received {count}")]
    TooManyFrames { count: usize, max: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to stage frame '{filename}': {reason}")]
    FrameStage { filename: String, reason: String },

    #[error("FFmpeg not found in PATH or fallback location")]
    EncoderUnavailable,

    #[error("FFmpeg encoding failed{}", exit_suffix(.exit_code))]
    EncodingFailed {
        diagnostics: String,
        exit_code: Option<i32>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
    exit_code
        .map(|code| format!(" with exit code {}", code))
        .unwrap_or_default()
}

impl ConversionError {
    /// Create a frame staging error.
    pub fn frame_stage(filename: impl Into<String>, reason: impl ToString) -> Self {
        Self::FrameStage {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an encoding failure error.
    pub fn encoding_failed(diagnostics: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::EncodingFailed {
            diagnostics: diagnostics.into(),
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::NoValidFrames => "no_valid_frames",
            ConversionError::TooManyFrames { .. } => "too_many_frames",
            ConversionError::UnsupportedFormat(_) => "unsupported_format",
            ConversionError::FrameStage { .. } => "frame_stage_error",
            ConversionError::EncoderUnavailable => "encoder_unavailable",
            ConversionError::EncodingFailed { .. } => "encoding_failed",
            ConversionError::Io(_) => "io_error",
            ConversionError::Internal(_) => "internal_error",
        }
    }

    /// Whether the error was caused by the uploaded input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConversionError::NoValidFrames
                | ConversionError::TooManyFrames { .. }
                | ConversionError::UnsupportedFormat(_)
                | ConversionError::FrameStage { .. }
        )
    }

    /// Captured encoder output, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ConversionError::EncodingFailed { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

impl From<framereel_models::UnsupportedTarget> for ConversionError {
    fn from(err: framereel_models::UnsupportedTarget) -> Self {
        Self::UnsupportedFormat(err.0)
    }
}
