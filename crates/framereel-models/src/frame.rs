//! Uploaded frame types.

/// Maximum number of frames a single conversion accepts.
pub const MAX_FRAMES: usize = 1000;

/// Image extensions accepted as frame input (compared case-insensitively).
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png"];

/// Numbered-sequence pattern the encoder reads staged frames from.
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// Canonical staged file name for a 0-based frame index.
pub fn canonical_frame_name(index: usize) -> String {
    format!("frame_{:06}.png", index)
}

/// A single uploaded image, owned by the request until it is staged.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFrame {
    /// Filename as sent by the client
    pub filename: String,
    /// Encoded image bytes
    pub data: Vec<u8>,
}

impl UploadedFrame {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

impl std::fmt::Debug for UploadedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFrame")
            .field("filename", &self.filename)
            .field("bytes", &self.data.len())
            .finish()
    }
}
