//! Frame ordering and validation.
//!
//! Uploaded frames are sequenced by the digits in their filenames. Every digit
//! character is concatenated (`shot2_take_014.png` -> `2014`) and compared as a
//! non-negative integer. Files without digits, or without an accepted image
//! extension, are skipped rather than failing the batch.

use std::cmp::Ordering;
use std::fmt;

use framereel_models::frame::ACCEPTED_EXTENSIONS;
use framereel_models::{canonical_frame_name, UploadedFrame};
use tracing::{debug, warn};

use crate::error::{ConversionError, ConversionResult};

/// Integer sequencing key extracted from a filename.
///
/// Stored as a decimal string with leading zeros stripped, so digit runs of any
/// length compare numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderingKey(String);

impl OrderingKey {
    /// Extract the key from the digit characters of `filename`.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let digits: String = filename.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }

        let trimmed = digits.trim_start_matches('0');
        let normalized = if trimmed.is_empty() { "0" } else { trimmed };
        Some(Self(normalized.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Normalized digit strings: longer means larger, equal length compares lexically.
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame with its ordering key and canonical position.
#[derive(Debug, Clone)]
pub struct SequencedFrame {
    /// Dense 0-based position after sorting
    pub index: usize,
    pub key: OrderingKey,
    pub frame: UploadedFrame,
}

impl SequencedFrame {
    /// Staged file name (`frame_000000.png`, ...).
    pub fn canonical_name(&self) -> String {
        canonical_frame_name(self.index)
    }
}

/// Frames sorted by ordering key and re-indexed from zero.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<SequencedFrame>,
    skipped: Vec<String>,
}

impl FrameSequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[SequencedFrame] {
        &self.frames
    }

    /// Filenames that were dropped during filtering.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

/// Whether `filename` ends in an accepted image extension.
pub fn is_accepted_image(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

/// Validate, sort and re-index uploaded frames.
///
/// The frame cap is checked against the raw upload count before any filtering.
pub fn order_frames(files: Vec<UploadedFrame>, max_frames: usize) -> ConversionResult<FrameSequence> {
    if files.len() > max_frames {
        return Err(ConversionError::TooManyFrames {
            count: files.len(),
            max: max_frames,
        });
    }

    let mut keyed = Vec::with_capacity(files.len());
    let mut skipped = Vec::new();

    for file in files {
        if !is_accepted_image(&file.filename) {
            debug!(filename = %file.filename, "Skipping file with unsupported extension");
            skipped.push(file.filename);
            continue;
        }

        match OrderingKey::from_filename(&file.filename) {
            Some(key) => keyed.push((key, file)),
            None => {
                warn!(filename = %file.filename, "Could not extract number from filename");
                skipped.push(file.filename);
            }
        }
    }

    if keyed.is_empty() {
        return Err(ConversionError::NoValidFrames);
    }

    // Stable: equal keys keep upload order.
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));

    let frames = keyed
        .into_iter()
        .enumerate()
        .map(|(index, (key, frame))| SequencedFrame { index, key, frame })
        .collect::<Vec<_>>();

    if !skipped.is_empty() {
        warn!(
            skipped = skipped.len(),
            accepted = frames.len(),
            "Some uploaded files were skipped"
        );
    }
    Ok(FrameSequence { frames, skipped })
}
