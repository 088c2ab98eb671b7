//! Frame staging.
//!
//! Decodes each uploaded frame, normalizes it to 8-bit RGB and writes it as a
//! canonically named PNG so the encoder sees a uniform numbered sequence.

use std::path::{Path, PathBuf};
use std::time::Instant;

use framereel_models::progress::staging_progress;
use image::{ColorType, DynamicImage, ImageFormat};
use metrics::histogram;
use tracing::{debug, info};

use crate::error::{ConversionError, ConversionResult};
use crate::ordering::{FrameSequence, SequencedFrame};
use crate::progress::SharedProgressSink;

/// Summary of a staged frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFrames {
    /// Directory holding `frame_%06d.png`
    pub dir: PathBuf,
    /// Number of frames written
    pub count: usize,
    /// Width of the first frame
    pub width: u32,
    /// Height of the first frame
    pub height: u32,
}

/// Writes ordered frames into a session directory.
pub struct FrameStager {
    progress: SharedProgressSink,
}

impl FrameStager {
    pub fn new(progress: SharedProgressSink) -> Self {
        Self { progress }
    }

    /// Stage every frame into `dest`, failing on the first frame that cannot be
    /// decoded or written.
    ///
    /// Decoding runs on the blocking thread pool.
    pub async fn stage(&self, sequence: FrameSequence, dest: &Path) -> ConversionResult<StagedFrames> {
        let progress = self.progress.clone();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || stage_blocking(sequence, &dest, progress))
            .await
            .map_err(|e| ConversionError::internal(format!("frame staging task failed: {}", e)))?
    }
}

fn stage_blocking(
    sequence: FrameSequence,
    dest: &Path,
    progress: SharedProgressSink,
) -> ConversionResult<StagedFrames> {
    let start = Instant::now();
    let total = sequence.len();
    let mut dimensions = None;

    for frame in sequence.frames() {
        let index = frame.index;
        let (width, height) = stage_frame(frame, dest)?;
        dimensions.get_or_insert((width, height));

        progress.set(
            staging_progress(index + 1, total),
            &format!("Processing frame {}/{}", index + 1, total),
        );
    }

    let (width, height) = dimensions.ok_or(ConversionError::NoValidFrames)?;
    histogram!("framereel_stage_duration_seconds").record(start.elapsed().as_secs_f64());
    info!(
        frames = total,
        width,
        height,
        duration_ms = start.elapsed().as_millis() as u64,
        "Staged frames"
    );

    Ok(StagedFrames {
        dir: dest.to_path_buf(),
        count: total,
        width,
        height,
    })
}

/// Decode, normalize and save one frame. Returns its dimensions.
fn stage_frame(frame: &SequencedFrame, dest: &Path) -> ConversionResult<(u32, u32)> {
    let filename = &frame.frame.filename;

    let image = image::load_from_memory_with_format(&frame.frame.data, ImageFormat::Png)
        .map_err(|e| ConversionError::frame_stage(filename, e))?;
    let image = normalize_color(image);

    let path = dest.join(frame.canonical_name());
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| ConversionError::frame_stage(filename, e))?;

    debug!("Saved file {}: {} -> {}", frame.index + 1, filename, path.display());
    Ok((image.width(), image.height()))
}

/// Convert anything that is not 8-bit RGB to 8-bit RGB.
fn normalize_color(image: DynamicImage) -> DynamicImage {
    if image.color() == ColorType::Rgb8 {
        image
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}
