//! Output targets and encoder presets.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default output frame rate.
pub const DEFAULT_FRAME_RATE: u32 = 30;
/// Highest frame rate a request may ask for.
pub const MAX_FRAME_RATE: u32 = 120;
/// Constant Rate Factor used for H.264 output.
pub const MP4_CRF: u8 = 18;
/// Keyframe interval (and minimum interval) for H.264 output.
pub const MP4_KEYFRAME_INTERVAL: u32 = 48;
/// ProRes profile index (3 = 422 HQ).
pub const PRORES_PROFILE: u8 = 3;
/// ProRes vendor tag.
pub const PRORES_VENDOR: &str = "apl0";

/// Color tag applied to primaries, transfer and matrix.
const BT709: &str = "bt709";

/// Error returned when a requested container is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported output format '{0}' (expected mp4 or mov)")]
pub struct UnsupportedTarget(pub String);

/// Requested output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EncodeTarget {
    /// H.264 in an MP4 container.
    #[default]
    Mp4,
    /// ProRes in a QuickTime container.
    Mov,
}

impl EncodeTarget {
    /// File extension for this container.
    pub fn extension(&self) -> &'static str {
        match self {
            EncodeTarget::Mp4 => "mp4",
            EncodeTarget::Mov => "mov",
        }
    }

    /// MIME type used when serving the encoded file.
    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodeTarget::Mp4 => "video/mp4",
            EncodeTarget::Mov => "video/quicktime",
        }
    }

    /// Attachment name of the encoded file.
    pub fn output_file_name(&self) -> String {
        format!("output.{}", self.extension())
    }

    /// The fixed preset for this container.
    pub fn preset(&self) -> EncodePreset {
        match self {
            EncodeTarget::Mp4 => EncodePreset::h264(),
            EncodeTarget::Mov => EncodePreset::prores(),
        }
    }
}

impl fmt::Display for EncodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for EncodeTarget {
    type Err = UnsupportedTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(EncodeTarget::Mp4),
            "mov" => Ok(EncodeTarget::Mov),
            _ => Err(UnsupportedTarget(s.to_string())),
        }
    }
}

/// Codec-specific quality settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityMode {
    /// x264 rate control with a fixed speed preset.
    Crf {
        crf: u8,
        preset: String,
        profile: String,
        level: String,
    },
    /// ProRes fixed quantizer.
    FixedQuality {
        qscale: u8,
        profile: u8,
        vendor: String,
    },
}

/// Fixed bundle of codec, pixel format, quality and color tagging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncodePreset {
    /// Video codec (e.g., "libx264", "prores_ks")
    pub codec: String,
    /// Output pixel format
    pub pixel_format: String,
    /// Rate control / quality settings
    pub quality: QualityMode,
    /// Container flags (`-movflags`)
    #[serde(default)]
    pub movflags: Option<String>,
    /// Color primaries, transfer and matrix tag
    pub color_tag: String,
    /// Codec private parameters (`-x264-params`)
    #[serde(default)]
    pub codec_params: Option<String>,
}

impl EncodePreset {
    /// H.264 high profile, 4:2:0 8-bit, constant frame rate with fixed GOP.
    pub fn h264() -> Self {
        Self {
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            quality: QualityMode::Crf {
                crf: MP4_CRF,
                preset: "slow".to_string(),
                profile: "high".to_string(),
                level: "4.0".to_string(),
            },
            movflags: Some("+faststart".to_string()),
            color_tag: BT709.to_string(),
            codec_params: Some(format!(
                "colorprim={c}:transfer={c}:colormatrix={c}:force-cfr=1:keyint={k}:min-keyint={k}:no-scenecut=1",
                c = BT709,
                k = MP4_KEYFRAME_INTERVAL,
            )),
        }
    }

    /// ProRes 422 HQ, 4:2:2 10-bit, near-lossless quantizer.
    pub fn prores() -> Self {
        Self {
            codec: "prores_ks".to_string(),
            pixel_format: "yuv422p10le".to_string(),
            quality: QualityMode::FixedQuality {
                qscale: 1,
                profile: PRORES_PROFILE,
                vendor: PRORES_VENDOR.to_string(),
            },
            movflags: None,
            color_tag: BT709.to_string(),
            codec_params: None,
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];

        match &self.quality {
            QualityMode::Crf {
                crf,
                preset,
                profile,
                level,
            } => {
                args.extend([
                    "-pix_fmt".to_string(),
                    self.pixel_format.clone(),
                    "-preset".to_string(),
                    preset.clone(),
                    "-crf".to_string(),
                    crf.to_string(),
                    "-profile:v".to_string(),
                    profile.clone(),
                    "-level".to_string(),
                    level.clone(),
                ]);
            }
            QualityMode::FixedQuality {
                qscale,
                profile,
                vendor,
            } => {
                args.extend([
                    "-profile:v".to_string(),
                    profile.to_string(),
                    "-vendor".to_string(),
                    vendor.clone(),
                    "-pix_fmt".to_string(),
                    self.pixel_format.clone(),
                    "-q:v".to_string(),
                    qscale.to_string(),
                ]);
            }
        }

        if let Some(flags) = &self.movflags {
            args.extend(["-movflags".to_string(), flags.clone()]);
        }

        args.extend([
            "-color_primaries".to_string(),
            self.color_tag.clone(),
            "-color_trc".to_string(),
            self.color_tag.clone(),
            "-colorspace".to_string(),
            self.color_tag.clone(),
        ]);

        if let Some(params) = &self.codec_params {
            args.extend(["-x264-params".to_string(), params.clone()]);
        }

        // Video only; uploaded frames never carry audio.
        args.push("-an".to_string());

        args
    }
}
