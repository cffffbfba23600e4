//! Finalization settings

use crate::error::{MediaError, Result};
use crate::filter::FilterSpec;
use crate::frame::Extent;
use crate::scratch::{ScratchNaming, ScratchSpace};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Export size preset; the output is scaled to fit inside the bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPreset {
    Hd1280x720,
    #[default]
    Hd1920x1080,
    Uhd3840x2160,
    /// Keep the source resolution
    Source,
}

impl ExportPreset {
    pub fn bounds(&self) -> Option<Extent> {
        match self {
            ExportPreset::Hd1280x720 => Some(Extent::new(1280, 720)),
            ExportPreset::Hd1920x1080 => Some(Extent::new(1920, 1080)),
            ExportPreset::Uhd3840x2160 => Some(Extent::new(3840, 2160)),
            ExportPreset::Source => None,
        }
    }
}

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// QuickTime movie
    #[default]
    Mov,
    Mp4,
}

impl ContainerFormat {
    /// ffmpeg muxer name
    pub fn muxer(&self) -> &'static str {
        match self {
            ContainerFormat::Mov => "mov",
            ContainerFormat::Mp4 => "mp4",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub preset: ExportPreset,
    pub container: ContainerFormat,
    pub video_codec: String,
    /// Constant rate factor passed to the encoder (lower is better quality)
    pub crf: u8,
    pub include_audio: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            preset: ExportPreset::Hd1920x1080,
            container: ContainerFormat::Mov,
            video_codec: "libx264".to_string(),
            crf: 20,
            include_audio: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StillConfig {
    /// 1-100, used when a still is written as JPEG
    pub jpeg_quality: u8,
}

impl Default for StillConfig {
    fn default() -> Self {
        Self { jpeg_quality: 92 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    /// Scratch directory; `<documents>/.temp` when unset
    pub scratch_dir: Option<PathBuf>,
    pub scratch_naming: ScratchNaming,
    pub export: ExportConfig,
    pub still: StillConfig,
    /// Default filter chain for callers that do not pass their own
    pub filters: Vec<FilterSpec>,
}

impl FinalizeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| MediaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.still.jpeg_quality) {
            return Err(MediaError::Config(format!(
                "still.jpeg_quality must be 1-100, got {}",
                self.still.jpeg_quality
            )));
        }
        if self.export.crf > 51 {
            return Err(MediaError::Config(format!("export.crf must be 0-51, got {}", self.export.crf)));
        }
        if self.export.video_codec.trim().is_empty() {
            return Err(MediaError::Config("export.video_codec is empty".to_string()));
        }
        Ok(())
    }

    pub fn scratch_space(&self) -> ScratchSpace {
        match &self.scratch_dir {
            Some(dir) => ScratchSpace::new(dir),
            None => ScratchSpace::for_user(),
        }
    }
}
