//! capture_finalize - captured-media finalization for camera capture
//!
//! Turns a raw photo capture or a recorded clip plus a filter chain into a
//! final [`MediaArtifact`]. Stills are decoded, filtered and re-encoded
//! in-process with the `image` crate while keeping their EXIF metadata and
//! orientation; videos are re-rendered frame by frame and transcoded by the
//! system `ffmpeg` binary (LGPL-safe, no linking).

pub mod config;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod filter;
pub mod finalizer;
pub mod frame;
pub mod media;
pub mod metadata;
pub mod metrics;
pub mod photo;
pub mod scratch;
pub mod video;

#[cfg(test)]
mod test_utils;

pub use config::{ContainerFormat, ExportConfig, ExportPreset, FinalizeConfig, StillConfig};
pub use error::{MediaError, Result};
pub use export::{ExportReport, ExportSession, ExportStatus};
pub use ffmpeg::{ffmpeg_available, FfmpegCommand, FfmpegError};
pub use filter::{apply_filters, ChainOutcome, Filter, FilterChain, FilterError, FilterSpec};
pub use finalizer::CaptureFinalizer;
pub use frame::{ColorSpace, Extent, Frame, Orientation};
pub use media::{MediaArtifact, StillImage};
pub use metadata::CaptureMetadata;
pub use metrics::{Metrics, MetricsSnapshot};
pub use photo::{finalize_photo, try_finalize_photo, RawPhotoData};
pub use scratch::{ScratchLease, ScratchNaming, ScratchSpace};
pub use video::{FrameComposition, FrameRate, VideoAsset, VideoFinalizer};
