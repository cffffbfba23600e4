//! Video finalization
//!
//! An empty filter chain returns the source path untouched. Otherwise the clip
//! is probed, a [`FrameComposition`] is built around the chain, and an
//! [`ExportSession`] re-renders every frame into the scratch destination on a
//! blocking worker. The worker reports back through a oneshot channel, so the
//! caller's future resolves exactly once on every path.

use crate::config::{ExportConfig, FinalizeConfig};
use crate::error::{MediaError, Result};
use crate::export::{ExportReport, ExportSession, ExportStatus};
use crate::ffmpeg::FfmpegCommand;
use crate::filter::{ChainOutcome, FilterChain};
use crate::frame::{Extent, Frame};
use crate::media::MediaArtifact;
use crate::metrics::{Metrics, Timer, VideoOutcome};
use crate::scratch::{ScratchLease, ScratchNaming, ScratchSpace};
use image::{DynamicImage, RgbaImage};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

// ============================================================================
// Asset
// ============================================================================

/// Frame rate as a rational, the way ffmpeg prints it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Parse `"30000/1001"` or `"25"`; zero rates are rejected
    pub fn parse(s: &str) -> Option<Self> {
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
            None => (s.trim().parse().ok()?, 1),
        };
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Probed video clip
#[derive(Debug, Clone, PartialEq)]
pub struct VideoAsset {
    path: PathBuf,
    extent: Extent,
    frame_rate: FrameRate,
    has_audio: bool,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<serde_json::Value>,
}

impl ProbeStream {
    /// Display rotation in degrees, from the display matrix or the legacy tag
    fn rotation(&self) -> i64 {
        let from_side_data = self
            .side_data_list
            .iter()
            .find_map(|side| side.get("rotation").and_then(|r| r.as_i64()));
        let from_tag = self.tags.get("rotate").and_then(|r| r.parse::<i64>().ok());
        from_side_data.or(from_tag).unwrap_or(0)
    }
}

impl VideoAsset {
    pub fn new(path: impl Into<PathBuf>, extent: Extent, frame_rate: FrameRate, has_audio: bool) -> Self {
        Self {
            path: path.into(),
            extent,
            frame_rate,
            has_audio,
        }
    }

    /// Probe `path` with ffprobe
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MediaError::Probe(format!("No such video: {}", path.display())));
        }

        let output = FfmpegCommand::probe().target(path).execute()?;
        let json = String::from_utf8_lossy(&output.stdout);
        Self::from_probe_json(path, &json)
    }

    /// Build from ffprobe `-show_streams` JSON
    pub fn from_probe_json(path: &Path, json: &str) -> Result<Self> {
        let probe: ProbeOutput =
            serde_json::from_str(json).map_err(|e| MediaError::Probe(format!("Unreadable ffprobe output: {}", e)))?;

        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| MediaError::Probe(format!("No video stream in {}", path.display())))?;

        let (width, height) = match (video.width, video.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(MediaError::Probe("Video stream has no dimensions".to_string())),
        };

        // ffmpeg auto-rotates on decode, so quarter turns swap the frame extent
        let extent = if video.rotation().rem_euclid(180) == 90 {
            Extent::new(height, width)
        } else {
            Extent::new(width, height)
        };

        let frame_rate = video
            .r_frame_rate
            .as_deref()
            .and_then(FrameRate::parse)
            .or_else(|| video.avg_frame_rate.as_deref().and_then(FrameRate::parse))
            .ok_or_else(|| MediaError::Probe("Video stream has no frame rate".to_string()))?;

        let has_audio = probe.streams.iter().any(|s| s.codec_type.as_deref() == Some("audio"));

        Ok(Self {
            path: path.to_path_buf(),
            extent,
            frame_rate,
            has_audio,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Per-frame processing attached to an export
pub struct FrameComposition {
    extent: Extent,
    frame_rate: FrameRate,
    filters: FilterChain,
}

impl FrameComposition {
    pub fn build(asset: &VideoAsset, filters: FilterChain) -> Result<Self> {
        if asset.extent().is_empty() {
            return Err(MediaError::Composition(format!(
                "{} has an empty extent",
                asset.path().display()
            )));
        }

        Ok(Self {
            extent: asset.extent(),
            frame_rate: asset.frame_rate(),
            filters,
        })
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// Filter one frame and clamp the result back to the source extent
    pub fn process(&self, frame: Frame) -> ChainOutcome {
        let outcome = self.filters.apply(frame);
        ChainOutcome {
            frame: outcome.frame.clamp_to_extent(self.extent),
            skipped: outcome.skipped,
        }
    }

    /// [`process`](Self::process) over a raw RGBA buffer; returns pixels and skipped filter count
    pub fn process_rgba(&self, rgba: &[u8]) -> Result<(Vec<u8>, usize)> {
        let pixels = RgbaImage::from_raw(self.extent.width, self.extent.height, rgba.to_vec()).ok_or_else(|| {
            MediaError::Composition(format!("Frame buffer of {} bytes does not fit {}", rgba.len(), self.extent))
        })?;

        let outcome = self.process(Frame::new(DynamicImage::ImageRgba8(pixels)));
        Ok((outcome.frame.into_image().to_rgba8().into_raw(), outcome.skipped.len()))
    }
}

// ============================================================================
// Finalizer
// ============================================================================

/// Run `job` on the blocking pool and wait for its single result
///
/// A job that panics drops its sender and resolves as an export error.
pub async fn run_export_job<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let _ = tx.send(job());
    });

    rx.await
        .unwrap_or_else(|_| Err(MediaError::Export("export worker exited without reporting".to_string())))
}

/// Asynchronous video finalizer
pub struct VideoFinalizer {
    scratch: Arc<ScratchSpace>,
    naming: ScratchNaming,
    export: ExportConfig,
    metrics: Arc<Metrics>,
}

impl VideoFinalizer {
    pub fn new(config: &FinalizeConfig) -> Self {
        Self {
            scratch: Arc::new(config.scratch_space()),
            naming: config.scratch_naming,
            export: config.export.clone(),
            metrics: Metrics::new(),
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchSpace) -> Self {
        self.scratch = Arc::new(scratch);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Finalize a recorded clip; `None` means no artifact could be produced
    pub async fn finalize(&self, video: impl AsRef<Path>, filters: FilterChain) -> Option<MediaArtifact> {
        let timer = Timer::new();
        let source = video.as_ref().to_path_buf();

        if filters.is_empty() {
            debug!("No filters for {}, skipping export", source.display());
            self.metrics.record_video(VideoOutcome::FastPath, timer.elapsed_ms());
            return MediaArtifact::from_video(Some(source));
        }

        // one in-flight export per fixed scratch file, across finalizers
        let _gate = match self.naming {
            ScratchNaming::Fixed => Some(self.scratch.export_gate().lock_owned().await),
            ScratchNaming::PerExport => None,
        };

        let job = ExportJob {
            source: source.clone(),
            filters,
            scratch: Arc::clone(&self.scratch),
            naming: self.naming,
            export: self.export.clone(),
        };

        match run_export_job(move || job.run()).await {
            Ok((destination, report)) => self.settle(&source, destination, report, &timer),
            Err(e) => {
                warn!("Video finalization failed for {}: {}", source.display(), e);
                self.metrics.record_video(VideoOutcome::Failed, timer.elapsed_ms());
                None
            }
        }
    }

    /// Record an export's counters and turn its status into the artifact
    fn settle(
        &self,
        source: &Path,
        destination: PathBuf,
        report: ExportReport,
        timer: &Timer,
    ) -> Option<MediaArtifact> {
        self.metrics.record_frames(report.frames, report.filter_substitutions);

        let reason = match report.status {
            ExportStatus::Completed => {
                info!(
                    "Finalized {} → {} ({} frames)",
                    source.display(),
                    destination.display(),
                    report.frames
                );
                self.metrics.record_video(VideoOutcome::Exported, timer.elapsed_ms());
                return MediaArtifact::from_video(Some(destination));
            }
            ExportStatus::Failed(reason) => reason,
            ExportStatus::Cancelled => "export cancelled".to_string(),
        };

        warn!(
            "Video finalization failed for {} after {} frame(s): {}",
            source.display(),
            report.frames,
            reason
        );
        self.metrics.record_video(VideoOutcome::Failed, timer.elapsed_ms());
        None
    }
}

struct ExportJob {
    source: PathBuf,
    filters: FilterChain,
    scratch: Arc<ScratchSpace>,
    naming: ScratchNaming,
    export: ExportConfig,
}

impl ExportJob {
    fn run(self) -> Result<(PathBuf, ExportReport)> {
        let asset = VideoAsset::load(&self.source)?;
        let composition = FrameComposition::build(&asset, self.filters)?;

        // the lease stays registered until the export is over
        let (destination, _lease): (PathBuf, Option<ScratchLease>) = match self.naming {
            ScratchNaming::Fixed => (
                self.scratch.prepare_destination().ok_or(MediaError::ScratchUnavailable)?,
                None,
            ),
            ScratchNaming::PerExport => {
                let lease = self.scratch.prepare_unique().ok_or(MediaError::ScratchUnavailable)?;
                (lease.path().to_path_buf(), Some(lease))
            }
        };

        let session = ExportSession::new(asset, destination, &self.export, composition);
        let report = session.run();
        Ok((session.destination().to_path_buf(), report))
    }
}
