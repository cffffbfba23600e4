//! Video export session
//!
//! Streams the source through two ffmpeg processes: a decoder writing raw
//! RGBA frames to a pipe, and an encoder reading the filtered frames back and
//! muxing them (plus the source audio) into the destination container. Frames
//! are filtered in between by the [`FrameComposition`].

use crate::config::{ContainerFormat, ExportConfig, ExportPreset};
use crate::error::{MediaError, Result};
use crate::ffmpeg::FfmpegCommand;
use crate::video::{FrameComposition, VideoAsset};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Bytes of ffmpeg stderr kept for error reports
const STDERR_TAIL: usize = 16 * 1024;

/// How an export ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Completed,
    Failed(String),
    /// The encoder was terminated by a signal
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub status: ExportStatus,
    pub frames: u64,
    pub filter_substitutions: u64,
}

impl ExportReport {
    fn failed(reason: impl Into<String>, frames: u64, filter_substitutions: u64) -> Self {
        Self {
            status: ExportStatus::Failed(reason.into()),
            frames,
            filter_substitutions,
        }
    }
}

pub struct ExportSession {
    asset: VideoAsset,
    destination: PathBuf,
    preset: ExportPreset,
    container: ContainerFormat,
    video_codec: String,
    crf: u8,
    include_audio: bool,
    composition: FrameComposition,
}

impl ExportSession {
    pub fn new(asset: VideoAsset, destination: PathBuf, config: &ExportConfig, composition: FrameComposition) -> Self {
        Self {
            asset,
            destination,
            preset: config.preset,
            container: config.container,
            video_codec: config.video_codec.clone(),
            crf: config.crf,
            include_audio: config.include_audio,
            composition,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Source → raw RGBA frames on stdout, at the composition's extent and rate
    pub fn decoder_command(&self) -> FfmpegCommand {
        let extent = self.composition.extent().to_string();
        let rate = self.composition.frame_rate().to_string();

        FfmpegCommand::new()
            .input(self.asset.path())
            .args(&["-map", "0:v:0", "-an", "-s", &extent, "-r", &rate, "-f", "rawvideo", "-pix_fmt", "rgba"])
            .output("pipe:1")
    }

    /// Raw RGBA frames on stdin (+ source audio) → destination container
    pub fn encoder_command(&self) -> FfmpegCommand {
        let extent = self.composition.extent().to_string();
        let rate = self.composition.frame_rate().to_string();
        let crf = self.crf.to_string();

        let mut cmd = FfmpegCommand::new()
            .args(&["-y", "-f", "rawvideo", "-pix_fmt", "rgba", "-s", &extent, "-r", &rate])
            .input("pipe:0");

        let with_audio = self.include_audio && self.asset.has_audio();
        if with_audio {
            cmd = cmd
                .input(self.asset.path())
                .args(&["-map", "0:v:0", "-map", "1:a:0?", "-c:a", "aac"]);
        } else {
            cmd = cmd.args(&["-an"]);
        }

        cmd.args(&[
            "-vf",
            &self.scale_filter(),
            "-c:v",
            &self.video_codec,
            "-crf",
            &crf,
            "-pix_fmt",
            "yuv420p",
            "-f",
            self.container.muxer(),
        ])
        .output(&self.destination)
    }

    /// Fit inside the preset box (never upscaling) with even dimensions
    fn scale_filter(&self) -> String {
        let extent = self.composition.extent();
        match self.preset.bounds() {
            Some(bounds) => {
                // portrait sources use the box rotated
                let (w, h) = if extent.height > extent.width {
                    (bounds.height, bounds.width)
                } else {
                    (bounds.width, bounds.height)
                };
                format!(
                    "scale=w='min({},iw)':h='min({},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
                    w, h
                )
            }
            None => "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
        }
    }

    /// Run the export to completion on the current thread
    pub fn run(&self) -> ExportReport {
        info!(
            "Exporting {} → {} ({:?}, {})",
            self.asset.path().display(),
            self.destination.display(),
            self.preset,
            self.container.muxer()
        );

        let report = match self.pump() {
            Ok(report) => report,
            Err(e) => ExportReport::failed(e.to_string(), 0, 0),
        };

        if report.status != ExportStatus::Completed {
            // best-effort: don't leave a half-written file behind
            let _ = std::fs::remove_file(&self.destination);
        }
        report
    }

    fn pump(&self) -> Result<ExportReport> {
        let mut decoder = self.decoder_command().spawn(Stdio::null(), Stdio::piped())?;
        let mut encoder = match self.encoder_command().spawn(Stdio::piped(), Stdio::null()) {
            Ok(encoder) => encoder,
            Err(e) => {
                let _ = decoder.kill();
                let _ = decoder.wait();
                return Err(e.into());
            }
        };

        let (mut reader, mut writer) = match (decoder.stdout.take(), encoder.stdin.take()) {
            (Some(reader), Some(writer)) => (reader, writer),
            _ => {
                let _ = decoder.kill();
                let _ = encoder.kill();
                let _ = decoder.wait();
                let _ = encoder.wait();
                return Err(MediaError::Export("ffmpeg pipes unavailable".to_string()));
            }
        };

        // stderr is drained while frames flow; a full pipe would block ffmpeg
        let decoder_log = StderrTail::drain(decoder.stderr.take());
        let encoder_log = StderrTail::drain(encoder.stderr.take());

        let mut buffer = vec![0u8; self.composition.extent().rgba_len()];
        let mut frames = 0u64;
        let mut substitutions = 0u64;

        let pumped: Result<()> = loop {
            match read_frame(&mut reader, &mut buffer) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }

            let (pixels, skipped) = match self.composition.process_rgba(&buffer) {
                Ok(processed) => processed,
                Err(e) => break Err(e),
            };
            substitutions += skipped as u64;

            if let Err(e) = writer.write_all(&pixels) {
                break Err(e.into());
            }
            frames += 1;
        };

        // closing stdin lets the encoder finalize the container
        drop(writer);
        drop(reader);
        if pumped.is_err() {
            let _ = decoder.kill();
        }

        let decoder_status = decoder.wait()?;
        let encoder_status = encoder.wait()?;
        let decoder_stderr = decoder_log.finish();
        let encoder_stderr = encoder_log.finish();
        debug!("Export pumped {} frame(s), {} filter substitution(s)", frames, substitutions);

        if encoder_status.code().is_none() {
            return Ok(ExportReport {
                status: ExportStatus::Cancelled,
                frames,
                filter_substitutions: substitutions,
            });
        }
        if !encoder_status.success() {
            let reason = describe("encoder", &encoder_status, &encoder_stderr);
            return Ok(ExportReport::failed(reason, frames, substitutions));
        }
        if let Err(e) = pumped {
            return Ok(ExportReport::failed(e.to_string(), frames, substitutions));
        }
        if !decoder_status.success() {
            let reason = describe("decoder", &decoder_status, &decoder_stderr);
            return Ok(ExportReport::failed(reason, frames, substitutions));
        }
        if frames == 0 {
            warn!("Decoder produced no frames for {}", self.asset.path().display());
            return Ok(ExportReport::failed("no frames decoded", frames, substitutions));
        }

        Ok(ExportReport {
            status: ExportStatus::Completed,
            frames,
            filter_substitutions: substitutions,
        })
    }
}

/// Fill `buffer` with one frame; `Ok(false)` on a clean end of stream
fn read_frame(reader: &mut impl Read, buffer: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(MediaError::Export(format!(
                    "truncated frame: {} of {} bytes",
                    filled,
                    buffer.len()
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Background reader keeping the last [`STDERR_TAIL`] bytes of a child's stderr
struct StderrTail {
    handle: Option<JoinHandle<Vec<u8>>>,
}

impl StderrTail {
    fn drain<R: Read + Send + 'static>(stderr: Option<R>) -> Self {
        let handle = stderr.map(|mut stderr| {
            std::thread::spawn(move || {
                let mut tail = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    match stderr.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            tail.extend_from_slice(&chunk[..n]);
                            if tail.len() > STDERR_TAIL {
                                let excess = tail.len() - STDERR_TAIL;
                                tail.drain(..excess);
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(_) => break,
                    }
                }
                tail
            })
        });
        Self { handle }
    }

    /// Wait for the pipe to close and return what was kept
    fn finish(self) -> String {
        self.handle
            .and_then(|handle| handle.join().ok())
            .map(|tail| String::from_utf8_lossy(&tail).into_owned())
            .unwrap_or_default()
    }
}

fn describe(stage: &str, status: &ExitStatus, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{} exited with {}", stage, status)
    } else {
        format!("{} exited with {}: {}", stage, status, stderr)
    }
}
