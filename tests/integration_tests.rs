//! Integration tests for photo and video finalization
//!
//! Tests that need a real export skip themselves when `ffmpeg`/`ffprobe` (or
//! the libx264 encoder) are not installed.

use capture_finalize::{
    ffmpeg_available, CaptureFinalizer, CaptureMetadata, Extent, FfmpegCommand, FilterChain, FilterSpec,
    FinalizeConfig, MediaArtifact, Orientation, RawPhotoData, ScratchNaming, ScratchSpace, VideoAsset,
};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(120);

fn jpeg_capture(width: u32, height: u32) -> RawPhotoData {
    let pixels = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 251) as u8, (y % 241) as u8, 128]));
    let mut data = Vec::new();
    pixels
        .write_with_encoder(JpegEncoder::new_with_quality(&mut data, 60))
        .unwrap();
    RawPhotoData::new(data)
}

fn finalizer_in(dir: &Path, naming: ScratchNaming) -> CaptureFinalizer {
    let config = FinalizeConfig {
        scratch_dir: Some(dir.join(".temp")),
        scratch_naming: naming,
        ..Default::default()
    };
    CaptureFinalizer::new(config)
}

/// ffmpeg with libx264, needed for the default export codec
fn can_export() -> bool {
    if !ffmpeg_available() {
        eprintln!("skipping: ffmpeg/ffprobe not installed");
        return false;
    }
    let has_x264 = FfmpegCommand::new()
        .args(&["-encoders"])
        .execute()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains("libx264"))
        .unwrap_or(false);
    if !has_x264 {
        eprintln!("skipping: ffmpeg built without libx264");
    }
    has_x264
}

/// One-second 160x120 test pattern with a sine tone
fn make_clip(dir: &Path) -> PathBuf {
    let path = dir.join("clip.mov");
    FfmpegCommand::new()
        .args(&[
            "-y",
            "-f", "lavfi", "-i", "testsrc=size=160x120:rate=10",
            "-f", "lavfi", "-i", "sine=frequency=440:sample_rate=44100",
            "-t", "1",
            "-c:v", "mpeg4",
            "-c:a", "aac",
            "-shortest",
        ])
        .output(&path)
        .execute()
        .expect("create fixture clip");
    path
}

#[test]
fn test_unfiltered_photo_keeps_extent_and_orientation() {
    let tmp = TempDir::new().unwrap();
    let finalizer = finalizer_in(tmp.path(), ScratchNaming::Fixed);

    let artifact = finalizer
        .finalize_photo(&jpeg_capture(4032, 3024), Orientation::Up, &FilterChain::new())
        .unwrap();

    let still = artifact.image().unwrap();
    assert_eq!(still.extent(), Extent::new(4032, 3024));
    assert_eq!(still.orientation(), Orientation::Up);
    assert!(artifact.video().is_none());
}

#[test]
fn test_rotated_photo_keeps_requested_orientation() {
    let tmp = TempDir::new().unwrap();
    let finalizer = finalizer_in(tmp.path(), ScratchNaming::Fixed);
    let chain = FilterChain::from_specs(&[FilterSpec::Grayscale, FilterSpec::Contrast { amount: 10.0 }]);

    let artifact = finalizer
        .finalize_photo(&jpeg_capture(64, 48), Orientation::Right, &chain)
        .unwrap();
    let still = artifact.image().unwrap();

    // the tag is display-only, pixels stay in capture layout
    assert_eq!(still.orientation(), Orientation::Right);
    assert_eq!(still.extent(), Extent::new(64, 48));

    let output = tmp.path().join("final.jpg");
    still.save(&output, 90).unwrap();
    let reloaded = image::open(&output).unwrap();
    assert_eq!((reloaded.width(), reloaded.height()), (64, 48));

    // viewers see the requested orientation on disk too
    let on_disk = CaptureMetadata::from_capture(&std::fs::read(&output).unwrap());
    assert_eq!(on_disk.orientation, Some(Orientation::Right));
}

#[tokio::test]
async fn test_unfiltered_video_returns_original_path() {
    let tmp = TempDir::new().unwrap();
    let finalizer = finalizer_in(tmp.path(), ScratchNaming::Fixed);

    let artifact = finalizer.finalize_video("clip.mov", FilterChain::new()).await.unwrap();
    assert_eq!(artifact, MediaArtifact::Video(PathBuf::from("clip.mov")));
    assert!(artifact.image().is_none());

    // no export, so no scratch space was touched
    assert!(!tmp.path().join(".temp").exists());
}

#[tokio::test]
async fn test_malformed_video_resolves_to_nothing() {
    let tmp = TempDir::new().unwrap();
    let finalizer = finalizer_in(tmp.path(), ScratchNaming::Fixed);

    let bogus = tmp.path().join("clip.mov");
    std::fs::write(&bogus, b"this is not a movie").unwrap();

    let chain = FilterChain::from_specs(&[FilterSpec::Grayscale]);
    let result = tokio::time::timeout(EXPORT_TIMEOUT, finalizer.finalize_video(&bogus, chain))
        .await
        .expect("finalization must resolve");
    assert!(result.is_none());
    assert_eq!(finalizer.metrics().snapshot().videos_failed, 1);
}

#[tokio::test]
async fn test_missing_scratch_space_resolves_to_nothing() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"file where the scratch directory should go").unwrap();

    let finalizer = CaptureFinalizer::new(FinalizeConfig::default()).with_scratch(ScratchSpace::new(blocker.join(".temp")));

    // with or without ffmpeg, there is nowhere to export to
    let source = if ffmpeg_available() { make_clip(tmp.path()) } else { tmp.path().join("clip.mov") };
    let chain = FilterChain::from_specs(&[FilterSpec::Grayscale]);
    let result = tokio::time::timeout(EXPORT_TIMEOUT, finalizer.finalize_video(&source, chain))
        .await
        .expect("finalization must resolve");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_filtered_video_exports_to_scratch() {
    if !can_export() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let source = make_clip(tmp.path());
    let finalizer = finalizer_in(tmp.path(), ScratchNaming::Fixed);

    let scratch = tmp.path().join(".temp").join("video.mp4");
    std::fs::create_dir_all(scratch.parent().unwrap()).unwrap();
    std::fs::write(&scratch, b"stale export").unwrap();

    let chain = FilterChain::from_specs(&[FilterSpec::Grayscale]);
    let artifact = tokio::time::timeout(EXPORT_TIMEOUT, finalizer.finalize_video(&source, chain))
        .await
        .expect("finalization must resolve")
        .expect("export should succeed");

    assert_eq!(artifact.video(), Some(scratch.as_path()));
    assert_ne!(std::fs::read(&scratch).unwrap(), b"stale export");

    let exported = VideoAsset::load(&scratch).unwrap();
    assert_eq!(exported.extent(), Extent::new(160, 120));
    assert!(exported.has_audio());

    let snapshot = finalizer.metrics().snapshot();
    assert_eq!(snapshot.videos_exported, 1);
    assert!(snapshot.frames_processed >= 9);
}

#[tokio::test]
async fn test_per_export_naming_runs_side_by_side() {
    if !can_export() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let source = make_clip(tmp.path());
    let finalizer = finalizer_in(tmp.path(), ScratchNaming::PerExport);

    let gray = FilterChain::from_specs(&[FilterSpec::Grayscale]);
    let sepia = FilterChain::from_specs(&[FilterSpec::Sepia]);
    let (a, b) = tokio::join!(
        finalizer.finalize_video(&source, gray),
        finalizer.finalize_video(&source, sepia)
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.video(), b.video());
    assert!(a.video().unwrap().exists());
    assert!(b.video().unwrap().exists());
}

#[tokio::test]
async fn test_finalizers_sharing_scratch_take_turns() {
    if !can_export() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let source = make_clip(tmp.path());
    let first = finalizer_in(tmp.path(), ScratchNaming::Fixed);
    let second = finalizer_in(tmp.path(), ScratchNaming::Fixed);

    let gray = FilterChain::from_specs(&[FilterSpec::Grayscale]);
    let invert = FilterChain::from_specs(&[FilterSpec::Invert]);
    let (a, b) = tokio::time::timeout(EXPORT_TIMEOUT * 2, async {
        tokio::join!(first.finalize_video(&source, gray), second.finalize_video(&source, invert))
    })
    .await
    .expect("finalization must resolve");

    // same fixed file, written one export at a time
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.video(), b.video());
    assert!(VideoAsset::load(a.video().unwrap()).is_ok());
}
