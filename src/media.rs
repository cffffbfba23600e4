//! Finalized media artifacts

use crate::error::{MediaError, Result};
use crate::frame::{ColorSpace, Extent, Orientation};
use crate::metadata::CaptureMetadata;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Final still image: sRGB pixels plus the orientation it should be displayed with
#[derive(Debug, Clone, PartialEq)]
pub struct StillImage {
    pixels: RgbaImage,
    orientation: Orientation,
    color_space: ColorSpace,
    metadata: CaptureMetadata,
}

impl StillImage {
    pub(crate) fn new(pixels: RgbaImage, orientation: Orientation, metadata: CaptureMetadata) -> Self {
        Self {
            pixels,
            orientation,
            color_space: ColorSpace::Srgb,
            metadata,
        }
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.pixels.width(), self.pixels.height())
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn metadata(&self) -> &CaptureMetadata {
        &self.metadata
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.pixels.clone())
    }

    /// Encode as baseline JPEG (alpha is dropped) with an EXIF block
    ///
    /// The block carries the preserved metadata and tags the display
    /// orientation of this still.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgb = self.to_dynamic().to_rgb8();
        let mut data = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100)))
            .map_err(|e| MediaError::Encode(format!("JPEG: {}", e)))?;

        let exif = self.metadata.to_exif(self.orientation)?;
        embed_exif(&data, &exif)
    }

    /// Encode as PNG; no metadata is written
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.pixels
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| MediaError::Encode(format!("PNG: {}", e)))?;
        Ok(cursor.into_inner())
    }

    /// Write to `path`, picking PNG or JPEG from the extension
    pub fn save(&self, path: impl AsRef<Path>, jpeg_quality: u8) -> Result<()> {
        let path = path.as_ref();
        let data = match ImageFormat::from_path(path) {
            Ok(ImageFormat::Png) => {
                if self.orientation != Orientation::Up {
                    warn!(
                        "{} carries no EXIF, display orientation {} is not recorded",
                        path.display(),
                        self.orientation
                    );
                }
                self.encode_png()?
            }
            Ok(ImageFormat::Jpeg) => self.encode_jpeg(jpeg_quality)?,
            _ => {
                return Err(MediaError::Encode(format!(
                    "Unsupported output extension: {}",
                    path.display()
                )))
            }
        };
        std::fs::write(path, data)?;
        Ok(())
    }
}

/// Insert an APP1 EXIF segment after SOI, or after a leading JFIF APP0
fn embed_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    const EXIF_HEADER: &[u8] = b"Exif\0\0";

    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return Err(MediaError::Encode("JPEG stream has no SOI marker".to_string()));
    }
    let segment_len = u16::try_from(2 + EXIF_HEADER.len() + tiff.len())
        .map_err(|_| MediaError::Encode("EXIF block does not fit one APP1 segment".to_string()))?;

    let mut insert_at = 2;
    if jpeg.len() >= 6 && jpeg[2..4] == [0xFF, 0xE0] {
        let app0_len = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        insert_at = (4 + app0_len).min(jpeg.len());
    }

    let mut out = Vec::with_capacity(jpeg.len() + segment_len as usize + 2);
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[insert_at..]);
    Ok(out)
}

/// Result of a finalization: exactly one still image or one video file
#[derive(Debug, Clone, PartialEq)]
pub enum MediaArtifact {
    StillImage(StillImage),
    Video(PathBuf),
}

impl MediaArtifact {
    pub fn from_image(image: Option<StillImage>) -> Option<Self> {
        image.map(MediaArtifact::StillImage)
    }

    pub fn from_video(path: Option<PathBuf>) -> Option<Self> {
        path.map(MediaArtifact::Video)
    }

    pub fn image(&self) -> Option<&StillImage> {
        match self {
            MediaArtifact::StillImage(image) => Some(image),
            MediaArtifact::Video(_) => None,
        }
    }

    pub fn video(&self) -> Option<&Path> {
        match self {
            MediaArtifact::StillImage(_) => None,
            MediaArtifact::Video(path) => Some(path),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MediaArtifact::StillImage(_) => "image",
            MediaArtifact::Video(_) => "video",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn still(orientation: Orientation) -> StillImage {
        let pixels = RgbaImage::from_pixel(6, 4, Rgba([10, 20, 30, 255]));
        StillImage::new(pixels, orientation, CaptureMetadata::default())
    }

    #[test]
    fn test_absent_payload_yields_no_artifact() {
        assert!(MediaArtifact::from_image(None).is_none());
        assert!(MediaArtifact::from_video(None).is_none());
    }

    #[test]
    fn test_accessors_are_exclusive() {
        let image = MediaArtifact::from_image(Some(still(Orientation::Up))).unwrap();
        assert!(image.image().is_some());
        assert!(image.video().is_none());
        assert_eq!(image.kind(), "image");

        let video = MediaArtifact::from_video(Some(PathBuf::from("clip.mov"))).unwrap();
        assert!(video.image().is_none());
        assert_eq!(video.video(), Some(Path::new("clip.mov")));
        assert_eq!(video.kind(), "video");
    }

    #[test]
    fn test_equality_is_pairwise() {
        assert_eq!(
            MediaArtifact::Video(PathBuf::from("a.mov")),
            MediaArtifact::Video(PathBuf::from("a.mov"))
        );
        assert_ne!(
            MediaArtifact::Video(PathBuf::from("a.mov")),
            MediaArtifact::Video(PathBuf::from("b.mov"))
        );
        assert_ne!(
            MediaArtifact::StillImage(still(Orientation::Up)),
            MediaArtifact::StillImage(still(Orientation::Right))
        );
        assert_ne!(
            MediaArtifact::StillImage(still(Orientation::Up)),
            MediaArtifact::Video(PathBuf::from("a.mov"))
        );
    }

    #[test]
    fn test_still_encodes_and_saves() {
        let image = still(Orientation::Up);
        assert!(image.encode_jpeg(90).unwrap().starts_with(&[0xFF, 0xD8]));
        assert!(image.encode_png().unwrap().starts_with(b"\x89PNG"));
        assert_eq!(image.color_space(), ColorSpace::Srgb);

        let dir = tempfile::tempdir().unwrap();
        image.save(dir.path().join("out.png"), 90).unwrap();
        assert!(image.save(dir.path().join("out.xyz"), 90).is_err());
    }

    #[test]
    fn test_saved_jpeg_keeps_orientation_and_metadata() {
        let metadata = CaptureMetadata {
            make: Some("TestCam".to_string()),
            ..Default::default()
        };
        let still = StillImage::new(RgbaImage::from_pixel(6, 4, Rgba([1, 2, 3, 255])), Orientation::Right, metadata);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        still.save(&path, 90).unwrap();

        let data = std::fs::read(&path).unwrap();
        let reread = CaptureMetadata::from_capture(&data);
        assert_eq!(reread.orientation, Some(Orientation::Right));
        assert_eq!(reread.make.as_deref(), Some("TestCam"));

        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (6, 4));
    }

    #[test]
    fn test_embed_exif_placement() {
        let bare = [0xFF, 0xD8, 0xFF, 0xD9];
        let out = embed_exif(&bare, b"TIFF").unwrap();
        assert_eq!(&out[..4], &[0xFF, 0xD8, 0xFF, 0xE1]);
        assert_eq!(&out[4..6], &12u16.to_be_bytes());
        assert!(out.ends_with(&[0xFF, 0xD9]));

        let jfif = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB, 0xFF, 0xD9];
        let out = embed_exif(&jfif, b"TIFF").unwrap();
        assert_eq!(&out[..8], &jfif[..8]);
        assert_eq!(&out[8..10], &[0xFF, 0xE1]);

        assert!(embed_exif(b"not a jpeg", b"TIFF").is_err());
    }
}
