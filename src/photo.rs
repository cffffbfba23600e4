//! Still-image finalization
//!
//! Turns the encoded bytes of a photo capture into a [`StillImage`]:
//! metadata is read first, the pixels are decoded upright using the embedded
//! orientation, the filter chain runs, and the result is re-encoded as sRGB
//! RGBA8 tagged with the orientation the caller asked for.

use crate::error::{MediaError, Result};
use crate::filter::FilterChain;
use crate::frame::{ColorSpace, Frame, Orientation};
use crate::media::{MediaArtifact, StillImage};
use crate::metadata::CaptureMetadata;
use image::ImageFormat;
use tracing::{debug, warn};

/// Encoded photo as delivered by the camera session
#[derive(Debug, Clone)]
pub struct RawPhotoData {
    data: Vec<u8>,
}

impl RawPhotoData {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Image container detected from the leading magic bytes
    pub fn format(&self) -> Result<ImageFormat> {
        let kind = infer::get(&self.data)
            .filter(|k| k.matcher_type() == infer::MatcherType::Image)
            .ok_or_else(|| MediaError::Decode("Unrecognized capture container".to_string()))?;

        ImageFormat::from_mime_type(kind.mime_type())
            .ok_or_else(|| MediaError::Decode(format!("Unsupported capture format: {}", kind.mime_type())))
    }

    /// Extract metadata and decode an upright frame
    pub fn decode(&self, orientation: Orientation) -> Result<(Frame, CaptureMetadata)> {
        let format = self.format()?;
        let metadata = CaptureMetadata::from_capture(&self.data);

        let image = image::load_from_memory_with_format(&self.data, format)
            .map_err(|e| MediaError::Decode(e.to_string()))?;
        let image = metadata.orientation.unwrap_or_default().apply_to(image);

        let frame = Frame::new(image)
            .with_color_space(metadata.color_space.unwrap_or_default())
            .with_orientation(orientation);

        debug!(
            "Decoded {:?} capture: {} ({} metadata tags)",
            format,
            frame.extent(),
            metadata.properties.len()
        );

        Ok((frame, metadata))
    }
}

/// Finalize a photo, reporting why it failed
pub fn try_finalize_photo(raw: &RawPhotoData, orientation: Orientation, filters: &FilterChain) -> Result<StillImage> {
    render_photo(raw, orientation, filters).map(|(still, _)| still)
}

/// Finalize and also report how many filters were skipped
pub(crate) fn render_photo(
    raw: &RawPhotoData,
    orientation: Orientation,
    filters: &FilterChain,
) -> Result<(StillImage, usize)> {
    let (frame, metadata) = raw.decode(orientation)?;

    let outcome = filters.apply(frame);
    let frame = outcome.frame;
    if frame.extent().is_empty() {
        return Err(MediaError::EmptyExtent);
    }

    if frame.color_space() != ColorSpace::Srgb {
        debug!("Rendering {:?} capture into sRGB", frame.color_space());
    }

    let pixels = frame.into_image().to_rgba8();
    Ok((StillImage::new(pixels, orientation, metadata), outcome.skipped.len()))
}

/// Finalize a photo capture into a still-image artifact
///
/// Any failure is logged and yields `None`; no partial artifact is produced.
pub fn finalize_photo(raw: &RawPhotoData, orientation: Orientation, filters: &FilterChain) -> Option<MediaArtifact> {
    match try_finalize_photo(raw, orientation, filters) {
        Ok(still) => MediaArtifact::from_image(Some(still)),
        Err(e) => {
            warn!("Photo finalization failed: {}", e);
            None
        }
    }
}
