//! Capture metadata extraction
//!
//! Reads the EXIF block embedded in a capture with kamadak-exif and keeps it
//! as a flat tag map plus the few typed fields the finalizers act on
//! (orientation and color space). A capture without EXIF yields empty
//! metadata; a corrupt EXIF block is dropped with a warning and decoding
//! continues.

use crate::error::{MediaError, Result};
use crate::frame::{ColorSpace, Orientation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::{debug, warn};

/// Key-value properties carried over from the original capture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// Camera/device manufacturer
    pub make: Option<String>,

    /// Camera/device model
    pub model: Option<String>,

    /// Capture timestamp as written by the camera
    pub date_created: Option<String>,

    /// Orientation the pixels were stored in
    pub orientation: Option<Orientation>,

    /// Color space declared by the capture
    pub color_space: Option<ColorSpace>,

    /// All primary-image tags, keyed by EXIF tag name
    pub properties: BTreeMap<String, String>,
}

impl CaptureMetadata {
    /// Extract metadata from an encoded capture (JPEG, TIFF, HEIF, PNG, WebP)
    pub fn from_capture(data: &[u8]) -> Self {
        let exif_data = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
            Ok(exif_data) => exif_data,
            Err(exif::Error::NotFound(_)) => {
                debug!("Capture carries no EXIF block");
                return Self::default();
            }
            Err(e) => {
                warn!("Dropping unreadable EXIF block: {}", e);
                return Self::default();
            }
        };

        Self::from_exif(&exif_data)
    }

    fn from_exif(exif_data: &exif::Exif) -> Self {
        let get_str = |tag: exif::Tag| -> Option<String> {
            exif_data.get_field(tag, exif::In::PRIMARY).map(field_text)
        };

        let get_u32 = |tag: exif::Tag| -> Option<u32> {
            exif_data
                .get_field(tag, exif::In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
        };

        let properties = exif_data
            .fields()
            .filter(|f| f.ifd_num == exif::In::PRIMARY)
            .map(|f| (f.tag.to_string(), field_text(f)))
            .collect();

        Self {
            make: get_str(exif::Tag::Make),
            model: get_str(exif::Tag::Model),
            date_created: get_str(exif::Tag::DateTimeOriginal),
            orientation: get_u32(exif::Tag::Orientation).and_then(Orientation::from_exif),
            color_space: get_u32(exif::Tag::ColorSpace).and_then(ColorSpace::from_exif),
            properties,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Serialize as a TIFF-structured EXIF block tagged with `orientation`
    ///
    /// Only make, model and capture date are carried; the color space is
    /// always written as sRGB, since finalized pixels are sRGB.
    pub fn to_exif(&self, orientation: Orientation) -> Result<Vec<u8>> {
        let field = |tag: exif::Tag, value: exif::Value| exif::Field {
            tag,
            ifd_num: exif::In::PRIMARY,
            value,
        };

        let mut fields = vec![
            field(exif::Tag::Orientation, exif::Value::Short(vec![orientation.exif_value()])),
            field(exif::Tag::ColorSpace, exif::Value::Short(vec![1])),
        ];
        let text_fields = [
            (exif::Tag::Make, &self.make),
            (exif::Tag::Model, &self.model),
            (exif::Tag::DateTimeOriginal, &self.date_created),
        ];
        for (tag, text) in text_fields {
            if let Some(text) = text {
                fields.push(field(tag, exif::Value::Ascii(vec![text.as_bytes().to_vec()])));
            }
        }

        let mut writer = exif::experimental::Writer::new();
        for f in &fields {
            writer.push_field(f);
        }

        let mut block = Cursor::new(Vec::new());
        writer
            .write(&mut block, false)
            .map_err(|e| MediaError::Encode(format!("EXIF: {}", e)))?;
        Ok(block.into_inner())
    }
}

/// Render a field value; ASCII values come back without quotes or NUL padding
fn field_text(field: &exif::Field) -> String {
    match field.value {
        exif::Value::Ascii(ref parts) if !parts.is_empty() => parts
            .iter()
            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
            .collect::<Vec<_>>()
            .join(", "),
        _ => field.display_value().to_string(),
    }
}
