//! Frame type and its orientation / color space tags
//!
//! A [`Frame`] is one decoded unit of visual data: a still capture or a single
//! video frame. Frames are never mutated in place; filters derive new frames
//! with [`Frame::with_image`].

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel bounds of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Byte length of one RGBA8 frame with this extent
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Image orientation, numbered as the EXIF standard (1-8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Up,
        Orientation::UpMirrored,
        Orientation::Down,
        Orientation::DownMirrored,
        Orientation::LeftMirrored,
        Orientation::Right,
        Orientation::RightMirrored,
        Orientation::Left,
    ];

    pub fn from_exif(value: u32) -> Option<Self> {
        match value {
            1..=8 => Some(Self::ALL[value as usize - 1]),
            _ => None,
        }
    }

    pub fn exif_value(&self) -> u16 {
        match self {
            Orientation::Up => 1,
            Orientation::UpMirrored => 2,
            Orientation::Down => 3,
            Orientation::DownMirrored => 4,
            Orientation::LeftMirrored => 5,
            Orientation::Right => 6,
            Orientation::RightMirrored => 7,
            Orientation::Left => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Up => "up",
            Orientation::UpMirrored => "up-mirrored",
            Orientation::Down => "down",
            Orientation::DownMirrored => "down-mirrored",
            Orientation::LeftMirrored => "left-mirrored",
            Orientation::Right => "right",
            Orientation::RightMirrored => "right-mirrored",
            Orientation::Left => "left",
        }
    }

    /// True for the four orientations that exchange width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            Orientation::LeftMirrored | Orientation::Right | Orientation::RightMirrored | Orientation::Left
        )
    }

    /// Rotate/flip stored pixels so they display upright
    pub fn apply_to(&self, image: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Up => image,
            Orientation::UpMirrored => image.fliph(),
            Orientation::Down => image.rotate180(),
            Orientation::DownMirrored => image.flipv(),
            Orientation::LeftMirrored => image.rotate90().fliph(),
            Orientation::Right => image.rotate90(),
            Orientation::RightMirrored => image.rotate270().fliph(),
            Orientation::Left => image.rotate270(),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<u32>() {
            return Self::from_exif(value).ok_or_else(|| format!("EXIF orientation out of range: {}", value));
        }

        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|o| o.as_str() == normalized)
            .ok_or_else(|| format!("Unknown orientation: {}", s))
    }
}

/// Color space hint carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    #[default]
    Srgb,
    AdobeRgb,
    Uncalibrated,
}

impl ColorSpace {
    /// Map the EXIF `ColorSpace` tag value
    pub fn from_exif(value: u32) -> Option<Self> {
        match value {
            1 => Some(ColorSpace::Srgb),
            2 => Some(ColorSpace::AdobeRgb),
            0xFFFF => Some(ColorSpace::Uncalibrated),
            _ => None,
        }
    }
}

/// One decoded still image or video frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: DynamicImage,
    color_space: ColorSpace,
    orientation: Option<Orientation>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            color_space: ColorSpace::default(),
            orientation: None,
        }
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Derive a new frame with different pixels and the same tags
    pub fn with_image(&self, image: DynamicImage) -> Frame {
        Frame {
            image,
            color_space: self.color_space,
            orientation: self.orientation,
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    pub fn extent(&self) -> Extent {
        let (width, height) = self.image.dimensions();
        Extent::new(width, height)
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation
    }

    /// Bring the frame back to `extent`: crop when it grew, rescale otherwise
    pub fn clamp_to_extent(self, extent: Extent) -> Frame {
        let current = self.extent();
        if current == extent {
            return self;
        }

        let image = if current.width >= extent.width && current.height >= extent.height {
            self.image.crop_imm(0, 0, extent.width, extent.height)
        } else {
            self.image.resize_exact(extent.width, extent.height, FilterType::Triangle)
        };

        self.with_image(image)
    }
}
