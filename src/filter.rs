//! Filter chains
//!
//! A [`FilterChain`] is an ordered list of [`Filter`]s applied left to right.
//! Filters are best-effort: a filter that fails leaves the previous frame in
//! place and the chain carries on. Substitutions are logged and reported in
//! [`ChainOutcome::skipped`].
//!
//! ## Example
//!
//! ```rust
//! use capture_finalize::{apply_filters, FilterChain, FilterSpec, Frame};
//! use image::{DynamicImage, RgbaImage};
//!
//! let chain = FilterChain::from_specs(&[FilterSpec::Grayscale, FilterSpec::Brightness { delta: 10 }]);
//! let frame = Frame::new(DynamicImage::ImageRgba8(RgbaImage::new(4, 4)));
//! let output = apply_filters(frame, &chain);
//! assert_eq!(output.extent().width, 4);
//! ```

use crate::frame::Frame;
use image::{DynamicImage, Rgba};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-filter failure
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("{filter}: invalid parameter: {reason}")]
    InvalidParameter { filter: String, reason: String },

    #[error("{0}: produced no output")]
    NoOutput(String),
}

/// A named frame transformation
///
/// Implementations must be pure: the same chain is shared between export
/// workers and applied concurrently.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError>;
}

/// Result of running a chain, including which filters were skipped
#[derive(Debug)]
pub struct ChainOutcome {
    pub frame: Frame,
    pub skipped: Vec<String>,
}

/// Ordered, shareable list of filters
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[FilterSpec]) -> Self {
        Self {
            filters: specs.iter().map(FilterSpec::build).collect(),
        }
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Fold the chain over `frame`, substituting the previous frame on failure
    pub fn apply(&self, frame: Frame) -> ChainOutcome {
        let mut skipped = Vec::new();

        let frame = self.filters.iter().fold(frame, |current, filter| {
            match filter.apply(&current) {
                Ok(next) => next,
                Err(e) => {
                    warn!("Filter '{}' failed, keeping previous frame: {}", filter.name(), e);
                    skipped.push(filter.name().to_string());
                    current
                }
            }
        });

        if !self.filters.is_empty() {
            debug!("Applied {} filter(s), {} skipped", self.filters.len(), skipped.len());
        }

        ChainOutcome { frame, skipped }
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Apply `chain` to `frame`; an empty chain returns the frame untouched
pub fn apply_filters(frame: Frame, chain: &FilterChain) -> Frame {
    chain.apply(frame).frame
}

// ============================================================================
// Built-in filters
// ============================================================================

/// Serializable description of a built-in filter
///
/// Parsed from `name` or `name=value` strings, e.g. `grayscale`,
/// `brightness=20`, `blur=1.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    Grayscale,
    Invert,
    Sepia,
    Brightness { delta: i32 },
    Contrast { amount: f32 },
    HueRotate { degrees: i32 },
    Blur { sigma: f32 },
}

impl FilterSpec {
    pub fn build(&self) -> Arc<dyn Filter> {
        match *self {
            FilterSpec::Grayscale => Arc::new(Grayscale),
            FilterSpec::Invert => Arc::new(Invert),
            FilterSpec::Sepia => Arc::new(Sepia),
            FilterSpec::Brightness { delta } => Arc::new(Brightness { delta }),
            FilterSpec::Contrast { amount } => Arc::new(Contrast { amount }),
            FilterSpec::HueRotate { degrees } => Arc::new(HueRotate { degrees }),
            FilterSpec::Blur { sigma } => Arc::new(Blur { sigma }),
        }
    }
}

impl FromStr for FilterSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (s.trim(), None),
        };

        let number = |kind: &str| -> Result<f32, String> {
            value
                .ok_or_else(|| format!("{} requires a value, e.g. {}=1", kind, kind))?
                .parse::<f32>()
                .map_err(|e| format!("Invalid {} value: {}", kind, e))
        };

        match name.to_lowercase().as_str() {
            "grayscale" | "mono" => Ok(FilterSpec::Grayscale),
            "invert" => Ok(FilterSpec::Invert),
            "sepia" => Ok(FilterSpec::Sepia),
            "brightness" => Ok(FilterSpec::Brightness { delta: number("brightness")? as i32 }),
            "contrast" => Ok(FilterSpec::Contrast { amount: number("contrast")? }),
            "hue" | "hue_rotate" => Ok(FilterSpec::HueRotate { degrees: number("hue")? as i32 }),
            "blur" => Ok(FilterSpec::Blur { sigma: number("blur")? }),
            other => Err(format!("Unknown filter: {}", other)),
        }
    }
}

pub struct Grayscale;

impl Filter for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError> {
        let gray = frame.image().grayscale().to_rgba8();
        Ok(frame.with_image(DynamicImage::ImageRgba8(gray)))
    }
}

pub struct Invert;

impl Filter for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError> {
        let mut image = frame.image().clone();
        image.invert();
        Ok(frame.with_image(image))
    }
}

pub struct Sepia;

impl Filter for Sepia {
    fn name(&self) -> &str {
        "sepia"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError> {
        let mut pixels = frame.image().to_rgba8();
        for pixel in pixels.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let (r, g, b) = (r as f32, g as f32, b as f32);
            let tone = |cr: f32, cg: f32, cb: f32| (r * cr + g * cg + b * cb).min(255.0) as u8;
            *pixel = Rgba([
                tone(0.393, 0.769, 0.189),
                tone(0.349, 0.686, 0.168),
                tone(0.272, 0.534, 0.131),
                a,
            ]);
        }
        Ok(frame.with_image(DynamicImage::ImageRgba8(pixels)))
    }
}

pub struct Brightness {
    pub delta: i32,
}

impl Filter for Brightness {
    fn name(&self) -> &str {
        "brightness"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError> {
        Ok(frame.with_image(frame.image().brighten(self.delta)))
    }
}

pub struct Contrast {
    pub amount: f32,
}

impl Filter for Contrast {
    fn name(&self) -> &str {
        "contrast"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError> {
        if !self.amount.is_finite() {
            return Err(FilterError::InvalidParameter {
                filter: self.name().to_string(),
                reason: format!("amount must be finite, got {}", self.amount),
            });
        }
        Ok(frame.with_image(frame.image().adjust_contrast(self.amount)))
    }
}

pub struct HueRotate {
    pub degrees: i32,
}

impl Filter for HueRotate {
    fn name(&self) -> &str {
        "hue_rotate"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError> {
        Ok(frame.with_image(frame.image().huerotate(self.degrees)))
    }
}

pub struct Blur {
    pub sigma: f32,
}

impl Filter for Blur {
    fn name(&self) -> &str {
        "blur"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, FilterError> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(FilterError::InvalidParameter {
                filter: self.name().to_string(),
                reason: format!("sigma must be positive, got {}", self.sigma),
            });
        }
        Ok(frame.with_image(frame.image().blur(self.sigma)))
    }
}
