//! Entry point tying the still and video finalizers to shared config and metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use capture_finalize::{CaptureFinalizer, FilterChain, FilterSpec, FinalizeConfig, Orientation, RawPhotoData};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let finalizer = CaptureFinalizer::new(FinalizeConfig::default());
//! let filters = FilterChain::from_specs(&[FilterSpec::Grayscale]);
//!
//! let photo = RawPhotoData::from_file("capture.jpg")?;
//! if let Some(artifact) = finalizer.finalize_photo(&photo, Orientation::Right, &filters) {
//!     println!("{:?}", artifact.image().map(|i| i.extent()));
//! }
//!
//! if let Some(artifact) = finalizer.finalize_video("clip.mov", filters).await {
//!     println!("{:?}", artifact.video());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::FinalizeConfig;
use crate::filter::FilterChain;
use crate::frame::Orientation;
use crate::media::MediaArtifact;
use crate::metrics::{Metrics, Timer};
use crate::photo::{render_photo, RawPhotoData};
use crate::scratch::ScratchSpace;
use crate::video::VideoFinalizer;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub struct CaptureFinalizer {
    config: FinalizeConfig,
    metrics: Arc<Metrics>,
    video: VideoFinalizer,
}

impl CaptureFinalizer {
    pub fn new(config: FinalizeConfig) -> Self {
        let metrics = Metrics::new();
        let video = VideoFinalizer::new(&config).with_metrics(Arc::clone(&metrics));
        Self { config, metrics, video }
    }

    /// Replace the scratch space (e.g. a test directory)
    pub fn with_scratch(mut self, scratch: ScratchSpace) -> Self {
        self.video = self.video.with_scratch(scratch);
        self
    }

    pub fn config(&self) -> &FinalizeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Chain built from the configured default filters
    pub fn default_filters(&self) -> FilterChain {
        FilterChain::from_specs(&self.config.filters)
    }

    pub fn finalize_photo(
        &self,
        raw: &RawPhotoData,
        orientation: Orientation,
        filters: &FilterChain,
    ) -> Option<MediaArtifact> {
        let timer = Timer::new();
        match render_photo(raw, orientation, filters) {
            Ok((still, skipped)) => {
                self.metrics.record_substitutions(skipped as u64);
                self.metrics.record_still(true, timer.elapsed_ms());
                MediaArtifact::from_image(Some(still))
            }
            Err(e) => {
                warn!("Photo finalization failed: {}", e);
                self.metrics.record_still(false, timer.elapsed_ms());
                None
            }
        }
    }

    pub async fn finalize_video(&self, video: impl AsRef<Path>, filters: FilterChain) -> Option<MediaArtifact> {
        self.video.finalize(video, filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterError, FilterSpec};
    use crate::frame::Frame;
    use crate::test_utils::gradient_jpeg;

    struct Refuses;

    impl Filter for Refuses {
        fn name(&self) -> &str {
            "refuses"
        }

        fn apply(&self, _frame: &Frame) -> Result<Frame, FilterError> {
            Err(FilterError::NoOutput(self.name().to_string()))
        }
    }

    #[test]
    fn test_photo_metrics() {
        let finalizer = CaptureFinalizer::new(FinalizeConfig::default());
        let chain = FilterChain::new().with(Refuses).with(crate::filter::Grayscale);

        let raw = RawPhotoData::new(gradient_jpeg(8, 8));
        assert!(finalizer.finalize_photo(&raw, Orientation::Up, &chain).is_some());
        assert!(finalizer
            .finalize_photo(&RawPhotoData::new(vec![0; 16]), Orientation::Up, &chain)
            .is_none());

        let snapshot = finalizer.metrics().snapshot();
        assert_eq!(snapshot.stills_finalized, 1);
        assert_eq!(snapshot.stills_failed, 1);
        assert_eq!(snapshot.filter_substitutions, 1);
    }

    #[test]
    fn test_default_filters_from_config() {
        let config = FinalizeConfig {
            filters: vec![FilterSpec::Sepia, FilterSpec::Brightness { delta: 5 }],
            ..Default::default()
        };
        let finalizer = CaptureFinalizer::new(config);
        assert_eq!(finalizer.default_filters().names(), vec!["sepia", "brightness"]);
    }

    #[tokio::test]
    async fn test_video_metrics_are_shared() {
        let finalizer = CaptureFinalizer::new(FinalizeConfig::default());
        assert!(finalizer.finalize_video("clip.mov", FilterChain::new()).await.is_some());
        assert_eq!(finalizer.metrics().snapshot().videos_fast_path, 1);
    }
}
