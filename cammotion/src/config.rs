//! # Detector configuration

use crate::prelude::v1::*;

/// Threshold policy and feature extraction settings of the [`Detector`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorConfig {
    /// Sensitivity of the fallback path. Lower values flag smaller pixel changes.
    pub feature_threshold: f64,
    /// Sensitivity of the geometric path. Lower values flag smaller camera movements.
    pub homography_threshold: f64,
    /// Minimum number of good matches required to attempt homography estimation.
    pub min_match_count: usize,
    pub extractor: ExtractorConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            feature_threshold: 5.0,
            homography_threshold: 15.0,
            min_match_count: 8,
            extractor: Default::default(),
        }
    }
}

impl DetectorConfig {
    pub fn feature_threshold(self, feature_threshold: f64) -> Self {
        Self {
            feature_threshold,
            ..self
        }
    }

    pub fn homography_threshold(self, homography_threshold: f64) -> Self {
        Self {
            homography_threshold,
            ..self
        }
    }

    pub fn min_match_count(self, min_match_count: usize) -> Self {
        Self {
            min_match_count,
            ..self
        }
    }

    pub fn extractor(self, extractor: ExtractorConfig) -> Self {
        Self { extractor, ..self }
    }

    /// Check that every parameter is within its valid range.
    pub fn validate(&self) -> Result<()> {
        if !self.feature_threshold.is_finite() || self.feature_threshold < 0.0 {
            return Err(anyhow!(
                "Feature threshold must be a non-negative number, got {}",
                self.feature_threshold
            ));
        }

        if !self.homography_threshold.is_finite() || self.homography_threshold < 0.0 {
            return Err(anyhow!(
                "Homography threshold must be a non-negative number, got {}",
                self.homography_threshold
            ));
        }

        if self.min_match_count < 4 {
            return Err(anyhow!(
                "At least 4 matches are needed for a homography, got min_match_count = {}",
                self.min_match_count
            ));
        }

        self.extractor.validate()
    }
}

/// Multi-scale keypoint extraction settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExtractorConfig {
    /// Maximum number of keypoints retained per frame.
    pub n_features: usize,
    /// Downscaling factor between consecutive pyramid levels.
    pub scale_factor: f32,
    /// Number of pyramid levels.
    pub n_levels: usize,
    /// Keypoints closer than this to the level border are discarded.
    pub edge_threshold: usize,
    /// Diameter of the patch described around every keypoint.
    pub patch_size: usize,
    /// Intensity difference for a pixel to count towards a FAST corner.
    pub fast_threshold: u8,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            n_features: 2000,
            scale_factor: 1.2,
            n_levels: 8,
            edge_threshold: 31,
            patch_size: 31,
            fast_threshold: 20,
        }
    }
}

impl ExtractorConfig {
    pub fn n_features(self, n_features: usize) -> Self {
        Self { n_features, ..self }
    }

    pub fn scale_factor(self, scale_factor: f32) -> Self {
        Self {
            scale_factor,
            ..self
        }
    }

    pub fn n_levels(self, n_levels: usize) -> Self {
        Self { n_levels, ..self }
    }

    pub fn edge_threshold(self, edge_threshold: usize) -> Self {
        Self {
            edge_threshold,
            ..self
        }
    }

    pub fn patch_size(self, patch_size: usize) -> Self {
        Self { patch_size, ..self }
    }

    pub fn fast_threshold(self, fast_threshold: u8) -> Self {
        Self {
            fast_threshold,
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_features == 0 {
            return Err(anyhow!("n_features must be positive"));
        }

        if !(self.scale_factor.is_finite() && self.scale_factor > 1.0) {
            return Err(anyhow!(
                "Pyramid scale factor must be greater than 1, got {}",
                self.scale_factor
            ));
        }

        if self.n_levels == 0 {
            return Err(anyhow!("At least one pyramid level is required"));
        }

        if self.patch_size < 2 {
            return Err(anyhow!("Patch size must be at least 2, got {}", self.patch_size));
        }

        if self.n_features > i32::MAX as usize
            || self.n_levels > i32::MAX as usize
            || self.edge_threshold > i32::MAX as usize
            || self.patch_size > i32::MAX as usize
        {
            return Err(anyhow!("Extractor parameters must fit in 32 bits"));
        }

        Ok(())
    }
}
