//! # Keypoint extraction
//!
//! Oriented FAST corners with rotated BRIEF descriptors (ORB), detected over a multi-scale
//! pyramid.

use crate::config::ExtractorConfig;
use crate::frame::Frame;
use crate::prelude::v1::*;
use log::*;
use nalgebra as na;
use opencv::core::{KeyPoint, Mat, Size, Vector, BORDER_DEFAULT};
use opencv::features2d::{ORB_ScoreType, ORB};
use opencv::imgproc;
use opencv::prelude::*;

/// A point of interest in a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// Location in full resolution pixel coordinates.
    pub point: na::Point2<f32>,
    /// Corner response at the detection level.
    pub response: f32,
    /// Orientation in degrees.
    pub angle: f32,
    /// Pyramid level the keypoint was detected at.
    pub octave: i32,
    /// Diameter of the described patch in full resolution pixels.
    pub size: f32,
}

impl From<KeyPoint> for Keypoint {
    fn from(kp: KeyPoint) -> Self {
        let pt = kp.pt();
        Self {
            point: na::Point2::new(pt.x, pt.y),
            response: kp.response(),
            angle: kp.angle(),
            octave: kp.octave(),
            size: kp.size(),
        }
    }
}

/// Keypoints of a single frame, with one descriptor row per keypoint.
#[derive(Clone, Default)]
pub struct KeypointSet {
    keypoints: Vec<Keypoint>,
    descriptors: Mat,
}

impl KeypointSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// 32-byte binary descriptors, one `CV_8U` row per keypoint. Empty if there are no keypoints.
    pub fn descriptors(&self) -> &Mat {
        &self.descriptors
    }

    /// Location of the keypoint at given index.
    pub fn point(&self, idx: usize) -> na::Point2<f32> {
        self.keypoints[idx].point
    }
}

impl std::fmt::Debug for KeypointSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("KeypointSet")
            .field("keypoints", &self.keypoints.len())
            .field("descriptor_rows", &self.descriptors.rows())
            .finish()
    }
}

/// ORB keypoint extractor.
///
/// The OpenCV detector is created per call, so one extractor can be shared between threads.
#[derive(Clone, Debug, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract keypoints from a frame.
    ///
    /// The frame is converted to intensity and smoothed with a 3x3 Gaussian first. An untextured
    /// frame produces an empty set.
    pub fn extract(&self, frame: &Frame) -> Result<KeypointSet> {
        self.extract_gray(&smooth(&frame.to_gray()?)?)
    }

    /// Extract keypoints from an already preprocessed intensity image.
    pub fn extract_gray(&self, gray: &Mat) -> Result<KeypointSet> {
        let c = &self.config;

        let mut orb = ORB::create(
            c.n_features as _,
            c.scale_factor,
            c.n_levels as _,
            c.edge_threshold as _,
            0,
            2,
            ORB_ScoreType::HARRIS_SCORE,
            c.patch_size as _,
            c.fast_threshold as _,
        )?;

        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();

        orb.detect_and_compute(
            gray,
            &Mat::default(),
            &mut keypoints,
            &mut descriptors,
            false,
        )?;

        let keypoints = keypoints.iter().map(Keypoint::from).collect::<Vec<_>>();

        if descriptors.rows() as usize != keypoints.len() {
            return Err(anyhow!(
                "{} descriptors for {} keypoints",
                descriptors.rows(),
                keypoints.len()
            ));
        }

        debug!("extracted {} keypoints", keypoints.len());

        Ok(KeypointSet {
            keypoints,
            descriptors,
        })
    }
}

/// 3x3 Gaussian smoothing applied to every frame before it is analysed.
pub fn smooth(gray: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::gaussian_blur(gray, &mut out, Size::new(3, 3), 0.0, 0.0, BORDER_DEFAULT)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn flat_frame_has_no_keypoints() {
        let frame = flat_frame(120, 90, 128);
        let set = FeatureExtractor::default().extract(&frame).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.descriptors().rows(), 0);
    }

    #[test]
    fn textured_frame_has_keypoints() {
        let frame = textured_frame(200, 150, 0, 0);
        let set = FeatureExtractor::default().extract(&frame).unwrap();
        assert!(set.len() > 20, "only {} keypoints", set.len());
        assert!(set.len() <= 2000);
        assert_eq!(set.descriptors().rows() as usize, set.len());
        assert_eq!(set.descriptors().cols(), 32);

        for kp in set.keypoints() {
            assert!(kp.point.x >= 0.0 && kp.point.x < 200.0);
            assert!(kp.point.y >= 0.0 && kp.point.y < 150.0);
        }
    }

    #[test]
    fn respects_feature_budget() {
        let frame = textured_frame(200, 150, 0, 0);
        let extractor = FeatureExtractor::new(ExtractorConfig::default().n_features(40));
        let set = extractor.extract(&frame).unwrap();
        assert!(set.len() <= 40);
        assert!(!set.is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let frame = textured_frame(200, 150, 3, 5);
        let a = FeatureExtractor::default().extract(&frame).unwrap();
        let b = FeatureExtractor::default().extract(&frame).unwrap();
        assert_eq!(a.keypoints(), b.keypoints());
        assert_eq!(
            a.descriptors().data_bytes().unwrap(),
            b.descriptors().data_bytes().unwrap()
        );
    }

    #[test]
    fn smoothing_averages_neighbours() {
        // 1 pixel wide stripes blur into their mean.
        let data = (0..8 * 6)
            .map(|i| if i % 2 == 0 { 90 } else { 130 })
            .collect();
        let frame = Frame::gray(8, 6, data).unwrap();
        let smooth = smooth(&frame.to_gray().unwrap()).unwrap();
        assert!(smooth.data_bytes().unwrap().iter().all(|&v| v == 110));
    }
}
