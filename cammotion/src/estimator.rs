//! # Geometric transform estimator

use nalgebra as na;

use crate::prelude::v1::*;

/// Generic frame-to-frame transform estimator.
///
/// Estimators are stateless with respect to the frame sequence, so a single instance may be
/// shared across threads processing independent sequences.
pub trait TransformEstimator: Send + Sync {
    /// Estimate the transform mapping `src` points onto `dst` points.
    ///
    /// Returns `None` if no usable transform exists for the correspondences. This is a
    /// legitimate outcome (degenerate or collinear configurations, too few inliers), not an
    /// error.
    ///
    /// # Arguments
    ///
    /// * `src` - points in the previous frame.
    /// * `dst` - corresponding points in the current frame, aligned with `src`.
    fn estimate(&self, src: &[na::Point2<f32>], dst: &[na::Point2<f32>]) -> Option<Homography>;
}
