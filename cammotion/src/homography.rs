//! # Homography estimation
//!
//! Projective transforms between frames, fitted robustly from point correspondences.

use crate::prelude::v1::*;
use log::*;
use nalgebra as na;
use opencv::calib3d::{find_homography_ext, RANSAC};
use opencv::core::{count_non_zero, Mat, Point2f};
use opencv::prelude::*;

/// Minimal number of correspondences defining a homography.
const MIN_SAMPLES: usize = 4;

/// A projective transform between two frames.
///
/// Maps points of the previous frame to the current frame. The matrix is always finite,
/// non-singular and normalized so that `H[2,2] == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(into = "[[f64; 3]; 3]", try_from = "[[f64; 3]; 3]")
)]
pub struct Homography(na::Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(na::Matrix3::identity())
    }

    /// Create a homography from a matrix.
    ///
    /// Returns `None` if the matrix is not finite, singular, or can not be normalized.
    pub fn from_matrix(m: na::Matrix3<f64>) -> Option<Self> {
        let scale = m[(2, 2)];

        if !scale.is_finite() || scale.abs() <= f64::EPSILON {
            return None;
        }

        let m = m / scale;

        if m.iter().any(|v| !v.is_finite()) || m.determinant().abs() <= 1e-12 {
            return None;
        }

        Some(Self(m))
    }

    /// Create a homography from row-major entries.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Option<Self> {
        Self::from_matrix(na::Matrix3::from_fn(|r, c| rows[r][c]))
    }

    pub fn matrix(&self) -> &na::Matrix3<f64> {
        &self.0
    }

    /// Row-major entries.
    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Translation component `(H[0,2], H[1,2])`.
    pub fn translation(&self) -> na::Vector2<f64> {
        na::Vector2::new(self.0[(0, 2)], self.0[(1, 2)])
    }

    /// In-plane rotation in radians.
    pub fn rotation(&self) -> f64 {
        self.0[(1, 0)].atan2(self.0[(0, 0)])
    }

    pub fn scale_x(&self) -> f64 {
        self.0[(0, 0)].hypot(self.0[(1, 0)])
    }

    pub fn scale_y(&self) -> f64 {
        self.0[(0, 1)].hypot(self.0[(1, 1)])
    }

    /// Scale averaged across both axes.
    pub fn scale(&self) -> f64 {
        (self.scale_x() + self.scale_y()) * 0.5
    }

    /// Perspective distortion `|H[2,0]| + |H[2,1]|`.
    pub fn perspective(&self) -> f64 {
        self.0[(2, 0)].abs() + self.0[(2, 1)].abs()
    }

    /// Map a point through the homography.
    ///
    /// Returns `None` if the point lands on the line at infinity.
    pub fn transform_point(&self, p: &na::Point2<f64>) -> Option<na::Point2<f64>> {
        let v = self.0 * na::Vector3::new(p.x, p.y, 1.0);

        if v.z.abs() <= f64::EPSILON {
            None
        } else {
            Some(na::Point2::new(v.x / v.z, v.y / v.z))
        }
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.rows()
    }
}

impl TryFrom<[[f64; 3]; 3]> for Homography {
    type Error = Error;

    fn try_from(rows: [[f64; 3]; 3]) -> Result<Self> {
        Self::from_rows(rows).ok_or_else(|| anyhow!("Not a valid homography: {:?}", rows))
    }
}

/// RANSAC homography estimator.
///
/// Uses OpenCV's implementation of robust homography fitting, which is deterministic for a given
/// set of correspondences.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HomographyEstimator {
    /// Maximum reprojection error, in pixels, for a correspondence to count as an inlier.
    pub reproj_threshold: f64,
    pub max_iters: usize,
    /// Probability of having drawn at least one outlier-free sample when stopping early.
    pub confidence: f64,
}

impl Default for HomographyEstimator {
    fn default() -> Self {
        Self {
            reproj_threshold: 3.0,
            max_iters: 1000,
            confidence: 0.995,
        }
    }
}

impl HomographyEstimator {
    pub fn reproj_threshold(self, reproj_threshold: f64) -> Self {
        Self {
            reproj_threshold,
            ..self
        }
    }

    pub fn max_iters(self, max_iters: usize) -> Self {
        Self { max_iters, ..self }
    }

    pub fn confidence(self, confidence: f64) -> Self {
        Self { confidence, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.reproj_threshold.is_finite() && self.reproj_threshold > 0.0) {
            return Err(anyhow!(
                "Reprojection threshold must be positive, got {}",
                self.reproj_threshold
            ));
        }

        if self.max_iters == 0 || self.max_iters > i32::MAX as usize {
            return Err(anyhow!(
                "max_iters must be within [1; {}], got {}",
                i32::MAX,
                self.max_iters
            ));
        }

        if !(0.0..1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "Confidence must be within [0; 1), got {}",
                self.confidence
            ));
        }

        Ok(())
    }

    /// Fit a homography, `None` if OpenCV finds no model.
    fn homography(
        &self,
        src: &[na::Point2<f32>],
        dst: &[na::Point2<f32>],
    ) -> Result<Option<Homography>> {
        let p1 = src.iter().map(|p| Point2f::new(p.x, p.y)).collect::<Vec<_>>();
        let p2 = dst.iter().map(|p| Point2f::new(p.x, p.y)).collect::<Vec<_>>();

        let p1 = Mat::from_slice(&*p1)?;
        let p2 = Mat::from_slice(&*p2)?;

        let mut inliers = Mat::default();

        let h = find_homography_ext(
            &p1,
            &p2,
            RANSAC,
            self.reproj_threshold,
            &mut inliers,
            self.max_iters as _,
            self.confidence,
        )?;

        if h.rows() != 3 || h.cols() != 3 {
            trace!("no homography for {} correspondences", src.len());
            return Ok(None);
        }

        trace!(
            "homography: {} of {} inliers",
            count_non_zero(&inliers)?,
            src.len()
        );

        let mut rows = [[0f64; 3]; 3];

        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = *h.at_2d::<f64>(r as _, c as _)?;
            }
        }

        Ok(Homography::from_rows(rows))
    }
}

impl TransformEstimator for HomographyEstimator {
    fn estimate(&self, src: &[na::Point2<f32>], dst: &[na::Point2<f32>]) -> Option<Homography> {
        if src.len() < MIN_SAMPLES || dst.len() != src.len() {
            return None;
        }

        match self.homography(src, dst) {
            Ok(h) => h,
            Err(e) => {
                warn!("homography estimation failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn grid() -> Vec<na::Point2<f32>> {
        (0..8)
            .flat_map(|y| (0..10).map(move |x| na::Point2::new(20.0 + x as f32 * 23.0, 15.0 + y as f32 * 19.0)))
            .collect()
    }

    #[test]
    fn recovers_known_homography_with_outliers() {
        let truth = Homography::from_rows([
            [1.02, 0.03, 12.0],
            [-0.02, 0.99, -7.0],
            [1e-5, 2e-5, 1.0],
        ])
        .unwrap();

        let src = grid();
        let mut dst = src
            .iter()
            .map(|p| truth.transform_point(&p.cast()).unwrap().cast::<f32>())
            .collect::<Vec<_>>();

        // Corrupt every fifth correspondence.
        for (i, p) in dst.iter_mut().enumerate().filter(|(i, _)| i % 5 == 0) {
            p.x += 30.0 + (i % 7) as f32 * 5.0;
            p.y -= 25.0 + (i % 3) as f32 * 9.0;
        }

        let h = HomographyEstimator::default().estimate(&src, &dst).unwrap();

        for (i, p) in src.iter().enumerate().filter(|(i, _)| i % 5 != 0) {
            let expected = truth.transform_point(&p.cast()).unwrap();
            let got = h.transform_point(&p.cast()).unwrap();
            assert!((expected - got).norm() < 0.05, "point {i}: {expected} vs {got}");
        }

        assert_approx_eq!(h.matrix()[(2, 2)], 1.0);
    }

    #[test]
    fn pure_translation() {
        let src = grid();
        let dst = src
            .iter()
            .map(|p| na::Point2::new(p.x + 12.0, p.y + 8.0))
            .collect::<Vec<_>>();

        let h = HomographyEstimator::default().estimate(&src, &dst).unwrap();

        assert_approx_eq!(h.translation().x, 12.0, 1e-3);
        assert_approx_eq!(h.translation().y, 8.0, 1e-3);
        assert_approx_eq!(h.rotation(), 0.0, 1e-4);
        assert_approx_eq!(h.scale(), 1.0, 1e-4);
    }

    #[test]
    fn collinear_points_have_no_homography() {
        let src = (0..20)
            .map(|i| na::Point2::new(i as f32 * 5.0, i as f32 * 10.0 + 1.0))
            .collect::<Vec<_>>();
        let dst = src
            .iter()
            .map(|p| na::Point2::new(p.x + 3.0, p.y))
            .collect::<Vec<_>>();

        assert_eq!(HomographyEstimator::default().estimate(&src, &dst), None);
    }

    #[test]
    fn too_few_points() {
        let src = grid()[..3].to_vec();
        assert_eq!(HomographyEstimator::default().estimate(&src, &src), None);
    }

    #[test]
    fn decomposition() {
        let (s, c) = 0.1f64.sin_cos();
        let h = Homography::from_rows([
            [2.0 * c, -2.0 * s, 5.0],
            [2.0 * s, 2.0 * c, -4.0],
            [0.001, -0.002, 1.0],
        ])
        .unwrap();

        assert_approx_eq!(h.rotation(), 0.1);
        assert_approx_eq!(h.scale_x(), 2.0);
        assert_approx_eq!(h.scale_y(), 2.0);
        assert_approx_eq!(h.perspective(), 0.003);
        assert_eq!(h.translation(), na::Vector2::new(5.0, -4.0));
    }

    #[test]
    fn rejects_invalid_matrices() {
        assert_eq!(Homography::from_matrix(na::Matrix3::zeros()), None);
        assert_eq!(
            Homography::from_rows([[1.0, 2.0, 0.0], [2.0, 4.0, 0.0], [0.0, 0.0, 1.0]]),
            None
        );
        assert_eq!(
            Homography::from_rows([[f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
            None
        );

        let h = Homography::from_rows([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]]).unwrap();
        assert_eq!(h, Homography::identity());
    }
}
