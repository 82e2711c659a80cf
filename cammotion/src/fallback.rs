//! # Geometry-free fallback signals
//!
//! Used when a transition can not be scored from a fitted transform. Every signal works directly
//! on the smoothed intensity frames and degrades to [`Signal::Unavailable`] instead of failing.

use crate::prelude::v1::*;
use crate::{scoring, utils};
use log::*;
use opencv::core::{
    absdiff, count_non_zero, mean, Mat, Point2f, Size, TermCriteria, TermCriteria_COUNT,
    TermCriteria_EPS, Vector,
};
use opencv::imgproc::{canny, good_features_to_track, threshold, THRESH_BINARY};
use opencv::prelude::*;
use opencv::video::calc_optical_flow_pyr_lk;

/// Scorer combining global difference, sparse flow and edge motion signals.
#[derive(Clone, Copy, Debug)]
pub struct FallbackScorer {
    /// Per-pixel difference above which a pixel counts as changed.
    pub diff_threshold: f64,
    /// Maximum number of corners tracked by the flow signal.
    pub max_corners: usize,
    /// Minimal corner quality, relative to the best corner.
    pub quality_level: f64,
    /// Minimal distance between tracked corners.
    pub min_distance: f64,
    /// Corners required before tracking is attempted (exclusive).
    pub min_corners: usize,
    /// Successful tracks required for the flow signal (inclusive).
    pub min_tracked: usize,
    /// Side of the Lucas-Kanade search window.
    pub window: usize,
    /// Number of pyramid levels above full resolution used for tracking.
    pub max_level: usize,
    /// Hysteresis thresholds of the edge detector.
    pub canny_low: f64,
    pub canny_high: f64,
}

impl Default for FallbackScorer {
    fn default() -> Self {
        Self {
            diff_threshold: 25.0,
            max_corners: 100,
            quality_level: 0.01,
            min_distance: 10.0,
            min_corners: 10,
            min_tracked: 6,
            window: 21,
            max_level: 3,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

/// Individual fallback signals of a transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallbackSignals {
    pub global_difference: Signal,
    pub sparse_flow: Signal,
    pub edge_motion: Signal,
}

impl FallbackSignals {
    /// Maximum of the three signals.
    pub fn fused(&self) -> f64 {
        scoring::fuse([self.global_difference, self.sparse_flow, self.edge_motion])
    }
}

fn same_size(a: &Mat, b: &Mat) -> bool {
    a.rows() > 0 && a.cols() > 0 && a.rows() == b.rows() && a.cols() == b.cols()
}

/// Collapse a fallible computation into a signal. Errors are logged, not propagated.
fn signal(name: &str, value: Result<Option<f64>>) -> Signal {
    match value {
        Ok(v) => v.into(),
        Err(e) => {
            warn!("{name} signal failed: {e}");
            Signal::Unavailable
        }
    }
}

impl FallbackScorer {
    /// Compute all three signals.
    pub fn signals(&self, prev: &Mat, curr: &Mat) -> FallbackSignals {
        let signals = FallbackSignals {
            global_difference: self.global_difference(prev, curr),
            sparse_flow: self.sparse_flow(prev, curr),
            edge_motion: self.edge_motion(prev, curr),
        };

        trace!("fallback signals: {:?}", signals);

        signals
    }

    /// Fused fallback score.
    pub fn score(&self, prev: &Mat, curr: &Mat) -> f64 {
        self.signals(prev, curr).fused()
    }

    /// Percentage of changed pixels, plus a tenth of the mean absolute difference.
    pub fn global_difference(&self, prev: &Mat, curr: &Mat) -> Signal {
        if !same_size(prev, curr) {
            return Signal::Unavailable;
        }

        signal("global difference", self.difference(prev, curr))
    }

    fn difference(&self, prev: &Mat, curr: &Mat) -> Result<Option<f64>> {
        let mut diff = Mat::default();
        absdiff(prev, curr, &mut diff)?;

        let mut changed = Mat::default();
        threshold(&diff, &mut changed, self.diff_threshold, 255.0, THRESH_BINARY)?;

        let total = diff.rows() as f64 * diff.cols() as f64;
        let percentage = count_non_zero(&changed)? as f64 / total * 100.0;

        let mean_diff = mean(&diff, &Mat::default())?.0[0];

        Ok(Some(percentage + mean_diff * 0.1))
    }

    /// Three times the median displacement of corners tracked from `prev` into `curr`.
    pub fn sparse_flow(&self, prev: &Mat, curr: &Mat) -> Signal {
        if !same_size(prev, curr) {
            return Signal::Unavailable;
        }

        signal("sparse flow", self.flow(prev, curr))
    }

    fn flow(&self, prev: &Mat, curr: &Mat) -> Result<Option<f64>> {
        let mut corners = Vector::<Point2f>::new();

        good_features_to_track(
            prev,
            &mut corners,
            self.max_corners as _,
            self.quality_level,
            self.min_distance,
            &Mat::default(),
            3,
            false,
            0.04,
        )?;

        if corners.len() <= self.min_corners {
            trace!("{} corners, not tracking", corners.len());
            return Ok(None);
        }

        let mut tracked = Vector::<Point2f>::new();
        let mut status = Vector::<u8>::new();
        let mut err = Vector::<f32>::new();

        calc_optical_flow_pyr_lk(
            prev,
            curr,
            &corners,
            &mut tracked,
            &mut status,
            &mut err,
            Size::new(self.window as _, self.window as _),
            self.max_level as _,
            TermCriteria::new(TermCriteria_COUNT + TermCriteria_EPS, 30, 0.01)?,
            0,
            1e-4,
        )?;

        let displacements = corners
            .iter()
            .zip(tracked.iter())
            .zip(status.iter())
            .filter(|(_, s)| *s == 1)
            .map(|((p, t), _)| ((t.x - p.x) as f64).hypot((t.y - p.y) as f64))
            .collect::<Vec<_>>();

        if displacements.len() < self.min_tracked {
            trace!("{} of {} corners tracked", displacements.len(), corners.len());
            return Ok(None);
        }

        Ok(utils::median(&displacements).map(|m| m * 3.0))
    }

    /// Half the mean absolute difference of the two edge maps.
    pub fn edge_motion(&self, prev: &Mat, curr: &Mat) -> Signal {
        if !same_size(prev, curr) {
            return Signal::Unavailable;
        }

        signal("edge motion", self.edges(prev, curr))
    }

    fn edges(&self, prev: &Mat, curr: &Mat) -> Result<Option<f64>> {
        let mut edges_prev = Mat::default();
        let mut edges_curr = Mat::default();

        canny(prev, &mut edges_prev, self.canny_low, self.canny_high, 3, false)?;
        canny(curr, &mut edges_curr, self.canny_low, self.canny_high, 3, false)?;

        let mut diff = Mat::default();
        absdiff(&edges_prev, &edges_curr, &mut diff)?;

        Ok(Some(mean(&diff, &Mat::default())?.0[0] * 0.5))
    }
}
