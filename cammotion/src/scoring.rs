//! # Movement scoring
//!
//! Turns a fitted transform, or the displacements of matched points, into a single movement score.

use crate::prelude::v1::*;

const TRANSLATION_WEIGHT: f64 = 1.5;
const ROTATION_WEIGHT: f64 = 30.0;
const SCALE_WEIGHT: f64 = 50.0;
const PERSPECTIVE_WEIGHT: f64 = 20.0;
const VARIANCE_WEIGHT: f64 = 0.1;

/// Relaxation applied to the homography threshold when only matched displacements are known.
pub const DEGENERATE_RELAXATION: f64 = 0.5;

/// Outcome of a single scoring computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Signal {
    /// A finite, non-negative score.
    Computed(f64),
    /// The computation was degenerate (no data, singular or non-finite intermediate).
    Unavailable,
}

impl Signal {
    /// Wrap a raw value, rejecting non-finite and negative ones.
    pub fn new(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            Self::Computed(value)
        } else {
            Self::Unavailable
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Self::Computed(v) => Some(v),
            Self::Unavailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// Score with unavailable signals counting as zero.
    pub fn collapse(self) -> f64 {
        self.value().unwrap_or(0.0)
    }
}

impl From<Option<f64>> for Signal {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::new).unwrap_or(Self::Unavailable)
    }
}

/// Fuse signals by taking the maximum, with unavailable signals collapsed to zero.
pub fn fuse(signals: impl IntoIterator<Item = Signal>) -> f64 {
    signals
        .into_iter()
        .map(Signal::collapse)
        .fold(0.0, f64::max)
}

/// The scoring path taken for a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Route {
    /// A transform was fitted and decomposed.
    Homography,
    /// Enough matches, but no transform could be fitted.
    DegenerateHomography,
    /// Geometry-free signals on the smoothed intensity frames.
    Fallback,
}

impl Route {
    /// Geometric route for an estimation outcome.
    pub fn geometric(transform: Option<&Homography>) -> Self {
        match transform {
            Some(_) => Self::Homography,
            None => Self::DegenerateHomography,
        }
    }

    /// Score above which a transition scored by this route is flagged.
    pub fn threshold(self, config: &DetectorConfig) -> f64 {
        match self {
            Self::Homography => config.homography_threshold,
            Self::DegenerateHomography => config.homography_threshold * DEGENERATE_RELAXATION,
            Self::Fallback => config.feature_threshold,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Self::Homography => "homography",
            Self::DegenerateHomography => "degenerate",
            Self::Fallback => "fallback",
        };
        write!(f, "{name}")
    }
}

/// Weighted decomposition of a fitted transform.
///
/// Displacement variance only contributes with at least 2 correspondences.
pub fn homography_score(h: &Homography, displacements: &Displacements) -> Signal {
    let translation = h.translation().norm();
    let rotation = h.rotation().abs();
    let scale = (1.0 - h.scale()).abs();
    let perspective = h.perspective();

    let variance = if displacements.len() >= 2 {
        match displacements.variance() {
            Some(v) => v,
            None => return Signal::Unavailable,
        }
    } else {
        0.0
    };

    Signal::new(
        translation * TRANSLATION_WEIGHT
            + rotation * ROTATION_WEIGHT
            + scale * SCALE_WEIGHT
            + perspective * PERSPECTIVE_WEIGHT
            + variance * VARIANCE_WEIGHT,
    )
}

/// Median displacement plus weighted variance, for when no transform could be fitted.
pub fn degenerate_score(displacements: &Displacements) -> Signal {
    let median = match displacements.median() {
        Some(m) => m,
        None => return Signal::Unavailable,
    };

    let variance = if displacements.len() >= 2 {
        match displacements.variance() {
            Some(v) => v,
            None => return Signal::Unavailable,
        }
    } else {
        0.0
    };

    Signal::new(median + variance * VARIANCE_WEIGHT)
}
