//! # Descriptor matching

use crate::prelude::v1::*;
use opencv::core::{DMatch, Mat, Vector, NORM_HAMMING};
use opencv::features2d::BFMatcher;
use opencv::prelude::*;

/// Correspondence between a descriptor of the previous frame and one of the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Index into the previous frame's keypoints.
    pub query_idx: usize,
    /// Index into the current frame's keypoints.
    pub train_idx: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

impl From<DMatch> for Match {
    fn from(m: DMatch) -> Self {
        Self {
            query_idx: m.query_idx as _,
            train_idx: m.train_idx as _,
            distance: m.distance.round() as _,
        }
    }
}

/// Brute-force Hamming matcher with cross-checking.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureMatcher;

impl FeatureMatcher {
    /// Match two descriptor sets.
    ///
    /// A pair is kept only if each side is the other's nearest neighbour. Matches are returned by
    /// ascending distance.
    pub fn match_descriptors(&self, query: &Mat, train: &Mat) -> Result<Vec<Match>> {
        if query.rows() == 0 || train.rows() == 0 {
            return Ok(vec![]);
        }

        let matcher = BFMatcher::new(NORM_HAMMING, true)?;

        let mut raw = Vector::<DMatch>::new();
        matcher.train_match(query, train, &mut raw, &Mat::default())?;

        let mut matches = raw.iter().map(Match::from).collect::<Vec<_>>();
        matches.sort_by_key(|m| (m.distance, m.query_idx, m.train_idx));

        Ok(matches)
    }
}

/// Keeps matches that are close to the best one.
#[derive(Clone, Copy, Debug)]
pub struct GoodMatchFilter {
    /// Absolute upper bound on accepted distances.
    pub ceiling: f64,
    /// Multiple of the best distance that is accepted.
    pub factor: f64,
}

impl Default for GoodMatchFilter {
    fn default() -> Self {
        Self {
            ceiling: 50.0,
            factor: 2.5,
        }
    }
}

impl GoodMatchFilter {
    pub fn ceiling(self, ceiling: f64) -> Self {
        Self { ceiling, ..self }
    }

    pub fn factor(self, factor: f64) -> Self {
        Self { factor, ..self }
    }

    /// Acceptance threshold for a list of matches, `None` if there are no matches.
    pub fn threshold(&self, matches: &[Match]) -> Option<f64> {
        let best = matches.iter().map(|m| m.distance).min()?;
        Some(self.ceiling.min(best as f64 * self.factor))
    }

    /// Filter matches, preserving their order.
    ///
    /// Distances strictly below the threshold are accepted. A zero threshold, which only
    /// occurs when the best match is exact, accepts the exact matches.
    pub fn filter(&self, matches: &[Match]) -> Vec<Match> {
        let threshold = match self.threshold(matches) {
            Some(threshold) => threshold,
            None => return vec![],
        };

        matches
            .iter()
            .filter(|m| {
                let d = m.distance as f64;
                d < threshold || (threshold <= 0.0 && d == 0.0)
            })
            .copied()
            .collect()
    }
}
