//! # Camera movement detection
//!
//! The [`Detector`] walks a frame sequence, comparing every frame against its predecessor. Each
//! transition is scored along one of three [`Route`]s and flagged if its score exceeds the route's
//! threshold.

use crate::fallback::FallbackScorer;
use crate::features;
use crate::prelude::v1::*;
use crate::scoring;
use log::*;
use opencv::core::Mat;
use opencv::prelude::*;
use rayon::prelude::*;

/// Everything retained about a frame while it is the "previous" frame of a transition.
#[derive(Clone)]
pub struct Observation {
    gray: Mat,
    keypoints: KeypointSet,
}

impl Observation {
    /// Smoothed intensity image. Keypoints and fallback signals are both computed on it.
    pub fn gray(&self) -> &Mat {
        &self.gray
    }

    pub fn keypoints(&self) -> &KeypointSet {
        &self.keypoints
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("size", &(self.gray.cols(), self.gray.rows()))
            .field("keypoints", &self.keypoints)
            .finish()
    }
}

/// Geometric outcome of a transition: route, score and fitted transform.
type Geometric = (Route, Signal, Option<Homography>);

/// Pick the final route and score of a transition.
///
/// The geometric score stands if it is available and positive. Otherwise the fallback score is
/// used, keeping whatever transform was fitted.
fn resolve(
    geometric: Option<Geometric>,
    fallback: impl FnOnce() -> f64,
) -> (Route, f64, Option<Homography>) {
    match geometric {
        Some((route, Signal::Computed(score), transform)) if score > 0.0 => {
            (route, score, transform)
        }
        other => {
            let transform = other.and_then(|(_, _, transform)| transform);
            (Route::Fallback, fallback(), transform)
        }
    }
}

/// State carried between frames of a sequence.
#[derive(Clone, Debug, Default)]
pub enum DetectorState {
    #[default]
    AwaitingFirstFrame,
    /// The observation of the last processed frame.
    Comparing(Observation),
}

/// Outcome of a single transition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct MovementRecord {
    /// Non-negative movement score.
    pub score: f64,
    /// Fitted transform, if geometric estimation was attempted and succeeded.
    pub transform: Option<Homography>,
    pub flagged: bool,
    /// Path that produced the score.
    pub route: Route,
    /// Number of matches that passed the good-match filter.
    pub good_matches: usize,
}

/// Result of processing a whole frame sequence.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct DetectionResult {
    records: Vec<MovementRecord>,
    movement_indices: Vec<usize>,
}

impl DetectionResult {
    fn push(&mut self, record: MovementRecord) {
        // Transition i compares frames i and i + 1; the later frame is reported.
        if record.flagged {
            self.movement_indices.push(self.records.len() + 1);
        }
        self.records.push(record);
    }

    /// Records of every transition, in sequence order.
    pub fn records(&self) -> &[MovementRecord] {
        &self.records
    }

    /// Ascending indices of the later frame of every flagged transition.
    pub fn movement_indices(&self) -> &[usize] {
        &self.movement_indices
    }

    pub fn movement_scores(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.score).collect()
    }

    pub fn transformation_matrices(&self) -> Vec<Option<Homography>> {
        self.records.iter().map(|r| r.transform).collect()
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Camera movement detector.
///
/// The detector itself is immutable. Per-sequence state lives in [`DetectorState`], so a single
/// detector can process many sequences concurrently.
#[derive(Clone, Debug)]
pub struct Detector<E = HomographyEstimator> {
    config: DetectorConfig,
    extractor: FeatureExtractor,
    matcher: FeatureMatcher,
    filter: GoodMatchFilter,
    fallback: FallbackScorer,
    estimator: E,
}

impl Detector {
    /// Create a detector with the default homography estimator.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        Self::with_estimator(config, HomographyEstimator::default())
    }
}

impl<E: TransformEstimator> Detector<E> {
    /// Create a detector with a custom transform estimator.
    pub fn with_estimator(config: DetectorConfig, estimator: E) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            extractor: FeatureExtractor::new(config.extractor.clone()),
            matcher: FeatureMatcher,
            filter: GoodMatchFilter::default(),
            fallback: FallbackScorer::default(),
            estimator,
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Convert a frame to smoothed intensity and extract its keypoints.
    pub fn observe(&self, frame: &Frame) -> Result<Observation> {
        let gray = features::smooth(&frame.to_gray()?)?;
        let keypoints = self.extractor.extract_gray(&gray)?;

        Ok(Observation { gray, keypoints })
    }

    /// Score a single transition.
    pub fn compare(&self, prev: &Observation, curr: &Observation) -> Result<MovementRecord> {
        let matches = self.matcher.match_descriptors(
            prev.keypoints.descriptors(),
            curr.keypoints.descriptors(),
        )?;
        let good = self.filter.filter(&matches);

        // Attempted only with enough good matches. Empty keypoint sets never get here.
        let geometric = if good.len() >= self.config.min_match_count {
            let src = good
                .iter()
                .map(|m| prev.keypoints.point(m.query_idx))
                .collect::<Vec<_>>();
            let dst = good
                .iter()
                .map(|m| curr.keypoints.point(m.train_idx))
                .collect::<Vec<_>>();

            let displacements = Displacements::from_pairs(&src, &dst);
            let transform = self.estimator.estimate(&src, &dst);

            let signal = match &transform {
                Some(h) => scoring::homography_score(h, &displacements),
                None => scoring::degenerate_score(&displacements),
            };

            Some((Route::geometric(transform.as_ref()), signal, transform))
        } else {
            None
        };

        let (route, score, transform) =
            resolve(geometric, || self.fallback.score(&prev.gray, &curr.gray));

        let threshold = route.threshold(&self.config);
        let flagged = score > threshold;

        debug!(
            "{} keypoints -> {}, {} matches ({} good), route {route}: score {score:.3} (threshold {threshold})",
            prev.keypoints.len(),
            curr.keypoints.len(),
            matches.len(),
            good.len(),
        );

        Ok(MovementRecord {
            score,
            transform,
            flagged,
            route,
            good_matches: good.len(),
        })
    }

    /// Advance the state machine by one frame.
    ///
    /// The first frame produces no record. Every later frame produces the record of the
    /// transition from its predecessor.
    pub fn step(
        &self,
        state: DetectorState,
        frame: &Frame,
    ) -> Result<(DetectorState, Option<MovementRecord>)> {
        let curr = self.observe(frame)?;

        let record = match &state {
            DetectorState::AwaitingFirstFrame => None,
            DetectorState::Comparing(prev) => Some(self.compare(prev, &curr)?),
        };

        Ok((DetectorState::Comparing(curr), record))
    }

    /// Process a whole frame sequence.
    ///
    /// Fewer than 2 frames yield an empty result. Frames of differing dimensions or pixel
    /// formats are rejected before any processing starts. Errors raised by OpenCV abort the
    /// sequence.
    pub fn detect(&self, frames: &[Frame]) -> Result<DetectionResult> {
        validate_sequence(frames)?;

        let (_, result) = frames.iter().try_fold(
            (DetectorState::AwaitingFirstFrame, DetectionResult::default()),
            |(state, mut result), frame| {
                let (state, record) = self.step(state, frame)?;
                if let Some(record) = record {
                    result.push(record);
                }
                Ok::<_, Error>((state, result))
            },
        )?;

        debug!(
            "{} frames, {} transitions flagged",
            frames.len(),
            result.movement_indices.len()
        );

        Ok(result)
    }

    /// Process independent sequences in parallel.
    pub fn detect_batch<S: AsRef<[Frame]> + Sync>(
        &self,
        sequences: &[S],
    ) -> Vec<Result<DetectionResult>> {
        sequences
            .par_iter()
            .map(|frames| self.detect(frames.as_ref()))
            .collect()
    }
}

/// Check that every frame shares the dimensions and pixel format of the first one.
fn validate_sequence(frames: &[Frame]) -> Result<()> {
    let first = match frames.first() {
        Some(first) => first,
        None => return Ok(()),
    };

    for (i, frame) in frames.iter().enumerate().skip(1) {
        if frame.dim() != first.dim() {
            warn!("rejecting sequence: frame {i} has mismatching dimensions");
            return Err(anyhow!(
                "Frame {} is {:?}, expected {:?}",
                i,
                frame.dim(),
                first.dim()
            ));
        }

        if frame.format() != first.format() {
            warn!("rejecting sequence: frame {i} has mismatching pixel format");
            return Err(anyhow!(
                "Frame {} has pixel format {:?}, expected {:?}",
                i,
                frame.format(),
                first.format()
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    struct NoTransform;

    impl TransformEstimator for NoTransform {
        fn estimate(
            &self,
            _: &[nalgebra::Point2<f32>],
            _: &[nalgebra::Point2<f32>],
        ) -> Option<Homography> {
            None
        }
    }

    fn detector() -> Detector {
        Detector::new(DetectorConfig::default()).unwrap()
    }

    #[test]
    fn state_machine() {
        let detector = detector();
        let frame = flat_frame(48, 48, 100);

        let (state, record) = detector.step(DetectorState::default(), &frame).unwrap();
        assert!(record.is_none());
        assert!(matches!(state, DetectorState::Comparing(_)));

        let (state, record) = detector.step(state, &frame).unwrap();
        assert!(record.is_some());
        assert!(matches!(state, DetectorState::Comparing(_)));
    }

    #[test]
    fn homography_route() {
        let detector = detector();
        let prev = detector.observe(&textured_frame(200, 150, 12, 8)).unwrap();
        let curr = detector.observe(&textured_frame(200, 150, 0, 0)).unwrap();

        let record = detector.compare(&prev, &curr).unwrap();

        assert_eq!(record.route, Route::Homography);
        assert!(record.transform.is_some());
        assert!(record.flagged);
    }

    #[test]
    fn degenerate_route() {
        let detector = Detector::with_estimator(DetectorConfig::default(), NoTransform).unwrap();
        let prev = detector.observe(&textured_frame(200, 150, 12, 8)).unwrap();
        let curr = detector.observe(&textured_frame(200, 150, 0, 0)).unwrap();

        let record = detector.compare(&prev, &curr).unwrap();

        assert_eq!(record.route, Route::DegenerateHomography);
        assert_eq!(record.transform, None);
        // Median displacement is about 14.4, above the relaxed threshold of 7.5.
        assert!(record.flagged, "score {}", record.score);
    }

    #[test]
    fn fallback_route() {
        let detector = detector();
        let prev = detector.observe(&flat_frame(64, 64, 60)).unwrap();
        let curr = detector.observe(&flat_frame(64, 64, 180)).unwrap();

        assert!(prev.keypoints().is_empty());

        let record = detector.compare(&prev, &curr).unwrap();

        assert_eq!(record.route, Route::Fallback);
        assert_eq!(record.good_matches, 0);
        assert!(record.flagged);
    }

    #[test]
    fn zero_geometric_score_falls_back_keeping_transform() {
        let identity = Some(Homography::identity());

        let (route, score, transform) =
            resolve(Some((Route::Homography, Signal::Computed(0.0), identity)), || 3.0);
        assert_eq!((route, score, transform), (Route::Fallback, 3.0, identity));

        let (route, score, transform) =
            resolve(Some((Route::DegenerateHomography, Signal::Unavailable, None)), || 1.0);
        assert_eq!((route, score, transform), (Route::Fallback, 1.0, None));

        let (route, score, transform) = resolve(None, || 0.5);
        assert_eq!((route, score, transform), (Route::Fallback, 0.5, None));

        let (route, score, transform) =
            resolve(Some((Route::Homography, Signal::Computed(2.0), identity)), || {
                unreachable!()
            });
        assert_eq!((route, score, transform), (Route::Homography, 2.0, identity));
    }

    #[test]
    fn fallback_compares_smoothed_frames() {
        // 1 pixel wide vertical stripes, shifted by one pixel. Every raw pixel changes by 40,
        // but after the 3x3 Gaussian both frames are a uniform 110.
        let stripes = |shift: usize| {
            from_fn(120, 90, move |x, _| if (x + shift) % 2 == 0 { 90 } else { 130 })
        };

        let (a, b) = (stripes(0), stripes(1));

        let raw = FallbackScorer::default().score(&gray(&a), &gray(&b));
        assert!(raw > 100.0, "raw score {raw}");

        let detector = detector();
        let prev = detector.observe(&a).unwrap();
        let curr = detector.observe(&b).unwrap();

        let record = detector.compare(&prev, &curr).unwrap();

        assert_eq!(record.route, Route::Fallback);
        assert_eq!(record.score, 0.0);
        assert!(!record.flagged);
    }

    #[test]
    fn rejects_mixed_sequences() {
        let detector = detector();

        let sizes = vec![flat_frame(32, 32, 0), flat_frame(32, 16, 0)];
        assert!(detector.detect(&sizes).is_err());

        let formats = vec![
            flat_frame(8, 8, 0),
            Frame::rgb(8, 8, vec![0; 8 * 8 * 3]).unwrap(),
        ];
        assert!(detector.detect(&formats).is_err());
    }

    #[test]
    fn result_indices_follow_flags() {
        let mut result = DetectionResult::default();

        for flagged in [false, true, false, true] {
            result.push(MovementRecord {
                score: if flagged { 10.0 } else { 0.0 },
                transform: None,
                flagged,
                route: Route::Fallback,
                good_matches: 0,
            });
        }

        assert_eq!(result.movement_indices(), &[2, 4]);
        assert_eq!(result.movement_scores(), vec![0.0, 10.0, 0.0, 10.0]);
        assert_eq!(result.transformation_matrices(), vec![None; 4]);
    }
}
