//! # Camera Movement Detection Library
//!
//! This library decides, for an ordered sequence of frames, which frame-to-frame transitions are
//! caused by the camera itself moving (pan, tilt, shake, zoom), as opposed to objects moving
//! within a static scene.
//!
//! Every transition is scored either by decomposing a robustly fitted homography, or, when
//! geometry is unavailable, by a set of geometry-free fallback signals.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use cammotion::prelude::v1::*;
//!
//! let frames = vec![
//!     Frame::gray(32, 32, vec![0; 32 * 32]).unwrap(),
//!     Frame::gray(32, 32, vec![255; 32 * 32]).unwrap(),
//! ];
//!
//! let detector = Detector::new(DetectorConfig::default()).unwrap();
//! let result = detector.detect(&frames).unwrap();
//!
//! assert_eq!(result.movement_indices(), &[1]);
//! ```
//!
//! Image processing is done with [`opencv`](https://crates.io/crates/opencv). You may need
//! [`nalgebra`](https://crates.io/crates/nalgebra) to make use of the transforms.

pub mod classify;
pub mod config;
pub mod detection;
pub mod displacement;
pub mod estimator;
pub mod fallback;
pub mod features;
pub mod frame;
pub mod homography;
pub mod matcher;
pub mod scoring;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            classify::{classify, MovementBreakdown, MovementKind},
            config::{DetectorConfig, ExtractorConfig},
            detection::{DetectionResult, Detector, DetectorState, MovementRecord, Observation},
            displacement::Displacements,
            estimator::TransformEstimator,
            features::{FeatureExtractor, Keypoint, KeypointSet},
            frame::{Frame, PixelFormat},
            homography::{Homography, HomographyEstimator},
            matcher::{FeatureMatcher, GoodMatchFilter, Match},
            scoring::{Route, Signal},
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
