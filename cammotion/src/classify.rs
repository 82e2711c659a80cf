//! # Movement classification
//!
//! Human-readable breakdown of a transform, for reporting.

use crate::prelude::v1::*;

/// Kind of the dominant camera movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum MovementKind {
    Translation,
    Rotation,
    Scaling,
    Perspective,
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Self::Translation => "translation",
            Self::Rotation => "rotation",
            Self::Scaling => "scaling",
            Self::Perspective => "perspective",
        };
        write!(f, "{name}")
    }
}

/// Components of a transform.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct MovementBreakdown {
    pub translation_x: f64,
    pub translation_y: f64,
    pub rotation_degrees: f64,
    /// Scale averaged across both axes.
    pub scaling: f64,
    pub perspective: f64,
}

impl Default for MovementBreakdown {
    fn default() -> Self {
        Self {
            translation_x: 0.0,
            translation_y: 0.0,
            rotation_degrees: 0.0,
            scaling: 1.0,
            perspective: 0.0,
        }
    }
}

impl MovementBreakdown {
    /// Comparable magnitudes of every movement kind.
    pub fn magnitudes(&self) -> [(MovementKind, f64); 4] {
        [
            (
                MovementKind::Translation,
                self.translation_x.abs() + self.translation_y.abs(),
            ),
            (MovementKind::Rotation, self.rotation_degrees.abs()),
            (MovementKind::Scaling, (self.scaling - 1.0).abs() * 100.0),
            (MovementKind::Perspective, self.perspective * 10.0),
        ]
    }

    /// The movement kind with the largest magnitude. Earlier kinds win ties.
    pub fn dominant(&self) -> MovementKind {
        self.magnitudes()
            .into_iter()
            .fold(None, |best: Option<(MovementKind, f64)>, (kind, m)| match best {
                Some((_, bm)) if bm >= m => best,
                _ => Some((kind, m)),
            })
            .map(|(kind, _)| kind)
            .unwrap_or(MovementKind::Translation)
    }
}

/// Decompose a transform. An absent transform yields the neutral breakdown.
pub fn classify(transform: Option<&Homography>) -> MovementBreakdown {
    match transform {
        Some(h) => {
            let t = h.translation();
            MovementBreakdown {
                translation_x: t.x,
                translation_y: t.y,
                rotation_degrees: h.rotation().to_degrees(),
                scaling: h.scale(),
                perspective: h.perspective(),
            }
        }
        None => Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn absent_transform() {
        let b = classify(None);
        assert_eq!(b, MovementBreakdown::default());
        assert_eq!(b.scaling, 1.0);
        assert_eq!(b.dominant(), MovementKind::Translation);
    }

    #[test]
    fn rotation_in_degrees() {
        let (s, c) = 10f64.to_radians().sin_cos();
        let h = Homography::from_rows([[c, -s, 1.0], [s, c, 2.0], [0.0, 0.0, 1.0]]).unwrap();
        let b = classify(Some(&h));

        assert_approx_eq!(b.rotation_degrees, 10.0);
        assert_approx_eq!(b.scaling, 1.0);
        assert_eq!((b.translation_x, b.translation_y), (1.0, 2.0));
        assert_eq!(b.dominant(), MovementKind::Rotation);
    }

    #[test]
    fn dominant_uses_weighted_magnitudes() {
        let b = MovementBreakdown {
            translation_x: 2.0,
            translation_y: -1.0,
            rotation_degrees: 1.0,
            scaling: 1.05,
            perspective: 0.0,
        };
        assert_eq!(b.dominant(), MovementKind::Scaling);

        let b = MovementBreakdown {
            perspective: 0.6,
            ..b
        };
        assert_eq!(b.dominant(), MovementKind::Perspective);

        let tie = MovementBreakdown {
            translation_x: 3.0,
            rotation_degrees: 3.0,
            ..Default::default()
        };
        assert_eq!(tie.dominant(), MovementKind::Translation);
    }
}
