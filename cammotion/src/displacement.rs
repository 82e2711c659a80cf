//! # Point pair displacements

use crate::utils;
use nalgebra::*;

/// Displacement vectors between matched point pairs.
///
/// The vectors are stored column-wise, one column per correspondence.
#[derive(Clone, Debug)]
pub struct Displacements {
    vf: Matrix2xX<f32>,
}

impl Displacements {
    /// Collect displacements from aligned source and destination points.
    ///
    /// # Arguments
    ///
    /// * `src` - points in the previous frame.
    /// * `dst` - corresponding points in the current frame.
    pub fn from_pairs(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Self {
        let columns = src.iter().zip(dst).map(|(s, d)| d - s).collect::<Vec<_>>();

        Self {
            vf: Matrix2xX::from_iterator(columns.len(), columns.iter().flat_map(|m| [m.x, m.y])),
        }
    }

    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.vf.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the displacement vectors.
    pub fn iter(&self) -> impl Iterator<Item = Vector2<f32>> + '_ {
        self.vf.column_iter().map(|c| c.into_owned())
    }

    /// Euclidean length of every displacement.
    pub fn magnitudes(&self) -> Vec<f64> {
        self.iter().map(|v| v.magnitude() as f64).collect()
    }

    /// Median displacement length.
    pub fn median(&self) -> Option<f64> {
        utils::median(&self.magnitudes())
    }

    /// Population variance of displacement lengths.
    pub fn variance(&self) -> Option<f64> {
        utils::variance(&self.magnitudes())
    }
}
