//! Geometry aliases shared by every crate in the workspace.
//!
//! All small fixed-size quantities (points, spacings, direction cosines,
//! local Jacobians) are plain nalgebra types.

use nalgebra::{Point as NaPoint, SMatrix, SVector};

pub type Point<const D: usize> = NaPoint<f64, D>;
pub type Vector<const D: usize> = SVector<f64, D>;
pub type Spacing<const D: usize> = SVector<f64, D>;
pub type Direction<const D: usize> = SMatrix<f64, D, D>;
pub type Matrix<const D: usize> = SMatrix<f64, D, D>;

// Common aliases
pub type Point2 = Point<2>;
pub type Point3 = Point<3>;
pub type Vector2 = Vector<2>;
pub type Vector3 = Vector<3>;
pub type Spacing2 = Spacing<2>;
pub type Spacing3 = Spacing<3>;
pub type Direction2 = Direction<2>;
pub type Direction3 = Direction<3>;

/// Spacing with the same value along every axis.
pub fn uniform_spacing<const D: usize>(value: f64) -> Spacing<D> {
    Spacing::<D>::repeat(value)
}

/// Row-major strides for a buffer of the given size (last axis fastest).
pub fn row_major_strides<const D: usize>(size: &[usize; D]) -> [usize; D] {
    let mut strides = [1usize; D];
    for axis in (0..D.saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * size[axis + 1];
    }
    strides
}

/// Flatten a multi-index with the given strides.
pub fn ravel_index<const D: usize>(index: &[usize; D], strides: &[usize; D]) -> usize {
    index.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
}

/// Expand a flat offset into a multi-index for a buffer of the given size.
pub fn unravel_index<const D: usize>(mut linear: usize, size: &[usize; D]) -> [usize; D] {
    let mut index = [0usize; D];
    for axis in (0..D).rev() {
        index[axis] = linear % size[axis];
        linear /= size[axis];
    }
    index
}
