//! Transform trait for spatial coordinate transformations.
//!
//! Transforms are stateless with respect to their parameters: every
//! evaluation receives the parameter vector explicitly, so the same transform
//! object can be queried at many candidate parameters by an optimizer.

use crate::error::{GeometryError, Result};
use crate::geometry::{Point, Vector};

/// Sparse derivative of a transformed point with respect to the parameters.
///
/// `columns[j]` is `dT(x)/dp[indices[j]]`. Parameters not listed have a zero
/// derivative at this point.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterJacobian<const D: usize> {
    pub indices: Vec<usize>,
    pub columns: Vec<Vector<D>>,
}

impl<const D: usize> ParameterJacobian<D> {
    pub fn new(indices: Vec<usize>, columns: Vec<Vector<D>>) -> Self {
        debug_assert_eq!(indices.len(), columns.len());
        Self { indices, columns }
    }

    /// Number of non-zero columns.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Add `scale * J^T * v` into a dense gradient.
    pub fn accumulate_transpose(&self, v: &Vector<D>, scale: f64, gradient: &mut [f64]) {
        for (&index, column) in self.indices.iter().zip(&self.columns) {
            gradient[index] += scale * column.dot(v);
        }
    }
}

/// Transform parameterised by a flat `f64` vector.
///
/// # Type Parameters
/// * `D` - The spatial dimensionality
pub trait ParametricTransform<const D: usize>: Send + Sync {
    /// Length of the parameter vector.
    fn number_of_parameters(&self) -> usize;

    /// Map a point with the given parameters.
    fn transform_point(&self, parameters: &[f64], point: &Point<D>) -> Point<D>;

    /// Derivative of the mapped point with respect to the parameters.
    fn jacobian(&self, parameters: &[f64], point: &Point<D>) -> ParameterJacobian<D>;

    /// Parameters that can influence the mapping of `point`.
    fn nonzero_jacobian_indices(&self, point: &Point<D>) -> Vec<usize> {
        let _ = point;
        (0..self.number_of_parameters()).collect()
    }

    /// Parameters mapping every point to itself.
    fn identity_parameters(&self) -> Vec<f64> {
        vec![0.0; self.number_of_parameters()]
    }

    /// Check the length of a parameter vector.
    fn validate_parameters(&self, parameters: &[f64]) -> Result<()> {
        let expected = self.number_of_parameters();
        if parameters.len() != expected {
            return Err(GeometryError::DimensionMismatch {
                expected,
                actual: parameters.len(),
            });
        }
        Ok(())
    }
}
