//! Translation transform implementation.

use super::trait_::{ParameterJacobian, ParametricTransform};
use crate::geometry::{Point, Vector};

/// Simple Translation Transform.
///
/// Translates points by the parameter vector `[t_0, .., t_{D-1}]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TranslationTransform<const D: usize>;

impl<const D: usize> TranslationTransform<D> {
    pub fn new() -> Self {
        Self
    }
}

impl<const D: usize> ParametricTransform<D> for TranslationTransform<D> {
    fn number_of_parameters(&self) -> usize {
        D
    }

    fn transform_point(&self, parameters: &[f64], point: &Point<D>) -> Point<D> {
        point + Vector::<D>::from_fn(|axis, _| parameters[axis])
    }

    fn jacobian(&self, _parameters: &[f64], _point: &Point<D>) -> ParameterJacobian<D> {
        let indices = (0..D).collect();
        let columns = (0..D)
            .map(|axis| Vector::<D>::from_fn(|row, _| if row == axis { 1.0 } else { 0.0 }))
            .collect();
        ParameterJacobian::new(indices, columns)
    }
}
