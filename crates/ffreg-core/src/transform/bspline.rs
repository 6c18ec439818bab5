//! B-Spline transform implementation.
//!
//! This module provides a cubic B-spline free-form deformation over a
//! [`ControlGrid`]. The parameter vector stores the control-point
//! coefficients component-major: all x coefficients first, then all y, and
//! so on, each block in the grid's row-major node order.

use super::trait_::{ParameterJacobian, ParametricTransform};
use crate::error::Result;
use crate::geometry::{Matrix, Point, Vector};
use crate::grid::ControlGrid;
use crate::interpolation::{cubic_first_derivatives, cubic_second_derivatives, cubic_weights, CUBIC_SUPPORT};

/// Basis values of the control points supporting one physical point.
///
/// Gradients and Hessians are taken with respect to physical coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupportWeights<const D: usize> {
    /// Linear node indices.
    pub nodes: Vec<usize>,
    pub values: Vec<f64>,
    pub gradients: Vec<Vector<D>>,
    pub hessians: Vec<Matrix<D>>,
}

impl<const D: usize> SupportWeights<D> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            gradients: Vec::with_capacity(capacity),
            hessians: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// B-Spline Transform (Free-form deformation).
///
/// `T(x) = x + sum_k c_k * B_k(x)` where `B_k` is the tensor-product cubic
/// B-spline centred on node `k`. On a periodic axis node indices wrap, so the
/// field is C2-continuous across the seam. On other axes nodes outside the
/// grid contribute nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineDeformation<const D: usize> {
    grid: ControlGrid<D>,
    index_matrix: Matrix<D>,
}

impl<const D: usize> BSplineDeformation<D> {
    /// Create a deformation over the given control grid.
    pub fn new(grid: ControlGrid<D>) -> Self {
        let index_matrix = grid.index_matrix();
        Self { grid, index_matrix }
    }

    pub fn grid(&self) -> &ControlGrid<D> {
        &self.grid
    }

    pub fn number_of_control_points(&self) -> usize {
        self.grid.number_of_control_points()
    }

    /// Flat parameter index of one coefficient component.
    pub fn parameter_index(&self, component: usize, node: usize) -> usize {
        component * self.number_of_control_points() + node
    }

    /// Control points supporting `point`, with basis values and their
    /// physical first and second derivatives.
    pub fn support(&self, point: &Point<D>) -> SupportWeights<D> {
        let t = self.index_matrix * (point - self.grid.origin());
        let size = self.grid.size();
        let strides = self.grid.strides();

        let mut base = [0i64; D];
        let mut w = [[0.0; CUBIC_SUPPORT]; D];
        let mut d1 = [[0.0; CUBIC_SUPPORT]; D];
        let mut d2 = [[0.0; CUBIC_SUPPORT]; D];
        for axis in 0..D {
            let floor = t[axis].floor();
            let u = t[axis] - floor;
            base[axis] = floor as i64 - 1;
            w[axis] = cubic_weights(u);
            d1[axis] = cubic_first_derivatives(u);
            d2[axis] = cubic_second_derivatives(u);
        }

        let m_t = self.index_matrix.transpose();
        let total = CUBIC_SUPPORT.pow(D as u32);
        let mut support = SupportWeights::with_capacity(total);

        'stencil: for combo in 0..total {
            let mut offsets = [0usize; D];
            let mut rest = combo;
            for axis in (0..D).rev() {
                offsets[axis] = rest % CUBIC_SUPPORT;
                rest /= CUBIC_SUPPORT;
            }

            let mut linear = 0usize;
            for axis in 0..D {
                let count = size[axis] as i64;
                let mut node = base[axis] + offsets[axis] as i64;
                if self.grid.is_periodic(axis) {
                    node = node.rem_euclid(count);
                } else if node < 0 || node >= count {
                    continue 'stencil;
                }
                linear += node as usize * strides[axis];
            }

            // Product of per-axis factors where `pick(axis)` selects w, d1 or d2.
            let product = |pick: &dyn Fn(usize) -> f64| (0..D).map(pick).product::<f64>();
            let value = product(&|b| w[b][offsets[b]]);
            let grad_t = Vector::<D>::from_fn(|a, _| product(&|b| if b == a { d1[b][offsets[b]] } else { w[b][offsets[b]] }));
            let hess_t = Matrix::<D>::from_fn(|a, c| {
                product(&|b| {
                    if a == c && b == a {
                        d2[b][offsets[b]]
                    } else if a != c && (b == a || b == c) {
                        d1[b][offsets[b]]
                    } else {
                        w[b][offsets[b]]
                    }
                })
            });

            support.nodes.push(linear);
            support.values.push(value);
            support.gradients.push(m_t * grad_t);
            support.hessians.push(m_t * hess_t * self.index_matrix);
        }
        support
    }

    /// Displacement `T(x) - x`.
    pub fn displacement(&self, parameters: &[f64], point: &Point<D>) -> Vector<D> {
        self.displacement_from(parameters, &self.support(point))
    }

    /// Displacement from precomputed support weights.
    pub fn displacement_from(&self, parameters: &[f64], support: &SupportWeights<D>) -> Vector<D> {
        let n = self.number_of_control_points();
        let mut displacement = Vector::<D>::zeros();
        for (&node, &value) in support.nodes.iter().zip(&support.values) {
            for component in 0..D {
                displacement[component] += value * parameters[component * n + node];
            }
        }
        displacement
    }

    /// Spatial Jacobian `dT/dx` of the transform (identity plus the
    /// displacement gradient).
    pub fn spatial_jacobian(&self, parameters: &[f64], point: &Point<D>) -> Matrix<D> {
        self.spatial_jacobian_from(parameters, &self.support(point))
    }

    pub fn spatial_jacobian_from(&self, parameters: &[f64], support: &SupportWeights<D>) -> Matrix<D> {
        let n = self.number_of_control_points();
        let mut jacobian = Matrix::<D>::identity();
        for (&node, gradient) in support.nodes.iter().zip(&support.gradients) {
            for component in 0..D {
                let coefficient = parameters[component * n + node];
                for axis in 0..D {
                    jacobian[(component, axis)] += coefficient * gradient[axis];
                }
            }
        }
        jacobian
    }

    /// Second spatial derivatives, one symmetric matrix per output component.
    pub fn spatial_hessians(&self, parameters: &[f64], point: &Point<D>) -> [Matrix<D>; D] {
        self.spatial_hessians_from(parameters, &self.support(point))
    }

    pub fn spatial_hessians_from(&self, parameters: &[f64], support: &SupportWeights<D>) -> [Matrix<D>; D] {
        let n = self.number_of_control_points();
        let mut hessians = [Matrix::<D>::zeros(); D];
        for (&node, hessian) in support.nodes.iter().zip(&support.hessians) {
            for (component, h) in hessians.iter_mut().enumerate() {
                *h += hessian * parameters[component * n + node];
            }
        }
        hessians
    }

    /// Carry a deformation onto another control grid.
    ///
    /// Each target coefficient is the displacement of this deformation at
    /// the target node. Exact for fields the cubic basis reproduces (up to
    /// linear) and an approximation otherwise.
    pub fn transfer_parameters(&self, parameters: &[f64], target: &ControlGrid<D>) -> Result<Vec<f64>> {
        self.validate_parameters(parameters)?;
        let m = target.number_of_control_points();
        let mut transferred = vec![0.0; D * m];
        for node in 0..m {
            let position = target.node_position(&target.grid_index(node));
            let displacement = self.displacement(parameters, &position);
            for component in 0..D {
                transferred[component * m + node] = displacement[component];
            }
        }
        tracing::debug!(
            from = ?self.grid.size(),
            to = ?target.size(),
            "transferred B-spline coefficients"
        );
        Ok(transferred)
    }
}

impl<const D: usize> ParametricTransform<D> for BSplineDeformation<D> {
    fn number_of_parameters(&self) -> usize {
        D * self.number_of_control_points()
    }

    fn transform_point(&self, parameters: &[f64], point: &Point<D>) -> Point<D> {
        point + self.displacement(parameters, point)
    }

    fn jacobian(&self, _parameters: &[f64], point: &Point<D>) -> ParameterJacobian<D> {
        let support = self.support(point);
        let mut indices = Vec::with_capacity(D * support.len());
        let mut columns = Vec::with_capacity(D * support.len());
        for component in 0..D {
            for (&node, &value) in support.nodes.iter().zip(&support.values) {
                indices.push(self.parameter_index(component, node));
                columns.push(Vector::<D>::from_fn(|axis, _| if axis == component { value } else { 0.0 }));
            }
        }
        ParameterJacobian::new(indices, columns)
    }

    fn nonzero_jacobian_indices(&self, point: &Point<D>) -> Vec<usize> {
        let support = self.support(point);
        (0..D)
            .flat_map(|component| support.nodes.iter().map(move |&node| (component, node)))
            .map(|(component, node)| self.parameter_index(component, node))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Direction, Spacing};

    fn padded_grid() -> ControlGrid<2> {
        ControlGrid::new(
            Point::<2>::new(-3.0, -3.0),
            Spacing::<2>::repeat(1.0),
            Direction::identity(),
            [12, 12],
            [false, false],
        )
        .unwrap()
    }

    fn rotated_grid() -> ControlGrid<2> {
        ControlGrid::new(
            Point::<2>::new(-4.0, -2.0),
            Spacing::<2>::new(2.0, 1.5),
            Direction::<2>::new(0.8, -0.6, 0.6, 0.8),
            [9, 10],
            [false, false],
        )
        .unwrap()
    }

    fn wiggly_parameters(count: usize) -> Vec<f64> {
        (0..count).map(|k| ((k * 37 % 17) as f64 - 8.0) * 0.02).collect()
    }

    #[test]
    fn test_zero_parameters_is_identity() {
        let transform = BSplineDeformation::new(padded_grid());
        let params = transform.identity_parameters();
        let p = Point::<2>::new(2.3, 4.7);
        assert_eq!(transform.transform_point(&params, &p), p);
        assert_eq!(transform.spatial_jacobian(&params, &p), Matrix::<2>::identity());
    }

    #[test]
    fn test_support_has_full_stencil_inside() {
        let transform = BSplineDeformation::new(padded_grid());
        let support = transform.support(&Point::<2>::new(1.5, 2.25));
        assert_eq!(support.len(), 16);
        let sum: f64 = support.values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(transform.nonzero_jacobian_indices(&Point::<2>::new(1.5, 2.25)).len(), 32);
    }

    #[test]
    fn test_reproduces_linear_field() {
        let grid = padded_grid();
        let transform = BSplineDeformation::new(grid.clone());
        let n = grid.number_of_control_points();
        let mut params = vec![0.0; 2 * n];
        for node in 0..n {
            let position = grid.node_position(&grid.grid_index(node));
            params[node] = 0.1 * position[0];
            params[n + node] = -0.2 * position[1] + 0.5;
        }
        let p = Point::<2>::new(2.4, 1.3);
        let displacement = transform.displacement(&params, &p);
        assert!((displacement[0] - 0.24).abs() < 1e-12);
        assert!((displacement[1] - (-0.26 + 0.5)).abs() < 1e-12);
        let jacobian = transform.spatial_jacobian(&params, &p);
        assert!((jacobian - Matrix::<2>::new(1.1, 0.0, 0.0, 0.8)).norm() < 1e-12);
        for h in transform.spatial_hessians(&params, &p) {
            assert!(h.norm() < 1e-12);
        }
    }

    #[test]
    fn test_spatial_derivatives_against_finite_differences() {
        let transform = BSplineDeformation::new(rotated_grid());
        let params = wiggly_parameters(transform.number_of_parameters());
        let p = Point::<2>::new(-1.35, 8.8);
        let h = 1e-5;
        let jacobian = transform.spatial_jacobian(&params, &p);
        let hessians = transform.spatial_hessians(&params, &p);
        for axis in 0..2 {
            let step = Vector::<2>::ith(axis, h);
            let fd = (transform.transform_point(&params, &(p + step)) - transform.transform_point(&params, &(p - step))) / (2.0 * h);
            for component in 0..2 {
                assert!((fd[component] - jacobian[(component, axis)]).abs() < 1e-6);
            }
            let fd_jac = (transform.spatial_jacobian(&params, &(p + step)) - transform.spatial_jacobian(&params, &(p - step))) / (2.0 * h);
            for component in 0..2 {
                for other in 0..2 {
                    assert!((fd_jac[(component, other)] - hessians[component][(other, axis)]).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_parameter_jacobian_matches_perturbation() {
        let transform = BSplineDeformation::new(rotated_grid());
        let params = wiggly_parameters(transform.number_of_parameters());
        let p = Point::<2>::new(-1.0, 8.5);
        let jacobian = transform.jacobian(&params, &p);
        let base = transform.transform_point(&params, &p);
        for (&index, column) in jacobian.indices.iter().zip(&jacobian.columns).step_by(5) {
            let mut perturbed = params.clone();
            perturbed[index] += 1.0;
            let delta = transform.transform_point(&perturbed, &p) - base;
            assert!((delta - column).norm() < 1e-12);
        }
    }

    #[test]
    fn test_jacobian_columns_are_axis_aligned_3d() {
        let grid = ControlGrid::new(
            Point::<3>::new(-3.0, -3.0, -3.0),
            Spacing::<3>::repeat(1.0),
            Direction::identity(),
            [8, 8, 8],
            [false, false, false],
        )
        .unwrap();
        let transform = BSplineDeformation::new(grid);
        let n = transform.number_of_control_points();
        let p = Point::<3>::new(1.25, 0.5, 2.75);
        let jacobian = transform.jacobian(&transform.identity_parameters(), &p);
        assert_eq!(jacobian.len(), 3 * 64);
        for (&index, column) in jacobian.indices.iter().zip(&jacobian.columns) {
            let component = index / n;
            for axis in 0..3 {
                if axis != component {
                    assert_eq!(column[axis], 0.0);
                }
            }
            assert!(column[component] > 0.0);
        }
    }

    #[test]
    fn test_periodic_axis_wraps() {
        let grid = ControlGrid::new(
            Point::<2>::new(-3.0, 0.0),
            Spacing::<2>::repeat(1.0),
            Direction::identity(),
            [10, 6],
            [false, true],
        )
        .unwrap();
        let transform = BSplineDeformation::new(grid);
        let params = wiggly_parameters(transform.number_of_parameters());
        let a = Point::<2>::new(1.2, 0.4);
        let b = Point::<2>::new(1.2, 6.4);
        assert!((transform.displacement(&params, &a) - transform.displacement(&params, &b)).norm() < 1e-12);
        assert_eq!(transform.support(&Point::<2>::new(1.2, 5.9)).len(), 16);
    }

    #[test]
    fn test_outside_grid_has_no_support() {
        let transform = BSplineDeformation::new(padded_grid());
        assert!(transform.support(&Point::<2>::new(50.0, 0.0)).is_empty());
    }

    #[test]
    fn test_transfer_linear_field() {
        let coarse = padded_grid();
        let fine = ControlGrid::new(
            Point::<2>::new(-1.5, -1.5),
            Spacing::<2>::repeat(0.5),
            Direction::identity(),
            [18, 18],
            [false, false],
        )
        .unwrap();
        let from = BSplineDeformation::new(coarse.clone());
        let n = coarse.number_of_control_points();
        let mut params = vec![0.0; 2 * n];
        for node in 0..n {
            params[node] = 0.05 * coarse.node_position(&coarse.grid_index(node))[1];
        }
        let transferred = from.transfer_parameters(&params, &fine).unwrap();
        let to = BSplineDeformation::new(fine);
        let p = Point::<2>::new(2.1, 3.3);
        assert!((to.displacement(&transferred, &p) - from.displacement(&params, &p)).norm() < 1e-9);
        assert!(from.transfer_parameters(&params[1..], to.grid()).is_err());
    }
}
