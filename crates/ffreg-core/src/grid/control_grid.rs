//! Control-point lattice of a free-form deformation at one resolution level.

use crate::error::{GeometryError, Result};
use crate::geometry::{ravel_index, row_major_strides, unravel_index, Direction, Matrix, Point, Spacing};

/// Geometry of a B-spline control grid.
///
/// Nodes sit at `origin + Direction * (index * spacing)`. A periodic axis has
/// its two ends identified: node `size[axis]` is node `0` again, so the grid
/// tiles a period of `spacing[axis] * size[axis]` exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlGrid<const D: usize> {
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    size: [usize; D],
    periodic: [bool; D],
}

impl<const D: usize> ControlGrid<D> {
    /// Create a control grid, validating sizes and spacings.
    pub fn new(
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
        size: [usize; D],
        periodic: [bool; D],
    ) -> Result<Self> {
        for axis in 0..D {
            if size[axis] == 0 {
                return Err(GeometryError::invalid_domain(axis, "control grid needs at least one node"));
            }
            if !spacing[axis].is_finite() || spacing[axis] <= 0.0 {
                return Err(GeometryError::invalid_domain(
                    axis,
                    format!("grid spacing must be positive, got {}", spacing[axis]),
                ));
            }
        }
        if direction.try_inverse().is_none() {
            return Err(GeometryError::invalid_domain(0, "grid direction matrix is singular"));
        }
        Ok(Self {
            origin,
            spacing,
            direction,
            size,
            periodic,
        })
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Control-point counts per axis.
    pub fn size(&self) -> [usize; D] {
        self.size
    }

    pub fn periodic(&self) -> [bool; D] {
        self.periodic
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    /// Length of the period along a periodic axis.
    pub fn period_length(&self, axis: usize) -> Option<f64> {
        self.periodic[axis].then(|| self.spacing[axis] * self.size[axis] as f64)
    }

    pub fn number_of_control_points(&self) -> usize {
        self.size.iter().product()
    }

    pub fn strides(&self) -> [usize; D] {
        row_major_strides(&self.size)
    }

    /// Flat offset of a node.
    pub fn linear_index(&self, index: &[usize; D]) -> usize {
        ravel_index(index, &self.strides())
    }

    /// Multi-index of a flat node offset.
    pub fn grid_index(&self, linear: usize) -> [usize; D] {
        unravel_index(linear, &self.size)
    }

    /// Physical position of a node.
    pub fn node_position(&self, index: &[usize; D]) -> Point<D> {
        let scaled = Spacing::<D>::from_fn(|axis, _| index[axis] as f64 * self.spacing[axis]);
        self.origin + self.direction * scaled
    }

    /// Matrix mapping `point - origin` to continuous grid coordinates.
    pub fn index_matrix(&self) -> Matrix<D> {
        let inv_spacing = Matrix::<D>::from_diagonal(&self.spacing.map(|s| 1.0 / s));
        // Invertibility is checked on construction.
        let inv_dir = self.direction.try_inverse().unwrap_or_else(Matrix::<D>::identity);
        inv_spacing * inv_dir
    }

    /// Continuous grid coordinates of a physical point.
    pub fn continuous_index(&self, point: &Point<D>) -> Point<D> {
        Point::from(self.index_matrix() * (point - self.origin))
    }
}
