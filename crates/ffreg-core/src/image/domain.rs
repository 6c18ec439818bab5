//! Image domain: the physical geometry of a voxel lattice.
//!
//! A domain maps discrete indices to physical coordinates using
//! `point = origin + Direction * (index * spacing)`.

use crate::error::{GeometryError, Result};
use crate::geometry::{ravel_index, row_major_strides, Direction, Matrix, Point, Spacing, Vector};

/// Geometry of a D-dimensional voxel lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDomain<const D: usize> {
    /// Physical coordinate of the first voxel (index 0, 0, ...).
    origin: Point<D>,
    /// Physical distance between voxels along each axis.
    spacing: Spacing<D>,
    /// Orientation of the image axes (column i is axis i).
    direction: Direction<D>,
    /// Number of voxels along each axis.
    size: [usize; D],
}

impl<const D: usize> ImageDomain<D> {
    /// Create a new domain.
    pub fn new(origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>, size: [usize; D]) -> Self {
        Self {
            origin,
            spacing,
            direction,
            size,
        }
    }

    /// Domain with zero origin, unit spacing and identity direction.
    pub fn from_size(size: [usize; D]) -> Self {
        Self::new(Point::origin(), Spacing::repeat(1.0), Direction::identity(), size)
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

    pub fn size(&self) -> [usize; D] {
        self.size
    }

    /// Total number of voxels.
    pub fn number_of_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Physical extent along each axis (`size * spacing`).
    pub fn extent(&self) -> Vector<D> {
        Vector::from_fn(|axis, _| self.size[axis] as f64 * self.spacing[axis])
    }

    /// Check that every axis has positive size and spacing and that the
    /// direction matrix is invertible.
    pub fn validate(&self) -> Result<()> {
        for axis in 0..D {
            if self.size[axis] == 0 {
                return Err(GeometryError::invalid_domain(axis, "size must be positive"));
            }
            let s = self.spacing[axis];
            if !s.is_finite() || s <= 0.0 {
                return Err(GeometryError::invalid_domain(
                    axis,
                    format!("spacing must be positive, got {}", s),
                ));
            }
        }
        if self.direction.try_inverse().is_none() {
            return Err(GeometryError::invalid_domain(0, "direction matrix is singular"));
        }
        Ok(())
    }

    /// Matrix mapping `point - origin` to continuous index space.
    pub fn physical_to_index_matrix(&self) -> Option<Matrix<D>> {
        let inv_dir = self.direction.try_inverse()?;
        let inv_spacing = Matrix::<D>::from_diagonal(&self.spacing.map(|s| 1.0 / s));
        Some(inv_spacing * inv_dir)
    }

    /// Convert a continuous index to a physical point.
    pub fn index_to_physical(&self, index: &Point<D>) -> Point<D> {
        let scaled = index.coords.component_mul(&self.spacing);
        self.origin + self.direction * scaled
    }

    /// Convert a physical point to a continuous index.
    ///
    /// Returns `None` when the direction matrix is singular.
    pub fn physical_to_index(&self, point: &Point<D>) -> Option<Point<D>> {
        let m = self.physical_to_index_matrix()?;
        Some(Point::from(m * (point - self.origin)))
    }

    /// Nearest voxel to a physical point, if it lies inside the lattice.
    pub fn nearest_index(&self, point: &Point<D>) -> Option<[usize; D]> {
        let continuous = self.physical_to_index(point)?;
        nearest_in_bounds(&continuous, &self.size)
    }

    /// Flat (row-major) offset of a voxel.
    pub fn linear_index(&self, index: &[usize; D]) -> usize {
        ravel_index(index, &row_major_strides(&self.size))
    }

    /// Whether two domains describe the same lattice within `tolerance`.
    pub fn is_compatible_with(&self, other: &Self, tolerance: f64) -> bool {
        self.size == other.size
            && (self.origin - other.origin).amax() <= tolerance
            && (self.spacing - other.spacing).amax() <= tolerance
            && (self.direction - other.direction).amax() <= tolerance
    }
}

/// Round a continuous index to the nearest lattice node inside `size`.
pub(crate) fn nearest_in_bounds<const D: usize>(continuous: &Point<D>, size: &[usize; D]) -> Option<[usize; D]> {
    let mut index = [0usize; D];
    for axis in 0..D {
        let rounded = continuous[axis].round();
        if rounded < 0.0 || rounded >= size[axis] as f64 {
            return None;
        }
        index[axis] = rounded as usize;
    }
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point3, Spacing3};

    #[test]
    fn test_extent_uses_voxel_count() {
        let domain = ImageDomain::new(
            Point3::origin(),
            Spacing3::new(1.0, 2.0, 0.5),
            Direction::identity(),
            [64, 10, 8],
        );
        assert_eq!(domain.extent(), Vector::<3>::new(64.0, 20.0, 4.0));
        assert_eq!(domain.number_of_voxels(), 64 * 10 * 8);
    }

    #[test]
    fn test_validate_rejects_zero_spacing() {
        let domain = ImageDomain::new(
            Point3::origin(),
            Spacing3::new(1.0, 0.0, 1.0),
            Direction::identity(),
            [4, 4, 4],
        );
        assert!(matches!(
            domain.validate(),
            Err(GeometryError::InvalidDomain { axis: 1, .. })
        ));
    }

    #[test]
    fn test_index_roundtrip() {
        let domain = ImageDomain::new(
            Point3::new(10.0, -5.0, 2.0),
            Spacing3::new(2.0, 1.5, 0.5),
            Direction::identity(),
            [8, 8, 8],
        );
        let index = Point3::new(3.25, 1.0, 6.5);
        let physical = domain.index_to_physical(&index);
        let back = domain.physical_to_index(&physical).unwrap();
        assert!((back - index).norm() < 1e-12);
    }

    #[test]
    fn test_nearest_index_outside() {
        let domain = ImageDomain::<2>::from_size([4, 4]);
        assert_eq!(domain.nearest_index(&Point::<2>::new(1.2, 2.6)), Some([1, 3]));
        assert_eq!(domain.nearest_index(&Point::<2>::new(-0.6, 2.0)), None);
        assert_eq!(domain.nearest_index(&Point::<2>::new(3.6, 2.0)), None);
    }

    #[test]
    fn test_compatibility_tolerance() {
        let a = ImageDomain::<2>::from_size([4, 4]);
        let mut b = a.clone();
        b.origin = Point::<2>::new(1e-9, 0.0);
        assert!(a.is_compatible_with(&b, 1e-6));
        b.size = [4, 5];
        assert!(!a.is_compatible_with(&b, 1e-6));
    }
}
