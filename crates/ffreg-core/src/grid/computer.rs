//! Control-grid computation for a multi-resolution schedule.

use super::control_grid::ControlGrid;
use super::schedule::GridSchedule;
use crate::error::{GeometryError, Result};
use crate::geometry::{Spacing, Vector};
use crate::image::ImageDomain;

/// Relative slack used when dividing an extent into grid cells, so that an
/// exact multiple is not pushed to the next integer by rounding noise.
pub const TILING_TOLERANCE: f64 = 1e-9;

/// Computes the control grid of every resolution level.
pub trait GridScheduler<const D: usize> {
    /// Grid for a single level at the given effective spacing.
    fn compute_grid(&self, domain: &ImageDomain<D>, grid_spacing: &Spacing<D>) -> Result<ControlGrid<D>>;

    /// Grids for all levels of `schedule`, coarsest first.
    ///
    /// The effective spacing of level `L` is `base_spacing ⊙ schedule[L]`.
    fn compute_schedule(
        &self,
        domain: &ImageDomain<D>,
        base_spacing: &Spacing<D>,
        schedule: &GridSchedule<D>,
    ) -> Result<Vec<ControlGrid<D>>> {
        schedule
            .factors()
            .iter()
            .enumerate()
            .map(|(level, factor)| {
                let grid_spacing = base_spacing.component_mul(factor);
                let grid = self.compute_grid(domain, &grid_spacing)?;
                tracing::debug!(
                    level,
                    size = ?grid.size(),
                    spacing = ?grid.spacing().as_slice(),
                    "computed control grid"
                );
                Ok(grid)
            })
            .collect()
    }
}

/// Non-periodic grid scheduler.
///
/// Along every axis the node count is `ceil(extent / spacing) + 2 * margin`
/// and the origin is moved outward by `margin * spacing`, so the compact
/// support of the spline covers the whole domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridScheduleComputer<const D: usize> {
    support_margin: usize,
}

impl<const D: usize> GridScheduleComputer<D> {
    pub fn new(support_margin: usize) -> Self {
        Self { support_margin }
    }

    pub fn support_margin(&self) -> usize {
        self.support_margin
    }

    /// Validated extent and node count along one non-periodic axis.
    pub(crate) fn padded_axis(&self, domain: &ImageDomain<D>, grid_spacing: &Spacing<D>, axis: usize) -> Result<usize> {
        let extent = checked_extent(domain, axis)?;
        let spacing = checked_spacing(grid_spacing, axis)?;
        let ratio = extent / spacing;
        let cells = (ratio - TILING_TOLERANCE * ratio.max(1.0)).ceil().max(1.0) as usize;
        Ok(cells + 2 * self.support_margin)
    }
}

impl<const D: usize> Default for GridScheduleComputer<D> {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<const D: usize> GridScheduler<D> for GridScheduleComputer<D> {
    fn compute_grid(&self, domain: &ImageDomain<D>, grid_spacing: &Spacing<D>) -> Result<ControlGrid<D>> {
        let mut size = [0usize; D];
        for (axis, count) in size.iter_mut().enumerate() {
            *count = self.padded_axis(domain, grid_spacing, axis)?;
        }
        let padding = grid_spacing * self.support_margin as f64;
        build_grid(domain, grid_spacing, &padding, size, [false; D])
    }
}

/// Positive physical extent of a domain axis.
pub(crate) fn checked_extent<const D: usize>(domain: &ImageDomain<D>, axis: usize) -> Result<f64> {
    let extent = domain.extent()[axis];
    if !extent.is_finite() || extent <= 0.0 {
        return Err(GeometryError::invalid_domain(
            axis,
            format!("domain extent must be positive, got {}", extent),
        ));
    }
    Ok(extent)
}

/// Positive grid spacing along an axis.
pub(crate) fn checked_spacing<const D: usize>(grid_spacing: &Spacing<D>, axis: usize) -> Result<f64> {
    let spacing = grid_spacing[axis];
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(GeometryError::invalid_domain(
            axis,
            format!("grid spacing must be positive, got {}", spacing),
        ));
    }
    Ok(spacing)
}

/// Assemble a grid whose origin is the domain origin moved back by
/// `padding` (in grid-axis units) along the domain directions.
pub(crate) fn build_grid<const D: usize>(
    domain: &ImageDomain<D>,
    grid_spacing: &Spacing<D>,
    padding: &Vector<D>,
    size: [usize; D],
    periodic: [bool; D],
) -> Result<ControlGrid<D>> {
    let origin = domain.origin() - domain.direction() * padding;
    ControlGrid::new(origin, *grid_spacing, *domain.direction(), size, periodic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Direction, Point};

    #[test]
    fn test_grid_size_and_origin() {
        let domain = ImageDomain::<2>::new(
            Point::<2>::new(10.0, 20.0),
            Spacing::<2>::new(1.0, 2.0),
            Direction::identity(),
            [50, 25],
        );
        let computer = GridScheduleComputer::<2>::new(2);
        let grid = computer.compute_grid(&domain, &Spacing::<2>::new(8.0, 8.0)).unwrap();
        // ceil(50 / 8) + 4, ceil(50 / 8) + 4
        assert_eq!(grid.size(), [11, 11]);
        assert_eq!(grid.origin(), &Point::<2>::new(-6.0, 4.0));
        assert_eq!(grid.periodic(), [false, false]);
    }

    #[test]
    fn test_exact_multiple_not_rounded_up() {
        // 30 * 0.1 may land just above 3.0.
        let domain = ImageDomain::<1>::new(
            Point::<1>::origin(),
            Spacing::<1>::new(0.1),
            Direction::identity(),
            [30],
        );
        let computer = GridScheduleComputer::<1>::new(0);
        let grid = computer.compute_grid(&domain, &Spacing::<1>::new(1.0)).unwrap();
        assert_eq!(grid.size(), [3]);
    }

    #[test]
    fn test_rejects_non_positive_spacing() {
        let domain = ImageDomain::<2>::from_size([8, 8]);
        let computer = GridScheduleComputer::<2>::default();
        let result = computer.compute_grid(&domain, &Spacing::<2>::new(2.0, -1.0));
        assert!(matches!(result, Err(GeometryError::InvalidDomain { axis: 1, .. })));
    }

    #[test]
    fn test_rejects_empty_domain() {
        let domain = ImageDomain::<2>::from_size([8, 0]);
        let computer = GridScheduleComputer::<2>::default();
        let result = computer.compute_grid(&domain, &Spacing::<2>::repeat(2.0));
        assert!(matches!(result, Err(GeometryError::InvalidDomain { axis: 1, .. })));
    }
}
