//! Control-grid computation with one periodic axis.

use super::computer::{build_grid, checked_extent, checked_spacing, GridScheduleComputer, GridScheduler};
use super::control_grid::ControlGrid;
use crate::error::{GeometryError, Result};
use crate::geometry::{Spacing, Vector};
use crate::image::ImageDomain;
use crate::interpolation::CUBIC_SUPPORT;

/// Grid scheduler whose `axis` wraps around.
///
/// Along the periodic axis the node count is the integer nearest to
/// `period / spacing`, at least the cubic support of four nodes, and the spacing is then
/// recomputed as `period / count` so the nodes tile the period exactly. No
/// padding is added there. Other axes follow [`GridScheduleComputer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicGridScheduleComputer<const D: usize> {
    base: GridScheduleComputer<D>,
    axis: usize,
    period_length: Option<f64>,
}

impl<const D: usize> PeriodicGridScheduleComputer<D> {
    /// Periodic scheduler for `axis`. The period defaults to the domain
    /// extent along that axis.
    pub fn new(axis: usize) -> Self {
        Self {
            base: GridScheduleComputer::default(),
            axis,
            period_length: None,
        }
    }

    pub fn with_period_length(mut self, period_length: f64) -> Self {
        self.period_length = Some(period_length);
        self
    }

    pub fn with_support_margin(mut self, support_margin: usize) -> Self {
        self.base = GridScheduleComputer::new(support_margin);
        self
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Smallest node count allowed along the periodic axis. Fewer nodes
    /// would let one cubic stencil wrap onto the same node twice.
    pub fn minimum_count(&self) -> usize {
        CUBIC_SUPPORT
    }

    fn period(&self, domain: &ImageDomain<D>) -> Result<f64> {
        match self.period_length {
            Some(period) if period.is_finite() && period > 0.0 => Ok(period),
            Some(period) => Err(GeometryError::invalid_domain(
                self.axis,
                format!("period length must be positive, got {}", period),
            )),
            None => checked_extent(domain, self.axis),
        }
    }
}

impl<const D: usize> GridScheduler<D> for PeriodicGridScheduleComputer<D> {
    fn compute_grid(&self, domain: &ImageDomain<D>, grid_spacing: &Spacing<D>) -> Result<ControlGrid<D>> {
        if self.axis >= D {
            return Err(GeometryError::invalid_domain(
                self.axis,
                format!("periodic axis outside a {}-dimensional domain", D),
            ));
        }

        let period = self.period(domain)?;
        let requested = checked_spacing(grid_spacing, self.axis)?;
        let nearest = (period / requested).round() as usize;
        let count = nearest.max(self.minimum_count());
        if count != nearest {
            tracing::warn!(
                axis = self.axis,
                requested_spacing = requested,
                count,
                "periodic grid clamped to the minimum node count; spacing deviates from the request"
            );
        }

        let mut spacing = *grid_spacing;
        spacing[self.axis] = period / count as f64;

        let mut size = [0usize; D];
        let mut padding = Vector::<D>::zeros();
        let mut periodic = [false; D];
        for axis in 0..D {
            if axis == self.axis {
                size[axis] = count;
                periodic[axis] = true;
            } else {
                size[axis] = self.base.padded_axis(domain, grid_spacing, axis)?;
                padding[axis] = grid_spacing[axis] * self.base.support_margin() as f64;
            }
        }
        build_grid(domain, &spacing, &padding, size, periodic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Direction, Point};
    use crate::transform::{BSplineDeformation, ParametricTransform};

    #[test]
    fn test_exact_tiling() {
        let domain = ImageDomain::<2>::from_size([40, 360]);
        let computer = PeriodicGridScheduleComputer::<2>::new(1);
        let grid = computer.compute_grid(&domain, &Spacing::<2>::new(8.0, 10.0)).unwrap();
        assert_eq!(grid.size(), [11, 36]);
        assert_eq!(grid.spacing()[1], 10.0);
        assert_eq!(grid.period_length(1), Some(360.0));
        assert!(grid.is_periodic(1));
        assert!(!grid.is_periodic(0));
    }

    #[test]
    fn test_no_padding_on_periodic_axis() {
        let domain = ImageDomain::<2>::new(
            Point::<2>::new(5.0, 100.0),
            Spacing::<2>::repeat(1.0),
            Direction::identity(),
            [20, 90],
        );
        let computer = PeriodicGridScheduleComputer::<2>::new(1).with_support_margin(2);
        let grid = computer.compute_grid(&domain, &Spacing::<2>::new(4.0, 7.0)).unwrap();
        assert_eq!(grid.origin(), &Point::<2>::new(-3.0, 100.0));
        // round(90 / 7) = 13 nodes, spacing 90 / 13
        assert_eq!(grid.size()[1], 13);
        assert!((grid.spacing()[1] * 13.0 - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_minimum_count_clamp() {
        let domain = ImageDomain::<1>::from_size([10]);
        let computer = PeriodicGridScheduleComputer::<1>::new(0);
        let grid = computer.compute_grid(&domain, &Spacing::<1>::new(6.0)).unwrap();
        assert_eq!(grid.size(), [4]);
        assert!((grid.spacing()[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_grid_has_distinct_support_nodes() {
        let domain = ImageDomain::<1>::from_size([10]);
        let computer = PeriodicGridScheduleComputer::<1>::new(0);
        assert_eq!(computer.minimum_count(), 4);
        // Spacing 9 asks for a single node; the clamp keeps a full stencil.
        let grid = computer.compute_grid(&domain, &Spacing::<1>::new(9.0)).unwrap();
        assert_eq!(grid.size(), [4]);

        let transform = BSplineDeformation::new(grid);
        for x in [0.0, 1.3, 4.9, 9.7] {
            let mut indices = transform.nonzero_jacobian_indices(&Point::<1>::new(x));
            assert_eq!(indices.len(), 4);
            indices.sort_unstable();
            indices.dedup();
            assert_eq!(indices, vec![0, 1, 2, 3], "x = {}", x);
        }
    }

    #[test]
    fn test_explicit_period_overrides_extent() {
        let domain = ImageDomain::<1>::from_size([10]);
        let computer = PeriodicGridScheduleComputer::<1>::new(0).with_period_length(12.0);
        let grid = computer.compute_grid(&domain, &Spacing::<1>::new(2.0)).unwrap();
        assert_eq!(grid.size(), [6]);
        assert_eq!(grid.period_length(0), Some(12.0));
    }

    #[test]
    fn test_axis_out_of_range() {
        let domain = ImageDomain::<2>::from_size([10, 10]);
        let computer = PeriodicGridScheduleComputer::<2>::new(2);
        assert!(computer.compute_grid(&domain, &Spacing::<2>::repeat(2.0)).is_err());
    }
}
