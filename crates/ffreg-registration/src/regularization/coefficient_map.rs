//! Host-side rigidity coefficient maps.

use burn::tensor::backend::Backend;
use ffreg_core::filter::dilate_host;
use ffreg_core::geometry::Point;
use ffreg_core::image::{Image, ImageDomain};
use ffreg_core::GeometryError;

use crate::error::Result;

/// Scalar field in `[0, 1]` marking where the deformation should be rigid.
///
/// Lookups use the nearest voxel; points outside the lattice have
/// coefficient 0.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientMap<const D: usize> {
    domain: ImageDomain<D>,
    values: Vec<f32>,
}

impl<const D: usize> CoefficientMap<D> {
    pub fn new(domain: ImageDomain<D>, values: Vec<f32>) -> Result<Self> {
        if values.len() != domain.number_of_voxels() {
            return Err(GeometryError::DimensionMismatch {
                expected: domain.number_of_voxels(),
                actual: values.len(),
            }
            .into());
        }
        Ok(Self { domain, values }.clamp_unit())
    }

    /// Same value over the whole domain.
    pub fn constant(domain: ImageDomain<D>, value: f32) -> Self {
        let values = vec![value; domain.number_of_voxels()];
        Self { domain, values }.clamp_unit()
    }

    /// Download an image.
    pub fn from_image<B: Backend>(image: &Image<B, D>) -> Result<Self> {
        Self::new(image.domain(), image.to_host()?)
    }

    pub fn domain(&self) -> &ImageDomain<D> {
        &self.domain
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn value_at(&self, point: &Point<D>) -> f64 {
        self.domain
            .nearest_index(point)
            .map_or(0.0, |index| self.values[self.domain.linear_index(&index)] as f64)
    }

    /// Whether no voxel carries a positive coefficient.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v <= 0.0)
    }

    /// Grey-value dilation with a box of half-width `radius` voxels.
    pub fn dilate(&self, radius: [usize; D]) -> Self {
        Self {
            domain: self.domain.clone(),
            values: dilate_host(&self.values, &self.domain.size(), &radius),
        }
    }

    fn clamp_unit(mut self) -> Self {
        let outside = self.values.iter().filter(|v| !(0.0..=1.0).contains(*v)).count();
        if outside > 0 {
            tracing::warn!(outside, "rigidity coefficients outside [0, 1] were clamped");
            for v in &mut self.values {
                *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn test_values_are_clamped() {
        let map = CoefficientMap::new(ImageDomain::<1>::from_size([4]), vec![-1.0, 0.5, 2.0, f32::NAN]).unwrap();
        assert_eq!(map.values(), &[0.0, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_nearest_lookup_and_outside() {
        let device = Default::default();
        let domain = ImageDomain::<2>::from_size([2, 3]);
        let image = Image::<NdArray<f32>, 2>::from_host(vec![0.0, 0.25, 0.5, 0.75, 1.0, 0.0], &domain, &device).unwrap();
        let map = CoefficientMap::from_image(&image).unwrap();
        assert_eq!(map.value_at(&Point::<2>::new(1.1, 0.8)), 1.0);
        assert_eq!(map.value_at(&Point::<2>::new(0.0, 2.2)), 0.5);
        assert_eq!(map.value_at(&Point::<2>::new(5.0, 0.0)), 0.0);
    }

    #[test]
    fn test_dilation_spreads_rigid_region() {
        let mut values = vec![0.0; 7];
        values[3] = 1.0;
        let map = CoefficientMap::new(ImageDomain::<1>::from_size([7]), values).unwrap();
        assert_eq!(map.dilate([2]).values(), &[0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0]);
        assert!(!map.is_zero());
        assert!(CoefficientMap::constant(ImageDomain::<1>::from_size([3]), 0.0).is_zero());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(CoefficientMap::new(ImageDomain::<2>::from_size([2, 2]), vec![0.0; 3]).is_err());
    }
}
