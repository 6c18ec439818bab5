//! Image type with physical metadata.
//!
//! This module provides the Image struct which pairs tensor data with the
//! physical space description (origin, spacing, direction) of its lattice.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use super::domain::ImageDomain;
use crate::error::{GeometryError, Result};
use crate::geometry::{Direction, Point, Spacing};

/// Image with physical metadata.
///
/// The data lives on the backend `B` (CPU or accelerator); the geometry is
/// always host-side. Tensor axis `i` corresponds to index axis `i`.
///
/// # Examples
/// ```rust
/// use ffreg_core::Image;
/// use ffreg_core::geometry::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::repeat(1.0), Direction3::identity());
/// assert_eq!(image.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    /// The pixel data, potentially on an accelerator.
    data: Tensor<B, D>,
    /// Physical coordinate of the first pixel (index 0,0,0).
    origin: Point<D>,
    /// Physical distance between pixels along each axis.
    spacing: Spacing<D>,
    /// Orientation of the image axes.
    direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image with the given data and metadata.
    pub fn new(data: Tensor<B, D>, origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Wrap a tensor with the geometry of `domain`.
    ///
    /// Fails if the tensor shape differs from the domain size.
    pub fn from_domain(data: Tensor<B, D>, domain: &ImageDomain<D>) -> Result<Self> {
        let dims = data.dims();
        for axis in 0..D {
            if dims[axis] != domain.size()[axis] {
                return Err(GeometryError::DimensionMismatch {
                    expected: domain.size()[axis],
                    actual: dims[axis],
                });
            }
        }
        Ok(Self::new(data, *domain.origin(), *domain.spacing(), *domain.direction()))
    }

    /// Upload host values (row-major) into an image on `device`.
    pub fn from_host(values: Vec<f32>, domain: &ImageDomain<D>, device: &B::Device) -> Result<Self> {
        if values.len() != domain.number_of_voxels() {
            return Err(GeometryError::DimensionMismatch {
                expected: domain.number_of_voxels(),
                actual: values.len(),
            });
        }
        let data = Tensor::<B, D>::from_data(TensorData::new(values, domain.size()), device);
        Self::from_domain(data, domain)
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Consume the image, returning its tensor.
    pub fn into_data(self) -> Tensor<B, D> {
        self.data
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

    /// Get the image shape as an array.
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// The lattice geometry of this image.
    pub fn domain(&self) -> ImageDomain<D> {
        ImageDomain::new(self.origin, self.spacing, self.direction, self.shape())
    }

    /// Download the pixel values (row-major) as `f32`.
    pub fn to_host(&self) -> Result<Vec<f32>> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| GeometryError::tensor_data(format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;
    type Point3 = Point<3>;
    type Spacing3 = Spacing<3>;
    type Direction3 = Direction<3>;

    #[test]
    fn test_image_creation() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
        let origin = Point3::new(0.0, 0.0, 0.0);
        let spacing = Spacing3::new(1.0, 1.0, 1.0);
        let direction = Direction3::identity();

        let image = Image::new(data, origin, spacing, direction);

        assert_eq!(image.shape(), [10, 10, 10]);
        assert_eq!(image.origin(), &origin);
        assert_eq!(image.spacing(), &spacing);
        assert_eq!(image.direction(), &direction);
    }

    #[test]
    fn test_host_roundtrip() {
        let device = Default::default();
        let domain = ImageDomain::<2>::from_size([2, 3]);
        let values: Vec<f32> = (0..6).map(|v| v as f32).collect();
        let image = Image::<Backend, 2>::from_host(values.clone(), &domain, &device).unwrap();
        assert_eq!(image.shape(), [2, 3]);
        assert_eq!(image.to_host().unwrap(), values);
    }

    #[test]
    fn test_from_host_length_mismatch() {
        let device = Default::default();
        let domain = ImageDomain::<2>::from_size([2, 3]);
        let result = Image::<Backend, 2>::from_host(vec![0.0; 5], &domain, &device);
        assert!(matches!(result, Err(GeometryError::DimensionMismatch { expected: 6, actual: 5 })));
    }

    #[test]
    fn test_non_zero_origin() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
        let origin = Point3::new(10.0, 20.0, 30.0);
        let spacing = Spacing3::new(2.0, 2.0, 2.0);
        let image = Image::new(data, origin, spacing, Direction3::identity());

        let point = Point3::new(20.0, 30.0, 40.0);
        let index = image.domain().physical_to_index(&point).unwrap();

        assert!((index[0] - 5.0).abs() < 1e-9);
        assert!((index[1] - 5.0).abs() < 1e-9);
        assert!((index[2] - 5.0).abs() < 1e-9);
    }
}
