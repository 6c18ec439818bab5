use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::image::Image;

/// Downsample filter.
///
/// Reduces the image size by integer factors by keeping every Nth voxel,
/// starting at index 0. The origin is unchanged and the spacing grows by the
/// factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownsampleFilter<const D: usize> {
    factors: [usize; D],
}

impl<const D: usize> DownsampleFilter<D> {
    /// Factors below 1 are treated as 1.
    pub fn new(factors: [usize; D]) -> Self {
        Self {
            factors: factors.map(|f| f.max(1)),
        }
    }

    pub fn factors(&self) -> [usize; D] {
        self.factors
    }

    /// Apply the filter to an image.
    pub fn apply<B: Backend>(&self, image: &Image<B, D>) -> Image<B, D> {
        let mut data = image.data().clone();
        let device = data.device();
        let dims: [usize; D] = data.dims();
        let mut spacing = *image.spacing();

        for axis in 0..D {
            let factor = self.factors[axis];
            if factor == 1 {
                continue;
            }
            let indices: Vec<i64> = (0..dims[axis]).step_by(factor).map(|i| i as i64).collect();
            let count = indices.len();
            let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [count]), &device);
            data = data.select(axis, indices);
            spacing[axis] *= factor as f64;
        }

        Image::new(data, *image.origin(), spacing, *image.direction())
    }
}
