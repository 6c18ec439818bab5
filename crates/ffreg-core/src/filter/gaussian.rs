use burn::tensor::backend::Backend;
use burn::tensor::module::conv1d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Tensor, TensorData};

use crate::geometry::Spacing;
use crate::image::Image;

/// Widest kernel applied along one axis, in taps.
const MAX_KERNEL_WIDTH: usize = 33;

/// Gaussian smoothing filter.
///
/// Applies separable 1D convolutions, one per axis. Sigmas are physical
/// units and are converted to voxels with the image spacing.
#[derive(Debug, Clone)]
pub struct GaussianFilter<const D: usize> {
    sigmas: [f64; D],
}

impl<const D: usize> GaussianFilter<D> {
    /// Create a new Gaussian filter with per-axis standard deviations.
    pub fn new(sigmas: [f64; D]) -> Self {
        Self { sigmas }
    }

    /// Whether every sigma is negligible.
    pub fn is_identity(&self) -> bool {
        self.sigmas.iter().all(|&s| s <= 1e-6)
    }

    /// Apply the filter to an image.
    pub fn apply<B: Backend>(&self, image: &Image<B, D>) -> Image<B, D> {
        let data = self.apply_tensor(image.data().clone(), image.spacing());
        Image::new(data, *image.origin(), *image.spacing(), *image.direction())
    }

    /// Apply the filter to a tensor with the given voxel spacing.
    pub fn apply_tensor<B: Backend>(&self, input: Tensor<B, D>, spacing: &Spacing<D>) -> Tensor<B, D> {
        let mut data = input;
        for axis in 0..D {
            let sigma = self.sigmas[axis];
            if sigma <= 1e-6 {
                continue;
            }
            let pixel_sigma = sigma / spacing[axis];
            let radius = (3.0 * pixel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(MAX_KERNEL_WIDTH);
            let kernel = gaussian_kernel(pixel_sigma, (width - 1) / 2);
            data = convolve_axis(data, kernel, axis);
        }
        data
    }
}

/// Normalised Gaussian kernel of `2 * radius + 1` taps.
fn gaussian_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let taps: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Zero-padded same-size convolution along one axis.
fn convolve_axis<B: Backend, const D: usize>(input: Tensor<B, D>, kernel: Vec<f32>, axis: usize) -> Tensor<B, D> {
    let device = input.device();
    // Move the axis last so every other axis becomes batch.
    let swapped = input.swap_dims(axis, D - 1);
    let swapped_dims: [usize; D] = swapped.dims();
    let length = swapped_dims[D - 1];
    let batch: usize = swapped_dims[..D - 1].iter().product();

    let width = kernel.len();
    let weight = Tensor::<B, 3>::from_data(TensorData::new(kernel, [1, 1, width]), &device);
    let options = ConvOptions::new([1], [width / 2], [1], 1);
    let output = conv1d(swapped.reshape([batch, 1, length]), weight, None, options);

    output.reshape(swapped_dims).swap_dims(axis, D - 1)
}
