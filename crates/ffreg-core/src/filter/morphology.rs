//! Binary mask erosion and grey-value dilation with box structuring elements.
//!
//! Erosion runs behind the [`MaskErosion`] strategy trait so that a level can
//! pick the host reference implementation or the tensor implementation that
//! executes on the image's own backend. Both treat voxels outside the image
//! as foreground, so a mask touching the border is not eaten from outside.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::geometry::row_major_strides;
use crate::image::Image;

/// Which erosion implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErosionBackend {
    /// Host reference implementation.
    #[default]
    Cpu,
    /// Burn tensor operations on the image backend.
    Tensor,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown erosion backend '{0}', expected 'cpu' or 'tensor'")]
pub struct UnknownErosionBackend(pub String);

impl FromStr for ErosionBackend {
    type Err = UnknownErosionBackend;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "tensor" | "gpu" => Ok(Self::Tensor),
            other => Err(UnknownErosionBackend(other.to_string())),
        }
    }
}

impl fmt::Display for ErosionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Tensor => write!(f, "tensor"),
        }
    }
}

/// Binary erosion of a mask image with a box of half-width `radius`.
///
/// Input voxels above 0.5 are foreground. The result holds 0.0 / 1.0.
pub trait MaskErosion<B: Backend, const D: usize>: Send + Sync {
    fn name(&self) -> &'static str;

    fn erode(&self, mask: &Image<B, D>, radius: [usize; D]) -> Result<Image<B, D>>;
}

/// Host reference erosion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuErosion;

impl<B: Backend, const D: usize> MaskErosion<B, D> for CpuErosion {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn erode(&self, mask: &Image<B, D>, radius: [usize; D]) -> Result<Image<B, D>> {
        let foreground: Vec<bool> = mask.to_host()?.into_iter().map(|v| v > 0.5).collect();
        let eroded = erode_host(&foreground, &mask.shape(), &radius);
        let values = eroded.into_iter().map(|inside| if inside { 1.0 } else { 0.0 }).collect();
        Image::from_host(values, &mask.domain(), &mask.data().device())
    }
}

/// Erosion as a sequence of shifted element-wise minima.
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorErosion;

impl<B: Backend, const D: usize> MaskErosion<B, D> for TensorErosion {
    fn name(&self) -> &'static str {
        "tensor"
    }

    fn erode(&self, mask: &Image<B, D>, radius: [usize; D]) -> Result<Image<B, D>> {
        let device = mask.data().device();
        let mut data = mask.data().clone().greater_elem(0.5).float();

        for (axis, &r) in radius.iter().enumerate() {
            if r == 0 {
                continue;
            }
            let dims: [usize; D] = data.dims();
            let mut pad_dims = dims;
            pad_dims[axis] = r;
            let pad = Tensor::<B, D>::ones(pad_dims, &device);
            let padded = Tensor::cat(vec![pad.clone(), data, pad], axis);

            let mut eroded = padded.clone().slice(window(&dims, axis, 0));
            for offset in 1..=2 * r {
                eroded = eroded.min_pair(padded.clone().slice(window(&dims, axis, offset)));
            }
            data = eroded;
        }

        Image::from_domain(data, &mask.domain())
    }
}

/// Slice ranges selecting `dims` starting at `offset` along `axis`.
fn window<const D: usize>(dims: &[usize; D], axis: usize, offset: usize) -> [Range<usize>; D] {
    std::array::from_fn(|a| if a == axis { offset..offset + dims[a] } else { 0..dims[a] })
}

/// Strategy object for a configured backend.
pub fn erosion_strategy<B: Backend, const D: usize>(backend: ErosionBackend) -> Box<dyn MaskErosion<B, D>> {
    match backend {
        ErosionBackend::Cpu => Box::new(CpuErosion),
        ErosionBackend::Tensor => Box::new(TensorErosion),
    }
}

/// Binary erosion of a row-major host buffer.
pub fn erode_host<const D: usize>(mask: &[bool], size: &[usize; D], radius: &[usize; D]) -> Vec<bool> {
    separable_box(mask, size, radius, |a, b| a && b)
}

/// Grey-value dilation (box maximum) of a row-major host buffer.
pub fn dilate_host<const D: usize>(values: &[f32], size: &[usize; D], radius: &[usize; D]) -> Vec<f32> {
    separable_box(values, size, radius, f32::max)
}

/// Apply `reduce` over a box window one axis at a time. Windows are clipped
/// to the buffer, which for erosion is the same as padding with foreground.
fn separable_box<T: Copy, const D: usize>(
    values: &[T],
    size: &[usize; D],
    radius: &[usize; D],
    reduce: impl Fn(T, T) -> T,
) -> Vec<T> {
    let strides = row_major_strides(size);
    let mut current = values.to_vec();
    for axis in 0..D {
        let r = radius[axis];
        let n = size[axis];
        if r == 0 || n == 0 {
            continue;
        }
        let stride = strides[axis];
        let next = (0..current.len())
            .map(|linear| {
                let i = (linear / stride) % n;
                let lo = i.saturating_sub(r);
                let hi = (i + r).min(n - 1);
                let start = linear - (i - lo) * stride;
                (1..=hi - lo).fold(current[start], |acc, k| reduce(acc, current[start + k * stride]))
            })
            .collect();
        current = next;
    }
    current
}
