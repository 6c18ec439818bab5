//! Image filters used to build multi-resolution pyramids and masks.

pub mod downsample;
pub mod gaussian;
pub mod morphology;
pub mod pyramid;

pub use downsample::DownsampleFilter;
pub use gaussian::GaussianFilter;
pub use morphology::{
    dilate_host, erode_host, erosion_strategy, CpuErosion, ErosionBackend, MaskErosion, TensorErosion,
    UnknownErosionBackend,
};
pub use pyramid::{ImagePyramid, MultiResolutionPyramid};
