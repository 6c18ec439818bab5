use burn::tensor::backend::Backend;

use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;
use crate::error::{GeometryError, Result};
use crate::image::Image;

/// Per-level outputs of a multi-resolution pyramid.
///
/// Level 0 is the coarsest. Buffers can be released individually once a
/// level has been processed; a released level cannot be read again.
pub trait ImagePyramid<B: Backend, const D: usize> {
    /// Shrink factors, one entry per level.
    fn schedule(&self) -> &[[usize; D]];

    /// Image at a level.
    fn output(&self, level: usize) -> Result<&Image<B, D>>;

    /// Drop the buffer of a level. Returns whether a buffer was freed.
    fn release_level(&mut self, level: usize) -> bool;

    fn is_released(&self, level: usize) -> bool;

    fn levels(&self) -> usize {
        self.schedule().len()
    }
}

/// Multi-resolution image pyramid.
///
/// Each level is the input smoothed with a Gaussian and then downsampled by
/// integer factors.
pub struct MultiResolutionPyramid<B: Backend, const D: usize> {
    shrink_factors: Vec<[usize; D]>,
    images: Vec<Option<Image<B, D>>>,
}

impl<B: Backend, const D: usize> MultiResolutionPyramid<B, D> {
    /// Create a pyramid from an input image and per-level schedules.
    pub fn new(input: &Image<B, D>, shrink_factors: Vec<[usize; D]>, smoothing_sigmas: Vec<[f64; D]>) -> Result<Self> {
        if shrink_factors.is_empty() {
            return Err(GeometryError::invalid_schedule("pyramid needs at least one level"));
        }
        if shrink_factors.len() != smoothing_sigmas.len() {
            return Err(GeometryError::invalid_schedule(format!(
                "{} shrink factor levels but {} smoothing levels",
                shrink_factors.len(),
                smoothing_sigmas.len()
            )));
        }
        if let Some(level) = shrink_factors.iter().position(|f| f.contains(&0)) {
            return Err(GeometryError::invalid_schedule(format!(
                "shrink factor at level {} must be at least 1",
                level
            )));
        }

        let images = shrink_factors
            .iter()
            .zip(&smoothing_sigmas)
            .map(|(factors, sigmas)| {
                let smoother = GaussianFilter::new(*sigmas);
                let smoothed = if smoother.is_identity() { input.clone() } else { smoother.apply(input) };
                let output = if factors.iter().all(|&f| f == 1) {
                    smoothed
                } else {
                    DownsampleFilter::new(*factors).apply(&smoothed)
                };
                Some(output)
            })
            .collect();

        Ok(Self { shrink_factors, images })
    }

    /// Pyramid with the power-of-two schedule of [`Self::default_schedule`].
    pub fn with_default_schedule(input: &Image<B, D>, levels: usize) -> Result<Self> {
        let (factors, sigmas) = Self::default_schedule(levels);
        Self::new(input, factors, sigmas)
    }

    /// Default schedule for N levels, coarsest first.
    ///
    /// levels=3 gives factors [4, 2, 1] and sigmas [2.0, 1.0, 0.0].
    pub fn default_schedule(levels: usize) -> (Vec<[usize; D]>, Vec<[f64; D]>) {
        (0..levels)
            .map(|level| {
                let factor = 2usize.pow((levels - 1 - level) as u32);
                let sigma = if factor > 1 { 0.5 * factor as f64 } else { 0.0 };
                ([factor; D], [sigma; D])
            })
            .unzip()
    }

    /// Number of levels still holding a buffer.
    pub fn live_levels(&self) -> usize {
        self.images.iter().filter(|image| image.is_some()).count()
    }
}

impl<B: Backend, const D: usize> ImagePyramid<B, D> for MultiResolutionPyramid<B, D> {
    fn schedule(&self) -> &[[usize; D]] {
        &self.shrink_factors
    }

    fn output(&self, level: usize) -> Result<&Image<B, D>> {
        match self.images.get(level) {
            Some(Some(image)) => Ok(image),
            Some(None) => Err(GeometryError::BufferReleased { level }),
            None => Err(GeometryError::LevelOutOfRange {
                level,
                levels: self.images.len(),
            }),
        }
    }

    fn release_level(&mut self, level: usize) -> bool {
        let released = self.images.get_mut(level).and_then(Option::take).is_some();
        if released {
            tracing::debug!(level, "released pyramid level buffer");
        }
        released
    }

    fn is_released(&self, level: usize) -> bool {
        matches!(self.images.get(level), Some(None))
    }
}
