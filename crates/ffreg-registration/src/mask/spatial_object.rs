//! Host-side mask with physical inside/outside queries.

use burn::tensor::backend::Backend;
use ffreg_core::geometry::Point;
use ffreg_core::image::{Image, ImageDomain};

use super::ImageSide;
use crate::error::Result;

/// Binary region of interest over an image domain.
///
/// A point is inside when its nearest voxel lies in the lattice and is
/// foreground. Points outside the lattice are outside the mask.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSpatialObject<const D: usize> {
    domain: ImageDomain<D>,
    inside: Vec<bool>,
    side: ImageSide,
    eroded: bool,
}

impl<const D: usize> MaskSpatialObject<D> {
    /// Wrap a host buffer. Fails if its length does not match the domain.
    pub fn new(domain: ImageDomain<D>, inside: Vec<bool>, side: ImageSide, eroded: bool) -> Result<Self> {
        if inside.len() != domain.number_of_voxels() {
            return Err(ffreg_core::GeometryError::DimensionMismatch {
                expected: domain.number_of_voxels(),
                actual: inside.len(),
            }
            .into());
        }
        Ok(Self {
            domain,
            inside,
            side,
            eroded,
        })
    }

    /// Download a mask image; voxels above 0.5 are inside.
    pub fn from_image<B: Backend>(image: &Image<B, D>, side: ImageSide, eroded: bool) -> Result<Self> {
        let inside = image.to_host()?.into_iter().map(|v| v > 0.5).collect();
        Self::new(image.domain(), inside, side, eroded)
    }

    pub fn domain(&self) -> &ImageDomain<D> {
        &self.domain
    }

    pub fn side(&self) -> ImageSide {
        self.side
    }

    pub fn is_eroded(&self) -> bool {
        self.eroded
    }

    pub fn is_inside(&self, point: &Point<D>) -> bool {
        self.domain
            .nearest_index(point)
            .is_some_and(|index| self.inside[self.domain.linear_index(&index)])
    }

    /// Number of foreground voxels.
    pub fn number_of_inside_voxels(&self) -> usize {
        self.inside.iter().filter(|&&v| v).count()
    }

    /// Whether no voxel is foreground.
    pub fn is_empty(&self) -> bool {
        !self.inside.iter().any(|&v| v)
    }
}
