//! Per-level mask construction and pyramid buffer lifetime.

use std::ops::{Deref, DerefMut};

use burn::tensor::backend::Backend;
use ffreg_core::filter::{erosion_strategy, ErosionBackend, ImagePyramid, MaskErosion};
use ffreg_core::image::Image;

use super::eligibility::MaskResolver;
use super::spatial_object::MaskSpatialObject;
use super::ImageSide;
use crate::error::{RegistrationError, Result};

/// Erosion radius for a level's shrink factors.
///
/// The fixed side uses the shrink factor itself; the moving side one voxel
/// more to cover the interpolation support at the mask boundary.
pub fn erosion_radius<const D: usize>(shrink_factors: &[usize; D], side: ImageSide) -> [usize; D] {
    let extra = match side {
        ImageSide::Fixed => 0,
        ImageSide::Moving => 1,
    };
    shrink_factors.map(|f| f + extra)
}

/// Builds mask objects for a level and releases pyramid buffers when the
/// level ends.
pub struct MaskPyramidOrchestrator<B: Backend, const D: usize> {
    fixed_pyramid: Option<Box<dyn ImagePyramid<B, D>>>,
    moving_pyramid: Option<Box<dyn ImagePyramid<B, D>>>,
    erosion: Box<dyn MaskErosion<B, D>>,
}

impl<B: Backend, const D: usize> MaskPyramidOrchestrator<B, D> {
    /// Orchestrator without pyramids; masks are then never eroded.
    pub fn new() -> Self {
        Self {
            fixed_pyramid: None,
            moving_pyramid: None,
            erosion: erosion_strategy(ErosionBackend::Cpu),
        }
    }

    pub fn with_fixed_pyramid(mut self, pyramid: Box<dyn ImagePyramid<B, D>>) -> Self {
        self.fixed_pyramid = Some(pyramid);
        self
    }

    pub fn with_moving_pyramid(mut self, pyramid: Box<dyn ImagePyramid<B, D>>) -> Self {
        self.moving_pyramid = Some(pyramid);
        self
    }

    pub fn with_erosion(mut self, erosion: Box<dyn MaskErosion<B, D>>) -> Self {
        self.erosion = erosion;
        self
    }

    /// Switch the erosion strategy.
    pub fn set_erosion_backend(&mut self, backend: ErosionBackend) {
        if self.erosion.name() != backend.to_string() {
            tracing::debug!(%backend, "switching mask erosion backend");
            self.erosion = erosion_strategy(backend);
        }
    }

    pub fn erosion_name(&self) -> &'static str {
        self.erosion.name()
    }

    pub fn pyramid(&self, side: ImageSide) -> Option<&dyn ImagePyramid<B, D>> {
        match side {
            ImageSide::Fixed => self.fixed_pyramid.as_deref(),
            ImageSide::Moving => self.moving_pyramid.as_deref(),
        }
    }

    /// Number of levels of the attached pyramids. Fixed and moving pyramids
    /// must agree.
    pub fn levels(&self) -> Result<Option<usize>> {
        let fixed = self.pyramid(ImageSide::Fixed).map(|p| p.levels());
        let moving = self.pyramid(ImageSide::Moving).map(|p| p.levels());
        match (fixed, moving) {
            (Some(f), Some(m)) if f != m => Err(RegistrationError::geometry_mismatch(
                "moving pyramid level count",
                f.to_string(),
                m.to_string(),
            )),
            (Some(levels), _) | (None, Some(levels)) => Ok(Some(levels)),
            (None, None) => Ok(None),
        }
    }

    /// Mask object for one level.
    ///
    /// - no mask image: `None`, the region is unconstrained;
    /// - erosion disabled or no pyramid for `side`: the raw mask;
    /// - otherwise the mask eroded with [`erosion_radius`] of the level's
    ///   shrink factors. An empty result is an error.
    pub fn build_mask_spatial_object(
        &self,
        mask_image: Option<&Image<B, D>>,
        use_erosion: bool,
        level: usize,
        side: ImageSide,
        mask_index: usize,
    ) -> Result<Option<MaskSpatialObject<D>>> {
        let Some(mask_image) = mask_image else {
            return Ok(None);
        };
        let pyramid = match self.pyramid(side) {
            Some(pyramid) if use_erosion => pyramid,
            _ => return MaskSpatialObject::from_image(mask_image, side, false).map(Some),
        };

        let levels = pyramid.levels();
        let factors = pyramid
            .schedule()
            .get(level)
            .copied()
            .ok_or(RegistrationError::LevelOutOfRange { level, levels })?;
        let radius = erosion_radius(&factors, side);

        let eroded = self
            .erosion
            .erode(mask_image, radius)
            .map_err(|e| RegistrationError::mask_erosion(level, side, mask_index, e.to_string()))?;
        let object = MaskSpatialObject::from_image(&eroded, side, true)
            .map_err(|e| RegistrationError::mask_erosion(level, side, mask_index, e.to_string()))?;
        drop(eroded);

        if object.is_empty() {
            return Err(RegistrationError::mask_erosion(
                level,
                side,
                mask_index,
                format!("eroded mask is empty (radius {:?})", radius),
            ));
        }
        tracing::debug!(
            level,
            %side,
            mask_index,
            ?radius,
            backend = self.erosion.name(),
            inside = object.number_of_inside_voxels(),
            "eroded mask"
        );
        Ok(Some(object))
    }

    /// Mask objects for every mask of one side, eroded as `resolver` decides.
    pub fn build_level_masks(
        &self,
        masks: &[Image<B, D>],
        resolver: &dyn MaskResolver,
        side: ImageSide,
        level: usize,
    ) -> Result<Vec<Option<MaskSpatialObject<D>>>> {
        let eligibility = resolver.resolve(masks.len(), side, level)?;
        masks
            .iter()
            .zip(&eligibility.erode)
            .enumerate()
            .map(|(index, (mask, &erode))| self.build_mask_spatial_object(Some(mask), erode, level, side, index))
            .collect()
    }

    /// Free both pyramids' buffers for a finished level. Returns the number
    /// of buffers freed.
    pub fn release_level_buffers(&mut self, level: usize) -> usize {
        let released = [self.fixed_pyramid.as_deref_mut(), self.moving_pyramid.as_deref_mut()]
            .into_iter()
            .flatten()
            .filter_map(|pyramid| pyramid.release_level(level).then_some(()))
            .count();
        tracing::debug!(level, released, "released level buffers");
        released
    }

    /// Start a level. The returned scope releases the level's buffers when
    /// dropped, on success and error paths alike.
    pub fn enter_level(&mut self, level: usize) -> Result<LevelScope<'_, B, D>> {
        if let Some(levels) = self.levels()? {
            if level >= levels {
                return Err(RegistrationError::LevelOutOfRange { level, levels });
            }
        }
        if let Some(Ok(image)) = self.pyramid(ImageSide::Fixed).map(|p| p.output(level)) {
            tracing::info!(level, shape = ?image.shape(), "entering level");
        }
        Ok(LevelScope {
            orchestrator: self,
            level,
        })
    }
}

impl<B: Backend, const D: usize> Default for MaskPyramidOrchestrator<B, D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one active level.
pub struct LevelScope<'a, B: Backend, const D: usize> {
    orchestrator: &'a mut MaskPyramidOrchestrator<B, D>,
    level: usize,
}

impl<B: Backend, const D: usize> LevelScope<'_, B, D> {
    pub fn level(&self) -> usize {
        self.level
    }
}

impl<B: Backend, const D: usize> Deref for LevelScope<'_, B, D> {
    type Target = MaskPyramidOrchestrator<B, D>;

    fn deref(&self) -> &Self::Target {
        self.orchestrator
    }
}

impl<B: Backend, const D: usize> DerefMut for LevelScope<'_, B, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.orchestrator
    }
}

impl<B: Backend, const D: usize> Drop for LevelScope<'_, B, D> {
    fn drop(&mut self) {
        self.orchestrator.release_level_buffers(self.level);
    }
}
