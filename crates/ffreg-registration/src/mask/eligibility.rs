//! Per-level mask erosion flags from layered configuration.

use super::ImageSide;
use crate::config::{Configuration, ConfigurationExt};
use crate::error::Result;

/// Resolved erosion flags for the masks of one side at one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskEligibility {
    /// One flag per mask, in mask order.
    pub erode: Vec<bool>,
    /// OR of `erode`.
    pub any: bool,
}

impl MaskEligibility {
    pub fn new(erode: Vec<bool>) -> Self {
        let any = erode.iter().any(|&e| e);
        Self { erode, any }
    }

    pub fn len(&self) -> usize {
        self.erode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.erode.is_empty()
    }
}

/// Decides which masks require erosion.
pub trait MaskResolver {
    /// Returns exactly `number_of_masks` flags.
    fn resolve(&self, number_of_masks: usize, side: ImageSide, level: usize) -> Result<MaskEligibility>;
}

/// Resolver over the keys `ErodeMask`, `Erode<Side>Mask` and
/// `Erode<Side>Mask<i>`, each read at entry `level` with fallback to entry 0.
///
/// The most specific key present wins: a per-mask key overrides the side
/// key, which overrides the global key. With nothing configured every mask
/// is eroded.
pub struct MaskEligibilityResolver<'a, C: Configuration + ?Sized> {
    config: &'a C,
}

impl<'a, C: Configuration + ?Sized> MaskEligibilityResolver<'a, C> {
    pub fn new(config: &'a C) -> Self {
        Self { config }
    }
}

impl<C: Configuration + ?Sized> MaskResolver for MaskEligibilityResolver<'_, C> {
    fn resolve(&self, number_of_masks: usize, side: ImageSide, level: usize) -> Result<MaskEligibility> {
        let side_key = format!("Erode{}Mask", side.key_name());

        let global = self.config.read_or("ErodeMask", level, true)?;
        let side_default = self.config.read_or(&side_key, level, global)?;

        let erode = (0..number_of_masks)
            .map(|index| self.config.read_or(&format!("{}{}", side_key, index), level, side_default))
            .collect::<Result<Vec<bool>>>()?;

        let eligibility = MaskEligibility::new(erode);
        tracing::debug!(
            %side,
            level,
            flags = ?eligibility.erode,
            any = eligibility.any,
            "resolved mask erosion"
        );
        Ok(eligibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParameterMap;

    #[test]
    fn test_default_erodes_everything() {
        let config = ParameterMap::new();
        let resolved = MaskEligibilityResolver::new(&config).resolve(3, ImageSide::Fixed, 0).unwrap();
        assert_eq!(resolved.erode, vec![true, true, true]);
        assert!(resolved.any);
    }

    #[test]
    fn test_per_mask_override_wins() {
        let config = ParameterMap::new()
            .with("ErodeMask", [false])
            .with("ErodeFixedMask", [true])
            .with("ErodeFixedMask0", [false]);
        let resolver = MaskEligibilityResolver::new(&config);

        let fixed = resolver.resolve(2, ImageSide::Fixed, 0).unwrap();
        assert_eq!(fixed.erode, vec![false, true]);
        assert!(fixed.any);

        // The moving side only sees the global default.
        let moving = resolver.resolve(2, ImageSide::Moving, 0).unwrap();
        assert_eq!(moving.erode, vec![false, false]);
        assert!(!moving.any);
    }

    #[test]
    fn test_per_level_entries() {
        let config = ParameterMap::new().with("ErodeMovingMask", [true, false]);
        let resolver = MaskEligibilityResolver::new(&config);
        assert_eq!(resolver.resolve(1, ImageSide::Moving, 0).unwrap().erode, vec![true]);
        assert_eq!(resolver.resolve(1, ImageSide::Moving, 1).unwrap().erode, vec![false]);
    }

    #[test]
    fn test_zero_masks() {
        let config = ParameterMap::new();
        let resolved = MaskEligibilityResolver::new(&config).resolve(0, ImageSide::Moving, 2).unwrap();
        assert!(resolved.is_empty());
        assert!(!resolved.any);
    }
}
