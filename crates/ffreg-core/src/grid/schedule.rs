//! Per-level grid spacing factors.

use crate::error::{GeometryError, Result};
use crate::geometry::Vector;

/// Ordered grid-spacing factors, one vector per resolution level.
///
/// Level 0 is the coarsest. The effective grid spacing at level `L` is
/// `base_spacing ⊙ factor(L)`. Factors must not increase from one level to
/// the next unless the schedule was built with [`GridSchedule::with_override`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridSchedule<const D: usize> {
    factors: Vec<Vector<D>>,
    overridden: bool,
}

impl<const D: usize> GridSchedule<D> {
    /// Create a validated coarse-to-fine schedule.
    pub fn new(factors: Vec<Vector<D>>) -> Result<Self> {
        Self::validate_values(&factors)?;
        for (level, pair) in factors.windows(2).enumerate() {
            for axis in 0..D {
                if pair[1][axis] > pair[0][axis] {
                    return Err(GeometryError::invalid_schedule(format!(
                        "factor along axis {} increases from level {} ({}) to level {} ({})",
                        axis,
                        level,
                        pair[0][axis],
                        level + 1,
                        pair[1][axis]
                    )));
                }
            }
        }
        Ok(Self {
            factors,
            overridden: false,
        })
    }

    /// Create a schedule without the non-increasing check.
    pub fn with_override(factors: Vec<Vector<D>>) -> Result<Self> {
        Self::validate_values(&factors)?;
        Ok(Self {
            factors,
            overridden: true,
        })
    }

    /// Power-of-two schedule: levels=3 gives factors [4, 2, 1].
    pub fn default_schedule(levels: usize) -> Self {
        let factors = (0..levels)
            .map(|level| Vector::<D>::repeat(2f64.powi((levels - 1 - level) as i32)))
            .collect();
        Self {
            factors,
            overridden: false,
        }
    }

    /// Same factor along every axis for each level.
    pub fn from_uniform_factors(factors: &[f64]) -> Result<Self> {
        Self::new(factors.iter().map(|&f| Vector::<D>::repeat(f)).collect())
    }

    /// Build from a flat list holding either one value per level or `D`
    /// values per level.
    pub fn from_flat(values: &[f64], levels: usize) -> Result<Self> {
        if values.len() == levels {
            Self::from_uniform_factors(values)
        } else if values.len() == levels * D {
            Self::new(
                values
                    .chunks(D)
                    .map(|chunk| Vector::<D>::from_column_slice(chunk))
                    .collect(),
            )
        } else {
            Err(GeometryError::invalid_schedule(format!(
                "expected {} or {} values for {} levels, got {}",
                levels,
                levels * D,
                levels,
                values.len()
            )))
        }
    }

    pub fn levels(&self) -> usize {
        self.factors.len()
    }

    pub fn factor(&self, level: usize) -> Option<&Vector<D>> {
        self.factors.get(level)
    }

    pub fn factors(&self) -> &[Vector<D>] {
        &self.factors
    }

    /// Whether the ordering check was skipped.
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    fn validate_values(factors: &[Vector<D>]) -> Result<()> {
        if factors.is_empty() {
            return Err(GeometryError::invalid_schedule("schedule needs at least one level"));
        }
        for (level, factor) in factors.iter().enumerate() {
            for axis in 0..D {
                let f = factor[axis];
                if !f.is_finite() || f <= 0.0 {
                    return Err(GeometryError::invalid_schedule(format!(
                        "factor at level {} axis {} must be positive, got {}",
                        level, axis, f
                    )));
                }
            }
        }
        Ok(())
    }
}
