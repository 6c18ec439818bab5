//! Distance between corresponding landmark pairs.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ffreg_core::geometry::Point;
use ffreg_core::transform::ParametricTransform;
use serde::{Deserialize, Serialize};

use super::trait_::{CostFunction, RegistrationComponent};
use crate::config::{Configuration, ConfigurationExt};
use crate::error::{RegistrationError, Result};
use crate::registration::LevelSetup;

/// Per-pair distance measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// `|T(m) - f|^2`
    #[default]
    Squared,
    /// `|T(m) - f|`
    Euclidean,
}

impl FromStr for DistanceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "squared" => Ok(Self::Squared),
            "euclidean" => Ok(Self::Euclidean),
            other => Err(format!("unknown distance mode '{}'", other)),
        }
    }
}

impl fmt::Display for DistanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Squared => write!(f, "squared"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// Mean distance between transformed moving points and their fixed
/// counterparts.
///
/// Pairing is positional: moving point `i` belongs to fixed point `i`.
/// With `N` pairs and residual `r_i = T(m_i) - f_i`:
///
/// - squared: value `1/N sum |r_i|^2`, gradient `2/N sum J_i^T r_i`
/// - euclidean: value `1/N sum |r_i|`, gradient `1/N sum J_i^T r_i / |r_i|`
///
/// An empty point set has value 0.
pub struct CorrespondingPointsDistanceMetric<const D: usize> {
    fixed_points: Vec<Point<D>>,
    moving_points: Vec<Point<D>>,
    transform: Arc<dyn ParametricTransform<D>>,
    mode: DistanceMode,
}

impl<const D: usize> CorrespondingPointsDistanceMetric<D> {
    pub fn new(
        fixed_points: Vec<Point<D>>,
        moving_points: Vec<Point<D>>,
        transform: Arc<dyn ParametricTransform<D>>,
    ) -> Result<Self> {
        if fixed_points.len() != moving_points.len() {
            return Err(RegistrationError::PointCountMismatch {
                fixed: fixed_points.len(),
                moving: moving_points.len(),
            });
        }
        Ok(Self {
            fixed_points,
            moving_points,
            transform,
            mode: DistanceMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: DistanceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> DistanceMode {
        self.mode
    }

    pub fn number_of_points(&self) -> usize {
        self.fixed_points.len()
    }

    /// Replace the transform the points are mapped with.
    pub fn set_transform(&mut self, transform: Arc<dyn ParametricTransform<D>>) {
        self.transform = transform;
    }
}

impl<const D: usize> CostFunction for CorrespondingPointsDistanceMetric<D> {
    fn name(&self) -> &'static str {
        "corresponding_points"
    }

    fn number_of_parameters(&self) -> usize {
        self.transform.number_of_parameters()
    }

    fn value_and_derivative(&self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        self.check_parameters(parameters)?;
        let mut derivative = vec![0.0; parameters.len()];
        let n = self.fixed_points.len();
        if n == 0 {
            return Ok((0.0, derivative));
        }

        let mut value = 0.0;
        for (fixed, moving) in self.fixed_points.iter().zip(&self.moving_points) {
            let residual = self.transform.transform_point(parameters, moving) - fixed;
            let jacobian = self.transform.jacobian(parameters, moving);
            match self.mode {
                DistanceMode::Squared => {
                    value += residual.norm_squared();
                    jacobian.accumulate_transpose(&residual, 2.0, &mut derivative);
                }
                DistanceMode::Euclidean => {
                    let distance = residual.norm();
                    value += distance;
                    if distance > 0.0 {
                        jacobian.accumulate_transpose(&residual, 1.0 / distance, &mut derivative);
                    }
                }
            }
        }

        let scale = 1.0 / n as f64;
        derivative.iter_mut().for_each(|d| *d *= scale);
        Ok((value * scale, derivative))
    }
}

impl<const D: usize> RegistrationComponent<D> for CorrespondingPointsDistanceMetric<D> {
    fn before_registration(&mut self, config: &dyn Configuration) -> Result<()> {
        self.mode = config.read_or("PointDistanceMode", 0, self.mode)?;
        tracing::debug!(mode = %self.mode, points = self.number_of_points(), "point metric configured");
        Ok(())
    }

    fn before_each_resolution(&mut self, _config: &dyn Configuration, setup: &LevelSetup<D>) -> Result<()> {
        self.transform = setup.transform.clone();
        Ok(())
    }
}
