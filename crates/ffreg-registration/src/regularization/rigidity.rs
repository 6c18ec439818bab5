//! Rigidity penalty for B-spline deformations.
//!
//! The penalty discourages non-rigid motion where a coefficient map is
//! positive. At every valid sample `x` with coefficient `c(x)` and spatial
//! Jacobian `J(x)` of the deformation:
//!
//! - orthonormality: `c * |J^T J - I|_F^2`
//! - properness: `c * (det J - 1)^2`
//! - linearity: `c * sum_i |H_i|_F^2`, `H_i` the Hessian of output
//!   component `i`
//!
//! Each sum is divided by `sum c(x)` over the valid samples. A zero
//! normalizer makes the sub-term 0.
//!
//! Samples sit on the control grid, optionally subdivided, restricted to the
//! image domain and to the first fixed mask. Their B-spline support is
//! cached at [`RigidityPenaltyTerm::initialize`], so an evaluation only
//! touches the parameters that influence each sample.

use std::sync::Arc;

use ffreg_core::geometry::{unravel_index, Matrix, Point, Vector};
use ffreg_core::image::ImageDomain;
use ffreg_core::transform::{BSplineDeformation, ParametricTransform, SupportWeights};
use nalgebra::DMatrix;
use rayon::prelude::*;

use super::coefficient_map::CoefficientMap;
use super::trait_::PenaltyTerm;
use crate::config::{Configuration, ConfigurationExt};
use crate::diagnostics::IterationDiagnostics;
use crate::error::{RegistrationError, Result};
use crate::mask::MaskSpatialObject;
use crate::metric::{CostFunction, RegistrationComponent};
use crate::registration::LevelSetup;

/// Geometry tolerance when comparing coefficient maps with the domain.
const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// Sub-term weights and switches for one level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidityWeights {
    pub orthonormality: f64,
    pub properness: f64,
    pub linearity: f64,
    pub use_orthonormality: bool,
    pub use_properness: bool,
    pub use_linearity: bool,
}

impl Default for RigidityWeights {
    fn default() -> Self {
        Self {
            orthonormality: 1.0,
            properness: 1.0,
            linearity: 1.0,
            use_orthonormality: true,
            use_properness: true,
            use_linearity: true,
        }
    }
}

impl RigidityWeights {
    pub fn new(orthonormality: f64, properness: f64, linearity: f64) -> Self {
        Self {
            orthonormality,
            properness,
            linearity,
            ..Self::default()
        }
    }

    /// Weights as applied: zero for a disabled condition.
    pub fn effective(&self) -> [f64; 3] {
        [
            if self.use_orthonormality { self.orthonormality } else { 0.0 },
            if self.use_properness { self.properness } else { 0.0 },
            if self.use_linearity { self.linearity } else { 0.0 },
        ]
    }

    pub fn is_active(&self) -> bool {
        self.effective().iter().any(|&w| w > 0.0)
    }

    /// Read the weights and switches of `level`.
    pub fn from_configuration(config: &dyn Configuration, level: usize) -> Result<Self> {
        let defaults = Self::default();
        let weights = Self {
            orthonormality: read_weight(config, "OrthonormalityConditionWeight", level, defaults.orthonormality)?,
            properness: read_weight(config, "PropernessConditionWeight", level, defaults.properness)?,
            linearity: read_weight(config, "LinearityConditionWeight", level, defaults.linearity)?,
            use_orthonormality: config.read_or("UseOrthonormalityCondition", level, defaults.use_orthonormality)?,
            use_properness: config.read_or("UsePropernessCondition", level, defaults.use_properness)?,
            use_linearity: config.read_or("UseLinearityCondition", level, defaults.use_linearity)?,
        };
        Ok(weights)
    }
}

fn read_weight(config: &dyn Configuration, key: &str, level: usize, default: f64) -> Result<f64> {
    let weight: f64 = config.read_or(key, level, default)?;
    if !weight.is_finite() || weight < 0.0 {
        return Err(RegistrationError::invalid_configuration(
            key,
            format!("weight must be non-negative, got {}", weight),
        ));
    }
    Ok(weight)
}

/// Normalized, unweighted sub-term values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RigidityComponents {
    pub orthonormality: f64,
    pub properness: f64,
    pub linearity: f64,
}

/// A valid evaluation sample with its cached B-spline support.
#[derive(Debug, Clone)]
struct RigiditySample<const D: usize> {
    coefficient: f64,
    support: SupportWeights<D>,
}

/// Per-worker partial sums.
struct Accumulator {
    orthonormality: f64,
    properness: f64,
    linearity: f64,
    gradient: Vec<f64>,
}

impl Accumulator {
    fn new(len: usize) -> Self {
        Self {
            orthonormality: 0.0,
            properness: 0.0,
            linearity: 0.0,
            gradient: vec![0.0; len],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.orthonormality += other.orthonormality;
        self.properness += other.properness;
        self.linearity += other.linearity;
        for (a, b) in self.gradient.iter_mut().zip(other.gradient) {
            *a += b;
        }
        self
    }
}

/// Rigidity penalty term.
pub struct RigidityPenaltyTerm<const D: usize> {
    weights: RigidityWeights,
    fixed_coefficients: Option<CoefficientMap<D>>,
    moving_coefficients: Option<CoefficientMap<D>>,
    use_everywhere: bool,
    dilate: bool,
    dilation_multiplier: f64,
    subdivision: usize,

    transform: Option<Arc<BSplineDeformation<D>>>,
    domain: Option<ImageDomain<D>>,
    fixed_mask: Option<MaskSpatialObject<D>>,

    samples: Vec<RigiditySample<D>>,
    normalizer: f64,
    last_components: RigidityComponents,
}

impl<const D: usize> Default for RigidityPenaltyTerm<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> RigidityPenaltyTerm<D> {
    /// Term without coefficient maps and default weights. Until maps are set
    /// or [`Self::use_rigidity_everywhere`] is enabled, it evaluates to 0.
    pub fn new() -> Self {
        Self {
            weights: RigidityWeights::default(),
            fixed_coefficients: None,
            moving_coefficients: None,
            use_everywhere: false,
            dilate: false,
            dilation_multiplier: 1.0,
            subdivision: 1,
            transform: None,
            domain: None,
            fixed_mask: None,
            samples: Vec::new(),
            normalizer: 0.0,
            last_components: RigidityComponents::default(),
        }
    }

    pub fn with_fixed_coefficients(mut self, map: CoefficientMap<D>) -> Self {
        self.fixed_coefficients = Some(map);
        self
    }

    /// Map over the moving domain, sampled at `T(x)`.
    pub fn with_moving_coefficients(mut self, map: CoefficientMap<D>) -> Self {
        self.moving_coefficients = Some(map);
        self
    }

    pub fn with_weights(mut self, weights: RigidityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Coefficient 1 everywhere when no map is given.
    pub fn use_rigidity_everywhere(mut self, enabled: bool) -> Self {
        self.use_everywhere = enabled;
        self
    }

    /// Dilate the maps by `multiplier` grid spacings before use.
    pub fn with_dilation(mut self, multiplier: f64) -> Self {
        self.dilate = true;
        self.dilation_multiplier = multiplier;
        self
    }

    /// Samples per control-grid cell along each axis.
    pub fn with_sample_subdivision(mut self, subdivision: usize) -> Self {
        self.subdivision = subdivision.max(1);
        self
    }

    pub fn weights(&self) -> &RigidityWeights {
        &self.weights
    }

    pub fn set_weights(&mut self, weights: RigidityWeights) {
        self.weights = weights;
    }

    /// Attach the level's deformation, image domain and fixed mask. Cached
    /// samples are dropped until the next [`Self::initialize`].
    pub fn prepare_level(
        &mut self,
        transform: Arc<BSplineDeformation<D>>,
        domain: ImageDomain<D>,
        fixed_mask: Option<MaskSpatialObject<D>>,
    ) {
        self.transform = Some(transform);
        self.domain = Some(domain);
        self.fixed_mask = fixed_mask;
        self.samples.clear();
        self.normalizer = 0.0;
    }

    pub fn number_of_samples(&self) -> usize {
        self.samples.len()
    }

    /// Sum of coefficients over the valid samples.
    pub fn normalizer(&self) -> f64 {
        self.normalizer
    }

    /// Sub-terms reported by the last [`RegistrationComponent::after_each_iteration`].
    pub fn last_components(&self) -> RigidityComponents {
        self.last_components
    }

    /// Normalized sub-terms at `parameters`.
    pub fn components(&self, parameters: &[f64]) -> Result<RigidityComponents> {
        let transform = self.transform()?;
        self.check_parameters(parameters)?;
        let acc = self.accumulate(transform, parameters, false);
        Ok(self.normalize(&acc))
    }

    fn transform(&self) -> Result<&BSplineDeformation<D>> {
        self.transform.as_deref().ok_or_else(|| {
            RegistrationError::not_initialized("RigidityPenaltyTerm", "no deformation attached for the current level")
        })
    }

    fn normalize(&self, acc: &Accumulator) -> RigidityComponents {
        if self.normalizer > 0.0 {
            RigidityComponents {
                orthonormality: acc.orthonormality / self.normalizer,
                properness: acc.properness / self.normalizer,
                linearity: acc.linearity / self.normalizer,
            }
        } else {
            RigidityComponents::default()
        }
    }

    /// A coefficient map for the current level, dilated if configured.
    fn level_map(&self, map: Option<&CoefficientMap<D>>, grid_spacing: &Vector<D>) -> Option<CoefficientMap<D>> {
        let map = map?;
        if !self.dilate {
            return Some(map.clone());
        }
        let spacing = map.domain().spacing();
        let radius: [usize; D] = std::array::from_fn(|axis| {
            (self.dilation_multiplier * grid_spacing[axis] / spacing[axis]).ceil().max(0.0) as usize
        });
        tracing::debug!(?radius, "dilating rigidity coefficients");
        Some(map.dilate(radius))
    }

    fn check_map(&self, map: Option<&CoefficientMap<D>>, what: &str, domain: &ImageDomain<D>) -> Result<()> {
        match map {
            Some(map) if !map.domain().is_compatible_with(domain, GEOMETRY_TOLERANCE) => {
                Err(RegistrationError::geometry_mismatch(
                    what,
                    format!("{:?}", domain),
                    format!("{:?}", map.domain()),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Control-grid sample positions in continuous grid-index space.
    fn sample_indices(transform: &BSplineDeformation<D>, subdivision: usize) -> impl IndexedParallelIterator<Item = Point<D>> {
        let grid = transform.grid();
        let size = grid.size();
        let counts: [usize; D] = std::array::from_fn(|axis| {
            if grid.is_periodic(axis) {
                size[axis] * subdivision
            } else {
                size[axis].saturating_sub(1) * subdivision + 1
            }
        });
        let total: usize = counts.iter().product();
        let step = 1.0 / subdivision as f64;
        (0..total).into_par_iter().map(move |linear| {
            let index = unravel_index(linear, &counts);
            Point::<D>::from(Vector::<D>::from_fn(|axis, _| index[axis] as f64 * step))
        })
    }

    fn accumulate(&self, transform: &BSplineDeformation<D>, parameters: &[f64], with_gradient: bool) -> Accumulator {
        let len = if with_gradient { parameters.len() } else { 0 };
        let [w_orthonormality, w_properness, w_linearity] = self.weights.effective();
        let n = transform.number_of_control_points();

        self.samples
            .par_iter()
            .fold(
                || Accumulator::new(len),
                |mut acc, sample| {
                    let c = sample.coefficient;
                    let support = &sample.support;
                    let jacobian = transform.spatial_jacobian_from(parameters, support);
                    let hessians = transform.spatial_hessians_from(parameters, support);

                    let jtj = jacobian.transpose() * jacobian - Matrix::<D>::identity();
                    let det = determinant(&jacobian);
                    acc.orthonormality += c * jtj.norm_squared();
                    acc.properness += c * (det - 1.0).powi(2);
                    acc.linearity += c * hessians.iter().map(|h| h.norm_squared()).sum::<f64>();

                    if !with_gradient {
                        return acc;
                    }

                    // d(density)/dJ for the first-order conditions.
                    let mut jacobian_gradient = Matrix::<D>::zeros();
                    if w_orthonormality > 0.0 {
                        jacobian_gradient += jacobian * jtj * (4.0 * w_orthonormality);
                    }
                    if w_properness > 0.0 {
                        jacobian_gradient += cofactor(&jacobian) * (2.0 * w_properness * (det - 1.0));
                    }
                    let linearity_scale = 2.0 * w_linearity;

                    for (k, &node) in support.nodes.iter().enumerate() {
                        let g = &support.gradients[k];
                        let h = &support.hessians[k];
                        for component in 0..D {
                            let mut d = jacobian_gradient.row(component).transpose().dot(g);
                            if w_linearity > 0.0 {
                                d += linearity_scale * hessians[component].dot(h);
                            }
                            acc.gradient[component * n + node] += c * d;
                        }
                    }
                    acc
                },
            )
            .reduce(|| Accumulator::new(len), Accumulator::merge)
    }
}

/// `det J` through a dense LU.
fn determinant<const D: usize>(jacobian: &Matrix<D>) -> f64 {
    DMatrix::from_fn(D, D, |r, c| jacobian[(r, c)]).determinant()
}

/// Cofactor matrix, the derivative of `det J` with respect to `J`.
fn cofactor<const D: usize>(jacobian: &Matrix<D>) -> Matrix<D> {
    if D == 1 {
        return Matrix::<D>::identity();
    }
    let dense = DMatrix::from_fn(D, D, |r, c| jacobian[(r, c)]);
    Matrix::<D>::from_fn(|r, c| {
        let minor = dense.clone().remove_row(r).remove_column(c).determinant();
        if (r + c) % 2 == 0 {
            minor
        } else {
            -minor
        }
    })
}

impl<const D: usize> CostFunction for RigidityPenaltyTerm<D> {
    fn name(&self) -> &'static str {
        "rigidity"
    }

    fn number_of_parameters(&self) -> usize {
        self.transform.as_ref().map_or(0, |t| t.number_of_parameters())
    }

    fn value_and_derivative(&self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        let transform = self.transform()?;
        self.check_parameters(parameters)?;
        if self.normalizer <= 0.0 || !self.weights.is_active() {
            return Ok((0.0, vec![0.0; parameters.len()]));
        }

        let acc = self.accumulate(transform, parameters, true);
        let components = self.normalize(&acc);
        let [w_orthonormality, w_properness, w_linearity] = self.weights.effective();
        let value = w_orthonormality * components.orthonormality
            + w_properness * components.properness
            + w_linearity * components.linearity;

        let scale = 1.0 / self.normalizer;
        let mut derivative = acc.gradient;
        derivative.iter_mut().for_each(|d| *d *= scale);
        Ok((value, derivative))
    }
}

impl<const D: usize> RegistrationComponent<D> for RigidityPenaltyTerm<D> {
    fn before_registration(&mut self, config: &dyn Configuration) -> Result<()> {
        self.use_everywhere = config.read_or("UseRigidityEverywhere", 0, self.use_everywhere)?;
        self.dilate = config.read_or("DilateRigidityImages", 0, self.dilate)?;
        self.dilation_multiplier = config.read_or("DilationRadiusMultiplier", 0, self.dilation_multiplier)?;
        if !self.dilation_multiplier.is_finite() || self.dilation_multiplier < 0.0 {
            return Err(RegistrationError::invalid_configuration(
                "DilationRadiusMultiplier",
                format!("must be non-negative, got {}", self.dilation_multiplier),
            ));
        }
        let subdivision: usize = config.read_or("RigiditySampleSubdivision", 0, self.subdivision)?;
        if subdivision == 0 {
            return Err(RegistrationError::invalid_configuration("RigiditySampleSubdivision", "must be at least 1"));
        }
        self.subdivision = subdivision;

        let fixed_zero = self.fixed_coefficients.as_ref().is_some_and(CoefficientMap::is_zero);
        let moving_zero = self.moving_coefficients.as_ref().is_some_and(CoefficientMap::is_zero);
        if fixed_zero || moving_zero {
            tracing::warn!(fixed_zero, moving_zero, "rigidity coefficient map has no rigid region");
        }
        tracing::debug!(
            fixed_map = self.fixed_coefficients.is_some(),
            moving_map = self.moving_coefficients.is_some(),
            use_everywhere = self.use_everywhere,
            dilate = self.dilate,
            subdivision = self.subdivision,
            "rigidity penalty configured"
        );
        Ok(())
    }

    fn before_each_resolution(&mut self, config: &dyn Configuration, setup: &LevelSetup<D>) -> Result<()> {
        self.weights = RigidityWeights::from_configuration(config, setup.level)?;
        let fixed_mask = setup.fixed_masks.first().cloned().flatten();
        self.prepare_level(setup.transform.clone(), setup.domain.clone(), fixed_mask);
        tracing::info!(
            level = setup.level,
            orthonormality = self.weights.orthonormality,
            properness = self.weights.properness,
            linearity = self.weights.linearity,
            active = self.weights.is_active(),
            "rigidity weights"
        );
        Ok(())
    }

    fn initialize(&mut self, parameters: &[f64]) -> Result<()> {
        let transform = self.transform.clone().ok_or_else(|| {
            RegistrationError::not_initialized("RigidityPenaltyTerm", "no deformation attached for the current level")
        })?;
        let domain = self.domain.clone().ok_or_else(|| {
            RegistrationError::not_initialized("RigidityPenaltyTerm", "no image domain attached for the current level")
        })?;
        self.check_parameters(parameters)?;
        self.check_map(self.fixed_coefficients.as_ref(), "fixed rigidity coefficient map", &domain)?;
        self.check_map(self.moving_coefficients.as_ref(), "moving rigidity coefficient map", &domain)?;

        let grid = transform.grid();
        let fixed_map = self.level_map(self.fixed_coefficients.as_ref(), grid.spacing());
        let moving_map = self.level_map(self.moving_coefficients.as_ref(), grid.spacing());
        let constant = if self.use_everywhere { 1.0 } else { 0.0 };

        let fixed_mask = self.fixed_mask.as_ref();
        let origin = *grid.origin();
        let direction = *grid.direction();
        let spacing = *grid.spacing();

        let samples: Vec<RigiditySample<D>> = Self::sample_indices(&transform, self.subdivision)
            .filter_map(|t| {
                let point = origin + direction * t.coords.component_mul(&spacing);
                domain.nearest_index(&point)?;
                if fixed_mask.is_some_and(|mask| !mask.is_inside(&point)) {
                    return None;
                }
                let coefficient = match (&fixed_map, &moving_map) {
                    (None, None) => constant,
                    (fixed, moving) => {
                        let fixed = fixed.as_ref().map_or(0.0, |map| map.value_at(&point));
                        let moving = moving.as_ref().map_or(0.0, |map| {
                            map.value_at(&transform.transform_point(parameters, &point))
                        });
                        fixed.max(moving)
                    }
                };
                if coefficient <= 0.0 {
                    return None;
                }
                let support = transform.support(&point);
                (!support.is_empty()).then_some(RigiditySample { coefficient, support })
            })
            .collect();

        self.normalizer = samples.iter().map(|s| s.coefficient).sum();
        self.samples = samples;
        tracing::debug!(
            samples = self.samples.len(),
            normalizer = self.normalizer,
            grid = ?grid.size(),
            "rigidity samples prepared"
        );
        Ok(())
    }

    fn after_each_iteration(&mut self, parameters: &[f64], diagnostics: &mut IterationDiagnostics) {
        match self.components(parameters) {
            Ok(components) => {
                self.last_components = components;
                diagnostics.add_metric("rigidity.orthonormality", components.orthonormality);
                diagnostics.add_metric("rigidity.properness", components.properness);
                diagnostics.add_metric("rigidity.linearity", components.linearity);
            }
            Err(e) => tracing::warn!("rigidity diagnostics unavailable: {}", e),
        }
    }
}

impl<const D: usize> PenaltyTerm<D> for RigidityPenaltyTerm<D> {
    fn sub_terms(&self, parameters: &[f64]) -> Result<Vec<(&'static str, f64)>> {
        let components = self.components(parameters)?;
        Ok(vec![
            ("rigidity.orthonormality", components.orthonormality),
            ("rigidity.properness", components.properness),
            ("rigidity.linearity", components.linearity),
        ])
    }

    fn is_active(&self) -> bool {
        self.weights.is_active() && self.normalizer > 0.0
    }
}
