//! Multi-resolution registration driver.
//!
//! Levels run coarse to fine. For every level the driver
//!
//! 1. enters the level on the mask orchestrator (the returned scope frees
//!    the level's pyramid buffers when it goes out of scope),
//! 2. builds the level's masks and B-spline deformation,
//! 3. prepares every cost component and hands the combined cost to the
//!    external [`Optimizer`],
//! 4. carries the optimized coefficients onto the next level's grid.
//!
//! A failing level stops the run with [`RegistrationError::Aborted`].

use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::Backend;
use ffreg_core::filter::ErosionBackend;
use ffreg_core::geometry::Spacing;
use ffreg_core::grid::{ControlGrid, GridSchedule, GridScheduleComputer, GridScheduler};
use ffreg_core::image::{Image, ImageDomain};
use ffreg_core::transform::{BSplineDeformation, ParametricTransform};

use crate::config::{Configuration, ConfigurationExt};
use crate::diagnostics::{DiagnosticsSink, IterationDiagnostics, TracingDiagnostics};
use crate::error::{RegistrationError, Result};
use crate::mask::{ImageSide, MaskEligibilityResolver, MaskPyramidOrchestrator, MaskSpatialObject};
use crate::metric::{CombinedCost, CostFunction, RegistrationComponent};
use crate::validation::{validate_masks, validate_parameters, validate_weight};

/// Default number of resolution levels.
pub const DEFAULT_NUMBER_OF_RESOLUTIONS: usize = 3;

/// Default final grid spacing, in voxels of the fixed domain.
pub const DEFAULT_GRID_SPACING_IN_VOXELS: f64 = 16.0;

/// Everything a component needs to know about the level being entered.
pub struct LevelSetup<const D: usize> {
    /// Resolution level, 0 = coarsest.
    pub level: usize,
    /// Fixed image domain.
    pub domain: ImageDomain<D>,
    pub grid: ControlGrid<D>,
    /// Deformation over `grid`, shared with every component.
    pub transform: Arc<BSplineDeformation<D>>,
    /// One entry per fixed mask image.
    pub fixed_masks: Vec<Option<MaskSpatialObject<D>>>,
    /// One entry per moving mask image.
    pub moving_masks: Vec<Option<MaskSpatialObject<D>>>,
}

/// The view of a level an optimizer works on.
pub trait Objective {
    fn number_of_parameters(&self) -> usize;

    fn value_and_derivative(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)>;

    /// Report an accepted iterate; drives diagnostics.
    fn end_iteration(&mut self, parameters: &[f64], value: f64);
}

/// External optimizer.
pub trait Optimizer {
    /// Minimise `objective` from `initial`, returning the final parameters.
    fn optimize(&mut self, objective: &mut dyn Objective, initial: Vec<f64>, level: usize) -> Result<Vec<f64>>;
}

/// [`Objective`] over the combined cost of one level.
struct LevelObjective<'a, const D: usize> {
    cost: &'a mut CombinedCost<D>,
    sink: &'a dyn DiagnosticsSink,
    level: usize,
    number_of_parameters: usize,
    iteration: usize,
    started: Instant,
}

impl<const D: usize> Objective for LevelObjective<'_, D> {
    fn number_of_parameters(&self) -> usize {
        self.number_of_parameters
    }

    fn value_and_derivative(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        validate_parameters(parameters, self.number_of_parameters)?;
        self.cost.value_and_derivative(parameters)
    }

    fn end_iteration(&mut self, parameters: &[f64], value: f64) {
        let mut diagnostics = IterationDiagnostics::new(self.level, self.iteration, value, self.started.elapsed());
        self.cost.after_each_iteration(parameters, &mut diagnostics);
        self.sink.on_iteration(&diagnostics);
        self.iteration += 1;
    }
}

/// Outcome of a completed registration.
#[derive(Debug, Clone)]
pub struct RegistrationResult<const D: usize> {
    /// Deformation of the finest level.
    pub transform: Arc<BSplineDeformation<D>>,
    pub parameters: Vec<f64>,
    /// Final cost of every level.
    pub level_values: Vec<f64>,
}

/// Multi-resolution B-spline registration.
pub struct MultiResolutionRegistration<B: Backend, const D: usize> {
    config: Box<dyn Configuration>,
    domain: ImageDomain<D>,
    scheduler: Box<dyn GridScheduler<D>>,
    base_spacing: Option<Spacing<D>>,
    schedule: Option<GridSchedule<D>>,
    orchestrator: MaskPyramidOrchestrator<B, D>,
    fixed_masks: Vec<Image<B, D>>,
    moving_masks: Vec<Image<B, D>>,
    cost: CombinedCost<D>,
    sink: Box<dyn DiagnosticsSink>,
}

impl<B: Backend, const D: usize> MultiResolutionRegistration<B, D> {
    /// Registration over the fixed image `domain`.
    pub fn new(config: impl Configuration + 'static, domain: ImageDomain<D>) -> Self {
        Self {
            config: Box::new(config),
            domain,
            scheduler: Box::new(GridScheduleComputer::default()),
            base_spacing: None,
            schedule: None,
            orchestrator: MaskPyramidOrchestrator::new(),
            fixed_masks: Vec::new(),
            moving_masks: Vec::new(),
            cost: CombinedCost::new(),
            sink: Box::new(TracingDiagnostics::default()),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn GridScheduler<D>>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Grid spacing of the finest level before schedule factors.
    pub fn with_base_spacing(mut self, spacing: Spacing<D>) -> Self {
        self.base_spacing = Some(spacing);
        self
    }

    pub fn with_schedule(mut self, schedule: GridSchedule<D>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: MaskPyramidOrchestrator<B, D>) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_fixed_masks(mut self, masks: Vec<Image<B, D>>) -> Self {
        self.fixed_masks = masks;
        self
    }

    pub fn with_moving_masks(mut self, masks: Vec<Image<B, D>>) -> Self {
        self.moving_masks = masks;
        self
    }

    /// Add a weighted cost component.
    pub fn with_component(mut self, weight: f64, component: Box<dyn RegistrationComponent<D>>) -> Self {
        self.cost.push(weight, component);
        self
    }

    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn orchestrator(&self) -> &MaskPyramidOrchestrator<B, D> {
        &self.orchestrator
    }

    /// Number of levels: `NumberOfResolutions`, else the explicit schedule,
    /// else the pyramids, else [`DEFAULT_NUMBER_OF_RESOLUTIONS`].
    pub fn number_of_levels(&self) -> Result<usize> {
        let pyramid_levels = self.orchestrator.levels()?;
        let fallback = self
            .schedule
            .as_ref()
            .map(GridSchedule::levels)
            .or(pyramid_levels)
            .unwrap_or(DEFAULT_NUMBER_OF_RESOLUTIONS);
        let levels: usize = self.config.read_or("NumberOfResolutions", 0, fallback)?;
        if levels == 0 {
            return Err(RegistrationError::invalid_configuration("NumberOfResolutions", "must be at least 1"));
        }
        if let Some(pyramid_levels) = pyramid_levels {
            if pyramid_levels != levels {
                return Err(RegistrationError::invalid_configuration(
                    "NumberOfResolutions",
                    format!("{} levels requested but the pyramids have {}", levels, pyramid_levels),
                ));
            }
        }
        Ok(levels)
    }

    /// Finest-level grid spacing: explicit, else
    /// `FinalGridSpacingInPhysicalUnits` (1 or D values), else
    /// [`DEFAULT_GRID_SPACING_IN_VOXELS`] voxels.
    fn resolve_base_spacing(&self) -> Result<Spacing<D>> {
        if let Some(spacing) = self.base_spacing {
            return Ok(spacing);
        }
        let key = "FinalGridSpacingInPhysicalUnits";
        let values: Vec<f64> = self.config.read_all(key)?;
        match values.len() {
            0 => Ok(self.domain.spacing() * DEFAULT_GRID_SPACING_IN_VOXELS),
            1 => Ok(Spacing::<D>::repeat(values[0])),
            n if n == D => Ok(Spacing::<D>::from_column_slice(&values)),
            n => Err(RegistrationError::invalid_configuration(
                key,
                format!("expected 1 or {} values, got {}", D, n),
            )),
        }
    }

    /// Explicit schedule, else `GridSpacingSchedule`, else powers of two.
    fn resolve_schedule(&self, levels: usize) -> Result<GridSchedule<D>> {
        let schedule = match &self.schedule {
            Some(schedule) => schedule.clone(),
            None => {
                let values: Vec<f64> = self.config.read_all("GridSpacingSchedule")?;
                if values.is_empty() {
                    GridSchedule::default_schedule(levels)
                } else {
                    GridSchedule::from_flat(&values, levels)?
                }
            }
        };
        if schedule.levels() != levels {
            return Err(RegistrationError::invalid_configuration(
                "GridSpacingSchedule",
                format!("{} levels in schedule, {} requested", schedule.levels(), levels),
            ));
        }
        Ok(schedule)
    }

    /// Run every level with `optimizer`.
    pub fn run(&mut self, optimizer: &mut dyn Optimizer) -> Result<RegistrationResult<D>> {
        self.domain.validate()?;
        validate_masks("fixed mask", &self.fixed_masks, &self.domain)?;
        for (name, weight) in self.cost.describe() {
            validate_weight(name, weight)?;
        }

        let levels = self.number_of_levels()?;
        let schedule = self.resolve_schedule(levels)?;
        let base_spacing = self.resolve_base_spacing()?;
        let grids = self.scheduler.compute_schedule(&self.domain, &base_spacing, &schedule)?;
        tracing::info!(
            levels,
            components = self.cost.len(),
            fixed_masks = self.fixed_masks.len(),
            moving_masks = self.moving_masks.len(),
            "starting registration"
        );

        self.cost.before_registration(self.config.as_ref())?;

        let mut previous: Option<(Arc<BSplineDeformation<D>>, Vec<f64>)> = None;
        let mut level_values = Vec::with_capacity(levels);
        for (level, grid) in grids.into_iter().enumerate() {
            match self.run_level(level, grid, previous.take(), optimizer) {
                Ok((transform, parameters, value)) => {
                    level_values.push(value);
                    previous = Some((transform, parameters));
                }
                Err(e) => {
                    self.sink.on_error(level, &e.to_string());
                    return Err(RegistrationError::aborted(level, e));
                }
            }
        }

        let (transform, parameters) = previous.ok_or_else(|| {
            RegistrationError::invalid_configuration("NumberOfResolutions", "no level was run")
        })?;
        Ok(RegistrationResult {
            transform,
            parameters,
            level_values,
        })
    }

    fn run_level(
        &mut self,
        level: usize,
        grid: ControlGrid<D>,
        previous: Option<(Arc<BSplineDeformation<D>>, Vec<f64>)>,
        optimizer: &mut dyn Optimizer,
    ) -> Result<(Arc<BSplineDeformation<D>>, Vec<f64>, f64)> {
        let config = self.config.as_ref();
        let mut scope = self.orchestrator.enter_level(level)?;

        // Without the key the strategy the orchestrator was built with stays.
        if let Some(backend) = config.read_parameter::<ErosionBackend>("MaskErosionBackend", "", level, 0, false)? {
            scope.set_erosion_backend(backend);
        }
        let resolver = MaskEligibilityResolver::new(config);
        let fixed_masks = scope.build_level_masks(&self.fixed_masks, &resolver, ImageSide::Fixed, level)?;
        let moving_masks = scope.build_level_masks(&self.moving_masks, &resolver, ImageSide::Moving, level)?;

        let transform = Arc::new(BSplineDeformation::new(grid.clone()));
        let initial = match previous {
            Some((previous_transform, previous_parameters)) => {
                previous_transform.transfer_parameters(&previous_parameters, &grid)?
            }
            None => transform.identity_parameters(),
        };
        let number_of_parameters = transform.number_of_parameters();

        let setup = LevelSetup {
            level,
            domain: self.domain.clone(),
            grid,
            transform: transform.clone(),
            fixed_masks,
            moving_masks,
        };
        self.sink.on_level_start(level, &setup.grid.size());
        self.cost.before_each_resolution(config, &setup)?;
        self.cost.initialize(&initial)?;

        let mut objective = LevelObjective {
            cost: &mut self.cost,
            sink: self.sink.as_ref(),
            level,
            number_of_parameters,
            iteration: 0,
            started: Instant::now(),
        };
        let parameters = optimizer.optimize(&mut objective, initial, level)?;
        validate_parameters(&parameters, number_of_parameters)?;

        let value = self.cost.value(&parameters)?;
        self.sink.on_level_complete(level, value);
        drop(scope);
        Ok((transform, parameters, value))
    }
}
