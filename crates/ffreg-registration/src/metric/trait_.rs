//! Cost function contract shared by metrics and penalty terms.
//!
//! An external optimizer only ever sees [`CostFunction`]: a value and a
//! dense gradient at a candidate parameter vector. [`RegistrationComponent`]
//! adds the lifecycle hooks the multi-resolution driver calls around the
//! optimizer.

use crate::config::Configuration;
use crate::diagnostics::IterationDiagnostics;
use crate::error::{RegistrationError, Result};
use crate::registration::LevelSetup;

/// Scalar cost with an analytic gradient.
///
/// Evaluations are pure functions of the parameters and the state cached
/// at level entry, so an optimizer may call them in any order.
pub trait CostFunction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expected length of the parameter vector.
    fn number_of_parameters(&self) -> usize;

    /// Value and gradient at `parameters`.
    fn value_and_derivative(&self, parameters: &[f64]) -> Result<(f64, Vec<f64>)>;

    fn value(&self, parameters: &[f64]) -> Result<f64> {
        Ok(self.value_and_derivative(parameters)?.0)
    }

    fn derivative(&self, parameters: &[f64]) -> Result<Vec<f64>> {
        Ok(self.value_and_derivative(parameters)?.1)
    }

    /// Fail unless `parameters` has the expected length.
    fn check_parameters(&self, parameters: &[f64]) -> Result<()> {
        let expected = self.number_of_parameters();
        if parameters.len() != expected {
            return Err(RegistrationError::ParameterCountMismatch {
                expected,
                actual: parameters.len(),
            });
        }
        Ok(())
    }
}

/// Cost function driven through the registration lifecycle.
///
/// All hooks default to no-ops.
pub trait RegistrationComponent<const D: usize>: CostFunction {
    /// Once, before the first level.
    fn before_registration(&mut self, config: &dyn Configuration) -> Result<()> {
        let _ = config;
        Ok(())
    }

    /// At every level entry, after the level's grid and masks exist.
    fn before_each_resolution(&mut self, config: &dyn Configuration, setup: &LevelSetup<D>) -> Result<()> {
        let _ = (config, setup);
        Ok(())
    }

    /// After level entry, with the level's starting parameters.
    fn initialize(&mut self, parameters: &[f64]) -> Result<()> {
        let _ = parameters;
        Ok(())
    }

    /// After each optimizer iteration; report values for diagnostics.
    fn after_each_iteration(&mut self, parameters: &[f64], diagnostics: &mut IterationDiagnostics) {
        let _ = (parameters, diagnostics);
    }

    /// Request a fresh sample set. Components evaluating on a fixed
    /// sample grid ignore this.
    fn select_new_samples(&mut self) {}
}

/// Weighted sum of registration components.
pub struct CombinedCost<const D: usize> {
    terms: Vec<(f64, Box<dyn RegistrationComponent<D>>)>,
}

impl<const D: usize> CombinedCost<D> {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Add a component with a weight.
    pub fn with_term(mut self, weight: f64, term: Box<dyn RegistrationComponent<D>>) -> Self {
        self.push(weight, term);
        self
    }

    pub fn push(&mut self, weight: f64, term: Box<dyn RegistrationComponent<D>>) {
        self.terms.push((weight, term));
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Weights and names, in insertion order.
    pub fn describe(&self) -> Vec<(&'static str, f64)> {
        self.terms.iter().map(|(w, t)| (t.name(), *w)).collect()
    }
}

impl<const D: usize> Default for CombinedCost<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> CostFunction for CombinedCost<D> {
    fn name(&self) -> &'static str {
        "combined"
    }

    fn number_of_parameters(&self) -> usize {
        self.terms
            .first()
            .map(|(_, t)| t.number_of_parameters())
            .unwrap_or(0)
    }

    fn value_and_derivative(&self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        let mut value = 0.0;
        let mut derivative = vec![0.0; parameters.len()];
        for (weight, term) in &self.terms {
            term.check_parameters(parameters)?;
            if *weight == 0.0 {
                continue;
            }
            let (v, d) = term.value_and_derivative(parameters)?;
            value += weight * v;
            for (acc, g) in derivative.iter_mut().zip(&d) {
                *acc += weight * g;
            }
        }
        Ok((value, derivative))
    }
}

impl<const D: usize> RegistrationComponent<D> for CombinedCost<D> {
    fn before_registration(&mut self, config: &dyn Configuration) -> Result<()> {
        self.terms
            .iter_mut()
            .try_for_each(|(_, term)| term.before_registration(config))
    }

    fn before_each_resolution(&mut self, config: &dyn Configuration, setup: &LevelSetup<D>) -> Result<()> {
        self.terms
            .iter_mut()
            .try_for_each(|(_, term)| term.before_each_resolution(config, setup))
    }

    fn initialize(&mut self, parameters: &[f64]) -> Result<()> {
        self.terms
            .iter_mut()
            .try_for_each(|(_, term)| term.initialize(parameters))
    }

    fn after_each_iteration(&mut self, parameters: &[f64], diagnostics: &mut IterationDiagnostics) {
        for (_, term) in &mut self.terms {
            term.after_each_iteration(parameters, diagnostics);
        }
    }

    fn select_new_samples(&mut self) {
        for (_, term) in &mut self.terms {
            term.select_new_samples();
        }
    }
}
