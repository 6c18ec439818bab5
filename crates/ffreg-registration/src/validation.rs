//! Validation utilities for registration operations.
//!
//! Input checks run once at registration start or level entry; parameter
//! checks guard the values handed back by the external optimizer.

use burn::tensor::backend::Backend;
use ffreg_core::image::{Image, ImageDomain};

use crate::error::{RegistrationError, Result};

/// Tolerance for comparing image geometries.
pub const DOMAIN_TOLERANCE: f64 = 1e-6;

/// Check the length and finiteness of a parameter vector.
pub fn validate_parameters(parameters: &[f64], expected: usize) -> Result<()> {
    if parameters.len() != expected {
        return Err(RegistrationError::ParameterCountMismatch {
            expected,
            actual: parameters.len(),
        });
    }
    if let Some(index) = parameters.iter().position(|p| !p.is_finite()) {
        return Err(RegistrationError::optimizer(format!(
            "parameter {} is not finite ({})",
            index, parameters[index]
        )));
    }
    Ok(())
}

/// Validate a cost-term weight.
pub fn validate_weight(name: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(RegistrationError::invalid_configuration(
            name,
            format!("weight must be non-negative, got {}", weight),
        ));
    }
    Ok(())
}

/// Validate that two domains describe the same lattice.
pub fn validate_domains<const D: usize>(what: &str, expected: &ImageDomain<D>, actual: &ImageDomain<D>) -> Result<()> {
    if !expected.is_compatible_with(actual, DOMAIN_TOLERANCE) {
        return Err(RegistrationError::geometry_mismatch(
            what,
            format!("{:?}", expected),
            format!("{:?}", actual),
        ));
    }
    Ok(())
}

/// Validate that every mask lies on the image lattice.
pub fn validate_masks<B: Backend, const D: usize>(what: &str, masks: &[Image<B, D>], domain: &ImageDomain<D>) -> Result<()> {
    masks
        .iter()
        .enumerate()
        .try_for_each(|(index, mask)| validate_domains(&format!("{} {}", what, index), domain, &mask.domain()))
}
