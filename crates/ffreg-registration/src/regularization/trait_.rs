//! Penalty term trait definition.

use crate::error::Result;
use crate::metric::RegistrationComponent;

/// Regularization term on transform parameters.
///
/// A penalty is a registration component whose value splits into named
/// sub-terms, reported for diagnostics.
pub trait PenaltyTerm<const D: usize>: RegistrationComponent<D> {
    /// Raw (unweighted, normalized) sub-term values at `parameters`.
    fn sub_terms(&self, parameters: &[f64]) -> Result<Vec<(&'static str, f64)>>;

    /// Whether any sub-term currently carries a positive weight.
    fn is_active(&self) -> bool;
}
