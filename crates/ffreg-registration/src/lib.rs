//! Multi-resolution free-form registration components.
//!
//! - [`mask`]: per-level mask erosion decisions, eroded mask objects and
//!   pyramid buffer release.
//! - [`regularization`]: the rigidity penalty on B-spline deformations.
//! - [`metric`]: the cost contract and the corresponding-points metric.
//! - [`registration`]: the coarse-to-fine driver around an external
//!   optimizer.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod mask;
pub mod metric;
pub mod registration;
pub mod regularization;
pub mod validation;

pub use config::{Configuration, ConfigurationExt, ParameterMap};
pub use diagnostics::{DiagnosticsSink, HistoryDiagnostics, IterationDiagnostics, TracingDiagnostics};
pub use error::{RegistrationError, Result};
pub use registration::{LevelSetup, MultiResolutionRegistration, Objective, Optimizer, RegistrationResult};
