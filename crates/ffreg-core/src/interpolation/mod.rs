//! Interpolation kernels.
//!
//! The cubic B-spline kernel and its derivatives drive both the free-form
//! deformation and the rigidity penalty stencils.

pub mod bspline;

pub use bspline::{cubic_first_derivatives, cubic_second_derivatives, cubic_weights, CUBIC_ORDER, CUBIC_SUPPORT};
