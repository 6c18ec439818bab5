//! Geometry, image and transform primitives for multi-resolution free-form
//! registration.
//!
//! - [`grid`]: control-grid geometry and per-level grid schedules, including
//!   a periodic axis that tiles exactly.
//! - [`transform`]: parametric transforms, chiefly the cubic B-spline
//!   deformation.
//! - [`filter`]: Gaussian pyramids and mask erosion backends.

pub mod error;
pub mod filter;
pub mod geometry;
pub mod grid;
pub mod image;
pub mod interpolation;
pub mod transform;

pub use error::{GeometryError, Result};
pub use geometry::{Direction, Point, Spacing, Vector};
pub use image::{Image, ImageDomain};
