//! Image types and operations.
//!
//! This module provides the Image type and the ImageDomain describing the
//! physical geometry of a voxel lattice.

pub mod domain;
pub mod image;

pub use domain::ImageDomain;
pub use image::Image;
