//! Control-grid geometry and multi-resolution grid schedules.
//!
//! A [`GridScheduler`] turns an image domain and a per-level spacing
//! schedule into one [`ControlGrid`] per resolution level.

pub mod computer;
pub mod control_grid;
pub mod periodic;
pub mod schedule;

pub use computer::{GridScheduleComputer, GridScheduler, TILING_TOLERANCE};
pub use control_grid::ControlGrid;
pub use periodic::PeriodicGridScheduleComputer;
pub use schedule::GridSchedule;
