//! Timelapse capture core
//!
//! The scheduling engine behind the microscope control panel: duration
//! string parsing, the session model, the atomic capture step, and the
//! cooperative loop that runs captures at a fixed cadence until a deadline
//! or an explicit stop.

mod capture;
mod executor;
mod session;
mod timespec;

pub use capture::*;
pub use executor::*;
pub use session::*;
pub use timespec::*;
