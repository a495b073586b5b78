//! Hardware capability layer for the microscope controller
//!
//! Defines the device operations the timelapse core consumes and the
//! backends that provide them. Backend selection is explicit configuration;
//! nothing in this crate probes for hardware at startup.

mod error;
mod illumination;
mod ops;
mod simulated;

pub use error::*;
pub use illumination::*;
pub use ops::*;
pub use simulated::*;

use std::sync::Arc;

/// How the controller obtains its device operations.
///
/// The real Sangaboard/camera stack lives with the embedding application;
/// it implements [`DeviceOps`] and is passed in via `External`.
pub enum HardwareBackend {
    /// Deterministic in-process mock. Logs every operation, tracks
    /// brightness and preview state, and writes placeholder frames so the
    /// capture pipeline runs end to end without hardware.
    Simulated,
    /// An embedder-provided implementation wrapping real device SDKs.
    External(SharedDeviceOps),
}

impl HardwareBackend {
    /// Resolve the backend into a shared device-ops handle.
    pub fn into_device_ops(self) -> SharedDeviceOps {
        match self {
            HardwareBackend::Simulated => Arc::new(SimulatedDeviceOps::new()),
            HardwareBackend::External(ops) => ops,
        }
    }
}
