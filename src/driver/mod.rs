//! Telescope driver capability surface.
//!
//! A driver is the vendor-neutral automation object that talks to the mount.
//! The client only ever sees it through [`TelescopeDriver`]: typed property
//! accessors plus the unpark and slew commands. Any call may fail with a
//! [`DriverFault`]; drivers can also report faults out-of-band through the
//! [`FaultSender`] they receive when opened.
//!
//! # Architecture
//!
//! ```text
//! DriverFactory::open(id, fault_tx) --> Box<dyn TelescopeDriver>
//!                                         |  sync calls -> DriverResult<T>
//!                                         |  async faults -> fault_tx
//!                                         v
//!                                   DeviceSession
//! ```

pub mod registry;
pub mod simulated;

pub use registry::DriverRegistry;
pub use simulated::{DriverCall, MountState, SimulatedMount};

use crate::error::{AppResult, TelescopeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Exception reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFault {
    /// Driver-specific error number
    pub code: i32,
    /// Component that raised the fault
    pub source: String,
    /// Human-readable explanation
    pub description: String,
}

impl DriverFault {
    /// Fault with the given code, source and description.
    pub fn new(code: i32, source: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code,
            source: source.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for DriverFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "driver fault {} from {}: {}",
            self.code, self.source, self.description
        )
    }
}

// `source` is a plain string here, so the error has no underlying cause
impl std::error::Error for DriverFault {}

/// Result of a single driver call.
pub type DriverResult<T> = std::result::Result<T, DriverFault>;

/// Channel a driver uses to deliver faults outside of a call.
pub type FaultSender = mpsc::UnboundedSender<DriverFault>;

/// Coordinate system a driver claims to use.
///
/// Reported by drivers but not used to second-guess the configured
/// [`Equinox`](crate::coordinates::Equinox).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EquatorialSystem {
    /// Custom or unknown equinox and/or reference frame.
    #[default]
    Other,
    /// Coordinates of the current date (JNow).
    Topocentric,
    /// J2000 equator/equinox.
    J2000,
    /// J2050 equator/equinox.
    J2050,
    /// B1950 equinox, FK4 reference frame.
    B1950,
}

/// Typed view of a telescope automation driver.
///
/// Right ascension is in hours, declination in degrees, both in the
/// equinox the driver is configured for.
pub trait TelescopeDriver: Send {
    /// Whether the link to the mount is up.
    fn connected(&self) -> DriverResult<bool>;
    /// Open or close the link to the mount.
    fn set_connected(&mut self, connected: bool) -> DriverResult<()>;

    /// Whether the mount is in its park position.
    fn at_park(&self) -> DriverResult<bool>;
    /// Whether sidereal tracking is on.
    fn tracking(&self) -> DriverResult<bool>;
    /// Switch sidereal tracking.
    fn set_tracking(&mut self, tracking: bool) -> DriverResult<()>;

    /// Whether synchronous slews are supported.
    fn can_slew(&self) -> DriverResult<bool>;
    /// Whether asynchronous slews are supported.
    fn can_slew_async(&self) -> DriverResult<bool>;
    /// Whether tracking can be switched.
    fn can_set_tracking(&self) -> DriverResult<bool>;
    /// Whether the mount can be unparked.
    fn can_unpark(&self) -> DriverResult<bool>;

    /// Current right ascension, hours.
    fn right_ascension(&self) -> DriverResult<f64>;
    /// Current declination, degrees.
    fn declination(&self) -> DriverResult<f64>;
    /// Coordinate system the driver reports in.
    fn equatorial_system(&self) -> DriverResult<EquatorialSystem>;

    /// Leave the park position.
    fn unpark(&mut self) -> DriverResult<()>;
    /// Blocks until the slew completes.
    fn slew_to_coordinates(&mut self, ra_hours: f64, dec_degrees: f64) -> DriverResult<()>;
    /// Starts the slew and returns immediately.
    fn slew_to_coordinates_async(&mut self, ra_hours: f64, dec_degrees: f64)
        -> DriverResult<()>;
}

/// Resolves driver identifiers to driver objects.
pub trait DriverFactory {
    /// Open the driver named `driver_id`.
    ///
    /// # Errors
    /// Returns [`TelescopeError::DriverUnavailable`] if no such driver can be
    /// instantiated.
    fn open(&self, driver_id: &str, faults: FaultSender) -> AppResult<Box<dyn TelescopeDriver>>;
}

/// Parsed client connection parameters.
///
/// The parameter string currently carries only the driver identifier
/// (e.g. `"Simulator.Telescope"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Identifier passed to the [`DriverFactory`]
    pub driver_id: String,
}

impl ConnectionParams {
    /// Parse a connection parameter string; the id must be non-empty without inner whitespace.
    pub fn parse(params: &str) -> AppResult<Self> {
        let driver_id = params.trim();
        if driver_id.is_empty() {
            return Err(TelescopeError::ConnectionParams(
                "driver identifier is empty".to_string(),
            ));
        }
        if driver_id.chars().any(char::is_whitespace) {
            return Err(TelescopeError::ConnectionParams(format!(
                "driver identifier '{}' contains whitespace",
                driver_id
            )));
        }
        Ok(Self {
            driver_id: driver_id.to_string(),
        })
    }
}
