//! Client adapter between a planetarium host and a telescope mount.
//!
//! The mount is reached through a vendor-neutral automation driver
//! ([`driver::TelescopeDriver`]). A [`client::DriverClient`] keeps a
//! [`session::DeviceSession`] to that driver, samples the mount position with a
//! [`tracker::PositionTracker`], and forwards go-to requests. All positions
//! exchanged with the host are J2000 unit vectors.

pub mod client;
pub mod clock;
pub mod config;
pub mod coordinates;
pub mod driver;
pub mod error;
pub mod logging;
pub mod navigator;
pub mod session;
pub mod tracker;

pub use client::{ClientEvent, DriverClient, TelescopeClient};
pub use coordinates::{EquatorialCoords, Equinox, Vec3};
pub use error::{AppResult, TelescopeError};
