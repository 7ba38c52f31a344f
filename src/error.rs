//! Custom error types for the telescope client.
//!
//! `TelescopeError` covers the failures that are reported to callers as
//! `Result`s: opening a driver, parsing connection parameters and loading
//! configuration. Faults raised by a live driver are not errors in this sense;
//! they end the device session and reach the host as a
//! [`ClientEvent::Fault`](crate::client::ClientEvent).
//!
//! By using `#[from]`, configuration loader errors convert with `?`.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, TelescopeError>;

/// Primary error type for the crate.
#[derive(Error, Debug)]
pub enum TelescopeError {
    /// The driver identifier could not be resolved to a driver object.
    #[error("Driver '{0}' is not available")]
    DriverUnavailable(String),

    /// The connection parameter string could not be interpreted.
    #[error("Invalid connection parameters: {0}")]
    ConnectionParams(String),

    /// The configuration file or environment could not be read.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl From<figment::Error> for TelescopeError {
    fn from(err: figment::Error) -> Self {
        TelescopeError::Config(Box::new(err))
    }
}
