//! Driver registry keyed by driver identifier.
//!
//! Maps identifiers such as `"Simulator.Telescope"` to constructors, the way
//! an automation runtime resolves a class name to an object. Unknown
//! identifiers fail with [`TelescopeError::DriverUnavailable`].

use super::{DriverFactory, FaultSender, SimulatedMount, TelescopeDriver};
use crate::error::{AppResult, TelescopeError};
use std::collections::HashMap;
use tracing::debug;

/// Identifier the built-in simulated mount is registered under.
pub const SIMULATOR_DRIVER_ID: &str = "Simulator.Telescope";

type DriverConstructor =
    Box<dyn Fn(FaultSender) -> AppResult<Box<dyn TelescopeDriver>> + Send + Sync>;

/// Registry of available telescope drivers.
#[derive(Default)]
pub struct DriverRegistry {
    constructors: HashMap<String, DriverConstructor>,
}

impl DriverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a fresh [`SimulatedMount`] under [`SIMULATOR_DRIVER_ID`].
    pub fn with_simulator() -> Self {
        let mut registry = Self::new();
        registry.register(SIMULATOR_DRIVER_ID, SimulatedMount::default().into_constructor());
        registry
    }

    /// Register a constructor, replacing any previous one for `driver_id`.
    pub fn register<F>(&mut self, driver_id: &str, constructor: F)
    where
        F: Fn(FaultSender) -> AppResult<Box<dyn TelescopeDriver>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(driver_id.to_string(), Box::new(constructor));
    }

    /// Registered identifiers, sorted.
    pub fn driver_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl DriverFactory for DriverRegistry {
    fn open(&self, driver_id: &str, faults: FaultSender) -> AppResult<Box<dyn TelescopeDriver>> {
        let constructor = self
            .constructors
            .get(driver_id)
            .ok_or_else(|| TelescopeError::DriverUnavailable(driver_id.to_string()))?;
        debug!("Opening telescope driver '{}'", driver_id);
        constructor(faults)
    }
}
