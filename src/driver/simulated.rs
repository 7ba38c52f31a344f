//! Simulated Telescope Mount
//!
//! In-process driver for running the client without hardware. Every call is
//! recorded, so the order in which the client talks to the mount can be
//! inspected afterwards.
//!
//! The mount state lives behind an `Arc<Mutex<_>>`: clones of a
//! `SimulatedMount` share it, so a caller can keep one clone as a handle
//! while another is boxed up as the session's driver.
//!
//! # Example
//!
//! ```rust,ignore
//! let mount = SimulatedMount::new(MountState { at_park: true, ..Default::default() });
//! let handle = mount.clone();
//! registry.register("Test.Mount", mount.into_constructor());
//! // ... drive the client ...
//! assert!(handle.calls().contains(&DriverCall::Unpark));
//! ```

use super::{
    DriverFault, DriverResult, EquatorialSystem, FaultSender, TelescopeDriver,
};
use crate::error::AppResult;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A call made against the simulated driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    /// `connected` read
    Connected,
    /// `set_connected` with the requested state
    SetConnected(bool),
    /// `at_park` read
    AtPark,
    /// `tracking` read
    Tracking,
    /// `set_tracking` with the requested state
    SetTracking(bool),
    /// `can_slew` read
    CanSlew,
    /// `can_slew_async` read
    CanSlewAsync,
    /// `can_set_tracking` read
    CanSetTracking,
    /// `can_unpark` read
    CanUnpark,
    /// `right_ascension` read
    RightAscension,
    /// `declination` read
    Declination,
    /// `equatorial_system` read
    EquatorialSystem,
    /// `unpark` command
    Unpark,
    /// Synchronous slew command
    SlewToCoordinates {
        /// Target right ascension, hours
        ra_hours: f64,
        /// Target declination, degrees
        dec_degrees: f64,
    },
    /// Asynchronous slew command
    SlewToCoordinatesAsync {
        /// Target right ascension, hours
        ra_hours: f64,
        /// Target declination, degrees
        dec_degrees: f64,
    },
}

impl DriverCall {
    /// Member name as the automation interface spells it.
    pub fn name(&self) -> &'static str {
        match self {
            DriverCall::Connected | DriverCall::SetConnected(_) => "Connected",
            DriverCall::AtPark => "AtPark",
            DriverCall::Tracking | DriverCall::SetTracking(_) => "Tracking",
            DriverCall::CanSlew => "CanSlew",
            DriverCall::CanSlewAsync => "CanSlewAsync",
            DriverCall::CanSetTracking => "CanSetTracking",
            DriverCall::CanUnpark => "CanUnpark",
            DriverCall::RightAscension => "RightAscension",
            DriverCall::Declination => "Declination",
            DriverCall::EquatorialSystem => "EquatorialSystem",
            DriverCall::Unpark => "Unpark",
            DriverCall::SlewToCoordinates { .. } => "SlewToCoordinates",
            DriverCall::SlewToCoordinatesAsync { .. } => "SlewToCoordinatesAsync",
        }
    }

    fn is_command(&self) -> bool {
        matches!(
            self,
            DriverCall::SetConnected(_)
                | DriverCall::SetTracking(_)
                | DriverCall::Unpark
                | DriverCall::SlewToCoordinates { .. }
                | DriverCall::SlewToCoordinatesAsync { .. }
        )
    }
}

/// State of the simulated mount.
#[derive(Debug, Clone)]
pub struct MountState {
    /// Link state
    pub connected: bool,
    /// Connection attempts leave `connected` false (wrong serial port etc.)
    pub refuse_connection: bool,
    /// Parked
    pub at_park: bool,
    /// Sidereal tracking on
    pub tracking: bool,
    /// When false, setting tracking on is accepted but has no effect
    pub tracking_takes_effect: bool,
    /// Synchronous slews supported
    pub can_slew: bool,
    /// Asynchronous slews supported
    pub can_slew_async: bool,
    /// Tracking can be switched
    pub can_set_tracking: bool,
    /// Unpark supported
    pub can_unpark: bool,
    /// Right ascension, hours
    pub ra_hours: f64,
    /// Declination, degrees
    pub dec_degrees: f64,
    /// Reported coordinate system
    pub equatorial_system: EquatorialSystem,
    /// Every call in the order it was made
    pub calls: Vec<DriverCall>,
    /// Member name whose next call fails with the given fault
    pub fail_on: Option<(&'static str, DriverFault)>,
    /// Member name whose next call succeeds but raises the fault out-of-band
    pub notify_on: Option<(&'static str, DriverFault)>,
    /// Out-of-band fault channel, set when the driver is opened
    pub faults: Option<FaultSender>,
}

impl Default for MountState {
    fn default() -> Self {
        Self {
            connected: false,
            refuse_connection: false,
            at_park: false,
            tracking: false,
            tracking_takes_effect: true,
            can_slew: true,
            can_slew_async: true,
            can_set_tracking: true,
            can_unpark: true,
            ra_hours: 0.0,
            dec_degrees: 0.0,
            equatorial_system: EquatorialSystem::Topocentric,
            calls: Vec::new(),
            fail_on: None,
            notify_on: None,
            faults: None,
        }
    }
}

/// Simulated mount implementing [`TelescopeDriver`].
#[derive(Debug, Clone)]
pub struct SimulatedMount {
    state: Arc<Mutex<MountState>>,
}

impl SimulatedMount {
    /// Mount starting in `state`.
    pub fn new(state: MountState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Constructor suitable for [`DriverRegistry::register`](super::DriverRegistry::register).
    ///
    /// Every open shares this mount's state.
    pub fn into_constructor(
        self,
    ) -> impl Fn(FaultSender) -> AppResult<Box<dyn TelescopeDriver>> + Send + Sync + 'static {
        move |faults| {
            let mount = self.clone();
            mount.lock().faults = Some(faults);
            Ok(Box::new(mount) as Box<dyn TelescopeDriver>)
        }
    }

    fn lock(&self) -> MutexGuard<'_, MountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> MountState {
        self.lock().clone()
    }

    /// Apply a change to the state, e.g. parking the mount by hand.
    pub fn update(&self, change: impl FnOnce(&mut MountState)) {
        change(&mut self.lock());
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    /// Calls that change mount state (setters and commands).
    pub fn commands(&self) -> Vec<DriverCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_command())
            .cloned()
            .collect()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Deliver a fault through the notification channel, as a transport would.
    ///
    /// Returns false if no driver has been opened or the session is gone.
    pub fn raise_fault(&self, fault: DriverFault) -> bool {
        match &self.lock().faults {
            Some(tx) => tx.send(fault).is_ok(),
            None => false,
        }
    }

    /// Record a call and apply any armed fault for it.
    fn record(&self, call: DriverCall) -> DriverResult<MutexGuard<'_, MountState>> {
        let mut state = self.lock();
        let name = call.name();
        state.calls.push(call);

        if state.fail_on.as_ref().is_some_and(|(member, _)| *member == name) {
            if let Some((_, fault)) = state.fail_on.take() {
                return Err(fault);
            }
        }
        if state.notify_on.as_ref().is_some_and(|(member, _)| *member == name) {
            if let Some((_, fault)) = state.notify_on.take() {
                if let Some(tx) = &state.faults {
                    let _ = tx.send(fault);
                }
            }
        }
        Ok(state)
    }
}

impl Default for SimulatedMount {
    fn default() -> Self {
        Self::new(MountState::default())
    }
}

impl TelescopeDriver for SimulatedMount {
    fn connected(&self) -> DriverResult<bool> {
        Ok(self.record(DriverCall::Connected)?.connected)
    }

    fn set_connected(&mut self, connected: bool) -> DriverResult<()> {
        let mut state = self.record(DriverCall::SetConnected(connected))?;
        state.connected = connected && !state.refuse_connection;
        Ok(())
    }

    fn at_park(&self) -> DriverResult<bool> {
        Ok(self.record(DriverCall::AtPark)?.at_park)
    }

    fn tracking(&self) -> DriverResult<bool> {
        Ok(self.record(DriverCall::Tracking)?.tracking)
    }

    fn set_tracking(&mut self, tracking: bool) -> DriverResult<()> {
        let mut state = self.record(DriverCall::SetTracking(tracking))?;
        if !tracking || state.tracking_takes_effect {
            state.tracking = tracking;
        }
        Ok(())
    }

    fn can_slew(&self) -> DriverResult<bool> {
        Ok(self.record(DriverCall::CanSlew)?.can_slew)
    }

    fn can_slew_async(&self) -> DriverResult<bool> {
        Ok(self.record(DriverCall::CanSlewAsync)?.can_slew_async)
    }

    fn can_set_tracking(&self) -> DriverResult<bool> {
        Ok(self.record(DriverCall::CanSetTracking)?.can_set_tracking)
    }

    fn can_unpark(&self) -> DriverResult<bool> {
        Ok(self.record(DriverCall::CanUnpark)?.can_unpark)
    }

    fn right_ascension(&self) -> DriverResult<f64> {
        Ok(self.record(DriverCall::RightAscension)?.ra_hours)
    }

    fn declination(&self) -> DriverResult<f64> {
        Ok(self.record(DriverCall::Declination)?.dec_degrees)
    }

    fn equatorial_system(&self) -> DriverResult<EquatorialSystem> {
        Ok(self.record(DriverCall::EquatorialSystem)?.equatorial_system)
    }

    fn unpark(&mut self) -> DriverResult<()> {
        let mut state = self.record(DriverCall::Unpark)?;
        if !state.can_unpark {
            return Err(DriverFault::new(
                0x400,
                "SimulatedMount",
                "Unpark is not supported",
            ));
        }
        state.at_park = false;
        Ok(())
    }

    fn slew_to_coordinates(&mut self, ra_hours: f64, dec_degrees: f64) -> DriverResult<()> {
        let mut state = self.record(DriverCall::SlewToCoordinates {
            ra_hours,
            dec_degrees,
        })?;
        state.ra_hours = ra_hours;
        state.dec_degrees = dec_degrees;
        Ok(())
    }

    fn slew_to_coordinates_async(
        &mut self,
        ra_hours: f64,
        dec_degrees: f64,
    ) -> DriverResult<()> {
        let mut state = self.record(DriverCall::SlewToCoordinatesAsync {
            ra_hours,
            dec_degrees,
        })?;
        // no slew dynamics, the mount arrives immediately
        state.ra_hours = ra_hours;
        state.dec_degrees = dec_degrees;
        Ok(())
    }
}
