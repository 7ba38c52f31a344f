//! Device session: the live link to a single telescope driver.
//!
//! The session owns the driver handle exclusively and mediates every call to
//! it. Lifecycle:
//!
//! ```text
//! Uninitialized --open ok--> Initialized/Disconnected --connect ok--> Initialized/Connected
//!       ^                                                                     |
//!       +------------------------- fault (any state, terminal) ---------------+
//! ```
//!
//! Faults reach the session two ways: as the `Err` of a driver call, or through
//! the notification channel handed to the driver when it was opened. The
//! channel is drained before and after every call, so a fault that arrives in
//! the middle of a command sequence stops the sequence at the next step.
//! Once faulted the driver is dropped and never called again.

use crate::client::ClientEvent;
use crate::coordinates::{EquatorialCoords, Equinox, Vec3};
use crate::driver::{ConnectionParams, DriverFactory, DriverFault, DriverResult, TelescopeDriver};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

/// How a go-to command was sent to the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlewMode {
    /// `slew_to_coordinates_async`, returns while the mount moves
    Async,
    /// `slew_to_coordinates`, blocked until the mount arrived
    Sync,
}

/// Formats the host-facing message for a driver fault.
pub fn fault_message(name: &str, fault: &DriverFault) -> String {
    format!(
        "{}: driver error:\nCode: {}\nSource: {}\nDescription: {}",
        name, fault.code, fault.source, fault.description
    )
}

/// Live handle to one telescope driver.
pub struct DeviceSession {
    name: String,
    driver_id: String,
    equinox: Equinox,
    driver: Option<Box<dyn TelescopeDriver>>,
    faults: mpsc::UnboundedReceiver<DriverFault>,
    events: broadcast::Sender<ClientEvent>,
}

impl DeviceSession {
    /// Open the driver named by `params` and bring it on line.
    ///
    /// Never fails: if the driver cannot be opened, refuses to connect, or is
    /// parked without the ability to unpark, the returned session is simply
    /// uninitialized.
    pub fn initialize(
        name: &str,
        params: &ConnectionParams,
        equinox: Equinox,
        factory: &dyn DriverFactory,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let mut session = Self {
            name: name.to_string(),
            driver_id: params.driver_id.clone(),
            equinox,
            driver: None,
            faults: fault_rx,
            events,
        };

        match factory.open(&params.driver_id, fault_tx) {
            Ok(driver) => session.driver = Some(driver),
            Err(e) => {
                debug!("Telescope '{}' not initialized: {}", name, e);
                return session;
            }
        }

        session.bring_online();
        session
    }

    /// Session that never had a driver, e.g. after unusable connection parameters.
    pub fn uninitialized(
        name: &str,
        equinox: Equinox,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        // the sender is dropped at once, nothing will ever arrive
        let (_, fault_rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            driver_id: String::new(),
            equinox,
            driver: None,
            faults: fault_rx,
            events,
        }
    }

    fn bring_online(&mut self) {
        match self.call(|d| d.can_slew()) {
            Some(true) => {}
            Some(false) => warn!(
                "Warning! {} can't receive \"go to\" commands. \
                 Its current position will be displayed only.",
                self.name
            ),
            None => return,
        }

        if !self.try_connect() {
            debug!(
                "Telescope '{}' could not connect to driver '{}'",
                self.name, self.driver_id
            );
            self.release();
            return;
        }

        if self.call(|d| d.at_park()) == Some(true) && self.call(|d| d.can_unpark()) != Some(true)
        {
            debug!(
                "The {} telescope is parked and the client can't unpark it.",
                self.name
            );
            self.release();
            return;
        }

        debug!(
            "Telescope '{}' initialized with driver '{}' ({})",
            self.name, self.driver_id, self.equinox
        );
    }

    /// Display name of the telescope.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Equinox the mount works in.
    pub fn equinox(&self) -> Equinox {
        self.equinox
    }

    /// Whether a driver handle is held. Pending fault notifications are
    /// processed first.
    pub fn is_initialized(&mut self) -> bool {
        self.drain_faults();
        self.driver.is_some()
    }

    /// Live connection state, queried from the driver every time.
    pub fn is_connected(&mut self) -> bool {
        self.call(|d| d.connected()).unwrap_or(false)
    }

    /// Connect if not connected; returns whether the link is up.
    pub fn ensure_connected(&mut self) -> bool {
        match self.call(|d| d.connected()) {
            Some(true) => true,
            Some(false) => self.try_connect(),
            None => false,
        }
    }

    fn try_connect(&mut self) -> bool {
        self.call(|d| d.set_connected(true)).is_some() && self.call(|d| d.connected()) == Some(true)
    }

    /// `None` if uninitialized or the query faulted.
    pub fn is_parked(&mut self) -> Option<bool> {
        self.call(|d| d.at_park())
    }

    /// Raw pointing position in the mount's own equinox.
    pub fn read_position(&mut self) -> Option<EquatorialCoords> {
        let ra_hours = self.call(|d| d.right_ascension())?;
        let dec_degrees = self.call(|d| d.declination())?;
        Some(EquatorialCoords::new(ra_hours, dec_degrees))
    }

    /// Send the mount to `target`, already expressed in the mount's equinox.
    ///
    /// Unparks if needed and possible, switches tracking on if needed and
    /// possible, then slews asynchronously when supported, synchronously
    /// otherwise. Returns `None` when the command was dropped: missing
    /// capability, a refused state change, or a fault along the way.
    pub fn dispatch(&mut self, target: Vec3) -> Option<SlewMode> {
        if self.call(|d| d.at_park())? {
            if !self.call(|d| d.can_unpark())? {
                debug!(
                    "The {} telescope is parked and the client can't unpark it.",
                    self.name
                );
                return None;
            }
            self.call(|d| d.unpark())?;
        }

        if !self.call(|d| d.tracking())? {
            if !self.call(|d| d.can_set_tracking())? {
                debug!("Telescope '{}' is not tracking and can't be made to", self.name);
                return None;
            }
            self.call(|d| d.set_tracking(true))?;
            if !self.call(|d| d.tracking())? {
                debug!("Telescope '{}' refused to start tracking", self.name);
                return None;
            }
        }

        let coords = EquatorialCoords::from_direction(&target);

        if self.call(|d| d.can_slew_async())? {
            self.call(|d| d.slew_to_coordinates_async(coords.ra_hours, coords.dec_degrees))?;
            debug!("Telescope '{}' slewing to {}", self.name, coords);
            return Some(SlewMode::Async);
        }
        // blocks the caller until the mount arrives
        if self.call(|d| d.can_slew())? {
            self.call(|d| d.slew_to_coordinates(coords.ra_hours, coords.dec_degrees))?;
            debug!("Telescope '{}' slewed to {}", self.name, coords);
            return Some(SlewMode::Sync);
        }
        None
    }

    /// Terminate the session after a driver exception.
    ///
    /// Drops the driver and emits a single [`ClientEvent::Fault`]. Faults that
    /// arrive after the driver is gone are ignored.
    pub fn handle_fault(&mut self, fault: DriverFault) {
        if self.driver.take().is_none() {
            return;
        }
        let message = fault_message(&self.name, &fault);
        error!("{}", message);
        // no subscribers is fine, the session is over either way
        let _ = self.events.send(ClientEvent::Fault {
            name: self.name.clone(),
            message,
        });
    }

    fn release(&mut self) {
        if self.driver.take().is_some() {
            debug!("Released driver '{}' for '{}'", self.driver_id, self.name);
        }
    }

    fn drain_faults(&mut self) {
        while let Ok(fault) = self.faults.try_recv() {
            self.handle_fault(fault);
        }
    }

    /// Run one driver call, routing any fault into [`Self::handle_fault`].
    fn call<T>(
        &mut self,
        f: impl FnOnce(&mut dyn TelescopeDriver) -> DriverResult<T>,
    ) -> Option<T> {
        self.drain_faults();
        let result = f(self.driver.as_deref_mut()?);
        match result {
            Ok(value) => {
                self.drain_faults();
                self.driver.is_some().then_some(value)
            }
            Err(fault) => {
                self.handle_fault(fault);
                None
            }
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverCall, DriverRegistry, MountState, SimulatedMount};
    use tracing_test::traced_test;

    const DRIVER: &str = "Test.Mount";

    fn open(state: MountState) -> (DeviceSession, SimulatedMount, broadcast::Receiver<ClientEvent>) {
        let mount = SimulatedMount::new(state);
        let mut registry = DriverRegistry::new();
        registry.register(DRIVER, mount.clone().into_constructor());
        let (events, rx) = broadcast::channel(16);
        let params = ConnectionParams::parse(DRIVER).unwrap();
        let session = DeviceSession::initialize("C8", &params, Equinox::J2000, &registry, events);
        (session, mount, rx)
    }

    fn target() -> Vec3 {
        EquatorialCoords::new(6.0, 30.0).to_direction()
    }

    #[test]
    fn test_missing_driver_leaves_session_uninitialized() {
        let registry = DriverRegistry::new();
        let (events, _rx) = broadcast::channel(4);
        let params = ConnectionParams::parse("Missing.Mount").unwrap();
        let mut session =
            DeviceSession::initialize("C8", &params, Equinox::J2000, &registry, events);
        assert!(!session.is_initialized());
        assert!(!session.ensure_connected());
        assert_eq!(session.dispatch(target()), None);
    }

    #[test]
    fn test_initialize_connects() {
        let (mut session, mount, _rx) = open(MountState::default());
        assert!(session.is_initialized());
        assert!(session.is_connected());
        assert!(mount.state().connected);
    }

    #[test]
    #[traced_test]
    fn test_read_only_device_warns_but_initializes() {
        let (mut session, _mount, _rx) = open(MountState {
            can_slew: false,
            can_slew_async: false,
            ..Default::default()
        });
        assert!(session.is_initialized());
        assert!(logs_contain("can't receive \"go to\" commands"));
    }

    #[test]
    fn test_refused_connection_releases_driver() {
        let (mut session, _mount, _rx) = open(MountState {
            refuse_connection: true,
            ..Default::default()
        });
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_parked_without_unpark_releases_driver() {
        let (mut session, mount, _rx) = open(MountState {
            at_park: true,
            can_unpark: false,
            ..Default::default()
        });
        assert!(!session.is_initialized());
        assert!(!mount.calls().contains(&DriverCall::Unpark));
    }

    #[test]
    fn test_ensure_connected_retries() {
        let (mut session, mount, _rx) = open(MountState::default());
        mount.update(|s| s.connected = false);
        assert!(session.ensure_connected());

        mount.update(|s| {
            s.connected = false;
            s.refuse_connection = true;
        });
        assert!(!session.ensure_connected());
        // still initialized, the next call tries again
        assert!(session.is_initialized());
        mount.update(|s| s.refuse_connection = false);
        assert!(session.ensure_connected());
    }

    #[test]
    fn test_dispatch_unparks_then_tracks_then_slews() {
        let (mut session, mount, _rx) = open(MountState::default());
        mount.update(|s| s.at_park = true);
        mount.clear_calls();

        assert_eq!(session.dispatch(target()), Some(SlewMode::Async));

        let commands = mount.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], DriverCall::Unpark);
        assert_eq!(commands[1], DriverCall::SetTracking(true));
        match commands[2] {
            DriverCall::SlewToCoordinatesAsync {
                ra_hours,
                dec_degrees,
            } => {
                assert!((ra_hours - 6.0).abs() < 1e-9);
                assert!((dec_degrees - 30.0).abs() < 1e-9);
            }
            ref other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_parked_and_unparkable_issues_nothing() {
        let (mut session, mount, _rx) = open(MountState::default());
        mount.update(|s| {
            s.at_park = true;
            s.can_unpark = false;
        });
        mount.clear_calls();

        assert_eq!(session.dispatch(target()), None);
        assert!(mount.commands().is_empty());
    }

    #[test]
    fn test_dispatch_without_tracking_capability_is_dropped() {
        let (mut session, mount, _rx) = open(MountState {
            can_set_tracking: false,
            ..Default::default()
        });
        mount.clear_calls();
        assert_eq!(session.dispatch(target()), None);
        assert!(mount.commands().is_empty());
    }

    #[test]
    fn test_dispatch_aborts_when_tracking_does_not_take() {
        let (mut session, mount, _rx) = open(MountState {
            tracking_takes_effect: false,
            ..Default::default()
        });
        mount.clear_calls();
        assert_eq!(session.dispatch(target()), None);
        assert_eq!(mount.commands(), vec![DriverCall::SetTracking(true)]);
    }

    #[test]
    fn test_dispatch_falls_back_to_sync_slew() {
        let (mut session, mount, _rx) = open(MountState {
            tracking: true,
            can_slew_async: false,
            ..Default::default()
        });
        assert_eq!(session.dispatch(target()), Some(SlewMode::Sync));
        assert!(matches!(
            mount.commands().last(),
            Some(DriverCall::SlewToCoordinates { .. })
        ));
    }

    #[test]
    fn test_dispatch_without_slew_capability_is_noop() {
        let (mut session, mount, _rx) = open(MountState {
            tracking: true,
            can_slew: false,
            can_slew_async: false,
            ..Default::default()
        });
        mount.clear_calls();
        assert_eq!(session.dispatch(target()), None);
        assert!(mount.commands().is_empty());
    }

    #[test]
    fn test_fault_from_call_is_terminal() {
        let (mut session, mount, mut rx) = open(MountState::default());
        mount.update(|s| {
            s.fail_on = Some(("AtPark", DriverFault::new(1031, "Mount", "Serial port lost")))
        });

        assert_eq!(session.dispatch(target()), None);
        assert!(!session.is_initialized());

        match rx.try_recv().unwrap() {
            ClientEvent::Fault { name, message } => {
                assert_eq!(name, "C8");
                assert_eq!(
                    message,
                    "C8: driver error:\nCode: 1031\nSource: Mount\nDescription: Serial port lost"
                );
            }
        }

        let calls = mount.calls().len();
        assert!(!session.ensure_connected());
        assert_eq!(session.dispatch(target()), None);
        assert_eq!(mount.calls().len(), calls);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notified_fault_mid_dispatch_stops_sequence() {
        let (mut session, mount, mut rx) = open(MountState::default());
        mount.update(|s| {
            s.at_park = true;
            s.notify_on = Some(("Unpark", DriverFault::new(5, "Transport", "Link dropped")));
        });
        mount.clear_calls();

        assert_eq!(session.dispatch(target()), None);
        assert_eq!(mount.commands(), vec![DriverCall::Unpark]);
        assert!(!session.is_initialized());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_out_of_band_fault_seen_by_is_initialized() {
        let (mut session, mount, mut rx) = open(MountState::default());
        assert!(mount.raise_fault(DriverFault::new(2, "Transport", "Gone")));
        mount.clear_calls();

        assert!(!session.is_initialized());
        assert!(!session.is_initialized());
        assert!(mount.calls().is_empty());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
