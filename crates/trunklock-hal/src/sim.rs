//! In-process simulated vehicle for CI/CD testing without a real car.
//!
//! [`SimVehicle`] implements [`VehicleApi`] with plausible behaviour:
//!
//! - every remote call (wake, telemetry, command) takes `latency` to complete;
//! - while asleep, telemetry is absent and commands are accepted but dropped;
//! - `actuate_trunk` toggles the addressed compartment;
//! - any stage can be made to fail with [`SimFault`].
//!
//! Call counters let tests assert exactly which remote calls were made.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use trunklock_hal::sim::SimVehicle;
//! use trunklock_types::CompartmentApiId;
//!
//! let vehicle = SimVehicle::new()
//!     .with_latency(Duration::from_millis(10))
//!     .with_open(CompartmentApiId::Rear, true);
//! assert!(vehicle.is_open(CompartmentApiId::Rear));
//! ```

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use trunklock_types::{
    CommandSelector, CompartmentApiId, SessionOptions, TrunkError, VehicleData, VehicleState,
};

use crate::vehicle::VehicleApi;

/// A remote call that [`SimVehicle`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimFault {
    Options,
    Wake,
    Telemetry,
    Command,
}

#[derive(Debug, Default)]
struct SimState {
    awake: bool,
    front_open: bool,
    rear_open: bool,
    /// Telemetry stays absent even when awake.
    telemetry_offline: bool,
    faults: HashSet<SimFault>,
}

/// Simulated vehicle.  Always starts awake with both compartments closed.
#[derive(Debug)]
pub struct SimVehicle {
    vehicle_id: String,
    access_token: String,
    latency: Duration,
    state: Mutex<SimState>,
    options_calls: AtomicUsize,
    wake_calls: AtomicUsize,
    telemetry_calls: AtomicUsize,
    commands: Mutex<Vec<(CommandSelector, CompartmentApiId)>>,
}

impl Default for SimVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimVehicle {
    pub fn new() -> Self {
        Self {
            vehicle_id: "sim-vehicle".to_string(),
            access_token: String::new(),
            latency: Duration::ZERO,
            state: Mutex::new(SimState {
                awake: true,
                ..SimState::default()
            }),
            options_calls: AtomicUsize::new(0),
            wake_calls: AtomicUsize::new(0),
            telemetry_calls: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Delay applied to every wake, telemetry and command call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    /// Start asleep: telemetry is absent until [`VehicleApi::wake_up`].
    pub fn asleep(self) -> Self {
        self.lock_state().awake = false;
        self
    }

    pub fn with_open(self, api_id: CompartmentApiId, open: bool) -> Self {
        self.set_open(api_id, open);
        self
    }

    /// Never report telemetry, even after wake-up.
    pub fn with_telemetry_offline(self) -> Self {
        self.lock_state().telemetry_offline = true;
        self
    }

    pub fn with_fault(self, fault: SimFault) -> Self {
        self.inject_fault(fault);
        self
    }

    pub fn inject_fault(&self, fault: SimFault) {
        self.lock_state().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.lock_state().faults.clear();
    }

    /// Change a compartment behind the coordinator's back, as the owner
    /// pressing the key fob would.
    pub fn set_open(&self, api_id: CompartmentApiId, open: bool) {
        let mut state = self.lock_state();
        match api_id {
            CompartmentApiId::Front => state.front_open = open,
            CompartmentApiId::Rear => state.rear_open = open,
        }
    }

    pub fn is_open(&self, api_id: CompartmentApiId) -> bool {
        let state = self.lock_state();
        match api_id {
            CompartmentApiId::Front => state.front_open,
            CompartmentApiId::Rear => state.rear_open,
        }
    }

    pub fn is_awake(&self) -> bool {
        self.lock_state().awake
    }

    pub fn put_to_sleep(&self) {
        self.lock_state().awake = false;
    }

    pub fn options_calls(&self) -> usize {
        self.options_calls.load(Ordering::SeqCst)
    }

    pub fn wake_calls(&self) -> usize {
        self.wake_calls.load(Ordering::SeqCst)
    }

    pub fn telemetry_calls(&self) -> usize {
        self.telemetry_calls.load(Ordering::SeqCst)
    }

    pub fn command_calls(&self) -> usize {
        self.commands().len()
    }

    /// Every command received, in arrival order.
    pub fn commands(&self) -> Vec<(CommandSelector, CompartmentApiId)> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn faulted(&self, fault: SimFault) -> bool {
        self.lock_state().faults.contains(&fault)
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl VehicleApi for SimVehicle {
    async fn fetch_options(&self) -> Result<SessionOptions, TrunkError> {
        self.options_calls.fetch_add(1, Ordering::SeqCst);
        if self.faulted(SimFault::Options) {
            return Err(TrunkError::Session("simulated authentication failure".to_string()));
        }
        Ok(SessionOptions {
            vehicle_id: self.vehicle_id.clone(),
            access_token: self.access_token.clone(),
        })
    }

    async fn wake_up(&self, options: &SessionOptions) -> Result<(), TrunkError> {
        self.wake_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        if self.faulted(SimFault::Wake) {
            return Err(TrunkError::Wake(format!(
                "vehicle {} did not respond",
                options.vehicle_id
            )));
        }
        self.lock_state().awake = true;
        debug!(vehicle_id = %options.vehicle_id, "sim vehicle awake");
        Ok(())
    }

    async fn vehicle_data(&self) -> Result<Option<VehicleData>, TrunkError> {
        self.telemetry_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        if self.faulted(SimFault::Telemetry) {
            return Err(TrunkError::Telemetry("simulated upstream error".to_string()));
        }
        let state = self.lock_state();
        if !state.awake || state.telemetry_offline {
            return Ok(None);
        }
        Ok(Some(VehicleData {
            vehicle_state: VehicleState {
                ft: state.front_open,
                rt: state.rear_open,
            },
        }))
    }

    async fn command(
        &self,
        command: CommandSelector,
        options: &SessionOptions,
        api_id: CompartmentApiId,
    ) -> Result<(), TrunkError> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((command, api_id));
        self.round_trip().await;
        if self.faulted(SimFault::Command) {
            return Err(TrunkError::Command(format!(
                "{} rejected for {}",
                command.as_str(),
                api_id.as_str()
            )));
        }
        let mut state = self.lock_state();
        if !state.awake {
            debug!(vehicle_id = %options.vehicle_id, "sim vehicle asleep; command dropped");
            return Ok(());
        }
        match (command, api_id) {
            (CommandSelector::ActuateTrunk, CompartmentApiId::Front) => {
                state.front_open = !state.front_open;
            }
            (CommandSelector::ActuateTrunk, CompartmentApiId::Rear) => {
                state.rear_open = !state.rear_open;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn options(vehicle: &SimVehicle) -> SessionOptions {
        vehicle.fetch_options().await.expect("sim options")
    }

    #[tokio::test]
    async fn telemetry_reports_compartment_flags() {
        let vehicle = SimVehicle::new().with_open(CompartmentApiId::Front, true);
        let data = vehicle.vehicle_data().await.unwrap().unwrap();
        assert!(data.is_open(CompartmentApiId::Front));
        assert!(!data.is_open(CompartmentApiId::Rear));
        assert_eq!(vehicle.telemetry_calls(), 1);
    }

    #[tokio::test]
    async fn asleep_vehicle_has_no_telemetry_until_woken() {
        let vehicle = SimVehicle::new().asleep();
        assert!(vehicle.vehicle_data().await.unwrap().is_none());

        let opts = options(&vehicle).await;
        vehicle.wake_up(&opts).await.unwrap();
        assert!(vehicle.is_awake());
        assert!(vehicle.vehicle_data().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn actuate_toggles_only_the_addressed_compartment() {
        let vehicle = SimVehicle::new();
        let opts = options(&vehicle).await;

        vehicle
            .command(CommandSelector::ActuateTrunk, &opts, CompartmentApiId::Rear)
            .await
            .unwrap();
        assert!(vehicle.is_open(CompartmentApiId::Rear));
        assert!(!vehicle.is_open(CompartmentApiId::Front));

        vehicle
            .command(CommandSelector::ActuateTrunk, &opts, CompartmentApiId::Rear)
            .await
            .unwrap();
        assert!(!vehicle.is_open(CompartmentApiId::Rear));
        assert_eq!(vehicle.command_calls(), 2);
    }

    #[tokio::test]
    async fn command_while_asleep_is_silently_dropped() {
        let vehicle = SimVehicle::new().asleep();
        let opts = options(&vehicle).await;
        vehicle
            .command(CommandSelector::ActuateTrunk, &opts, CompartmentApiId::Front)
            .await
            .unwrap();
        assert!(!vehicle.is_open(CompartmentApiId::Front));
        assert_eq!(vehicle.command_calls(), 1);
    }

    #[tokio::test]
    async fn injected_faults_fail_their_stage() {
        let vehicle = SimVehicle::new()
            .with_fault(SimFault::Wake)
            .with_fault(SimFault::Telemetry);
        let opts = options(&vehicle).await;
        assert!(matches!(vehicle.wake_up(&opts).await, Err(TrunkError::Wake(_))));
        assert!(matches!(vehicle.vehicle_data().await, Err(TrunkError::Telemetry(_))));

        vehicle.clear_faults();
        assert!(vehicle.wake_up(&opts).await.is_ok());
    }

    #[tokio::test]
    async fn options_fault_returns_session_error() {
        let vehicle = SimVehicle::new().with_fault(SimFault::Options);
        assert!(matches!(vehicle.fetch_options().await, Err(TrunkError::Session(_))));
        assert_eq!(vehicle.options_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_calls_take_configured_latency() {
        let vehicle = SimVehicle::new().with_latency(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        vehicle.vehicle_data().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn offline_telemetry_stays_absent_after_wake() {
        let vehicle = SimVehicle::new().asleep().with_telemetry_offline();
        let opts = options(&vehicle).await;
        vehicle.wake_up(&opts).await.unwrap();
        assert!(vehicle.vehicle_data().await.unwrap().is_none());
    }
}
