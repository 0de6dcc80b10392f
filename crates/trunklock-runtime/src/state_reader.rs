//! [`StateReader`] – telemetry to lock-state mapping.
//!
//! The protocol distinguishes a *current* and a *target* state, but the
//! vehicle only knows whether a compartment is open right now.  Both queries
//! therefore sample the same telemetry through one internal function.

use std::sync::Arc;

use tracing::{debug, warn};
use trunklock_hal::VehicleApi;
use trunklock_types::{ActuatorDescriptor, BinaryState, VehicleData};

/// Answers state queries for one compartment.
#[derive(Clone)]
pub struct StateReader {
    api: Arc<dyn VehicleApi>,
    descriptor: ActuatorDescriptor,
}

impl StateReader {
    pub fn new(api: Arc<dyn VehicleApi>, descriptor: ActuatorDescriptor) -> Self {
        Self { api, descriptor }
    }

    /// Current state of the compartment.  Never fails: an unreachable vehicle
    /// reads as [`BinaryState::Secured`].
    pub async fn read_current_state(&self) -> BinaryState {
        self.sample("current").await
    }

    /// Target state of the compartment, which is the sampled physical state.
    pub async fn read_target_state(&self) -> BinaryState {
        self.sample("target").await
    }

    async fn sample(&self, query: &'static str) -> BinaryState {
        let data = match self.api.vehicle_data().await {
            Ok(data) => data,
            Err(e) => {
                warn!(compartment = self.descriptor.subtype, error = %e, "telemetry fetch failed; assuming closed");
                None
            }
        };
        let opened = opened(data.as_ref(), &self.descriptor);
        debug!(compartment = self.descriptor.subtype, query, opened, "sampled compartment state");
        BinaryState::from_opened(opened)
    }
}

/// Absent telemetry counts as closed.
pub(crate) fn opened(data: Option<&VehicleData>, descriptor: &ActuatorDescriptor) -> bool {
    data.is_some_and(|d| d.is_open(descriptor.api_id))
}
