//! Generic `VehicleApi` trait for remote vehicle clients.
//!
//! The coordinator only ever talks to this trait, so the real HTTP client and
//! the [`SimVehicle`][crate::sim::SimVehicle] can be swapped freely.

use async_trait::async_trait;
use trunklock_types::{CommandSelector, CompartmentApiId, SessionOptions, TrunkError, VehicleData};

/// A remote vehicle reachable over a high-latency API.
///
/// Every call may block for seconds.  Commands sent while the vehicle is
/// asleep may be silently dropped, so callers wake it first.
#[async_trait]
pub trait VehicleApi: Send + Sync {
    /// Fetch the credentials/context needed by the remaining calls.
    ///
    /// # Errors
    ///
    /// Returns [`TrunkError::Session`] when no session can be established.
    async fn fetch_options(&self) -> Result<SessionOptions, TrunkError>;

    /// Wake the vehicle from sleep.
    async fn wake_up(&self, options: &SessionOptions) -> Result<(), TrunkError>;

    /// Sample the vehicle's telemetry.
    ///
    /// `Ok(None)` means the vehicle is unreachable or asleep; that is a valid
    /// answer, not an error.
    async fn vehicle_data(&self) -> Result<Option<VehicleData>, TrunkError>;

    /// Issue `command` against the compartment identified by `api_id`.
    async fn command(
        &self,
        command: CommandSelector,
        options: &SessionOptions,
        api_id: CompartmentApiId,
    ) -> Result<(), TrunkError>;
}
