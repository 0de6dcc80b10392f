//! HomeKit `LockMechanism` facade for one compartment.
//!
//! The accessory transport is external.  This module only maps the two lock
//! characteristics and their numeric values onto an [`ActuationCoordinator`]:
//!
//! | Characteristic | get | set |
//! |---|---|---|
//! | `LockCurrentState` | [`ActuationCoordinator::read_current_state`] | rejected (read-only) |
//! | `LockTargetState` | [`ActuationCoordinator::read_target_state`] | [`ActuationCoordinator::set_target_state`] |

use std::fmt;
use std::sync::Arc;

use trunklock_types::{BinaryState, TrunkError};

use crate::coordinator::ActuationCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    LockCurrentState,
    LockTargetState,
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Characteristic::LockCurrentState => write!(f, "LockCurrentState"),
            Characteristic::LockTargetState => write!(f, "LockTargetState"),
        }
    }
}

/// A lock service exposing one trunk compartment.
pub struct LockMechanismService {
    service_name: String,
    coordinator: Arc<ActuationCoordinator>,
}

impl LockMechanismService {
    pub fn new(vehicle_name: &str, coordinator: Arc<ActuationCoordinator>) -> Self {
        Self {
            service_name: coordinator.descriptor().service_name(vehicle_name),
            coordinator,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn subtype(&self) -> &'static str {
        self.coordinator.descriptor().subtype
    }

    pub fn coordinator(&self) -> &Arc<ActuationCoordinator> {
        &self.coordinator
    }

    /// Read a characteristic as its HomeKit numeric value.
    pub async fn get(&self, characteristic: Characteristic) -> u8 {
        let state = match characteristic {
            Characteristic::LockCurrentState => self.coordinator.read_current_state().await,
            Characteristic::LockTargetState => self.coordinator.read_target_state().await,
        };
        state.hap_value()
    }

    /// Write a characteristic from its HomeKit numeric value.
    ///
    /// Completes once the coordinator has pushed its confirmation.
    ///
    /// # Errors
    ///
    /// - [`TrunkError::ReadOnlyCharacteristic`] for `LockCurrentState`.
    /// - [`TrunkError::InvalidCharacteristicValue`] for values other than
    ///   `0`/`1`.
    /// - Any session error from [`ActuationCoordinator::set_target_state`].
    pub async fn set(&self, characteristic: Characteristic, value: u8) -> Result<(), TrunkError> {
        match characteristic {
            Characteristic::LockCurrentState => {
                Err(TrunkError::ReadOnlyCharacteristic(characteristic.to_string()))
            }
            Characteristic::LockTargetState => {
                let target = BinaryState::from_hap_value(value)?;
                self.coordinator.set_target_state(target).await
            }
        }
    }
}
