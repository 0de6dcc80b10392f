use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Two-valued lock vocabulary used for both the current and the target state
/// of a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryState {
    /// Compartment closed (or assumed closed).
    Secured,
    /// Compartment open.
    Unsecured,
}

impl BinaryState {
    /// HomeKit numeric value for `LockCurrentState` / `LockTargetState`.
    pub const HAP_UNSECURED: u8 = 0;
    pub const HAP_SECURED: u8 = 1;

    /// Map a compartment-open flag onto the lock vocabulary.
    pub fn from_opened(opened: bool) -> Self {
        if opened {
            BinaryState::Unsecured
        } else {
            BinaryState::Secured
        }
    }

    pub fn is_unsecured(self) -> bool {
        self == BinaryState::Unsecured
    }

    pub fn hap_value(self) -> u8 {
        match self {
            BinaryState::Unsecured => Self::HAP_UNSECURED,
            BinaryState::Secured => Self::HAP_SECURED,
        }
    }

    /// Parse a HomeKit `LockTargetState` write.
    ///
    /// # Errors
    ///
    /// Returns [`TrunkError::InvalidCharacteristicValue`] for anything other
    /// than `0` (unsecured) or `1` (secured).
    pub fn from_hap_value(value: u8) -> Result<Self, TrunkError> {
        match value {
            Self::HAP_UNSECURED => Ok(BinaryState::Unsecured),
            Self::HAP_SECURED => Ok(BinaryState::Secured),
            other => Err(TrunkError::InvalidCharacteristicValue(other)),
        }
    }
}

impl fmt::Display for BinaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryState::Secured => write!(f, "secured"),
            BinaryState::Unsecured => write!(f, "unsecured"),
        }
    }
}

/// A state pushed to the protocol layer that was derived from the requested
/// target, not from telemetry sampled after actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumedState(pub BinaryState);

impl AssumedState {
    pub fn new(state: BinaryState) -> Self {
        Self(state)
    }

    pub fn state(self) -> BinaryState {
        self.0
    }
}

/// Device-API command issued to a compartment.  The vehicle only supports a
/// direction-agnostic "actuate".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandSelector {
    ActuateTrunk,
}

impl CommandSelector {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandSelector::ActuateTrunk => "actuate_trunk",
        }
    }
}

/// Compartment identifier understood by the device API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompartmentApiId {
    Front,
    Rear,
}

impl CompartmentApiId {
    pub fn as_str(self) -> &'static str {
        match self {
            CompartmentApiId::Front => "front",
            CompartmentApiId::Rear => "rear",
        }
    }
}

impl FromStr for CompartmentApiId {
    type Err = TrunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "frunk" => Ok(CompartmentApiId::Front),
            "rear" | "trunk" => Ok(CompartmentApiId::Rear),
            other => Err(TrunkError::UnknownCompartment(other.to_string())),
        }
    }
}

/// Static description of one physical compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorDescriptor {
    /// Display name, e.g. `"Front Trunk"`.
    pub name: &'static str,
    /// Protocol service subtype, e.g. `"frontTrunk"`.
    pub subtype: &'static str,
    pub command: CommandSelector,
    pub api_id: CompartmentApiId,
}

pub const FRONT_TRUNK: ActuatorDescriptor = ActuatorDescriptor {
    name: "Front Trunk",
    subtype: "frontTrunk",
    command: CommandSelector::ActuateTrunk,
    api_id: CompartmentApiId::Front,
};

pub const REAR_TRUNK: ActuatorDescriptor = ActuatorDescriptor {
    name: "Trunk",
    subtype: "trunk",
    command: CommandSelector::ActuateTrunk,
    api_id: CompartmentApiId::Rear,
};

impl ActuatorDescriptor {
    /// Every compartment known to the system.
    pub const ALL: [ActuatorDescriptor; 2] = [FRONT_TRUNK, REAR_TRUNK];

    /// Protocol-visible service name, prefixed with the vehicle's name.
    pub fn service_name(&self, vehicle_name: &str) -> String {
        let vehicle_name = vehicle_name.trim();
        if vehicle_name.is_empty() {
            self.name.to_string()
        } else {
            format!("{vehicle_name} {}", self.name)
        }
    }
}

/// Credentials and context required by every device-API call after the
/// initial fetch.  The token is wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionOptions {
    pub vehicle_id: String,
    pub access_token: String,
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("vehicle_id", &self.vehicle_id)
            .field(
                "access_token",
                if self.access_token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .finish()
    }
}

/// Vehicle telemetry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleData {
    pub vehicle_state: VehicleState,
}

/// Trunk sensors.
///
/// The API reports each flag as a number or a bool depending on firmware.
/// Any non-zero number or `true` means open; `null` or a missing field means
/// closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Front trunk.
    #[serde(default, deserialize_with = "open_flag")]
    pub ft: bool,
    /// Rear trunk.
    #[serde(default, deserialize_with = "open_flag")]
    pub rt: bool,
}

fn open_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Num(f64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(open)) => open,
        Some(Flag::Num(n)) => n != 0.0,
        None => false,
    })
}

impl VehicleData {
    pub fn is_open(&self, api_id: CompartmentApiId) -> bool {
        match api_id {
            CompartmentApiId::Front => self.vehicle_state.ft,
            CompartmentApiId::Rear => self.vehicle_state.rt,
        }
    }
}

/// Remote call made by a background actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuationStage {
    Wake,
    Telemetry,
    Command,
}

impl fmt::Display for ActuationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuationStage::Wake => write!(f, "wake"),
            ActuationStage::Telemetry => write!(f, "telemetry"),
            ActuationStage::Command => write!(f, "command"),
        }
    }
}

/// How a background actuation ended.  Never returned to the caller of a
/// set-state request; only logged and published for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActuationOutcome {
    /// Telemetry already matched the requested direction.
    Skipped,
    /// The toggle command was accepted by the device API.
    Actuated,
    Failed { stage: ActuationStage, reason: String },
    TimedOut { stage: ActuationStage },
}

/// Unified event wrapper for the state-update bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "trunklock-middleware::sink"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Optimistic current-state confirmation for a compartment.
    CurrentStateAssumed { subtype: String, state: AssumedState },
    ActuationFinished {
        subtype: String,
        opening: bool,
        outcome: ActuationOutcome,
    },
}

/// Global error type spanning device-API failures and protocol misuse.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrunkError {
    #[error("Session options unavailable: {0}")]
    Session(String),

    #[error("Wake-up failed: {0}")]
    Wake(String),

    #[error("Telemetry fetch failed: {0}")]
    Telemetry(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Invalid characteristic value: {0}")]
    InvalidCharacteristicValue(u8),

    #[error("Characteristic is read-only: {0}")]
    ReadOnlyCharacteristic(String),

    #[error("Unknown compartment: {0}")]
    UnknownCompartment(String),
}
