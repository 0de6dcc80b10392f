//! `trunklock-hal` – Vehicle API boundary
//!
//! # Modules
//!
//! - [`vehicle`] – [`VehicleApi`][vehicle::VehicleApi]: the async trait every
//!   remote vehicle client implements (session options, wake-up, telemetry and
//!   the direction-agnostic trunk command).
//! - [`sim`] – [`SimVehicle`][sim::SimVehicle]: an in-process vehicle with
//!   configurable latency, sleep behaviour and fault injection, used by the CLI
//!   and by headless tests.

pub mod sim;
pub mod vehicle;

pub use sim::{SimFault, SimVehicle};
pub use vehicle::VehicleApi;
