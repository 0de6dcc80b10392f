//! `trunklock-runtime` – The Actuation Coordinator
//!
//! Exposes a toggle-only trunk latch through lock-style set/get semantics.
//!
//! # Modules
//!
//! - [`state_reader`] – [`StateReader`][state_reader::StateReader]: maps
//!   vehicle telemetry onto the [`BinaryState`][trunklock_types::BinaryState]
//!   vocabulary.  Unreachable vehicles read as secured.
//! - [`coordinator`] – [`ActuationCoordinator`][coordinator::ActuationCoordinator]:
//!   accepts a target state, detaches the wake → re-check → actuate sequence
//!   onto its own task and pushes an assumed confirmation after a debounce
//!   delay.
//! - [`lock_service`] – [`LockMechanismService`][lock_service::LockMechanismService]:
//!   the HomeKit-style `LockCurrentState` / `LockTargetState` facade over one
//!   coordinator.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter for
//!   the per-request `set_target_state` / `actuation` spans.

pub mod coordinator;
pub mod lock_service;
pub mod state_reader;
pub mod telemetry;

pub use coordinator::{ActuationCoordinator, CoordinatorConfig, DEFAULT_DEBOUNCE};
pub use lock_service::{Characteristic, LockMechanismService};
pub use state_reader::StateReader;
pub use telemetry::{LogFormat, TracerProviderGuard, TracingSettings, init_tracing, init_tracing_with};
