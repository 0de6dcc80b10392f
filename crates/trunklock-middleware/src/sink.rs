//! The push boundary between the coordinator and the protocol layer.
//!
//! The coordinator never talks to a protocol directly.  It reports to a
//! [`StateSink`]; [`BusStateSink`] republishes those reports on the
//! [`EventBus`] so any number of protocol adapters can pick them up.

use std::sync::Arc;

use tracing::debug;
use trunklock_types::{ActuationOutcome, ActuatorDescriptor, AssumedState, Event, EventPayload};

use crate::bus::{EventBus, Topic};

const SOURCE: &str = "trunklock-middleware::sink";

/// Receiver of state pushes for the protocol layer.
///
/// Implementations must not block: pushes happen on the caller-visible path of
/// a set-state request.
pub trait StateSink: Send + Sync {
    /// Report the new current state of `descriptor`'s compartment.
    fn push_current_state(&self, descriptor: &ActuatorDescriptor, state: AssumedState);

    /// Called once a background actuation ends.  Purely informational; the
    /// default ignores it.
    fn actuation_finished(
        &self,
        _descriptor: &ActuatorDescriptor,
        _opening: bool,
        _outcome: &ActuationOutcome,
    ) {
    }
}

/// [`StateSink`] that publishes every report to the [`EventBus`].
#[derive(Clone, Debug)]
pub struct BusStateSink {
    bus: Arc<EventBus>,
}

impl BusStateSink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl StateSink for BusStateSink {
    fn push_current_state(&self, descriptor: &ActuatorDescriptor, state: AssumedState) {
        let delivered = self.bus.publish_to(
            Topic::StateUpdates,
            Event::new(
                SOURCE,
                EventPayload::CurrentStateAssumed {
                    subtype: descriptor.subtype.to_string(),
                    state,
                },
            ),
        );
        debug!(compartment = descriptor.subtype, state = %state.state(), delivered, "pushed current state");
    }

    fn actuation_finished(
        &self,
        descriptor: &ActuatorDescriptor,
        opening: bool,
        outcome: &ActuationOutcome,
    ) {
        self.bus.publish_to(
            Topic::Actuation,
            Event::new(
                SOURCE,
                EventPayload::ActuationFinished {
                    subtype: descriptor.subtype.to_string(),
                    opening,
                    outcome: outcome.clone(),
                },
            ),
        );
    }
}
