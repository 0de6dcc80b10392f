//! [`ActuationCoordinator`] – lock semantics over a toggle-only latch.
//!
//! A set-state request runs on two paths:
//!
//! 1. **Caller path** – fetch session options (the only step that can fail
//!    the request), detach the actuation onto its own task, sleep for the
//!    debounce delay, then push an [`AssumedState`] equal to the requested
//!    target to the [`StateSink`].
//! 2. **Background path** – wake the vehicle, re-sample telemetry, skip if the
//!    compartment is already where it was asked to be, otherwise send exactly
//!    one direction-agnostic actuate command.  Errors end the task; they are
//!    logged and reported to [`StateSink::actuation_finished`] but never reach
//!    the caller.
//!
//! The protocol rejects a current-state change delivered inside the same
//! response as the target-state write, hence the debounce delay.  The pushed
//! confirmation is not ordered against the background path at all: it may
//! arrive before the vehicle has even woken, and it stays wrong if the
//! actuation fails until the next telemetry read corrects it.
//!
//! Overlapping requests for the same compartment are not serialized.  Each
//! spawns its own background task and two toggles can cancel out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use trunklock_hal::VehicleApi;
use trunklock_middleware::StateSink;
use trunklock_types::{
    ActuationOutcome, ActuationStage, ActuatorDescriptor, AssumedState, BinaryState,
    SessionOptions, TrunkError,
};

use crate::state_reader::{StateReader, opened};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Wait between accepting a target state and pushing the confirmation.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub debounce: Duration,
    /// Upper bound on each remote call made by the background task.  `None`
    /// waits indefinitely.
    pub remote_call_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            remote_call_timeout: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Coordinates state queries and set-state requests for one compartment.
pub struct ActuationCoordinator {
    descriptor: ActuatorDescriptor,
    api: Arc<dyn VehicleApi>,
    reader: StateReader,
    sink: Arc<dyn StateSink>,
    config: CoordinatorConfig,
}

impl ActuationCoordinator {
    pub fn new(
        descriptor: ActuatorDescriptor,
        api: Arc<dyn VehicleApi>,
        sink: Arc<dyn StateSink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            descriptor,
            reader: StateReader::new(Arc::clone(&api), descriptor),
            api,
            sink,
            config,
        }
    }

    pub fn descriptor(&self) -> &ActuatorDescriptor {
        &self.descriptor
    }

    pub async fn read_current_state(&self) -> BinaryState {
        self.reader.read_current_state().await
    }

    pub async fn read_target_state(&self) -> BinaryState {
        self.reader.read_target_state().await
    }

    /// Accept `target` and return after the debounce delay.
    ///
    /// The actuation itself continues on a detached task and must be running
    /// inside a Tokio runtime that outlives this call.
    ///
    /// # Errors
    ///
    /// Returns the device API's error when session options cannot be fetched.
    /// In that case nothing is spawned and no state is pushed.
    #[instrument(skip(self), fields(compartment = self.descriptor.subtype))]
    pub async fn set_target_state(&self, target: BinaryState) -> Result<(), TrunkError> {
        let opening = target.is_unsecured();
        info!(compartment = self.descriptor.subtype, opening, "set target state");

        let options = self.api.fetch_options().await?;

        let request = ActuationRequest {
            opening,
            descriptor: self.descriptor,
            options: Arc::new(options),
            api: Arc::clone(&self.api),
            sink: Arc::clone(&self.sink),
            remote_call_timeout: self.config.remote_call_timeout,
        };
        // Detached: the handle is dropped and the task is never joined.  The
        // task's span is still a child of this request's span.
        drop(tokio::spawn(request.run()));

        tokio::time::sleep(self.config.debounce).await;

        self.sink
            .push_current_state(&self.descriptor, AssumedState::new(target));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background actuation
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one detached actuation needs.  Lives only as long as its task.
struct ActuationRequest {
    opening: bool,
    descriptor: ActuatorDescriptor,
    options: Arc<SessionOptions>,
    api: Arc<dyn VehicleApi>,
    sink: Arc<dyn StateSink>,
    remote_call_timeout: Option<Duration>,
}

impl ActuationRequest {
    #[instrument(
        name = "actuation",
        skip_all,
        fields(compartment = self.descriptor.subtype, opening = self.opening)
    )]
    async fn run(self) {
        let outcome = self.actuate().await;
        let compartment = self.descriptor.subtype;
        match &outcome {
            ActuationOutcome::Skipped => {
                info!(compartment, opening = self.opening, "already in desired state, skipping");
            }
            ActuationOutcome::Actuated => {
                info!(compartment, opening = self.opening, "actuated");
            }
            ActuationOutcome::Failed { stage, reason } => {
                warn!(compartment, %stage, error = %reason, "actuation abandoned");
            }
            ActuationOutcome::TimedOut { stage } => {
                warn!(compartment, %stage, "actuation timed out");
            }
        }
        self.sink
            .actuation_finished(&self.descriptor, self.opening, &outcome);
    }

    async fn actuate(&self) -> ActuationOutcome {
        // Commands sent to a sleeping vehicle are dropped.
        if let Err(outcome) = self
            .remote(ActuationStage::Wake, self.api.wake_up(&self.options))
            .await
        {
            return outcome;
        }

        // Sampled after wake; the compartment may have moved in the meantime.
        let data = match self
            .remote(ActuationStage::Telemetry, self.api.vehicle_data())
            .await
        {
            Ok(data) => data,
            Err(outcome) => return outcome,
        };

        // A toggle on a compartment already in the requested position would
        // move it the wrong way.  Without telemetry there is nothing to compare.
        if data.is_some() && opened(data.as_ref(), &self.descriptor) == self.opening {
            return ActuationOutcome::Skipped;
        }

        info!(compartment = self.descriptor.subtype, "actuating");
        match self
            .remote(
                ActuationStage::Command,
                self.api
                    .command(self.descriptor.command, &self.options, self.descriptor.api_id),
            )
            .await
        {
            Ok(()) => ActuationOutcome::Actuated,
            Err(outcome) => outcome,
        }
    }

    async fn remote<T>(
        &self,
        stage: ActuationStage,
        call: impl Future<Output = Result<T, TrunkError>>,
    ) -> Result<T, ActuationOutcome> {
        debug!(compartment = self.descriptor.subtype, %stage, "remote call");
        let result = match self.remote_call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => return Err(ActuationOutcome::TimedOut { stage }),
            },
            None => call.await,
        };
        result.map_err(|e| ActuationOutcome::Failed {
            stage,
            reason: e.to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use trunklock_hal::{SimFault, SimVehicle};
    use trunklock_types::{CommandSelector, CompartmentApiId, REAR_TRUNK};

    const SLOW: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct RecordingSink {
        pushes: Mutex<Vec<(&'static str, BinaryState)>>,
        outcomes: Mutex<Vec<ActuationOutcome>>,
    }

    impl RecordingSink {
        fn pushes(&self) -> Vec<(&'static str, BinaryState)> {
            self.pushes.lock().unwrap().clone()
        }

        fn outcomes(&self) -> Vec<ActuationOutcome> {
            self.outcomes.lock().unwrap().clone()
        }
    }

    impl StateSink for RecordingSink {
        fn push_current_state(&self, descriptor: &ActuatorDescriptor, state: AssumedState) {
            self.pushes
                .lock()
                .unwrap()
                .push((descriptor.subtype, state.state()));
        }

        fn actuation_finished(
            &self,
            _descriptor: &ActuatorDescriptor,
            _opening: bool,
            outcome: &ActuationOutcome,
        ) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    fn coordinator_with(
        vehicle: SimVehicle,
        config: CoordinatorConfig,
    ) -> (Arc<SimVehicle>, Arc<RecordingSink>, ActuationCoordinator) {
        let vehicle = Arc::new(vehicle);
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            ActuationCoordinator::new(REAR_TRUNK, vehicle.clone(), sink.clone(), config);
        (vehicle, sink, coordinator)
    }

    fn coordinator(vehicle: SimVehicle) -> (Arc<SimVehicle>, Arc<RecordingSink>, ActuationCoordinator) {
        coordinator_with(vehicle, CoordinatorConfig::default())
    }

    /// Let detached tasks run to completion.
    async fn settle() {
        tokio::time::sleep(Duration::from_secs(120)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn set_returns_after_debounce_despite_slow_vehicle() {
        let (vehicle, _, coordinator) = coordinator(SimVehicle::new().asleep().with_latency(SLOW));

        let start = Instant::now();
        coordinator.set_target_state(BinaryState::Unsecured).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= DEFAULT_DEBOUNCE, "returned before debounce: {elapsed:?}");
        assert!(elapsed < SLOW, "waited for the vehicle: {elapsed:?}");
        assert_eq!(vehicle.command_calls(), 0, "actuation cannot have finished yet");
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_is_not_ordered_after_actuation() {
        let (vehicle, sink, coordinator) = coordinator(SimVehicle::new().with_latency(SLOW));

        coordinator.set_target_state(BinaryState::Unsecured).await.unwrap();
        assert_eq!(sink.pushes(), vec![("trunk", BinaryState::Unsecured)]);
        assert!(!vehicle.is_open(CompartmentApiId::Rear));

        settle().await;
        assert!(vehicle.is_open(CompartmentApiId::Rear));
        assert_eq!(sink.outcomes(), vec![ActuationOutcome::Actuated]);
    }

    #[tokio::test(start_paused = true)]
    async fn matching_telemetry_skips_command() {
        for (open, target) in [(true, BinaryState::Unsecured), (false, BinaryState::Secured)] {
            let (vehicle, sink, coordinator) =
                coordinator(SimVehicle::new().with_open(CompartmentApiId::Rear, open));

            coordinator.set_target_state(target).await.unwrap();
            settle().await;

            assert_eq!(vehicle.command_calls(), 0);
            assert_eq!(vehicle.wake_calls(), 1);
            assert_eq!(vehicle.telemetry_calls(), 1);
            assert_eq!(vehicle.is_open(CompartmentApiId::Rear), open);
            assert_eq!(sink.outcomes(), vec![ActuationOutcome::Skipped]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opposite_telemetry_issues_one_direction_agnostic_command() {
        for (open, target) in [(false, BinaryState::Unsecured), (true, BinaryState::Secured)] {
            let (vehicle, _, coordinator) =
                coordinator(SimVehicle::new().with_open(CompartmentApiId::Rear, open));

            coordinator.set_target_state(target).await.unwrap();
            settle().await;

            assert_eq!(
                vehicle.commands(),
                vec![(CommandSelector::ActuateTrunk, CompartmentApiId::Rear)]
            );
            assert_eq!(vehicle.is_open(CompartmentApiId::Rear), !open);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn guard_uses_telemetry_sampled_after_wake() {
        let (vehicle, _, coordinator) = coordinator(SimVehicle::new().asleep());

        coordinator.set_target_state(BinaryState::Unsecured).await.unwrap();
        settle().await;

        assert_eq!(vehicle.wake_calls(), 1);
        assert_eq!(vehicle.telemetry_calls(), 1);
        assert_eq!(vehicle.command_calls(), 1);
        assert!(vehicle.is_open(CompartmentApiId::Rear));
    }

    #[tokio::test(start_paused = true)]
    async fn state_changed_during_wake_is_respected() {
        let (vehicle, sink, coordinator) = coordinator(SimVehicle::new().with_latency(SLOW));

        coordinator.set_target_state(BinaryState::Unsecured).await.unwrap();
        // The owner opens the trunk while the vehicle is still waking.
        vehicle.set_open(CompartmentApiId::Rear, true);
        settle().await;

        assert_eq!(vehicle.command_calls(), 0);
        assert!(vehicle.is_open(CompartmentApiId::Rear));
        assert_eq!(sink.outcomes(), vec![ActuationOutcome::Skipped]);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_telemetry_after_wake_still_actuates() {
        let (vehicle, _, coordinator) =
            coordinator(SimVehicle::new().asleep().with_telemetry_offline());

        coordinator.set_target_state(BinaryState::Secured).await.unwrap();
        settle().await;

        assert_eq!(vehicle.command_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_is_assumed_even_when_vehicle_fails() {
        let (vehicle, sink, coordinator) = coordinator(SimVehicle::new().with_fault(SimFault::Wake));

        coordinator.set_target_state(BinaryState::Unsecured).await.unwrap();
        settle().await;

        assert_eq!(sink.pushes(), vec![("trunk", BinaryState::Unsecured)]);
        assert_eq!(vehicle.command_calls(), 0);
        assert!(!vehicle.is_open(CompartmentApiId::Rear));
        assert!(matches!(
            sink.outcomes().as_slice(),
            [ActuationOutcome::Failed { stage: ActuationStage::Wake, .. }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn secured_confirmation_is_assumed_even_when_vehicle_fails() {
        let (vehicle, sink, coordinator) = coordinator(
            SimVehicle::new()
                .with_open(CompartmentApiId::Rear, true)
                .with_fault(SimFault::Command),
        );

        coordinator.set_target_state(BinaryState::Secured).await.unwrap();
        settle().await;

        assert_eq!(sink.pushes(), vec![("trunk", BinaryState::Secured)]);
        assert_eq!(vehicle.command_calls(), 1);
        assert!(vehicle.is_open(CompartmentApiId::Rear), "failed command must not move the latch");
        assert!(matches!(
            sink.outcomes().as_slice(),
            [ActuationOutcome::Failed { stage: ActuationStage::Command, .. }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn background_failures_are_swallowed() {
        for (fault, stage) in [
            (SimFault::Wake, ActuationStage::Wake),
            (SimFault::Telemetry, ActuationStage::Telemetry),
            (SimFault::Command, ActuationStage::Command),
        ] {
            let (_, sink, coordinator) = coordinator(SimVehicle::new().with_fault(fault));

            let result = coordinator.set_target_state(BinaryState::Unsecured).await;
            settle().await;

            assert!(result.is_ok(), "{fault:?} leaked to the caller");
            assert_eq!(sink.pushes(), vec![("trunk", BinaryState::Unsecured)]);
            match sink.outcomes().as_slice() {
                [ActuationOutcome::Failed { stage: failed, .. }] => assert_eq!(*failed, stage),
                other => panic!("unexpected outcomes for {fault:?}: {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn options_failure_propagates_without_spawning() {
        let (vehicle, sink, coordinator) =
            coordinator(SimVehicle::new().with_fault(SimFault::Options));

        let result = coordinator.set_target_state(BinaryState::Unsecured).await;
        settle().await;

        assert!(matches!(result, Err(TrunkError::Session(_))));
        assert_eq!(vehicle.wake_calls(), 0);
        assert_eq!(vehicle.telemetry_calls(), 0);
        assert_eq!(vehicle.command_calls(), 0);
        assert!(sink.pushes().is_empty());
        assert!(sink.outcomes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_call_timeout_ends_actuation() {
        let config = CoordinatorConfig {
            remote_call_timeout: Some(Duration::from_secs(2)),
            ..CoordinatorConfig::default()
        };
        let (vehicle, sink, coordinator) =
            coordinator_with(SimVehicle::new().with_latency(SLOW), config);

        coordinator.set_target_state(BinaryState::Unsecured).await.unwrap();
        settle().await;

        assert_eq!(vehicle.telemetry_calls(), 0);
        assert_eq!(vehicle.command_calls(), 0);
        assert_eq!(
            sink.outcomes(),
            vec![ActuationOutcome::TimedOut { stage: ActuationStage::Wake }]
        );
        assert_eq!(sink.pushes(), vec![("trunk", BinaryState::Unsecured)]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_are_not_serialized() {
        let (vehicle, _, coordinator) = coordinator(SimVehicle::new().with_latency(SLOW));

        let (a, b) = tokio::join!(
            coordinator.set_target_state(BinaryState::Unsecured),
            coordinator.set_target_state(BinaryState::Unsecured),
        );
        a.unwrap();
        b.unwrap();
        settle().await;

        // Both tasks sampled "closed" before either toggled.
        assert_eq!(vehicle.command_calls(), 2);
        assert!(!vehicle.is_open(CompartmentApiId::Rear));
    }

    /// Records `(span, parent span)` for every span opened.
    struct SpanTree(Arc<Mutex<Vec<(&'static str, Option<&'static str>)>>>);

    impl<S> tracing_subscriber::Layer<S> for SpanTree
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_new_span(
            &self,
            _attrs: &tracing::span::Attributes<'_>,
            id: &tracing::span::Id,
            ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if let Some(span) = ctx.span(id) {
                let parent = span.parent().map(|p| p.name());
                self.0.lock().unwrap().push((span.name(), parent));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn actuation_runs_in_a_child_span_of_the_request() {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let spans = Arc::new(Mutex::new(Vec::new()));
        let _default = tracing_subscriber::registry()
            .with(SpanTree(Arc::clone(&spans)))
            .set_default();

        let (_, _, coordinator) = coordinator(SimVehicle::new());
        coordinator.set_target_state(BinaryState::Unsecured).await.unwrap();
        settle().await;

        let spans = spans.lock().unwrap().clone();
        assert!(spans.contains(&("set_target_state", None)), "{spans:?}");
        assert!(spans.contains(&("actuation", Some("set_target_state"))), "{spans:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn reads_delegate_to_state_reader() {
        let (vehicle, _, coordinator) =
            coordinator(SimVehicle::new().with_open(CompartmentApiId::Rear, true));
        assert_eq!(coordinator.read_current_state().await, BinaryState::Unsecured);
        assert_eq!(coordinator.read_target_state().await, BinaryState::Unsecured);

        vehicle.put_to_sleep();
        assert_eq!(coordinator.read_current_state().await, BinaryState::Secured);
    }
}
