//! Occupancy binary sensor
//!
//! Each loaded entry runs one sensor task. The task owns an
//! [`OccupancyFuser`] and is the only place its state changes: input state
//! changes and timer expiries are both delivered to it as messages and
//! handled one at a time.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};
use wasp_core::events::StateChangedData;
use wasp_core::{Context, EntityId, Event};
use wasp_event_bus::{EventBus, Tracked, TrackedEvents};
use wasp_fuser::{
    FuserConfig, Occupancy, OccupancyFuser, OccupancySink, Scheduler, TimerHandle, TimerToken,
};
use wasp_registries::EntityRegistry;
use wasp_state_store::{Attributes, StateStore};

use crate::constants::DEVICE_CLASS_OCCUPANCY;

/// Timers backed by tokio sleeps
///
/// Each timer is a task that sleeps and then posts its token to the sensor's
/// channel.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerToken>,
}

impl TokioScheduler {
    pub fn new(tx: mpsc::UnboundedSender<TimerToken>) -> Self {
        Self { tx }
    }
}

pub struct TokioTimerHandle(Option<JoinHandle<()>>);

impl TimerHandle for TokioTimerHandle {
    fn cancel(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    type Handle = TokioTimerHandle;

    fn schedule_after(&mut self, after: Duration, token: TimerToken) -> TokioTimerHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The sensor is gone if this fails
            let _ = tx.send(token);
        });
        TokioTimerHandle(Some(task))
    }
}

/// Writes occupancy to the state store as the sensor's state
///
/// Writes carry a child of the context of the input change being handled,
/// or a fresh context for timer expiries.
pub struct StateStoreSink {
    store: Arc<StateStore>,
    entity_id: EntityId,
    attributes: Attributes,
    cause: Option<Context>,
}

impl StateStoreSink {
    pub fn new(store: Arc<StateStore>, entity_id: EntityId, name: &str) -> Self {
        Self {
            store,
            entity_id,
            attributes: sensor_attributes(name),
            cause: None,
        }
    }

    /// Context of the change the next writes respond to
    pub fn set_cause(&mut self, cause: Option<Context>) {
        self.cause = cause;
    }
}

impl OccupancySink for StateStoreSink {
    fn publish(&mut self, occupancy: Occupancy) {
        self.store.set(
            self.entity_id.clone(),
            occupancy.as_state(),
            self.attributes.clone(),
            self.cause.as_ref().map(Context::child).unwrap_or_default(),
        );
    }
}

/// State attributes of an occupancy sensor
pub fn sensor_attributes(name: &str) -> Attributes {
    Attributes::from([
        ("device_class".to_string(), json!(DEVICE_CLASS_OCCUPANCY)),
        ("friendly_name".to_string(), json!(name)),
    ])
}

/// What a sensor task needs to run
#[derive(Debug, Clone)]
pub struct SensorSpec {
    /// The sensor's own entity
    pub entity_id: EntityId,
    pub name: String,
    pub wasp: EntityId,
    pub door: EntityId,
    pub config: FuserConfig,
}

/// A running sensor task
pub struct WaspInABoxSensor {
    entity_id: EntityId,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

type Fuser = OccupancyFuser<TokioScheduler, StateStoreSink>;

impl WaspInABoxSensor {
    /// Start the sensor
    ///
    /// Both inputs are subscribed to before this returns. The task then
    /// publishes `unknown`, replays the inputs' current states and follows
    /// their changes.
    pub fn start(
        spec: SensorSpec,
        bus: &EventBus,
        store: Arc<StateStore>,
        registry: &EntityRegistry,
    ) -> Self {
        let tracked = bus.track_state_changes(&[spec.wasp.clone(), spec.door.clone()]);

        let mut replay = true;
        for input in [&spec.wasp, &spec.door] {
            if registry.get(&input.to_string()).is_none() {
                warn!("Unable to find entity {}", input);
                replay = false;
            }
        }

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let sink = StateStoreSink::new(store.clone(), spec.entity_id.clone(), &spec.name);
        let fuser = OccupancyFuser::new(spec.config.clone(), TokioScheduler::new(timer_tx), sink);

        let span = info_span!("wasp_in_a_box", entity_id = %spec.entity_id);
        let entity_id = spec.entity_id.clone();
        let task = tokio::spawn(
            run(spec, fuser, store, replay, tracked, timer_rx, shutdown_rx).instrument(span),
        );

        Self {
            entity_id,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Stop the task and wait for it; pending timers are cancelled
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                warn!(entity_id = %self.entity_id, "Sensor task panicked");
            }
        }
    }
}

async fn run(
    spec: SensorSpec,
    mut fuser: Fuser,
    store: Arc<StateStore>,
    replay: bool,
    mut tracked: TrackedEvents<StateChangedData>,
    mut timer_rx: mpsc::UnboundedReceiver<TimerToken>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    fuser.recompute();

    if replay {
        let wasp = store.get_state(&spec.wasp.to_string());
        fuser.motion_changed(wasp.as_deref());
        let door = store.get_state(&spec.door.to_string());
        fuser.door_changed(None, door.as_deref());
    }

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            event = tracked.next() => match event {
                Some(Tracked::Event(event)) => dispatch(&spec, &mut fuser, event),
                Some(Tracked::Lagged(_)) => {
                    fuser.sink_mut().set_cause(None);
                    resync(&spec, &mut fuser, &store);
                }
                None => break,
            },
            Some(token) = timer_rx.recv() => {
                fuser.sink_mut().set_cause(None);
                fuser.timer_fired(token);
            }
        }
    }

    fuser.shutdown();
    debug!("Sensor stopped");
}

/// Feed the inputs' current states to the fuser after missed events
fn resync(spec: &SensorSpec, fuser: &mut Fuser, store: &StateStore) {
    let wasp = store.get_state(&spec.wasp.to_string());
    let door = store.get_state(&spec.door.to_string());
    fuser.resync(wasp.as_deref(), door.as_deref());
}

fn dispatch(spec: &SensorSpec, fuser: &mut Fuser, event: Event<StateChangedData>) {
    fuser.sink_mut().set_cause(Some(event.context));
    let data = event.data;
    let new = data.new_state.as_ref().map(|s| s.state.as_str());

    if data.entity_id == spec.wasp {
        fuser.motion_changed(new);
    } else if data.entity_id == spec.door {
        let old = data.old_state.as_ref().map(|s| s.state.as_str());
        fuser.door_changed(old, new);
    }
}
