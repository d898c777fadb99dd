//! Event bus with typed pub/sub
//!
//! The EventBus is the host's message broker. Events travel as JSON values
//! on one broadcast channel per event type; typed receivers decode them on
//! the way out. On top of that sit the two tracking streams the integration
//! uses: state changes of a fixed set of entities, and registry updates of a
//! fixed set of entities.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use wasp_core::events::{EntityRegistryUpdatedData, StateChangedData};
use wasp_core::{Context, EntityId, Event, EventData, EventType};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            listeners: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to all events of one type
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        self.listeners
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to a typed event
    pub fn subscribe_typed<T: EventData + DeserializeOwned>(&self) -> TypedEventReceiver<T> {
        TypedEventReceiver {
            rx: self.subscribe(T::event_type()),
            _phantom: PhantomData,
        }
    }

    /// Fire an event to every subscriber of its type
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // Send errors only mean nobody is listening right now
            let _ = sender.send(event);
        }
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let event = Event::typed(data, context)
            .map(|data| serde_json::to_value(&data).unwrap_or_default());
        self.fire(event);
    }

    /// Stream of state changes for the given entities only
    ///
    /// The subscription is live as soon as this returns, so a caller that
    /// reads the current states afterwards cannot miss a change in between.
    pub fn track_state_changes(&self, entity_ids: &[EntityId]) -> TrackedEvents<StateChangedData> {
        TrackedEvents::new(self.subscribe_typed(), entity_ids)
    }

    /// Stream of registry updates for the given entities only
    pub fn track_registry_updates(
        &self,
        entity_ids: &[EntityId],
    ) -> TrackedEvents<EntityRegistryUpdatedData> {
        TrackedEvents::new(self.subscribe_typed(), entity_ids)
    }

}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver for typed events
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event>,
    _phantom: PhantomData<T>,
}

impl<T: EventData + DeserializeOwned> TypedEventReceiver<T> {
    /// Receive the next event whose payload decodes as `T`
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                return Ok(event.map(|_| data));
            }
            // Undecodable payloads are skipped
        }
    }
}

/// Payloads that belong to one or more entities
pub trait EntityScoped {
    fn concerns(&self, entity_ids: &[EntityId]) -> bool;
}

impl EntityScoped for StateChangedData {
    fn concerns(&self, entity_ids: &[EntityId]) -> bool {
        entity_ids.contains(&self.entity_id)
    }
}

impl EntityScoped for EntityRegistryUpdatedData {
    fn concerns(&self, entity_ids: &[EntityId]) -> bool {
        entity_ids.contains(&self.entity_id)
            || self
                .old_entity_id
                .as_ref()
                .is_some_and(|old| entity_ids.contains(old))
    }
}

/// What a [`TrackedEvents`] stream yields
#[derive(Debug)]
pub enum Tracked<T> {
    Event(Event<T>),
    /// The receiver fell behind and this many events were lost, tracked or
    /// not; anything derived from earlier events may be stale
    Lagged(u64),
}

/// Typed events filtered down to a fixed set of entities
pub struct TrackedEvents<T> {
    rx: TypedEventReceiver<T>,
    entity_ids: Vec<EntityId>,
}

impl<T: EventData + DeserializeOwned + EntityScoped> TrackedEvents<T> {
    fn new(rx: TypedEventReceiver<T>, entity_ids: &[EntityId]) -> Self {
        Self {
            rx,
            entity_ids: entity_ids.to_vec(),
        }
    }

    /// The next matching event or lag notice, or `None` once the bus is gone
    pub async fn next(&mut self) -> Option<Tracked<T>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.data.concerns(&self.entity_ids) => {
                    return Some(Tracked::Event(event))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(entities = ?self.entity_ids, "Tracked events lagged by {} events", n);
                    return Some(Tracked::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The next matching event, or `None` once the bus is gone
    ///
    /// Lag is logged and skipped; use [`next`](Self::next) to react to it.
    pub async fn recv(&mut self) -> Option<Event<T>> {
        loop {
            match self.next().await? {
                Tracked::Event(event) => return Some(event),
                Tracked::Lagged(_) => continue,
            }
        }
    }

    pub fn entity_ids(&self) -> &[EntityId] {
        &self.entity_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use wasp_core::events::RegistryAction;
    use wasp_core::State;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    fn changed(entity: &str, value: &str) -> StateChangedData {
        let entity_id = id(entity);
        StateChangedData {
            entity_id: entity_id.clone(),
            old_state: None,
            new_state: Some(State::new(entity_id, value, HashMap::new(), Context::new())),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_fire() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("test_event");

        bus.fire(Event::new("test_event", json!({"key": "value"}), Context::new()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type.as_str(), "test_event");
        assert_eq!(received.data["key"], "value");
    }

    #[tokio::test]
    async fn test_typed_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        bus.fire_typed(changed("binary_sensor.motion", "on"), Context::new());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.data.entity_id.to_string(), "binary_sensor.motion");
        assert_eq!(received.data.new_state.unwrap().state, "on");
    }

    #[tokio::test]
    async fn test_no_cross_event_pollution() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe("event_a");
        let mut rx_b = bus.subscribe("event_b");

        bus.fire(Event::new("event_a", json!({"type": "a"}), Context::new()));

        assert_eq!(rx_a.recv().await.unwrap().data["type"], "a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_track_state_changes_filters_entities() {
        let bus = EventBus::new();
        let mut tracked = bus.track_state_changes(&[id("binary_sensor.door")]);

        bus.fire_typed(changed("binary_sensor.motion", "on"), Context::new());
        bus.fire_typed(changed("binary_sensor.door", "off"), Context::new());

        let event = tracked.recv().await.unwrap();
        assert_eq!(event.data.entity_id, id("binary_sensor.door"));
        assert_eq!(event.data.new_state.unwrap().state, "off");
    }

    #[tokio::test]
    async fn test_track_registry_updates_matches_old_id() {
        let bus = EventBus::new();
        let mut tracked = bus.track_registry_updates(&[id("binary_sensor.door")]);

        bus.fire_typed(
            EntityRegistryUpdatedData {
                action: RegistryAction::Update,
                entity_id: id("binary_sensor.front_door"),
                old_entity_id: Some(id("binary_sensor.door")),
                changes: HashMap::from([("entity_id".to_string(), json!("binary_sensor.door"))]),
            },
            Context::new(),
        );

        let event = tracked.recv().await.unwrap();
        assert!(event.data.renamed());
        assert_eq!(event.data.entity_id, id("binary_sensor.front_door"));
    }

    #[tokio::test]
    async fn test_tracked_events_survive_lag() {
        let bus = EventBus::with_capacity(2);
        let mut tracked = bus.track_state_changes(&[id("binary_sensor.door")]);

        for value in ["on", "off", "on", "off"] {
            bus.fire_typed(changed("binary_sensor.door", value), Context::new());
        }

        // The two oldest events were dropped, the receiver carries on
        let event = tracked.recv().await.unwrap();
        assert_eq!(event.data.new_state.unwrap().state, "on");
        let event = tracked.recv().await.unwrap();
        assert_eq!(event.data.new_state.unwrap().state, "off");
    }

    #[tokio::test]
    async fn test_next_reports_lag_before_retained_events() {
        let bus = EventBus::with_capacity(2);
        let mut tracked = bus.track_state_changes(&[id("binary_sensor.door")]);

        bus.fire_typed(changed("binary_sensor.door", "on"), Context::new());
        for _ in 0..3 {
            bus.fire_typed(changed("binary_sensor.motion", "on"), Context::new());
        }
        bus.fire_typed(changed("binary_sensor.door", "off"), Context::new());

        assert!(matches!(tracked.next().await, Some(Tracked::Lagged(3))));
        match tracked.next().await {
            Some(Tracked::Event(event)) => {
                assert_eq!(event.data.new_state.unwrap().state, "off")
            }
            other => panic!("expected the retained door event, got {:?}", other),
        }
    }
}
