//! Relay engine tests — authorization, the status state machine, broadcast
//! fan-out, and registry pruning, driven through the processing path with
//! in-memory connections (no sockets).

use std::sync::Arc;

use axum::extract::ws::Message;
use relay_protocol::TripStatus;
use relay_server::Relay;
use relay_store::{
    Driver, DriverPatch, DriverStatus, FleetStore, LocationRecord, MemoryStore, NewLocation,
    StoreError, Trip, TripPatch, Vehicle, VehiclePatch, VehicleStatus,
};
use relay_transport::{ConnectionId, ConnectionRegistry};
use serde_json::{Value, json};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_vehicle(Vehicle { id: "vehicle-1".into(), status: VehicleStatus::Available });
    store.insert_driver(Driver {
        id: "driver-1".into(),
        name: "Dana".into(),
        status: DriverStatus::Available,
    });
    store.insert_trip(Trip {
        id: "trip-1".into(),
        driver_id: "driver-1".into(),
        vehicle_id: "vehicle-1".into(),
        status: TripStatus::Assigned,
        origin: "Warehouse A".into(),
        destination: "Customer Site".into(),
        start_time: None,
        end_time: None,
    });
    store
}

/// A registered connection whose outbound queue we can inspect.
struct TestClient {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Message>,
}

fn connect(registry: &ConnectionRegistry) -> TestClient {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = registry.register(tx);
    TestClient { id, rx }
}

impl TestClient {
    /// All frames delivered so far, parsed. Processing is fully awaited
    /// before assertions, so try_recv sees everything.
    fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if let Message::Text(text) = msg {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }
}

fn location_frame(trip: &str, driver: &str) -> String {
    json!({
        "type": "location_update",
        "payload": {"tripId": trip, "latitude": 40.7, "longitude": -74.0, "driverId": driver}
    })
    .to_string()
}

fn status_frame(trip: &str, status: &str, driver: &str) -> String {
    json!({
        "type": "trip_status_update",
        "payload": {"tripId": trip, "status": status, "driverId": driver}
    })
    .to_string()
}

// ─────────────────────────────────────────────────────────────────────────
// Ping
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_always_pongs_and_mutates_nothing() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut observer = connect(&registry);

    for _ in 0..3 {
        relay.process(&sender.id, r#"{"type":"ping"}"#).await;
    }

    let frames = sender.drain();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f["type"] == "pong"));
    // Pong goes to the sender only, and no state was touched
    assert!(observer.drain().is_empty());
    assert_eq!(store.trip("trip-1").unwrap().status, TripStatus::Assigned);
    assert!(store.locations_for("trip-1").is_empty());
}

// ─────────────────────────────────────────────────────────────────────────
// location_update
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_location_update_persists_and_reaches_every_connection() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut dash_a = connect(&registry);
    let mut dash_b = connect(&registry);

    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;

    let rows = store.locations_for("trip-1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].latitude, 40.7);

    // Broadcast includes the sender
    for client in [&mut sender, &mut dash_a, &mut dash_b] {
        let frames = client.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "location_update");
        assert_eq!(frames[0]["data"]["tripId"], "trip-1");
        assert_eq!(frames[0]["data"]["id"], json!(rows[0].id));
    }
}

#[tokio::test]
async fn mismatched_driver_gets_exactly_one_error_and_nothing_is_broadcast() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut observer = connect(&registry);

    relay.process(&sender.id, &location_frame("trip-1", "driver-99")).await;

    let frames = sender.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert!(observer.drain().is_empty());
    assert!(store.locations_for("trip-1").is_empty());
}

#[tokio::test]
async fn unknown_trip_is_denied() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);

    relay.process(&sender.id, &location_frame("trip-404", "driver-1")).await;

    let frames = sender.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
}

#[tokio::test]
async fn rapid_location_updates_are_appended_without_dedup() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let sender = connect(&registry);

    for _ in 0..5 {
        relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;
    }
    assert_eq!(store.locations_for("trip-1").len(), 5);
}

// ─────────────────────────────────────────────────────────────────────────
// trip_status_update
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn starting_a_trip_sets_start_time_and_busy_statuses() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut dashboard = connect(&registry);

    relay.process(&sender.id, &status_frame("trip-1", "in_progress", "driver-1")).await;

    let trip = store.trip("trip-1").unwrap();
    assert_eq!(trip.status, TripStatus::InProgress);
    assert!(trip.start_time.is_some());
    assert!(trip.end_time.is_none());
    assert_eq!(store.vehicle("vehicle-1").unwrap().status, VehicleStatus::InUse);
    assert_eq!(store.driver("driver-1").unwrap().status, DriverStatus::OnTrip);

    // Every dashboard sees the updated trip record
    let frames = dashboard.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "trip_status_update");
    assert_eq!(frames[0]["data"]["status"], "in_progress");
    assert!(frames[0]["data"]["startTime"].is_string());
    assert_eq!(sender.drain().len(), 1);
}

#[tokio::test]
async fn completing_a_trip_frees_resources_and_clears_location_history() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);

    relay.process(&sender.id, &status_frame("trip-1", "in_progress", "driver-1")).await;
    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;
    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;
    assert_eq!(store.locations_for("trip-1").len(), 2);

    relay.process(&sender.id, &status_frame("trip-1", "completed", "driver-1")).await;

    let trip = store.trip("trip-1").unwrap();
    assert_eq!(trip.status, TripStatus::Completed);
    assert!(trip.end_time.is_some());
    assert_eq!(store.vehicle("vehicle-1").unwrap().status, VehicleStatus::Available);
    assert_eq!(store.driver("driver-1").unwrap().status, DriverStatus::Available);
    assert!(store.locations_for("trip-1").is_empty());

    let frames = sender.drain();
    assert_eq!(frames.last().unwrap()["data"]["status"], "completed");
}

#[tokio::test]
async fn cancellation_keeps_location_history() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let sender = connect(&registry);

    relay.process(&sender.id, &status_frame("trip-1", "in_progress", "driver-1")).await;
    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;
    relay.process(&sender.id, &status_frame("trip-1", "cancelled", "driver-1")).await;

    let trip = store.trip("trip-1").unwrap();
    assert_eq!(trip.status, TripStatus::Cancelled);
    assert_eq!(store.vehicle("vehicle-1").unwrap().status, VehicleStatus::Available);
    assert_eq!(store.locations_for("trip-1").len(), 1);
}

#[tokio::test]
async fn completing_straight_from_assigned_is_rejected() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut observer = connect(&registry);

    relay.process(&sender.id, &status_frame("trip-1", "completed", "driver-1")).await;

    let frames = sender.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert!(observer.drain().is_empty());
    // Nothing was mutated
    let trip = store.trip("trip-1").unwrap();
    assert_eq!(trip.status, TripStatus::Assigned);
    assert!(trip.start_time.is_none());
}

#[tokio::test]
async fn reassigned_trip_rejects_the_old_driver() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);

    // driver-1 owns the trip at first
    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;
    assert_eq!(sender.drain()[0]["type"], "location_update");

    // Dispatch reassigns the trip between messages
    let mut trip = store.trip("trip-1").unwrap();
    trip.driver_id = "driver-2".into();
    store.insert_trip(trip);

    // Authorization re-reads trip state, so the stale claim is denied
    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;
    let frames = sender.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert_eq!(store.locations_for("trip-1").len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────
// Decode failures
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_frames_answer_the_sender_only() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut observer = connect(&registry);

    relay.process(&sender.id, "{{{not json").await;
    relay.process(&sender.id, r#"{"type":"warp_drive"}"#).await;

    let frames = sender.drain();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f["type"] == "error"));
    assert!(observer.drain().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────
// Pruning
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dead_connections_are_pruned_during_broadcast() {
    let store = Arc::new(seeded_store());
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let dead = connect(&registry);
    drop(dead.rx);
    assert_eq!(registry.len(), 2);

    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;

    assert_eq!(registry.len(), 1);
    assert_eq!(sender.drain().len(), 1);

    // The pruned connection is never attempted again
    relay.process(&sender.id, &location_frame("trip-1", "driver-1")).await;
    assert_eq!(registry.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────
// Best-effort side effects
// ─────────────────────────────────────────────────────────────────────────

/// Delegates to a MemoryStore but fails every vehicle update.
struct VehicleFailStore {
    inner: MemoryStore,
}

impl FleetStore for VehicleFailStore {
    async fn get_trip(&self, id: &str) -> Result<Option<Trip>, StoreError> {
        self.inner.get_trip(id).await
    }

    async fn update_trip(&self, id: &str, patch: TripPatch) -> Result<Trip, StoreError> {
        self.inner.update_trip(id, patch).await
    }

    async fn update_vehicle(&self, _id: &str, _patch: VehiclePatch) -> Result<Vehicle, StoreError> {
        Err(StoreError::Backend("vehicle table unavailable".into()))
    }

    async fn update_driver(&self, id: &str, patch: DriverPatch) -> Result<Driver, StoreError> {
        self.inner.update_driver(id, patch).await
    }

    async fn create_location(&self, row: NewLocation) -> Result<LocationRecord, StoreError> {
        self.inner.create_location(row).await
    }

    async fn delete_locations_by_trip(&self, trip_id: &str) -> Result<u64, StoreError> {
        self.inner.delete_locations_by_trip(trip_id).await
    }
}

#[tokio::test]
async fn secondary_failure_does_not_suppress_the_broadcast() {
    let store = Arc::new(VehicleFailStore { inner: seeded_store() });
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut dashboard = connect(&registry);

    relay.process(&sender.id, &status_frame("trip-1", "in_progress", "driver-1")).await;

    // Primary mutation stands and is broadcast
    let trip = store.inner.trip("trip-1").unwrap();
    assert_eq!(trip.status, TripStatus::InProgress);
    let frames = dashboard.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "trip_status_update");
    // The sender got the broadcast, not an error
    assert_eq!(sender.drain()[0]["type"], "trip_status_update");

    // The failed secondary update left the vehicle untouched; the driver
    // flip still went through
    assert_eq!(store.inner.vehicle("vehicle-1").unwrap().status, VehicleStatus::Available);
    assert_eq!(store.inner.driver("driver-1").unwrap().status, DriverStatus::OnTrip);
}

/// Fails the primary trip update.
struct TripFailStore {
    inner: MemoryStore,
}

impl FleetStore for TripFailStore {
    async fn get_trip(&self, id: &str) -> Result<Option<Trip>, StoreError> {
        self.inner.get_trip(id).await
    }

    async fn update_trip(&self, _id: &str, _patch: TripPatch) -> Result<Trip, StoreError> {
        Err(StoreError::Backend("trip table unavailable".into()))
    }

    async fn update_vehicle(&self, id: &str, patch: VehiclePatch) -> Result<Vehicle, StoreError> {
        self.inner.update_vehicle(id, patch).await
    }

    async fn update_driver(&self, id: &str, patch: DriverPatch) -> Result<Driver, StoreError> {
        self.inner.update_driver(id, patch).await
    }

    async fn create_location(&self, row: NewLocation) -> Result<LocationRecord, StoreError> {
        self.inner.create_location(row).await
    }

    async fn delete_locations_by_trip(&self, trip_id: &str) -> Result<u64, StoreError> {
        self.inner.delete_locations_by_trip(trip_id).await
    }
}

#[tokio::test]
async fn primary_failure_answers_the_sender_and_broadcasts_nothing() {
    let store = Arc::new(TripFailStore { inner: seeded_store() });
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Relay::new(store.clone(), registry.clone());
    let mut sender = connect(&registry);
    let mut dashboard = connect(&registry);

    relay.process(&sender.id, &status_frame("trip-1", "in_progress", "driver-1")).await;

    let frames = sender.drain();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert!(dashboard.drain().is_empty());
    // No secondary effect ran either
    assert_eq!(store.inner.vehicle("vehicle-1").unwrap().status, VehicleStatus::Available);
}
