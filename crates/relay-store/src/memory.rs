//! In-process store backed by locked hash maps.
//!
//! Locks are never held across an await point; every operation takes the
//! lock, mutates, clones the result out, and releases.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::models::{
    Driver, DriverPatch, LocationRecord, NewLocation, Trip, TripPatch, Vehicle, VehiclePatch,
};
use crate::{FleetStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    trips: RwLock<HashMap<String, Trip>>,
    vehicles: RwLock<HashMap<String, Vehicle>>,
    drivers: RwLock<HashMap<String, Driver>>,
    locations: RwLock<Vec<LocationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding / inspection (wiring and tests) ──────────────────────────

    pub fn insert_trip(&self, trip: Trip) {
        self.trips.write().insert(trip.id.clone(), trip);
    }

    pub fn insert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.write().insert(vehicle.id.clone(), vehicle);
    }

    pub fn insert_driver(&self, driver: Driver) {
        self.drivers.write().insert(driver.id.clone(), driver);
    }

    pub fn trip(&self, id: &str) -> Option<Trip> {
        self.trips.read().get(id).cloned()
    }

    pub fn vehicle(&self, id: &str) -> Option<Vehicle> {
        self.vehicles.read().get(id).cloned()
    }

    pub fn driver(&self, id: &str) -> Option<Driver> {
        self.drivers.read().get(id).cloned()
    }

    pub fn locations_for(&self, trip_id: &str) -> Vec<LocationRecord> {
        self.locations
            .read()
            .iter()
            .filter(|l| l.trip_id == trip_id)
            .cloned()
            .collect()
    }
}

impl FleetStore for MemoryStore {
    async fn get_trip(&self, id: &str) -> Result<Option<Trip>, StoreError> {
        Ok(self.trips.read().get(id).cloned())
    }

    async fn update_trip(&self, id: &str, patch: TripPatch) -> Result<Trip, StoreError> {
        let mut trips = self.trips.write();
        let trip = trips
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("trip", id))?;
        if let Some(status) = patch.status {
            trip.status = status;
        }
        if let Some(t) = patch.start_time {
            trip.start_time = Some(t);
        }
        if let Some(t) = patch.end_time {
            trip.end_time = Some(t);
        }
        Ok(trip.clone())
    }

    async fn update_vehicle(&self, id: &str, patch: VehiclePatch) -> Result<Vehicle, StoreError> {
        let mut vehicles = self.vehicles.write();
        let vehicle = vehicles
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("vehicle", id))?;
        if let Some(status) = patch.status {
            vehicle.status = status;
        }
        Ok(vehicle.clone())
    }

    async fn update_driver(&self, id: &str, patch: DriverPatch) -> Result<Driver, StoreError> {
        let mut drivers = self.drivers.write();
        let driver = drivers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("driver", id))?;
        if let Some(status) = patch.status {
            driver.status = status;
        }
        Ok(driver.clone())
    }

    async fn create_location(&self, row: NewLocation) -> Result<LocationRecord, StoreError> {
        let record = LocationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            trip_id: row.trip_id,
            latitude: row.latitude,
            longitude: row.longitude,
            recorded_at: Utc::now(),
        };
        self.locations.write().push(record.clone());
        Ok(record)
    }

    async fn delete_locations_by_trip(&self, trip_id: &str) -> Result<u64, StoreError> {
        let mut locations = self.locations.write();
        let before = locations.len();
        locations.retain(|l| l.trip_id != trip_id);
        Ok((before - locations.len()) as u64)
    }
}
