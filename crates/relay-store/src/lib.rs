//! Fleet Storage Layer
//!
//! The relay treats persistence as a collaborator: consistent, already-there,
//! and synchronous from the relay's point of view. This crate defines that
//! collaborator interface ([`FleetStore`]), the fleet record types, and an
//! in-process implementation backed by locked hash maps.

pub mod memory;
pub mod models;

use std::future::Future;

use thiserror::Error;

pub use memory::MemoryStore;
pub use models::{
    Driver, DriverPatch, DriverStatus, LocationRecord, NewLocation, Trip, TripPatch, Vehicle,
    VehiclePatch, VehicleStatus,
};

/// Storage layer failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

/// Storage operations the relay needs.
///
/// Patch-style updates: `None` fields are left untouched. `get_trip` is
/// called freshly for every inbound message — implementations must return
/// current state, never a cached assignment.
pub trait FleetStore: Send + Sync + 'static {
    fn get_trip(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Trip>, StoreError>> + Send;

    fn update_trip(
        &self,
        id: &str,
        patch: TripPatch,
    ) -> impl Future<Output = Result<Trip, StoreError>> + Send;

    fn update_vehicle(
        &self,
        id: &str,
        patch: VehiclePatch,
    ) -> impl Future<Output = Result<Vehicle, StoreError>> + Send;

    fn update_driver(
        &self,
        id: &str,
        patch: DriverPatch,
    ) -> impl Future<Output = Result<Driver, StoreError>> + Send;

    /// Append one location row. No deduplication.
    fn create_location(
        &self,
        row: NewLocation,
    ) -> impl Future<Output = Result<LocationRecord, StoreError>> + Send;

    /// Drop all location history for a trip. Returns the number of rows removed.
    fn delete_locations_by_trip(
        &self,
        trip_id: &str,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
