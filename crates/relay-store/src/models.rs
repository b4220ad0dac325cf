//! Fleet record types.
//!
//! These are the persisted shapes the relay reads and patches. Serde output
//! is camelCase so broadcast `data` payloads match the rest of the wire
//! protocol.

use chrono::{DateTime, Utc};
use relay_protocol::TripStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Available,
    InUse,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    OnTrip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub driver_id: String,
    pub vehicle_id: String,
    pub status: TripStatus,
    pub origin: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub status: VehicleStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub status: DriverStatus,
}

/// One persisted GPS fix. Rows are append-only until the trip completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub id: String,
    pub trip_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Input for [`crate::FleetStore::create_location`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub trip_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Partial trip update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripPatch {
    pub status: Option<TripStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehiclePatch {
    pub status: Option<VehicleStatus>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverPatch {
    pub status: Option<DriverStatus>,
}
