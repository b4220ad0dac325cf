//! Inbound and outbound frame types.
//!
//! Frames are JSON text over WebSocket. Inbound frames carry a `type` tag and
//! an optional `payload` object; outbound frames carry a `type` tag with the
//! remaining fields inline. All payload field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Trip lifecycle status.
///
/// `assigned` is the initial state set by dispatch; clients can only request
/// the other three via `trip_status_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// `location_update` payload — one GPS fix for a trip in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub trip_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Claimed driver identity — trusted only after authorization against
    /// the trip's persisted assignment.
    pub driver_id: String,
}

/// `trip_status_update` payload — a requested trip status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStatusUpdate {
    pub trip_id: String,
    pub status: TripStatus,
    pub driver_id: String,
}

/// The closed set of frames clients may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Inbound {
    Ping,
    LocationUpdate(LocationUpdate),
    TripStatusUpdate(TripStatusUpdate),
}

impl Inbound {
    /// Parse a raw text frame. Never panics; arbitrary network input yields
    /// a [`DecodeError`] the caller turns into an `error` reply.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| DecodeError::UnknownFrame(e.to_string()))
    }
}

/// Frames the relay sends to clients.
///
/// `Connected`, `Pong`, and `Error` go to a single connection; the two
/// update frames are broadcast to every live connection, sender included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Connected { message: String },
    Pong,
    LocationUpdate { data: serde_json::Value },
    TripStatusUpdate { data: serde_json::Value },
    Error { message: String },
}

impl Outbound {
    /// Serialize to the wire form. These shapes cannot fail to serialize.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
