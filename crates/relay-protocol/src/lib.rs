//! Fleet Relay - Protocol Types
//!
//! Wire frame types exchanged between fleet clients (driver apps, dashboards)
//! and the relay server. This crate is the single source of truth for frame
//! shapes, trip status values, and decode errors.

pub mod error;
pub mod message;

pub use error::DecodeError;
pub use message::{Inbound, LocationUpdate, Outbound, TripStatus, TripStatusUpdate};
