//! The relay processing loop.
//!
//! One frame at a time: decode → authorize → mutate → broadcast. Store calls
//! are the only await points. Per-connection arrival order is preserved by
//! the transport's channel; cross-connection order is unspecified.

use std::sync::Arc;

use relay_protocol::{Inbound, LocationUpdate, Outbound, TripStatusUpdate};
use relay_store::{
    DriverPatch, DriverStatus, FleetStore, NewLocation, StoreError, Trip, TripPatch, VehiclePatch,
    VehicleStatus,
};
use relay_transport::{ConnectionId, ConnectionRegistry, InboundFrame};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::transitions::{SideEffect, transition};

/// Why a claimed driver identity was rejected.
#[derive(Debug, Error)]
pub enum Denied {
    #[error("trip not found: {0}")]
    TripNotFound(String),

    #[error("trip {trip} is not assigned to driver {driver}")]
    NotAssigned { trip: String, driver: String },

    /// The authorization read itself failed; treated as a persistence
    /// failure, not a security event.
    #[error(transparent)]
    Lookup(#[from] StoreError),
}

/// The relay engine. Generic over the storage collaborator so tests can
/// inject failing stores.
pub struct Relay<S> {
    store: Arc<S>,
    registry: Arc<ConnectionRegistry>,
}

impl<S: FleetStore> Relay<S> {
    pub fn new(store: Arc<S>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Consume frames until the transport side closes the channel. Each
    /// frame is fully processed before the next is taken.
    pub async fn run(self, mut frames: mpsc::Receiver<InboundFrame>) {
        info!("relay loop started");
        while let Some(frame) = frames.recv().await {
            self.process(&frame.conn, &frame.text).await;
        }
        info!("relay loop stopped");
    }

    /// Handle one raw frame from `conn`. Never returns an error: every
    /// failure mode answers the originator and leaves the loop running.
    pub async fn process(&self, conn: &ConnectionId, raw: &str) {
        match Inbound::decode(raw) {
            Ok(Inbound::Ping) => {
                self.reply(conn, &Outbound::Pong);
            }
            Ok(Inbound::LocationUpdate(update)) => {
                self.handle_location_update(conn, update).await;
            }
            Ok(Inbound::TripStatusUpdate(update)) => {
                self.handle_trip_status_update(conn, update).await;
            }
            Err(e) => {
                debug!("undecodable frame from {conn}: {e}");
                self.reply_error(conn, format!("malformed message: {e}"));
            }
        }
    }

    // ── location_update ──────────────────────────────────────────────────

    async fn handle_location_update(&self, conn: &ConnectionId, update: LocationUpdate) {
        if let Err(denied) = self.authorize(&update.trip_id, &update.driver_id).await {
            self.reject(conn, denied);
            return;
        }

        let row = NewLocation {
            trip_id: update.trip_id.clone(),
            latitude: update.latitude,
            longitude: update.longitude,
        };
        match self.store.create_location(row).await {
            Ok(record) => {
                let data = serde_json::to_value(&record).unwrap_or_default();
                self.broadcast(&Outbound::LocationUpdate { data });
            }
            Err(e) => {
                error!("failed to persist location for trip {}: {e}", update.trip_id);
                self.reply_error(conn, "failed to record location".to_string());
            }
        }
    }

    // ── trip_status_update ───────────────────────────────────────────────

    async fn handle_trip_status_update(&self, conn: &ConnectionId, update: TripStatusUpdate) {
        let trip = match self.authorize(&update.trip_id, &update.driver_id).await {
            Ok(trip) => trip,
            Err(denied) => {
                self.reject(conn, denied);
                return;
            }
        };

        let Some(step) = transition(trip.status, update.status) else {
            warn!(
                "illegal transition {} -> {} requested for trip {}",
                trip.status, update.status, trip.id
            );
            self.reply_error(
                conn,
                format!("illegal status transition: {} -> {}", trip.status, update.status),
            );
            return;
        };

        // Primary mutation: the status itself plus any timestamps the
        // transition carries. If this fails nothing is broadcast.
        let now = chrono::Utc::now();
        let mut patch = TripPatch { status: Some(step.next), ..Default::default() };
        for effect in step.effects {
            match effect {
                SideEffect::SetStartTime if trip.start_time.is_none() => {
                    patch.start_time = Some(now);
                }
                SideEffect::SetEndTime => {
                    patch.end_time = Some(now);
                }
                _ => {}
            }
        }

        let updated = match self.store.update_trip(&trip.id, patch).await {
            Ok(trip) => trip,
            Err(e) => {
                error!("failed to persist status for trip {}: {e}", trip.id);
                self.reply_error(conn, "failed to update trip status".to_string());
                return;
            }
        };

        // Secondary mutations are best-effort: a failure here is logged and
        // the primary result is still broadcast.
        for effect in step.effects {
            if let Err(e) = self.apply_side_effect(*effect, &trip).await {
                warn!("side effect {effect:?} failed for trip {}: {e}", trip.id);
            }
        }

        info!("trip {} -> {}", updated.id, updated.status);
        let data = serde_json::to_value(&updated).unwrap_or_default();
        self.broadcast(&Outbound::TripStatusUpdate { data });
    }

    async fn apply_side_effect(&self, effect: SideEffect, trip: &Trip) -> Result<(), StoreError> {
        match effect {
            // Handled in the primary trip patch
            SideEffect::SetStartTime | SideEffect::SetEndTime => Ok(()),
            SideEffect::VehicleInUse => self
                .store
                .update_vehicle(
                    &trip.vehicle_id,
                    VehiclePatch { status: Some(VehicleStatus::InUse) },
                )
                .await
                .map(drop),
            SideEffect::VehicleAvailable => self
                .store
                .update_vehicle(
                    &trip.vehicle_id,
                    VehiclePatch { status: Some(VehicleStatus::Available) },
                )
                .await
                .map(drop),
            SideEffect::DriverOnTrip => self
                .store
                .update_driver(
                    &trip.driver_id,
                    DriverPatch { status: Some(DriverStatus::OnTrip) },
                )
                .await
                .map(drop),
            SideEffect::DriverAvailable => self
                .store
                .update_driver(
                    &trip.driver_id,
                    DriverPatch { status: Some(DriverStatus::Available) },
                )
                .await
                .map(drop),
            SideEffect::ClearLocationHistory => {
                let removed = self.store.delete_locations_by_trip(&trip.id).await?;
                debug!("cleared {removed} location rows for trip {}", trip.id);
                Ok(())
            }
        }
    }

    // ── Authorization ────────────────────────────────────────────────────

    /// Re-reads the trip on every call — assignment can change between
    /// messages, so a cached result is never trusted.
    async fn authorize(&self, trip_id: &str, claimed_driver_id: &str) -> Result<Trip, Denied> {
        match self.store.get_trip(trip_id).await? {
            Some(trip) if trip.driver_id == claimed_driver_id => Ok(trip),
            Some(trip) => Err(Denied::NotAssigned {
                trip: trip.id,
                driver: claimed_driver_id.to_string(),
            }),
            None => Err(Denied::TripNotFound(trip_id.to_string())),
        }
    }

    fn reject(&self, conn: &ConnectionId, denied: Denied) {
        match &denied {
            Denied::Lookup(e) => error!("authorization lookup failed: {e}"),
            _ => warn!("rejected update from {conn}: {denied}"),
        }
        self.reply_error(conn, denied.to_string());
    }

    // ── Delivery ─────────────────────────────────────────────────────────

    fn reply(&self, conn: &ConnectionId, frame: &Outbound) {
        self.registry.send_to(conn, &frame.to_frame());
    }

    fn reply_error(&self, conn: &ConnectionId, message: String) {
        self.reply(conn, &Outbound::Error { message });
    }

    fn broadcast(&self, frame: &Outbound) {
        let delivered = self.registry.broadcast(&frame.to_frame());
        debug!("broadcast delivered to {delivered} connections");
    }
}
