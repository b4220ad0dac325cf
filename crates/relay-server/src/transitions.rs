//! Trip status transition table.
//!
//! Every `trip_status_update` is validated here before anything is written:
//! `{current, requested} -> {next, side effects}`. Anything outside the
//! table — skipping `in_progress`, leaving a terminal state, repeating the
//! current state — is rejected, never silently applied.

use relay_protocol::TripStatus;

/// Secondary state changes a legal transition carries.
///
/// `SetStartTime`/`SetEndTime` are folded into the primary trip update;
/// the rest are best-effort follow-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Record the trip start time, unless one is already set.
    SetStartTime,
    SetEndTime,
    VehicleInUse,
    VehicleAvailable,
    DriverOnTrip,
    DriverAvailable,
    /// Drop the trip's location history; it is no longer needed post-trip.
    ClearLocationHistory,
}

/// A legal transition and its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: TripStatus,
    pub effects: &'static [SideEffect],
}

const START: &[SideEffect] = &[
    SideEffect::SetStartTime,
    SideEffect::VehicleInUse,
    SideEffect::DriverOnTrip,
];

const COMPLETE: &[SideEffect] = &[
    SideEffect::SetEndTime,
    SideEffect::VehicleAvailable,
    SideEffect::DriverAvailable,
    SideEffect::ClearLocationHistory,
];

const CANCEL: &[SideEffect] = &[
    SideEffect::SetEndTime,
    SideEffect::VehicleAvailable,
    SideEffect::DriverAvailable,
];

/// Look up `{current, requested}` in the table. `None` means the transition
/// is illegal and must be rejected without mutation.
pub fn transition(current: TripStatus, requested: TripStatus) -> Option<Transition> {
    use TripStatus::*;

    match (current, requested) {
        (Assigned, InProgress) => Some(Transition { next: InProgress, effects: START }),
        (InProgress, Completed) => Some(Transition { next: Completed, effects: COMPLETE }),
        (Assigned, Cancelled) | (InProgress, Cancelled) => {
            Some(Transition { next: Cancelled, effects: CANCEL })
        }
        _ => None,
    }
}
