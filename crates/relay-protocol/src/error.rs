//! Decode errors for inbound frames.

use thiserror::Error;

/// Why an inbound frame was rejected before reaching the relay.
///
/// Decode failures answer the originating connection with an `error` frame
/// and are never broadcast; the connection itself stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame was not valid JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Valid JSON, but not a recognized frame: unknown `type`, missing
    /// payload fields, or wrong field types.
    #[error("unrecognized frame: {0}")]
    UnknownFrame(String),
}
