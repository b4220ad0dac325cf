//! Fleet Relay Transport Layer
//!
//! WebSocket transport for the relay. The transport handles:
//! - Connection lifecycle (upgrade, greeting, close)
//! - The connection registry used for broadcast fan-out
//! - Forwarding inbound text frames to the relay's processing loop
//!
//! The transport knows nothing about trips or authorization; it moves frames
//! in and out and prunes connections whose outbound queue has closed.

pub mod registry;
pub mod server;

pub use registry::{ConnectionId, ConnectionRegistry};
pub use server::{InboundFrame, TransportConfig, TransportServer};
