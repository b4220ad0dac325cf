//! Fleet Relay Engine
//!
//! The relay consumes inbound frames from the transport over a single
//! channel and fully processes one frame — decode, authorize, mutate,
//! broadcast — before the next. Authorization re-reads trip state on every
//! message; trip status changes go through an explicit transition table.

pub mod relay;
pub mod transitions;

pub use relay::{Denied, Relay};
pub use transitions::{SideEffect, Transition, transition};
