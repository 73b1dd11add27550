//! Integration tests for stackdeck
//!
//! These drive the session manager end to end against mock transports.

#[path = "../common/mod.rs"]
pub mod common;

pub mod action_flow;
pub mod log_sessions;
pub mod socket_sessions;
