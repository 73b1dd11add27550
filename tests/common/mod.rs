//! Shared test utilities for stackdeck
//!
//! - A harness wiring a `SessionManager` to mock transports
//! - Helpers for reading terminal output without ANSI styling

pub mod harness;

pub use harness::{strip_ansi, DoneCounter, Harness, WAIT};
