//! Shared test utilities for hindsight
//!
//! Provides the counter application fixture used by the end-to-end debug
//! session tests: a message/state/command vocabulary, its update function and
//! resolver, and a codec with all three types registered.

pub mod counter;
