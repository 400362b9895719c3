//! Integration tests for hindsight
//!
//! These tests verify that the runtime, codec, protocol, and session layers
//! work together over a real localhost connection.

#[path = "../common/mod.rs"]
pub mod common;

pub mod codec_properties;
pub mod debug_session;
