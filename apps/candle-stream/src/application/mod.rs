//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the stream loop and the port interfaces that define
//! how the merge core talks to the upstream feed and the renderer.

/// Port interfaces for external systems (upstream feed, rendering).
pub mod ports;

/// Stream loop, per-event pipeline and heartbeat.
pub mod services;
