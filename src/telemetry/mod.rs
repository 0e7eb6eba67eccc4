//! # Telemetry Module
//!
//! Record model and the append-only store shared by the history loader and
//! the live feed.
//!
//! This module handles:
//! - Lenient decoding of records from JSON (history bodies and live messages)
//! - Timestamp parsing to absolute instants
//! - Arrival-ordered storage with change notification

pub mod record;
pub mod store;

pub use record::{Reading, TelemetryRecord, Timestamp};
pub use store::TelemetryStore;
