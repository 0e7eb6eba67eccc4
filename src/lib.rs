//! # Telemetry Viewer Library
//!
//! Watch spacecraft telemetry channels as they arrive.
//!
//! This library loads the recent history of each tracked channel over HTTP,
//! follows new readings over a WebSocket feed, and renders the merged
//! readings as a filtered, newest-first table.

pub mod app;
pub mod config;
pub mod error;
pub mod history;
pub mod live;
pub mod telemetry;
pub mod view;
