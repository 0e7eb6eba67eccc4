//! # Error Types
//!
//! Custom error types for the telemetry viewer using `thiserror`, plus the
//! incident log that keeps non-fatal failures visible to the user.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for the telemetry viewer
#[derive(Debug, Error)]
pub enum ViewerError {
    /// History request could not be sent or its body could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// History endpoint answered with a non-success status
    #[error("History endpoint returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Live feed transport errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Payload that could not be turned into telemetry
    #[error("Malformed payload: {0}")]
    Payload(String),

    /// Unrecognised user input
    #[error("Unknown command: {0}")]
    Command(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ViewerError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ViewerError::WebSocket(e.to_string())
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(e: serde_json::Error) -> Self {
        ViewerError::Payload(e.to_string())
    }
}

impl ViewerError {
    /// Classify this error for the incident log
    pub fn kind(&self) -> IncidentKind {
        match self {
            ViewerError::Http(_) | ViewerError::Status { .. } | ViewerError::WebSocket(_) => {
                IncidentKind::Transport
            }
            ViewerError::Payload(_) => IncidentKind::Payload,
            ViewerError::Command(_) => IncidentKind::Command,
            ViewerError::Config(_) | ViewerError::Io(_) => IncidentKind::Internal,
        }
    }
}

/// Result type alias for the telemetry viewer
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Default number of incidents retained
pub const DEFAULT_INCIDENT_CAPACITY: usize = 64;

/// Broad category of a non-fatal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentKind {
    /// History fetch or live socket failure
    Transport,
    /// Unparseable telemetry payload
    Payload,
    /// Invalid user command
    Command,
    /// Anything else the event loop survived
    Internal,
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IncidentKind::Transport => "transport",
            IncidentKind::Payload => "payload",
            IncidentKind::Command => "command",
            IncidentKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A single recorded failure
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub at: DateTime<Utc>,
    pub kind: IncidentKind,
    pub source: String,
    pub message: String,
}

impl fmt::Display for Incident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.at.format("%H:%M:%S"),
            self.kind,
            self.source,
            self.message
        )
    }
}

/// Bounded, newest-last record of failures the viewer recovered from.
///
/// Every error that the event loop swallows is pushed here in addition to
/// being logged, so the renderer can surface the most recent one.
#[derive(Debug, Clone)]
pub struct IncidentLog {
    entries: VecDeque<Incident>,
    capacity: usize,
    total: u64,
}

impl IncidentLog {
    /// Create a log retaining at most `capacity` incidents (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    /// Record an error raised by `source`
    pub fn record(&mut self, source: &str, error: &ViewerError) {
        self.push(Incident {
            at: Utc::now(),
            kind: error.kind(),
            source: source.to_string(),
            message: error.to_string(),
        });
    }

    /// Append an incident, evicting the oldest once full
    pub fn push(&mut self, incident: Incident) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(incident);
        self.total += 1;
    }

    /// Most recent incident, if any
    pub fn latest(&self) -> Option<&Incident> {
        self.entries.back()
    }

    /// Retained incidents, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of incidents ever recorded, including evicted ones
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for IncidentLog {
    fn default() -> Self {
        Self::new(DEFAULT_INCIDENT_CAPACITY)
    }
}
