//! # Table Renderer
//!
//! Writes the current projection as a plain-text table, one row per record:
//! channel id, `YYYY-MM-DDTHH:MM:SSZ` timestamp (UTC) and raw value.

use std::io::{self, Write};

use crate::error::Result;
use crate::live::ConnectionState;
use crate::telemetry::{TelemetryRecord, Timestamp};

/// Text shown for a timestamp that does not parse
pub const INVALID_DATE: &str = "Invalid Date";

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Everything one redraw needs
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub rows: Vec<TelemetryRecord>,
    pub connection: ConnectionState,
    pub suppressed: Vec<String>,
    pub ascending: bool,
    pub cap: usize,
    /// Records held in the store, before filtering
    pub stored: usize,
    /// Most recent incident, already formatted
    pub incident: Option<String>,
}

/// Display surface for frames
#[cfg_attr(test, mockall::automock)]
pub trait Renderer {
    fn render(&mut self, frame: &Frame) -> Result<()>;
}

/// Format an instant as `YYYY-MM-DDTHH:MM:SSZ` in UTC
pub fn format_timestamp(timestamp: &Timestamp) -> String {
    match timestamp.instant() {
        Some(instant) => instant.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => INVALID_DATE.to_string(),
    }
}

/// One table row, without trailing newline
pub fn format_row(record: &TelemetryRecord) -> String {
    format!(
        "{:<12} {:<20} {}",
        record.id,
        format_timestamp(&record.timestamp),
        record.value
    )
}

/// Status line summarising connection and filters
pub fn format_status(frame: &Frame) -> String {
    let live = if frame.connection.connected {
        "live: connected".to_string()
    } else if frame.connection.reconnecting {
        format!("live: reconnecting (attempt {})", frame.connection.attempts)
    } else {
        format!("live: {}", frame.connection.phase)
    };

    let order = if frame.ascending { "newest first" } else { "oldest first" };
    let hidden = if frame.suppressed.is_empty() {
        "none".to_string()
    } else {
        frame.suppressed.join(", ")
    };

    format!(
        "{} | showing {} of {} (cap {}) | {} | hidden: {}",
        live,
        frame.rows.len(),
        frame.stored,
        frame.cap,
        order,
        hidden
    )
}

/// Renderer writing text tables to any `Write`
pub struct TableRenderer<W: Write> {
    out: W,
    clear_screen: bool,
}

impl TableRenderer<io::Stdout> {
    /// Renderer on standard output
    pub fn stdout(clear_screen: bool) -> Self {
        Self::new(io::stdout(), clear_screen)
    }
}

impl<W: Write> TableRenderer<W> {
    pub fn new(out: W, clear_screen: bool) -> Self {
        Self { out, clear_screen }
    }

    /// Consume the renderer, returning the writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for TableRenderer<W> {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        if self.clear_screen {
            self.out.write_all(CLEAR_SCREEN.as_bytes())?;
        }
        writeln!(self.out, "{}", format_status(frame))?;
        if let Some(incident) = &frame.incident {
            writeln!(self.out, "last error: {}", incident)?;
        }
        writeln!(self.out, "{:<12} {:<20} {}", "ID", "TIMESTAMP", "VALUE")?;
        for record in &frame.rows {
            writeln!(self.out, "{}", format_row(record))?;
        }
        self.out.flush()?;
        Ok(())
    }
}
