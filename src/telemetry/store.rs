//! # Telemetry Store
//!
//! Append-only sequence of every record received, in arrival order. Sorting
//! is never applied here; see [`crate::view::project`].
//!
//! Each non-empty append bumps a revision counter published on a
//! `tokio::sync::watch` channel. Subscribers see only the latest revision,
//! so a burst of appends collapses into a single redraw.

use tokio::sync::watch;
use tracing::trace;

use super::record::TelemetryRecord;

/// Arrival-ordered, append-only record store
#[derive(Debug)]
pub struct TelemetryStore {
    records: Vec<TelemetryRecord>,
    revision: watch::Sender<u64>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            records: Vec::new(),
            revision,
        }
    }

    /// Append one historical batch, preserving its order
    ///
    /// An empty batch is a no-op and does not notify subscribers.
    pub fn append_many<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = TelemetryRecord>,
    {
        let before = self.records.len();
        self.records.extend(records);
        let added = self.records.len() - before;
        if added > 0 {
            trace!("Appended batch of {} records (total {})", added, self.records.len());
            self.notify();
        }
    }

    /// Append a single live record
    pub fn append_one(&mut self, record: TelemetryRecord) {
        self.records.push(record);
        trace!("Appended record (total {})", self.records.len());
        self.notify();
    }

    /// All records in arrival order
    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of mutations so far
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receive a change notification after every append
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        // send_modify succeeds even with no receivers
        self.revision.send_modify(|rev| *rev += 1);
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}
