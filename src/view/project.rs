//! # Projection
//!
//! Derives the rows to display from the store without touching it.
//!
//! 1. Stable sort of a copy, newest first; unparseable timestamps last.
//! 2. If not ascending, reverse the order of timestamp groups while keeping
//!    each group's internal order. Toggling the order therefore reverses
//!    the table everywhere except among records with identical timestamps.
//! 3. Drop suppressed channels.
//! 4. Keep the first `cap` rows.

use crate::telemetry::TelemetryRecord;

use super::filter::FilterState;

/// Default number of rows handed to the renderer
pub const DEFAULT_DISPLAY_CAP: usize = 1000;

/// Upper bound on projected rows, growable page by page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayCap {
    limit: usize,
    page: usize,
}

impl DisplayCap {
    pub fn new(limit: usize, page: usize) -> Self {
        Self { limit, page }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reveal one more page of rows
    pub fn grow(&mut self) {
        self.limit = self.limit.saturating_add(self.page);
    }
}

impl Default for DisplayCap {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_CAP, DEFAULT_DISPLAY_CAP)
    }
}

/// Filtered, ordered, capped view of `records`
pub fn project(records: &[TelemetryRecord], filter: &FilterState, cap: usize) -> Vec<TelemetryRecord> {
    let mut keyed: Vec<(Option<i64>, &TelemetryRecord)> =
        records.iter().map(|r| (r.sort_key(), r)).collect();

    // Stable; `None` orders below every `Some`, so invalid instants go last
    keyed.sort_by(|a, b| b.0.cmp(&a.0));

    if !filter.ascending() {
        reverse_groups(&mut keyed);
    }

    keyed
        .into_iter()
        .map(|(_, record)| record)
        .filter(|record| !filter.is_suppressed(&record.id))
        .take(cap)
        .cloned()
        .collect()
}

/// Reverse the order of runs of equal keys, keeping each run's order
fn reverse_groups<T>(keyed: &mut [(Option<i64>, T)]) {
    keyed.reverse();
    let mut start = 0;
    while start < keyed.len() {
        let key = keyed[start].0;
        let end = keyed[start..]
            .iter()
            .position(|(k, _)| *k != key)
            .map_or(keyed.len(), |offset| start + offset);
        keyed[start..end].reverse();
        start = end;
    }
}
