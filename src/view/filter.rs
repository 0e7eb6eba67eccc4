//! User-controlled filter and sort state.

use std::collections::BTreeSet;

use crate::live::Directive;

/// Which channels are hidden and which way the table is ordered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    suppressed: BTreeSet<String>,
    /// `true` shows newest first (no reversal of the base sort)
    ascending: bool,
}

impl FilterState {
    pub fn new(ascending: bool) -> Self {
        Self {
            suppressed: BTreeSet::new(),
            ascending,
        }
    }

    pub fn is_suppressed(&self, channel: &str) -> bool {
        self.suppressed.contains(channel)
    }

    /// Suppressed channels in sorted order
    pub fn suppressed(&self) -> impl Iterator<Item = &str> {
        self.suppressed.iter().map(String::as_str)
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Applies user toggles to a [`FilterState`]
///
/// Every transition is total. Toggling a channel yields exactly one directive
/// for the live feed, matching the channel's new state.
#[derive(Debug, Clone, Default)]
pub struct FilterController {
    state: FilterState,
}

impl FilterController {
    pub fn new(state: FilterState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Flip suppression of `channel`
    ///
    /// Returns `Unsubscribe` when the channel becomes hidden and `Subscribe`
    /// when it becomes visible again.
    pub fn toggle_channel(&mut self, channel: &str) -> Directive {
        if self.state.suppressed.remove(channel) {
            Directive::Subscribe(channel.to_string())
        } else {
            self.state.suppressed.insert(channel.to_string());
            Directive::Unsubscribe(channel.to_string())
        }
    }

    /// Flip the sort order
    pub fn toggle_order(&mut self) {
        self.state.ascending = !self.state.ascending;
    }
}
