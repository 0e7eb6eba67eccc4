//! # Connection State Machine
//!
//! Pure lifecycle bookkeeping for the live feed, kept apart from the socket so
//! it can be driven directly in tests.
//!
//! ```text
//! Disconnected -> Connecting -> Open -> Closed -> Connecting (retry) -> ...
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use super::directive::Directive;

/// Default delay before a reconnect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Lifecycle phase of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Open => "open",
            ConnectionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Observable connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub reconnecting: bool,
    pub phase: ConnectionPhase,
    /// Connect attempts made so far, including the first
    pub attempts: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            connected: false,
            reconnecting: false,
            phase: ConnectionPhase::Disconnected,
            attempts: 0,
        }
    }
}

/// Delay schedule between reconnect attempts. Attempts are never capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay every time
    Fixed(Duration),
    /// `initial * 2^n` for the n-th consecutive failure, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Delay after `failures` consecutive closes without a successful open
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
                initial.checked_mul(factor).map_or(max, |d| d.min(max))
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

/// What the connection task should do after a close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOutcome {
    /// First close since start or the last open: report the connection as lost
    pub lost: bool,
    pub retry_in: Duration,
}

/// Connection lifecycle and subscription bookkeeping
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    policy: ReconnectPolicy,
    tracked: Vec<String>,
    suppressed: BTreeSet<String>,
    resubscribe_suppressed: bool,
    failures: u32,
}

impl ConnectionMachine {
    /// # Arguments
    ///
    /// * `tracked` - Channels subscribed on every open
    /// * `policy` - Reconnect delay schedule
    /// * `resubscribe_suppressed` - Subscribe to every tracked channel on
    ///   open, even ones the user has unsubscribed from
    pub fn new(tracked: Vec<String>, policy: ReconnectPolicy, resubscribe_suppressed: bool) -> Self {
        Self {
            state: ConnectionState::default(),
            policy,
            tracked,
            suppressed: BTreeSet::new(),
            resubscribe_suppressed,
            failures: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// A connect attempt is starting
    pub fn begin_connect(&mut self) {
        self.state.phase = ConnectionPhase::Connecting;
        self.state.attempts = self.state.attempts.saturating_add(1);
    }

    /// The socket opened. Returns the subscriptions to send.
    pub fn on_open(&mut self) -> Vec<Directive> {
        self.state.connected = true;
        self.state.reconnecting = false;
        self.state.phase = ConnectionPhase::Open;
        self.failures = 0;

        self.tracked
            .iter()
            .filter(|channel| self.resubscribe_suppressed || !self.suppressed.contains(*channel))
            .map(|channel| Directive::Subscribe(channel.clone()))
            .collect()
    }

    /// The socket closed, or a connect attempt failed
    pub fn on_close(&mut self) -> CloseOutcome {
        let lost = !self.state.reconnecting;
        let retry_in = self.policy.delay(self.failures);

        self.state.connected = false;
        self.state.reconnecting = true;
        self.state.phase = ConnectionPhase::Closed;
        self.failures = self.failures.saturating_add(1);

        CloseOutcome { lost, retry_in }
    }

    /// Remember the subscription the user asked for, sent or not
    pub fn note_directive(&mut self, directive: &Directive) {
        match directive {
            Directive::Subscribe(channel) => {
                self.suppressed.remove(channel);
            }
            Directive::Unsubscribe(channel) => {
                self.suppressed.insert(channel.clone());
            }
        }
    }

    /// Connection task is exiting
    pub fn shut_down(&mut self) {
        self.state.connected = false;
        self.state.reconnecting = false;
        self.state.phase = ConnectionPhase::Disconnected;
    }
}
