//! # Live Feed Module
//!
//! Keeps a long-lived WebSocket to the realtime telemetry server.
//!
//! This module handles:
//! - Connecting and subscribing to every tracked channel on open
//! - Decoding one telemetry record per inbound message
//! - Forwarding subscribe/unsubscribe directives from the user
//! - Reconnecting after every drop, forever, on a configurable schedule
//!
//! The connection runs as a single tokio task. The application talks to it
//! through a [`ConnectionHandle`] and receives [`LiveEvent`]s on a channel;
//! the current [`ConnectionState`] is published on a watch channel.

pub mod directive;
pub mod machine;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ViewerError;
use crate::telemetry::record::{decode_message, TelemetryRecord};

pub use directive::Directive;
pub use machine::{ConnectionMachine, ConnectionPhase, ConnectionState, ReconnectPolicy};
pub use transport::{FeedLink, FeedTransport, WebSocketTransport};

/// Settings for one live feed connection
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub url: String,
    pub tracked: Vec<String>,
    pub policy: ReconnectPolicy,
    pub resubscribe_suppressed: bool,
}

/// Something the connection task observed
#[derive(Debug)]
pub enum LiveEvent {
    /// Socket opened and subscriptions were sent
    Opened,
    /// One decoded telemetry record
    Record(TelemetryRecord),
    /// Inbound message that is not JSON
    Malformed(ViewerError),
    /// Transport error; a close follows
    Error(ViewerError),
    /// Socket closed; `lost` is set on the first close since start or the last open
    Closed { lost: bool },
    /// Reconnect scheduled
    Reconnecting { attempt: u32, delay: Duration },
}

enum LiveCommand {
    Send(Directive),
    Shutdown,
}

enum Served {
    Closed,
    Shutdown,
}

/// Application-side handle to the connection task
#[derive(Debug)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<LiveCommand>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for LiveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveCommand::Send(d) => write!(f, "Send({})", d),
            LiveCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl ConnectionHandle {
    /// Send one directive over the active connection.
    ///
    /// While disconnected the directive is dropped, not queued.
    pub fn send(&self, directive: Directive) {
        if self.commands.send(LiveCommand::Send(directive)).is_err() {
            debug!("Connection task gone, directive dropped");
        }
    }

    pub fn subscribe(&self, channel: &str) {
        self.send(Directive::Subscribe(channel.to_string()));
    }

    pub fn unsubscribe(&self, channel: &str) {
        self.send(Directive::Unsubscribe(channel.to_string()));
    }

    /// Snapshot of the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the connection task, cancelling any pending reconnect
    pub async fn shutdown(self) {
        let _ = self.commands.send(LiveCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Connection task ended abnormally: {}", e);
        }
    }
}

/// Owner of the live connection, running inside its own task
pub struct ConnectionManager<T: FeedTransport + 'static> {
    transport: Arc<T>,
    url: String,
    machine: ConnectionMachine,
    commands: mpsc::UnboundedReceiver<LiveCommand>,
    events: mpsc::UnboundedSender<LiveEvent>,
    state: watch::Sender<ConnectionState>,
}

impl<T: FeedTransport + 'static> ConnectionManager<T> {
    /// Start the connection task
    ///
    /// # Arguments
    ///
    /// * `transport` - How to open connections (WebSocket in production)
    /// * `settings` - URL, tracked channels and reconnect policy
    /// * `events` - Where lifecycle events and records are delivered
    pub fn spawn(
        transport: T,
        settings: LiveSettings,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> ConnectionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());

        let manager = Self {
            transport: Arc::new(transport),
            url: settings.url,
            machine: ConnectionMachine::new(
                settings.tracked,
                settings.policy,
                settings.resubscribe_suppressed,
            ),
            commands: command_rx,
            events,
            state: state_tx,
        };

        ConnectionHandle {
            commands: command_tx,
            state: state_rx,
            task: tokio::spawn(manager.run()),
        }
    }

    async fn run(mut self) {
        loop {
            self.machine.begin_connect();
            self.publish_state();
            info!(
                "Connecting to live feed at {} (attempt {})",
                self.url,
                self.machine.state().attempts
            );

            let served = match self.connect().await {
                Some(Ok(link)) => self.serve(link).await,
                Some(Err(e)) => {
                    warn!("Live feed error: {}", e);
                    self.emit(LiveEvent::Error(e));
                    Served::Closed
                }
                None => Served::Shutdown,
            };
            if let Served::Shutdown = served {
                break;
            }

            let outcome = self.machine.on_close();
            self.publish_state();
            if outcome.lost {
                warn!("Live feed connection lost");
            } else {
                debug!("Live feed closed");
            }
            self.emit(LiveEvent::Closed { lost: outcome.lost });

            info!("Reconnecting live feed in {:?}", outcome.retry_in);
            self.emit(LiveEvent::Reconnecting {
                attempt: self.machine.state().attempts + 1,
                delay: outcome.retry_in,
            });
            if !self.wait(outcome.retry_in).await {
                break;
            }
        }

        self.machine.shut_down();
        self.publish_state();
        info!("Live feed stopped");
    }

    /// Attempt one connect; `None` if shutdown arrived first
    async fn connect(&mut self) -> Option<crate::error::Result<Box<dyn FeedLink>>> {
        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let connect = async move { transport.connect(&url).await };
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return Some(result),
                command = self.commands.recv() => match command {
                    Some(LiveCommand::Send(directive)) => self.drop_directive(directive),
                    Some(LiveCommand::Shutdown) | None => return None,
                },
            }
        }
    }

    /// Pump an open link until it closes or shutdown is requested
    async fn serve(&mut self, mut link: Box<dyn FeedLink>) -> Served {
        for directive in self.machine.on_open() {
            if let Err(e) = link.send_text(directive.to_string()).await {
                warn!("Failed to send '{}': {}", directive, e);
            }
        }
        self.publish_state();
        info!("Live feed is open");
        self.emit(LiveEvent::Opened);

        loop {
            tokio::select! {
                message = link.next_message() => match message {
                    Some(Ok(text)) => match decode_message(&text) {
                        Ok(record) => self.emit(LiveEvent::Record(record)),
                        Err(e) => {
                            warn!("Dropping malformed live message: {}", e);
                            self.emit(LiveEvent::Malformed(e));
                        }
                    },
                    Some(Err(e)) => {
                        warn!("Live feed error: {}", e);
                        self.emit(LiveEvent::Error(e));
                        return Served::Closed;
                    }
                    None => return Served::Closed,
                },
                command = self.commands.recv() => match command {
                    Some(LiveCommand::Send(directive)) => {
                        self.machine.note_directive(&directive);
                        debug!("Sending '{}'", directive);
                        if let Err(e) = link.send_text(directive.to_string()).await {
                            warn!("Failed to send '{}': {}", directive, e);
                            self.emit(LiveEvent::Error(e));
                        }
                    }
                    Some(LiveCommand::Shutdown) | None => {
                        if let Err(e) = link.close().await {
                            debug!("Error closing live feed: {}", e);
                        }
                        return Served::Shutdown;
                    }
                },
            }
        }
    }

    /// Sleep before reconnecting; `false` if shutdown arrived first
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(LiveCommand::Send(directive)) => self.drop_directive(directive),
                    Some(LiveCommand::Shutdown) | None => return false,
                },
            }
        }
    }

    fn drop_directive(&mut self, directive: Directive) {
        self.machine.note_directive(&directive);
        debug!("Not connected, dropping '{}'", directive);
    }

    fn emit(&self, event: LiveEvent) {
        // Receiver gone means the application is shutting down
        let _ = self.events.send(event);
    }

    fn publish_state(&self) {
        self.state.send_replace(self.machine.state().clone());
    }
}

#[cfg(test)]
mod tests {
    use super::transport::mocks::*;
    use super::*;
    use crate::telemetry::record::sample;
    use tokio::time::Instant;

    fn settings() -> LiveSettings {
        LiveSettings {
            url: "ws://localhost:8080/realtime".to_string(),
            tracked: vec!["pwr.v".to_string(), "pwr.c".to_string()],
            policy: ReconnectPolicy::Fixed(Duration::from_millis(1000)),
            resubscribe_suppressed: true,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<LiveEvent>) -> LiveEvent {
        rx.recv().await.expect("connection task dropped its sender")
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_subscribes_and_forwards_records() {
        let transport = MockTransport::new();
        let peer = transport.accept();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::spawn(transport.clone(), settings(), tx);

        assert!(matches!(next_event(&mut rx).await, LiveEvent::Opened));
        assert_eq!(peer.sent(), vec!["subscribe pwr.v", "subscribe pwr.c"]);
        assert!(handle.state().connected);
        assert_eq!(handle.state().phase, ConnectionPhase::Open);

        peer.inbound
            .send(Ok(r#"{"id":"pwr.v","timestamp":300,"value":3}"#.to_string()))
            .unwrap();
        match next_event(&mut rx).await {
            LiveEvent::Record(record) => assert_eq!(record, sample("pwr.v", 300, 3.0)),
            other => panic!("Expected Record, got: {:?}", other),
        }

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_message_does_not_close() {
        let transport = MockTransport::new();
        let peer = transport.accept();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::spawn(transport.clone(), settings(), tx);
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Opened));

        peer.inbound.send(Ok("not json".to_string())).unwrap();
        peer.inbound
            .send(Ok(r#"{"id":"pwr.c","timestamp":1,"value":2}"#.to_string()))
            .unwrap();

        assert!(matches!(next_event(&mut rx).await, LiveEvent::Malformed(ViewerError::Payload(_))));
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Record(_)));
        assert!(handle.state().connected);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_directives_are_forwarded_while_open() {
        let transport = MockTransport::new();
        let peer = transport.accept();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::spawn(transport.clone(), settings(), tx);
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Opened));

        handle.unsubscribe("pwr.v");
        handle.subscribe("pwr.v");
        handle.shutdown().await;

        assert_eq!(
            peer.sent(),
            vec!["subscribe pwr.v", "subscribe pwr.c", "unsubscribe pwr.v", "subscribe pwr.v"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_schedules_reconnect_after_delay() {
        let transport = MockTransport::new();
        let peer = transport.accept();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::spawn(transport.clone(), settings(), tx);
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Opened));

        drop(peer);
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Closed { lost: true }));
        let closed_at = Instant::now();
        assert!(!handle.state().connected);
        assert!(handle.state().reconnecting);
        assert_eq!(handle.state().phase, ConnectionPhase::Closed);

        match next_event(&mut rx).await {
            LiveEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt, 2);
                assert_eq!(delay, Duration::from_millis(1000));
            }
            other => panic!("Expected Reconnecting, got: {:?}", other),
        }

        // Script is empty, so the retry is refused
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Error(_)));
        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - closed_at >= Duration::from_millis(1000));
        assert!(attempts[1] - closed_at < Duration::from_millis(1100));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_open() {
        let transport = MockTransport::new();
        transport.refuse();
        transport.refuse();
        transport.refuse();
        let peer = transport.accept();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::spawn(transport.clone(), settings(), tx);

        let mut lost_notices = 0;
        loop {
            match next_event(&mut rx).await {
                LiveEvent::Opened => break,
                LiveEvent::Closed { lost } => {
                    if lost {
                        lost_notices += 1;
                    }
                }
                _ => {}
            }
        }

        // Only the very first close is reported as a loss
        assert_eq!(lost_notices, 1);
        assert_eq!(transport.attempts().len(), 4);
        let attempts = transport.attempts();
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
        assert_eq!(handle.state().attempts, 4);
        assert!(!handle.state().reconnecting);
        assert_eq!(peer.sent().len(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_directive_dropped_while_disconnected() {
        let transport = MockTransport::new();
        transport.refuse();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut s = settings();
        s.resubscribe_suppressed = false;
        let handle = ConnectionManager::spawn(transport.clone(), s, tx);

        assert!(matches!(next_event(&mut rx).await, LiveEvent::Error(_)));
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Closed { .. }));

        // Sent during the reconnect wait: dropped, but remembered
        handle.unsubscribe("pwr.v");
        let peer = transport.accept();

        loop {
            if let LiveEvent::Opened = next_event(&mut rx).await {
                break;
            }
        }
        assert_eq!(peer.sent(), vec!["subscribe pwr.c"]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_reconnect() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ConnectionManager::spawn(transport.clone(), settings(), tx);

        assert!(matches!(next_event(&mut rx).await, LiveEvent::Error(_)));
        assert!(matches!(next_event(&mut rx).await, LiveEvent::Closed { .. }));
        let mut state = handle.watch_state();
        handle.shutdown().await;

        assert_eq!(state.borrow_and_update().phase, ConnectionPhase::Disconnected);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.attempts().len(), 1);
    }
}
