//! # Application Controller
//!
//! Owns all mutable state and runs the single event loop that reacts to
//! history results, live feed events, user commands and store changes.
//! Handlers never run concurrently; I/O tasks only talk to the loop through
//! channels.

pub mod input;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::IncidentLog;
use crate::history::HistoryEvent;
use crate::live::{ConnectionHandle, ConnectionState, Directive, LiveEvent};
use crate::telemetry::TelemetryStore;
use crate::view::{project, DisplayCap, FilterController, FilterState, Frame, Renderer};

use input::{parse_command, Command};

/// What the loop must do after handling a user command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Effect {
    /// Directive for the live feed
    pub directive: Option<Directive>,
    pub refresh: bool,
    pub quit: bool,
}

/// All mutable application state
#[derive(Debug)]
pub struct AppState {
    pub store: TelemetryStore,
    pub filter: FilterController,
    pub cap: DisplayCap,
    pub incidents: IncidentLog,
    pub tracked: Vec<String>,
}

impl AppState {
    pub fn new(tracked: Vec<String>, filter: FilterState, cap: DisplayCap, incidents: IncidentLog) -> Self {
        Self {
            store: TelemetryStore::new(),
            filter: FilterController::new(filter),
            cap,
            incidents,
            tracked,
        }
    }

    /// Apply one history outcome
    pub fn on_history(&mut self, event: HistoryEvent) {
        match event {
            HistoryEvent::Loaded { channel, records } => {
                debug!("Storing {} historical record(s) for {}", records.len(), channel);
                self.store.append_many(records);
            }
            HistoryEvent::Failed { channel, error } => {
                self.incidents.record(&format!("history {}", channel), &error);
            }
        }
    }

    /// Apply one live feed event. Returns `true` if the status changed.
    ///
    /// Store appends are not reported here; they notify through the store.
    pub fn on_live(&mut self, event: LiveEvent) -> bool {
        match event {
            LiveEvent::Record(record) => {
                self.store.append_one(record);
                false
            }
            LiveEvent::Malformed(error) | LiveEvent::Error(error) => {
                self.incidents.record("live", &error);
                true
            }
            LiveEvent::Opened | LiveEvent::Closed { .. } | LiveEvent::Reconnecting { .. } => true,
        }
    }

    /// Parse and apply one line of user input
    pub fn on_input(&mut self, line: &str) -> Effect {
        match parse_command(line, &self.tracked) {
            Ok(Some(command)) => self.apply(command),
            Ok(None) => Effect::default(),
            Err(error) => {
                warn!("{}", error);
                self.incidents.record("input", &error);
                Effect {
                    refresh: true,
                    ..Effect::default()
                }
            }
        }
    }

    /// Apply one user command
    pub fn apply(&mut self, command: Command) -> Effect {
        match command {
            Command::Toggle(channel) => {
                let directive = self.filter.toggle_channel(&channel);
                info!("{} (filter now hides: {:?})", directive, self.filter.state().suppressed().collect::<Vec<_>>());
                Effect {
                    directive: Some(directive),
                    refresh: true,
                    quit: false,
                }
            }
            Command::Order => {
                self.filter.toggle_order();
                Effect {
                    refresh: true,
                    ..Effect::default()
                }
            }
            Command::More => {
                self.cap.grow();
                debug!("Display cap raised to {}", self.cap.limit());
                Effect {
                    refresh: true,
                    ..Effect::default()
                }
            }
            Command::Quit => Effect {
                quit: true,
                ..Effect::default()
            },
        }
    }

    /// Build the frame for the current state
    pub fn frame(&self, connection: ConnectionState) -> Frame {
        let filter = self.filter.state();
        Frame {
            rows: project(self.store.records(), filter, self.cap.limit()),
            connection,
            suppressed: filter.suppressed().map(str::to_string).collect(),
            ascending: filter.ascending(),
            cap: self.cap.limit(),
            stored: self.store.len(),
            incident: self.incidents.latest().map(ToString::to_string),
        }
    }
}

/// Receiving ends of every event source
pub struct Inbox {
    pub history: mpsc::UnboundedReceiver<HistoryEvent>,
    pub live: mpsc::UnboundedReceiver<LiveEvent>,
    pub input: mpsc::UnboundedReceiver<String>,
}

/// The controller: state, renderer and connection, driven by one loop
pub struct App<R: Renderer> {
    state: AppState,
    renderer: R,
    connection: ConnectionHandle,
    inbox: Inbox,
    store_changes: watch::Receiver<u64>,
}

impl<R: Renderer> App<R> {
    pub fn new(state: AppState, renderer: R, connection: ConnectionHandle, inbox: Inbox) -> Self {
        let store_changes = state.store.subscribe();
        Self {
            state,
            renderer,
            connection,
            inbox,
            store_changes,
        }
    }

    /// Run until the user quits or Ctrl+C is received
    pub async fn run(mut self) -> AppState {
        self.redraw();

        loop {
            tokio::select! {
                Some(event) = self.inbox.history.recv() => {
                    self.state.on_history(event);
                }

                Some(event) = self.inbox.live.recv() => {
                    if self.state.on_live(event) {
                        self.redraw();
                    }
                }

                Some(line) = self.inbox.input.recv() => {
                    let effect = self.state.on_input(&line);
                    if let Some(directive) = effect.directive {
                        self.connection.send(directive);
                    }
                    if effect.quit {
                        info!("Quit requested, shutting down...");
                        break;
                    }
                    if effect.refresh {
                        self.redraw();
                    }
                }

                Ok(()) = self.store_changes.changed() => {
                    self.store_changes.borrow_and_update();
                    self.redraw();
                }

                // Handle Ctrl+C for graceful shutdown
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    break;
                }
            }
        }

        info!("Total records received: {}", self.state.store.len());
        self.connection.shutdown().await;
        self.state
    }

    fn redraw(&mut self) {
        let frame = self.state.frame(self.connection.state());
        if let Err(e) = self.renderer.render(&frame) {
            warn!("Render failed: {}", e);
            self.state.incidents.record("render", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IncidentKind, ViewerError};
    use crate::live::transport::mocks::MockTransport;
    use crate::live::{ConnectionManager, LiveSettings, ReconnectPolicy};
    use crate::telemetry::record::sample;
    use crate::view::render::MockRenderer;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn state() -> AppState {
        AppState::new(
            vec!["pwr.v".to_string(), "pwr.c".to_string()],
            FilterState::default(),
            DisplayCap::new(10, 10),
            IncidentLog::new(8),
        )
    }

    #[test]
    fn test_history_batch_is_stored() {
        let mut app = state();
        app.on_history(HistoryEvent::Loaded {
            channel: "pwr.v".into(),
            records: vec![sample("pwr.v", 100, 1.0), sample("pwr.c", 200, 2.0)],
        });

        let frame = app.frame(ConnectionState::default());
        assert_eq!(frame.rows, vec![sample("pwr.c", 200, 2.0), sample("pwr.v", 100, 1.0)]);
        assert_eq!(frame.stored, 2);
    }

    #[test]
    fn test_history_failure_becomes_incident() {
        let mut app = state();
        app.on_history(HistoryEvent::Failed {
            channel: "pwr.c".into(),
            error: ViewerError::Status { status: 500, url: "/history/pwr.c".into() },
        });

        assert!(app.store.is_empty());
        let incident = app.incidents.latest().unwrap();
        assert_eq!(incident.kind, IncidentKind::Transport);
        assert_eq!(incident.source, "history pwr.c");
        assert!(app.frame(ConnectionState::default()).incident.is_some());
    }

    #[test]
    fn test_live_record_after_history() {
        let mut app = state();
        app.on_history(HistoryEvent::Loaded {
            channel: "pwr.v".into(),
            records: vec![sample("pwr.v", 100, 1.0), sample("pwr.c", 200, 2.0)],
        });
        assert!(!app.on_live(LiveEvent::Record(sample("pwr.v", 300, 3.0))));

        let rows = app.frame(ConnectionState::default()).rows;
        assert_eq!(
            rows,
            vec![
                sample("pwr.v", 300, 3.0),
                sample("pwr.c", 200, 2.0),
                sample("pwr.v", 100, 1.0)
            ]
        );
    }

    #[test]
    fn test_live_errors_are_recorded() {
        let mut app = state();
        assert!(app.on_live(LiveEvent::Malformed(ViewerError::Payload("x".into()))));
        assert!(app.on_live(LiveEvent::Error(ViewerError::WebSocket("reset".into()))));
        assert!(app.on_live(LiveEvent::Closed { lost: true }));
        assert_eq!(app.incidents.len(), 2);
    }

    #[test]
    fn test_toggle_command_emits_directive() {
        let mut app = state();

        let effect = app.on_input("1");
        assert_eq!(effect.directive, Some(Directive::Unsubscribe("pwr.v".into())));
        assert!(effect.refresh);
        assert!(app.filter.state().is_suppressed("pwr.v"));

        let effect = app.on_input("toggle pwr.v");
        assert_eq!(effect.directive, Some(Directive::Subscribe("pwr.v".into())));
    }

    #[test]
    fn test_order_command_only_refreshes() {
        let mut app = state();
        let effect = app.on_input("order");
        assert_eq!(
            effect,
            Effect {
                directive: None,
                refresh: true,
                quit: false
            }
        );
        assert!(!app.filter.state().ascending());
    }

    #[test]
    fn test_more_command_grows_cap() {
        let mut app = state();
        app.store
            .append_many((0..25).map(|i| sample("pwr.v", i, 0.0)).collect::<Vec<_>>());
        assert_eq!(app.frame(ConnectionState::default()).rows.len(), 10);

        app.on_input("more");
        assert_eq!(app.frame(ConnectionState::default()).rows.len(), 20);
        app.on_input("m");
        assert_eq!(app.frame(ConnectionState::default()).rows.len(), 25);
    }

    #[test]
    fn test_bad_command_is_recorded_not_fatal() {
        let mut app = state();
        let effect = app.on_input("explode");
        assert!(!effect.quit);
        assert!(effect.directive.is_none());
        assert_eq!(app.incidents.latest().unwrap().kind, IncidentKind::Command);
    }

    #[test]
    fn test_frame_reflects_filter() {
        let mut app = state();
        app.store.append_many(vec![sample("pwr.v", 1, 1.0), sample("pwr.c", 2, 2.0)]);
        app.on_input("2");
        app.on_input("o");

        let frame = app.frame(ConnectionState::default());
        assert_eq!(frame.suppressed, vec!["pwr.c"]);
        assert!(!frame.ascending);
        assert_eq!(frame.rows, vec![sample("pwr.v", 1, 1.0)]);
        assert_eq!(frame.stored, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_loop_end_to_end() {
        let transport = MockTransport::new();
        let peer = transport.accept();
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::spawn(
            transport.clone(),
            LiveSettings {
                url: "ws://test/realtime".into(),
                tracked: vec!["pwr.v".into(), "pwr.c".into()],
                policy: ReconnectPolicy::Fixed(Duration::from_millis(1000)),
                resubscribe_suppressed: true,
            },
            live_tx,
        );

        let (history_tx, history_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let frames: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
        let mut renderer = MockRenderer::new();
        let captured = Arc::clone(&frames);
        renderer.expect_render().returning(move |frame| {
            captured.lock().unwrap().push(frame.clone());
            Ok(())
        });

        let app = App::new(
            state(),
            renderer,
            connection,
            Inbox {
                history: history_rx,
                live: live_rx,
                input: input_rx,
            },
        );
        let running = tokio::spawn(app.run());

        history_tx
            .send(HistoryEvent::Loaded {
                channel: "pwr.v".into(),
                records: vec![sample("pwr.v", 100, 1.0), sample("pwr.c", 200, 2.0)],
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        peer.inbound
            .send(Ok(r#"{"id":"pwr.v","timestamp":300,"value":3}"#.to_string()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        input_tx.send("toggle pwr.c".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        input_tx.send("quit".to_string()).unwrap();

        let final_state = running.await.unwrap();
        assert_eq!(final_state.store.len(), 3);
        assert!(final_state.filter.state().is_suppressed("pwr.c"));
        assert_eq!(
            peer.sent(),
            vec!["subscribe pwr.v", "subscribe pwr.c", "unsubscribe pwr.c"]
        );

        let frames = frames.lock().unwrap();
        let last = frames.last().unwrap();
        assert_eq!(last.rows, vec![sample("pwr.v", 300, 3.0), sample("pwr.v", 100, 1.0)]);
        assert!(frames
            .iter()
            .any(|f| f.rows.len() == 3 && f.rows[0] == sample("pwr.v", 300, 3.0)));
    }
}
