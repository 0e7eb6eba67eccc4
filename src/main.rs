//! # Telemetry Viewer
//!
//! Terminal viewer for historical and realtime telemetry channels.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use telemetry_viewer::app::input::spawn_stdin_reader;
use telemetry_viewer::app::{App, AppState, Inbox};
use telemetry_viewer::config::Config;
use telemetry_viewer::error::IncidentLog;
use telemetry_viewer::history::{HistoryLoader, HttpHistorySource, TimeWindow};
use telemetry_viewer::live::{ConnectionManager, WebSocketTransport};
use telemetry_viewer::view::{FilterState, TableRenderer};

/// Main entry point for the telemetry viewer
///
/// 1. Load configuration (first argument, or built-in defaults)
/// 2. Start logging to a daily rolling file
/// 3. Request the look-back window of every tracked channel
/// 4. Open the live feed and the command reader
/// 5. Run the event loop until `quit` or Ctrl+C
///
/// # Errors
///
/// Returns error if the configuration cannot be read or is invalid, if the
/// log directory cannot be created, or if the HTTP client cannot be built.
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading config from {}", path))?,
        None => Config::default(),
    };

    // Log to file; stdout belongs to the table
    let appender = open_log_appender(&config.logging.dir)?;
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    info!("Telemetry Viewer v{} starting...", env!("CARGO_PKG_VERSION"));

    let tracked = config.channels.tracked.clone();
    info!("Tracking channels: {}", tracked.join(", "));

    let (history_tx, history_rx) = mpsc::unbounded_channel();
    let (live_tx, live_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let source = HttpHistorySource::new(&config.history.base_url, config.history.request_timeout())?;
    let window = TimeWindow::last_minutes(config.history.lookback_minutes);
    HistoryLoader::new(source).spawn_all(&tracked, window, history_tx);

    let connection = ConnectionManager::spawn(WebSocketTransport, config.live.settings(&tracked), live_tx);
    spawn_stdin_reader(input_tx);

    info!("Type 'toggle <channel>', 'order', 'more' or 'quit'");

    let state = AppState::new(
        tracked,
        FilterState::new(config.view.ascending),
        config.view.display_cap(),
        IncidentLog::new(config.logging.incident_capacity),
    );
    let inbox = Inbox {
        history: history_rx,
        live: live_rx,
        input: input_rx,
    };
    let renderer = TableRenderer::stdout(config.view.clear_screen);

    let state = App::new(state, renderer, connection, inbox).run().await;
    info!("Recovered from {} error(s) during the session", state.incidents.total());

    Ok(())
}

/// Daily rolling log file `telemetry-viewer.log.<date>` under `dir`
fn open_log_appender(dir: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("telemetry-viewer.log")
        .build(dir)
        .with_context(|| format!("creating log directory {}", dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_appender_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("logs");
        assert!(open_log_appender(dir.to_str().unwrap()).is_ok());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_unusable_log_directory_is_an_error() {
        // A regular file where the directory should be
        let file = tempfile::NamedTempFile::new().unwrap();
        let dir = file.path().join("logs");

        let err = open_log_appender(dir.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("creating log directory"));
    }
}
