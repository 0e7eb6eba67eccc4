//! # History Module
//!
//! Fetches historical telemetry at startup, one request per tracked channel.
//!
//! Each request is `GET <base>/<channel>?start=<epoch-ms>&end=<epoch-ms>` and
//! answers with a JSON object whose values are records. A successful body is
//! flattened and delivered as one batch; a failed request is reported once
//! and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, ViewerError};
use crate::telemetry::record::{decode_history_body, TelemetryRecord};

/// Time range of one history query, in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    /// Window of `lookback` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, lookback: chrono::Duration) -> Self {
        let end_ms = end.timestamp_millis();
        Self {
            start_ms: end_ms - lookback.num_milliseconds(),
            end_ms,
        }
    }

    /// Window of `minutes` ending now
    pub fn last_minutes(minutes: u32) -> Self {
        Self::ending_at(Utc::now(), chrono::Duration::minutes(i64::from(minutes)))
    }
}

/// Anything that can answer a history query
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch the records of `channel` within `window`
    async fn fetch(&self, channel: &str, window: TimeWindow) -> Result<Vec<TelemetryRecord>>;
}

/// History source backed by the HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpHistorySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHistorySource {
    /// # Arguments
    ///
    /// * `base_url` - Endpoint prefix, e.g. `http://localhost:8080/history`
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full request URL for one channel
    pub fn request_url(&self, channel: &str, window: TimeWindow) -> String {
        format!(
            "{}/{}?start={}&end={}",
            self.base_url, channel, window.start_ms, window.end_ms
        )
    }
}

#[async_trait]
impl HistorySource for HttpHistorySource {
    async fn fetch(&self, channel: &str, window: TimeWindow) -> Result<Vec<TelemetryRecord>> {
        let url = self.request_url(channel, window);
        debug!("Fetching history: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ViewerError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body: Value = response.json().await?;
        decode_history_body(body)
    }
}

/// Result of one channel's history query
#[derive(Debug)]
pub enum HistoryEvent {
    Loaded {
        channel: String,
        records: Vec<TelemetryRecord>,
    },
    Failed {
        channel: String,
        error: ViewerError,
    },
}

/// Issues history queries and reports each outcome as a [`HistoryEvent`]
pub struct HistoryLoader<S: HistorySource + 'static> {
    source: Arc<S>,
}

impl<S: HistorySource + 'static> HistoryLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Query one channel
    pub async fn load(&self, channel: &str, window: TimeWindow) -> HistoryEvent {
        load_channel(self.source.as_ref(), channel, window).await
    }

    /// Query every channel concurrently, one task each
    ///
    /// Outcomes arrive on `events` in completion order.
    pub fn spawn_all(
        &self,
        channels: &[String],
        window: TimeWindow,
        events: mpsc::UnboundedSender<HistoryEvent>,
    ) -> Vec<JoinHandle<()>> {
        info!(
            "Loading history for {} channel(s) from {} to {}",
            channels.len(),
            window.start_ms,
            window.end_ms
        );

        channels
            .iter()
            .cloned()
            .map(|channel| {
                let source = Arc::clone(&self.source);
                let events = events.clone();
                tokio::spawn(async move {
                    let event = load_channel(source.as_ref(), &channel, window).await;
                    // Receiver gone means the application is shutting down
                    let _ = events.send(event);
                })
            })
            .collect()
    }
}

async fn load_channel<S: HistorySource + ?Sized>(
    source: &S,
    channel: &str,
    window: TimeWindow,
) -> HistoryEvent {
    match source.fetch(channel, window).await {
        Ok(records) => {
            info!("Loaded {} historical record(s) for {}", records.len(), channel);
            HistoryEvent::Loaded {
                channel: channel.to_string(),
                records,
            }
        }
        Err(error) => {
            warn!("History request for {} failed: {}", channel, error);
            HistoryEvent::Failed {
                channel: channel.to_string(),
                error,
            }
        }
    }
}
