//! Jetstream consumer feeding the local post store.
//!
//! The consumer loops `Disconnected → Connecting → Streaming` forever. Any
//! failure while connected drops back to `Disconnected` and the next attempt
//! starts after a fixed delay.

pub mod events;
pub mod language;

pub use events::{Commit, JetstreamEvent, PostCandidate};
pub use language::{TargetLanguage, is_target_language};

use crate::config::FirehoseConfig;
use crate::store::EventStore;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

pub const DEFAULT_JETSTREAM_URL: &str =
    "wss://jetstream1.us-east.bsky.network/subscribe?wantedCollections=app.bsky.feed.post";

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Counters since the consumer was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub frames: u64,
    pub matched: u64,
    pub inserted: u64,
    pub reconnects: u64,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    matched: AtomicU64,
    inserted: AtomicU64,
    reconnects: AtomicU64,
}

pub struct FirehoseConsumer {
    url: String,
    store: Arc<dyn EventStore>,
    language: TargetLanguage,
    reconnect_delay: Duration,
    state: RwLock<ConsumerState>,
    counters: Counters,
}

impl FirehoseConsumer {
    pub fn new(url: impl Into<String>, store: Arc<dyn EventStore>) -> Self {
        Self {
            url: url.into(),
            store,
            language: TargetLanguage::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state: RwLock::new(ConsumerState::Disconnected),
            counters: Counters::default(),
        }
    }

    pub fn from_config(config: &FirehoseConfig, store: Arc<dyn EventStore>) -> Self {
        Self::new(config.url.clone(), store)
            .with_language(TargetLanguage::for_tag(&config.target_lang))
            .with_reconnect_delay(Duration::from_secs(config.reconnect_delay_secs))
    }

    pub fn with_language(mut self, language: TargetLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.read()
    }

    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            matched: self.counters.matched.load(Ordering::Relaxed),
            inserted: self.counters.inserted.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Run the consumer on its own task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Consume forever, reconnecting after every disconnect.
    pub async fn run(&self) {
        tracing::info!(
            url = %self.url,
            lang = self.language.tag(),
            store = self.store.name(),
            "Starting firehose consumer"
        );

        loop {
            self.set_state(ConsumerState::Connecting);
            match self.run_session().await {
                Ok(()) => tracing::warn!(
                    "Firehose stream closed, reconnecting in {}s",
                    self.reconnect_delay.as_secs()
                ),
                Err(e) => tracing::error!(
                    "Firehose error: {e:#}, reconnecting in {}s",
                    self.reconnect_delay.as_secs()
                ),
            }
            self.set_state(ConsumerState::Disconnected);
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(stats = ?self.stats(), "Firehose disconnected");
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One connection lifetime. Returns `Ok` when the server closes the stream.
    async fn run_session(&self) -> Result<()> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .context("Failed to connect to Jetstream")?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConsumerState::Streaming);
        tracing::info!("Firehose connected");

        while let Some(msg) = read.next().await {
            match msg.context("Jetstream read failed")? {
                Message::Text(text) => {
                    for frame in text.as_str().lines().filter(|l| !l.trim().is_empty()) {
                        self.handle_frame(frame).await?;
                    }
                }
                Message::Ping(data) => write.send(Message::Pong(data)).await?,
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    }

    /// Process one JSON frame. Returns whether a new post was stored.
    ///
    /// Malformed frames and store failures are errors; the caller treats both
    /// as a disconnect.
    pub async fn handle_frame(&self, frame: &str) -> Result<bool> {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);

        let event = JetstreamEvent::parse(frame).context("Malformed Jetstream frame")?;
        let Some(candidate) = event.post_candidate() else {
            return Ok(false);
        };
        if !self.language.matches(&candidate.text, &candidate.langs) {
            return Ok(false);
        }
        self.counters.matched.fetch_add(1, Ordering::Relaxed);

        let record = candidate.into_record(now_epoch_secs());
        let inserted = self
            .store
            .insert(&record)
            .await
            .with_context(|| format!("Failed to store {}", record.uri))?;
        if inserted {
            self.counters.inserted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(uri = %record.uri, "Stored post");
        }
        Ok(inserted)
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.write() = state;
    }
}

#[allow(clippy::cast_precision_loss)]
fn now_epoch_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
