//! Progress relay for image pulls and saves
//!
//! The producer (image saver) and a consumer (`ProgressSink`) run
//! concurrently over a bounded channel. When the channel is full the
//! producer awaits capacity, so no update is ever dropped. The producer
//! closes the channel by dropping its sender; sinks drain until close.

use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One progress update from the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Layer or image id the update is about, empty for image-level status
    #[serde(default)]
    pub id: String,

    /// Human-readable status ("Downloading", "Pull complete", ...)
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Progress {
    pub fn status(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            ..Self::default()
        }
    }
}

/// Consumer of a progress channel
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Consume updates until the sender side is dropped
    async fn drain(&self, rx: mpsc::Receiver<Progress>);
}

/// Run `producer` with a fresh channel while `sink` drains it
///
/// Returns once the producer finished and the sink saw the channel close.
pub async fn relay<F, Fut, T>(sink: &dyn ProgressSink, buffer: usize, producer: F) -> T
where
    F: FnOnce(mpsc::Sender<Progress>) -> Fut,
    Fut: Future<Output = T>,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let (output, ()) = tokio::join!(producer(tx), sink.drain(rx));
    output
}

/// Logs each update at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn drain(&self, mut rx: mpsc::Receiver<Progress>) {
        while let Some(progress) = rx.recv().await {
            tracing::debug!(
                id = %progress.id,
                status = %progress.status,
                current = ?progress.current,
                total = ?progress.total,
                "image progress"
            );
        }
    }
}

/// Terminal progress bars, one per layer
#[derive(Debug, Default)]
pub struct TerminalSink {
    multi: MultiProgress,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn bar(&self, id: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_prefix(id.to_string());
        pb
    }
}

#[async_trait]
impl ProgressSink for TerminalSink {
    async fn drain(&self, mut rx: mpsc::Receiver<Progress>) {
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();

        while let Some(progress) = rx.recv().await {
            let pb = bars
                .entry(progress.id.clone())
                .or_insert_with(|| self.bar(&progress.id));

            if let Some(total) = progress.total {
                pb.set_length(total);
            }
            if let Some(current) = progress.current {
                pb.set_position(current);
            }
            pb.set_message(progress.status);
        }

        for pb in bars.into_values() {
            pb.finish();
        }
    }
}

/// Keeps every update in memory
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    updates: Arc<Mutex<Vec<Progress>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<Progress> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn drain(&self, mut rx: mpsc::Receiver<Progress>) {
        while let Some(progress) = rx.recv().await {
            if let Ok(mut updates) = self.updates.lock() {
                updates.push(progress);
            }
        }
    }
}
