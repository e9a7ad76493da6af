//! Best-effort execution events.
//!
//! Events go through a bounded channel with `try_send`; a full channel drops the event and
//! bumps a counter. Emission never blocks a vertex.

pub mod writer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

pub use writer::start_events_out;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreExec,
    Exec,
    PostExec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecCode {
    Ok,
    Failed,
    Skipped,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct DagEvent {
    pub run_id: String,
    pub cluster: String,
    pub graph: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub phase: Phase,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub code: ExecCode,
}

#[derive(Clone, Debug)]
pub struct EventCollector {
    tx: mpsc::Sender<DagEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventCollector {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DagEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    pub fn collect(&self, event: DagEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
