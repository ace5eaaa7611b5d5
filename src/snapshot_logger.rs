// Snapshot logging module for asynchronous board history
//
// Drivers run on plain threads and must never wait on disk, so every change
// is pushed onto an unbounded channel and a single tokio task writes it to a
// JSONL file, one board snapshot per line.

use log::error;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::board::Change;
use crate::snapshot::BoardSnapshot;

/// Represents a single snapshot log line
#[derive(Debug, Serialize)]
struct SnapshotLogEntry {
    sequence: u64,
    change: Change,
    snapshot: BoardSnapshot,
    timestamp: String,
}

/// Cloneable handle used by board observers
/// Sending never blocks; a disabled sink drops everything
#[derive(Clone)]
pub struct SnapshotSink {
    tx: Option<UnboundedSender<SnapshotLogEntry>>,
    sequence: Arc<AtomicU64>,
}

impl SnapshotSink {
    fn disabled() -> Self {
        SnapshotSink {
            tx: None,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queues one entry (fire-and-forget)
    pub fn record(&self, change: Change, snapshot: BoardSnapshot) {
        let Some(tx) = &self.tx else {
            return;
        };
        let entry = SnapshotLogEntry {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            change,
            snapshot,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        if tx.send(entry).is_err() {
            error!("Snapshot writer has stopped, dropping entry");
        }
    }
}

/// Owns the writer task
pub struct SnapshotLogger {
    sink: SnapshotSink,
    writer: Option<JoinHandle<()>>,
}

impl SnapshotLogger {
    /// Creates a new snapshot logger
    /// If enabled is true, initializes the log file (truncating if it exists)
    /// and spawns the writer on the current tokio runtime
    pub async fn new(enabled: bool, log_file_path: &str) -> Self {
        if !enabled {
            return SnapshotLogger::disabled();
        }

        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)
            .await
        {
            Ok(file) => {
                log::info!("Snapshot logging enabled: {}", log_file_path);
                let (tx, rx) = mpsc::unbounded_channel();
                SnapshotLogger {
                    sink: SnapshotSink {
                        tx: Some(tx),
                        sequence: Arc::new(AtomicU64::new(0)),
                    },
                    writer: Some(tokio::spawn(write_entries(file, rx))),
                }
            }
            Err(e) => {
                error!("Failed to create snapshot log file '{}': {}", log_file_path, e);
                SnapshotLogger::disabled()
            }
        }
    }

    /// Creates a disabled snapshot logger (no-op)
    pub fn disabled() -> Self {
        SnapshotLogger {
            sink: SnapshotSink::disabled(),
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_enabled()
    }

    pub fn sink(&self) -> SnapshotSink {
        self.sink.clone()
    }

    /// Closes this logger's sender and waits up to `grace` for queued entries
    /// to reach the file. Entries from sinks still alive elsewhere keep the
    /// writer open until they are dropped.
    pub async fn finish(self, grace: Duration) -> bool {
        let SnapshotLogger { sink, writer } = self;
        drop(sink);
        let Some(writer) = writer else {
            return true;
        };
        match tokio::time::timeout(grace, writer).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Snapshot writer failed: {}", e);
                false
            }
            Err(_) => {
                error!("Snapshot writer did not drain within {:?}", grace);
                false
            }
        }
    }
}

async fn write_entries(mut file: File, mut rx: UnboundedReceiver<SnapshotLogEntry>) {
    while let Some(entry) = rx.recv().await {
        match serde_json::to_string(&entry) {
            Ok(json_line) => {
                let line_with_newline = format!("{}\n", json_line);
                if let Err(e) = file.write_all(line_with_newline.as_bytes()).await {
                    error!("Failed to write snapshot entry: {}", e);
                } else if let Err(e) = file.flush().await {
                    error!("Failed to flush snapshot log: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to serialize snapshot entry: {}", e);
            }
        }
    }
}
