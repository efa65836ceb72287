//! JSONL event log writer

use super::{Event, EVENT_FILE};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Serialize)]
struct Record<'a> {
    ts: f64,
    #[serde(flatten)]
    event: &'a Event,
}

/// Shared handle to the event log file
#[derive(Clone)]
pub struct EventLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl EventLog {
    /// Open `<dir>/maker.jsonl` for appending, creating the directory
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(EVENT_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event; failures are logged, never propagated
    pub fn emit(&self, event: &Event) {
        let record = Record {
            ts: Utc::now().timestamp_micros() as f64 / 1e6,
            event,
        };

        let mut line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, kind = event.kind(), "Failed to encode event");
                return;
            }
        };
        line.push('\n');

        let result = match self.file.lock() {
            Ok(mut file) => file.write_all(line.as_bytes()),
            Err(_) => {
                tracing::warn!(kind = event.kind(), "Event log lock poisoned");
                return;
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, kind = event.kind(), "Failed to append event");
        }
    }
}
