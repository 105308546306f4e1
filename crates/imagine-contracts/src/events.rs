use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        credential_source: Option<String>,
    },
    GenerationStarted {
        model: String,
        prompt: String,
        images: u32,
        calls: u32,
    },
    BatchDegraded {
        model: String,
        images: u32,
        reason: String,
    },
    ImageReady {
        index: usize,
        model: String,
        format: String,
        source: String,
        revised: bool,
    },
    ImageFailed {
        index: usize,
        kind: String,
        message: String,
    },
    GenerationFinished {
        model: String,
        succeeded: usize,
        failed: usize,
    },
    HistoryCleared,
}

/// Append-only `events.jsonl` writer for one session.
///
/// Each line is one compact JSON object: the event's own fields tagged with
/// `type`, followed by `session_id` and `ts`.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let mut line = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            other => anyhow::bail!("session event serialized to non-object: {other}"),
        };
        line.insert(
            "session_id".to_string(),
            Value::String(self.session_id.clone()),
        );
        line.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let text = serde_json::to_string(&line)?;
        file.write_all(text.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(line))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
