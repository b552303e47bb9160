/// skinarb-live — Logger
/// JSONL audit stream: one file per UTC day, one event per line.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Like `log`, but a failed write only produces a warning.
    pub fn log_or_warn<T: Serialize>(&self, event: &T) {
        if let Err(e) = self.log(event) {
            tracing::warn!("audit log write failed: {e}");
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ───────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct SourceStatusEvent {
    pub ts:      String,
    pub event:   &'static str,   // "SOURCE_STATUS"
    pub source:  String,         // "buff" | "market" | "steam"
    pub ok:      bool,
    pub items:   usize,
    pub message: String,
}

impl SourceStatusEvent {
    pub fn ok(source: &str, items: usize) -> Self {
        Self {
            ts:      now_iso(),
            event:   "SOURCE_STATUS",
            source:  source.to_string(),
            ok:      true,
            items,
            message: "ok".to_string(),
        }
    }

    pub fn failed(source: &str, message: impl Into<String>) -> Self {
        Self {
            ts:      now_iso(),
            event:   "SOURCE_STATUS",
            source:  source.to_string(),
            ok:      false,
            items:   0,
            message: message.into(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct AnalysisCompletedEvent {
    pub ts:          String,
    pub event:       &'static str,   // "ANALYSIS_COMPLETED"
    pub mode:        String,         // "catalog" | "top_liquid"
    pub items:       usize,
    pub profitable:  usize,
    pub duration_ms: u64,
}

#[derive(Serialize, Debug)]
pub struct AnalysisAbortedEvent {
    pub ts:     String,
    pub event:  &'static str,        // "ANALYSIS_ABORTED"
    pub mode:   String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_json_line_per_event() {
        let dir = std::env::temp_dir().join(format!("skinarb-logger-{}", std::process::id()));
        let logger = EventLogger::new(&dir);

        logger.log(&SourceStatusEvent::ok("market", 42)).unwrap();
        logger.log(&SourceStatusEvent::failed("buff", "page 1 failed")).unwrap();

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let raw = fs::read_to_string(dir.join(format!("{date}.jsonl"))).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "SOURCE_STATUS");
        assert_eq!(lines[0]["items"], 42);
        assert_eq!(lines[1]["ok"], false);
        assert_eq!(lines[1]["message"], "page 1 failed");

        fs::remove_dir_all(&dir).ok();
    }
}
