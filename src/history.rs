//! Per-invocation decision log.
//!
//! One JSON line per hook invocation in `<root>/history/YYYY-MM-DD.jsonl`,
//! so "why didn't it say anything?" can be answered after the fact.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::event::RoutingEvent;
use crate::notify::Outcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub event: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub duration_ms: u64,
}

impl HistoryRecord {
    pub fn new(event: &RoutingEvent, outcome: &Outcome, elapsed: Duration) -> Self {
        Self {
            timestamp: now_timestamp(),
            event: event.kind.to_string(),
            action: outcome.action.as_str().to_string(),
            detail: outcome.rule.map(String::from),
            tier: outcome.tier.map(|t| t.to_string()),
            text: outcome.notice.as_ref().map(|n| n.message.clone()),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn now_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.3f")
        .to_string()
}

/// Append `record` to the daily file under `dir`. Failures are logged only.
pub fn save_record(dir: &Path, record: &HistoryRecord) {
    if let Err(e) = fs::create_dir_all(dir) {
        error!("Failed to create history dir: {e}");
        return;
    }

    // Date from timestamp (first 10 chars: YYYY-MM-DD)
    let date = record.timestamp.get(..10).unwrap_or("unknown");
    let path = dir.join(format!("{date}.jsonl"));

    let json = match serde_json::to_string(record) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize history record: {e}");
            return;
        }
    };
    match fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{json}") {
                error!("Failed to write history record: {e}");
            } else {
                debug!("Saved history record to {}", path.display());
            }
        }
        Err(e) => error!("Failed to open history file: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awareness::AwarenessTier;
    use crate::notify::mapping::Notice;
    use crate::notify::Action;

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let event = RoutingEvent::parse(r#"{"hook_event_name":"Stop"}"#);
        let outcome = Outcome {
            action: Action::Delivered { spoke: true, pushed: false },
            tier: Some(AwarenessTier::Nearby),
            notice: Some(Notice::new("Task complete.")),
            rule: Some("hook-event"),
        };
        let record = HistoryRecord::new(&event, &outcome, Duration::from_millis(42));
        save_record(dir.path(), &record);
        save_record(dir.path(), &record);

        let path = dir.path().join(format!("{}.jsonl", &record.timestamp[..10]));
        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: HistoryRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.event, "Stop");
        assert_eq!(parsed.action, "spoke");
        assert_eq!(parsed.tier.as_deref(), Some("NEARBY"));
        assert_eq!(parsed.text.as_deref(), Some("Task complete."));
        assert_eq!(parsed.duration_ms, 42);
    }

    #[test]
    fn early_exits_omit_optional_fields() {
        let event = RoutingEvent::parse("garbage");
        let outcome = Outcome {
            action: Action::Muted,
            tier: None,
            notice: None,
            rule: None,
        };
        let json = serde_json::to_string(&HistoryRecord::new(&event, &outcome, Duration::ZERO)).unwrap();
        assert!(json.contains(r#""action":"muted""#));
        assert!(!json.contains("tier"));
        assert!(!json.contains("text"));
    }
}
