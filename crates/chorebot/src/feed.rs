//! Recorded perception feeds.
//!
//! A feed is a JSON-lines file; each line names a state and the offset, in
//! seconds from the start of the run, at which it was observed:
//!
//! ```text
//! {"at": 0.5, "state": "dodge-flash-yellow"}
//! {"at": 2.0, "state": "energy", "value_add": 25}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::{sync::Arc, time::Duration};

use chorebot_engine::{Clock, EventBus};
use chorebot_state::StateEvent;
use serde::Deserialize;
use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

/// One observation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedLine {
    /// Seconds after the start of the run.
    pub at: f64,
    /// State name.
    pub state: String,
    /// Absolute value.
    #[serde(default)]
    pub value: Option<i64>,
    /// Delta value.
    #[serde(default)]
    pub value_add: Option<i64>,
}

/// A malformed feed line.
#[derive(Debug, Error)]
#[error("feed line {line}: {message}")]
pub struct FeedError {
    /// 1-based line number.
    pub line: usize,
    /// What was wrong.
    pub message: String,
}

/// Parse a feed, returning observations sorted by offset.
pub fn parse(src: &str) -> Result<Vec<FeedLine>, FeedError> {
    let mut out = Vec::new();
    for (i, raw) in src.lines().enumerate() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let line: FeedLine = serde_json::from_str(text).map_err(|e| FeedError {
            line: i + 1,
            message: e.to_string(),
        })?;
        if !line.at.is_finite() || line.at < 0.0 {
            return Err(FeedError {
                line: i + 1,
                message: format!("offset must be a non-negative number, got {}", line.at),
            });
        }
        if Duration::try_from_secs_f64(line.at).is_err() {
            return Err(FeedError {
                line: i + 1,
                message: format!("offset {} is out of range", line.at),
            });
        }
        out.push(line);
    }
    out.sort_by(|a, b| a.at.total_cmp(&b.at));
    Ok(out)
}

/// Dispatch every line onto `bus` at its offset, stamping events with the
/// engine clock.
pub async fn replay(lines: Vec<FeedLine>, bus: EventBus, clock: Arc<dyn Clock>) {
    let start = time::Instant::now();
    for l in lines {
        let Some(due) = Duration::try_from_secs_f64(l.at)
            .ok()
            .and_then(|d| start.checked_add(d))
        else {
            warn!(state = %l.state, at = l.at, "feed_offset_out_of_range");
            continue;
        };
        time::sleep_until(due).await;
        let event = StateEvent {
            trigger_time: clock.now(),
            value: l.value,
            value_add: l.value_add,
        };
        if bus.dispatch_event(&l.state, event) {
            debug!(state = %l.state, at = l.at, "feed_dispatched");
        } else {
            warn!(state = %l.state, at = l.at, "feed_event_not_queued");
        }
    }
    debug!("feed_done");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_sorts() {
        let src = r#"
# combat sample
{"at": 2.0, "state": "energy", "value_add": 25}

{"at": 0.5, "state": "dodge-flash-yellow"}
"#;
        let lines = parse(src).expect("parse");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].state, "dodge-flash-yellow");
        assert_eq!(lines[0].value, None);
        assert_eq!(lines[1].value_add, Some(25));
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse("{\"at\": 1, \"state\": \"a\"}\n{\"at\": 1}\n").expect_err("missing state");
        assert_eq!(err.line, 2);

        let err = parse("{\"at\": -1, \"state\": \"a\"}").expect_err("negative");
        assert_eq!(err.line, 1);
        assert!(err.message.contains("non-negative"));

        let err = parse("{\"at\": 1e20, \"state\": \"a\"}").expect_err("too far out");
        assert_eq!(err.line, 1);
        assert!(err.message.contains("out of range"));

        let err = parse("{\"at\": 1, \"state\": \"a\", \"bogus\": 1}").expect_err("unknown field");
        assert!(err.to_string().starts_with("feed line 1:"));
    }
}
