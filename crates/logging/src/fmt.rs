//! Render `tracing` events into concise logfmt strings.
//!
//! Extracts level, target, and message from a `tracing::Event` and renders
//! the remaining fields in `key=value` form after the message.

use std::fmt::{Debug, Write};

use tracing::{
    Event, Metadata,
    field::{Field, Visit},
};

/// Rendered fields extracted from a tracing Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLog {
    /// Severity level, lowercase (e.g. `info`, `warn`).
    pub level: String,
    /// Event target (typically the module path).
    pub target: String,
    /// Message followed by rendered `key=value` pairs.
    pub message: String,
}

/// Extract a concise triple (level, target, message) from a tracing Event.
///
/// The `message` field comes first, then the remaining fields as
/// `key=value` pairs. Events without a message render the pairs alone.
pub fn render_event(event: &Event<'_>) -> RenderedLog {
    struct MsgVisitor {
        /// Captured `message` field, if present.
        msg: Option<String>,
        /// Accumulated non-message fields rendered as `key=value`.
        fields: String,
    }
    impl Visit for MsgVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "message" {
                self.msg = Some(value.to_string());
            } else {
                let _ignored = write!(&mut self.fields, "{}=\"{}\" ", field.name(), value);
            }
        }
        fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
            if field.name() == "message" {
                self.msg = Some(format!("{:?}", value));
            } else {
                let _ignored = write!(&mut self.fields, "{}={:?} ", field.name(), value);
            }
        }
    }
    let meta: &Metadata<'_> = event.metadata();
    let mut vis = MsgVisitor {
        msg: None,
        fields: String::new(),
    };
    event.record(&mut vis);
    let fields = vis.fields.trim_end();
    let rendered = match vis.msg {
        Some(m) if fields.is_empty() => m,
        Some(m) => format!("{} {}", m, fields),
        None => fields.to_string(),
    };
    RenderedLog {
        level: meta.level().as_str().to_ascii_lowercase(),
        target: meta.target().to_string(),
        message: rendered,
    }
}
