//! Timestamped envelope around a [`LogEvent`]

use crate::codec::Node;
use crate::error::DecodeError;
use crate::event::LogEvent;
use crate::logger::LoggerHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENTRY_TAG: &str = "entry";

const ATTR_TIMESTAMP: &str = "timestamp";
const ATTR_LOGGER: &str = "logger";

/// One log record: capture time, the event, and which logger produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub event: LogEvent,
    /// Identity of the producing logger; `None` for entries loaded from disk.
    #[serde(skip)]
    pub source: Option<LoggerHandle>,
}

impl LogEntry {
    pub fn new(timestamp: i64, event: LogEvent) -> Self {
        Self {
            timestamp,
            event,
            source: None,
        }
    }

    /// Stamp `event` with the current wall-clock time.
    pub fn now(event: LogEvent, source: Option<LoggerHandle>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            event,
            source,
        }
    }

    pub fn with_source(mut self, source: LoggerHandle) -> Self {
        self.source = Some(source);
        self
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new(ENTRY_TAG);
        node.set(ATTR_TIMESTAMP, self.timestamp);
        if let Some(source) = &self.source {
            node.set(ATTR_LOGGER, source.type_tag());
        }
        self.event.to_node(&mut node);
        node
    }

    /// The `logger` attribute is informational; loaded entries have no source.
    pub fn from_node(node: &Node) -> Result<Self, DecodeError> {
        node.expect_tag(ENTRY_TAG)?;
        Ok(Self::new(
            node.require_parse(ATTR_TIMESTAMP)?,
            LogEvent::from_node(node)?,
        ))
    }
}

/// Source identity is not persisted, so it takes no part in equality.
impl PartialEq for LogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.event == other.event
    }
}

impl Eq for LogEntry {}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.timestamp) {
            Some(t) => write!(
                f,
                "[{}] {}",
                t.with_timezone(&chrono::Local).format("%H:%M:%S%.3f"),
                self.event
            ),
            None => write!(f, "[{}] {}", self.timestamp, self.event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeyEvent, KeyEventType, MouseMovedEvent};
    use crate::logger::LoggerHandle;

    #[test]
    fn node_round_trip_drops_source() {
        let source = LoggerHandle::new("KeyLogger");
        let entry = LogEntry::new(
            1_000,
            LogEvent::Key(KeyEvent {
                time: 999,
                code: 30,
                kind: KeyEventType::Pressed,
                ch: Some('a'),
            }),
        )
        .with_source(source);

        let node = entry.to_node();
        assert_eq!(node.tag(), "entry");
        assert_eq!(node.get("logger"), Some("KeyLogger"));
        assert_eq!(node.get("type"), Some("Key"));

        let decoded = LogEntry::from_node(&node).unwrap();
        assert!(decoded.source.is_none());
        assert_eq!(decoded, entry);
    }

    #[test]
    fn from_node_requires_entry_tag() {
        let mut node = LogEntry::new(
            1,
            LogEvent::MouseMoved(MouseMovedEvent { time: 1, x: 0, y: 0 }),
        )
        .to_node();
        assert!(LogEntry::from_node(&node).is_ok());

        node = Node::new("logger");
        assert!(matches!(
            LogEntry::from_node(&node),
            Err(DecodeError::UnexpectedTag { .. })
        ));
    }
}
