//! zedlog-core - input event model and data logger abstraction
//!
//! Keyboard and mouse events, their document and compact text encodings,
//! timestamped log entries, and the observer-based `DataLogger` contract
//! that event sources implement.

pub mod codec;
pub mod entry;
pub mod error;
pub mod event;
pub mod logger;

pub use codec::{Node, TokenReader};
pub use entry::LogEntry;
pub use error::{DecodeError, Error, ErrorCode, Result};
pub use event::{
    button_name, EventKind, KeyEvent, KeyEventType, LogEvent, MouseClickedEvent,
    MouseDraggedEvent, MouseMovedEvent, MousePressedEvent, MouseWheelMovedEvent, WheelDirection,
};
pub use logger::{
    same_logger, DataLogger, DataLoggerObserver, LoggerCore, LoggerHandle, SourceLogger,
};

pub mod prelude {
    pub use crate::entry::LogEntry;
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::event::*;
    pub use crate::logger::{DataLogger, DataLoggerObserver, LoggerHandle, SourceLogger};
}
