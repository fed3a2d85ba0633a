//! zedlog-recorder - Aggregating input logger with persistence and replay
//!
//! A `CompositeDataLogger` collects entries from any number of data loggers,
//! mirrors them into an XML log file every few entries, and can be rebuilt
//! from such a file through a `LoggerRegistry`. `ReplayTool` plays a
//! recorded sequence back with its original timing.

pub mod composite;
pub mod registry;
pub mod replay;
pub mod storage;

pub use composite::{CompositeConfig, CompositeDataLogger, LoadReport};
pub use registry::{LoggerRegistry, STANDARD_SOURCES};
pub use replay::{
    Actuation, Actuator, ChannelObserver, LoggingActuator, ReplayConfig, ReplayNotice,
    ReplayObserver, ReplayOutcome, ReplayState, ReplayStats, ReplayTool, StopHandle,
};
pub use storage::{read_text_log, write_text_log, LogDocument};

pub mod prelude {
    pub use crate::composite::{CompositeConfig, CompositeDataLogger};
    pub use crate::registry::LoggerRegistry;
    pub use crate::replay::{
        Actuation, Actuator, LoggingActuator, ReplayConfig, ReplayObserver, ReplayOutcome,
        ReplayTool,
    };
    pub use crate::storage::LogDocument;
}
