//! # zedlog
//!
//! Record keyboard and mouse activity from any number of sources into one
//! durable log, then play it back with the original timing.
//!
//! ## Features
//!
//! - **Aggregation**: a composite logger merges entries from child loggers
//! - **Persistence**: incremental XML log files, reloadable by logger type
//! - **Replay**: timed playback through a pluggable actuator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zedlog::prelude::*;
//!
//! let composite = CompositeDataLogger::new();
//! let mouse = Arc::new(SourceLogger::new("MouseMovementLogger"));
//! composite.add_logger(mouse.clone());
//! composite.set_log_file("session.xml")?;
//! composite.set_recording(true);
//!
//! mouse.log(LogEvent::MouseMoved(MouseMovedEvent { time: 0, x: 10, y: 20 }));
//! composite.shutdown();
//!
//! let replay = ReplayTool::from_logger(&composite);
//! replay.run(&mut LoggingActuator)?;
//! # Ok::<(), zedlog::Error>(())
//! ```

// Re-export the event model and logger contract
pub use zedlog_core::*;

// Re-export recorder module
pub use zedlog_recorder as recorder;

pub use zedlog_recorder::{
    CompositeConfig, CompositeDataLogger, LoadReport, LogDocument, LoggerRegistry,
    LoggingActuator, ReplayConfig, ReplayOutcome, ReplayStats, ReplayTool,
};

/// Prelude - import everything you need
pub mod prelude {
    pub use zedlog_core::prelude::*;
    pub use zedlog_recorder::prelude::*;
}
