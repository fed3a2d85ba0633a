//! Type tag -> data logger factories, used to recreate loggers from a log file

use std::collections::BTreeMap;
use std::sync::Arc;
use zedlog_core::{DataLogger, Error, Result, SourceLogger};

/// Type tags of the standard keyboard and mouse sources.
pub const STANDARD_SOURCES: [&str; 6] = [
    "KeyLogger",
    "MouseMovementLogger",
    "MouseClickLogger",
    "MouseDraggedLogger",
    "MousePressedLogger",
    "MouseWheelLogger",
];

type Factory = Box<dyn Fn() -> Arc<dyn DataLogger> + Send + Sync>;

/// Creates data loggers by type tag. Every call to [`LoggerRegistry::create`]
/// returns a new instance; nothing is cached.
#[derive(Default)]
pub struct LoggerRegistry {
    factories: BTreeMap<String, Factory>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a [`SourceLogger`] factory for each standard source.
    pub fn with_standard_sources() -> Self {
        let mut registry = Self::new();
        for tag in STANDARD_SOURCES {
            registry.register(tag, move || Arc::new(SourceLogger::new(tag)) as Arc<dyn DataLogger>);
        }
        registry
    }

    /// Register (or replace) the factory for `tag`.
    pub fn register<F>(&mut self, tag: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn DataLogger> + Send + Sync + 'static,
    {
        self.factories.insert(tag.to_string(), Box::new(factory));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn create(&self, tag: &str) -> Result<Arc<dyn DataLogger>> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| Error::unknown_logger_type(tag, self.tags()))?;
        let logger = factory();
        if logger.type_tag() != tag {
            tracing::warn!(
                requested = tag,
                created = logger.type_tag(),
                "factory produced a logger with a different type tag"
            );
        }
        Ok(logger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zedlog_core::ErrorCode;

    #[test]
    fn creates_fresh_instances() {
        let registry = LoggerRegistry::with_standard_sources();
        let a = registry.create("KeyLogger").unwrap();
        let b = registry.create("KeyLogger").unwrap();
        assert_eq!(a.type_tag(), "KeyLogger");
        assert_ne!(a.handle(), b.handle());
    }

    #[test]
    fn unknown_tag_lists_known_tags() {
        let registry = LoggerRegistry::with_standard_sources();
        let err = registry.create("JoystickLogger").err().unwrap();
        assert_eq!(err.code, ErrorCode::UnknownLoggerType);
        assert_eq!(err.suggestions.len(), STANDARD_SOURCES.len());
    }

    #[test]
    fn custom_factories() {
        let mut registry = LoggerRegistry::new();
        assert!(!registry.contains("PenLogger"));
        registry.register("PenLogger", || Arc::new(SourceLogger::new("PenLogger")) as Arc<dyn DataLogger>);
        assert!(registry.contains("PenLogger"));
        assert_eq!(registry.tags(), vec!["PenLogger".to_string()]);
    }
}
