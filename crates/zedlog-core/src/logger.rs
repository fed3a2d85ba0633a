//! Data logger abstraction
//!
//! A data logger is a source of [`LogEntry`] notifications (a keyboard hook,
//! a mouse hook, or a composite of other loggers). Observers are delivered
//! to synchronously, in registration order.

use crate::entry::LogEntry;
use crate::event::LogEvent;
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_LOGGER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one logger instance.
///
/// Two loggers with the same type tag have different handles. A handle
/// never keeps its logger alive.
#[derive(Clone)]
pub struct LoggerHandle {
    id: u64,
    type_tag: Arc<str>,
}

impl LoggerHandle {
    pub fn new(type_tag: &str) -> Self {
        Self {
            id: NEXT_LOGGER_ID.fetch_add(1, Ordering::Relaxed),
            type_tag: Arc::from(type_tag),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }
}

impl PartialEq for LoggerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LoggerHandle {}

impl Hash for LoggerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for LoggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_tag, self.id)
    }
}

/// Receives entries emitted by a [`DataLogger`].
pub trait DataLoggerObserver: Send + Sync {
    fn notify_log(&self, source: Option<&LoggerHandle>, entry: &LogEntry);
}

impl<F> DataLoggerObserver for F
where
    F: Fn(Option<&LoggerHandle>, &LogEntry) + Send + Sync,
{
    fn notify_log(&self, source: Option<&LoggerHandle>, entry: &LogEntry) {
        self(source, entry)
    }
}

/// An event-producing source.
pub trait DataLogger: Send + Sync {
    fn handle(&self) -> &LoggerHandle;

    /// Stable tag naming the kind of source, used to recreate it on load.
    fn type_tag(&self) -> &str {
        self.handle().type_tag()
    }

    fn is_recording(&self) -> bool;

    fn set_recording(&self, recording: bool);

    fn add_observer(&self, observer: Arc<dyn DataLoggerObserver>);

    fn remove_observer(&self, observer: &Arc<dyn DataLoggerObserver>);

    fn shutdown(&self) {
        self.set_recording(false);
    }
}

/// Identity comparison for shared loggers.
pub fn same_logger(a: &dyn DataLogger, b: &dyn DataLogger) -> bool {
    a.handle() == b.handle()
}

fn same_observer(a: &Arc<dyn DataLoggerObserver>, b: &Arc<dyn DataLoggerObserver>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Identity, recording flag and observer list shared by logger implementations.
pub struct LoggerCore {
    handle: LoggerHandle,
    recording: AtomicBool,
    observers: Mutex<Vec<Arc<dyn DataLoggerObserver>>>,
}

impl LoggerCore {
    pub fn new(type_tag: &str) -> Self {
        Self {
            handle: LoggerHandle::new(type_tag),
            recording: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> &LoggerHandle {
        &self.handle
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    pub fn add_observer(&self, observer: Arc<dyn DataLoggerObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn DataLoggerObserver>) {
        self.observers.lock().retain(|o| !same_observer(o, observer));
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Deliver to every observer in order. The list is snapshotted first so
    /// observers may register or unregister from inside the callback.
    pub fn notify_observers(&self, source: Option<&LoggerHandle>, entry: &LogEntry) {
        let observers = self.observers.lock().clone();
        for observer in &observers {
            observer.notify_log(source, entry);
        }
    }
}

/// Adapter through which platform hook code feeds events into the core.
pub struct SourceLogger {
    core: LoggerCore,
}

impl SourceLogger {
    pub fn new(type_tag: &str) -> Self {
        Self {
            core: LoggerCore::new(type_tag),
        }
    }

    /// Stamp and emit `event`. Returns false (and emits nothing) while not
    /// recording.
    pub fn log(&self, event: LogEvent) -> bool {
        if !self.core.is_recording() {
            tracing::trace!(logger = ?self.core.handle(), kind = %event.kind(), "dropped, not recording");
            return false;
        }
        let entry = LogEntry::now(event, Some(self.core.handle().clone()));
        self.core.notify_observers(Some(self.core.handle()), &entry);
        true
    }

    /// Emit an already stamped entry, tagging it with this logger's identity.
    pub fn log_entry(&self, mut entry: LogEntry) -> bool {
        if !self.core.is_recording() {
            return false;
        }
        entry.source = Some(self.core.handle().clone());
        self.core.notify_observers(Some(self.core.handle()), &entry);
        true
    }

    pub fn observer_count(&self) -> usize {
        self.core.observer_count()
    }
}

impl DataLogger for SourceLogger {
    fn handle(&self) -> &LoggerHandle {
        self.core.handle()
    }

    fn is_recording(&self) -> bool {
        self.core.is_recording()
    }

    fn set_recording(&self, recording: bool) {
        self.core.set_recording(recording);
    }

    fn add_observer(&self, observer: Arc<dyn DataLoggerObserver>) {
        self.core.add_observer(observer);
    }

    fn remove_observer(&self, observer: &Arc<dyn DataLoggerObserver>) {
        self.core.remove_observer(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MouseMovedEvent;

    fn moved(x: i32) -> LogEvent {
        LogEvent::MouseMoved(MouseMovedEvent { time: 0, x, y: 0 })
    }

    fn collector() -> (Arc<Mutex<Vec<LogEntry>>>, Arc<dyn DataLoggerObserver>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Arc<dyn DataLoggerObserver> =
            Arc::new(move |_: Option<&LoggerHandle>, e: &LogEntry| sink.lock().push(e.clone()));
        (seen, observer)
    }

    #[test]
    fn handles_are_per_instance() {
        let a = SourceLogger::new("KeyLogger");
        let b = SourceLogger::new("KeyLogger");
        assert_eq!(a.type_tag(), b.type_tag());
        assert_ne!(a.handle(), b.handle());
        assert!(same_logger(&a, &a));
        assert!(!same_logger(&a, &b));
    }

    #[test]
    fn source_logger_emits_only_while_recording() {
        let logger = SourceLogger::new("MouseMovementLogger");
        let (seen, observer) = collector();
        logger.add_observer(observer.clone());

        assert!(!logger.log(moved(1)));
        logger.set_recording(true);
        assert!(logger.log(moved(2)));

        let seen_now = seen.lock().clone();
        assert_eq!(seen_now.len(), 1);
        assert_eq!(seen_now[0].source.as_ref(), Some(logger.handle()));

        logger.remove_observer(&observer);
        assert_eq!(logger.observer_count(), 0);
        logger.log(moved(3));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn shutdown_stops_recording() {
        let logger = SourceLogger::new("KeyLogger");
        logger.set_recording(true);
        logger.shutdown();
        assert!(!logger.is_recording());
    }
}
