//! Composite data logger - merges child loggers into one ordered log and
//! mirrors it into an XML file
//!
//! Entries are written to disk in batches: every `flush_threshold` mirrored
//! entries the whole document is rewritten, so a crash loses at most
//! `flush_threshold - 1` entries. Flush failures on the notification path
//! are logged and swallowed; capture never stops because the disk did.

use crate::registry::LoggerRegistry;
use crate::storage::LogDocument;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};
use zedlog_core::{
    same_logger, DataLogger, DataLoggerObserver, Error, LogEntry, LoggerCore, LoggerHandle, Result,
};

pub const COMPOSITE_TYPE: &str = "CompositeLogger";

/// Mirrored entries between two flushes of the log file.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;

/// Composite logger configuration
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    /// Entries mirrored before the log file is rewritten (minimum 1)
    pub flush_threshold: usize,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl CompositeConfig {
    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }
}

/// Result of [`CompositeDataLogger::open_log_file`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loggers: usize,
    pub entries: usize,
    /// Type tags now carried by more than one child logger
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicate_types: Vec<String>,
}

#[derive(Default)]
struct State {
    children: Vec<Arc<dyn DataLogger>>,
    entries: Vec<LogEntry>,
    log_file: Option<PathBuf>,
    document: LogDocument,
    since_flush: usize,
}

type Notice = (Option<LoggerHandle>, LogEntry);

/// Forwards child notifications to the composite without keeping it alive.
struct ChildLink {
    composite: Weak<CompositeDataLogger>,
}

impl DataLoggerObserver for ChildLink {
    fn notify_log(&self, source: Option<&LoggerHandle>, entry: &LogEntry) {
        if let Some(composite) = self.composite.upgrade() {
            composite.notify_log(source, entry);
        }
    }
}

/// A collection of data loggers recorded into a single log.
///
/// Child set, entries, recording flag changes and appends are serialized by
/// one lock. The lock is reentrant: a child may emit from inside its own
/// `set_recording` without blocking the thread that switched it.
///
/// Observers of the composite see entries in exactly the order they were
/// appended. Each appended entry is queued under the lock and delivered by
/// whichever thread holds the delivery slot, so under contention an entry
/// may reach observers from another thread, shortly after its own
/// `notify_log` returned.
pub struct CompositeDataLogger {
    core: LoggerCore,
    config: CompositeConfig,
    state: ReentrantMutex<RefCell<State>>,
    outbox: Sender<Notice>,
    inbox: Receiver<Notice>,
    delivering: Mutex<()>,
    link: Arc<dyn DataLoggerObserver>,
}

impl CompositeDataLogger {
    pub fn new() -> Arc<Self> {
        Self::with_config(CompositeConfig::default())
    }

    pub fn with_config(config: CompositeConfig) -> Arc<Self> {
        let (outbox, inbox) = unbounded();
        Arc::new_cyclic(|weak| Self {
            core: LoggerCore::new(COMPOSITE_TYPE),
            config,
            state: ReentrantMutex::new(RefCell::new(State::default())),
            outbox,
            inbox,
            delivering: Mutex::new(()),
            link: Arc::new(ChildLink {
                composite: weak.clone(),
            }),
        })
    }

    /// Run `f` on the state. `f` must not call into children or observers.
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Add a child logger. The child takes the composite's recording state.
    /// Returns false if the same instance is already a child.
    pub fn add_logger(&self, logger: Arc<dyn DataLogger>) -> bool {
        assert!(
            logger.handle() != self.core.handle(),
            "a composite logger cannot contain itself"
        );

        let guard = self.state.lock();
        if guard
            .borrow()
            .children
            .iter()
            .any(|c| same_logger(&**c, &*logger))
        {
            return false;
        }

        logger.set_recording(self.core.is_recording());
        logger.add_observer(self.link.clone());
        debug!(logger = ?logger.handle(), "added data logger");
        guard.borrow_mut().children.push(logger);
        true
    }

    /// Remove the given child. Returns whether it was present.
    pub fn remove_logger(&self, logger: &dyn DataLogger) -> bool {
        let _guard = self.state.lock();
        let removed = self.with_state(|state| {
            let index = state
                .children
                .iter()
                .position(|c| same_logger(&**c, logger))?;
            Some(state.children.remove(index))
        });
        match removed {
            Some(removed) => {
                removed.remove_observer(&self.link);
                debug!(logger = ?removed.handle(), "removed data logger");
                true
            }
            None => false,
        }
    }

    /// Remove the child at `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn remove_logger_at(&self, index: usize) -> Arc<dyn DataLogger> {
        let _guard = self.state.lock();
        let removed = self.with_state(|state| {
            let len = state.children.len();
            assert!(index < len, "logger index {} out of range (len {})", index, len);
            state.children.remove(index)
        });
        removed.remove_observer(&self.link);
        debug!(logger = ?removed.handle(), "removed data logger");
        removed
    }

    /// The child at `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn logger_at(&self, index: usize) -> Arc<dyn DataLogger> {
        self.with_state(|state| {
            let len = state.children.len();
            assert!(index < len, "logger index {} out of range (len {})", index, len);
            state.children[index].clone()
        })
    }

    pub fn contains_logger(&self, logger: &dyn DataLogger) -> bool {
        self.with_state(|state| state.children.iter().any(|c| same_logger(&**c, logger)))
    }

    /// Snapshot of the child loggers, in insertion order.
    pub fn loggers(&self) -> Vec<Arc<dyn DataLogger>> {
        self.with_state(|state| state.children.clone())
    }

    /// Snapshot of every recorded entry.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.with_state(|state| state.entries.clone())
    }

    pub fn entry_count(&self) -> usize {
        self.with_state(|state| state.entries.len())
    }

    /// Drop the in-memory entries. The log file and children are untouched.
    pub fn clear_all(&self) {
        self.with_state(|state| state.entries.clear());
    }

    /// Associate the log file entries are mirrored to. A missing file is
    /// created empty; existing content is not read (see
    /// [`CompositeDataLogger::open_log_file`]) and is replaced on the next
    /// flush.
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            if !path.is_file() {
                return Err(Error::invalid_path(path, "log file must be a regular file"));
            }
        } else {
            File::create(path)?;
        }

        self.with_state(|state| {
            if state.log_file.as_deref() != Some(path) {
                state.document = LogDocument::new();
                state.since_flush = 0;
            }
            state.log_file = Some(path.to_path_buf());
        });
        info!(path = %path.display(), "log file set");
        Ok(())
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.with_state(|state| state.log_file.clone())
    }

    /// Load a log file, appending its loggers and entries to this composite.
    ///
    /// The whole file is parsed and every logger created before anything is
    /// applied, so a malformed file or unknown logger type changes nothing.
    /// Entries are delivered through the notification path with no source,
    /// whether or not the composite is recording.
    pub fn open_log_file(
        &self,
        path: impl AsRef<Path>,
        registry: &LoggerRegistry,
    ) -> Result<LoadReport> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::invalid_path(path, "log file does not exist"));
        }

        let doc = LogDocument::read_from(path)?;
        let loggers = doc
            .loggers
            .iter()
            .map(|tag| registry.create(tag))
            .collect::<Result<Vec<_>>>()?;

        let mut report = LoadReport {
            loggers: loggers.len(),
            entries: doc.entries.len(),
            duplicate_types: Vec::new(),
        };

        for logger in loggers {
            self.add_logger(logger);
        }
        for entry in &doc.entries {
            self.deliver(None, entry);
        }

        report.duplicate_types = self.duplicate_types();
        for tag in &report.duplicate_types {
            warn!(type_tag = %tag, "several child loggers share a type tag");
        }
        info!(
            path = %path.display(),
            loggers = report.loggers,
            entries = report.entries,
            "opened log file"
        );
        Ok(report)
    }

    fn duplicate_types(&self) -> Vec<String> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for child in self.loggers() {
            *counts.entry(child.type_tag().to_string()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(tag, _)| tag)
            .collect()
    }

    /// Record an entry from a child. Ignored unless recording.
    pub fn notify_log(&self, source: Option<&LoggerHandle>, entry: &LogEntry) {
        let appended = self.with_state(|state| {
            if !self.core.is_recording() {
                return false;
            }
            self.append(state, source, entry.clone());
            true
        });
        if appended {
            self.drain_outbox();
        }
    }

    fn deliver(&self, source: Option<&LoggerHandle>, entry: &LogEntry) {
        self.with_state(|state| self.append(state, source, entry.clone()));
        self.drain_outbox();
    }

    fn append(&self, state: &mut State, source: Option<&LoggerHandle>, entry: LogEntry) {
        if state.log_file.is_some() {
            state.document.entries.push(entry.clone());
            state.since_flush += 1;

            if state.since_flush >= self.config.flush_threshold.max(1) {
                match Self::flush_locked(state) {
                    Ok(()) => state.since_flush = 0,
                    Err(e) => error!(error = %e, "failed to write log file"),
                }
            }
        }
        // Queued under the state lock so observers see append order
        let _ = self.outbox.send((source.cloned(), entry.clone()));
        state.entries.push(entry);
    }

    /// Deliver queued entries to observers, unless another thread (or an
    /// outer frame of this one) is already doing so.
    fn drain_outbox(&self) {
        loop {
            let Some(_slot) = self.delivering.try_lock() else {
                return;
            };
            while let Ok((source, entry)) = self.inbox.try_recv() {
                self.core.notify_observers(source.as_ref(), &entry);
            }
            drop(_slot);
            // An entry queued while the slot was being released
            if self.inbox.is_empty() {
                return;
            }
        }
    }

    /// Rebuild the `loggers` section from the live children and rewrite the
    /// log file. No-op without a log file.
    fn flush_locked(state: &mut State) -> Result<()> {
        let Some(path) = state.log_file.clone() else {
            return Ok(());
        };
        state.document.loggers = state
            .children
            .iter()
            .map(|c| c.type_tag().to_string())
            .collect();
        state.document.write_to(&path)?;
        debug!(
            path = %path.display(),
            entries = state.document.entries.len(),
            "flushed log file"
        );
        Ok(())
    }

    /// Write the log file now, regardless of the flush threshold.
    pub fn flush(&self) -> Result<()> {
        self.with_state(|state| -> Result<()> {
            Self::flush_locked(state)?;
            state.since_flush = 0;
            Ok(())
        })
    }

    pub fn observer_count(&self) -> usize {
        self.core.observer_count()
    }
}

impl DataLogger for CompositeDataLogger {
    fn handle(&self) -> &LoggerHandle {
        self.core.handle()
    }

    fn is_recording(&self) -> bool {
        self.core.is_recording()
    }

    /// Children are switched first, so none emits under a stale flag.
    fn set_recording(&self, recording: bool) {
        let _guard = self.state.lock();
        for child in self.loggers() {
            child.set_recording(recording);
        }
        self.core.set_recording(recording);
    }

    fn add_observer(&self, observer: Arc<dyn DataLoggerObserver>) {
        self.core.add_observer(observer);
    }

    fn remove_observer(&self, observer: &Arc<dyn DataLoggerObserver>) {
        self.core.remove_observer(observer);
    }

    /// Stop recording, shut the children down and force a final flush.
    fn shutdown(&self) {
        self.set_recording(false);
        for child in self.loggers() {
            child.shutdown();
        }
        if let Err(e) = self.flush() {
            error!(error = %e, "failed to write log file on shutdown");
        }
        debug!("composite logger shut down");
    }
}

impl DataLoggerObserver for CompositeDataLogger {
    fn notify_log(&self, source: Option<&LoggerHandle>, entry: &LogEntry) {
        CompositeDataLogger::notify_log(self, source, entry);
    }
}

/// One entry per line, with a blank line whenever the source logger changes.
impl fmt::Display for CompositeDataLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.log_entries();
        let mut last: Option<Option<&LoggerHandle>> = None;
        for entry in &entries {
            let source = entry.source.as_ref();
            if matches!(last, Some(prev) if prev != source) {
                writeln!(f)?;
            }
            last = Some(source);
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}
