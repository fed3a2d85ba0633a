//! Timed replay of recorded entries against an actuator
//!
//! Gaps between consecutive entries are reproduced with blocking sleeps on
//! the replay thread, minus the time the actuator took. Stopping is
//! cooperative: it is checked before every event and cuts a pending delay
//! short, but never interrupts an actuator call.

use crate::composite::CompositeDataLogger;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use zedlog_core::event::*;
use zedlog_core::{Error, LogEntry, Result};

/// What an actuator did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    Performed,
    /// The actuator has no handler for this event; replay moves on.
    Unsupported,
}

/// Performs input actions during replay. One method per event variant; the
/// defaults report the variant as unsupported.
///
/// An `Err` aborts the replay.
pub trait Actuator {
    fn key(&mut self, _event: &KeyEvent) -> Result<Actuation> {
        Ok(Actuation::Unsupported)
    }

    fn mouse_moved(&mut self, _event: &MouseMovedEvent) -> Result<Actuation> {
        Ok(Actuation::Unsupported)
    }

    fn mouse_dragged(&mut self, _event: &MouseDraggedEvent) -> Result<Actuation> {
        Ok(Actuation::Unsupported)
    }

    fn mouse_clicked(&mut self, _event: &MouseClickedEvent) -> Result<Actuation> {
        Ok(Actuation::Unsupported)
    }

    fn mouse_pressed(&mut self, _event: &MousePressedEvent) -> Result<Actuation> {
        Ok(Actuation::Unsupported)
    }

    fn mouse_wheel(&mut self, _event: &MouseWheelMovedEvent) -> Result<Actuation> {
        Ok(Actuation::Unsupported)
    }
}

fn dispatch(actuator: &mut dyn Actuator, event: &LogEvent) -> Result<Actuation> {
    match event {
        LogEvent::Key(e) => actuator.key(e),
        LogEvent::MouseMoved(e) => actuator.mouse_moved(e),
        LogEvent::MouseDragged(e) => actuator.mouse_dragged(e),
        LogEvent::MouseClicked(e) => actuator.mouse_clicked(e),
        LogEvent::MousePressed(e) => actuator.mouse_pressed(e),
        LogEvent::MouseWheelMoved(e) => actuator.mouse_wheel(e),
    }
}

/// Dry-run actuator: writes each action it would perform to the log.
#[derive(Debug, Default)]
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    fn key(&mut self, event: &KeyEvent) -> Result<Actuation> {
        if event.code <= 0 {
            return Ok(Actuation::Unsupported);
        }
        let action = match event.kind {
            KeyEventType::Pressed => "press",
            KeyEventType::Released => "release",
            KeyEventType::Typed => "press+release",
        };
        info!(code = event.code, action, "key");
        Ok(Actuation::Performed)
    }

    fn mouse_moved(&mut self, event: &MouseMovedEvent) -> Result<Actuation> {
        info!(x = event.x, y = event.y, "move");
        Ok(Actuation::Performed)
    }

    fn mouse_dragged(&mut self, event: &MouseDraggedEvent) -> Result<Actuation> {
        info!(x = event.x, y = event.y, button = %button_name(event.button), "drag");
        Ok(Actuation::Performed)
    }

    fn mouse_clicked(&mut self, event: &MouseClickedEvent) -> Result<Actuation> {
        info!(
            x = event.x,
            y = event.y,
            button = %button_name(event.button),
            clicks = event.clicks,
            "click"
        );
        Ok(Actuation::Performed)
    }

    fn mouse_wheel(&mut self, event: &MouseWheelMovedEvent) -> Result<Actuation> {
        info!(rotation = event.rotation, "scroll");
        Ok(Actuation::Performed)
    }
}

/// How a replay run ended.
#[derive(Debug, Clone, Serialize)]
pub enum ReplayOutcome {
    Finished,
    Stopped,
    Failed(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplayState {
    Created,
    Running,
    Finished,
    Stopped,
    Failed,
}

/// Actuated events per variant; `skipped` counts unsupported ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub keys: usize,
    pub moves: usize,
    pub drags: usize,
    pub clicks: usize,
    pub presses: usize,
    pub scrolls: usize,
    pub skipped: usize,
}

impl ReplayStats {
    fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Key => self.keys += 1,
            EventKind::MouseMoved => self.moves += 1,
            EventKind::MouseDragged => self.drags += 1,
            EventKind::MouseClicked => self.clicks += 1,
            EventKind::MousePressed => self.presses += 1,
            EventKind::MouseWheelMoved => self.scrolls += 1,
        }
    }

    pub fn actuated(&self) -> usize {
        self.keys + self.moves + self.drags + self.clicks + self.presses + self.scrolls
    }
}

pub trait ReplayObserver: Send + Sync {
    /// Called after every event, including ones the actuator skipped.
    fn on_event_replayed(&self, event: &LogEvent);

    /// Called exactly once per run, however it ended.
    fn on_replay_finished(&self, outcome: &ReplayOutcome, stats: &ReplayStats);
}

#[derive(Debug, Clone)]
pub enum ReplayNotice {
    Replayed(LogEvent),
    Finished(ReplayOutcome, ReplayStats),
}

/// Forwards replay notifications into a channel, for callers that want to
/// block until a replay ends.
pub struct ChannelObserver {
    tx: Sender<ReplayNotice>,
}

impl ChannelObserver {
    pub fn new() -> (Arc<Self>, Receiver<ReplayNotice>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl ReplayObserver for ChannelObserver {
    fn on_event_replayed(&self, event: &LogEvent) {
        let _ = self.tx.send(ReplayNotice::Replayed(event.clone()));
    }

    fn on_replay_finished(&self, outcome: &ReplayOutcome, stats: &ReplayStats) {
        let _ = self.tx.send(ReplayNotice::Finished(outcome.clone(), stats.clone()));
    }
}

/// Replay configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Playback speed (1.0 = real-time, 2.0 = twice as fast)
    pub speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

impl ReplayConfig {
    pub fn speed(mut self, speed: f64) -> Self {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        } else {
            warn!(speed, "ignoring invalid replay speed");
        }
        self
    }
}

/// Requests a replay to stop. Cheap to clone and safe to use from any
/// thread, including from inside observer callbacks.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    wake: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            let _ = self.wake.try_send(());
            info!("replay stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Replays log entries with their original relative timing.
///
/// Single use: once a run has ended, construct a new tool to replay again.
pub struct ReplayTool {
    entries: Vec<LogEntry>,
    config: ReplayConfig,
    observers: Mutex<Vec<Arc<dyn ReplayObserver>>>,
    state: Mutex<ReplayState>,
    stop: StopHandle,
    wake_rx: Receiver<()>,
}

impl ReplayTool {
    /// Entries are assumed to be in chronological order.
    pub fn new(entries: Vec<LogEntry>) -> Self {
        let (wake, wake_rx) = bounded(1);
        Self {
            entries,
            config: ReplayConfig::default(),
            observers: Mutex::new(Vec::new()),
            state: Mutex::new(ReplayState::Created),
            stop: StopHandle {
                flag: Arc::new(AtomicBool::new(false)),
                wake,
            },
            wake_rx,
        }
    }

    /// Replay a snapshot of the logger's entries, taken now.
    pub fn from_logger(logger: &CompositeDataLogger) -> Self {
        Self::new(logger.log_entries())
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn state(&self) -> ReplayState {
        *self.state.lock()
    }

    pub fn add_observer(&self, observer: Arc<dyn ReplayObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn ReplayObserver>) {
        self.observers
            .lock()
            .retain(|o| Arc::as_ptr(o).cast::<()>() != Arc::as_ptr(observer).cast::<()>());
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop replaying. Does not wait for the run to end.
    pub fn stop(&self) {
        self.stop.stop();
    }

    fn observers(&self) -> Vec<Arc<dyn ReplayObserver>> {
        self.observers.lock().clone()
    }

    /// Delay before the event after `current`, less time already spent.
    /// Saturates at `Duration::MAX` for gaps too long to represent.
    fn delay_between(&self, current: &LogEntry, next: &LogEntry, spent: Duration) -> Duration {
        let gap_ms = next.timestamp.saturating_sub(current.timestamp) as f64 / self.config.speed;
        let remaining_ms = gap_ms - spent.as_secs_f64() * 1000.0;
        if remaining_ms > 0.0 {
            Duration::try_from_secs_f64(remaining_ms / 1000.0).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    /// Block for `delay` or until a stop request. Returns true if stopped.
    fn wait_or_stop(&self, delay: Duration) -> bool {
        match Instant::now().checked_add(delay) {
            Some(deadline) => self.wake_rx.recv_deadline(deadline).is_ok(),
            None => self.wake_rx.recv().is_ok(),
        }
    }

    /// Replay every entry on the calling thread.
    pub fn run(&self, actuator: &mut dyn Actuator) -> Result<ReplayStats> {
        {
            let mut state = self.state.lock();
            if *state != ReplayState::Created {
                return Err(Error::replay_already_started());
            }
            *state = ReplayState::Running;
        }
        info!(
            entries = self.entries.len(),
            speed = self.config.speed,
            "replay started"
        );

        let mut stats = ReplayStats::default();
        let mut failure = None;
        let mut stopped = false;

        for (i, entry) in self.entries.iter().enumerate() {
            if self.stop.is_stopped() {
                stopped = true;
                break;
            }

            let started = Instant::now();
            match dispatch(actuator, &entry.event) {
                Ok(Actuation::Performed) => stats.record(entry.event.kind()),
                Ok(Actuation::Unsupported) => {
                    debug!(kind = %entry.event.kind(), "no actuator support, skipped");
                    stats.skipped += 1;
                }
                Err(e) => {
                    error!(error = %e, index = i, "actuator failed, aborting replay");
                    failure = Some(e);
                    break;
                }
            }
            let spent = started.elapsed();

            for observer in self.observers() {
                observer.on_event_replayed(&entry.event);
            }

            if let Some(next) = self.entries.get(i + 1) {
                let delay = self.delay_between(entry, next, spent);
                if !delay.is_zero() && self.wait_or_stop(delay) {
                    stopped = true;
                    break;
                }
            }
        }

        let (outcome, end_state) = match &failure {
            Some(e) => (ReplayOutcome::Failed(e.clone()), ReplayState::Failed),
            None if stopped => (ReplayOutcome::Stopped, ReplayState::Stopped),
            None => (ReplayOutcome::Finished, ReplayState::Finished),
        };
        *self.state.lock() = end_state;

        for observer in self.observers() {
            observer.on_replay_finished(&outcome, &stats);
        }
        info!(?end_state, actuated = stats.actuated(), skipped = stats.skipped, "replay ended");

        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    /// Run on a dedicated thread.
    pub fn spawn<A>(self: Arc<Self>, mut actuator: A) -> Result<thread::JoinHandle<Result<ReplayStats>>>
    where
        A: Actuator + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("zedlog-replay".to_string())
            .spawn(move || self.run(&mut actuator))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zedlog_core::{DataLogger, ErrorCode};

    fn moved(t: i64, x: i32) -> LogEntry {
        LogEntry::new(t, LogEvent::MouseMoved(MouseMovedEvent { time: t, x, y: 0 }))
    }

    fn pressed(t: i64) -> LogEntry {
        LogEntry::new(
            t,
            LogEvent::MousePressed(MousePressedEvent { time: t, x: 0, y: 0, button: 1 }),
        )
    }

    /// Records each dispatched move with its dispatch time.
    #[derive(Default)]
    struct RecordingActuator {
        moves: Vec<(i32, Instant)>,
        fail_at: Option<i32>,
    }

    impl Actuator for RecordingActuator {
        fn mouse_moved(&mut self, event: &MouseMovedEvent) -> Result<Actuation> {
            if self.fail_at == Some(event.x) {
                return Err(Error::actuation_failed("mouse move", "device unavailable"));
            }
            self.moves.push((event.x, Instant::now()));
            Ok(Actuation::Performed)
        }
    }

    #[derive(Default)]
    struct Counting {
        replayed: Mutex<Vec<LogEvent>>,
        finished: Mutex<Vec<String>>,
        stop_after: Option<(usize, StopHandle)>,
    }

    impl ReplayObserver for Counting {
        fn on_event_replayed(&self, event: &LogEvent) {
            let mut replayed = self.replayed.lock();
            replayed.push(event.clone());
            if let Some((n, handle)) = &self.stop_after {
                if replayed.len() == *n {
                    handle.stop();
                }
            }
        }

        fn on_replay_finished(&self, outcome: &ReplayOutcome, _stats: &ReplayStats) {
            self.finished.lock().push(format!("{:?}", outcome));
        }
    }

    #[test]
    fn preserves_relative_timing() {
        let tool = ReplayTool::new(vec![moved(0, 0), moved(100, 1), moved(250, 2)]);
        let mut actuator = RecordingActuator::default();

        let start = Instant::now();
        let stats = tool.run(&mut actuator).unwrap();
        let total = start.elapsed();

        assert_eq!(stats.moves, 3);
        assert!(total >= Duration::from_millis(250), "took {:?}", total);
        let second = actuator.moves[1].1 - actuator.moves[0].1;
        assert!(second >= Duration::from_millis(100), "gap {:?}", second);
        assert!(second <= Duration::from_millis(140), "gap {:?}", second);
        assert_eq!(tool.state(), ReplayState::Finished);
    }

    #[test]
    fn speed_scales_delays() {
        let tool = ReplayTool::new(vec![moved(0, 0), moved(200, 1)])
            .with_config(ReplayConfig::default().speed(2.0));
        let mut actuator = RecordingActuator::default();
        tool.run(&mut actuator).unwrap();
        let gap = actuator.moves[1].1 - actuator.moves[0].1;
        assert!(gap >= Duration::from_millis(100) && gap < Duration::from_millis(180));
    }

    #[test]
    fn out_of_order_timestamps_do_not_wait() {
        let tool = ReplayTool::new(vec![moved(500, 0), moved(100, 1)]);
        let start = Instant::now();
        tool.run(&mut RecordingActuator::default()).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn stop_from_observer_skips_the_rest() {
        let tool = ReplayTool::new((0..5).map(|i| moved(i, i as i32)).collect());
        let observer = Arc::new(Counting {
            stop_after: Some((2, tool.stop_handle())),
            ..Default::default()
        });
        tool.add_observer(observer.clone());

        let mut actuator = RecordingActuator::default();
        let stats = tool.run(&mut actuator).unwrap();

        assert_eq!(actuator.moves.iter().map(|m| m.0).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(stats.moves, 2);
        assert_eq!(observer.finished.lock().clone(), vec!["Stopped".to_string()]);
        assert_eq!(tool.state(), ReplayState::Stopped);
    }

    #[test]
    fn unsupported_events_are_still_observed() {
        let tool = ReplayTool::new(vec![moved(0, 0), pressed(0), moved(0, 1)]);
        let observer = Arc::new(Counting::default());
        tool.add_observer(observer.clone());

        let stats = tool.run(&mut RecordingActuator::default()).unwrap();
        assert_eq!(stats.moves, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(observer.replayed.lock().len(), 3);
        assert_eq!(observer.finished.lock().len(), 1);
    }

    #[test]
    fn actuator_failure_aborts_and_reports() {
        let tool = ReplayTool::new(vec![moved(0, 0), moved(0, 1), moved(0, 2)]);
        let observer = Arc::new(Counting::default());
        tool.add_observer(observer.clone());

        let mut actuator = RecordingActuator {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = tool.run(&mut actuator).unwrap_err();

        assert_eq!(err.code, ErrorCode::ActuationFailed);
        assert_eq!(actuator.moves.len(), 1);
        assert_eq!(observer.replayed.lock().len(), 1);
        let finished = observer.finished.lock().clone();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].starts_with("Failed"));
        assert_eq!(tool.state(), ReplayState::Failed);
    }

    #[test]
    fn not_restartable() {
        let tool = ReplayTool::new(vec![moved(0, 0)]);
        tool.run(&mut RecordingActuator::default()).unwrap();
        let err = tool.run(&mut RecordingActuator::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReplayAlreadyStarted);
    }

    #[test]
    fn snapshot_is_frozen() {
        let composite = CompositeDataLogger::new();
        composite.set_recording(true);
        composite.notify_log(None, &moved(0, 0));

        let tool = ReplayTool::from_logger(&composite);
        composite.notify_log(None, &moved(1, 1));
        composite.clear_all();

        assert_eq!(tool.entries().len(), 1);
    }

    #[test]
    fn spawned_replay_stops_during_long_delay() {
        let tool = Arc::new(ReplayTool::new(vec![moved(0, 0), moved(60_000, 1)]));
        let (observer, notices) = ChannelObserver::new();
        tool.add_observer(observer);

        let handle = tool.clone().spawn(RecordingActuator::default()).unwrap();
        assert!(matches!(
            notices.recv_timeout(Duration::from_secs(5)),
            Ok(ReplayNotice::Replayed(_))
        ));

        let requested = Instant::now();
        tool.stop();
        let stats = handle.join().unwrap().unwrap();
        assert!(requested.elapsed() < Duration::from_secs(2));
        assert_eq!(stats.moves, 1);
        assert!(matches!(
            notices.recv_timeout(Duration::from_secs(1)),
            Ok(ReplayNotice::Finished(ReplayOutcome::Stopped, _))
        ));
    }

    #[test]
    fn extreme_gaps_do_not_overflow() {
        let tool = ReplayTool::new(vec![moved(i64::MIN, 0), moved(i64::MAX, 1)]);
        let huge = tool.delay_between(&tool.entries[0], &tool.entries[1], Duration::ZERO);
        assert!(huge > Duration::from_secs(365 * 24 * 3600));
        let none = tool.delay_between(&tool.entries[1], &tool.entries[0], Duration::ZERO);
        assert_eq!(none, Duration::ZERO);

        let slow = ReplayTool::new(vec![moved(0, 0), moved(100, 1)])
            .with_config(ReplayConfig::default().speed(1e-300));
        assert_eq!(
            slow.delay_between(&slow.entries[0], &slow.entries[1], Duration::ZERO),
            Duration::MAX
        );
    }

    #[test]
    fn reversed_extreme_timestamps_replay_immediately() {
        let tool = ReplayTool::new(vec![moved(i64::MAX, 0), moved(i64::MIN, 1)])
            .with_config(ReplayConfig::default().speed(1e-300));
        let observer = Arc::new(Counting::default());
        tool.add_observer(observer.clone());

        let stats = tool.run(&mut RecordingActuator::default()).unwrap();
        assert_eq!(stats.moves, 2);
        assert_eq!(observer.finished.lock().clone(), vec!["Finished".to_string()]);
    }

    #[test]
    fn unrepresentable_delay_still_stops_and_completes_once() {
        for (entries, speed) in [
            (vec![moved(i64::MIN, 0), moved(i64::MAX, 1)], 1e-300),
            (vec![moved(0, 0), moved(100, 1)], 1e-300),
            (vec![moved(i64::MIN, 0), moved(i64::MAX, 1)], 1.0),
        ] {
            let tool = Arc::new(
                ReplayTool::new(entries).with_config(ReplayConfig::default().speed(speed)),
            );
            let (observer, notices) = ChannelObserver::new();
            tool.add_observer(observer);

            let handle = tool.clone().spawn(RecordingActuator::default()).unwrap();
            assert!(matches!(
                notices.recv_timeout(Duration::from_secs(5)),
                Ok(ReplayNotice::Replayed(_))
            ));
            tool.stop();
            let stats = handle.join().unwrap().unwrap();
            assert_eq!(stats.moves, 1);

            let finished: Vec<_> = notices
                .try_iter()
                .filter(|n| matches!(n, ReplayNotice::Finished(..)))
                .collect();
            assert_eq!(finished.len(), 1);
            assert_eq!(tool.state(), ReplayState::Stopped);
        }
    }

    #[test]
    fn removed_observer_is_not_called() {
        let tool = ReplayTool::new(vec![moved(0, 0)]);
        let observer = Arc::new(Counting::default());
        let as_dyn: Arc<dyn ReplayObserver> = observer.clone();
        tool.add_observer(as_dyn.clone());
        tool.remove_observer(&as_dyn);
        tool.run(&mut LoggingActuator).unwrap();
        assert!(observer.finished.lock().is_empty());
    }
}
