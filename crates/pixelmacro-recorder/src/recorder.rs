//! Recording session: Idle -> Recording -> Idle
//!
//! Two observer threads (pointer, keyboard) turn raw hook events into steps
//! and feed one merge channel; a collector thread owns the buffer. Pressing
//! Esc, or calling [`RecordingHandle::stop`], detaches the hook, the observers
//! drain and exit, and the collector swaps the finished macro into the
//! shared slot in one write.

use crate::hook::{CaptureError, HookSink, InputHook, KeyboardEvent, PointerEvent, Stamped};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use pixelmacro_core::{KeySpec, Macro, Step};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// The current macro, shared between the shell, capture and playback
pub type SharedMacro = Arc<RwLock<Macro>>;

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Mouse move sampling - record a move only after the pointer travelled
    /// this many pixels. 0 records every move.
    pub mouse_move_threshold: f64,
    /// Capacity of the merged step channel
    pub max_buffer: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mouse_move_threshold: 0.0,
            max_buffer: 10_000,
        }
    }
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Starts recording sessions against one input hook
pub struct Recorder {
    hook: Arc<dyn InputHook>,
    config: RecorderConfig,
    active: Arc<AtomicBool>,
}

impl Recorder {
    pub fn new(hook: Arc<dyn InputHook>) -> Self {
        Self::with_config(hook, RecorderConfig::default())
    }

    pub fn with_config(hook: Arc<dyn InputHook>, config: RecorderConfig) -> Self {
        Self {
            hook,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Begin capturing. The finished macro replaces the contents of `target`
    /// when the session ends.
    pub fn start(&self, target: SharedMacro) -> Result<RecordingHandle, CaptureError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CaptureError::AlreadyRecording);
        }
        self.spawn(target).inspect_err(|_| {
            self.active.store(false, Ordering::SeqCst);
        })
    }

    fn spawn(&self, target: SharedMacro) -> Result<RecordingHandle, CaptureError> {
        let session = NEXT_SESSION.fetch_add(1, Ordering::SeqCst);
        let (pointer_tx, pointer_rx) = unbounded();
        let (keyboard_tx, keyboard_rx) = unbounded();
        let (step_tx, step_rx) = bounded::<(u64, Step)>(self.config.max_buffer.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let esc_seq = Arc::new(AtomicU64::new(u64::MAX));
        let captured = Arc::new(AtomicUsize::new(0));

        let mut observers = Vec::with_capacity(2);

        let tx = step_tx.clone();
        let threshold = self.config.mouse_move_threshold;
        observers.push(spawn_named("pixelmacro-pointer", move || {
            run_pointer_observer(pointer_rx, tx, threshold)
        })?);

        let watch = EscWatch {
            session,
            stop: stop.clone(),
            esc_seq: esc_seq.clone(),
            hook: self.hook.clone(),
        };
        observers.push(spawn_named("pixelmacro-keyboard", move || {
            run_keyboard_observer(keyboard_rx, step_tx, watch)
        })?);

        // Attach before the collector exists: if the hook fails, the observers
        // see their streams close and nothing touches `target`.
        self.hook
            .attach(HookSink::new(session, pointer_tx, keyboard_tx))?;

        let collector = {
            let esc_seq = esc_seq.clone();
            let captured = captured.clone();
            let active = self.active.clone();
            spawn_named("pixelmacro-collector", move || {
                collect(step_rx, esc_seq, captured, target, active)
            })
        };
        let collector = match collector {
            Ok(c) => c,
            Err(e) => {
                self.hook.detach(session);
                return Err(e);
            }
        };

        info!(session, "recording started, press Esc to stop");
        Ok(RecordingHandle {
            session,
            hook: self.hook.clone(),
            stop,
            captured,
            observers,
            collector,
        })
    }
}

/// Owns a running session
pub struct RecordingHandle {
    session: u64,
    hook: Arc<dyn InputHook>,
    stop: Arc<AtomicBool>,
    captured: Arc<AtomicUsize>,
    observers: Vec<thread::JoinHandle<()>>,
    collector: thread::JoinHandle<Macro>,
}

impl RecordingHandle {
    /// True once every capture thread has exited
    pub fn is_finished(&self) -> bool {
        self.collector.is_finished()
    }

    /// Steps buffered so far
    pub fn captured(&self) -> usize {
        self.captured.load(Ordering::Relaxed)
    }

    /// End the session now, without waiting for Esc
    pub fn stop(self) -> Result<Macro, CaptureError> {
        self.stop.store(true, Ordering::SeqCst);
        self.hook.detach(self.session);
        self.join()
    }

    /// Block until Esc ends the session
    pub fn wait(self) -> Result<Macro, CaptureError> {
        self.join()
    }

    fn join(self) -> Result<Macro, CaptureError> {
        for t in self.observers {
            t.join()
                .map_err(|_| CaptureError::Thread("observer panicked".into()))?;
        }
        self.collector
            .join()
            .map_err(|_| CaptureError::Thread("collector panicked".into()))
    }
}

fn spawn_named<T, F>(name: &str, f: F) -> Result<thread::JoinHandle<T>, CaptureError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| CaptureError::Thread(e.to_string()))
}

// ============================================================================
// Observers
// ============================================================================

fn run_pointer_observer(
    rx: Receiver<Stamped<PointerEvent>>,
    tx: Sender<(u64, Step)>,
    threshold: f64,
) {
    let mut last: Option<(f64, f64)> = None;
    let mut last_recorded: Option<(f64, f64)> = None;
    let mut clamp = Clamp::default();

    for Stamped { seq, event, .. } in rx.iter() {
        let step = match event {
            PointerEvent::Move { x, y } => {
                last = Some((x, y));
                if let Some((lx, ly)) = last_recorded {
                    let dist = ((x - lx).powi(2) + (y - ly).powi(2)).sqrt();
                    if threshold > 0.0 && dist < threshold {
                        continue;
                    }
                }
                last_recorded = Some((x, y));
                Step::Move {
                    x: clamp.coord(x),
                    y: clamp.coord(y),
                }
            }
            PointerEvent::Down { button, pos } => {
                let (x, y) = pos.or(last).unwrap_or_default();
                last = Some((x, y));
                Step::Click {
                    x: clamp.coord(x),
                    y: clamp.coord(y),
                    button,
                }
            }
            PointerEvent::Up { button, pos } => {
                let (x, y) = pos.or(last).unwrap_or_default();
                last = Some((x, y));
                Step::ReleaseClick {
                    x: clamp.coord(x),
                    y: clamp.coord(y),
                    button,
                }
            }
        };
        debug!(seq, %step, "captured");
        if tx.send((seq, step)).is_err() {
            break;
        }
    }
    if clamp.count > 0 {
        warn!(
            clamped = clamp.count,
            "pointer positions left of or above the primary monitor were recorded as 0"
        );
    }
}

/// Screen positions left of or above the primary monitor clamp to 0
#[derive(Default)]
struct Clamp {
    count: usize,
}

impl Clamp {
    fn coord(&mut self, v: f64) -> u32 {
        if v < 0.0 {
            if self.count == 0 {
                warn!(value = v, "pointer outside the primary monitor, clamping to 0");
            }
            self.count += 1;
        }
        v.round() as u32
    }
}

struct EscWatch {
    session: u64,
    stop: Arc<AtomicBool>,
    esc_seq: Arc<AtomicU64>,
    hook: Arc<dyn InputHook>,
}

fn run_keyboard_observer(
    rx: Receiver<Stamped<KeyboardEvent>>,
    tx: Sender<(u64, Step)>,
    watch: EscWatch,
) {
    for Stamped { seq, event, .. } in rx.iter() {
        let step = match event {
            KeyboardEvent::Down(key) => {
                if KeySpec::parse(&key).is_some_and(|k| k.is_escape()) {
                    watch.esc_seq.fetch_min(seq, Ordering::SeqCst);
                    watch.stop.store(true, Ordering::SeqCst);
                    info!(session = watch.session, "escape pressed, stopping capture");
                    // Closes both streams; keep draining what is queued
                    watch.hook.detach(watch.session);
                    continue;
                }
                Step::KeyPress { key }
            }
            KeyboardEvent::Up(key) => Step::KeyRelease { key },
        };
        debug!(seq, %step, "captured");
        if tx.send((seq, step)).is_err() {
            break;
        }
    }
}

fn collect(
    rx: Receiver<(u64, Step)>,
    esc_seq: Arc<AtomicU64>,
    captured: Arc<AtomicUsize>,
    target: SharedMacro,
    active: Arc<AtomicBool>,
) -> Macro {
    let mut buffer = Vec::new();
    for item in rx.iter() {
        buffer.push(item);
        captured.fetch_add(1, Ordering::Relaxed);
    }

    // Events observed after Esc raced the detach; they are not part of the macro
    let cutoff = esc_seq.load(Ordering::SeqCst);
    buffer.retain(|(seq, _)| *seq < cutoff);
    buffer.sort_by_key(|(seq, _)| *seq);
    let recorded: Macro = buffer.into_iter().map(|(_, step)| step).collect();

    *target.write() = recorded.clone();
    active.store(false, Ordering::SeqCst);
    info!(steps = recorded.len(), "recording stopped");
    recorded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::ManualHook;
    use pixelmacro_core::Button;
    use std::time::{Duration, Instant};

    fn setup(config: RecorderConfig) -> (Arc<ManualHook>, Recorder, SharedMacro) {
        let hook = Arc::new(ManualHook::new());
        let recorder = Recorder::with_config(hook.clone(), config);
        (hook, recorder, SharedMacro::default())
    }

    fn esc(hook: &ManualHook) {
        assert!(hook.keyboard(KeyboardEvent::Down("esc".into())));
    }

    #[test]
    fn esc_ends_session_and_replaces_target() {
        let (hook, recorder, target) = setup(RecorderConfig::default());
        *target.write() = vec![Step::Move { x: 9, y: 9 }].into();

        let handle = recorder.start(target.clone()).unwrap();
        assert!(recorder.is_recording());
        hook.pointer(PointerEvent::Move { x: 10.0, y: 20.0 });
        hook.pointer(PointerEvent::Down { button: Button::Left, pos: None });
        hook.pointer(PointerEvent::Up { button: Button::Left, pos: Some((11.4, 20.6)) });
        hook.keyboard(KeyboardEvent::Down("a".into()));
        hook.keyboard(KeyboardEvent::Up("a".into()));
        esc(&hook);

        let recorded = handle.wait().unwrap();
        assert_eq!(
            recorded.steps(),
            &[
                Step::Move { x: 10, y: 20 },
                Step::Click { x: 10, y: 20, button: Button::Left },
                Step::ReleaseClick { x: 11, y: 21, button: Button::Left },
                Step::KeyPress { key: "a".into() },
                Step::KeyRelease { key: "a".into() },
            ]
        );
        assert_eq!(*target.read(), recorded);
        assert!(!recorder.is_recording());
        assert!(!hook.is_attached());
    }

    #[test]
    fn events_after_esc_are_rejected() {
        let (hook, recorder, target) = setup(RecorderConfig::default());
        let handle = recorder.start(target).unwrap();
        hook.keyboard(KeyboardEvent::Down("b".into()));
        esc(&hook);

        // The keyboard observer detaches the hook; wait for it
        let deadline = Instant::now() + Duration::from_secs(5);
        while hook.is_attached() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!hook.pointer(PointerEvent::Move { x: 1.0, y: 1.0 }));

        let recorded = handle.wait().unwrap();
        assert_eq!(recorded.steps(), &[Step::KeyPress { key: "b".into() }]);
    }

    #[test]
    fn second_start_is_refused_while_recording() {
        let (hook, recorder, target) = setup(RecorderConfig::default());
        let handle = recorder.start(target.clone()).unwrap();
        assert!(matches!(
            recorder.start(target.clone()),
            Err(CaptureError::AlreadyRecording)
        ));
        assert_eq!(hook.attach_count(), 1);

        handle.stop().unwrap();
        assert!(!recorder.is_recording());
        let again = recorder.start(target).unwrap();
        assert_eq!(hook.attach_count(), 2);
        again.stop().unwrap();
    }

    #[test]
    fn forced_stop_keeps_what_was_captured() {
        let (hook, recorder, target) = setup(RecorderConfig::default());
        let handle = recorder.start(target.clone()).unwrap();
        hook.keyboard(KeyboardEvent::Down("Key.shift".into()));
        assert!(!handle.is_finished());
        let recorded = handle.stop().unwrap();
        assert_eq!(recorded.steps(), &[Step::KeyPress { key: "Key.shift".into() }]);
        assert_eq!(target.read().len(), 1);
    }

    #[test]
    fn move_threshold_drops_small_moves() {
        let (hook, recorder, target) = setup(RecorderConfig {
            mouse_move_threshold: 5.0,
            ..Default::default()
        });
        let handle = recorder.start(target).unwrap();
        hook.pointer(PointerEvent::Move { x: 0.0, y: 0.0 });
        hook.pointer(PointerEvent::Move { x: 2.0, y: 2.0 });
        hook.pointer(PointerEvent::Move { x: 10.0, y: 0.0 });
        // Clicks use the latest position even when the move was dropped
        hook.pointer(PointerEvent::Move { x: 11.0, y: 1.0 });
        hook.pointer(PointerEvent::Down { button: Button::Right, pos: None });
        esc(&hook);
        let recorded = handle.wait().unwrap();
        assert_eq!(
            recorded.steps(),
            &[
                Step::Move { x: 0, y: 0 },
                Step::Move { x: 10, y: 0 },
                Step::Click { x: 11, y: 1, button: Button::Right },
            ]
        );
    }

    #[test]
    fn negative_positions_clamp_to_zero() {
        let mut clamp = Clamp::default();
        assert_eq!(clamp.coord(12.5), 13);
        assert_eq!(clamp.coord(f64::NAN), 0);
        assert_eq!(clamp.count, 0);
        assert_eq!(clamp.coord(-40.0), 0);
        assert_eq!(clamp.coord(-0.2), 0);
        assert_eq!(clamp.count, 2);
    }

    #[test]
    fn target_keeps_old_macro_until_session_ends() {
        let (hook, recorder, target) = setup(RecorderConfig::default());
        let old: Macro = vec![Step::KeyPress { key: "z".into() }].into();
        *target.write() = old.clone();

        let handle = recorder.start(target.clone()).unwrap();
        hook.pointer(PointerEvent::Move { x: 1.0, y: 2.0 });
        hook.keyboard(KeyboardEvent::Down("a".into()));
        hook.keyboard(KeyboardEvent::Up("a".into()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.captured() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.captured(), 3);
        assert_eq!(*target.read(), old);

        esc(&hook);
        let recorded = handle.wait().unwrap();
        assert_eq!(recorded.len(), 3);
        assert_eq!(*target.read(), recorded);
    }
}
