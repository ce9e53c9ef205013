//! Raw input as delivered by a global hook
//!
//! A hook owns the OS side (rdev in production, a script in tests) and
//! pushes pointer and keyboard events into two separate streams. Every event
//! is stamped with a shared sequence number at the moment it is observed, so
//! the streams can be merged back into true arrival order.

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use pixelmacro_core::Button;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Move { x: f64, y: f64 },
    /// `pos` is the pointer location when the backend can report it
    Down { button: Button, pos: Option<(f64, f64)> },
    Up { button: Button, pos: Option<(f64, f64)> },
}

/// Key names are already normalized: a literal character or a symbolic name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardEvent {
    Down(String),
    Up(String),
}

#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub seq: u64,
    pub at: Instant,
    pub event: T,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a recording session is already active")]
    AlreadyRecording,
    #[error("global input hook failed: {0}")]
    Hook(String),
    #[error("capture thread failed: {0}")]
    Thread(String),
}

/// Where a hook delivers events for one recording session
#[derive(Clone)]
pub struct HookSink {
    session: u64,
    seq: Arc<AtomicU64>,
    pointer: Sender<Stamped<PointerEvent>>,
    keyboard: Sender<Stamped<KeyboardEvent>>,
}

impl HookSink {
    pub(crate) fn new(
        session: u64,
        pointer: Sender<Stamped<PointerEvent>>,
        keyboard: Sender<Stamped<KeyboardEvent>>,
    ) -> Self {
        Self {
            session,
            seq: Arc::new(AtomicU64::new(0)),
            pointer,
            keyboard,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    fn stamp<T>(&self, event: T) -> Stamped<T> {
        Stamped {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            at: Instant::now(),
            event,
        }
    }

    /// Returns false once the session has stopped listening
    pub fn pointer(&self, event: PointerEvent) -> bool {
        self.pointer.send(self.stamp(event)).is_ok()
    }

    pub fn keyboard(&self, event: KeyboardEvent) -> bool {
        self.keyboard.send(self.stamp(event)).is_ok()
    }
}

/// A source of global pointer and keyboard events
pub trait InputHook: Send + Sync {
    /// Start delivering events to `sink`, replacing any previous sink
    fn attach(&self, sink: HookSink) -> Result<(), CaptureError>;

    /// Stop delivering to the sink of `session`. Must drop every clone of
    /// that sink the hook holds so the session's streams close. A no-op if a
    /// different session is attached.
    fn detach(&self, session: u64);
}

/// A hook fed by the caller instead of the OS.
///
/// Replays synthetic event streams into a recording session.
#[derive(Default)]
pub struct ManualHook {
    sink: Mutex<Option<HookSink>>,
    attaches: AtomicUsize,
}

impl ManualHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// How many sessions have attached over the hook's lifetime
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    /// Deliver a pointer event; false if no session is listening
    pub fn pointer(&self, event: PointerEvent) -> bool {
        self.sink.lock().as_ref().is_some_and(|s| s.pointer(event))
    }

    pub fn keyboard(&self, event: KeyboardEvent) -> bool {
        self.sink.lock().as_ref().is_some_and(|s| s.keyboard(event))
    }
}

impl InputHook for ManualHook {
    fn attach(&self, sink: HookSink) -> Result<(), CaptureError> {
        *self.sink.lock() = Some(sink);
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self, session: u64) {
        let mut sink = self.sink.lock();
        if sink.as_ref().is_some_and(|s| s.session() == session) {
            *sink = None;
        }
    }
}
