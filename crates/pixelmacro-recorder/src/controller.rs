//! The operations a shell calls: record, play, edit, save, load
//!
//! One controller owns the current macro, the recording state machine and the
//! playback guard. Library errors are folded into the structured
//! [`pixelmacro_core::Error`] here.

use crate::cancel::CancelToken;
use crate::config::{ConfigError, Settings};
use crate::hook::{CaptureError, InputHook};
use crate::pixel::{PixelError, PixelSource, WaitError};
use crate::recorder::{Recorder, RecordingHandle, SharedMacro};
use crate::replay::{AbortReason, InputError, InputSink, PlaybackError, PlaybackReport, Player};
use crate::storage::{self, MacroStorage, StorageError};
use parking_lot::Mutex;
use pixelmacro_core::{Error, ErrorCode, LoadWarning, Macro, Result, Rgb, Step};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// The OS-facing half of a controller
pub struct Backends {
    pub hook: Arc<dyn InputHook>,
    pub sink: Box<dyn InputSink + Send>,
    pub pixels: Box<dyn PixelSource + Send>,
}

struct Output {
    sink: Box<dyn InputSink + Send>,
    pixels: Box<dyn PixelSource + Send>,
}

pub struct MacroController {
    current: SharedMacro,
    recorder: Recorder,
    recording: Mutex<Option<RecordingHandle>>,
    player: Player,
    output: Mutex<Output>,
    storage: MacroStorage,
}

impl MacroController {
    pub fn new(backends: Backends, settings: &Settings, storage: MacroStorage) -> Self {
        Self {
            current: SharedMacro::default(),
            recorder: Recorder::with_config(backends.hook, settings.recorder.clone()),
            recording: Mutex::new(None),
            player: Player::new(settings.playback),
            output: Mutex::new(Output {
                sink: backends.sink,
                pixels: backends.pixels,
            }),
            storage,
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Begin a recording session. Returns false, and changes nothing, if one
    /// is already running.
    pub fn start_recording(&self) -> Result<bool> {
        let mut slot = self.recording.lock();
        if let Some(old) = slot.take() {
            if self.recorder.is_recording() {
                *slot = Some(old);
                debug!("start_recording ignored, session already active");
                return Ok(false);
            }
            // Ended by Esc but never collected
            old.wait()?;
        }
        match self.recorder.start(self.current.clone()) {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(true)
            }
            Err(CaptureError::AlreadyRecording) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// End the session now and return what it captured. Without a session
    /// this returns the current macro unchanged.
    pub fn stop_recording(&self) -> Result<Macro> {
        // Hold the slot while joining so `wait_recording` sees the final macro
        let mut slot = self.recording.lock();
        match slot.take() {
            Some(handle) => {
                debug!(captured = handle.captured(), "stopping recording");
                Ok(handle.stop()?)
            }
            None => Ok(self.current()),
        }
    }

    /// Block until the session ends, by Esc or by `stop_recording` from
    /// another thread.
    pub fn wait_recording(&self) -> Result<Macro> {
        loop {
            {
                let mut slot = self.recording.lock();
                match slot.as_ref() {
                    None => return Ok(self.current()),
                    Some(handle) if handle.is_finished() => {
                        if let Some(handle) = slot.take() {
                            return Ok(handle.wait()?);
                        }
                    }
                    Some(_) => {}
                }
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Steps buffered by the running session, 0 when idle. The current
    /// macro is not touched until the session ends.
    pub fn captured(&self) -> usize {
        self.recording.lock().as_ref().map_or(0, |h| h.captured())
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Play a snapshot of the current macro. Edits made while it runs apply
    /// to the next pass.
    pub fn play(&self, cancel: &CancelToken) -> Result<PlaybackReport> {
        let snapshot = self.current();
        let mut output = self.output.try_lock().ok_or_else(Error::already_playing)?;
        let Output { sink, pixels } = &mut *output;
        Ok(self
            .player
            .play(&snapshot, sink.as_mut(), pixels.as_mut(), cancel)?)
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// Read one screen pixel, for authoring wait steps
    pub fn sample_pixel(&self, x: u32, y: u32) -> Result<Rgb> {
        let mut output = self.output.try_lock().ok_or_else(Error::already_playing)?;
        Ok(output.pixels.sample(x, y)?)
    }

    // ========================================================================
    // Library
    // ========================================================================

    /// Save the current macro into the library
    pub fn save(&self, name: &str) -> Result<PathBuf> {
        let m = self.current();
        Ok(self.storage.save(name, &m)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let m = self.current();
        Ok(storage::save_to(path, &m)?)
    }

    /// Replace the current macro with a library file. A file that fails to
    /// parse leaves the current macro untouched.
    pub fn load(&self, filename: &str) -> Result<Vec<LoadWarning>> {
        let decoded = self.storage.load(filename)?;
        Ok(self.install(decoded.macro_, decoded.warnings))
    }

    pub fn load_from(&self, path: &Path) -> Result<Vec<LoadWarning>> {
        let decoded = storage::load_from(path)?;
        Ok(self.install(decoded.macro_, decoded.warnings))
    }

    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.storage.list()?)
    }

    pub fn delete(&self, filename: &str) -> Result<()> {
        Ok(self.storage.delete(filename)?)
    }

    pub fn storage(&self) -> &MacroStorage {
        &self.storage
    }

    /// Each warning is already logged by the storage layer
    fn install(&self, m: Macro, warnings: Vec<LoadWarning>) -> Vec<LoadWarning> {
        info!(steps = m.len(), warnings = warnings.len(), "macro loaded");
        *self.current.write() = m;
        warnings
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// A copy of the current macro
    pub fn current(&self) -> Macro {
        self.current.read().clone()
    }

    /// Start an empty edit session
    pub fn new_macro(&self) {
        *self.current.write() = Macro::new();
    }

    pub fn add_step(&self, step: Step) -> usize {
        let mut m = self.current.write();
        m.add_step(step);
        m.len() - 1
    }

    pub fn insert_step(&self, index: usize, step: Step) -> Result<()> {
        self.current.write().insert_step(index, step)
    }

    pub fn remove_step(&self, index: usize) -> Result<Step> {
        self.current.write().remove_step(index)
    }

    pub fn replace_step(&self, index: usize, step: Step) -> Result<Step> {
        self.current.write().replace_step(index, step)
    }
}

// ============================================================================
// Boundary conversions
// ============================================================================

impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        let err = Error::new(ErrorCode::Capture, e.to_string());
        match e {
            CaptureError::Hook(_) => err.with_suggestions(vec![
                "Grant input monitoring / accessibility permission to the terminal".into(),
                "On Linux, run under X11".into(),
            ]),
            _ => err,
        }
    }
}

impl From<InputError> for Error {
    fn from(e: InputError) -> Self {
        Error::new(ErrorCode::Input, e.to_string())
    }
}

impl From<PixelError> for Error {
    fn from(e: PixelError) -> Self {
        let err = Error::new(ErrorCode::Screen, e.to_string());
        match e {
            PixelError::OutOfBounds { x, y } => {
                err.with_context(serde_json::json!({ "x": x, "y": y }))
            }
            PixelError::Capture(_) => err.with_suggestions(vec![
                "Grant screen recording permission to the terminal".into(),
            ]),
        }
    }
}

impl From<PlaybackError> for Error {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::AlreadyPlaying => Error::already_playing(),
            PlaybackError::EmptyMacro => Error::empty_macro(),
            PlaybackError::Aborted { at, reason, report } => {
                let err = match reason {
                    AbortReason::Cancelled => Error::cancelled(at),
                    AbortReason::Wait(WaitError::StuckWait {
                        x,
                        y,
                        expected,
                        timeout,
                        ..
                    }) => {
                        Error::stuck_wait(at, x, y, expected.to_array(), timeout.as_millis() as u64)
                    }
                    AbortReason::Wait(WaitError::Cancelled { .. }) => Error::cancelled(at),
                    AbortReason::Wait(WaitError::Sample(p)) => p.into(),
                    AbortReason::Input(i) => i.into(),
                };
                with_report(err, at, &report)
            }
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Format { path, source } => {
                let mut err = Error::from(source);
                err.message = format!("{}: {}", path.display(), err.message);
                err
            }
            StorageError::Io { ref path, .. } => {
                Error::io(&path.display().to_string(), &e.to_string())
            }
            StorageError::LossyRewrite { ref warnings, .. } => {
                Error::new(ErrorCode::LossyRewrite, e.to_string())
                    .with_suggestions(vec![
                        "Fix the listed steps by hand, or pass --force to normalise them".into(),
                    ])
                    .with_context(serde_json::json!({ "warnings": warnings }))
            }
            StorageError::NoDataDir => Error::new(ErrorCode::Io, e.to_string())
                .with_suggestions(vec!["Pass --dir to choose a library directory".into()]),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::new(ErrorCode::Io, e.to_string())
    }
}

/// Attach the partial report of an aborted pass
fn with_report(mut err: Error, at: usize, report: &PlaybackReport) -> Error {
    let report = serde_json::to_value(report).unwrap_or_default();
    match err.context.as_mut().and_then(|c| c.as_object_mut()) {
        Some(obj) => {
            obj.insert("report".into(), report);
        }
        None => err.context = Some(serde_json::json!({ "step": at, "report": report })),
    }
    err
}
