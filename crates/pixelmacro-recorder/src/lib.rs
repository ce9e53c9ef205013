//! pixelmacro-recorder - capture and playback of input macros
//!
//! Records global mouse and keyboard input into a [`Macro`], plays it back
//! through synthetic input, and gates playback on screen pixels.
//!
//! ## Platform Support
//!
//! - **macOS**: needs Accessibility and Input Monitoring permission
//! - **Windows**: works out of the box
//! - **Linux**: X11 only (rdev and enigo do not capture under Wayland)
//!
//! [`Macro`]: pixelmacro_core::Macro

pub mod cancel;
pub mod config;
pub mod controller;
pub mod hook;
pub mod pixel;
pub mod platform;
pub mod recorder;
pub mod replay;
pub mod storage;

pub use cancel::CancelToken;
pub use config::{ConfigError, Settings};
pub use controller::{Backends, MacroController};
pub use hook::{CaptureError, HookSink, InputHook, KeyboardEvent, ManualHook, PointerEvent};
pub use pixel::{wait_for_pixel, PixelError, PixelSource, WaitError, WaitOptions, WaitOutcome};
pub use recorder::{Recorder, RecorderConfig, RecordingHandle, SharedMacro};
pub use replay::{
    AbortReason, Direction, InputError, InputSink, PlaybackConfig, PlaybackError, PlaybackReport,
    Player, StepIssue,
};
pub use storage::{MacroStorage, StorageError};

pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::config::Settings;
    pub use crate::controller::{Backends, MacroController};
    pub use crate::hook::InputHook;
    pub use crate::pixel::PixelSource;
    pub use crate::recorder::{Recorder, RecordingHandle};
    pub use crate::replay::{InputSink, PlaybackReport, Player};
    pub use crate::storage::MacroStorage;
}
