//! # pixelmacro
//!
//! Record mouse and keyboard input as a macro, edit it, save it as JSON and
//! play it back, optionally pausing until a screen pixel shows a colour.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixelmacro::prelude::*;
//!
//! let controller = MacroController::new(
//!     pixelmacro::recorder::platform::native()?,
//!     &Settings::load_default()?,
//!     MacroStorage::new()?,
//! );
//!
//! // Record until Esc
//! controller.start_recording()?;
//! let recorded = controller.wait_recording()?;
//! println!("{} steps", recorded.len());
//!
//! // Play it back
//! let report = controller.play(&CancelToken::new())?;
//! println!("{:?}", report);
//! # Ok::<(), anyhow::Error>(())
//! ```

// Re-export the data model
pub use pixelmacro_core::*;

// Re-export recorder module
pub use pixelmacro_recorder as recorder;

pub use pixelmacro_recorder::{
    CancelToken, MacroController, MacroStorage, PlaybackConfig, PlaybackReport, RecorderConfig,
    Settings,
};

/// Prelude - import everything you need
pub mod prelude {
    pub use pixelmacro_core::prelude::*;
    pub use pixelmacro_recorder::prelude::*;
}
