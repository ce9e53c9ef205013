//! pixelmacro-core - macro data model
//!
//! Steps, the key and button vocabulary, and the JSON format macros are
//! saved in. Nothing here touches the OS; capture and playback live in
//! `pixelmacro-recorder`.

pub mod draft;
pub mod error;
pub mod format;
pub mod keys;
pub mod step;

pub use draft::{DraftError, StepDraft};
pub use error::{Error, ErrorCode, FormatError, Result};
pub use format::{
    deserialize, deserialize_with_warnings, serialize, Decoded, LoadWarning, WarningKind,
};
pub use keys::{resolve_button, Button, ButtonResolution, KeySpec, NamedKey};
pub use step::{Macro, Rgb, Step};

pub mod prelude {
    pub use crate::error::{Error, ErrorCode, FormatError, Result};
    pub use crate::keys::{Button, KeySpec, NamedKey};
    pub use crate::step::{Macro, Rgb, Step};
    pub use crate::draft::StepDraft;
}
