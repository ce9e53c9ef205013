//! Structured errors for the shell
//!
//! Library modules return their own `thiserror` enums. At the process
//! boundary they are folded into [`Error`], which serialises to JSON so the
//! shell can show a code, a message and what to try next.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Format,
    LossyRewrite,
    UnresolvableKey,
    StuckWait,
    Cancelled,
    AlreadyPlaying,
    EmptyMacro,
    IndexOutOfRange,
    InvalidStep,
    Capture,
    Input,
    Screen,
    Io,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn already_playing() -> Self {
        Self::new(ErrorCode::AlreadyPlaying, "A macro is already playing")
            .with_suggestions(vec!["Wait for the current pass to finish or cancel it".into()])
    }

    pub fn empty_macro() -> Self {
        Self::new(ErrorCode::EmptyMacro, "Macro has no steps")
            .with_suggestions(vec!["Record a macro or add steps before playing".into()])
    }

    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::new(
            ErrorCode::IndexOutOfRange,
            format!("Step index {} out of range for macro of {} steps", index, len),
        )
        .with_context(serde_json::json!({ "index": index, "len": len }))
    }

    pub fn stuck_wait(step: usize, x: u32, y: u32, color: [u8; 3], timeout_ms: u64) -> Self {
        Self::new(
            ErrorCode::StuckWait,
            format!(
                "Pixel ({}, {}) never became rgb({}, {}, {}) within {}ms",
                x, y, color[0], color[1], color[2], timeout_ms
            ),
        )
        .with_suggestions(vec![
            "Check the coordinate with `pm pixel X Y`".into(),
            "Raise the pixel timeout".into(),
        ])
        .with_context(serde_json::json!({ "step": step, "x": x, "y": y, "color": color }))
    }

    pub fn cancelled(step: usize) -> Self {
        Self::new(ErrorCode::Cancelled, format!("Playback cancelled at step {}", step))
            .with_context(serde_json::json!({ "step": step }))
    }

    pub fn io(path: &str, reason: &str) -> Self {
        Self::new(ErrorCode::Io, format!("{}: {}", path, reason))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        let context = match &e {
            FormatError::Step { index, field, .. } => {
                serde_json::json!({ "index": index, "field": field })
            }
            _ => serde_json::Value::Null,
        };
        let err = Self::new(ErrorCode::Format, e.to_string());
        if context.is_null() {
            err
        } else {
            err.with_context(context)
        }
    }
}

impl From<crate::draft::DraftError> for Error {
    fn from(e: crate::draft::DraftError) -> Self {
        use crate::draft::DraftError;
        match &e {
            DraftError::UnknownKey(key) => Self::new(ErrorCode::UnresolvableKey, e.to_string())
                .with_suggestions(vec![
                    "Use a single character or a key name such as enter, esc, f5 or ctrl".into(),
                ])
                .with_context(serde_json::json!({ "key": key })),
            _ => Self::new(ErrorCode::InvalidStep, e.to_string()),
        }
    }
}

/// A saved macro that cannot be turned back into steps.
///
/// Loading aborts on the first one; no partial macro is produced.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum FormatError {
    #[error("not valid JSON: {0}")]
    Syntax(String),

    #[error("expected a JSON array of steps")]
    NotAnArray,

    #[error("step {index}: field `{field}`: {reason}")]
    Step {
        index: usize,
        field: String,
        reason: String,
    },
}

impl FormatError {
    pub(crate) fn step(index: usize, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Step {
            index,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Index of the offending step, when the failure is tied to one
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Step { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Step { field, .. } => Some(field),
            _ => None,
        }
    }
}
