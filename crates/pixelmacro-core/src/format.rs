//! Saved macro format
//!
//! A UTF-8 JSON array, one record per step:
//!
//! ```json
//! [{"action": "move", "params": {"x": 10, "y": 20}},
//!  {"action": "click", "params": {"x": 10, "y": 20, "button": "Button.left"}},
//!  {"action": "wait_pixel", "params": {"x": 5, "y": 5, "color": [255, 0, 0]}}]
//! ```
//!
//! Field names are a compatibility surface: files written by earlier
//! recorders must keep loading.

use crate::error::FormatError;
use crate::keys::{resolve_button, Button, KeySpec};
use crate::step::{Macro, Rgb, Step};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::warn;

/// Serialize a macro as compact JSON text
pub fn serialize(m: &Macro) -> String {
    to_value(m).to_string()
}

/// Serialize with indentation, for files meant to be hand-edited
pub fn serialize_pretty(m: &Macro) -> String {
    format!("{:#}", to_value(m))
}

pub fn to_value(m: &Macro) -> Value {
    Value::Array(m.iter().map(step_to_value).collect())
}

fn step_to_value(step: &Step) -> Value {
    let params = match step {
        Step::Move { x, y } => json!({ "x": x, "y": y }),
        Step::Click { x, y, button } | Step::ReleaseClick { x, y, button } => {
            json!({ "x": x, "y": y, "button": button.label() })
        }
        Step::KeyPress { key } | Step::KeyRelease { key } => json!({ "key": key }),
        Step::WaitPixel { x, y, color } => {
            json!({ "x": x, "y": y, "color": color.to_array() })
        }
    };
    json!({ "action": step.action(), "params": params })
}

/// Something accepted on load that a reader should still hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    pub index: usize,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// Button string matched neither label and fell back
    AmbiguousButton { raw: String, resolved: Button },
    /// Key name playback will not be able to synthesize
    UnknownKey { key: String },
    /// Parameter the action does not use
    IgnoredField { field: String },
    /// Integral float such as `512.0` read as an integer
    CoercedNumber { field: String, raw: String },
}

impl LoadWarning {
    /// Writing the decoded macro back would change what the file says:
    /// the button label is normalised or the unused field is dropped.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self.kind,
            WarningKind::AmbiguousButton { .. } | WarningKind::IgnoredField { .. }
        )
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WarningKind::AmbiguousButton { raw, resolved } => write!(
                f,
                "step {}: button {:?} is not a known label, treating it as {}",
                self.index, raw, resolved
            ),
            WarningKind::UnknownKey { key } => {
                write!(f, "step {}: key {:?} cannot be synthesized", self.index, key)
            }
            WarningKind::IgnoredField { field } => {
                write!(f, "step {}: ignoring unused field `params.{}`", self.index, field)
            }
            WarningKind::CoercedNumber { field, raw } => {
                write!(
                    f,
                    "step {}: `params.{}` is {}, reading it as an integer",
                    self.index, field, raw
                )
            }
        }
    }
}

/// A decoded macro plus everything worth flagging about it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decoded {
    pub macro_: Macro,
    pub warnings: Vec<LoadWarning>,
}

/// Decode a saved macro. Warnings are logged and dropped; use
/// [`deserialize_with_warnings`] to inspect them.
pub fn deserialize(bytes: &[u8]) -> Result<Macro, FormatError> {
    let decoded = deserialize_with_warnings(bytes)?;
    for w in &decoded.warnings {
        warn!("{}", w);
    }
    Ok(decoded.macro_)
}

pub fn deserialize_with_warnings(bytes: &[u8]) -> Result<Decoded, FormatError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| FormatError::Syntax(e.to_string()))?;
    from_value(&value)
}

pub fn from_value(value: &Value) -> Result<Decoded, FormatError> {
    let records = value.as_array().ok_or(FormatError::NotAnArray)?;
    let mut decoded = Decoded::default();
    let mut steps = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        steps.push(decode_step(index, record, &mut decoded.warnings)?);
    }
    decoded.macro_ = Macro::from(steps);
    Ok(decoded)
}

fn decode_step(
    index: usize,
    record: &Value,
    warnings: &mut Vec<LoadWarning>,
) -> Result<Step, FormatError> {
    let record = record
        .as_object()
        .ok_or_else(|| FormatError::step(index, "", "expected an object"))?;
    let action = record
        .get("action")
        .ok_or_else(|| FormatError::step(index, "action", "missing"))?
        .as_str()
        .ok_or_else(|| FormatError::step(index, "action", "expected a string"))?;
    let params = record
        .get("params")
        .ok_or_else(|| FormatError::step(index, "params", "missing"))?
        .as_object()
        .ok_or_else(|| FormatError::step(index, "params", "expected an object"))?;

    let mut p = Params { index, params, coerced: Vec::new() };
    let (step, used): (Step, &[&str]) = match action {
        "move" => (Step::Move { x: p.coord("x")?, y: p.coord("y")? }, &["x", "y"][..]),
        "click" | "release_click" => {
            let x = p.coord("x")?;
            let y = p.coord("y")?;
            let raw = p.string("button")?;
            let resolution = resolve_button(raw);
            if resolution.ambiguous {
                warnings.push(LoadWarning {
                    index,
                    kind: WarningKind::AmbiguousButton {
                        raw: raw.to_string(),
                        resolved: resolution.button,
                    },
                });
            }
            let button = resolution.button;
            let step = if action == "click" {
                Step::Click { x, y, button }
            } else {
                Step::ReleaseClick { x, y, button }
            };
            (step, &["x", "y", "button"][..])
        }
        "key_press" | "key_release" => {
            let key = p.string("key")?.to_string();
            if KeySpec::parse(&key).is_none() {
                warnings.push(LoadWarning {
                    index,
                    kind: WarningKind::UnknownKey { key: key.clone() },
                });
            }
            let step = if action == "key_press" {
                Step::KeyPress { key }
            } else {
                Step::KeyRelease { key }
            };
            (step, &["key"][..])
        }
        "wait_pixel" => (
            Step::WaitPixel {
                x: p.coord("x")?,
                y: p.coord("y")?,
                color: p.color("color")?,
            },
            &["x", "y", "color"][..],
        ),
        other => {
            return Err(FormatError::step(
                index,
                "action",
                format!("unknown action {:?}", other),
            ))
        }
    };

    warnings.extend(p.coerced.drain(..).map(|(field, raw)| LoadWarning {
        index,
        kind: WarningKind::CoercedNumber { field, raw },
    }));
    for field in params.keys().filter(|k| !used.contains(&k.as_str())) {
        warnings.push(LoadWarning {
            index,
            kind: WarningKind::IgnoredField {
                field: field.clone(),
            },
        });
    }

    Ok(step)
}

struct Params<'a> {
    index: usize,
    params: &'a Map<String, Value>,
    /// Fields read from an integral float, with the text as written
    coerced: Vec<(String, String)>,
}

impl<'a> Params<'a> {
    fn get(&self, name: &str) -> Result<&'a Value, FormatError> {
        self.params
            .get(name)
            .ok_or_else(|| FormatError::step(self.index, format!("params.{}", name), "missing"))
    }

    fn fail(&self, name: &str, reason: impl Into<String>) -> FormatError {
        FormatError::step(self.index, format!("params.{}", name), reason)
    }

    fn coord(&mut self, name: &str) -> Result<u32, FormatError> {
        let v = self.get(name)?;
        let n = self
            .integer(name, v)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| self.fail(name, format!("expected a non-negative integer, got {}", v)))?;
        Ok(n)
    }

    fn string(&self, name: &str) -> Result<&'a str, FormatError> {
        let v = self.get(name)?;
        v.as_str()
            .ok_or_else(|| self.fail(name, format!("expected a string, got {}", v)))
    }

    fn color(&mut self, name: &str) -> Result<Rgb, FormatError> {
        let v = self.get(name)?;
        let channels = v
            .as_array()
            .filter(|a| a.len() == 3)
            .ok_or_else(|| self.fail(name, format!("expected [r, g, b], got {}", v)))?;
        let mut rgb = [0u8; 3];
        for (slot, c) in rgb.iter_mut().zip(channels) {
            *slot = self
                .integer(name, c)
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| self.fail(name, format!("channel {} is not in 0..=255", c)))?;
        }
        Ok(Rgb::from(rgb))
    }

    /// Integers, plus integral floats such as `512.0` that some platforms
    /// report for pointer positions. Those are recorded in `coerced`.
    /// Fractions are rejected.
    fn integer(&mut self, name: &str, v: &Value) -> Option<i64> {
        if let Some(n) = v.as_i64() {
            return Some(n);
        }
        let f = v.as_f64()?;
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            self.coerced.push((name.to_string(), v.to_string()));
            Some(f as i64)
        } else {
            None
        }
    }
}
