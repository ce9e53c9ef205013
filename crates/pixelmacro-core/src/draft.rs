//! Building steps from loosely typed input (CLI flags, edit dialogs)

use crate::keys::{resolve_button, KeySpec};
use crate::step::{Rgb, Step};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("unknown action {0:?} (expected move, click, release_click, key_press, key_release or wait_pixel)")]
    UnknownAction(String),
    #[error("{action} needs `{field}`")]
    Missing { action: String, field: &'static str },
    #[error("invalid colour {0:?}: expected r,g,b with each channel in 0..=255")]
    BadColor(String),
    #[error("key {0:?} cannot be synthesized")]
    UnknownKey(String),
}

/// An action name plus whatever fields the caller supplied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepDraft {
    pub action: String,
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub button: Option<String>,
    pub key: Option<String>,
    /// `"r,g,b"`
    pub color: Option<String>,
}

/// A built step and whether its button string needed the fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Built {
    pub step: Step,
    pub ambiguous_button: bool,
}

impl StepDraft {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, x: u32, y: u32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn button(mut self, button: impl Into<String>) -> Self {
        self.button = Some(button.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Check required fields and produce a typed step.
    ///
    /// Unlike loading, an unknown key name is rejected here: the user is
    /// present and can fix it.
    pub fn build(&self) -> Result<Built, DraftError> {
        let mut ambiguous_button = false;
        let step = match self.action.as_str() {
            "move" => {
                let (x, y) = self.position()?;
                Step::Move { x, y }
            }
            "click" | "release_click" => {
                let (x, y) = self.position()?;
                let raw = self.require(self.button.as_deref(), "button")?;
                let resolution = resolve_button(raw);
                if resolution.ambiguous {
                    warn!(
                        "button {:?} is not a known label, treating it as {}",
                        raw, resolution.button
                    );
                    ambiguous_button = true;
                }
                let button = resolution.button;
                if self.action == "click" {
                    Step::Click { x, y, button }
                } else {
                    Step::ReleaseClick { x, y, button }
                }
            }
            "key_press" | "key_release" => {
                let key = self.require(self.key.as_deref(), "key")?;
                if KeySpec::parse(key).is_none() {
                    return Err(DraftError::UnknownKey(key.to_string()));
                }
                let key = key.to_string();
                if self.action == "key_press" {
                    Step::KeyPress { key }
                } else {
                    Step::KeyRelease { key }
                }
            }
            "wait_pixel" => {
                let (x, y) = self.position()?;
                let color = parse_color(self.require(self.color.as_deref(), "color")?)?;
                Step::WaitPixel { x, y, color }
            }
            other => return Err(DraftError::UnknownAction(other.to_string())),
        };
        Ok(Built {
            step,
            ambiguous_button,
        })
    }

    fn require<'a>(&self, v: Option<&'a str>, field: &'static str) -> Result<&'a str, DraftError> {
        v.ok_or_else(|| DraftError::Missing {
            action: self.action.clone(),
            field,
        })
    }

    fn position(&self) -> Result<(u32, u32), DraftError> {
        let missing = |field| DraftError::Missing {
            action: self.action.clone(),
            field,
        };
        Ok((self.x.ok_or_else(|| missing("x"))?, self.y.ok_or_else(|| missing("y"))?))
    }
}

/// Parse `"255,255,255"` (spaces allowed)
pub fn parse_color(s: &str) -> Result<Rgb, DraftError> {
    let bad = || DraftError::BadColor(s.to_string());
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(bad());
    }
    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| bad())?;
    }
    Ok(Rgb::from(rgb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Button;

    #[test]
    fn builds_each_action() {
        let click = StepDraft::new("click").at(3, 4).button("left").build().unwrap();
        assert_eq!(click.step, Step::Click { x: 3, y: 4, button: Button::Left });
        assert!(!click.ambiguous_button);

        let wait = StepDraft::new("wait_pixel").at(1, 2).color("10, 20,30").build().unwrap();
        assert_eq!(wait.step, Step::WaitPixel { x: 1, y: 2, color: Rgb::new(10, 20, 30) });

        let key = StepDraft::new("key_release").key("Key.enter").build().unwrap();
        assert_eq!(key.step, Step::KeyRelease { key: "Key.enter".into() });
    }

    #[test]
    fn flags_ambiguous_button() {
        let built = StepDraft::new("release_click").at(0, 0).button("mid").build().unwrap();
        assert_eq!(built.step, Step::ReleaseClick { x: 0, y: 0, button: Button::Right });
        assert!(built.ambiguous_button);
    }

    #[test]
    fn reports_missing_and_bad_fields() {
        assert_eq!(
            StepDraft::new("click").at(1, 1).build().unwrap_err(),
            DraftError::Missing { action: "click".into(), field: "button" }
        );
        assert_eq!(
            StepDraft::new("move").build().unwrap_err(),
            DraftError::Missing { action: "move".into(), field: "x" }
        );
        assert!(matches!(
            StepDraft::new("wait_pixel").at(1, 1).color("1,2,300").build(),
            Err(DraftError::BadColor(_))
        ));
        assert!(matches!(
            StepDraft::new("key_press").key("hyper").build(),
            Err(DraftError::UnknownKey(_))
        ));
        assert!(matches!(
            StepDraft::new("scroll").build(),
            Err(DraftError::UnknownAction(_))
        ));
    }
}
