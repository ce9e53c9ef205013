//! Step model - one tagged variant per recordable action

use crate::error::{Error, Result};
use crate::keys::Button;
use std::fmt;

/// 8-bit RGB colour of a screen pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// A single action in a macro
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Move the pointer to an absolute screen coordinate
    Move { x: u32, y: u32 },
    /// Press a pointer button at a coordinate
    Click { x: u32, y: u32, button: Button },
    /// Release a pointer button at a coordinate
    ReleaseClick { x: u32, y: u32, button: Button },
    /// Press a key: a literal character or a symbolic name
    KeyPress { key: String },
    KeyRelease { key: String },
    /// Block until the pixel at (x, y) has exactly this colour
    WaitPixel { x: u32, y: u32, color: Rgb },
}

impl Step {
    /// Discriminant used in the saved format
    pub fn action(&self) -> &'static str {
        match self {
            Step::Move { .. } => "move",
            Step::Click { .. } => "click",
            Step::ReleaseClick { .. } => "release_click",
            Step::KeyPress { .. } => "key_press",
            Step::KeyRelease { .. } => "key_release",
            Step::WaitPixel { .. } => "wait_pixel",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Step::KeyPress { key } | Step::KeyRelease { key } => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Move { x, y } => write!(f, "move ({}, {})", x, y),
            Step::Click { x, y, button } => write!(f, "click {} ({}, {})", button, x, y),
            Step::ReleaseClick { x, y, button } => {
                write!(f, "release_click {} ({}, {})", button, x, y)
            }
            Step::KeyPress { key } => write!(f, "key_press {:?}", key),
            Step::KeyRelease { key } => write!(f, "key_release {:?}", key),
            Step::WaitPixel { x, y, color } => write!(f, "wait_pixel ({}, {}) {}", x, y, color),
        }
    }
}

/// An ordered list of steps. Order is the only timing information kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Macro {
    steps: Vec<Step>,
}

impl Macro {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Insert before `index`; `index == len` appends
    pub fn insert_step(&mut self, index: usize, step: Step) -> Result<()> {
        if index > self.steps.len() {
            return Err(Error::index_out_of_range(index, self.steps.len()));
        }
        self.steps.insert(index, step);
        Ok(())
    }

    pub fn remove_step(&mut self, index: usize) -> Result<Step> {
        if index >= self.steps.len() {
            return Err(Error::index_out_of_range(index, self.steps.len()));
        }
        Ok(self.steps.remove(index))
    }

    /// Swap the step at `index`, returning the old one
    pub fn replace_step(&mut self, index: usize, step: Step) -> Result<Step> {
        let len = self.steps.len();
        let slot = self
            .steps
            .get_mut(index)
            .ok_or_else(|| Error::index_out_of_range(index, len))?;
        Ok(std::mem::replace(slot, step))
    }

    /// Count of steps per action name, in first-seen order
    pub fn summary(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for step in &self.steps {
            let action = step.action();
            match counts.iter_mut().find(|(a, _)| *a == action) {
                Some((_, n)) => *n += 1,
                None => counts.push((action, 1)),
            }
        }
        counts
    }
}

impl From<Vec<Step>> for Macro {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl FromIterator<Step> for Macro {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Macro {
    type Item = Step;
    type IntoIter = std::vec::IntoIter<Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

impl<'a> IntoIterator for &'a Macro {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
