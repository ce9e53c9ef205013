//! Key and button vocabulary shared by capture and playback
//!
//! Keys are stored in macros as plain strings: the literal character for
//! printable keys, a symbolic name for everything else. This module is the
//! closed set those strings must resolve to.

use std::fmt;

/// Non-printable keys that playback knows how to synthesize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Escape,
    Enter,
    Tab,
    Space,
    Backspace,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Shift,
    Control,
    Alt,
    Meta,
    CapsLock,
    NumLock,
    ScrollLock,
    PrintScreen,
    Pause,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

impl NamedKey {
    /// Canonical name written into captured macros
    pub fn name(self) -> &'static str {
        match self {
            NamedKey::Escape => "esc",
            NamedKey::Enter => "enter",
            NamedKey::Tab => "tab",
            NamedKey::Space => "space",
            NamedKey::Backspace => "backspace",
            NamedKey::Delete => "delete",
            NamedKey::Insert => "insert",
            NamedKey::Up => "up",
            NamedKey::Down => "down",
            NamedKey::Left => "left",
            NamedKey::Right => "right",
            NamedKey::Home => "home",
            NamedKey::End => "end",
            NamedKey::PageUp => "page_up",
            NamedKey::PageDown => "page_down",
            NamedKey::Shift => "shift",
            NamedKey::Control => "ctrl",
            NamedKey::Alt => "alt",
            NamedKey::Meta => "cmd",
            NamedKey::CapsLock => "caps_lock",
            NamedKey::NumLock => "num_lock",
            NamedKey::ScrollLock => "scroll_lock",
            NamedKey::PrintScreen => "print_screen",
            NamedKey::Pause => "pause",
            NamedKey::F1 => "f1",
            NamedKey::F2 => "f2",
            NamedKey::F3 => "f3",
            NamedKey::F4 => "f4",
            NamedKey::F5 => "f5",
            NamedKey::F6 => "f6",
            NamedKey::F7 => "f7",
            NamedKey::F8 => "f8",
            NamedKey::F9 => "f9",
            NamedKey::F10 => "f10",
            NamedKey::F11 => "f11",
            NamedKey::F12 => "f12",
        }
    }

    /// Parse a symbolic key name.
    ///
    /// Case-insensitive, accepts common aliases and the `Key.` prefix found
    /// in older saved macros (`Key.shift_r`, `Key.page_down`).
    pub fn from_name(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let bare = lower.strip_prefix("key.").unwrap_or(&lower);
        // Left/right variants of modifiers collapse onto the generic key
        let bare = bare
            .strip_suffix("_l")
            .or_else(|| bare.strip_suffix("_r"))
            .filter(|b| matches!(*b, "shift" | "ctrl" | "alt" | "cmd" | "alt_gr"))
            .unwrap_or(bare);

        let key = match bare {
            "esc" | "escape" => NamedKey::Escape,
            "enter" | "return" => NamedKey::Enter,
            "tab" => NamedKey::Tab,
            "space" => NamedKey::Space,
            "backspace" | "bs" => NamedKey::Backspace,
            "delete" | "del" => NamedKey::Delete,
            "insert" | "ins" => NamedKey::Insert,
            "up" => NamedKey::Up,
            "down" => NamedKey::Down,
            "left" => NamedKey::Left,
            "right" => NamedKey::Right,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "page_up" | "pageup" | "pgup" => NamedKey::PageUp,
            "page_down" | "pagedown" | "pgdn" => NamedKey::PageDown,
            "shift" => NamedKey::Shift,
            "ctrl" | "control" => NamedKey::Control,
            "alt" | "alt_gr" | "option" => NamedKey::Alt,
            "cmd" | "command" | "meta" | "win" | "super" => NamedKey::Meta,
            "caps_lock" | "capslock" => NamedKey::CapsLock,
            "num_lock" | "numlock" => NamedKey::NumLock,
            "scroll_lock" | "scrolllock" => NamedKey::ScrollLock,
            "print_screen" | "printscreen" | "prtsc" => NamedKey::PrintScreen,
            "pause" => NamedKey::Pause,
            "f1" => NamedKey::F1,
            "f2" => NamedKey::F2,
            "f3" => NamedKey::F3,
            "f4" => NamedKey::F4,
            "f5" => NamedKey::F5,
            "f6" => NamedKey::F6,
            "f7" => NamedKey::F7,
            "f8" => NamedKey::F8,
            "f9" => NamedKey::F9,
            "f10" => NamedKey::F10,
            "f11" => NamedKey::F11,
            "f12" => NamedKey::F12,
            _ => return None,
        };
        Some(key)
    }
}

impl fmt::Display for NamedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A key name resolved against the closed vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpec {
    Char(char),
    Named(NamedKey),
}

impl KeySpec {
    /// Resolve a stored key string. A single character is always a literal,
    /// so `"a"` and `" "` are characters while `"space"` is the named key.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (None, _) => None,
            (Some(c), None) if !c.is_control() => Some(KeySpec::Char(c)),
            _ => NamedKey::from_name(s).map(KeySpec::Named),
        }
    }

    pub fn is_escape(&self) -> bool {
        matches!(self, KeySpec::Named(NamedKey::Escape))
    }
}

/// Pointer buttons a macro can press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    Right,
}

impl Button {
    /// Label written into saved macros. Matches what older files contain.
    pub fn label(self) -> &'static str {
        match self {
            Button::Left => "Button.left",
            Button::Right => "Button.right",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Left => f.write_str("left"),
            Button::Right => f.write_str("right"),
        }
    }
}

/// Outcome of resolving a stored button string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonResolution {
    pub button: Button,
    /// Set when the string was not one of the known labels and the permissive
    /// fallback decided the button
    pub ambiguous: bool,
}

/// Resolve a button string.
///
/// Anything containing `left` is the left button; everything else is the
/// right button. Saved macros depend on this, so it stays permissive, but a
/// string that is not a clean label is flagged as ambiguous.
pub fn resolve_button(s: &str) -> ButtonResolution {
    let button = if s.contains("left") {
        Button::Left
    } else {
        Button::Right
    };
    let clean = matches!(s, "left" | "right" | "Button.left" | "Button.right");
    ButtonResolution {
        button,
        ambiguous: !clean,
    }
}
