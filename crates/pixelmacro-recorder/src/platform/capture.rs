//! Global input capture via rdev
//!
//! `rdev::listen` blocks its thread for the life of the process and can only
//! be entered once, so a single listener is shared by every session. Sessions
//! come and go by swapping the sink it delivers to.

use crate::hook::{CaptureError, HookSink, InputHook, KeyboardEvent, PointerEvent};
use enigo::{Enigo, Mouse, Settings};
use parking_lot::Mutex;
use pixelmacro_core::{Button, NamedKey};
use rdev::{Event, EventType, Key};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

type SharedSink = Arc<Mutex<Option<HookSink>>>;
type SharedListener = Arc<Mutex<Listener>>;

pub struct RdevHook {
    sink: SharedSink,
    listener: SharedListener,
}

enum Listener {
    Idle,
    Running,
    Failed(String),
}

static GLOBAL: OnceLock<Arc<RdevHook>> = OnceLock::new();

impl RdevHook {
    /// The process-wide hook
    pub fn global() -> Arc<RdevHook> {
        GLOBAL
            .get_or_init(|| {
                Arc::new(RdevHook {
                    sink: Arc::new(Mutex::new(None)),
                    listener: Arc::new(Mutex::new(Listener::Idle)),
                })
            })
            .clone()
    }

    fn ensure_listening(&self) -> Result<(), CaptureError> {
        let mut state = self.listener.lock();
        match &*state {
            Listener::Running => return Ok(()),
            Listener::Failed(reason) => return Err(CaptureError::Hook(reason.clone())),
            Listener::Idle => {}
        }

        let (err_tx, err_rx) = crossbeam_channel::bounded::<String>(1);
        let sink = self.sink.clone();
        let listener = self.listener.clone();
        thread::Builder::new()
            .name("pixelmacro-rdev".into())
            .spawn(move || {
                let mut translator = Translator::default();
                let events = sink.clone();
                let result = rdev::listen(move |event| {
                    let mut slot = events.lock();
                    let Some(target) = slot.as_ref() else {
                        translator.reset();
                        return;
                    };
                    if !translator.deliver(event, target) {
                        *slot = None;
                    }
                });
                if let Err(e) = result {
                    let reason = format!("{:?}", e);
                    // Unblocks a caller still inside ensure_listening
                    let _ = err_tx.send(reason.clone());
                    listener_stopped(&listener, &sink, reason);
                }
            })
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        // listen() fails fast when permission is missing; otherwise it never returns
        match err_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(reason) => {
                *state = Listener::Failed(reason.clone());
                Err(CaptureError::Hook(reason))
            }
            Err(_) => {
                info!("global input listener running");
                *state = Listener::Running;
                Ok(())
            }
        }
    }
}

/// The listener thread is gone: fail later attaches and end the current
/// session, whose observers would otherwise wait for an Esc that never comes
fn listener_stopped(listener: &Mutex<Listener>, sink: &Mutex<Option<HookSink>>, reason: String) {
    error!(%reason, "global input listener stopped");
    *listener.lock() = Listener::Failed(reason);
    *sink.lock() = None;
}

impl InputHook for RdevHook {
    fn attach(&self, sink: HookSink) -> Result<(), CaptureError> {
        // Install first so events during startup are not lost
        *self.sink.lock() = Some(sink);
        if let Err(e) = self.ensure_listening() {
            *self.sink.lock() = None;
            return Err(e);
        }
        Ok(())
    }

    fn detach(&self, session: u64) {
        let mut slot = self.sink.lock();
        if slot.as_ref().is_some_and(|s| s.session() == session) {
            debug!(session, "hook detached");
            *slot = None;
        }
    }
}

/// Turns rdev events into hook events
#[derive(Default)]
struct Translator {
    last_pos: Option<(f64, f64)>,
    /// Name each held key was recorded under, so the release matches
    held: HashMap<Key, String>,
    locator: Option<Enigo>,
}

impl Translator {
    fn reset(&mut self) {
        self.held.clear();
    }

    /// False once the session is no longer listening
    fn deliver(&mut self, event: Event, sink: &HookSink) -> bool {
        match event.event_type {
            EventType::MouseMove { x, y } => {
                self.last_pos = Some((x, y));
                sink.pointer(PointerEvent::Move { x, y })
            }
            EventType::ButtonPress(b) => match button(b) {
                Some(button) => {
                    let pos = self.position();
                    sink.pointer(PointerEvent::Down { button, pos })
                }
                None => true,
            },
            EventType::ButtonRelease(b) => match button(b) {
                Some(button) => {
                    let pos = self.position();
                    sink.pointer(PointerEvent::Up { button, pos })
                }
                None => true,
            },
            EventType::KeyPress(key) => {
                let name = self
                    .held
                    .entry(key)
                    .or_insert_with(|| key_name(key, event.name.as_deref()))
                    .clone();
                sink.keyboard(KeyboardEvent::Down(name))
            }
            EventType::KeyRelease(key) => {
                let name = self
                    .held
                    .remove(&key)
                    .unwrap_or_else(|| key_name(key, None));
                sink.keyboard(KeyboardEvent::Up(name))
            }
            EventType::Wheel { .. } => true,
        }
    }

    /// rdev button events carry no coordinates; ask the OS, else use the
    /// last move seen
    fn position(&mut self) -> Option<(f64, f64)> {
        if self.locator.is_none() {
            self.locator = Enigo::new(&Settings::default()).ok();
        }
        self.locator
            .as_ref()
            .and_then(|e| e.location().ok())
            .map(|(x, y)| (x as f64, y as f64))
            .or(self.last_pos)
    }
}

/// Middle and extra buttons are not part of a macro
fn button(b: rdev::Button) -> Option<Button> {
    match b {
        rdev::Button::Left => Some(Button::Left),
        rdev::Button::Right => Some(Button::Right),
        _ => None,
    }
}

/// The literal character for printable keys, a symbolic name otherwise
fn key_name(key: Key, typed: Option<&str>) -> String {
    if let Some(named) = named(key) {
        return named.name().to_string();
    }
    if let Some(c) = typed.and_then(single_printable) {
        return c.to_string();
    }
    match fallback_char(key) {
        Some(c) => c.to_string(),
        None => format!("unknown_{:?}", key).to_lowercase(),
    }
}

fn single_printable(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Some(c),
        _ => None,
    }
}

fn named(key: Key) -> Option<NamedKey> {
    let k = match key {
        Key::Escape => NamedKey::Escape,
        Key::Return | Key::KpReturn => NamedKey::Enter,
        Key::Tab => NamedKey::Tab,
        Key::Space => NamedKey::Space,
        Key::Backspace => NamedKey::Backspace,
        Key::Delete => NamedKey::Delete,
        Key::Insert => NamedKey::Insert,
        Key::UpArrow => NamedKey::Up,
        Key::DownArrow => NamedKey::Down,
        Key::LeftArrow => NamedKey::Left,
        Key::RightArrow => NamedKey::Right,
        Key::Home => NamedKey::Home,
        Key::End => NamedKey::End,
        Key::PageUp => NamedKey::PageUp,
        Key::PageDown => NamedKey::PageDown,
        Key::ShiftLeft | Key::ShiftRight => NamedKey::Shift,
        Key::ControlLeft | Key::ControlRight => NamedKey::Control,
        Key::Alt | Key::AltGr => NamedKey::Alt,
        Key::MetaLeft | Key::MetaRight => NamedKey::Meta,
        Key::CapsLock => NamedKey::CapsLock,
        Key::NumLock => NamedKey::NumLock,
        Key::ScrollLock => NamedKey::ScrollLock,
        Key::PrintScreen => NamedKey::PrintScreen,
        Key::Pause => NamedKey::Pause,
        Key::F1 => NamedKey::F1,
        Key::F2 => NamedKey::F2,
        Key::F3 => NamedKey::F3,
        Key::F4 => NamedKey::F4,
        Key::F5 => NamedKey::F5,
        Key::F6 => NamedKey::F6,
        Key::F7 => NamedKey::F7,
        Key::F8 => NamedKey::F8,
        Key::F9 => NamedKey::F9,
        Key::F10 => NamedKey::F10,
        Key::F11 => NamedKey::F11,
        Key::F12 => NamedKey::F12,
        _ => return None,
    };
    Some(k)
}

/// Unshifted US layout, used when the OS gives no typed text
fn fallback_char(key: Key) -> Option<char> {
    let c = match key {
        Key::KeyA => 'a',
        Key::KeyB => 'b',
        Key::KeyC => 'c',
        Key::KeyD => 'd',
        Key::KeyE => 'e',
        Key::KeyF => 'f',
        Key::KeyG => 'g',
        Key::KeyH => 'h',
        Key::KeyI => 'i',
        Key::KeyJ => 'j',
        Key::KeyK => 'k',
        Key::KeyL => 'l',
        Key::KeyM => 'm',
        Key::KeyN => 'n',
        Key::KeyO => 'o',
        Key::KeyP => 'p',
        Key::KeyQ => 'q',
        Key::KeyR => 'r',
        Key::KeyS => 's',
        Key::KeyT => 't',
        Key::KeyU => 'u',
        Key::KeyV => 'v',
        Key::KeyW => 'w',
        Key::KeyX => 'x',
        Key::KeyY => 'y',
        Key::KeyZ => 'z',
        Key::Num0 | Key::Kp0 => '0',
        Key::Num1 | Key::Kp1 => '1',
        Key::Num2 | Key::Kp2 => '2',
        Key::Num3 | Key::Kp3 => '3',
        Key::Num4 | Key::Kp4 => '4',
        Key::Num5 | Key::Kp5 => '5',
        Key::Num6 | Key::Kp6 => '6',
        Key::Num7 | Key::Kp7 => '7',
        Key::Num8 | Key::Kp8 => '8',
        Key::Num9 | Key::Kp9 => '9',
        Key::Minus | Key::KpMinus => '-',
        Key::Equal => '=',
        Key::KpPlus => '+',
        Key::KpMultiply => '*',
        Key::KpDivide | Key::Slash => '/',
        Key::LeftBracket => '[',
        Key::RightBracket => ']',
        Key::SemiColon => ';',
        Key::Quote => '\'',
        Key::BackSlash | Key::IntlBackslash => '\\',
        Key::BackQuote => '`',
        Key::Comma => ',',
        Key::Dot | Key::KpDelete => '.',
        _ => return None,
    };
    Some(c)
}
