//! Synthetic input via enigo
//!
//! enigo's macOS backend holds a `CGEventSource`, which is not `Send`, so
//! the `Enigo` lives on a worker thread of its own and `EnigoInput` talks to
//! it over a channel. The sink can then move to whichever thread plays.

use crate::replay::{Direction, InputError, InputSink};
use crossbeam_channel::{bounded, unbounded, Sender};
use enigo::{Coordinate, Enigo, Key, Keyboard, Mouse, Settings};
use pixelmacro_core::{Button, KeySpec, NamedKey};
use std::thread;
use tracing::debug;

enum Command {
    Move(i32, i32),
    Button(enigo::Button, enigo::Direction),
    Key(Key, enigo::Direction),
}

type Request = (Command, Sender<Result<(), InputError>>);

pub struct EnigoInput {
    tx: Option<Sender<Request>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl EnigoInput {
    pub fn new() -> anyhow::Result<Self> {
        let (tx, rx) = unbounded::<Request>();
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let worker = thread::Builder::new()
            .name("pixelmacro-enigo".into())
            .spawn(move || {
                let mut enigo = match Enigo::new(&Settings::default()) {
                    Ok(e) => {
                        let _ = ready_tx.send(Ok(()));
                        e
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:?}", e)));
                        return;
                    }
                };
                for (cmd, reply) in rx.iter() {
                    let _ = reply.send(run(&mut enigo, cmd));
                }
                debug!("input worker stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx: Some(tx),
                worker: Some(worker),
            }),
            Ok(Err(reason)) => {
                Err(anyhow::anyhow!("Failed to create input controller: {}", reason))
            }
            Err(_) => Err(anyhow::anyhow!("input worker exited during startup")),
        }
    }

    fn send(&self, cmd: Command) -> Result<(), InputError> {
        let gone = || InputError::Backend("input worker is not running".into());
        let tx = self.tx.as_ref().ok_or_else(gone)?;
        let (reply_tx, reply_rx) = bounded(1);
        tx.send((cmd, reply_tx)).map_err(|_| gone())?;
        reply_rx.recv().map_err(|_| gone())?
    }
}

impl Drop for EnigoInput {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(enigo: &mut Enigo, cmd: Command) -> Result<(), InputError> {
    match cmd {
        Command::Move(x, y) => enigo.move_mouse(x, y, Coordinate::Abs),
        Command::Button(b, d) => enigo.button(b, d),
        Command::Key(k, d) => enigo.key(k, d),
    }
    .map_err(backend)
}

fn direction(d: Direction) -> enigo::Direction {
    match d {
        Direction::Press => enigo::Direction::Press,
        Direction::Release => enigo::Direction::Release,
    }
}

fn backend(e: enigo::InputError) -> InputError {
    InputError::Backend(format!("{:?}", e))
}

impl InputSink for EnigoInput {
    fn move_to(&mut self, x: u32, y: u32) -> Result<(), InputError> {
        let range = |axis: &str, v: u32| {
            InputError::Backend(format!("{} {} out of range", axis, v))
        };
        let x = i32::try_from(x).map_err(|_| range("x", x))?;
        let y = i32::try_from(y).map_err(|_| range("y", y))?;
        self.send(Command::Move(x, y))
    }

    fn button(&mut self, button: Button, d: Direction) -> Result<(), InputError> {
        let b = match button {
            Button::Left => enigo::Button::Left,
            Button::Right => enigo::Button::Right,
        };
        self.send(Command::Button(b, direction(d)))
    }

    fn key(&mut self, key: KeySpec, d: Direction) -> Result<(), InputError> {
        let k = match key {
            KeySpec::Char(c) => Key::Unicode(c),
            KeySpec::Named(n) => {
                named(n).ok_or_else(|| InputError::UnsupportedKey(n.name().to_string()))?
            }
        };
        self.send(Command::Key(k, direction(d)))
    }
}

fn named(n: NamedKey) -> Option<Key> {
    let k = match n {
        NamedKey::Escape => Key::Escape,
        NamedKey::Enter => Key::Return,
        NamedKey::Tab => Key::Tab,
        NamedKey::Space => Key::Space,
        NamedKey::Backspace => Key::Backspace,
        NamedKey::Delete => Key::Delete,
        NamedKey::Up => Key::UpArrow,
        NamedKey::Down => Key::DownArrow,
        NamedKey::Left => Key::LeftArrow,
        NamedKey::Right => Key::RightArrow,
        NamedKey::Home => Key::Home,
        NamedKey::End => Key::End,
        NamedKey::PageUp => Key::PageUp,
        NamedKey::PageDown => Key::PageDown,
        NamedKey::Shift => Key::Shift,
        NamedKey::Control => Key::Control,
        NamedKey::Alt => Key::Alt,
        NamedKey::Meta => Key::Meta,
        NamedKey::CapsLock => Key::CapsLock,
        NamedKey::F1 => Key::F1,
        NamedKey::F2 => Key::F2,
        NamedKey::F3 => Key::F3,
        NamedKey::F4 => Key::F4,
        NamedKey::F5 => Key::F5,
        NamedKey::F6 => Key::F6,
        NamedKey::F7 => Key::F7,
        NamedKey::F8 => Key::F8,
        NamedKey::F9 => Key::F9,
        NamedKey::F10 => Key::F10,
        NamedKey::F11 => Key::F11,
        NamedKey::F12 => Key::F12,
        NamedKey::Insert
        | NamedKey::NumLock
        | NamedKey::ScrollLock
        | NamedKey::PrintScreen
        | NamedKey::Pause => return raw(n).map(Key::Other),
    };
    Some(k)
}

/// Virtual-key codes for keys enigo has no portable variant for
#[cfg(target_os = "windows")]
fn raw(n: NamedKey) -> Option<u32> {
    match n {
        NamedKey::Insert => Some(0x2D),
        NamedKey::NumLock => Some(0x90),
        NamedKey::ScrollLock => Some(0x91),
        NamedKey::PrintScreen => Some(0x2C),
        NamedKey::Pause => Some(0x13),
        _ => None,
    }
}

/// X11 keysyms
#[cfg(all(unix, not(target_os = "macos")))]
fn raw(n: NamedKey) -> Option<u32> {
    match n {
        NamedKey::Insert => Some(0xff63),
        NamedKey::NumLock => Some(0xff7f),
        NamedKey::ScrollLock => Some(0xff14),
        NamedKey::PrintScreen => Some(0xff61),
        NamedKey::Pause => Some(0xff13),
        _ => None,
    }
}

/// Mac keyboards have none of these
#[cfg(target_os = "macos")]
fn raw(_: NamedKey) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_keys_have_a_mapping() {
        for n in [NamedKey::Escape, NamedKey::Enter, NamedKey::F12, NamedKey::Meta] {
            assert!(named(n).is_some(), "{}", n);
        }
    }

    #[test]
    fn sink_can_move_to_the_playback_thread() {
        fn assert_send<T: Send>() {}
        assert_send::<EnigoInput>();
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn pc_only_keys_are_unsupported_on_mac() {
        assert!(named(NamedKey::PrintScreen).is_none());
    }
}
