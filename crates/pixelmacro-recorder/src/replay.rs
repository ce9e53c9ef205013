//! Macro playback through a synthetic input backend

use crate::cancel::CancelToken;
use crate::config::millis;
use crate::pixel::{wait_for_pixel, PixelSource, WaitError, WaitOptions};
use pixelmacro_core::{Button, KeySpec, Macro, Step};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Press,
    Release,
}

/// Synthetic mouse and keyboard
pub trait InputSink {
    fn move_to(&mut self, x: u32, y: u32) -> Result<(), InputError>;
    fn button(&mut self, button: Button, direction: Direction) -> Result<(), InputError>;
    fn key(&mut self, key: KeySpec, direction: Direction) -> Result<(), InputError>;
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("{0} has no synthetic equivalent on this platform")]
    UnsupportedKey(String),
    #[error("input injection failed: {0}")]
    Backend(String),
}

/// Playback timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pause after every step except pixel waits
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,
    #[serde(rename = "pixel_poll_interval_ms", with = "millis")]
    pub pixel_poll_interval: Duration,
    #[serde(rename = "pixel_timeout_ms", with = "millis")]
    pub pixel_timeout: Duration,
    /// Pause before the first step, to let the user switch windows
    #[serde(rename = "start_delay_ms", with = "millis")]
    pub start_delay: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(200),
            pixel_poll_interval: Duration::from_millis(100),
            pixel_timeout: Duration::from_secs(30),
            start_delay: Duration::ZERO,
        }
    }
}

impl PlaybackConfig {
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            poll_interval: self.pixel_poll_interval,
            timeout: self.pixel_timeout,
        }
    }
}

/// A step that failed without stopping the pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepIssue {
    pub index: usize,
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackReport {
    pub steps_run: usize,
    pub moves: usize,
    pub clicks: usize,
    pub releases: usize,
    pub keys: usize,
    pub waits: usize,
    /// Unresolvable keys, in step order
    pub issues: Vec<StepIssue>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("a macro is already playing")]
    AlreadyPlaying,
    #[error("macro has no steps")]
    EmptyMacro,
    #[error("playback aborted at step {at}: {reason}")]
    Aborted {
        /// First step that did not run
        at: usize,
        reason: AbortReason,
        report: PlaybackReport,
    },
}

#[derive(Debug, Error)]
pub enum AbortReason {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Wait(WaitError),
    #[error(transparent)]
    Input(InputError),
}

impl PlaybackError {
    /// What ran before the abort, if anything did
    pub fn report(&self) -> Option<&PlaybackReport> {
        match self {
            PlaybackError::Aborted { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Plays macros one pass at a time
pub struct Player {
    config: PlaybackConfig,
    active: AtomicBool,
}

/// Clears the active flag however the pass ends
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Player {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run every step of `m` in order.
    ///
    /// A second call while a pass is running is rejected rather than
    /// interleaved. Key steps that cannot be synthesized are recorded in the
    /// report and skipped; a stuck pixel wait, a cancel or a pointer failure
    /// ends the pass.
    pub fn play(
        &self,
        m: &Macro,
        sink: &mut dyn InputSink,
        pixels: &mut dyn PixelSource,
        cancel: &CancelToken,
    ) -> Result<PlaybackReport, PlaybackError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PlaybackError::AlreadyPlaying);
        }
        let _guard = ActiveGuard(&self.active);

        if m.is_empty() {
            return Err(PlaybackError::EmptyMacro);
        }

        let start = Instant::now();
        let mut report = PlaybackReport::default();
        info!(steps = m.len(), "playback started");

        let abort = |at: usize, reason: AbortReason, mut report: PlaybackReport| {
            report.elapsed_ms = start.elapsed().as_millis() as u64;
            let err = PlaybackError::Aborted { at, reason, report };
            warn!("{}", err);
            err
        };

        if !self.config.start_delay.is_zero() && cancel.wait_timeout(self.config.start_delay) {
            return Err(abort(0, AbortReason::Cancelled, report));
        }

        let wait_opts = self.config.wait_options();
        for (index, step) in m.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(abort(index, AbortReason::Cancelled, report));
            }
            debug!(index, %step, "dispatch");

            let result = match step {
                Step::Move { x, y } => sink.move_to(*x, *y).map(|_| report.moves += 1),
                Step::Click { x, y, button } => sink
                    .move_to(*x, *y)
                    .and_then(|_| sink.button(*button, Direction::Press))
                    .map(|_| report.clicks += 1),
                Step::ReleaseClick { x, y, button } => sink
                    .move_to(*x, *y)
                    .and_then(|_| sink.button(*button, Direction::Release))
                    .map(|_| report.releases += 1),
                Step::KeyPress { key } => {
                    self.key(index, key, Direction::Press, sink, &mut report);
                    Ok(())
                }
                Step::KeyRelease { key } => {
                    self.key(index, key, Direction::Release, sink, &mut report);
                    Ok(())
                }
                Step::WaitPixel { x, y, color } => {
                    match wait_for_pixel(pixels, *x, *y, *color, &wait_opts, cancel) {
                        Ok(outcome) => {
                            debug!(index, polls = outcome.polls, "pixel matched");
                            report.waits += 1;
                            report.steps_run += 1;
                            // The wait already blocked; no settle delay
                            continue;
                        }
                        Err(WaitError::Cancelled { .. }) => {
                            return Err(abort(index, AbortReason::Cancelled, report));
                        }
                        Err(e) => return Err(abort(index, AbortReason::Wait(e), report)),
                    }
                }
            };
            if let Err(e) = result {
                return Err(abort(index, AbortReason::Input(e), report));
            }
            report.steps_run += 1;

            if cancel.wait_timeout(self.config.settle_delay) {
                return Err(abort(index + 1, AbortReason::Cancelled, report));
            }
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            steps = report.steps_run,
            issues = report.issues.len(),
            elapsed_ms = report.elapsed_ms,
            "playback finished"
        );
        Ok(report)
    }

    fn key(
        &self,
        index: usize,
        key: &str,
        direction: Direction,
        sink: &mut dyn InputSink,
        report: &mut PlaybackReport,
    ) {
        let outcome = match KeySpec::parse(key) {
            Some(spec) => sink.key(spec, direction).map_err(|e| e.to_string()),
            None => Err(format!("unknown key name {:?}", key)),
        };
        match outcome {
            Ok(()) => report.keys += 1,
            Err(reason) => {
                warn!(index, key, %reason, "skipping key step");
                report.issues.push(StepIssue {
                    index,
                    key: key.to_string(),
                    reason,
                });
            }
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new(PlaybackConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelError;
    use pixelmacro_core::{NamedKey, Rgb};
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Injected {
        Move(u32, u32),
        Button(Button, Direction),
        Key(KeySpec, Direction),
    }

    #[derive(Default)]
    struct Log {
        events: Vec<Injected>,
        reject_named: bool,
    }

    impl InputSink for Log {
        fn move_to(&mut self, x: u32, y: u32) -> Result<(), InputError> {
            self.events.push(Injected::Move(x, y));
            Ok(())
        }
        fn button(&mut self, button: Button, direction: Direction) -> Result<(), InputError> {
            self.events.push(Injected::Button(button, direction));
            Ok(())
        }
        fn key(&mut self, key: KeySpec, direction: Direction) -> Result<(), InputError> {
            if self.reject_named && matches!(key, KeySpec::Named(_)) {
                return Err(InputError::UnsupportedKey(format!("{:?}", key)));
            }
            self.events.push(Injected::Key(key, direction));
            Ok(())
        }
    }

    struct Solid(Rgb);

    impl PixelSource for Solid {
        fn sample(&mut self, _x: u32, _y: u32) -> Result<Rgb, PixelError> {
            Ok(self.0)
        }
    }

    fn fast() -> PlaybackConfig {
        PlaybackConfig {
            settle_delay: Duration::from_millis(1),
            pixel_poll_interval: Duration::from_millis(5),
            pixel_timeout: Duration::from_millis(50),
            start_delay: Duration::ZERO,
        }
    }

    fn key_press(k: &str) -> Step {
        Step::KeyPress { key: k.into() }
    }

    #[test]
    fn click_moves_then_presses() {
        let m: Macro = vec![
            Step::Click { x: 4, y: 5, button: Button::Right },
            Step::ReleaseClick { x: 6, y: 7, button: Button::Right },
        ]
        .into();
        let mut log = Log::default();
        let report = Player::new(fast())
            .play(&m, &mut log, &mut Solid(Rgb::default()), &CancelToken::new())
            .unwrap();
        assert_eq!(
            log.events,
            vec![
                Injected::Move(4, 5),
                Injected::Button(Button::Right, Direction::Press),
                Injected::Move(6, 7),
                Injected::Button(Button::Right, Direction::Release),
            ]
        );
        assert_eq!((report.clicks, report.releases, report.steps_run), (1, 1, 2));
    }

    #[test]
    fn bad_key_is_recorded_and_skipped() {
        let m: Macro = vec![key_press("Key.hyper"), key_press("a"), key_press("esc")].into();
        let mut log = Log {
            reject_named: true,
            ..Default::default()
        };
        let report = Player::new(fast())
            .play(&m, &mut log, &mut Solid(Rgb::default()), &CancelToken::new())
            .unwrap();
        assert_eq!(log.events, vec![Injected::Key(KeySpec::Char('a'), Direction::Press)]);
        assert_eq!(report.steps_run, 3);
        assert_eq!(report.keys, 1);
        let indices: Vec<usize> = report.issues.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(report.issues[1].key, "esc");
    }

    #[test]
    fn resolves_named_keys() {
        let m: Macro = vec![Step::KeyRelease { key: "Key.enter".into() }].into();
        let mut log = Log::default();
        Player::new(fast())
            .play(&m, &mut log, &mut Solid(Rgb::default()), &CancelToken::new())
            .unwrap();
        assert_eq!(
            log.events,
            vec![Injected::Key(KeySpec::Named(NamedKey::Enter), Direction::Release)]
        );
    }

    #[test]
    fn stuck_wait_aborts_remaining_steps() {
        let m: Macro = vec![
            Step::Move { x: 1, y: 1 },
            Step::WaitPixel { x: 3, y: 3, color: Rgb::new(1, 2, 3) },
            Step::Move { x: 2, y: 2 },
        ]
        .into();
        let mut log = Log::default();
        let err = Player::new(fast())
            .play(&m, &mut log, &mut Solid(Rgb::default()), &CancelToken::new())
            .unwrap_err();
        match err {
            PlaybackError::Aborted {
                at,
                reason: AbortReason::Wait(WaitError::StuckWait { x, y, .. }),
                report,
            } => {
                assert_eq!(at, 1);
                assert_eq!((x, y), (3, 3));
                assert_eq!(report.steps_run, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(log.events, vec![Injected::Move(1, 1)]);
    }

    #[test]
    fn matching_wait_continues() {
        let target = Rgb::new(9, 9, 9);
        let m: Macro = vec![
            Step::WaitPixel { x: 0, y: 0, color: target },
            Step::Move { x: 2, y: 2 },
        ]
        .into();
        let mut log = Log::default();
        let report = Player::new(fast())
            .play(&m, &mut log, &mut Solid(target), &CancelToken::new())
            .unwrap();
        assert_eq!(report.waits, 1);
        assert_eq!(log.events, vec![Injected::Move(2, 2)]);
    }

    #[test]
    fn empty_macro_is_rejected_before_side_effects() {
        let player = Player::new(fast());
        let err = player
            .play(
                &Macro::new(),
                &mut Log::default(),
                &mut Solid(Rgb::default()),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PlaybackError::EmptyMacro));
        assert!(!player.is_playing());
    }

    #[test]
    fn cancelled_token_stops_before_first_step() {
        let token = CancelToken::new();
        token.cancel();
        let m: Macro = vec![Step::Move { x: 1, y: 1 }].into();
        let mut log = Log::default();
        let err = Player::new(fast())
            .play(&m, &mut log, &mut Solid(Rgb::default()), &token)
            .unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::Aborted { at: 0, reason: AbortReason::Cancelled, .. }
        ));
        assert!(log.events.is_empty());
    }

    #[test]
    fn second_pass_is_rejected_while_playing() {
        let player = Arc::new(Player::new(PlaybackConfig {
            settle_delay: Duration::from_millis(300),
            ..fast()
        }));
        let m: Macro = vec![Step::Move { x: 1, y: 1 }].into();

        let first = {
            let player = player.clone();
            let m = m.clone();
            thread::spawn(move || {
                let mut pixels = Solid(Rgb::default());
                player.play(&m, &mut Log::default(), &mut pixels, &CancelToken::new())
            })
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while !player.is_playing() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let mut pixels = Solid(Rgb::default());
        let second = player.play(&m, &mut Log::default(), &mut pixels, &CancelToken::new());
        assert!(matches!(second, Err(PlaybackError::AlreadyPlaying)));
        assert!(first.join().unwrap().is_ok());
        assert!(!player.is_playing());
    }
}
