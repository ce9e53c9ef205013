//! Pixel synchronizer - block until a screen pixel shows a colour

use crate::cancel::CancelToken;
use pixelmacro_core::Rgb;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Something that can read the colour of a screen coordinate
pub trait PixelSource {
    fn sample(&mut self, x: u32, y: u32) -> Result<Rgb, PixelError>;
}

#[derive(Debug, Error)]
pub enum PixelError {
    #[error("no monitor contains ({x}, {y})")]
    OutOfBounds { x: u32, y: u32 },
    #[error("screen capture failed: {0}")]
    Capture(String),
}

/// Poll cadence and upper bound for a pixel wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("pixel ({x}, {y}) did not become {expected} within {timeout:?} (last seen {last_seen})")]
    StuckWait {
        x: u32,
        y: u32,
        expected: Rgb,
        last_seen: Rgb,
        timeout: Duration,
    },
    #[error("wait for pixel ({x}, {y}) was cancelled")]
    Cancelled { x: u32, y: u32 },
    #[error(transparent)]
    Sample(#[from] PixelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Samples taken, including the matching one
    pub polls: u32,
    pub waited: Duration,
}

/// Sample (x, y) until it equals `target` exactly.
///
/// A match on the first sample returns without sleeping. Otherwise the pixel
/// is resampled every `poll_interval` until the timeout passes or `cancel`
/// trips; the last sleep is shortened so the call returns within one poll
/// interval of the timeout.
pub fn wait_for_pixel(
    source: &mut dyn PixelSource,
    x: u32,
    y: u32,
    target: Rgb,
    opts: &WaitOptions,
    cancel: &CancelToken,
) -> Result<WaitOutcome, WaitError> {
    let start = Instant::now();
    let mut polls = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled { x, y });
        }
        let seen = source.sample(x, y)?;
        polls += 1;
        if seen == target {
            return Ok(WaitOutcome {
                polls,
                waited: start.elapsed(),
            });
        }

        let elapsed = start.elapsed();
        if elapsed >= opts.timeout {
            return Err(WaitError::StuckWait {
                x,
                y,
                expected: target,
                last_seen: seen,
                timeout: opts.timeout,
            });
        }
        if polls == 1 {
            debug!(x, y, %seen, %target, "waiting for pixel");
        }

        let nap = opts.poll_interval.min(opts.timeout - elapsed);
        if cancel.wait_timeout(nap) {
            return Err(WaitError::Cancelled { x, y });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Returns `colors` in order, then repeats the last one
    struct Scripted {
        colors: Vec<Rgb>,
        calls: usize,
    }

    impl Scripted {
        fn new(colors: Vec<Rgb>) -> Self {
            Self { colors, calls: 0 }
        }
    }

    impl PixelSource for Scripted {
        fn sample(&mut self, _x: u32, _y: u32) -> Result<Rgb, PixelError> {
            let i = self.calls.min(self.colors.len() - 1);
            self.calls += 1;
            Ok(self.colors[i])
        }
    }

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLACK: Rgb = Rgb::new(0, 0, 0);

    fn opts(poll_ms: u64, timeout_ms: u64) -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_millis(poll_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn immediate_match_does_not_sleep() {
        let mut src = Scripted::new(vec![RED]);
        let start = Instant::now();
        let out =
            wait_for_pixel(&mut src, 1, 1, RED, &opts(1000, 5000), &CancelToken::new()).unwrap();
        assert_eq!(out.polls, 1);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn polls_until_colour_appears() {
        let mut src = Scripted::new(vec![BLACK, BLACK, RED]);
        let out =
            wait_for_pixel(&mut src, 1, 1, RED, &opts(10, 5000), &CancelToken::new()).unwrap();
        assert_eq!(out.polls, 3);
        assert!(out.waited >= Duration::from_millis(20));
    }

    #[test]
    fn times_out_within_one_poll_interval() {
        let mut src = Scripted::new(vec![BLACK]);
        let start = Instant::now();
        let err =
            wait_for_pixel(&mut src, 7, 9, RED, &opts(100, 500), &CancelToken::new()).unwrap_err();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500 + 100 + 150), "{:?}", elapsed);
        match err {
            WaitError::StuckWait { x, y, expected, last_seen, .. } => {
                assert_eq!((x, y), (7, 9));
                assert_eq!(expected, RED);
                assert_eq!(last_seen, BLACK);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cancel_interrupts_the_poll_sleep() {
        let mut src = Scripted::new(vec![BLACK]);
        let token = CancelToken::new();
        let other = token.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            other.cancel();
        });
        let start = Instant::now();
        let err = wait_for_pixel(&mut src, 0, 0, RED, &opts(10_000, 60_000), &token).unwrap_err();
        assert!(matches!(err, WaitError::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn sample_failure_propagates() {
        struct Broken;
        impl PixelSource for Broken {
            fn sample(&mut self, x: u32, y: u32) -> Result<Rgb, PixelError> {
                Err(PixelError::OutOfBounds { x, y })
            }
        }
        let cancel = CancelToken::new();
        let err = wait_for_pixel(&mut Broken, 1, 2, RED, &opts(10, 100), &cancel).unwrap_err();
        assert!(matches!(err, WaitError::Sample(PixelError::OutOfBounds { x: 1, y: 2 })));
    }
}
