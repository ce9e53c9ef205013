use pixelmacro_core::{format, Button, KeySpec, Rgb};
use pixelmacro_recorder::{
    CancelToken, Direction, InputError, InputSink, PixelError, PixelSource, PlaybackConfig,
    PlaybackError, Player,
};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Move(u32, u32),
    Button(Button, Direction),
    Key(KeySpec, Direction),
}

/// Records every injected call with the time it arrived
#[derive(Default)]
struct Recording {
    calls: Vec<(Instant, Call)>,
}

impl Recording {
    fn calls(&self) -> Vec<Call> {
        self.calls.iter().map(|(_, c)| c.clone()).collect()
    }
}

impl InputSink for Recording {
    fn move_to(&mut self, x: u32, y: u32) -> Result<(), InputError> {
        self.calls.push((Instant::now(), Call::Move(x, y)));
        Ok(())
    }
    fn button(&mut self, button: Button, d: Direction) -> Result<(), InputError> {
        self.calls.push((Instant::now(), Call::Button(button, d)));
        Ok(())
    }
    fn key(&mut self, key: KeySpec, d: Direction) -> Result<(), InputError> {
        self.calls.push((Instant::now(), Call::Key(key, d)));
        Ok(())
    }
}

/// Black until `after` samples, then `color`
struct Appears {
    after: usize,
    color: Rgb,
    samples: usize,
}

impl PixelSource for Appears {
    fn sample(&mut self, _x: u32, _y: u32) -> Result<Rgb, PixelError> {
        self.samples += 1;
        Ok(if self.samples > self.after { self.color } else { Rgb::new(0, 0, 0) })
    }
}

fn never() -> Appears {
    Appears { after: usize::MAX, color: Rgb::new(0, 0, 0), samples: 0 }
}

fn config(settle_ms: u64) -> PlaybackConfig {
    PlaybackConfig {
        settle_delay: Duration::from_millis(settle_ms),
        pixel_poll_interval: Duration::from_millis(10),
        pixel_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

#[test]
fn loaded_click_plays_in_order_with_settle_delay() {
    let json = r#"[
        {"action": "move", "params": {"x": 10, "y": 20}},
        {"action": "click", "params": {"x": 10, "y": 20, "button": "Button.left"}},
        {"action": "release_click", "params": {"x": 10, "y": 20, "button": "Button.left"}}
    ]"#;
    let m = format::deserialize(json.as_bytes()).unwrap();

    let mut sink = Recording::default();
    let player = Player::new(config(60));
    let report = player
        .play(&m, &mut sink, &mut never(), &CancelToken::new())
        .unwrap();

    assert_eq!(
        sink.calls(),
        vec![
            Call::Move(10, 20),
            Call::Move(10, 20),
            Call::Button(Button::Left, Direction::Press),
            Call::Move(10, 20),
            Call::Button(Button::Left, Direction::Release),
        ]
    );
    assert_eq!((report.moves, report.clicks, report.releases), (1, 1, 1));

    // Press follows the first move by one settle delay, release the press
    let t: Vec<Instant> = sink.calls.iter().map(|(t, _)| *t).collect();
    assert!(t[2] - t[0] >= Duration::from_millis(60));
    assert!(t[4] - t[2] >= Duration::from_millis(60));
}

#[test]
fn wait_pixel_gates_the_next_step() {
    let json = r#"[
        {"action": "wait_pixel", "params": {"x": 5, "y": 5, "color": [0, 200, 0]}},
        {"action": "key_press", "params": {"key": "enter"}},
        {"action": "key_release", "params": {"key": "Key.enter"}}
    ]"#;
    let m = format::deserialize(json.as_bytes()).unwrap();
    let mut pixels = Appears { after: 3, color: Rgb::new(0, 200, 0), samples: 0 };
    let mut sink = Recording::default();

    let report = Player::new(config(0))
        .play(&m, &mut sink, &mut pixels, &CancelToken::new())
        .unwrap();
    assert_eq!(pixels.samples, 4);
    assert_eq!(report.waits, 1);
    assert_eq!(report.keys, 2);
    assert!(report.issues.is_empty());
}

#[test]
fn stuck_wait_aborts_the_rest_of_the_macro() {
    let json = r#"[
        {"action": "key_press", "params": {"key": "a"}},
        {"action": "wait_pixel", "params": {"x": 1, "y": 2, "color": [255, 255, 255]}},
        {"action": "key_release", "params": {"key": "a"}}
    ]"#;
    let m = format::deserialize(json.as_bytes()).unwrap();
    let mut sink = Recording::default();

    let start = Instant::now();
    let err = Player::new(config(0))
        .play(&m, &mut sink, &mut never(), &CancelToken::new())
        .unwrap_err();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(500 + 10 + 250), "{:?}", elapsed);

    match err {
        PlaybackError::Aborted { at, report, .. } => {
            assert_eq!(at, 1);
            assert_eq!(report.steps_run, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(sink.calls(), vec![Call::Key(KeySpec::Char('a'), Direction::Press)]);
}

#[test]
fn cancel_from_another_thread_stops_a_long_wait() {
    let json = r#"[{"action": "wait_pixel", "params": {"x": 0, "y": 0, "color": [1, 1, 1]}}]"#;
    let m = format::deserialize(json.as_bytes()).unwrap();
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        trigger.cancel();
    });

    let player = Player::new(PlaybackConfig {
        pixel_timeout: Duration::from_secs(60),
        ..config(0)
    });
    let start = Instant::now();
    let err = player
        .play(&m, &mut Recording::default(), &mut never(), &cancel)
        .unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, PlaybackError::Aborted { at: 0, .. }));
    assert!(!player.is_playing());
    t.join().unwrap();
}
