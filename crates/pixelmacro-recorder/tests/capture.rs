use parking_lot::Mutex;
use pixelmacro_core::{format, Button, Step};
use pixelmacro_recorder::{
    KeyboardEvent, ManualHook, PointerEvent, Recorder, RecorderConfig, SharedMacro,
};
use std::sync::Arc;
use std::thread;

#[test]
fn interleaved_streams_keep_delivery_order() {
    let hook = Arc::new(ManualHook::new());
    let recorder = Recorder::new(hook.clone());
    let target = SharedMacro::default();
    let handle = recorder.start(target.clone()).unwrap();

    // Each producer holds the log lock across its delivery, so the log is the
    // true delivery order
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let pointer = {
        let (hook, delivered) = (hook.clone(), delivered.clone());
        thread::spawn(move || {
            for i in 0..200u32 {
                let mut log = delivered.lock();
                hook.pointer(PointerEvent::Move { x: i as f64, y: 0.0 });
                log.push(Step::Move { x: i, y: 0 });
            }
        })
    };
    let keyboard = {
        let (hook, delivered) = (hook.clone(), delivered.clone());
        thread::spawn(move || {
            for i in 0..200u32 {
                let key = char::from(b'a' + (i % 26) as u8).to_string();
                let mut log = delivered.lock();
                hook.keyboard(KeyboardEvent::Down(key.clone()));
                log.push(Step::KeyPress { key });
            }
        })
    };
    pointer.join().unwrap();
    keyboard.join().unwrap();
    hook.keyboard(KeyboardEvent::Down("Key.esc".into()));

    let recorded = handle.wait().unwrap();
    assert_eq!(recorded.len(), 400);
    assert_eq!(recorded.steps(), delivered.lock().as_slice());
    assert_eq!(*target.read(), recorded);
}

#[test]
fn recorded_macro_survives_a_save_round_trip() {
    let hook = Arc::new(ManualHook::new());
    let recorder = Recorder::with_config(hook.clone(), RecorderConfig::default());
    let handle = recorder.start(SharedMacro::default()).unwrap();

    hook.pointer(PointerEvent::Move { x: 10.0, y: 20.0 });
    hook.pointer(PointerEvent::Down { button: Button::Right, pos: Some((10.0, 20.0)) });
    hook.pointer(PointerEvent::Up { button: Button::Right, pos: Some((10.0, 20.0)) });
    hook.keyboard(KeyboardEvent::Down("f5".into()));
    hook.keyboard(KeyboardEvent::Up("f5".into()));
    hook.keyboard(KeyboardEvent::Down("esc".into()));
    let recorded = handle.wait().unwrap();

    let text = format::serialize(&recorded);
    assert!(text.contains("\"Button.right\""));
    assert_eq!(format::deserialize(text.as_bytes()).unwrap(), recorded);
}

#[test]
fn idempotent_start_leaves_one_session() {
    let hook = Arc::new(ManualHook::new());
    let recorder = Recorder::new(hook.clone());
    let target = SharedMacro::default();

    let first = recorder.start(target.clone()).unwrap();
    for _ in 0..3 {
        assert!(recorder.start(target.clone()).is_err());
    }
    assert_eq!(hook.attach_count(), 1);

    hook.keyboard(KeyboardEvent::Down("q".into()));
    let recorded = first.stop().unwrap();
    assert_eq!(recorded.steps(), &[Step::KeyPress { key: "q".into() }]);
    assert!(!recorder.is_recording());
}
