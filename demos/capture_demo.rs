//! Demonstration of the inputtrace capture pipeline.
//!
//! This example shows how to:
//! 1. Build a capture session from configuration
//! 2. Feed synthetic pointer and keyboard events through the injectors
//! 3. Fetch captured data while recording continues
//! 4. Stop the session and read the binary logs back
//!
//! Run with: cargo run --example capture_demo

use std::thread;
use std::time::Duration;

use inputtrace::{
    read_log, CaptureSessionBuilder, InputTraceConfig, KeyEvent, MouseButton, PointerEvent,
    RawInput, Record,
};

fn main() -> anyhow::Result<()> {
    println!("inputtrace - Capture Demo");
    println!("=========================");
    println!();

    let mut config = InputTraceConfig::default();
    config.session.data_dir = "./demo_data".to_string();
    config.pointer.delta_time = Some(0.01);
    config.screen.fps = 10.0;
    config.screen.resolution = (800, 600);
    config.screen.capture_radius = (100, 40);

    let mut session = CaptureSessionBuilder::new(config).build()?;
    let report = session.start()?;
    println!("Started sources: {:?}", report.started);
    println!();

    let pointer = session.pointer_injector().expect("channel source").clone();
    let keyboard = session.keyboard_injector().expect("channel source").clone();

    // Simulate a short burst of user activity.
    for i in 0..50 {
        pointer.inject(RawInput::Move {
            x: 10 * i,
            y: 5 * i,
        });
        if i % 10 == 0 {
            pointer.inject(RawInput::Button {
                x: 10 * i,
                y: 5 * i,
                button: MouseButton::Left,
                pressed: true,
            });
            pointer.inject(RawInput::Button {
                x: 10 * i,
                y: 5 * i,
                button: MouseButton::Left,
                pressed: false,
            });
        }
        keyboard.inject(RawInput::Key {
            code: 30 + (i % 4),
            down: true,
        });
        keyboard.inject(RawInput::Key {
            code: 30 + (i % 4),
            down: false,
        });
        thread::sleep(Duration::from_millis(20));
    }

    // Fetch while capture is still running.
    let live_pointer = session.fetch_pointer().unwrap_or_default();
    println!(
        "Live fetch: {} pointer records buffered so far",
        live_pointer.len() / PointerEvent::SIZE
    );

    thread::sleep(Duration::from_millis(300));
    let failures = session.stop();
    assert!(failures.is_empty(), "stream failures: {:?}", failures);
    println!("Session written to {}", session.dir().display());
    println!();

    // Read the durable logs back.
    let pointer_events: Vec<PointerEvent> = read_log(session.dir().join("pointer.bin"))?;
    let key_events: Vec<KeyEvent> = read_log(session.dir().join("keyboard.bin"))?;
    println!("Recorded {} pointer events", pointer_events.len());
    println!("Recorded {} keyboard events", key_events.len());
    if let Some(first) = pointer_events.first() {
        println!("First pointer event: {:?}", first);
    }

    Ok(())
}
