use super::{InputSource, MouseButton, RawInput};
use crate::error::{InputTraceError, Result};
use evdev::{Device, EventType, InputEventKind, Key, RelativeAxisType};
use std::collections::VecDeque;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// evdev-backed input source for Linux.
///
/// Reads one `/dev/input/event*` device, accumulating relative motion
/// into an absolute cursor position clamped to the screen bounds. Key
/// repeat notifications (value 2) are dropped here; press de-duplication
/// across devices still happens in the keyboard recorder.
pub struct EvdevSource {
    device_path: String,
    screen: (i32, i32),
    device: Option<Device>,
    cursor: (i32, i32),
    pending_move: Option<(i32, i32)>,
    queue: VecDeque<RawInput>,
}

impl EvdevSource {
    pub fn new<S: Into<String>>(device_path: S, screen_width: u32, screen_height: u32) -> Self {
        Self {
            device_path: device_path.into(),
            screen: (screen_width as i32, screen_height as i32),
            device: None,
            cursor: (screen_width as i32 / 2, screen_height as i32 / 2),
            pending_move: None,
            queue: VecDeque::new(),
        }
    }

    fn apply_relative(&mut self, axis: RelativeAxisType, value: i32) {
        match axis {
            RelativeAxisType::REL_X => {
                self.cursor.0 = (self.cursor.0 + value).clamp(0, self.screen.0 - 1);
                self.pending_move = Some(self.cursor);
            }
            RelativeAxisType::REL_Y => {
                self.cursor.1 = (self.cursor.1 + value).clamp(0, self.screen.1 - 1);
                self.pending_move = Some(self.cursor);
            }
            RelativeAxisType::REL_WHEEL => self.queue.push_back(RawInput::Scroll {
                x: self.cursor.0,
                y: self.cursor.1,
                dx: 0,
                dy: value,
            }),
            RelativeAxisType::REL_HWHEEL => self.queue.push_back(RawInput::Scroll {
                x: self.cursor.0,
                y: self.cursor.1,
                dx: value,
                dy: 0,
            }),
            _ => {}
        }
    }

    fn apply_key(&mut self, key: Key, value: i32) {
        // Value 2 is autorepeat while held.
        if value == 2 {
            return;
        }
        let pressed = value == 1;
        match key {
            Key::BTN_LEFT => self.queue.push_back(RawInput::Button {
                x: self.cursor.0,
                y: self.cursor.1,
                button: MouseButton::Left,
                pressed,
            }),
            Key::BTN_RIGHT => self.queue.push_back(RawInput::Button {
                x: self.cursor.0,
                y: self.cursor.1,
                button: MouseButton::Right,
                pressed,
            }),
            Key::BTN_MIDDLE | Key::BTN_SIDE | Key::BTN_EXTRA => {
                self.queue.push_back(RawInput::Button {
                    x: self.cursor.0,
                    y: self.cursor.1,
                    button: MouseButton::Other(key.code()),
                    pressed,
                })
            }
            key => self.queue.push_back(RawInput::Key {
                code: key.code() as i32,
                down: pressed,
            }),
        }
    }

    fn flush_pending_move(&mut self) {
        if let Some((x, y)) = self.pending_move.take() {
            self.queue.push_back(RawInput::Move { x, y });
        }
    }

    fn drain_device(&mut self) -> Result<()> {
        let device = self.device.as_mut().ok_or_else(|| {
            InputTraceError::component("evdev_input", "poll before open")
        })?;

        match device.fetch_events() {
            Ok(events) => {
                let batch: Vec<_> = events.collect();
                for event in batch {
                    match event.kind() {
                        InputEventKind::RelAxis(axis) => self.apply_relative(axis, event.value()),
                        InputEventKind::Key(key) => self.apply_key(key, event.value()),
                        // One hardware report is complete; emit at most one
                        // move per report.
                        InputEventKind::Synchronization(_) => self.flush_pending_move(),
                        _ => {}
                    }
                }
                self.flush_pending_move();
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl InputSource for EvdevSource {
    fn name(&self) -> &str {
        &self.device_path
    }

    fn open(&mut self) -> Result<()> {
        let device = Device::open(&self.device_path).map_err(|e| {
            InputTraceError::startup(
                self.device_path.clone(),
                format!("failed to open input device: {}", e),
            )
        })?;

        let supported = device.supported_events();
        if !supported.contains(EventType::KEY) && !supported.contains(EventType::RELATIVE) {
            return Err(InputTraceError::startup(
                self.device_path.clone(),
                "device reports neither key nor relative events".to_string(),
            ));
        }

        // Non-blocking reads so the producer loop can observe its stop flag.
        let fd = device.as_raw_fd();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            warn!(
                "Failed to set {} non-blocking; stop latency may suffer",
                self.device_path
            );
        }

        info!(
            "Opened evdev input device {} ({})",
            self.device_path,
            device.name().unwrap_or("unnamed")
        );
        self.device = Some(device);
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<RawInput>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(input) = self.queue.pop_front() {
                return Ok(Some(input));
            }
            self.drain_device()?;
            if self.queue.is_empty() {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

impl std::fmt::Debug for EvdevSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevSource")
            .field("device_path", &self.device_path)
            .field("screen", &self.screen)
            .field("open", &self.device.is_some())
            .finish()
    }
}
