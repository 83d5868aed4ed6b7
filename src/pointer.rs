use crate::clock::Clock;
use crate::error::{InputTraceError, Result};
use crate::event::{PointerEvent, PointerKind};
use crate::input::{InputSource, MouseButton, RawInput};
use crate::log::{LogWriter, Record};
use crate::region::CursorState;
use crate::ring_buffer::RingBuffer;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Statistics for pointer capture monitoring.
#[derive(Debug, Default)]
pub struct PointerStats {
    /// Events encoded, persisted and buffered.
    pub events_emitted: AtomicU64,
    /// Moves dropped by the debounce policies.
    pub moves_suppressed: AtomicU64,
    /// Native events outside the modeled taxonomy, skipped per-event.
    pub unknown_skipped: AtomicU64,
}

impl PointerStats {
    pub fn snapshot(&self) -> PointerStatsSnapshot {
        PointerStatsSnapshot {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            moves_suppressed: self.moves_suppressed.load(Ordering::Relaxed),
            unknown_skipped: self.unknown_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pointer capture statistics.
#[derive(Debug, Clone, Copy)]
pub struct PointerStatsSnapshot {
    pub events_emitted: u64,
    pub moves_suppressed: u64,
    pub unknown_skipped: u64,
}

/// Pointer capture source.
///
/// Owns one native input listener, one binary log and one fetch buffer.
/// `start()` spawns the dedicated producer thread; `stop()` signals it and
/// joins without a timeout, so every resource is released before `stop()`
/// returns.
pub struct PointerRecorder {
    log_path: PathBuf,
    delta_time: Option<f64>,
    source: Option<Box<dyn InputSource>>,
    clock: Arc<dyn Clock>,
    cursor: Arc<CursorState>,
    buffer: Arc<RingBuffer<Vec<u8>>>,
    stats: Arc<PointerStats>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
    thread: Option<JoinHandle<()>>,
}

impl PointerRecorder {
    /// Create a pointer recorder writing to `log_path`.
    ///
    /// `delta_time` is the minimum interval in seconds between two emitted
    /// moves; `None` records every positional change. `memory_limit`
    /// bounds the fetch buffer only — the log always retains everything.
    pub fn new<P: AsRef<Path>>(
        log_path: P,
        source: Box<dyn InputSource>,
        clock: Arc<dyn Clock>,
        cursor: Arc<CursorState>,
        delta_time: Option<f64>,
        memory_limit: Option<usize>,
    ) -> Self {
        Self {
            log_path: log_path.as_ref().to_path_buf(),
            delta_time,
            source: Some(source),
            clock,
            cursor,
            buffer: Arc::new(RingBuffer::new(memory_limit)),
            stats: Arc::new(PointerStats::default()),
            recording: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
            thread: None,
        }
    }

    /// Open the listener and the log, then start the producer thread.
    pub fn start(&mut self) -> Result<()> {
        if self.recording.load(Ordering::Relaxed) {
            warn!("Pointer recorder already running");
            return Ok(());
        }

        let mut source = self
            .source
            .take()
            .ok_or_else(|| InputTraceError::component("pointer", "recorder already consumed"))?;

        // Listener and sink failures here are fatal startup errors; the
        // producer thread never runs degraded.
        source.open()?;
        let writer = LogWriter::open(&self.log_path)?;

        self.recording.store(true, Ordering::Relaxed);

        let worker = PointerWorker {
            source,
            writer,
            clock: Arc::clone(&self.clock),
            cursor: Arc::clone(&self.cursor),
            buffer: Arc::clone(&self.buffer),
            stats: Arc::clone(&self.stats),
            recording: Arc::clone(&self.recording),
            failure: Arc::clone(&self.failure),
            delta_time: self.delta_time,
            prev_position: None,
            prev_emit_time: f64::NEG_INFINITY,
        };

        self.thread = Some(
            std::thread::Builder::new()
                .name("pointer-capture".into())
                .spawn(move || worker.run())?,
        );

        info!("Pointer recorder started ({})", self.log_path.display());
        Ok(())
    }

    /// Signal the producer loop and join it.
    ///
    /// Returns the I/O failure that stopped the stream mid-capture, if
    /// any. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        self.recording.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Pointer capture thread panicked");
            }
            info!("Pointer recorder stopped");
        }
        match self.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Encoded records accumulated since the previous fetch, concatenated
    /// in emission order.
    pub fn fetch(&self) -> Vec<u8> {
        self.buffer.fetch_and_clear().concat()
    }

    /// Whether the producer thread is currently capturing.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    /// Path of the binary log.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Get current capture statistics.
    pub fn stats(&self) -> PointerStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for PointerRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Pointer recorder failure surfaced on drop: {}", e);
        }
    }
}

struct PointerWorker {
    source: Box<dyn InputSource>,
    writer: LogWriter,
    clock: Arc<dyn Clock>,
    cursor: Arc<CursorState>,
    buffer: Arc<RingBuffer<Vec<u8>>>,
    stats: Arc<PointerStats>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
    delta_time: Option<f64>,
    prev_position: Option<(i16, i16)>,
    prev_emit_time: f64,
}

impl PointerWorker {
    fn run(mut self) {
        debug!("Pointer capture loop started");
        while self.recording.load(Ordering::Relaxed) {
            match self.source.poll(POLL_INTERVAL) {
                Ok(Some(input)) => self.handle(input),
                Ok(None) => {}
                Err(e) => {
                    error!("Pointer listener failed: {}", e);
                    *self.failure.lock() = Some(e);
                    self.recording.store(false, Ordering::Relaxed);
                }
            }
        }
        if let Err(e) = self.writer.close() {
            warn!("Failed to close pointer log: {}", e);
        }
        debug!("Pointer capture loop exited");
    }

    fn handle(&mut self, input: RawInput) {
        match input {
            RawInput::Move { x, y } => self.on_move(x, y),
            RawInput::Button {
                x,
                y,
                button,
                pressed,
            } => self.on_click(x, y, button, pressed),
            RawInput::Scroll { dx, dy, .. } => self.on_scroll(dx, dy),
            RawInput::Key { .. } => {
                // Key notifications belong to the keyboard stream.
                self.stats.unknown_skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn on_move(&mut self, x: i32, y: i32) {
        self.cursor.store(x, y);
        let now = self.clock.now();

        // Moves arriving sooner than delta_time after the last emitted
        // move are dropped outright, not coalesced.
        if let Some(delta_time) = self.delta_time {
            if now - self.prev_emit_time < delta_time {
                self.stats.moves_suppressed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let position = (clamp_i16(x), clamp_i16(y));
        if self.prev_position == Some(position) {
            self.stats.moves_suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.prev_position = Some(position);
        self.prev_emit_time = now;
        self.emit(PointerEvent {
            kind: PointerKind::Move,
            x: position.0,
            y: position.1,
            timestamp: now,
        });
    }

    fn on_click(&mut self, x: i32, y: i32, button: MouseButton, pressed: bool) {
        self.cursor.store(x, y);
        let kind = match (button, pressed) {
            (MouseButton::Left, true) => PointerKind::LeftDown,
            (MouseButton::Left, false) => PointerKind::LeftUp,
            (MouseButton::Right, true) => PointerKind::RightDown,
            (MouseButton::Right, false) => PointerKind::RightUp,
            (MouseButton::Other(code), _) => {
                debug!("Skipping unmodeled pointer button {}", code);
                self.stats.unknown_skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        self.emit(PointerEvent {
            kind,
            x: clamp_i16(x),
            y: clamp_i16(y),
            timestamp: self.clock.now(),
        });
    }

    fn on_scroll(&mut self, dx: i32, dy: i32) {
        self.emit(PointerEvent {
            kind: PointerKind::Scroll,
            x: clamp_i16(dx),
            y: clamp_i16(dy),
            timestamp: self.clock.now(),
        });
    }

    /// Persist and buffer one event. The log and the buffer receive the
    /// same records in the same order; a sink failure stops this stream
    /// before the buffer could diverge.
    fn emit(&mut self, event: PointerEvent) {
        let bytes = event.encode();
        if let Err(e) = self.writer.append(&bytes) {
            error!("Pointer log append failed, stopping stream: {}", e);
            *self.failure.lock() = Some(e);
            self.recording.store(false, Ordering::Relaxed);
            return;
        }
        self.buffer.append(bytes);
        self.stats.events_emitted.fetch_add(1, Ordering::Relaxed);
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
