use crate::clock::Clock;
use crate::error::{InputTraceError, Result};
use crate::event::{KeyEvent, KeyKind};
use crate::input::{InputSource, RawInput};
use crate::log::{LogWriter, Record};
use crate::ring_buffer::RingBuffer;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Statistics for keyboard capture monitoring.
#[derive(Debug, Default)]
pub struct KeyboardStats {
    /// Events encoded, persisted and buffered.
    pub events_emitted: AtomicU64,
    /// Repeat-fired downs and unmatched releases, dropped by the press
    /// state machine.
    pub events_suppressed: AtomicU64,
    /// Notifications outside the modeled taxonomy, skipped per-event.
    pub unknown_skipped: AtomicU64,
}

impl KeyboardStats {
    pub fn snapshot(&self) -> KeyboardStatsSnapshot {
        KeyboardStatsSnapshot {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_suppressed: self.events_suppressed.load(Ordering::Relaxed),
            unknown_skipped: self.unknown_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of keyboard capture statistics.
#[derive(Debug, Clone, Copy)]
pub struct KeyboardStatsSnapshot {
    pub events_emitted: u64,
    pub events_suppressed: u64,
    pub unknown_skipped: u64,
}

/// Keyboard capture source.
///
/// Models physical press/release semantics over an OS layer that may
/// repeat-fire "down" while a key is held: per key the only legal
/// transitions are Up → press → Down → release → Up, and anything else
/// (duplicate press, release with no matching press) emits nothing.
pub struct KeyboardRecorder {
    log_path: PathBuf,
    source: Option<Box<dyn InputSource>>,
    clock: Arc<dyn Clock>,
    buffer: Arc<RingBuffer<Vec<u8>>>,
    stats: Arc<KeyboardStats>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
    thread: Option<JoinHandle<()>>,
}

impl KeyboardRecorder {
    /// Create a keyboard recorder writing to `log_path`.
    pub fn new<P: AsRef<Path>>(
        log_path: P,
        source: Box<dyn InputSource>,
        clock: Arc<dyn Clock>,
        memory_limit: Option<usize>,
    ) -> Self {
        Self {
            log_path: log_path.as_ref().to_path_buf(),
            source: Some(source),
            clock,
            buffer: Arc::new(RingBuffer::new(memory_limit)),
            stats: Arc::new(KeyboardStats::default()),
            recording: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
            thread: None,
        }
    }

    /// Open the listener and the log, then start the producer thread.
    pub fn start(&mut self) -> Result<()> {
        if self.recording.load(Ordering::Relaxed) {
            warn!("Keyboard recorder already running");
            return Ok(());
        }

        let mut source = self
            .source
            .take()
            .ok_or_else(|| InputTraceError::component("keyboard", "recorder already consumed"))?;

        source.open()?;
        let writer = LogWriter::open(&self.log_path)?;

        self.recording.store(true, Ordering::Relaxed);

        let worker = KeyboardWorker {
            source,
            writer,
            clock: Arc::clone(&self.clock),
            buffer: Arc::clone(&self.buffer),
            stats: Arc::clone(&self.stats),
            recording: Arc::clone(&self.recording),
            failure: Arc::clone(&self.failure),
            held_keys: HashSet::new(),
        };

        self.thread = Some(
            std::thread::Builder::new()
                .name("keyboard-capture".into())
                .spawn(move || worker.run())?,
        );

        info!("Keyboard recorder started ({})", self.log_path.display());
        Ok(())
    }

    /// Signal the producer loop and join it. Idempotent; surfaces the
    /// mid-capture I/O failure that stopped the stream, if any.
    pub fn stop(&mut self) -> Result<()> {
        self.recording.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Keyboard capture thread panicked");
            }
            info!("Keyboard recorder stopped");
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
    pub fn stats(&self) -> KeyboardStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for KeyboardRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Keyboard recorder failure surfaced on drop: {}", e);
        }
    }
}

struct KeyboardWorker {
    source: Box<dyn InputSource>,
    writer: LogWriter,
    clock: Arc<dyn Clock>,
    buffer: Arc<RingBuffer<Vec<u8>>>,
    stats: Arc<KeyboardStats>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
    held_keys: HashSet<i32>,
}

impl KeyboardWorker {
    fn run(mut self) {
        debug!("Keyboard capture loop started");
        while self.recording.load(Ordering::Relaxed) {
            match self.source.poll(POLL_INTERVAL) {
                Ok(Some(RawInput::Key { code, down })) => self.on_key(code, down),
                Ok(Some(_)) => {
                    // Pointer notifications belong to the pointer stream.
                    self.stats.unknown_skipped.fetch_add(1, Ordering::Relaxed);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Keyboard listener failed: {}", e);
                    *self.failure.lock() = Some(e);
                    self.recording.store(false, Ordering::Relaxed);
                }
            }
        }
        if let Err(e) = self.writer.close() {
            warn!("Failed to close keyboard log: {}", e);
        }
        debug!("Keyboard capture loop exited");
    }

    fn on_key(&mut self, code: i32, down: bool) {
        let kind = if down {
            if !self.held_keys.insert(code) {
                // Repeat-fired down for a key already held.
                self.stats.events_suppressed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            KeyKind::Press
        } else {
            if !self.held_keys.remove(&code) {
                // Release with no matching press.
                self.stats.events_suppressed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            KeyKind::Release
        };

        self.emit(KeyEvent {
            kind,
            key_code: code,
            timestamp: self.clock.now(),
        });
    }

    fn emit(&mut self, event: KeyEvent) {
        let bytes = event.encode();
        if let Err(e) = self.writer.append(&bytes) {
            error!("Keyboard log append failed, stopping stream: {}", e);
            *self.failure.lock() = Some(e);
            self.recording.store(false, Ordering::Relaxed);
            return;
        }
        self.buffer.append(bytes);
        self.stats.events_emitted.fetch_add(1, Ordering::Relaxed);
    }
}
