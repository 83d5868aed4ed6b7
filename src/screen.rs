use crate::clock::Clock;
use crate::error::{InputTraceError, Result};
use crate::frame::{Frame, BYTES_PER_PIXEL};
use crate::log::LogWriter;
use crate::pacer::FramePacer;
use crate::region::{CursorState, RegionTracker, RegionWindow};
use crate::ring_buffer::RingBuffer;
use crate::sink::VideoSink;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pixel source for screen capture.
///
/// Implementations own the platform capture handle; the recorder only
/// asks for the pixels of a window.
pub trait ScreenGrabber: Send {
    /// Acquire the capture handle. Failures are fatal startup errors.
    fn open(&mut self) -> Result<()>;

    /// Full screen size in pixels.
    fn screen_size(&self) -> (u32, u32);

    /// Grab the given window as an RGB24 buffer of
    /// `window.width() * window.height() * 3` bytes.
    fn grab(&mut self, window: &RegionWindow) -> Result<Vec<u8>>;
}

/// Deterministic test-pattern screen, for demos and tests on machines
/// without capture hardware or permissions.
#[derive(Debug)]
pub struct SyntheticScreen {
    size: (u32, u32),
    tick: u64,
}

impl SyntheticScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            tick: 0,
        }
    }
}

impl ScreenGrabber for SyntheticScreen {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        self.size
    }

    fn grab(&mut self, window: &RegionWindow) -> Result<Vec<u8>> {
        self.tick += 1;
        let mut pixels =
            Vec::with_capacity((window.width() * window.height()) as usize * BYTES_PER_PIXEL);
        for y in window.top..window.bottom {
            for x in window.left..window.right {
                pixels.push((x % 256) as u8);
                pixels.push((y % 256) as u8);
                pixels.push((self.tick % 256) as u8);
            }
        }
        Ok(pixels)
    }
}

/// Statistics for screen capture monitoring.
#[derive(Debug, Default)]
pub struct ScreenStats {
    pub frames_captured: AtomicU64,
}

impl ScreenStats {
    pub fn snapshot(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }
}

/// Region-tracked, frame-paced screen recorder.
///
/// Each tick computes the capture window around the current pointer
/// position, grabs it, downscales, and hands the frame to the video sink,
/// the frame metadata log and the fetch buffer.
pub struct ScreenRecorder {
    meta_path: PathBuf,
    fps: f64,
    downscale_factor: u32,
    capture_radius: (u32, u32),
    grabber: Option<Box<dyn ScreenGrabber>>,
    sink: Option<Box<dyn VideoSink>>,
    clock: Arc<dyn Clock>,
    cursor: Arc<CursorState>,
    buffer: Arc<RingBuffer<Frame>>,
    stats: Arc<ScreenStats>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
    thread: Option<JoinHandle<()>>,
}

impl ScreenRecorder {
    /// Create a screen recorder.
    ///
    /// `meta_path` receives the 16-byte frame metadata records;
    /// `memory_limit` bounds the fetch buffer only.
    #[allow(clippy::too_many_arguments)]
    pub fn new<P: AsRef<Path>>(
        meta_path: P,
        grabber: Box<dyn ScreenGrabber>,
        sink: Box<dyn VideoSink>,
        clock: Arc<dyn Clock>,
        cursor: Arc<CursorState>,
        fps: f64,
        capture_radius: (u32, u32),
        downscale_factor: u32,
        memory_limit: Option<usize>,
    ) -> Self {
        Self {
            meta_path: meta_path.as_ref().to_path_buf(),
            fps,
            downscale_factor: downscale_factor.max(1),
            capture_radius,
            grabber: Some(grabber),
            sink: Some(sink),
            clock,
            cursor,
            buffer: Arc::new(RingBuffer::new(memory_limit)),
            stats: Arc::new(ScreenStats::default()),
            recording: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
            thread: None,
        }
    }

    /// Open the capture device and the metadata log, then start the paced
    /// producer thread.
    pub fn start(&mut self) -> Result<()> {
        if self.recording.load(Ordering::Relaxed) {
            warn!("Screen recorder already running");
            return Ok(());
        }

        let mut grabber = self
            .grabber
            .take()
            .ok_or_else(|| InputTraceError::component("screen", "recorder already consumed"))?;
        let sink = self
            .sink
            .take()
            .ok_or_else(|| InputTraceError::component("screen", "recorder already consumed"))?;

        grabber.open()?;
        let meta_writer = LogWriter::open(&self.meta_path)?;

        let tracker = RegionTracker::new(self.capture_radius, grabber.screen_size());
        self.recording.store(true, Ordering::Relaxed);

        let worker = ScreenWorker {
            grabber,
            sink,
            meta_writer,
            tracker,
            downscale_factor: self.downscale_factor,
            fps: self.fps,
            clock: Arc::clone(&self.clock),
            cursor: Arc::clone(&self.cursor),
            buffer: Arc::clone(&self.buffer),
            stats: Arc::clone(&self.stats),
            recording: Arc::clone(&self.recording),
            failure: Arc::clone(&self.failure),
        };

        self.thread = Some(
            std::thread::Builder::new()
                .name("screen-capture".into())
                .spawn(move || worker.run())?,
        );

        info!(
            "Screen recorder started ({} fps, radius {:?}, downscale {})",
            self.fps, self.capture_radius, self.downscale_factor
        );
        Ok(())
    }

    /// Signal the paced loop and join it; the in-flight frame, if any,
    /// completes and is still emitted. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        self.recording.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Screen capture thread panicked");
            }
            info!("Screen recorder stopped");
        }
        match self.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Frames accumulated since the previous fetch.
    pub fn fetch(&self) -> Vec<Frame> {
        self.buffer.fetch_and_clear()
    }

    /// Whether the producer thread is currently capturing.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    /// Path of the frame metadata log.
    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Frames captured so far.
    pub fn frames_captured(&self) -> u64 {
        self.stats.snapshot()
    }
}

impl Drop for ScreenRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Screen recorder failure surfaced on drop: {}", e);
        }
    }
}

struct ScreenWorker {
    grabber: Box<dyn ScreenGrabber>,
    sink: Box<dyn VideoSink>,
    meta_writer: LogWriter,
    tracker: RegionTracker,
    downscale_factor: u32,
    fps: f64,
    clock: Arc<dyn Clock>,
    cursor: Arc<CursorState>,
    buffer: Arc<RingBuffer<Frame>>,
    stats: Arc<ScreenStats>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
}

impl ScreenWorker {
    fn run(mut self) {
        debug!("Screen capture loop started");
        let mut pacer = FramePacer::new(self.fps, self.clock.as_ref());
        let mut frame_index: u64 = 0;

        while self.recording.load(Ordering::Relaxed) {
            let timestamp = self.clock.now();
            let (mx, my) = self.cursor.position();
            let window = self.tracker.window_for(mx, my);

            match self.grabber.grab(&window) {
                Ok(pixels) => {
                    let frame =
                        Frame::new(frame_index, timestamp, pixels, window.width(), window.height())
                            .downscale(self.downscale_factor);
                    if !self.emit(frame) {
                        break;
                    }
                    frame_index += 1;
                }
                Err(e) => {
                    error!("Screen grab failed, stopping stream: {}", e);
                    *self.failure.lock() = Some(e);
                    self.recording.store(false, Ordering::Relaxed);
                    break;
                }
            }

            let delay = pacer.frame_completed(self.clock.as_ref());
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }

        if let Err(e) = self.sink.close() {
            warn!("Failed to close screen sink: {}", e);
        }
        if let Err(e) = self.meta_writer.close() {
            warn!("Failed to close screen metadata log: {}", e);
        }
        debug!("Screen capture loop exited");
    }

    /// Sink, metadata log and buffer receive every frame together; a sink
    /// failure stops the stream before they could diverge.
    fn emit(&mut self, frame: Frame) -> bool {
        if let Err(e) = self.sink.write_frame(&frame) {
            error!("Screen sink write failed, stopping stream: {}", e);
            *self.failure.lock() = Some(e);
            self.recording.store(false, Ordering::Relaxed);
            return false;
        }
        if let Err(e) = self.meta_writer.append_record(&frame.meta()) {
            error!("Screen metadata append failed, stopping stream: {}", e);
            *self.failure.lock() = Some(e);
            self.recording.store(false, Ordering::Relaxed);
            return false;
        }
        self.buffer.append(frame);
        self.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
        true
    }
}
