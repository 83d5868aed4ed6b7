use crate::clock::Clock;
use crate::error::{InputTraceError, Result};
use crate::frame::{Frame, BYTES_PER_PIXEL};
use crate::log::LogWriter;
use crate::pacer::FramePacer;
use crate::ring_buffer::RingBuffer;
use crate::sink::VideoSink;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pixel source for webcam capture.
pub trait CameraGrabber: Send {
    /// Acquire the capture device. Failures are fatal startup errors.
    fn open(&mut self) -> Result<()>;

    /// Native frame size in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Grab the next frame as an RGB24 buffer.
    fn grab(&mut self) -> Result<Vec<u8>>;
}

/// Deterministic test-pattern camera, for demos and tests on machines
/// without a capture device.
#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    tick: u64,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }
}

impl CameraGrabber for SyntheticCamera {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) -> Result<Vec<u8>> {
        self.tick += 1;
        let shade = (self.tick % 256) as u8;
        Ok(vec![shade; (self.width * self.height) as usize * BYTES_PER_PIXEL])
    }
}

/// Frame-paced webcam recorder.
///
/// Same sink/metadata/buffer pattern as screen capture, without region
/// tracking; the fetch buffer defaults to a bounded drop-oldest window so
/// an idle consumer cannot exhaust memory with raw frames.
pub struct WebcamRecorder {
    meta_path: PathBuf,
    fps: f64,
    grabber: Option<Box<dyn CameraGrabber>>,
    sink: Option<Box<dyn VideoSink>>,
    clock: Arc<dyn Clock>,
    buffer: Arc<RingBuffer<Frame>>,
    frames_captured: Arc<AtomicU64>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
    thread: Option<JoinHandle<()>>,
}

impl WebcamRecorder {
    /// Create a webcam recorder writing frame metadata to `meta_path`.
    pub fn new<P: AsRef<Path>>(
        meta_path: P,
        grabber: Box<dyn CameraGrabber>,
        sink: Box<dyn VideoSink>,
        clock: Arc<dyn Clock>,
        fps: f64,
        memory_limit: Option<usize>,
    ) -> Self {
        Self {
            meta_path: meta_path.as_ref().to_path_buf(),
            fps,
            grabber: Some(grabber),
            sink: Some(sink),
            clock,
            buffer: Arc::new(RingBuffer::new(memory_limit)),
            frames_captured: Arc::new(AtomicU64::new(0)),
            recording: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
            thread: None,
        }
    }

    /// Open the capture device and the metadata log, then start the paced
    /// producer thread.
    pub fn start(&mut self) -> Result<()> {
        if self.recording.load(Ordering::Relaxed) {
            warn!("Webcam recorder already running");
            return Ok(());
        }

        let mut grabber = self
            .grabber
            .take()
            .ok_or_else(|| InputTraceError::component("webcam", "recorder already consumed"))?;
        let sink = self
            .sink
            .take()
            .ok_or_else(|| InputTraceError::component("webcam", "recorder already consumed"))?;

        grabber.open()?;
        let meta_writer = LogWriter::open(&self.meta_path)?;

        self.recording.store(true, Ordering::Relaxed);

        let worker = WebcamWorker {
            grabber,
            sink,
            meta_writer,
            fps: self.fps,
            clock: Arc::clone(&self.clock),
            buffer: Arc::clone(&self.buffer),
            frames_captured: Arc::clone(&self.frames_captured),
            recording: Arc::clone(&self.recording),
            failure: Arc::clone(&self.failure),
        };

        self.thread = Some(
            std::thread::Builder::new()
                .name("webcam-capture".into())
                .spawn(move || worker.run())?,
        );

        info!("Webcam recorder started ({} fps)", self.fps);
        Ok(())
    }

    /// Signal the paced loop and join it; the in-flight frame, if any,
    /// completes and is still emitted. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        self.recording.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Webcam capture thread panicked");
            }
            info!("Webcam recorder stopped");
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
        self.frames_captured.load(Ordering::Relaxed)
    }
}

impl Drop for WebcamRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Webcam recorder failure surfaced on drop: {}", e);
        }
    }
}

struct WebcamWorker {
    grabber: Box<dyn CameraGrabber>,
    sink: Box<dyn VideoSink>,
    meta_writer: LogWriter,
    fps: f64,
    clock: Arc<dyn Clock>,
    buffer: Arc<RingBuffer<Frame>>,
    frames_captured: Arc<AtomicU64>,
    recording: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<InputTraceError>>>,
}

impl WebcamWorker {
    fn run(mut self) {
        debug!("Webcam capture loop started");
        let mut pacer = FramePacer::new(self.fps, self.clock.as_ref());
        let (width, height) = self.grabber.dimensions();
        let mut frame_index: u64 = 0;

        while self.recording.load(Ordering::Relaxed) {
            let timestamp = self.clock.now();
            match self.grabber.grab() {
                Ok(pixels) => {
                    let frame = Frame::new(frame_index, timestamp, pixels, width, height);
                    if !self.emit(frame) {
                        break;
                    }
                    frame_index += 1;
                }
                Err(e) => {
                    error!("Webcam grab failed, stopping stream: {}", e);
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
            warn!("Failed to close webcam sink: {}", e);
        }
        if let Err(e) = self.meta_writer.close() {
            warn!("Failed to close webcam metadata log: {}", e);
        }
        debug!("Webcam capture loop exited");
    }

    fn emit(&mut self, frame: Frame) -> bool {
        if let Err(e) = self.sink.write_frame(&frame) {
            error!("Webcam sink write failed, stopping stream: {}", e);
            *self.failure.lock() = Some(e);
            self.recording.store(false, Ordering::Relaxed);
            return false;
        }
        if let Err(e) = self.meta_writer.append_record(&frame.meta()) {
            error!("Webcam metadata append failed, stopping stream: {}", e);
            *self.failure.lock() = Some(e);
            self.recording.store(false, Ordering::Relaxed);
            return false;
        }
        self.buffer.append(frame);
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::event::FrameMeta;
    use crate::log::read_log;
    use crate::sink::{NullSink, RawFrameSink};
    use std::time::Duration;
    use tempfile::TempDir;

    fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_paced_capture_with_metadata() {
        let dir = TempDir::new().unwrap();
        let mut recorder = WebcamRecorder::new(
            dir.path().join("webcam_0_meta.bin"),
            Box::new(SyntheticCamera::new(64, 48)),
            Box::new(NullSink::new()),
            Arc::new(SystemClock),
            100.0,
            Some(100),
        );

        recorder.start().unwrap();
        wait_for(|| recorder.frames_captured() >= 4);
        recorder.stop().unwrap();

        let metas: Vec<FrameMeta> = read_log(recorder.meta_path()).unwrap();
        assert_eq!(metas.len() as u64, recorder.frames_captured());
        assert_eq!(metas[0].frame_index, 0);
        assert!(metas.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let frames = recorder.fetch();
        assert!(!frames.is_empty());
        assert_eq!((frames[0].width, frames[0].height), (64, 48));
        assert!(frames[0].validate_size());
    }

    #[test]
    fn test_memory_limit_keeps_most_recent_frames() {
        let dir = TempDir::new().unwrap();
        let mut recorder = WebcamRecorder::new(
            dir.path().join("webcam_0_meta.bin"),
            Box::new(SyntheticCamera::new(8, 8)),
            Box::new(NullSink::new()),
            Arc::new(SystemClock),
            200.0,
            Some(3),
        );

        recorder.start().unwrap();
        wait_for(|| recorder.frames_captured() >= 8);
        recorder.stop().unwrap();

        let frames = recorder.fetch();
        assert_eq!(frames.len(), 3);
        let last_index = recorder.frames_captured() - 1;
        assert_eq!(frames.last().unwrap().frame_index, last_index);
    }

    #[test]
    fn test_raw_sink_receives_every_frame() {
        let dir = TempDir::new().unwrap();
        let raw_path = dir.path().join("webcam_0.raw");
        let mut recorder = WebcamRecorder::new(
            dir.path().join("webcam_0_meta.bin"),
            Box::new(SyntheticCamera::new(4, 4)),
            Box::new(RawFrameSink::open(&raw_path).unwrap()),
            Arc::new(SystemClock),
            100.0,
            Some(100),
        );

        recorder.start().unwrap();
        wait_for(|| recorder.frames_captured() >= 2);
        recorder.stop().unwrap();

        let bytes = std::fs::read(&raw_path).unwrap();
        assert_eq!(
            bytes.len() as u64,
            recorder.frames_captured() * (4 * 4 * 3) as u64
        );
    }

    #[test]
    fn test_failing_device_surfaces_startup_error() {
        struct BrokenCamera;
        impl CameraGrabber for BrokenCamera {
            fn open(&mut self) -> Result<()> {
                Err(InputTraceError::startup(
                    "webcam-1".to_string(),
                    "could not open video device".to_string(),
                ))
            }
            fn dimensions(&self) -> (u32, u32) {
                (0, 0)
            }
            fn grab(&mut self) -> Result<Vec<u8>> {
                unreachable!()
            }
        }

        let dir = TempDir::new().unwrap();
        let mut recorder = WebcamRecorder::new(
            dir.path().join("webcam_1_meta.bin"),
            Box::new(BrokenCamera),
            Box::new(NullSink::new()),
            Arc::new(SystemClock),
            30.0,
            None,
        );

        assert!(matches!(
            recorder.start().unwrap_err(),
            InputTraceError::Startup { .. }
        ));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_grab_failure_mid_capture_stops_stream_via_stop_path() {
        struct FlakyCamera {
            grabs: u32,
        }
        impl CameraGrabber for FlakyCamera {
            fn open(&mut self) -> Result<()> {
                Ok(())
            }
            fn dimensions(&self) -> (u32, u32) {
                (2, 2)
            }
            fn grab(&mut self) -> Result<Vec<u8>> {
                self.grabs += 1;
                if self.grabs > 2 {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "device disappeared",
                    )
                    .into())
                } else {
                    Ok(vec![0u8; 12])
                }
            }
        }

        let dir = TempDir::new().unwrap();
        let mut recorder = WebcamRecorder::new(
            dir.path().join("webcam_0_meta.bin"),
            Box::new(FlakyCamera { grabs: 0 }),
            Box::new(NullSink::new()),
            Arc::new(SystemClock),
            200.0,
            None,
        );

        recorder.start().unwrap();
        wait_for(|| !recorder.is_recording());
        assert!(recorder.stop().is_err());
        assert_eq!(recorder.frames_captured(), 2);
    }
}
