use crate::clock::{Clock, SystemClock};
use crate::config::InputTraceConfig;
use crate::error::{InputTraceError, Result};
use crate::event::{FrameMeta, KeyEvent, PointerEvent};
use crate::frame::Frame;
use crate::input::{ChannelSource, InputInjector, InputSource};
use crate::keyboard::KeyboardRecorder;
use crate::log::Record;
use crate::pointer::PointerRecorder;
use crate::region::CursorState;
use crate::screen::{ScreenGrabber, ScreenRecorder, SyntheticScreen};
use crate::sink::{NullSink, RawFrameSink, VideoSink};
use crate::webcam::{CameraGrabber, SyntheticCamera, WebcamRecorder};
use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of starting a session: which sources run and which failed.
///
/// Per-source startup failures are isolated — one source failing must not
/// prevent the others from running. Whether a failure is fatal to the
/// whole session is the caller's decision, which is why this report is
/// returned instead of an error.
#[derive(Debug)]
pub struct SessionReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, InputTraceError)>,
}

impl SessionReport {
    pub fn any_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn all_failed(&self) -> bool {
        self.started.is_empty() && !self.failed.is_empty()
    }
}

/// Volumes drained from every fetch buffer in one sweep.
#[derive(Debug, Default, Clone)]
pub struct DrainSummary {
    pub pointer_bytes: usize,
    pub keyboard_bytes: usize,
    pub screen_frames: usize,
    pub webcam_frames: usize,
}

impl DrainSummary {
    pub fn is_empty(&self) -> bool {
        self.pointer_bytes == 0
            && self.keyboard_bytes == 0
            && self.screen_frames == 0
            && self.webcam_frames == 0
    }
}

#[derive(Debug, Serialize)]
struct StreamMetadata {
    name: String,
    kind: &'static str,
    record_size: Option<usize>,
    path: String,
}

#[derive(Debug, Serialize)]
struct SessionMetadata {
    started_at: String,
    streams: Vec<StreamMetadata>,
    failed_streams: Vec<String>,
}

/// Builder for a capture session.
///
/// Collaborator implementations (native input sources, platform screen or
/// camera grabbers, container-writing video sinks) are injected here; each
/// one left unset falls back to a dependency-free default — channel-backed
/// input sources and synthetic frame sources — so a session can always be
/// constructed.
pub struct CaptureSessionBuilder {
    config: InputTraceConfig,
    clock: Arc<dyn Clock>,
    pointer_source: Option<Box<dyn InputSource>>,
    keyboard_source: Option<Box<dyn InputSource>>,
    screen_grabber: Option<Box<dyn ScreenGrabber>>,
    screen_sink: Option<Box<dyn VideoSink>>,
    camera_grabbers: HashMap<u32, Box<dyn CameraGrabber>>,
    camera_sinks: HashMap<u32, Box<dyn VideoSink>>,
}

impl CaptureSessionBuilder {
    pub fn new(config: InputTraceConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            pointer_source: None,
            keyboard_source: None,
            screen_grabber: None,
            screen_sink: None,
            camera_grabbers: HashMap::new(),
            camera_sinks: HashMap::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pointer_source(mut self, source: Box<dyn InputSource>) -> Self {
        self.pointer_source = Some(source);
        self
    }

    pub fn keyboard_source(mut self, source: Box<dyn InputSource>) -> Self {
        self.keyboard_source = Some(source);
        self
    }

    pub fn screen_grabber(mut self, grabber: Box<dyn ScreenGrabber>) -> Self {
        self.screen_grabber = Some(grabber);
        self
    }

    pub fn screen_sink(mut self, sink: Box<dyn VideoSink>) -> Self {
        self.screen_sink = Some(sink);
        self
    }

    pub fn camera_grabber(mut self, index: u32, grabber: Box<dyn CameraGrabber>) -> Self {
        self.camera_grabbers.insert(index, grabber);
        self
    }

    pub fn camera_sink(mut self, index: u32, sink: Box<dyn VideoSink>) -> Self {
        self.camera_sinks.insert(index, sink);
        self
    }

    /// Create the session directory and construct every configured
    /// recorder. Nothing starts capturing yet.
    pub fn build(mut self) -> Result<CaptureSession> {
        let timestamp = Local::now().format("%Y%m%d-%H%M%S");
        let dir = PathBuf::from(&self.config.session.data_dir).join(timestamp.to_string());
        std::fs::create_dir_all(&dir)?;
        info!("Session directory: {}", dir.display());

        let cursor = Arc::new(CursorState::new(
            self.config.screen.resolution.0 as i32 / 2,
            self.config.screen.resolution.1 as i32 / 2,
        ));

        let mut pointer_injector = None;
        let pointer = if self.config.pointer.enabled {
            let source = match self.pointer_source.take() {
                Some(source) => source,
                None => {
                    let (source, injector) = default_input_source(
                        "pointer",
                        self.config.pointer.device.as_deref(),
                        self.config.screen.resolution,
                    );
                    pointer_injector = injector;
                    source
                }
            };
            Some(PointerRecorder::new(
                dir.join("pointer.bin"),
                source,
                Arc::clone(&self.clock),
                Arc::clone(&cursor),
                self.config.pointer.delta_time,
                self.config.pointer.memory_limit,
            ))
        } else {
            None
        };

        let mut keyboard_injector = None;
        let keyboard = if self.config.keyboard.enabled {
            let source = match self.keyboard_source.take() {
                Some(source) => source,
                None => {
                    let (source, injector) = default_input_source(
                        "keyboard",
                        self.config.keyboard.device.as_deref(),
                        self.config.screen.resolution,
                    );
                    keyboard_injector = injector;
                    source
                }
            };
            Some(KeyboardRecorder::new(
                dir.join("keyboard.bin"),
                source,
                Arc::clone(&self.clock),
                self.config.keyboard.memory_limit,
            ))
        } else {
            None
        };

        let screen = if self.config.screen.enabled {
            let grabber = self.screen_grabber.take().unwrap_or_else(|| {
                Box::new(SyntheticScreen::new(
                    self.config.screen.resolution.0,
                    self.config.screen.resolution.1,
                ))
            });
            let sink = match self.screen_sink.take() {
                Some(sink) => sink,
                None if self.config.screen.write_raw_frames => {
                    Box::new(RawFrameSink::open(dir.join("screen.raw"))?)
                }
                None => Box::new(NullSink::new()),
            };
            Some(ScreenRecorder::new(
                dir.join("screen_meta.bin"),
                grabber,
                sink,
                Arc::clone(&self.clock),
                Arc::clone(&cursor),
                self.config.screen.fps,
                self.config.screen.capture_radius,
                self.config.screen.downscale_factor,
                self.config.screen.memory_limit,
            ))
        } else {
            None
        };

        let mut webcams = Vec::new();
        for webcam_config in &self.config.webcam {
            let index = webcam_config.index;
            let grabber = self.camera_grabbers.remove(&index).unwrap_or_else(|| {
                Box::new(SyntheticCamera::new(
                    webcam_config.resolution.0,
                    webcam_config.resolution.1,
                ))
            });
            let sink = match self.camera_sinks.remove(&index) {
                Some(sink) => sink,
                None if webcam_config.write_raw_frames => Box::new(RawFrameSink::open(
                    dir.join(format!("webcam_{}.raw", index)),
                )?),
                None => Box::new(NullSink::new()),
            };
            webcams.push((
                index,
                WebcamRecorder::new(
                    dir.join(format!("webcam_{}_meta.bin", index)),
                    grabber,
                    sink,
                    Arc::clone(&self.clock),
                    webcam_config.fps,
                    webcam_config.memory_limit,
                ),
            ));
        }

        Ok(CaptureSession {
            dir,
            save_metadata: self.config.session.save_metadata,
            pointer,
            keyboard,
            screen,
            webcams,
            pointer_injector,
            keyboard_injector,
        })
    }
}

/// The lifecycle container for one recording run.
///
/// Each capture source exclusively owns its sink handle and fetch buffer;
/// the session only coordinates start, stop and draining. `stop()` is the
/// sole release path for every resource — orchestration code is
/// responsible for invoking it on every exit path.
pub struct CaptureSession {
    dir: PathBuf,
    save_metadata: bool,
    pointer: Option<PointerRecorder>,
    keyboard: Option<KeyboardRecorder>,
    screen: Option<ScreenRecorder>,
    webcams: Vec<(u32, WebcamRecorder)>,
    pointer_injector: Option<InputInjector>,
    keyboard_injector: Option<InputInjector>,
}

impl CaptureSession {
    /// Start every configured source, isolating per-source failures.
    pub fn start(&mut self) -> Result<SessionReport> {
        let mut report = SessionReport {
            started: Vec::new(),
            failed: Vec::new(),
        };

        if let Some(pointer) = self.pointer.as_mut() {
            record_start("pointer", pointer.start(), &mut report);
        }
        if let Some(keyboard) = self.keyboard.as_mut() {
            record_start("keyboard", keyboard.start(), &mut report);
        }
        if let Some(screen) = self.screen.as_mut() {
            record_start("screen", screen.start(), &mut report);
        }
        for (index, webcam) in self.webcams.iter_mut() {
            record_start(&format!("webcam_{}", index), webcam.start(), &mut report);
        }

        if self.save_metadata {
            self.write_metadata(&report)?;
        }

        info!(
            "Session started: {} sources running, {} failed",
            report.started.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Stop every source, joining each producer thread. Returns the
    /// failures that stopped individual streams mid-capture, if any.
    pub fn stop(&mut self) -> Vec<(String, InputTraceError)> {
        let mut failures = Vec::new();

        if let Some(pointer) = self.pointer.as_mut() {
            if let Err(e) = pointer.stop() {
                error!("Pointer stream failed: {}", e);
                failures.push(("pointer".to_string(), e));
            }
        }
        if let Some(keyboard) = self.keyboard.as_mut() {
            if let Err(e) = keyboard.stop() {
                error!("Keyboard stream failed: {}", e);
                failures.push(("keyboard".to_string(), e));
            }
        }
        if let Some(screen) = self.screen.as_mut() {
            if let Err(e) = screen.stop() {
                error!("Screen stream failed: {}", e);
                failures.push(("screen".to_string(), e));
            }
        }
        for (index, webcam) in self.webcams.iter_mut() {
            if let Err(e) = webcam.stop() {
                error!("Webcam {} stream failed: {}", index, e);
                failures.push((format!("webcam_{}", index), e));
            }
        }

        info!("Session stopped ({} stream failures)", failures.len());
        failures
    }

    /// Drain every fetch buffer, returning only the drained volumes.
    pub fn drain(&self) -> DrainSummary {
        let mut summary = DrainSummary::default();
        if let Some(pointer) = &self.pointer {
            summary.pointer_bytes = pointer.fetch().len();
        }
        if let Some(keyboard) = &self.keyboard {
            summary.keyboard_bytes = keyboard.fetch().len();
        }
        if let Some(screen) = &self.screen {
            summary.screen_frames = screen.fetch().len();
        }
        for (_, webcam) in &self.webcams {
            summary.webcam_frames += webcam.fetch().len();
        }
        summary
    }

    /// Encoded pointer records since the last fetch.
    pub fn fetch_pointer(&self) -> Option<Vec<u8>> {
        self.pointer.as_ref().map(|r| r.fetch())
    }

    /// Encoded keyboard records since the last fetch.
    pub fn fetch_keyboard(&self) -> Option<Vec<u8>> {
        self.keyboard.as_ref().map(|r| r.fetch())
    }

    /// Screen frames since the last fetch.
    pub fn fetch_screen(&self) -> Option<Vec<Frame>> {
        self.screen.as_ref().map(|r| r.fetch())
    }

    /// Frames since the last fetch for the webcam at `index`.
    pub fn fetch_webcam(&self, index: u32) -> Option<Vec<Frame>> {
        self.webcams
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, r)| r.fetch())
    }

    /// Injector for the default channel-backed pointer source, when no
    /// custom source was supplied.
    pub fn pointer_injector(&self) -> Option<&InputInjector> {
        self.pointer_injector.as_ref()
    }

    /// Injector for the default channel-backed keyboard source.
    pub fn keyboard_injector(&self) -> Option<&InputInjector> {
        self.keyboard_injector.as_ref()
    }

    /// Session directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_metadata(&self, report: &SessionReport) -> Result<()> {
        let mut streams = Vec::new();
        if let Some(pointer) = &self.pointer {
            streams.push(StreamMetadata {
                name: "pointer".to_string(),
                kind: "pointer",
                record_size: Some(PointerEvent::SIZE),
                path: display_name(pointer.log_path()),
            });
        }
        if let Some(keyboard) = &self.keyboard {
            streams.push(StreamMetadata {
                name: "keyboard".to_string(),
                kind: "keyboard",
                record_size: Some(KeyEvent::SIZE),
                path: display_name(keyboard.log_path()),
            });
        }
        if let Some(screen) = &self.screen {
            streams.push(StreamMetadata {
                name: "screen".to_string(),
                kind: "frame",
                record_size: Some(FrameMeta::SIZE),
                path: display_name(screen.meta_path()),
            });
        }
        for (index, webcam) in &self.webcams {
            streams.push(StreamMetadata {
                name: format!("webcam_{}", index),
                kind: "frame",
                record_size: Some(FrameMeta::SIZE),
                path: display_name(webcam.meta_path()),
            });
        }

        let metadata = SessionMetadata {
            started_at: Local::now().to_rfc3339(),
            streams,
            failed_streams: report.failed.iter().map(|(name, _)| name.clone()).collect(),
        };

        let path = self.dir.join("metadata.json");
        std::fs::write(&path, serde_json::to_string_pretty(&metadata)?)?;
        info!("Wrote session metadata: {}", path.display());
        Ok(())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Individual recorders also stop on drop; doing it here first
        // keeps the shutdown order deterministic.
        let failures = self.stop();
        for (stream, e) in failures {
            warn!("{} failure surfaced on session drop: {}", stream, e);
        }
    }
}

fn record_start(name: &str, result: Result<()>, report: &mut SessionReport) {
    match result {
        Ok(()) => report.started.push(name.to_string()),
        Err(e) => {
            error!("Failed to start {} source: {}", name, e);
            report.failed.push((name.to_string(), e));
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Default input source: the native backend when the feature is enabled
/// and a device is configured, a channel-backed source (with its injector
/// returned) otherwise.
#[allow(unused_variables)]
fn default_input_source(
    name: &str,
    device: Option<&str>,
    screen: (u32, u32),
) -> (Box<dyn InputSource>, Option<InputInjector>) {
    #[cfg(all(feature = "native-input", target_os = "linux"))]
    if let Some(device) = device {
        return (
            Box::new(crate::input::EvdevSource::new(device, screen.0, screen.1)),
            None,
        );
    }

    let (source, injector) = ChannelSource::new(name);
    (Box::new(source), Some(injector))
}
