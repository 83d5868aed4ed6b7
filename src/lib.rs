pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod input;
pub mod keyboard;
pub mod log;
pub mod pacer;
pub mod pointer;
pub mod region;
pub mod ring_buffer;
pub mod screen;
pub mod session;
pub mod sink;
pub mod webcam;

pub use clock::{Clock, SystemClock};
pub use config::InputTraceConfig;
pub use error::{InputTraceError, Result};
pub use event::{FrameMeta, KeyEvent, KeyKind, PointerEvent, PointerKind};
pub use frame::Frame;
pub use input::{ChannelSource, InputInjector, InputSource, MouseButton, RawInput};
pub use keyboard::KeyboardRecorder;
pub use log::{read_log, LogWriter, Record};
pub use pacer::FramePacer;
pub use pointer::PointerRecorder;
pub use region::{CursorState, RegionTracker, RegionWindow};
pub use ring_buffer::RingBuffer;
pub use screen::{ScreenGrabber, ScreenRecorder, SyntheticScreen};
pub use session::{CaptureSession, CaptureSessionBuilder, DrainSummary, SessionReport};
pub use sink::{NullSink, RawFrameSink, VideoSink};
pub use webcam::{CameraGrabber, SyntheticCamera, WebcamRecorder};

#[cfg(all(feature = "native-input", target_os = "linux"))]
pub use input::EvdevSource;
