use crate::error::Result;
use crate::frame::Frame;
use crate::log::LogWriter;
use std::path::Path;
use tracing::debug;

/// Destination for captured frames.
///
/// Container and codec concerns live entirely behind this trait; the
/// capture core only hands over pixel buffers.
pub trait VideoSink: Send {
    /// Append one frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Finalize the sink. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Sink that discards every frame. Useful when only the fetch buffer and
/// the frame metadata log are of interest.
#[derive(Debug, Default)]
pub struct NullSink {
    frames_written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl VideoSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!("Null sink closed after {} frames", self.frames_written);
        Ok(())
    }
}

/// Sink that appends raw RGB24 pixel buffers to a file, one frame after
/// another with no framing bytes. Frame boundaries are recoverable from
/// the stream's metadata log and the known frame dimensions.
pub struct RawFrameSink {
    writer: LogWriter,
}

impl RawFrameSink {
    /// Create or truncate the raw frame file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            writer: LogWriter::open(path)?,
        })
    }
}

impl VideoSink for RawFrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.writer.append(&frame.pixels)
    }

    fn close(&mut self) -> Result<()> {
        self.writer.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_null_sink_counts_frames() {
        let mut sink = NullSink::new();
        let frame = Frame::new(0, 0.0, vec![0u8; 12], 2, 2);
        sink.write_frame(&frame).unwrap();
        sink.write_frame(&frame).unwrap();
        sink.close().unwrap();
        assert_eq!(sink.frames_written(), 2);
    }

    #[test]
    fn test_raw_sink_concatenates_pixels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.raw");

        let mut sink = RawFrameSink::open(&path).unwrap();
        sink.write_frame(&Frame::new(0, 0.0, vec![1u8; 12], 2, 2))
            .unwrap();
        sink.write_frame(&Frame::new(1, 0.1, vec![2u8; 12], 2, 2))
            .unwrap();
        sink.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 24);
        assert!(data[..12].iter().all(|&b| b == 1));
        assert!(data[12..].iter().all(|&b| b == 2));
    }
}
