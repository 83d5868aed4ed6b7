use crate::error::{InputTraceError, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A fixed-width binary record of one captured event.
///
/// Every record of a stream has the same byte size; a log file is nothing
/// but a headerless concatenation of records. The layout of a record must
/// stay self-consistent for the lifetime of a log file — schemas are not
/// versioned in-band, so mixing record types within one file is a caller
/// error the codec does not detect.
pub trait Record: Sized {
    /// Exact encoded size in bytes.
    const SIZE: usize;

    /// Encode into exactly [`Record::SIZE`] bytes, little-endian.
    fn encode(&self) -> Vec<u8>;

    /// Decode from a buffer of exactly [`Record::SIZE`] bytes.
    ///
    /// Fails with [`InputTraceError::MalformedRecord`] when the buffer has
    /// the wrong length; callers are responsible for slicing.
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Length check shared by every implementation.
    fn check_len(bytes: &[u8]) -> Result<()> {
        if bytes.len() != Self::SIZE {
            return Err(InputTraceError::MalformedRecord {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        Ok(())
    }
}

/// Append-only writer for binary event logs.
///
/// Writes go straight to the file handle without userspace buffering: the
/// OS page cache is the only intermediary, which bounds data loss on an
/// abrupt stop to at most one partial trailing record — exactly what the
/// reader knows how to discard. No explicit flush protocol is needed.
pub struct LogWriter {
    file: Option<File>,
    path: PathBuf,
    bytes_written: u64,
}

impl LogWriter {
    /// Create or truncate the log file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        info!("Opened log file: {}", path.display());
        Ok(Self {
            file: Some(file),
            path,
            bytes_written: 0,
        })
    }

    /// Append exactly `bytes` to the end of the log.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            InputTraceError::component("log_writer", "append after close")
        })?;
        file.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Encode and append a single record.
    pub fn append_record<R: Record>(&mut self, record: &R) -> Result<()> {
        self.append(&record.encode())
    }

    /// Total bytes appended since open.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the log. Idempotent and safe to race with process-exit
    /// cleanup; calls after the first are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            debug!(
                "Closed log file {} ({} bytes)",
                self.path.display(),
                self.bytes_written
            );
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close log {} on drop: {}", self.path.display(), e);
        }
    }
}

/// Read every complete record from a binary log.
///
/// Computes the largest multiple of the record size that fits in the file
/// and decodes records in file order. Trailing bytes beyond that point are
/// the residue of a process terminated mid-write; they are discarded
/// silently. This is the sole recovery mechanism for abrupt termination.
pub fn read_log<R: Record, P: AsRef<Path>>(path: P) -> Result<Vec<R>> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;

    let usable = (data.len() / R::SIZE) * R::SIZE;
    if usable < data.len() {
        debug!(
            "Discarding {} trailing bytes of partial record in {}",
            data.len() - usable,
            path.display()
        );
    }

    let mut records = Vec::with_capacity(usable / R::SIZE);
    for chunk in data[..usable].chunks_exact(R::SIZE) {
        records.push(R::decode(chunk)?);
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    struct TestRecord {
        value: u32,
    }

    impl Record for TestRecord {
        const SIZE: usize = 4;

        fn encode(&self) -> Vec<u8> {
            self.value.to_le_bytes().to_vec()
        }

        fn decode(bytes: &[u8]) -> Result<Self> {
            Self::check_len(bytes)?;
            Ok(Self {
                value: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            })
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");

        let mut writer = LogWriter::open(&path).unwrap();
        for value in 0..10u32 {
            writer.append_record(&TestRecord { value }).unwrap();
        }
        writer.close().unwrap();

        let records: Vec<TestRecord> = read_log(&path).unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[7].value, 7);
    }

    #[test]
    fn test_open_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");
        std::fs::write(&path, [0xAAu8; 64]).unwrap();

        let mut writer = LogWriter::open(&path).unwrap();
        writer.append_record(&TestRecord { value: 1 }).unwrap();
        writer.close().unwrap();

        let records: Vec<TestRecord> = read_log(&path).unwrap();
        assert_eq!(records, vec![TestRecord { value: 1 }]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path().join("stream.bin")).unwrap();
        writer.append(&[1, 2, 3, 4]).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.append(&[5]).is_err());
    }

    #[test]
    fn test_reader_discards_partial_trailing_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");

        let mut writer = LogWriter::open(&path).unwrap();
        for value in 0..5u32 {
            writer.append_record(&TestRecord { value }).unwrap();
        }
        writer.close().unwrap();

        let complete: Vec<TestRecord> = read_log(&path).unwrap();

        // Simulate termination mid-write for every possible cut point.
        for extra in 1..TestRecord::SIZE {
            let mut data = std::fs::read(&path).unwrap();
            data.extend(std::iter::repeat(0xFF).take(extra));
            let truncated_path = dir.path().join(format!("cut_{}.bin", extra));
            std::fs::write(&truncated_path, &data).unwrap();

            let records: Vec<TestRecord> = read_log(&truncated_path).unwrap();
            assert_eq!(records, complete);
        }
    }

    #[test]
    fn test_empty_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.bin");
        LogWriter::open(&path).unwrap().close().unwrap();

        let records: Vec<TestRecord> = read_log(&path).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = TestRecord::decode(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            InputTraceError::MalformedRecord {
                expected: 4,
                actual: 3
            }
        ));
    }
}
