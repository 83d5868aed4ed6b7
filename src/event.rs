use crate::error::{InputTraceError, Result};
use crate::log::Record;

/// Kind of a pointer event.
///
/// The discriminants are the on-disk kind bytes and must never be
/// renumbered; existing logs depend on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PointerKind {
    Move = 0,
    LeftDown = 1,
    LeftUp = 2,
    RightDown = 3,
    RightUp = 4,
    Scroll = 5,
}

impl PointerKind {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Move),
            1 => Ok(Self::LeftDown),
            2 => Ok(Self::LeftUp),
            3 => Ok(Self::RightDown),
            4 => Ok(Self::RightUp),
            5 => Ok(Self::Scroll),
            kind => Err(InputTraceError::UnknownEvent {
                stream: "pointer",
                kind,
            }),
        }
    }
}

/// One pointer event.
///
/// For `Scroll` events `x`/`y` hold the scroll deltas rather than absolute
/// screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: i16,
    pub y: i16,
    /// Seconds since the UNIX epoch.
    pub timestamp: f64,
}

impl Record for PointerEvent {
    // kind u8 + x i16 + y i16 + timestamp f64
    const SIZE: usize = 13;

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&self.x.to_le_bytes());
        bytes.extend_from_slice(&self.y.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::check_len(bytes)?;
        Ok(Self {
            kind: PointerKind::from_byte(bytes[0])?,
            x: i16::from_le_bytes([bytes[1], bytes[2]]),
            y: i16::from_le_bytes([bytes[3], bytes[4]]),
            timestamp: f64::from_le_bytes(bytes[5..13].try_into().unwrap()),
        })
    }
}

/// Kind of a key event. Discriminants are the on-disk kind bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyKind {
    Press = 0,
    Release = 1,
}

impl KeyKind {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Press),
            1 => Ok(Self::Release),
            kind => Err(InputTraceError::UnknownEvent {
                stream: "keyboard",
                kind,
            }),
        }
    }
}

/// One keyboard event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    pub kind: KeyKind,
    /// Platform key code as delivered by the native listener.
    pub key_code: i32,
    /// Seconds since the UNIX epoch.
    pub timestamp: f64,
}

impl Record for KeyEvent {
    // kind u8 + key_code i32 + timestamp f64
    const SIZE: usize = 13;

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&self.key_code.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::check_len(bytes)?;
        Ok(Self {
            kind: KeyKind::from_byte(bytes[0])?,
            key_code: i32::from_le_bytes(bytes[1..5].try_into().unwrap()),
            timestamp: f64::from_le_bytes(bytes[5..13].try_into().unwrap()),
        })
    }
}

/// Pacing metadata for one captured frame.
///
/// The pixel payload itself goes to the video sink and is not
/// length-prefixed into any binary log; only this metadata is persisted
/// alongside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMeta {
    pub frame_index: u64,
    /// Seconds since the UNIX epoch.
    pub timestamp: f64,
}

impl Record for FrameMeta {
    // frame_index u64 + timestamp f64
    const SIZE: usize = 16;

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.frame_index.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::check_len(bytes)?;
        Ok(Self {
            frame_index: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            timestamp: f64::from_le_bytes(bytes[8..16].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_round_trip() {
        let events = [
            PointerEvent {
                kind: PointerKind::Move,
                x: 640,
                y: -12,
                timestamp: 1700000000.125,
            },
            PointerEvent {
                kind: PointerKind::LeftDown,
                x: 0,
                y: 0,
                timestamp: 0.0,
            },
            PointerEvent {
                kind: PointerKind::Scroll,
                x: -1,
                y: 3,
                timestamp: 1700000001.5,
            },
            PointerEvent {
                kind: PointerKind::RightUp,
                x: i16::MAX,
                y: i16::MIN,
                timestamp: 1700000002.0009765625,
            },
        ];

        for event in events {
            let bytes = event.encode();
            assert_eq!(bytes.len(), PointerEvent::SIZE);
            assert_eq!(PointerEvent::decode(&bytes).unwrap(), event);
        }
    }

    #[test]
    fn test_pointer_wire_layout() {
        let event = PointerEvent {
            kind: PointerKind::LeftDown,
            x: 0x0102,
            y: -2,
            timestamp: 1.0,
        };
        let bytes = event.encode();
        assert_eq!(bytes[0], 1); // left-down kind byte
        assert_eq!(&bytes[1..3], &[0x02, 0x01]); // x little-endian
        assert_eq!(&bytes[3..5], &[0xFE, 0xFF]); // y two's complement
        assert_eq!(&bytes[5..13], &1.0f64.to_le_bytes());
    }

    #[test]
    fn test_key_round_trip() {
        let events = [
            KeyEvent {
                kind: KeyKind::Press,
                key_code: 30,
                timestamp: 1700000000.25,
            },
            KeyEvent {
                kind: KeyKind::Release,
                key_code: -1,
                timestamp: 1700000000.5,
            },
        ];

        for event in events {
            let bytes = event.encode();
            assert_eq!(bytes.len(), KeyEvent::SIZE);
            assert_eq!(KeyEvent::decode(&bytes).unwrap(), event);
        }
    }

    #[test]
    fn test_frame_meta_round_trip() {
        let meta = FrameMeta {
            frame_index: u64::MAX - 3,
            timestamp: 1700000123.75,
        };
        let bytes = meta.encode();
        assert_eq!(bytes.len(), FrameMeta::SIZE);
        assert_eq!(FrameMeta::decode(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_unknown_kind_byte_rejected() {
        let mut bytes = PointerEvent {
            kind: PointerKind::Move,
            x: 0,
            y: 0,
            timestamp: 0.0,
        }
        .encode();
        bytes[0] = 9;
        assert!(matches!(
            PointerEvent::decode(&bytes).unwrap_err(),
            InputTraceError::UnknownEvent {
                stream: "pointer",
                kind: 9
            }
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            KeyEvent::decode(&[0u8; 12]).unwrap_err(),
            InputTraceError::MalformedRecord {
                expected: 13,
                actual: 12
            }
        ));
    }
}
