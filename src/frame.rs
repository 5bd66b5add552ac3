use crate::error::Error;

/// The opcode carried in the low nibble of a frame's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Maps a raw nibble to an `OpCode`, rejecting the reserved ranges
    /// (3-7, 11-15) per RFC 6455 §5.2.
    pub fn from(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

/// The structured contents of a frame header, parsed up to (but not
/// including) the payload bytes. Mirrors the wire layout byte for byte:
/// see `header::HeaderParser` for the incremental parse.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub masked: bool,
    pub payload_len: u64,
    pub mask_key: Option<[u8; 4]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips() {
        for raw in [0x0u8, 0x1, 0x2, 0x8, 0x9, 0xA] {
            let opcode = OpCode::from(raw).unwrap();
            assert_eq!(opcode.as_u8(), raw);
        }
    }

    #[test]
    fn reserved_opcodes_are_rejected() {
        for raw in [0x3u8, 0x4, 0x7, 0xB, 0xF] {
            match OpCode::from(raw) {
                Err(Error::InvalidOpcode(got)) => assert_eq!(got, raw),
                other => panic!("expected InvalidOpcode, got {other:?}"),
            }
        }
    }

    #[test]
    fn control_classification() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
        assert!(!OpCode::Continue.is_control());
    }
}
