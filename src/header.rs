//! Parses the 2-14 byte WebSocket frame header into a `FrameHeader`
//! descriptor, one piece at a time, and enforces the header-level
//! invariants from RFC 6455 §5.2. This module never touches the queue or
//! the payload; `receiver.rs` drives it with whatever bytes the queue
//! yields for each state.

use crate::error::Error;
use crate::frame::{FrameHeader, OpCode};

/// What byte 0 and byte 1 tell us before the extended length/mask key are
/// known.
pub(crate) struct FirstTwoBytes {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub masked: bool,
    /// The 7-bit length field: a literal length (0-125), or 126/127 marking
    /// that an extended length follows.
    pub len7: u8,
}

pub(crate) fn parse_first_two_bytes(header: [u8; 2]) -> Result<FirstTwoBytes, Error> {
    let byte0 = header[0];
    let byte1 = header[1];

    let fin = byte0 & 0b1000_0000 != 0;
    let rsv1 = byte0 & 0b0100_0000 != 0;
    let rsv2 = byte0 & 0b0010_0000 != 0;
    let rsv3 = byte0 & 0b0001_0000 != 0;
    let opcode = OpCode::from(byte0 & 0b0000_1111)?;

    let masked = byte1 & 0b1000_0000 != 0;
    let len7 = byte1 & 0b0111_1111;

    Ok(FirstTwoBytes {
        fin,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        masked,
        len7,
    })
}

/// Validates the header-level invariants that don't depend on payload
/// bytes: reserved bits, reserved opcodes (already rejected by
/// `OpCode::from`), control-frame fragmentation/size, and fragmentation
/// legality given whether a message is currently in flight.
pub(crate) fn validate(
    header: &FrameHeader,
    deflate_enabled: bool,
    message_in_progress: bool,
) -> Result<(), Error> {
    if header.rsv2 || header.rsv3 {
        return Err(Error::RSVNotZero);
    }

    if header.rsv1 {
        if !deflate_enabled {
            return Err(Error::RSVNotZero);
        }
        if header.opcode == OpCode::Continue {
            return Err(Error::CompressedContinuation);
        }
    }

    if header.opcode.is_control() {
        if !header.fin {
            return Err(Error::ControlFramesFragmented);
        }
        if header.payload_len > 125 {
            return Err(Error::ControlFramePayloadSize);
        }
        return Ok(());
    }

    match header.opcode {
        OpCode::Continue if !message_in_progress => Err(Error::InvalidContinuationFrame),
        OpCode::Text | OpCode::Binary if message_in_progress => Err(Error::FragmentedInProgress),
        _ => Ok(()),
    }
}
