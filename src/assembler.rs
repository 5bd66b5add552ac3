//! The in-flight-message half of the receiver's state: which data frames
//! belong together, how many bytes they carry, and how to turn them into a
//! delivered text/binary message. Control frames never touch this type —
//! see the design's distinction between "frame in flight" and "message in
//! flight".

use crate::error::Error;
use crate::frame::OpCode;

pub(crate) struct MessageAssembler {
    message_opcode: Option<OpCode>,
    compressed: bool,
    fragments: Vec<u8>,
    /// Sum of the payload lengths of non-final fragments seen so far for the
    /// in-flight message. Reset to 0 exactly once a final data frame has
    /// been dispatched (public via `Receiver::total_payload_length`).
    total_payload_length: u64,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            message_opcode: None,
            compressed: false,
            fragments: Vec::new(),
            total_payload_length: 0,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.message_opcode.is_some()
    }

    pub fn opcode(&self) -> Option<OpCode> {
        self.message_opcode
    }

    pub fn total_payload_length(&self) -> u64 {
        self.total_payload_length
    }

    pub fn start(&mut self, opcode: OpCode, compressed: bool) {
        debug_assert!(!self.in_progress());
        self.message_opcode = Some(opcode);
        self.compressed = compressed;
        self.fragments.clear();
    }

    /// Appends a decoded (unmasked, and already-decompressed-if-needed)
    /// payload chunk to the in-flight message, tracking the non-final
    /// running total used for the max-payload guard.
    pub fn append(&mut self, payload: &[u8], is_final: bool) {
        self.fragments.extend_from_slice(payload);
        if !is_final {
            self.total_payload_length += payload.len() as u64;
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Concatenates the accumulated fragments, clears the in-flight state,
    /// and resets `total_payload_length` to 0. Decompression (if the
    /// message was compressed) has already happened per-fragment by the
    /// time this is called; `finish` only deals with already-plain bytes.
    pub fn finish(&mut self) -> (OpCode, Vec<u8>) {
        let opcode = self
            .message_opcode
            .take()
            .expect("finish called with no message in progress");
        self.compressed = false;
        self.total_payload_length = 0;
        (opcode, std::mem::take(&mut self.fragments))
    }

    pub fn abort(&mut self) {
        self.message_opcode = None;
        self.compressed = false;
        self.fragments.clear();
        self.total_payload_length = 0;
    }
}

/// Decodes a finished message's bytes as UTF-8 for delivery via `on_text`.
pub(crate) fn decode_text(bytes: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(bytes).map_err(|source| Error::Utf8 { source })
}
