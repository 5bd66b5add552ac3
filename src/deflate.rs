//! The permessage-deflate collaborator (RFC 7692).
//!
//! The receiver treats decompression as an external, pluggable, asynchronous
//! collaborator rather than baking `flate2` into the state machine: the
//! `DeflateExt` trait is the seam, and `PerMessageDeflate` is the bundled
//! implementation built the way `socket-flow`'s `decoder.rs` builds its
//! streaming zlib wrapper. Handshake-time extension negotiation is out of
//! scope for this crate (a pre-negotiated `DeflateParams` is injected at
//! construction time); only the runtime streaming contract lives here.

use crate::error::Error;
use flate2::{Decompress, FlushDecompress, Status};
use futures::future::BoxFuture;
use futures::FutureExt;

const DEFLATE_TRAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Negotiated permessage-deflate parameters, in the shape `socket-flow`'s
/// `extensions.rs` parses off the `Sec-WebSocket-Extensions` header. This
/// crate never performs that negotiation itself — a caller that does own
/// the handshake hands the agreed-upon parameters to `ReceiverConfig`.
#[derive(Debug, Clone, Default)]
pub struct DeflateParams {
    /// Reset the decompression context after every message rather than
    /// keeping the sliding window across messages.
    pub no_context_takeover: bool,
    /// The deflate window size the peer compresses with, 8..=15. `None`
    /// means the default (15) window.
    pub max_window_bits: Option<u8>,
}

/// The asynchronous streaming decompressor contract a receiver can be
/// configured with. Modeled as a trait so tests can substitute a
/// deterministic fake, and so a future non-`flate2` backend is a drop-in.
///
/// Object safety is achieved with `BoxFuture` rather than `async-trait`,
/// since the crate already depends on `futures` for this purpose elsewhere.
pub trait DeflateExt: Send {
    /// Decompresses one message fragment. `fin` marks the last fragment of
    /// the message; on `fin` the 4-byte `0x00 0x00 0xFF 0xFF` tail is
    /// appended internally and, unless `no_context_takeover` keeps the
    /// window, the decompressor resets for the next message.
    fn decompress<'a>(&'a mut self, chunk: &'a [u8], fin: bool) -> BoxFuture<'a, Result<Vec<u8>, Error>>;

    /// Releases the decompressor's internal state. Invoked exactly once,
    /// from `Receiver::cleanup`.
    fn cleanup(&mut self);
}

fn buffer_size_for(payload_len: usize) -> usize {
    if payload_len <= 4096 {
        4096
    } else if payload_len <= 65536 {
        16384
    } else {
        65536
    }
}

/// The bundled `flate2`-backed permessage-deflate collaborator.
pub struct PerMessageDeflate {
    decompressor: Decompress,
    params: DeflateParams,
    max_payload: u64,
    accumulated: u64,
}

impl PerMessageDeflate {
    pub fn new(params: DeflateParams, max_payload: u64) -> Self {
        let decompressor = match params.max_window_bits {
            Some(bits) => Decompress::new_with_window_bits(false, bits),
            None => Decompress::new(false),
        };
        Self {
            decompressor,
            params,
            max_payload,
            accumulated: 0,
        }
    }

    fn decompress_sync(&mut self, chunk: &[u8], fin: bool) -> Result<Vec<u8>, Error> {
        let mut input = chunk.to_vec();
        if fin {
            input.extend_from_slice(&DEFLATE_TRAIL);
        }

        let buffer_size = buffer_size_for(input.len());
        let mut out = Vec::new();
        let mut scratch = vec![0u8; buffer_size];
        let flush = if fin {
            FlushDecompress::Sync
        } else {
            FlushDecompress::None
        };

        let before_in = self.decompressor.total_in();
        loop {
            let consumed = (self.decompressor.total_in() - before_in) as usize;
            if consumed >= input.len() {
                break;
            }
            let before_out = self.decompressor.total_out();
            let status = self
                .decompressor
                .decompress(&input[consumed..], &mut scratch, flush)
                .map_err(|e| Error::ExtensionError(e.to_string()))?;
            let produced = (self.decompressor.total_out() - before_out) as usize;

            if self.max_payload > 0 && self.accumulated + produced as u64 > self.max_payload {
                return Err(Error::ExtensionMaxMessageSize);
            }
            self.accumulated += produced as u64;
            out.extend_from_slice(&scratch[..produced]);

            match status {
                Status::StreamEnd => break,
                Status::BufError => break,
                Status::Ok => {
                    if produced == 0 {
                        // No forward progress without more input.
                        break;
                    }
                }
            }
        }

        if fin {
            if self.params.no_context_takeover {
                self.decompressor.reset(false);
            }
            self.accumulated = 0;
        }

        Ok(out)
    }
}

impl DeflateExt for PerMessageDeflate {
    fn decompress<'a>(&'a mut self, chunk: &'a [u8], fin: bool) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        // flate2's Decompress is CPU-bound and synchronous; the trait is
        // still asynchronous so a collaborator backed by e.g. a worker pool
        // or an external process can suspend the receiver's pump loop
        // without changing its call site.
        async move { self.decompress_sync(chunk, fin) }.boxed()
    }

    fn cleanup(&mut self) {
        self.accumulated = 0;
    }
}
