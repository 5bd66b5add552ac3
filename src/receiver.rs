//! The driving finite-state machine: pumps bytes out of the `ByteQueue`
//! through the header and payload stages, arbitrates the cumulative-payload
//! cap, streams compressed fragments through the deflate collaborator, and
//! invokes the user's callbacks in frame-arrival order.

use crate::assembler::{decode_text, MessageAssembler};
use crate::codec;
use crate::config::ReceiverConfig;
use crate::deflate::{DeflateExt, PerMessageDeflate};
use crate::error::Error;
use crate::frame::{FrameHeader, OpCode};
use crate::header::{self, FirstTwoBytes};
use crate::queue::ByteQueue;
use bytes::BytesMut;
use log::{debug, error, trace};

/// The frame-level state, as opposed to `MessageAssembler`'s message-level
/// state: control frames advance only this, never the assembler.
enum State {
    WantHeader2,
    WantExtendedLen,
    WantMask,
    WantPayload,
    Dead,
}

type TextCallback = Box<dyn FnMut(String) + Send>;
type BinaryCallback = Box<dyn FnMut(Vec<u8>) + Send>;
type PingPongCallback = Box<dyn FnMut(Vec<u8>) + Send>;
type CloseCallback = Box<dyn FnMut(u16, String) + Send>;
type ErrorCallback = Box<dyn FnMut(String, u16) + Send>;

/// A push-driven WebSocket frame receiver.
///
/// The receiver owns no transport: a caller reads bytes from wherever they
/// come from (a socket, a test vector, a fuzz harness) and feeds them in via
/// [`Receiver::add`]. Completed messages and control frames are delivered
/// through the `on_*` callback fields, which the receiver nulls out after a
/// terminal error per the [`Error`] taxonomy.
pub struct Receiver {
    queue: ByteQueue,
    state: State,
    partial: Option<FirstTwoBytes>,
    cur_len: u64,
    cur_mask: Option<[u8; 4]>,
    assembler: MessageAssembler,
    max_payload: u64,
    deflate: Option<Box<dyn DeflateExt>>,
    dead: bool,

    pub on_text: Option<TextCallback>,
    pub on_binary: Option<BinaryCallback>,
    pub on_ping: Option<PingPongCallback>,
    pub on_pong: Option<PingPongCallback>,
    pub on_close: Option<CloseCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        let deflate: Option<Box<dyn DeflateExt>> = config
            .extensions
            .clone()
            .map(|params| Box::new(PerMessageDeflate::new(params, config.max_payload)) as Box<dyn DeflateExt>);

        Self {
            queue: ByteQueue::new(),
            state: State::WantHeader2,
            partial: None,
            cur_len: 0,
            cur_mask: None,
            assembler: MessageAssembler::new(),
            max_payload: config.max_payload,
            deflate,
            dead: false,
            on_text: None,
            on_binary: None,
            on_ping: None,
            on_pong: None,
            on_close: None,
            on_error: None,
        }
    }

    /// The sum of payload lengths of non-final fragments of the in-flight
    /// message; `0` whenever no message is in flight or immediately after a
    /// final data frame is dispatched. Exposed read-only for tests.
    pub fn total_payload_length(&self) -> u64 {
        self.assembler.total_payload_length()
    }

    /// `true` once a terminal error or a close frame has been processed;
    /// further `add()` calls are no-ops.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Pushes `chunk` onto the internal queue and pumps the state machine
    /// as far forward as the buffered bytes allow. Never panics and never
    /// returns an error: every failure surfaces through `on_error`.
    pub async fn add(&mut self, chunk: impl AsRef<[u8]>) {
        if self.dead {
            trace!("receiver is dead, dropping {} bytes", chunk.as_ref().len());
            return;
        }
        self.queue.push(BytesMut::from(chunk.as_ref()));
        self.pump().await;
    }

    /// Releases the deflate collaborator, clears in-flight fragments, nulls
    /// every callback, and marks the receiver dead. Idempotent.
    pub fn cleanup(&mut self) {
        self.assembler.abort();
        if let Some(deflate) = self.deflate.as_mut() {
            deflate.cleanup();
        }
        self.clear_callbacks();
        self.dead = true;
        self.state = State::Dead;
    }

    fn clear_callbacks(&mut self) {
        self.on_text = None;
        self.on_binary = None;
        self.on_ping = None;
        self.on_pong = None;
        self.on_close = None;
        self.on_error = None;
    }

    async fn pump(&mut self) {
        loop {
            match self.state {
                State::Dead => return,
                State::WantHeader2 => {
                    let Some(bytes) = self.queue.consume(2) else {
                        return;
                    };
                    match header::parse_first_two_bytes([bytes[0], bytes[1]]) {
                        Ok(parsed) => {
                            self.state = if parsed.len7 >= 126 {
                                State::WantExtendedLen
                            } else {
                                self.cur_len = parsed.len7 as u64;
                                if parsed.masked {
                                    State::WantMask
                                } else {
                                    State::WantPayload
                                }
                            };
                            self.partial = Some(parsed);
                        }
                        Err(e) => {
                            self.fail(e);
                            return;
                        }
                    }
                }
                State::WantExtendedLen => {
                    let len7 = self.partial.as_ref().expect("WantExtendedLen implies a parsed header").len7;
                    let need = if len7 == 126 { 2 } else { 8 };
                    let Some(bytes) = self.queue.consume(need) else {
                        return;
                    };
                    let len = if need == 2 {
                        codec::decode_len16([bytes[0], bytes[1]])
                    } else {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&bytes);
                        match codec::decode_len64(arr) {
                            Some(len) => len,
                            None => {
                                self.fail(Error::InvalidExtendedLength);
                                return;
                            }
                        }
                    };
                    self.cur_len = len;
                    let masked = self.partial.as_ref().expect("set above").masked;
                    self.state = if masked { State::WantMask } else { State::WantPayload };
                }
                State::WantMask => {
                    let Some(bytes) = self.queue.consume(4) else {
                        return;
                    };
                    let mut key = [0u8; 4];
                    key.copy_from_slice(&bytes);
                    self.cur_mask = Some(key);
                    self.state = State::WantPayload;
                }
                State::WantPayload => {
                    let len = self.cur_len as usize;
                    let Some(mut payload) = self.queue.consume(len) else {
                        return;
                    };

                    let parsed = self.partial.take().expect("WantPayload implies a parsed header");
                    let header = FrameHeader {
                        fin: parsed.fin,
                        rsv1: parsed.rsv1,
                        rsv2: parsed.rsv2,
                        rsv3: parsed.rsv3,
                        opcode: parsed.opcode,
                        masked: parsed.masked,
                        payload_len: self.cur_len,
                        mask_key: self.cur_mask,
                    };

                    if let Some(key) = header.mask_key {
                        codec::unmask(&mut payload, key, 0);
                    }

                    if let Err(e) = header::validate(&header, self.deflate.is_some(), self.assembler.in_progress()) {
                        self.fail(e);
                        return;
                    }

                    trace!(
                        "dispatching frame opcode={:?} fin={} len={}",
                        header.opcode,
                        header.fin,
                        header.payload_len
                    );

                    match self.dispatch(&header, payload).await {
                        Ok(()) => {}
                        Err(e) => {
                            self.fail(e);
                            return;
                        }
                    }

                    self.cur_mask = None;
                    self.cur_len = 0;
                    if !self.dead {
                        self.state = State::WantHeader2;
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, header: &FrameHeader, payload: Vec<u8>) -> Result<(), Error> {
        match header.opcode {
            OpCode::Close => {
                let (code, reason) = parse_close(&payload)?;
                debug!("close frame received: code={code} reason={reason:?}");
                if let Some(mut cb) = self.on_close.take() {
                    cb(code, reason);
                    self.on_close = Some(cb);
                }
                self.dead = true;
                self.state = State::Dead;
                Ok(())
            }
            OpCode::Ping => {
                if let Some(mut cb) = self.on_ping.take() {
                    cb(payload);
                    self.on_ping = Some(cb);
                }
                Ok(())
            }
            OpCode::Pong => {
                if let Some(mut cb) = self.on_pong.take() {
                    cb(payload);
                    self.on_pong = Some(cb);
                }
                Ok(())
            }
            OpCode::Text | OpCode::Binary => {
                if !self.assembler.in_progress() {
                    self.assembler.start(header.opcode, header.rsv1);
                }
                self.accumulate_and_maybe_finish(header.fin, payload).await
            }
            OpCode::Continue => self.accumulate_and_maybe_finish(header.fin, payload).await,
        }
    }

    async fn accumulate_and_maybe_finish(&mut self, is_final: bool, payload: Vec<u8>) -> Result<(), Error> {
        let decoded = if self.assembler.is_compressed() {
            let deflate = self
                .deflate
                .as_mut()
                .expect("a compressed message cannot start without a deflate collaborator");
            deflate.decompress(&payload, is_final).await?
        } else {
            payload
        };

        if self.max_payload > 0 {
            let projected = self.assembler.total_payload_length() + decoded.len() as u64;
            if projected > self.max_payload {
                return Err(Error::MaxMessageSize);
            }
        }

        self.assembler.append(&decoded, is_final);

        if is_final {
            let (opcode, bytes) = self.assembler.finish();
            match opcode {
                OpCode::Text => {
                    let text = decode_text(bytes)?;
                    if let Some(mut cb) = self.on_text.take() {
                        cb(text);
                        self.on_text = Some(cb);
                    }
                }
                OpCode::Binary => {
                    if let Some(mut cb) = self.on_binary.take() {
                        cb(bytes);
                        self.on_binary = Some(cb);
                    }
                }
                _ => unreachable!("finish() only ever completes a text or binary message"),
            }
        }

        Ok(())
    }

    /// The single terminal-error path: invokes `on_error` exactly once, then
    /// nulls every callback (including the one just invoked) and marks the
    /// receiver dead, so no further events are observable from the outside.
    fn fail(&mut self, error: Error) {
        if self.dead {
            return;
        }
        let code = error.close_code();
        let message = error.to_string();
        error!("receiver failing: {message} (close code {code})");

        self.assembler.abort();
        if let Some(deflate) = self.deflate.as_mut() {
            deflate.cleanup();
        }

        self.dead = true;
        self.state = State::Dead;

        if let Some(mut cb) = self.on_error.take() {
            cb(message, code);
        }
        self.clear_callbacks();
    }
}

fn parse_close(payload: &[u8]) -> Result<(u16, String), Error> {
    if payload.is_empty() {
        return Ok((1005, String::new()));
    }
    if payload.len() < 2 {
        return Err(Error::InvalidCloseFrame);
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = decode_text(payload[2..].to_vec())?;
    Ok((code, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn receiver(max_payload: u64) -> Receiver {
        Receiver::new(ReceiverConfig {
            max_payload,
            extensions: None,
        })
    }

    #[tokio::test]
    async fn unmasked_text_hello() {
        let mut r = receiver(0);
        let texts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let texts2 = texts.clone();
        r.on_text = Some(Box::new(move |t| texts2.lock().unwrap().push(t)));

        r.add(hex::decode("810548656c6c6f").unwrap()).await;

        assert_eq!(*texts.lock().unwrap(), vec!["Hello".to_string()]);
    }

    #[tokio::test]
    async fn empty_close_reports_synthetic_1005() {
        let mut r = receiver(0);
        let closes: Arc<Mutex<Vec<(u16, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let closes2 = closes.clone();
        r.on_close = Some(Box::new(move |code, reason| closes2.lock().unwrap().push((code, reason))));

        r.add(hex::decode("8800").unwrap()).await;

        assert_eq!(*closes.lock().unwrap(), vec![(1005, String::new())]);
        assert!(r.is_dead());
    }

    #[tokio::test]
    async fn masked_text_frame() {
        let mut r = receiver(0);
        let texts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let texts2 = texts.clone();
        r.on_text = Some(Box::new(move |t| texts2.lock().unwrap().push(t)));

        r.add(hex::decode("81933483a86801b992524fa1c60959e68a5216e6cb005ba1d5").unwrap())
            .await;

        assert_eq!(*texts.lock().unwrap(), vec!["5:::{\"name\":\"echo\"}".to_string()]);
    }

    #[tokio::test]
    async fn arbitrary_chunking_yields_identical_callbacks() {
        let frame = hex::decode("810548656c6c6f").unwrap();
        for split in 0..=frame.len() {
            let mut r = receiver(0);
            let texts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
            let texts2 = texts.clone();
            r.on_text = Some(Box::new(move |t| texts2.lock().unwrap().push(t)));

            r.add(&frame[..split]).await;
            r.add(&frame[split..]).await;

            assert_eq!(*texts.lock().unwrap(), vec!["Hello".to_string()], "split at {split}");
        }
    }

    #[tokio::test]
    async fn fragmented_message_with_interleaved_ping() {
        let mut r = receiver(0);
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let e1 = events.clone();
        r.on_text = Some(Box::new(move |t| e1.lock().unwrap().push(format!("text:{t}"))));
        let e2 = events.clone();
        r.on_ping = Some(Box::new(move |p| {
            e2.lock().unwrap().push(format!("ping:{}", String::from_utf8_lossy(&p)))
        }));

        let first_half = "A".repeat(150);
        let second_half = "A".repeat(150);

        let mut bytes = Vec::new();
        // fin=0, opcode=text, unmasked, len=150
        bytes.push(0x01);
        bytes.push(150);
        bytes.extend_from_slice(first_half.as_bytes());
        // ping, fin=1, len=5, "Hello"
        bytes.push(0x89);
        bytes.push(5);
        bytes.extend_from_slice(b"Hello");
        // continuation, fin=1, len=150
        bytes.push(0x80);
        bytes.push(150);
        bytes.extend_from_slice(second_half.as_bytes());

        r.add(bytes).await;

        let observed = events.lock().unwrap().clone();
        assert_eq!(observed.len(), 2);
        assert_eq!(observed[0], "ping:Hello");
        assert_eq!(observed[1], format!("text:{}", "A".repeat(300)));
    }

    #[tokio::test]
    async fn total_payload_length_during_fragmentation() {
        let mut r = receiver(10);
        let observations: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let obs2 = observations.clone();
        r.on_text = Some(Box::new(move |_| obs2.lock().unwrap().push(0)));

        observations.lock().unwrap().push(r.total_payload_length());
        r.add(hex::decode("01024865").unwrap()).await;
        observations.lock().unwrap().push(r.total_payload_length());
        r.add(hex::decode("80036c6c6f").unwrap()).await;
        observations.lock().unwrap().push(r.total_payload_length());

        assert_eq!(*observations.lock().unwrap(), vec![0, 2, 0]);
    }

    #[tokio::test]
    async fn oversized_message_triggers_1009_and_no_binary() {
        let mut r = receiver(20 * 1024);
        let errors: Arc<Mutex<Vec<(String, u16)>>> = Arc::new(Mutex::new(Vec::new()));
        let binaries: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        r.on_error = Some(Box::new(move |msg, code| e.lock().unwrap().push((msg, code))));
        let b = binaries.clone();
        r.on_binary = Some(Box::new(move |data| b.lock().unwrap().push(data)));

        let payload = vec![0x42u8; 200 * 1024];
        let mut masked = payload.clone();
        let key = [0x11, 0x22, 0x33, 0x44];
        codec::unmask(&mut masked, key, 0);

        let mut bytes = Vec::new();
        bytes.push(0x82); // fin=1, binary
        bytes.push(0x80 | 127);
        bytes.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        bytes.extend_from_slice(&key);
        bytes.extend_from_slice(&masked);

        r.add(bytes).await;

        assert_eq!(binaries.lock().unwrap().len(), 0);
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(errors.lock().unwrap()[0].1, 1009);
        assert!(r.is_dead());
    }

    #[tokio::test]
    async fn post_error_input_produces_no_further_callbacks() {
        let mut r = receiver(4);
        let errors: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));
        let texts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        r.on_error = Some(Box::new(move |_, code| e.lock().unwrap().push(code)));
        let t = texts.clone();
        r.on_text = Some(Box::new(move |s| t.lock().unwrap().push(s)));

        // oversized unmasked text frame (len 10 > max_payload 4)
        r.add(hex::decode("810a48656c6c6f576f726c").unwrap()).await;
        assert_eq!(*errors.lock().unwrap(), vec![1009]);
        assert!(r.on_error.is_none());

        r.add(hex::decode("810548656c6c6f").unwrap()).await;
        assert!(texts.lock().unwrap().is_empty());
    }
}
