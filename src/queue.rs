use bytes::{Buf, BytesMut};
use std::collections::VecDeque;

/// An append-and-consume buffer of owned byte chunks.
///
/// This is the only buffering layer in the receiver: every stage above it
/// (`header`, `assembler`, `receiver`) works in terms of "give me exactly N
/// bytes" and never inspects the raw chunks `add()` was called with. A span
/// that straddles more than one pushed chunk is copied into a fresh buffer;
/// a span that fits entirely inside the front chunk is split out with no
/// copy beyond the `BytesMut` split itself.
#[derive(Default)]
pub(crate) struct ByteQueue {
    chunks: VecDeque<BytesMut>,
    len: usize,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, chunk: impl Into<BytesMut>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn has(&self, n: usize) -> bool {
        self.len >= n
    }

    /// Returns a copy of the next `n` bytes without removing them from the
    /// queue, or `None` if fewer than `n` bytes are buffered.
    pub fn peek(&self, n: usize) -> Option<Vec<u8>> {
        if !self.has(n) {
            return None;
        }
        if let Some(front) = self.chunks.front() {
            if front.len() >= n {
                return Some(front[..n].to_vec());
            }
        }
        let mut out = Vec::with_capacity(n);
        for chunk in &self.chunks {
            if out.len() == n {
                break;
            }
            let need = n - out.len();
            let take = need.min(chunk.len());
            out.extend_from_slice(&chunk[..take]);
        }
        Some(out)
    }

    /// Removes and returns exactly `n` bytes, or `None` (leaving the queue
    /// untouched) if fewer than `n` bytes are buffered.
    pub fn consume(&mut self, n: usize) -> Option<Vec<u8>> {
        if !self.has(n) {
            return None;
        }
        if n == 0 {
            return Some(Vec::new());
        }
        if let Some(front) = self.chunks.front_mut() {
            if front.len() >= n {
                let taken = front.split_to(n);
                self.len -= n;
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                return Some(taken.to_vec());
            }
        }

        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let front = self
                .chunks
                .front_mut()
                .expect("len invariant guarantees enough chunks remain");
            let need = n - out.len();
            if front.len() <= need {
                out.extend_from_slice(front);
                self.len -= front.len();
                self.chunks.pop_front();
            } else {
                out.extend_from_slice(&front[..need]);
                front.advance(need);
                self.len -= need;
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_within_a_single_chunk() {
        let mut q = ByteQueue::new();
        q.push(BytesMut::from(&b"hello world"[..]));
        assert_eq!(q.consume(5).unwrap(), b"hello");
        assert_eq!(q.len(), 6);
        assert_eq!(q.consume(6).unwrap(), b" world");
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn consume_spanning_several_chunks() {
        let mut q = ByteQueue::new();
        q.push(BytesMut::from(&b"he"[..]));
        q.push(BytesMut::from(&b"ll"[..]));
        q.push(BytesMut::from(&b"o!"[..]));
        assert_eq!(q.consume(5).unwrap(), b"hello");
        assert_eq!(q.consume(1).unwrap(), b"!");
        assert!(q.consume(1).is_none());
    }

    #[test]
    fn consume_byte_at_a_time_across_chunks() {
        let mut q = ByteQueue::new();
        for b in b"abcdef" {
            q.push(BytesMut::from(&[*b][..]));
        }
        let mut out = Vec::new();
        while let Some(byte) = q.consume(1) {
            out.extend(byte);
        }
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn insufficient_bytes_leaves_queue_untouched() {
        let mut q = ByteQueue::new();
        q.push(BytesMut::from(&b"ab"[..]));
        assert!(q.consume(10).is_none());
        assert_eq!(q.len(), 2);
        assert_eq!(q.consume(2).unwrap(), b"ab");
    }

    #[test]
    fn peek_does_not_remove_bytes() {
        let mut q = ByteQueue::new();
        q.push(BytesMut::from(&b"abcdef"[..]));
        assert_eq!(q.peek(3).unwrap(), b"abc");
        assert_eq!(q.len(), 6);
        assert_eq!(q.consume(3).unwrap(), b"abc");
    }
}
