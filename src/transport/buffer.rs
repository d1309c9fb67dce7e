// MIT License - Copyright (c) 2026 Peter Wright
// Inbound reassembly buffer

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::Protocol;
use crate::constants::FRAME_HEARTBEAT;
use crate::frame::{self, DecodeError, Frame};
use crate::isecnet::{self, Packet};

/// One complete unit pulled off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Frame(Frame),
    Packet(Packet),
}

impl Decoded {
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::Frame(frame) => &frame.raw,
            Self::Packet(packet) => &packet.raw,
        }
    }
}

/// Accumulates socket reads and yields complete frames.
///
/// A lone `0xF7` at the head is the legacy keepalive and comes out as a
/// heartbeat frame of its own. A bad checksum or an implausible length drops
/// a single byte and rescans.
/// A partial frame that stays incomplete for longer than the reassembly
/// timeout is discarded byte by byte, unless a later offset already holds a
/// complete frame ending at the buffer tail.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    protocol: Protocol,
    frame_timeout: Duration,
    /// When the bytes at the head started waiting for completion
    partial_since: Option<Instant>,
    discarded: u64,
}

impl FrameBuffer {
    pub fn new(protocol: Protocol, frame_timeout: Duration) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            protocol,
            frame_timeout,
            partial_since: None,
            discarded: 0,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8], now: Instant) {
        if self.buf.is_empty() {
            self.partial_since = Some(now);
        }
        self.buf.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total number of bytes dropped while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// When a waiting partial frame will expire, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        if self.buf.is_empty() {
            return None;
        }
        self.partial_since.map(|since| since + self.frame_timeout)
    }

    /// Pull the next complete frame, resynchronizing past garbage.
    pub fn next_frame(&mut self, now: Instant) -> Option<Decoded> {
        loop {
            if self.buf.is_empty() {
                self.partial_since = None;
                return None;
            }

            // 0xF7 exceeds any legal length byte, so at the head it can only be
            // the unframed keepalive
            if self.protocol == Protocol::Legacy && self.buf[0] == FRAME_HEARTBEAT {
                self.buf.advance(1);
                self.partial_since = (!self.buf.is_empty()).then_some(now);
                return Some(Decoded::Frame(Frame::bare_heartbeat()));
            }

            match self.decode_at(0) {
                Ok((decoded, used)) => {
                    self.buf.advance(used);
                    self.partial_since = (!self.buf.is_empty()).then_some(now);
                    return Some(decoded);
                }
                Err(DecodeError::Checksum { expected, actual }) => {
                    trace!("Checksum mismatch (0x{:02X} != 0x{:02X}), resyncing", expected, actual);
                    self.drop_head(1);
                }
                Err(DecodeError::Oversized(len)) => {
                    trace!("Implausible length {}, resyncing", len);
                    self.drop_head(1);
                }
                Err(DecodeError::Incomplete) => {
                    if let Some(offset) = self.complete_tail_frame() {
                        debug!("Skipping {} bytes ahead of a complete frame", offset);
                        self.drop_head(offset);
                        continue;
                    }
                    let since = *self.partial_since.get_or_insert(now);
                    if now.duration_since(since) >= self.frame_timeout {
                        trace!("Partial frame expired ({} bytes buffered)", self.buf.len());
                        self.drop_head(1);
                        continue;
                    }
                    return None;
                }
            }
        }
    }

    fn decode_at(&self, offset: usize) -> Result<(Decoded, usize), DecodeError> {
        let bytes = &self.buf[offset..];
        match self.protocol {
            Protocol::Legacy => frame::decode(bytes).map(|(f, n)| (Decoded::Frame(f), n)),
            Protocol::IsecNet2 => isecnet::decode_packet(bytes).map(|(p, n)| (Decoded::Packet(p), n)),
        }
    }

    /// Offset of a later frame that decodes cleanly and ends exactly at the tail.
    fn complete_tail_frame(&self) -> Option<usize> {
        (1..self.buf.len()).find(|&offset| {
            matches!(self.decode_at(offset), Ok((_, used)) if offset + used == self.buf.len())
        })
    }

    fn drop_head(&mut self, count: usize) {
        self.buf.advance(count);
        self.discarded += count as u64;
    }
}
