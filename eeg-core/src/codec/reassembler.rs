//! Stream reassembly: arbitrary byte chunks in, whole sample vectors out.
//!
//! TCP gives no message boundaries, so frames may be split across reads,
//! glued together, or preceded by garbage. The reassembler keeps a single
//! accumulator and resynchronises on the header sentinel. Feeding the same
//! byte sequence in one chunk or one byte at a time yields the same frames.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use super::frame::{FOOTER, FRAME_LEN, FrameCodec, HEADER};
use crate::sample::SampleVector;

/// Counters describing what the reassembler has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    pub frames_decoded: u64,
    pub bytes_discarded: u64,
    /// Header/footer pairs whose distance did not match one frame.
    pub length_mismatches: u64,
    pub decode_failures: u64,
    /// Times the accumulator overflowed without finding a footer.
    pub overflow_resets: u64,
}

pub struct StreamReassembler {
    codec: FrameCodec,
    buf: BytesMut,
    stats: ReassemblerStats,
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new(FrameCodec::default())
    }
}

impl StreamReassembler {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            buf: BytesMut::with_capacity(FRAME_LEN * 4),
            stats: ReassemblerStats::default(),
        }
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Drop all buffered bytes, e.g. after a reconnect.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append `chunk` and return every complete frame now available, in
    /// stream order. Malformed data is dropped silently.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SampleVector> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            let Some(start) = find(&self.buf, &HEADER, 0) else {
                // Keep a possible split header at the tail.
                let keep = HEADER.len().min(self.buf.len());
                self.discard(self.buf.len() - keep);
                break;
            };
            if start > 0 {
                self.discard(start);
            }

            if self.buf.len() < FRAME_LEN {
                break;
            }

            let Some(footer_at) = self.locate_footer() else {
                if self.buf.len() > FRAME_LEN * 2 {
                    let excess = self.buf.len() - FRAME_LEN;
                    warn!("no footer in {} buffered bytes, resetting", self.buf.len());
                    self.stats.overflow_resets += 1;
                    self.discard(excess);
                }
                break;
            };

            if footer_at + FOOTER.len() != FRAME_LEN {
                debug!(
                    "header/footer span {} != {FRAME_LEN}, skipping false header",
                    footer_at + FOOTER.len()
                );
                self.stats.length_mismatches += 1;
                self.discard(HEADER.len());
                continue;
            }

            let frame = self.buf.split_to(FRAME_LEN);
            match self.codec.decode(&frame) {
                Ok(sample) => {
                    self.stats.frames_decoded += 1;
                    out.push(sample);
                }
                Err(e) => {
                    debug!("dropping frame: {e}");
                    self.stats.decode_failures += 1;
                    self.stats.bytes_discarded += FRAME_LEN as u64;
                }
            }
        }

        out
    }

    /// Footer position for the frame starting at offset 0.
    ///
    /// The footer is expected at the fixed end of the frame. Only when it
    /// is absent there is the rest of the buffer searched, so payload bytes
    /// that happen to spell the footer cannot mask a valid frame.
    fn locate_footer(&self) -> Option<usize> {
        let expected = FRAME_LEN - FOOTER.len();
        if self.buf[expected..FRAME_LEN] == FOOTER {
            return Some(expected);
        }
        find(&self.buf, &FOOTER, HEADER.len())
    }

    fn discard(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.buf.advance(n);
        self.stats.bytes_discarded += n as u64;
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

// ── Tests ────────────────────────────────────────────────────────
