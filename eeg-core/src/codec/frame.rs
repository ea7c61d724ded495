//! Fixed-layout binary frame for one sample vector.
//!
//! ## Wire format (34 bytes)
//!
//! ```text
//! header:   [0xA0, 0xFF]                  (2)
//! channels: 8 × i24 little-endian         (24)
//! labels:   2 × i24 little-endian         (6)
//! footer:   [0xC0, 0x00]                  (2)
//! ```
//!
//! Each value is `round(µV / reference × 8388607)` clamped to the i24
//! range; decoding maps it back with `raw × reference / 8388607`.

use crate::error::EegError;
use crate::sample::{CHANNEL_COUNT, LABEL_COUNT, SampleVector, VALUE_COUNT};

// ── Constants ────────────────────────────────────────────────────

pub const HEADER: [u8; 2] = [0xA0, 0xFF];
pub const FOOTER: [u8; 2] = [0xC0, 0x00];
pub const BYTES_PER_VALUE: usize = 3;
pub const PAYLOAD_LEN: usize = VALUE_COUNT * BYTES_PER_VALUE;
pub const FRAME_LEN: usize = HEADER.len() + PAYLOAD_LEN + FOOTER.len();

/// Largest positive i24, mapped to the reference voltage.
pub const FULL_SCALE: i32 = 8_388_607;
/// Smallest negative i24.
pub const MIN_RAW: i32 = -8_388_608;

pub const DEFAULT_REFERENCE_UV: f64 = 1000.0;

pub type FrameBytes = [u8; FRAME_LEN];

// ── Scalar helpers ───────────────────────────────────────────────

/// Scale a voltage to the signed 24-bit wire integer.
///
/// NaN and infinities become 0; out-of-range values saturate.
pub fn voltage_to_raw(voltage: f64, reference_uv: f64) -> i32 {
    if !voltage.is_finite() {
        return 0;
    }
    let scaled = (voltage / reference_uv * FULL_SCALE as f64).round();
    scaled.clamp(MIN_RAW as f64, FULL_SCALE as f64) as i32
}

pub fn raw_to_voltage(raw: i32, reference_uv: f64) -> f64 {
    raw as f64 * reference_uv / FULL_SCALE as f64
}

/// Two's-complement i24, little-endian.
pub fn write_i24_le(raw: i32) -> [u8; 3] {
    let bits = (raw as u32) & 0x00FF_FFFF;
    [bits as u8, (bits >> 8) as u8, (bits >> 16) as u8]
}

pub fn read_i24_le(bytes: [u8; 3]) -> i32 {
    let bits = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;
    if bits & 0x0080_0000 != 0 {
        bits as i32 - 0x0100_0000
    } else {
        bits as i32
    }
}

// ── FrameCodec ───────────────────────────────────────────────────

/// Stateless encoder/decoder for [`SampleVector`] frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCodec {
    reference_uv: f64,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            reference_uv: DEFAULT_REFERENCE_UV,
        }
    }
}

impl FrameCodec {
    /// Codec with a custom reference voltage (µV mapped to full scale).
    ///
    /// A non-positive or non-finite reference falls back to the default.
    pub fn with_reference(reference_uv: f64) -> Self {
        if reference_uv.is_finite() && reference_uv > 0.0 {
            Self { reference_uv }
        } else {
            tracing::warn!(
                "invalid reference voltage {reference_uv}; using {DEFAULT_REFERENCE_UV}"
            );
            Self::default()
        }
    }

    pub fn reference_uv(&self) -> f64 {
        self.reference_uv
    }

    /// Voltage represented by one LSB.
    pub fn quantum(&self) -> f64 {
        self.reference_uv / FULL_SCALE as f64
    }

    /// Encode one sample. Never fails; output length is always [`FRAME_LEN`].
    pub fn encode(&self, sample: &SampleVector) -> FrameBytes {
        let mut frame = [0u8; FRAME_LEN];
        frame[..HEADER.len()].copy_from_slice(&HEADER);

        let mut offset = HEADER.len();
        for value in sample.values() {
            let raw = voltage_to_raw(value, self.reference_uv);
            frame[offset..offset + BYTES_PER_VALUE].copy_from_slice(&write_i24_le(raw));
            offset += BYTES_PER_VALUE;
        }

        frame[offset..].copy_from_slice(&FOOTER);
        frame
    }

    /// Decode exactly one frame.
    pub fn decode(&self, frame: &[u8]) -> Result<SampleVector, EegError> {
        if frame.len() != FRAME_LEN {
            return Err(EegError::InvalidFrameLength {
                expected: FRAME_LEN,
                actual: frame.len(),
            });
        }
        if frame[..HEADER.len()] != HEADER {
            return Err(EegError::FrameFormat("bad header sentinel"));
        }
        if frame[FRAME_LEN - FOOTER.len()..] != FOOTER {
            return Err(EegError::FrameFormat("bad footer sentinel"));
        }

        let payload = &frame[HEADER.len()..HEADER.len() + PAYLOAD_LEN];
        let mut values = [0.0f64; VALUE_COUNT];
        for (slot, group) in values.iter_mut().zip(payload.chunks_exact(BYTES_PER_VALUE)) {
            let raw = read_i24_le([group[0], group[1], group[2]]);
            *slot = raw_to_voltage(raw, self.reference_uv);
        }

        let mut sample = SampleVector::default();
        sample.channels.copy_from_slice(&values[..CHANNEL_COUNT]);
        sample
            .labels
            .copy_from_slice(&values[CHANNEL_COUNT..CHANNEL_COUNT + LABEL_COUNT]);
        Ok(sample)
    }
}

// ── Tests ────────────────────────────────────────────────────────
