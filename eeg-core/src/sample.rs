//! The sample vector carried by every frame.

use serde::{Deserialize, Serialize};

/// Number of EEG channels per sample.
pub const CHANNEL_COUNT: usize = 8;
/// Number of auxiliary label slots per sample.
pub const LABEL_COUNT: usize = 2;
/// Total values carried by one sample (channels + labels).
pub const VALUE_COUNT: usize = CHANNEL_COUNT + LABEL_COUNT;

/// One sampling tick: 8 channel voltages (µV) and 2 label values.
///
/// The shape is fixed at the type level; inputs of any other length go
/// through [`SampleVector::from_slices`], which pads with zero or truncates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleVector {
    pub channels: [f64; CHANNEL_COUNT],
    pub labels: [f64; LABEL_COUNT],
}

impl SampleVector {
    pub fn new(channels: [f64; CHANNEL_COUNT], labels: [f64; LABEL_COUNT]) -> Self {
        Self { channels, labels }
    }

    /// A sample with the given channels and zeroed labels.
    pub fn from_channels(channels: [f64; CHANNEL_COUNT]) -> Self {
        Self {
            channels,
            labels: [0.0; LABEL_COUNT],
        }
    }

    /// Build a sample from arbitrary-length slices, zero-padding short
    /// inputs and dropping extra values.
    pub fn from_slices(channels: &[f64], labels: &[f64]) -> Self {
        let mut sample = Self::default();
        for (dst, src) in sample.channels.iter_mut().zip(channels) {
            *dst = *src;
        }
        for (dst, src) in sample.labels.iter_mut().zip(labels) {
            *dst = *src;
        }
        sample
    }

    /// Replace every non-finite value with zero.
    pub fn sanitized(mut self) -> Self {
        for v in self.channels.iter_mut().chain(self.labels.iter_mut()) {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        self
    }

    /// Iterate over all ten values in wire order (channels, then labels).
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.channels.iter().chain(self.labels.iter()).copied()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_zero_padded() {
        let s = SampleVector::from_slices(&[1.0, 2.0, 3.0], &[]);
        assert_eq!(s.channels, [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(s.labels, [0.0, 0.0]);
    }

    #[test]
    fn long_input_is_truncated() {
        let chans: Vec<f64> = (0..12).map(f64::from).collect();
        let s = SampleVector::from_slices(&chans, &[7.0, 8.0, 9.0]);
        assert_eq!(s.channels[7], 7.0);
        assert_eq!(s.labels, [7.0, 8.0]);
    }

    #[test]
    fn sanitize_replaces_non_finite() {
        let mut s = SampleVector::default();
        s.channels[0] = f64::NAN;
        s.channels[1] = f64::INFINITY;
        s.labels[1] = f64::NEG_INFINITY;
        s.channels[2] = 12.5;
        let s = s.sanitized();
        assert_eq!(s.channels[0], 0.0);
        assert_eq!(s.channels[1], 0.0);
        assert_eq!(s.labels[1], 0.0);
        assert_eq!(s.channels[2], 12.5);
    }

    #[test]
    fn values_are_in_wire_order() {
        let s = SampleVector::new([1.0; CHANNEL_COUNT], [2.0; LABEL_COUNT]);
        let v: Vec<f64> = s.values().collect();
        assert_eq!(v.len(), VALUE_COUNT);
        assert_eq!(v[7], 1.0);
        assert_eq!(v[8], 2.0);
    }
}
