use std::f64::consts::PI;

use crate::error::EegError;
use crate::limits::{
    AMPLITUDE_UV, DEFAULT_SAMPLING_RATE_HZ, FREQUENCY_HZ, SAMPLING_RATE_HZ, clamp_logged,
};
use crate::sample::{CHANNEL_COUNT, SampleVector};

pub const DEFAULT_FREQUENCY_HZ: f64 = 10.0;
pub const DEFAULT_AMPLITUDE_UV: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelParams {
    pub frequency_hz: f64,
    pub amplitude_uv: f64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            amplitude_uv: DEFAULT_AMPLITUDE_UV,
        }
    }
}

/// Per-channel three-harmonic sine composite:
/// `A·sin(2πft) + A/3·sin(6πft) + A/5·sin(10πft)` with `t = index / rate`.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    params: [ChannelParams; CHANNEL_COUNT],
    sampling_rate: f64,
    index: u64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLING_RATE_HZ)
    }
}

impl SyntheticSource {
    /// The rate is clamped into 10..=1000 Hz.
    pub fn new(sampling_rate: f64) -> Self {
        Self {
            params: [ChannelParams::default(); CHANNEL_COUNT],
            sampling_rate: clamp_logged("sampling_rate", sampling_rate, SAMPLING_RATE_HZ),
            index: 0,
        }
    }

    /// Set frequency and amplitude of one channel, clamping both.
    pub fn set_channel_params(
        &mut self,
        channel: usize,
        frequency_hz: f64,
        amplitude_uv: f64,
    ) -> Result<ChannelParams, EegError> {
        let slot = self
            .params
            .get_mut(channel)
            .ok_or(EegError::InvalidState("channel index out of range"))?;
        *slot = ChannelParams {
            frequency_hz: clamp_logged("frequency", frequency_hz, FREQUENCY_HZ),
            amplitude_uv: clamp_logged("amplitude", amplitude_uv, AMPLITUDE_UV),
        };
        Ok(*slot)
    }

    pub fn params(&self, channel: usize) -> Option<ChannelParams> {
        self.params.get(channel).copied()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub(crate) fn set_sampling_rate(&mut self, rate: f64) {
        self.sampling_rate = rate;
    }

    /// Restart the waveform at t = 0.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn produce(&mut self) -> SampleVector {
        let t = self.index as f64 / self.sampling_rate;
        self.index += 1;

        let mut channels = [0.0; CHANNEL_COUNT];
        for (out, p) in channels.iter_mut().zip(&self.params) {
            let (a, f) = (p.amplitude_uv, p.frequency_hz);
            *out = a * (2.0 * PI * f * t).sin()
                + a / 3.0 * (6.0 * PI * f * t).sin()
                + a / 5.0 * (10.0 * PI * f * t).sin();
        }
        SampleVector::from_channels(channels)
    }
}
