//! Fixed-capacity per-channel sample store for plotting and analysis.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::limits::{DEFAULT_BUFFER_CAPACITY, DEFAULT_SAMPLING_RATE_HZ};
use crate::sample::{CHANNEL_COUNT, LABEL_COUNT, SampleVector};

/// Channel magnitudes beyond this (µV) are treated as corrupt.
pub const CHANNEL_OUTLIER_UV: f64 = 1_000_000.0;
/// Label magnitudes beyond this are treated as corrupt.
pub const LABEL_OUTLIER: f64 = 1000.0;

/// A consistent copy of the buffer contents, oldest entry first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferSnapshot {
    pub channels: Vec<Vec<f64>>,
    pub labels: Vec<Vec<f64>>,
    pub time: Vec<f64>,
}

impl BufferSnapshot {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

struct Inner {
    capacity: usize,
    sampling_rate: f64,
    clock: f64,
    channels: Vec<VecDeque<f64>>,
    labels: Vec<VecDeque<f64>>,
    time: VecDeque<f64>,
}

impl Inner {
    fn new(capacity: usize, sampling_rate: f64) -> Self {
        Self {
            capacity,
            sampling_rate,
            clock: 0.0,
            channels: vec![VecDeque::with_capacity(capacity); CHANNEL_COUNT],
            labels: vec![VecDeque::with_capacity(capacity); LABEL_COUNT],
            time: VecDeque::with_capacity(capacity),
        }
    }

    fn stores_mut(&mut self) -> impl Iterator<Item = &mut VecDeque<f64>> {
        self.channels
            .iter_mut()
            .chain(self.labels.iter_mut())
            .chain(std::iter::once(&mut self.time))
    }

    fn trim_to(&mut self, capacity: usize) {
        for store in self.stores_mut() {
            while store.len() > capacity {
                store.pop_front();
            }
        }
    }
}

/// Circular store of decoded samples with a shared synthetic time axis.
///
/// Time advances by `1 / sampling_rate` per push rather than following
/// the wall clock, so gaps in delivery do not stretch the plot.
pub struct RingBuffer {
    inner: Mutex<Inner>,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::with_sampling_rate(capacity, DEFAULT_SAMPLING_RATE_HZ)
    }

    pub fn with_sampling_rate(capacity: usize, sampling_rate: f64) -> Self {
        let rate = if sampling_rate > 0.0 {
            sampling_rate
        } else {
            DEFAULT_SAMPLING_RATE_HZ
        };
        Self {
            inner: Mutex::new(Inner::new(capacity.max(1), rate)),
        }
    }

    /// Append one typed sample.
    pub fn push(&self, sample: &SampleVector) {
        let mut inner = self.inner.lock();
        let capacity = inner.capacity;

        for (store, &v) in inner.channels.iter_mut().zip(&sample.channels) {
            push_bounded(store, scrub(v, CHANNEL_OUTLIER_UV), capacity);
        }
        for (store, &v) in inner.labels.iter_mut().zip(&sample.labels) {
            push_bounded(store, scrub(v, LABEL_OUTLIER), capacity);
        }

        let t = inner.clock;
        push_bounded(&mut inner.time, t, capacity);
        let step = 1.0 / inner.sampling_rate;
        inner.clock += step;
    }

    /// Append values of unchecked length; short input is zero-padded and
    /// long input truncated, with a warning either way.
    pub fn push_raw(&self, channels: &[f64], labels: &[f64]) {
        if channels.len() != CHANNEL_COUNT {
            warn!(
                "expected {CHANNEL_COUNT} channels, got {}; adjusting",
                channels.len()
            );
        }
        if labels.len() != LABEL_COUNT {
            debug!("expected {LABEL_COUNT} labels, got {}", labels.len());
        }
        self.push(&SampleVector::from_slices(channels, labels));
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        let inner = self.inner.lock();
        BufferSnapshot {
            channels: inner.channels.iter().map(|c| c.iter().copied().collect()).collect(),
            labels: inner.labels.iter().map(|l| l.iter().copied().collect()).collect(),
            time: inner.time.iter().copied().collect(),
        }
    }

    /// Values of one channel, oldest first. `None` for an invalid index.
    pub fn channel(&self, index: usize) -> Option<Vec<f64>> {
        let inner = self.inner.lock();
        inner.channels.get(index).map(|c| c.iter().copied().collect())
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<SampleVector> {
        let inner = self.inner.lock();
        let mut sample = SampleVector::default();
        for (dst, store) in sample.channels.iter_mut().zip(&inner.channels) {
            *dst = *store.back()?;
        }
        for (dst, store) in sample.labels.iter_mut().zip(&inner.labels) {
            *dst = *store.back()?;
        }
        Some(sample)
    }

    /// Change capacity, keeping the most recent entries.
    pub fn resize(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut inner = self.inner.lock();
        inner.capacity = capacity;
        inner.trim_to(capacity);
    }

    /// Empty every store and restart the time axis at zero.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for store in inner.stores_mut() {
            store.clear();
        }
        inner.clock = 0.0;
    }

    /// Set the rate used to advance the time axis. Ignored unless positive.
    pub fn set_sampling_rate(&self, rate: f64) {
        if rate > 0.0 && rate.is_finite() {
            self.inner.lock().sampling_rate = rate;
        }
    }

    pub fn sampling_rate(&self) -> f64 {
        self.inner.lock().sampling_rate
    }

    pub fn len(&self) -> usize {
        self.inner.lock().time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}

fn scrub(value: f64, limit: f64) -> f64 {
    if value.is_finite() && value.abs() <= limit {
        value
    } else {
        0.0
    }
}

fn push_bounded(store: &mut VecDeque<f64>, value: f64, capacity: usize) {
    while store.len() >= capacity {
        store.pop_front();
    }
    store.push_back(value);
}

// ── Tests ────────────────────────────────────────────────────────
