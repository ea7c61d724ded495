use std::sync::Arc;

use crate::error::EegError;
use crate::limits::{PLAYBACK_SPEED, clamp_logged};
use crate::sample::{CHANNEL_COUNT, SampleVector};

/// Rows of channel values loaded ahead of playback.
///
/// Rows shorter than [`CHANNEL_COUNT`] are zero-padded, extra columns are
/// dropped and non-finite cells become zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayTable {
    rows: Vec<[f64; CHANNEL_COUNT]>,
}

impl ReplayTable {
    pub fn from_rows<R: AsRef<[f64]>>(rows: impl IntoIterator<Item = R>) -> Result<Self, EegError> {
        let rows: Vec<_> = rows
            .into_iter()
            .map(|row| {
                let mut out = [0.0; CHANNEL_COUNT];
                for (dst, &v) in out.iter_mut().zip(row.as_ref()) {
                    *dst = if v.is_finite() { v } else { 0.0 };
                }
                out
            })
            .collect();
        if rows.is_empty() {
            return Err(EegError::Table("replay table has no rows".into()));
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[f64; CHANNEL_COUNT]> {
        self.rows.get(index)
    }
}

/// Emits table rows in order, looping back to the first row forever.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    table: Arc<ReplayTable>,
    cursor: usize,
    speed: f64,
}

impl ReplaySource {
    pub fn new(table: impl Into<Arc<ReplayTable>>) -> Self {
        Self {
            table: table.into(),
            cursor: 0,
            speed: 1.0,
        }
    }

    pub fn table(&self) -> &ReplayTable {
        &self.table
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Set the playback multiplier (0.5–5.0, clamped). Returns the value applied.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        self.speed = clamp_logged("playback_speed", speed, PLAYBACK_SPEED);
        self.speed
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn produce(&mut self) -> SampleVector {
        if self.cursor >= self.table.len() {
            self.cursor = 0;
        }
        let sample = self
            .table
            .row(self.cursor)
            .map(|row| SampleVector::from_channels(*row))
            .unwrap_or_default();
        self.cursor += 1;
        sample
    }
}
