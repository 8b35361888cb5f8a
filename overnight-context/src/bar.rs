//! OHLCV bar data model and the random-access bar source abstraction.
//!
//! Bars arrive from an external feed in non-decreasing timestamp order,
//! possibly with gaps or bad data. Validity rules here decide whether a bar
//! contributes to session aggregates; invalid bars are skipped, never fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single time-stamped OHLCV bar.
///
/// Price fields may be non-finite (NaN) when the upstream feed delivered bad
/// data; consumers must check [`Bar::is_valid`] before aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bar {
    /// Bar start time.
    pub time: DateTime<Utc>,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Traded volume in contracts / lots.
    pub volume: u64,
}

impl Bar {
    /// High and low with swap correction applied for feeds that deliver them
    /// inverted.
    #[inline]
    pub fn ordered_range(&self) -> (f64, f64) {
        if self.high < self.low {
            (self.low, self.high)
        } else {
            (self.high, self.low)
        }
    }

    /// A bar is valid when high/low/close are finite, volume is positive and
    /// the swap-corrected high is at least the low.
    pub fn is_valid(&self) -> bool {
        let (high, low) = self.ordered_range();
        high.is_finite() && low.is_finite() && self.close.is_finite() && self.volume > 0
    }

    /// Typical price (H+L+C)/3 after swap correction.
    ///
    /// Returns `None` when any component is non-finite.
    pub fn typical_price(&self) -> Option<f64> {
        let (high, low) = self.ordered_range();
        if !high.is_finite() || !low.is_finite() || !self.close.is_finite() {
            return None;
        }
        Some((high + low + self.close) / 3.0)
    }

    /// True Range against the previous close:
    /// max(H−L, |H−prevClose|, |L−prevClose|).
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let (high, low) = self.ordered_range();
        (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs())
    }
}

/// Random-access sequence of bars in chronological order.
///
/// Session resolution scans backward and forward from arbitrary indices, so
/// sources must support cheap indexed access.
pub trait BarSource {
    /// Number of bars in the source.
    fn len(&self) -> usize;

    /// Bar at `index`, or `None` when out of range.
    fn bar(&self, index: usize) -> Option<&Bar>;

    /// Check if the source holds no bars.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BarSource for [Bar] {
    fn len(&self) -> usize {
        <[Bar]>::len(self)
    }

    fn bar(&self, index: usize) -> Option<&Bar> {
        self.get(index)
    }
}

impl BarSource for Vec<Bar> {
    fn len(&self) -> usize {
        <[Bar]>::len(self)
    }

    fn bar(&self, index: usize) -> Option<&Bar> {
        self.as_slice().get(index)
    }
}
