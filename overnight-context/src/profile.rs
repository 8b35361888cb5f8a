//! Session volume profile: price-level histogram, point of control and
//! value area.
//!
//! Each bar's volume is spread across discretised price levels with a
//! Gaussian kernel centred on the close, then merged into a histogram keyed
//! by integer tick index. Integer keys make traversal order and POC
//! tie-breaking deterministic: the ascending scan with a strict comparison
//! always settles ties on the lowest price.

use crate::bar::BarSource;
use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use tracing::trace;

/// Default cap on distribution levels per bar. Anomalously wide bars widen
/// the effective spacing instead of exceeding the cap.
pub const DEFAULT_MAX_LEVELS: usize = 1000;

/// Fraction of total volume the value area must cover.
const VALUE_AREA_FRACTION: f64 = 0.7;

/// Gaussian kernel sigma as a fraction of the bar's range.
const KERNEL_SIGMA: f64 = 0.3;

/// Volume distribution across discretised price levels for one session.
///
/// Prices are stored as integer multiples of the tick size; accessors convert
/// back to price space. POC/VAH/VAL are `0.0` when the profile is empty.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolumeProfile {
    levels: BTreeMap<i64, u64>,
    tick_size: f64,
    total_volume: u64,
    poc_tick: Option<i64>,
    vah_tick: Option<i64>,
    val_tick: Option<i64>,
}

impl VolumeProfile {
    /// Empty profile: all derived values degrade to zero.
    pub fn empty(tick_size: f64) -> Self {
        Self {
            levels: BTreeMap::new(),
            tick_size,
            total_volume: 0,
            poc_tick: None,
            vah_tick: None,
            val_tick: None,
        }
    }

    fn tick_to_price(&self, tick: i64) -> f64 {
        tick as f64 * self.tick_size
    }

    fn price_to_tick(&self, price: f64) -> i64 {
        (price / self.tick_size).round() as i64
    }

    /// Merge volume into the level nearest to `price`.
    fn add_volume(&mut self, price: f64, volume: u64) {
        if volume == 0 {
            return;
        }
        *self.levels.entry(self.price_to_tick(price)).or_insert(0) += volume;
        self.total_volume += volume;
    }

    /// Point of control: the price level holding maximal volume. Ties break
    /// to the lowest price.
    pub fn poc(&self) -> f64 {
        self.poc_tick.map(|t| self.tick_to_price(t)).unwrap_or(0.0)
    }

    /// Value area high.
    pub fn vah(&self) -> f64 {
        self.vah_tick.map(|t| self.tick_to_price(t)).unwrap_or(0.0)
    }

    /// Value area low.
    pub fn val(&self) -> f64 {
        self.val_tick.map(|t| self.tick_to_price(t)).unwrap_or(0.0)
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    pub fn total_volume(&self) -> u64 {
        self.total_volume
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Ascending traversal of (price, volume) levels.
    pub fn levels(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.levels.iter().map(|(t, v)| (self.tick_to_price(*t), *v))
    }

    /// Width of the value area band, zero when undefined.
    pub fn value_area_width(&self) -> f64 {
        match (self.vah_tick, self.val_tick) {
            (Some(vah), Some(val)) => self.tick_to_price(vah) - self.tick_to_price(val),
            _ => 0.0,
        }
    }

    /// Check whether a price sits inside [VAL, VAH].
    pub fn is_in_value_area(&self, price: f64) -> bool {
        match (self.vah_tick, self.val_tick) {
            (Some(vah), Some(val)) => {
                price.is_finite()
                    && price >= self.tick_to_price(val)
                    && price <= self.tick_to_price(vah)
            }
            _ => false,
        }
    }

    /// Net balance of volume above versus at-or-below the histogram midpoint,
    /// in [−1, +1]. Negative means volume concentrated at lower prices.
    pub fn volume_balance(&self) -> f64 {
        if self.levels.is_empty() || self.total_volume == 0 {
            return 0.0;
        }
        // first/last keys exist for a non-empty map
        let lowest = *self.levels.keys().next().unwrap_or(&0);
        let highest = *self.levels.keys().next_back().unwrap_or(&0);

        let mut upper: u64 = 0;
        let mut lower: u64 = 0;
        for (tick, volume) in &self.levels {
            // tick > (lowest + highest) / 2, kept in integers
            if 2 * tick > lowest + highest {
                upper += volume;
            } else {
                lower += volume;
            }
        }

        (upper as f64 - lower as f64) / self.total_volume as f64
    }

    /// Sum of volume across levels in [VAL, VAH].
    pub fn value_area_volume(&self) -> u64 {
        match (self.val_tick, self.vah_tick) {
            (Some(val), Some(vah)) => self.levels.range(val..=vah).map(|(_, v)| *v).sum(),
            _ => 0,
        }
    }

    /// Derive POC and value area after all bars have been merged.
    ///
    /// Value area: seed with the POC level, then repeatedly accept whichever
    /// adjacent unselected level holds more volume (ties expand upward) until
    /// the accepted set covers at least 70% of total volume or both sides are
    /// exhausted.
    fn calculate_value_area(&mut self) {
        if self.levels.is_empty() {
            return;
        }

        let mut poc_tick = None;
        let mut poc_volume = 0u64;
        for (tick, volume) in &self.levels {
            // strict comparison keeps the lowest price among tied maxima
            if *volume > poc_volume {
                poc_volume = *volume;
                poc_tick = Some(*tick);
            }
        }
        let Some(poc) = poc_tick else {
            return;
        };

        let target = self.total_volume as f64 * VALUE_AREA_FRACTION;
        let mut accumulated = poc_volume as f64;
        let mut upper = poc;
        let mut lower = poc;

        while accumulated < target {
            let next_upper = self
                .levels
                .range((Excluded(upper), Unbounded))
                .next()
                .map(|(t, v)| (*t, *v));
            let next_lower = self
                .levels
                .range((Unbounded, Excluded(lower)))
                .next_back()
                .map(|(t, v)| (*t, *v));

            match (next_upper, next_lower) {
                (Some((tick, volume)), Some((_, lower_volume))) if volume >= lower_volume => {
                    upper = tick;
                    accumulated += volume as f64;
                }
                (Some((tick, volume)), None) => {
                    upper = tick;
                    accumulated += volume as f64;
                }
                (_, Some((tick, volume))) => {
                    lower = tick;
                    accumulated += volume as f64;
                }
                (None, None) => break,
            }
        }

        self.poc_tick = Some(poc);
        self.vah_tick = Some(upper);
        self.val_tick = Some(lower);
    }
}

/// Builds a [`VolumeProfile`] over a contiguous bar range.
#[derive(Debug, Clone, Copy)]
pub struct VolumeProfileBuilder {
    tick_size: f64,
    max_levels: usize,
}

impl VolumeProfileBuilder {
    pub fn new(tick_size: f64) -> Result<Self, ContextError> {
        if !tick_size.is_finite() || tick_size <= 0.0 {
            return Err(ContextError::InvalidTickSize(tick_size));
        }
        Ok(Self {
            tick_size,
            max_levels: DEFAULT_MAX_LEVELS,
        })
    }

    /// Override the per-bar distribution level cap (minimum 2).
    pub fn with_max_levels(mut self, max_levels: usize) -> Result<Self, ContextError> {
        if max_levels < 2 {
            return Err(ContextError::InvalidLevelCap(max_levels));
        }
        self.max_levels = max_levels;
        Ok(self)
    }

    /// Build the profile over `[start_index, end_index]` (inclusive). Invalid
    /// bars contribute nothing; an empty or fully-invalid range yields an
    /// empty profile with zero-valued POC/VAH/VAL, not an error.
    pub fn build<S>(&self, source: &S, start_index: usize, end_index: usize) -> VolumeProfile
    where
        S: BarSource + ?Sized,
    {
        let mut profile = VolumeProfile::empty(self.tick_size);

        if start_index > end_index || start_index >= source.len() {
            return profile;
        }

        for index in start_index..=end_index {
            let Some(bar) = source.bar(index) else {
                continue;
            };
            if !bar.is_valid() {
                trace!(index, "skipping invalid bar in profile build");
                continue;
            }
            let (high, low) = bar.ordered_range();
            self.distribute(&mut profile, high, low, bar.close, bar.volume);
        }

        profile.calculate_value_area();
        profile
    }

    /// Spread one bar's volume across its price range.
    ///
    /// Level weights follow a Gaussian kernel centred on the close with sigma
    /// at 0.3 of the bar's range. Integer conservation is exact: every level
    /// but the last receives its rounded share (capped at the remaining
    /// volume) and the last level absorbs the remainder.
    fn distribute(&self, profile: &mut VolumeProfile, high: f64, low: f64, close: f64, volume: u64) {
        if volume == 0 {
            return;
        }

        if high == low {
            profile.add_volume(close, volume);
            return;
        }

        // level count stays in f64 until after the cap: a wide enough range
        // would saturate the integer cast
        let mut spacing = self.tick_size;
        let natural_levels = ((high - low) / spacing).round() + 1.0;
        let level_count = if natural_levels > self.max_levels as f64 {
            // Resolution/performance trade-off for anomalously wide bars:
            // widen spacing so exactly max_levels span the range.
            spacing = (high - low) / (self.max_levels - 1) as f64;
            self.max_levels
        } else {
            natural_levels as usize
        };

        let range = high - low;
        let mut weights = Vec::with_capacity(level_count);
        let mut total_weight = 0.0;
        for level in 0..level_count {
            let price = (low + level as f64 * spacing).min(high);
            let distance = (price - close).abs() / range;
            let weight = (-distance.powi(2) / (2.0 * KERNEL_SIGMA * KERNEL_SIGMA)).exp();
            weights.push(weight);
            total_weight += weight;
        }

        let mut distributed = 0u64;
        for (level, weight) in weights.iter().enumerate() {
            let price = (low + level as f64 * spacing).min(high);
            let level_volume = if level == level_count - 1 {
                volume - distributed
            } else {
                let share = (volume as f64 * (weight / total_weight)).round() as u64;
                let share = share.min(volume - distributed);
                distributed += share;
                share
            };
            profile.add_volume(price, level_volume);
        }
    }
}
