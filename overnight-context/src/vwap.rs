//! Session-scoped volume-weighted average price with dispersion bands.
//!
//! The running state is O(1) per bar; bands recompute volume-weighted
//! variance over the session-to-date range because they depend on the final
//! VWAP of the range. Correct but not incremental.

use crate::bar::{Bar, BarSource};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Running VWAP accumulator, scoped to one session window and reset at every
/// session boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct VwapState {
    /// Σ(typical price × volume) over valid session bars.
    cumulative_tpv: f64,
    /// Σ(volume) over valid session bars.
    cumulative_volume: u64,
}

impl VwapState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state by scanning `[start_index, end_index]` (inclusive).
    ///
    /// Restart fallback: produces state identical to applying [`Self::update`]
    /// bar-by-bar from the session start.
    pub fn from_bars<S>(source: &S, start_index: usize, end_index: usize) -> Self
    where
        S: BarSource + ?Sized,
    {
        let mut state = Self::new();
        if start_index > end_index {
            return state;
        }
        for index in start_index..=end_index {
            if let Some(bar) = source.bar(index) {
                state.update(bar);
            }
        }
        state
    }

    /// Fold a bar into the running sums. Invalid bars leave the state
    /// unchanged so the current VWAP carries forward.
    pub fn update(&mut self, bar: &Bar) {
        if !bar.is_valid() {
            return;
        }
        let Some(typical) = bar.typical_price() else {
            return;
        };
        self.cumulative_tpv += typical * bar.volume as f64;
        self.cumulative_volume += bar.volume;
    }

    /// Current VWAP, `None` until at least one valid bar has been folded in.
    pub fn vwap(&self) -> Option<f64> {
        if self.cumulative_volume > 0 {
            Some(self.cumulative_tpv / self.cumulative_volume as f64)
        } else {
            None
        }
    }

    /// Total valid volume accumulated this session.
    pub fn cumulative_volume(&self) -> u64 {
        self.cumulative_volume
    }

    /// Zero the sums at a session boundary.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// VWAP dispersion bands at `vwap ± multiplier × stddev`.
#[derive(Debug, Clone, Copy, PartialEq, Constructor, Deserialize, Serialize)]
pub struct VwapBands {
    pub upper: f64,
    pub lower: f64,
    pub stddev: f64,
}

/// Standard-deviation bands over `[start_index, end_index]` around `vwap`.
///
/// Volume-weighted variance: Σ volume × (typical − vwap)² / Σ volume. Returns
/// `None` when `vwap` is non-finite or the range holds no valid volume.
pub fn vwap_bands<S>(
    source: &S,
    start_index: usize,
    end_index: usize,
    vwap: f64,
    multiplier: f64,
) -> Option<VwapBands>
where
    S: BarSource + ?Sized,
{
    if !vwap.is_finite() || start_index > end_index {
        return None;
    }

    let mut sum_squared_diff = 0.0;
    let mut total_volume = 0u64;

    for index in start_index..=end_index {
        let Some(bar) = source.bar(index) else {
            continue;
        };
        if !bar.is_valid() {
            continue;
        }
        let Some(typical) = bar.typical_price() else {
            continue;
        };
        sum_squared_diff += (typical - vwap).powi(2) * bar.volume as f64;
        total_volume += bar.volume;
    }

    if total_volume == 0 {
        return None;
    }

    let variance = sum_squared_diff / total_volume as f64;
    let stddev = variance.sqrt();

    Some(VwapBands::new(
        vwap + multiplier * stddev,
        vwap - multiplier * stddev,
        stddev,
    ))
}

/// Percent deviation of `price` from `vwap`, `None` when undefined.
pub fn deviation_pct(price: f64, vwap: f64) -> Option<f64> {
    if !price.is_finite() || !vwap.is_finite() || vwap == 0.0 {
        return None;
    }
    Some((price - vwap) / vwap * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(high: f64, low: f64, close: f64, volume: u64) -> Bar {
        Bar {
            time: Utc.with_ymd_and_hms(2024, 1, 8, 23, 0, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_single_bar_vwap_is_typical_price() {
        let mut state = VwapState::new();
        state.update(&bar(4500.50, 4500.00, 4500.25, 100));
        let vwap = state.vwap().unwrap();
        assert!((vwap - 4500.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_state_is_undefined() {
        let state = VwapState::new();
        assert!(state.vwap().is_none());
        assert_eq!(state.cumulative_volume(), 0);
    }

    #[test]
    fn test_invalid_bar_carries_vwap_forward() {
        let mut state = VwapState::new();
        state.update(&bar(101.0, 99.0, 100.0, 50));
        let before = state.vwap().unwrap();
        state.update(&bar(f64::NAN, 99.0, 100.0, 50));
        state.update(&bar(105.0, 104.0, 104.5, 0));
        assert!((state.vwap().unwrap() - before).abs() < 1e-12);
    }

    #[test]
    fn test_incremental_equals_full_rescan_at_every_index() {
        let bars = vec![
            bar(101.0, 99.0, 100.0, 120),
            bar(102.0, 100.0, 101.5, 80),
            bar(f64::NAN, 100.0, 101.0, 40), // skipped by both paths
            bar(103.0, 101.0, 102.0, 200),
            bar(102.5, 100.5, 101.0, 60),
        ];

        let mut incremental = VwapState::new();
        for (index, b) in bars.iter().enumerate() {
            incremental.update(b);
            let rescan = VwapState::from_bars(&bars, 0, index);
            assert_eq!(
                incremental.cumulative_volume(),
                rescan.cumulative_volume(),
                "volume diverged at index {index}"
            );
            match (incremental.vwap(), rescan.vwap()) {
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-12, "vwap diverged at {index}"),
                (a, b) => assert_eq!(a, b, "definedness diverged at index {index}"),
            }
        }
    }

    #[test]
    fn test_bands_single_bar_stddev_zero() {
        let bars = vec![bar(4500.50, 4500.00, 4500.25, 100)];
        let vwap = VwapState::from_bars(&bars, 0, 0).vwap().unwrap();
        let bands = vwap_bands(&bars, 0, 0, vwap, 2.0).unwrap();
        assert!(bands.stddev.abs() < 1e-9);
        assert!((bands.upper - vwap).abs() < 1e-9);
        assert!((bands.lower - vwap).abs() < 1e-9);
    }

    #[test]
    fn test_bands_weight_dispersion_by_volume() {
        // Typical prices 100 and 104 with volumes 300/100: vwap = 101,
        // variance = (300*1 + 100*9) / 400 = 3.
        let bars = vec![bar(100.0, 100.0, 100.0, 300), bar(104.0, 104.0, 104.0, 100)];
        let vwap = VwapState::from_bars(&bars, 0, 1).vwap().unwrap();
        assert!((vwap - 101.0).abs() < 1e-9);

        let bands = vwap_bands(&bars, 0, 1, vwap, 2.0).unwrap();
        let expected_stddev = 3.0f64.sqrt();
        assert!((bands.stddev - expected_stddev).abs() < 1e-9);
        assert!((bands.upper - (101.0 + 2.0 * expected_stddev)).abs() < 1e-9);
        assert!((bands.lower - (101.0 - 2.0 * expected_stddev)).abs() < 1e-9);
    }

    #[test]
    fn test_bands_undefined_without_valid_volume() {
        let bars = vec![bar(f64::NAN, 99.0, 100.0, 50)];
        assert!(vwap_bands(&bars, 0, 0, 100.0, 2.0).is_none());
        assert!(vwap_bands(&bars, 0, 0, f64::NAN, 2.0).is_none());
    }

    #[test]
    fn test_deviation_pct() {
        let deviation = deviation_pct(101.0, 100.0).unwrap();
        assert!((deviation - 1.0).abs() < 1e-9);
        assert!(deviation_pct(101.0, 0.0).is_none());
        assert!(deviation_pct(f64::NAN, 100.0).is_none());
    }
}
