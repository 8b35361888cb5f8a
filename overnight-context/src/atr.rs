//! Average True Range over a fixed lookback, used to normalise price
//! deviations into comparable units for scoring.

use crate::bar::BarSource;

/// Simple-average ATR over `period` bars ending at `index`.
///
/// Returns 0.0 while fewer than `period` bars precede the index (warm-up) or
/// when the index is out of range; scoring treats a zero ATR as neutral.
pub fn average_true_range<S>(source: &S, index: usize, period: usize) -> f64
where
    S: BarSource + ?Sized,
{
    if period == 0 || index < period || index >= source.len() {
        return 0.0;
    }

    let mut sum = 0.0;
    for offset in 0..period {
        let idx = index - offset;
        let Some(bar) = source.bar(idx) else {
            continue;
        };
        let (high, low) = bar.ordered_range();
        if !high.is_finite() || !low.is_finite() {
            continue;
        }
        let prev_close = if idx > 0 {
            source.bar(idx - 1).map(|prev| prev.close).unwrap_or(bar.open)
        } else {
            bar.open
        };

        let tr = bar.true_range(prev_close);
        if tr.is_finite() {
            sum += tr;
        }
    }

    sum / period as f64
}
