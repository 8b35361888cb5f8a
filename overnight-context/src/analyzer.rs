//! Per-bar driver tying session classification, VWAP, volume profile and
//! scoring together.
//!
//! One analyzer instance owns the state for one instrument. Feed bars in
//! chronological order via [`OvernightContextAnalyzer::on_bar`]; overnight
//! bars yield a [`MarketContextSnapshot`], RTH bars yield `None`. All session
//! state is explicit and owned here, so replaying the same bar sequence from
//! any starting point reproduces identical results.

use crate::atr::average_true_range;
use crate::bar::BarSource;
use crate::error::ContextError;
use crate::profile::{DEFAULT_MAX_LEVELS, VolumeProfileBuilder};
use crate::score::{MarketContextSnapshot, ScoringWeights, score_context};
use crate::session::{
    SessionClock, SessionKind, SessionWindow, classify, is_boundary, resolve_overnight_window,
};
use crate::vwap::{VwapBands, VwapState, vwap_bands};
use chrono::NaiveDateTime;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tracing::debug;

/// Fallback tick size when the instrument does not report one (ES default).
pub const DEFAULT_TICK_SIZE: f64 = 0.25;

/// Analyzer configuration, validated once at analyzer construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub symbol: SmolStr,
    pub tick_size: f64,
    pub band_multiplier: f64,
    pub atr_period: usize,
    pub max_levels: usize,
    pub weights: ScoringWeights,
}

impl AnalyzerConfig {
    pub fn new(symbol: impl Into<SmolStr>, tick_size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            band_multiplier: 2.0,
            atr_period: 14,
            max_levels: DEFAULT_MAX_LEVELS,
            weights: ScoringWeights::balanced(),
        }
    }

    /// Resolve an instrument-reported tick size, falling back to
    /// [`DEFAULT_TICK_SIZE`] when absent or unusable.
    pub fn tick_size_or_default(reported: Option<f64>) -> f64 {
        reported
            .filter(|tick| tick.is_finite() && *tick > 0.0)
            .unwrap_or(DEFAULT_TICK_SIZE)
    }

    pub fn with_band_multiplier(mut self, multiplier: f64) -> Self {
        self.band_multiplier = multiplier;
        self
    }

    pub fn with_atr_period(mut self, period: usize) -> Self {
        self.atr_period = period;
        self
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Stateful overnight-session analytics for one instrument.
#[derive(Debug, Clone)]
pub struct OvernightContextAnalyzer<C> {
    config: AnalyzerConfig,
    clock: C,
    builder: VolumeProfileBuilder,
    window: Option<SessionWindow>,
    vwap: VwapState,
    prev_civil: Option<NaiveDateTime>,
    last_bands: Option<VwapBands>,
    snapshots: BTreeMap<usize, MarketContextSnapshot>,
}

impl<C> OvernightContextAnalyzer<C>
where
    C: SessionClock,
{
    pub fn new(config: AnalyzerConfig, clock: C) -> Result<Self, ContextError> {
        if !config.band_multiplier.is_finite() || config.band_multiplier <= 0.0 {
            return Err(ContextError::InvalidBandMultiplier(config.band_multiplier));
        }
        if config.atr_period == 0 {
            return Err(ContextError::InvalidAtrPeriod);
        }
        let builder =
            VolumeProfileBuilder::new(config.tick_size)?.with_max_levels(config.max_levels)?;

        Ok(Self {
            config,
            clock,
            builder,
            window: None,
            vwap: VwapState::new(),
            prev_civil: None,
            last_bands: None,
            snapshots: BTreeMap::new(),
        })
    }

    /// Process the bar at `index`.
    ///
    /// On a session boundary the overnight window is re-resolved and the VWAP
    /// state rebuilt from the session-to-date range, so an analyzer started
    /// mid-session produces the same output as one that saw every bar.
    /// Returns a snapshot for overnight bars, `None` for RTH bars or an
    /// out-of-range index.
    pub fn on_bar<S>(&mut self, source: &S, index: usize) -> Option<MarketContextSnapshot>
    where
        S: BarSource + ?Sized,
    {
        let bar = source.bar(index)?;
        let civil = self.clock.civil(bar.time);

        if is_boundary(self.prev_civil, civil) {
            let window = resolve_overnight_window(source, &self.clock, index);
            debug!(
                symbol = %self.config.symbol,
                session_start = %window.start,
                start_index = window.start_index,
                "session boundary, resetting session state"
            );
            self.vwap = if window.start_index < index {
                VwapState::from_bars(source, window.start_index, index - 1)
            } else {
                VwapState::new()
            };
            // snapshots are a per-session store; drop them once a genuinely
            // new session opens so the map stays bounded over long runs
            if self.window.is_none_or(|w| w.start != window.start) {
                self.snapshots.clear();
            }
            self.window = Some(window);
            self.last_bands = None;
        }
        self.prev_civil = Some(civil);

        if classify(civil) != SessionKind::Overnight {
            return None;
        }
        let window = self.window?;

        self.vwap.update(bar);
        let vwap = self.vwap.vwap();
        self.last_bands = vwap.and_then(|v| {
            vwap_bands(
                source,
                window.start_index,
                index,
                v,
                self.config.band_multiplier,
            )
        });

        let profile = self.builder.build(source, window.start_index, index);
        let atr = average_true_range(source, index, self.config.atr_period);

        let snapshot = score_context(
            civil,
            &self.config.symbol,
            bar.close,
            vwap,
            &profile,
            atr,
            &self.config.weights,
        );
        self.snapshots.insert(index, snapshot.clone());
        Some(snapshot)
    }

    /// Window of the session currently being tracked.
    pub fn session_window(&self) -> Option<&SessionWindow> {
        self.window.as_ref()
    }

    /// Session VWAP as of the last processed bar.
    pub fn current_vwap(&self) -> Option<f64> {
        self.vwap.vwap()
    }

    /// Dispersion bands as of the last overnight bar of the active session.
    pub fn current_bands(&self) -> Option<&VwapBands> {
        self.last_bands.as_ref()
    }

    /// Snapshot previously produced for a bar index, if any.
    pub fn snapshot_at(&self, index: usize) -> Option<&MarketContextSnapshot> {
        self.snapshots.get(&index)
    }

    /// POC drift between the snapshot at `current_index` and the one
    /// `lookback` bars earlier; 0.0 when either side is missing.
    pub fn poc_migration(&self, current_index: usize, lookback: usize) -> f64 {
        if current_index < lookback {
            return 0.0;
        }
        match (
            self.snapshots.get(&current_index),
            self.snapshots.get(&(current_index - lookback)),
        ) {
            (Some(current), Some(previous)) => current.poc - previous.poc,
            _ => 0.0,
        }
    }
}
