//! Overnight futures session context analytics.
//!
//! Classifies bars into overnight (18:00–09:30 ET) and regular trading hours,
//! maintains a session-scoped VWAP with dispersion bands, builds a tick-level
//! volume profile with point of control and 70% value area, and condenses the
//! lot into a composite context score in `[-10, 10]` per bar.
//!
//! Typical usage drives [`OvernightContextAnalyzer::on_bar`] over a
//! chronological bar series:
//!
//! ```
//! use overnight_context::{AnalyzerConfig, EasternClock, OvernightContextAnalyzer};
//!
//! let config = AnalyzerConfig::new("ES", 0.25);
//! let mut analyzer = OvernightContextAnalyzer::new(config, EasternClock).unwrap();
//! let bars: Vec<overnight_context::Bar> = vec![];
//! for index in 0..bars.len() {
//!     if let Some(snapshot) = analyzer.on_bar(&bars, index) {
//!         println!("{} {} ({})", snapshot.time, snapshot.score, snapshot.label);
//!     }
//! }
//! ```
//!
//! All state lives in the analyzer; replaying the same bars from any starting
//! index reproduces identical snapshots, so a process restart mid-session is
//! lossless.

pub mod analyzer;
pub mod atr;
pub mod bar;
pub mod error;
pub mod profile;
pub mod score;
pub mod session;
pub mod vwap;

pub use analyzer::{AnalyzerConfig, DEFAULT_TICK_SIZE, OvernightContextAnalyzer};
pub use atr::average_true_range;
pub use bar::{Bar, BarSource};
pub use error::ContextError;
pub use profile::{DEFAULT_MAX_LEVELS, VolumeProfile, VolumeProfileBuilder};
pub use score::{
    MarketContextSnapshot, ScoreComponents, ScoreLabel, ScoringWeights, score_context,
    score_poc_proximity, score_value_area_position, score_volume_balance, score_vwap_position,
};
pub use session::{
    EasternClock, SessionClock, SessionKind, SessionWindow, classify, is_boundary, market_date,
    next_rth_open, resolve_overnight_window,
};
pub use vwap::{VwapBands, VwapState, deviation_pct, vwap_bands};
