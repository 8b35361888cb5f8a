//! Composite market context scoring.
//!
//! Four bounded sub-scores (VWAP position, value-area position, POC
//! proximity, volume balance) combine into one weighted composite in
//! [−10, 10]. Every function here is pure: undefined inputs (zero ATR,
//! empty profile, undefined VWAP) score neutral, never error.

use crate::error::ContextError;
use crate::profile::VolumeProfile;
use chrono::NaiveDateTime;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Named weight vector combining the four sub-scores. Validated once at
/// construction: components non-negative and summing to 1.0.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoringWeights {
    name: SmolStr,
    vwap: f64,
    value_area: f64,
    poc: f64,
    volume: f64,
}

impl ScoringWeights {
    const SUM_TOLERANCE: f64 = 1e-9;

    pub fn new(
        name: impl Into<SmolStr>,
        vwap: f64,
        value_area: f64,
        poc: f64,
        volume: f64,
    ) -> Result<Self, ContextError> {
        let name = name.into();
        if [vwap, value_area, poc, volume].iter().any(|w| *w < 0.0) {
            return Err(ContextError::NegativeWeight {
                name: name.to_string(),
            });
        }
        let sum = vwap + value_area + poc + volume;
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(ContextError::WeightsNotNormalised {
                name: name.to_string(),
                sum,
            });
        }
        Ok(Self {
            name,
            vwap,
            value_area,
            poc,
            volume,
        })
    }

    /// Equal weighting across all four sub-scores.
    pub fn balanced() -> Self {
        Self {
            name: SmolStr::new_static("balanced"),
            vwap: 0.25,
            value_area: 0.25,
            poc: 0.25,
            volume: 0.25,
        }
    }

    /// Emphasises position relative to session VWAP.
    pub fn vwap_heavy() -> Self {
        Self {
            name: SmolStr::new_static("vwap_heavy"),
            vwap: 0.40,
            value_area: 0.20,
            poc: 0.20,
            volume: 0.20,
        }
    }

    /// Emphasises the volume-profile sub-scores.
    pub fn volume_heavy() -> Self {
        Self {
            name: SmolStr::new_static("volume_heavy"),
            vwap: 0.20,
            value_area: 0.30,
            poc: 0.30,
            volume: 0.20,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sum(&self) -> f64 {
        self.vwap + self.value_area + self.poc + self.volume
    }

    /// Weighted composite of the four sub-scores, rounded to the nearest
    /// integer. A convex combination of values in [−10, 10] stays bounded, so
    /// no further clamping is applied.
    pub fn composite(&self, components: &ScoreComponents) -> i32 {
        let weighted = components.vwap as f64 * self.vwap
            + components.value_area as f64 * self.value_area
            + components.poc as f64 * self.poc
            + components.volume as f64 * self.volume;
        weighted.round() as i32
    }
}

/// The four named sub-scores, each in [−10, 10].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor, Deserialize, Serialize)]
pub struct ScoreComponents {
    pub vwap: i32,
    pub value_area: i32,
    pub poc: i32,
    pub volume: i32,
}

/// Qualitative interpretation of a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ScoreLabel {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl ScoreLabel {
    pub fn from_score(score: i32) -> Self {
        if score >= 8 {
            ScoreLabel::StrongBullish
        } else if score >= 4 {
            ScoreLabel::Bullish
        } else if score >= -3 {
            ScoreLabel::Neutral
        } else if score >= -7 {
            ScoreLabel::Bearish
        } else {
            ScoreLabel::StrongBearish
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLabel::StrongBullish => "STRONG_BULLISH",
            ScoreLabel::Bullish => "BULLISH",
            ScoreLabel::Neutral => "NEUTRAL",
            ScoreLabel::Bearish => "BEARISH",
            ScoreLabel::StrongBearish => "STRONG_BEARISH",
        }
    }
}

impl std::fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position of price relative to VWAP, in ATR units.
///
/// Piecewise: beyond ±2 ATR saturates at ±10; 0 inside the ±0.5 ATR band.
/// Neutral (0) when VWAP or ATR is zero or any input is non-finite.
pub fn score_vwap_position(price: f64, vwap: f64, atr: f64) -> i32 {
    if !price.is_finite() || !vwap.is_finite() || !atr.is_finite() || vwap == 0.0 || atr == 0.0 {
        return 0;
    }

    let atr_units = (price - vwap) / atr;
    if atr_units > 2.0 {
        10
    } else if atr_units > 1.0 {
        7
    } else if atr_units > 0.5 {
        4
    } else if atr_units > -0.5 {
        0
    } else if atr_units > -1.0 {
        -4
    } else if atr_units > -2.0 {
        -7
    } else {
        -10
    }
}

/// Position of price relative to the value area.
///
/// Above VAH scales from 5, below VAL from −5, both capped at ±10; inside the
/// band the score is linear around the midpoint in [−4, 4]. Neutral (0) for a
/// degenerate profile (VAH or VAL zero, or a zero-width band).
pub fn score_value_area_position(price: f64, vah: f64, val: f64) -> i32 {
    if !price.is_finite() || !vah.is_finite() || !val.is_finite() || vah == 0.0 || val == 0.0 {
        return 0;
    }

    let va_range = vah - val;
    if va_range <= 0.0 {
        return 0;
    }
    let va_mid = (vah + val) / 2.0;

    if price > vah {
        // clamp in f64: the cast of an arbitrarily large distance must not
        // feed integer arithmetic
        let distance = (price - vah) / va_range;
        (5.0 + distance * 10.0).min(10.0) as i32
    } else if price < val {
        let distance = (val - price) / va_range;
        (-5.0 - distance * 10.0).max(-10.0) as i32
    } else {
        let position = (price - va_mid) / (va_range / 2.0);
        (position * 4.0) as i32
    }
}

/// Distance of price from the point of control, in ATR units.
///
/// Near the POC is neutral; growing distance scores a strengthening trend,
/// directional (±9) beyond 2 ATR. Neutral (0) when POC or ATR is zero.
pub fn score_poc_proximity(price: f64, poc: f64, atr: f64) -> i32 {
    if !price.is_finite() || !poc.is_finite() || !atr.is_finite() || poc == 0.0 || atr == 0.0 {
        return 0;
    }

    let atr_units = (price - poc).abs() / atr;
    if atr_units < 0.5 {
        0
    } else if atr_units < 1.0 {
        3
    } else if atr_units < 2.0 {
        6
    } else if price > poc {
        9
    } else {
        -9
    }
}

/// Volume balance score, sign-inverted: volume concentrated at the lows
/// (negative balance, accumulation) scores bullish.
pub fn score_volume_balance(balance: f64) -> i32 {
    if !balance.is_finite() {
        return 0;
    }
    (-balance * 10.0).round() as i32
}

/// Immutable per-bar analysis result handed to the caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketContextSnapshot {
    /// Civil time of the scored bar in the trading timezone.
    pub time: NaiveDateTime,
    pub symbol: SmolStr,
    pub current_price: f64,
    /// Session VWAP, `None` until the session has valid volume.
    pub vwap: Option<f64>,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub volume_balance: f64,
    pub components: ScoreComponents,
    /// Weighted composite score in [−10, 10].
    pub score: i32,
    pub label: ScoreLabel,
    /// Name of the weight vector used.
    pub method: SmolStr,
    pub atr: f64,
    pub value_area_width: f64,
}

/// Score one bar against the session analytics. Pure and deterministic; all
/// required fields are assembled in this single place.
pub fn score_context(
    time: NaiveDateTime,
    symbol: &str,
    price: f64,
    vwap: Option<f64>,
    profile: &VolumeProfile,
    atr: f64,
    weights: &ScoringWeights,
) -> MarketContextSnapshot {
    let poc = profile.poc();
    let vah = profile.vah();
    let val = profile.val();
    let balance = profile.volume_balance();

    let components = ScoreComponents::new(
        score_vwap_position(price, vwap.unwrap_or(0.0), atr),
        score_value_area_position(price, vah, val),
        score_poc_proximity(price, poc, atr),
        score_volume_balance(balance),
    );
    let score = weights.composite(&components);

    MarketContextSnapshot {
        time,
        symbol: SmolStr::new(symbol),
        current_price: price,
        vwap,
        poc,
        vah,
        val,
        volume_balance: balance,
        components,
        score,
        label: ScoreLabel::from_score(score),
        method: SmolStr::new(weights.name()),
        atr,
        value_area_width: profile.value_area_width(),
    }
}
