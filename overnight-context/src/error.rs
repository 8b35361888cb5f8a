//! All errors generated in `overnight-context`.
//!
//! Only construction-time configuration problems surface as errors. Per-bar
//! degradation (invalid bars, undefined VWAP or profile values) is handled
//! with neutral sentinels and never propagates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum ContextError {
    #[error("scoring weights `{name}` must sum to 1.0, got {sum}")]
    WeightsNotNormalised { name: String, sum: f64 },

    #[error("scoring weights `{name}` contain a negative component")]
    NegativeWeight { name: String },

    #[error("tick size must be a positive finite number, got {0}")]
    InvalidTickSize(f64),

    #[error("profile level cap must be at least 2, got {0}")]
    InvalidLevelCap(usize),

    #[error("ATR period must be at least 1")]
    InvalidAtrPeriod,

    #[error("VWAP band multiplier must be a positive finite number, got {0}")]
    InvalidBandMultiplier(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offending_value() {
        let err = ContextError::WeightsNotNormalised {
            name: "balanced".to_string(),
            sum: 0.9,
        };
        assert!(err.to_string().contains("balanced"));
        assert!(err.to_string().contains("0.9"));

        let err = ContextError::InvalidTickSize(-0.25);
        assert!(err.to_string().contains("-0.25"));
    }
}
