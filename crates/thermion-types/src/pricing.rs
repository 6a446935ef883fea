// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of ThermION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

// ============= Price Bands =============

/// Five ordered price categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBand {
    VeryLow,
    Low,
    Normal,
    High,
    VeryHigh,
}

impl PriceBand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    /// Cheap enough to store heat in the building
    pub fn is_cheap(self) -> bool {
        matches!(self, Self::VeryLow | Self::Low)
    }

    /// Expensive enough to coast on stored heat
    pub fn is_expensive(self) -> bool {
        matches!(self, Self::High | Self::VeryHigh)
    }
}

impl fmt::Display for PriceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four ascending thresholds splitting prices into five bands (per kWh)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceThresholds {
    pub very_low: f64,
    pub low: f64,
    pub normal: f64,
    pub high: f64,
}

impl Default for PriceThresholds {
    fn default() -> Self {
        Self {
            very_low: 0.10,
            low: 0.15,
            normal: 0.25,
            high: 0.35,
        }
    }
}

impl PriceThresholds {
    /// Band for a price; each threshold is the inclusive lower edge of the next band
    pub fn classify(&self, price: f64) -> PriceBand {
        if price < self.very_low {
            PriceBand::VeryLow
        } else if price < self.low {
            PriceBand::Low
        } else if price < self.normal {
            PriceBand::Normal
        } else if price < self.high {
            PriceBand::High
        } else {
            PriceBand::VeryHigh
        }
    }

    /// Thresholds must be finite and strictly ascending
    pub fn validate(&self) -> Result<(), ValidationError> {
        let values = [self.very_low, self.low, self.normal, self.high];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ValidationError::Config {
                field: "price.thresholds".to_owned(),
                message: "thresholds must be finite".to_owned(),
            });
        }
        if values.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ValidationError::Config {
                field: "price.thresholds".to_owned(),
                message: format!(
                    "thresholds must be strictly ascending, got {:.4} / {:.4} / {:.4} / {:.4}",
                    self.very_low, self.low, self.normal, self.high
                ),
            });
        }
        Ok(())
    }
}

// ============= Price Series =============

/// A single hourly price with its band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDataPoint {
    /// Start of the hour this price applies to
    pub timestamp: DateTime<Utc>,

    /// Price per kWh
    pub price: f64,

    /// Band derived from the classifier thresholds
    pub band: PriceBand,
}

impl PriceDataPoint {
    /// Create a point aligned to the start of its hour and classified
    pub fn new(timestamp: DateTime<Utc>, price: f64, thresholds: &PriceThresholds) -> Self {
        Self {
            timestamp: hour_start(timestamp),
            price,
            band: thresholds.classify(price),
        }
    }

    /// Whether `at` falls inside this point's hour
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        at >= self.timestamp && at < self.timestamp + Duration::hours(1)
    }
}

/// Raw price sample as received from an external price source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Truncate a timestamp to the start of its hour
pub fn hour_start(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(Duration::hours(1))
        .unwrap_or(timestamp)
}

// ============= Price Analytics =============

/// Price statistics over the loaded series
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub median: f64,
    pub count: usize,
}

/// Contiguous run of hours selected by average price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBlock {
    pub start: DateTime<Utc>,
    pub hours: usize,
    pub average_price: f64,
}

/// Direction of the hour-over-hour price trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

/// Linear-regression trend over upcoming hours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTrend {
    pub direction: TrendDirection,
    /// Price change per hour
    pub slope_per_hour: f64,
    /// Coefficient of determination of the fit, [0, 1]
    pub confidence: f64,
}

/// Comparison of the current price with its day's average
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyDeviation {
    pub current_price: f64,
    pub daily_average: f64,
    /// Relative deviation, (current - average) / average
    pub deviation_ratio: f64,
    /// Whether the deviation exceeds the configured tolerance
    pub significant: bool,
}

/// Everything the classifier derives from the loaded series at one instant
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceAnalytics {
    pub current: Option<PriceDataPoint>,
    pub statistics: Option<PriceStatistics>,
    /// Upcoming hours starting with the current one
    pub forecast: Vec<PriceDataPoint>,
    pub cheapest_block: Option<PriceBlock>,
    pub most_expensive_block: Option<PriceBlock>,
    pub trend: Option<PriceTrend>,
    pub daily_deviation: Option<DailyDeviation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_classify_boundaries() {
        let thresholds = PriceThresholds::default();
        assert_eq!(thresholds.classify(0.0999), PriceBand::VeryLow);
        assert_eq!(thresholds.classify(0.10), PriceBand::Low);
        assert_eq!(thresholds.classify(0.20), PriceBand::Normal);
        assert_eq!(thresholds.classify(0.3499), PriceBand::High);
        assert_eq!(thresholds.classify(0.35), PriceBand::VeryHigh);
    }

    #[test]
    fn test_thresholds_must_ascend() {
        let thresholds = PriceThresholds {
            very_low: 0.10,
            low: 0.10,
            normal: 0.25,
            high: 0.35,
        };
        assert!(thresholds.validate().is_err());
        assert!(PriceThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_point_is_hour_aligned() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 14, 7, 42, 13).unwrap();
        let point = PriceDataPoint::new(ts, 0.2, &PriceThresholds::default());
        assert_eq!(
            point.timestamp,
            Utc.with_ymd_and_hms(2026, 1, 14, 7, 0, 0).unwrap()
        );
        assert!(point.covers(ts));
        assert!(!point.covers(Utc.with_ymd_and_hms(2026, 1, 14, 8, 0, 0).unwrap()));
        assert_eq!(point.band, PriceBand::Normal);
    }

    #[test]
    fn test_band_order() {
        assert!(PriceBand::VeryLow < PriceBand::VeryHigh);
        assert!(PriceBand::Low.is_cheap());
        assert!(PriceBand::High.is_expensive());
        assert!(!PriceBand::Normal.is_cheap() && !PriceBand::Normal.is_expensive());
    }
}
