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

use chrono::{DateTime, Duration, Utc};
use thermion_types::{
    DailyDeviation, PriceAnalytics, PriceBand, PriceBlock, PriceConfig, PriceDataPoint,
    PriceSample, PriceStatistics, PriceThresholds, PriceTrend, TrendDirection, hour_start,
};
use tracing::{debug, info, warn};

/// Minimum points for a meaningful regression
const MIN_TREND_POINTS: usize = 3;

/// Hourly price series with its band classification.
///
/// The series is only ever replaced as a whole; it is kept sorted by
/// timestamp with one point per hour.
#[derive(Debug, Clone)]
pub struct PriceClassifier {
    thresholds: PriceThresholds,
    block_hours: usize,
    trend_hours: usize,
    trend_min_confidence: f64,
    trend_stable_slope: f64,
    daily_deviation_tolerance: f64,
    points: Vec<PriceDataPoint>,
}

impl PriceClassifier {
    pub fn new(config: &PriceConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            block_hours: config.block_hours,
            trend_hours: config.trend_hours,
            trend_min_confidence: config.trend_min_confidence,
            trend_stable_slope: config.trend_stable_slope,
            daily_deviation_tolerance: config.daily_deviation_tolerance,
            points: Vec::new(),
        }
    }

    pub fn thresholds(&self) -> &PriceThresholds {
        &self.thresholds
    }

    pub fn classify(&self, price: f64) -> PriceBand {
        self.thresholds.classify(price)
    }

    /// Replace the whole series. Samples are hour-aligned, sorted and
    /// deduplicated (the later sample for an hour wins). Returns the number
    /// of points kept.
    pub fn replace_series(&mut self, samples: Vec<PriceSample>) -> usize {
        let received = samples.len();
        let mut points: Vec<PriceDataPoint> = samples
            .into_iter()
            .filter(|s| s.price.is_finite())
            .map(|s| PriceDataPoint::new(s.timestamp, s.price, &self.thresholds))
            .collect();

        if points.len() < received {
            warn!(
                "⚠️  Dropped {} price samples with invalid values",
                received - points.len()
            );
        }

        points.sort_by_key(|p| p.timestamp);
        let mut deduped: Vec<PriceDataPoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => deduped.push(point),
            }
        }

        self.points = deduped;
        info!("💰 Price series replaced: {} hourly points", self.points.len());
        self.points.len()
    }

    /// Restore a persisted series, re-classified with current thresholds
    pub fn restore_points(&mut self, points: Vec<PriceDataPoint>) -> usize {
        self.replace_series(
            points
                .into_iter()
                .map(|p| PriceSample {
                    timestamp: p.timestamp,
                    price: p.price,
                })
                .collect(),
        )
    }

    pub fn points(&self) -> &[PriceDataPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn current_point(&self, now: DateTime<Utc>) -> Option<&PriceDataPoint> {
        self.points.iter().find(|p| p.covers(now))
    }

    pub fn current_band(&self, now: DateTime<Utc>) -> Option<PriceBand> {
        self.current_point(now).map(|p| p.band)
    }

    /// Price data is available when the current hour is covered
    pub fn has_current_data(&self, now: DateTime<Utc>) -> bool {
        self.current_point(now).is_some()
    }

    /// Points from the current hour onwards
    fn upcoming(&self, now: DateTime<Utc>) -> &[PriceDataPoint] {
        let start = hour_start(now);
        let index = self.points.partition_point(|p| p.timestamp < start);
        &self.points[index..]
    }

    /// Next `hours` points starting with the current hour
    pub fn forecast(&self, now: DateTime<Utc>, hours: usize) -> Vec<PriceDataPoint> {
        self.upcoming(now).iter().take(hours).cloned().collect()
    }

    #[expect(clippy::integer_division, reason = "median index of a sorted series")]
    pub fn statistics(&self) -> Option<PriceStatistics> {
        if self.points.is_empty() {
            return None;
        }

        let mut prices: Vec<f64> = self.points.iter().map(|p| p.price).collect();
        prices.sort_by(f64::total_cmp);

        let count = prices.len();
        let median = if count % 2 == 0 {
            (prices[count / 2 - 1] + prices[count / 2]) / 2.0
        } else {
            prices[count / 2]
        };

        Some(PriceStatistics {
            min: prices[0],
            max: prices[count - 1],
            average: prices.iter().sum::<f64>() / count as f64,
            median,
            count,
        })
    }

    /// Cheapest run of `block_hours` consecutive upcoming hours
    pub fn cheapest_block(&self, now: DateTime<Utc>) -> Option<PriceBlock> {
        self.find_block(now, |candidate, best| candidate < best)
    }

    /// Most expensive run of `block_hours` consecutive upcoming hours
    pub fn most_expensive_block(&self, now: DateTime<Utc>) -> Option<PriceBlock> {
        self.find_block(now, |candidate, best| candidate > best)
    }

    fn find_block(
        &self,
        now: DateTime<Utc>,
        better: impl Fn(f64, f64) -> bool,
    ) -> Option<PriceBlock> {
        let hours = self.block_hours.max(1);
        let upcoming = self.upcoming(now);
        let mut best: Option<PriceBlock> = None;

        for window in upcoming.windows(hours) {
            let contiguous = window
                .windows(2)
                .all(|pair| pair[1].timestamp - pair[0].timestamp == Duration::hours(1));
            if !contiguous {
                continue;
            }

            let average_price = window.iter().map(|p| p.price).sum::<f64>() / hours as f64;
            if best
                .as_ref()
                .is_none_or(|b| better(average_price, b.average_price))
            {
                best = Some(PriceBlock {
                    start: window[0].timestamp,
                    hours,
                    average_price,
                });
            }
        }

        best
    }

    /// Least-squares trend over the next `trend_hours` points.
    ///
    /// Only reported when R² exceeds the configured confidence.
    pub fn trend(&self, now: DateTime<Utc>) -> Option<PriceTrend> {
        let window: Vec<&PriceDataPoint> =
            self.upcoming(now).iter().take(self.trend_hours).collect();
        if window.len() < MIN_TREND_POINTS {
            return None;
        }

        let origin = window[0].timestamp;
        let xs: Vec<f64> = window
            .iter()
            .map(|p| (p.timestamp - origin).num_minutes() as f64 / 60.0)
            .collect();
        let ys: Vec<f64> = window.iter().map(|p| p.price).collect();
        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syy = 0.0;
        for (x, y) in xs.iter().zip(&ys) {
            sxx += (x - mean_x).powi(2);
            sxy += (x - mean_x) * (y - mean_y);
            syy += (y - mean_y).powi(2);
        }
        if sxx <= f64::EPSILON {
            return None;
        }

        let slope = sxy / sxx;
        let confidence = if syy <= f64::EPSILON {
            // perfectly flat prices are a perfect fit
            1.0
        } else {
            ((sxy * sxy) / (sxx * syy)).clamp(0.0, 1.0)
        };

        if confidence <= self.trend_min_confidence {
            debug!(
                "Price trend slope {:+.4}/h rejected, R²={:.2}",
                slope, confidence
            );
            return None;
        }

        let direction = if slope.abs() < self.trend_stable_slope {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Rising
        } else {
            TrendDirection::Falling
        };

        Some(PriceTrend {
            direction,
            slope_per_hour: slope,
            confidence,
        })
    }

    /// All derived price outputs at `now`
    pub fn analytics(&self, now: DateTime<Utc>, forecast_hours: usize) -> PriceAnalytics {
        PriceAnalytics {
            current: self.current_point(now).cloned(),
            statistics: self.statistics(),
            forecast: self.forecast(now, forecast_hours),
            cheapest_block: self.cheapest_block(now),
            most_expensive_block: self.most_expensive_block(now),
            trend: self.trend(now),
            daily_deviation: self.daily_deviation(now),
        }
    }

    /// Current price against the average of its (UTC) day
    pub fn daily_deviation(&self, now: DateTime<Utc>) -> Option<DailyDeviation> {
        let current = self.current_point(now)?;
        let today = current.timestamp.date_naive();
        let day_prices: Vec<f64> = self
            .points
            .iter()
            .filter(|p| p.timestamp.date_naive() == today)
            .map(|p| p.price)
            .collect();

        let daily_average = day_prices.iter().sum::<f64>() / day_prices.len() as f64;
        let deviation_ratio = if daily_average.abs() <= f64::EPSILON {
            0.0
        } else {
            (current.price - daily_average) / daily_average.abs()
        };

        Some(DailyDeviation {
            current_price: current.price,
            daily_average,
            deviation_ratio,
            significant: deviation_ratio.abs() > self.daily_deviation_tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, hour, minute, 0).unwrap()
    }

    fn classifier_with(prices: &[f64]) -> PriceClassifier {
        let mut classifier = PriceClassifier::new(&PriceConfig::default());
        classifier.replace_series(
            prices
                .iter()
                .enumerate()
                .map(|(h, &price)| PriceSample {
                    timestamp: at(h as u32, 0),
                    price,
                })
                .collect(),
        );
        classifier
    }

    #[test]
    fn test_band_boundaries() {
        let classifier = PriceClassifier::new(&PriceConfig::default());
        assert_eq!(classifier.classify(0.0999), PriceBand::VeryLow);
        assert_eq!(classifier.classify(0.10), PriceBand::Low);
        assert_eq!(classifier.classify(0.3499), PriceBand::High);
        assert_eq!(classifier.classify(0.35), PriceBand::VeryHigh);
    }

    #[test]
    fn test_replace_sorts_aligns_and_dedups() {
        let mut classifier = PriceClassifier::new(&PriceConfig::default());
        let kept = classifier.replace_series(vec![
            PriceSample { timestamp: at(2, 10), price: 0.30 },
            PriceSample { timestamp: at(0, 45), price: 0.05 },
            PriceSample { timestamp: at(2, 0), price: 0.40 },
            PriceSample { timestamp: at(1, 0), price: f64::NAN },
        ]);
        assert_eq!(kept, 2);
        assert_eq!(classifier.points()[0].timestamp, at(0, 0));
        assert_eq!(classifier.points()[1].price, 0.40);
        assert_eq!(classifier.points()[1].band, PriceBand::VeryHigh);

        // a new series replaces the old one entirely
        classifier.replace_series(vec![PriceSample { timestamp: at(5, 0), price: 0.2 }]);
        assert_eq!(classifier.len(), 1);
        assert!(!classifier.has_current_data(at(0, 30)));
        assert_eq!(classifier.current_band(at(5, 59)), Some(PriceBand::Normal));
    }

    #[test]
    fn test_statistics() {
        let classifier = classifier_with(&[0.30, 0.10, 0.20, 0.40]);
        let stats = classifier.statistics().unwrap();
        assert_eq!(stats.min, 0.10);
        assert_eq!(stats.max, 0.40);
        assert!((stats.average - 0.25).abs() < 1e-9);
        assert!((stats.median - 0.25).abs() < 1e-9);
        assert_eq!(stats.count, 4);
        assert!(PriceClassifier::new(&PriceConfig::default()).statistics().is_none());
    }

    #[test]
    fn test_cheapest_and_most_expensive_blocks() {
        let classifier =
            classifier_with(&[0.30, 0.28, 0.12, 0.08, 0.10, 0.25, 0.40, 0.45, 0.38, 0.20]);

        let cheap = classifier.cheapest_block(at(0, 15)).unwrap();
        assert_eq!(cheap.start, at(2, 0));
        assert_eq!(cheap.hours, 3);
        assert!((cheap.average_price - 0.10).abs() < 1e-9);

        let expensive = classifier.most_expensive_block(at(0, 15)).unwrap();
        assert_eq!(expensive.start, at(6, 0));

        // only upcoming hours count
        let later = classifier.cheapest_block(at(5, 0)).unwrap();
        assert_eq!(later.start, at(7, 0));
    }

    #[test]
    fn test_blocks_skip_gaps() {
        let mut classifier = PriceClassifier::new(&PriceConfig::default());
        classifier.replace_series(
            [0u32, 1, 3, 4, 5]
                .iter()
                .map(|&h| PriceSample {
                    timestamp: at(h, 0),
                    price: if h < 2 { 0.01 } else { 0.2 },
                })
                .collect(),
        );
        assert_eq!(classifier.cheapest_block(at(0, 0)).unwrap().start, at(3, 0));
    }

    #[test]
    fn test_trend_rising_and_gated() {
        let rising = classifier_with(&[0.10, 0.12, 0.14, 0.16, 0.18, 0.20]);
        let trend = rising.trend(at(0, 0)).unwrap();
        assert_eq!(trend.direction, TrendDirection::Rising);
        assert!((trend.slope_per_hour - 0.02).abs() < 1e-9);
        assert!(trend.confidence > 0.99);

        let noisy = classifier_with(&[0.10, 0.30, 0.10, 0.30, 0.10, 0.30]);
        assert!(noisy.trend(at(0, 0)).is_none());

        let flat = classifier_with(&[0.2, 0.2, 0.2]);
        assert_eq!(flat.trend(at(0, 0)).unwrap().direction, TrendDirection::Stable);

        assert!(classifier_with(&[0.1, 0.2]).trend(at(0, 0)).is_none());
    }

    #[test]
    fn test_daily_deviation() {
        let classifier = classifier_with(&[0.20, 0.22, 0.26, 0.32]);
        let deviation = classifier.daily_deviation(at(3, 30)).unwrap();
        assert!((deviation.daily_average - 0.25).abs() < 1e-9);
        assert!((deviation.deviation_ratio - 0.28).abs() < 1e-9);
        assert!(deviation.significant);

        let mild = classifier.daily_deviation(at(1, 0)).unwrap();
        assert!(!mild.significant);
        assert!(classifier.daily_deviation(at(8, 0)).is_none());
    }

    #[test]
    fn test_forecast_starts_at_current_hour() {
        let classifier = classifier_with(&[0.05, 0.12, 0.2, 0.3]);
        let forecast = classifier.forecast(at(1, 20), 2);
        let bands: Vec<PriceBand> = forecast.iter().map(|p| p.band).collect();
        assert_eq!(bands, vec![PriceBand::Low, PriceBand::Normal]);
    }
}
