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

//! Shared engine for learners that bin observations by a control variable.
//!
//! Observations go into a bounded FIFO history. After every change the whole
//! bucket map is recomputed from that history, so a learner restored from
//! its history is indistinguishable from the original.
//!
//! Lookup is three layers deep:
//! 1. exact hit on a qualifying bucket at the query's rounded key
//! 2. linear interpolation between the nearest qualifying buckets around it
//! 3. linear extrapolation from the two outermost qualifying buckets,
//!    clamped to the model's domain
//!
//! With no qualifying bucket, lookup returns `None` and each instantiation
//! supplies its own static fallback.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thermion_types::{
    ConfidenceTier, LearnerConfig, LearnerState, LearnerSummary, LearningBucket, LookupMethod,
    LookupResult,
};
use tracing::{debug, trace};

/// What a concrete learner observes and how it aggregates a bucket
pub trait BucketModel {
    type Observation: Clone + fmt::Debug + Serialize + DeserializeOwned;
    type Statistic: Clone + fmt::Debug + Serialize + DeserializeOwned;

    /// Name for logging
    const NAME: &'static str;

    /// Value used for bucketing (outdoor temperature for both learners)
    fn control_value(observation: &Self::Observation) -> f64;

    /// Reject implausible observations before they reach the history
    fn validate(&self, observation: &Self::Observation) -> Result<(), String>;

    /// Aggregate all observations of one bucket
    fn aggregate(&self, samples: &[&Self::Observation]) -> Self::Statistic;

    /// `lower + (upper - lower) * fraction`; fraction may be outside [0, 1]
    fn lerp(
        &self,
        lower: &Self::Statistic,
        upper: &Self::Statistic,
        fraction: f64,
    ) -> Self::Statistic;

    /// Clamp a derived statistic to the hard domain
    fn clamp(&self, statistic: Self::Statistic) -> Self::Statistic;
}

pub struct BucketedLearner<M: BucketModel> {
    model: M,
    config: LearnerConfig,
    history: VecDeque<M::Observation>,
    buckets: BTreeMap<i64, LearningBucket<M::Statistic>>,
}

impl<M: BucketModel + fmt::Debug> fmt::Debug for BucketedLearner<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketedLearner")
            .field("model", &self.model)
            .field("samples", &self.history.len())
            .field("buckets", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl<M: BucketModel> BucketedLearner<M> {
    pub fn new(model: M, config: LearnerConfig) -> Self {
        Self {
            model,
            config,
            history: VecDeque::with_capacity(config.history_cap),
            buckets: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Rounded bucket key of a control value
    pub fn bucket_key(&self, control_value: f64) -> i64 {
        (control_value / self.config.bucket_width).round() as i64
    }

    fn bucket_center(&self, key: i64) -> f64 {
        key as f64 * self.config.bucket_width
    }

    /// Add one observation. Returns false when it was dropped.
    pub fn add_observation(&mut self, observation: M::Observation) -> bool {
        let control = M::control_value(&observation);
        if !control.is_finite() {
            debug!("{}: dropping observation with non-finite control value", M::NAME);
            return false;
        }
        if let Err(reason) = self.model.validate(&observation) {
            debug!("{}: dropping observation: {}", M::NAME, reason);
            return false;
        }

        self.history.push_back(observation);
        while self.history.len() > self.config.history_cap.max(1) {
            self.history.pop_front();
        }
        self.rebuild();
        trace!(
            "{}: recorded observation at {:.1}, {} samples in {} buckets",
            M::NAME,
            control,
            self.history.len(),
            self.buckets.len()
        );
        true
    }

    /// Recompute every bucket from the history
    fn rebuild(&mut self) {
        let mut grouped: BTreeMap<i64, Vec<&M::Observation>> = BTreeMap::new();
        for observation in &self.history {
            let key = self.bucket_key(M::control_value(observation));
            grouped.entry(key).or_default().push(observation);
        }

        let buckets = grouped
            .into_iter()
            .map(|(key, samples)| {
                let bucket = LearningBucket {
                    center: self.bucket_center(key),
                    sample_count: samples.len(),
                    statistic: self.model.aggregate(&samples),
                    confidence: self.tier_for(samples.len()),
                };
                (key, bucket)
            })
            .collect();
        self.buckets = buckets;
    }

    fn tier_for(&self, samples: usize) -> ConfidenceTier {
        if samples >= self.config.high_confidence_samples {
            ConfidenceTier::High
        } else if samples >= self.config.min_samples {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    fn qualifies(&self, bucket: &LearningBucket<M::Statistic>) -> bool {
        bucket.sample_count >= self.config.min_samples
    }

    fn qualifying(&self) -> impl Iterator<Item = &LearningBucket<M::Statistic>> {
        self.buckets.values().filter(|b| self.qualifies(b))
    }

    /// Look up the learned statistic for a control value
    pub fn lookup(&self, control_value: f64) -> Option<LookupResult<M::Statistic>> {
        if !control_value.is_finite() {
            return None;
        }

        // 1. Exact
        if let Some(bucket) = self.buckets.get(&self.bucket_key(control_value))
            && self.qualifies(bucket)
        {
            return Some(LookupResult {
                statistic: bucket.statistic.clone(),
                method: LookupMethod::Exact,
                confidence: bucket.confidence.weight(),
            });
        }

        let qualifying: Vec<&LearningBucket<M::Statistic>> = self.qualifying().collect();
        let (first, last) = match qualifying.as_slice() {
            [] => return None,
            [only] => {
                return Some(LookupResult {
                    statistic: only.statistic.clone(),
                    method: LookupMethod::Extrapolated,
                    confidence: only.confidence.weight()
                        * LookupMethod::Extrapolated.confidence_factor(),
                });
            }
            [first, .., last] => (*first, *last),
        };

        // 2. Interpolate inside the qualifying range
        if control_value >= first.center && control_value <= last.center {
            let lower = qualifying
                .iter()
                .rev()
                .find(|b| b.center <= control_value)
                .copied()
                .unwrap_or(first);
            let upper = qualifying
                .iter()
                .find(|b| b.center >= control_value)
                .copied()
                .unwrap_or(last);
            return Some(self.derive(lower, upper, control_value, LookupMethod::Interpolated));
        }

        // 3. Extrapolate from the nearest edge pair
        let (lower, upper, edge) = if control_value < first.center {
            (first, qualifying[1], first)
        } else {
            (qualifying[qualifying.len() - 2], last, last)
        };
        let mut result = self.derive(lower, upper, control_value, LookupMethod::Extrapolated);
        result.confidence =
            edge.confidence.weight() * LookupMethod::Extrapolated.confidence_factor();
        Some(result)
    }

    fn derive(
        &self,
        lower: &LearningBucket<M::Statistic>,
        upper: &LearningBucket<M::Statistic>,
        control_value: f64,
        method: LookupMethod,
    ) -> LookupResult<M::Statistic> {
        let span = upper.center - lower.center;
        let statistic = if span.abs() < f64::EPSILON {
            lower.statistic.clone()
        } else {
            let fraction = (control_value - lower.center) / span;
            self.model
                .clamp(self.model.lerp(&lower.statistic, &upper.statistic, fraction))
        };
        let tier_weight = (lower.confidence.weight() + upper.confidence.weight()) / 2.0;
        LookupResult {
            statistic,
            method,
            confidence: tier_weight * method.confidence_factor(),
        }
    }

    /// Confidence of a lookup at this control value, 0 without learned data
    pub fn confidence_at(&self, control_value: f64) -> f64 {
        self.lookup(control_value).map_or(0.0, |r| r.confidence)
    }

    pub fn buckets(&self) -> &BTreeMap<i64, LearningBucket<M::Statistic>> {
        &self.buckets
    }

    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    pub fn summary(&self) -> LearnerSummary {
        let mut qualifying = self.qualifying();
        let first = qualifying.next().map(|b| b.center);
        let (count, last) = qualifying.fold((usize::from(first.is_some()), first), |(n, _), b| {
            (n + 1, Some(b.center))
        });
        LearnerSummary {
            total_samples: self.history.len(),
            buckets: self.buckets.len(),
            qualifying_buckets: count,
            range: first.zip(last),
        }
    }

    /// Snapshot for persistence
    pub fn get_state(&self) -> LearnerState<M::Observation, M::Statistic> {
        LearnerState {
            history: self.history.iter().cloned().collect(),
            buckets: self.buckets.clone(),
        }
    }

    /// Restore from a snapshot. Buckets are recomputed from the history
    /// using the current configuration; invalid observations are dropped.
    pub fn restore_state(&mut self, state: LearnerState<M::Observation, M::Statistic>) {
        let persisted_buckets = state.buckets.len();
        let cap = self.config.history_cap.max(1);
        let skip = state.history.len().saturating_sub(cap);

        self.history = state
            .history
            .into_iter()
            .skip(skip)
            .filter(|o| M::control_value(o).is_finite() && self.model.validate(o).is_ok())
            .collect();
        self.rebuild();

        if self.buckets.len() != persisted_buckets {
            debug!(
                "{}: persisted bucket map ({}) differs from rebuilt one ({}), using rebuilt",
                M::NAME,
                persisted_buckets,
                self.buckets.len()
            );
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mean of raw values, clamped to [0, 10]
    #[derive(Debug)]
    struct MeanModel;

    impl BucketModel for MeanModel {
        type Observation = (f64, f64);
        type Statistic = f64;

        const NAME: &'static str = "mean";

        fn control_value(observation: &(f64, f64)) -> f64 {
            observation.0
        }

        fn validate(&self, observation: &(f64, f64)) -> Result<(), String> {
            if observation.1 >= 0.0 {
                Ok(())
            } else {
                Err("negative value".to_owned())
            }
        }

        fn aggregate(&self, samples: &[&(f64, f64)]) -> f64 {
            samples.iter().map(|s| s.1).sum::<f64>() / samples.len() as f64
        }

        fn lerp(&self, lower: &f64, upper: &f64, fraction: f64) -> f64 {
            lower + (upper - lower) * fraction
        }

        fn clamp(&self, statistic: f64) -> f64 {
            statistic.clamp(0.0, 10.0)
        }
    }

    fn config() -> LearnerConfig {
        LearnerConfig {
            bucket_width: 2.0,
            history_cap: 50,
            min_samples: 3,
            high_confidence_samples: 9,
        }
    }

    fn learner_with(points: &[(f64, f64, usize)]) -> BucketedLearner<MeanModel> {
        let mut learner = BucketedLearner::new(MeanModel, config());
        for &(control, value, count) in points {
            for _ in 0..count {
                assert!(learner.add_observation((control, value)));
            }
        }
        learner
    }

    #[test]
    fn test_no_data_returns_none() {
        let learner = learner_with(&[(0.0, 5.0, 2)]);
        assert!(learner.lookup(0.0).is_none());
        assert_eq!(learner.confidence_at(0.0), 0.0);
        assert_eq!(learner.summary().qualifying_buckets, 0);
        assert_eq!(learner.summary().buckets, 1);
    }

    #[test]
    fn test_exact_interpolated_extrapolated() {
        let learner = learner_with(&[(-4.0, 2.0, 3), (4.0, 6.0, 3)]);

        let exact = learner.lookup(-3.5).unwrap();
        assert_eq!(exact.method, LookupMethod::Exact);
        assert_eq!(exact.statistic, 2.0);
        assert!((exact.confidence - 0.7).abs() < 1e-9);

        let mid = learner.lookup(0.0).unwrap();
        assert_eq!(mid.method, LookupMethod::Interpolated);
        assert!((mid.statistic - 4.0).abs() < 1e-9);
        assert!((mid.confidence - 0.56).abs() < 1e-9);

        let high = learner.lookup(12.0).unwrap();
        assert_eq!(high.method, LookupMethod::Extrapolated);
        assert!((high.statistic - 10.0).abs() < 1e-9);

        let low = learner.lookup(-20.0).unwrap();
        assert_eq!(low.statistic, 0.0);
    }

    #[test]
    fn test_single_bucket_extrapolates_flat() {
        let learner = learner_with(&[(10.0, 7.0, 3)]);
        let result = learner.lookup(-5.0).unwrap();
        assert_eq!(result.method, LookupMethod::Extrapolated);
        assert_eq!(result.statistic, 7.0);
    }

    #[test]
    fn test_non_qualifying_bucket_ignored() {
        let learner = learner_with(&[(0.0, 1.0, 3), (2.0, 9.0, 1), (4.0, 3.0, 3)]);
        let result = learner.lookup(2.0).unwrap();
        assert_eq!(result.method, LookupMethod::Interpolated);
        assert!((result.statistic - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let mut learner = learner_with(&[(0.0, 1.0, 50)]);
        for _ in 0..50 {
            learner.add_observation((0.0, 3.0));
        }
        assert_eq!(learner.sample_count(), 50);
        assert_eq!(learner.lookup(0.0).unwrap().statistic, 3.0);
    }

    #[test]
    fn test_tiers() {
        let learner = learner_with(&[(0.0, 1.0, 9), (6.0, 1.0, 4), (12.0, 1.0, 1)]);
        let tiers: Vec<ConfidenceTier> = learner.buckets().values().map(|b| b.confidence).collect();
        assert_eq!(
            tiers,
            vec![ConfidenceTier::High, ConfidenceTier::Medium, ConfidenceTier::Low]
        );
        let summary = learner.summary();
        assert_eq!(summary.qualifying_buckets, 2);
        assert_eq!(summary.range, Some((0.0, 6.0)));
        assert_eq!(summary.total_samples, 14);
    }

    #[test]
    fn test_invalid_observation_dropped() {
        let mut learner = learner_with(&[]);
        assert!(!learner.add_observation((0.0, -1.0)));
        assert!(!learner.add_observation((f64::NAN, 1.0)));
        assert_eq!(learner.sample_count(), 0);
    }

    #[test]
    fn test_state_roundtrip_reproduces_lookups() {
        let learner = learner_with(&[(-6.0, 1.5, 4), (0.0, 3.0, 6), (8.0, 5.0, 3), (14.0, 2.0, 1)]);
        let json = serde_json::to_string(&learner.get_state()).unwrap();

        let mut restored = BucketedLearner::new(MeanModel, config());
        restored.restore_state(serde_json::from_str(&json).unwrap());

        for query in [-20.0, -6.0, -3.0, 0.0, 3.7, 8.0, 11.0, 30.0] {
            assert_eq!(restored.lookup(query), learner.lookup(query), "query {query}");
        }
        assert_eq!(restored.get_state(), learner.get_state());
    }

    #[test]
    fn test_clear() {
        let mut learner = learner_with(&[(0.0, 1.0, 5)]);
        learner.clear();
        assert_eq!(learner.sample_count(), 0);
        assert!(learner.buckets().is_empty());
    }
}
