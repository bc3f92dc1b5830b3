//! Corpus-wide feature statistics
//!
//! Numerical features are scaled by the global min/max of their values;
//! coded-numerical features by the mean and standard deviation of the values
//! sharing a code. Statistics are scoped per feature name and recomputed from
//! the raw table on every call.

use crate::types::{code_value, numeric_value};
use indexmap::IndexMap;
use patsim_schema::{FeatureType, RawFeatureTable, CODE_SLOT, VALUE_SLOT};
use serde::{Deserialize, Serialize};

/// Streaming min/max and Welford mean/variance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation, undefined below two values
    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = Self::new();
        for value in iter {
            stats.push(value);
        }
        stats
    }
}

/// Global bounds of a numerical feature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NumericalStats {
    pub min_value: f64,
    pub max_value: f64,
}

/// Distribution of the values recorded under one code
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CodeStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Statistics of every numerical and coded-numerical feature
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureStatistics {
    pub numerical: IndexMap<String, NumericalStats>,
    pub coded_numerical: IndexMap<String, IndexMap<String, CodeStats>>,
}

impl FeatureStatistics {
    /// Compute statistics over every patient's raw entries
    pub fn compute(table: &RawFeatureTable, feature_types: &IndexMap<String, FeatureType>) -> Self {
        let mut stats = Self::default();
        for (name, feature_type) in feature_types {
            match feature_type {
                FeatureType::Numerical => {
                    let running: RunningStats = table
                        .values_for(name)
                        .flat_map(|(_, entries)| entries)
                        .filter_map(|raw| raw.get(VALUE_SLOT).and_then(numeric_value))
                        .collect();
                    if let (Some(min_value), Some(max_value)) = (running.min(), running.max()) {
                        stats.numerical.insert(
                            name.clone(),
                            NumericalStats {
                                min_value,
                                max_value,
                            },
                        );
                    }
                }
                FeatureType::CodedNumerical => {
                    let mut by_code: IndexMap<String, RunningStats> = IndexMap::new();
                    for raw in table.values_for(name).flat_map(|(_, entries)| entries) {
                        let code = raw.get(CODE_SLOT).and_then(code_value);
                        let value = raw.get(VALUE_SLOT).and_then(numeric_value);
                        if let (Some(code), Some(value)) = (code, value) {
                            by_code.entry(code).or_default().push(value);
                        }
                    }
                    let codes = by_code
                        .into_iter()
                        .filter_map(|(code, running)| {
                            let mean = running.mean()?;
                            let std_dev = running.std_dev()?;
                            Some((code, CodeStats { mean, std_dev }))
                        })
                        .collect();
                    stats.coded_numerical.insert(name.clone(), codes);
                }
                FeatureType::CategoricalString | FeatureType::CodedConcept => {}
            }
        }
        stats
    }

    pub fn numerical(&self, feature: &str) -> Option<NumericalStats> {
        self.numerical.get(feature).copied()
    }

    pub fn code(&self, feature: &str, code: &str) -> Option<CodeStats> {
        self.coded_numerical
            .get(feature)
            .and_then(|codes| codes.get(code))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patsim_schema::RawFeature;
    use serde_json::{json, Value};

    fn raw(pairs: &[(&str, Value)]) -> RawFeature {
        pairs
            .iter()
            .map(|(slot, value)| (slot.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_running_stats() {
        let stats: RunningStats = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
        assert_eq!(stats.count(), 8);
        assert!((stats.mean().unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(stats.min(), Some(2.0));
        assert_eq!(stats.max(), Some(9.0));
        // sample variance 32 / 7
        let std_dev = stats.std_dev().unwrap();
        assert!((std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_std_dev_undefined_below_two_values() {
        assert_eq!(RunningStats::new().std_dev(), None);
        assert_eq!(RunningStats::new().mean(), None);
        let single: RunningStats = [3.0].into_iter().collect();
        assert_eq!(single.std_dev(), None);
        assert_eq!(single.mean(), Some(3.0));
    }

    #[test]
    fn test_feature_statistics() {
        let mut table = RawFeatureTable::new();
        table.push("p1", "weight", raw(&[("value", json!(50))]));
        table.push("p1", "weight", raw(&[("value", Value::Null)]));
        table.push("p2", "weight", raw(&[("value", json!(90.5))]));
        table.push("p1", "labs", raw(&[("value", json!(4)), ("code", json!("a"))]));
        table.push("p2", "labs", raw(&[("value", json!(6)), ("code", json!("a"))]));
        table.push("p2", "labs", raw(&[("value", json!(1)), ("code", json!("b"))]));
        table.push("p2", "labs", raw(&[("value", json!(1)), ("code", Value::Null)]));

        let types: IndexMap<String, FeatureType> = [
            ("weight".to_string(), FeatureType::Numerical),
            ("labs".to_string(), FeatureType::CodedNumerical),
        ]
        .into_iter()
        .collect();
        let stats = FeatureStatistics::compute(&table, &types);

        assert_eq!(
            stats.numerical("weight"),
            Some(NumericalStats {
                min_value: 50.0,
                max_value: 90.5
            })
        );
        let a = stats.code("labs", "a").unwrap();
        assert_eq!(a.mean, 5.0);
        assert!((a.std_dev - 2.0f64.sqrt()).abs() < 1e-12);
        // a single value has no standard deviation
        assert_eq!(stats.code("labs", "b"), None);
    }

    #[test]
    fn test_statistics_scoped_per_feature() {
        let mut table = RawFeatureTable::new();
        table.push("p1", "first", raw(&[("value", json!(1)), ("code", json!("x"))]));
        table.push("p1", "first", raw(&[("value", json!(3)), ("code", json!("x"))]));
        table.push("p1", "second", raw(&[("value", json!(10)), ("code", json!("x"))]));
        table.push("p1", "second", raw(&[("value", json!(30)), ("code", json!("x"))]));

        let types: IndexMap<String, FeatureType> = [
            ("first".to_string(), FeatureType::CodedNumerical),
            ("second".to_string(), FeatureType::CodedNumerical),
        ]
        .into_iter()
        .collect();
        let stats = FeatureStatistics::compute(&table, &types);
        assert_eq!(stats.code("first", "x").unwrap().mean, 2.0);
        assert_eq!(stats.code("second", "x").unwrap().mean, 20.0);
    }

    #[test]
    fn test_missing_values_leave_no_bounds() {
        let mut table = RawFeatureTable::new();
        table.push("p1", "weight", raw(&[("value", Value::Null)]));
        let types: IndexMap<String, FeatureType> =
            [("weight".to_string(), FeatureType::Numerical)].into_iter().collect();
        assert_eq!(FeatureStatistics::compute(&table, &types).numerical("weight"), None);
    }
}
