//! Similarity functions for the value-based feature types
//!
//! Every function compares the instance lists of two patients for one
//! feature and returns a score in [0.0, 1.0], or `None` when the two sides
//! are not comparable.

use crate::types::{CategoricalString, CodedNumerical, Numerical};
use ahash::AHashSet;
use statrs::distribution::{ContinuousCDF, Normal};

/// Jaccard index of the two value sets
///
/// # Returns
/// `None` if either side has no instances
pub fn compare_categorical(a: &[CategoricalString], b: &[CategoricalString]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let set_a: AHashSet<&str> = a.iter().map(|i| i.value.as_str()).collect();
    let set_b: AHashSet<&str> = b.iter().map(|i| i.value.as_str()).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    Some(intersection as f64 / union as f64)
}

/// Range-normalized distance between two single values
///
/// # Returns
/// `None` unless each side holds exactly one instance
pub fn compare_numerical(a: &[Numerical], b: &[Numerical]) -> Option<f64> {
    match (a, b) {
        ([a], [b]) => Some(numerical_similarity(a, b)),
        _ => None,
    }
}

/// `1 - (|v1 - v2| - min) / (max - min)` on the first side's bounds,
/// clamped into [0, 1]
///
/// Equal values, and a degenerate range where every observed value
/// coincides, score 1.
pub fn numerical_similarity(a: &Numerical, b: &Numerical) -> f64 {
    let range = a.max_value - a.min_value;
    if a.value == b.value || range <= 0.0 {
        return 1.0;
    }
    let distance = (a.value - b.value).abs() - a.min_value;
    (1.0 - distance / range).clamp(0.0, 1.0)
}

/// Distribution overlap of two values recorded under the same code
///
/// Percentiles come from a normal distribution with the code's corpus mean
/// and standard deviation. The raw overlap `1 - |p1 - p2|` is damped by
/// `2 * |mean(p1, p2) - 0.5|` so that pairs around the median count little.
///
/// # Returns
/// `None` when the codes differ, when neither value is flagged abnormal, or
/// when the code's standard deviation is zero
pub fn compare_coded_numerical_pair(a: &CodedNumerical, b: &CodedNumerical) -> Option<f64> {
    if a.code != b.code || !(a.is_abnormal || b.is_abnormal) {
        return None;
    }
    if a.code_std_dev <= 0.0 {
        return None;
    }

    let distribution = Normal::new(a.code_mean, a.code_std_dev).ok()?;
    let p1 = distribution.cdf(a.value);
    let p2 = distribution.cdf(b.value);

    let similarity = 1.0 - (p1 - p2).abs();
    let mean_percentile = (p1 + p2) / 2.0;
    Some(similarity * 2.0 * (mean_percentile - 0.5).abs())
}

/// Mean over every same-code pair that produced a score
///
/// # Returns
/// `None` if no pair contributed
pub fn compare_coded_numerical(a: &[CodedNumerical], b: &[CodedNumerical]) -> Option<f64> {
    let scores: Vec<f64> = a
        .iter()
        .flat_map(|x| b.iter().filter_map(move |y| compare_coded_numerical_pair(x, y)))
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}
