//! Typed feature instances
//!
//! Raw slot mappings are materialized into one of four instance types.
//! Entries missing a required slot, or whose statistics are undefined, are
//! dropped rather than filled in.

use crate::stats::FeatureStatistics;
use patsim_schema::{FeatureType, RawFeature, ABNORMAL_SLOT, CODE_SLOT, SYSTEM_SLOT, VALUE_SLOT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoricalString {
    pub value: String,
    pub feature_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Numerical {
    pub value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub feature_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodedConcept {
    pub code: String,
    pub system: String,
    pub feature_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodedNumerical {
    pub code: String,
    pub value: f64,
    pub code_mean: f64,
    pub code_std_dev: f64,
    pub is_abnormal: bool,
    pub feature_name: String,
}

/// The typed instances of one feature for one patient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "instances", rename_all = "snake_case")]
pub enum TypedFeature {
    CategoricalString(Vec<CategoricalString>),
    Numerical(Vec<Numerical>),
    CodedConcept(Vec<CodedConcept>),
    CodedNumerical(Vec<CodedNumerical>),
}

impl TypedFeature {
    /// Build the instances of `feature` from a patient's raw entries
    pub fn materialize(
        feature: &str,
        feature_type: FeatureType,
        entries: &[RawFeature],
        stats: &FeatureStatistics,
    ) -> Self {
        match feature_type {
            FeatureType::CategoricalString => TypedFeature::CategoricalString(
                entries
                    .iter()
                    .filter_map(|raw| present(raw, VALUE_SLOT))
                    .filter_map(|value| parse_slot(feature, VALUE_SLOT, value, categorical_value))
                    .map(|value| CategoricalString {
                        value,
                        feature_name: feature.to_string(),
                    })
                    .collect(),
            ),
            FeatureType::Numerical => {
                let Some(bounds) = stats.numerical(feature) else {
                    return TypedFeature::Numerical(Vec::new());
                };
                TypedFeature::Numerical(
                    entries
                        .iter()
                        .filter_map(|raw| present(raw, VALUE_SLOT))
                        .filter_map(|value| parse_slot(feature, VALUE_SLOT, value, numeric_value))
                        .map(|value| Numerical {
                            value,
                            min_value: bounds.min_value,
                            max_value: bounds.max_value,
                            feature_name: feature.to_string(),
                        })
                        .collect(),
                )
            }
            FeatureType::CodedConcept => TypedFeature::CodedConcept(
                entries
                    .iter()
                    .filter_map(|raw| {
                        let code =
                            parse_slot(feature, CODE_SLOT, present(raw, CODE_SLOT)?, code_value)?;
                        let system =
                            parse_slot(feature, SYSTEM_SLOT, present(raw, SYSTEM_SLOT)?, code_value)?;
                        Some(CodedConcept {
                            code,
                            system,
                            feature_name: feature.to_string(),
                        })
                    })
                    .collect(),
            ),
            FeatureType::CodedNumerical => TypedFeature::CodedNumerical(
                entries
                    .iter()
                    .filter_map(|raw| {
                        let value =
                            parse_slot(feature, VALUE_SLOT, present(raw, VALUE_SLOT)?, numeric_value)?;
                        let code =
                            parse_slot(feature, CODE_SLOT, present(raw, CODE_SLOT)?, code_value)?;
                        let code_stats = stats.code(feature, &code)?;
                        Some(CodedNumerical {
                            code,
                            value,
                            code_mean: code_stats.mean,
                            code_std_dev: code_stats.std_dev,
                            is_abnormal: raw.get(ABNORMAL_SLOT).map_or(true, abnormal_flag),
                            feature_name: feature.to_string(),
                        })
                    })
                    .collect(),
            ),
        }
    }

    pub fn feature_type(&self) -> FeatureType {
        match self {
            TypedFeature::CategoricalString(_) => FeatureType::CategoricalString,
            TypedFeature::Numerical(_) => FeatureType::Numerical,
            TypedFeature::CodedConcept(_) => FeatureType::CodedConcept,
            TypedFeature::CodedNumerical(_) => FeatureType::CodedNumerical,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedFeature::CategoricalString(instances) => instances.len(),
            TypedFeature::Numerical(instances) => instances.len(),
            TypedFeature::CodedConcept(instances) => instances.len(),
            TypedFeature::CodedNumerical(instances) => instances.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn present<'a>(raw: &'a RawFeature, slot: &str) -> Option<&'a Value> {
    raw.get(slot).filter(|value| !value.is_null())
}

fn parse_slot<T>(
    feature: &str,
    slot: &str,
    value: &Value,
    parse: fn(&Value) -> Option<T>,
) -> Option<T> {
    let parsed = parse(value);
    if parsed.is_none() {
        warn!(feature, slot, %value, "Dropping slot value of unexpected type");
    }
    parsed
}

/// Numbers only
pub fn numeric_value(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Strings, with numbers and booleans stringified
pub fn categorical_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Codes and systems: strings, or numbers written as codes
pub fn code_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Read an abnormality flag: booleans as-is, interpretation codes `N` and
/// `normal` as false, any other value as true
pub fn abnormal_flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(code) => {
            !(code.eq_ignore_ascii_case("n") || code.eq_ignore_ascii_case("normal"))
        }
        _ => true,
    }
}
