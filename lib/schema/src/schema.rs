//! Feature schema definitions
//!
//! A feature declaration names a typed value derived from patient records,
//! which resource types it is read from, and the path expressions that fill
//! each of its slots.

use indexmap::IndexMap;
use patsim_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot holding the value of categorical, numerical and coded-numerical features
pub const VALUE_SLOT: &str = "value";
/// Slot holding a concept code
pub const CODE_SLOT: &str = "code";
/// Slot holding the coding system of a concept
pub const SYSTEM_SLOT: &str = "system";
/// Optional abnormality flag read alongside coded-numerical values
pub const ABNORMAL_SLOT: &str = "is_abnormal";

/// Feature type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// String values compared by set overlap
    CategoricalString,
    /// A single number per patient compared on the corpus range
    Numerical,
    /// (code, system) pairs compared through an ontology
    CodedConcept,
    /// Numbers grouped by code compared on the code's distribution
    CodedNumerical,
}

impl FeatureType {
    /// Slots an instance of this type cannot do without
    pub fn required_slots(self) -> &'static [&'static str] {
        match self {
            FeatureType::CategoricalString | FeatureType::Numerical => &[VALUE_SLOT],
            FeatureType::CodedConcept => &[CODE_SLOT, SYSTEM_SLOT],
            FeatureType::CodedNumerical => &[VALUE_SLOT, CODE_SLOT],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureType::CategoricalString => "categorical_string",
            FeatureType::Numerical => "numerical",
            FeatureType::CodedConcept => "coded_concept",
            FeatureType::CodedNumerical => "coded_numerical",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(condition, target)` path pair: when `condition` holds on a record,
/// the first value of `target` fills the slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionalPath {
    pub condition: String,
    pub target: String,
}

impl ConditionalPath {
    pub fn new(condition: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            target: target.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrManyRepr {
    One(String),
    Many(Vec<String>),
}

/// One string or a list of strings, normalized to a list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "OneOrManyRepr")]
pub struct OneOrMany(Vec<String>);

impl OneOrMany {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<OneOrManyRepr> for OneOrMany {
    fn from(repr: OneOrManyRepr) -> Self {
        match repr {
            OneOrManyRepr::One(one) => Self(vec![one]),
            OneOrManyRepr::Many(many) => Self(many),
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for OneOrMany {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl From<Vec<&str>> for OneOrMany {
    fn from(values: Vec<&str>) -> Self {
        Self(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OneOrMany {
    fn from(values: [&str; N]) -> Self {
        Self(values.iter().map(|v| v.to_string()).collect())
    }
}

impl From<&[&str]> for OneOrMany {
    fn from(values: &[&str]) -> Self {
        Self(values.iter().map(|v| v.to_string()).collect())
    }
}

/// A registered feature: name, type, source resource types and slot paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureDeclaration {
    pub name: String,

    #[serde(rename = "type")]
    pub feature_type: FeatureType,

    pub resource_types: Vec<String>,

    /// Plain path expressions per slot, tried in order
    #[serde(default)]
    pub target_paths: IndexMap<String, Vec<String>>,

    /// Conditional path pairs per slot, tried before the plain paths
    #[serde(default)]
    pub conditional_paths: IndexMap<String, Vec<ConditionalPath>>,
}

impl FeatureDeclaration {
    pub fn new(
        name: impl Into<String>,
        feature_type: FeatureType,
        resource_types: impl Into<OneOrMany>,
    ) -> Self {
        Self {
            name: name.into(),
            feature_type,
            resource_types: resource_types.into().into_vec(),
            target_paths: IndexMap::new(),
            conditional_paths: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_target_paths(mut self, slot: impl Into<String>, paths: impl Into<OneOrMany>) -> Self {
        self.target_paths.insert(slot.into(), paths.into().into_vec());
        self
    }

    #[must_use]
    pub fn with_conditional_paths(
        mut self,
        slot: impl Into<String>,
        pairs: Vec<ConditionalPath>,
    ) -> Self {
        self.conditional_paths.insert(slot.into(), pairs);
        self
    }

    /// Slot names in declaration order: plain-path slots first, then slots
    /// that only have conditional paths
    pub fn slot_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.target_paths.keys().map(String::as_str).collect();
        for slot in self.conditional_paths.keys() {
            if !self.target_paths.contains_key(slot) {
                names.push(slot);
            }
        }
        names
    }

    /// Validate the declaration
    /// - name and resource types must be present
    /// - at least one slot must carry a plain or conditional path
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("Feature name cannot be empty".to_string()));
        }
        if self.resource_types.is_empty() {
            return Err(Error::Configuration(format!(
                "Feature '{}' has no target resource types",
                self.name
            )));
        }

        let has_target = self.target_paths.values().any(|paths| !paths.is_empty());
        let has_conditional = self.conditional_paths.values().any(|pairs| !pairs.is_empty());
        if !has_target && !has_conditional {
            return Err(Error::Configuration(format!(
                "Feature '{}' has no target paths or conditional target paths",
                self.name
            )));
        }
        Ok(())
    }
}
