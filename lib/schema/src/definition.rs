//! Feature definition shapes
//!
//! One shape per feature type, each naming its path fields after the slots
//! it fills. A shape is turned into a [`FeatureDeclaration`] before
//! registration; empty slots are filled from the default path tables.

use crate::defaults::default_paths_for;
use crate::schema::{
    ConditionalPath, FeatureDeclaration, FeatureType, OneOrMany, ABNORMAL_SLOT, CODE_SLOT,
    SYSTEM_SLOT, VALUE_SLOT,
};
use patsim_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Categorical-string or numerical feature: a single `value` slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueFeature {
    pub name: String,
    pub resource_types: OneOrMany,
    #[serde(default)]
    pub target_paths: OneOrMany,
    #[serde(default)]
    pub conditional_target_paths: Vec<ConditionalPath>,
}

impl ValueFeature {
    pub fn new(name: impl Into<String>, resource_types: impl Into<OneOrMany>) -> Self {
        Self {
            name: name.into(),
            resource_types: resource_types.into(),
            target_paths: OneOrMany::default(),
            conditional_target_paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_target_paths(mut self, paths: impl Into<OneOrMany>) -> Self {
        self.target_paths = paths.into();
        self
    }

    #[must_use]
    pub fn with_conditional_path(
        mut self,
        condition: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.conditional_target_paths
            .push(ConditionalPath::new(condition, target));
        self
    }
}

/// Coded-concept feature: `code` and `system` slots
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodedConceptFeature {
    pub name: String,
    pub resource_types: OneOrMany,
    #[serde(default)]
    pub code_paths: OneOrMany,
    #[serde(default)]
    pub system_paths: OneOrMany,
    #[serde(default)]
    pub conditional_code_paths: Vec<ConditionalPath>,
    #[serde(default)]
    pub conditional_system_paths: Vec<ConditionalPath>,
}

impl CodedConceptFeature {
    pub fn new(name: impl Into<String>, resource_types: impl Into<OneOrMany>) -> Self {
        Self {
            name: name.into(),
            resource_types: resource_types.into(),
            code_paths: OneOrMany::default(),
            system_paths: OneOrMany::default(),
            conditional_code_paths: Vec::new(),
            conditional_system_paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_code_paths(mut self, paths: impl Into<OneOrMany>) -> Self {
        self.code_paths = paths.into();
        self
    }

    #[must_use]
    pub fn with_system_paths(mut self, paths: impl Into<OneOrMany>) -> Self {
        self.system_paths = paths.into();
        self
    }

    #[must_use]
    pub fn with_conditional_code_path(
        mut self,
        condition: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.conditional_code_paths
            .push(ConditionalPath::new(condition, target));
        self
    }

    #[must_use]
    pub fn with_conditional_system_path(
        mut self,
        condition: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.conditional_system_paths
            .push(ConditionalPath::new(condition, target));
        self
    }
}

/// Coded-numerical feature: `value` and `code` slots plus an optional
/// `is_abnormal` flag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodedNumericalFeature {
    pub name: String,
    pub resource_types: OneOrMany,
    #[serde(default)]
    pub value_paths: OneOrMany,
    #[serde(default)]
    pub code_paths: OneOrMany,
    #[serde(default)]
    pub abnormal_paths: OneOrMany,
    #[serde(default)]
    pub conditional_value_paths: Vec<ConditionalPath>,
    #[serde(default)]
    pub conditional_code_paths: Vec<ConditionalPath>,
}

impl CodedNumericalFeature {
    pub fn new(name: impl Into<String>, resource_types: impl Into<OneOrMany>) -> Self {
        Self {
            name: name.into(),
            resource_types: resource_types.into(),
            value_paths: OneOrMany::default(),
            code_paths: OneOrMany::default(),
            abnormal_paths: OneOrMany::default(),
            conditional_value_paths: Vec::new(),
            conditional_code_paths: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_value_paths(mut self, paths: impl Into<OneOrMany>) -> Self {
        self.value_paths = paths.into();
        self
    }

    #[must_use]
    pub fn with_code_paths(mut self, paths: impl Into<OneOrMany>) -> Self {
        self.code_paths = paths.into();
        self
    }

    #[must_use]
    pub fn with_abnormal_paths(mut self, paths: impl Into<OneOrMany>) -> Self {
        self.abnormal_paths = paths.into();
        self
    }

    #[must_use]
    pub fn with_conditional_value_path(
        mut self,
        condition: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.conditional_value_paths
            .push(ConditionalPath::new(condition, target));
        self
    }

    #[must_use]
    pub fn with_conditional_code_path(
        mut self,
        condition: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.conditional_code_paths
            .push(ConditionalPath::new(condition, target));
        self
    }
}

/// A feature definition as written in configuration, tagged by `"type"`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureDefinition {
    CategoricalString(ValueFeature),
    Numerical(ValueFeature),
    CodedConcept(CodedConceptFeature),
    CodedNumerical(CodedNumericalFeature),
}

impl FeatureDefinition {
    pub fn name(&self) -> &str {
        match self {
            FeatureDefinition::CategoricalString(f) | FeatureDefinition::Numerical(f) => &f.name,
            FeatureDefinition::CodedConcept(f) => &f.name,
            FeatureDefinition::CodedNumerical(f) => &f.name,
        }
    }

    pub fn feature_type(&self) -> FeatureType {
        match self {
            FeatureDefinition::CategoricalString(_) => FeatureType::CategoricalString,
            FeatureDefinition::Numerical(_) => FeatureType::Numerical,
            FeatureDefinition::CodedConcept(_) => FeatureType::CodedConcept,
            FeatureDefinition::CodedNumerical(_) => FeatureType::CodedNumerical,
        }
    }

    /// Map the shape onto slots, filling empty slots from the default tables
    ///
    /// A required slot left with no explicit, default or conditional path is
    /// a configuration error. `is_abnormal` is optional.
    pub fn into_declaration(self) -> Result<FeatureDeclaration> {
        let feature_type = self.feature_type();
        let builder = match self {
            FeatureDefinition::CategoricalString(f) | FeatureDefinition::Numerical(f) => {
                SlotBuilder::new(f.name, feature_type, f.resource_types)
                    .slot(VALUE_SLOT, f.target_paths, f.conditional_target_paths)?
            }
            FeatureDefinition::CodedConcept(f) => {
                SlotBuilder::new(f.name, feature_type, f.resource_types)
                    .slot(CODE_SLOT, f.code_paths, f.conditional_code_paths)?
                    .slot(SYSTEM_SLOT, f.system_paths, f.conditional_system_paths)?
            }
            FeatureDefinition::CodedNumerical(f) => {
                SlotBuilder::new(f.name, feature_type, f.resource_types)
                    .slot(VALUE_SLOT, f.value_paths, f.conditional_value_paths)?
                    .slot(CODE_SLOT, f.code_paths, f.conditional_code_paths)?
                    .optional_slot(ABNORMAL_SLOT, f.abnormal_paths)
            }
        };
        builder.finish()
    }
}

struct SlotBuilder {
    declaration: FeatureDeclaration,
}

impl SlotBuilder {
    fn new(name: String, feature_type: FeatureType, resource_types: OneOrMany) -> Self {
        Self {
            declaration: FeatureDeclaration::new(name, feature_type, resource_types),
        }
    }

    fn resolve(&self, slot: &str, explicit: OneOrMany) -> Vec<String> {
        if explicit.is_empty() {
            default_paths_for(
                self.declaration.feature_type,
                slot,
                &self.declaration.resource_types,
            )
        } else {
            explicit.into_vec()
        }
    }

    fn slot(
        mut self,
        slot: &str,
        explicit: OneOrMany,
        conditional: Vec<ConditionalPath>,
    ) -> Result<Self> {
        let paths = self.resolve(slot, explicit);
        if paths.is_empty() && conditional.is_empty() {
            return Err(Error::Configuration(format!(
                "No {} paths provided for feature '{}' and no default paths for resource types {:?}",
                slot, self.declaration.name, self.declaration.resource_types
            )));
        }
        if !paths.is_empty() {
            self.declaration.target_paths.insert(slot.to_string(), paths);
        }
        if !conditional.is_empty() {
            self.declaration
                .conditional_paths
                .insert(slot.to_string(), conditional);
        }
        Ok(self)
    }

    fn optional_slot(mut self, slot: &str, explicit: OneOrMany) -> Self {
        let paths = self.resolve(slot, explicit);
        if !paths.is_empty() {
            self.declaration.target_paths.insert(slot.to_string(), paths);
        }
        self
    }

    fn finish(self) -> Result<FeatureDeclaration> {
        self.declaration.validate()?;
        Ok(self.declaration)
    }
}
