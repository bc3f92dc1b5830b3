//! Feature extraction
//!
//! The selector holds compiled feature declarations and evaluates them
//! against a [`RecordStore`], producing one raw slot mapping per matched
//! record for every patient and feature.

use crate::definition::FeatureDefinition;
use crate::schema::{FeatureDeclaration, FeatureType};
use indexmap::IndexMap;
use patsim_core::{
    value_is_present, CompiledPath, Error, FhirPathCompiler, PathCompiler, RecordStore, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Slot name to extracted value (`null` when nothing was found)
pub type RawFeature = IndexMap<String, Value>;

/// Raw per-record extraction results: patient id, then feature name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RawFeatureTable {
    patients: IndexMap<String, IndexMap<String, Vec<RawFeature>>>,
}

impl RawFeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record outcome, creating the patient and feature entries
    pub fn push(&mut self, patient_id: &str, feature: &str, raw: RawFeature) {
        self.entry(patient_id, feature).push(raw);
    }

    fn entry(&mut self, patient_id: &str, feature: &str) -> &mut Vec<RawFeature> {
        self.patients
            .entry(patient_id.to_string())
            .or_default()
            .entry(feature.to_string())
            .or_default()
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Patient ids in record graph order
    pub fn patient_ids(&self) -> impl Iterator<Item = &str> {
        self.patients.keys().map(String::as_str)
    }

    /// Raw entries of one feature for one patient
    pub fn get(&self, patient_id: &str, feature: &str) -> Option<&[RawFeature]> {
        self.patients
            .get(patient_id)
            .and_then(|features| features.get(feature))
            .map(Vec::as_slice)
    }

    /// All features of one patient
    pub fn features(&self, patient_id: &str) -> Option<&IndexMap<String, Vec<RawFeature>>> {
        self.patients.get(patient_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexMap<String, Vec<RawFeature>>)> {
        self.patients.iter().map(|(id, features)| (id.as_str(), features))
    }

    /// Every patient's entries for one feature, in patient order
    pub fn values_for<'a>(
        &'a self,
        feature: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [RawFeature])> + 'a {
        self.patients.iter().map(move |(id, features)| {
            let entries = features.get(feature).map_or(&[][..], Vec::as_slice);
            (id.as_str(), entries)
        })
    }
}

/// Ordered (condition, target) pairs tried before the plain targets
struct SlotExtractor {
    slot: String,
    conditionals: Vec<(CompiledPath, CompiledPath)>,
    targets: Vec<CompiledPath>,
}

impl SlotExtractor {
    fn extract(&self, record: &Value) -> Value {
        // Only the first firing condition is considered
        if let Some((_, target)) = self
            .conditionals
            .iter()
            .find(|(condition, _)| condition.test(record))
        {
            if let Some(value) = target.first(record).filter(value_is_present) {
                return value;
            }
        }

        self.targets
            .iter()
            .find_map(|target| target.first(record).filter(value_is_present))
            .unwrap_or(Value::Null)
    }
}

struct ExtractionRule {
    resource_types: Vec<String>,
    slots: Vec<SlotExtractor>,
}

impl ExtractionRule {
    fn compile(declaration: &FeatureDeclaration, compiler: &dyn PathCompiler) -> Result<Self> {
        let mut slots = Vec::new();
        for slot in declaration.slot_names() {
            let targets = declaration
                .target_paths
                .get(slot)
                .map(|paths| {
                    paths
                        .iter()
                        .map(|path| compiler.compile(path))
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();

            let conditionals = declaration
                .conditional_paths
                .get(slot)
                .map(|pairs| {
                    pairs
                        .iter()
                        .map(|pair| -> Result<(CompiledPath, CompiledPath)> {
                            Ok((
                                compiler.compile(&pair.condition)?,
                                compiler.compile(&pair.target)?,
                            ))
                        })
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();

            slots.push(SlotExtractor {
                slot: slot.to_string(),
                conditionals,
                targets,
            });
        }

        Ok(Self {
            resource_types: declaration.resource_types.clone(),
            slots,
        })
    }

    fn evaluate(&self, record: &Value) -> RawFeature {
        self.slots
            .iter()
            .map(|extractor| (extractor.slot.clone(), extractor.extract(record)))
            .collect()
    }
}

struct RegisteredFeature {
    feature_type: FeatureType,
    rules: Vec<ExtractionRule>,
}

/// Registry of declared features and their compiled extraction rules
pub struct FeatureSelector {
    compiler: Arc<dyn PathCompiler>,
    features: IndexMap<String, RegisteredFeature>,
}

impl FeatureSelector {
    /// Selector using the built-in FHIRPath compiler
    pub fn new() -> Self {
        Self::with_compiler(Arc::new(FhirPathCompiler))
    }

    pub fn with_compiler(compiler: Arc<dyn PathCompiler>) -> Self {
        Self {
            compiler,
            features: IndexMap::new(),
        }
    }

    /// Register a feature declaration
    ///
    /// Declaring a known name again with the same type adds another rule to
    /// it; a different type is rejected. Paths are compiled here, so an
    /// invalid expression fails the declaration.
    pub fn declare(&mut self, declaration: FeatureDeclaration) -> Result<()> {
        declaration.validate()?;

        if let Some(existing) = self.features.get(&declaration.name) {
            if existing.feature_type != declaration.feature_type {
                return Err(Error::Configuration(format!(
                    "Feature '{}' is already declared as {}, cannot redeclare as {}",
                    declaration.name, existing.feature_type, declaration.feature_type
                )));
            }
        }

        let rule = ExtractionRule::compile(&declaration, self.compiler.as_ref())?;
        let feature_type = declaration.feature_type;
        debug!(
            feature = %declaration.name,
            feature_type = %feature_type,
            slots = rule.slots.len(),
            "Feature declared"
        );

        self.features
            .entry(declaration.name)
            .or_insert_with(|| RegisteredFeature {
                feature_type,
                rules: Vec::new(),
            })
            .rules
            .push(rule);
        Ok(())
    }

    /// Register a feature from one of the four definition shapes
    pub fn add_feature(&mut self, definition: FeatureDefinition) -> Result<()> {
        self.declare(definition.into_declaration()?)
    }

    /// Declared feature names in declaration order
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn feature_type(&self, name: &str) -> Option<FeatureType> {
        self.features.get(name).map(|feature| feature.feature_type)
    }

    /// Feature name to type, in declaration order
    pub fn feature_types(&self) -> IndexMap<String, FeatureType> {
        self.features
            .iter()
            .map(|(name, feature)| (name.clone(), feature.feature_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Evaluate every declared feature against the store's record graph
    ///
    /// Every patient gets an entry for every feature, possibly empty. Each
    /// matched record contributes one slot mapping, even when all of its
    /// slots are null.
    pub fn extract(&self, store: &RecordStore) -> RawFeatureTable {
        let mut table = RawFeatureTable::new();
        let mut extracted = 0usize;

        for (patient_id, records) in store.graph() {
            for (name, feature) in &self.features {
                let entries = table.entry(patient_id, name);
                for rule in &feature.rules {
                    for resource_type in &rule.resource_types {
                        let Some(bucket) = records.get(resource_type) else {
                            continue;
                        };
                        entries.extend(bucket.iter().map(|record| rule.evaluate(record)));
                        extracted += bucket.len();
                    }
                }
            }
        }

        debug!(
            patients = table.len(),
            features = self.features.len(),
            entries = extracted,
            "Features extracted"
        );
        table
    }
}

impl Default for FeatureSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FeatureSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureSelector")
            .field("features", &self.feature_types())
            .finish()
    }
}
