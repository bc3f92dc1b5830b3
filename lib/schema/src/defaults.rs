//! Default path tables
//!
//! Paths used when a declaration leaves a slot without explicit expressions.
//! Lookups are keyed by feature type, slot and resource type.

use crate::schema::{FeatureType, ABNORMAL_SLOT, CODE_SLOT, SYSTEM_SLOT, VALUE_SLOT};

const CODE_PATHS: &[(&str, &[&str])] = &[
    ("Observation", &["code.coding.code"]),
    ("Condition", &["code.coding.code"]),
    ("Procedure", &["code.coding.code"]),
    ("MedicationRequest", &["medicationCodeableConcept.coding.code"]),
    ("MedicationStatement", &["medicationCodeableConcept.coding.code"]),
    ("AllergyIntolerance", &["code.coding.code"]),
    ("Immunization", &["vaccineCode.coding.code"]),
    ("DiagnosticReport", &["code.coding.code"]),
    ("Encounter", &["type.coding.code"]),
];

const SYSTEM_PATHS: &[(&str, &[&str])] = &[
    ("Observation", &["code.coding.system"]),
    ("Condition", &["code.coding.system"]),
    ("Procedure", &["code.coding.system"]),
    ("MedicationRequest", &["medicationCodeableConcept.coding.system"]),
    ("MedicationStatement", &["medicationCodeableConcept.coding.system"]),
    ("AllergyIntolerance", &["code.coding.system"]),
    ("Immunization", &["vaccineCode.coding.system"]),
    ("DiagnosticReport", &["code.coding.system"]),
    ("Encounter", &["type.coding.system"]),
];

const CATEGORICAL_VALUE_PATHS: &[(&str, &[&str])] = &[
    ("Patient", &["gender", "maritalStatus.coding.code"]),
    ("Observation", &["valueCodeableConcept.coding.code", "valueString", "valueBoolean"]),
    ("Condition", &["clinicalStatus.coding.code", "verificationStatus.coding.code"]),
    ("Procedure", &["status"]),
    ("MedicationRequest", &["status", "intent"]),
    ("MedicationStatement", &["status"]),
    ("AllergyIntolerance", &["category", "criticality"]),
    ("Immunization", &["status"]),
    ("DiagnosticReport", &["status", "conclusion"]),
    ("Encounter", &["class.code", "status"]),
];

const NUMERICAL_VALUE_PATHS: &[(&str, &[&str])] = &[
    ("Patient", &["multipleBirthInteger"]),
    ("Observation", &["valueQuantity.value", "valueInteger"]),
    ("MedicationRequest", &["dosageInstruction.doseAndRate.doseQuantity.value"]),
    ("MedicationStatement", &["dosage.doseAndRate.doseQuantity.value"]),
    ("Immunization", &["doseQuantity.value"]),
];

const CODED_NUMERICAL_VALUE_PATHS: &[(&str, &[&str])] = &[
    ("Observation", &["valueQuantity.value", "valueInteger"]),
    ("MedicationRequest", &["dosageInstruction.doseAndRate.doseQuantity.value"]),
    ("MedicationStatement", &["dosage.doseAndRate.doseQuantity.value"]),
    ("Immunization", &["doseQuantity.value"]),
];

const ABNORMAL_PATHS: &[(&str, &[&str])] = &[
    ("Observation", &["interpretation.coding.code"]),
    ("DiagnosticReport", &["conclusionCode.coding.code"]),
];

type PathTable = &'static [(&'static str, &'static [&'static str])];

fn lookup(table: PathTable, resource_type: &str) -> &'static [&'static str] {
    table
        .iter()
        .find(|(name, _)| *name == resource_type)
        .map(|(_, paths)| *paths)
        .unwrap_or(&[])
}

/// Default paths for one slot of one resource type
pub fn default_paths(
    feature_type: FeatureType,
    slot: &str,
    resource_type: &str,
) -> &'static [&'static str] {
    let table: PathTable = match (feature_type, slot) {
        (FeatureType::CategoricalString, VALUE_SLOT) => CATEGORICAL_VALUE_PATHS,
        (FeatureType::Numerical, VALUE_SLOT) => NUMERICAL_VALUE_PATHS,
        (FeatureType::CodedNumerical, VALUE_SLOT) => CODED_NUMERICAL_VALUE_PATHS,
        (FeatureType::CodedNumerical, ABNORMAL_SLOT) => ABNORMAL_PATHS,
        (FeatureType::CodedConcept | FeatureType::CodedNumerical, CODE_SLOT) => CODE_PATHS,
        (FeatureType::CodedConcept, SYSTEM_SLOT) => SYSTEM_PATHS,
        _ => return &[],
    };
    lookup(table, resource_type)
}

/// Default paths for a slot across several resource types, deduplicated,
/// in resource-type order
pub fn default_paths_for(
    feature_type: FeatureType,
    slot: &str,
    resource_types: &[String],
) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for resource_type in resource_types {
        for path in default_paths(feature_type, slot, resource_type) {
            if !paths.iter().any(|known| known == path) {
                paths.push((*path).to_string());
            }
        }
    }
    paths
}
