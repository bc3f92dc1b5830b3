//! FHIR resource helpers
//!
//! Records are kept as untyped `serde_json::Value` mappings. This module holds
//! the minimal shape checks applied on ingestion and the list of resource type
//! names used to recognise `<ResourceType>/<id>` references.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource type that acts as the join key of the record graph
pub const PATIENT: &str = "Patient";

/// FHIR R4 resource type names
pub const RESOURCE_TYPES: &[&str] = &[
    "Account",
    "ActivityDefinition",
    "AdverseEvent",
    "AllergyIntolerance",
    "Appointment",
    "AppointmentResponse",
    "AuditEvent",
    "Basic",
    "Binary",
    "BiologicallyDerivedProduct",
    "BodyStructure",
    "Bundle",
    "CapabilityStatement",
    "CarePlan",
    "CareTeam",
    "CatalogEntry",
    "ChargeItem",
    "ChargeItemDefinition",
    "Claim",
    "ClaimResponse",
    "ClinicalImpression",
    "CodeSystem",
    "Communication",
    "CommunicationRequest",
    "CompartmentDefinition",
    "Composition",
    "ConceptMap",
    "Condition",
    "Consent",
    "Contract",
    "Coverage",
    "CoverageEligibilityRequest",
    "CoverageEligibilityResponse",
    "DetectedIssue",
    "Device",
    "DeviceDefinition",
    "DeviceMetric",
    "DeviceRequest",
    "DeviceUseStatement",
    "DiagnosticReport",
    "DocumentManifest",
    "DocumentReference",
    "EffectEvidenceSynthesis",
    "Encounter",
    "Endpoint",
    "EnrollmentRequest",
    "EnrollmentResponse",
    "EpisodeOfCare",
    "EventDefinition",
    "Evidence",
    "EvidenceVariable",
    "ExampleScenario",
    "ExplanationOfBenefit",
    "FamilyMemberHistory",
    "Flag",
    "Goal",
    "GraphDefinition",
    "Group",
    "GuidanceResponse",
    "HealthcareService",
    "ImagingStudy",
    "Immunization",
    "ImmunizationEvaluation",
    "ImmunizationRecommendation",
    "ImplementationGuide",
    "InsurancePlan",
    "Invoice",
    "Library",
    "Linkage",
    "List",
    "Location",
    "Measure",
    "MeasureReport",
    "Media",
    "Medication",
    "MedicationAdministration",
    "MedicationDispense",
    "MedicationKnowledge",
    "MedicationRequest",
    "MedicationStatement",
    "MedicinalProduct",
    "MessageDefinition",
    "MessageHeader",
    "MolecularSequence",
    "NamingSystem",
    "NutritionOrder",
    "Observation",
    "ObservationDefinition",
    "OperationDefinition",
    "OperationOutcome",
    "Organization",
    "OrganizationAffiliation",
    "Parameters",
    "Patient",
    "PaymentNotice",
    "PaymentReconciliation",
    "Person",
    "PlanDefinition",
    "Practitioner",
    "PractitionerRole",
    "Procedure",
    "Provenance",
    "Questionnaire",
    "QuestionnaireResponse",
    "RelatedPerson",
    "RequestGroup",
    "ResearchDefinition",
    "ResearchElementDefinition",
    "ResearchStudy",
    "ResearchSubject",
    "RiskAssessment",
    "RiskEvidenceSynthesis",
    "Schedule",
    "SearchParameter",
    "ServiceRequest",
    "Slot",
    "Specimen",
    "SpecimenDefinition",
    "StructureDefinition",
    "StructureMap",
    "Subscription",
    "Substance",
    "SupplyDelivery",
    "SupplyRequest",
    "Task",
    "TerminologyCapabilities",
    "TestReport",
    "TestScript",
    "ValueSet",
    "VerificationResult",
    "VisionPrescription",
];

/// Check whether `name` is a recognised resource type
pub fn is_resource_type(name: &str) -> bool {
    RESOURCE_TYPES.binary_search(&name).is_ok()
}

/// Identity of a record inside the corpus
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Read the key of a record, if it has a string `resourceType` and `id`
    pub fn of(resource: &Value) -> Option<Self> {
        Some(Self::new(resource_type(resource)?, resource_id(resource)?))
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

pub fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

pub fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

pub fn is_patient(resource: &Value) -> bool {
    resource_type(resource) == Some(PATIENT)
}

/// Minimal shape check for a sequence of records
pub fn validate_resources(resources: &[Value]) -> Result<()> {
    if resources.is_empty() {
        return Err(Error::InvalidInput("Input is empty".to_string()));
    }
    for (index, resource) in resources.iter().enumerate() {
        if !resource.is_object() {
            return Err(Error::InvalidInput(format!(
                "Element {index} is not a resource mapping"
            )));
        }
        if ResourceKey::of(resource).is_none() {
            return Err(Error::InvalidInput(format!(
                "Element {index} lacks a string 'id' or 'resourceType'"
            )));
        }
    }
    Ok(())
}

/// Unwrap `bundle.entry[*].resource` into a record sequence
pub fn unwrap_bundle(bundle: &Value) -> Result<Vec<Value>> {
    let object = bundle
        .as_object()
        .ok_or_else(|| Error::InvalidInput("Bundle input is not a mapping".to_string()))?;

    let entries = match object.get("entry").and_then(Value::as_array) {
        Some(entries) if !entries.is_empty() => entries,
        _ => {
            return Err(Error::InvalidInput(
                "Bundle input does not contain entry".to_string(),
            ))
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry.get("resource") {
            Some(resource) if resource.is_object() => Ok(resource.clone()),
            _ => Err(Error::InvalidInput(format!(
                "Bundle entry {index} does not wrap a resource"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_types_sorted_for_lookup() {
        let mut sorted = RESOURCE_TYPES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESOURCE_TYPES);
        assert!(is_resource_type("Patient"));
        assert!(is_resource_type("Observation"));
        assert!(!is_resource_type("patient"));
    }

    #[test]
    fn test_resource_key() {
        let resource = json!({"resourceType": "Observation", "id": "o1"});
        let key = ResourceKey::of(&resource).unwrap();
        assert_eq!(key, ResourceKey::new("Observation", "o1"));
        assert_eq!(key.to_string(), "Observation/o1");

        assert!(ResourceKey::of(&json!({"id": "o1"})).is_none());
        assert!(ResourceKey::of(&json!({"resourceType": "Patient", "id": 7})).is_none());
    }

    #[test]
    fn test_validate_resources() {
        assert!(matches!(validate_resources(&[]), Err(Error::InvalidInput(_))));
        assert!(matches!(
            validate_resources(&[json!("Patient/p1")]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            validate_resources(&[json!({"resourceType": "Patient"})]),
            Err(Error::InvalidInput(_))
        ));
        assert!(validate_resources(&[json!({"resourceType": "Patient", "id": "p1"})]).is_ok());
    }

    #[test]
    fn test_unwrap_bundle() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "Observation", "id": "o1"}}
            ]
        });
        let resources = unwrap_bundle(&bundle).unwrap();
        assert_eq!(resources.len(), 2);
        assert!(is_patient(&resources[0]));

        assert!(unwrap_bundle(&json!([])).is_err());
        assert!(unwrap_bundle(&json!({"entry": []})).is_err());
        assert!(unwrap_bundle(&json!({"entry": [{"fullUrl": "x"}]})).is_err());
    }
}
