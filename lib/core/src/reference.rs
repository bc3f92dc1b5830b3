//! Reference discovery and normalization
//!
//! A reference is any mapping that carries a string field literally named
//! `reference`. Discovery is a depth-first walk over the untyped record tree;
//! normalization reduces the referenced identifier to a bare resource id.

use crate::resource::is_resource_type;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

const REFERENCE_KEY: &str = "reference";
const HISTORY_SEGMENT: &str = "_history";
const URN_UUID_PREFIX: &str = "urn:uuid:";

/// A normalized reference found inside a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Bare id of the referenced resource (or the raw reference if it could
    /// not be normalized)
    pub id: String,
    /// Resource type, when the reference had the `<Type>/<id>` form
    pub resource_type: Option<String>,
    /// The reference string as it appeared in the record
    pub raw: String,
}

impl Reference {
    /// Normalize a raw reference string
    ///
    /// - `<Type>/<id>`, optionally behind an absolute URL or followed by
    ///   `/_history/<version>`, resolves to `<id>` when `<Type>` is a known
    ///   resource type
    /// - UUID style references (`urn:uuid:<uuid>[:<id>]`) resolve to the text
    ///   after the last colon
    /// - anything else is kept unchanged
    pub fn parse(raw: &str) -> Self {
        if let Some((resource_type, id)) = split_typed_reference(raw) {
            return Self {
                id,
                resource_type: Some(resource_type),
                raw: raw.to_string(),
            };
        }

        let id = if is_uuid_reference(raw) {
            id_from_uuid(raw).to_string()
        } else {
            raw.to_string()
        };

        Self {
            id,
            resource_type: None,
            raw: raw.to_string(),
        }
    }
}

/// Collect every reference in a record, depth first
pub fn collect_references(resource: &Value) -> Vec<Reference> {
    let mut references = Vec::new();
    let mut stack = vec![resource];

    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if let Some(raw) = map.get(REFERENCE_KEY).and_then(Value::as_str) {
                    references.push(Reference::parse(raw));
                }
                // reversed so that fields pop in map order
                for (key, child) in map.iter().rev() {
                    if key != REFERENCE_KEY {
                        stack.push(child);
                    }
                }
            }
            Value::Array(items) => {
                stack.extend(items.iter().rev());
            }
            _ => {}
        }
    }

    references
}

/// Split `[base-url/]<Type>/<id>[/_history/<vid>]` into (type, id)
fn split_typed_reference(raw: &str) -> Option<(String, String)> {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.to_string(),
    };

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() >= 4 && segments[segments.len() - 2] == HISTORY_SEGMENT {
        segments.truncate(segments.len() - 2);
    }
    if segments.len() < 2 {
        return None;
    }

    let id = segments[segments.len() - 1];
    let resource_type = capitalize(segments[segments.len() - 2]);
    if is_resource_type(&resource_type) {
        Some((resource_type, id.to_string()))
    } else {
        None
    }
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// True for `urn:uuid:<uuid>` references, optionally followed by `:<id>`
pub fn is_uuid_reference(raw: &str) -> bool {
    raw.strip_prefix(URN_UUID_PREFIX)
        .and_then(|rest| rest.split(':').next())
        .is_some_and(|payload| Uuid::parse_str(payload).is_ok())
}

/// The id part of a UUID style reference: everything after the last colon
pub fn id_from_uuid(raw: &str) -> &str {
    raw.rsplit(':').next().unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relative_reference() {
        let reference = Reference::parse("Patient/p1");
        assert_eq!(reference.id, "p1");
        assert_eq!(reference.resource_type.as_deref(), Some("Patient"));
    }

    #[test]
    fn test_absolute_reference() {
        let reference = Reference::parse("https://fhir.example.org/r4/Patient/p1");
        assert_eq!(reference.id, "p1");
        assert_eq!(reference.resource_type.as_deref(), Some("Patient"));
    }

    #[test]
    fn test_versioned_reference() {
        let reference = Reference::parse("Patient/p1/_history/3");
        assert_eq!(reference.id, "p1");
        assert_eq!(reference.resource_type.as_deref(), Some("Patient"));
    }

    #[test]
    fn test_lowercase_type_is_capitalized() {
        let reference = Reference::parse("patient/p1");
        assert_eq!(reference.id, "p1");
        assert_eq!(reference.resource_type.as_deref(), Some("Patient"));
    }

    #[test]
    fn test_unknown_type_left_unchanged() {
        let reference = Reference::parse("Spaceship/p1");
        assert_eq!(reference.id, "Spaceship/p1");
        assert_eq!(reference.resource_type, None);
    }

    #[test]
    fn test_uuid_urn_reference() {
        let reference =
            Reference::parse("urn:uuid:123e4567-e89b-12d3-a456-426614174000:patient-77");
        assert_eq!(reference.id, "patient-77");

        let plain = Reference::parse("urn:uuid:123e4567-e89b-12d3-a456-426614174000");
        assert_eq!(plain.id, "123e4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn test_malformed_uuid_urn_left_unchanged() {
        let reference = Reference::parse("urn:uuid:not-a-uuid:patient-77");
        assert_eq!(reference.id, "urn:uuid:not-a-uuid:patient-77");
        assert!(!is_uuid_reference("urn:uuid:"));
        assert!(is_uuid_reference("urn:uuid:123e4567-e89b-12d3-a456-426614174000"));

        let bare = Reference::parse("123e4567-e89b-12d3-a456-426614174000");
        assert_eq!(bare.id, "123e4567-e89b-12d3-a456-426614174000");
        assert!(!is_uuid_reference("123e4567-e89b-12d3-a456-426614174000"));
    }

    #[test]
    fn test_bare_id_unchanged() {
        let reference = Reference::parse("p1");
        assert_eq!(reference.id, "p1");
        assert_eq!(reference.resource_type, None);
    }

    #[test]
    fn test_collect_nested_references() {
        let resource = json!({
            "resourceType": "Observation",
            "id": "o1",
            "subject": {"reference": "Patient/p1"},
            "performer": [
                {"reference": "Practitioner/dr1"},
                {"reference": "Patient/p1", "display": "self reported"}
            ],
            "component": [
                {"extension": [{"valueReference": {"reference": "urn:uuid:9f1c2d3e-0000-4000-8000-000000000002:p2"}}]}
            ],
            "note": [{"text": "reference"}]
        });

        let ids: Vec<String> = collect_references(&resource)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids.iter().filter(|id| *id == "p1").count(), 2);
        assert!(ids.contains(&"dr1".to_string()));
        assert!(ids.contains(&"p2".to_string()));
    }

    #[test]
    fn test_non_string_reference_ignored() {
        let resource = json!({"subject": {"reference": {"nested": true}}});
        assert!(collect_references(&resource).is_empty());
    }
}
