// Integration tests for patsim
use patsim::prelude::*;
use patsim_core::{Reference, RecordStore};
use patsim_similarity::{compare_categorical, compare_coded_numerical, CategoricalString, CodedNumerical};
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn patient(id: &str) -> Value {
    json!({"resourceType": "Patient", "id": id})
}

fn observation(id: &str, patient: &str, value: f64) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "subject": {"reference": format!("Patient/{}", patient)},
        "code": {"coding": [{"system": "http://loinc.org", "code": "29463-7"}]},
        "valueQuantity": {"value": value}
    })
}

fn condition(id: &str, patient: &str, code: &str) -> Value {
    json!({
        "resourceType": "Condition",
        "id": id,
        "subject": {"reference": format!("Patient/{}", patient)},
        "code": {"coding": [{"system": "http://snomed.info/sct", "code": code}]}
    })
}

/// Patient id -> resource type -> sorted record ids
fn graph_ids(store: &RecordStore) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    store
        .graph()
        .iter()
        .map(|(patient, buckets)| {
            let buckets = buckets
                .iter()
                .map(|(resource_type, records)| {
                    let mut ids: Vec<String> = records
                        .iter()
                        .filter_map(|record| record["id"].as_str().map(str::to_string))
                        .collect();
                    ids.sort();
                    (resource_type.clone(), ids)
                })
                .collect();
            (patient.clone(), buckets)
        })
        .collect()
}

#[test]
fn test_observation_scenario() {
    let mut patsim = Patsim::new();
    patsim
        .add_resources(vec![
            patient("p1"),
            json!({
                "resourceType": "Observation",
                "id": "o1",
                "subject": {"reference": "Patient/p1"},
                "valueQuantity": {"value": 5}
            }),
        ])
        .unwrap();

    let records = patsim.store().patient_resources("p1").unwrap();
    assert_eq!(records["Observation"].len(), 1);
    assert_eq!(records["Observation"][0]["id"], json!("o1"));

    patsim
        .add_numerical_feature(
            ValueFeature::new("value", "Observation").with_target_paths("valueQuantity.value"),
        )
        .unwrap();
    let table = patsim.feature_table();
    let entries = serde_json::to_value(table.get("p1", "value").unwrap()).unwrap();
    assert_eq!(entries, json!([{"value": 5}]));
}

#[test]
fn test_idempotent_ingestion() {
    let resources = vec![patient("p1"), observation("o1", "p1", 70.0)];
    let mut store = RecordStore::new();
    assert_eq!(store.add_resources(resources.clone()).unwrap(), 2);
    let before = graph_ids(&store);
    let len = store.len();

    assert_eq!(store.add_resources(resources).unwrap(), 0);
    assert_eq!(graph_ids(&store), before);
    assert_eq!(store.len(), len);
}

#[test]
fn test_ingestion_order_invariance() {
    let resources = vec![
        patient("p1"),
        patient("p2"),
        observation("o1", "p1", 70.0),
        observation("o2", "p1", 71.0),
        condition("c1", "p2", "44054006"),
    ];
    let forward = RecordStore::from_resources(resources.clone()).unwrap();
    let reversed = RecordStore::from_resources(resources.into_iter().rev().collect()).unwrap();
    assert_eq!(graph_ids(&forward), graph_ids(&reversed));
    assert_eq!(graph_ids(&forward)["p1"]["Observation"], vec!["o1", "o2"]);
}

#[test]
fn test_bundle_ingestion() {
    let bundle = json!({
        "resourceType": "Bundle",
        "entry": [
            {"resource": patient("p1")},
            {"resource": observation("o1", "p1", 80.0)}
        ]
    });
    let mut patsim = Patsim::new();
    assert_eq!(patsim.add_bundle(&bundle).unwrap(), 2);
    assert_eq!(patsim.store().patient_count(), 1);

    let err = patsim.add_bundle(&json!({"entry": []})).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn test_uuid_reference_resolution() {
    let reference = Reference::parse("urn:uuid:123e4567-e89b-12d3-a456-426614174000:patient-77");
    assert_eq!(reference.id, "patient-77");

    let store = RecordStore::from_resources(vec![
        patient("patient-77"),
        json!({
            "resourceType": "Observation",
            "id": "o1",
            "subject": {"reference": "urn:uuid:123e4567-e89b-12d3-a456-426614174000:patient-77"}
        }),
    ])
    .unwrap();
    assert_eq!(store.patient_resources("patient-77").unwrap()["Observation"].len(), 1);
}

#[test]
fn test_identical_codes_score_one() {
    let resources = vec![
        patient("p1"),
        patient("p2"),
        condition("c1", "p1", "44054006"),
        condition("c2", "p2", "44054006"),
    ];

    // no ontology at all, and a large unrelated one
    let mut bare = Patsim::new();
    let mut loaded = Patsim::new();
    let edges: Vec<(String, String)> = (0..500)
        .map(|i| (format!("n{}", i / 3), format!("n{}", i + 1)))
        .collect();
    loaded.register_ontology(CodingSystem::Snomed, Ontology::from_edges(edges));

    for patsim in [&mut bare, &mut loaded] {
        patsim.add_resources(resources.clone()).unwrap();
        patsim
            .add_coded_concept_feature(CodedConceptFeature::new("conditions", "Condition"))
            .unwrap();
        let report = patsim.compute_similarities().unwrap();
        let matrix = report.get("conditions").unwrap();
        assert_eq!(matrix.get("p1", "p2"), Some(1.0));
        assert_eq!(matrix.get("p2", "p1"), Some(1.0));
    }
}

#[test]
fn test_coded_concept_empty_side_scores_zero() {
    let mut patsim = Patsim::new();
    patsim
        .add_resources(vec![patient("p1"), patient("p2"), condition("c1", "p1", "44054006")])
        .unwrap();
    patsim
        .add_coded_concept_feature(CodedConceptFeature::new("conditions", "Condition"))
        .unwrap();
    let report = patsim.compute_similarities().unwrap();
    assert_eq!(report.get("conditions").unwrap().get("p1", "p2"), Some(0.0));
}

#[test]
fn test_jaccard_symmetry() {
    let values = |items: &[&str]| -> Vec<CategoricalString> {
        items
            .iter()
            .map(|value| CategoricalString {
                value: value.to_string(),
                feature_name: "codes".to_string(),
            })
            .collect()
    };
    let sets = [values(&["a"]), values(&["a", "b"]), values(&["b", "c", "d"]), values(&["e"])];
    for a in &sets {
        for b in &sets {
            assert_eq!(compare_categorical(a, b), compare_categorical(b, a));
        }
    }
}

#[test]
fn test_only_normal_pairs_undefined() {
    let normal = |value: f64| CodedNumerical {
        code: "2345-7".to_string(),
        value,
        code_mean: 100.0,
        code_std_dev: 12.0,
        is_abnormal: false,
        feature_name: "labs".to_string(),
    };
    assert_eq!(compare_coded_numerical(&[normal(80.0)], &[normal(130.0)]), None);
}

#[test]
fn test_numerical_similarity_end_to_end() {
    let mut patsim = Patsim::new();
    patsim
        .add_resources(vec![
            patient("p1"),
            patient("p2"),
            patient("p3"),
            observation("o1", "p1", 60.0),
            observation("o2", "p2", 60.0),
            observation("o3", "p3", 80.0),
            observation("o4", "p3", 81.0),
        ])
        .unwrap();
    patsim
        .add_numerical_feature(ValueFeature::new("weight", "Observation"))
        .unwrap();

    let report = patsim.compute_similarities().unwrap();
    let matrix = report.get("weight").unwrap();
    assert_eq!(matrix.get("p1", "p2"), Some(1.0));
    // two observations on one side are not comparable
    assert_eq!(matrix.get("p1", "p3"), None);
    assert_eq!(matrix.get("p3", "p3"), Some(1.0));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["weight"]["p1"]["p3"], Value::Null);
}

#[test]
fn test_coded_numerical_end_to_end() {
    let lab = |id: &str, patient: &str, value: f64, interpretation: &str| {
        json!({
            "resourceType": "Observation",
            "id": id,
            "subject": {"reference": format!("Patient/{}", patient)},
            "code": {"coding": [{"system": "http://loinc.org", "code": "2345-7"}]},
            "valueQuantity": {"value": value},
            "interpretation": [{"coding": [{"code": interpretation}]}]
        })
    };
    let mut patsim = Patsim::new();
    patsim
        .add_resources(vec![
            patient("p1"),
            patient("p2"),
            patient("p3"),
            lab("o1", "p1", 180.0, "H"),
            lab("o2", "p2", 175.0, "H"),
            lab("o3", "p3", 95.0, "N"),
            lab("o4", "p3", 98.0, "N"),
        ])
        .unwrap();
    patsim
        .add_coded_numerical_feature(CodedNumericalFeature::new("glucose", "Observation"))
        .unwrap();

    let report = patsim.compute_similarities().unwrap();
    let matrix = report.get("glucose").unwrap();
    let high = matrix.get("p1", "p2").unwrap();
    assert!((0.0..=1.0).contains(&high));
    // p3 has only normal values; p1's abnormal value still makes the pair comparable
    assert!(matrix.get("p1", "p3").is_some());
}

#[test]
fn test_unknown_system_fails() {
    let mut patsim = Patsim::new();
    patsim
        .add_resources(vec![
            patient("p1"),
            patient("p2"),
            json!({
                "resourceType": "Condition",
                "id": "c1",
                "subject": {"reference": "Patient/p1"},
                "code": {"coding": [{"system": "http://example.org/local", "code": "x"}]}
            }),
            condition("c2", "p2", "44054006"),
        ])
        .unwrap();
    patsim
        .add_coded_concept_feature(CodedConceptFeature::new("conditions", "Condition"))
        .unwrap();
    let err = patsim.compute_similarities().unwrap_err();
    assert!(matches!(err, Error::UnknownSystem(_)));
}

#[test]
fn test_unknown_system_without_counterpart_scores_zero() {
    let mut patsim = Patsim::new();
    patsim
        .add_resources(vec![
            json!({"resourceType": "Patient", "id": "p1", "gender": "female"}),
            json!({"resourceType": "Patient", "id": "p2", "gender": "female"}),
            json!({
                "resourceType": "Condition",
                "id": "c1",
                "subject": {"reference": "Patient/p1"},
                "code": {"coding": [{"system": "http://example.org/local", "code": "x"}]}
            }),
        ])
        .unwrap();
    patsim
        .add_categorical_feature(ValueFeature::new("gender", "Patient"))
        .unwrap();
    patsim
        .add_coded_concept_feature(CodedConceptFeature::new("conditions", "Condition"))
        .unwrap();

    let report = patsim.compute_similarities().unwrap();
    let conditions = report.get("conditions").unwrap();
    assert_eq!(conditions.get("p1", "p2"), Some(0.0));
    assert_eq!(conditions.get("p2", "p1"), Some(0.0));
    assert_eq!(report.get("gender").unwrap().get("p1", "p2"), Some(1.0));
}
