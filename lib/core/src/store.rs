//! Record graph builder
//!
//! The store ingests FHIR resources and links every record that references a
//! known patient into that patient's per-resource-type bucket.

use crate::reference::collect_references;
use crate::resource::{self, ResourceKey, PATIENT};
use crate::Result;
use ahash::AHashSet;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

/// Records linked to one patient, keyed by resource type
pub type PatientRecords = IndexMap<String, Vec<Value>>;

/// Patient id to linked records, in patient ingestion order
pub type RecordGraph = IndexMap<String, PatientRecords>;

/// In-memory resource pool with its patient record graph
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    resources: Vec<Value>,
    keys: AHashSet<ResourceKey>,
    graph: RecordGraph,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a bundle
    pub fn from_bundle(bundle: &Value) -> Result<Self> {
        let mut store = Self::new();
        store.add_bundle(bundle)?;
        Ok(store)
    }

    /// Build a store from a resource sequence
    pub fn from_resources(resources: Vec<Value>) -> Result<Self> {
        let mut store = Self::new();
        store.add_resources(resources)?;
        Ok(store)
    }

    /// Ingest every `entry[*].resource` of a bundle
    pub fn add_bundle(&mut self, bundle: &Value) -> Result<usize> {
        let resources = resource::unwrap_bundle(bundle)?;
        self.add_resources(resources)
    }

    /// Ingest a sequence of resources
    ///
    /// Records whose `(resourceType, id)` is already known are skipped, so
    /// repeating a call leaves the graph unchanged. Returns the number of
    /// records that were new.
    pub fn add_resources(&mut self, resources: Vec<Value>) -> Result<usize> {
        resource::validate_resources(&resources)?;

        let mut fresh = Vec::with_capacity(resources.len());
        for resource in resources {
            let Some(key) = ResourceKey::of(&resource) else {
                continue;
            };
            if self.keys.insert(key) {
                fresh.push(resource);
            }
        }

        if fresh.is_empty() {
            debug!("No new resources to ingest");
            return Ok(0);
        }

        self.link_resources(&fresh);
        let count = fresh.len();
        self.resources.extend(fresh);
        debug!(
            ingested = count,
            patients = self.graph.len(),
            "Resources ingested"
        );
        Ok(count)
    }

    fn link_resources(&mut self, fresh: &[Value]) {
        for patient in fresh.iter().filter(|r| resource::is_patient(r)) {
            if let Some(id) = resource::resource_id(patient) {
                let mut records = PatientRecords::new();
                records.insert(PATIENT.to_string(), vec![patient.clone()]);
                self.graph.insert(id.to_string(), records);
            }
        }

        for record in fresh {
            let Some(key) = ResourceKey::of(record) else {
                continue;
            };
            for reference in collect_references(record) {
                if key.resource_type == PATIENT && key.id == reference.id {
                    continue;
                }
                if let Some(records) = self.graph.get_mut(&reference.id) {
                    records
                        .entry(key.resource_type.clone())
                        .or_default()
                        .push(record.clone());
                }
            }
        }
    }

    /// Check whether a resource is part of the corpus
    pub fn contains(&self, resource_type: &str, id: &str) -> bool {
        self.keys.contains(&ResourceKey::new(resource_type, id))
    }

    /// All ingested resources in ingestion order
    pub fn resources(&self) -> &[Value] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn patient_count(&self) -> usize {
        self.graph.len()
    }

    /// Patient ids in ingestion order
    pub fn patient_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.keys().map(String::as_str)
    }

    /// Records linked to a patient, keyed by resource type
    pub fn patient_resources(&self, patient_id: &str) -> Option<&PatientRecords> {
        self.graph.get(patient_id)
    }

    pub fn graph(&self) -> &RecordGraph {
        &self.graph
    }
}
