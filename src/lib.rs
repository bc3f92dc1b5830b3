//! # patsim
//!
//! Patient similarity over FHIR records.
//!
//! patsim links a flat pool of FHIR resources to their patients, extracts
//! declared features from the linked records with path expressions, and
//! scores every pair of patients per feature.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! patsim --config features.json --bundle bundle.json --pretty
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use patsim::prelude::*;
//! use serde_json::json;
//!
//! let mut patsim = Patsim::new();
//! patsim.add_resources(vec![
//!     json!({"resourceType": "Patient", "id": "p1", "gender": "female"}),
//!     json!({"resourceType": "Patient", "id": "p2", "gender": "female"}),
//! ]).unwrap();
//! patsim.add_categorical_feature(ValueFeature::new("gender", "Patient")).unwrap();
//!
//! let report = patsim.compute_similarities().unwrap();
//! assert_eq!(report.get("gender").unwrap().get("p1", "p2"), Some(1.0));
//! ```
//!
//! ## Crate Structure
//!
//! - [`patsim-core`](patsim_core) - record graph, references, path expressions, errors
//! - [`patsim-schema`](patsim_schema) - feature declarations and extraction
//! - [`patsim-similarity`](patsim_similarity) - statistics, typed instances, metrics, ontology

pub mod config;

use patsim_core::{FhirPathCompiler, PathCompiler};
use patsim_schema::FeatureDeclaration;
use patsim_similarity::{Comparator, OntologyService};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

// Re-export core types
pub use config::{OntologySource, PatsimConfig};
pub use patsim_core::{Error, RecordStore, Result};
pub use patsim_schema::{
    CodedConceptFeature, CodedNumericalFeature, FeatureDefinition, FeatureType, RawFeatureTable,
    ValueFeature,
};
pub use patsim_similarity::{
    CodingSystem, ComparatorConfig, IcMetric, Ontology, OntologyRegistry, SimilarityMatrix,
    SimilarityMetric, SimilarityReport,
};

use patsim_schema::FeatureSelector;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CodedConceptFeature, CodedNumericalFeature, CodingSystem, ComparatorConfig, Error,
        FeatureDefinition, FeatureType, IcMetric, Ontology, OntologyRegistry, Patsim,
        PatsimConfig, RawFeatureTable, RecordStore, Result, SimilarityMatrix, SimilarityMetric,
        SimilarityReport, ValueFeature,
    };
}

/// Records, feature declarations and ontologies in one place
pub struct Patsim {
    store: RecordStore,
    selector: FeatureSelector,
    registry: Arc<OntologyRegistry>,
    ontology_service: Option<Arc<dyn OntologyService>>,
    comparator_config: ComparatorConfig,
}

impl Default for Patsim {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Patsim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patsim")
            .field("resources", &self.store.len())
            .field("patients", &self.store.patient_count())
            .field("features", &self.selector.len())
            .field("ontologies", &self.registry.len())
            .field("comparator_config", &self.comparator_config)
            .finish()
    }
}

impl Patsim {
    /// An empty engine using the built-in FHIRPath subset
    pub fn new() -> Self {
        Self::with_compiler(Arc::new(FhirPathCompiler))
    }

    /// An empty engine compiling path expressions with `compiler`
    pub fn with_compiler(compiler: Arc<dyn PathCompiler>) -> Self {
        Self {
            store: RecordStore::new(),
            selector: FeatureSelector::with_compiler(compiler),
            registry: Arc::new(OntologyRegistry::new()),
            ontology_service: None,
            comparator_config: ComparatorConfig::default(),
        }
    }

    #[must_use]
    pub fn with_comparator_config(mut self, config: ComparatorConfig) -> Self {
        self.comparator_config = config;
        self
    }

    /// Score coded concepts through an external service instead of the
    /// built-in registry
    #[must_use]
    pub fn with_ontology_service(mut self, service: Arc<dyn OntologyService>) -> Self {
        self.ontology_service = Some(service);
        self
    }

    pub fn register_ontology(&mut self, system: CodingSystem, ontology: Ontology) {
        Arc::make_mut(&mut self.registry).insert(system, ontology);
    }

    /// Load an ontology file (edge list or FHIR CodeSystem) for `system`
    pub fn load_ontology(&mut self, system: CodingSystem, path: impl AsRef<Path>) -> Result<()> {
        Arc::make_mut(&mut self.registry).load(system, path)
    }

    pub fn ontologies(&self) -> &OntologyRegistry {
        &self.registry
    }

    /// Ingest resources; returns how many were new
    pub fn add_resources(&mut self, resources: Vec<Value>) -> Result<usize> {
        self.store.add_resources(resources)
    }

    /// Ingest the resources of a FHIR Bundle; returns how many were new
    pub fn add_bundle(&mut self, bundle: &Value) -> Result<usize> {
        self.store.add_bundle(bundle)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn declare_feature(&mut self, declaration: FeatureDeclaration) -> Result<()> {
        self.selector.declare(declaration)
    }

    pub fn add_feature(&mut self, definition: FeatureDefinition) -> Result<()> {
        self.selector.add_feature(definition)
    }

    pub fn add_categorical_feature(&mut self, feature: ValueFeature) -> Result<()> {
        self.add_feature(FeatureDefinition::CategoricalString(feature))
    }

    pub fn add_numerical_feature(&mut self, feature: ValueFeature) -> Result<()> {
        self.add_feature(FeatureDefinition::Numerical(feature))
    }

    pub fn add_coded_concept_feature(&mut self, feature: CodedConceptFeature) -> Result<()> {
        self.add_feature(FeatureDefinition::CodedConcept(feature))
    }

    pub fn add_coded_numerical_feature(&mut self, feature: CodedNumericalFeature) -> Result<()> {
        self.add_feature(FeatureDefinition::CodedNumerical(feature))
    }

    /// Declared features and their types, in declaration order
    pub fn feature_types(&self) -> indexmap::IndexMap<String, FeatureType> {
        self.selector.feature_types()
    }

    /// Raw per-patient feature entries for inspection
    pub fn feature_table(&self) -> RawFeatureTable {
        self.selector.extract(&self.store)
    }

    /// One similarity matrix per declared feature
    pub fn compute_similarities(&self) -> Result<SimilarityReport> {
        let table = self.feature_table();
        let service: Arc<dyn OntologyService> = match &self.ontology_service {
            Some(service) => Arc::clone(service),
            None => Arc::clone(&self.registry) as Arc<dyn OntologyService>,
        };
        let comparator = Comparator::with_config(service, self.comparator_config);
        let report = comparator.compute_similarities(&table, &self.selector.feature_types())?;
        debug!(
            features = report.len(),
            patients = self.store.patient_count(),
            "Similarities computed"
        );
        Ok(report)
    }
}
