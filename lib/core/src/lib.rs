//! # patsim Core
//!
//! Core library for the patsim patient similarity engine.
//!
//! This crate provides the record-level building blocks:
//!
//! - [`RecordStore`] - FHIR resource pool with a patient-indexed record graph
//! - [`Reference`] - discovery and normalization of cross-resource references
//! - [`PathCompiler`] / [`CompiledPath`] - the path-expression seam
//! - [`FhirPathCompiler`] - built-in FHIRPath subset
//! - [`Error`] - the error taxonomy shared by every patsim crate
//!
//! ## Example
//!
//! ```rust
//! use patsim_core::{FhirPathCompiler, PathCompiler, RecordStore};
//! use serde_json::json;
//!
//! let mut store = RecordStore::new();
//! store.add_resources(vec![
//!     json!({"resourceType": "Patient", "id": "p1"}),
//!     json!({
//!         "resourceType": "Observation",
//!         "id": "o1",
//!         "subject": {"reference": "Patient/p1"},
//!         "valueQuantity": {"value": 5}
//!     }),
//! ]).unwrap();
//!
//! let observations = &store.patient_resources("p1").unwrap()["Observation"];
//! let path = FhirPathCompiler.compile("valueQuantity.value").unwrap();
//! assert_eq!(path.evaluate(&observations[0]), vec![json!(5)]);
//! ```

pub mod error;
pub mod fhirpath;
pub mod path;
pub mod reference;
pub mod resource;
pub mod store;

pub use error::{Error, Result};
pub use fhirpath::{FhirPath, FhirPathCompiler};
pub use path::{
    collection_is_truthy, value_is_present, CompiledPath, PathCompiler, PathExpression,
};
pub use reference::{collect_references, Reference};
pub use resource::{ResourceKey, PATIENT, RESOURCE_TYPES};
pub use store::{PatientRecords, RecordGraph, RecordStore};
