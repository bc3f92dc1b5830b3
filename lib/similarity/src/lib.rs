//! # patsim Similarity
//!
//! Pairwise patient similarity over extracted features.
//!
//! Raw feature entries are scaled by corpus-wide statistics, materialized
//! into typed instances and compared per feature type:
//!
//! | Type | Metric | Empty side |
//! |------|--------|------------|
//! | `categorical_string` | Jaccard index | undefined |
//! | `numerical` | min-max normalized distance | undefined |
//! | `coded_concept` | best-match ontology similarity | 0 |
//! | `coded_numerical` | abnormality-aware percentile overlap | undefined |
//!
//! ## Example
//!
//! ```rust
//! use patsim_similarity::Comparator;
//! use patsim_schema::{FeatureType, RawFeatureTable};
//! use indexmap::IndexMap;
//! use serde_json::json;
//!
//! let mut table = RawFeatureTable::new();
//! for (patient, gender) in [("p1", "female"), ("p2", "male")] {
//!     table.push(patient, "gender", [("value".to_string(), json!(gender))].into_iter().collect());
//! }
//! let mut types = IndexMap::new();
//! types.insert("gender".to_string(), FeatureType::CategoricalString);
//!
//! let report = Comparator::default().compute_similarities(&table, &types).unwrap();
//! assert_eq!(report.get("gender").unwrap().get("p1", "p2"), Some(0.0));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Raw table   │────>│  Statistics  │────>│    Typed     │
//! │ (per patient)│     │ (per feature)│     │  instances   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │   Ontology   │────>│  Comparator  │
//!                      │   service    │     │ (per type)   │
//!                      └──────────────┘     └──────────────┘
//!                                                  │
//!                                           ┌──────────────┐
//!                                           │   Matrices   │
//!                                           └──────────────┘
//! ```

pub mod comparator;
pub mod distance;
pub mod matrix;
pub mod ontology;
pub mod stats;
pub mod types;

// Re-export main types for convenience
pub use comparator::{Comparator, ComparatorConfig};
pub use distance::{
    compare_categorical, compare_coded_numerical, compare_coded_numerical_pair,
    compare_numerical, numerical_similarity,
};
pub use matrix::{SimilarityMatrix, SimilarityReport};
pub use ontology::{
    CodingSystem, IcMetric, Ontology, OntologyRegistry, OntologyService, SemanticSimilarity,
    SimilarityMetric,
};
pub use stats::{CodeStats, FeatureStatistics, NumericalStats, RunningStats};
pub use types::{CategoricalString, CodedConcept, CodedNumerical, Numerical, TypedFeature};
