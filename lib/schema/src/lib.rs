//! # patsim Schema
//!
//! Declarative feature layer for patsim.
//!
//! A feature is a named, typed value read out of the records linked to a
//! patient. Declarations say which resource types to read and which path
//! expressions fill each slot; the [`FeatureSelector`] evaluates them over a
//! [`patsim_core::RecordStore`] and returns a [`RawFeatureTable`].
//!
//! ## Feature Types
//!
//! | Type | Slots |
//! |------|-------|
//! | `categorical_string` | `value` |
//! | `numerical` | `value` |
//! | `coded_concept` | `code`, `system` |
//! | `coded_numerical` | `value`, `code`, optional `is_abnormal` |
//!
//! ## Example
//!
//! ```rust
//! use patsim_core::RecordStore;
//! use patsim_schema::{FeatureDefinition, FeatureSelector, ValueFeature};
//! use serde_json::json;
//!
//! let store = RecordStore::from_resources(vec![
//!     json!({"resourceType": "Patient", "id": "p1", "gender": "female"}),
//! ]).unwrap();
//!
//! let mut selector = FeatureSelector::new();
//! selector.add_feature(FeatureDefinition::CategoricalString(
//!     ValueFeature::new("gender", "Patient").with_target_paths("gender"),
//! )).unwrap();
//!
//! let table = selector.extract(&store);
//! assert_eq!(table.get("p1", "gender").unwrap()[0]["value"], json!("female"));
//! ```

pub mod defaults;
pub mod definition;
pub mod schema;
pub mod selector;

pub use defaults::{default_paths, default_paths_for};
pub use definition::{CodedConceptFeature, CodedNumericalFeature, FeatureDefinition, ValueFeature};
pub use schema::{
    ConditionalPath, FeatureDeclaration, FeatureType, OneOrMany, ABNORMAL_SLOT, CODE_SLOT,
    SYSTEM_SLOT, VALUE_SLOT,
};
pub use selector::{FeatureSelector, RawFeature, RawFeatureTable};
