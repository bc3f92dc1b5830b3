//! Pairwise patient comparison
//!
//! [`Comparator`] turns a raw feature table into one similarity matrix per
//! feature. Statistics and typed instances are derived fresh on every call;
//! the per-type metric is picked by matching on [`TypedFeature`].

use crate::distance::{compare_categorical, compare_coded_numerical, compare_numerical};
use crate::matrix::{SimilarityMatrix, SimilarityReport};
use crate::ontology::{
    CodingSystem, IcMetric, OntologyRegistry, OntologyService, SimilarityMetric,
};
use crate::stats::FeatureStatistics;
use crate::types::{CodedConcept, TypedFeature};
use ahash::AHashSet;
use indexmap::IndexMap;
use patsim_core::Result;
use patsim_schema::{FeatureType, RawFeatureTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Scoring options for coded concepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorConfig {
    pub ic_metric: IcMetric,
    pub similarity_metric: SimilarityMetric,
}

/// A coded concept whose system has been resolved
struct ResolvedConcept<'a> {
    code: &'a str,
    system: CodingSystem,
}

fn resolve(instances: &[CodedConcept]) -> Result<Vec<ResolvedConcept<'_>>> {
    instances
        .iter()
        .map(|instance| {
            Ok(ResolvedConcept {
                code: &instance.code,
                system: CodingSystem::resolve(&instance.system)?,
            })
        })
        .collect()
}

pub struct Comparator {
    ontology: Arc<dyn OntologyService>,
    config: ComparatorConfig,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(Arc::new(OntologyRegistry::new()))
    }
}

impl std::fmt::Debug for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Comparator {
    pub fn new(ontology: Arc<dyn OntologyService>) -> Self {
        Self::with_config(ontology, ComparatorConfig::default())
    }

    pub fn with_config(ontology: Arc<dyn OntologyService>, config: ComparatorConfig) -> Self {
        Self { ontology, config }
    }

    pub fn config(&self) -> ComparatorConfig {
        self.config
    }

    /// Similarity of two patients' instances of one feature
    ///
    /// # Returns
    /// `None` when the pair is not comparable or the variants differ
    pub fn compare(&self, a: &TypedFeature, b: &TypedFeature) -> Result<Option<f64>> {
        let score = match (a, b) {
            (TypedFeature::CategoricalString(a), TypedFeature::CategoricalString(b)) => {
                compare_categorical(a, b)
            }
            (TypedFeature::Numerical(a), TypedFeature::Numerical(b)) => compare_numerical(a, b),
            (TypedFeature::CodedConcept(a), TypedFeature::CodedConcept(b)) => {
                Some(self.compare_coded_concepts(a, b)?)
            }
            (TypedFeature::CodedNumerical(a), TypedFeature::CodedNumerical(b)) => {
                compare_coded_numerical(a, b)
            }
            _ => None,
        };
        Ok(score)
    }

    /// Bidirectional best-match semantic similarity
    ///
    /// Each instance is scored by its best match on the other side, and the
    /// mean is taken over both directions. An empty side scores 0.
    ///
    /// # Errors
    /// [`patsim_core::Error::UnknownSystem`] if any system on two non-empty
    /// sides does not resolve
    pub fn compare_coded_concepts(&self, a: &[CodedConcept], b: &[CodedConcept]) -> Result<f64> {
        if a.is_empty() || b.is_empty() {
            return Ok(0.0);
        }
        let a = resolve(a)?;
        let b = resolve(b)?;

        let mut total = 0.0;
        for (from, to) in [(&a, &b), (&b, &a)] {
            for x in from.iter() {
                let mut best = 0.0f64;
                for y in to.iter() {
                    best = best.max(self.concept_similarity(x, y)?);
                    if best >= 1.0 {
                        break;
                    }
                }
                total += best;
            }
        }
        Ok(total / (a.len() + b.len()) as f64)
    }

    fn concept_similarity(&self, a: &ResolvedConcept<'_>, b: &ResolvedConcept<'_>) -> Result<f64> {
        if a.system != b.system {
            return Ok(0.0);
        }
        if a.code == b.code {
            return Ok(1.0);
        }
        match self
            .ontology
            .similarity(a.system, a.code, b.code, self.config.ic_metric)
        {
            Ok(similarity) => Ok(similarity.score(self.config.similarity_metric)),
            Err(err) if err.is_node_not_found() => Ok(0.0),
            Err(err) => Err(err),
        }
    }

    /// One similarity matrix per feature, over every patient in the table
    ///
    /// Cost is O(patients² × instances²) per feature.
    pub fn compute_similarities(
        &self,
        table: &RawFeatureTable,
        feature_types: &IndexMap<String, FeatureType>,
    ) -> Result<SimilarityReport> {
        let stats = FeatureStatistics::compute(table, feature_types);
        let patients: Vec<&str> = table.patient_ids().collect();
        let mut report = SimilarityReport::new();

        for (feature, &feature_type) in feature_types {
            let typed: Vec<TypedFeature> = patients
                .iter()
                .map(|patient| {
                    let entries = table.get(patient, feature).unwrap_or_default();
                    TypedFeature::materialize(feature, feature_type, entries, &stats)
                })
                .collect();

            if feature_type == FeatureType::CodedConcept {
                self.warn_unsupported_systems(feature, &typed);
            }

            let mut matrix = SimilarityMatrix::new(patients.iter().copied());
            for (row, a) in typed.iter().enumerate() {
                for (col, b) in typed.iter().enumerate() {
                    if row != col {
                        matrix.set(row, col, self.compare(a, b)?);
                    }
                }
            }

            debug!(
                feature = %feature,
                feature_type = %feature_type,
                patients = patients.len(),
                "Similarity matrix computed"
            );
            report.insert(feature.clone(), matrix);
        }

        Ok(report)
    }

    /// Warn once per feature for each resolved system without an ontology
    fn warn_unsupported_systems(&self, feature: &str, typed: &[TypedFeature]) {
        let mut seen = AHashSet::new();
        for instances in typed {
            let TypedFeature::CodedConcept(instances) = instances else {
                continue;
            };
            for instance in instances {
                if let Ok(system) = CodingSystem::resolve(&instance.system) {
                    if seen.insert(system) && !self.ontology.supports(system) {
                        warn!(
                            feature,
                            system = %system,
                            "No ontology loaded; only identical codes will match"
                        );
                    }
                }
            }
        }
    }
}
