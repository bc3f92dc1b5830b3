//! JSON configuration for the `patsim` binary and [`Patsim::from_config`]
//!
//! ```json
//! {
//!   "features": [
//!     {"type": "categorical_string", "name": "gender", "resource_types": "Patient", "target_paths": "gender"},
//!     {"type": "coded_concept", "name": "conditions", "resource_types": ["Condition"]}
//!   ],
//!   "ontologies": [{"system": "snomed", "path": "snomed.json"}],
//!   "ic_metric": "intrinsic_ic_sanchez",
//!   "similarity_metric": "lin"
//! }
//! ```

use crate::Patsim;
use patsim_core::Result;
use patsim_schema::FeatureDefinition;
use patsim_similarity::{CodingSystem, ComparatorConfig, IcMetric, SimilarityMetric};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An ontology file to register for a coding system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OntologySource {
    /// Any spelling [`CodingSystem::resolve`] accepts, e.g. `snomed` or a system URL
    pub system: String,
    /// Relative paths are resolved against the configuration file's directory
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatsimConfig {
    pub features: Vec<FeatureDefinition>,
    pub ontologies: Vec<OntologySource>,
    pub ic_metric: IcMetric,
    pub similarity_metric: SimilarityMetric,
}

impl PatsimConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file, anchoring relative ontology paths to it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::from_json(&std::fs::read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            for source in &mut config.ontologies {
                if source.path.is_relative() {
                    source.path = base.join(&source.path);
                }
            }
        }
        Ok(config)
    }

    pub fn comparator_config(&self) -> ComparatorConfig {
        ComparatorConfig {
            ic_metric: self.ic_metric,
            similarity_metric: self.similarity_metric,
        }
    }
}

impl Patsim {
    /// Build an engine with every feature declared and every ontology loaded
    pub fn from_config(config: PatsimConfig) -> Result<Self> {
        let mut patsim = Patsim::new().with_comparator_config(config.comparator_config());
        for source in &config.ontologies {
            let system = CodingSystem::resolve(&source.system)?;
            patsim.load_ontology(system, &source.path)?;
        }
        for feature in config.features {
            patsim.add_feature(feature)?;
        }
        Ok(patsim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patsim_core::Error;
    use patsim_schema::FeatureType;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PatsimConfig::from_json("{}").unwrap();
        assert!(config.features.is_empty());
        assert_eq!(config.ic_metric, IcMetric::IntrinsicIcSanchez);
        assert_eq!(config.similarity_metric, SimilarityMetric::Lin);
    }

    #[test]
    fn test_from_file_with_relative_ontology() {
        let dir = TempDir::new().unwrap();
        let ontology = json!({"edges": [["root", "a"], ["root", "b"]]});
        std::fs::write(dir.path().join("snomed.json"), ontology.to_string()).unwrap();

        let config = json!({
            "features": [
                {"type": "categorical_string", "name": "gender", "resource_types": "Patient", "target_paths": "gender"},
                {"type": "coded_concept", "name": "conditions", "resource_types": ["Condition"]}
            ],
            "ontologies": [{"system": "snomed", "path": "snomed.json"}],
            "ic_metric": "intrinsic_ic",
            "similarity_metric": "resnik"
        });
        let config_path = dir.path().join("patsim.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(config.to_string().as_bytes()).unwrap();

        let config = PatsimConfig::from_file(&config_path).unwrap();
        assert_eq!(config.ontologies[0].path, dir.path().join("snomed.json"));
        assert_eq!(config.comparator_config().ic_metric, IcMetric::IntrinsicIc);

        let patsim = Patsim::from_config(config).unwrap();
        let types = patsim.feature_types();
        assert_eq!(types["gender"], FeatureType::CategoricalString);
        assert_eq!(types["conditions"], FeatureType::CodedConcept);
        assert!(patsim.ontologies().get(CodingSystem::Snomed).is_some());
    }

    #[test]
    fn test_unknown_ontology_system() {
        let config = PatsimConfig {
            ontologies: vec![OntologySource {
                system: "local-codes".to_string(),
                path: PathBuf::from("missing.json"),
            }],
            ..Default::default()
        };
        let err = Patsim::from_config(config).unwrap_err();
        assert!(matches!(err, Error::UnknownSystem(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = PatsimConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
