//! Ontology service
//!
//! Coded concepts are compared through an information-content similarity
//! over the is-a hierarchy of their coding system. The comparator talks to
//! an [`OntologyService`]; [`OntologyRegistry`] is the built-in one, holding
//! one in-memory [`Ontology`] per [`CodingSystem`].

use ahash::{AHashMap, AHashSet};
use ordered_float::OrderedFloat;
use patsim_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Coding systems with a known ontology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodingSystem {
    Snomed,
    Icd10,
    Loinc,
    RxNorm,
    Ucum,
    Icd9,
}

impl CodingSystem {
    /// Resolve a raw system string such as `http://snomed.info/sct`
    ///
    /// Non-word characters are stripped and the rest lower-cased before
    /// matching, so `ICD-10`, `icd10` and `http://hl7.org/fhir/sid/icd-10-cm`
    /// all resolve to [`CodingSystem::Icd10`].
    pub fn resolve(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .flat_map(char::to_lowercase)
            .collect();

        let system = if normalized.contains("snomed") {
            CodingSystem::Snomed
        } else if normalized.contains("icd10") {
            CodingSystem::Icd10
        } else if normalized.contains("loinc") {
            CodingSystem::Loinc
        } else if normalized.contains("rxnorm") {
            CodingSystem::RxNorm
        } else if normalized.contains("ucum") || normalized.contains("unitsofmeasure") {
            CodingSystem::Ucum
        } else if normalized.contains("icd9") {
            CodingSystem::Icd9
        } else {
            return Err(Error::UnknownSystem(raw.to_string()));
        };
        Ok(system)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CodingSystem::Snomed => "SNOMED CT",
            CodingSystem::Icd10 => "ICD-10",
            CodingSystem::Loinc => "LOINC",
            CodingSystem::RxNorm => "RxNorm",
            CodingSystem::Ucum => "UCUM",
            CodingSystem::Icd9 => "ICD-9",
        }
    }
}

impl fmt::Display for CodingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information-content metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcMetric {
    /// Seco: share of the ontology subsumed by a node
    IntrinsicIc,
    /// Sanchez: descendant leaves relative to subsumers
    #[default]
    IntrinsicIcSanchez,
}

/// Semantic similarity metric read from a [`SemanticSimilarity`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Lin,
    Resnik,
}

/// Similarity of two ontology nodes under one IC metric
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticSimilarity {
    pub node_a: String,
    pub node_b: String,
    pub ic_metric: IcMetric,
    /// Most informative common ancestor
    pub mica: Option<String>,
    /// Scaled IC of `node_a`
    pub ic_a: f64,
    /// Scaled IC of `node_b`
    pub ic_b: f64,
    /// Scaled IC of the most informative common ancestor
    pub resnik: f64,
    /// `2 * IC(mica) / (IC(a) + IC(b))`
    pub lin: f64,
}

impl SemanticSimilarity {
    pub fn score(&self, metric: SimilarityMetric) -> f64 {
        match metric {
            SimilarityMetric::Lin => self.lin,
            SimilarityMetric::Resnik => self.resnik,
        }
    }
}

/// Semantic similarity lookups keyed by coding system
pub trait OntologyService: Send + Sync {
    /// Similarity of two codes of one system
    ///
    /// Must fail with [`Error::NodeNotFound`] when either code is unknown.
    fn similarity(
        &self,
        system: CodingSystem,
        code_a: &str,
        code_b: &str,
        ic_metric: IcMetric,
    ) -> Result<SemanticSimilarity>;

    /// Whether a graph is available for `system`
    fn supports(&self, _system: CodingSystem) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct EdgeList {
    #[serde(default)]
    nodes: Vec<String>,
    edges: Vec<(String, String)>,
}

/// An is-a hierarchy with precomputed information content
#[derive(Debug, Clone)]
pub struct Ontology {
    name: String,
    index: AHashMap<String, usize>,
    codes: Vec<String>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    /// Ancestors of each node, the node itself included
    ancestors: Vec<AHashSet<usize>>,
    /// Descendants of each node, the node itself included
    descendant_count: Vec<usize>,
    descendant_leaves: Vec<usize>,
    leaf_count: usize,
}

impl Ontology {
    /// Build from `(parent, child)` edges
    pub fn from_edges<I, P, C>(edges: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self::build(Vec::<String>::new(), edges)
    }

    fn build<I, P, C>(nodes: Vec<String>, edges: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut ontology = Self {
            name: "ontology".to_string(),
            index: AHashMap::new(),
            codes: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            ancestors: Vec::new(),
            descendant_count: Vec::new(),
            descendant_leaves: Vec::new(),
            leaf_count: 0,
        };

        for node in nodes {
            ontology.intern(node);
        }
        for (parent, child) in edges {
            let parent = ontology.intern(parent.into());
            let child = ontology.intern(child.into());
            if parent != child && !ontology.parents[child].contains(&parent) {
                ontology.parents[child].push(parent);
                ontology.children[parent].push(child);
            }
        }
        ontology.freeze();
        ontology
    }

    /// Load from JSON: either `{"edges": [[parent, child], ...]}` with an
    /// optional `nodes` list, or a FHIR `CodeSystem` with nested concepts
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        if value.get("resourceType").and_then(Value::as_str) == Some("CodeSystem") {
            return Ok(Self::from_code_system(&value));
        }
        if value.get("edges").is_none() {
            return Err(Error::InvalidInput(
                "Ontology JSON needs an 'edges' list or a CodeSystem resource".to_string(),
            ));
        }
        let list: EdgeList = serde_json::from_value(value)?;
        Ok(Self::build(list.nodes, list.edges))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build from the nested `concept` hierarchy of a FHIR CodeSystem
    pub fn from_code_system(code_system: &Value) -> Self {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut stack: Vec<(Option<String>, &Value)> = Vec::new();
        if let Some(concepts) = code_system.get("concept").and_then(Value::as_array) {
            stack.extend(concepts.iter().rev().map(|concept| (None, concept)));
        }

        while let Some((parent, concept)) = stack.pop() {
            let Some(code) = concept.get("code").and_then(Value::as_str) else {
                continue;
            };
            nodes.push(code.to_string());
            if let Some(parent) = parent {
                edges.push((parent, code.to_string()));
            }
            if let Some(nested) = concept.get("concept").and_then(Value::as_array) {
                stack.extend(
                    nested
                        .iter()
                        .rev()
                        .map(|child| (Some(code.to_string()), child)),
                );
            }
        }
        Self::build(nodes, edges)
    }

    /// Name used in node-not-found errors
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn intern(&mut self, code: String) -> usize {
        if let Some(&id) = self.index.get(&code) {
            return id;
        }
        let id = self.codes.len();
        self.index.insert(code.clone(), id);
        self.codes.push(code);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        id
    }

    fn freeze(&mut self) {
        let n = self.codes.len();
        self.ancestors = (0..n).map(|node| reachable(node, &self.parents)).collect();

        let descendants: Vec<AHashSet<usize>> =
            (0..n).map(|node| reachable(node, &self.children)).collect();
        self.descendant_count = descendants.iter().map(|set| set.len()).collect();
        self.descendant_leaves = descendants
            .iter()
            .map(|set| set.iter().filter(|&&d| self.children[d].is_empty()).count())
            .collect();
        self.leaf_count = self.children.iter().filter(|c| c.is_empty()).count();

        debug!(
            ontology = %self.name,
            nodes = n,
            leaves = self.leaf_count,
            "Ontology frozen"
        );
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    /// Direct parents of a code
    pub fn parents(&self, code: &str) -> Option<Vec<&str>> {
        let node = *self.index.get(code)?;
        Some(self.parents[node].iter().map(|&p| self.codes[p].as_str()).collect())
    }

    fn node(&self, code: &str) -> Result<usize> {
        self.index
            .get(code)
            .copied()
            .ok_or_else(|| Error::NodeNotFound {
                system: self.name.clone(),
                code: code.to_string(),
            })
    }

    fn ic(&self, node: usize, metric: IcMetric) -> f64 {
        match metric {
            IcMetric::IntrinsicIc => {
                let n = self.codes.len() as f64;
                let ic = -(self.descendant_count[node] as f64 / n).ln();
                scale(ic, n.ln())
            }
            IcMetric::IntrinsicIcSanchez => {
                let leaves = self.descendant_leaves[node] as f64;
                let subsumers = self.ancestors[node].len() as f64;
                let max_leaves = self.leaf_count as f64;
                let ic = -((leaves / subsumers + 1.0) / (max_leaves + 1.0)).ln();
                scale(ic, (max_leaves + 1.0).ln())
            }
        }
    }

    /// Scaled information content of a code, in [0, 1]
    pub fn information_content(&self, code: &str, metric: IcMetric) -> Result<f64> {
        Ok(self.ic(self.node(code)?, metric))
    }

    /// Semantic similarity of two codes
    pub fn similarity(
        &self,
        code_a: &str,
        code_b: &str,
        metric: IcMetric,
    ) -> Result<SemanticSimilarity> {
        let a = self.node(code_a)?;
        let b = self.node(code_b)?;
        let ic_a = self.ic(a, metric);
        let ic_b = self.ic(b, metric);

        let mica = self.ancestors[a]
            .intersection(&self.ancestors[b])
            .copied()
            .max_by_key(|&node| (OrderedFloat(self.ic(node, metric)), Reverse(node)));
        let resnik = mica.map_or(0.0, |node| self.ic(node, metric));

        let lin = if a == b {
            1.0
        } else if ic_a + ic_b > 0.0 {
            2.0 * resnik / (ic_a + ic_b)
        } else {
            0.0
        };

        Ok(SemanticSimilarity {
            node_a: code_a.to_string(),
            node_b: code_b.to_string(),
            ic_metric: metric,
            mica: mica.map(|node| self.codes[node].clone()),
            ic_a,
            ic_b,
            resnik,
            lin,
        })
    }
}

fn scale(ic: f64, max_ic: f64) -> f64 {
    if max_ic > 0.0 {
        (ic / max_ic).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Nodes reachable from `start` along `edges`, `start` included
fn reachable(start: usize, edges: &[Vec<usize>]) -> AHashSet<usize> {
    let mut visited = AHashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if visited.insert(node) {
            stack.extend(edges[node].iter().copied());
        }
    }
    visited
}

/// One [`Ontology`] per coding system
#[derive(Debug, Clone, Default)]
pub struct OntologyRegistry {
    graphs: AHashMap<CodingSystem, Ontology>,
}

impl OntologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, system: CodingSystem, ontology: Ontology) {
        debug!(system = %system, nodes = ontology.len(), "Ontology registered");
        self.graphs.insert(system, ontology.named(system.as_str()));
    }

    #[must_use]
    pub fn with_ontology(mut self, system: CodingSystem, ontology: Ontology) -> Self {
        self.insert(system, ontology);
        self
    }

    /// Load an ontology file and register it under `system`
    pub fn load(&mut self, system: CodingSystem, path: impl AsRef<Path>) -> Result<()> {
        let ontology = Ontology::from_file(path)?;
        self.insert(system, ontology);
        Ok(())
    }

    pub fn get(&self, system: CodingSystem) -> Option<&Ontology> {
        self.graphs.get(&system)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

impl OntologyService for OntologyRegistry {
    fn similarity(
        &self,
        system: CodingSystem,
        code_a: &str,
        code_b: &str,
        ic_metric: IcMetric,
    ) -> Result<SemanticSimilarity> {
        let ontology = self.graphs.get(&system).ok_or_else(|| Error::NodeNotFound {
            system: system.to_string(),
            code: code_a.to_string(),
        })?;
        ontology.similarity(code_a, code_b, ic_metric)
    }

    fn supports(&self, system: CodingSystem) -> bool {
        self.graphs.contains_key(&system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    //        root
    //       /    \
    //   disease  finding
    //    /   \        \
    // diab   cardio   fever
    //  |
    // t2d
    fn sample() -> Ontology {
        Ontology::from_edges([
            ("root", "disease"),
            ("root", "finding"),
            ("disease", "diabetes"),
            ("disease", "cardio"),
            ("finding", "fever"),
            ("diabetes", "t2d"),
        ])
    }

    #[test]
    fn test_resolve_system() {
        assert_eq!(CodingSystem::resolve("http://snomed.info/sct").unwrap(), CodingSystem::Snomed);
        assert_eq!(
            CodingSystem::resolve("http://hl7.org/fhir/sid/icd-10-cm").unwrap(),
            CodingSystem::Icd10
        );
        assert_eq!(CodingSystem::resolve("http://loinc.org").unwrap(), CodingSystem::Loinc);
        assert_eq!(
            CodingSystem::resolve("http://www.nlm.nih.gov/research/umls/rxnorm").unwrap(),
            CodingSystem::RxNorm
        );
        assert_eq!(CodingSystem::resolve("http://unitsofmeasure.org").unwrap(), CodingSystem::Ucum);
        assert_eq!(CodingSystem::resolve("ICD-9").unwrap(), CodingSystem::Icd9);
        assert!(matches!(
            CodingSystem::resolve("http://example.org/local"),
            Err(Error::UnknownSystem(_))
        ));
    }

    #[test]
    fn test_information_content_bounds() {
        let ontology = sample();
        for metric in [IcMetric::IntrinsicIc, IcMetric::IntrinsicIcSanchez] {
            assert_eq!(ontology.information_content("root", metric).unwrap(), 0.0);
            let leaf = ontology.information_content("t2d", metric).unwrap();
            let inner = ontology.information_content("diabetes", metric).unwrap();
            assert!(leaf > inner);
            assert!(leaf <= 1.0);
        }
    }

    #[test]
    fn test_self_similarity_is_maximal() {
        let ontology = sample();
        let similarity = ontology.similarity("t2d", "t2d", IcMetric::IntrinsicIcSanchez).unwrap();
        assert_eq!(similarity.lin, 1.0);
        assert_eq!(similarity.mica.as_deref(), Some("t2d"));
    }

    #[test]
    fn test_lin_orders_by_shared_ancestry() {
        let ontology = sample();
        let close = ontology.similarity("t2d", "cardio", IcMetric::IntrinsicIcSanchez).unwrap();
        let far = ontology.similarity("t2d", "fever", IcMetric::IntrinsicIcSanchez).unwrap();
        assert_eq!(close.mica.as_deref(), Some("disease"));
        assert_eq!(far.mica.as_deref(), Some("root"));
        assert!(close.lin > far.lin);
        assert_eq!(far.lin, 0.0);
        assert_eq!(close.score(SimilarityMetric::Resnik), close.resnik);
    }

    #[test]
    fn test_unknown_node() {
        let ontology = sample().named("SNOMED CT");
        let err = ontology.similarity("t2d", "missing", IcMetric::IntrinsicIc).unwrap_err();
        assert!(err.is_node_not_found());
    }

    #[test]
    fn test_from_json_edges_and_code_system() {
        let ontology = Ontology::from_json(
            r#"{"nodes": ["orphan"], "edges": [["a", "b"], ["a", "c"]]}"#,
        )
        .unwrap();
        assert_eq!(ontology.len(), 4);
        assert_eq!(ontology.parents("b").unwrap(), vec!["a"]);

        let code_system = json!({
            "resourceType": "CodeSystem",
            "concept": [{
                "code": "a",
                "concept": [{"code": "b"}, {"code": "c", "concept": [{"code": "d"}]}]
            }]
        });
        let ontology = Ontology::from_json(&code_system.to_string()).unwrap();
        assert_eq!(ontology.len(), 4);
        assert_eq!(ontology.parents("d").unwrap(), vec!["c"]);

        assert!(matches!(Ontology::from_json("{}"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_registry_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"edges": [["root", "x"], ["root", "y"]]}}"#).unwrap();

        let mut registry = OntologyRegistry::new();
        registry.load(CodingSystem::Snomed, file.path()).unwrap();
        assert!(registry.supports(CodingSystem::Snomed));
        assert!(!registry.supports(CodingSystem::Loinc));

        let similarity = registry
            .similarity(CodingSystem::Snomed, "x", "y", IcMetric::IntrinsicIcSanchez)
            .unwrap();
        assert_eq!(similarity.lin, 0.0);

        let err = registry
            .similarity(CodingSystem::Loinc, "x", "y", IcMetric::IntrinsicIcSanchez)
            .unwrap_err();
        assert!(err.is_node_not_found());
    }
}
