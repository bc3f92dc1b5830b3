//! Similarity matrices
//!
//! One square matrix per feature, indexed by patient id on both axes.
//! Cells hold a score in [0, 1] or `None` when the pair is not comparable;
//! the diagonal is always 1.

use indexmap::{IndexMap, IndexSet};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    patients: IndexSet<String>,
    scores: Vec<Option<f64>>,
}

impl SimilarityMatrix {
    /// An all-undefined matrix with a unit diagonal
    pub fn new<I, S>(patient_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patients: IndexSet<String> = patient_ids.into_iter().map(Into::into).collect();
        let n = patients.len();
        let mut scores = vec![None; n * n];
        for i in 0..n {
            scores[i * n + i] = Some(1.0);
        }
        Self { patients, scores }
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Patient ids in axis order
    pub fn patient_ids(&self) -> impl Iterator<Item = &str> {
        self.patients.iter().map(String::as_str)
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, score: Option<f64>) {
        let n = self.patients.len();
        if row != col {
            self.scores[row * n + col] = score;
        }
    }

    /// Score of `a` against `b`; `None` when undefined or either id is unknown
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let row = self.patients.get_index_of(a)?;
        let col = self.patients.get_index_of(b)?;
        self.scores[row * self.patients.len() + col]
    }

    /// Scores of one patient against every patient, in axis order
    pub fn row(&self, patient_id: &str) -> Option<impl Iterator<Item = (&str, Option<f64>)>> {
        let row = self.patients.get_index_of(patient_id)?;
        let n = self.patients.len();
        Some(
            self.patients
                .iter()
                .zip(&self.scores[row * n..(row + 1) * n])
                .map(|(id, score)| (id.as_str(), *score)),
        )
    }
}

struct Row<'a> {
    matrix: &'a SimilarityMatrix,
    row: usize,
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let n = self.matrix.patients.len();
        let mut map = serializer.serialize_map(Some(n))?;
        for (col, id) in self.matrix.patients.iter().enumerate() {
            map.serialize_entry(id, &self.matrix.scores[self.row * n + col])?;
        }
        map.end()
    }
}

/// Serialized as `{row_id: {col_id: score | null}}`
impl Serialize for SimilarityMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.patients.len()))?;
        for (row, id) in self.patients.iter().enumerate() {
            map.serialize_entry(id, &Row { matrix: self, row })?;
        }
        map.end()
    }
}

/// Feature name to similarity matrix, in feature declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SimilarityReport {
    matrices: IndexMap<String, SimilarityMatrix>,
}

impl SimilarityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: impl Into<String>, matrix: SimilarityMatrix) {
        self.matrices.insert(feature.into(), matrix);
    }

    pub fn get(&self, feature: &str) -> Option<&SimilarityMatrix> {
        self.matrices.get(feature)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.matrices.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SimilarityMatrix)> {
        self.matrices.iter().map(|(name, matrix)| (name.as_str(), matrix))
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, SimilarityMatrix> {
        self.matrices
    }
}
