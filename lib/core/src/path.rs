//! Path-expression seam
//!
//! Feature extraction only needs `compile(path) -> (resource -> values)`.
//! Any evaluator for the clinical query language can be plugged in through
//! [`PathCompiler`]; [`crate::fhirpath::FhirPathCompiler`] is the built-in one.

use crate::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A compiled path expression: a pure function of a resource
pub trait PathExpression: Send + Sync {
    /// Evaluate against a resource, producing a (possibly empty) collection
    fn evaluate(&self, resource: &Value) -> Vec<Value>;

    /// The expression text this was compiled from
    fn source(&self) -> &str;
}

/// Compiles expression strings into [`PathExpression`]s
pub trait PathCompiler: Send + Sync {
    fn compile(&self, expression: &str) -> Result<CompiledPath>;
}

/// Shared handle to a compiled expression
#[derive(Clone)]
pub struct CompiledPath(Arc<dyn PathExpression>);

impl CompiledPath {
    pub fn new<P: PathExpression + 'static>(expression: P) -> Self {
        Self(Arc::new(expression))
    }

    #[inline]
    pub fn evaluate(&self, resource: &Value) -> Vec<Value> {
        self.0.evaluate(resource)
    }

    pub fn source(&self) -> &str {
        self.0.source()
    }

    /// First produced value, if any
    pub fn first(&self, resource: &Value) -> Option<Value> {
        self.evaluate(resource).into_iter().next()
    }

    /// Evaluate as a condition
    pub fn test(&self, resource: &Value) -> bool {
        collection_is_truthy(&self.evaluate(resource))
    }
}

impl fmt::Debug for CompiledPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledPath").field(&self.source()).finish()
    }
}

/// Condition truthiness of a result collection: non-empty and not a single
/// `false`
pub fn collection_is_truthy(values: &[Value]) -> bool {
    match values {
        [] => false,
        [Value::Bool(flag)] => *flag,
        _ => true,
    }
}

/// Whether an extracted value can fill a slot: null and empty strings,
/// arrays or objects cannot. `false` and `0` are real values.
pub fn value_is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) | Value::Number(_) => true,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
