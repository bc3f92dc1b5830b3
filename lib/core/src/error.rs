use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unknown coding system: {0}")]
    UnknownSystem(String),

    #[error("Node not found in {system} ontology: {code}")]
    NodeNotFound { system: String, code: String },

    #[error("Invalid path expression '{expression}': {reason}")]
    PathExpression { expression: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the ontology "node not found" condition, which callers
    /// downgrade to a zero similarity instead of failing.
    pub fn is_node_not_found(&self) -> bool {
        matches!(self, Error::NodeNotFound { .. })
    }
}
