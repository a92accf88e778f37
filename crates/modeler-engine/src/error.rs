//! Error types for the modeler engine

use thiserror::Error;

/// Result type alias using ModelerError
pub type Result<T> = std::result::Result<T, ModelerError>;

/// Errors that can occur while editing, running or loading a model
#[derive(Debug, Error)]
pub enum ModelerError {
    /// A resolved parameter value was rejected by the algorithm
    #[error("Wrong value for parameter '{parameter}' of '{node}': {value}")]
    InvalidParameterValue {
        node: String,
        parameter: String,
        value: String,
    },

    /// No pending node could be scheduled in a full pass
    #[error("Dependency deadlock: cannot schedule {}", pending.join(", "))]
    DependencyDeadlock { pending: Vec<String> },

    /// The algorithm behind a node reported a failure
    #[error("Error executing algorithm {description}\n{message}")]
    DelegateExecutionFailure {
        node: String,
        description: String,
        message: String,
    },

    /// A persisted model could not be reconstructed
    #[error("Invalid model document: {0}")]
    InvalidDocument(String),

    /// Node name not present in the model
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Input name not present in the model
    #[error("Unknown input: {0}")]
    UnknownInput(String),

    /// Algorithm id not present in the registry
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A node or input with this name already exists
    #[error("Name already in use: {0}")]
    DuplicateName(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelerError {
    /// Create an invalid document error with a message
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Create a deadlock error for the given pending nodes
    pub fn deadlock<I, S>(pending: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pending: Vec<String> = pending.into_iter().map(Into::into).collect();
        pending.sort();
        Self::DependencyDeadlock { pending }
    }
}
