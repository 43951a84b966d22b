use thiserror::Error;

/// Core error type for the cascades engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The step graph contains a dependency cycle
    #[error("Dependency cycle detected: {0}")]
    CycleError(String),

    /// A step consumes a name that no step produces and that is not a graph input
    #[error("Step '{step}' references undefined input '{input}'")]
    UnresolvedInputError {
        /// Step declaring the input
        step: String,
        /// The unresolved input name
        input: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// An opaque step computation failed
    #[error("Step execution error in '{step}': {message}")]
    StepExecutionError {
        /// Step that failed
        step: String,
        /// Underlying failure
        message: String,
    },

    /// A model callback failed or broke its contract
    #[error("Model error: {0}")]
    ModelError(String),

    /// No (cheap set, threshold) pair satisfies the accuracy constraint
    #[error("Infeasible cascade: {0}")]
    InfeasibleCascadeError(String),

    /// A cascade artifact does not fit the pipeline it is applied to
    #[error("Artifact mismatch: {0}")]
    ArtifactMismatchError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    IOError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether this error describes a malformed graph, raised before any execution
    pub fn is_graph_structure_error(&self) -> bool {
        matches!(
            self,
            CoreError::CycleError(_) | CoreError::UnresolvedInputError { .. }
        )
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::CycleError(_) => "ERR_GRAPH_CYCLE",
            CoreError::UnresolvedInputError { .. } => "ERR_GRAPH_UNRESOLVED_INPUT",
            CoreError::ValidationError(_) => "ERR_VALIDATION",
            CoreError::StepExecutionError { .. } => "ERR_STEP_EXECUTION",
            CoreError::ModelError(_) => "ERR_MODEL",
            CoreError::InfeasibleCascadeError(_) => "ERR_CASCADE_INFEASIBLE",
            CoreError::ArtifactMismatchError(_) => "ERR_ARTIFACT_MISMATCH",
            CoreError::ConfigurationError(_) => "ERR_CONFIGURATION",
            CoreError::SerializationError(_) => "ERR_SERIALIZATION",
            CoreError::IOError(_) => "ERR_IO",
            CoreError::Other(_) => "ERR_OTHER",
        }
    }

    pub(crate) fn model(context: &str, err: anyhow::Error) -> Self {
        CoreError::ModelError(format!("{}: {:#}", context, err))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IOError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
