/// Error types for topology declaration and registration
use thiserror::Error;

/// Main error type for declaration and registration
///
/// Errors are cloned into every dependent of a failed resource, so all
/// payloads are owned strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required configuration key is not set
    #[error("missing required configuration variable '{0}'")]
    MissingConfig(String),

    /// Configuration is present but unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Resource arguments failed validation
    #[error("validation error for {resource}: {message}")]
    Validation { resource: String, message: String },

    /// Two declarations share the same URN
    #[error("duplicate resource URN '{0}'")]
    DuplicateResource(String),

    /// A declaration references a resource that was never registered
    #[error("resource {resource} depends on unregistered resource {dependency}")]
    UnknownDependency {
        resource: String,
        dependency: String,
    },

    /// A dependency failed, so this resource was never submitted
    #[error("resource {resource} was not created because dependency {dependency} failed")]
    DependencyFailed {
        resource: String,
        dependency: String,
    },

    /// The engine rejected a registration
    #[error("engine error for {resource}: {message}")]
    Engine { resource: String, message: String },

    /// An output could not be resolved into the requested shape
    #[error("output error: {0}")]
    Output(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stack output name was exported twice
    #[error("stack output '{0}' is already exported")]
    DuplicateExport(String),
}

impl Error {
    /// Create a validation error for the given resource
    pub fn validation(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create an engine error for the given resource
    pub fn engine(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create an output error with the given message
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Whether this error only reports that something upstream failed
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::DependencyFailed { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
