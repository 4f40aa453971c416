//! Error types for composition execution

use thiserror::Error;

/// Result type for choreo operations
pub type Result<T> = std::result::Result<T, ChoreoError>;

/// Errors that can occur while decoding, resolving, executing or forwarding
/// a composition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChoreoError {
    /// The composition text is structurally invalid
    #[error("Malformed composition: {0}")]
    MalformedComposition(String),

    /// The member is not registered as a supported operation on this server
    #[error("Operation '{0}' is not supported by this server")]
    UnsupportedOperation(String),

    /// No registered callable matches the resolved arguments
    #[error("No callable for '{operation}' accepts ({arguments})")]
    NoMatchingOperation {
        operation: String,
        arguments: String,
    },

    /// A referenced variable is neither a literal nor present in the state
    #[error("Cannot find value for argument '{0}' in the execution state")]
    MissingVariable(String),

    /// I/O failure while talking to a peer
    #[error("Transport error: {0}")]
    Transport(String),

    /// A peer answered with a body that is not a flat JSON object
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A stored instance could not be read or decoded
    #[error("Stored instance {kind}/{id} is unreadable: {reason}")]
    StoreCorruption {
        kind: String,
        id: String,
        reason: String,
    },

    /// A request input could not be accepted
    #[error("Invalid input '{name}': {reason}")]
    InvalidInput { name: String, reason: String },

    /// The request path does not address a service operation
    #[error("Invalid request path '{0}'")]
    InvalidPath(String),

    /// The next invocation has no address to forward it to
    #[error("Cannot route invocation '{0}' to any host")]
    Unroutable(String),

    /// A value could not be converted between structured and native form
    #[error("Marshalling error: {0}")]
    Marshalling(String),

    /// A registered service callable failed
    #[error("Service error in '{operation}': {message}")]
    Service { operation: String, message: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure reported by a service callable
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        ServiceError(message.into())
    }
}

impl From<std::io::Error> for ChoreoError {
    fn from(e: std::io::Error) -> Self {
        ChoreoError::Config(e.to_string())
    }
}
