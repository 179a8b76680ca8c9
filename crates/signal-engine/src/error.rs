//! Error types for signal definitions and runs

use thiserror::Error;

/// A malformed signal definition
///
/// Raised when a signal is created, before anything runs. `position` is the
/// location in the definition as written, e.g. `[0, outputs, success, 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("signal '{signal}': item at {position} is not an action, sequence or output map (found {found})")]
    InvalidLeaf {
        signal: String,
        position: String,
        found: String,
    },

    #[error("signal '{signal}': action '{name}' at {position} is not defined")]
    UnresolvedAction {
        signal: String,
        position: String,
        name: String,
    },

    #[error("signal '{signal}': output map at {position} does not directly follow an action (follows {follows})")]
    OrphanOutputs {
        signal: String,
        position: String,
        follows: String,
    },

    #[error("signal '{signal}': action '{action}' at {position} has no output named '{output}'")]
    UndeclaredOutput {
        signal: String,
        position: String,
        action: String,
        output: String,
    },

    #[error("signal '{signal}': sequence at {position} is nested directly inside a concurrent group")]
    NestedGroup { signal: String, position: String },
}

impl DefinitionError {
    /// Name of the signal whose definition is malformed
    pub fn signal(&self) -> &str {
        match self {
            DefinitionError::InvalidLeaf { signal, .. }
            | DefinitionError::UnresolvedAction { signal, .. }
            | DefinitionError::OrphanOutputs { signal, .. }
            | DefinitionError::UndeclaredOutput { signal, .. }
            | DefinitionError::NestedGroup { signal, .. } => signal,
        }
    }

    /// Position of the offending item
    pub fn position(&self) -> &str {
        match self {
            DefinitionError::InvalidLeaf { position, .. }
            | DefinitionError::UnresolvedAction { position, .. }
            | DefinitionError::OrphanOutputs { position, .. }
            | DefinitionError::UndeclaredOutput { position, .. }
            | DefinitionError::NestedGroup { position, .. } => position,
        }
    }
}

/// Result type for signal runs
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors that fail a signal run
#[derive(Debug, Error)]
pub enum SignalError {
    /// The run arguments could not be serialized
    #[error("signal '{signal}': arguments are not plain serializable data: {source}")]
    InvalidArgs {
        signal: String,
        #[source]
        source: serde_json::Error,
    },

    /// The run arguments serialized to something other than an object
    #[error("signal '{signal}': arguments must serialize to an object, got {found}")]
    ArgsNotObject { signal: String, found: String },

    /// A sync step failed and the engine is configured to reject
    #[error("signal '{signal}': step '{step}' at {position} failed: {message}")]
    StepFailed {
        signal: String,
        step: String,
        position: String,
        message: String,
    },

    /// A step running in a concurrent group failed
    #[error("signal '{signal}': concurrent step '{step}' at {position} failed: {message}")]
    AsyncStepFailed {
        signal: String,
        step: String,
        position: String,
        message: String,
    },

    /// An async step took an output it does not declare
    #[error("signal '{signal}': step '{step}' at {position} took undeclared output '{output}'")]
    UndeclaredOutput {
        signal: String,
        step: String,
        position: String,
        output: String,
    },
}
