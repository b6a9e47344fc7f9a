//! Error types for component definition and synchronization.
//!
//! | Enum              | Raised when                                        |
//! |-------------------|----------------------------------------------------|
//! | `SchemaError`     | a component type is built from an invalid template |
//! | `UsageError`      | an API call receives conflicting/unknown arguments |
//! | `CapabilityError` | a non-exposable key is bound to the client         |
//! | `SyncError`       | umbrella for everything the engine returns         |
//!
//! All of these are raised before any state or registry is mutated.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::sync::SessionId;

// ============================================================================
// Suggestions
// ============================================================================

/// Close-match suggestions attached to "unknown name" errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestions(pub Vec<String>);

impl Suggestions {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|s| s == name)
    }
}

impl fmt::Display for Suggestions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{name}'")?;
        }
        write!(f, "]")
    }
}

// ============================================================================
// SchemaError
// ============================================================================

/// Errors detected while building a component type.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("multiple DOM nodes with id=\"{0}\" found")]
    DuplicateNode(String),

    #[error("template binds `{attr}` on a <{tag}> without an id; named nodes need a unique id")]
    MissingNodeId { tag: String, attr: String },

    #[error(
        "HTML template references unknown parameter '{name}', similar parameters include {suggestions}"
    )]
    UnknownParameter {
        name: String,
        suggestions: Suggestions,
    },

    #[error(
        "HTML template references unknown parameter or method '{name}', similar parameters and methods include {suggestions}"
    )]
    UnknownReference {
        name: String,
        suggestions: Suggestions,
    },

    #[error("child config for '{0}' does not match any parameter")]
    UnknownChildConfig(String),

    #[error(
        "child config for '{param}' declares unknown type '{kind}'; children must declare 'model', 'template' or 'literal'"
    )]
    InvalidChildType { param: String, kind: String },

    #[error("dom events declared for unknown node '{node}', available nodes include {nodes:?}")]
    UnknownEventNode { node: String, nodes: Vec<String> },

    #[error("default for '{param}' is not a valid {expected}")]
    InvalidDefault { param: String, expected: String },

    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),

    #[error("template markup could not be parsed: {0}")]
    Markup(String),
}

// ============================================================================
// UsageError
// ============================================================================

/// Errors caused by conflicting or missing arguments to public calls.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("either supply a set of parameters to link or a set of callbacks, not both")]
    LinkConflict,

    #[error("declare parameters to link or a set of callbacks, neither was defined")]
    LinkEmpty,

    #[error(
        "bidirectional linking not supported for explicit callbacks; define separate callbacks for each direction"
    )]
    LinkCallbacksBidirectional,

    #[error("{owner} has no parameter '{name}', similar parameters include {suggestions}")]
    UnknownParameter {
        owner: String,
        name: String,
        suggestions: Suggestions,
    },

    #[error("named node '{node}' not found, available nodes include {nodes:?}")]
    UnknownNode { node: String, nodes: Vec<String> },

    #[error("parameter '{name}' expects {expected}")]
    WrongValueKind { name: String, expected: String },

    #[error("component is already mounted under root {0}")]
    AlreadyMounted(String),

    #[error("{0}")]
    InvalidData(String),
}

// ============================================================================
// CapabilityError
// ============================================================================

/// A key marked non-exposable (renamed to `None`) was bound to the client.
#[derive(Debug, Error)]
#[error("cannot bind '{name}' on {owner}: the parameter is not exposed to the client")]
pub struct CapabilityError {
    pub owner: String,
    pub name: String,
}

// ============================================================================
// SyncError
// ============================================================================

/// Top-level error returned by the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("session {attempted} entered a change cycle while session {active} is still inside one")]
    Concurrent {
        active: SessionId,
        attempted: SessionId,
    },

    #[error("invalid inbound message")]
    Message(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_parameter_lists_suggestions() {
        let err = SchemaError::UnknownParameter {
            name: "clor".to_string(),
            suggestions: Suggestions(vec!["color".to_string()]),
        };
        let display = err.to_string();
        assert!(display.contains("'clor'"));
        assert!(display.contains("['color']"));
    }

    #[test]
    fn test_empty_suggestions_display() {
        assert_eq!(Suggestions::default().to_string(), "[]");
    }

    #[test]
    fn test_sync_error_wraps_usage() {
        let err: SyncError = UsageError::LinkEmpty.into();
        assert!(matches!(err, SyncError::Usage(UsageError::LinkEmpty)));
        assert!(err.to_string().contains("neither was defined"));
    }
}
