//! Error types for operator composition and search

use crate::lifecycle::LifecycleState;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for kolosal-compose operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Boxed error raised by an external ML library implementation
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A configuration value that violates its schema
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path of the offending field, empty for the root value
    pub path: String,
    /// The violated constraint, e.g. `exclusiveMinimum 0`
    pub constraint: String,
    /// The schema fragment that declared the constraint
    pub schema: Value,
    /// The rejected value
    pub value: Value,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, constraint: impl Into<String>, schema: Value, value: Value) -> Self {
        Self {
            path: path.into(),
            constraint: constraint.into(),
            schema,
            value,
        }
    }

    /// The same violation reported below `prefix`
    pub fn prefixed(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.path = if self.path.is_empty() {
                prefix.to_string()
            } else {
                format!("{}.{}", prefix, self.path)
            };
        }
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "<root>" } else { &self.path };
        write!(f, "field '{}' expected {}, got {}", path, self.constraint, self.value)
    }
}

impl std::error::Error for ValidationError {}

/// Main error type for the composition framework
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Composition error: {0}")]
    Composition(String),

    #[error("State error: {operation} requires state {required}, but operator is {actual}")]
    State {
        operation: String,
        required: LifecycleState,
        actual: LifecycleState,
    },

    #[error("Training error in {operator}: {source}")]
    Training {
        operator: String,
        #[source]
        source: BoxError,
    },

    #[error("Prediction error in {operator}: {source}")]
    Prediction {
        operator: String,
        #[source]
        source: BoxError,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Search space error: {0}")]
    SearchSpace(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KolosalError {
    pub(crate) fn state(operation: &str, required: LifecycleState, actual: LifecycleState) -> Self {
        KolosalError::State {
            operation: operation.to_string(),
            required,
            actual,
        }
    }

    /// The validation failure carried by this error, if any
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            KolosalError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KolosalError {
    fn from(err: ndarray::ShapeError) -> Self {
        KolosalError::Composition(format!("incompatible data shapes: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = KolosalError::Composition("test error".to_string());
        assert_eq!(err.to_string(), "Composition error: test error");
    }

    #[test]
    fn test_validation_display_names_field() {
        let err = ValidationError::new("C", "exclusiveMinimum 0", json!({"minimum": 0}), json!(0));
        assert_eq!(err.to_string(), "field 'C' expected exclusiveMinimum 0, got 0");
        let err = err.prefixed("LogisticRegression");
        assert_eq!(err.path, "LogisticRegression.C");
    }

    #[test]
    fn test_state_error_display() {
        let err = KolosalError::state("predict", LifecycleState::Trained, LifecycleState::Trainable);
        assert_eq!(
            err.to_string(),
            "State error: predict requires state trained, but operator is trainable"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KolosalError = io_err.into();
        assert!(matches!(err, KolosalError::Io(_)));
    }
}
