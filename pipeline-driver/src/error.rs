// Driver Errors
// Error taxonomy shared by every driver component

use crate::expression::ExpressionError;

use std::fmt;
use std::io;
use thiserror::Error;

/// Result alias used across the driver
pub type DriverResult<T> = Result<T, DriverError>;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Options are malformed for the selected entry point
    Validation,
    /// An input could not be resolved
    Resolution,
    /// A component input parameter resolved to null
    ResolvedNull,
    /// Metadata store, cache client or config source failure
    Infrastructure,
    /// Deliberately unsupported input kinds
    NotImplemented,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Resolution => write!(f, "resolution"),
            ErrorKind::ResolvedNull => write!(f, "resolved-null"),
            ErrorKind::Infrastructure => write!(f, "infrastructure"),
            ErrorKind::NotImplemented => write!(f, "not-implemented"),
        }
    }
}

/// Errors produced while driving a pipeline task
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Resolution(String),

    #[error("the resolved input parameter is null: {0}")]
    ResolvedParameterNull(String),

    #[error("{0}")]
    Infrastructure(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    Expression(#[from] ExpressionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DriverError>,
    },
}

impl DriverError {
    pub fn validation(message: impl Into<String>) -> Self {
        DriverError::Validation(message.into())
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        DriverError::Resolution(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        DriverError::Infrastructure(message.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        DriverError::NotImplemented(message.into())
    }

    /// Wrap this error in one more layer of context
    pub fn wrap(self, context: impl Into<String>) -> Self {
        DriverError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context layers
    pub fn root(&self) -> &DriverError {
        match self {
            DriverError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the failure is the resolved-null sentinel, at any depth
    pub fn is_resolved_null(&self) -> bool {
        matches!(self.root(), DriverError::ResolvedParameterNull(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            DriverError::Validation(_) => ErrorKind::Validation,
            DriverError::ResolvedParameterNull(_) => ErrorKind::ResolvedNull,
            DriverError::NotImplemented(_) => ErrorKind::NotImplemented,
            DriverError::Infrastructure(_) | DriverError::Io(_) | DriverError::Yaml(_) => {
                ErrorKind::Infrastructure
            }
            DriverError::Resolution(_) | DriverError::Expression(_) | DriverError::Json(_) => {
                ErrorKind::Resolution
            }
            DriverError::Context { .. } => ErrorKind::Resolution,
        }
    }
}

/// Extension for attaching context to fallible driver calls
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> DriverResult<T>;

    fn with_context<F, S>(self, f: F) -> DriverResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<DriverError>,
{
    fn context(self, context: impl Into<String>) -> DriverResult<T> {
        self.map_err(|e| e.into().wrap(context))
    }

    fn with_context<F, S>(self, f: F) -> DriverResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().wrap(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_display() {
        let err = DriverError::resolution("producer task, train, not in tasks")
            .wrap("resolving input parameter with spec x")
            .wrap("failed to resolve inputs");
        assert_eq!(
            err.to_string(),
            "failed to resolve inputs: resolving input parameter with spec x: producer task, train, not in tasks"
        );
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn test_resolved_null_survives_wrapping() {
        let err = DriverError::ResolvedParameterNull("learning_rate".to_string()).wrap("outer");
        assert!(err.is_resolved_null());
        assert_eq!(err.kind(), ErrorKind::ResolvedNull);
        assert!(err.to_string().contains("the resolved input parameter is null: learning_rate"));
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<(), DriverError> = Err(DriverError::validation("pipeline name is required"));
        let err = result.context("invalid root DAG driver args").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "invalid root DAG driver args: pipeline name is required"
        );
    }
}
