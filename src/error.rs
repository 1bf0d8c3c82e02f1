use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input for tool `{tool}`: {source}")]
    Validation {
        tool: String,
        #[source]
        source: ValidationError,
    },
    #[error("tool `{tool}` failed: {source}")]
    Handler {
        tool: String,
        #[source]
        source: HandlerError,
    },
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    #[error("invalid tool definition: {0}")]
    InvalidDefinition(String),
}

impl ToolError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// One mismatch between an input value and the declared schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", issue_line(.path, .message))]
pub struct ValidationIssue {
    /// Location of the offending value, e.g. `a`, `items[2]`, `point.x`.
    /// Empty for the root.
    pub path: String,
    pub message: String,
}

fn issue_line(path: &str, message: &str) -> String {
    if path.is_empty() {
        message.to_string()
    } else {
        format!("{path}: {message}")
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }
}

/// Failure raised by a tool's handler. Carried to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e)
    }
}

impl From<RetrieverError> for HandlerError {
    fn from(e: RetrieverError) -> Self {
        Self::new(e)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("API returned {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("query construction failed: {0}")]
    QueryConstruction(String),
    #[error("failed to parse filter: {0}")]
    Parse(String),
    #[error("filter translation failed: {0}")]
    Translation(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_issue() {
        let err = ValidationError {
            issues: vec![
                ValidationIssue {
                    path: "a".into(),
                    message: "expected number, received string".into(),
                },
                ValidationIssue {
                    path: "b".into(),
                    message: "required".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "a: expected number, received string; b: required"
        );
    }

    #[test]
    fn root_issue_has_no_path_prefix() {
        let err = ValidationError::single("", "expected object, received string");
        assert_eq!(err.to_string(), "expected object, received string");
    }

    #[test]
    fn validation_error_is_the_tool_error_source() {
        let err = ToolError::Validation {
            tool: "adder".into(),
            source: ValidationError::single("b", "required"),
        };
        assert!(err.is_validation());
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("b: required"));
        assert_eq!(err.to_string(), "invalid input for tool `adder`: b: required");
    }

    #[test]
    fn tool_error_names_the_tool() {
        let err = ToolError::Handler {
            tool: "adder".into(),
            source: "boom".into(),
        };
        assert_eq!(err.to_string(), "tool `adder` failed: boom");
        assert!(!err.is_validation());
    }
}
