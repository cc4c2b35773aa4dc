use std::fmt;

use thiserror::Error;

/// Error produced by the scene parser. Every failure carries the source path
/// and line at which it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    pub location: SourceLocation,
    pub message: String,
}

impl ParseError {
    pub fn new(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }

    /// Returns true if the message contains the given text.
    pub fn mentions(&self, text: &str) -> bool {
        self.message.contains(text)
    }
}

/// Position within a parsed input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub path: String,
    pub line: usize,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}:{}", self.path, self.line)
        }
    }
}

/// Failures reported by the object [`Registry`](crate::parser::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown object type '{0}'")]
    UnknownType(String),
    #[error("Object type '{0}' registered more than once")]
    DuplicateType(String),
    #[error("Object of type '{actual}' is not a {expected}")]
    TypeMismatch { expected: String, actual: String },
}
