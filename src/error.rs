//! Error types and the parse diagnostics channel

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expression error in `{expression}`: {message}")]
    Expression { expression: String, message: String },

    #[error("Unknown method `{name}`")]
    UnknownMethod { name: String },

    #[error("State error: {0}")]
    State(#[from] serde_json::Error),

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// A recoverable parse anomaly. Parsing always continues past these; they
/// are collected and reported, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
