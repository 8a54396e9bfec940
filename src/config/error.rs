//! Configuration error types.

use thiserror::Error;

/// A single rule a resolved configuration breaks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigViolation {
    #[error("Debug log buffer must hold at least one record (got {0})")]
    EmptyDebugLogBuffer(usize),

    #[error("Name '{0}' must not contain whitespace")]
    NameContainsWhitespace(String),
}

/// Errors raised when resolving or updating a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Every violation found, not just the first.
    #[error("Invalid configuration ({} violation(s)): {}", .0.len(), describe(.0))]
    Invalid(Vec<ConfigViolation>),
}

fn describe(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
