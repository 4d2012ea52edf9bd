//! Runtime error types with trap semantics for the script interpreter.
//!
//! A `RuntimeError` is what "the function raised" means for a verified
//! function: the verifier records it as an `error` outcome with the rendered
//! message attached.

use serde::{Deserialize, Serialize};

/// Runtime errors produced by the interpreter, builtins and native callables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum RuntimeError {
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("name '{name}' is not bound")]
    UnboundName { name: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("{function}() takes {expected} argument(s), got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("divide by zero")]
    DivideByZero,

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("record {record} has no field '{field}'")]
    MissingField { record: String, field: String },

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("recursion depth limit ({limit}) exceeded")]
    RecursionLimitExceeded { limit: usize },

    #[error("step limit ({limit}) exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("deadline of {ms}ms exceeded")]
    DeadlineExceeded { ms: u64 },

    /// Raised explicitly through the `fail` builtin.
    #[error("{message}")]
    Raised { message: String },

    /// Raised by a native (Rust) callable.
    #[error("{message}")]
    Native { message: String },
}

impl RuntimeError {
    pub fn type_mismatch(expected: impl Into<String>, got: &super::Value) -> Self {
        RuntimeError::TypeMismatch {
            expected: expected.into(),
            got: got.type_name().to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        RuntimeError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Short class name, used as the prefix of reported error strings.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::TypeMismatch { .. } => "TypeMismatch",
            RuntimeError::UnboundName { .. } => "UnboundName",
            RuntimeError::UnknownFunction { .. } => "UnknownFunction",
            RuntimeError::ArityMismatch { .. } => "ArityMismatch",
            RuntimeError::IntegerOverflow => "IntegerOverflow",
            RuntimeError::DivideByZero => "DivideByZero",
            RuntimeError::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            RuntimeError::MissingField { .. } => "MissingField",
            RuntimeError::KeyNotFound { .. } => "KeyNotFound",
            RuntimeError::InvalidArgument { .. } => "InvalidArgument",
            RuntimeError::RecursionLimitExceeded { .. } => "RecursionLimitExceeded",
            RuntimeError::StepLimitExceeded { .. } => "StepLimitExceeded",
            RuntimeError::DeadlineExceeded { .. } => "DeadlineExceeded",
            RuntimeError::Raised { .. } => "Raised",
            RuntimeError::Native { .. } => "Native",
        }
    }

    /// `"Kind: message"`, the form reported in obligation details.
    pub fn describe(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}
