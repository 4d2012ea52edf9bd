//! Core error types for attest-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! parsing and declaration registration.

use thiserror::Error;

use crate::ast::Span;

/// Core errors produced by the attest-core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Source text could not be tokenized or parsed.
    #[error("parse error at {span}: {message}")]
    Parse { span: Span, message: String },

    /// Attempting to register a record name that already exists.
    #[error("duplicate type name: '{name}'")]
    DuplicateTypeName { name: String },

    /// Two functions with the same name in one module.
    #[error("duplicate function: '{name}'")]
    DuplicateFunction { name: String },
}

impl CoreError {
    pub(crate) fn parse(span: Span, message: impl Into<String>) -> Self {
        CoreError::Parse {
            span,
            message: message.into(),
        }
    }
}
