//! Error handling for the xcc compiler.
//!
//! Every error is fatal: the first diagnostic aborts the compilation with a
//! non-zero exit status. Internal invariant violations are routed through a
//! distinct variant so tests can tell compiler bugs from user errors.

use crate::Span;
use thiserror::Error;

/// The compiler-wide error type.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("{message}")]
    Lex { message: String, span: Span },

    #[error("{message}")]
    Parse { message: String, span: Span },

    #[error("{message}")]
    Type { message: String, span: Span },

    #[error("redeclaration of `{name}`")]
    Redeclaration { name: String, span: Span },

    #[error("`{name}` undeclared")]
    Undeclared { name: String, span: Span },

    #[error("{message}")]
    IllegalInitializer { message: String, span: Span },

    #[error("{message}")]
    ControlFlow { message: String, span: Span },

    #[error("internal compiler error: {message}")]
    Internal { message: String, span: Option<Span> },

    #[error("I/O error: {message}")]
    Io { message: String },
}

/// Result type alias for xcc compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Self::Lex { message: message.into(), span }
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::Parse { message: message.into(), span }
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::Type { message: message.into(), span }
    }

    pub fn redeclaration(name: impl Into<String>, span: Span) -> Self {
        Self::Redeclaration { name: name.into(), span }
    }

    pub fn undeclared(name: impl Into<String>, span: Span) -> Self {
        Self::Undeclared { name: name.into(), span }
    }

    pub fn illegal_initializer(message: impl Into<String>, span: Span) -> Self {
        Self::IllegalInitializer { message: message.into(), span }
    }

    pub fn control_flow(message: impl Into<String>, span: Span) -> Self {
        Self::ControlFlow { message: message.into(), span }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), span: None }
    }

    pub fn internal_at(message: impl Into<String>, span: Span) -> Self {
        Self::Internal { message: message.into(), span: Some(span) }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    /// The span the error points at, if it carries one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Lex { span, .. }
            | CompileError::Parse { span, .. }
            | CompileError::Type { span, .. }
            | CompileError::Redeclaration { span, .. }
            | CompileError::Undeclared { span, .. }
            | CompileError::IllegalInitializer { span, .. }
            | CompileError::ControlFlow { span, .. } => Some(*span),
            CompileError::Internal { span, .. } => *span,
            CompileError::Io { .. } => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal { .. })
    }
}
