//! Error types and utilities to do with evaluating a compiled formula.

use thiserror::Error;

use crate::diagnostic::MessageList;

/// The result type for use in the evaluator.
pub type Result<T> = std::result::Result<T, Error>;

/// This error type is for use while computing the value of a formula.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// The formula could not be compiled, so it cannot be evaluated. The
    /// messages describe why.
    #[error("The formula does not compile:\n{_0}")]
    Compilation(MessageList),

    /// Emitted when an aggregate that has no neutral element is applied to an
    /// empty list.
    #[error("{_0} cannot be applied to an empty list")]
    EmptyList(String),

    /// Emitted when two money amounts in different currencies are combined.
    #[error("Cannot combine money amounts in {_0} and {_1}")]
    CurrencyMismatch(String, String),

    #[error("Division by zero")]
    DivisionByZero,

    /// Emitted when integer arithmetic exceeds the range of the target type.
    #[error("Integer overflow in `{_0}`")]
    Overflow(String),

    /// A null value reached an operation that has no null semantics, such as
    /// primitive integer arithmetic.
    #[error("Null value in `{_0}`")]
    NullValue(String),

    /// A value did not have the shape that its datatype promised. This
    /// indicates a mismatch between a binding and its declared datatype.
    #[error("Expected a value of type {expected} but found `{found}`")]
    TypeMismatch { expected: String, found: String },

    /// Emitted when an argument value is outside of the domain of a function.
    #[error("Invalid argument to `{_0}`: {_1}")]
    InvalidArgument(String, String),

    /// Emitted when a date cannot be constructed from its components.
    #[error("{_0} is not a valid date")]
    InvalidDate(String),

    /// Emitted when a function has no evaluation semantics.
    #[error("Function `{_0}` cannot be evaluated")]
    Unsupported(String),
}
