//! Error types and utilities to do with setting up and driving the formula
//! compiler.
//!
//! Note that these are _not_ used to report problems with the formula being
//! compiled. See [`crate::diagnostic`] for those.

use thiserror::Error;

/// The result type for use in the compiler.
pub type Result<T> = std::result::Result<T, Error>;

/// This error type is for use when configuring the compiler's environment.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// Emitted when a datatype helper is registered for a datatype that cannot
    /// describe a concrete value, such as the universal `any` datatype.
    #[error("Cannot register a datatype helper for the abstract datatype `{_0}`")]
    InvalidHelperRegistration(String),

    /// Emitted when a conversion rule would convert a datatype into itself.
    #[error("Conversion from `{_0}` to itself cannot be registered")]
    ReflexiveConversion(String),

    /// Emitted when a function is registered with a name the formula grammar
    /// cannot call.
    #[error("`{_0}` is not a valid function name")]
    InvalidFunctionName(String),

    /// Emitted when a datatype name cannot be understood.
    #[error("Unknown datatype `{_0}`")]
    UnknownDatatype(String),
}
