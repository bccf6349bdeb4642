//! Error handling types and utilities for the formula language compiler.
//!
//! # Error Conventions
//!
//! As we are providing a library that others may want to interact with from
//! _code_ as well as from the CLI driver, we keep our errors strongly typed at
//! all times. While libraries like
//! [anyhow](https://docs.rs/anyhow/latest/anyhow/) are well-suited for
//! application code, they make it more difficult than is necessary to handle
//! specific errors in library code. To that end, we make sure that our errors
//! are kept strongly typed within the library as much as is possible. Each
//! stage owns its error type, and callers handle the one for the stage they
//! drive.
//!
//! # Errors Versus Diagnostics
//!
//! A malformed or ill-typed formula is an _expected_ input, and is never
//! reported through these error types. Such problems are instead recorded as
//! [`diagnostic::Message`]s inside a compilation result. The error types here
//! are reserved for failures of the API contract itself (such as an invalid
//! registration), and for failures that happen while evaluating a formula.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

pub mod compile;
pub mod diagnostic;
pub mod eval;

