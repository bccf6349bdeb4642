//! This library implements a compiler for the formula language, a small typed
//! expression language used to write business rules such as premium
//! calculations, into fragments of Java source code.
//!
//! A formula is compiled against a set of named, typed parameters and an
//! expected result datatype:
//!
//! ```
//! use std::sync::Arc;
//!
//! use flc_compiler::{
//!     compile::parameter::ParameterTable,
//!     datatype::Datatype,
//!     environment::Environment,
//!     CompilerBuilder,
//! };
//!
//! let compiler = CompilerBuilder::new(Arc::new(Environment::default())).build();
//! let parameters = ParameterTable::new().with("premium", Datatype::Money);
//!
//! let result = compiler.compile("MAX(premium; 10EUR)", &parameters, &Datatype::Money);
//! assert!(result.successful());
//! assert_eq!(result.source(), "premium.max(Money.valueOf(\"10EUR\"))");
//! ```
//!
//! # Process Overview
//!
//! While more information can be found in the module-level documentation of
//! each part of this codebase, a brief overview of the compilation process can
//! be stated as follows:
//!
//! 1. We [`parse`] the formula text into a syntax tree, where every node
//!    remembers the part of the text it came from.
//! 2. We walk that tree bottom-up with the [`compile::Visitor`], resolving
//!    every operator and function call to a concrete signature in the
//!    [`environment::Environment`] and inserting the
//!    [`conversion`]s that its arguments need.
//! 3. We convert the result to the datatype the caller expects.
//!
//! Problems with the formula itself are never returned as errors. They are
//! collected as messages in the [`result::CompilationResult`], so that a
//! caller can report every problem at once.
//!
//! The [`eval`] module additionally provides an interpreter that computes the
//! value of a formula directly, following exactly the same typing rules.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming
#![allow(clippy::multiple_crate_versions)] // Enforced by our dependencies

pub mod compile;
pub mod constant;
pub mod conversion;
pub mod datatype;
pub mod environment;
pub mod eval;
pub mod fragment;
pub mod function;
pub mod parse;
pub mod result;

use std::sync::Arc;

use flc_errors::diagnostic::{Message, Span};
use tracing::debug;

use crate::{
    compile::{parameter::ParameterTable, Visitor},
    constant::{DEFAULT_MAX_DEPTH, INTERNAL_ERROR, WRONG_RESULT_TYPE},
    datatype::Datatype,
    environment::Environment,
    parse::ast::Expr,
    result::CompilationResult,
};

/// Handles the compilation of formulas to Java source fragments.
///
/// A compiler is cheap to clone and holds no state between compilations, so
/// that the same compiler can be used for any number of formulas, from any
/// number of threads.
#[derive(Clone, Debug)]
pub struct ExprCompiler {
    /// The datatypes, conversions and functions that formulas are compiled
    /// against.
    env: Arc<Environment>,

    /// Whether results of a primitive datatype are boxed into their object
    /// counterpart.
    ensure_result_is_object: bool,

    /// The deepest nesting of sub-expressions that the compiler accepts.
    max_depth: usize,
}

impl ExprCompiler {
    /// Constructs a new compiler for formulas over `env`.
    #[must_use]
    pub fn new(env: Arc<Environment>, ensure_result_is_object: bool, max_depth: usize) -> Self {
        Self {
            env,
            ensure_result_is_object,
            max_depth,
        }
    }

    /// Compiles the formula `text`, which may refer to the provided
    /// `parameters`, into an expression of the `expected` datatype.
    ///
    /// If `expected` is [`Datatype::Any`], the formula's own datatype is kept.
    /// Otherwise it must be convertible to `expected`.
    #[must_use]
    pub fn compile(
        &self,
        text: &str,
        parameters: &ParameterTable,
        expected: &Datatype,
    ) -> CompilationResult {
        debug!(formula = text, %expected, "compiling formula");

        let expr = match parse::parse(text, self.max_depth) {
            Ok(expr) => expr,
            Err(messages) => return CompilationResult::from_messages(messages),
        };
        let result = self.compile_expr(&expr, parameters);
        if result.failed() {
            return result;
        }

        let result = self.convert_result(result, expected, &expr.span);
        if self.ensure_result_is_object && result.successful() {
            self.box_result(result)
        } else {
            result
        }
    }

    /// Compiles an already parsed expression.
    pub(crate) fn compile_expr(&self, expr: &Expr, parameters: &ParameterTable) -> CompilationResult {
        Visitor::new(&self.env, parameters, self.max_depth).visit(expr)
    }

    /// Converts the successful `result` of the formula at `span` to the
    /// `expected` datatype.
    fn convert_result(
        &self,
        mut result: CompilationResult,
        expected: &Datatype,
        span: &Span,
    ) -> CompilationResult {
        let Some((fragment, datatype)) = result.take_code() else {
            result.add_message(Message::new_error(INTERNAL_ERROR, "The formula produced no code"));
            return result;
        };

        let conversions = self.env.conversions();
        match conversions.conversion_code(&datatype, expected, fragment) {
            Some(fragment) => {
                result.set_code(fragment, conversions.converted_datatype(&datatype, expected));
            }
            None => result.add_message(
                Message::new_error(
                    WRONG_RESULT_TYPE,
                    format!("The formula has the datatype {datatype}, but {expected} is expected"),
                )
                .with_span(span.clone()),
            ),
        }
        result
    }

    /// Boxes the successful `result` if it is of a primitive datatype.
    fn box_result(&self, mut result: CompilationResult) -> CompilationResult {
        let Some((fragment, datatype)) = result.take_code() else {
            return result;
        };
        let boxed = datatype.boxed();
        match self.env.conversions().conversion_code(&datatype, &boxed, fragment.clone()) {
            Some(converted) => result.set_code(converted, boxed),
            None => result.set_code(fragment, datatype),
        }
        result
    }

    #[must_use]
    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    #[must_use]
    pub fn ensure_result_is_object(&self) -> bool {
        self.ensure_result_is_object
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Allows for building an [`ExprCompiler`] instance while retaining the
/// defaults for fields that do not need to be customized.
#[derive(Debug)]
pub struct CompilerBuilder {
    /// The datatypes, conversions and functions that formulas are compiled
    /// against.
    env: Arc<Environment>,

    /// Whether results of a primitive datatype are boxed.
    ensure_result_is_object: Option<bool>,

    /// The deepest nesting of sub-expressions that the compiler accepts.
    max_depth: Option<usize>,
}

impl CompilerBuilder {
    /// Creates a new compiler builder for formulas over `env`.
    ///
    /// Results are not boxed and the nesting limit is [`DEFAULT_MAX_DEPTH`]
    /// unless specified otherwise by calling
    /// [`Self::with_ensure_result_is_object`] and [`Self::with_max_depth`]
    /// respectively.
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn new(env: Arc<Environment>) -> Self {
        let ensure_result_is_object = None;
        let max_depth = None;
        Self {
            env,
            ensure_result_is_object,
            max_depth,
        }
    }

    /// Specifies whether results of a primitive datatype such as `int` are
    /// boxed into their object counterpart such as `Integer`.
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn with_ensure_result_is_object(mut self, ensure: bool) -> Self {
        self.ensure_result_is_object = Some(ensure);
        self
    }

    /// Specifies the deepest nesting of sub-expressions that the compiler
    /// accepts before reporting the formula as too deep.
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Builds a compiler from the specified configuration.
    ///
    /// # API Style
    ///
    /// Please note that the API for the builder consumes `self` and is hence
    /// designed to have calls chained in the "fluent" API style.
    #[must_use]
    pub fn build(self) -> ExprCompiler {
        ExprCompiler::new(
            self.env,
            self.ensure_result_is_object.unwrap_or_default(),
            self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        )
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        compile::parameter::ParameterTable,
        constant::{
            EXPRESSION_TOO_DEEP,
            INVALID_LIST_ELEMENT,
            SYNTAX_ERROR,
            UNDEFINED_IDENTIFIER,
            WRONG_RESULT_TYPE,
        },
        datatype::Datatype,
        environment::Environment,
        function::{list::ListAggregate, FlFunction},
        result::CompilationResult,
        CompilerBuilder,
        ExprCompiler,
    };

    fn compiler() -> ExprCompiler {
        CompilerBuilder::new(Arc::new(Environment::default())).build()
    }

    fn compile(source: &str, expected: &Datatype) -> CompilationResult {
        compiler().compile(source, &ParameterTable::new(), expected)
    }

    #[test]
    fn max_and_min_of_decimals() {
        let max = compile("MAX(3.0; 4.0)", &Datatype::Decimal);
        assert!(max.successful());
        assert_eq!(max.source(), "Decimal.valueOf(\"3.0\").max(Decimal.valueOf(\"4.0\"))");
        assert_eq!(max.datatype(), Some(&Datatype::Decimal));

        let min = compile("MIN(3.0; 4.0)", &Datatype::Decimal);
        assert_eq!(min.source(), "Decimal.valueOf(\"3.0\").min(Decimal.valueOf(\"4.0\"))");
    }

    #[test]
    fn max_of_integers_widens_to_decimal() {
        let result = compile("MAX(4; 3)", &Datatype::Any);

        assert!(result.successful());
        assert_eq!(result.datatype(), Some(&Datatype::Decimal));
        assert_eq!(result.source(), "Decimal.valueOf(4).max(Decimal.valueOf(3))");
    }

    #[test]
    fn max_and_min_of_money() {
        let max = compile("MAX(3.0EUR; 4.0EUR)", &Datatype::Money);
        assert_eq!(max.source(), "Money.valueOf(\"3.0EUR\").max(Money.valueOf(\"4.0EUR\"))");
        assert_eq!(max.datatype(), Some(&Datatype::Money));

        let min = compile("MIN(3.0EUR; 4.0EUR)", &Datatype::Money);
        assert!(min.successful());
        assert_eq!(min.datatype(), Some(&Datatype::Money));
    }

    #[test]
    fn is_empty_of_literals_and_null_values() {
        let literal = compile("ISEMPTY(3.0)", &Datatype::boolean);
        assert_eq!(literal.source(), "Decimal.valueOf(\"3.0\").isNull()");

        let null = compile("ISEMPTY(DECIMALNULL())", &Datatype::boolean);
        assert_eq!(null.source(), "Decimal.NULL.isNull()");

        let primitive = compile("ISEMPTY(1)", &Datatype::boolean);
        assert_eq!(primitive.source(), "false");

        let string = compile("EXISTS(\"a\")", &Datatype::boolean);
        assert_eq!(string.source(), "(\"a\" != null)");

        let boolean = compile("ISEMPTY(BOOLEANNULL())", &Datatype::boolean);
        assert_eq!(boolean.source(), "(null == null)");

        let string = compile("ISEMPTY(\"a\")", &Datatype::boolean);
        assert!(string.successful());
        assert_eq!(string.source(), "(\"a\" == null)");
    }

    #[test]
    fn string_literals_stay_on_one_line() {
        let result = compile("\"a\nb\"", &Datatype::String);

        assert!(result.successful());
        assert_eq!(result.source(), r#""a\nb""#);
    }

    #[test]
    fn decimals_compare_by_magnitude() {
        let result = compile("1.0 = 1.00", &Datatype::boolean);

        assert_eq!(
            result.source(),
            "(Decimal.valueOf(\"1.0\").compareTo(Decimal.valueOf(\"1.00\")) == 0)"
        );
    }

    #[test]
    fn long_formulas_compile_and_pathological_ones_fail() {
        let sum = compile(&vec!["1"; 200].join("+"), &Datatype::int);
        assert!(sum.successful());
        assert!(sum.messages().is_empty());

        let prefixes = compile(&format!("{}1", "-".repeat(200_000)), &Datatype::Any);
        assert!(prefixes.messages().by_code(EXPRESSION_TOO_DEEP).is_some());

        let chain = compile(&vec!["1"; 100_000].join("+"), &Datatype::Any);
        assert_eq!(chain.messages().len(), 1);
        assert!(chain.messages().by_code(EXPRESSION_TOO_DEEP).is_some());
    }

    #[test]
    fn undefined_identifiers_fail() {
        let result = compile("premium * 2", &Datatype::Any);

        assert!(result.failed());
        let message = result.messages().by_code(UNDEFINED_IDENTIFIER).unwrap();
        assert_eq!(message.span(), Some(&(0..7)));
        assert!(result.fragment().is_none());
    }

    #[test]
    fn results_are_converted_to_the_expected_datatype() {
        let result = compile("1 + 2", &Datatype::Decimal);
        assert_eq!(result.source(), "Decimal.valueOf((1 + 2))");
        assert_eq!(result.datatype(), Some(&Datatype::Decimal));

        let result = compile("\"a\"", &Datatype::Decimal);
        assert!(result.failed());
        let message = result.messages().by_code(WRONG_RESULT_TYPE).unwrap();
        assert_eq!(message.span(), Some(&(0..3)));
    }

    #[test]
    fn conversions_back_and_forth_restore_the_datatype() {
        let parameters = ParameterTable::new().with("i", Datatype::int);
        let boxed = compiler().compile("i", &parameters, &Datatype::Integer);
        assert_eq!(boxed.source(), "Integer.valueOf(i)");
        assert_eq!(boxed.datatype(), Some(&Datatype::Integer));

        let parameters = ParameterTable::new().with("i", Datatype::Integer);
        let unboxed = compiler().compile("i", &parameters, &Datatype::int);
        assert_eq!(unboxed.source(), "i.intValue()");
        assert_eq!(unboxed.datatype(), Some(&Datatype::int));
    }

    #[test]
    fn primitive_results_can_be_boxed() {
        let compiler = CompilerBuilder::new(Arc::new(Environment::default()))
            .with_ensure_result_is_object(true)
            .build();

        let result = compiler.compile("1 < 2", &ParameterTable::new(), &Datatype::Any);
        assert_eq!(result.source(), "Boolean.valueOf((1 < 2))");
        assert_eq!(result.datatype(), Some(&Datatype::Boolean));

        let result = compiler.compile("1.5", &ParameterTable::new(), &Datatype::Any);
        assert_eq!(result.datatype(), Some(&Datatype::Decimal));
    }

    #[test]
    fn compilation_is_idempotent() {
        let compiler = compiler();
        let parameters = ParameterTable::new().with("a", Datatype::Money);
        let source = "IF(a > 10EUR; a * 1.5; MONEYNULL())";

        let first = compiler.compile(source, &parameters, &Datatype::Money);
        let second = compiler.compile(source, &parameters, &Datatype::Money);

        assert!(first.successful());
        assert_eq!(first, second);
    }

    #[test]
    fn list_aggregates_check_their_element_type() {
        let compiler = compiler();

        let parameters = ParameterTable::new().with("values", Datatype::make_list(Datatype::Decimal));
        let result = compiler.compile("MAX(values)", &parameters, &Datatype::Decimal);
        assert!(result.successful());
        assert_eq!(result.datatype(), Some(&Datatype::Decimal));
        assert!(result.source().starts_with("FormulaEvaluatorUtil.reduce("));

        let parameters = ParameterTable::new().with("flags", Datatype::make_list(Datatype::Boolean));
        let result = compiler.compile("MAX(flags)", &parameters, &Datatype::Any);
        assert!(result.failed());
        assert!(result.messages().by_code(INVALID_LIST_ELEMENT).is_some());
    }

    #[test]
    #[should_panic(expected = "argument")]
    fn list_aggregates_panic_on_wrong_arity() {
        let env = Environment::default();
        let max = env
            .functions()
            .overloads("MAX")
            .into_iter()
            .find(|f| f.is::<ListAggregate>())
            .unwrap();

        let _ = max.compile(&env, vec![]);
    }

    #[test]
    fn syntax_errors_and_depth_are_reported() {
        let result = compile("MAX(1;", &Datatype::Any);
        assert!(result.messages().by_code(SYNTAX_ERROR).is_some());

        let compiler = CompilerBuilder::new(Arc::new(Environment::default()))
            .with_max_depth(1)
            .build();
        let result = compiler.compile("-(-(-1))", &ParameterTable::new(), &Datatype::Any);
        assert!(result.messages().by_code(EXPRESSION_TOO_DEEP).is_some());
    }
}
