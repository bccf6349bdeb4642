//! Functions and operators callable from formulas, and the registry that
//! resolves a call to one of their signatures.
//!
//! Operators are functions too. The parser turns `a + b` into a call of the
//! internal function that the [`operator::OperatorMap`] associates with `+`,
//! so that a single resolution mechanism serves both.
//!
//! # Overload Resolution
//!
//! A function name may be registered with many signatures. Resolving a call
//! first looks for a signature whose parameter datatypes equal the argument
//! datatypes exactly. Failing that, it considers every signature of the right
//! arity whose parameters the arguments can all be converted to, and picks the
//! one with the lowest total conversion cost (see
//! [`crate::conversion::ConversionRegistry::cost`]). If several signatures
//! share the lowest cost, the call is ambiguous.

pub mod builtin;
pub mod list;
pub mod operator;

use std::{any::Any, fmt::Debug, sync::Arc};

use dashmap::DashMap;
use derivative::Derivative;
use downcast_rs::Downcast;
use flc_errors::{compile, diagnostic::Message, eval};
use itertools::Itertools;
use tracing::trace;

use crate::{
    constant::INTERNAL_ERROR,
    conversion::ConversionRegistry,
    datatype::Datatype,
    environment::Environment,
    eval::{value::Value, TypedValue},
    fragment::CodeFragment,
    result::CompilationResult,
};

/// A function that formulas can call.
///
/// Implementations are trusted to be called only with arguments matching one
/// of their signatures. The compiler guarantees this by resolving every call
/// through the [`FunctionRegistry`] before invoking [`Self::compile`] or
/// [`Self::evaluate`], and converting each argument to the datatype of its
/// parameter. Calling either method with the wrong number of arguments is a
/// programming error and panics.
pub trait FlFunction
where
    Self: Any + Debug + Downcast + Send + Sync,
{
    /// Gets the name that formulas call the function by.
    fn name(&self) -> &str;

    /// Gets the declared return datatype of the function.
    fn return_type(&self) -> &Datatype;

    /// Gets the datatypes of the function's parameters.
    fn parameter_types(&self) -> &[Datatype];

    /// Gets a short description of what the function computes.
    fn description(&self) -> &str {
        ""
    }

    /// Gets the datatype of the function's result when called with arguments
    /// of the datatypes `args`.
    ///
    /// This is the declared return datatype unless the function is generic in
    /// its result, such as `IF` or the list aggregates.
    fn result_type(&self, _env: &Environment, _args: &[Datatype]) -> Datatype {
        self.return_type().clone()
    }

    /// Generates the code for a call of the function with `args`.
    ///
    /// The returned result must contain the diagnostics of the arguments.
    fn compile(&self, env: &Environment, args: Vec<CompilationResult>) -> CompilationResult;

    /// Computes the result of a call of the function with `args`.
    ///
    /// # Errors
    ///
    /// - [`eval::Error`] if the arguments are outside of the function's
    ///   domain.
    fn evaluate(&self, env: &Environment, args: Vec<TypedValue>) -> eval::Result<Value>;
}

impl dyn FlFunction {
    /// Checks if the function is an instance of `T`.
    #[must_use]
    pub fn is<T: FlFunction>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Gets a reference to the function as the concrete type `T` if it is one.
    #[must_use]
    pub fn view_as<T: FlFunction>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Renders the signature of the function, as in `MAX(Decimal; Decimal)`.
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}({})", self.name(), self.parameter_types().iter().join("; "))
    }
}

/// Panics unless a function called `name` that takes `expected` arguments was
/// given exactly that many.
///
/// # Panics
///
/// If `actual` is not `expected`.
pub fn check_arity(name: &str, expected: usize, actual: usize) {
    assert_eq!(
        expected, actual,
        "`{name}` takes {expected} argument(s) but was given {actual}"
    );
}

/// Destructures the arguments of a call with exactly `N` parameters.
///
/// # Panics
///
/// If there are not exactly `N` arguments.
#[must_use]
pub fn unpack<T, const N: usize>(args: Vec<T>) -> [T; N] {
    let count = args.len();
    args.try_into()
        .unwrap_or_else(|_| panic!("expected {N} argument(s) but was given {count}"))
}

/// Splits the compiled arguments of a call into their code and a result that
/// holds their diagnostics.
///
/// # Errors
///
/// A failed result if any argument has no code, which the compiler never lets
/// happen.
pub fn split_arguments(
    name: &str,
    args: Vec<CompilationResult>,
) -> Result<(CompilationResult, Vec<(CodeFragment, Datatype)>), CompilationResult> {
    let mut result = CompilationResult::default();
    let mut code = Vec::with_capacity(args.len());
    for mut arg in args {
        result.absorb_diagnostics(&mut arg);
        match arg.take_code() {
            Some(c) => code.push(c),
            None => {
                result.add_message(Message::new_error(
                    INTERNAL_ERROR,
                    format!("An argument of `{name}` has no code"),
                ));
                return Err(result);
            }
        }
    }
    Ok((result, code))
}

/// The type of the code generators used by [`TemplateFunction`].
pub type CodeTemplate = Arc<dyn Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync>;

/// The type of the evaluators used by [`TemplateFunction`].
pub type Evaluation = Arc<dyn Fn(Vec<Value>) -> eval::Result<Value> + Send + Sync>;

/// A function with a fixed signature whose code is produced by filling the
/// argument fragments into a template.
///
/// Most operators and built-in functions are of this form.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct TemplateFunction {
    name:        String,
    parameters:  Vec<Datatype>,
    return_type: Datatype,
    description: String,

    #[derivative(Debug = "ignore")]
    template: CodeTemplate,

    #[derivative(Debug = "ignore")]
    evaluation: Evaluation,
}

impl TemplateFunction {
    #[must_use]
    pub fn new(
        name: &str,
        parameters: Vec<Datatype>,
        return_type: Datatype,
        template: impl Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync + 'static,
        evaluation: impl Fn(Vec<Value>) -> eval::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            parameters,
            return_type,
            description: String::new(),
            template: Arc::new(template),
            evaluation: Arc::new(evaluation),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

impl FlFunction for TemplateFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn return_type(&self) -> &Datatype {
        &self.return_type
    }

    fn parameter_types(&self) -> &[Datatype] {
        &self.parameters
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn compile(&self, _env: &Environment, args: Vec<CompilationResult>) -> CompilationResult {
        check_arity(&self.name, self.parameters.len(), args.len());
        let (mut result, code) = match split_arguments(&self.name, args) {
            Ok(split) => split,
            Err(failed) => return failed,
        };
        let fragments = code.into_iter().map(|(fragment, _)| fragment).collect();
        result.set_code((self.template)(fragments), self.return_type.clone());
        result
    }

    fn evaluate(&self, _env: &Environment, args: Vec<TypedValue>) -> eval::Result<Value> {
        check_arity(&self.name, self.parameters.len(), args.len());
        (self.evaluation)(args.into_iter().map(|arg| arg.value).collect())
    }
}

/// Builds a template producing `(lhs op rhs)`.
#[must_use]
pub fn infix(op: &'static str) -> impl Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync {
    move |args| {
        let [lhs, rhs] = unpack(args);
        CodeFragment::infix(lhs, op, rhs)
    }
}

/// Builds a template producing `op` directly followed by the operand.
#[must_use]
pub fn prefix(op: &'static str) -> impl Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync {
    move |args| {
        let [operand] = unpack(args);
        CodeFragment::prefix(op, operand)
    }
}

/// Builds a template calling `method` on the first argument, passing the
/// remaining arguments followed by the literal `extra` arguments.
#[must_use]
pub fn method(
    method: &'static str,
    extra: &'static [&'static str],
) -> impl Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync {
    move |args| {
        let mut args = args.into_iter();
        let target = args.next().unwrap_or_default();
        let mut rest = args.collect::<Vec<_>>();
        rest.extend(extra.iter().map(|e| CodeFragment::from_source(*e)));
        let mut fragment = CodeFragment::call(target, method, rest);
        if extra.iter().any(|e| e.starts_with("RoundingMode.")) {
            fragment.add_import("java.math.RoundingMode");
        }
        fragment
    }
}

/// Builds a template calling the static `function`, which needs `import`.
#[must_use]
pub fn static_method(
    function: &'static str,
    import: &'static str,
) -> impl Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync {
    move |args| {
        let mut fragment = CodeFragment::static_call(function, args);
        fragment.add_import(import);
        fragment
    }
}

/// The outcome of resolving a call against the [`FunctionRegistry`].
#[derive(Clone, Debug)]
pub enum Resolution {
    /// The call resolves to exactly one signature.
    Resolved(Arc<dyn FlFunction>),

    /// More than one signature matches equally well.
    Ambiguous(Vec<Arc<dyn FlFunction>>),

    /// Functions with the name exist, but none accepts the arguments.
    WrongArgumentTypes(Vec<Arc<dyn FlFunction>>),

    /// No function with the name exists.
    Undefined,
}

/// The registry of functions available to formulas.
///
/// Function names are case-insensitive. Lookups are safe to perform
/// concurrently from many compilations.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Vec<Arc<dyn FlFunction>>>,
}

impl FunctionRegistry {
    /// Creates a registry with no functions at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function`, replacing any existing function with the same
    /// name and parameter datatypes.
    ///
    /// # Errors
    ///
    /// - [`compile::Error::InvalidFunctionName`] if the function's name cannot
    ///   be written in a formula.
    pub fn register(&self, function: Arc<dyn FlFunction>) -> compile::Result<()> {
        if !is_valid_name(function.name()) {
            Err(compile::Error::InvalidFunctionName(function.name().to_string()))?;
        }
        self.insert(function);
        Ok(())
    }

    pub(crate) fn insert(&self, function: Arc<dyn FlFunction>) {
        let mut overloads = self.functions.entry(normalize(function.name())).or_default();
        overloads.retain(|f| f.parameter_types() != function.parameter_types());
        overloads.push(function);
    }

    /// Gets every signature registered under `name`.
    #[must_use]
    pub fn overloads(&self, name: &str) -> Vec<Arc<dyn FlFunction>> {
        self.functions
            .get(&normalize(name))
            .map(|overloads| overloads.value().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&normalize(name))
    }

    /// Gets the names of all registered functions, in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|entry| entry.key().clone()).sorted().collect()
    }

    /// Resolves a call of `name` with arguments of the datatypes `args`.
    #[must_use]
    pub fn resolve(
        &self,
        name: &str,
        args: &[Datatype],
        conversions: &ConversionRegistry,
    ) -> Resolution {
        let candidates = self.overloads(name);
        if candidates.is_empty() {
            return Resolution::Undefined;
        }

        let applicable = candidates
            .iter()
            .filter(|f| f.parameter_types().len() == args.len())
            .collect::<Vec<_>>();

        if let Some(exact) = applicable.iter().find(|f| f.parameter_types() == args) {
            trace!(name, signature = exact.signature(), "resolved exactly");
            return Resolution::Resolved(Arc::clone(exact));
        }

        let best = applicable
            .into_iter()
            .filter_map(|f| {
                f.parameter_types()
                    .iter()
                    .zip(args)
                    .map(|(param, arg)| conversions.cost(arg, param))
                    .sum::<Option<u32>>()
                    .map(|cost| (cost, f))
            })
            .min_set_by_key(|(cost, _)| *cost);

        match best.as_slice() {
            [] => Resolution::WrongArgumentTypes(candidates),
            [(cost, function)] => {
                trace!(name, signature = function.signature(), cost, "resolved by conversion");
                Resolution::Resolved(Arc::clone(function))
            }
            tied => Resolution::Ambiguous(tied.iter().map(|(_, f)| Arc::clone(f)).collect()),
        }
    }
}

fn normalize(name: &str) -> String {
    name.to_ascii_uppercase()
}

/// Returns `true` if `name` is an identifier that the formula grammar can
/// parse as a function name.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use flc_errors::compile::Error;

    use crate::{
        conversion::ConversionRegistry,
        datatype::Datatype,
        eval::value::Value,
        function::{infix, FlFunction, FunctionRegistry, Resolution, TemplateFunction},
    };

    fn function(name: &str, parameters: Vec<Datatype>) -> Arc<dyn FlFunction> {
        Arc::new(TemplateFunction::new(
            name,
            parameters,
            Datatype::Decimal,
            infix("+"),
            |_| Ok(Value::Null),
        ))
    }

    #[test]
    fn exact_matches_win() {
        let registry = FunctionRegistry::new();
        registry.insert(function("F", vec![Datatype::Decimal]));
        registry.insert(function("F", vec![Datatype::int]));

        let resolution = registry.resolve("f", &[Datatype::int], &ConversionRegistry::with_defaults());
        let Resolution::Resolved(resolved) = resolution else {
            panic!("expected a resolution");
        };
        assert_eq!(resolved.parameter_types(), &[Datatype::int]);
    }

    #[test]
    fn cheapest_conversion_wins() {
        let registry = FunctionRegistry::new();
        registry.insert(function("F", vec![Datatype::Decimal]));
        registry.insert(function("F", vec![Datatype::Any]));

        let resolution = registry.resolve("F", &[Datatype::int], &ConversionRegistry::with_defaults());
        let Resolution::Resolved(resolved) = resolution else {
            panic!("expected a resolution");
        };
        assert_eq!(resolved.parameter_types(), &[Datatype::Decimal]);
    }

    #[test]
    fn equal_costs_are_ambiguous() {
        let registry = FunctionRegistry::new();
        registry.insert(function("F", vec![Datatype::Decimal, Datatype::int]));
        registry.insert(function("F", vec![Datatype::int, Datatype::Decimal]));

        let resolution = registry.resolve(
            "F",
            &[Datatype::int, Datatype::int],
            &ConversionRegistry::with_defaults(),
        );
        assert!(matches!(resolution, Resolution::Ambiguous(tied) if tied.len() == 2));
    }

    #[test]
    fn unknown_and_mismatched_calls_are_distinguished() {
        let registry = FunctionRegistry::new();
        registry.insert(function("F", vec![Datatype::Decimal]));
        let conversions = ConversionRegistry::with_defaults();

        assert!(matches!(
            registry.resolve("G", &[Datatype::Decimal], &conversions),
            Resolution::Undefined
        ));
        assert!(matches!(
            registry.resolve("F", &[Datatype::String], &conversions),
            Resolution::WrongArgumentTypes(_)
        ));
        assert!(matches!(
            registry.resolve("F", &[], &conversions),
            Resolution::WrongArgumentTypes(_)
        ));
    }

    #[test]
    fn registering_a_signature_again_replaces_it() {
        let registry = FunctionRegistry::new();
        registry.insert(function("F", vec![Datatype::Decimal]));
        registry.insert(function("f", vec![Datatype::Decimal]));

        assert_eq!(registry.overloads("F").len(), 1);
        assert_eq!(registry.names(), vec!["F".to_string()]);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let registry = FunctionRegistry::new();

        assert_eq!(
            registry.register(function("1F", vec![])),
            Err(Error::InvalidFunctionName("1F".to_string()))
        );
        assert!(registry.register(function("F_1", vec![])).is_ok());
    }

    #[test]
    fn functions_can_be_viewed_as_their_concrete_type() {
        let f = function("F", vec![Datatype::Decimal, Datatype::Money]);

        assert!(f.is::<TemplateFunction>());
        assert!(f.view_as::<TemplateFunction>().is_some());
        assert_eq!(f.signature(), "F(Decimal; Money)");
    }
}
