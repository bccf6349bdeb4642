//! Compiles a parsed formula into a [`CompilationResult`].
//!
//! Compilation is a single bottom-up walk over the syntax tree. Every node
//! produces its own result, and a node combines the results of its children
//! by value. The [`Visitor`] visits every child of a node even if an earlier
//! one failed, so that independent problems in different parts of a formula
//! are all reported at once. A node with a failed child is not compiled any
//! further, as resolving a call against arguments of unknown datatypes would
//! only produce follow-up errors.
//!
//! Operators are compiled exactly like function calls, using the internal
//! function name that the [`crate::function::operator::OperatorMap`] assigns
//! to each symbol.

pub mod parameter;

use std::sync::Arc;

use flc_errors::diagnostic::Message;
use itertools::Itertools;
use tracing::trace;

use crate::{
    compile::parameter::ParameterTable,
    constant::{
        AMBIGUOUS_FUNCTION_CALL,
        EXPRESSION_TOO_DEEP,
        INTERNAL_ERROR,
        UNDEFINED_FUNCTION,
        UNDEFINED_IDENTIFIER,
        UNDEFINED_OPERATOR,
        WRONG_ARGUMENT_TYPES,
    },
    datatype::Datatype,
    environment::Environment,
    fragment::CodeFragment,
    function::{FlFunction, Resolution},
    parse::ast::{Expr, ExprKind, Literal, UnaryOp},
    result::CompilationResult,
};

/// The thing being called at a call site, which determines how failures to
/// resolve the call are reported.
#[derive(Clone, Copy, Debug)]
enum Callee<'a> {
    /// A function called by name.
    Function(&'a str),

    /// An operator, identified by its `symbol`, implemented by the internal
    /// function `function`.
    Operator { symbol: &'a str, function: &'a str },
}

impl Callee<'_> {
    fn function_name(&self) -> &str {
        match self {
            Self::Function(name) => name,
            Self::Operator { function, .. } => function,
        }
    }
}

/// Walks a syntax tree, compiling each node against an [`Environment`].
#[derive(Debug)]
pub struct Visitor<'a> {
    env:        &'a Environment,
    parameters: &'a ParameterTable,
    max_depth:  usize,
    depth:      usize,
}

impl<'a> Visitor<'a> {
    /// Creates a visitor resolving identifiers against `parameters` and
    /// everything else against `env`, which refuses to visit expressions
    /// nested more than `max_depth` levels deep.
    #[must_use]
    pub fn new(env: &'a Environment, parameters: &'a ParameterTable, max_depth: usize) -> Self {
        Self {
            env,
            parameters,
            max_depth,
            depth: 0,
        }
    }

    /// Compiles `expr` and everything beneath it.
    ///
    /// Messages raised for the expression that are not attached to a more
    /// specific part of the formula are attached to the span of `expr`.
    ///
    /// Chains of operators are walked iteratively, descending into the left
    /// operands first and applying the operators on the way back up, so that
    /// only nesting costs stack space and not the length of a chain.
    pub fn visit(&mut self, expr: &Expr) -> CompilationResult {
        let outer = self.depth;
        let mut depth = self.depth;
        let mut chain = Vec::new();
        let mut innermost = expr;

        let result = loop {
            if depth > self.max_depth {
                break self.too_deep();
            }
            match &innermost.kind {
                ExprKind::Unary { operand, .. } => {
                    chain.push((innermost, depth));
                    depth += usize::from(UnaryOp::groups(operand));
                    innermost = operand;
                }
                ExprKind::Binary { op, lhs, .. } => {
                    chain.push((innermost, depth));
                    depth += usize::from(op.groups_lhs(lhs));
                    innermost = lhs;
                }
                ExprKind::Literal(literal) => break self.literal(literal),
                ExprKind::Identifier(name) => break self.identifier(name),
                ExprKind::Call { name, args } => break self.call(name, args, depth),
            }
        };
        let mut result = result.located_at(&innermost.span);

        let env = self.env;
        let operators = env.operators();
        for (node, depth) in chain.into_iter().rev() {
            result = match &node.kind {
                ExprKind::Unary { op, .. } => {
                    let (symbol, _) = op.operator();
                    self.operator(symbol, operators.unary(symbol), vec![result])
                }
                ExprKind::Binary { op, rhs, .. } => {
                    let (symbol, _) = op.operator();
                    self.depth = depth + usize::from(op.groups_rhs(rhs));
                    let rhs = self.visit(rhs);
                    self.operator(symbol, operators.binary(symbol), vec![result, rhs])
                }
                ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Call { .. } => result,
            }
            .located_at(&node.span);
        }

        self.depth = outer;
        result
    }

    /// Compiles a call of `name`, whose arguments sit one level deeper than
    /// `depth`.
    fn call(&mut self, name: &str, args: &[Expr], depth: usize) -> CompilationResult {
        self.depth = depth + 1;
        let args = args.iter().map(|arg| self.visit(arg)).collect();
        self.apply(Callee::Function(name), args)
    }

    /// Applies the operator `symbol`, implemented by `function`, to the
    /// already compiled `operands`.
    fn operator(
        &self,
        symbol: &str,
        function: Option<&String>,
        operands: Vec<CompilationResult>,
    ) -> CompilationResult {
        match function {
            Some(function) => self.apply(Callee::Operator { symbol, function }, operands),
            None => Self::unknown_operator(symbol, operands),
        }
    }

    fn too_deep(&self) -> CompilationResult {
        CompilationResult::error(
            EXPRESSION_TOO_DEEP,
            format!("The formula is nested more than {} levels deep", self.max_depth),
        )
    }

    /// Compiles a literal by letting the helper of its datatype create the
    /// value from the literal text.
    fn literal(&self, literal: &Literal) -> CompilationResult {
        let datatype = literal.datatype();
        match self.env.datatypes().helper(&datatype) {
            Some(helper) => CompilationResult::new(helper.new_instance(&literal.text()), datatype),
            None => CompilationResult::error(
                INTERNAL_ERROR,
                format!("There is no helper to create values of {datatype}"),
            ),
        }
    }

    fn identifier(&self, name: &str) -> CompilationResult {
        match self.parameters.get(name) {
            Some(datatype) => {
                CompilationResult::new(CodeFragment::from_source(name), datatype.clone())
                    .with_identifier(name)
            }
            None => CompilationResult::error(
                UNDEFINED_IDENTIFIER,
                format!("Undefined identifier `{name}`"),
            ),
        }
    }

    /// Resolves a call of `callee` with the already compiled `args`, converts
    /// every argument to its parameter's datatype and lets the resolved
    /// function generate the code.
    fn apply(&self, callee: Callee<'_>, mut args: Vec<CompilationResult>) -> CompilationResult {
        let mut result = CompilationResult::default();
        for arg in &mut args {
            result.absorb_diagnostics(arg);
        }
        if result.failed() {
            return result;
        }

        let mut code = Vec::with_capacity(args.len());
        for mut arg in args {
            let Some(arg) = arg.take_code() else {
                result.add_message(Message::new_error(
                    INTERNAL_ERROR,
                    format!("An argument of `{}` produced no code", callee.function_name()),
                ));
                return result;
            };
            code.push(arg);
        }

        let arg_types = code.iter().map(|(_, datatype)| datatype.clone()).collect::<Vec<_>>();
        let conversions = self.env.conversions();
        let function = match self.env.functions().resolve(
            callee.function_name(),
            &arg_types,
            conversions,
        ) {
            Resolution::Resolved(function) => function,
            unresolved => {
                result.add_message(Self::unresolved(callee, &arg_types, unresolved));
                return result;
            }
        };
        trace!(signature = function.signature(), "compiling call");

        let converted = function
            .parameter_types()
            .iter()
            .zip(code)
            .map(|(parameter, (fragment, datatype))| {
                let converted_type = conversions.converted_datatype(&datatype, parameter);
                conversions
                    .conversion_code(&datatype, parameter, fragment)
                    .map(|fragment| CompilationResult::new(fragment, converted_type))
            })
            .collect::<Option<Vec<_>>>();
        let Some(converted) = converted else {
            result.add_message(Message::new_error(
                INTERNAL_ERROR,
                format!(
                    "The arguments of the call cannot be converted for {}",
                    function.signature()
                ),
            ));
            return result;
        };

        result.absorb(function.compile(self.env, converted));
        result
    }

    /// Builds the message explaining why a call of `callee` with arguments of
    /// `arg_types` did not resolve.
    fn unresolved(callee: Callee<'_>, arg_types: &[Datatype], resolution: Resolution) -> Message {
        let types = arg_types.iter().join("; ");
        match (callee, resolution) {
            (_, Resolution::Ambiguous(candidates)) => {
                let candidates = candidates.iter().map(|f| Self::describe(callee, f)).join(", ");
                let call = match callee {
                    Callee::Function(name) => format!("{name}({types})"),
                    Callee::Operator { symbol, .. } => format!("`{symbol}` on {types}"),
                };
                Message::new_error(
                    AMBIGUOUS_FUNCTION_CALL,
                    format!("The call {call} is ambiguous between {candidates}"),
                )
            }
            (Callee::Operator { symbol, .. }, _) => Message::new_error(
                UNDEFINED_OPERATOR,
                format!(
                    "The operator `{symbol}` is not defined for {}",
                    arg_types.iter().join(" and ")
                ),
            ),
            (Callee::Function(name), Resolution::WrongArgumentTypes(candidates)) => {
                let candidates = candidates.iter().map(|f| f.signature()).join(", ");
                Message::new_error(
                    WRONG_ARGUMENT_TYPES,
                    format!(
                        "The function {name} cannot be called with ({types}); it accepts \
                         {candidates}"
                    ),
                )
            }
            (Callee::Function(name), _) => Message::new_error(
                UNDEFINED_FUNCTION,
                format!("Undefined function {name}({types})"),
            ),
        }
    }

    /// Describes a candidate signature, naming operators by their symbol.
    fn describe(callee: Callee<'_>, function: &Arc<dyn FlFunction>) -> String {
        match callee {
            Callee::Function(_) => function.signature(),
            Callee::Operator { symbol, .. } => {
                format!("`{symbol}`({})", function.parameter_types().iter().join("; "))
            }
        }
    }

    /// Handles an operator symbol that the environment does not map to any
    /// function.
    fn unknown_operator(symbol: &str, mut operands: Vec<CompilationResult>) -> CompilationResult {
        let mut result = CompilationResult::default();
        for operand in &mut operands {
            result.absorb_diagnostics(operand);
        }
        if result.successful() {
            result.add_message(Message::new_error(
                UNDEFINED_OPERATOR,
                format!("The operator `{symbol}` is not supported"),
            ));
        }
        result
    }
}

#[cfg(test)]
mod test {
    use crate::{
        compile::{parameter::ParameterTable, Visitor},
        constant::{
            EXPRESSION_TOO_DEEP,
            UNDEFINED_FUNCTION,
            UNDEFINED_IDENTIFIER,
            UNDEFINED_OPERATOR,
            WRONG_ARGUMENT_TYPES,
        },
        datatype::Datatype,
        environment::Environment,
        parse::parse,
        result::CompilationResult,
    };

    fn compile(source: &str, parameters: &ParameterTable) -> CompilationResult {
        let env = Environment::default();
        let expr = parse(source, 128).expect("formula should parse");
        Visitor::new(&env, parameters, 128).visit(&expr)
    }

    #[test]
    fn literals_are_created_by_their_helpers() {
        let empty = ParameterTable::new();

        let result = compile("3.0", &empty);
        assert_eq!(result.source(), "Decimal.valueOf(\"3.0\")");
        assert_eq!(result.datatype(), Some(&Datatype::Decimal));
        assert_eq!(
            result.fragment().unwrap().imports().collect::<Vec<_>>(),
            vec!["org.faktorips.values.Decimal"]
        );

        assert_eq!(compile("10EUR", &empty).source(), "Money.valueOf(\"10EUR\")");
        assert_eq!(compile("\"a\"", &empty).source(), "\"a\"");
        assert_eq!(compile("42", &empty).datatype(), Some(&Datatype::int));
    }

    #[test]
    fn identifiers_are_recorded() {
        let parameters = ParameterTable::new().with("a", Datatype::int);

        let result = compile("a + 1", &parameters);
        assert!(result.successful());
        assert_eq!(result.source(), "(a + 1)");
        assert!(result.identifiers().contains("a"));
    }

    #[test]
    fn independent_errors_are_all_reported() {
        let result = compile("x + y", &ParameterTable::new());

        assert!(result.failed());
        let spans = result
            .messages()
            .iter()
            .filter(|m| m.code() == UNDEFINED_IDENTIFIER)
            .map(|m| m.span().cloned())
            .collect::<Vec<_>>();
        assert_eq!(spans, vec![Some(0..1), Some(4..5)]);
        assert!(result.messages().by_code(UNDEFINED_OPERATOR).is_none());
    }

    #[test]
    fn operands_are_converted() {
        let parameters = ParameterTable::new().with("d", Datatype::Decimal);

        let result = compile("d + 1", &parameters);
        assert_eq!(result.source(), "d.add(Decimal.valueOf(1))");
        assert_eq!(result.datatype(), Some(&Datatype::Decimal));
    }

    #[test]
    fn unresolved_calls_are_classified() {
        let empty = ParameterTable::new();

        let result = compile("\"a\" * 2", &empty);
        let message = result.messages().by_code(UNDEFINED_OPERATOR).unwrap();
        assert_eq!(message.text(), "The operator `*` is not defined for String and int");
        assert_eq!(message.span(), Some(&(0..7)));

        assert!(compile("NOPE(1)", &empty).messages().by_code(UNDEFINED_FUNCTION).is_some());
        assert!(compile("ABS(\"a\")", &empty).messages().by_code(WRONG_ARGUMENT_TYPES).is_some());
    }

    #[test]
    fn nesting_is_limited() {
        let env = Environment::default();
        let parameters = ParameterTable::new();
        let expr = parse("ABS(-(1 + (2 - ABS(3))))", 128).unwrap();
        assert_eq!(expr.nesting(), 4);

        let shallow = Visitor::new(&env, &parameters, 4).visit(&expr);
        assert!(shallow.successful());

        let deep = Visitor::new(&env, &parameters, 3).visit(&expr);
        let messages = deep.messages().iter().map(|m| m.code()).collect::<Vec<_>>();
        assert_eq!(messages, vec![EXPRESSION_TOO_DEEP]);
    }

    #[test]
    fn long_chains_are_not_nested() {
        let env = Environment::default();
        let parameters = ParameterTable::new();
        let source = vec!["1"; 200].join(" + ");
        let expr = parse(&source, 128).unwrap();
        assert_eq!(expr.nesting(), 0);

        let result = Visitor::new(&env, &parameters, 1).visit(&expr);
        assert!(result.successful());
        assert_eq!(result.datatype(), Some(&Datatype::int));
        assert!(result.source().starts_with(&format!("{}1 + 1)", "(".repeat(199))));
    }
}
