//! An interpreter that computes the value of a formula directly, rather than
//! generating code for it.
//!
//! The evaluator shares everything with the compiler that determines what a
//! formula means: a formula is compiled before it is evaluated, and every call
//! is resolved against the same [`Environment`] with the same conversions.
//! Evaluating a formula therefore produces the value that the generated code
//! would compute.
//!
//! Like the generated code, the evaluator only evaluates the branch of an `IF`
//! that is taken, and does not evaluate the right operand of `&&` and `||`
//! when the left operand already determines the result.

pub mod value;

use std::{collections::HashMap, sync::Arc};

use flc_errors::eval::{Error, Result};
use tracing::{debug, trace};

use crate::{
    compile::parameter::ParameterTable,
    datatype::Datatype,
    environment::Environment,
    eval::value::Value,
    function::Resolution,
    parse::{
        ast::{BinaryOp, Expr, ExprKind},
        parse,
    },
    CompilerBuilder,
    ExprCompiler,
};

/// The values that the parameters of a formula are bound to, by name.
///
/// Parameters without a binding evaluate to [`Value::Null`].
pub type Bindings = HashMap<String, Value>;

/// A value together with the datatype it was computed as.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedValue {
    pub datatype: Datatype,
    pub value:    Value,
}

impl TypedValue {
    #[must_use]
    pub fn new(datatype: Datatype, value: Value) -> Self {
        Self { datatype, value }
    }
}

/// Computes the values of formulas.
#[derive(Clone, Debug)]
pub struct Evaluator {
    compiler: ExprCompiler,
}

impl Evaluator {
    /// Creates an evaluator for formulas over `env`.
    #[must_use]
    pub fn new(env: Arc<Environment>) -> Self {
        Self::with_compiler(CompilerBuilder::new(env).build())
    }

    /// Creates an evaluator that type-checks formulas with `compiler`.
    #[must_use]
    pub fn with_compiler(compiler: ExprCompiler) -> Self {
        Self { compiler }
    }

    /// Computes the value of the formula `text` with its `parameters` bound to
    /// the values in `bindings`.
    ///
    /// # Errors
    ///
    /// - [`Error::Compilation`] if the formula does not compile, carrying the
    ///   compiler's messages.
    /// - Any other [`Error`] if the computation itself fails, such as on a
    ///   division by zero.
    pub fn evaluate(
        &self,
        text: &str,
        parameters: &ParameterTable,
        bindings: &Bindings,
    ) -> Result<Value> {
        debug!(formula = text, "evaluating formula");

        let expr = parse(text, self.compiler.max_depth()).map_err(Error::Compilation)?;
        let compiled = self.compiler.compile_expr(&expr, parameters);
        if compiled.failed() {
            Err(Error::Compilation(compiled.messages().clone()))?;
        }

        let frame = Frame {
            evaluator: self,
            parameters,
            bindings,
        };
        frame.eval(&expr).map(|result| result.value)
    }

    fn env(&self) -> &Environment {
        self.compiler.env()
    }
}

/// The state of a single evaluation.
struct Frame<'a> {
    evaluator:  &'a Evaluator,
    parameters: &'a ParameterTable,
    bindings:   &'a Bindings,
}

impl Frame<'_> {
    /// Computes the value of `expr`, walking chains of operators iteratively
    /// the same way the compiler does.
    fn eval(&self, expr: &Expr) -> Result<TypedValue> {
        let mut chain = Vec::new();
        let mut innermost = expr;
        let mut value = loop {
            match &innermost.kind {
                ExprKind::Unary { operand, .. } | ExprKind::Binary { lhs: operand, .. } => {
                    chain.push(innermost);
                    innermost = operand;
                }
                ExprKind::Literal(literal) => {
                    break TypedValue::new(literal.datatype(), literal.value());
                }
                ExprKind::Identifier(name) => break self.identifier(name)?,
                ExprKind::Call { name, args }
                    if name.eq_ignore_ascii_case("IF") && args.len() == 3 =>
                {
                    break self.conditional(name, args)?;
                }
                ExprKind::Call { name, args } => {
                    let args = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>>>()?;
                    break self.call(name, args)?;
                }
            }
        };

        let operators = self.env().operators();
        for node in chain.into_iter().rev() {
            value = match &node.kind {
                ExprKind::Unary { op, .. } => {
                    let (symbol, _) = op.operator();
                    let function = Self::operator(operators.unary(symbol), symbol)?;
                    self.call(&function, vec![value])?
                }
                ExprKind::Binary { op, rhs, .. } => {
                    let (symbol, _) = op.operator();
                    let function = Self::operator(operators.binary(symbol), symbol)?;
                    match self.short_circuit(*op, &value)? {
                        Some(decided) => decided,
                        None => {
                            let rhs = self.eval(rhs)?;
                            self.call(&function, vec![value, rhs])?
                        }
                    }
                }
                ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Call { .. } => value,
            };
        }
        Ok(value)
    }

    fn identifier(&self, name: &str) -> Result<TypedValue> {
        let datatype = self
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Unsupported(name.to_string()))?;
        let value = self.bindings.get(name).cloned().unwrap_or(Value::Null);
        Ok(TypedValue::new(datatype, value))
    }

    /// Evaluates `IF(condition; then; else)`, computing only the branch that
    /// the condition selects.
    fn conditional(&self, name: &str, args: &[Expr]) -> Result<TypedValue> {
        let [condition, then, otherwise] = args else {
            return Err(Error::Unsupported(name.to_string()));
        };
        let condition = self.eval(condition)?;
        let holds = self
            .env()
            .conversions()
            .convert_value(&condition.datatype, &Datatype::boolean, condition.value.clone())?
            .as_bool(name)?;

        let (then, otherwise) = if holds {
            (self.eval(then)?, self.skip(otherwise)?)
        } else {
            (self.skip(then)?, self.eval(otherwise)?)
        };
        self.call(name, vec![condition, then, otherwise])
    }

    /// Stands in for a branch that is not evaluated, keeping its datatype so
    /// that the result has the same datatype as in the generated code.
    fn skip(&self, expr: &Expr) -> Result<TypedValue> {
        let compiled = self.evaluator.compiler.compile_expr(expr, self.parameters);
        let datatype = compiled
            .datatype()
            .cloned()
            .ok_or_else(|| Error::Compilation(compiled.messages().clone()))?;
        Ok(TypedValue::new(datatype, Value::Null))
    }

    /// Decides `&&` and `||` from the left operand alone where possible.
    fn short_circuit(&self, op: BinaryOp, lhs: &TypedValue) -> Result<Option<TypedValue>> {
        let decisive = match op {
            BinaryOp::And => false,
            BinaryOp::Or => true,
            _ => return Ok(None),
        };
        let value = self
            .env()
            .conversions()
            .convert_value(&lhs.datatype, &Datatype::boolean, lhs.value.clone())?;
        let decided = (value.as_bool(op.operator().0)? == decisive)
            .then(|| TypedValue::new(Datatype::boolean, Value::Boolean(decisive)));
        Ok(decided)
    }

    /// Calls the function that `name` and the datatypes of `args` resolve to.
    fn call(&self, name: &str, args: Vec<TypedValue>) -> Result<TypedValue> {
        let env = self.env();
        let conversions = env.conversions();
        let arg_types = args.iter().map(|arg| arg.datatype.clone()).collect::<Vec<_>>();
        let Resolution::Resolved(function) = env.functions().resolve(name, &arg_types, conversions)
        else {
            return Err(Error::Unsupported(name.to_string()));
        };
        trace!(signature = function.signature(), "evaluating call");

        let args = function
            .parameter_types()
            .iter()
            .zip(args)
            .map(|(parameter, arg)| {
                let datatype = conversions.converted_datatype(&arg.datatype, parameter);
                let value = conversions.convert_value(&arg.datatype, parameter, arg.value)?;
                Ok(TypedValue::new(datatype, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let arg_types = args.iter().map(|arg| arg.datatype.clone()).collect::<Vec<_>>();
        let datatype = function.result_type(env, &arg_types);
        let value = function.evaluate(env, args)?;
        Ok(TypedValue::new(datatype, value))
    }

    fn operator(function: Option<&String>, symbol: &str) -> Result<String> {
        function.cloned().ok_or_else(|| Error::Unsupported(symbol.to_string()))
    }

    fn env(&self) -> &Environment {
        self.evaluator.env()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use flc_errors::eval::Error;
    use rust_decimal::Decimal;

    use crate::{
        compile::parameter::ParameterTable,
        constant::UNDEFINED_IDENTIFIER,
        datatype::Datatype,
        environment::Environment,
        eval::{
            value::{Money, Value},
            Bindings,
            Evaluator,
        },
    };

    fn evaluator() -> Evaluator {
        Evaluator::new(Arc::new(Environment::default()))
    }

    fn evaluate(source: &str) -> Result<Value, Error> {
        evaluator().evaluate(source, &ParameterTable::new(), &Bindings::new())
    }

    fn decimal(text: &str) -> Value {
        Value::Decimal(text.parse::<Decimal>().unwrap())
    }

    #[test]
    fn max_and_min() -> anyhow::Result<()> {
        assert!(evaluate("MAX(3.0; 4.0)")?.equals(&decimal("4.0")));
        assert!(evaluate("MIN(3.0; 4.0)")?.equals(&decimal("3.0")));
        assert!(evaluate("MAX(4; 3)")?.equals(&decimal("4")));

        let money = evaluate("MAX(3.0EUR; 4.0EUR)")?;
        assert_eq!(money, Value::Money(Money::new(Decimal::new(40, 1), "EUR")));
        let money = evaluate("MIN(3.0EUR; 4.0EUR)")?;
        assert_eq!(money, Value::Money(Money::new(Decimal::new(30, 1), "EUR")));

        Ok(())
    }

    #[test]
    fn power() -> anyhow::Result<()> {
        assert!(evaluate("POWER(2.0; 3.0)")?.equals(&decimal("8.0")));
        assert!(evaluate("POWER(4.0; 2.0)")?.equals(&decimal("16.0")));

        Ok(())
    }

    #[test]
    fn is_empty() -> anyhow::Result<()> {
        assert_eq!(evaluate("ISEMPTY(DECIMALNULL())")?, Value::Boolean(true));
        assert_eq!(evaluate("ISEMPTY(MONEYNULL())")?, Value::Boolean(true));
        assert_eq!(evaluate("ISEMPTY(3.0)")?, Value::Boolean(false));
        assert_eq!(evaluate("ISEMPTY(1)")?, Value::Boolean(false));
        assert_eq!(evaluate("ISEMPTY(BOOLEANNULL())")?, Value::Boolean(true));
        assert_eq!(evaluate("ISEMPTY(STRINGNULL())")?, Value::Boolean(true));
        assert_eq!(evaluate("ISEMPTY(\"a\")")?, Value::Boolean(false));

        let parameters = ParameterTable::new().with("d", Datatype::Decimal);
        let mut bindings = Bindings::new();
        let unbound = evaluator().evaluate("ISEMPTY(d)", &parameters, &bindings)?;
        assert_eq!(unbound, Value::Boolean(true));

        bindings.insert("d".to_string(), decimal("1.5"));
        let bound = evaluator().evaluate("ISEMPTY(d)", &parameters, &bindings)?;
        assert_eq!(bound, Value::Boolean(false));

        Ok(())
    }

    #[test]
    fn list_aggregates() -> anyhow::Result<()> {
        let parameters = ParameterTable::new().with("xs", Datatype::make_list(Datatype::Decimal));
        let mut bindings = Bindings::new();
        bindings.insert(
            "xs".to_string(),
            Value::List(vec![decimal("1.5"), decimal("4.25"), decimal("-2")]),
        );

        let evaluator = evaluator();
        assert!(evaluator.evaluate("MAX(xs)", &parameters, &bindings)?.equals(&decimal("4.25")));
        assert!(evaluator.evaluate("MIN(xs)", &parameters, &bindings)?.equals(&decimal("-2")));
        assert!(evaluator.evaluate("SUM(xs)", &parameters, &bindings)?.equals(&decimal("3.75")));
        assert_eq!(evaluator.evaluate("COUNT(xs)", &parameters, &bindings)?, Value::Integer(3));

        bindings.insert("xs".to_string(), Value::List(vec![]));
        assert_eq!(
            evaluator.evaluate("MAX(xs)", &parameters, &bindings),
            Err(Error::EmptyList("MAX".to_string()))
        );
        assert!(evaluator.evaluate("SUM(xs)", &parameters, &bindings)?.equals(&decimal("0")));

        Ok(())
    }

    #[test]
    fn only_the_taken_branch_is_evaluated() -> anyhow::Result<()> {
        let parameters = ParameterTable::new().with("x", Datatype::int);
        let mut bindings = Bindings::new();
        bindings.insert("x".to_string(), Value::Integer(0));

        let evaluator = evaluator();
        let value = evaluator.evaluate("IF(x = 0; 0; 10 / x)", &parameters, &bindings)?;
        assert_eq!(value, Value::Decimal(Decimal::ZERO));

        assert_eq!(
            evaluator.evaluate("10 / x", &parameters, &bindings),
            Err(Error::DivisionByZero)
        );
        assert_eq!(
            evaluator.evaluate("x <> 0 && 10 / x > 1.0", &parameters, &bindings)?,
            Value::Boolean(false)
        );

        Ok(())
    }

    #[test]
    fn long_chains_are_evaluated() -> anyhow::Result<()> {
        assert_eq!(evaluate(&vec!["1"; 1000].join(" + "))?, Value::Integer(1000));
        assert_eq!(evaluate(&format!("{}1", "- ".repeat(100)))?, Value::Integer(1));
        assert_eq!(evaluate("1.0 = 1.00")?, Value::Boolean(true));

        Ok(())
    }

    #[test]
    fn nulls_propagate_through_arithmetic() -> anyhow::Result<()> {
        let parameters = ParameterTable::new().with("d", Datatype::Decimal);

        let value = evaluator().evaluate("d * 2 + 1.0", &parameters, &Bindings::new())?;
        assert_eq!(value, Value::Null);

        Ok(())
    }

    #[test]
    fn runtime_failures() {
        assert!(matches!(
            evaluate("1EUR + 1USD"),
            Err(Error::CurrencyMismatch(..))
        ));
        assert!(matches!(evaluate("2147483647 + 1"), Err(Error::Overflow(_))));
    }

    #[test]
    fn formulas_that_do_not_compile_are_rejected() {
        let Err(Error::Compilation(messages)) = evaluate("missing + 1") else {
            panic!("expected a compilation failure");
        };
        assert!(messages.by_code(UNDEFINED_IDENTIFIER).is_some());
    }
}
