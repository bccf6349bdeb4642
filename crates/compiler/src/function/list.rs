//! Functions that aggregate the elements of a list into a single value.
//!
//! Aggregates are generic in the element datatype of the list: a single
//! `MAX(List<any>)` serves lists of decimals and lists of money alike, and the
//! result has the element datatype of the argument. Whether the elements can
//! actually be aggregated is checked at compile time.
//!
//! The generated code reduces the list with `FormulaEvaluatorUtil.reduce`,
//! passing the combining function and a fallback for the empty list.

use std::sync::Arc;

use flc_errors::{
    diagnostic::Message,
    eval::{Error, Result},
};

use crate::{
    constant::INVALID_LIST_ELEMENT,
    datatype::Datatype,
    environment::Environment,
    eval::{value::Value, TypedValue},
    fragment::CodeFragment,
    function::{check_arity, split_arguments, unpack, FlFunction},
    result::CompilationResult,
};

const EVALUATOR_UTIL: &str = "org.faktorips.runtime.formula.FormulaEvaluatorUtil";

/// The ways of combining the elements of a list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Aggregate {
    Min,
    Max,
    Sum,
}

impl Aggregate {
    /// Returns `true` if lists with elements of `datatype` can be aggregated.
    #[must_use]
    pub fn accepts(self, datatype: &Datatype) -> bool {
        match self {
            Self::Min | Self::Max => datatype.is_comparable(),
            Self::Sum => datatype.is_summable(),
        }
    }

    /// Gets the body of the lambda combining the `current` result with the
    /// `next` element.
    fn combine(self, element: &Datatype) -> &'static str {
        let method_based = matches!(element, Datatype::Decimal | Datatype::Money);
        match (self, method_based) {
            (Self::Min, true) => "current.min(next)",
            (Self::Max, true) => "current.max(next)",
            (Self::Sum, true) => "current.add(next)",
            (Self::Min, false) => "current.compareTo(next) <= 0 ? current : next",
            (Self::Max, false) => "current.compareTo(next) >= 0 ? current : next",
            (Self::Sum, false) => "current + next",
        }
    }

    fn reduce(self, name: &str, current: Value, next: Value) -> Result<Value> {
        match self {
            Self::Min | Self::Max => {
                let keep_current = match current.compare(&next)? {
                    Some(ordering) if self == Self::Min => ordering.is_le(),
                    Some(ordering) => ordering.is_ge(),
                    None => next.is_null(),
                };
                Ok(if keep_current { current } else { next })
            }
            Self::Sum => match (current, next) {
                (Value::Integer(a), Value::Integer(b)) => a
                    .checked_add(b)
                    .filter(|sum| i32::try_from(*sum).is_ok())
                    .map(Value::Integer)
                    .ok_or_else(|| Error::Overflow(name.to_string())),
                (Value::Money(a), Value::Money(b)) => a.add(&b).map(Value::Money),
                (Value::Null, other) | (other, Value::Null) => Ok(other),
                (a, b) => match (a.as_decimal()?, b.as_decimal()?) {
                    (Some(a), Some(b)) => a
                        .checked_add(b)
                        .map(Value::Decimal)
                        .ok_or_else(|| Error::Overflow(name.to_string())),
                    _ => Ok(Value::Null),
                },
            },
        }
    }
}

/// What an aggregate produces for an empty (or null) list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EmptyListPolicy {
    /// Fail at run time, as there is no sensible result.
    Throw,

    /// Produce the null value of the element datatype.
    NullValue,

    /// Produce zero, or the null value for datatypes without a zero.
    Zero,
}

/// A function aggregating a list, such as `MAX(values)`.
#[derive(Debug)]
pub struct ListAggregate {
    name:        String,
    aggregate:   Aggregate,
    on_empty:    EmptyListPolicy,
    parameters:  [Datatype; 1],
    return_type: Datatype,
}

impl ListAggregate {
    #[must_use]
    pub fn new(name: &str, aggregate: Aggregate, on_empty: EmptyListPolicy) -> Self {
        Self {
            name: name.to_string(),
            aggregate,
            on_empty,
            parameters: [Datatype::make_list(Datatype::Any)],
            return_type: Datatype::Any,
        }
    }

    #[must_use]
    pub fn aggregate(&self) -> Aggregate {
        self.aggregate
    }

    #[must_use]
    pub fn on_empty(&self) -> EmptyListPolicy {
        self.on_empty
    }

    /// Gets the code producing the result for an empty list.
    fn fallback(&self, env: &Environment, element: &Datatype) -> CodeFragment {
        let null = || {
            env.datatypes()
                .helper(element)
                .and_then(|helper| helper.null_expression())
                .unwrap_or_else(|| CodeFragment::from_source("null"))
        };
        match self.on_empty {
            EmptyListPolicy::Throw => CodeFragment::from_source(format!(
                "{{ throw new IllegalArgumentException(\"{} cannot be applied to an empty list\"); }}",
                self.name
            )),
            EmptyListPolicy::NullValue => null(),
            EmptyListPolicy::Zero => match element {
                Datatype::Decimal => {
                    CodeFragment::with_import("Decimal.ZERO", "org.faktorips.values.Decimal")
                }
                Datatype::Integer | Datatype::int => CodeFragment::from_source("0"),
                _ => null(),
            },
        }
    }

    fn empty_value(&self, element: &Datatype) -> Result<Value> {
        match (self.on_empty, element) {
            (EmptyListPolicy::Throw, _) => Err(Error::EmptyList(self.name.clone())),
            (EmptyListPolicy::Zero, Datatype::Decimal) => Ok(Value::Decimal(0.into())),
            (EmptyListPolicy::Zero, Datatype::Integer | Datatype::int) => Ok(Value::Integer(0)),
            _ => Ok(Value::Null),
        }
    }
}

impl FlFunction for ListAggregate {
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
        match self.aggregate {
            Aggregate::Min => "The smallest element of the list.",
            Aggregate::Max => "The largest element of the list.",
            Aggregate::Sum => "The sum of the elements of the list.",
        }
    }

    fn result_type(&self, _env: &Environment, args: &[Datatype]) -> Datatype {
        args.first()
            .and_then(Datatype::element_type)
            .cloned()
            .unwrap_or(Datatype::Any)
    }

    /// # Panics
    ///
    /// If not given exactly one argument.
    fn compile(&self, env: &Environment, args: Vec<CompilationResult>) -> CompilationResult {
        check_arity(&self.name, 1, args.len());
        let (mut result, code) = match split_arguments(&self.name, args) {
            Ok(split) => split,
            Err(failed) => return failed,
        };
        let [(list, datatype)] = unpack(code);

        let element = match datatype.element_type() {
            Some(element) if element.is_value_datatype() && self.aggregate.accepts(element) => {
                element.clone()
            }
            _ => {
                result.add_message(Message::new_error(
                    INVALID_LIST_ELEMENT,
                    format!("{} cannot be applied to a {datatype}", self.name),
                ));
                return result;
            }
        };

        let mut fragment = CodeFragment::with_import("FormulaEvaluatorUtil.reduce(", EVALUATOR_UTIL);
        fragment.indent().new_line();
        fragment.append_fragment(list).append_line(",");
        fragment.append("(current, next) -> ");
        fragment.append(self.aggregate.combine(&element)).append_line(",");
        fragment.append("() -> ");
        fragment.append_fragment(self.fallback(env, &element));
        fragment.append(")").outdent();

        result.set_code(fragment, element);
        result
    }

    fn evaluate(&self, _env: &Environment, args: Vec<TypedValue>) -> Result<Value> {
        check_arity(&self.name, 1, args.len());
        let [list] = unpack(args);
        let element = list.datatype.element_type().cloned().unwrap_or(Datatype::Any);

        let items = match list.value {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            other => Err(other.mismatch(&list.datatype))?,
        };

        let mut items = items.into_iter();
        let Some(first) = items.next() else {
            return self.empty_value(&element);
        };
        items.try_fold(first, |current, next| self.aggregate.reduce(&self.name, current, next))
    }
}

/// `COUNT(list)`, the number of elements of a list, counting a null list as
/// empty.
#[derive(Debug)]
pub struct Count {
    parameters:  [Datatype; 1],
    return_type: Datatype,
}

impl Count {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parameters:  [Datatype::make_list(Datatype::Any)],
            return_type: Datatype::int,
        }
    }
}

impl Default for Count {
    fn default() -> Self {
        Self::new()
    }
}

impl FlFunction for Count {
    fn name(&self) -> &str {
        "COUNT"
    }

    fn return_type(&self) -> &Datatype {
        &self.return_type
    }

    fn parameter_types(&self) -> &[Datatype] {
        &self.parameters
    }

    fn description(&self) -> &str {
        "The number of elements of the list."
    }

    fn compile(&self, _env: &Environment, args: Vec<CompilationResult>) -> CompilationResult {
        check_arity("COUNT", 1, args.len());
        let (mut result, code) = match split_arguments("COUNT", args) {
            Ok(split) => split,
            Err(failed) => return failed,
        };
        let [(list, _)] = unpack(code);

        let mut fragment = CodeFragment::static_call("FormulaEvaluatorUtil.count", vec![list]);
        fragment.add_import(EVALUATOR_UTIL);
        result.set_code(fragment, Datatype::int);
        result
    }

    fn evaluate(&self, _env: &Environment, args: Vec<TypedValue>) -> Result<Value> {
        check_arity("COUNT", 1, args.len());
        let [list] = unpack(args);
        match list.value {
            Value::List(items) => i32::try_from(items.len())
                .map(Value::from)
                .map_err(|_| Error::Overflow("COUNT".to_string())),
            Value::Null => Ok(Value::Integer(0)),
            other => Err(other.mismatch(&list.datatype)),
        }
    }
}

/// Gets the built-in list functions.
#[must_use]
pub fn functions() -> Vec<Arc<dyn FlFunction>> {
    vec![
        Arc::new(ListAggregate::new("MIN", Aggregate::Min, EmptyListPolicy::Throw)),
        Arc::new(ListAggregate::new("MAX", Aggregate::Max, EmptyListPolicy::Throw)),
        Arc::new(ListAggregate::new("SUM", Aggregate::Sum, EmptyListPolicy::Zero)),
        Arc::new(Count::new()),
    ]
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;

    use crate::{
        datatype::Datatype,
        environment::Environment,
        eval::{
            value::{Money, Value},
            TypedValue,
        },
        function::{
            list::{Aggregate, Count, EmptyListPolicy, ListAggregate},
            FlFunction,
        },
        result::CompilationResult,
    };

    fn list(element: Datatype) -> CompilationResult {
        CompilationResult::new("xs".into(), Datatype::make_list(element))
    }

    #[test]
    fn reductions_are_generated_with_a_fallback() {
        let env = Environment::default();
        let max = ListAggregate::new("MAX", Aggregate::Max, EmptyListPolicy::Throw);

        let result = max.compile(&env, vec![list(Datatype::Decimal)]);
        assert_eq!(
            result.source(),
            "FormulaEvaluatorUtil.reduce(\n    xs,\n    (current, next) -> current.max(next),\n    () \
             -> { throw new IllegalArgumentException(\"MAX cannot be applied to an empty list\"); \
             })"
        );
        assert_eq!(result.datatype(), Some(&Datatype::Decimal));

        let sum = ListAggregate::new("SUM", Aggregate::Sum, EmptyListPolicy::Zero);
        let result = sum.compile(&env, vec![list(Datatype::Decimal)]);
        assert!(result.source().ends_with("() -> Decimal.ZERO)"));
    }

    #[test]
    fn elements_must_support_the_aggregate() {
        let env = Environment::default();
        let sum = ListAggregate::new("SUM", Aggregate::Sum, EmptyListPolicy::Zero);

        assert!(sum.compile(&env, vec![list(Datatype::String)]).failed());
        assert!(sum.compile(&env, vec![list(Datatype::Money)]).successful());
    }

    #[test]
    fn money_is_summed_per_currency() -> anyhow::Result<()> {
        let env = Environment::default();
        let sum = ListAggregate::new("SUM", Aggregate::Sum, EmptyListPolicy::Zero);
        let eur = |cents| Value::Money(Money::new(Decimal::new(cents, 2), "EUR"));

        let values = TypedValue::new(
            Datatype::make_list(Datatype::Money),
            Value::List(vec![eur(150), eur(225)]),
        );
        assert_eq!(sum.evaluate(&env, vec![values])?, eur(375));

        let mixed = TypedValue::new(
            Datatype::make_list(Datatype::Money),
            Value::List(vec![eur(150), Value::Money(Money::new(Decimal::ONE, "USD"))]),
        );
        assert!(sum.evaluate(&env, vec![mixed]).is_err());

        Ok(())
    }

    #[test]
    fn count_treats_null_as_empty() -> anyhow::Result<()> {
        let env = Environment::default();
        let count = Count::new();

        let result = count.compile(&env, vec![list(Datatype::Integer)]);
        assert_eq!(result.source(), "FormulaEvaluatorUtil.count(xs)");
        assert_eq!(
            result.fragment().unwrap().imports().collect::<Vec<_>>(),
            vec!["org.faktorips.runtime.formula.FormulaEvaluatorUtil"]
        );

        let null = TypedValue::new(Datatype::make_list(Datatype::Integer), Value::Null);
        assert_eq!(count.evaluate(&env, vec![null])?, Value::Integer(0));

        Ok(())
    }
}
