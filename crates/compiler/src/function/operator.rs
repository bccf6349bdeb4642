//! The operators of the formula language, and the functions implementing them
//! for the built-in datatypes.
//!
//! Each operator symbol is mapped to the name of an internal function by the
//! [`OperatorMap`]. Unary and binary operators are mapped separately, as `-`
//! and `+` are both.

use std::cmp::Ordering;

use bimap::{BiHashMap, BiMap};
use flc_errors::eval::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    constant::DIVISION_SCALE,
    datatype::Datatype,
    eval::value::{Money, Value},
    fragment::CodeFragment,
    function::{infix, method, prefix, unpack, TemplateFunction},
};

/// A pairing of an operator symbol with the name of the internal function that
/// implements it.
pub type OperatorPair<'a> = (&'a str, &'a str);

pub const ADD: OperatorPair = ("+", "__FL_ADD");
pub const SUBTRACT: OperatorPair = ("-", "__FL_SUBTRACT");
pub const MULTIPLY: OperatorPair = ("*", "__FL_MULTIPLY");
pub const DIVIDE: OperatorPair = ("/", "__FL_DIVIDE");
pub const LESS: OperatorPair = ("<", "__FL_LESS");
pub const LESS_EQUAL: OperatorPair = ("<=", "__FL_LESS_EQUAL");
pub const GREATER: OperatorPair = (">", "__FL_GREATER");
pub const GREATER_EQUAL: OperatorPair = (">=", "__FL_GREATER_EQUAL");
pub const EQUAL: OperatorPair = ("=", "__FL_EQUAL");
pub const NOT_EQUAL: OperatorPair = ("<>", "__FL_NOT_EQUAL");
pub const AND: OperatorPair = ("&&", "__FL_AND");
pub const OR: OperatorPair = ("||", "__FL_OR");

pub const NEGATE: OperatorPair = ("-", "__FL_NEGATE");
pub const PLUS: OperatorPair = ("+", "__FL_PLUS");
pub const NOT: OperatorPair = ("!", "__FL_NOT");

pub const BINARY_OPERATORS: [OperatorPair; 12] = [
    ADD,
    SUBTRACT,
    MULTIPLY,
    DIVIDE,
    LESS,
    LESS_EQUAL,
    GREATER,
    GREATER_EQUAL,
    EQUAL,
    NOT_EQUAL,
    AND,
    OR,
];

pub const UNARY_OPERATORS: [OperatorPair; 3] = [NEGATE, PLUS, NOT];

/// A bidirectional mapping from operator symbols to the names of the internal
/// functions that implement them.
///
/// The reverse direction is used to name the operator, rather than its
/// internal function, in messages about calls that fail to resolve.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorMap {
    binary: BiMap<String, String>,
    unary:  BiMap<String, String>,
}

impl OperatorMap {
    /// Constructs a new operator map from the provided mappings.
    #[must_use]
    pub fn new(binary: BiHashMap<String, String>, unary: BiHashMap<String, String>) -> Self {
        Self { binary, unary }
    }

    /// Gets the internal function name for the binary operator `symbol`.
    pub fn binary(&self, symbol: impl Into<String>) -> Option<&String> {
        self.binary.get_by_left(&symbol.into())
    }

    /// Gets the internal function name for the unary operator `symbol`.
    pub fn unary(&self, symbol: impl Into<String>) -> Option<&String> {
        self.unary.get_by_left(&symbol.into())
    }

    /// Gets the operator symbol implemented by the internal function
    /// `function_name`, if it implements one.
    pub fn symbol(&self, function_name: impl Into<String>) -> Option<&String> {
        let function_name = function_name.into();
        self.binary
            .get_by_right(&function_name)
            .or_else(|| self.unary.get_by_right(&function_name))
    }
}

impl Default for OperatorMap {
    fn default() -> Self {
        let collect = |pairs: &[OperatorPair]| {
            pairs
                .iter()
                .map(|(symbol, name)| ((*symbol).to_string(), (*name).to_string()))
                .collect::<BiHashMap<_, _>>()
        };
        Self::new(collect(&BINARY_OPERATORS), collect(&UNARY_OPERATORS))
    }
}

/// Gets the functions implementing the operators for the built-in datatypes.
#[must_use]
pub fn functions() -> Vec<TemplateFunction> {
    use Datatype::{boolean, int, Decimal as Dec, LocalDate, Money as Mon, String as Str};

    let mut functions = vec![
        // Arithmetic.
        with(binary(ADD, int, int, int), infix("+"), int_op("+", i64::checked_add)),
        with(binary(SUBTRACT, int, int, int), infix("-"), int_op("-", i64::checked_sub)),
        with(binary(MULTIPLY, int, int, int), infix("*"), int_op("*", i64::checked_mul)),
        with(binary(ADD, Dec, Dec, Dec), method("add", &[]), decimal_op("+", add_decimals)),
        with(
            binary(SUBTRACT, Dec, Dec, Dec),
            method("subtract", &[]),
            decimal_op("-", subtract_decimals),
        ),
        with(
            binary(MULTIPLY, Dec, Dec, Dec),
            method("multiply", &[]),
            decimal_op("*", multiply_decimals),
        ),
        with(
            binary(DIVIDE, Dec, Dec, Dec),
            method("divide", &["10", "RoundingMode.HALF_UP"]),
            decimal_op("/", divide_decimals),
        ),
        with(binary(ADD, Mon, Mon, Mon), method("add", &[]), money_op(Money::add)),
        with(binary(SUBTRACT, Mon, Mon, Mon), method("subtract", &[]), money_op(Money::subtract)),
        with(
            binary(MULTIPLY, Mon, Dec, Mon),
            method("multiply", &["RoundingMode.HALF_UP"]),
            scale_money(false, Money::multiply),
        ),
        with(
            binary(MULTIPLY, Dec, Mon, Mon),
            |args| method("multiply", &["RoundingMode.HALF_UP"])(args.into_iter().rev().collect()),
            scale_money(true, Money::multiply),
        ),
        with(
            binary(DIVIDE, Mon, Dec, Mon),
            method("divide", &["RoundingMode.HALF_UP"]),
            scale_money(false, Money::divide),
        ),
        with(binary(ADD, Str, Str, Str), infix("+"), concatenate),
        // Logic.
        with(binary(AND, boolean, boolean, boolean), infix("&&"), logical("&&", |a, b| a && b)),
        with(binary(OR, boolean, boolean, boolean), infix("||"), logical("||", |a, b| a || b)),
        // Unary operators.
        with((NEGATE.1, vec![int], int), negate_int, negate),
        with((NEGATE.1, vec![Dec], Dec), method("negate", &[]), negate),
        with((NEGATE.1, vec![Mon], Mon), method("negate", &[]), negate),
        with((PLUS.1, vec![int], int), identity, pass_through),
        with((PLUS.1, vec![Dec], Dec), identity, pass_through),
        with((PLUS.1, vec![Mon], Mon), identity, pass_through),
        with((NOT.1, vec![boolean], boolean), prefix("!"), not),
    ];

    // Comparisons.
    functions.extend(comparisons(int, primitive_comparison));
    functions.extend(comparisons(Dec, decimal_comparison));
    functions.extend(comparisons(Mon, decimal_comparison));
    functions.extend(comparisons(LocalDate, date_comparison));
    functions.extend(comparisons(Str, object_comparison));

    // Equality.
    for datatype in [int, boolean] {
        functions.extend(equality(datatype, primitive_equality));
    }
    for datatype in [Dec, Mon] {
        functions.extend(equality(datatype, magnitude_equality));
    }
    for datatype in [Str, LocalDate] {
        functions.extend(object_equality(datatype));
    }

    functions
}

/// Gets the equality operators for a datatype represented by an ordinary Java
/// class, which compare with `Objects.equals`.
#[must_use]
pub fn object_equality(datatype: Datatype) -> Vec<TemplateFunction> {
    equality(datatype, objects_equals)
}

/// Gets the ordering operators for a datatype represented by a Java class
/// implementing `Comparable`.
#[must_use]
pub fn object_comparisons(datatype: Datatype) -> Vec<TemplateFunction> {
    comparisons(datatype, object_comparison)
}

type BoxedTemplate = Box<dyn Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync>;

fn binary(
    (_, name): OperatorPair<'static>,
    lhs: Datatype,
    rhs: Datatype,
    result: Datatype,
) -> (&'static str, Vec<Datatype>, Datatype) {
    (name, vec![lhs, rhs], result)
}

fn with(
    (name, parameters, result): (&str, Vec<Datatype>, Datatype),
    template: impl Fn(Vec<CodeFragment>) -> CodeFragment + Send + Sync + 'static,
    evaluation: impl Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
) -> TemplateFunction {
    TemplateFunction::new(name, parameters, result, template, evaluation)
}

/// Builds the four ordering operators for `datatype`, with `template` giving
/// the code for each operator symbol.
fn comparisons(
    datatype: Datatype,
    template: fn(&'static str) -> BoxedTemplate,
) -> Vec<TemplateFunction> {
    let ops: [(OperatorPair, fn(Ordering) -> bool); 4] = [
        (LESS, Ordering::is_lt),
        (LESS_EQUAL, Ordering::is_le),
        (GREATER, Ordering::is_gt),
        (GREATER_EQUAL, Ordering::is_ge),
    ];
    ops.into_iter()
        .map(|((symbol, name), holds)| {
            with(
                (name, vec![datatype.clone(), datatype.clone()], Datatype::boolean),
                template(symbol),
                compare(holds),
            )
        })
        .collect()
}

/// Builds `=` and `<>` for `datatype`, with `template` giving the code for
/// equality when passed `false` and for inequality when passed `true`.
fn equality(datatype: Datatype, template: fn(bool) -> BoxedTemplate) -> Vec<TemplateFunction> {
    [(EQUAL, false), (NOT_EQUAL, true)]
        .into_iter()
        .map(|((_, name), negated)| {
            with(
                (name, vec![datatype.clone(), datatype.clone()], Datatype::boolean),
                template(negated),
                move |args| {
                    let [lhs, rhs] = unpack(args);
                    Ok(Value::Boolean(lhs.equals(&rhs) != negated))
                },
            )
        })
        .collect()
}

fn primitive_comparison(op: &'static str) -> BoxedTemplate {
    Box::new(infix(op))
}

/// Builds a template producing `(lhs.compareTo(rhs) op 0)`.
fn object_comparison(op: &'static str) -> BoxedTemplate {
    Box::new(move |args| CodeFragment::infix(method("compareTo", &[])(args), op, "0".into()))
}

fn decimal_comparison(op: &'static str) -> BoxedTemplate {
    let name = match op {
        "<" => "lessThan",
        "<=" => "lessThanOrEqual",
        ">" => "greaterThan",
        _ => "greaterThanOrEqual",
    };
    Box::new(method(name, &[]))
}

fn date_comparison(op: &'static str) -> BoxedTemplate {
    let (name, negated) = match op {
        "<" => ("isBefore", false),
        "<=" => ("isAfter", true),
        ">" => ("isAfter", false),
        _ => ("isBefore", true),
    };
    Box::new(move |args| {
        let call = method(name, &[])(args);
        if negated {
            CodeFragment::prefix("!", call)
        } else {
            call
        }
    })
}

fn primitive_equality(negated: bool) -> BoxedTemplate {
    Box::new(infix(if negated { "!=" } else { "==" }))
}

/// Builds a template producing `(lhs.compareTo(rhs) == 0)`, which unlike
/// `equals` ignores the scale of the numbers compared.
fn magnitude_equality(negated: bool) -> BoxedTemplate {
    object_comparison(if negated { "!=" } else { "==" })
}

fn objects_equals(negated: bool) -> BoxedTemplate {
    Box::new(move |args| {
        let mut fragment = CodeFragment::static_call("Objects.equals", args);
        fragment.add_import("java.util.Objects");
        if negated {
            CodeFragment::prefix("!", fragment)
        } else {
            fragment
        }
    })
}

/// Builds `(-operand)`, parenthesised so that nested negations never read as
/// Java's decrement operator.
fn negate_int(args: Vec<CodeFragment>) -> CodeFragment {
    let [operand] = unpack(args);
    let mut fragment = CodeFragment::from_source("(-");
    fragment.append_fragment(operand);
    fragment.append(")");
    fragment
}

fn identity(args: Vec<CodeFragment>) -> CodeFragment {
    let [operand] = unpack(args);
    operand
}

fn pass_through(args: Vec<Value>) -> Result<Value> {
    let [operand] = unpack(args);
    Ok(operand)
}

/// Checks that an integer result fits the 32 bits of a Java `int`.
fn to_int(value: Option<i64>, context: impl FnOnce() -> String) -> Result<Value> {
    value
        .filter(|v| i32::try_from(*v).is_ok())
        .map(Value::Integer)
        .ok_or_else(|| Error::Overflow(context()))
}

/// Builds the evaluation of a primitive integer operator, for which null
/// operands are an error.
fn int_op(
    symbol: &'static str,
    op: fn(i64, i64) -> Option<i64>,
) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [lhs, rhs] = unpack(args);
        let (lhs, rhs) = (lhs.as_int(symbol)?, rhs.as_int(symbol)?);
        to_int(op(lhs, rhs), || format!("{lhs} {symbol} {rhs}"))
    }
}

/// Builds the evaluation of a decimal operator, which propagates nulls.
fn decimal_op(
    symbol: &'static str,
    op: fn(Decimal, Decimal) -> Option<Decimal>,
) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [lhs, rhs] = unpack(args);
        match (lhs.as_decimal()?, rhs.as_decimal()?) {
            (Some(lhs), Some(rhs)) => {
                if symbol == "/" && rhs.is_zero() {
                    Err(Error::DivisionByZero)?;
                }
                op(lhs, rhs)
                    .map(Value::Decimal)
                    .ok_or_else(|| Error::Overflow(format!("{lhs} {symbol} {rhs}")))
            }
            _ => Ok(Value::Null),
        }
    }
}

fn add_decimals(lhs: Decimal, rhs: Decimal) -> Option<Decimal> {
    lhs.checked_add(rhs)
}

fn subtract_decimals(lhs: Decimal, rhs: Decimal) -> Option<Decimal> {
    lhs.checked_sub(rhs)
}

fn multiply_decimals(lhs: Decimal, rhs: Decimal) -> Option<Decimal> {
    lhs.checked_mul(rhs)
}

fn divide_decimals(lhs: Decimal, rhs: Decimal) -> Option<Decimal> {
    lhs.checked_div(rhs)
        .map(|q| q.round_dp_with_strategy(DIVISION_SCALE, RoundingStrategy::MidpointAwayFromZero))
}

/// Builds the evaluation of an operator combining two amounts of money, which
/// propagates nulls.
fn money_op(
    op: fn(&Money, &Money) -> Result<Money>,
) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [lhs, rhs] = unpack(args);
        match (lhs.as_money()?, rhs.as_money()?) {
            (Some(lhs), Some(rhs)) => op(lhs, rhs).map(Value::Money),
            _ => Ok(Value::Null),
        }
    }
}

/// Builds the evaluation of an operator scaling money by a decimal, with the
/// money on the right-hand side if `swapped`.
fn scale_money(
    swapped: bool,
    op: fn(&Money, Decimal) -> Result<Money>,
) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [mut money, mut factor] = unpack(args);
        if swapped {
            std::mem::swap(&mut money, &mut factor);
        }
        match (money.as_money()?, factor.as_decimal()?) {
            (Some(money), Some(factor)) => op(money, factor).map(Value::Money),
            _ => Ok(Value::Null),
        }
    }
}

/// Concatenates strings the way Java does, where null reads as `null`.
fn concatenate(args: Vec<Value>) -> Result<Value> {
    let [lhs, rhs] = unpack(args);
    Ok(Value::String(format!("{lhs}{rhs}")))
}

fn logical(
    symbol: &'static str,
    op: fn(bool, bool) -> bool,
) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [lhs, rhs] = unpack(args);
        Ok(Value::Boolean(op(lhs.as_bool(symbol)?, rhs.as_bool(symbol)?)))
    }
}

/// Builds the evaluation of an ordering operator. Comparisons involving null
/// are false.
fn compare(holds: fn(Ordering) -> bool) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [lhs, rhs] = unpack(args);
        Ok(Value::Boolean(lhs.compare(&rhs)?.is_some_and(holds)))
    }
}

fn negate(args: Vec<Value>) -> Result<Value> {
    let [operand] = unpack(args);
    match operand {
        Value::Integer(i) => to_int(i.checked_neg(), || format!("-{i}")),
        Value::Decimal(d) => Ok(Value::Decimal(-d)),
        Value::Money(m) => Ok(Value::Money(m.negate())),
        Value::Null => Ok(Value::Null),
        other => Err(other.mismatch(&Datatype::Decimal)),
    }
}

fn not(args: Vec<Value>) -> Result<Value> {
    let [operand] = unpack(args);
    Ok(Value::Boolean(!operand.as_bool("!")?))
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;

    use crate::{
        datatype::Datatype,
        environment::Environment,
        eval::{value::Value, TypedValue},
        function::{
            operator::{OperatorMap, ADD, EQUAL, NEGATE, NOT_EQUAL},
            FlFunction,
        },
        result::CompilationResult,
    };

    #[test]
    fn symbols_map_both_ways() {
        let map = OperatorMap::default();

        assert_eq!(map.binary("+").map(String::as_str), Some(ADD.1));
        assert_eq!(map.unary("-").map(String::as_str), Some(NEGATE.1));
        assert_eq!(map.symbol(NEGATE.1).map(String::as_str), Some("-"));
        assert_eq!(map.binary("!"), None);
    }

    #[test]
    fn decimals_are_equal_regardless_of_scale() -> anyhow::Result<()> {
        let env = Environment::default();
        let decimals = [Datatype::Decimal, Datatype::Decimal];
        let find = |name: &str| {
            env.functions()
                .overloads(name)
                .into_iter()
                .find(|f| f.parameter_types() == decimals)
                .expect("decimal equality should exist")
        };
        let args = || {
            vec![
                CompilationResult::new("a".into(), Datatype::Decimal),
                CompilationResult::new("b".into(), Datatype::Decimal),
            ]
        };

        let equal = find(EQUAL.1);
        assert_eq!(equal.compile(&env, args()).source(), "(a.compareTo(b) == 0)");
        let not_equal = find(NOT_EQUAL.1);
        assert_eq!(not_equal.compile(&env, args()).source(), "(a.compareTo(b) != 0)");

        let values = vec![
            TypedValue::new(Datatype::Decimal, Value::Decimal(Decimal::new(10, 1))),
            TypedValue::new(Datatype::Decimal, Value::Decimal(Decimal::new(100, 2))),
        ];
        assert_eq!(equal.evaluate(&env, values)?, Value::Boolean(true));

        Ok(())
    }
}
