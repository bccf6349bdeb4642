//! The named functions built into the formula language.

use chrono::NaiveDate;
use flc_errors::{
    diagnostic::Message,
    eval::{Error, Result},
};
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
    RoundingStrategy,
};
use tracing::trace;

use crate::{
    constant::{INTERNAL_ERROR, WRONG_ARGUMENT_TYPES},
    datatype::Datatype,
    environment::Environment,
    eval::{value::Value, TypedValue},
    fragment::CodeFragment,
    function::{
        check_arity,
        infix,
        method,
        prefix,
        split_arguments,
        static_method,
        unpack,
        FlFunction,
        TemplateFunction,
    },
    result::CompilationResult,
};

const DECIMAL: &str = "org.faktorips.values.Decimal";

/// Gets the built-in functions that have a fixed signature.
#[must_use]
pub fn functions() -> Vec<TemplateFunction> {
    use Datatype::{boolean, int, Decimal as Dec, LocalDate, Money as Mon};

    let mut functions = vec![
        TemplateFunction::new("AND", vec![boolean, boolean], boolean, infix("&&"), |args| {
            let [lhs, rhs] = unpack(args);
            Ok(Value::Boolean(lhs.as_bool("AND")? && rhs.as_bool("AND")?))
        })
        .with_description("Whether both arguments are true."),
        TemplateFunction::new("OR", vec![boolean, boolean], boolean, infix("||"), |args| {
            let [lhs, rhs] = unpack(args);
            Ok(Value::Boolean(lhs.as_bool("OR")? || rhs.as_bool("OR")?))
        })
        .with_description("Whether either argument is true."),
        TemplateFunction::new(
            "NOT",
            vec![boolean],
            boolean,
            prefix("!"),
            |args| {
                let [operand] = unpack(args);
                Ok(Value::Boolean(!operand.as_bool("NOT")?))
            },
        )
        .with_description("The negation of the argument."),
        TemplateFunction::new(
            "ROUND",
            vec![Dec, int],
            Dec,
            method("setScale", &["RoundingMode.HALF_UP"]),
            round("ROUND", RoundingStrategy::MidpointAwayFromZero),
        )
        .with_description("Rounds half away from zero to the given number of decimal places."),
        TemplateFunction::new(
            "ROUNDUP",
            vec![Dec, int],
            Dec,
            method("setScale", &["RoundingMode.UP"]),
            round("ROUNDUP", RoundingStrategy::AwayFromZero),
        )
        .with_description("Rounds away from zero to the given number of decimal places."),
        TemplateFunction::new(
            "ROUNDDOWN",
            vec![Dec, int],
            Dec,
            method("setScale", &["RoundingMode.DOWN"]),
            round("ROUNDDOWN", RoundingStrategy::ToZero),
        )
        .with_description("Rounds towards zero to the given number of decimal places."),
        TemplateFunction::new("ABS", vec![Dec], Dec, method("abs", &[]), |args| {
            let [operand] = unpack(args);
            Ok(operand.as_decimal()?.map_or(Value::Null, |d| Value::Decimal(d.abs())))
        })
        .with_description("The absolute value of the argument."),
        TemplateFunction::new("POWER", vec![Dec, Dec], Dec, power_template, power)
            .with_description("The first argument raised to the power of the second."),
        TemplateFunction::new("SQRT", vec![Dec], Dec, sqrt_template, sqrt)
            .with_description("The square root of the argument."),
        TemplateFunction::new(
            "DATE",
            vec![int, int, int],
            LocalDate,
            static_method("LocalDate.of", "java.time.LocalDate"),
            date,
        )
        .with_description("The date with the given year, month and day."),
        TemplateFunction::new("DAYS", vec![LocalDate, LocalDate], int, days_template, days)
            .with_description("The number of days from the first date to the second."),
    ];

    for datatype in [Dec, Mon] {
        functions.push(
            TemplateFunction::new(
                "MIN",
                vec![datatype.clone(), datatype.clone()],
                datatype.clone(),
                method("min", &[]),
                extreme("MIN", std::cmp::Ordering::is_le),
            )
            .with_description("The smaller of the two arguments."),
        );
        functions.push(
            TemplateFunction::new(
                "MAX",
                vec![datatype.clone(), datatype.clone()],
                datatype,
                method("max", &[]),
                extreme("MAX", std::cmp::Ordering::is_ge),
            )
            .with_description("The larger of the two arguments."),
        );
    }

    functions
}

/// Gets the functions constructing the null value of each nullable built-in
/// datatype.
#[must_use]
pub fn null_constructors() -> Vec<NullValue> {
    [
        ("DECIMALNULL", Datatype::Decimal),
        ("MONEYNULL", Datatype::Money),
        ("INTEGERNULL", Datatype::Integer),
        ("BOOLEANNULL", Datatype::Boolean),
        ("STRINGNULL", Datatype::String),
    ]
    .into_iter()
    .map(|(name, datatype)| NullValue::new(name, datatype))
    .collect()
}

fn round(
    name: &'static str,
    strategy: RoundingStrategy,
) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [value, scale] = unpack(args);
        let scale = scale.as_int(name)?;
        let scale = u32::try_from(scale).map_err(|_| {
            Error::InvalidArgument(name.to_string(), format!("negative scale {scale}"))
        })?;
        Ok(value
            .as_decimal()?
            .map_or(Value::Null, |d| Value::Decimal(d.round_dp_with_strategy(scale, strategy))))
    }
}

/// Builds the evaluation of `MIN` or `MAX` over two values, keeping the first
/// argument when `keep_first` holds for its ordering relative to the second.
fn extreme(
    name: &'static str,
    keep_first: fn(std::cmp::Ordering) -> bool,
) -> impl Fn(Vec<Value>) -> Result<Value> + Send + Sync {
    move |args| {
        let [lhs, rhs] = unpack(args);
        match lhs.compare(&rhs)? {
            Some(ordering) if keep_first(ordering) => Ok(lhs),
            Some(_) => Ok(rhs),
            None => {
                trace!(function = name, "null argument gives a null result");
                Ok(Value::Null)
            }
        }
    }
}

/// Wraps a `double` expression into a `Decimal`.
fn decimal_of_double(fragment: CodeFragment) -> CodeFragment {
    let mut fragment = CodeFragment::static_call("Decimal.valueOf", vec![fragment]);
    fragment.add_import(DECIMAL);
    fragment
}

fn double_value(fragment: CodeFragment) -> CodeFragment {
    CodeFragment::call(fragment, "doubleValue", vec![])
}

fn power_template(args: Vec<CodeFragment>) -> CodeFragment {
    let [base, exponent] = unpack(args);
    decimal_of_double(CodeFragment::static_call(
        "Math.pow",
        vec![double_value(base), double_value(exponent)],
    ))
}

fn sqrt_template(args: Vec<CodeFragment>) -> CodeFragment {
    let [operand] = unpack(args);
    decimal_of_double(CodeFragment::static_call("Math.sqrt", vec![double_value(operand)]))
}

/// Computes a decimal function through `f64`, as the generated code does.
fn through_double(name: &str, value: f64) -> Result<Value> {
    Decimal::from_f64(value)
        .map(Value::Decimal)
        .ok_or_else(|| Error::InvalidArgument(name.to_string(), format!("{value} is not a decimal")))
}

fn to_double(name: &str, value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| Error::InvalidArgument(name.to_string(), value.to_string()))
}

fn power(args: Vec<Value>) -> Result<Value> {
    let [base, exponent] = unpack(args);
    match (base.as_decimal()?, exponent.as_decimal()?) {
        (Some(base), Some(exponent)) => {
            through_double("POWER", to_double("POWER", base)?.powf(to_double("POWER", exponent)?))
        }
        _ => Ok(Value::Null),
    }
}

fn sqrt(args: Vec<Value>) -> Result<Value> {
    let [operand] = unpack(args);
    match operand.as_decimal()? {
        Some(d) if d.is_sign_negative() && !d.is_zero() => Err(Error::InvalidArgument(
            "SQRT".to_string(),
            format!("{d} is negative"),
        )),
        Some(d) => through_double("SQRT", to_double("SQRT", d)?.sqrt()),
        None => Ok(Value::Null),
    }
}

fn date(args: Vec<Value>) -> Result<Value> {
    let [year, month, day] = unpack(args);
    let (year, month, day) = (year.as_int("DATE")?, month.as_int("DATE")?, day.as_int("DATE")?);
    let date = i32::try_from(year).ok().zip(u32::try_from(month).ok()).zip(u32::try_from(day).ok());
    date.and_then(|((year, month), day)| NaiveDate::from_ymd_opt(year, month, day))
        .map(Value::Date)
        .ok_or_else(|| Error::InvalidDate(format!("{year}-{month}-{day}")))
}

fn days_template(args: Vec<CodeFragment>) -> CodeFragment {
    let mut fragment = CodeFragment::from_source("((int) ");
    fragment.append_fragment(CodeFragment::static_call("ChronoUnit.DAYS.between", args));
    fragment.append(")");
    fragment.add_import("java.time.temporal.ChronoUnit");
    fragment
}

fn days(args: Vec<Value>) -> Result<Value> {
    let [from, to] = unpack(args);
    match (from, to) {
        (Value::Date(from), Value::Date(to)) => {
            let days = (to - from).num_days();
            i32::try_from(days)
                .map(Value::from)
                .map_err(|_| Error::Overflow(format!("DAYS({from}; {to})")))
        }
        (Value::Null, _) | (_, Value::Null) => Err(Error::NullValue("DAYS".to_string())),
        (other, _) => Err(other.mismatch(&Datatype::LocalDate)),
    }
}

/// `ISEMPTY(value)` and its negation `EXISTS(value)`.
///
/// Values of primitive datatypes are never empty. Values of datatypes with a
/// null object are empty if they are that null object, lists are empty if
/// they are null or have no elements, and all other values are empty if they
/// are null.
#[derive(Debug)]
pub struct IsEmpty {
    name:        &'static str,
    negated:     bool,
    parameters:  [Datatype; 1],
    return_type: Datatype,
}

impl IsEmpty {
    #[must_use]
    pub fn is_empty() -> Self {
        Self {
            name:        "ISEMPTY",
            negated:     false,
            parameters:  [Datatype::Any],
            return_type: Datatype::boolean,
        }
    }

    #[must_use]
    pub fn exists() -> Self {
        Self {
            name:        "EXISTS",
            negated:     true,
            parameters:  [Datatype::Any],
            return_type: Datatype::boolean,
        }
    }

    /// Generates the emptiness check for `value` of datatype `datatype`.
    fn check(&self, value: CodeFragment, datatype: &Datatype) -> CodeFragment {
        let negated = self.negated;
        if datatype.is_primitive() {
            return CodeFragment::from_source(if negated { "true" } else { "false" });
        }
        if datatype.has_null_object() {
            let call = CodeFragment::call(value, "isNull", vec![]);
            return if negated { CodeFragment::prefix("!", call) } else { call };
        }
        if datatype.is_list() {
            let mut fragment = CodeFragment::from_source("(");
            fragment.append_fragment(value.clone());
            if negated {
                fragment.append(" != null && !");
            } else {
                fragment.append(" == null || ");
            }
            fragment.append_fragment(CodeFragment::call(value, "isEmpty", vec![]));
            fragment.append(")");
            return fragment;
        }
        CodeFragment::infix(value, if negated { "!=" } else { "==" }, "null".into())
    }
}

impl FlFunction for IsEmpty {
    fn name(&self) -> &str {
        self.name
    }

    fn return_type(&self) -> &Datatype {
        &self.return_type
    }

    fn parameter_types(&self) -> &[Datatype] {
        &self.parameters
    }

    fn description(&self) -> &str {
        if self.negated {
            "Whether the argument has a value."
        } else {
            "Whether the argument has no value."
        }
    }

    fn compile(&self, _env: &Environment, args: Vec<CompilationResult>) -> CompilationResult {
        check_arity(self.name, 1, args.len());
        let (mut result, code) = match split_arguments(self.name, args) {
            Ok(split) => split,
            Err(failed) => return failed,
        };
        let [(fragment, datatype)] = unpack(code);
        result.set_code(self.check(fragment, &datatype), Datatype::boolean);
        result
    }

    fn evaluate(&self, _env: &Environment, args: Vec<TypedValue>) -> Result<Value> {
        check_arity(self.name, 1, args.len());
        let [arg] = unpack(args);
        let empty = match arg.value {
            Value::Null => !arg.datatype.is_primitive(),
            Value::List(items) => items.is_empty(),
            _ => false,
        };
        Ok(Value::Boolean(empty != self.negated))
    }
}

/// `IF(condition; then; else)`, whose result has the common datatype of its
/// two branches.
#[derive(Debug)]
pub struct If {
    parameters:  [Datatype; 3],
    return_type: Datatype,
}

impl If {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parameters:  [Datatype::boolean, Datatype::Any, Datatype::Any],
            return_type: Datatype::Any,
        }
    }

    /// Gets the datatype that both `a` and `b` can be converted to, preferring
    /// the cheaper conversion and, between equally cheap ones, the nullable
    /// datatype.
    fn common_datatype(env: &Environment, a: &Datatype, b: &Datatype) -> Option<Datatype> {
        if a == b {
            return Some(a.clone());
        }
        let conversions = env.conversions();
        match (conversions.cost(b, a), conversions.cost(a, b)) {
            (Some(to_a), Some(to_b)) if to_a == to_b => {
                Some(if a.is_primitive() { b.clone() } else { a.clone() })
            }
            (Some(to_a), Some(to_b)) if to_a < to_b => Some(a.clone()),
            (Some(_), Some(_)) | (None, Some(_)) => Some(b.clone()),
            (Some(_), None) => Some(a.clone()),
            (None, None) => None,
        }
    }
}

impl Default for If {
    fn default() -> Self {
        Self::new()
    }
}

impl FlFunction for If {
    fn name(&self) -> &str {
        "IF"
    }

    fn return_type(&self) -> &Datatype {
        &self.return_type
    }

    fn parameter_types(&self) -> &[Datatype] {
        &self.parameters
    }

    fn description(&self) -> &str {
        "The second argument if the first is true, and the third otherwise."
    }

    fn result_type(&self, env: &Environment, args: &[Datatype]) -> Datatype {
        match args {
            [_, then, otherwise] => {
                Self::common_datatype(env, then, otherwise).unwrap_or_else(|| then.clone())
            }
            _ => Datatype::Any,
        }
    }

    fn compile(&self, env: &Environment, args: Vec<CompilationResult>) -> CompilationResult {
        check_arity("IF", 3, args.len());
        let (mut result, code) = match split_arguments("IF", args) {
            Ok(split) => split,
            Err(failed) => return failed,
        };
        let [(condition, _), (then, then_type), (otherwise, otherwise_type)] = unpack(code);

        let Some(datatype) = Self::common_datatype(env, &then_type, &otherwise_type) else {
            result.add_message(Message::new_error(
                WRONG_ARGUMENT_TYPES,
                format!(
                    "The branches of IF have the incompatible datatypes {then_type} and \
                     {otherwise_type}"
                ),
            ));
            return result;
        };

        let conversions = env.conversions();
        let branches = conversions
            .conversion_code(&then_type, &datatype, then)
            .zip(conversions.conversion_code(&otherwise_type, &datatype, otherwise));
        let Some((then, otherwise)) = branches else {
            result.add_message(Message::new_error(
                INTERNAL_ERROR,
                format!("The branches of IF cannot be converted to {datatype}"),
            ));
            return result;
        };

        let mut fragment = CodeFragment::from_source("(");
        fragment.append_fragment(condition);
        fragment.append(" ? ");
        fragment.append_fragment(then);
        fragment.append(" : ");
        fragment.append_fragment(otherwise);
        fragment.append(")");
        result.set_code(fragment, datatype);
        result
    }

    fn evaluate(&self, env: &Environment, args: Vec<TypedValue>) -> Result<Value> {
        check_arity("IF", 3, args.len());
        let [condition, then, otherwise] = unpack(args);
        let target = self.result_type(env, &[
            condition.datatype,
            then.datatype.clone(),
            otherwise.datatype.clone(),
        ]);
        let chosen = if condition.value.as_bool("IF")? { then } else { otherwise };
        env.conversions().convert_value(&chosen.datatype, &target, chosen.value)
    }
}

/// `TEXT(value)`, the string representation of any value.
#[derive(Debug)]
pub struct Text {
    parameters:  [Datatype; 1],
    return_type: Datatype,
}

impl Text {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parameters:  [Datatype::Any],
            return_type: Datatype::String,
        }
    }
}

impl Default for Text {
    fn default() -> Self {
        Self::new()
    }
}

impl FlFunction for Text {
    fn name(&self) -> &str {
        "TEXT"
    }

    fn return_type(&self) -> &Datatype {
        &self.return_type
    }

    fn parameter_types(&self) -> &[Datatype] {
        &self.parameters
    }

    fn description(&self) -> &str {
        "The textual representation of the argument."
    }

    fn compile(&self, env: &Environment, args: Vec<CompilationResult>) -> CompilationResult {
        check_arity("TEXT", 1, args.len());
        let (mut result, code) = match split_arguments("TEXT", args) {
            Ok(split) => split,
            Err(failed) => return failed,
        };
        let [(fragment, datatype)] = unpack(code);

        match env.datatypes().helper(&datatype) {
            Some(helper) => result.set_code(helper.to_string_expression(fragment), Datatype::String),
            None => result.add_message(Message::new_error(
                INTERNAL_ERROR,
                format!("No datatype helper is registered for {datatype}"),
            )),
        }
        result
    }

    fn evaluate(&self, _env: &Environment, args: Vec<TypedValue>) -> Result<Value> {
        check_arity("TEXT", 1, args.len());
        let [arg] = unpack(args);
        Ok(Value::String(arg.value.to_string()))
    }
}

/// A function without parameters that produces the null value of a datatype,
/// such as `DECIMALNULL()`.
#[derive(Debug)]
pub struct NullValue {
    name:       String,
    datatype:   Datatype,
    parameters: Vec<Datatype>,
}

impl NullValue {
    #[must_use]
    pub fn new(name: &str, datatype: Datatype) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            parameters: Vec::new(),
        }
    }
}

impl FlFunction for NullValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn return_type(&self) -> &Datatype {
        &self.datatype
    }

    fn parameter_types(&self) -> &[Datatype] {
        &self.parameters
    }

    fn compile(&self, env: &Environment, args: Vec<CompilationResult>) -> CompilationResult {
        check_arity(&self.name, 0, args.len());
        let null = env
            .datatypes()
            .helper(&self.datatype)
            .and_then(|helper| helper.null_expression());
        match null {
            Some(null) => CompilationResult::new(null, self.datatype.clone()),
            None => CompilationResult::error(
                INTERNAL_ERROR,
                format!("{} has no null value", self.datatype),
            ),
        }
    }

    fn evaluate(&self, _env: &Environment, args: Vec<TypedValue>) -> Result<Value> {
        check_arity(&self.name, 0, args.len());
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use flc_errors::eval::Error;
    use rust_decimal::Decimal;

    use crate::{
        datatype::Datatype,
        environment::Environment,
        eval::{value::Value, TypedValue},
        function::{builtin::If, FlFunction},
        result::CompilationResult,
    };

    fn call(env: &Environment, name: &str, args: Vec<TypedValue>) -> Result<Value, Error> {
        let types = args.iter().map(|a| a.datatype.clone()).collect::<Vec<_>>();
        let function = env
            .functions()
            .overloads(name)
            .into_iter()
            .find(|f| f.parameter_types() == types.as_slice())
            .expect("signature should exist");
        function.evaluate(env, args)
    }

    fn decimal(value: Decimal) -> TypedValue {
        TypedValue::new(Datatype::Decimal, Value::Decimal(value))
    }

    fn int(value: i32) -> TypedValue {
        TypedValue::new(Datatype::int, Value::from(value))
    }

    #[test]
    fn if_unifies_its_branches() {
        let env = Environment::default();
        let f = If::new();
        let result_type = |then: Datatype, otherwise: Datatype| {
            f.result_type(&env, &[Datatype::boolean, then, otherwise])
        };

        assert_eq!(result_type(Datatype::int, Datatype::Integer), Datatype::Integer);
        assert_eq!(result_type(Datatype::Integer, Datatype::int), Datatype::Integer);
        assert_eq!(result_type(Datatype::int, Datatype::Decimal), Datatype::Decimal);
        assert_eq!(result_type(Datatype::Money, Datatype::Money), Datatype::Money);
    }

    #[test]
    fn if_rejects_incompatible_branches() {
        let env = Environment::default();
        let args = vec![
            CompilationResult::new("c".into(), Datatype::boolean),
            CompilationResult::new("s".into(), Datatype::String),
            CompilationResult::new("d".into(), Datatype::Decimal),
        ];

        let result = If::new().compile(&env, args);
        assert!(result.failed());
    }

    #[test]
    fn rounding() -> anyhow::Result<()> {
        let env = Environment::default();

        let rounded = call(&env, "ROUND", vec![decimal(Decimal::new(2345, 3)), int(2)])?;
        assert_eq!(rounded, Value::Decimal(Decimal::new(235, 2)));
        let rounded = call(&env, "ROUNDDOWN", vec![decimal(Decimal::new(2349, 3)), int(2)])?;
        assert_eq!(rounded, Value::Decimal(Decimal::new(234, 2)));

        let negative = call(&env, "ROUND", vec![decimal(Decimal::ONE), int(-1)]);
        assert!(matches!(negative, Err(Error::InvalidArgument(..))));

        let round = env.functions().overloads("ROUND").remove(0);
        let code = round.compile(&env, vec![
            CompilationResult::new("x".into(), Datatype::Decimal),
            CompilationResult::new("2".into(), Datatype::int),
        ]);
        assert_eq!(code.source(), "x.setScale(2, RoundingMode.HALF_UP)");
        assert_eq!(
            code.fragment().unwrap().imports().collect::<Vec<_>>(),
            vec!["java.math.RoundingMode"]
        );

        Ok(())
    }

    #[test]
    fn dates() -> anyhow::Result<()> {
        let env = Environment::default();

        let date = call(&env, "DATE", vec![int(2024), int(2), int(29)])?;
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(date, Value::Date(expected));
        assert!(matches!(
            call(&env, "DATE", vec![int(2023), int(2), int(29)]),
            Err(Error::InvalidDate(_))
        ));

        let from = TypedValue::new(Datatype::LocalDate, Value::Date(expected));
        let to = TypedValue::new(
            Datatype::LocalDate,
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()),
        );
        assert_eq!(call(&env, "DAYS", vec![from, to])?, Value::Integer(10));

        Ok(())
    }

    #[test]
    fn text_uses_the_datatype_helper() -> anyhow::Result<()> {
        let env = Environment::default();
        let text = env.functions().overloads("TEXT").remove(0);

        let code = text.compile(&env, vec![CompilationResult::new("1".into(), Datatype::int)]);
        assert_eq!(code.source(), "String.valueOf(1)");
        assert_eq!(code.datatype(), Some(&Datatype::String));

        let value = text.evaluate(&env, vec![decimal(Decimal::new(15, 1))])?;
        assert_eq!(value, Value::String("1.5".to_string()));

        Ok(())
    }
}
