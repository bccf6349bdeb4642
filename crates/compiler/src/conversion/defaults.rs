//! The conversions between the datatypes built into the formula language.

use flc_errors::eval::Error;
use rust_decimal::Decimal;

use crate::{
    constant::{BOXING_COST, WIDENING_COST},
    conversion::ConversionRule,
    datatype::Datatype,
    eval::value::Value,
    fragment::CodeFragment,
};

const DECIMAL: &str = "org.faktorips.values.Decimal";

/// Gets every built-in conversion rule.
#[must_use]
pub fn rules() -> Vec<ConversionRule> {
    vec![
        ConversionRule::new(
            Datatype::int,
            Datatype::Integer,
            BOXING_COST,
            |f| CodeFragment::static_call("Integer.valueOf", vec![f]),
            Ok,
        ),
        ConversionRule::new(
            Datatype::Integer,
            Datatype::int,
            BOXING_COST,
            |f| CodeFragment::call(f, "intValue", vec![]),
            |v| unbox(v, "Integer.intValue()"),
        ),
        ConversionRule::new(
            Datatype::boolean,
            Datatype::Boolean,
            BOXING_COST,
            |f| CodeFragment::static_call("Boolean.valueOf", vec![f]),
            Ok,
        ),
        ConversionRule::new(
            Datatype::Boolean,
            Datatype::boolean,
            BOXING_COST,
            |f| CodeFragment::call(f, "booleanValue", vec![]),
            |v| unbox(v, "Boolean.booleanValue()"),
        ),
        ConversionRule::new(
            Datatype::int,
            Datatype::Decimal,
            WIDENING_COST,
            |f| {
                let mut fragment = CodeFragment::static_call("Decimal.valueOf", vec![f]);
                fragment.add_import(DECIMAL);
                fragment
            },
            widen,
        ),
        ConversionRule::new(
            Datatype::Integer,
            Datatype::Decimal,
            BOXING_COST + WIDENING_COST,
            |f| {
                let mut fragment = CodeFragment::from_source("(");
                fragment.append_fragment(f.clone());
                fragment.append(" == null ? Decimal.NULL : Decimal.valueOf(");
                fragment.append_fragment(f);
                fragment.append(".intValue()))");
                fragment.add_import(DECIMAL);
                fragment
            },
            widen,
        ),
    ]
}

/// Unboxing a null into a primitive is an error, as Java would raise a
/// `NullPointerException`.
fn unbox(value: Value, context: &str) -> Result<Value, Error> {
    match value {
        Value::Null => Err(Error::NullValue(context.to_string())),
        value => Ok(value),
    }
}

fn widen(value: Value) -> Result<Value, Error> {
    match value {
        Value::Integer(i) => Ok(Value::Decimal(Decimal::from(i))),
        Value::Null => Ok(Value::Null),
        other => Err(other.mismatch(&Datatype::Decimal)),
    }
}
