//! The runtime representation of the values that formulas compute with.

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::NaiveDate;
use flc_errors::eval::{Error, Result};
use itertools::Itertools;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{constant::MONEY_SCALE, datatype::Datatype};

/// An amount of money in a single currency.
///
/// Amounts in different currencies can never be combined or compared, and any
/// attempt to do so is an error rather than a silent conversion.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Money {
    amount:   Decimal,
    currency: String,
}

impl Money {
    #[must_use]
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        Self { amount, currency }
    }

    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Checks that `self` and `other` are in the same currency.
    fn same_currency(&self, other: &Money) -> Result<()> {
        if self.currency != other.currency {
            Err(Error::CurrencyMismatch(
                self.currency.clone(),
                other.currency.clone(),
            ))?;
        }
        Ok(())
    }

    /// Rounds an amount to the precision used for money, rounding half away
    /// from zero.
    fn rounded(&self, amount: Decimal) -> Money {
        let amount =
            amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        Money::new(amount, self.currency.clone())
    }

    /// Adds `other` to `self`.
    ///
    /// # Errors
    ///
    /// - [`Error::CurrencyMismatch`] if the currencies differ.
    /// - [`Error::Overflow`] if the sum cannot be represented.
    pub fn add(&self, other: &Money) -> Result<Money> {
        self.same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| Error::Overflow(format!("{self} + {other}")))?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Subtracts `other` from `self`.
    ///
    /// # Errors
    ///
    /// - [`Error::CurrencyMismatch`] if the currencies differ.
    /// - [`Error::Overflow`] if the difference cannot be represented.
    pub fn subtract(&self, other: &Money) -> Result<Money> {
        self.same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| Error::Overflow(format!("{self} - {other}")))?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Multiplies the amount by `factor`, rounding the result to the precision
    /// of money.
    ///
    /// # Errors
    ///
    /// - [`Error::Overflow`] if the product cannot be represented.
    pub fn multiply(&self, factor: Decimal) -> Result<Money> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or_else(|| Error::Overflow(format!("{self} * {factor}")))?;
        Ok(self.rounded(amount))
    }

    /// Divides the amount by `divisor`, rounding the result to the precision
    /// of money.
    ///
    /// # Errors
    ///
    /// - [`Error::DivisionByZero`] if `divisor` is zero.
    pub fn divide(&self, divisor: Decimal) -> Result<Money> {
        if divisor.is_zero() {
            Err(Error::DivisionByZero)?;
        }
        let amount = self
            .amount
            .checked_div(divisor)
            .ok_or_else(|| Error::Overflow(format!("{self} / {divisor}")))?;
        Ok(self.rounded(amount))
    }

    #[must_use]
    pub fn negate(&self) -> Money {
        Money::new(-self.amount, self.currency.clone())
    }

    /// Compares two amounts of money.
    ///
    /// # Errors
    ///
    /// - [`Error::CurrencyMismatch`] if the currencies differ.
    pub fn compare(&self, other: &Money) -> Result<Ordering> {
        self.same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }
}

/// Money is written the way formulas write money literals, such as `10.50EUR`.
impl Display for Money {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.currency)
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| c.is_ascii_alphabetic()).unwrap_or(s.len());
        let (amount, currency) = s.split_at(split);
        let currency = currency.trim();
        let amount = parse_decimal(amount.trim());

        match amount {
            Some(amount) if is_currency_code(currency) => Ok(Money::new(amount, currency)),
            _ => Err(Error::TypeMismatch {
                expected: Datatype::Money.name(),
                found:    s.to_string(),
            }),
        }
    }
}

/// Returns `true` if `code` looks like an ISO 4217 currency code.
fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Parses a decimal number, allowing an exponent as in `1.5E3`.
#[must_use]
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.contains(['e', 'E']) {
        Decimal::from_scientific(&text.to_ascii_lowercase()).ok()
    } else {
        Decimal::from_str(text).ok()
    }
}

/// A value computed by a formula.
///
/// Values are self-describing, but a value alone does not determine its
/// [`Datatype`]: an [`Value::Integer`] may be an `int` or an `Integer`, and
/// [`Value::Null`] is a value of every nullable datatype.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Money(Money),
    String(String),
    Date(NaiveDate),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Parses a value of `datatype` from text, as it would be supplied on the
    /// command line.
    ///
    /// The text `null` is the null value of every datatype. List elements are
    /// separated by commas.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if `text` is not a valid value of `datatype`.
    /// - [`Error::InvalidDate`] if `text` is a malformed date.
    pub fn parse(datatype: &Datatype, text: &str) -> Result<Value> {
        let text = text.trim();
        if text == "null" {
            return Ok(Value::Null);
        }
        let mismatch = || Error::TypeMismatch {
            expected: datatype.name(),
            found:    text.to_string(),
        };

        let value = match datatype {
            Datatype::boolean | Datatype::Boolean => {
                Value::Boolean(text.parse().map_err(|_| mismatch())?)
            }
            Datatype::int | Datatype::Integer => {
                let value: i32 = text.parse().map_err(|_| mismatch())?;
                Value::Integer(i64::from(value))
            }
            Datatype::Decimal => Value::Decimal(parse_decimal(text).ok_or_else(mismatch)?),
            Datatype::Money => Value::Money(text.parse()?),
            Datatype::LocalDate => Value::Date(
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map_err(|_| Error::InvalidDate(text.to_string()))?,
            ),
            Datatype::List(element) => {
                if text.is_empty() {
                    Value::List(Vec::new())
                } else {
                    Value::List(
                        text.split(',')
                            .map(|item| Value::parse(element, item))
                            .collect::<Result<_>>()?,
                    )
                }
            }
            Datatype::String | Datatype::Value(_) => Value::String(text.to_string()),
            Datatype::void | Datatype::Any => Err(mismatch())?,
        };

        Ok(value)
    }

    /// Gets the boolean that this value holds.
    ///
    /// # Errors
    ///
    /// - [`Error::NullValue`] if the value is null, naming `context`.
    /// - [`Error::TypeMismatch`] if the value is not a boolean.
    pub fn as_bool(&self, context: &str) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            Self::Null => Err(Error::NullValue(context.to_string())),
            other => Err(other.mismatch(&Datatype::boolean)),
        }
    }

    /// Gets the integer that this value holds.
    ///
    /// # Errors
    ///
    /// - [`Error::NullValue`] if the value is null, naming `context`.
    /// - [`Error::TypeMismatch`] if the value is not an integer.
    pub fn as_int(&self, context: &str) -> Result<i64> {
        match self {
            Self::Integer(i) => Ok(*i),
            Self::Null => Err(Error::NullValue(context.to_string())),
            other => Err(other.mismatch(&Datatype::int)),
        }
    }

    /// Gets the decimal that this value holds, with null values giving
    /// [`None`].
    ///
    /// Integers are accepted as well, as every integer is a decimal.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if the value is not numeric.
    pub fn as_decimal(&self) -> Result<Option<Decimal>> {
        match self {
            Self::Decimal(d) => Ok(Some(*d)),
            Self::Integer(i) => Ok(Some(Decimal::from(*i))),
            Self::Null => Ok(None),
            other => Err(other.mismatch(&Datatype::Decimal)),
        }
    }

    /// Gets the money that this value holds, with null values giving [`None`].
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if the value is not money.
    pub fn as_money(&self) -> Result<Option<&Money>> {
        match self {
            Self::Money(m) => Ok(Some(m)),
            Self::Null => Ok(None),
            other => Err(other.mismatch(&Datatype::Money)),
        }
    }

    /// Compares two values of the same kind, with [`None`] meaning that at
    /// least one of them is null.
    ///
    /// # Errors
    ///
    /// - [`Error::CurrencyMismatch`] for money in different currencies.
    /// - [`Error::TypeMismatch`] if the values have no common order.
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>> {
        let ordering = match (self, other) {
            (Self::Null, _) | (_, Self::Null) => return Ok(None),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Decimal(_) | Self::Integer(_), Self::Decimal(_) | Self::Integer(_)) => {
                match (self.as_decimal()?, other.as_decimal()?) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => return Ok(None),
                }
            }
            (Self::Money(a), Self::Money(b)) => a.compare(b)?,
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (a, b) => Err(Error::TypeMismatch {
                expected: a.kind().to_string(),
                found:    b.to_string(),
            })?,
        };
        Ok(Some(ordering))
    }

    /// Returns `true` if the values are equal in the sense of the formula
    /// language: numbers compare by magnitude regardless of scale, and two
    /// nulls are equal.
    #[must_use]
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Money(a), Self::Money(b)) => a == b,
            _ => match self.compare(other) {
                Ok(Some(ordering)) => ordering == Ordering::Equal,
                _ => self == other,
            },
        }
    }

    /// Gets a short description of the kind of value, for use in messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Money(_) => "money",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::List(_) => "list",
        }
    }

    /// Builds the error for a value that does not have the shape of
    /// `expected`.
    #[must_use]
    pub fn mismatch(&self, expected: &Datatype) -> Error {
        Error::TypeMismatch {
            expected: expected.name(),
            found:    self.to_string(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Money(m) => write!(f, "{m}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::List(items) => write!(f, "[{}]", items.iter().join(", ")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<Money> for Value {
    fn from(value: Money) -> Self {
        Self::Money(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}
