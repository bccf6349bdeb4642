//! The compiler's representation of the value types that formulas compute
//! with.
//!
//! A [`Datatype`] is a pure descriptor: it knows its name, its qualified name
//! in the target language, and a handful of structural properties. Knowledge
//! about how to _generate code_ for values of a datatype lives in the
//! [`helper`] module instead.

pub mod helper;

use std::{
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
};

use chumsky::{
    error::Simple,
    prelude::{end, just, recursive},
    text::{self, TextParser},
    Parser,
};
use flc_errors::compile::Error;

/// A representation of the datatypes known to formulas.
///
/// The Java primitive types are spelled in lower case to match the target
/// language convention, which keeps `int` and `Integer` (and `boolean` and
/// `Boolean`) visibly apart wherever they are matched on.
///
/// # Value Semantics
///
/// It is intended that this type is used as having value semantics, and it is
/// cheap to clone for every variant except deeply nested lists.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Datatype {
    /// The primitive Java `boolean`, which can never be null.
    #[allow(non_camel_case_types)] // To better match the Java convention
    boolean,

    /// The boxed `java.lang.Boolean`, which may be null.
    Boolean,

    /// The primitive Java `int`, which can never be null.
    #[allow(non_camel_case_types)] // To better match the Java convention
    int,

    /// The boxed `java.lang.Integer`, which may be null.
    Integer,

    /// An arbitrary-precision decimal number with a dedicated null object.
    Decimal,

    /// An amount of money in a given currency, with a dedicated null object.
    Money,

    /// A `java.lang.String`.
    String,

    /// A calendar date without a time component.
    LocalDate,

    /// The absence of a value. No expression can produce it, but functions
    /// and list element types may mention it.
    #[allow(non_camel_case_types)] // To better match the Java convention
    void,

    /// The universal datatype that every other datatype is acceptable as.
    ///
    /// It is only ever used for the parameters of truly generic functions and
    /// never as the datatype of a value.
    Any,

    /// A list whose elements all have the contained datatype.
    List(Box<Datatype>),

    /// A value datatype defined outside of the formula language, such as an
    /// enumeration from the product model.
    Value(ValueDatatype),
}

/// Additional utility constructors for creating the compound types without
/// having to manage boxing manually.
impl Datatype {
    /// Builds a list datatype with elements of type `element`.
    #[must_use]
    pub fn make_list(element: Datatype) -> Self {
        Self::List(Box::new(element))
    }

    /// Builds an externally defined value datatype.
    #[must_use]
    pub fn make_value(name: &str, qualified_name: &str, comparable: bool) -> Self {
        Self::Value(ValueDatatype::new(name, qualified_name, comparable))
    }
}

/// Operations for working with datatypes, such as asserting properties on
/// them.
impl Datatype {
    /// Gets the unqualified name of the datatype, as used in messages and on
    /// the command line.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::boolean => "boolean".to_string(),
            Self::Boolean => "Boolean".to_string(),
            Self::int => "int".to_string(),
            Self::Integer => "Integer".to_string(),
            Self::Decimal => "Decimal".to_string(),
            Self::Money => "Money".to_string(),
            Self::String => "String".to_string(),
            Self::LocalDate => "LocalDate".to_string(),
            Self::void => "void".to_string(),
            Self::Any => "any".to_string(),
            Self::List(element) => format!("List<{}>", element.name()),
            Self::Value(value) => value.name.clone(),
        }
    }

    /// Gets the fully qualified name of the datatype in the target language.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match self {
            Self::boolean => "boolean".to_string(),
            Self::Boolean => "java.lang.Boolean".to_string(),
            Self::int => "int".to_string(),
            Self::Integer => "java.lang.Integer".to_string(),
            Self::Decimal => "org.faktorips.values.Decimal".to_string(),
            Self::Money => "org.faktorips.values.Money".to_string(),
            Self::String => "java.lang.String".to_string(),
            Self::LocalDate => "java.time.LocalDate".to_string(),
            Self::void => "void".to_string(),
            Self::Any => "java.lang.Object".to_string(),
            Self::List(element) => format!("java.util.List<{}>", element.qualified_name()),
            Self::Value(value) => value.qualified_name.clone(),
        }
    }

    /// Returns `true` if values of the datatype are Java primitives.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::boolean | Self::int | Self::void)
    }

    /// Returns `true` if the datatype describes a single value, and `false`
    /// for `void`, `any` and lists.
    #[must_use]
    pub fn is_value_datatype(&self) -> bool {
        !matches!(self, Self::void | Self::Any | Self::List(_))
    }

    /// Returns `true` if the datatype can never be the datatype of a value.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Any)
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Gets the element datatype if `self` is a list, and [`None`] otherwise.
    #[must_use]
    pub fn element_type(&self) -> Option<&Datatype> {
        match self {
            Self::List(element) => Some(element),
            _ => None,
        }
    }

    /// Returns `true` if the values of the datatype have a natural order that
    /// the comparison operators and the `MIN`/`MAX` functions can use.
    #[must_use]
    pub fn is_comparable(&self) -> bool {
        match self {
            Self::int
            | Self::Integer
            | Self::Decimal
            | Self::Money
            | Self::String
            | Self::LocalDate => true,
            Self::Value(value) => value.comparable,
            _ => false,
        }
    }

    /// Returns `true` if values of the datatype can be added up.
    #[must_use]
    pub fn is_summable(&self) -> bool {
        matches!(self, Self::int | Self::Integer | Self::Decimal | Self::Money)
    }

    /// Returns `true` if null values of the datatype are represented by a
    /// dedicated null object rather than by Java's `null`.
    #[must_use]
    pub fn has_null_object(&self) -> bool {
        matches!(self, Self::Decimal | Self::Money)
    }

    /// Gets the boxed (object) counterpart of a primitive datatype, or the
    /// datatype itself if it is already an object type.
    #[must_use]
    pub fn boxed(&self) -> Datatype {
        match self {
            Self::boolean => Self::Boolean,
            Self::int => Self::Integer,
            other => other.clone(),
        }
    }

    /// Parses a datatype from the `name` syntax produced by [`Self::name`].
    ///
    /// External value datatypes cannot be named this way, as the formula
    /// language does not know their qualified names.
    fn parser() -> impl Parser<char, Datatype, Error = Simple<char>> {
        recursive(|datatype| {
            let list = just("List")
                .ignore_then(datatype.padded().delimited_by(just('<'), just('>')))
                .map(Datatype::make_list);

            let named = text::ident().try_map(|name: String, span| {
                let datatype = match name.as_str() {
                    "boolean" => Datatype::boolean,
                    "Boolean" => Datatype::Boolean,
                    "int" => Datatype::int,
                    "Integer" => Datatype::Integer,
                    "Decimal" => Datatype::Decimal,
                    "Money" => Datatype::Money,
                    "String" => Datatype::String,
                    "LocalDate" => Datatype::LocalDate,
                    "void" => Datatype::void,
                    "any" => Datatype::Any,
                    _ => Err(Simple::custom(span, format!("Unknown datatype {name}")))?,
                };
                Ok(datatype)
            });

            list.or(named)
        })
        .then_ignore(end())
    }
}

/// This matches the names used in messages so that they read naturally.
impl Display for Datatype {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Datatype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parser()
            .parse(s.trim())
            .map_err(|_| Error::UnknownDatatype(s.to_string()))
    }
}

impl TryFrom<&str> for Datatype {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A value datatype that is defined outside of the formula language.
///
/// Two value datatypes are the same datatype if and only if they have the same
/// qualified name.
#[derive(Clone, Debug)]
pub struct ValueDatatype {
    /// The name used to refer to the datatype in messages.
    pub name: String,

    /// The fully qualified name of the Java class representing the datatype.
    pub qualified_name: String,

    /// Whether the values of the datatype have a natural order.
    pub comparable: bool,
}

impl ValueDatatype {
    #[must_use]
    pub fn new(name: &str, qualified_name: &str, comparable: bool) -> Self {
        Self {
            name: name.to_string(),
            qualified_name: qualified_name.to_string(),
            comparable,
        }
    }
}

impl PartialEq for ValueDatatype {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name == other.qualified_name
    }
}

impl Eq for ValueDatatype {}

impl Hash for ValueDatatype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualified_name.hash(state);
    }
}

#[cfg(test)]
mod test {
    use crate::datatype::Datatype;

    #[test]
    fn names_round_trip_through_parsing() -> anyhow::Result<()> {
        let types = [
            Datatype::boolean,
            Datatype::Boolean,
            Datatype::int,
            Datatype::Integer,
            Datatype::Decimal,
            Datatype::Money,
            Datatype::String,
            Datatype::LocalDate,
            Datatype::make_list(Datatype::make_list(Datatype::Decimal)),
        ];

        for ty in types {
            let parsed: Datatype = ty.name().parse()?;
            assert_eq!(parsed, ty);
        }

        Ok(())
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!("Decimals".parse::<Datatype>().is_err());
        assert!("List<Decimal".parse::<Datatype>().is_err());
        assert!("".parse::<Datatype>().is_err());
    }

    #[test]
    fn value_datatypes_are_equal_by_qualified_name() {
        let a = Datatype::make_value("Gender", "org.example.Gender", false);
        let b = Datatype::make_value("Sex", "org.example.Gender", true);
        let c = Datatype::make_value("Gender", "org.example.other.Gender", false);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn boxing_only_changes_primitives() {
        assert_eq!(Datatype::int.boxed(), Datatype::Integer);
        assert_eq!(Datatype::boolean.boxed(), Datatype::Boolean);
        assert_eq!(Datatype::Decimal.boxed(), Datatype::Decimal);
    }

    #[test]
    fn list_properties() {
        let list = Datatype::make_list(Datatype::Money);

        assert!(list.is_list());
        assert!(!list.is_value_datatype());
        assert_eq!(list.element_type(), Some(&Datatype::Money));
        assert_eq!(list.qualified_name(), "java.util.List<org.faktorips.values.Money>");
    }
}
