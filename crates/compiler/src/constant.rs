//! Useful constants for use within the compiler.
//!
//! The message codes are stable identifiers that callers can match on. They
//! are left undocumented where their names are self-describing.

/// A formula that does not follow the grammar.
pub const SYNTAX_ERROR: &str = "FLC-SyntaxError";

/// An identifier that is not a parameter of the formula.
pub const UNDEFINED_IDENTIFIER: &str = "FLC-UndefinedIdentifier";

/// A call of a function that does not exist under any signature.
pub const UNDEFINED_FUNCTION: &str = "FLC-UndefinedFunction";

/// A call of a function that exists, but not for the argument datatypes.
pub const WRONG_ARGUMENT_TYPES: &str = "FLC-WrongArgumentTypes";

/// A call that more than one function signature matches equally well.
pub const AMBIGUOUS_FUNCTION_CALL: &str = "FLC-AmbiguousFunctionCall";

/// An operator applied to operands of datatypes it is not defined for.
pub const UNDEFINED_OPERATOR: &str = "FLC-UndefinedOperator";

/// A formula whose datatype cannot be converted to the expected datatype.
pub const WRONG_RESULT_TYPE: &str = "FLC-WrongResultType";

/// A list aggregate applied to a list whose elements it cannot combine.
pub const INVALID_LIST_ELEMENT: &str = "FLC-InvalidListElement";

/// A formula nested more deeply than the compiler is configured to accept.
pub const EXPRESSION_TOO_DEEP: &str = "FLC-ExpressionTooDeep";

/// A numeric literal whose value cannot be represented.
pub const NUMBER_OUT_OF_RANGE: &str = "FLC-NumberOutOfRange";

/// A problem in the compiler's own configuration, such as a missing helper.
pub const INTERNAL_ERROR: &str = "FLC-InternalError";

/// The default limit on the nesting depth of formulas.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// The largest number of operators a single formula may apply.
pub const MAX_OPERATORS: usize = 1024;

/// The cost of boxing or unboxing a primitive during overload resolution.
pub const BOXING_COST: u32 = 1;

/// The cost of widening a value to a more general numeric datatype.
pub const WIDENING_COST: u32 = 2;

/// The cost of accepting an argument as the universal `any` datatype.
///
/// This is deliberately higher than any chain of concrete conversions, so that
/// generic signatures only win when nothing more specific applies.
pub const ANY_COST: u32 = 8;

/// The scale used for the result of dividing two decimals.
pub const DIVISION_SCALE: u32 = 10;

/// The scale money amounts are rounded to after multiplication and division.
pub const MONEY_SCALE: u32 = 2;
