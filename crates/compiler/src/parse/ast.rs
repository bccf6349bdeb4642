//! The syntax tree of a formula.

use flc_errors::diagnostic::Span;
use rust_decimal::Decimal;

use crate::{
    datatype::Datatype,
    eval::value::{Money, Value},
    function::operator::{self, OperatorPair},
};

/// An expression, together with the region of the formula it was parsed from.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Gets how tightly the expression binds, from `1` for `||` up to
    /// [`ATOM_PRECEDENCE`] for expressions that never need parentheses.
    #[must_use]
    pub fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Unary { .. } => PREFIX_PRECEDENCE,
            ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Call { .. } => {
                ATOM_PRECEDENCE
            }
        }
    }

    /// Gets the direct children of the expression, each paired with whether
    /// it sits one nesting level deeper than the expression itself.
    ///
    /// Call arguments are always one level deeper. An operand is one level
    /// deeper only if it has to be parenthesised, as the sum in `2 * (a + b)`
    /// is, so that a long chain like `a + b + c` does not count as nested.
    #[must_use]
    pub fn children(&self) -> Vec<(&Expr, bool)> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Identifier(_) => Vec::new(),
            ExprKind::Unary { operand, .. } => vec![(operand, UnaryOp::groups(operand))],
            ExprKind::Binary { op, lhs, rhs } => {
                vec![(lhs, op.groups_lhs(lhs)), (rhs, op.groups_rhs(rhs))]
            }
            ExprKind::Call { args, .. } => args.iter().map(|arg| (arg, true)).collect(),
        }
    }

    /// Gets the number of nesting levels in the expression, which is zero
    /// for a formula without parentheses or calls.
    #[must_use]
    pub fn nesting(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0)];
        while let Some((expr, level)) = pending.pop() {
            deepest = deepest.max(level);
            pending.extend(
                expr.children()
                    .into_iter()
                    .map(|(child, nested)| (child, level + usize::from(nested))),
            );
        }
        deepest
    }
}

/// The precedence of the prefix operators, which bind tighter than any
/// binary operator.
pub const PREFIX_PRECEDENCE: u8 = 7;

/// The precedence of literals, identifiers and calls.
pub const ATOM_PRECEDENCE: u8 = 8;

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),

    /// A reference to a formula parameter. Qualified names such as
    /// `policy.premium` are kept whole.
    Identifier(String),

    Unary {
        op:      UnaryOp,
        operand: Box<Expr>,
    },

    Binary {
        op:  BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// A literal value.
///
/// Numeric literals keep the text they were written as, so that the generated
/// code reproduces it exactly (`3.0` and `3.00` are different decimals in the
/// target language).
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Integer(i32),
    Decimal { value: Decimal, text: String },
    Money { value: Money, text: String },
    String(String),
    Boolean(bool),
}

impl Literal {
    #[must_use]
    pub fn datatype(&self) -> Datatype {
        match self {
            Self::Integer(_) => Datatype::int,
            Self::Decimal { .. } => Datatype::Decimal,
            Self::Money { .. } => Datatype::Money,
            Self::String(_) => Datatype::String,
            Self::Boolean(_) => Datatype::boolean,
        }
    }

    /// Gets the text that the datatype's helper creates the value from.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Integer(i) => i.to_string(),
            Self::Decimal { text, .. } | Self::Money { text, .. } => text.clone(),
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
        }
    }

    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::Integer(i) => Value::from(*i),
            Self::Decimal { value, .. } => Value::Decimal(*value),
            Self::Money { value, .. } => Value::Money(value.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Boolean(b) => Value::Boolean(*b),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
}

impl UnaryOp {
    /// Returns `true` if `operand` has to be parenthesised to follow a prefix
    /// operator.
    #[must_use]
    pub fn groups(operand: &Expr) -> bool {
        operand.precedence() < PREFIX_PRECEDENCE
    }

    /// Gets the operator's pairing of symbol and implementing function.
    #[must_use]
    pub fn operator(self) -> OperatorPair<'static> {
        match self {
            Self::Minus => operator::NEGATE,
            Self::Plus => operator::PLUS,
            Self::Not => operator::NOT,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl BinaryOp {
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Equal | Self::NotEqual => 3,
            Self::Less | Self::LessEqual | Self::Greater | Self::GreaterEqual => 4,
            Self::Add | Self::Subtract => 5,
            Self::Multiply | Self::Divide => 6,
        }
    }

    /// Returns `true` if `lhs` has to be parenthesised to be the left operand
    /// of this operator.
    #[must_use]
    pub fn groups_lhs(self, lhs: &Expr) -> bool {
        lhs.precedence() < self.precedence()
    }

    /// Returns `true` if `rhs` has to be parenthesised to be the right operand
    /// of this operator. As operators associate to the left, this includes
    /// operands of the same precedence, as in `a - (b - c)`.
    #[must_use]
    pub fn groups_rhs(self, rhs: &Expr) -> bool {
        rhs.precedence() <= self.precedence()
    }

    /// Gets the operator's pairing of symbol and implementing function.
    ///
    /// Both `<>` and `!=` are written as `<>`.
    #[must_use]
    pub fn operator(self) -> OperatorPair<'static> {
        match self {
            Self::Add => operator::ADD,
            Self::Subtract => operator::SUBTRACT,
            Self::Multiply => operator::MULTIPLY,
            Self::Divide => operator::DIVIDE,
            Self::Less => operator::LESS,
            Self::LessEqual => operator::LESS_EQUAL,
            Self::Greater => operator::GREATER,
            Self::GreaterEqual => operator::GREATER_EQUAL,
            Self::Equal => operator::EQUAL,
            Self::NotEqual => operator::NOT_EQUAL,
            Self::And => operator::AND,
            Self::Or => operator::OR,
        }
    }
}
