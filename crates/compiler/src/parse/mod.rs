//! The parser for the formula language.
//!
//! # Grammar
//!
//! From loosest to tightest binding, formulas are built from:
//!
//! 1. `||`
//! 2. `&&`
//! 3. `=`, `<>` and its synonym `!=`
//! 4. `<`, `<=`, `>`, `>=`
//! 5. `+`, `-`
//! 6. `*`, `/`
//! 7. the prefix operators `-`, `+` and `!`
//! 8. literals, identifiers, function calls `NAME(arg; ...)` and
//!    parenthesised expressions
//!
//! All binary operators associate to the left. Literals are integers (`42`),
//! decimals (`4.2`, `1.5E3`), money (`10EUR`, `4.50USD`), strings (`"text"`)
//! and the booleans `true` and `false`. Identifiers may be qualified with dots,
//! as in `policy.premium`.
//!
//! Spans are given in characters from the start of the formula.

pub mod ast;

use chumsky::{
    error::{Simple, SimpleReason},
    prelude::{choice, end, filter, just, none_of, one_of, recursive},
    text::{self, TextParser},
    Parser,
};
use flc_errors::diagnostic::{Message, MessageList, Span};
use itertools::Itertools;

use crate::{
    constant::{EXPRESSION_TOO_DEEP, MAX_OPERATORS, NUMBER_OUT_OF_RANGE, SYNTAX_ERROR},
    eval::value::{parse_decimal, Money},
    parse::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp},
};

/// Parses `source` into an expression.
///
/// # Errors
///
/// A list of diagnostics if the formula is not well-formed, or if it exceeds
/// the limits checked by [`check_limits`].
pub fn parse(source: &str, max_depth: usize) -> Result<Expr, MessageList> {
    check_limits(source, max_depth)?;
    formula()
        .parse(source)
        .map_err(|errors| errors.into_iter().map(to_message).collect())
}

/// Checks the shape of `source` before it is parsed, so that pathological
/// input is rejected before it can build a syntax tree too deep to handle.
///
/// The formula may nest parentheses at most `max_depth` levels deep, and may
/// not string together more than `max_depth` operators in a row (as in
/// `1 - - -x`). In total it may apply at most [`MAX_OPERATORS`] operators.
///
/// # Errors
///
/// A single [`EXPRESSION_TOO_DEEP`] diagnostic at the first character beyond
/// a limit.
pub fn check_limits(source: &str, max_depth: usize) -> Result<(), MessageList> {
    let too_deep = |index: usize, text: String| -> MessageList {
        Message::new_error(EXPRESSION_TOO_DEEP, text).with_span(index..index + 1).into()
    };
    let nested = || format!("The formula is nested more than {max_depth} levels deep");

    let mut depth = 0usize;
    let mut operators = 0usize;
    let mut run = 0usize;
    let mut in_string = false;
    let mut previous = None;

    for (index, c) in source.chars().enumerate() {
        if in_string {
            in_string = c != '"';
        } else {
            match c {
                '"' => {
                    in_string = true;
                    run = 0;
                }
                '(' => {
                    depth += 1;
                    run = 0;
                    if depth > max_depth {
                        return Err(too_deep(index, nested()));
                    }
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    run = 0;
                }
                '+' | '-' | '*' | '/' | '<' | '>' | '=' | '!' | '&' | '|' => {
                    // The second character of `<=`, `<>`, `&&` and the like.
                    let continues = matches!(
                        (previous, c),
                        (Some('<' | '>' | '!'), '=')
                            | (Some('<'), '>')
                            | (Some('&'), '&')
                            | (Some('|'), '|')
                    );
                    if !continues {
                        operators += 1;
                        run += 1;
                    }
                    if run > max_depth {
                        return Err(too_deep(index, nested()));
                    }
                    if operators > MAX_OPERATORS {
                        return Err(too_deep(
                            index,
                            format!("The formula applies more than {MAX_OPERATORS} operators"),
                        ));
                    }
                }
                c if c.is_whitespace() => (),
                _ => run = 0,
            }
        }
        previous = Some(c);
    }
    Ok(())
}

/// Converts a parse error into a diagnostic.
///
/// The grammar only raises custom errors for numeric literals that are out of
/// range.
fn to_message(error: Simple<char>) -> Message {
    let describe =
        |c: Option<&char>| c.map_or_else(|| "end of input".to_string(), |c| format!("`{c}`"));

    let (code, text) = match error.reason() {
        SimpleReason::Custom(message) => (NUMBER_OUT_OF_RANGE, message.clone()),
        SimpleReason::Unclosed { delimiter, .. } => {
            (SYNTAX_ERROR, format!("Unclosed delimiter `{delimiter}`"))
        }
        SimpleReason::Unexpected => {
            let found = describe(error.found());
            let expected = error
                .expected()
                .map(|e| describe(e.as_ref()))
                .sorted()
                .dedup()
                .join(", ");
            let text = if expected.is_empty() {
                format!("Unexpected {found}")
            } else {
                format!("Unexpected {found}, expected one of {expected}")
            };
            (SYNTAX_ERROR, text)
        }
    };

    Message::new_error(code, text).with_span(error.span())
}

/// Parses a complete formula, allowing surrounding whitespace.
fn formula() -> impl Parser<char, Expr, Error = Simple<char>> {
    expression().padded().then_ignore(end())
}

fn expression() -> impl Parser<char, Expr, Error = Simple<char>> + Clone {
    recursive(|expr| {
        let args = expr
            .clone()
            .separated_by(just(';'))
            .padded()
            .delimited_by(just('('), just(')'));

        let call = identifier()
            .then_ignore(text::whitespace())
            .then(args)
            .map(|(name, args)| ExprKind::Call { name, args });

        let atom = choice((
            literal().map(ExprKind::Literal).map_with_span(Expr::new),
            call.map_with_span(Expr::new),
            identifier().map(ExprKind::Identifier).map_with_span(Expr::new),
            expr.delimited_by(just('('), just(')')),
        ))
        .padded();

        let unary_op = choice((
            just('-').to(UnaryOp::Minus),
            just('+').to(UnaryOp::Plus),
            just('!').to(UnaryOp::Not),
        ))
        .map_with_span(|op, span: Span| (op, span))
        .padded();

        let unary = unary_op
            .repeated()
            .then(atom)
            .foldr(|(op, span), operand| {
                let span = span.start..operand.span.end;
                Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
            })
            .boxed();

        let product = binary(
            unary,
            choice((just('*').to(BinaryOp::Multiply), just('/').to(BinaryOp::Divide))),
        );

        let sum = binary(
            product,
            choice((just('+').to(BinaryOp::Add), just('-').to(BinaryOp::Subtract))),
        );

        let relational = binary(
            sum,
            choice((
                just("<=").to(BinaryOp::LessEqual),
                just(">=").to(BinaryOp::GreaterEqual),
                just('<')
                    .then_ignore(just('>').not().rewind())
                    .to(BinaryOp::Less),
                just('>').to(BinaryOp::Greater),
            )),
        );

        let equality = binary(
            relational,
            choice((
                just("<>").to(BinaryOp::NotEqual),
                just("!=").to(BinaryOp::NotEqual),
                just('=').to(BinaryOp::Equal),
            )),
        );

        let and = binary(equality, just("&&").to(BinaryOp::And));

        binary(and, just("||").to(BinaryOp::Or))
    })
}

/// Builds a left-associative chain of `operand`s separated by `op`.
fn binary(
    operand: impl Parser<char, Expr, Error = Simple<char>> + Clone + 'static,
    op: impl Parser<char, BinaryOp, Error = Simple<char>> + Clone + 'static,
) -> chumsky::BoxedParser<'static, char, Expr, Simple<char>> {
    operand
        .clone()
        .then(op.padded().then(operand).repeated())
        .foldl(|lhs, (op, rhs)| {
            let span = lhs.span.start..rhs.span.end;
            Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            )
        })
        .boxed()
}

/// Parses an identifier, possibly qualified with dots.
fn identifier() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    text::ident()
        .separated_by(just('.'))
        .at_least(1)
        .map(|parts: Vec<String>| parts.join("."))
}

fn literal() -> impl Parser<char, Literal, Error = Simple<char>> + Clone {
    let string = none_of('"')
        .repeated()
        .collect::<String>()
        .delimited_by(just('"'), just('"'))
        .map(Literal::String);

    let boolean = text::keyword("true")
        .to(Literal::Boolean(true))
        .or(text::keyword("false").to(Literal::Boolean(false)));

    choice((number(), string, boolean))
}

/// Parses an integer, decimal or money literal.
///
/// An exponent is tried before a currency, so that `1E3` is a decimal while
/// `1EUR` is money.
fn number() -> impl Parser<char, Literal, Error = Simple<char>> + Clone {
    let fraction = just('.').ignore_then(text::digits(10));

    let exponent = one_of("eE")
        .ignore_then(one_of("+-").or_not())
        .then(text::digits(10))
        .map(|(sign, digits): (Option<char>, String)| {
            format!("E{}{digits}", sign.map(String::from).unwrap_or_default())
        });

    let currency = filter(|c: &char| c.is_ascii_uppercase())
        .repeated()
        .exactly(3)
        .collect::<String>();

    text::digits(10)
        .then(fraction.or_not())
        .then(exponent.or_not())
        .then(currency.or_not())
        .try_map(|(((integer, fraction), exponent), currency), span: Span| {
            number_literal(integer, fraction, exponent, currency, span)
        })
}

fn number_literal(
    integer: String,
    fraction: Option<String>,
    exponent: Option<String>,
    currency: Option<String>,
    span: Span,
) -> Result<Literal, Simple<char>> {
    let is_decimal = fraction.is_some() || exponent.is_some();
    let mut text = integer.clone();
    if let Some(fraction) = fraction {
        text.push('.');
        text.push_str(&fraction);
    }
    if let Some(exponent) = exponent {
        text.push_str(&exponent);
    }

    let decimal = |text: &str| {
        parse_decimal(text)
            .ok_or_else(|| Simple::custom(span.clone(), format!("The number {text} is out of range")))
    };

    match currency {
        Some(currency) => {
            let amount = decimal(&text)?;
            Ok(Literal::Money {
                value: Money::new(amount, currency.as_str()),
                text:  format!("{text}{currency}"),
            })
        }
        None if is_decimal => Ok(Literal::Decimal {
            value: decimal(&text)?,
            text,
        }),
        None => integer.parse().map(Literal::Integer).map_err(|_| {
            Simple::custom(span, format!("The integer {integer} is out of range"))
        }),
    }
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;

    use crate::{
        constant::{EXPRESSION_TOO_DEEP, NUMBER_OUT_OF_RANGE, SYNTAX_ERROR},
        parse::{
            ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp},
            parse,
        },
    };

    fn parse_ok(source: &str) -> Expr {
        parse(source, 128).expect("formula should parse")
    }

    fn binary_op(expr: &Expr) -> BinaryOp {
        match &expr.kind {
            ExprKind::Binary { op, .. } => *op,
            other => panic!("expected a binary expression, found {other:?}"),
        }
    }

    #[test]
    fn products_bind_tighter_than_sums() {
        let expr = parse_ok("1 + 2 * 3");

        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!("expected a binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(binary_op(rhs), BinaryOp::Multiply);
        assert_eq!(expr.span, 0..9);
    }

    #[test]
    fn operators_associate_to_the_left() {
        let expr = parse_ok("8 - 4 - 2");

        let ExprKind::Binary { lhs, .. } = &expr.kind else {
            panic!("expected a binary expression");
        };
        assert_eq!(binary_op(lhs), BinaryOp::Subtract);
        assert_eq!(lhs.span, 0..5);
    }

    #[test]
    fn comparison_and_logic_precedence() {
        let expr = parse_ok("a < b && c <> d || !e");

        assert_eq!(binary_op(&expr), BinaryOp::Or);
        let ExprKind::Binary { lhs, rhs, .. } = &expr.kind else {
            unreachable!()
        };
        assert_eq!(binary_op(lhs), BinaryOp::And);
        assert!(matches!(
            rhs.kind,
            ExprKind::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));

        assert_eq!(binary_op(&parse_ok("a != b")), BinaryOp::NotEqual);
        assert_eq!(binary_op(&parse_ok("a<=b")), BinaryOp::LessEqual);
    }

    #[test]
    fn numeric_literals() {
        let literal = |source: &str| match parse_ok(source).kind {
            ExprKind::Literal(literal) => literal,
            other => panic!("expected a literal, found {other:?}"),
        };

        assert_eq!(literal("42"), Literal::Integer(42));
        assert!(matches!(
            literal("3.0"),
            Literal::Decimal { value, text } if value == Decimal::new(3, 0) && text == "3.0"
        ));
        assert!(matches!(
            literal("1.5e3"),
            Literal::Decimal { value, .. } if value == Decimal::new(1500, 0)
        ));
        assert!(matches!(
            literal("10EUR"),
            Literal::Money { value, text } if value.currency() == "EUR" && text == "10EUR"
        ));
        assert!(matches!(
            literal("4.50USD"),
            Literal::Money { value, .. } if value.amount() == Decimal::new(450, 2)
        ));
        assert_eq!(literal("\"a b\""), Literal::String("a b".to_string()));
        assert_eq!(literal("false"), Literal::Boolean(false));
    }

    #[test]
    fn calls_and_qualified_identifiers() {
        let expr = parse_ok("MAX(policy.premium; 10.0)");

        let ExprKind::Call { name, args } = &expr.kind else {
            panic!("expected a call");
        };
        assert_eq!(name, "MAX");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].kind, ExprKind::Identifier("policy.premium".to_string()));
        assert_eq!(args[0].span, 4..18);

        let ExprKind::Call { args, .. } = parse_ok("DECIMALNULL( )").kind else {
            panic!("expected a call");
        };
        assert!(args.is_empty());
    }

    #[test]
    fn prefix_operators_nest() {
        let expr = parse_ok("- -x");

        let ExprKind::Unary { operand, .. } = &expr.kind else {
            panic!("expected a unary expression");
        };
        assert!(matches!(operand.kind, ExprKind::Unary { .. }));
        assert_eq!(expr.nesting(), 0);
        assert_eq!(parse_ok("-(a + b)").nesting(), 1);
    }

    #[test]
    fn malformed_formulas_are_reported() {
        for source in ["1 +", "(1", "MAX(1;", "1 2", "3 ==4", ""] {
            let messages = parse(source, 128).expect_err(source);
            assert!(!messages.is_empty());
            assert!(messages.iter().all(|m| m.code() == SYNTAX_ERROR && m.span().is_some()));
        }
    }

    #[test]
    fn out_of_range_numbers_are_reported() {
        for source in ["2147483648", "1E100"] {
            let messages = parse(source, 128).unwrap_err();
            let message = messages.by_code(NUMBER_OUT_OF_RANGE).expect(source);
            assert_eq!(message.span(), Some(&(0..source.len())));
        }
        assert!(parse("2147483647", 128).is_ok());
    }

    #[test]
    fn operator_runs_and_counts_are_limited() {
        let source = format!("{}1", "-".repeat(200_000));
        let messages = parse(&source, 128).unwrap_err();
        assert_eq!(messages.by_code(EXPRESSION_TOO_DEEP).unwrap().span(), Some(&(128..129)));

        let source = vec!["1"; 100_000].join("+");
        let messages = parse(&source, 128).unwrap_err();
        let message = messages.by_code(EXPRESSION_TOO_DEEP).unwrap();
        assert_eq!(message.text(), "The formula applies more than 1024 operators");

        assert!(parse(&vec!["1"; 1000].join(" + "), 128).is_ok());
        assert!(parse("a <= -b && c <> !d", 2).is_ok());
        assert!(parse("\"+-*/\" + 1", 1).is_ok());
    }

    #[test]
    fn nesting_is_limited() {
        let source = format!("{}1{}", "(".repeat(5), ")".repeat(5));

        assert!(parse(&source, 5).is_ok());
        let messages = parse(&source, 4).unwrap_err();
        assert_eq!(messages.by_code(EXPRESSION_TOO_DEEP).unwrap().span(), Some(&(4..5)));
    }
}
