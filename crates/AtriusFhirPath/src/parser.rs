//! # FHIRPath Parser
//!
//! A `chumsky` grammar that turns FHIRPath source text into the
//! [`Expression`] tree defined in [`crate::ast`].
//!
//! Precedence, tightest first:
//!
//! ```text
//! . []                  invocation, indexer
//! + -                   unary polarity
//! * / div mod
//! + - &
//! is as
//! |
//! < > <= >=
//! = ~ != !~
//! in contains
//! and
//! or xor
//! implies
//! ```
//!
//! Whitespace, `// line` and `/* block */` comments may appear between any
//! two tokens.

use std::str::FromStr;

use atrius_fhirpath_support::{Date, DateTime, EvaluationError, Quantity, Time, TypeSpecifier};
use chumsky::prelude::*;
use rust_decimal::Decimal;

use crate::ast::{
    BinaryOperator, Expression, Invocation, Literal, Polarity, SortDirection, Term, TypeOperator,
};

type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Parses a complete expression, reporting syntax errors with their offset.
pub fn parse(source: &str) -> Result<Expression, EvaluationError> {
    parser().parse(source).into_result().map_err(|errors| {
        let message = errors
            .iter()
            .map(|e| format!("{} at offset {}", e, e.span().start))
            .collect::<Vec<_>>()
            .join("; ");
        EvaluationError::Parse(message)
    })
}

/// Whitespace and comments.
fn trivia<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    choice((
        text::whitespace().at_least(1).ignored(),
        just("//")
            .then(any().and_is(text::newline().or(end()).not()).repeated())
            .ignored(),
        just("/*")
            .then(any().and_is(just("*/").not()).repeated())
            .then(just("*/"))
            .ignored(),
    ))
    .repeated()
    .ignored()
}

/// Wraps a parser so it skips trivia on both sides.
fn token<'src, T, P>(parser: P) -> impl Parser<'src, &'src str, T, Extra<'src>> + Clone
where
    P: Parser<'src, &'src str, T, Extra<'src>> + Clone,
{
    trivia().ignore_then(parser).then_ignore(trivia())
}

fn digits<'src>(count: usize) -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .exactly(count)
        .collect::<String>()
}

fn digit_run<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1)
        .collect::<String>()
}

/// Body of a quoted string or delimited identifier, escapes resolved.
fn quoted<'src>(delimiter: char) -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('`').to('`'),
        just('\'').to('\''),
        just('\\').to('\\'),
        just('/').to('/'),
        just('"').to('"'),
        just('f').to('\u{000C}'),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        just('u').ignore_then(
            any()
                .filter(|c: &char| c.is_ascii_hexdigit())
                .repeated()
                .exactly(4)
                .collect::<String>()
                .try_map(|hex, span| {
                    u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| Rich::custom(span, format!("invalid unicode escape \\u{}", hex)))
                }),
        ),
    )));
    let plain = any().filter(move |c: &char| *c != '\\' && *c != delimiter);
    just(delimiter)
        .ignore_then(plain.or(escape).repeated().collect::<String>())
        .then_ignore(just(delimiter))
}

/// `YYYY[-MM[-DD]]`
fn date_text<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    digits(4)
        .then(
            just('-')
                .ignore_then(digits(2))
                .then(just('-').ignore_then(digits(2)).or_not())
                .or_not(),
        )
        .map(|(year, rest)| match rest {
            None => year,
            Some((month, None)) => format!("{}-{}", year, month),
            Some((month, Some(day))) => format!("{}-{}-{}", year, month, day),
        })
}

/// `hh[:mm[:ss[.fff]]]`
fn time_text<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    digits(2)
        .then(
            just(':')
                .ignore_then(digits(2))
                .then(
                    just(':')
                        .ignore_then(digits(2))
                        .then(just('.').ignore_then(digit_run()).or_not())
                        .or_not(),
                )
                .or_not(),
        )
        .map(|(hour, rest)| {
            let mut text = hour;
            if let Some((minute, seconds)) = rest {
                text.push(':');
                text.push_str(&minute);
                if let Some((second, fraction)) = seconds {
                    text.push(':');
                    text.push_str(&second);
                    if let Some(fraction) = fraction {
                        text.push('.');
                        text.push_str(&fraction);
                    }
                }
            }
            text
        })
}

/// `Z` or `(+|-)hh:mm`
fn zone_text<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('Z').to("Z".to_string()).or(one_of("+-")
        .then(digits(2))
        .then_ignore(just(':'))
        .then(digits(2))
        .map(|((sign, hours), minutes)| format!("{}{}:{}", sign, hours, minutes)))
}

fn temporal_literal<'src>() -> impl Parser<'src, &'src str, Literal, Extra<'src>> + Clone {
    let time = just('T').ignore_then(time_text()).try_map(|text, span| {
        match Time::parse(&text) {
            Ok(Some(time)) => Ok(Literal::Time(time)),
            _ => Err(Rich::custom(span, format!("invalid time literal @T{}", text))),
        }
    });

    let date_or_date_time = date_text()
        .then(
            just('T')
                .ignore_then(time_text().or_not())
                .then(zone_text().or_not())
                .or_not(),
        )
        .try_map(|(date, suffix), span| match suffix {
            None => match Date::parse(&date) {
                Ok(Some(date)) => Ok(Literal::Date(date)),
                _ => Err(Rich::custom(span, format!("invalid date literal @{}", date))),
            },
            Some((time, zone)) => {
                let text = format!(
                    "{}T{}{}",
                    date,
                    time.unwrap_or_default(),
                    zone.unwrap_or_default()
                );
                match DateTime::parse(&text) {
                    Ok(Some(value)) => Ok(Literal::DateTime(value)),
                    _ => Err(Rich::custom(span, format!("invalid datetime literal @{}", text))),
                }
            }
        });

    just('@').ignore_then(choice((time, date_or_date_time)))
}

fn unit_keyword<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    choice((
        text::keyword("year").to("year"),
        text::keyword("years").to("years"),
        text::keyword("month").to("month"),
        text::keyword("months").to("months"),
        text::keyword("week").to("week"),
        text::keyword("weeks").to("weeks"),
        text::keyword("day").to("day"),
        text::keyword("days").to("days"),
        text::keyword("hour").to("hour"),
        text::keyword("hours").to("hours"),
        text::keyword("minute").to("minute"),
        text::keyword("minutes").to("minutes"),
        text::keyword("second").to("second"),
        text::keyword("seconds").to("seconds"),
        text::keyword("millisecond").to("millisecond"),
        text::keyword("milliseconds").to("milliseconds"),
    ))
    .map(str::to_string)
}

fn literal<'src>() -> impl Parser<'src, &'src str, Literal, Extra<'src>> + Clone {
    let number_text = digit_run()
        .then(just('.').ignore_then(digit_run()).or_not())
        .map(|(whole, fraction)| match fraction {
            Some(fraction) => format!("{}.{}", whole, fraction),
            None => whole,
        });

    let quantity = number_text
        .clone()
        .then_ignore(text::whitespace().at_least(1))
        .then(unit_keyword().or(quoted('\'')))
        .try_map(|(number, unit), span| {
            Decimal::from_str(&number)
                .map(|value| Literal::Quantity(Quantity::new(value, unit)))
                .map_err(|_| Rich::custom(span, format!("invalid quantity value {}", number)))
        });

    let number = number_text
        .then(just('L').or_not())
        .try_map(|(text, long), span| {
            if long.is_some() {
                return text
                    .parse::<i64>()
                    .map(Literal::Long)
                    .map_err(|_| Rich::custom(span, format!("invalid long literal {}L", text)));
            }
            if text.contains('.') {
                return Decimal::from_str(&text)
                    .map(Literal::Decimal)
                    .map_err(|_| Rich::custom(span, format!("invalid decimal literal {}", text)));
            }
            text.parse::<i32>()
                .map(Literal::Integer)
                .map_err(|_| Rich::custom(span, format!("integer literal {} is out of range", text)))
        });

    choice((
        just('{').then(trivia()).then(just('}')).to(Literal::Empty),
        text::keyword("true").to(Literal::Boolean(true)),
        text::keyword("false").to(Literal::Boolean(false)),
        quoted('\'').map(Literal::String),
        quantity,
        number,
        temporal_literal(),
    ))
}

fn identifier<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let plain = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                .repeated()
                .collect::<String>(),
        )
        .map(|(first, rest)| format!("{}{}", first, rest));
    plain.or(quoted('`'))
}

fn type_specifier<'src>() -> impl Parser<'src, &'src str, TypeSpecifier, Extra<'src>> + Clone {
    identifier()
        .then(just('.').ignore_then(identifier()).or_not())
        .map(|(first, second)| match second {
            Some(name) => TypeSpecifier::new(Some(&first), &name),
            None => TypeSpecifier::new(None, &first),
        })
}

/// Applied after an atom: `.member`, `.function(args)` or `[index]`.
#[derive(Clone)]
enum Postfix {
    Invoke(Invocation),
    Index(Expression),
}

fn fold_binary(first: Expression, rest: Vec<(BinaryOperator, Expression)>) -> Expression {
    rest.into_iter()
        .fold(first, |left, (op, right)| Expression::binary(left, op, right))
}

/// The FHIRPath expression parser.
pub fn parser<'src>() -> impl Parser<'src, &'src str, Expression, Extra<'src>> + Clone {
    recursive(|expr| {
        let argument = expr
            .clone()
            .then(
                token(choice((
                    text::keyword("asc").to(SortDirection::Ascending),
                    text::keyword("desc").to(SortDirection::Descending),
                )))
                .or_not(),
            )
            .map(|(argument, direction): (Expression, Option<SortDirection>)| match direction {
                Some(direction) => Expression::SortKey(Box::new(argument), direction),
                None => argument,
            });

        let arguments = argument
            .separated_by(token(just(',')))
            .collect::<Vec<_>>()
            .delimited_by(token(just('(')), token(just(')')))
            .boxed();

        let special = choice((
            just("$this").to(Invocation::This),
            just("$index").to(Invocation::Index),
            just("$total").to(Invocation::Total),
        ));

        let external_constant = just('%')
            .ignore_then(identifier().or(quoted('\'')))
            .map(Term::ExternalConstant);

        let atom = token(choice((
            literal().map(Term::Literal).boxed(),
            external_constant.boxed(),
            identifier()
                .then(arguments.clone())
                .map(|(name, args)| Term::Invocation(Invocation::Function(name, args)))
                .boxed(),
            special.map(Term::Invocation).boxed(),
            identifier().map(|name| Term::Invocation(Invocation::Member(name))).boxed(),
            expr.clone()
                .delimited_by(token(just('(')), token(just(')')))
                .map(|inner| Term::Parenthesized(Box::new(inner)))
                .boxed(),
        )))
        .map(Expression::Term);

        let postfix = choice((
            token(just('.'))
                .ignore_then(token(identifier()).then(arguments.or_not()))
                .map(|(name, args)| match args {
                    Some(args) => Postfix::Invoke(Invocation::Function(name, args)),
                    None => Postfix::Invoke(Invocation::Member(name)),
                }),
            expr.clone()
                .delimited_by(token(just('[')), token(just(']')))
                .map(Postfix::Index),
        ));

        let invocation = atom
            .then(postfix.repeated().collect::<Vec<_>>())
            .map(|(first, rest)| {
                rest.into_iter().fold(first, |left, step| match step {
                    Postfix::Invoke(invocation) => Expression::Invocation(Box::new(left), invocation),
                    Postfix::Index(index) => Expression::Indexer(Box::new(left), Box::new(index)),
                })
            })
            .boxed();

        let unary = token(choice((just('+').to(Polarity::Plus), just('-').to(Polarity::Minus))))
            .repeated()
            .collect::<Vec<_>>()
            .then(invocation)
            .map(|(signs, operand)| {
                signs
                    .into_iter()
                    .rev()
                    .fold(operand, |acc, sign| Expression::Polarity(sign, Box::new(acc)))
            })
            .boxed();

        let multiplicative_op = token(choice((
            just('*').to(BinaryOperator::Multiply),
            just('/').to(BinaryOperator::Divide),
            text::keyword("div").to(BinaryOperator::Div),
            text::keyword("mod").to(BinaryOperator::Mod),
        )));
        let multiplicative = unary
            .clone()
            .then(multiplicative_op.then(unary).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let additive_op = token(choice((
            just('+').to(BinaryOperator::Add),
            just('-').to(BinaryOperator::Subtract),
            just('&').to(BinaryOperator::Concatenate),
        )));
        let additive = multiplicative
            .clone()
            .then(additive_op.then(multiplicative).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let type_op = token(choice((
            text::keyword("is").to(TypeOperator::Is),
            text::keyword("as").to(TypeOperator::As),
        )));
        let type_expression = additive
            .then(type_op.then(token(type_specifier())).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| {
                rest.into_iter().fold(first, |operand, (op, spec)| {
                    Expression::Type(Box::new(operand), op, spec)
                })
            })
            .boxed();

        let union = type_expression
            .clone()
            .then(
                token(just('|').to(BinaryOperator::Union))
                    .then(type_expression)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let inequality_op = token(choice((
            just("<=").to(BinaryOperator::LessOrEqual),
            just("<").to(BinaryOperator::LessThan),
            just(">=").to(BinaryOperator::GreaterOrEqual),
            just(">").to(BinaryOperator::GreaterThan),
        )));
        let inequality = union
            .clone()
            .then(inequality_op.then(union).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let equality_op = token(choice((
            just("=").to(BinaryOperator::Equal),
            just("~").to(BinaryOperator::Equivalent),
            just("!=").to(BinaryOperator::NotEqual),
            just("!~").to(BinaryOperator::NotEquivalent),
        )));
        let equality = inequality
            .clone()
            .then(equality_op.then(inequality).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let membership_op = token(choice((
            text::keyword("in").to(BinaryOperator::In),
            text::keyword("contains").to(BinaryOperator::Contains),
        )));
        let membership = equality
            .clone()
            .then(membership_op.then(equality).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let and = membership
            .clone()
            .then(
                token(text::keyword("and").to(BinaryOperator::And))
                    .then(membership)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        let or_op = token(choice((
            text::keyword("or").to(BinaryOperator::Or),
            text::keyword("xor").to(BinaryOperator::Xor),
        )));
        let or = and
            .clone()
            .then(or_op.then(and).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed();

        or.clone()
            .then(
                token(text::keyword("implies").to(BinaryOperator::Implies))
                    .then(or)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_binary(first, rest))
            .boxed()
    })
    .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhirpath_support::TemporalPrecision;
    use rust_decimal_macros::dec;

    fn literal_of(source: &str) -> Literal {
        match parse(source).unwrap() {
            Expression::Term(Term::Literal(literal)) => literal,
            other => panic!("expected a literal for {}, got {:?}", source, other),
        }
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(literal_of("42"), Literal::Integer(42));
        assert_eq!(literal_of("42L"), Literal::Long(42));
        assert_eq!(literal_of("3.140"), Literal::Decimal(dec!(3.140)));
        assert!(parse("99999999999").is_err());
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(literal_of(r"'it\'s'"), Literal::String("it's".into()));
        assert_eq!(literal_of(r"'A\n'"), Literal::String("A\n".into()));
    }

    #[test]
    fn test_quantity_literals() {
        assert_eq!(
            literal_of("4 'mg'"),
            Literal::Quantity(Quantity::new(dec!(4), "mg"))
        );
        assert_eq!(
            literal_of("1.5 weeks"),
            Literal::Quantity(Quantity::new(dec!(1.5), "weeks"))
        );
    }

    #[test]
    fn test_temporal_literals() {
        match literal_of("@2014-01") {
            Literal::Date(d) => assert_eq!(d.precision(), TemporalPrecision::Month),
            other => panic!("{:?}", other),
        }
        match literal_of("@2014-01-25T14:30:14.559+09:00") {
            Literal::DateTime(dt) => {
                assert_eq!(dt.precision(), TemporalPrecision::Millisecond);
                assert!(dt.offset().is_some());
            }
            other => panic!("{:?}", other),
        }
        match literal_of("@2015T") {
            Literal::DateTime(dt) => assert_eq!(dt.precision(), TemporalPrecision::Year),
            other => panic!("{:?}", other),
        }
        assert!(matches!(literal_of("@T14:30"), Literal::Time(_)));
        assert!(parse("@2023-02-30").is_err());
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3 = 7 and true").unwrap();
        match expr {
            Expression::Binary(left, BinaryOperator::And, _) => match *left {
                Expression::Binary(sum, BinaryOperator::Equal, _) => {
                    assert!(matches!(*sum, Expression::Binary(_, BinaryOperator::Add, _)));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_type_binds_tighter_than_union() {
        let expr = parse("a is String | b").unwrap();
        assert!(matches!(
            expr,
            Expression::Binary(left, BinaryOperator::Union, _) if matches!(*left, Expression::Type(..))
        ));
    }

    #[test]
    fn test_invocation_chain_and_indexer() {
        let expr = parse("Patient.name[0].given.first()").unwrap();
        assert_eq!(expr.to_string(), "Patient.name[0].given.first()");
        let expr = parse("1.toString()").unwrap();
        assert!(matches!(expr, Expression::Invocation(_, Invocation::Function(..))));
    }

    #[test]
    fn test_sort_direction_arguments() {
        let expr = parse("(3 | 1).sort($this desc, name)").unwrap();
        match expr {
            Expression::Invocation(_, Invocation::Function(name, args)) => {
                assert_eq!(name, "sort");
                assert!(matches!(args[0], Expression::SortKey(_, SortDirection::Descending)));
                assert!(!matches!(args[1], Expression::SortKey(..)));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_comments_and_constants() {
        let expr = parse("%resource /* root */ .id // trailing\n").unwrap();
        assert_eq!(expr.to_string(), "%resource.id");
        assert!(parse("`given name`.first()").is_ok());
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = parse("1 +").unwrap_err();
        assert!(matches!(err, EvaluationError::Parse(_)));
    }
}
