//! # FHIRPath Expression Tree
//!
//! The tree the evaluator walks. It is produced by [`crate::parser`] but can
//! equally be built by any other front-end; the evaluator only relies on the
//! shapes defined here.

use std::fmt;

use atrius_fhirpath_support::{Date, DateTime, Quantity, Time, TypeSpecifier};
use rust_decimal::Decimal;

/// A literal value as written in the expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `{}`
    Empty,
    Boolean(bool),
    String(String),
    Integer(i32),
    /// `<n>L`
    Long(i64),
    Decimal(Decimal),
    Date(Date),
    DateTime(DateTime),
    Time(Time),
    /// `<number> <unit>`; the unit is a calendar keyword or a UCUM string
    Quantity(Quantity),
}

/// Binary operators, grouped by precedence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Multiply,
    Divide,
    Div,
    Mod,
    Add,
    Subtract,
    Concatenate,
    Union,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,
    In,
    Contains,
    And,
    Or,
    Xor,
    Implies,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Div => "div",
            BinaryOperator::Mod => "mod",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Concatenate => "&",
            BinaryOperator::Union => "|",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterOrEqual => ">=",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Equivalent => "~",
            BinaryOperator::NotEquivalent => "!~",
            BinaryOperator::In => "in",
            BinaryOperator::Contains => "contains",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
            BinaryOperator::Implies => "implies",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOperator {
    Is,
    As,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Plus,
    Minus,
}

/// Direction suffix of a `sort` key (`sort(name desc)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Term(Term),
    /// `left.invocation`
    Invocation(Box<Expression>, Invocation),
    /// `collection[index]`
    Indexer(Box<Expression>, Box<Expression>),
    Polarity(Polarity, Box<Expression>),
    Binary(Box<Expression>, BinaryOperator, Box<Expression>),
    /// `expr is Type` / `expr as Type`
    Type(Box<Expression>, TypeOperator, TypeSpecifier),
    /// A function argument carrying an `asc`/`desc` suffix.
    SortKey(Box<Expression>, SortDirection),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Invocation(Invocation),
    Literal(Literal),
    /// `%name`
    ExternalConstant(String),
    Parenthesized(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Member(String),
    Function(String, Vec<Expression>),
    This,
    Index,
    Total,
}

impl Expression {
    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::Binary(Box::new(left), op, Box::new(right))
    }

    /// Reads the expression as a type name, as in `ofType(FHIR.Patient)`.
    pub fn as_type_specifier(&self) -> Option<TypeSpecifier> {
        match self {
            Expression::Term(Term::Invocation(Invocation::Member(name))) => {
                Some(TypeSpecifier::new(None, name))
            }
            Expression::Invocation(left, Invocation::Member(name)) => match left.as_ref() {
                Expression::Term(Term::Invocation(Invocation::Member(ns))) => {
                    Some(TypeSpecifier::new(Some(ns), name))
                }
                _ => None,
            },
            Expression::Term(Term::Parenthesized(inner)) => inner.as_type_specifier(),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Empty => write!(f, "{{}}"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Long(l) => write!(f, "{}L", l),
            Literal::Decimal(d) => write!(f, "{}", d),
            Literal::Date(d) => write!(f, "@{}", d),
            Literal::DateTime(dt) if dt.time().is_none() => write!(f, "@{}T", dt),
            Literal::DateTime(dt) => write!(f, "@{}", dt),
            Literal::Time(t) => write!(f, "@T{}", t),
            Literal::Quantity(q) => write!(f, "{}", q),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Term(term) => write!(f, "{}", term),
            Expression::Invocation(left, invocation) => write!(f, "{}.{}", left, invocation),
            Expression::Indexer(left, index) => write!(f, "{}[{}]", left, index),
            Expression::Polarity(Polarity::Plus, operand) => write!(f, "+{}", operand),
            Expression::Polarity(Polarity::Minus, operand) => write!(f, "-{}", operand),
            Expression::Binary(left, op, right) => write!(f, "{} {} {}", left, op.symbol(), right),
            Expression::Type(operand, TypeOperator::Is, spec) => write!(f, "{} is {}", operand, spec),
            Expression::Type(operand, TypeOperator::As, spec) => write!(f, "{} as {}", operand, spec),
            Expression::SortKey(key, SortDirection::Ascending) => write!(f, "{} asc", key),
            Expression::SortKey(key, SortDirection::Descending) => write!(f, "{} desc", key),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Invocation(invocation) => write!(f, "{}", invocation),
            Term::Literal(literal) => write!(f, "{}", literal),
            Term::ExternalConstant(name) => write!(f, "%{}", name),
            Term::Parenthesized(inner) => write!(f, "({})", inner),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Member(name) => write!(f, "{}", name),
            Invocation::Function(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Invocation::This => write!(f, "$this"),
            Invocation::Index => write!(f, "$index"),
            Invocation::Total => write!(f, "$total"),
        }
    }
}
