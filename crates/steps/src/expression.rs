//! Boolean expressions for `condition` steps.
//!
//! A deliberately small language, parsed with nom and evaluated over JSON:
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | compare
//! compare := primary ( ("==" | "!=" | ">=" | "<=" | ">" | "<") primary )?
//! primary := "(" expr ")" | 'text' | "text" | number | true | false | null | path
//! ```
//!
//! Paths (`trigger.score`, `steps.score_lead.grade`) are looked up in the run
//! context; a missing path evaluates to `null`. Nothing is ever executed.

use std::cmp::Ordering;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize},
    error::ErrorKind,
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde_json::{Number, Value};

use crate::resolver::lookup;
use crate::StepError;

/// Deepest nesting of `(` and `!` a condition may use.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

/// Parse `source` into an [`Expr`].
pub fn parse(source: &str) -> Result<Expr, StepError> {
    all_consuming(ws(|i| or_expr(i, 0)))(source)
        .map(|(_, expr)| expr)
        .map_err(|e| match e {
            nom::Err::Failure(inner) if inner.code == ErrorKind::TooLarge => {
                StepError::Expression("expression nested too deeply".into())
            }
            e => StepError::Expression(format!("cannot parse '{source}': {e}")),
        })
}

/// Parse and evaluate `source` to a boolean.
pub fn evaluate(source: &str, context: &Value) -> Result<bool, StepError> {
    Ok(is_truthy(&parse(source)?.eval(context)))
}

impl Expr {
    pub fn eval(&self, context: &Value) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Path(path) => lookup(context, path).cloned().unwrap_or(Value::Null),
            Expr::Not(inner) => Value::Bool(!is_truthy(&inner.eval(context))),
            Expr::And(terms) => Value::Bool(terms.iter().all(|t| is_truthy(&t.eval(context)))),
            Expr::Or(terms) => Value::Bool(terms.iter().any(|t| is_truthy(&t.eval(context)))),
            Expr::Compare(l, op, r) => Value::Bool(compare(&l.eval(context), *op, &r.eval(context))),
        }
    }
}

/// Truthiness: `null`, `false`, `0`, `""` and empty collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let ordering = match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (left, right) {
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            _ => None,
        },
    };
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    }
}

/// Equality used by conditions. Numeric only when one side is a JSON number,
/// so `3 == 3.0` and `'72' == 72` hold but `'01234' == '1234'` does not.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    if left.is_number() || right.is_number() {
        if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
            return l == r;
        }
    }
    left == right
}

/// Numbers, and strings that read as finite numbers (values spliced from
/// templates often arrive quoted).
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Fails the whole parse once `(` and `!` nest past [`MAX_DEPTH`].
fn descend(input: &str, depth: usize) -> Result<usize, nom::Err<nom::error::Error<&str>>> {
    if depth >= MAX_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::TooLarge)));
    }
    Ok(depth + 1)
}

fn or_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input, depth)?;
    let (input, rest) = many0(preceded(ws(tag("||")), |i| and_expr(i, depth)))(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    Ok((input, Expr::Or(std::iter::once(first).chain(rest).collect())))
}

fn and_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = unary(input, depth)?;
    let (input, rest) = many0(preceded(ws(tag("&&")), |i| unary(i, depth)))(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    Ok((input, Expr::And(std::iter::once(first).chain(rest).collect())))
}

fn unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (rest, bang) = opt(ws(not_op))(input)?;
    if bang.is_none() {
        return comparison(input, depth);
    }
    let depth = descend(input, depth)?;
    let (rest, inner) = unary(rest, depth)?;
    Ok((rest, Expr::Not(Box::new(inner))))
}

fn comparison(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, left) = primary(input, depth)?;
    let (input, rhs) = opt(pair(ws(compare_op), |i| primary(i, depth)))(input)?;
    Ok(match rhs {
        Some((op, right)) => (input, Expr::Compare(Box::new(left), op, Box::new(right))),
        None => (input, left),
    })
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        map(tag("=="), |_| CompareOp::Eq),
        map(tag("!="), |_| CompareOp::Ne),
        map(tag(">="), |_| CompareOp::Ge),
        map(tag("<="), |_| CompareOp::Le),
        map(tag(">"), |_| CompareOp::Gt),
        map(tag("<"), |_| CompareOp::Lt),
    ))(input)
}

fn primary(input: &str, depth: usize) -> IResult<&str, Expr> {
    ws(|i| atom(i, depth))(input)
}

fn atom(input: &str, depth: usize) -> IResult<&str, Expr> {
    match opt(open_paren)(input)? {
        (inner, Some(_)) => {
            let depth = descend(input, depth)?;
            terminated(move |i| or_expr(i, depth), ws(char(')')))(inner)
        }
        (_, None) => alt((
            map(string_literal, |s: &str| Expr::Literal(Value::String(s.to_owned()))),
            map(number_literal, Expr::Literal),
            map(identifier, |word: &str| match word {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                path => Expr::Path(path.to_owned()),
            }),
        ))(input),
    }
}

fn open_paren(input: &str) -> IResult<&str, char> {
    char('(')(input)
}

fn not_op(input: &str) -> IResult<&str, char> {
    char('!')(input)
}

fn string_literal(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
    ))(input)
}

fn number_literal(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1))))),
        |text: &str| {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Number(Number::from(i)));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or("not a finite number")
        },
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')),
    ))(input)
}
