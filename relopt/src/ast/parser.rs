// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! nom-based parser for the SQL SELECT subset
//!
//! Produces the unresolved AST in [`crate::ast`]. Unquoted identifiers and
//! keywords are case-insensitive; unquoted identifiers fold to lower case,
//! while backtick- or double-quoted identifiers keep their spelling.

use std::collections::HashSet;

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while1};
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, map, opt, recognize, value};
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::{fold_many0, many0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::Err as NomErr;
use nom::IResult;
use once_cell::sync::Lazy;
use thiserror::Error;

use super::{
    BinaryOp, Expr, FromClause, FunctionArgs, JoinClause, JoinKind, Literal, LimitClause,
    OrderItem, SelectItem, SelectStatement, TableRef, UnaryOp,
};

/// Malformed query text, with the position of the offending token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl ParseError {
    fn at(full: &str, remaining: &str) -> Self {
        let offset = full.len() - remaining.len();
        let consumed = &full[..offset];
        let line = consumed.matches('\n').count() as u32 + 1;
        let column = consumed.rsplit('\n').next().unwrap_or("").chars().count() as u32 + 1;
        let message = if remaining.trim().is_empty() {
            "unexpected end of input".to_string()
        } else {
            let snippet: String = remaining.trim_start().chars().take(24).collect();
            format!("unexpected input near '{}'", snippet)
        };
        ParseError {
            line,
            column,
            message,
        }
    }
}

/// Parse a single SELECT statement, optionally terminated by `;`
pub fn parse_select(input: &str) -> Result<SelectStatement, ParseError> {
    let result = all_consuming(terminated(
        select_statement,
        tuple((multispace0, opt(char(';')), multispace0)),
    ))(input);

    match result {
        Ok((_, statement)) => Ok(statement),
        Err(NomErr::Error(e)) | Err(NomErr::Failure(e)) => Err(ParseError::at(input, e.input)),
        Err(NomErr::Incomplete(_)) => Err(ParseError::at(input, "")),
    }
}

static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "select", "distinct", "all", "from", "where", "group", "by", "having", "order", "limit",
        "offset", "join", "inner", "left", "right", "outer", "cross", "on", "as", "and", "or",
        "not", "is", "null", "true", "false", "asc", "desc",
    ]
    .into_iter()
    .collect()
});

/// Whether a word is a reserved keyword of the SELECT grammar
pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(word.to_ascii_lowercase().as_str())
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Skip leading whitespace, then run the inner parser
fn ws<'a, O, F>(mut inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let (input, _) = multispace0(input)?;
        inner(input)
    }
}

/// Match a keyword case-insensitively, rejecting longer identifiers
fn keyword(kw: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input: &str| {
        let (rest, matched) = tag_no_case(kw)(input)?;
        if rest.chars().next().map_or(false, is_ident_char) {
            Err(NomErr::Error(NomError::new(input, ErrorKind::Tag)))
        } else {
            Ok((rest, matched))
        }
    }
}

fn bare_identifier(input: &str) -> IResult<&str, String> {
    let (rest, word) = recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)?;
    if is_reserved(word) {
        Err(NomErr::Error(NomError::new(input, ErrorKind::Verify)))
    } else {
        Ok((rest, word.to_ascii_lowercase()))
    }
}

fn quoted_identifier(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('`'), take_while1(|c: char| c != '`'), char('`')),
            delimited(char('"'), take_while1(|c: char| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, String> {
    alt((quoted_identifier, bare_identifier))(input)
}

fn number_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, text) = recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)?;
    if rest.chars().next().map_or(false, is_ident_char) {
        return Err(NomErr::Error(NomError::new(input, ErrorKind::Digit)));
    }
    let literal = if text.contains('.') {
        match text.parse::<f64>() {
            Ok(v) => Literal::Float(v),
            Err(_) => return Err(NomErr::Error(NomError::new(input, ErrorKind::Float))),
        }
    } else {
        match text.parse::<i64>() {
            Ok(v) => Literal::Integer(v),
            Err(_) => return Err(NomErr::Error(NomError::new(input, ErrorKind::Digit))),
        }
    };
    Ok((rest, literal))
}

/// Single-quoted string literal; `''` escapes a quote
fn string_literal(input: &str) -> IResult<&str, Literal> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        match rest.find('\'') {
            Some(i) => {
                out.push_str(&rest[..i]);
                if rest[i + 1..].starts_with('\'') {
                    out.push('\'');
                    rest = &rest[i + 2..];
                } else {
                    return Ok((&rest[i + 1..], Literal::String(out)));
                }
            }
            None => return Err(NomErr::Error(NomError::new(rest, ErrorKind::Char))),
        }
    }
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        number_literal,
        string_literal,
        value(Literal::Boolean(true), keyword("true")),
        value(Literal::Boolean(false), keyword("false")),
        value(Literal::Null, keyword("null")),
    ))(input)
}

/// Left-associative chain: `operand (op operand)*`
fn binary_chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
    op: fn(&'a str) -> IResult<&'a str, BinaryOp>,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input)?;
    fold_many0(
        pair(op, operand),
        move || first.clone(),
        |left, (op, right)| Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    )(input)
}

pub(crate) fn expr(input: &str) -> IResult<&str, Expr> {
    or_expr(input)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, and_expr, or_op)
}

fn or_op(input: &str) -> IResult<&str, BinaryOp> {
    value(BinaryOp::Or, ws(keyword("or")))(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, not_expr, and_op)
}

fn and_op(input: &str) -> IResult<&str, BinaryOp> {
    value(BinaryOp::And, ws(keyword("and")))(input)
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(keyword("not")), not_expr), |operand| {
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            }
        }),
        comparison,
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, left) = additive(input)?;

    if let Ok((rest, negated)) = is_null_suffix(input) {
        return Ok((
            rest,
            Expr::IsNull {
                negated,
                operand: Box::new(left),
            },
        ));
    }

    match comparison_op(input) {
        Ok((rest, op)) => {
            let (rest, right) = additive(rest)?;
            Ok((
                rest,
                Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            ))
        }
        Err(_) => Ok((input, left)),
    }
}

fn is_null_suffix(input: &str) -> IResult<&str, bool> {
    let (input, _) = ws(keyword("is"))(input)?;
    let (input, negated) = opt(ws(keyword("not")))(input)?;
    let (input, _) = ws(keyword("null"))(input)?;
    Ok((input, negated.is_some()))
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::NotEq, tag("<>")),
        value(BinaryOp::NotEq, tag("!=")),
        value(BinaryOp::LtEq, tag("<=")),
        value(BinaryOp::GtEq, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
        value(BinaryOp::Eq, tag("=")),
    )))(input)
}

fn additive(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, multiplicative, additive_op)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::Plus, tag("+")),
        value(BinaryOp::Minus, tag("-")),
    )))(input)
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    binary_chain(input, unary, multiplicative_op)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::Multiply, tag("*")),
        value(BinaryOp::Divide, tag("/")),
    )))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |operand| Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }),
        primary,
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(literal, Expr::Literal),
        function_call,
        column_ref,
        delimited(char('('), expr, ws(char(')'))),
    )))(input)
}

fn function_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, distinct) = map(opt(ws(keyword("distinct"))), |d| d.is_some())(input)?;
    let (input, args) = alt((
        value(FunctionArgs::Star, ws(char('*'))),
        map(separated_list1(ws(char(',')), expr), FunctionArgs::Args),
    ))(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((
        input,
        Expr::Function {
            name,
            distinct,
            args,
        },
    ))
}

fn column_ref(input: &str) -> IResult<&str, Expr> {
    let (input, first) = identifier(input)?;
    match preceded(ws(char('.')), ws(identifier))(input) {
        Ok((rest, name)) => Ok((
            rest,
            Expr::Column {
                qualifier: Some(first),
                name,
            },
        )),
        Err(_) => Ok((
            input,
            Expr::Column {
                qualifier: None,
                name: first,
            },
        )),
    }
}

fn select_item(input: &str) -> IResult<&str, SelectItem> {
    ws(alt((
        value(SelectItem::Wildcard, char('*')),
        qualified_wildcard,
        expr_item,
    )))(input)
}

fn qualified_wildcard(input: &str) -> IResult<&str, SelectItem> {
    let (input, qualifier) = identifier(input)?;
    let (input, _) = ws(char('.'))(input)?;
    let (input, _) = ws(char('*'))(input)?;
    Ok((input, SelectItem::QualifiedWildcard(qualifier)))
}

fn expr_item(input: &str) -> IResult<&str, SelectItem> {
    let (input, e) = expr(input)?;
    let (input, alias) = opt(alias)(input)?;
    Ok((input, SelectItem::Expr { expr: e, alias }))
}

fn alias(input: &str) -> IResult<&str, String> {
    preceded(opt(ws(keyword("as"))), ws(identifier))(input)
}

fn table_ref(input: &str) -> IResult<&str, TableRef> {
    let (input, name) = ws(identifier)(input)?;
    let (input, alias) = opt(alias)(input)?;
    Ok((input, TableRef { name, alias }))
}

fn from_clause(input: &str) -> IResult<&str, FromClause> {
    let (input, _) = ws(keyword("from"))(input)?;
    let (input, base) = table_ref(input)?;
    let (input, joins) = many0(join_clause)(input)?;
    Ok((input, FromClause { base, joins }))
}

fn join_clause(input: &str) -> IResult<&str, JoinClause> {
    alt((comma_join, keyword_join))(input)
}

/// `FROM a, b` is a cross join
fn comma_join(input: &str) -> IResult<&str, JoinClause> {
    let (input, _) = ws(char(','))(input)?;
    let (input, table) = table_ref(input)?;
    Ok((
        input,
        JoinClause {
            kind: JoinKind::Cross,
            table,
            on: None,
        },
    ))
}

fn keyword_join(input: &str) -> IResult<&str, JoinClause> {
    let (input, kind) = join_kind(input)?;
    let (input, table) = table_ref(input)?;
    let (input, on) = if kind == JoinKind::Cross {
        (input, None)
    } else {
        opt(preceded(ws(keyword("on")), expr))(input)?
    };
    Ok((input, JoinClause { kind, table, on }))
}

fn join_kind(input: &str) -> IResult<&str, JoinKind> {
    alt((
        value(
            JoinKind::Cross,
            pair(ws(keyword("cross")), ws(keyword("join"))),
        ),
        value(
            JoinKind::Left,
            tuple((
                ws(keyword("left")),
                opt(ws(keyword("outer"))),
                ws(keyword("join")),
            )),
        ),
        value(
            JoinKind::Right,
            tuple((
                ws(keyword("right")),
                opt(ws(keyword("outer"))),
                ws(keyword("join")),
            )),
        ),
        value(
            JoinKind::Inner,
            pair(ws(keyword("inner")), ws(keyword("join"))),
        ),
        value(JoinKind::Inner, ws(keyword("join"))),
    ))(input)
}

fn group_by_clause(input: &str) -> IResult<&str, Vec<Expr>> {
    preceded(
        pair(ws(keyword("group")), ws(keyword("by"))),
        separated_list1(ws(char(',')), expr),
    )(input)
}

fn order_by_clause(input: &str) -> IResult<&str, Vec<OrderItem>> {
    preceded(
        pair(ws(keyword("order")), ws(keyword("by"))),
        separated_list1(ws(char(',')), order_item),
    )(input)
}

fn order_item(input: &str) -> IResult<&str, OrderItem> {
    let (input, e) = expr(input)?;
    let (input, direction) = opt(ws(alt((
        value(true, keyword("asc")),
        value(false, keyword("desc")),
    ))))(input)?;
    Ok((
        input,
        OrderItem {
            expr: e,
            ascending: direction.unwrap_or(true),
        },
    ))
}

fn unsigned_integer(input: &str) -> IResult<&str, u64> {
    let (rest, digits) = ws(digit1)(input)?;
    match digits.parse::<u64>() {
        Ok(v) => Ok((rest, v)),
        Err(_) => Err(NomErr::Error(NomError::new(input, ErrorKind::Digit))),
    }
}

fn limit_clause(input: &str) -> IResult<&str, LimitClause> {
    let (input, _) = ws(keyword("limit"))(input)?;
    let (input, count) = unsigned_integer(input)?;
    let (input, offset) = opt(preceded(ws(keyword("offset")), unsigned_integer))(input)?;
    Ok((input, LimitClause { count, offset }))
}

fn distinct_qualifier(input: &str) -> IResult<&str, bool> {
    let (input, d) = opt(ws(alt((
        value(true, keyword("distinct")),
        value(false, keyword("all")),
    ))))(input)?;
    Ok((input, d.unwrap_or(false)))
}

fn select_statement(input: &str) -> IResult<&str, SelectStatement> {
    let (input, _) = ws(keyword("select"))(input)?;
    let (input, distinct) = distinct_qualifier(input)?;
    let (input, items) = separated_list1(ws(char(',')), select_item)(input)?;
    let (input, from) = opt(from_clause)(input)?;
    let (input, where_clause) = opt(preceded(ws(keyword("where")), expr))(input)?;
    let (input, group_by) = opt(group_by_clause)(input)?;
    let (input, having) = opt(preceded(ws(keyword("having")), expr))(input)?;
    let (input, order_by) = opt(order_by_clause)(input)?;
    let (input, limit) = opt(limit_clause)(input)?;
    Ok((
        input,
        SelectStatement {
            distinct,
            items,
            from,
            where_clause,
            group_by: group_by.unwrap_or_default(),
            having,
            order_by: order_by.unwrap_or_default(),
            limit,
        },
    ))
}
