// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical plan representation
//!
//! A plan is an owned tree of relational operators. Every scalar expression
//! inside a plan is fully resolved: column references carry the
//! (table alias, column, type) triple they were bound to. The row type of any
//! node is derivable from its children via [`PlanNode::output_schema`], and
//! [`PlanNode::validate`] re-checks that derivation after rewrites.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::catalog::{ColumnType, TypeFamily};

/// Type of a resolved scalar expression
///
/// `Null` is the type of the bare NULL literal, compatible with every family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    Value(ColumnType),
    Null,
}

impl ScalarType {
    pub fn family(self) -> Option<TypeFamily> {
        match self {
            ScalarType::Value(ty) => Some(ty.family()),
            ScalarType::Null => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self.family(), Some(TypeFamily::Numeric) | None)
    }

    pub fn is_boolean(self) -> bool {
        matches!(self.family(), Some(TypeFamily::Boolean) | None)
    }

    /// Whether values of the two types may be compared directly
    pub fn comparable_with(self, other: ScalarType) -> bool {
        match (self.family(), other.family()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Value(ty) => write!(f, "{}", ty),
            ScalarType::Null => write!(f, "NULL"),
        }
    }
}

/// A resolved column reference: (table alias, column, type)
///
/// References to Project or Aggregate outputs have no qualifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
    pub ty: ScalarType,
}

/// A resolved scalar expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpr {
    Column(ColumnRef),
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ScalarExpr>,
    },
    IsNull {
        negated: bool,
        operand: Box<ScalarExpr>,
    },
}

impl ScalarExpr {
    /// The type this expression evaluates to
    pub fn ty(&self) -> ScalarType {
        match self {
            ScalarExpr::Column(r) => r.ty,
            ScalarExpr::Literal(l) => literal_type(l),
            ScalarExpr::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    ScalarType::Value(ColumnType::Boolean)
                } else {
                    arithmetic_type(left.ty(), right.ty())
                }
            }
            ScalarExpr::Unary { op, operand } => match op {
                UnaryOp::Not => ScalarType::Value(ColumnType::Boolean),
                UnaryOp::Neg => operand.ty(),
            },
            ScalarExpr::IsNull { .. } => ScalarType::Value(ColumnType::Boolean),
        }
    }

    /// Conjunction of two predicates
    pub fn and(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        ScalarExpr::Binary {
            op: BinaryOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Visit every column reference in the expression
    pub fn for_each_column<'a>(&'a self, f: &mut impl FnMut(&'a ColumnRef)) {
        match self {
            ScalarExpr::Column(r) => f(r),
            ScalarExpr::Literal(_) => {}
            ScalarExpr::Binary { left, right, .. } => {
                left.for_each_column(f);
                right.for_each_column(f);
            }
            ScalarExpr::Unary { operand, .. } | ScalarExpr::IsNull { operand, .. } => {
                operand.for_each_column(f)
            }
        }
    }

    /// All column references in the expression
    pub fn references(&self) -> Vec<&ColumnRef> {
        let mut refs = Vec::new();
        self.for_each_column(&mut |r| refs.push(r));
        refs
    }

    /// Rebuild the expression, replacing column references where the mapper
    /// returns a substitute
    pub fn map_columns(&self, f: &impl Fn(&ColumnRef) -> Option<ScalarExpr>) -> ScalarExpr {
        match self {
            ScalarExpr::Column(r) => f(r).unwrap_or_else(|| self.clone()),
            ScalarExpr::Literal(_) => self.clone(),
            ScalarExpr::Binary { op, left, right } => ScalarExpr::Binary {
                op: *op,
                left: Box::new(left.map_columns(f)),
                right: Box::new(right.map_columns(f)),
            },
            ScalarExpr::Unary { op, operand } => ScalarExpr::Unary {
                op: *op,
                operand: Box::new(operand.map_columns(f)),
            },
            ScalarExpr::IsNull { negated, operand } => ScalarExpr::IsNull {
                negated: *negated,
                operand: Box::new(operand.map_columns(f)),
            },
        }
    }
}

fn literal_type(literal: &Literal) -> ScalarType {
    match literal {
        Literal::Integer(_) => ScalarType::Value(ColumnType::Integer),
        Literal::Float(_) => ScalarType::Value(ColumnType::Double),
        Literal::String(_) => ScalarType::Value(ColumnType::Varchar),
        Literal::Boolean(_) => ScalarType::Value(ColumnType::Boolean),
        Literal::Null => ScalarType::Null,
    }
}

fn arithmetic_type(left: ScalarType, right: ScalarType) -> ScalarType {
    use ColumnType::*;
    match (left, right) {
        (ScalarType::Null, _) | (_, ScalarType::Null) => ScalarType::Null,
        (ScalarType::Value(a), ScalarType::Value(b)) => {
            if matches!(a, Float | Double) || matches!(b, Float | Double) {
                ScalarType::Value(Double)
            } else if a == BigInt || b == BigInt {
                ScalarType::Value(BigInt)
            } else {
                ScalarType::Value(Integer)
            }
        }
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarExpr::Column(r) => match &r.qualifier {
                Some(q) => write!(f, "{}.{}", q, r.name),
                None => write!(f, "{}", r.name),
            },
            ScalarExpr::Literal(l) => write!(f, "{}", l),
            ScalarExpr::Binary { op, left, right } => {
                fmt_operand(f, left, op.precedence(), false)?;
                write!(f, " {} ", op)?;
                fmt_operand(f, right, op.precedence(), true)
            }
            ScalarExpr::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    if matches!(**operand, ScalarExpr::Binary { .. }) {
                        write!(f, "NOT ({})", operand)
                    } else {
                        write!(f, "NOT {}", operand)
                    }
                }
                UnaryOp::Neg => {
                    if matches!(**operand, ScalarExpr::Binary { .. }) {
                        write!(f, "-({})", operand)
                    } else {
                        write!(f, "-{}", operand)
                    }
                }
            },
            ScalarExpr::IsNull { negated, operand } => {
                let needs_parens = matches!(**operand, ScalarExpr::Binary { .. });
                if needs_parens {
                    write!(f, "({})", operand)?;
                } else {
                    write!(f, "{}", operand)?;
                }
                if *negated {
                    write!(f, " IS NOT NULL")
                } else {
                    write!(f, " IS NULL")
                }
            }
        }
    }
}

fn fmt_operand(
    f: &mut fmt::Formatter<'_>,
    operand: &ScalarExpr,
    parent_precedence: u8,
    is_right: bool,
) -> fmt::Result {
    let needs_parens = match operand {
        ScalarExpr::Binary { op, .. } => {
            op.precedence() < parent_precedence
                || (is_right && op.precedence() == parent_precedence)
        }
        _ => false,
    };
    if needs_parens {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}

/// Aggregate functions understood by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    /// Result type given the argument type (`None` for `COUNT(*)`)
    pub fn result_type(self, arg: Option<ScalarType>) -> ScalarType {
        match self {
            AggregateFunction::Count => ScalarType::Value(ColumnType::BigInt),
            AggregateFunction::Avg => ScalarType::Value(ColumnType::Double),
            AggregateFunction::Sum => match arg {
                Some(ScalarType::Value(ColumnType::Float))
                | Some(ScalarType::Value(ColumnType::Double)) => {
                    ScalarType::Value(ColumnType::Double)
                }
                Some(ScalarType::Null) | None => ScalarType::Null,
                _ => ScalarType::Value(ColumnType::BigInt),
            },
            AggregateFunction::Min | AggregateFunction::Max => arg.unwrap_or(ScalarType::Null),
        }
    }
}

/// An aggregate call with its output name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    /// `None` for `COUNT(*)`
    pub arg: Option<ScalarExpr>,
    pub distinct: bool,
    pub alias: String,
}

impl AggregateExpr {
    pub fn result_type(&self) -> ScalarType {
        self.function.result_type(self.arg.as_ref().map(|a| a.ty()))
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.function.name();
        match &self.arg {
            None => write!(f, "{}(*)", name),
            Some(arg) if self.distinct => write!(f, "{}(DISTINCT {})", name, arg),
            Some(arg) => write!(f, "{}({})", name, arg),
        }
    }
}

/// One projected output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectExpr {
    pub expr: ScalarExpr,
    /// Output column name
    pub alias: String,
}

impl fmt::Display for ProjectExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr {
            ScalarExpr::Column(r) if r.name == self.alias => write!(f, "{}", self.expr),
            _ => write!(f, "{} AS {}", self.expr, self.alias),
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: ScalarExpr,
    pub ascending: bool,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ascending {
            write!(f, "{}", self.expr)
        } else {
            write!(f, "{} DESC", self.expr)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "Inner",
            JoinType::Left => "Left",
            JoinType::Right => "Right",
            JoinType::Cross => "Cross",
        };
        write!(f, "{}", name)
    }
}

/// One output column of an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub qualifier: Option<String>,
    pub name: String,
    pub ty: ScalarType,
}

/// The row type of an operator's output
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowType {
    pub fields: Vec<Field>,
}

impl RowType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Whether a resolved reference is bound by this row type
    pub fn contains(&self, reference: &ColumnRef) -> bool {
        self.fields
            .iter()
            .any(|f| f.qualifier == reference.qualifier && f.name == reference.name)
    }

    /// Concatenate two row types (join output)
    pub fn concat(mut self, other: RowType) -> RowType {
        self.fields.extend(other.fields);
        self
    }
}

/// A relational operator tree
///
/// Each node owns its children exclusively; rewrites replace subtrees rather
/// than mutating them in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    Scan {
        table: String,
        alias: String,
        schema: RowType,
    },
    Filter {
        predicate: ScalarExpr,
        input: Box<PlanNode>,
    },
    Project {
        exprs: Vec<ProjectExpr>,
        input: Box<PlanNode>,
    },
    Join {
        join_type: JoinType,
        condition: Option<ScalarExpr>,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },
    Aggregate {
        group_by: Vec<ScalarExpr>,
        aggregates: Vec<AggregateExpr>,
        input: Box<PlanNode>,
    },
    Sort {
        keys: Vec<SortKey>,
        input: Box<PlanNode>,
    },
    Limit {
        count: u64,
        offset: u64,
        input: Box<PlanNode>,
    },
    /// One row, no columns; the base of a SELECT without FROM
    SingleRow,
    /// Statically empty result with a known row type
    Empty { schema: RowType },
}

impl PlanNode {
    /// The output field a group key contributes, by position
    ///
    /// Plain column keys keep their qualified identity; computed keys get a
    /// positional name.
    pub fn aggregate_key_field(key: &ScalarExpr, index: usize) -> Field {
        match key {
            ScalarExpr::Column(r) => Field {
                qualifier: r.qualifier.clone(),
                name: r.name.clone(),
                ty: r.ty,
            },
            other => Field {
                qualifier: None,
                name: format!("expr{}", index),
                ty: other.ty(),
            },
        }
    }

    /// Derive this node's row type from its children
    pub fn output_schema(&self) -> RowType {
        match self {
            PlanNode::Scan { schema, .. } | PlanNode::Empty { schema } => schema.clone(),
            PlanNode::Filter { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Limit { input, .. } => input.output_schema(),
            PlanNode::Project { exprs, .. } => RowType::new(
                exprs
                    .iter()
                    .map(|p| Field {
                        qualifier: None,
                        name: p.alias.clone(),
                        ty: p.expr.ty(),
                    })
                    .collect(),
            ),
            PlanNode::Join { left, right, .. } => {
                left.output_schema().concat(right.output_schema())
            }
            PlanNode::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                let mut fields: Vec<Field> = group_by
                    .iter()
                    .enumerate()
                    .map(|(i, key)| Self::aggregate_key_field(key, i))
                    .collect();
                fields.extend(aggregates.iter().map(|a| Field {
                    qualifier: None,
                    name: a.alias.clone(),
                    ty: a.result_type(),
                }));
                RowType::new(fields)
            }
            PlanNode::SingleRow => RowType::default(),
        }
    }

    pub fn is_empty_rel(&self) -> bool {
        matches!(self, PlanNode::Empty { .. })
    }

    /// Structural invariant check: every column reference must be bound by
    /// its input's row type, and predicates must be boolean
    ///
    /// Violations after a rewrite are fatal planner bugs, not user errors.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PlanNode::Scan { .. } | PlanNode::SingleRow | PlanNode::Empty { .. } => Ok(()),
            PlanNode::Filter { predicate, input } => {
                input.validate()?;
                check_bound(predicate, &input.output_schema(), "Filter predicate")?;
                if !predicate.ty().is_boolean() {
                    return Err(format!(
                        "Filter predicate has non-boolean type {}",
                        predicate.ty()
                    ));
                }
                Ok(())
            }
            PlanNode::Project { exprs, input } => {
                input.validate()?;
                let schema = input.output_schema();
                for p in exprs {
                    check_bound(&p.expr, &schema, "Project expression")?;
                }
                Ok(())
            }
            PlanNode::Join {
                condition,
                left,
                right,
                ..
            } => {
                left.validate()?;
                right.validate()?;
                if let Some(condition) = condition {
                    let schema = left.output_schema().concat(right.output_schema());
                    check_bound(condition, &schema, "Join condition")?;
                    if !condition.ty().is_boolean() {
                        return Err(format!(
                            "Join condition has non-boolean type {}",
                            condition.ty()
                        ));
                    }
                }
                Ok(())
            }
            PlanNode::Aggregate {
                group_by,
                aggregates,
                input,
            } => {
                input.validate()?;
                let schema = input.output_schema();
                for key in group_by {
                    check_bound(key, &schema, "group key")?;
                }
                for agg in aggregates {
                    if let Some(arg) = &agg.arg {
                        check_bound(arg, &schema, "aggregate argument")?;
                    }
                }
                Ok(())
            }
            PlanNode::Sort { keys, input } => {
                input.validate()?;
                let schema = input.output_schema();
                for key in keys {
                    check_bound(&key.expr, &schema, "sort key")?;
                }
                Ok(())
            }
            PlanNode::Limit { input, .. } => input.validate(),
        }
    }

    fn describe(&self) -> String {
        match self {
            PlanNode::Scan { table, alias, .. } => {
                if alias == table {
                    format!("Scan[{}]", table)
                } else {
                    format!("Scan[{} AS {}]", table, alias)
                }
            }
            PlanNode::Filter { predicate, .. } => format!("Filter[{}]", predicate),
            PlanNode::Project { exprs, .. } => format!("Project[{}]", comma_join(exprs)),
            PlanNode::Join {
                join_type,
                condition,
                ..
            } => match condition {
                Some(c) => format!("Join[{}, {}]", join_type, c),
                None => format!("Join[{}]", join_type),
            },
            PlanNode::Aggregate {
                group_by,
                aggregates,
                ..
            } => format!(
                "Aggregate[group_by=[{}], aggregates=[{}]]",
                comma_join(group_by),
                comma_join(aggregates)
            ),
            PlanNode::Sort { keys, .. } => format!("Sort[{}]", comma_join(keys)),
            PlanNode::Limit { count, offset, .. } => {
                if *offset > 0 {
                    format!("Limit[{} OFFSET {}]", count, offset)
                } else {
                    format!("Limit[{}]", count)
                }
            }
            PlanNode::SingleRow => "SingleRow".to_string(),
            PlanNode::Empty { schema } => format!("Empty[{} columns]", schema.fields.len()),
        }
    }

    fn collect_lines(&self, indent: usize, lines: &mut Vec<String>) {
        lines.push(format!("{}{}", "  ".repeat(indent), self.describe()));
        match self {
            PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Aggregate { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Limit { input, .. } => input.collect_lines(indent + 1, lines),
            PlanNode::Join { left, right, .. } => {
                left.collect_lines(indent + 1, lines);
                right.collect_lines(indent + 1, lines);
            }
            PlanNode::Scan { .. } | PlanNode::SingleRow | PlanNode::Empty { .. } => {}
        }
    }
}

fn check_bound(expr: &ScalarExpr, schema: &RowType, context: &str) -> Result<(), String> {
    let mut unbound = None;
    expr.for_each_column(&mut |r| {
        if unbound.is_none() && !schema.contains(r) {
            unbound = Some(r.clone());
        }
    });
    match unbound {
        Some(r) => Err(format!(
            "{} references unbound column {}",
            context,
            ScalarExpr::Column(r)
        )),
        None => Ok(()),
    }
}

fn comma_join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        self.collect_lines(0, &mut lines);
        write!(f, "{}", lines.join("\n"))
    }
}
