// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Baseline rewrite rules
//!
//! Every rule is a pure function from a node to an optional replacement
//! subtree. A rule fires only when its structural precondition matches, must
//! preserve semantics and well-typedness, and never touches the catalog.
//! Rules are applied by the engine in the order returned by
//! [`baseline_rules`]; the first match at a node wins.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::plan::logical::{JoinType, PlanNode, ProjectExpr, ScalarExpr};

/// A named local rewrite: returns a replacement subtree when it applies
#[derive(Clone, Copy)]
pub struct RewriteRule {
    pub name: &'static str,
    pub rewrite: fn(&PlanNode) -> Option<PlanNode>,
}

impl std::fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteRule").field("name", &self.name).finish()
    }
}

/// The baseline rule set, in fixed priority order
pub fn baseline_rules() -> Vec<RewriteRule> {
    vec![
        RewriteRule {
            name: "remove-trivial-filter",
            rewrite: remove_trivial_filter,
        },
        RewriteRule {
            name: "merge-filters",
            rewrite: merge_filters,
        },
        RewriteRule {
            name: "remove-trivial-aggregate",
            rewrite: remove_trivial_aggregate,
        },
        RewriteRule {
            name: "push-filter-through-project",
            rewrite: push_filter_through_project,
        },
        RewriteRule {
            name: "prune-empty",
            rewrite: prune_empty,
        },
    ]
}

/// `Filter(TRUE, X)` -> `X`; `Filter(FALSE | NULL, X)` -> `Empty`
fn remove_trivial_filter(node: &PlanNode) -> Option<PlanNode> {
    let (predicate, input) = match node {
        PlanNode::Filter { predicate, input } => (predicate, input),
        _ => return None,
    };
    match const_value(predicate) {
        Some(Literal::Boolean(true)) => Some((**input).clone()),
        Some(Literal::Boolean(false)) | Some(Literal::Null) => Some(PlanNode::Empty {
            schema: input.output_schema(),
        }),
        _ => None,
    }
}

/// `Filter(p2, Filter(p1, X))` -> `Filter(p1 AND p2, X)`
fn merge_filters(node: &PlanNode) -> Option<PlanNode> {
    if let PlanNode::Filter { predicate, input } = node {
        if let PlanNode::Filter {
            predicate: inner_predicate,
            input: inner_input,
        } = &**input
        {
            return Some(PlanNode::Filter {
                predicate: ScalarExpr::and(inner_predicate.clone(), predicate.clone()),
                input: inner_input.clone(),
            });
        }
    }
    None
}

/// An Aggregate with no group keys and no aggregate calls passes its child
/// through
fn remove_trivial_aggregate(node: &PlanNode) -> Option<PlanNode> {
    if let PlanNode::Aggregate {
        group_by,
        aggregates,
        input,
    } = node
    {
        if group_by.is_empty() && aggregates.is_empty() {
            return Some((**input).clone());
        }
    }
    None
}

/// Push a Filter below a Project whose referenced outputs are all
/// pass-through columns, rewriting the predicate to the source columns
fn push_filter_through_project(node: &PlanNode) -> Option<PlanNode> {
    let (predicate, input) = match node {
        PlanNode::Filter { predicate, input } => (predicate, input),
        _ => return None,
    };
    let (exprs, project_input) = match &**input {
        PlanNode::Project { exprs, input } => (exprs, input),
        _ => return None,
    };

    let outputs: HashMap<&str, &ProjectExpr> =
        exprs.iter().map(|p| (p.alias.as_str(), p)).collect();

    // Every referenced output must be a plain column the Project passes
    // through unchanged
    let mut pushable = true;
    predicate.for_each_column(&mut |r| {
        if r.qualifier.is_some() {
            pushable = false;
            return;
        }
        match outputs.get(r.name.as_str()) {
            Some(p) if matches!(p.expr, ScalarExpr::Column(_)) => {}
            _ => pushable = false,
        }
    });
    if !pushable {
        return None;
    }

    let rewritten = predicate.map_columns(&|r| {
        if r.qualifier.is_some() {
            return None;
        }
        outputs.get(r.name.as_str()).map(|p| p.expr.clone())
    });

    Some(PlanNode::Project {
        exprs: exprs.clone(),
        input: Box::new(PlanNode::Filter {
            predicate: rewritten,
            input: project_input.clone(),
        }),
    })
}

/// Replace operators over statically empty inputs with an Empty marker
///
/// `Limit 0` is itself statically empty. An Aggregate is pruned only when it
/// has group keys: a global aggregate over an empty input still produces one
/// row.
fn prune_empty(node: &PlanNode) -> Option<PlanNode> {
    let empty = |node: &PlanNode| PlanNode::Empty {
        schema: node.output_schema(),
    };
    match node {
        PlanNode::Limit { count: 0, .. } => Some(empty(node)),
        PlanNode::Limit { input, .. }
        | PlanNode::Sort { input, .. }
        | PlanNode::Filter { input, .. }
        | PlanNode::Project { input, .. }
            if input.is_empty_rel() =>
        {
            Some(empty(node))
        }
        PlanNode::Aggregate {
            group_by, input, ..
        } if !group_by.is_empty() && input.is_empty_rel() => Some(empty(node)),
        PlanNode::Join {
            join_type,
            left,
            right,
            ..
        } => {
            let prunable = match join_type {
                JoinType::Inner | JoinType::Cross => {
                    left.is_empty_rel() || right.is_empty_rel()
                }
                JoinType::Left => left.is_empty_rel(),
                JoinType::Right => right.is_empty_rel(),
            };
            if prunable {
                Some(empty(node))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Evaluate an expression to a literal when it contains no column references
pub(crate) fn const_value(expr: &ScalarExpr) -> Option<Literal> {
    match expr {
        ScalarExpr::Literal(l) => Some(l.clone()),
        ScalarExpr::Column(_) => None,
        ScalarExpr::Binary { op, left, right } => {
            let left = const_value(left)?;
            let right = const_value(right)?;
            eval_binary(*op, &left, &right)
        }
        ScalarExpr::Unary { op, operand } => {
            let value = const_value(operand)?;
            match op {
                UnaryOp::Not => match value {
                    Literal::Boolean(b) => Some(Literal::Boolean(!b)),
                    Literal::Null => Some(Literal::Null),
                    _ => None,
                },
                UnaryOp::Neg => match value {
                    Literal::Integer(i) => i.checked_neg().map(Literal::Integer),
                    Literal::Float(x) => Some(Literal::Float(-x)),
                    Literal::Null => Some(Literal::Null),
                    _ => None,
                },
            }
        }
        ScalarExpr::IsNull { negated, operand } => {
            let value = const_value(operand)?;
            let is_null = matches!(value, Literal::Null);
            Some(Literal::Boolean(is_null != *negated))
        }
    }
}

/// SQL truth value: TRUE, FALSE, or unknown (NULL)
fn truth(literal: &Literal) -> Option<Option<bool>> {
    match literal {
        Literal::Boolean(b) => Some(Some(*b)),
        Literal::Null => Some(None),
        _ => None,
    }
}

fn eval_binary(op: BinaryOp, left: &Literal, right: &Literal) -> Option<Literal> {
    if op.is_logical() {
        let l = truth(left)?;
        let r = truth(right)?;
        let result = match op {
            BinaryOp::And => match (l, r) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            _ => match (l, r) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        };
        return Some(match result {
            Some(b) => Literal::Boolean(b),
            None => Literal::Null,
        });
    }

    if matches!(left, Literal::Null) || matches!(right, Literal::Null) {
        return Some(Literal::Null);
    }

    if op.is_comparison() {
        let ordering = compare(left, right)?;
        let result = match op {
            BinaryOp::Eq => ordering == Ordering::Equal,
            BinaryOp::NotEq => ordering != Ordering::Equal,
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::LtEq => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::GtEq => ordering != Ordering::Less,
            _ => return None,
        };
        return Some(Literal::Boolean(result));
    }

    match (left, right) {
        (Literal::Integer(a), Literal::Integer(b)) => match op {
            BinaryOp::Plus => a.checked_add(*b).map(Literal::Integer),
            BinaryOp::Minus => a.checked_sub(*b).map(Literal::Integer),
            BinaryOp::Multiply => a.checked_mul(*b).map(Literal::Integer),
            BinaryOp::Divide => {
                if *b == 0 {
                    None
                } else {
                    a.checked_div(*b).map(Literal::Integer)
                }
            }
            _ => None,
        },
        _ => {
            let a = as_f64(left)?;
            let b = as_f64(right)?;
            let value = match op {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => {
                    if b == 0.0 {
                        return None;
                    }
                    a / b
                }
                _ => return None,
            };
            Some(Literal::Float(value))
        }
    }
}

fn compare(left: &Literal, right: &Literal) -> Option<Ordering> {
    match (left, right) {
        (Literal::Integer(a), Literal::Integer(b)) => Some(a.cmp(b)),
        (Literal::String(a), Literal::String(b)) => Some(a.cmp(b)),
        (Literal::Boolean(a), Literal::Boolean(b)) => Some(a.cmp(b)),
        _ => {
            let a = as_f64(left)?;
            let b = as_f64(right)?;
            a.partial_cmp(&b)
        }
    }
}

fn as_f64(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Integer(i) => Some(*i as f64),
        Literal::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;
    use crate::plan::logical::{ColumnRef, Field, RowType, ScalarType};

    fn scan() -> PlanNode {
        PlanNode::Scan {
            table: "users".to_string(),
            alias: "u".to_string(),
            schema: RowType::new(vec![Field {
                qualifier: Some("u".to_string()),
                name: "id".to_string(),
                ty: ScalarType::Value(ColumnType::Integer),
            }]),
        }
    }

    fn id_ref() -> ScalarExpr {
        ScalarExpr::Column(ColumnRef {
            qualifier: Some("u".to_string()),
            name: "id".to_string(),
            ty: ScalarType::Value(ColumnType::Integer),
        })
    }

    fn literal(v: i64) -> ScalarExpr {
        ScalarExpr::Literal(Literal::Integer(v))
    }

    fn eq(left: ScalarExpr, right: ScalarExpr) -> ScalarExpr {
        ScalarExpr::Binary {
            op: BinaryOp::Eq,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn one_equals_one_is_always_true() {
        assert_eq!(
            const_value(&eq(literal(1), literal(1))),
            Some(Literal::Boolean(true))
        );
        assert_eq!(
            const_value(&eq(literal(1), literal(2))),
            Some(Literal::Boolean(false))
        );
    }

    #[test]
    fn null_comparison_is_null() {
        assert_eq!(
            const_value(&eq(literal(1), ScalarExpr::Literal(Literal::Null))),
            Some(Literal::Null)
        );
    }

    #[test]
    fn column_expressions_do_not_fold() {
        assert_eq!(const_value(&eq(id_ref(), literal(1))), None);
    }

    #[test]
    fn tautological_filter_is_removed() {
        let plan = PlanNode::Filter {
            predicate: eq(literal(1), literal(1)),
            input: Box::new(scan()),
        };
        let rewritten = remove_trivial_filter(&plan).unwrap();
        assert_eq!(rewritten, scan());
    }

    #[test]
    fn contradictory_filter_becomes_empty() {
        let plan = PlanNode::Filter {
            predicate: eq(literal(1), literal(2)),
            input: Box::new(scan()),
        };
        let rewritten = remove_trivial_filter(&plan).unwrap();
        match rewritten {
            PlanNode::Empty { schema } => assert_eq!(schema, scan().output_schema()),
            other => panic!("unexpected rewrite: {}", other),
        }
    }

    #[test]
    fn genuine_filter_is_kept() {
        let plan = PlanNode::Filter {
            predicate: eq(id_ref(), literal(1)),
            input: Box::new(scan()),
        };
        assert!(remove_trivial_filter(&plan).is_none());
    }

    #[test]
    fn adjacent_filters_merge_conjunctively() {
        let p1 = eq(id_ref(), literal(1));
        let p2 = eq(id_ref(), literal(2));
        let plan = PlanNode::Filter {
            predicate: p2.clone(),
            input: Box::new(PlanNode::Filter {
                predicate: p1.clone(),
                input: Box::new(scan()),
            }),
        };
        let rewritten = merge_filters(&plan).unwrap();
        assert_eq!(
            rewritten,
            PlanNode::Filter {
                predicate: ScalarExpr::and(p1, p2),
                input: Box::new(scan()),
            }
        );
    }

    #[test]
    fn empty_aggregate_passes_child_through() {
        let plan = PlanNode::Aggregate {
            group_by: vec![],
            aggregates: vec![],
            input: Box::new(scan()),
        };
        assert_eq!(remove_trivial_aggregate(&plan).unwrap(), scan());
    }

    #[test]
    fn grouping_aggregate_is_kept() {
        let plan = PlanNode::Aggregate {
            group_by: vec![id_ref()],
            aggregates: vec![],
            input: Box::new(scan()),
        };
        assert!(remove_trivial_aggregate(&plan).is_none());
    }

    #[test]
    fn filter_pushes_through_pass_through_project() {
        let project = PlanNode::Project {
            exprs: vec![ProjectExpr {
                expr: id_ref(),
                alias: "user_id".to_string(),
            }],
            input: Box::new(scan()),
        };
        let filter = PlanNode::Filter {
            predicate: eq(
                ScalarExpr::Column(ColumnRef {
                    qualifier: None,
                    name: "user_id".to_string(),
                    ty: ScalarType::Value(ColumnType::Integer),
                }),
                literal(7),
            ),
            input: Box::new(project),
        };

        let rewritten = push_filter_through_project(&filter).unwrap();
        match &rewritten {
            PlanNode::Project { input, .. } => match &**input {
                PlanNode::Filter { predicate, .. } => {
                    assert_eq!(*predicate, eq(id_ref(), literal(7)));
                }
                other => panic!("unexpected input: {}", other),
            },
            other => panic!("unexpected rewrite: {}", other),
        }
        rewritten.validate().unwrap();
    }

    #[test]
    fn filter_on_computed_output_stays_put() {
        let project = PlanNode::Project {
            exprs: vec![ProjectExpr {
                expr: ScalarExpr::Binary {
                    op: BinaryOp::Plus,
                    left: Box::new(id_ref()),
                    right: Box::new(literal(1)),
                },
                alias: "next_id".to_string(),
            }],
            input: Box::new(scan()),
        };
        let filter = PlanNode::Filter {
            predicate: eq(
                ScalarExpr::Column(ColumnRef {
                    qualifier: None,
                    name: "next_id".to_string(),
                    ty: ScalarType::Value(ColumnType::Integer),
                }),
                literal(7),
            ),
            input: Box::new(project),
        };
        assert!(push_filter_through_project(&filter).is_none());
    }

    #[test]
    fn limit_zero_becomes_empty() {
        let plan = PlanNode::Limit {
            count: 0,
            offset: 0,
            input: Box::new(scan()),
        };
        assert!(matches!(
            prune_empty(&plan),
            Some(PlanNode::Empty { .. })
        ));
    }

    #[test]
    fn join_over_empty_side_is_pruned() {
        let empty = PlanNode::Empty {
            schema: scan().output_schema(),
        };
        let join = PlanNode::Join {
            join_type: JoinType::Inner,
            condition: None,
            left: Box::new(empty.clone()),
            right: Box::new(scan()),
        };
        assert!(matches!(prune_empty(&join), Some(PlanNode::Empty { .. })));

        // A left join only collapses when its left side is empty
        let left_join = PlanNode::Join {
            join_type: JoinType::Left,
            condition: None,
            left: Box::new(scan()),
            right: Box::new(empty),
        };
        assert!(prune_empty(&left_join).is_none());
    }

    #[test]
    fn global_aggregate_over_empty_is_kept() {
        let plan = PlanNode::Aggregate {
            group_by: vec![],
            aggregates: vec![crate::plan::logical::AggregateExpr {
                function: crate::plan::logical::AggregateFunction::Count,
                arg: None,
                distinct: false,
                alias: "cnt".to_string(),
            }],
            input: Box::new(PlanNode::Empty {
                schema: scan().output_schema(),
            }),
        };
        assert!(prune_empty(&plan).is_none());
    }
}
