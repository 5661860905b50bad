// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! End-to-end pipeline tests: parse -> build -> rewrite -> render
//!
//! The schema mirrors the canonical users/jobs pair used throughout the
//! documentation; the scenarios are the externally observable laws of the
//! rule engine.

use relopt::plan::logical::{
    AggregateExpr, AggregateFunction, ColumnRef, Field, PlanNode, RowType, ScalarExpr, ScalarType,
};
use relopt::plan::optimizers::RewriteRule;
use relopt::{
    ColumnDef, ColumnType, Fixpoint, LogicalOptimizer, SchemaCatalog, SqlOptimizer, TableDef,
};

fn catalog() -> SchemaCatalog {
    SchemaCatalog::from_records(vec![
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("name", ColumnType::Varchar),
                ColumnDef::new("age", ColumnType::Integer),
            ],
        ),
        TableDef::new(
            "jobs",
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("company", ColumnType::Varchar),
            ],
        ),
    ])
    .unwrap()
}

fn optimizer() -> SqlOptimizer {
    SqlOptimizer::new(catalog())
}

fn contains_filter(plan: &PlanNode) -> bool {
    any_node(plan, &|n| matches!(n, PlanNode::Filter { .. }))
}

fn contains_join(plan: &PlanNode) -> bool {
    any_node(plan, &|n| matches!(n, PlanNode::Join { .. }))
}

fn any_node(plan: &PlanNode, predicate: &dyn Fn(&PlanNode) -> bool) -> bool {
    if predicate(plan) {
        return true;
    }
    match plan {
        PlanNode::Filter { input, .. }
        | PlanNode::Project { input, .. }
        | PlanNode::Aggregate { input, .. }
        | PlanNode::Sort { input, .. }
        | PlanNode::Limit { input, .. } => any_node(input, predicate),
        PlanNode::Join { left, right, .. } => {
            any_node(left, predicate) || any_node(right, predicate)
        }
        PlanNode::Scan { .. } | PlanNode::SingleRow | PlanNode::Empty { .. } => false,
    }
}

#[test]
fn tautology_is_removed_but_join_remains() {
    let report = optimizer()
        .optimize("select u.id from users u join jobs j on u.id = j.id where 1 = 1")
        .unwrap();

    assert_eq!(report.fixpoint, Fixpoint::Fixed);
    assert!(contains_filter(&report.initial_plan));
    assert!(!contains_filter(&report.plan));
    assert!(contains_join(&report.plan));
    assert_eq!(
        report.sql,
        "SELECT u.id FROM users AS u JOIN jobs AS j ON u.id = j.id"
    );
}

#[test]
fn unresolved_column_error_identifies_the_column() {
    let err = optimizer().optimize("select x from users").unwrap_err();
    assert!(err.to_string().contains("unresolved column 'x'"));
}

#[test]
fn adjacent_filters_merge_into_a_conjunction() {
    let scan = PlanNode::Scan {
        table: "users".to_string(),
        alias: "u".to_string(),
        schema: RowType::new(vec![Field {
            qualifier: Some("u".to_string()),
            name: "age".to_string(),
            ty: ScalarType::Value(ColumnType::Integer),
        }]),
    };
    let age = ScalarExpr::Column(ColumnRef {
        qualifier: Some("u".to_string()),
        name: "age".to_string(),
        ty: ScalarType::Value(ColumnType::Integer),
    });
    let p1 = ScalarExpr::Binary {
        op: relopt::ast::BinaryOp::Gt,
        left: Box::new(age.clone()),
        right: Box::new(ScalarExpr::Literal(relopt::ast::Literal::Integer(30))),
    };
    let p2 = ScalarExpr::Binary {
        op: relopt::ast::BinaryOp::Lt,
        left: Box::new(age),
        right: Box::new(ScalarExpr::Literal(relopt::ast::Literal::Integer(60))),
    };
    let plan = PlanNode::Filter {
        predicate: p2.clone(),
        input: Box::new(PlanNode::Filter {
            predicate: p1.clone(),
            input: Box::new(scan.clone()),
        }),
    };

    let result = LogicalOptimizer::new().optimize(plan).unwrap();
    assert_eq!(
        result.plan,
        PlanNode::Filter {
            predicate: ScalarExpr::and(p1, p2),
            input: Box::new(scan),
        }
    );
}

#[test]
fn aggregate_with_no_keys_and_no_calls_passes_child_through() {
    let scan = PlanNode::Scan {
        table: "users".to_string(),
        alias: "users".to_string(),
        schema: RowType::default(),
    };
    let plan = PlanNode::Aggregate {
        group_by: vec![],
        aggregates: vec![],
        input: Box::new(scan.clone()),
    };
    let result = LogicalOptimizer::new().optimize(plan).unwrap();
    assert_eq!(result.plan, scan);
}

#[test]
fn optimizing_rendered_output_is_idempotent() {
    let first = optimizer()
        .optimize(
            "select u.id as user_id from users u join jobs j on u.id = j.id \
             where 1 = 1 and u.age > 30",
        )
        .unwrap();
    let second = optimizer().optimize(&first.sql).unwrap();

    assert_eq!(first.sql, second.sql);
    assert_eq!(second.fixpoint, Fixpoint::Fixed);
}

#[test]
fn limit_zero_collapses_to_the_empty_relation() {
    let report = optimizer()
        .optimize("select u.id from users u limit 0")
        .unwrap();
    assert!(matches!(report.plan, PlanNode::Empty { .. }));
    assert_eq!(report.sql, "SELECT NULL AS id LIMIT 0");
}

#[test]
fn engine_halts_at_the_cap_for_a_non_converging_rule_set() {
    fn swap(node: &PlanNode) -> Option<PlanNode> {
        if let PlanNode::Join {
            join_type: relopt::plan::logical::JoinType::Cross,
            condition: None,
            left,
            right,
        } = node
        {
            return Some(PlanNode::Join {
                join_type: relopt::plan::logical::JoinType::Cross,
                condition: None,
                left: right.clone(),
                right: left.clone(),
            });
        }
        None
    }

    let plan = SqlOptimizer::new(catalog())
        .plan("select * from users, jobs")
        .unwrap();
    let engine = LogicalOptimizer::with_rules(
        vec![RewriteRule {
            name: "swap-cross-join",
            rewrite: swap,
        }],
        LogicalOptimizer::DEFAULT_MAX_ITERATIONS,
    );
    let result = engine.optimize(plan).unwrap();
    assert_eq!(result.fixpoint, Fixpoint::Exhausted);
    assert_eq!(result.iterations, LogicalOptimizer::DEFAULT_MAX_ITERATIONS);
}

#[test]
fn global_aggregate_keeps_its_one_row_semantics_over_empty_input() {
    let empty = PlanNode::Empty {
        schema: RowType::new(vec![Field {
            qualifier: Some("u".to_string()),
            name: "id".to_string(),
            ty: ScalarType::Value(ColumnType::Integer),
        }]),
    };
    let plan = PlanNode::Aggregate {
        group_by: vec![],
        aggregates: vec![AggregateExpr {
            function: AggregateFunction::Count,
            arg: None,
            distinct: false,
            alias: "cnt".to_string(),
        }],
        input: Box::new(empty),
    };
    let result = LogicalOptimizer::new().optimize(plan.clone()).unwrap();
    assert_eq!(result.plan, plan);
    assert_eq!(result.fixpoint, Fixpoint::Fixed);
}

#[test]
fn exhausted_runs_still_render_best_effort_output() {
    // The pipeline reports Exhausted through the engine, not as an error;
    // with the baseline rules a cap of zero returns the unrewritten plan.
    let report = SqlOptimizer::new(catalog())
        .with_iteration_cap(0)
        .optimize("select u.id from users u where 1 = 1")
        .unwrap();
    assert_eq!(report.fixpoint, Fixpoint::Exhausted);
    assert!(contains_filter(&report.plan));
    assert!(report.sql.contains("WHERE 1 = 1"));
}
