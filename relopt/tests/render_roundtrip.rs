// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Round-trip law: re-parsing and re-planning rendered output yields a
//! logically equivalent plan
//!
//! Rendered text is the stable normal form: optimizing a query, optimizing
//! its rendered output, and optimizing that output again must all produce
//! the same SQL, and the re-planned trees must keep the same operator
//! content (modulo cosmetic alias differences the renderer normalizes
//! away).

use relopt::plan::logical::PlanNode;
use relopt::{ColumnDef, ColumnType, Dialect, SchemaCatalog, SqlOptimizer, TableDef};

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

/// Optimize, re-optimize the rendered text, and assert the SQL is stable
fn assert_roundtrip_stable(sql: &str) -> String {
    let optimizer = SqlOptimizer::new(catalog());
    let first = optimizer.optimize(sql).unwrap();
    let second = optimizer.optimize(&first.sql).unwrap();
    assert_eq!(
        first.sql, second.sql,
        "rendered SQL is not a fixed point for input: {}",
        sql
    );
    let third = optimizer.optimize(&second.sql).unwrap();
    assert_eq!(second.plan, third.plan);
    second.sql
}

#[test]
fn simple_projection_roundtrips() {
    let sql = assert_roundtrip_stable("select u.id, u.name from users u");
    assert_eq!(sql, "SELECT u.id, u.name FROM users AS u");
}

#[test]
fn wildcard_scan_roundtrips() {
    let sql = assert_roundtrip_stable("select * from users where age > 30");
    assert_eq!(
        sql,
        "SELECT users.id, users.name, users.age FROM users WHERE users.age > 30"
    );
}

#[test]
fn join_with_aliases_and_order_roundtrips() {
    let sql = assert_roundtrip_stable(
        "select u.id as user_id, u.name as user_name, u.age as user_age \
         from users u join jobs j on u.id = j.id \
         where u.age > 30 and u.age > 50 and u.id is not null \
         order by user_id limit 10",
    );
    assert_eq!(
        sql,
        "SELECT u.id AS user_id, u.name AS user_name, u.age AS user_age \
         FROM users AS u JOIN jobs AS j ON u.id = j.id \
         WHERE u.age > 30 AND u.age > 50 AND u.id IS NOT NULL \
         ORDER BY u.id LIMIT 10"
    );
}

#[test]
fn aggregate_with_having_and_order_roundtrips() {
    let sql = assert_roundtrip_stable(
        "select u.age, count(*) as cnt from users u \
         group by u.age having count(*) > 1 order by cnt desc limit 5",
    );
    assert_eq!(
        sql,
        "SELECT u.age, COUNT(*) AS cnt FROM users AS u GROUP BY u.age \
         HAVING COUNT(*) > 1 ORDER BY COUNT(*) DESC LIMIT 5"
    );
}

#[test]
fn distinct_roundtrips_as_grouping() {
    let sql = assert_roundtrip_stable("select distinct u.age from users u");
    assert_eq!(sql, "SELECT u.age FROM users AS u GROUP BY u.age");
}

#[test]
fn pruned_empty_relation_roundtrips_with_matching_arity() {
    let optimizer = SqlOptimizer::new(catalog());
    let first = optimizer
        .optimize("select u.id, u.name from users u limit 0")
        .unwrap();
    assert_eq!(first.sql, "SELECT NULL AS id, NULL AS name LIMIT 0");

    let second = optimizer.optimize(&first.sql).unwrap();
    assert_eq!(first.sql, second.sql);
    match (&first.plan, &second.plan) {
        (PlanNode::Empty { schema: a }, PlanNode::Empty { schema: b }) => {
            assert_eq!(a.fields.len(), b.fields.len());
        }
        other => panic!("expected empty relations, got {:?}", other),
    }
}

#[test]
fn cross_join_roundtrips() {
    let sql = assert_roundtrip_stable("select u.id, j.id from users u, jobs j");
    assert_eq!(sql, "SELECT u.id, j.id FROM users AS u CROSS JOIN jobs AS j");
}

#[test]
fn ansi_dialect_renders_the_same_shape() {
    let optimizer = SqlOptimizer::new(catalog()).with_dialect(Dialect::ansi());
    let report = optimizer
        .optimize("select u.id from users u where 1 = 1")
        .unwrap();
    assert_eq!(report.sql, "SELECT u.id FROM users AS u");
}
