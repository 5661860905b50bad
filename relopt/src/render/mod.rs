// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan renderer: serializes a logical plan back into SQL text
//!
//! The renderer walks the tree bottom-up, accumulating clauses of a single
//! SELECT statement. When an operator needs a clause slot that is already
//! occupied (or would change semantics, like a Filter over a computed
//! projection), the statement built so far is wrapped as a parenthesized
//! derived table (`t0`, `t1`, ...) and outer column references are remapped
//! onto its output columns. Re-planning the rendered text yields a logically
//! equivalent plan.

pub mod dialect;

pub use dialect::{Dialect, QuoteStyle};

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::plan::logical::{
    AggregateExpr, ColumnRef, Field, JoinType, PlanNode, ScalarExpr, SortKey,
};

/// Rendering failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("operator {operator} has no SQL rendering in the '{dialect}' dialect")]
    UnsupportedOperator {
        operator: &'static str,
        dialect: &'static str,
    },
}

/// Render a plan as a SQL statement in the given dialect
pub fn render(plan: &PlanNode, dialect: &Dialect) -> Result<String, RenderError> {
    SqlRenderer::new(dialect).render(plan)
}

/// How a resolved column reference prints inside the statement being built
#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: HashMap<(Option<String>, String), String>,
}

impl Scope {
    fn bind(&mut self, qualifier: Option<String>, name: String, sql: String) {
        self.bindings.insert((qualifier, name), sql);
    }

    fn resolve(&self, reference: &ColumnRef) -> Option<&String> {
        self.bindings
            .get(&(reference.qualifier.clone(), reference.name.clone()))
    }

    fn merge(mut self, other: Scope) -> Scope {
        self.bindings.extend(other.bindings);
        self
    }
}

/// One rendered select-list item
#[derive(Debug, Clone)]
struct ItemSql {
    sql: String,
    name: String,
    /// The item's natural output name already equals `name`
    redundant_alias: bool,
}

/// Clause slots of the SELECT statement under construction
#[derive(Debug)]
struct SelectBuilder {
    select: Option<Vec<ItemSql>>,
    from: Option<String>,
    from_is_join: bool,
    where_predicates: Vec<String>,
    group_by: Option<Vec<String>>,
    having: Vec<String>,
    order_by: Option<Vec<String>>,
    limit: Option<(u64, u64)>,
    aggregated: bool,
    scope: Scope,
    output: Vec<Field>,
}

impl SelectBuilder {
    fn new(scope: Scope, output: Vec<Field>) -> Self {
        Self {
            select: None,
            from: None,
            from_is_join: false,
            where_predicates: Vec::new(),
            group_by: None,
            having: Vec::new(),
            order_by: None,
            limit: None,
            aggregated: false,
            scope,
            output,
        }
    }

    /// Usable as a bare from-term of an enclosing join
    fn is_pure_from(&self) -> bool {
        self.from.is_some()
            && self.select.is_none()
            && self.where_predicates.is_empty()
            && self.group_by.is_none()
            && self.having.is_empty()
            && self.order_by.is_none()
            && self.limit.is_none()
            && !self.aggregated
    }
}

/// Stateful renderer; the state is the derived-table alias counter
pub struct SqlRenderer<'a> {
    dialect: &'a Dialect,
    next_alias: u32,
}

impl<'a> SqlRenderer<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self {
            dialect,
            next_alias: 0,
        }
    }

    pub fn render(&mut self, plan: &PlanNode) -> Result<String, RenderError> {
        let builder = self.render_node(plan)?;
        Ok(self.into_sql(builder))
    }

    fn render_node(&mut self, node: &PlanNode) -> Result<SelectBuilder, RenderError> {
        match node {
            PlanNode::Scan {
                table,
                alias,
                schema,
            } => {
                let table_sql = self.dialect.identifier(table);
                let from = if alias == table {
                    table_sql
                } else {
                    format!("{} AS {}", table_sql, self.dialect.identifier(alias))
                };
                let mut scope = Scope::default();
                for field in &schema.fields {
                    scope.bind(
                        field.qualifier.clone(),
                        field.name.clone(),
                        format!(
                            "{}.{}",
                            self.dialect.identifier(alias),
                            self.dialect.identifier(&field.name)
                        ),
                    );
                }
                let mut builder = SelectBuilder::new(scope, schema.fields.clone());
                builder.from = Some(from);
                Ok(builder)
            }

            PlanNode::SingleRow => {
                if !self.dialect.supports_bare_select {
                    return Err(RenderError::UnsupportedOperator {
                        operator: "SingleRow",
                        dialect: self.dialect.name,
                    });
                }
                Ok(SelectBuilder::new(Scope::default(), Vec::new()))
            }

            PlanNode::Empty { schema } => {
                if !self.dialect.supports_bare_select {
                    return Err(RenderError::UnsupportedOperator {
                        operator: "Empty",
                        dialect: self.dialect.name,
                    });
                }
                let mut builder = SelectBuilder::new(Scope::default(), schema.fields.clone());
                let items = uniquify(
                    schema
                        .fields
                        .iter()
                        .map(|f| ItemSql {
                            sql: "NULL".to_string(),
                            name: f.name.clone(),
                            redundant_alias: false,
                        })
                        .collect(),
                );
                builder.select = Some(items);
                builder.limit = Some((0, 0));
                Ok(builder)
            }

            PlanNode::Filter { predicate, input } => {
                let mut builder = self.render_node(input)?;
                if builder.aggregated
                    && builder.order_by.is_none()
                    && builder.limit.is_none()
                {
                    let sql = self.render_expr(predicate, &builder.scope);
                    builder.having.push(sql);
                } else if builder.select.is_none()
                    && builder.group_by.is_none()
                    && !builder.aggregated
                    && builder.order_by.is_none()
                    && builder.limit.is_none()
                {
                    let sql = self.render_expr(predicate, &builder.scope);
                    builder.where_predicates.push(sql);
                } else {
                    let mut builder = self.wrap(builder);
                    let sql = self.render_expr(predicate, &builder.scope);
                    builder.where_predicates.push(sql);
                    return Ok(builder);
                }
                Ok(builder)
            }

            PlanNode::Project { exprs, input } => {
                let mut builder = self.render_node(input)?;
                if builder.select.is_some() {
                    builder = self.wrap(builder);
                }
                let mut items = Vec::new();
                let mut scope = Scope::default();
                for p in exprs {
                    let sql = self.render_expr(&p.expr, &builder.scope);
                    let redundant = sql == self.dialect.identifier(&p.alias)
                        || sql.ends_with(&format!(".{}", self.dialect.identifier(&p.alias)));
                    scope.bind(None, p.alias.clone(), sql.clone());
                    items.push(ItemSql {
                        sql,
                        name: p.alias.clone(),
                        redundant_alias: redundant,
                    });
                }
                builder.select = Some(items);
                builder.scope = scope;
                builder.output = node.output_schema().fields;
                Ok(builder)
            }

            PlanNode::Join {
                join_type,
                condition,
                left,
                right,
            } => {
                let left = self.render_node(left)?;
                let right = self.render_node(right)?;
                let (left_sql, left_scope, left_output) = self.as_from_term(left);
                let (right_sql, right_scope, right_output) = self.as_from_term(right);
                let scope = left_scope.merge(right_scope);

                let keyword = match join_type {
                    JoinType::Inner => "JOIN",
                    JoinType::Left => "LEFT JOIN",
                    JoinType::Right => "RIGHT JOIN",
                    JoinType::Cross => "CROSS JOIN",
                };
                let from = match condition {
                    Some(c) => format!(
                        "{} {} {} ON {}",
                        left_sql,
                        keyword,
                        right_sql,
                        self.render_expr(c, &scope)
                    ),
                    None => format!("{} {} {}", left_sql, keyword, right_sql),
                };

                let mut output = left_output;
                output.extend(right_output);
                let mut builder = SelectBuilder::new(scope, output);
                builder.from = Some(from);
                builder.from_is_join = true;
                Ok(builder)
            }

            PlanNode::Aggregate {
                group_by,
                aggregates,
                input,
            } => {
                let mut builder = self.render_node(input)?;

                if builder.select.is_some() {
                    // A distinct-style grouping over the select list can stay
                    // in the same statement
                    if self.groupable_in_place(&builder, group_by, aggregates) {
                        let keys: Vec<String> = group_by
                            .iter()
                            .map(|k| self.render_expr(k, &builder.scope))
                            .collect();
                        builder.scope =
                            self.aggregate_scope(group_by, aggregates, &builder.scope);
                        builder.group_by = Some(keys);
                        builder.aggregated = true;
                        builder.output = node.output_schema().fields;
                        return Ok(builder);
                    }
                    builder = self.wrap(builder);
                }
                if builder.aggregated
                    || builder.order_by.is_some()
                    || builder.limit.is_some()
                {
                    builder = self.wrap(builder);
                }

                let keys: Vec<String> = group_by
                    .iter()
                    .map(|k| self.render_expr(k, &builder.scope))
                    .collect();
                builder.scope = self.aggregate_scope(group_by, aggregates, &builder.scope);
                if !keys.is_empty() {
                    builder.group_by = Some(keys);
                }
                builder.aggregated = true;
                builder.output = node.output_schema().fields;
                Ok(builder)
            }

            PlanNode::Sort { keys, input } => {
                let mut builder = self.render_node(input)?;
                if builder.order_by.is_some() || builder.limit.is_some() {
                    builder = self.wrap(builder);
                }
                let rendered: Vec<String> = keys
                    .iter()
                    .map(|k| self.render_sort_key(k, &builder.scope))
                    .collect();
                builder.order_by = Some(rendered);
                Ok(builder)
            }

            PlanNode::Limit {
                count,
                offset,
                input,
            } => {
                let mut builder = self.render_node(input)?;
                if builder.limit.is_some() {
                    builder = self.wrap(builder);
                }
                builder.limit = Some((*count, *offset));
                Ok(builder)
            }
        }
    }

    /// Whether an Aggregate can reuse the statement's select list as its
    /// grouping: no aggregate calls and keys matching the select outputs
    fn groupable_in_place(
        &self,
        builder: &SelectBuilder,
        group_by: &[ScalarExpr],
        aggregates: &[AggregateExpr],
    ) -> bool {
        if !aggregates.is_empty()
            || builder.aggregated
            || builder.group_by.is_some()
            || !builder.having.is_empty()
            || builder.order_by.is_some()
            || builder.limit.is_some()
        {
            return false;
        }
        let select = match &builder.select {
            Some(items) => items,
            None => return false,
        };
        if select.len() != group_by.len() {
            return false;
        }
        group_by.iter().enumerate().zip(select).all(|((index, key), item)| {
            PlanNode::aggregate_key_field(key, index).name == item.name
                && key.references().iter().all(|r| builder.scope.resolve(r).is_some())
        })
    }

    fn aggregate_scope(
        &self,
        group_by: &[ScalarExpr],
        aggregates: &[AggregateExpr],
        input_scope: &Scope,
    ) -> Scope {
        let mut scope = Scope::default();
        for (index, key) in group_by.iter().enumerate() {
            let field = PlanNode::aggregate_key_field(key, index);
            let sql = self.render_expr(key, input_scope);
            scope.bind(field.qualifier, field.name, sql);
        }
        for aggregate in aggregates {
            let sql = self.render_aggregate(aggregate, input_scope);
            scope.bind(None, aggregate.alias.clone(), sql);
        }
        scope
    }

    /// Use a rendered subquery as a join operand
    fn as_from_term(&mut self, builder: SelectBuilder) -> (String, Scope, Vec<Field>) {
        if builder.is_pure_from() {
            let from = builder.from.clone().unwrap_or_default();
            let from = if builder.from_is_join {
                format!("({})", from)
            } else {
                from
            };
            return (from, builder.scope, builder.output);
        }
        self.wrap_to_term(builder)
    }

    /// Wrap the statement built so far into a fresh builder whose FROM is the
    /// wrapped derived table
    fn wrap(&mut self, builder: SelectBuilder) -> SelectBuilder {
        let (term, scope, output) = self.wrap_to_term(builder);
        let mut wrapped = SelectBuilder::new(scope, output);
        wrapped.from = Some(term);
        wrapped
    }

    fn wrap_to_term(&mut self, mut builder: SelectBuilder) -> (String, Scope, Vec<Field>) {
        let items = match builder.select.take() {
            Some(items) => items,
            None => self.synthesize_select(&builder),
        };
        let items = uniquify(items);

        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;

        let outer_fields = builder.output.clone();
        builder.select = Some(items.clone());
        let sql = self.into_sql(builder);

        let mut scope = Scope::default();
        let mut output = Vec::new();
        for (field, item) in outer_fields.into_iter().zip(items) {
            let qualified = format!(
                "{}.{}",
                self.dialect.identifier(&alias),
                self.dialect.identifier(&item.name)
            );
            scope.bind(field.qualifier, field.name, qualified);
            output.push(Field {
                qualifier: Some(alias.clone()),
                name: item.name,
                ty: field.ty,
            });
        }

        (
            format!("({}) AS {}", sql, self.dialect.identifier(&alias)),
            scope,
            output,
        )
    }

    /// Derive select items from the builder's output when no projection has
    /// set them explicitly
    fn synthesize_select(&self, builder: &SelectBuilder) -> Vec<ItemSql> {
        if builder.output.is_empty() {
            return vec![ItemSql {
                sql: "1".to_string(),
                name: "1".to_string(),
                redundant_alias: true,
            }];
        }
        builder
            .output
            .iter()
            .map(|field| {
                let reference = ColumnRef {
                    qualifier: field.qualifier.clone(),
                    name: field.name.clone(),
                    ty: field.ty,
                };
                let fallback = match &field.qualifier {
                    Some(q) => format!(
                        "{}.{}",
                        self.dialect.identifier(q),
                        self.dialect.identifier(&field.name)
                    ),
                    None => self.dialect.identifier(&field.name),
                };
                let sql = builder
                    .scope
                    .resolve(&reference)
                    .cloned()
                    .unwrap_or(fallback);
                let redundant = sql == self.dialect.identifier(&field.name)
                    || sql.ends_with(&format!(".{}", self.dialect.identifier(&field.name)));
                ItemSql {
                    sql,
                    name: field.name.clone(),
                    redundant_alias: redundant,
                }
            })
            .collect()
    }

    fn into_sql(&mut self, builder: SelectBuilder) -> String {
        let items = match &builder.select {
            Some(items) => items.clone(),
            None => self.synthesize_select(&builder),
        };
        let mut sql = String::from("SELECT ");
        let rendered: Vec<String> = items
            .iter()
            .map(|item| {
                if item.redundant_alias {
                    item.sql.clone()
                } else {
                    format!("{} AS {}", item.sql, self.dialect.identifier(&item.name))
                }
            })
            .collect();
        sql.push_str(&rendered.join(", "));

        if let Some(from) = &builder.from {
            sql.push_str(" FROM ");
            sql.push_str(from);
        }
        if !builder.where_predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&builder.where_predicates.join(" AND "));
        }
        if let Some(group_by) = &builder.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }
        if !builder.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&builder.having.join(" AND "));
        }
        if let Some(order_by) = &builder.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }
        if let Some((count, offset)) = builder.limit {
            sql.push_str(&format!(" LIMIT {}", count));
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }
        sql
    }

    fn render_sort_key(&self, key: &SortKey, scope: &Scope) -> String {
        let sql = self.render_expr(&key.expr, scope);
        if key.ascending {
            sql
        } else {
            format!("{} DESC", sql)
        }
    }

    fn render_aggregate(&self, aggregate: &AggregateExpr, scope: &Scope) -> String {
        let name = aggregate.function.name().to_uppercase();
        match &aggregate.arg {
            None => format!("{}(*)", name),
            Some(arg) if aggregate.distinct => {
                format!("{}(DISTINCT {})", name, self.render_expr(arg, scope))
            }
            Some(arg) => format!("{}({})", name, self.render_expr(arg, scope)),
        }
    }

    fn render_expr(&self, expr: &ScalarExpr, scope: &Scope) -> String {
        match expr {
            ScalarExpr::Column(r) => scope.resolve(r).cloned().unwrap_or_else(|| {
                match &r.qualifier {
                    Some(q) => format!(
                        "{}.{}",
                        self.dialect.identifier(q),
                        self.dialect.identifier(&r.name)
                    ),
                    None => self.dialect.identifier(&r.name),
                }
            }),
            ScalarExpr::Literal(l) => l.to_string(),
            ScalarExpr::Binary { op, left, right } => {
                let left_sql = self.render_operand(left, op.precedence(), false, scope);
                let right_sql = self.render_operand(right, op.precedence(), true, scope);
                format!("{} {} {}", left_sql, op, right_sql)
            }
            ScalarExpr::Unary { op, operand } => {
                let inner = self.render_expr(operand, scope);
                let inner = if matches!(**operand, ScalarExpr::Binary { .. }) {
                    format!("({})", inner)
                } else {
                    inner
                };
                match op {
                    crate::ast::UnaryOp::Not => format!("NOT {}", inner),
                    crate::ast::UnaryOp::Neg => format!("-{}", inner),
                }
            }
            ScalarExpr::IsNull { negated, operand } => {
                let inner = self.render_expr(operand, scope);
                let inner = if matches!(**operand, ScalarExpr::Binary { .. }) {
                    format!("({})", inner)
                } else {
                    inner
                };
                if *negated {
                    format!("{} IS NOT NULL", inner)
                } else {
                    format!("{} IS NULL", inner)
                }
            }
        }
    }

    fn render_operand(
        &self,
        operand: &ScalarExpr,
        parent_precedence: u8,
        is_right: bool,
        scope: &Scope,
    ) -> String {
        let sql = self.render_expr(operand, scope);
        let needs_parens = match operand {
            ScalarExpr::Binary { op, .. } => {
                op.precedence() < parent_precedence
                    || (is_right && op.precedence() == parent_precedence)
            }
            _ => false,
        };
        if needs_parens {
            format!("({})", sql)
        } else {
            sql
        }
    }
}

/// Make output column names unique, renaming later duplicates
fn uniquify(items: Vec<ItemSql>) -> Vec<ItemSql> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for mut item in items {
        if taken.insert(item.name.clone()) {
            out.push(item);
            continue;
        }
        let mut n = 1;
        let mut candidate = format!("{}{}", item.name, n);
        while !taken.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{}{}", item.name, n);
        }
        item.name = candidate;
        item.redundant_alias = false;
        out.push(item);
    }
    out
}
