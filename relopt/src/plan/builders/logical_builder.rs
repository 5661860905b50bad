// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical plan builder - converts AST queries into logical plans
//!
//! Binding happens here: every column reference is resolved against the
//! catalog to a concrete (table alias, column, type) triple, operator
//! operand types are checked, and the clause structure of the statement is
//! assembled into an operator tree. Join order in the initial plan follows
//! the textual order of the FROM clause; no reordering happens at this
//! stage.

use log::debug;
use thiserror::Error;

use crate::ast::{
    Expr, FromClause, FunctionArgs, JoinKind, OrderItem, SelectItem, SelectStatement, TableRef,
    UnaryOp,
};
use crate::catalog::{CatalogError, SchemaCatalog};
use crate::plan::logical::{
    AggregateExpr, AggregateFunction, ColumnRef, Field, JoinType, PlanNode, ProjectExpr, RowType,
    ScalarExpr, SortKey,
};
use crate::plan::logical::ScalarType;

/// Errors raised while binding a statement against the catalog
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("unresolved table '{0}'")]
    UnresolvedTable(String),

    #[error("unresolved column '{0}'")]
    UnresolvedColumn(String),

    #[error("ambiguous column '{0}'")]
    AmbiguousColumn(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Alias scope of the FROM clause: binding name -> row type
#[derive(Debug, Default)]
struct BindScope {
    tables: Vec<(String, RowType)>,
}

impl BindScope {
    fn add_table(&mut self, alias: String, schema: RowType) -> Result<(), BuildError> {
        if self.tables.iter().any(|(a, _)| *a == alias) {
            return Err(BuildError::InvalidQuery(format!(
                "duplicate table alias '{}'",
                alias
            )));
        }
        self.tables.push((alias, schema));
        Ok(())
    }

    fn resolve(&self, qualifier: Option<&str>, name: &str) -> Result<ColumnRef, BuildError> {
        match qualifier {
            Some(q) => {
                let (alias, schema) = self
                    .tables
                    .iter()
                    .find(|(a, _)| a == q)
                    .ok_or_else(|| BuildError::UnresolvedTable(q.to_string()))?;
                let field = schema
                    .fields
                    .iter()
                    .find(|f| f.name == name)
                    .ok_or_else(|| BuildError::UnresolvedColumn(format!("{}.{}", q, name)))?;
                Ok(ColumnRef {
                    qualifier: Some(alias.clone()),
                    name: name.to_string(),
                    ty: field.ty,
                })
            }
            None => {
                let mut matches = Vec::new();
                for (alias, schema) in &self.tables {
                    if let Some(field) = schema.fields.iter().find(|f| f.name == name) {
                        matches.push((alias.clone(), field.ty));
                    }
                }
                match matches.len() {
                    0 => Err(BuildError::UnresolvedColumn(name.to_string())),
                    1 => {
                        let (alias, ty) = matches.remove(0);
                        Ok(ColumnRef {
                            qualifier: Some(alias),
                            name: name.to_string(),
                            ty,
                        })
                    }
                    _ => Err(BuildError::AmbiguousColumn(name.to_string())),
                }
            }
        }
    }

    fn all_fields(&self) -> Vec<Field> {
        self.tables
            .iter()
            .flat_map(|(_, schema)| schema.fields.clone())
            .collect()
    }

    fn table_fields(&self, alias: &str) -> Result<Vec<Field>, BuildError> {
        self.tables
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, schema)| schema.fields.clone())
            .ok_or_else(|| BuildError::UnresolvedTable(alias.to_string()))
    }
}

/// Builder for creating logical plans from parsed statements
#[derive(Debug, Default)]
pub struct LogicalBuilder {}

impl LogicalBuilder {
    pub fn new() -> Self {
        Self {}
    }

    /// Build a logical plan for a statement against a catalog
    pub fn build(
        &self,
        statement: &SelectStatement,
        catalog: &SchemaCatalog,
    ) -> Result<PlanNode, BuildError> {
        let (mut plan, scope) = match &statement.from {
            Some(from) => self.plan_from(from, catalog)?,
            None => (PlanNode::SingleRow, BindScope::default()),
        };

        if let Some(condition) = &statement.where_clause {
            let predicate = resolve_scalar(condition, &scope)?;
            require_boolean(&predicate, "WHERE")?;
            plan = PlanNode::Filter {
                predicate,
                input: Box::new(plan),
            };
        }

        let grouped = !statement.group_by.is_empty()
            || statement.items.iter().any(item_contains_aggregate)
            || statement
                .having
                .as_ref()
                .map_or(false, expr_contains_aggregate);

        if statement.having.is_some() && !grouped {
            return Err(BuildError::InvalidQuery(
                "HAVING requires GROUP BY or aggregate functions".to_string(),
            ));
        }

        // Select-list planning; `projected` is None for a bare `SELECT *`
        let (mut plan, projected, agg_ctx) = if grouped {
            let (plan, exprs, ctx) = self.plan_grouped(statement, &scope, plan)?;
            (plan, Some(exprs), Some(ctx))
        } else {
            let exprs = self.plan_select_items(statement, &scope)?;
            (plan, exprs, None)
        };

        // Sort placement: below the projection when every key binds to a
        // table column, above it when keys name select-list outputs.
        let mut above_sort: Option<Vec<SortKey>> = None;
        if !statement.order_by.is_empty() {
            match &projected {
                None => {
                    let keys = self.resolve_order_below(&statement.order_by, &scope)?;
                    plan = PlanNode::Sort {
                        keys,
                        input: Box::new(plan),
                    };
                }
                Some(exprs) => {
                    // Select-list aliases take precedence over table columns
                    let names_alias = statement.order_by.iter().any(|item| {
                        matches!(
                            &item.expr,
                            Expr::Column { qualifier: None, name }
                                if exprs.iter().any(|p| p.alias == *name)
                        )
                    });
                    let below = if !names_alias && agg_ctx.is_none() && !statement.distinct {
                        self.resolve_order_below(&statement.order_by, &scope).ok()
                    } else {
                        None
                    };
                    match below {
                        Some(keys) => {
                            plan = PlanNode::Sort {
                                keys,
                                input: Box::new(plan),
                            };
                        }
                        None => {
                            above_sort = Some(self.resolve_order_above(
                                &statement.order_by,
                                exprs,
                                &scope,
                                agg_ctx.as_ref(),
                            )?);
                        }
                    }
                }
            }
        }

        if let Some(exprs) = projected {
            plan = PlanNode::Project {
                exprs,
                input: Box::new(plan),
            };
        }

        if statement.distinct {
            let schema = plan.output_schema();
            let group_by = schema
                .fields
                .iter()
                .map(|f| {
                    ScalarExpr::Column(ColumnRef {
                        qualifier: f.qualifier.clone(),
                        name: f.name.clone(),
                        ty: f.ty,
                    })
                })
                .collect();
            plan = PlanNode::Aggregate {
                group_by,
                aggregates: Vec::new(),
                input: Box::new(plan),
            };
        }

        if let Some(keys) = above_sort {
            plan = PlanNode::Sort {
                keys,
                input: Box::new(plan),
            };
        }

        if let Some(limit) = &statement.limit {
            plan = PlanNode::Limit {
                count: limit.count,
                offset: limit.offset.unwrap_or(0),
                input: Box::new(plan),
            };
        }

        debug!("built logical plan:\n{}", plan);
        Ok(plan)
    }

    fn plan_from(
        &self,
        from: &FromClause,
        catalog: &SchemaCatalog,
    ) -> Result<(PlanNode, BindScope), BuildError> {
        let mut scope = BindScope::default();
        let mut plan = self.plan_table(&from.base, catalog, &mut scope)?;

        for join in &from.joins {
            let right = self.plan_table(&join.table, catalog, &mut scope)?;
            let join_type = match join.kind {
                JoinKind::Inner => JoinType::Inner,
                JoinKind::Left => JoinType::Left,
                JoinKind::Right => JoinType::Right,
                JoinKind::Cross => JoinType::Cross,
            };
            let condition = match &join.on {
                Some(on) => {
                    let condition = resolve_scalar(on, &scope)?;
                    require_boolean(&condition, "JOIN ON")?;
                    Some(condition)
                }
                None if join.kind == JoinKind::Cross => None,
                None => {
                    return Err(BuildError::InvalidQuery(
                        "JOIN requires an ON condition".to_string(),
                    ))
                }
            };
            plan = PlanNode::Join {
                join_type,
                condition,
                left: Box::new(plan),
                right: Box::new(right),
            };
        }

        Ok((plan, scope))
    }

    fn plan_table(
        &self,
        table: &TableRef,
        catalog: &SchemaCatalog,
        scope: &mut BindScope,
    ) -> Result<PlanNode, BuildError> {
        let def = catalog.lookup(&table.name)?;
        let alias = table.binding_name().to_string();
        let schema = RowType::new(
            def.columns
                .iter()
                .map(|c| Field {
                    qualifier: Some(alias.clone()),
                    name: c.name.clone(),
                    ty: ScalarType::Value(c.ty),
                })
                .collect(),
        );
        scope.add_table(alias.clone(), schema.clone())?;
        Ok(PlanNode::Scan {
            table: def.name.clone(),
            alias,
            schema,
        })
    }

    /// Plan the select list of an ungrouped query; None means a bare `*`
    /// that passes the FROM output through without a Project node
    fn plan_select_items(
        &self,
        statement: &SelectStatement,
        scope: &BindScope,
    ) -> Result<Option<Vec<ProjectExpr>>, BuildError> {
        let has_wildcard = statement
            .items
            .iter()
            .any(|i| !matches!(i, SelectItem::Expr { .. }));
        if has_wildcard && statement.from.is_none() {
            return Err(BuildError::InvalidQuery(
                "SELECT * requires a FROM clause".to_string(),
            ));
        }

        if statement.items.len() == 1 && matches!(statement.items[0], SelectItem::Wildcard) {
            return Ok(None);
        }

        let mut exprs = Vec::new();
        for (index, item) in statement.items.iter().enumerate() {
            match item {
                SelectItem::Wildcard => {
                    for field in scope.all_fields() {
                        exprs.push(pass_through(field));
                    }
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    for field in scope.table_fields(qualifier)? {
                        exprs.push(pass_through(field));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let resolved = resolve_scalar(expr, scope)?;
                    let alias = alias
                        .clone()
                        .unwrap_or_else(|| derive_output_name(&resolved, index));
                    exprs.push(ProjectExpr {
                        expr: resolved,
                        alias,
                    });
                }
            }
        }
        Ok(Some(exprs))
    }

    /// Plan an aggregated query: Aggregate, optional HAVING filter, and the
    /// projection expressions over the aggregate output
    fn plan_grouped<'a>(
        &self,
        statement: &SelectStatement,
        scope: &'a BindScope,
        input: PlanNode,
    ) -> Result<(PlanNode, Vec<ProjectExpr>, AggContext<'a>), BuildError> {
        let mut group_keys = Vec::new();
        for key in &statement.group_by {
            if expr_contains_aggregate(key) {
                return Err(BuildError::InvalidQuery(
                    "aggregate functions are not allowed in GROUP BY".to_string(),
                ));
            }
            group_keys.push(resolve_scalar(key, scope)?);
        }

        let mut ctx = AggContext {
            scope,
            group_keys,
            aggregates: Vec::new(),
        };

        let mut project_exprs = Vec::new();
        for (index, item) in statement.items.iter().enumerate() {
            match item {
                SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {
                    return Err(BuildError::InvalidQuery(
                        "wildcards cannot be combined with GROUP BY or aggregates".to_string(),
                    ))
                }
                SelectItem::Expr { expr, alias } => {
                    let resolved = ctx.resolve_item(expr, alias.as_deref(), true)?;
                    let alias = alias
                        .clone()
                        .unwrap_or_else(|| derive_output_name(&resolved, index));
                    project_exprs.push(ProjectExpr {
                        expr: resolved,
                        alias,
                    });
                }
            }
        }

        let having = match &statement.having {
            Some(condition) => {
                let predicate = ctx.resolve(condition, true)?;
                require_boolean(&predicate, "HAVING")?;
                Some(predicate)
            }
            None => None,
        };

        let mut plan = PlanNode::Aggregate {
            group_by: ctx.group_keys.clone(),
            aggregates: ctx.aggregates.clone(),
            input: Box::new(input),
        };
        if let Some(predicate) = having {
            plan = PlanNode::Filter {
                predicate,
                input: Box::new(plan),
            };
        }
        Ok((plan, project_exprs, ctx))
    }

    fn resolve_order_below(
        &self,
        items: &[OrderItem],
        scope: &BindScope,
    ) -> Result<Vec<SortKey>, BuildError> {
        items
            .iter()
            .map(|item| {
                Ok(SortKey {
                    expr: resolve_scalar(&item.expr, scope)?,
                    ascending: item.ascending,
                })
            })
            .collect()
    }

    /// Resolve ORDER BY keys against the select-list outputs
    fn resolve_order_above(
        &self,
        items: &[OrderItem],
        project_exprs: &[ProjectExpr],
        scope: &BindScope,
        agg_ctx: Option<&AggContext<'_>>,
    ) -> Result<Vec<SortKey>, BuildError> {
        let mut keys = Vec::new();
        for item in items {
            // An unqualified name matching a select alias wins first
            if let Expr::Column {
                qualifier: None,
                name,
            } = &item.expr
            {
                let matches: Vec<&ProjectExpr> = project_exprs
                    .iter()
                    .filter(|p| p.alias == *name)
                    .collect();
                match matches.len() {
                    1 => {
                        keys.push(SortKey {
                            expr: output_ref(matches[0]),
                            ascending: item.ascending,
                        });
                        continue;
                    }
                    0 => {}
                    _ => return Err(BuildError::AmbiguousColumn(name.clone())),
                }
            }

            // Otherwise the expression must match a select item structurally
            let resolved = match agg_ctx {
                Some(ctx) => ctx.resolve_frozen(&item.expr)?,
                None => resolve_scalar(&item.expr, scope)?,
            };
            let matched = project_exprs.iter().find(|p| p.expr == resolved);
            match matched {
                Some(p) => keys.push(SortKey {
                    expr: output_ref(p),
                    ascending: item.ascending,
                }),
                None => {
                    return Err(BuildError::InvalidQuery(
                        "ORDER BY expression must appear in the select list".to_string(),
                    ))
                }
            }
        }
        Ok(keys)
    }
}

/// Context for resolving expressions over an Aggregate's output
///
/// Tracks group keys and the aggregate calls discovered so far; select,
/// HAVING, and ORDER BY expressions of a grouped query all resolve through
/// the same context so identical calls share one output column.
struct AggContext<'a> {
    scope: &'a BindScope,
    group_keys: Vec<ScalarExpr>,
    aggregates: Vec<AggregateExpr>,
}

impl<'a> AggContext<'a> {
    fn resolve_item(
        &mut self,
        expr: &Expr,
        preferred_alias: Option<&str>,
        allow_new: bool,
    ) -> Result<ScalarExpr, BuildError> {
        // A bare aggregate call adopts the select item's alias
        if let Expr::Function { name, .. } = expr {
            if AggregateFunction::from_name(name).is_some() {
                return self.resolve_aggregate_call(expr, preferred_alias, allow_new);
            }
        }
        self.resolve_inner(expr, allow_new)
    }

    fn resolve(&mut self, expr: &Expr, allow_new: bool) -> Result<ScalarExpr, BuildError> {
        self.resolve_item(expr, None, allow_new)
    }

    /// Resolution that refuses to introduce new aggregate calls
    fn resolve_frozen(&self, expr: &Expr) -> Result<ScalarExpr, BuildError> {
        // The mutable path never adds anything when allow_new is false, so a
        // cloned context keeps `self` untouched.
        let mut probe = AggContext {
            scope: self.scope,
            group_keys: self.group_keys.clone(),
            aggregates: self.aggregates.clone(),
        };
        probe.resolve(expr, false)
    }

    fn resolve_inner(&mut self, expr: &Expr, allow_new: bool) -> Result<ScalarExpr, BuildError> {
        if !expr_contains_aggregate(expr) {
            let resolved = resolve_scalar(expr, self.scope)?;
            if let Some(index) = self.group_keys.iter().position(|k| *k == resolved) {
                return Ok(self.key_ref(index));
            }
            return match expr {
                Expr::Literal(_) => Ok(resolved),
                Expr::Column { .. } => Err(BuildError::InvalidQuery(format!(
                    "column '{}' must appear in GROUP BY",
                    resolved
                ))),
                Expr::Binary { op, left, right } => {
                    let left = self.resolve_inner(left, allow_new)?;
                    let right = self.resolve_inner(right, allow_new)?;
                    make_binary(*op, left, right)
                }
                Expr::Unary { op, operand } => {
                    let operand = self.resolve_inner(operand, allow_new)?;
                    make_unary(*op, operand)
                }
                Expr::IsNull { negated, operand } => Ok(ScalarExpr::IsNull {
                    negated: *negated,
                    operand: Box::new(self.resolve_inner(operand, allow_new)?),
                }),
                Expr::Function { .. } => Err(BuildError::InvalidQuery(
                    "unsupported function".to_string(),
                )),
            };
        }

        match expr {
            Expr::Function { name, .. } if AggregateFunction::from_name(name).is_some() => {
                self.resolve_aggregate_call(expr, None, allow_new)
            }
            Expr::Function { name, .. } => Err(BuildError::InvalidQuery(format!(
                "unknown function '{}'",
                name
            ))),
            Expr::Binary { op, left, right } => {
                let left = self.resolve_inner(left, allow_new)?;
                let right = self.resolve_inner(right, allow_new)?;
                make_binary(*op, left, right)
            }
            Expr::Unary { op, operand } => {
                let operand = self.resolve_inner(operand, allow_new)?;
                make_unary(*op, operand)
            }
            Expr::IsNull { negated, operand } => Ok(ScalarExpr::IsNull {
                negated: *negated,
                operand: Box::new(self.resolve_inner(operand, allow_new)?),
            }),
            Expr::Column { .. } | Expr::Literal(_) => {
                // Unreachable: neither contains an aggregate
                resolve_scalar(expr, self.scope)
            }
        }
    }

    fn resolve_aggregate_call(
        &mut self,
        expr: &Expr,
        preferred_alias: Option<&str>,
        allow_new: bool,
    ) -> Result<ScalarExpr, BuildError> {
        let (name, distinct, args) = match expr {
            Expr::Function {
                name,
                distinct,
                args,
            } => (name, *distinct, args),
            _ => {
                return Err(BuildError::InvalidQuery(
                    "expected an aggregate call".to_string(),
                ))
            }
        };
        let function = AggregateFunction::from_name(name).ok_or_else(|| {
            BuildError::InvalidQuery(format!("unknown function '{}'", name))
        })?;

        let arg = match args {
            FunctionArgs::Star => {
                if function != AggregateFunction::Count {
                    return Err(BuildError::InvalidQuery(format!(
                        "{}(*) is not a valid aggregate",
                        function.name()
                    )));
                }
                None
            }
            FunctionArgs::Args(list) => {
                if list.len() != 1 {
                    return Err(BuildError::InvalidQuery(format!(
                        "{} takes exactly one argument",
                        function.name()
                    )));
                }
                if expr_contains_aggregate(&list[0]) {
                    return Err(BuildError::InvalidQuery(
                        "aggregate calls cannot be nested".to_string(),
                    ));
                }
                let arg = resolve_scalar(&list[0], self.scope)?;
                if matches!(function, AggregateFunction::Sum | AggregateFunction::Avg)
                    && !arg.ty().is_numeric()
                {
                    return Err(BuildError::TypeMismatch(format!(
                        "{} requires a numeric argument, got {}",
                        function.name(),
                        arg.ty()
                    )));
                }
                Some(arg)
            }
        };

        if let Some(existing) = self
            .aggregates
            .iter()
            .find(|a| a.function == function && a.arg == arg && a.distinct == distinct)
        {
            return Ok(placeholder(existing));
        }

        if !allow_new {
            return Err(BuildError::InvalidQuery(
                "aggregate expression must appear in the select list".to_string(),
            ));
        }

        let alias = self.unique_alias(preferred_alias.unwrap_or(function.name()));
        let aggregate = AggregateExpr {
            function,
            arg,
            distinct,
            alias,
        };
        let reference = placeholder(&aggregate);
        self.aggregates.push(aggregate);
        Ok(reference)
    }

    fn key_ref(&self, index: usize) -> ScalarExpr {
        let field = PlanNode::aggregate_key_field(&self.group_keys[index], index);
        ScalarExpr::Column(ColumnRef {
            qualifier: field.qualifier,
            name: field.name,
            ty: field.ty,
        })
    }

    fn unique_alias(&self, base: &str) -> String {
        if !self.aggregates.iter().any(|a| a.alias == base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", base, n);
            if !self.aggregates.iter().any(|a| a.alias == candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn placeholder(aggregate: &AggregateExpr) -> ScalarExpr {
    ScalarExpr::Column(ColumnRef {
        qualifier: None,
        name: aggregate.alias.clone(),
        ty: aggregate.result_type(),
    })
}

fn pass_through(field: Field) -> ProjectExpr {
    let alias = field.name.clone();
    ProjectExpr {
        expr: ScalarExpr::Column(ColumnRef {
            qualifier: field.qualifier,
            name: field.name,
            ty: field.ty,
        }),
        alias,
    }
}

/// A reference to a select-list output column
fn output_ref(project: &ProjectExpr) -> ScalarExpr {
    ScalarExpr::Column(ColumnRef {
        qualifier: None,
        name: project.alias.clone(),
        ty: project.expr.ty(),
    })
}

fn derive_output_name(expr: &ScalarExpr, index: usize) -> String {
    match expr {
        ScalarExpr::Column(r) => r.name.clone(),
        _ => format!("expr{}", index),
    }
}

fn item_contains_aggregate(item: &SelectItem) -> bool {
    match item {
        SelectItem::Expr { expr, .. } => expr_contains_aggregate(expr),
        _ => false,
    }
}

fn expr_contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Column { .. } | Expr::Literal(_) => false,
        Expr::Binary { left, right, .. } => {
            expr_contains_aggregate(left) || expr_contains_aggregate(right)
        }
        Expr::Unary { operand, .. } | Expr::IsNull { operand, .. } => {
            expr_contains_aggregate(operand)
        }
        Expr::Function { name, args, .. } => {
            if AggregateFunction::from_name(name).is_some() {
                return true;
            }
            match args {
                FunctionArgs::Star => false,
                FunctionArgs::Args(list) => list.iter().any(expr_contains_aggregate),
            }
        }
    }
}

fn resolve_scalar(expr: &Expr, scope: &BindScope) -> Result<ScalarExpr, BuildError> {
    match expr {
        Expr::Column { qualifier, name } => scope
            .resolve(qualifier.as_deref(), name)
            .map(ScalarExpr::Column),
        Expr::Literal(literal) => Ok(ScalarExpr::Literal(literal.clone())),
        Expr::Binary { op, left, right } => {
            let left = resolve_scalar(left, scope)?;
            let right = resolve_scalar(right, scope)?;
            make_binary(*op, left, right)
        }
        Expr::Unary { op, operand } => {
            let operand = resolve_scalar(operand, scope)?;
            make_unary(*op, operand)
        }
        Expr::IsNull { negated, operand } => Ok(ScalarExpr::IsNull {
            negated: *negated,
            operand: Box::new(resolve_scalar(operand, scope)?),
        }),
        Expr::Function { name, .. } => {
            if AggregateFunction::from_name(name).is_some() {
                Err(BuildError::InvalidQuery(format!(
                    "aggregate function '{}' is not allowed here",
                    name
                )))
            } else {
                Err(BuildError::InvalidQuery(format!(
                    "unknown function '{}'",
                    name
                )))
            }
        }
    }
}

fn make_binary(
    op: crate::ast::BinaryOp,
    left: ScalarExpr,
    right: ScalarExpr,
) -> Result<ScalarExpr, BuildError> {
    let (lt, rt) = (left.ty(), right.ty());
    if op.is_logical() && !(lt.is_boolean() && rt.is_boolean()) {
        return Err(BuildError::TypeMismatch(format!(
            "{} requires boolean operands, got {} and {}",
            op, lt, rt
        )));
    }
    if op.is_comparison() && !lt.comparable_with(rt) {
        return Err(BuildError::TypeMismatch(format!(
            "cannot compare {} with {}",
            lt, rt
        )));
    }
    if op.is_arithmetic() && !(lt.is_numeric() && rt.is_numeric()) {
        return Err(BuildError::TypeMismatch(format!(
            "operator '{}' requires numeric operands, got {} and {}",
            op, lt, rt
        )));
    }
    Ok(ScalarExpr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn make_unary(op: UnaryOp, operand: ScalarExpr) -> Result<ScalarExpr, BuildError> {
    match op {
        UnaryOp::Not => {
            if !operand.ty().is_boolean() {
                return Err(BuildError::TypeMismatch(format!(
                    "NOT requires a boolean operand, got {}",
                    operand.ty()
                )));
            }
        }
        UnaryOp::Neg => {
            if !operand.ty().is_numeric() {
                return Err(BuildError::TypeMismatch(format!(
                    "unary '-' requires a numeric operand, got {}",
                    operand.ty()
                )));
            }
        }
    }
    Ok(ScalarExpr::Unary {
        op,
        operand: Box::new(operand),
    })
}

fn require_boolean(predicate: &ScalarExpr, context: &str) -> Result<(), BuildError> {
    if predicate.ty().is_boolean() {
        Ok(())
    } else {
        Err(BuildError::TypeMismatch(format!(
            "{} predicate must be boolean, got {}",
            context,
            predicate.ty()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_select;
    use crate::catalog::{ColumnDef, ColumnType, SchemaCatalog, TableDef};

    fn test_catalog() -> SchemaCatalog {
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

    fn build(sql: &str) -> Result<PlanNode, BuildError> {
        let statement = parse_select(sql).unwrap();
        LogicalBuilder::new().build(&statement, &test_catalog())
    }

    #[test]
    fn builds_scan_filter_project() {
        let plan = build("select u.id as user_id from users u where u.age > 30").unwrap();
        match &plan {
            PlanNode::Project { exprs, input } => {
                assert_eq!(exprs[0].alias, "user_id");
                assert!(matches!(**input, PlanNode::Filter { .. }));
            }
            other => panic!("unexpected plan: {}", other),
        }
        plan.validate().unwrap();
    }

    #[test]
    fn bare_star_has_no_project() {
        let plan = build("select * from users").unwrap();
        assert!(matches!(plan, PlanNode::Scan { .. }));
        assert_eq!(plan.output_schema().fields.len(), 3);
    }

    #[test]
    fn joins_follow_textual_order() {
        let plan =
            build("select u.id from users u join jobs j on u.id = j.id").unwrap();
        // Project over Join(Scan users, Scan jobs)
        match &plan {
            PlanNode::Project { input, .. } => match &**input {
                PlanNode::Join {
                    join_type,
                    left,
                    right,
                    condition,
                } => {
                    assert_eq!(*join_type, JoinType::Inner);
                    assert!(condition.is_some());
                    assert!(matches!(&**left, PlanNode::Scan { alias, .. } if alias == "u"));
                    assert!(matches!(&**right, PlanNode::Scan { alias, .. } if alias == "j"));
                }
                other => panic!("unexpected input: {}", other),
            },
            other => panic!("unexpected plan: {}", other),
        }
    }

    #[test]
    fn unresolved_column_names_the_column() {
        let err = build("select x from users").unwrap_err();
        assert_eq!(err, BuildError::UnresolvedColumn("x".to_string()));
    }

    #[test]
    fn unresolved_qualifier_is_a_table_error() {
        let err = build("select z.id from users u").unwrap_err();
        assert_eq!(err, BuildError::UnresolvedTable("z".to_string()));
    }

    #[test]
    fn ambiguous_column_is_rejected() {
        let err = build("select id from users u join jobs j on u.id = j.id").unwrap_err();
        assert_eq!(err, BuildError::AmbiguousColumn("id".to_string()));
    }

    #[test]
    fn unknown_table_passes_through() {
        let err = build("select id from ghosts").unwrap_err();
        assert_eq!(
            err,
            BuildError::Catalog(CatalogError::UnknownTable("ghosts".to_string()))
        );
    }

    #[test]
    fn comparing_numeric_with_string_fails() {
        let err = build("select u.id from users u where u.id = 'abc'").unwrap_err();
        assert!(matches!(err, BuildError::TypeMismatch(_)));
    }

    #[test]
    fn tautology_survives_building() {
        let plan = build("select u.id from users u where 1 = 1").unwrap();
        match plan {
            PlanNode::Project { input, .. } => {
                assert!(matches!(*input, PlanNode::Filter { .. }))
            }
            other => panic!("unexpected plan: {}", other),
        }
    }

    #[test]
    fn aggregation_builds_aggregate_then_project() {
        let plan =
            build("select u.age, count(*) as cnt from users u group by u.age").unwrap();
        match &plan {
            PlanNode::Project { exprs, input } => {
                assert_eq!(exprs.len(), 2);
                match &**input {
                    PlanNode::Aggregate {
                        group_by,
                        aggregates,
                        ..
                    } => {
                        assert_eq!(group_by.len(), 1);
                        assert_eq!(aggregates.len(), 1);
                        assert_eq!(aggregates[0].alias, "cnt");
                    }
                    other => panic!("unexpected input: {}", other),
                }
            }
            other => panic!("unexpected plan: {}", other),
        }
        plan.validate().unwrap();
    }

    #[test]
    fn having_adds_filter_above_aggregate() {
        let plan = build(
            "select u.age from users u group by u.age having count(*) > 1",
        )
        .unwrap();
        match &plan {
            PlanNode::Project { input, .. } => match &**input {
                PlanNode::Filter { input, .. } => {
                    assert!(matches!(&**input, PlanNode::Aggregate { aggregates, .. } if aggregates.len() == 1))
                }
                other => panic!("unexpected input: {}", other),
            },
            other => panic!("unexpected plan: {}", other),
        }
        plan.validate().unwrap();
    }

    #[test]
    fn selecting_ungrouped_column_fails() {
        let err = build("select u.name from users u group by u.age").unwrap_err();
        assert!(matches!(err, BuildError::InvalidQuery(_)));
    }

    #[test]
    fn having_without_aggregation_fails() {
        let err = build("select u.id from users u having u.id > 1").unwrap_err();
        assert!(matches!(err, BuildError::InvalidQuery(_)));
    }

    #[test]
    fn distinct_plans_as_grouping_aggregate() {
        let plan = build("select distinct u.age from users u").unwrap();
        match &plan {
            PlanNode::Aggregate {
                group_by,
                aggregates,
                input,
            } => {
                assert_eq!(group_by.len(), 1);
                assert!(aggregates.is_empty());
                assert!(matches!(**input, PlanNode::Project { .. }));
            }
            other => panic!("unexpected plan: {}", other),
        }
        plan.validate().unwrap();
    }

    #[test]
    fn order_by_select_alias_sorts_above_project() {
        let plan =
            build("select u.id as user_id from users u order by user_id desc").unwrap();
        match &plan {
            PlanNode::Sort { keys, input } => {
                assert!(!keys[0].ascending);
                assert!(matches!(**input, PlanNode::Project { .. }));
                match &keys[0].expr {
                    ScalarExpr::Column(r) => {
                        assert_eq!(r.qualifier, None);
                        assert_eq!(r.name, "user_id");
                    }
                    other => panic!("unexpected key: {}", other),
                }
            }
            other => panic!("unexpected plan: {}", other),
        }
        plan.validate().unwrap();
    }

    #[test]
    fn order_by_table_column_sorts_below_project() {
        let plan = build("select u.id from users u order by u.age").unwrap();
        match &plan {
            PlanNode::Project { input, .. } => {
                assert!(matches!(**input, PlanNode::Sort { .. }))
            }
            other => panic!("unexpected plan: {}", other),
        }
        plan.validate().unwrap();
    }

    #[test]
    fn limit_offset_lands_on_top() {
        let plan = build("select u.id from users u limit 10 offset 5").unwrap();
        match plan {
            PlanNode::Limit { count, offset, .. } => {
                assert_eq!(count, 10);
                assert_eq!(offset, 5);
            }
            other => panic!("unexpected plan: {}", other),
        }
    }

    #[test]
    fn join_without_on_is_rejected() {
        let err = build("select u.id from users u join jobs j").unwrap_err();
        assert!(matches!(err, BuildError::InvalidQuery(_)));
    }

    #[test]
    fn shared_aggregate_is_deduplicated() {
        let plan = build(
            "select count(*) as cnt from users u having count(*) > 1",
        )
        .unwrap();
        match &plan {
            PlanNode::Project { input, .. } => match &**input {
                PlanNode::Filter { input, .. } => match &**input {
                    PlanNode::Aggregate { aggregates, .. } => {
                        assert_eq!(aggregates.len(), 1)
                    }
                    other => panic!("unexpected input: {}", other),
                },
                other => panic!("unexpected input: {}", other),
            },
            other => panic!("unexpected plan: {}", other),
        }
    }
}
