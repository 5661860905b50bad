// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pipeline facade: parse -> build -> rewrite -> render
//!
//! [`SqlOptimizer`] owns a catalog snapshot and dialect options and runs the
//! whole optimization pipeline for one query string at a time. The run is
//! synchronous and CPU-bound with no suspension points; a single optimizer
//! may serve concurrent runs through a shared reference because nothing in
//! the pipeline mutates it.

use log::{debug, info, warn};
use thiserror::Error;

use crate::ast::{parse_select, ParseError};
use crate::catalog::SchemaCatalog;
use crate::plan::builders::{BuildError, LogicalBuilder};
use crate::plan::logical::PlanNode;
use crate::plan::optimizers::{Fixpoint, InvariantError, LogicalOptimizer};
use crate::render::{Dialect, RenderError, SqlRenderer};

/// Any error that aborts an optimization run
///
/// No partial output is returned: the first failing stage wins.
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Invariant(#[from] InvariantError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Outcome of a successful optimization run
#[derive(Debug, Clone)]
pub struct OptimizeReport {
    /// The rewritten query text
    pub sql: String,
    /// The plan the rewritten text was rendered from
    pub plan: PlanNode,
    /// The plan as built, before any rewriting
    pub initial_plan: PlanNode,
    /// Whether the rule engine reached a fixed point or its iteration cap
    pub fixpoint: Fixpoint,
    /// Number of traversals that changed the tree
    pub iterations: u32,
    /// Names of fired rules, in application order
    pub applied_rules: Vec<&'static str>,
}

/// The end-to-end optimizer for a fixed catalog and dialect
#[derive(Debug)]
pub struct SqlOptimizer {
    catalog: SchemaCatalog,
    dialect: Dialect,
    iteration_cap: u32,
}

impl SqlOptimizer {
    /// Optimizer with the MySQL dialect and the default iteration cap
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            catalog,
            dialect: Dialect::mysql(),
            iteration_cap: LogicalOptimizer::DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_iteration_cap(mut self, iteration_cap: u32) -> Self {
        self.iteration_cap = iteration_cap;
        self
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Parse and bind a query without rewriting it
    pub fn plan(&self, sql: &str) -> Result<PlanNode, OptimizeError> {
        let statement = parse_select(sql)?;
        let plan = LogicalBuilder::new().build(&statement, &self.catalog)?;
        Ok(plan)
    }

    /// Run the full pipeline on one query string
    pub fn optimize(&self, sql: &str) -> Result<OptimizeReport, OptimizeError> {
        info!("optimizing query ({} bytes)", sql.len());
        let statement = parse_select(sql)?;
        let initial_plan = LogicalBuilder::new().build(&statement, &self.catalog)?;
        debug!("initial plan:\n{}", initial_plan);

        let engine = LogicalOptimizer::with_iteration_cap(self.iteration_cap);
        let rewritten = engine.optimize(initial_plan.clone())?;
        if rewritten.fixpoint == Fixpoint::Exhausted {
            warn!(
                "rule engine exhausted its iteration cap ({}); returning best-effort plan",
                self.iteration_cap
            );
        }
        debug!("rewritten plan:\n{}", rewritten.plan);

        let sql_out = SqlRenderer::new(&self.dialect).render(&rewritten.plan)?;
        info!(
            "optimization finished: {} iteration(s), {} rule application(s)",
            rewritten.iterations,
            rewritten.applied.len()
        );

        Ok(OptimizeReport {
            sql: sql_out,
            plan: rewritten.plan,
            initial_plan,
            fixpoint: rewritten.fixpoint,
            iterations: rewritten.iterations,
            applied_rules: rewritten.applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType, TableDef};

    fn optimizer() -> SqlOptimizer {
        let catalog = SchemaCatalog::from_records(vec![
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
        .unwrap();
        SqlOptimizer::new(catalog)
    }

    #[test]
    fn removes_tautology_end_to_end() {
        let report = optimizer()
            .optimize("select u.id from users u where 1 = 1")
            .unwrap();
        assert_eq!(report.fixpoint, Fixpoint::Fixed);
        assert_eq!(report.sql, "SELECT u.id FROM users AS u");
        assert!(report.applied_rules.contains(&"remove-trivial-filter"));
    }

    #[test]
    fn build_errors_abort_the_run() {
        let err = optimizer().optimize("select x from users").unwrap_err();
        match err {
            OptimizeError::Build(BuildError::UnresolvedColumn(name)) => {
                assert_eq!(name, "x")
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn parse_errors_abort_the_run() {
        let err = optimizer().optimize("not sql at all").unwrap_err();
        assert!(matches!(err, OptimizeError::Parse(_)));
    }
}
