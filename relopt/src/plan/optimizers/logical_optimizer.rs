// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fixed-point rule engine for logical plans
//!
//! Each iteration performs one full bottom-up traversal of the tree,
//! applying at every node the first rule (in priority order) whose
//! precondition matches. If any replacement occurred the scan restarts as a
//! new iteration; the engine terminates when a traversal fires no rule
//! (fixed point) or when the iteration cap is reached, whichever comes
//! first. Exhausting the cap is not an error: the best-effort tree is
//! returned with the `Exhausted` flag.
//!
//! Rules never raise domain errors. A tree that fails structural validation
//! after a rewrite is a fatal planner bug reported as [`InvariantError`].

use log::{debug, trace};
use thiserror::Error;

use crate::plan::logical::PlanNode;
use crate::plan::optimizers::rules::{baseline_rules, RewriteRule};

/// Terminal state of a rewrite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Fixpoint {
    /// A full traversal fired no rule
    Fixed,
    /// The iteration cap was reached while rules were still firing
    Exhausted,
}

/// A rewrite produced a structurally invalid tree; always fatal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("internal invariant violated after rule '{rule}': {detail}")]
pub struct InvariantError {
    pub rule: &'static str,
    pub detail: String,
}

/// Result of a rewrite run
#[derive(Debug, Clone)]
pub struct RewriteResult {
    pub plan: PlanNode,
    pub fixpoint: Fixpoint,
    /// Number of traversals that changed the tree
    pub iterations: u32,
    /// Names of fired rules, in application order
    pub applied: Vec<&'static str>,
}

/// Optimizer for logical plans: an ordered rule list plus an iteration cap
#[derive(Debug)]
pub struct LogicalOptimizer {
    rules: Vec<RewriteRule>,
    max_iterations: u32,
}

impl LogicalOptimizer {
    pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

    /// Engine with the baseline rule set and the default cap
    pub fn new() -> Self {
        Self {
            rules: baseline_rules(),
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Engine with the baseline rule set and a custom cap
    pub fn with_iteration_cap(max_iterations: u32) -> Self {
        Self {
            rules: baseline_rules(),
            max_iterations,
        }
    }

    /// Engine with a custom rule list, primarily for tests
    pub fn with_rules(rules: Vec<RewriteRule>, max_iterations: u32) -> Self {
        Self {
            rules,
            max_iterations,
        }
    }

    /// Rewrite a plan to a fixed point or to the iteration cap
    pub fn optimize(&self, plan: PlanNode) -> Result<RewriteResult, InvariantError> {
        let mut plan = plan;
        let mut applied: Vec<&'static str> = Vec::new();

        for iteration in 0..self.max_iterations {
            let mut fired = Vec::new();
            plan = self.pass(plan, &mut fired);

            if fired.is_empty() {
                trace!("fixed point after {} iterations", iteration);
                return Ok(RewriteResult {
                    plan,
                    fixpoint: Fixpoint::Fixed,
                    iterations: iteration,
                    applied,
                });
            }

            debug!(
                "iteration {}: applied {} rewrite(s): {}",
                iteration,
                fired.len(),
                fired.join(", ")
            );
            if let Err(detail) = plan.validate() {
                return Err(InvariantError {
                    rule: fired[fired.len() - 1],
                    detail,
                });
            }
            applied.extend(fired.iter().copied());
        }

        debug!("iteration cap {} exhausted", self.max_iterations);
        Ok(RewriteResult {
            plan,
            fixpoint: Fixpoint::Exhausted,
            iterations: self.max_iterations,
            applied,
        })
    }

    /// One bottom-up traversal; the first matching rule per node is applied
    fn pass(&self, node: PlanNode, fired: &mut Vec<&'static str>) -> PlanNode {
        let node = self.pass_children(node, fired);
        for rule in &self.rules {
            if let Some(replacement) = (rule.rewrite)(&node) {
                trace!("rule {} fired at {}", rule.name, node_label(&node));
                fired.push(rule.name);
                return replacement;
            }
        }
        node
    }

    fn pass_children(&self, node: PlanNode, fired: &mut Vec<&'static str>) -> PlanNode {
        match node {
            PlanNode::Filter { predicate, input } => PlanNode::Filter {
                predicate,
                input: Box::new(self.pass(*input, fired)),
            },
            PlanNode::Project { exprs, input } => PlanNode::Project {
                exprs,
                input: Box::new(self.pass(*input, fired)),
            },
            PlanNode::Join {
                join_type,
                condition,
                left,
                right,
            } => PlanNode::Join {
                join_type,
                condition,
                left: Box::new(self.pass(*left, fired)),
                right: Box::new(self.pass(*right, fired)),
            },
            PlanNode::Aggregate {
                group_by,
                aggregates,
                input,
            } => PlanNode::Aggregate {
                group_by,
                aggregates,
                input: Box::new(self.pass(*input, fired)),
            },
            PlanNode::Sort { keys, input } => PlanNode::Sort {
                keys,
                input: Box::new(self.pass(*input, fired)),
            },
            PlanNode::Limit {
                count,
                offset,
                input,
            } => PlanNode::Limit {
                count,
                offset,
                input: Box::new(self.pass(*input, fired)),
            },
            leaf @ (PlanNode::Scan { .. } | PlanNode::SingleRow | PlanNode::Empty { .. }) => leaf,
        }
    }
}

impl Default for LogicalOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

fn node_label(node: &PlanNode) -> &'static str {
    match node {
        PlanNode::Scan { .. } => "Scan",
        PlanNode::Filter { .. } => "Filter",
        PlanNode::Project { .. } => "Project",
        PlanNode::Join { .. } => "Join",
        PlanNode::Aggregate { .. } => "Aggregate",
        PlanNode::Sort { .. } => "Sort",
        PlanNode::Limit { .. } => "Limit",
        PlanNode::SingleRow => "SingleRow",
        PlanNode::Empty { .. } => "Empty",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Literal};
    use crate::catalog::ColumnType;
    use crate::plan::logical::{
        ColumnRef, Field, JoinType, RowType, ScalarExpr, ScalarType,
    };

    fn scan(alias: &str) -> PlanNode {
        PlanNode::Scan {
            table: alias.to_string(),
            alias: alias.to_string(),
            schema: RowType::new(vec![Field {
                qualifier: Some(alias.to_string()),
                name: "id".to_string(),
                ty: ScalarType::Value(ColumnType::Integer),
            }]),
        }
    }

    fn tautology() -> ScalarExpr {
        ScalarExpr::Binary {
            op: BinaryOp::Eq,
            left: Box::new(ScalarExpr::Literal(Literal::Integer(1))),
            right: Box::new(ScalarExpr::Literal(Literal::Integer(1))),
        }
    }

    #[test]
    fn reaches_fixed_point_on_clean_tree() {
        let result = LogicalOptimizer::new().optimize(scan("t")).unwrap();
        assert_eq!(result.fixpoint, Fixpoint::Fixed);
        assert_eq!(result.iterations, 0);
        assert!(result.applied.is_empty());
    }

    #[test]
    fn removes_stacked_trivial_filters() {
        let plan = PlanNode::Filter {
            predicate: tautology(),
            input: Box::new(PlanNode::Filter {
                predicate: tautology(),
                input: Box::new(scan("t")),
            }),
        };
        let result = LogicalOptimizer::new().optimize(plan).unwrap();
        assert_eq!(result.fixpoint, Fixpoint::Fixed);
        assert_eq!(result.plan, scan("t"));
        assert!(result.applied.contains(&"remove-trivial-filter"));
    }

    #[test]
    fn optimizing_twice_is_idempotent() {
        let plan = PlanNode::Filter {
            predicate: tautology(),
            input: Box::new(PlanNode::Limit {
                count: 0,
                offset: 0,
                input: Box::new(scan("t")),
            }),
        };
        let engine = LogicalOptimizer::new();
        let once = engine.optimize(plan).unwrap();
        let twice = engine.optimize(once.plan.clone()).unwrap();
        assert_eq!(once.plan, twice.plan);
        assert_eq!(twice.fixpoint, Fixpoint::Fixed);
        assert!(twice.applied.is_empty());
    }

    #[test]
    fn adversarial_rule_set_halts_exhausted() {
        // A rule that always swaps cross join inputs never converges
        fn swap(node: &PlanNode) -> Option<PlanNode> {
            if let PlanNode::Join {
                join_type: JoinType::Cross,
                condition: None,
                left,
                right,
            } = node
            {
                return Some(PlanNode::Join {
                    join_type: JoinType::Cross,
                    condition: None,
                    left: right.clone(),
                    right: left.clone(),
                });
            }
            None
        }

        let plan = PlanNode::Join {
            join_type: JoinType::Cross,
            condition: None,
            left: Box::new(scan("a")),
            right: Box::new(scan("b")),
        };
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
        assert_eq!(result.applied.len(), 10);
    }

    #[test]
    fn invariant_violation_is_fatal() {
        // A rule that drops the join's right input leaves the condition
        // referencing columns that no longer exist
        fn drop_right(node: &PlanNode) -> Option<PlanNode> {
            if let PlanNode::Join {
                join_type: JoinType::Inner,
                condition: Some(condition),
                left,
                ..
            } = node
            {
                return Some(PlanNode::Filter {
                    predicate: condition.clone(),
                    input: left.clone(),
                });
            }
            None
        }

        let condition = ScalarExpr::Binary {
            op: BinaryOp::Eq,
            left: Box::new(ScalarExpr::Column(ColumnRef {
                qualifier: Some("a".to_string()),
                name: "id".to_string(),
                ty: ScalarType::Value(ColumnType::Integer),
            })),
            right: Box::new(ScalarExpr::Column(ColumnRef {
                qualifier: Some("b".to_string()),
                name: "id".to_string(),
                ty: ScalarType::Value(ColumnType::Integer),
            })),
        };
        let plan = PlanNode::Join {
            join_type: JoinType::Inner,
            condition: Some(condition),
            left: Box::new(scan("a")),
            right: Box::new(scan("b")),
        };

        let engine = LogicalOptimizer::with_rules(
            vec![RewriteRule {
                name: "drop-join-right",
                rewrite: drop_right,
            }],
            5,
        );
        let err = engine.optimize(plan).unwrap_err();
        assert_eq!(err.rule, "drop-join-right");
        assert!(err.detail.contains("b.id"));
    }

    #[test]
    fn empty_propagates_up_through_parents() {
        // Limit 0 at the bottom collapses the whole chain in one run
        let plan = PlanNode::Filter {
            predicate: tautology(),
            input: Box::new(PlanNode::Sort {
                keys: vec![],
                input: Box::new(PlanNode::Limit {
                    count: 0,
                    offset: 0,
                    input: Box::new(scan("t")),
                }),
            }),
        };
        let result = LogicalOptimizer::new().optimize(plan).unwrap();
        assert_eq!(result.fixpoint, Fixpoint::Fixed);
        assert!(matches!(result.plan, PlanNode::Empty { .. }));
    }
}
