// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical plan optimization: rewrite rules and the fixed-point engine

pub mod logical_optimizer;
pub mod rules;

pub use logical_optimizer::{Fixpoint, InvariantError, LogicalOptimizer, RewriteResult};
pub use rules::{baseline_rules, RewriteRule};
