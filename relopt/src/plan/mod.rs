// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query planning and optimization
//!
//! This module converts parsed statements into logical operator trees and
//! rewrites them with a rule-based, fixed-point engine. It includes the plan
//! representation, the AST-to-plan builder, and the optimizer rules.

pub mod builders;
pub mod logical;
pub mod optimizers;

pub use builders::{BuildError, LogicalBuilder};
pub use logical::PlanNode;
pub use optimizers::{Fixpoint, InvariantError, LogicalOptimizer, RewriteResult};
