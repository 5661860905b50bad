// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan builders (AST -> logical plan)

pub mod logical_builder;

pub use logical_builder::{BuildError, LogicalBuilder};
