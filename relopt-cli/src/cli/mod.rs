// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for Relopt
//!
//! Provides command-line entry points for one-shot query optimization, an
//! interactive SQL console (REPL), and schema inspection.

pub mod commands;
pub mod output;
pub mod repl;

pub use commands::{Cli, Commands};

use std::path::PathBuf;

use commands::{DialectOption, OutputFormat};
use output::{load_catalog, print_report, schema_table};
use relopt::SqlOptimizer;

/// Handle the optimize command
pub fn handle_optimize(
    query: String,
    schema: PathBuf,
    dialect: DialectOption,
    format: OutputFormat,
    explain: bool,
    max_iterations: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    if query.trim().is_empty() {
        return Err("query is empty".into());
    }

    let catalog = load_catalog(&schema)?;
    let mut optimizer = SqlOptimizer::new(catalog).with_dialect(dialect.to_dialect());
    if let Some(cap) = max_iterations {
        optimizer = optimizer.with_iteration_cap(cap);
    }

    let report = optimizer.optimize(&query)?;
    print_report(&query, &report, format, explain);
    Ok(())
}

/// Handle the tables command
pub fn handle_tables(schema: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(&schema)?;
    println!("{}", schema_table(&catalog));
    Ok(())
}
