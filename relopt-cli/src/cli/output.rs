// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result formatting for the Relopt CLI

use std::fs;
use std::path::Path;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::json;

use relopt::{Fixpoint, OptimizeReport, SchemaCatalog};

use super::commands::OutputFormat;

/// Load and validate a schema description file
///
/// All schema problems (unreadable file, malformed JSON, duplicate names)
/// surface here as a single startup error.
pub fn load_catalog(path: &Path) -> Result<SchemaCatalog, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read schema file {:?}: {}", path, e))?;
    let catalog = SchemaCatalog::from_json(&text)
        .map_err(|e| format!("schema file {:?}: {}", path, e))?;
    if catalog.is_empty() {
        return Err(format!("schema file {:?} defines no tables", path).into());
    }
    Ok(catalog)
}

/// Render the catalog as a table listing
pub fn schema_table(catalog: &SchemaCatalog) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Table", "Column", "Type"]);
    for def in catalog.tables() {
        for column in &def.columns {
            table.add_row(vec![
                def.name.clone(),
                column.name.clone(),
                column.ty.to_string(),
            ]);
        }
    }
    table
}

/// Print an optimization report in the requested format
pub fn print_report(
    original: &str,
    report: &OptimizeReport,
    format: OutputFormat,
    explain: bool,
) {
    match format {
        OutputFormat::Plain => {
            println!("{}", report.sql);
        }
        OutputFormat::Json => {
            let document = json!({
                "original": original,
                "optimized": report.sql,
                "fixpoint": match report.fixpoint {
                    Fixpoint::Fixed => "fixed",
                    Fixpoint::Exhausted => "exhausted",
                },
                "iterations": report.iterations,
                "applied_rules": report.applied_rules,
                "plan": report.plan.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&document).unwrap_or_default());
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.add_row(vec!["Original".to_string(), original.trim().to_string()]);
            table.add_row(vec!["Optimized".to_string(), report.sql.clone()]);
            table.add_row(vec![
                "Rules applied".to_string(),
                if report.applied_rules.is_empty() {
                    "(none)".to_string()
                } else {
                    report.applied_rules.join(", ")
                },
            ]);
            table.add_row(vec![
                "Iterations".to_string(),
                report.iterations.to_string(),
            ]);
            println!("{}", table);
        }
    }

    if explain {
        println!("{}", "Initial plan:".bold());
        println!("{}", report.initial_plan);
        println!("{}", "Optimized plan:".bold());
        println!("{}", report.plan);
    }

    if report.fixpoint == Fixpoint::Exhausted {
        println!(
            "{}",
            "warning: the rule engine exhausted its iteration cap; output is best-effort"
                .yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"table": "users", "columns": [{{"name": "id", "type": "integer"}}]}}]"#
        )
        .unwrap();
        let catalog = load_catalog(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn missing_file_is_a_single_error() {
        let err = load_catalog(Path::new("/nonexistent/schema.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read schema file"));
    }

    #[test]
    fn empty_schema_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        let err = load_catalog(file.path()).unwrap_err();
        assert!(err.to_string().contains("defines no tables"));
    }
}
