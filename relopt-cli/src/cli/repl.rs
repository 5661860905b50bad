// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Interactive SQL console for Relopt
//!
//! Multi-line queries are buffered until a terminating `;`. Console
//! commands (`help`, `tables`, `schema`, `explain`, `exit`) are handled
//! locally; everything else goes through the optimizer.

use std::path::PathBuf;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use relopt::{Fixpoint, SqlOptimizer};

use super::commands::DialectOption;
use super::output::{load_catalog, schema_table};

const HISTORY_FILE: &str = ".relopt_history";

/// Handle the repl command
pub fn handle_repl(
    schema: PathBuf,
    dialect: DialectOption,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(&schema)?;
    let optimizer = SqlOptimizer::new(catalog).with_dialect(dialect.to_dialect());

    println!("{}", "Relopt".bold().green());
    println!("Type 'help' for commands, 'exit' or 'quit' to exit");
    println!("Multi-line queries supported - use ';' to terminate");
    println!(
        "{}",
        format!(
            "Schema: {:?} ({} tables), dialect: {}",
            schema,
            optimizer.catalog().len(),
            optimizer.dialect().name
        )
        .cyan()
    );

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;
    let _ = rl.load_history(HISTORY_FILE);

    let mut explain = false;
    let mut query_buffer = String::new();

    loop {
        let prompt = if query_buffer.is_empty() {
            "relopt> ".to_string()
        } else {
            "     -> ".to_string()
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if query_buffer.is_empty() {
                    match trimmed.to_lowercase().as_str() {
                        "" => continue,
                        "exit" | "quit" => break,
                        "help" => {
                            print_help();
                            continue;
                        }
                        "tables" => {
                            println!("{}", schema_table(optimizer.catalog()));
                            continue;
                        }
                        "explain on" => {
                            explain = true;
                            println!("Plan output enabled");
                            continue;
                        }
                        "explain off" => {
                            explain = false;
                            println!("Plan output disabled");
                            continue;
                        }
                        command if command.starts_with("schema ") => {
                            show_table(&optimizer, command.trim_start_matches("schema ").trim());
                            continue;
                        }
                        _ => {}
                    }
                }

                query_buffer.push_str(&line);
                query_buffer.push('\n');

                if !trimmed.ends_with(';') {
                    continue;
                }

                let query = query_buffer.trim().to_string();
                query_buffer.clear();
                let _ = rl.add_history_entry(&query);

                run_query(&optimizer, &query, explain);
            }
            Err(ReadlineError::Interrupted) => {
                query_buffer.clear();
                println!("^C");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("{}", format!("input error: {}", e).red());
                break;
            }
        }
    }

    let _ = rl.save_history(HISTORY_FILE);
    println!("Bye");
    Ok(())
}

fn run_query(optimizer: &SqlOptimizer, query: &str, explain: bool) {
    match optimizer.optimize(query) {
        Ok(report) => {
            println!("{}", report.sql.green());
            if !report.applied_rules.is_empty() {
                println!(
                    "{}",
                    format!("rules: {}", report.applied_rules.join(", ")).dimmed()
                );
            }
            if explain {
                println!("{}", report.plan);
            }
            if report.fixpoint == Fixpoint::Exhausted {
                println!(
                    "{}",
                    "warning: iteration cap exhausted, output is best-effort".yellow()
                );
            }
        }
        Err(e) => println!("{}", format!("error: {}", e).red()),
    }
}

fn show_table(optimizer: &SqlOptimizer, name: &str) {
    match optimizer.catalog().lookup(name) {
        Ok(table) => {
            for column in &table.columns {
                println!("  {} {}", column.name, column.ty);
            }
        }
        Err(e) => println!("{}", format!("error: {}", e).red()),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  help            Show this help");
    println!("  tables          List all tables in the schema");
    println!("  schema <table>  Show the columns of a table");
    println!("  explain on|off  Toggle logical plan output");
    println!("  exit, quit      Leave the console");
    println!();
    println!("Any other input is treated as SQL; terminate queries with ';'.");
}
