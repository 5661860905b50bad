// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Relopt CLI entry point

mod cli;

use clap::Parser;
use colored::Colorize;

use cli::commands::{Cli, Commands, LogLevel};

fn main() {
    let args = Cli::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        args.log_level
            .map(LogLevel::to_level_filter)
            .unwrap_or(log::LevelFilter::Warn)
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let result = match args.command {
        Commands::Optimize {
            query,
            schema,
            dialect,
            format,
            explain,
            max_iterations,
        } => cli::handle_optimize(query, schema, dialect, format, explain, max_iterations),
        Commands::Repl { schema, dialect } => cli::repl::handle_repl(schema, dialect),
        Commands::Tables { schema } => cli::handle_tables(schema),
    };

    if let Err(e) = result {
        eprintln!("{}", format!("error: {}", e).red());
        std::process::exit(1);
    }
}
