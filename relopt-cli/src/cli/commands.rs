// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command definitions for Relopt

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use relopt::Dialect;

/// Log level options
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Info, warnings, and errors
    Info,
    /// Debug messages and above (verbose)
    Debug,
    /// All messages including trace (very verbose)
    Trace,
    /// Disable all logging
    Off,
}

impl LogLevel {
    /// Convert to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Output format for optimization results
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Two-column summary table
    Table,
    /// JSON document
    Json,
    /// The rewritten SQL only
    Plain,
}

/// Target SQL dialect
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DialectOption {
    Mysql,
    Ansi,
}

impl DialectOption {
    pub fn to_dialect(self) -> Dialect {
        match self {
            DialectOption::Mysql => Dialect::mysql(),
            DialectOption::Ansi => Dialect::ansi(),
        }
    }
}

/// Relopt CLI - rule-based SQL query optimizer
#[derive(Parser)]
#[command(name = "relopt")]
#[command(about = "Relopt - A lightweight rule-based SQL query optimizer")]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace, off)
    #[arg(short = 'l', long = "log-level", global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Verbose mode (equivalent to --log-level debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Optimize a single query
    Optimize {
        /// The SQL query to optimize
        query: String,

        /// Schema description file (JSON array of table records)
        #[arg(short, long)]
        schema: PathBuf,

        /// Target dialect for the rewritten SQL
        #[arg(short, long, default_value = "mysql")]
        dialect: DialectOption,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Show the logical plans before and after rewriting
        #[arg(short, long)]
        explain: bool,

        /// Iteration cap for the rule engine
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Interactive SQL console (REPL)
    Repl {
        /// Schema description file (JSON array of table records)
        #[arg(short, long)]
        schema: PathBuf,

        /// Target dialect for the rewritten SQL
        #[arg(short, long, default_value = "mysql")]
        dialect: DialectOption,
    },

    /// List the tables of a schema description
    Tables {
        /// Schema description file (JSON array of table records)
        #[arg(short, long)]
        schema: PathBuf,
    },
}
