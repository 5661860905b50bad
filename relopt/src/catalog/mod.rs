// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory schema catalog
//!
//! The catalog maps table names to column definitions and is the single
//! source of truth for name and type resolution during planning. It is
//! built once from a schema description, then treated as a read-only
//! snapshot for the duration of an optimization run; concurrent runs may
//! share it by reference.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or querying the catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("table '{0}' is already registered")]
    DuplicateTable(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("invalid schema description: {0}")]
    InvalidSchema(String),
}

/// Primitive column types understood by the type checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    BigInt,
    Float,
    Double,
    Char,
    Varchar,
    Boolean,
    Date,
    Timestamp,
}

/// Type families used for operator compatibility checks
///
/// Two values are comparable when their types belong to the same family;
/// there are no implicit cross-family conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Numeric,
    Character,
    Boolean,
    Temporal,
}

impl ColumnType {
    /// The family this type belongs to
    pub fn family(self) -> TypeFamily {
        match self {
            ColumnType::Integer | ColumnType::BigInt | ColumnType::Float | ColumnType::Double => {
                TypeFamily::Numeric
            }
            ColumnType::Char | ColumnType::Varchar => TypeFamily::Character,
            ColumnType::Boolean => TypeFamily::Boolean,
            ColumnType::Date | ColumnType::Timestamp => TypeFamily::Temporal,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.family() == TypeFamily::Numeric
    }

    /// Whether values of the two types may be compared directly
    pub fn comparable_with(self, other: ColumnType) -> bool {
        self.family() == other.family()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Char => "CHAR",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        };
        write!(f, "{}", name)
    }
}

/// A single column definition, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

impl ColumnDef {
    /// Create a column definition; the name is folded to lower case
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into().to_lowercase(),
            ty,
        }
    }
}

/// A table definition: a name plus an ordered sequence of columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    #[serde(rename = "table")]
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Create a table definition; the name is folded to lower case
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            columns,
        }
    }

    /// Look up a column by case-insensitive name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        let name = name.to_lowercase();
        self.columns.iter().find(|c| c.name == name)
    }
}

/// The schema catalog: table name -> table definition
///
/// Registration validates uniqueness of table names and of column names
/// within each table; deserialized schema records go through the same
/// checks via [`SchemaCatalog::from_records`].
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: HashMap<String, TableDef>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a sequence of table records
    pub fn from_records(records: Vec<TableDef>) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for record in records {
            catalog.register(record)?;
        }
        Ok(catalog)
    }

    /// Build a catalog from a JSON array of
    /// `{ "table": ..., "columns": [ { "name": ..., "type": ... } ] }` records
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let records: Vec<TableDef> =
            serde_json::from_str(json).map_err(|e| CatalogError::InvalidSchema(e.to_string()))?;
        Self::from_records(records)
    }

    /// Register a table definition; names are folded to lower case
    pub fn register(&mut self, table: TableDef) -> Result<(), CatalogError> {
        let columns = table
            .columns
            .into_iter()
            .map(|c| ColumnDef::new(c.name, c.ty))
            .collect();
        let table = TableDef::new(table.name, columns);
        let mut seen = HashMap::new();
        for (index, column) in table.columns.iter().enumerate() {
            if seen.insert(column.name.clone(), index).is_some() {
                return Err(CatalogError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        if self.tables.contains_key(&table.name) {
            return Err(CatalogError::DuplicateTable(table.name));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Look up a table by case-insensitive name
    pub fn lookup(&self, name: &str) -> Result<&TableDef, CatalogError> {
        let key = name.to_lowercase();
        self.tables
            .get(&key)
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }

    /// All registered tables, sorted by name
    pub fn tables(&self) -> Vec<&TableDef> {
        let mut tables: Vec<&TableDef> = self.tables.values().collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
