//! Table schemas and DDL generation
//!
//! Column types are the warehouse-neutral ones used by the audit table
//! definition (`TIMESTAMP`, `STRING`, `INTEGER`, ...). [`TableSchema::create_table_sql`]
//! renders them for Postgres.

use adsync_common::error::validate_identifier;
use serde::{Deserialize, Serialize};

use crate::catalog::{TableKind, ACCOUNT_COLUMN, DEFAULT_BREAKDOWNS, RUN_TIMESTAMP_COLUMN};
use crate::error::WarehouseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Timestamp,
    String,
    Integer,
    Numeric,
    Date,
    Json,
}

impl ColumnType {
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnType::Timestamp => "TIMESTAMPTZ",
            ColumnType::String => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Date => "DATE",
            ColumnType::Json => "JSONB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Required,
    Nullable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnType,
    pub mode: Mode,
}

impl ColumnDef {
    pub fn required(name: &str, kind: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mode: Mode::Required,
        }
    }

    pub fn nullable(name: &str, kind: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mode: Mode::Nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
    /// Timestamp column used for daily range partitioning, if any
    pub partition_field: Option<String>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            partition_field: None,
        }
    }

    pub fn partitioned_by(mut self, field: &str) -> Self {
        self.partition_field = Some(field.to_string());
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for `"dataset"."table"`
    pub fn create_table_sql(&self, dataset: &str, table: &str) -> Result<String, WarehouseError> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            validate_identifier(&col.name)?;
            let not_null = match col.mode {
                Mode::Required => " NOT NULL",
                Mode::Nullable => "",
            };
            columns.push(format!("    \"{}\" {}{}", col.name, col.kind.pg_type(), not_null));
        }

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            qualified_name(dataset, table)?,
            columns.join(",\n")
        );
        if let Some(field) = &self.partition_field {
            validate_identifier(field)?;
            sql.push_str(&format!(" PARTITION BY RANGE (\"{}\")", field));
        }
        Ok(sql)
    }
}

/// `"dataset"."table"`, after checking both are safe identifiers
pub fn qualified_name(dataset: &str, table: &str) -> Result<String, WarehouseError> {
    validate_identifier(dataset)?;
    validate_identifier(table)?;
    Ok(format!("\"{}\".\"{}\"", dataset, table))
}

/// Audit ledger table
pub fn audit_schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnDef::required("run_timestamp", ColumnType::Timestamp),
        ColumnDef::required("table_name", ColumnType::String),
        ColumnDef::required(ACCOUNT_COLUMN, ColumnType::String),
        ColumnDef::nullable("rows_processed", ColumnType::Integer),
        ColumnDef::required("status", ColumnType::String),
        ColumnDef::nullable("error_message", ColumnType::String),
    ])
}

fn field_type(field: &str) -> ColumnType {
    match field {
        "targeting" | "creative" => ColumnType::Json,
        "date_start" | "date_stop" => ColumnType::Date,
        "impressions" | "clicks" | "reach" => ColumnType::Integer,
        "spend" | "cpm" | "cpc" => ColumnType::Numeric,
        _ => ColumnType::String,
    }
}

/// Schema of one of the six synced tables: API fields plus enrichment columns
pub fn entity_schema(kind: TableKind) -> TableSchema {
    let mut columns: Vec<ColumnDef> = kind
        .fields()
        .into_iter()
        .map(|f| ColumnDef::nullable(f, field_type(f)))
        .collect();

    if kind.is_metric() {
        columns.extend(
            DEFAULT_BREAKDOWNS
                .iter()
                .map(|b| ColumnDef::nullable(b, ColumnType::String)),
        );
    }
    columns.push(ColumnDef::required(ACCOUNT_COLUMN, ColumnType::String));
    columns.push(ColumnDef::required(RUN_TIMESTAMP_COLUMN, ColumnType::Timestamp));

    let schema = TableSchema::new(columns);
    if kind.is_metric() {
        schema.partitioned_by(RUN_TIMESTAMP_COLUMN)
    } else {
        schema
    }
}
