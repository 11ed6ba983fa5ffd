//! Postgres warehouse
//!
//! A dataset is a Postgres schema. Metric tables are range-partitioned on the
//! run timestamp with one partition per day, created the first time a batch
//! lands in that day. Rows are shipped as a single JSONB array and expanded
//! with `jsonb_populate_recordset`, so keys that are not columns are dropped.

use adsync_common::error::validate_identifier;
use adsync_common::types::AuditRecord;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use super::schema::{qualified_name, TableSchema};
use super::{QueryParam, Warehouse, WriteMode};
use crate::api::Record;
use crate::config::DatabaseConfig;
use crate::error::WarehouseError;

/// Open a connection pool using the database settings
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, WarehouseError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    info!(max_connections = config.max_connections, "Database connection pool created");
    Ok(pool)
}

pub struct PgWarehouse {
    pool: PgPool,
    dataset: String,
    audit_table: String,
}

impl PgWarehouse {
    pub fn new(
        pool: PgPool,
        dataset: impl Into<String>,
        audit_table: impl Into<String>,
    ) -> Result<Self, WarehouseError> {
        let dataset = dataset.into();
        let audit_table = audit_table.into();
        validate_identifier(&dataset)?;
        validate_identifier(&audit_table)?;
        Ok(Self {
            pool,
            dataset,
            audit_table,
        })
    }

    /// Create the daily partitions covering every row's `partition_field`
    async fn ensure_partitions(
        &self,
        table: &str,
        rows: &[Record],
        partition_field: &str,
    ) -> Result<(), WarehouseError> {
        for day in partition_days(table, rows, partition_field)? {
            let sql = partition_sql(&self.dataset, table, day)?;
            sqlx::query(&sql).execute(&self.pool).await?;
            debug!(table = %table, day = %day, "Ensured partition");
        }
        Ok(())
    }
}

/// Distinct UTC days of `partition_field` across `rows`
fn partition_days(
    table: &str,
    rows: &[Record],
    partition_field: &str,
) -> Result<BTreeSet<NaiveDate>, WarehouseError> {
    let mut days = BTreeSet::new();
    for row in rows {
        let value = row.get(partition_field).and_then(|v| v.as_str()).ok_or_else(|| {
            WarehouseError::Rejected {
                table: table.to_string(),
                message: format!("row is missing partition field {}", partition_field),
            }
        })?;
        let ts = DateTime::parse_from_rfc3339(value).map_err(|e| WarehouseError::Rejected {
            table: table.to_string(),
            message: format!("invalid {} value {:?}: {}", partition_field, value, e),
        })?;
        days.insert(ts.naive_utc().date());
    }
    Ok(days)
}

/// `CREATE TABLE IF NOT EXISTS ... PARTITION OF ...` for one day
fn partition_sql(dataset: &str, table: &str, day: NaiveDate) -> Result<String, WarehouseError> {
    let partition = format!("{}_p{}", table, day.format("%Y%m%d"));
    validate_identifier(&partition)?;
    let next = day + ChronoDuration::days(1);
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} PARTITION OF {} FOR VALUES FROM ('{} 00:00:00+00') TO ('{} 00:00:00+00')",
        qualified_name(dataset, &partition)?,
        qualified_name(dataset, table)?,
        day.format("%Y-%m-%d"),
        next.format("%Y-%m-%d"),
    ))
}

/// Statement inserting a bound JSONB array into `target`
fn insert_sql(target: &str) -> String {
    format!(
        "INSERT INTO {target} SELECT * FROM jsonb_populate_recordset(NULL::{target}, $1::jsonb)",
        target = target
    )
}

#[async_trait]
impl Warehouse for PgWarehouse {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    async fn ensure_dataset(&self) -> Result<(), WarehouseError> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.dataset);
        sqlx::query(&sql).execute(&self.pool).await?;
        debug!(dataset = %self.dataset, "Ensured dataset");
        Ok(())
    }

    async fn ensure_table(&self, name: &str, schema: &TableSchema) -> Result<(), WarehouseError> {
        let sql = schema.create_table_sql(&self.dataset, name)?;
        sqlx::query(&sql).execute(&self.pool).await?;
        debug!(table = %name, "Ensured table");
        Ok(())
    }

    async fn load_rows(
        &self,
        table: &str,
        rows: &[Record],
        mode: WriteMode,
        partition_field: Option<&str>,
    ) -> Result<u64, WarehouseError> {
        let target = qualified_name(&self.dataset, table)?;
        if let Some(field) = partition_field {
            self.ensure_partitions(table, rows, field).await?;
        }

        let payload = Json(rows);
        let written = match mode {
            WriteMode::Truncate => {
                let mut tx = self.pool.begin().await?;
                sqlx::query(&format!("TRUNCATE TABLE {}", target))
                    .execute(&mut *tx)
                    .await?;
                let result = sqlx::query(&insert_sql(&target))
                    .bind(payload)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                result.rows_affected()
            },
            WriteMode::Append => sqlx::query(&insert_sql(&target))
                .bind(payload)
                .execute(&self.pool)
                .await?
                .rows_affected(),
        };

        debug!(table = %table, mode = %mode, rows = written, "Rows written");
        Ok(written)
    }

    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Record>, WarehouseError> {
        let wrapped = format!("SELECT to_jsonb(q) AS row FROM ({}) q", sql);
        let mut query = sqlx::query(&wrapped);
        for param in params {
            query = match param {
                QueryParam::Text(value) => query.bind(value.clone()),
                QueryParam::TextArray(values) => query.bind(values.clone()),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let value: serde_json::Value = row.try_get("row")?;
            match value {
                serde_json::Value::Object(map) => out.push(map),
                other => {
                    return Err(WarehouseError::Rejected {
                        table: String::from("query"),
                        message: format!("expected a JSON object row, got {}", other),
                    })
                },
            }
        }
        Ok(out)
    }

    async fn append_audit_row(&self, row: &AuditRecord) -> Result<(), WarehouseError> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                run_timestamp, table_name, ad_account_id,
                rows_processed, status, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            qualified_name(&self.dataset, &self.audit_table)?
        );

        sqlx::query(&sql)
            .bind(row.run_timestamp)
            .bind(&row.table_name)
            .bind(&row.account_id)
            .bind(row.rows_processed)
            .bind(row.status.as_str())
            .bind(&row.error_message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
