use crate::common::error::{CoreError, Result};
use crate::warehouse::{Column, ColumnType, TableSchema, Warehouse};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// SQLite-backed warehouse. One connection per process, behind a mutex, so
/// the truncate-then-load step and the merge step serialize naturally against
/// the same staging table.
pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
}

impl SqliteWarehouse {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path = %db_path.as_ref().display(), "opened warehouse");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Infer a column type from the non-null values observed in the batch. A
/// column with no non-null values has no observable type.
fn infer_columns(headers: &[String], rows: &[csv::StringRecord]) -> Result<Vec<Column>> {
    let mut columns = Vec::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        let mut seen_value = false;
        let mut numeric = true;
        for row in rows {
            let field = row.get(idx).unwrap_or("");
            if field.is_empty() {
                continue;
            }
            seen_value = true;
            if field.parse::<f64>().is_err() {
                numeric = false;
            }
        }
        if !seen_value {
            return Err(CoreError::Load {
                message: format!(
                    "column '{name}' is entirely null in this batch; supply an explicit schema"
                ),
            });
        }
        columns.push(Column {
            name: name.clone(),
            ty: if numeric {
                ColumnType::Real
            } else {
                ColumnType::Text
            },
        });
    }
    Ok(columns)
}

fn bind_value(field: &str, ty: ColumnType, column: &str) -> Result<Value> {
    if field.is_empty() {
        return Ok(Value::Null);
    }
    match ty {
        ColumnType::Text => Ok(Value::Text(field.to_string())),
        ColumnType::Real => field
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| CoreError::Load {
                message: format!("column '{column}': '{field}' is not numeric"),
            }),
    }
}

/// Single set-based statement: insert each distinct staging row whose natural
/// key has no match in the permanent table. DISTINCT collapses duplicate
/// staging rows before matching.
fn merge_statement(staging: &str, permanent: &str, schema: &TableSchema) -> String {
    let cols = schema.column_names().join(", ");
    let select_cols = schema
        .columns
        .iter()
        .map(|c| format!("s.{}", c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let key_match = schema
        .key
        .iter()
        .map(|k| format!("m.{k} = s.{k}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "INSERT INTO {permanent} ({cols})\n\
         SELECT DISTINCT {select_cols}\n\
         FROM {staging} AS s\n\
         WHERE NOT EXISTS (SELECT 1 FROM {permanent} AS m WHERE {key_match})"
    )
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(include_str!(
            "../../migrations/001_create_warehouse_tables.sql"
        ))?;
        info!("warehouse migrations applied");
        Ok(())
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(&format!("DELETE FROM {table}"), [])?;
        debug!(table, deleted, "truncated staging table");
        Ok(())
    }

    async fn bulk_load(
        &self,
        table: &str,
        csv_path: &Path,
        schema: Option<&TableSchema>,
    ) -> Result<usize> {
        let mut reader = csv::Reader::from_path(csv_path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let columns: Vec<Column> = match schema {
            Some(schema) => {
                // Explicit schema: bind by name, in the schema's column order.
                let mut mapped = Vec::with_capacity(schema.columns.len());
                for col in &schema.columns {
                    if !headers.iter().any(|h| h == &col.name) {
                        return Err(CoreError::Load {
                            message: format!(
                                "snapshot {} is missing column '{}'",
                                csv_path.display(),
                                col.name
                            ),
                        });
                    }
                    mapped.push(col.clone());
                }
                mapped
            }
            None => infer_columns(&headers, &rows)?,
        };

        let indices: Vec<usize> = columns
            .iter()
            .map(|c| headers.iter().position(|h| h == &c.name).unwrap_or(0))
            .collect();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let names = columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO {table} ({names}) VALUES ({placeholders})");

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut loaded = 0usize;
        {
            let mut stmt = tx.prepare(&sql).map_err(|e| CoreError::Load {
                message: format!("preparing load into {table}: {e}"),
            })?;
            for row in &rows {
                let mut values = Vec::with_capacity(columns.len());
                for (col, &idx) in columns.iter().zip(&indices) {
                    values.push(bind_value(row.get(idx).unwrap_or(""), col.ty, &col.name)?);
                }
                stmt.execute(params_from_iter(values))
                    .map_err(|e| CoreError::Load {
                        message: format!("loading into {table}: {e}"),
                    })?;
                loaded += 1;
            }
        }
        tx.commit().map_err(|e| CoreError::Load {
            message: format!("committing load into {table}: {e}"),
        })?;
        info!(table, loaded, "bulk load complete");
        Ok(loaded)
    }

    async fn merge_missing(
        &self,
        staging: &str,
        permanent: &str,
        schema: &TableSchema,
    ) -> Result<usize> {
        let sql = merge_statement(staging, permanent, schema);
        let conn = self.conn.lock().await;
        let inserted = conn.execute(&sql, []).map_err(|e| CoreError::Merge {
            message: format!("merging {staging} into {permanent}: {e}"),
        })?;
        info!(staging, permanent, inserted, "merge complete");
        Ok(inserted)
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }
}
