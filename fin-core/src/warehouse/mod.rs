use crate::common::error::Result;
use crate::domain::{InstitutionKind, RecordKind};
use async_trait::async_trait;
use std::path::Path;

pub mod sqlite;

pub use sqlite::SqliteWarehouse;

/// Column affinity used by the bulk loader and the DDL it validates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Real,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// Canonical shape of a staging/permanent table pair: ordered columns plus the
/// natural-key columns the merge matches on.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub key: Vec<String>,
}

impl TableSchema {
    fn column(name: &str, ty: ColumnType) -> Column {
        Column {
            name: name.to_string(),
            ty,
        }
    }

    /// Dimension tables: the natural key is the full tuple, so an attribute
    /// change is a new row, never an update.
    pub fn dimension() -> Self {
        let names = ["charter_id", "name", "city", "state", "url"];
        TableSchema {
            columns: names
                .iter()
                .map(|n| Self::column(n, ColumnType::Text))
                .collect(),
            key: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Fact tables: keyed by institution and reporting period.
    pub fn fact() -> Self {
        TableSchema {
            columns: vec![
                Self::column("charter_id", ColumnType::Text),
                Self::column("year", ColumnType::Text),
                Self::column("month", ColumnType::Text),
                Self::column("assets", ColumnType::Real),
                Self::column("deposits", ColumnType::Real),
            ],
            key: vec![
                "charter_id".to_string(),
                "year".to_string(),
                "month".to_string(),
            ],
        }
    }

    pub fn for_kind(record: RecordKind) -> Self {
        match record {
            RecordKind::Dimension => Self::dimension(),
            RecordKind::Fact => Self::fact(),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Table-name namespacing per institution type and record kind.
pub struct Tables;

impl Tables {
    pub fn permanent(kind: InstitutionKind, record: RecordKind) -> String {
        format!("{}_{}", record.table_prefix(), kind.table_segment())
    }

    pub fn staging(kind: InstitutionKind, record: RecordKind) -> String {
        format!("{}_staging", Self::permanent(kind, record))
    }
}

/// Warehouse operations the pipeline depends on. One configured instance is
/// constructed at process startup and passed explicitly into each stage.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the staging and permanent tables if they do not exist.
    async fn run_migrations(&self) -> Result<()>;

    /// Delete all rows from `table`.
    async fn truncate(&self, table: &str) -> Result<()>;

    /// Load a CSV snapshot into `table`, returning the number of rows loaded.
    ///
    /// With `schema == None` column types are inferred from the data; a column
    /// that is entirely null in the batch cannot be inferred and is a `Load`
    /// error asking the caller to supply the schema explicitly.
    async fn bulk_load(
        &self,
        table: &str,
        csv_path: &Path,
        schema: Option<&TableSchema>,
    ) -> Result<usize>;

    /// Insert every distinct staging row whose natural key is absent from the
    /// permanent table, as a single set-based statement. Existing permanent
    /// rows are never updated or deleted. Returns the number of rows inserted.
    async fn merge_missing(
        &self,
        staging: &str,
        permanent: &str,
        schema: &TableSchema,
    ) -> Result<usize>;

    async fn row_count(&self, table: &str) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_namespaced() {
        assert_eq!(
            Tables::permanent(InstitutionKind::Bank, RecordKind::Dimension),
            "dim_banks"
        );
        assert_eq!(
            Tables::staging(InstitutionKind::CreditUnion, RecordKind::Fact),
            "fact_credit_unions_staging"
        );
    }

    #[test]
    fn fact_key_is_charter_and_period() {
        let schema = TableSchema::fact();
        assert_eq!(schema.key, vec!["charter_id", "year", "month"]);
        assert_eq!(schema.columns.len(), 5);
    }

    #[test]
    fn dimension_key_is_full_tuple() {
        let schema = TableSchema::dimension();
        assert_eq!(schema.key.len(), schema.columns.len());
    }
}
