use crate::common::error::{EtlError, Result};
use crate::export;
use crate::fetch::RawRecord;
use chrono::{DateTime, Utc};
use fin_core::domain::{InstitutionKind, RecordKind, ReportCycle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Handoff contract between the fetch stage and the transform stage: names
/// the raw extract files and records whether pagination ran to completion.
/// Replaces mtime guessing for the common path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractManifest {
    pub institution: InstitutionKind,
    pub dimension_file: PathBuf,
    pub fact_file: PathBuf,
    pub fetched_at: DateTime<Utc>,
    pub complete: bool,
    pub failed_at_offset: Option<u64>,
    pub cycle: Option<ReportCycle>,
}

impl ExtractManifest {
    pub fn path(raw_dir: &Path, kind: InstitutionKind) -> PathBuf {
        raw_dir.join(format!("{}_extract_manifest.json", kind.table_segment()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn store(&self, raw_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(raw_dir)?;
        let path = Self::path(raw_dir, self.institution);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// A raw extract as the transform stage consumes it.
#[derive(Debug)]
pub struct RawExtract {
    pub dimension_rows: Vec<RawRecord>,
    pub fact_rows: Vec<RawRecord>,
    pub complete: bool,
    pub cycle: Option<ReportCycle>,
}

/// Source column order for each raw extract file.
pub fn raw_headers(kind: InstitutionKind, record: RecordKind) -> &'static [&'static str] {
    match (kind, record) {
        (InstitutionKind::Bank, RecordKind::Dimension) => {
            &["ID", "NAME", "CITY", "STNAME", "WEBADDR"]
        }
        (InstitutionKind::Bank, RecordKind::Fact) => &["ID", "REPDTE", "ASSET", "DEP"],
        (InstitutionKind::CreditUnion, RecordKind::Dimension) => {
            &["CUNumber", "CUName", "City", "State", "URL"]
        }
        (InstitutionKind::CreditUnion, RecordKind::Fact) => &["Charter", "010", "AS0009"],
    }
}

fn field_to_csv(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Persist raw records under a fixed source-column header.
pub fn write_raw_csv(path: &Path, headers: &[&str], records: &[RawRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for record in records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| field_to_csv(record.get(*h)))
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a raw extract file back into field maps. All values come back as
/// strings; empty cells are absent keys, the same convention the workbook
/// reader uses.
pub fn read_raw_csv(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = RawRecord::new();
        for (header, field) in headers.iter().zip(row.iter()) {
            if !field.is_empty() {
                record.insert(header.clone(), Value::String(field.to_string()));
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// Write both raw extract files plus the manifest naming them.
#[allow(clippy::too_many_arguments)]
pub fn store_extract(
    raw_dir: &Path,
    kind: InstitutionKind,
    dimension_rows: &[RawRecord],
    fact_rows: &[RawRecord],
    complete: bool,
    failed_at_offset: Option<u64>,
    cycle: Option<ReportCycle>,
) -> Result<ExtractManifest> {
    let segment = kind.table_segment();
    let stamp = Utc::now().timestamp();
    let dimension_file = raw_dir.join(format!("{segment}_dim_{stamp}.csv"));
    let fact_file = raw_dir.join(format!("{segment}_fact_{stamp}.csv"));

    write_raw_csv(
        &dimension_file,
        raw_headers(kind, RecordKind::Dimension),
        dimension_rows,
    )?;
    write_raw_csv(&fact_file, raw_headers(kind, RecordKind::Fact), fact_rows)?;

    let manifest = ExtractManifest {
        institution: kind,
        dimension_file,
        fact_file,
        fetched_at: Utc::now(),
        complete,
        failed_at_offset,
        cycle,
    };
    manifest.store(raw_dir)?;
    info!(
        institution = %kind,
        dimension_rows = dimension_rows.len(),
        fact_rows = fact_rows.len(),
        complete,
        "raw extract stored"
    );
    Ok(manifest)
}

/// Load the latest raw extract for an institution kind: manifest-first, with
/// an mtime-glob fallback for extracts written without one.
pub fn load_latest_extract(raw_dir: &Path, kind: InstitutionKind) -> Result<RawExtract> {
    let manifest_path = ExtractManifest::path(raw_dir, kind);
    if manifest_path.exists() {
        let manifest = ExtractManifest::load(&manifest_path)?;
        return Ok(RawExtract {
            dimension_rows: read_raw_csv(&manifest.dimension_file)?,
            fact_rows: read_raw_csv(&manifest.fact_file)?,
            complete: manifest.complete,
            cycle: manifest.cycle,
        });
    }

    let segment = kind.table_segment();
    let dimension_file = export::latest_file(raw_dir, &format!("{segment}_dim_*.csv"))?;
    let fact_file = export::latest_file(raw_dir, &format!("{segment}_fact_*.csv"))?;
    match (dimension_file, fact_file) {
        (Some(dimension_file), Some(fact_file)) => {
            warn!(
                institution = %kind,
                "no extract manifest; falling back to newest raw files by mtime"
            );
            Ok(RawExtract {
                dimension_rows: read_raw_csv(&dimension_file)?,
                fact_rows: read_raw_csv(&fact_file)?,
                complete: true,
                cycle: None,
            })
        }
        _ => Err(EtlError::Export {
            message: format!(
                "no raw extract for {kind} in {}; run the fetch stage first",
                raw_dir.display()
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn bank_dim_row(id: &str, name: &str) -> RawRecord {
        let mut record = RawRecord::new();
        record.insert("ID".to_string(), json!(id));
        record.insert("NAME".to_string(), json!(name));
        record.insert("STNAME".to_string(), json!("Texas"));
        record
    }

    #[test]
    fn extract_round_trips_through_manifest() {
        let dir = tempdir().unwrap();
        let dims = vec![bank_dim_row("1", "Bank A"), bank_dim_row("2", "Bank B")];
        let mut fact = RawRecord::new();
        fact.insert("ID".to_string(), json!("1_1"));
        fact.insert("REPDTE".to_string(), json!(20240331));
        fact.insert("DEP".to_string(), json!(500));

        store_extract(
            dir.path(),
            InstitutionKind::Bank,
            &dims,
            &[fact],
            false,
            Some(10_000),
            None,
        )
        .unwrap();

        let extract = load_latest_extract(dir.path(), InstitutionKind::Bank).unwrap();
        assert_eq!(extract.dimension_rows.len(), 2);
        assert_eq!(extract.fact_rows.len(), 1);
        assert!(!extract.complete);
        // Raw values come back as strings; absent columns stay absent.
        assert_eq!(extract.fact_rows[0]["REPDTE"], "20240331");
        assert!(!extract.fact_rows[0].contains_key("ASSET"));
    }

    #[test]
    fn fallback_requires_both_raw_files() {
        let dir = tempdir().unwrap();
        write_raw_csv(
            &dir.path().join("banks_dim_1.csv"),
            raw_headers(InstitutionKind::Bank, RecordKind::Dimension),
            &[bank_dim_row("1", "Bank A")],
        )
        .unwrap();

        // Dimension file alone is not an extract.
        assert!(load_latest_extract(dir.path(), InstitutionKind::Bank).is_err());

        write_raw_csv(
            &dir.path().join("banks_fact_1.csv"),
            raw_headers(InstitutionKind::Bank, RecordKind::Fact),
            &[],
        )
        .unwrap();
        let extract = load_latest_extract(dir.path(), InstitutionKind::Bank).unwrap();
        assert_eq!(extract.dimension_rows.len(), 1);
        assert!(extract.complete);
    }

    #[test]
    fn missing_extract_names_the_fetch_stage() {
        let dir = tempdir().unwrap();
        let err = load_latest_extract(dir.path(), InstitutionKind::CreditUnion).unwrap_err();
        assert!(err.to_string().contains("fetch stage"));
    }
}
