use crate::common::error::{EtlError, Result};
use crate::fetch::RawRecord;
use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::{DateTime, Utc};
use fin_core::domain::ReportCycle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Sheet holding per-entity descriptive fields.
pub const DIM_SHEET: &str = "ProfileGenInfo";
/// Sheet holding per-entity measures.
pub const FACT_SHEET: &str = "Total Accounts";

const MANIFEST_FILE: &str = "export_manifest.json";

/// Handoff contract from the out-of-band browser export: names the produced
/// workbook and its reporting cycle, so the pipeline does not have to infer
/// either from filesystem timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub workbook: PathBuf,
    pub cycle: ReportCycle,
    pub produced_at: DateTime<Utc>,
}

impl ExportManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn store(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// The workbook plus the cycle it covers, when known.
#[derive(Debug)]
pub struct DiscoveredExport {
    pub workbook: PathBuf,
    pub cycle: Option<ReportCycle>,
}

/// Most recently modified file in `dir` matching `pattern` (a glob), or
/// `None` when nothing matches.
pub fn latest_file(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    let search = dir.join(pattern);
    let search = search.to_string_lossy();
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in glob::glob(&search)
        .map_err(|e| EtlError::Export {
            message: format!("bad glob pattern '{search}': {e}"),
        })?
        .flatten()
    {
        let modified = fs::metadata(&entry)?.modified()?;
        if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            newest = Some((modified, entry));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Locate the latest workbook export. The manifest is authoritative when
/// present; falling back to modification-time inference is fragile under
/// clock skew and concurrent runs, so the fallback is logged.
pub fn discover_export(downloads_dir: &Path) -> Result<DiscoveredExport> {
    let manifest_path = downloads_dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        let manifest = ExportManifest::load(&manifest_path)?;
        let workbook = if manifest.workbook.is_absolute() {
            manifest.workbook.clone()
        } else {
            downloads_dir.join(&manifest.workbook)
        };
        info!(workbook = %workbook.display(), cycle = %manifest.cycle, "export located via manifest");
        return Ok(DiscoveredExport {
            workbook,
            cycle: Some(manifest.cycle),
        });
    }

    match latest_file(downloads_dir, "*.xlsx")? {
        Some(workbook) => {
            warn!(
                workbook = %workbook.display(),
                "no export manifest; falling back to newest workbook by mtime"
            );
            Ok(DiscoveredExport {
                workbook,
                cycle: None,
            })
        }
        None => Err(EtlError::Export {
            message: format!(
                "no export manifest and no *.xlsx in {}",
                downloads_dir.display()
            ),
        }),
    }
}

fn cell_to_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::Number((*i).into())),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
        Data::Bool(b) => Some(Value::Bool(*b)),
        Data::DateTime(dt) => serde_json::Number::from_f64(dt.as_f64()).map(Value::Number),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
    }
}

/// First row is the header; every following row becomes a flat field map.
/// Empty cells are absent keys, matching what the normalizer expects.
pub fn rows_to_records<'a>(mut rows: impl Iterator<Item = &'a [Data]>) -> Vec<RawRecord> {
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(|cell| cell.to_string()).collect(),
        None => return Vec::new(),
    };
    rows.map(|row| {
        let mut record = RawRecord::new();
        for (header, cell) in headers.iter().zip(row) {
            if let Some(value) = cell_to_value(cell) {
                record.insert(header.clone(), value);
            }
        }
        record
    })
    .collect()
}

/// Read the two named sheets of a workbook export into raw field-map rows:
/// `(dimension_rows, fact_rows)`.
pub fn read_workbook(path: &Path) -> Result<(Vec<RawRecord>, Vec<RawRecord>)> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| EtlError::Export {
        message: format!("cannot open workbook {}: {e}", path.display()),
    })?;
    let mut sheet = |name: &str| -> Result<Vec<RawRecord>> {
        let range = workbook.worksheet_range(name).map_err(|e| EtlError::Export {
            message: format!("workbook {} has no '{name}' sheet: {e}", path.display()),
        })?;
        let rows: Vec<&[Data]> = range.rows().collect();
        Ok(rows_to_records(rows.into_iter()))
    };
    let dimension_rows = sheet(DIM_SHEET)?;
    let fact_rows = sheet(FACT_SHEET)?;
    info!(
        workbook = %path.display(),
        dimension_rows = dimension_rows.len(),
        fact_rows = fact_rows.len(),
        "workbook export read"
    );
    Ok((dimension_rows, fact_rows))
}
