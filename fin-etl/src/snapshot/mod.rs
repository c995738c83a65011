use crate::common::error::Result;
use crate::export;
use fin_core::domain::{DimensionRecord, FactRecord};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Canonical snapshot column order, matching the warehouse table schemas.
pub const DIM_COLUMNS: &[&str] = &["charter_id", "name", "city", "state", "url"];
pub const FACT_COLUMNS: &[&str] = &["charter_id", "year", "month", "assets", "deposits"];

/// Write a normalized dimension dataset as a CSV snapshot.
pub fn write_dimension_snapshot(path: &Path, records: &[DimensionRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(DIM_COLUMNS)?;
    for record in records {
        writer.write_record([
            record.charter_id.as_str(),
            record.name.as_str(),
            record.city.as_str(),
            record.state.as_str(),
            record.url.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a normalized fact dataset as a CSV snapshot.
pub fn write_fact_snapshot(path: &Path, records: &[FactRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(FACT_COLUMNS)?;
    for record in records {
        writer.write_record([
            record.charter_id.clone(),
            record.year.clone(),
            record.month.clone(),
            record.assets.to_string(),
            record.deposits.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Blob-store contract for audit/replay snapshots: `put` persists a local
/// file under a bucket and returns its SHA-256, `latest` resolves the newest
/// stored object matching a glob.
pub trait BlobStore: Send + Sync {
    fn put(&self, bucket: &str, local_path: &Path, remote_name: &str) -> Result<String>;

    fn latest(&self, bucket: &str, pattern: &str) -> Result<Option<PathBuf>>;
}

/// Local-directory blob store. The trait is the seam for a real object store;
/// this implementation keeps the audit trail on disk.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, bucket: &str, local_path: &Path, remote_name: &str) -> Result<String> {
        let bucket_dir = self.root.join(bucket);
        fs::create_dir_all(&bucket_dir)?;
        let dest = bucket_dir.join(remote_name);
        let bytes = fs::read(local_path)?;
        fs::write(&dest, &bytes)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let checksum = hex::encode(hasher.finalize());
        info!(
            bucket,
            object = remote_name,
            checksum = %checksum,
            "snapshot stored"
        );
        Ok(checksum)
    }

    fn latest(&self, bucket: &str, pattern: &str) -> Result<Option<PathBuf>> {
        export::latest_file(&self.root.join(bucket), pattern)
    }
}
