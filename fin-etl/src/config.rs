use crate::common::error::{EtlError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub fdic: FdicConfig,
    pub paths: PathsConfig,
    pub warehouse: WarehouseConfig,
    pub blob: BlobConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FdicConfig {
    pub institutions_url: String,
    pub financials_url: String,
    /// Page size for the paged API; the server-side maximum is 10,000.
    pub page_size: u64,
    pub timeout_secs: u64,
}

impl Default for FdicConfig {
    fn default() -> Self {
        Self {
            institutions_url: "https://banks.data.fdic.gov/api/institutions".to_string(),
            financials_url: "https://banks.data.fdic.gov/api/financials".to_string(),
            page_size: 10_000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
        }
    }
}

impl PathsConfig {
    /// Raw extracts and their manifests, written by the fetch stage.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_root.join("raw")
    }

    /// Watched directory where the out-of-band browser export lands.
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_root.join("downloads")
    }

    /// Local blob-store root.
    pub fn blobs_dir(&self) -> PathBuf {
        self.data_root.join("blobs")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub db_path: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/warehouse.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub bucket: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            bucket: "fin-institution-snapshots".to_string(),
        }
    }
}

impl Config {
    /// Load from `FIN_CONFIG` (or `config.toml`), falling back to defaults
    /// when no file exists, then apply `FIN_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path = env::var("FIN_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = if Path::new(&path).exists() {
            let contents = fs::read_to_string(&path)?;
            toml::from_str(&contents)
                .map_err(|e| EtlError::Config(format!("failed to parse '{path}': {e}")))?
        } else {
            info!(path, "no config file found, using defaults");
            Config::default()
        };

        if let Ok(root) = env::var("FIN_DATA_ROOT") {
            config.paths.data_root = PathBuf::from(root);
        }
        if let Ok(db) = env::var("FIN_DB_PATH") {
            config.warehouse.db_path = PathBuf::from(db);
        }
        if let Ok(size) = env::var("FIN_PAGE_SIZE") {
            config.fdic.page_size = size
                .parse()
                .map_err(|_| EtlError::Config(format!("FIN_PAGE_SIZE is not a number: {size}")))?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_fdic() {
        let config = Config::default();
        assert!(config.fdic.institutions_url.contains("banks.data.fdic.gov"));
        assert_eq!(config.fdic.page_size, 10_000);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [fdic]
            page_size = 500

            [paths]
            data_root = "/tmp/fin"
            "#,
        )
        .unwrap();
        assert_eq!(config.fdic.page_size, 500);
        assert_eq!(config.paths.data_root, PathBuf::from("/tmp/fin"));
        // Unspecified sections keep their defaults.
        assert_eq!(config.fdic.timeout_secs, 30);
    }
}
