use crate::common::error::{EtlError, Result};
use crate::config::FdicConfig;
use crate::fetch::{PageSource, RawRecord};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// FDIC-style paged JSON API: `fields`/`limit`/`offset` query parameters,
/// `meta.total` record count, one flat field map per `data[].data` entry.
pub struct FdicSource {
    client: reqwest::Client,
    base_url: String,
    fields: &'static [&'static str],
    probe_total: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    meta: Option<ApiMeta>,
    #[serde(default)]
    data: Vec<ApiEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiMeta {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    data: RawRecord,
}

impl FdicSource {
    /// The institutions endpoint: descriptive fields, reliable `meta.total`.
    pub fn institutions(client: reqwest::Client, config: &FdicConfig) -> Self {
        Self {
            client,
            base_url: config.institutions_url.clone(),
            fields: &["ID", "NAME", "CITY", "STNAME", "WEBADDR"],
            probe_total: true,
        }
    }

    /// The financials endpoint: one row per institution per reporting period.
    /// Its `meta.total` is not relied upon; pagination runs until an empty
    /// page comes back.
    pub fn financials(client: reqwest::Client, config: &FdicConfig) -> Self {
        Self {
            client,
            base_url: config.financials_url.clone(),
            fields: &["ID", "REPDTE", "ASSET", "DEP"],
            probe_total: false,
        }
    }
}

#[async_trait]
impl PageSource for FdicSource {
    async fn total(&self) -> Result<Option<u64>> {
        if !self.probe_total {
            return Ok(None);
        }
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await?
            .error_for_status()?;
        let body: ApiResponse = response.json().await?;
        let total = body.meta.map(|m| m.total).ok_or_else(|| EtlError::Fetch {
            offset: 0,
            message: format!("{} returned no meta.total", self.base_url),
        })?;
        debug!(url = %self.base_url, total, "metadata probe");
        Ok(Some(total))
    }

    async fn page(&self, limit: u64, offset: u64) -> Result<Vec<RawRecord>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("fields", self.fields.join(",")),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: ApiResponse = response.json().await?;
        debug!(url = %self.base_url, offset, records = body.data.len(), "fetched page");
        Ok(body.data.into_iter().map(|entry| entry.data).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_shape_parses() {
        let body = r#"{
            "meta": {"total": 4500, "parameters": {"limit": 2}},
            "data": [
                {"data": {"ID": "123", "NAME": "Bank A"}, "score": 0},
                {"data": {"ID": "456", "NAME": "Bank B"}}
            ]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.meta.unwrap().total, 4500);
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].data["NAME"], "Bank A");
    }

    #[test]
    fn response_without_meta_parses() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(parsed.meta.is_none());
        assert!(parsed.data.is_empty());
    }
}
