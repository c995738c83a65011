use super::{numeric_field, require_charter_id, split_report_date, states, text_field};
use crate::common::error::{EtlError, Result};
use crate::fetch::RawRecord;
use fin_core::domain::{DimensionRecord, FactRecord};

/// Map an FDIC institutions record to the canonical dimension shape.
pub fn dimension(record: &RawRecord) -> Result<DimensionRecord> {
    let charter_id = require_charter_id(record, "ID")?;
    let state = text_field(record, "STNAME")
        .map(|name| states::to_state_code(&name).to_string())
        .unwrap_or_else(|| states::UNKNOWN_STATE.to_string());
    Ok(DimensionRecord {
        charter_id,
        name: text_field(record, "NAME").unwrap_or_default(),
        city: text_field(record, "CITY").unwrap_or_default(),
        state,
        url: text_field(record, "WEBADDR").unwrap_or_default(),
    })
}

/// Map an FDIC financials record to the canonical fact shape.
///
/// The financials `ID` carries a period disambiguator after an underscore
/// (`"123_1"`); the true natural key is the leading segment.
pub fn fact(record: &RawRecord) -> Result<FactRecord> {
    let raw_id = require_charter_id(record, "ID")?;
    let charter_id = raw_id
        .split('_')
        .next()
        .unwrap_or(raw_id.as_str())
        .to_string();
    let report_date = text_field(record, "REPDTE").ok_or_else(|| EtlError::MalformedRecord {
        message: format!("fact record '{charter_id}' has no REPDTE period key"),
    })?;
    let (year, month) = split_report_date(&report_date)?;
    Ok(FactRecord {
        charter_id,
        year,
        month,
        assets: numeric_field(record, "ASSET"),
        deposits: numeric_field(record, "DEP"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::EtlError;
    use serde_json::{json, Value};

    fn record(pairs: &[(&str, Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn dimension_renames_and_abbreviates() {
        let raw = record(&[
            ("STNAME", json!("texas ")),
            ("WEBADDR", json!("x.com")),
            ("CITY", json!("Austin")),
            ("ID", json!("123")),
            ("NAME", json!("Bank A")),
        ]);
        let dim = dimension(&raw).unwrap();
        assert_eq!(dim.charter_id, "123");
        assert_eq!(dim.name, "Bank A");
        assert_eq!(dim.city, "Austin");
        assert_eq!(dim.state, "TX");
        assert_eq!(dim.url, "x.com");
    }

    #[test]
    fn dimension_without_charter_id_is_malformed() {
        let raw = record(&[("NAME", json!("No Key Bank"))]);
        assert!(matches!(
            dimension(&raw),
            Err(EtlError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn unknown_state_becomes_sentinel_not_dropped() {
        let raw = record(&[("ID", json!("9")), ("STNAME", json!("Atlantis"))]);
        assert_eq!(dimension(&raw).unwrap().state, "XX");
    }

    #[test]
    fn fact_decomposes_date_and_truncates_id() {
        let raw = record(&[
            ("REPDTE", json!(20240331)),
            ("ID", json!("123_1")),
            ("ASSET", Value::Null),
            ("DEP", json!(500)),
        ]);
        let fact = fact(&raw).unwrap();
        assert_eq!(fact.charter_id, "123");
        assert_eq!(fact.year, "2024");
        assert_eq!(fact.month, "03");
        assert_eq!(fact.assets, 0.0);
        assert_eq!(fact.deposits, 500.0);
    }

    #[test]
    fn fact_without_period_is_malformed() {
        let raw = record(&[("ID", json!("123")), ("ASSET", json!(10))]);
        assert!(matches!(fact(&raw), Err(EtlError::MalformedRecord { .. })));
    }
}
