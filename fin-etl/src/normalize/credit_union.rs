use super::{numeric_field, require_charter_id, text_field};
use crate::common::error::Result;
use crate::fetch::RawRecord;
use fin_core::domain::{DimensionRecord, FactRecord, ReportCycle};

/// Map an NCUA profile row (`ProfileGenInfo` sheet) to the canonical
/// dimension shape. The state column already carries postal codes; it is
/// trimmed and uppercased, not looked up.
pub fn dimension(record: &RawRecord) -> Result<DimensionRecord> {
    let charter_id = require_charter_id(record, "CUNumber")?;
    Ok(DimensionRecord {
        charter_id,
        name: text_field(record, "CUName").unwrap_or_default(),
        city: text_field(record, "City").unwrap_or_default(),
        state: text_field(record, "State")
            .map(|s| s.to_uppercase())
            .unwrap_or_default(),
        url: text_field(record, "URL").unwrap_or_default(),
    })
}

/// Map an NCUA account-totals row (`Total Accounts` sheet) to the canonical
/// fact shape. The workbook carries no period columns; the reporting cycle is
/// stamped from the export manifest. `010` is total assets and `AS0009` total
/// deposits in the NCUA account taxonomy.
pub fn fact(record: &RawRecord, cycle: &ReportCycle) -> Result<FactRecord> {
    let charter_id = require_charter_id(record, "Charter")?;
    Ok(FactRecord {
        charter_id,
        year: cycle.year_string(),
        month: cycle.month_string(),
        assets: numeric_field(record, "010"),
        deposits: numeric_field(record, "AS0009"),
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
    fn dimension_renames_profile_columns() {
        let raw = record(&[
            ("CUNumber", json!(61650.0)),
            ("CUName", json!("Navy Federal")),
            ("City", json!("Vienna")),
            ("State", json!("va")),
            ("URL", json!("navyfederal.org")),
        ]);
        let dim = dimension(&raw).unwrap();
        assert_eq!(dim.charter_id, "61650");
        assert_eq!(dim.name, "Navy Federal");
        assert_eq!(dim.state, "VA");
    }

    #[test]
    fn fact_stamps_cycle_and_maps_account_codes() {
        let cycle = ReportCycle::new(2024, 9);
        let raw = record(&[
            ("Charter", json!("61650")),
            ("010", json!(180_000_000.0)),
            ("AS0009", Value::Null),
        ]);
        let fact = fact(&raw, &cycle).unwrap();
        assert_eq!(fact.charter_id, "61650");
        assert_eq!(fact.year, "2024");
        assert_eq!(fact.month, "09");
        assert_eq!(fact.assets, 180_000_000.0);
        assert_eq!(fact.deposits, 0.0);
    }

    #[test]
    fn missing_charter_is_malformed() {
        let raw = record(&[("CUName", json!("No Number CU"))]);
        assert!(matches!(
            dimension(&raw),
            Err(EtlError::MalformedRecord { .. })
        ));
    }
}
