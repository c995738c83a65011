use crate::common::error::{EtlError, Result};
use crate::fetch::RawRecord;
use crate::observability::metrics;
use serde_json::Value;
use tracing::warn;

pub mod bank;
pub mod credit_union;
pub mod states;

/// A batch normalization result: the canonical records plus how many raw
/// records were dropped as malformed.
#[derive(Debug)]
pub struct NormalizedBatch<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

/// Apply `normalize` to every raw record, skip-and-continue on malformed
/// input. Each drop is logged and counted; the run itself proceeds.
pub fn normalize_batch<T>(
    raw: &[RawRecord],
    normalize: impl Fn(&RawRecord) -> Result<T>,
) -> NormalizedBatch<T> {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;
    for record in raw {
        match normalize(record) {
            Ok(normalized) => records.push(normalized),
            Err(e) => {
                warn!(error = %e, "dropping malformed record");
                metrics::normalize::record_dropped();
                dropped += 1;
            }
        }
    }
    metrics::normalize::records_normalized(records.len());
    NormalizedBatch { records, dropped }
}

/// Fetch a field as trimmed text. Numbers are accepted and rendered without a
/// trailing `.0` (spreadsheet sources deliver integer ids as floats).
fn text_field(record: &RawRecord, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        _ => None,
    }
}

/// The natural key is never fabricated: a record without one is rejected with
/// a `MalformedRecord` error and excluded from output.
fn require_charter_id(record: &RawRecord, key: &str) -> Result<String> {
    text_field(record, key).ok_or_else(|| EtlError::MalformedRecord {
        message: format!("record has no '{key}' natural key"),
    })
}

/// Numeric measure with null-to-zero coercion: missing and null values are a
/// policy zero, not an error. Applied here, before anything is persisted.
fn numeric_field(record: &RawRecord, key: &str) -> f64 {
    match record.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                // An empty cell is a null measure, not bad data.
                return 0.0;
            }
            match trimmed.parse::<f64>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(key, value = %s, "non-numeric measure coerced to zero");
                    0.0
                }
            }
        }
        _ => 0.0,
    }
}

/// Decompose a compact `YYYYMMDD` date into independent year and month
/// strings. No other date arithmetic is performed.
fn split_report_date(raw: &str) -> Result<(String, String)> {
    let digits = raw.trim();
    if digits.len() < 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(EtlError::MalformedRecord {
            message: format!("report date '{raw}' is not YYYYMMDD"),
        });
    }
    let year = digits[0..4].to_string();
    let month = digits[4..6].to_string();
    if !(1..=12).contains(&month.parse::<u32>().unwrap_or(0)) {
        return Err(EtlError::MalformedRecord {
            message: format!("report date '{raw}' has month out of range"),
        });
    }
    Ok((year, month))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn text_field_renders_numbers_without_float_suffix() {
        let r = record(&[("ID", json!(61650.0)), ("N", json!(123))]);
        assert_eq!(text_field(&r, "ID").as_deref(), Some("61650"));
        assert_eq!(text_field(&r, "N").as_deref(), Some("123"));
    }

    #[test]
    fn blank_text_is_absent() {
        let r = record(&[("NAME", json!("   "))]);
        assert_eq!(text_field(&r, "NAME"), None);
    }

    #[test]
    fn numeric_field_coerces_null_to_zero() {
        let r = record(&[("ASSET", Value::Null), ("DEP", json!("500"))]);
        assert_eq!(numeric_field(&r, "ASSET"), 0.0);
        assert_eq!(numeric_field(&r, "DEP"), 500.0);
        assert_eq!(numeric_field(&r, "MISSING"), 0.0);
    }

    #[test]
    fn report_date_decomposes() {
        assert_eq!(
            split_report_date("20240331").unwrap(),
            ("2024".to_string(), "03".to_string())
        );
        assert!(split_report_date("2024").is_err());
        assert!(split_report_date("20241331").is_err());
        assert!(split_report_date("March 31").is_err());
    }

    #[test]
    fn batch_skips_malformed_and_continues() {
        let raw = vec![
            record(&[("ID", json!("1"))]),
            record(&[("NAME", json!("keyless"))]),
            record(&[("ID", json!("2"))]),
        ];
        let batch = normalize_batch(&raw, |r| require_charter_id(r, "ID"));
        assert_eq!(batch.records, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(batch.dropped, 1);
    }
}
