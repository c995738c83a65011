use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two institution populations this pipeline reconciles. Each kind has its
/// own source adapter and its own staging/permanent table namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstitutionKind {
    Bank,
    CreditUnion,
}

impl InstitutionKind {
    /// Table-namespace segment, e.g. `dim_banks` / `fact_credit_unions`.
    pub fn table_segment(&self) -> &'static str {
        match self {
            InstitutionKind::Bank => "banks",
            InstitutionKind::CreditUnion => "credit_unions",
        }
    }
}

impl fmt::Display for InstitutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstitutionKind::Bank => write!(f, "bank"),
            InstitutionKind::CreditUnion => write!(f, "credit-union"),
        }
    }
}

impl FromStr for InstitutionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bank" | "banks" => Ok(InstitutionKind::Bank),
            "credit-union" | "credit_union" | "credit-unions" | "cu" => {
                Ok(InstitutionKind::CreditUnion)
            }
            other => Err(format!("unknown institution kind: {other}")),
        }
    }
}

/// Whether a table holds slowly-changing descriptive attributes or
/// period-specific measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Dimension,
    Fact,
}

impl RecordKind {
    pub fn table_prefix(&self) -> &'static str {
        match self {
            RecordKind::Dimension => "dim",
            RecordKind::Fact => "fact",
        }
    }
}

/// Slowly-changing descriptive attributes of an institution.
///
/// Every field is a plain `String`, never an `Option`: the dimension natural
/// key is the full tuple, and a SQL NULL never equals another NULL in the
/// merge's NOT EXISTS probe. Absent source values normalize to `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub charter_id: String,
    pub name: String,
    pub city: String,
    pub state: String,
    pub url: String,
}

/// Period-specific measures of an institution. `year`/`month` are the period
/// key, stored as zero-padded strings (`"2024"`, `"03"`). Missing measures
/// are coerced to `0.0` upstream, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub charter_id: String,
    pub year: String,
    pub month: String,
    pub assets: f64,
    pub deposits: f64,
}

/// A reporting cycle (quarter end), e.g. `2024-09`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCycle {
    pub year: i32,
    pub month: u32,
}

impl ReportCycle {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// The most recent completed quarter end strictly before `today`.
    pub fn latest_completed(today: NaiveDate) -> Self {
        let quarter_ends = [3u32, 6, 9, 12];
        let mut year = today.year();
        let mut month = quarter_ends
            .iter()
            .rev()
            .copied()
            .find(|&m| m < today.month());
        if month.is_none() {
            year -= 1;
            month = Some(12);
        }
        Self {
            year,
            month: month.unwrap_or(12),
        }
    }

    pub fn year_string(&self) -> String {
        format!("{:04}", self.year)
    }

    pub fn month_string(&self) -> String {
        format!("{:02}", self.month)
    }
}

impl fmt::Display for ReportCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReportCycle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        let year: i32 = y.parse().map_err(|_| format!("bad year in '{s}'"))?;
        let month: u32 = m.parse().map_err(|_| format!("bad month in '{s}'"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{s}'"));
        }
        Ok(Self { year, month })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_roundtrip() {
        let cycle: ReportCycle = "2024-09".parse().unwrap();
        assert_eq!(cycle, ReportCycle::new(2024, 9));
        assert_eq!(cycle.to_string(), "2024-09");
        assert_eq!(cycle.month_string(), "09");
    }

    #[test]
    fn cycle_rejects_bad_month() {
        assert!("2024-13".parse::<ReportCycle>().is_err());
        assert!("2024".parse::<ReportCycle>().is_err());
    }

    #[test]
    fn latest_completed_quarter() {
        let d = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        assert_eq!(ReportCycle::latest_completed(d), ReportCycle::new(2024, 9));
        let jan = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(
            ReportCycle::latest_completed(jan),
            ReportCycle::new(2024, 12)
        );
    }

    #[test]
    fn institution_kind_parses_aliases() {
        assert_eq!(
            "credit-union".parse::<InstitutionKind>().unwrap(),
            InstitutionKind::CreditUnion
        );
        assert_eq!(
            "banks".parse::<InstitutionKind>().unwrap(),
            InstitutionKind::Bank
        );
        assert!("thrift".parse::<InstitutionKind>().is_err());
    }
}
