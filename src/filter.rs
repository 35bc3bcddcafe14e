// Sidebar filters: hospital selection + optional date range
//
// Filtering never fails. An empty selection or an empty match produces an
// empty row set plus a Warning for the view to show.

use crate::error::{DashboardError, Result};
use crate::record::{parse_date, CaseRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// WARNINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    EmptySelection,
    NoMatchingRows,
    MissingColumn,
}

/// Non-fatal, user-visible message attached to a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Warning {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HospitalSelection {
    /// Every hospital in the data (the default sidebar state)
    All,
    /// Only the named hospitals; may be empty
    Only(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFilter {
    pub hospitals: HospitalSelection,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl Default for CaseFilter {
    fn default() -> Self {
        CaseFilter {
            hospitals: HospitalSelection::All,
            from: None,
            to: None,
        }
    }
}

pub struct FilterOutcome<'a> {
    pub rows: Vec<&'a CaseRecord>,
    pub warning: Option<Warning>,
}

impl CaseFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn hospitals<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CaseFilter {
            hospitals: HospitalSelection::Only(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Parse optional `from`/`to` arguments, rejecting unparseable dates
    pub fn with_range_str(self, from: Option<&str>, to: Option<&str>) -> Result<Self> {
        let parse = |raw: Option<&str>| -> Result<Option<NaiveDate>> {
            match raw.map(str::trim).filter(|s| !s.is_empty()) {
                None => Ok(None),
                Some(s) => parse_date(s)
                    .map(Some)
                    .ok_or_else(|| DashboardError::InvalidDate(s.to_string())),
            }
        };
        Ok(self.with_range(parse(from)?, parse(to)?))
    }

    pub fn is_selection_empty(&self) -> bool {
        matches!(&self.hospitals, HospitalSelection::Only(set) if set.is_empty())
    }

    pub fn matches(&self, record: &CaseRecord) -> bool {
        let hospital_ok = match &self.hospitals {
            HospitalSelection::All => true,
            HospitalSelection::Only(set) => set.contains(&record.hospital),
        };
        hospital_ok
            && self.from.map_or(true, |from| record.date >= from)
            && self.to.map_or(true, |to| record.date <= to)
    }

    pub fn apply<'a>(&self, records: &'a [CaseRecord]) -> FilterOutcome<'a> {
        if self.is_selection_empty() {
            return FilterOutcome {
                rows: Vec::new(),
                warning: Some(Warning::new(
                    WarningKind::EmptySelection,
                    "No hospital selected. Select at least one hospital to see data.",
                )),
            };
        }

        let rows: Vec<&CaseRecord> = records.iter().filter(|r| self.matches(r)).collect();
        let warning = if rows.is_empty() {
            Some(Warning::new(
                WarningKind::NoMatchingRows,
                "No data available for the selected hospital(s).",
            ))
        } else {
            None
        };

        FilterOutcome { rows, warning }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn records() -> Vec<CaseRecord> {
        vec![
            CaseRecord::new(day(1), "A", 10),
            CaseRecord::new(day(2), "B", 5),
            CaseRecord::new(day(3), "A", 3),
            CaseRecord::new(day(4), "C", 8),
        ]
    }

    #[test]
    fn test_all_keeps_everything() {
        let records = records();
        let outcome = CaseFilter::all().apply(&records);

        assert_eq!(outcome.rows.len(), 4);
        assert!(outcome.warning.is_none());
    }

    #[test]
    fn test_subset_never_includes_excluded_hospitals() {
        let records = records();
        let outcome = CaseFilter::hospitals(["A", "C"]).apply(&records);

        assert_eq!(outcome.rows.len(), 3);
        assert!(outcome.rows.iter().all(|r| r.hospital != "B"));
    }

    #[test]
    fn test_empty_selection_warns() {
        let records = records();
        let outcome = CaseFilter::hospitals(Vec::<String>::new()).apply(&records);

        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.warning.unwrap().kind, WarningKind::EmptySelection);
    }

    #[test]
    fn test_unknown_hospital_warns_no_rows() {
        let records = records();
        let outcome = CaseFilter::hospitals(["Z"]).apply(&records);

        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.warning.unwrap().kind, WarningKind::NoMatchingRows);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let records = records();
        let outcome = CaseFilter::all()
            .with_range(Some(day(2)), Some(day(3)))
            .apply(&records);

        let dates: Vec<_> = outcome.rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(2), day(3)]);
    }

    #[test]
    fn test_range_str_parsing() {
        let filter = CaseFilter::all()
            .with_range_str(Some("2024-05-02"), Some(""))
            .unwrap();
        assert_eq!(filter.from, Some(day(2)));
        assert_eq!(filter.to, None);

        let err = CaseFilter::all().with_range_str(Some("soon"), None).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidDate(_)));
    }
}
