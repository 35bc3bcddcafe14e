// 🦠 Record Types - canonical schema for case and hospital tables
//
// One CSV row becomes at most one record. Cleaning helpers live here so the
// loader and the CLI date arguments share the same parsing rules.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ============================================================================
// CANONICAL COLUMNS
// ============================================================================

/// Canonical column names understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    Date,
    Hospital,
    NumberOfCases,
    Antibiotic,
    ResistanceLevel,
    Outcome,
    MortalityRate,
    Name,
    InfectionRate,
}

impl Column {
    /// All case-table columns, in header order
    pub const CASE_COLUMNS: [Column; 7] = [
        Column::Date,
        Column::Hospital,
        Column::NumberOfCases,
        Column::Antibiotic,
        Column::ResistanceLevel,
        Column::Outcome,
        Column::MortalityRate,
    ];

    /// Columns a case table cannot be loaded without
    pub const REQUIRED_CASE_COLUMNS: [Column; 3] =
        [Column::Date, Column::Hospital, Column::NumberOfCases];

    pub const HOSPITAL_COLUMNS: [Column; 2] = [Column::Name, Column::InfectionRate];

    /// Header text as it appears in CSV files
    pub fn header(&self) -> &'static str {
        match self {
            Column::Date => "Date",
            Column::Hospital => "Hospital",
            Column::NumberOfCases => "Number_of_Cases",
            Column::Antibiotic => "Antibiotic",
            Column::ResistanceLevel => "Resistance_Level",
            Column::Outcome => "Outcome",
            Column::MortalityRate => "Mortality_Rate",
            Column::Name => "Name",
            Column::InfectionRate => "Infection_Rate",
        }
    }

    /// Look up a canonical column by exact (trimmed) header text
    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        Self::CASE_COLUMNS
            .iter()
            .chain(Self::HOSPITAL_COLUMNS.iter())
            .copied()
            .find(|c| c.header() == header)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// A cleaned case row. Key fields are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub date: NaiveDate,
    pub hospital: String,
    pub number_of_cases: u64,
    pub antibiotic: Option<String>,
    pub resistance_level: Option<f64>,
    pub outcome: Option<String>,
    pub mortality_rate: Option<f64>,
}

impl CaseRecord {
    pub fn new(date: NaiveDate, hospital: impl Into<String>, number_of_cases: u64) -> Self {
        CaseRecord {
            date,
            hospital: hospital.into(),
            number_of_cases,
            antibiotic: None,
            resistance_level: None,
            outcome: None,
            mortality_rate: None,
        }
    }

    pub fn with_antibiotic(mut self, antibiotic: impl Into<String>) -> Self {
        self.antibiotic = Some(antibiotic.into());
        self
    }

    pub fn with_resistance(mut self, level: f64) -> Self {
        self.resistance_level = Some(level);
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_mortality_rate(mut self, rate: f64) -> Self {
        self.mortality_rate = Some(rate);
        self
    }
}

/// A cleaned hospital row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalRecord {
    pub name: String,
    pub infection_rate: Option<f64>,
}

// ============================================================================
// CLEANING HELPERS
// ============================================================================

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a calendar date. Slash dates are month-first; any time part is dropped.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }

    None
}

/// Coerce a numeric field. Anything unparseable becomes `None`.
pub fn coerce_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Floats at or above 2^53 can no longer represent every integer
const EXACT_FLOAT_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Coerce a case count. Negative, fractional or out-of-range counts are invalid.
///
/// Integer text is parsed directly; float forms such as `12.0` are accepted
/// only while the value is exactly representable.
pub fn coerce_cases(raw: &str) -> Option<u64> {
    if let Ok(count) = raw.trim().parse::<u64>() {
        return Some(count);
    }

    let value = coerce_number(raw)?;
    if value < 0.0 || value.fract() != 0.0 || value >= EXACT_FLOAT_LIMIT {
        return None;
    }
    Some(value as u64)
}

/// Blank text becomes `None`
pub fn coerce_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
