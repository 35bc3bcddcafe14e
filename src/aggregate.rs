// 📊 Aggregator - group/sum/count/pivot over cleaned case rows
//
// Every function takes a slice of record references so it can run on the
// output of CaseFilter::apply without copying rows.

use crate::record::{CaseRecord, HospitalRecord};
use crate::table::{Cell, Table};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    Hospital,
    Antibiotic,
    Outcome,
}

impl GroupKey {
    pub fn column_name(&self) -> &'static str {
        match self {
            GroupKey::Hospital => "Hospital",
            GroupKey::Antibiotic => "Antibiotic",
            GroupKey::Outcome => "Outcome",
        }
    }

    /// Group value for a record; `None` when the optional field is absent
    pub fn value_of<'a>(&self, record: &'a CaseRecord) -> Option<&'a str> {
        match self {
            GroupKey::Hospital => Some(record.hospital.as_str()),
            GroupKey::Antibiotic => record.antibiotic.as_deref(),
            GroupKey::Outcome => record.outcome.as_deref(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

// ============================================================================
// SUMS & COUNTS
// ============================================================================

/// Sum of Number_of_Cases per group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSums {
    pub key: GroupKey,
    pub groups: BTreeMap<String, u64>,
    /// Cases on rows where the key field was missing
    pub unkeyed: u64,
}

impl CaseSums {
    pub fn total(&self) -> u64 {
        self.groups
            .values()
            .fold(self.unkeyed, |acc, cases| acc.saturating_add(*cases))
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new([self.key.column_name(), "Number_of_Cases"]);
        for (group, cases) in &self.groups {
            table.push_row(vec![group.as_str().into(), (*cases).into()]);
        }
        table
    }
}

/// Case totals saturate at `u64::MAX` instead of wrapping
pub(crate) fn add_cases(total: &mut u64, cases: u64) {
    *total = total.saturating_add(cases);
}

pub fn sum_cases(records: &[&CaseRecord], key: GroupKey) -> CaseSums {
    let mut groups = BTreeMap::new();
    let mut unkeyed = 0;

    for record in records {
        let slot = match key.value_of(record) {
            Some(value) => groups.entry(value.to_string()).or_insert(0),
            None => &mut unkeyed,
        };
        add_cases(slot, record.number_of_cases);
    }

    CaseSums { key, groups, unkeyed }
}

/// Row counts per group, most frequent first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCounts {
    pub key: GroupKey,
    pub counts: Vec<(String, usize)>,
    pub unkeyed: usize,
}

impl ValueCounts {
    pub fn to_table(&self) -> Table {
        let mut table = Table::new([self.key.column_name(), "Count"]);
        for (value, count) in &self.counts {
            table.push_row(vec![value.as_str().into(), (*count).into()]);
        }
        table
    }
}

pub fn count_rows(records: &[&CaseRecord], key: GroupKey) -> ValueCounts {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut unkeyed = 0;

    for record in records {
        match key.value_of(record) {
            Some(value) => *counts.entry(value).or_insert(0) += 1,
            None => unkeyed += 1,
        }
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ValueCounts { key, counts, unkeyed }
}

// ============================================================================
// SERIES
// ============================================================================

/// Cases per (date, hospital), the infection-trend series
pub fn daily_cases(records: &[&CaseRecord]) -> BTreeMap<(NaiveDate, String), u64> {
    let mut series = BTreeMap::new();
    for record in records {
        add_cases(
            series.entry((record.date, record.hospital.clone())).or_insert(0),
            record.number_of_cases,
        );
    }
    series
}

pub fn daily_cases_table(records: &[&CaseRecord]) -> Table {
    let mut table = Table::new(["Date", "Hospital", "Number_of_Cases"]);
    for ((date, hospital), cases) in daily_cases(records) {
        table.push_row(vec![date.into(), hospital.into(), cases.into()]);
    }
    table
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResistanceSummary {
    pub antibiotic: String,
    /// Mean over rows that report a level; None if none do
    pub mean_resistance: Option<f64>,
    pub total_cases: u64,
    pub rows: usize,
}

/// Per-antibiotic mean Resistance_Level and case totals, sorted by name
pub fn mean_resistance(records: &[&CaseRecord]) -> Vec<ResistanceSummary> {
    // antibiotic -> (level sum, level count, cases, rows)
    let mut acc: BTreeMap<&str, (f64, usize, u64, usize)> = BTreeMap::new();

    for record in records {
        let Some(antibiotic) = record.antibiotic.as_deref() else {
            continue;
        };
        let entry = acc.entry(antibiotic).or_insert((0.0, 0, 0, 0));
        if let Some(level) = record.resistance_level {
            entry.0 += level;
            entry.1 += 1;
        }
        add_cases(&mut entry.2, record.number_of_cases);
        entry.3 += 1;
    }

    acc.into_iter()
        .map(|(antibiotic, (sum, n, cases, rows))| ResistanceSummary {
            antibiotic: antibiotic.to_string(),
            mean_resistance: (n > 0).then(|| sum / n as f64),
            total_cases: cases,
            rows,
        })
        .collect()
}

pub fn resistance_table(summaries: &[ResistanceSummary]) -> Table {
    let mut table = Table::new(["Antibiotic", "Mean_Resistance_Level", "Number_of_Cases", "Rows"]);
    for s in summaries {
        table.push_row(vec![
            s.antibiotic.as_str().into(),
            s.mean_resistance.into(),
            s.total_cases.into(),
            s.rows.into(),
        ]);
    }
    table
}

// ============================================================================
// PIVOT
// ============================================================================

/// Dates x hospitals grid of mean Mortality_Rate. Pairs with no rate stay None.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub dates: Vec<NaiveDate>,
    pub hospitals: Vec<String>,
    /// `cells[row][col]` for `dates[row]` and `hospitals[col]`
    pub cells: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    pub fn get(&self, date: NaiveDate, hospital: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.hospitals.iter().position(|h| h == hospital)?;
        self.cells[row][col]
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Row-label column name; grows underscores while a hospital shares it
    pub fn label_column(&self) -> String {
        let mut label = String::from("Date");
        while self.hospitals.iter().any(|h| *h == label) {
            label.push('_');
        }
        label
    }

    pub fn to_table(&self) -> Table {
        let mut names = vec![self.label_column()];
        names.extend(self.hospitals.iter().cloned());

        let mut table = Table::new(names);
        for (date, row) in self.dates.iter().zip(&self.cells) {
            let mut cells: Vec<Cell> = vec![(*date).into()];
            cells.extend(row.iter().map(|v| Cell::from(*v)));
            table.push_row(cells);
        }
        table
    }
}

pub fn pivot_mortality(records: &[&CaseRecord]) -> PivotTable {
    let mut sums: HashMap<(NaiveDate, &str), (f64, usize)> = HashMap::new();
    let mut dates = BTreeSet::new();
    let mut hospitals = BTreeSet::new();

    for record in records {
        let Some(rate) = record.mortality_rate else {
            continue;
        };
        dates.insert(record.date);
        hospitals.insert(record.hospital.as_str());
        let entry = sums
            .entry((record.date, record.hospital.as_str()))
            .or_insert((0.0, 0));
        entry.0 += rate;
        entry.1 += 1;
    }

    let dates: Vec<NaiveDate> = dates.into_iter().collect();
    let hospitals: Vec<&str> = hospitals.into_iter().collect();

    let cells = dates
        .iter()
        .map(|date| {
            hospitals
                .iter()
                .map(|hospital| {
                    sums.get(&(*date, *hospital))
                        .map(|(sum, n)| sum / *n as f64)
                })
                .collect()
        })
        .collect();

    PivotTable {
        dates,
        hospitals: hospitals.into_iter().map(str::to_string).collect(),
        cells,
    }
}

// ============================================================================
// HOSPITAL TABLE
// ============================================================================

/// Mean Infection_Rate per hospital name; duplicate names are averaged
pub fn hospital_infection_rates(hospitals: &[HospitalRecord]) -> BTreeMap<String, Option<f64>> {
    let mut acc: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for hospital in hospitals {
        let entry = acc.entry(hospital.name.clone()).or_insert((0.0, 0));
        if let Some(rate) = hospital.infection_rate {
            entry.0 += rate;
            entry.1 += 1;
        }
    }

    acc.into_iter()
        .map(|(name, (sum, n))| (name, (n > 0).then(|| sum / n as f64)))
        .collect()
}
