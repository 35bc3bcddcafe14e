// 🗂️ Dashboard Views
//
// The four named views and the glue that turns a filtered case table into
// one plain Table per view. Presentation layers (TUI, HTTP, export) only
// ever see ViewOutput.

use crate::aggregate::{
    count_rows, daily_cases_table, hospital_infection_rates, mean_resistance, pivot_mortality,
    resistance_table, sum_cases, GroupKey,
};
use crate::error::{DashboardError, Result};
use crate::filter::{CaseFilter, Warning, WarningKind};
use crate::loader::{CaseTable, HospitalTable};
use crate::record::Column;
use crate::table::{Cell, Table};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    InfectionTrends,
    HospitalComparisons,
    AntibioticResistance,
    MortalityRecovery,
}

impl View {
    pub const ALL: [View; 4] = [
        View::InfectionTrends,
        View::HospitalComparisons,
        View::AntibioticResistance,
        View::MortalityRecovery,
    ];

    pub fn next(&self) -> Self {
        match self {
            View::InfectionTrends => View::HospitalComparisons,
            View::HospitalComparisons => View::AntibioticResistance,
            View::AntibioticResistance => View::MortalityRecovery,
            View::MortalityRecovery => View::InfectionTrends,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            View::InfectionTrends => View::MortalityRecovery,
            View::HospitalComparisons => View::InfectionTrends,
            View::AntibioticResistance => View::HospitalComparisons,
            View::MortalityRecovery => View::AntibioticResistance,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            View::InfectionTrends => "Infection Trends",
            View::HospitalComparisons => "Hospital Comparisons",
            View::AntibioticResistance => "Antibiotic Resistance",
            View::MortalityRecovery => "Mortality & Recovery",
        }
    }

    /// Stable identifier used by the CLI and HTTP routes
    pub fn slug(&self) -> &'static str {
        match self {
            View::InfectionTrends => "infection-trends",
            View::HospitalComparisons => "hospital-comparisons",
            View::AntibioticResistance => "antibiotic-resistance",
            View::MortalityRecovery => "mortality-recovery",
        }
    }
}

impl FromStr for View {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        View::ALL
            .iter()
            .copied()
            .find(|v| v.slug() == s.trim())
            .ok_or_else(|| DashboardError::UnknownView(s.to_string()))
    }
}

/// Everything a view build needs, loaded once per session
#[derive(Debug, Clone)]
pub struct Dataset {
    pub cases: Arc<CaseTable>,
    pub hospitals: Option<Arc<HospitalTable>>,
}

impl Dataset {
    pub fn new(cases: Arc<CaseTable>, hospitals: Option<Arc<HospitalTable>>) -> Self {
        Dataset { cases, hospitals }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewOutput {
    pub view: View,
    pub title: &'static str,
    pub table: Table,
    /// Second table where a view has one (mortality pivot)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Table>,
    pub warnings: Vec<Warning>,
}

impl ViewOutput {
    fn empty(view: View, table: Table, warnings: Vec<Warning>) -> Self {
        ViewOutput {
            view,
            title: view.title(),
            table,
            detail: None,
            warnings,
        }
    }
}

fn missing_column_warning(column: Column) -> Warning {
    Warning::new(
        WarningKind::MissingColumn,
        format!("'{}' column not found in dataset.", column.header()),
    )
}

/// Build one view over the filtered rows
pub fn build_view(view: View, data: &Dataset, filter: &CaseFilter) -> ViewOutput {
    let outcome = filter.apply(&data.cases.records);
    let rows = outcome.rows;
    let mut warnings: Vec<Warning> = outcome.warning.into_iter().collect();
    let report = &data.cases.report;

    debug!("Building {} over {} rows", view.slug(), rows.len());

    match view {
        View::InfectionTrends => ViewOutput::empty(view, daily_cases_table(&rows), warnings),

        View::HospitalComparisons => {
            let sums = sum_cases(&rows, GroupKey::Hospital);
            let table = match &data.hospitals {
                None => sums.to_table(),
                Some(hospitals) => {
                    let rates = hospital_infection_rates(&hospitals.records);
                    let mut table = Table::new(["Hospital", "Number_of_Cases", "Infection_Rate"]);
                    for (hospital, cases) in &sums.groups {
                        let rate = rates.get(hospital).copied().flatten();
                        table.push_row(vec![hospital.as_str().into(), (*cases).into(), rate.into()]);
                    }
                    table
                }
            };
            ViewOutput::empty(view, table, warnings)
        }

        View::AntibioticResistance => {
            let columns = ["Antibiotic", "Mean_Resistance_Level", "Number_of_Cases", "Rows"];
            if !report.has_column(Column::Antibiotic) {
                warnings.push(missing_column_warning(Column::Antibiotic));
                return ViewOutput::empty(view, Table::new(columns), warnings);
            }
            ViewOutput::empty(view, resistance_table(&mean_resistance(&rows)), warnings)
        }

        View::MortalityRecovery => {
            let has_outcome = report.has_column(Column::Outcome);
            let has_rate = report.has_column(Column::MortalityRate);

            if !has_outcome && !has_rate {
                warnings.push(missing_column_warning(Column::Outcome));
                warnings.push(missing_column_warning(Column::MortalityRate));
                return ViewOutput::empty(view, Table::new(["Outcome", "Count"]), warnings);
            }

            let table = if has_outcome {
                count_rows(&rows, GroupKey::Outcome).to_table()
            } else {
                warnings.push(missing_column_warning(Column::Outcome));
                Table::new(["Outcome", "Count"])
            };

            let detail = if has_rate {
                pivot_mortality(&rows).to_table()
            } else {
                warnings.push(missing_column_warning(Column::MortalityRate));
                Table::new(["Date"])
            };

            ViewOutput {
                view,
                title: view.title(),
                table,
                detail: Some(detail),
                warnings,
            }
        }
    }
}

/// Build every view with the same filter
pub fn build_all(data: &Dataset, filter: &CaseFilter) -> Vec<ViewOutput> {
    View::ALL
        .iter()
        .map(|view| build_view(*view, data, filter))
        .collect()
}

/// Headline numbers for the dashboard header
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Headline {
    pub rows: usize,
    pub hospitals: usize,
    pub total_cases: u64,
}

pub fn headline(data: &Dataset, filter: &CaseFilter) -> Headline {
    let rows = filter.apply(&data.cases.records).rows;
    let hospitals = rows
        .iter()
        .map(|r| r.hospital.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    Headline {
        rows: rows.len(),
        hospitals,
        total_cases: rows
            .iter()
            .fold(0, |acc: u64, r| acc.saturating_add(r.number_of_cases)),
    }
}

/// Sum a numeric column of a view table
pub fn column_total(table: &Table, column: &str) -> f64 {
    table
        .column(column)
        .map(|cells| cells.iter().filter_map(Cell::as_f64).sum())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadReport;
    use crate::record::{CaseRecord, HospitalRecord};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn dataset(columns: &[Column], records: Vec<CaseRecord>) -> Dataset {
        let mut report = LoadReport::default();
        report.present_columns.extend(Column::REQUIRED_CASE_COLUMNS);
        report.present_columns.extend(columns.iter().copied());
        report.rows_read = records.len();
        report.rows_kept = records.len();
        Dataset::new(Arc::new(CaseTable { records, report }), None)
    }

    fn full_dataset() -> Dataset {
        dataset(
            &[
                Column::Antibiotic,
                Column::ResistanceLevel,
                Column::Outcome,
                Column::MortalityRate,
            ],
            vec![
                CaseRecord::new(day(1), "A", 10)
                    .with_antibiotic("Colistin")
                    .with_resistance(30.0)
                    .with_outcome("Recovered")
                    .with_mortality_rate(0.1),
                CaseRecord::new(day(1), "B", 5)
                    .with_antibiotic("Meropenem")
                    .with_resistance(60.0)
                    .with_outcome("Died")
                    .with_mortality_rate(0.3),
                CaseRecord::new(day(2), "A", 3)
                    .with_antibiotic("Colistin")
                    .with_outcome("Recovered"),
            ],
        )
    }

    #[test]
    fn test_view_navigation_cycles() {
        let mut view = View::InfectionTrends;
        for _ in 0..4 {
            view = view.next();
        }
        assert_eq!(view, View::InfectionTrends);
        assert_eq!(View::InfectionTrends.previous(), View::MortalityRecovery);
    }

    #[test]
    fn test_view_slugs_parse() {
        for view in View::ALL {
            assert_eq!(view.slug().parse::<View>().unwrap(), view);
        }
        assert!(matches!(
            "pie-chart".parse::<View>(),
            Err(DashboardError::UnknownView(_))
        ));
    }

    #[test]
    fn test_hospital_comparison_totals() {
        let data = full_dataset();
        let output = build_view(View::HospitalComparisons, &data, &CaseFilter::all());

        assert!(output.warnings.is_empty());
        assert_eq!(column_total(&output.table, "Number_of_Cases"), 18.0);
        assert_eq!(output.table.column("Hospital").unwrap()[0], Cell::from("A"));
    }

    #[test]
    fn test_hospital_comparison_joins_infection_rate() {
        let mut data = full_dataset();
        data.hospitals = Some(Arc::new(HospitalTable {
            records: vec![HospitalRecord {
                name: "B".to_string(),
                infection_rate: Some(0.07),
            }],
            rows_read: 1,
            files: Vec::new(),
        }));

        let output = build_view(View::HospitalComparisons, &data, &CaseFilter::all());

        let rates = output.table.column("Infection_Rate").unwrap();
        assert_eq!(rates, &[Cell::Empty, Cell::Number(0.07)][..]);
    }

    #[test]
    fn test_filtered_trends_exclude_hospitals() {
        let data = full_dataset();
        let output = build_view(View::InfectionTrends, &data, &CaseFilter::hospitals(["B"]));

        let hospitals = output.table.column("Hospital").unwrap();
        assert!(hospitals.iter().all(|c| c.as_text() == Some("B")));
        assert_eq!(output.table.row_count(), 1);
    }

    #[test]
    fn test_empty_selection_gives_warning_not_error() {
        let data = full_dataset();
        let filter = CaseFilter::hospitals(Vec::<String>::new());

        for output in build_all(&data, &filter) {
            assert!(output.table.is_empty(), "{}", output.title);
            assert_eq!(output.warnings[0].kind, WarningKind::EmptySelection);
        }
    }

    #[test]
    fn test_missing_antibiotic_column_warns() {
        let data = dataset(&[], vec![CaseRecord::new(day(1), "A", 1)]);

        let output = build_view(View::AntibioticResistance, &data, &CaseFilter::all());

        assert!(output.table.is_empty());
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].kind, WarningKind::MissingColumn);
        assert!(output.warnings[0].message.contains("Antibiotic"));
    }

    #[test]
    fn test_mortality_view_outcomes_and_pivot() {
        let data = full_dataset();
        let output = build_view(View::MortalityRecovery, &data, &CaseFilter::all());

        assert!(output.warnings.is_empty());
        assert_eq!(output.table.column("Outcome").unwrap()[0], Cell::from("Recovered"));

        let pivot = output.detail.unwrap();
        assert_eq!(pivot.column_names(), vec!["Date", "A", "B"]);
        assert_eq!(pivot.row_count(), 1);
    }

    #[test]
    fn test_mortality_view_missing_both_columns() {
        let data = dataset(&[Column::Antibiotic], vec![CaseRecord::new(day(1), "A", 1)]);

        let output = build_view(View::MortalityRecovery, &data, &CaseFilter::all());

        assert!(output.table.is_empty());
        assert!(output.detail.is_none());
        assert_eq!(output.warnings.len(), 2);
    }

    #[test]
    fn test_headline() {
        let data = full_dataset();
        let h = headline(&data, &CaseFilter::hospitals(["A"]));

        assert_eq!(h, Headline { rows: 2, hospitals: 1, total_cases: 13 });
    }
}
