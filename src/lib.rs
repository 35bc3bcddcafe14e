// Pathogen Dashboard - Core Library
// Data preparation for the CLI, TUI and API server: load, clean, filter,
// aggregate and shape hospital infection data into plain tables.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod record;
pub mod table;
pub mod views;

// Re-export commonly used types
pub use aggregate::{
    count_rows, daily_cases, daily_cases_table, hospital_infection_rates, mean_resistance,
    pivot_mortality, resistance_table, sum_cases, CaseSums, GroupKey, PivotTable,
    ResistanceSummary, ValueCounts,
};
pub use config::{DashboardConfig, PathogenProfile, ServerConfig};
pub use error::{DashboardError, Result};
pub use filter::{CaseFilter, FilterOutcome, HospitalSelection, Warning, WarningKind};
pub use loader::{
    load_case_file, load_cases, load_hospital_file, CacheStats, CaseTable, DataLoader,
    HospitalTable, LoadReport,
};
pub use record::{parse_date, CaseRecord, Column, HospitalRecord};
pub use table::{Cell, Table};
pub use views::{build_all, build_view, headline, Dataset, Headline, View, ViewOutput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load the dataset named by a config through a shared loader
pub fn load_dataset(loader: &DataLoader, config: &DashboardConfig) -> Result<Dataset> {
    let cases = loader.load_cases(&config.data_files)?;
    let hospitals = match &config.hospital_file {
        Some(path) => Some(loader.load_hospitals(path)?),
        None => None,
    };
    Ok(Dataset::new(cases, hospitals))
}
