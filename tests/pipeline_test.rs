// End-to-end: CSV on disk -> loader -> views -> export

use pathogen_dashboard::{
    build_all, build_view, load_dataset, views::column_total, CaseFilter, Cell, DashboardConfig,
    DataLoader, View, WarningKind,
};
use std::io::Write;
use std::path::PathBuf;

fn sample_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

fn sample_config() -> DashboardConfig {
    DashboardConfig {
        data_files: vec![sample_path("sample_cases.csv")],
        hospital_file: Some(sample_path("hospitals.csv")),
        ..DashboardConfig::default()
    }
}

#[test]
fn test_sample_data_loads_and_cleans() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);

    let data = load_dataset(&loader, &config).unwrap();
    let report = &data.cases.report;

    assert_eq!(report.rows_read, 10);
    assert_eq!(report.rows_kept, 8);
    assert_eq!(report.missing_cases, 1);
    assert_eq!(report.missing_hospital, 1);
    assert!(report.missing_optional_columns().is_empty());
    assert_eq!(data.cases.total_cases(), 81);
}

#[test]
fn test_every_view_sums_to_total() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);
    let data = load_dataset(&loader, &config).unwrap();

    let trends = build_view(View::InfectionTrends, &data, &CaseFilter::all());
    let hospitals = build_view(View::HospitalComparisons, &data, &CaseFilter::all());
    let resistance = build_view(View::AntibioticResistance, &data, &CaseFilter::all());

    assert_eq!(column_total(&trends.table, "Number_of_Cases"), 81.0);
    assert_eq!(column_total(&hospitals.table, "Number_of_Cases"), 81.0);
    assert_eq!(column_total(&resistance.table, "Number_of_Cases"), 81.0);
}

#[test]
fn test_hospital_comparison_with_rates() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);
    let data = load_dataset(&loader, &config).unwrap();

    let output = build_view(View::HospitalComparisons, &data, &CaseFilter::all());

    assert_eq!(
        output.table.column_names(),
        vec!["Hospital", "Number_of_Cases", "Infection_Rate"]
    );
    assert_eq!(output.table.column("Hospital").unwrap()[0], Cell::from("General Hospital"));
    assert_eq!(output.table.column("Number_of_Cases").unwrap()[0], Cell::Number(45.0));
    assert_eq!(output.table.column("Infection_Rate").unwrap()[0], Cell::Number(0.12));
}

#[test]
fn test_mortality_pivot_keeps_gaps() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);
    let data = load_dataset(&loader, &config).unwrap();

    let output = build_view(View::MortalityRecovery, &data, &CaseFilter::all());
    let pivot = output.detail.unwrap();

    assert_eq!(pivot.row_count(), 4);
    // 2024-01-03 General Hospital has cases but no rate
    assert_eq!(pivot.column("General Hospital").unwrap()[2], Cell::Empty);
    assert_eq!(
        output.table.column("Outcome").unwrap(),
        &[Cell::from("Recovered"), Cell::from("Died")][..]
    );
}

#[test]
fn test_filter_never_leaks_excluded_hospitals() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);
    let data = load_dataset(&loader, &config).unwrap();

    let filter = CaseFilter::hospitals(["St. Mary's"]);
    let output = build_view(View::InfectionTrends, &data, &filter);

    assert_eq!(output.table.row_count(), 3);
    for cell in output.table.column("Hospital").unwrap() {
        assert_eq!(cell.as_text(), Some("St. Mary's"));
    }
}

#[test]
fn test_empty_selection_across_views() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);
    let data = load_dataset(&loader, &config).unwrap();

    let outputs = build_all(&data, &CaseFilter::hospitals(Vec::<String>::new()));

    assert_eq!(outputs.len(), 4);
    for output in outputs {
        assert!(output.table.is_empty());
        assert_eq!(output.warnings[0].kind, WarningKind::EmptySelection);
    }
}

#[test]
fn test_repeated_loads_hit_cache() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);

    for _ in 0..5 {
        load_dataset(&loader, &config).unwrap();
    }

    let stats = loader.stats();
    // one miss each for the case file and the hospital file
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 8);
}

#[test]
fn test_legacy_schema_without_optional_columns() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Date,Source,Number_of_Cases,Mortality").unwrap();
    writeln!(file, "2024-03-01,East Wing,3,0.2").unwrap();
    writeln!(file, "03/02/2024,East Wing,2,0.1").unwrap();
    file.flush().unwrap();

    let config = DashboardConfig {
        data_files: vec![file.path().to_path_buf()],
        ..DashboardConfig::default()
    };
    let loader = DataLoader::from_config(&config);
    let data = load_dataset(&loader, &config).unwrap();

    assert_eq!(data.cases.records.len(), 2);
    assert_eq!(data.cases.hospitals(), vec!["East Wing".to_string()]);

    let resistance = build_view(View::AntibioticResistance, &data, &CaseFilter::all());
    assert!(resistance.table.is_empty());
    assert_eq!(resistance.warnings[0].kind, WarningKind::MissingColumn);

    // "Mortality" is not treated as Mortality_Rate without an explicit alias
    let mortality = build_view(View::MortalityRecovery, &data, &CaseFilter::all());
    assert!(mortality.table.is_empty());
    assert_eq!(mortality.warnings.len(), 2);
}

#[test]
fn test_unreadable_file_surfaces_error() {
    let config = DashboardConfig {
        data_files: vec![PathBuf::from("/definitely/not/here.csv")],
        ..DashboardConfig::default()
    };
    let loader = DataLoader::from_config(&config);

    let err = load_dataset(&loader, &config).unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.csv"));
}

#[test]
fn test_export_csv_round_trip_through_reader() {
    let config = sample_config();
    let loader = DataLoader::from_config(&config);
    let data = load_dataset(&loader, &config).unwrap();

    let output = build_view(View::HospitalComparisons, &data, &CaseFilter::all());
    let mut buf = Vec::new();
    output.table.write_csv(&mut buf).unwrap();

    let mut reader = csv::Reader::from_reader(buf.as_slice());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "Hospital");
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[0][1], "45");
}
