// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pathogen_dashboard::{
    build_all, build_view, load_dataset, CaseFilter, DashboardConfig, DataLoader, Dataset, View,
};

/// Hospital infection data dashboard
#[derive(Parser, Debug)]
#[command(name = "pathogen-dashboard")]
#[command(about = "Load hospital infection CSVs and explore the aggregated views")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "PATHOGEN_DASHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Case CSV file (repeatable); overrides the config file
    #[arg(short, long = "data", env = "PATHOGEN_DASHBOARD_DATA", value_delimiter = ',')]
    data: Vec<PathBuf>,

    /// Hospital CSV file (Name, Infection_Rate)
    #[arg(long, env = "PATHOGEN_DASHBOARD_HOSPITALS")]
    hospitals: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive terminal dashboard (default)
    Tui,

    /// Print one view's table to stdout
    Export {
        /// View slug, e.g. hospital-comparisons
        #[arg(short, long)]
        view: String,

        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Restrict to these hospitals (repeatable)
        #[arg(long = "hospital")]
        hospitals: Vec<String>,

        /// First date to include (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Last date to include (inclusive)
        #[arg(long)]
        to: Option<String>,
    },

    /// Print the load report and per-view row counts
    Summary,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Csv,
}

fn main() -> Result<()> {
    // Logs go to stderr so exported tables on stdout stay clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pathogen_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let mut config = DashboardConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if !args.data.is_empty() {
        config.data_files = args.data.clone();
    }
    if args.hospitals.is_some() {
        config.hospital_file = args.hospitals.clone();
    }

    let loader = DataLoader::from_config(&config);
    let dataset = load_dataset(&loader, &config).with_context(|| {
        format!(
            "Failed to load data from {}",
            config
                .data_files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;

    match args.command.unwrap_or(Command::Tui) {
        Command::Tui => run_ui_mode(&config, dataset),
        Command::Export {
            view,
            format,
            hospitals,
            from,
            to,
        } => run_export(&dataset, &view, format, hospitals, from, to),
        Command::Summary => run_summary(&dataset),
    }
}

fn run_export(
    dataset: &Dataset,
    view: &str,
    format: Format,
    hospitals: Vec<String>,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let view: View = view.parse()?;

    let filter = if hospitals.is_empty() {
        CaseFilter::all()
    } else {
        CaseFilter::hospitals(hospitals)
    };
    let filter = filter.with_range_str(from.as_deref(), to.as_deref())?;

    let output = build_view(view, dataset, &filter);
    for warning in &output.warnings {
        eprintln!("⚠️  {}", warning);
    }

    let stdout = io::stdout();
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout.lock(), &output)?;
            println!();
        }
        Format::Csv => {
            output.table.write_csv(stdout.lock())?;
            if let Some(detail) = &output.detail {
                println!();
                detail.write_csv(stdout.lock())?;
            }
        }
    }

    info!("Exported {} ({} rows)", view.slug(), output.table.row_count());
    Ok(())
}

fn run_summary(dataset: &Dataset) -> Result<()> {
    let report = &dataset.cases.report;

    println!("🦠 Pathogen Dashboard - Load Summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for file in &report.files {
        println!("📂 {}", file.display());
    }
    println!("\n✓ Rows read:     {}", report.rows_read);
    println!("✓ Rows kept:     {}", report.rows_kept);
    println!("✗ Rows excluded: {}", report.rows_excluded());
    println!("    missing date:     {}", report.missing_date);
    println!("    missing hospital: {}", report.missing_hospital);
    println!("    missing cases:    {}", report.missing_cases);

    let missing = report.missing_optional_columns();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|c| c.header()).collect();
        println!("\n⚠️  Optional columns absent: {}", names.join(", "));
    }

    if let Some(hospitals) = &dataset.hospitals {
        println!("\n🏥 Hospital table: {} rows", hospitals.records.len());
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for output in build_all(dataset, &CaseFilter::all()) {
        println!(
            "{:<24} {:>6} rows  {} warning(s)",
            output.title,
            output.table.row_count(),
            output.warnings.len()
        );
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &DashboardConfig, dataset: Dataset) -> Result<()> {
    info!(
        "Starting dashboard UI with {} case rows (press 'q' to quit)",
        dataset.cases.records.len()
    );

    let mut app = ui::App::new(dataset, config.pathogen.clone());
    ui::run_ui(&mut app)?;

    info!("UI closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &DashboardConfig, _dataset: Dataset) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: pathogen-dashboard export --view hospital-comparisons");
    std::process::exit(1);
}
