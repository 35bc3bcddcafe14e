// 📂 Data Loader/Cleaner
//
// CSV → cleaned records. Invalid numerics become None, rows without a date,
// hospital or case count are excluded and counted in the LoadReport.
// `DataLoader` memoizes results per unique input so repeated view builds in
// one session do not touch the disk again.

use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::record::{
    coerce_cases, coerce_number, coerce_text, parse_date, CaseRecord, Column, HospitalRecord,
};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info, warn};

// ============================================================================
// LOADED TABLES
// ============================================================================

/// What happened while loading one or more files
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub files: Vec<PathBuf>,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub missing_date: usize,
    pub missing_hospital: usize,
    pub missing_cases: usize,
    /// Canonical columns found in at least one file header
    pub present_columns: BTreeSet<Column>,
}

impl LoadReport {
    pub fn rows_excluded(&self) -> usize {
        self.rows_read - self.rows_kept
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.present_columns.contains(&column)
    }

    /// Optional case columns absent from every file
    pub fn missing_optional_columns(&self) -> Vec<Column> {
        Column::CASE_COLUMNS
            .iter()
            .filter(|c| !Column::REQUIRED_CASE_COLUMNS.contains(c))
            .filter(|c| !self.has_column(**c))
            .copied()
            .collect()
    }

    fn merge(&mut self, other: LoadReport) {
        self.files.extend(other.files);
        self.rows_read += other.rows_read;
        self.rows_kept += other.rows_kept;
        self.missing_date += other.missing_date;
        self.missing_hospital += other.missing_hospital;
        self.missing_cases += other.missing_cases;
        self.present_columns.extend(other.present_columns);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseTable {
    pub records: Vec<CaseRecord>,
    pub report: LoadReport,
}

impl CaseTable {
    pub fn total_cases(&self) -> u64 {
        self.records
            .iter()
            .fold(0, |acc: u64, r| acc.saturating_add(r.number_of_cases))
    }

    /// Distinct hospital names, sorted
    pub fn hospitals(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.hospital.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HospitalTable {
    pub records: Vec<HospitalRecord>,
    pub rows_read: usize,
    pub files: Vec<PathBuf>,
}

// ============================================================================
// HEADER RESOLUTION
// ============================================================================

/// Canonical column for a raw header, honouring the alias table
pub fn canonical_column(aliases: &BTreeMap<String, String>, header: &str) -> Option<Column> {
    let header = header.trim();
    match aliases.get(header) {
        Some(target) => Column::from_header(target),
        None => Column::from_header(header),
    }
}

/// Maps canonical columns to field positions for one file
struct HeaderMap {
    positions: HashMap<Column, usize>,
}

impl HeaderMap {
    fn build(path: &Path, headers: &StringRecord, aliases: &BTreeMap<String, String>) -> Self {
        let mut positions = HashMap::new();

        for (idx, header) in headers.iter().enumerate() {
            match canonical_column(aliases, header) {
                Some(column) => {
                    if positions.contains_key(&column) {
                        warn!(
                            "{}: duplicate column for {} at position {}, keeping the first",
                            path.display(),
                            column.header(),
                            idx
                        );
                    } else {
                        positions.insert(column, idx);
                    }
                }
                None => debug!("{}: ignoring column '{}'", path.display(), header.trim()),
            }
        }

        HeaderMap { positions }
    }

    fn require(&self, path: &Path, columns: &[Column]) -> Result<()> {
        for column in columns {
            if !self.positions.contains_key(column) {
                return Err(DashboardError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.header().to_string(),
                });
            }
        }
        Ok(())
    }

    fn get<'r>(&self, record: &'r StringRecord, column: Column) -> Option<&'r str> {
        self.positions.get(&column).and_then(|idx| record.get(*idx))
    }

    fn present(&self) -> BTreeSet<Column> {
        self.positions.keys().copied().collect()
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| DashboardError::io(path, e))?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(file))
}

// ============================================================================
// UNCACHED LOADING
// ============================================================================

/// Load and clean a single case file
pub fn load_case_file(path: &Path, aliases: &BTreeMap<String, String>) -> Result<CaseTable> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| DashboardError::csv(path, e))?
        .clone();

    let header_map = HeaderMap::build(path, &headers, aliases);
    header_map.require(path, &Column::REQUIRED_CASE_COLUMNS)?;

    let mut report = LoadReport {
        files: vec![path.to_path_buf()],
        present_columns: header_map.present(),
        ..Default::default()
    };
    let mut records = Vec::new();

    for result in reader.records() {
        let row = result.map_err(|e| DashboardError::csv(path, e))?;
        report.rows_read += 1;

        let (row, columns) = (&row, &header_map);
        let field = move |column: Column| columns.get(row, column).unwrap_or("");

        let Some(date) = parse_date(field(Column::Date)) else {
            report.missing_date += 1;
            continue;
        };
        let Some(hospital) = coerce_text(field(Column::Hospital)) else {
            report.missing_hospital += 1;
            continue;
        };
        let Some(number_of_cases) = coerce_cases(field(Column::NumberOfCases)) else {
            report.missing_cases += 1;
            continue;
        };

        records.push(CaseRecord {
            date,
            hospital,
            number_of_cases,
            antibiotic: coerce_text(field(Column::Antibiotic)),
            resistance_level: coerce_number(field(Column::ResistanceLevel)),
            outcome: coerce_text(field(Column::Outcome)),
            mortality_rate: coerce_number(field(Column::MortalityRate)),
        });
    }

    report.rows_kept = records.len();

    if report.rows_excluded() > 0 {
        warn!(
            "{}: excluded {} of {} rows (date: {}, hospital: {}, cases: {})",
            path.display(),
            report.rows_excluded(),
            report.rows_read,
            report.missing_date,
            report.missing_hospital,
            report.missing_cases
        );
    }
    info!("Loaded {} case rows from {}", report.rows_kept, path.display());

    Ok(CaseTable { records, report })
}

/// Load several case files and concatenate them in order
pub fn load_cases<P: AsRef<Path>>(
    paths: &[P],
    aliases: &BTreeMap<String, String>,
) -> Result<CaseTable> {
    let mut combined = CaseTable::default();
    for path in paths {
        let table = load_case_file(path.as_ref(), aliases)?;
        combined.records.extend(table.records);
        combined.report.merge(table.report);
    }
    Ok(combined)
}

/// Load a hospital table (Name, Infection_Rate). Blank names are skipped.
pub fn load_hospital_file(path: &Path, aliases: &BTreeMap<String, String>) -> Result<HospitalTable> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| DashboardError::csv(path, e))?
        .clone();

    let header_map = HeaderMap::build(path, &headers, aliases);
    header_map.require(path, &[Column::Name])?;

    let mut table = HospitalTable {
        files: vec![path.to_path_buf()],
        ..Default::default()
    };

    for result in reader.records() {
        let row = result.map_err(|e| DashboardError::csv(path, e))?;
        table.rows_read += 1;

        let Some(name) = header_map.get(&row, Column::Name).and_then(coerce_text) else {
            continue;
        };
        let infection_rate = header_map
            .get(&row, Column::InfectionRate)
            .and_then(coerce_number);

        table.records.push(HospitalRecord { name, infection_rate });
    }

    info!("Loaded {} hospital rows from {}", table.records.len(), path.display());
    Ok(table)
}

// ============================================================================
// MEMOIZING LOADER
// ============================================================================

/// Identity of one input file at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FileStamp {
    path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self> {
        let canonical = path.canonicalize().map_err(|e| DashboardError::io(path, e))?;
        let meta = std::fs::metadata(&canonical).map_err(|e| DashboardError::io(path, e))?;
        Ok(FileStamp {
            path: canonical,
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

fn stamps<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<FileStamp>> {
    paths.iter().map(|p| FileStamp::of(p.as_ref())).collect()
}

/// Canonical paths of one input set; one cache slot per set
type CacheKey = Vec<PathBuf>;

/// A loaded table and the file stamps it was read at
#[derive(Debug)]
struct CacheEntry<T> {
    stamps: Vec<FileStamp>,
    table: Arc<T>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Session-scoped memoizing loader. Safe to share behind an `Arc`.
///
/// Each distinct set of input paths holds at most one table; a changed file
/// replaces the slot instead of adding another.
#[derive(Debug, Default)]
pub struct DataLoader {
    aliases: BTreeMap<String, String>,
    cases: Mutex<HashMap<CacheKey, CacheEntry<CaseTable>>>,
    hospitals: Mutex<HashMap<CacheKey, CacheEntry<HospitalTable>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave a half-written entry
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DataLoader {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        DataLoader {
            aliases,
            ..Default::default()
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(config.column_aliases.clone())
    }

    /// Load case files, reusing an earlier result if no file changed
    pub fn load_cases<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Arc<CaseTable>> {
        self.cached(&self.cases, stamps(paths)?, || load_cases(paths, &self.aliases))
    }

    /// Load a hospital table, reusing an earlier result if unchanged
    pub fn load_hospitals(&self, path: &Path) -> Result<Arc<HospitalTable>> {
        self.cached(&self.hospitals, stamps(&[path])?, || {
            load_hospital_file(path, &self.aliases)
        })
    }

    fn cached<T>(
        &self,
        slots: &Mutex<HashMap<CacheKey, CacheEntry<T>>>,
        stamps: Vec<FileStamp>,
        load: impl FnOnce() -> Result<T>,
    ) -> Result<Arc<T>> {
        let key: CacheKey = stamps.iter().map(|s| s.path.clone()).collect();

        if let Some(entry) = lock(slots).get(&key) {
            if entry.stamps == stamps {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit ({} files)", key.len());
                return Ok(Arc::clone(&entry.table));
            }
            debug!("Input changed, reloading {} files", key.len());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let table = Arc::new(load()?);
        lock(slots).insert(
            key,
            CacheEntry {
                stamps,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    /// Number of cached tables across case and hospital inputs
    pub fn cached_tables(&self) -> usize {
        lock(&self.cases).len() + lock(&self.hospitals).len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached table
    pub fn clear(&self) {
        lock(&self.cases).clear();
        lock(&self.hospitals).clear();
    }
}
