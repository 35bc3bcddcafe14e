// ⚙️ Configuration - TOML file + defaults
//
// Resolution order for the config file:
// 1. Explicit path (command line)
// 2. PATHOGEN_DASHBOARD_CONFIG environment variable
// 3. ./pathogen-dashboard.toml in the working directory
// 4. Built-in defaults
//
// Command-line data paths override whatever the file names.

use crate::error::{DashboardError, Result};
use crate::record::Column;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_ENV_VAR: &str = "PATHOGEN_DASHBOARD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "pathogen-dashboard.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Case CSV files, concatenated in order
    pub data_files: Vec<PathBuf>,

    /// Optional hospital table (Name, Infection_Rate)
    pub hospital_file: Option<PathBuf>,

    /// Alternate header -> canonical header, layered over the defaults
    #[serde(deserialize_with = "extend_default_aliases")]
    pub column_aliases: BTreeMap<String, String>,

    pub server: ServerConfig,

    pub pathogen: PathogenProfile,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_files: vec![PathBuf::from("pathogen_data.csv")],
            hospital_file: None,
            column_aliases: default_aliases(),
            server: ServerConfig::default(),
            pathogen: PathogenProfile::default(),
        }
    }
}

fn default_aliases() -> BTreeMap<String, String> {
    let mut aliases = BTreeMap::new();
    aliases.insert("Source".to_string(), Column::Hospital.header().to_string());
    aliases
}

fn extend_default_aliases<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut aliases = default_aliases();
    aliases.extend(BTreeMap::<String, String>::deserialize(deserializer)?);
    Ok(aliases)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Static informational text shown alongside the views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathogenProfile {
    pub name: String,
    pub summary: String,
    pub transmission: String,
    pub symptoms: Vec<String>,
    pub prevention: Vec<String>,
}

impl Default for PathogenProfile {
    fn default() -> Self {
        PathogenProfile {
            name: "Klebsiella pneumoniae".to_string(),
            summary: "Gram-negative bacterium and a leading cause of hospital-acquired \
                      pneumonia, bloodstream and urinary tract infections. Carbapenem-resistant \
                      strains are a critical-priority pathogen."
                .to_string(),
            transmission: "Person-to-person contact in healthcare settings, contaminated \
                           hands of staff, ventilators and intravenous catheters."
                .to_string(),
            symptoms: vec![
                "Fever and chills".to_string(),
                "Productive cough".to_string(),
                "Shortness of breath".to_string(),
                "Painful urination".to_string(),
            ],
            prevention: vec![
                "Hand hygiene before and after patient contact".to_string(),
                "Contact precautions for colonised patients".to_string(),
                "Antibiotic stewardship".to_string(),
                "Device and environment cleaning".to_string(),
            ],
        }
    }
}

impl DashboardConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DashboardError::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DashboardError::io(path, e))?;
        let mut config = Self::from_toml_str(&text)
            .map_err(|e| DashboardError::Config(format!("{}: {}", path.display(), e)))?;

        // Relative data paths are resolved against the config file's directory
        if let Some(base) = path.parent() {
            config.data_files = config
                .data_files
                .into_iter()
                .map(|p| resolve_relative(base, p))
                .collect();
            config.hospital_file = config.hospital_file.map(|p| resolve_relative(base, p));
        }

        Ok(config)
    }

    /// Resolve the config file following the priority order above
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Loading config from ${} = {}", CONFIG_ENV_VAR, path);
            return Self::from_file(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            info!("Loading config from {}", local.display());
            return Self::from_file(local);
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Canonical column for a header, after alias lookup
    pub fn canonical_column(&self, header: &str) -> Option<Column> {
        crate::loader::canonical_column(&self.column_aliases, header)
    }
}

fn resolve_relative(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.data_files, vec![PathBuf::from("pathogen_data.csv")]);
        assert_eq!(config.canonical_column("Source"), Some(Column::Hospital));
        assert_eq!(config.canonical_column("Mortality"), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DashboardConfig::from_toml_str(
            r#"
            data_files = ["a.csv", "b.csv"]

            [server]
            port = 8080

            [column_aliases]
            Mortality = "Mortality_Rate"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_files.len(), 2);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.pathogen, PathogenProfile::default());
        assert_eq!(config.canonical_column("Mortality"), Some(Column::MortalityRate));
        assert_eq!(config.canonical_column("Source"), Some(Column::Hospital));
    }

    #[test]
    fn test_alias_table_extends_defaults() {
        let config = DashboardConfig::from_toml_str(
            r#"
            [column_aliases]
            Clinic = "Hospital"
            Source = "Antibiotic"
            "#,
        )
        .unwrap();

        assert_eq!(config.canonical_column("Clinic"), Some(Column::Hospital));
        assert_eq!(config.canonical_column("Source"), Some(Column::Antibiotic));
        assert_eq!(config.column_aliases.len(), 2);
    }

    #[test]
    fn test_invalid_toml() {
        let err = DashboardConfig::from_toml_str("server = 5").unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dash.toml");
        std::fs::write(&path, "data_files = [\"cases.csv\"]\nhospital_file = \"/abs/h.csv\"\n").unwrap();

        let config = DashboardConfig::from_file(&path).unwrap();

        assert_eq!(config.data_files, vec![dir.path().join("cases.csv")]);
        assert_eq!(config.hospital_file, Some(PathBuf::from("/abs/h.csv")));
    }
}
