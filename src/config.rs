// Where the dashboard reads its sources and writes its exports.
//
// Defaults are the working directory and the fixed file names the data team
// drops there. `KTT_DATA_DIR` / `KTT_OUT_DIR` override the directories, and
// so do the first two command-line arguments (arguments win).
use std::env;
use std::path::PathBuf;

pub const LEGACY_CANDIDATES: [&str; 2] = ["papp.csv", "papp.xlsx"];
pub const CUSTOMER_FILE: &str = "db.csv";

pub const FILTERED_EXPORT: &str = "filtered_customers.csv";
pub const MARKERS_EXPORT: &str = "map_markers.json";
pub const KPI_EXPORT: &str = "kpi_summary.json";
pub const LEGACY_EXPORT: &str = "legacy_region_summary.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub legacy_candidates: Vec<String>,
    pub customer_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            out_dir: PathBuf::from("."),
            legacy_candidates: LEGACY_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            customer_file: CUSTOMER_FILE.to_string(),
        }
    }
}

impl Config {
    /// Build from the process environment and arguments (program name
    /// already skipped).
    pub fn from_env<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self::resolve(
            env::var("KTT_DATA_DIR").ok(),
            env::var("KTT_OUT_DIR").ok(),
            args,
        )
    }

    fn resolve<I>(data_env: Option<String>, out_env: Option<String>, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut cfg = Config::default();
        let mut args = args.into_iter();
        if let Some(dir) = args.next().or(data_env).filter(|s| !s.trim().is_empty()) {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = args.next().or(out_env).filter(|s| !s.trim().is_empty()) {
            cfg.out_dir = PathBuf::from(dir);
        }
        cfg
    }

    /// Legacy-table candidates in preference order (CSV first).
    pub fn legacy_paths(&self) -> Vec<PathBuf> {
        self.legacy_candidates
            .iter()
            .map(|name| self.data_dir.join(name))
            .collect()
    }

    pub fn customer_path(&self) -> PathBuf {
        self.data_dir.join(&self.customer_file)
    }

    pub fn out_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(name)
    }
}
