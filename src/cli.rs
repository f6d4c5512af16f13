use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORK_ROOT: &str = ".cache/sheetload";

#[derive(Parser, Debug)]
#[command(
    name = "sheetload",
    version,
    about = "Idempotent ingestion of spreadsheet exports into SQLite"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Ingest(IngestArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = DEFAULT_WORK_ROOT)]
    pub work_root: PathBuf,

    #[arg(long = "source-dir", required = true)]
    pub source_dirs: Vec<PathBuf>,

    #[arg(long = "extension", default_values = ["csv", "xlsx", "xlsm"])]
    pub extensions: Vec<String>,

    #[arg(long = "skip-file")]
    pub skip_files: Vec<String>,

    #[arg(long, default_value_t = 100)]
    pub partition_threshold_mb: u64,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = DEFAULT_WORK_ROOT)]
    pub work_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    /// JSON file with a `jobs` list; replaces the per-job flags below.
    #[arg(long, conflicts_with_all = ["table", "source_dirs"])]
    pub job_file: Option<PathBuf>,

    #[arg(long, required_unless_present = "job_file")]
    pub table: Option<String>,

    #[arg(long = "source-dir", required_unless_present = "job_file")]
    pub source_dirs: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = IngestMode::Normalize)]
    pub mode: IngestMode,

    /// Allowed extensions; defaults depend on the mode.
    #[arg(long = "extension")]
    pub extensions: Vec<String>,

    #[arg(long = "skip-file")]
    pub skip_files: Vec<String>,

    #[arg(long, default_value = "1")]
    pub level: String,

    #[arg(long, default_value = "s3_bucket")]
    pub origin: String,

    #[arg(long, default_value_t = 0)]
    pub csv_skip_rows: usize,

    /// Candidate CSV encodings in priority order.
    #[arg(long = "csv-encoding")]
    pub csv_encodings: Vec<String>,

    #[arg(long, default_value_t = 100)]
    pub partition_threshold_mb: u64,

    #[arg(long, default_value_t = false)]
    pub force_partitioned: bool,

    #[arg(long, default_value_t = 50_000)]
    pub partition_rows: usize,

    /// Restrict ledger splitting to one worksheet.
    #[arg(long)]
    pub ledger_sheet: Option<String>,

    #[arg(long)]
    pub ledger_key: Option<String>,

    #[arg(long, default_value_t = false)]
    pub with_row_index: bool,

    /// Read and normalize files on a worker pool.
    #[arg(long, default_value_t = false)]
    pub parallel: bool,
}

impl IngestArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        resolve_db_path(&self.work_root, self.db_path.as_deref())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// One table per sheet, header taken from the widest row.
    Normalize,
    /// Several tables per sheet, each opened by a header carrying the key.
    Ledger,
    /// Fixed-form reports, one record per workbook.
    Template,
}

impl IngestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Ledger => "ledger",
            Self::Template => "template",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_WORK_ROOT)]
    pub work_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StatusArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        resolve_db_path(&self.work_root, self.db_path.as_deref())
    }
}

fn resolve_db_path(work_root: &Path, db_path: Option<&Path>) -> PathBuf {
    db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| work_root.join("sheetload.sqlite"))
}
