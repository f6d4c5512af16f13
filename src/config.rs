use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cli::{IngestArgs, IngestMode};
use crate::sheet::delimited::{CsvOptions, DEFAULT_ENCODINGS, resolve_encodings};
use crate::table::Provenance;

const DEFAULT_LEVEL: &str = "1";
const DEFAULT_ORIGIN: &str = "s3_bucket";
const DEFAULT_PARTITION_THRESHOLD_MB: u64 = 100;
const DEFAULT_PARTITION_ROWS: usize = 50_000;

/// One destination table and everything needed to fill it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetJob {
    pub table: String,
    pub source_dirs: Vec<PathBuf>,
    #[serde(default = "default_mode")]
    pub mode: IngestMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub skip_files: Vec<String>,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub csv_skip_rows: usize,
    #[serde(default)]
    pub csv_encodings: Vec<String>,
    #[serde(default = "default_partition_threshold_mb")]
    pub partition_threshold_mb: u64,
    #[serde(default)]
    pub force_partitioned: bool,
    #[serde(default = "default_partition_rows")]
    pub partition_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_key: Option<String>,
    #[serde(default)]
    pub with_row_index: bool,
    #[serde(default)]
    pub parallel: bool,
}

fn default_mode() -> IngestMode {
    IngestMode::Normalize
}

fn default_level() -> String {
    DEFAULT_LEVEL.to_string()
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_partition_threshold_mb() -> u64 {
    DEFAULT_PARTITION_THRESHOLD_MB
}

fn default_partition_rows() -> usize {
    DEFAULT_PARTITION_ROWS
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobFile {
    jobs: Vec<DatasetJob>,
}

impl DatasetJob {
    pub fn from_args(args: &IngestArgs) -> Result<Self> {
        let Some(table) = args.table.clone() else {
            bail!("--table is required unless --job-file is given");
        };

        let job = Self {
            table,
            source_dirs: args.source_dirs.clone(),
            mode: args.mode,
            extensions: (!args.extensions.is_empty()).then(|| args.extensions.clone()),
            skip_files: args.skip_files.clone(),
            level: args.level.clone(),
            origin: args.origin.clone(),
            csv_skip_rows: args.csv_skip_rows,
            csv_encodings: args.csv_encodings.clone(),
            partition_threshold_mb: args.partition_threshold_mb,
            force_partitioned: args.force_partitioned,
            partition_rows: args.partition_rows,
            ledger_sheet: args.ledger_sheet.clone(),
            ledger_key: args.ledger_key.clone(),
            with_row_index: args.with_row_index,
            parallel: args.parallel,
        };
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> Result<()> {
        let table_pattern =
            Regex::new(r"^\w+$").context("failed to compile table name regex")?;
        if !table_pattern.is_match(&self.table) {
            bail!(
                "table name must be non-empty and contain only word characters: {:?}",
                self.table
            );
        }
        if self.source_dirs.is_empty() {
            bail!("job {} has no source directories", self.table);
        }
        if self.partition_rows == 0 {
            bail!("partition_rows must be greater than zero");
        }
        if self.mode == IngestMode::Ledger
            && self
                .ledger_key
                .as_deref()
                .is_none_or(|key| key.trim().is_empty())
        {
            bail!("ledger mode for {} requires a ledger key", self.table);
        }
        self.csv_options()?;
        Ok(())
    }

    /// Explicit extensions, or the defaults for the mode.
    pub fn extensions(&self) -> Vec<String> {
        match (&self.extensions, self.mode) {
            (Some(extensions), _) => extensions.clone(),
            (None, IngestMode::Template) => vec!["xlsx".to_string(), "xlsm".to_string()],
            (None, _) => vec!["csv".to_string(), "xlsx".to_string(), "xlsm".to_string()],
        }
    }

    pub fn csv_options(&self) -> Result<CsvOptions> {
        let labels = if self.csv_encodings.is_empty() {
            DEFAULT_ENCODINGS.iter().map(|label| label.to_string()).collect()
        } else {
            self.csv_encodings.clone()
        };

        Ok(CsvOptions {
            skip_rows: self.csv_skip_rows,
            encodings: resolve_encodings(&labels)
                .with_context(|| format!("invalid csv encodings for job {}", self.table))?,
            partition_rows: self.partition_rows,
        })
    }

    pub fn provenance_for(&self, path: &Path) -> Provenance {
        Provenance {
            source: path.display().to_string(),
            origin: self.origin.clone(),
            level: self.level.clone(),
        }
    }
}

pub fn load_job_file(path: &Path) -> Result<Vec<DatasetJob>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file: JobFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse job file {}", path.display()))?;

    if file.jobs.is_empty() {
        bail!("job file {} lists no jobs", path.display());
    }
    for (index, job) in file.jobs.iter().enumerate() {
        job.validate()
            .with_context(|| format!("invalid job #{index} in {}", path.display()))?;
    }

    Ok(file.jobs)
}
