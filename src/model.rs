use serde::{Deserialize, Serialize};

use crate::loader::LoadReport;
use crate::normalize::SheetReport;
use crate::template::ExtractionReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub path: String,
    pub extension: String,
    pub size_bytes: u64,
    pub route: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directories: Vec<String>,
    pub file_count: usize,
    pub files: Vec<InventoryEntry>,
}

/// The subset of an ingest run manifest that `status` reports on.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestPaths {
    pub work_root: String,
    pub manifest_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sheets: Vec<SheetReport>,
    pub tables: Vec<TableSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub table: String,
    pub mode: String,
    pub files_discovered: usize,
    pub files_failed: usize,
    pub tables_produced: usize,
    pub rows_unified: usize,
    pub files: Vec<FileOutcome>,
    pub load: Option<LoadReport>,
    pub load_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub paths: IngestPaths,
    pub jobs: Vec<JobOutcome>,
    pub warnings: Vec<String>,
}
