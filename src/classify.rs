use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    WholeCsv,
    PartitionedCsv,
    Workbook,
    Unsupported,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WholeCsv => "whole_csv",
            Self::PartitionedCsv => "partitioned_csv",
            Self::Workbook => "workbook",
            Self::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub extension: String,
    pub size_bytes: u64,
    pub route: Route,
}

/// Discovers input files under a set of roots and picks a reader path for
/// each one from its extension and size.
#[derive(Debug, Clone)]
pub struct FileClassifier {
    extensions: HashSet<String>,
    skip_files: HashSet<String>,
    partition_threshold_bytes: u64,
    force_partitioned: bool,
}

impl FileClassifier {
    pub fn new<E, S>(extensions: E, skip_files: S) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|extension| normalize_extension(extension.as_ref()))
                .collect(),
            skip_files: skip_files
                .into_iter()
                .map(|name| name.as_ref().to_string())
                .collect(),
            partition_threshold_bytes: 100 * BYTES_PER_MB,
            force_partitioned: false,
        }
    }

    pub fn with_partitioning(mut self, threshold_mb: u64, force: bool) -> Self {
        self.partition_threshold_bytes = threshold_mb.saturating_mul(BYTES_PER_MB);
        self.force_partitioned = force;
        self
    }

    /// Walks every root recursively. Missing roots are logged and skipped.
    /// The result is sorted by path so runs are reproducible.
    pub fn classify<P: AsRef<Path>>(&self, roots: &[P]) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();

        for root in roots {
            let root = root.as_ref();
            if !root.is_dir() {
                warn!(root = %root.display(), "source directory not found; skipping");
                continue;
            }

            for entry in WalkDir::new(root).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(root = %root.display(), error = %err, "failed to read directory entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                if let Some(file) = self.classify_entry(entry.path(), entry.metadata().ok())? {
                    files.push(file);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);
        Ok(files)
    }

    fn classify_entry(
        &self,
        path: &Path,
        metadata: Option<std::fs::Metadata>,
    ) -> Result<Option<SourceFile>> {
        let Some(extension) = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(normalize_extension)
        else {
            return Ok(None);
        };
        if !self.extensions.contains(&extension) {
            return Ok(None);
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        if self.skip_files.contains(file_name.as_ref()) {
            debug!(path = %path.display(), "file is on the skip list");
            return Ok(None);
        }

        let path = std::path::absolute(path)
            .with_context(|| format!("failed to resolve absolute path: {}", path.display()))?;
        let size_bytes = metadata.map(|metadata| metadata.len()).unwrap_or(0);
        let route = self.route_for(&extension, size_bytes);

        Ok(Some(SourceFile {
            path,
            extension,
            size_bytes,
            route,
        }))
    }

    pub fn route_for(&self, extension: &str, size_bytes: u64) -> Route {
        match extension {
            "csv" if self.force_partitioned || size_bytes > self.partition_threshold_bytes => {
                Route::PartitionedCsv
            }
            "csv" => Route::WholeCsv,
            "xlsx" | "xlsm" => Route::Workbook,
            _ => Route::Unsupported,
        }
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn touch(path: &Path, bytes: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent should be created");
        }
        fs::write(path, vec![b'x'; bytes]).expect("file should be written");
    }

    #[test]
    fn classify_filters_by_extension_case_insensitively_and_skip_list() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        touch(&dir.path().join("a.CSV"), 4);
        touch(&dir.path().join("nested/b.xlsx"), 4);
        touch(&dir.path().join("nested/deeper/c.XLSM"), 4);
        touch(&dir.path().join("notes.txt"), 4);
        touch(&dir.path().join("ledger.xlsm"), 4);

        let classifier = FileClassifier::new(["csv", ".xlsx", "xlsm"], ["ledger.xlsm"]);
        let files = classifier
            .classify(&[dir.path()])
            .expect("classification should succeed");

        let names: Vec<String> = files
            .iter()
            .map(|file| file.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.xlsx", "c.XLSM"]);
        assert!(files.iter().all(|file| file.path.is_absolute()));
        assert_eq!(files[0].extension, "csv");
        assert_eq!(files[0].route, Route::WholeCsv);
        assert_eq!(files[1].route, Route::Workbook);
    }

    #[test]
    fn missing_root_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        touch(&dir.path().join("a.csv"), 1);

        let classifier = FileClassifier::new(["csv"], Vec::<String>::new());
        let files = classifier
            .classify(&[dir.path().join("absent"), dir.path().to_path_buf()])
            .expect("missing roots should not fail the run");
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn large_or_forced_csv_takes_partitioned_route() {
        let classifier = FileClassifier::new(["csv"], Vec::<String>::new());
        assert_eq!(classifier.route_for("csv", 100 * BYTES_PER_MB), Route::WholeCsv);
        assert_eq!(
            classifier.route_for("csv", 100 * BYTES_PER_MB + 1),
            Route::PartitionedCsv
        );

        let forced = classifier.clone().with_partitioning(100, true);
        assert_eq!(forced.route_for("csv", 1), Route::PartitionedCsv);
        assert_eq!(forced.route_for("xlsx", 1), Route::Workbook);
        assert_eq!(forced.route_for("ods", 1), Route::Unsupported);
    }
}
