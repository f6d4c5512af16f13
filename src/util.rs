use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

const MANIFEST_DIR: &str = "manifests";

pub fn now_utc_string() -> String {
    rfc3339(Utc::now())
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Start time of one ingest run. The run id and the default manifest name
/// share the compact form so manifests sort by start time.
#[derive(Debug, Clone, Copy)]
pub struct RunStamp {
    started: DateTime<Utc>,
}

impl RunStamp {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(started: DateTime<Utc>) -> Self {
        Self { started }
    }

    pub fn started_at(&self) -> String {
        rfc3339(self.started)
    }

    pub fn run_id(&self) -> String {
        format!("run-{}", self.compact())
    }

    pub fn manifest_path(&self, work_root: &Path) -> PathBuf {
        manifest_dir(work_root).join(format!("ingest_run_{}.json", self.compact()))
    }

    fn compact(&self) -> String {
        self.started.format("%Y%m%dT%H%M%SZ").to_string()
    }
}

pub fn manifest_dir(work_root: &Path) -> PathBuf {
    work_root.join(MANIFEST_DIR)
}

pub fn inventory_path(work_root: &Path) -> PathBuf {
    manifest_dir(work_root).join("source_inventory.json")
}

/// Creates the directory a file will be written into.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display())),
        _ => Ok(()),
    }
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open source for hashing: {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read source for hashing: {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes a manifest as pretty JSON with a trailing newline.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let file = File::create(path)
        .with_context(|| format!("failed to create manifest: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize manifest: {}", path.display()))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write manifest: {}", path.display()))
}

/// Reconstructs the invocation for the run manifest.
pub fn command_line() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn sha256_file_matches_known_digest() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("abc.csv");
        fs::write(&path, "abc").expect("file should be written");

        assert_eq!(
            sha256_file(&path).expect("hash should succeed"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn write_json_pretty_creates_manifest_directory() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = inventory_path(dir.path());
        write_json_pretty(&path, &serde_json::json!({ "file_count": 0 }))
            .expect("json should write");

        let raw = fs::read_to_string(&path).expect("json should read back");
        assert!(raw.ends_with("}\n"));
        assert!(raw.contains("\"file_count\": 0"));
    }

    #[test]
    fn run_stamp_names_run_and_manifest_from_start_time() {
        let ts = Utc
            .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
            .single()
            .expect("timestamp should be valid");
        let stamp = RunStamp::at(ts);

        assert_eq!(stamp.run_id(), "run-20260304T050607Z");
        assert_eq!(stamp.started_at(), "2026-03-04T05:06:07Z");
        assert_eq!(
            stamp.manifest_path(Path::new("work")),
            Path::new("work/manifests/ingest_run_20260304T050607Z.json")
        );
    }

    #[test]
    fn ensure_parent_dir_accepts_bare_file_names() {
        ensure_parent_dir(Path::new("sheetload.sqlite")).expect("bare name needs no directory");
    }
}
