use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::classify::{FileClassifier, Route};
use crate::cli::InventoryArgs;
use crate::model::{InventoryEntry, InventoryManifest};
use crate::util::{inventory_path, now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let classifier = FileClassifier::new(&args.extensions, &args.skip_files)
        .with_partitioning(args.partition_threshold_mb, false);
    let manifest = build_manifest(&classifier, &args.source_dirs)?;

    let unsupported = manifest
        .files
        .iter()
        .filter(|entry| entry.route == Route::Unsupported.as_str())
        .count();
    if unsupported > 0 {
        warn!(unsupported, "inventory lists files no reader can handle");
    }

    if args.dry_run {
        info!(
            file_count = manifest.file_count,
            sources = manifest.source_directories.len(),
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| inventory_path(&args.work_root));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(file_count = manifest.file_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(
    classifier: &FileClassifier,
    source_dirs: &[PathBuf],
) -> Result<InventoryManifest> {
    let files = classifier.classify(source_dirs)?;
    if files.is_empty() {
        bail!("no matching files found under {} source directories", source_dirs.len());
    }

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        entries.push(InventoryEntry {
            sha256: sha256_file(&file.path)?,
            path: file.path.display().to_string(),
            extension: file.extension,
            size_bytes: file.size_bytes,
            route: file.route.as_str().to_string(),
        });
    }

    Ok(InventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directories: source_dirs
            .iter()
            .map(|dir| dir.display().to_string())
            .collect(),
        file_count: entries.len(),
        files: entries,
    })
}
