use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::loader::schema::table_columns;
use crate::loader::{FINGERPRINT_COLUMN, quote_identifier};
use crate::model::{InventoryManifest, RunSummary};
use crate::util::{inventory_path, manifest_dir};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub name: String,
    pub rows: i64,
    pub fingerprinted: Option<i64>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let manifests = manifest_dir(&args.work_root);
    let inventory = inventory_path(&args.work_root);
    let db_path = args.resolved_db_path();

    info!(work_root = %args.work_root.display(), "status requested");

    match latest_run_manifest(&manifests)? {
        Some(path) => {
            let raw =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let run: RunSummary = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            info!(
                run_id = %run.run_id,
                status = %run.status,
                started_at = %run.started_at,
                updated_at = %run.updated_at,
                warnings = run.warnings.len(),
                "loaded latest ingest manifest"
            );
        }
        None => warn!(path = %manifests.display(), "no ingest run manifest found"),
    }

    if inventory.exists() {
        let raw = fs::read(&inventory)
            .with_context(|| format!("failed to read {}", inventory.display()))?;
        let manifest: InventoryManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", inventory.display()))?;

        info!(
            generated_at = %manifest.generated_at,
            file_count = manifest.file_count,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory.display(), "inventory manifest missing");
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let tables = table_statuses(&conn)?;
        info!(path = %db_path.display(), tables = tables.len(), "database status");
        for table in tables {
            match table.fingerprinted {
                Some(fingerprinted) => info!(
                    table = %table.name,
                    rows = table.rows,
                    fingerprinted,
                    "table status"
                ),
                None => warn!(
                    table = %table.name,
                    rows = table.rows,
                    "table has no fingerprint column yet"
                ),
            }
        }
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

pub fn table_statuses(conn: &Connection) -> Result<Vec<TableStatus>> {
    let mut statement = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .context("failed to list tables")?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to list tables")?;

    let mut statuses = Vec::with_capacity(names.len());
    for name in names {
        let rows = query_count(
            conn,
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(&name)),
        )?;
        let has_fingerprint = table_columns(conn, &name)?
            .iter()
            .any(|column| column.eq_ignore_ascii_case(FINGERPRINT_COLUMN));
        let fingerprinted = if has_fingerprint {
            Some(query_count(
                conn,
                &format!(
                    "SELECT COUNT({}) FROM {}",
                    quote_identifier(FINGERPRINT_COLUMN),
                    quote_identifier(&name)
                ),
            )?)
        } else {
            None
        };
        statuses.push(TableStatus {
            name,
            rows,
            fingerprinted,
        });
    }
    Ok(statuses)
}

/// Run manifests carry a compact UTC timestamp, so the lexically greatest
/// name is the newest run.
fn latest_run_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    for entry in fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();
        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("ingest_run_") && name.ends_with(".json"));
        if is_run_manifest && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }
    Ok(latest)
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to run count query: {sql}"))?;
    Ok(count)
}
