use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info};

use super::fingerprint::{FINGERPRINT_COLUMN, ROW_INDEX_COLUMN, fingerprint_row};

pub fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_exists(connection: &Connection, table: &str) -> Result<bool> {
    let count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to look up table {table}"))?;
    Ok(count > 0)
}

pub fn table_columns(connection: &Connection, table: &str) -> Result<Vec<String>> {
    let pragma_sql = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut statement = connection
        .prepare(&pragma_sql)
        .with_context(|| format!("failed to inspect schema for table {table}"))?;

    let mut columns = Vec::new();
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

/// Adds `column` with `sql_type` unless a column of that name (compared
/// case-insensitively, as SQLite does) already exists. Returns whether the
/// column was added.
pub fn ensure_column_exists(
    connection: &Connection,
    table: &str,
    column: &str,
    sql_type: &str,
) -> Result<bool> {
    let exists = table_columns(connection, table)?
        .iter()
        .any(|existing| existing.eq_ignore_ascii_case(column));
    if exists {
        return Ok(false);
    }

    let alter_sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {sql_type}",
        quote_identifier(table),
        quote_identifier(column)
    );
    connection
        .execute(&alter_sql, [])
        .with_context(|| format!("failed to add column {column} on {table}"))?;

    Ok(true)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableChange {
    pub created: bool,
    pub columns_added: Vec<String>,
}

/// Creates the target with every column as TEXT (plus the fingerprint column)
/// when it is missing, otherwise adds whichever columns it lacks.
pub fn ensure_table(
    connection: &Connection,
    table: &str,
    columns: &[String],
    with_row_index: bool,
) -> Result<TableChange> {
    if !table_exists(connection, table)? {
        let mut definitions: Vec<String> = columns
            .iter()
            .map(|column| format!("{} TEXT", quote_identifier(column)))
            .collect();
        definitions.push(format!("{} TEXT", quote_identifier(FINGERPRINT_COLUMN)));
        if with_row_index {
            definitions.push(format!("{} INTEGER", quote_identifier(ROW_INDEX_COLUMN)));
        }

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(table),
            definitions.join(", ")
        );
        connection
            .execute(&create_sql, [])
            .with_context(|| format!("failed to create table {table}"))?;
        info!(table, columns = columns.len(), "created target table");

        return Ok(TableChange {
            created: true,
            columns_added: Vec::new(),
        });
    }

    let existing: HashSet<String> = table_columns(connection, table)?
        .into_iter()
        .map(|column| column.to_ascii_lowercase())
        .collect();

    let mut change = TableChange::default();
    for column in columns {
        if existing.contains(&column.to_ascii_lowercase()) {
            continue;
        }
        ensure_column_exists(connection, table, column, "TEXT")?;
        change.columns_added.push(column.clone());
    }
    if with_row_index {
        ensure_column_exists(connection, table, ROW_INDEX_COLUMN, "INTEGER")?;
    }

    if !change.columns_added.is_empty() {
        info!(table, added = ?change.columns_added, "added columns to target table");
    }
    Ok(change)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerprintChange {
    pub added: bool,
    pub backfilled: usize,
}

/// Makes sure the target carries a uniquely indexed fingerprint column. When
/// the column has to be added to a populated table, the existing rows are
/// fingerprinted so that they take part in deduplication; among existing rows
/// with equal content only the first keeps the fingerprint.
pub fn ensure_fingerprint_column(connection: &Connection, table: &str) -> Result<FingerprintChange> {
    let added = ensure_column_exists(connection, table, FINGERPRINT_COLUMN, "TEXT")?;
    let backfilled = if added {
        backfill_fingerprints(connection, table)?
    } else {
        0
    };

    let index_sql = format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_identifier(&format!("{table}_{FINGERPRINT_COLUMN}_key")),
        quote_identifier(table),
        quote_identifier(FINGERPRINT_COLUMN)
    );
    connection
        .execute(&index_sql, [])
        .with_context(|| format!("failed to create fingerprint index on {table}"))?;

    Ok(FingerprintChange { added, backfilled })
}

fn backfill_fingerprints(connection: &Connection, table: &str) -> Result<usize> {
    let select_sql = format!("SELECT rowid, * FROM {}", quote_identifier(table));
    let mut statement = connection
        .prepare(&select_sql)
        .with_context(|| format!("failed to read existing rows of {table}"))?;
    let column_names: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(ToOwned::to_owned)
        .collect();

    let mut fingerprints: Vec<(i64, String)> = Vec::new();
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let rowid: i64 = row.get(0)?;
        let mut values = Vec::with_capacity(column_names.len() - 1);
        for index in 1..column_names.len() {
            values.push(value_text(row.get_ref(index)?));
        }
        let fingerprint = fingerprint_row(
            column_names[1..]
                .iter()
                .zip(&values)
                .map(|(column, value)| (column.as_str(), value.as_deref())),
        );
        fingerprints.push((rowid, fingerprint));
    }

    let update_sql = format!(
        "UPDATE {} SET {} = ?1 WHERE rowid = ?2",
        quote_identifier(table),
        quote_identifier(FINGERPRINT_COLUMN)
    );
    let mut update = connection.prepare(&update_sql)?;
    let mut seen = HashSet::new();
    let mut backfilled = 0;
    for (rowid, fingerprint) in fingerprints {
        if !seen.insert(fingerprint.clone()) {
            continue;
        }
        update
            .execute(params![fingerprint, rowid])
            .with_context(|| format!("failed to backfill fingerprint on {table}"))?;
        backfilled += 1;
    }

    debug!(table, backfilled, "fingerprints backfilled");
    Ok(backfilled)
}

/// Text form of a stored value, matching how loaded cells are rendered.
fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            Some((value as i64).to_string())
        }
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}
