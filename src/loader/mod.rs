//! Idempotent appends into SQLite.
//!
//! Each row is identified by a content fingerprint stored in a uniquely
//! indexed column of the target table. Schema changes, the fingerprint read
//! and the inserts for one target run in a single immediate transaction, so
//! a failure leaves the target untouched and concurrent loaders serialize on
//! the database write lock.

use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, TransactionBehavior, params_from_iter};
use serde::Serialize;
use tracing::info;

use crate::unify::UnifiedTable;

pub mod fingerprint;
pub mod schema;

pub use fingerprint::{FINGERPRINT_COLUMN, ROW_INDEX_COLUMN, fingerprint_row};
pub use schema::{configure_connection, quote_identifier};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub with_row_index: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub rows_seen: usize,
    pub duplicates_existing: usize,
    pub duplicates_in_batch: usize,
    pub inserted: usize,
    pub table_created: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns_added: Vec<String>,
    pub fingerprint_column_added: bool,
    pub fingerprints_backfilled: usize,
}

impl LoadReport {
    pub fn duplicates(&self) -> usize {
        self.duplicates_existing + self.duplicates_in_batch
    }
}

pub fn load_table(
    connection: &mut Connection,
    target: &str,
    table: &UnifiedTable,
    options: LoadOptions,
) -> Result<LoadReport> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .with_context(|| format!("failed to start load transaction for {target}"))?;

    // Incoming columns that collide with the loader's own bookkeeping columns
    // are not stored.
    let data_columns: Vec<(usize, &str)> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| {
            !column.eq_ignore_ascii_case(FINGERPRINT_COLUMN)
                && !column.eq_ignore_ascii_case(ROW_INDEX_COLUMN)
        })
        .map(|(index, column)| (index, column.as_str()))
        .collect();
    let column_names: Vec<String> = data_columns
        .iter()
        .map(|(_, column)| column.to_string())
        .collect();

    let table_change = schema::ensure_table(&tx, target, &column_names, options.with_row_index)?;
    let fingerprint_change = schema::ensure_fingerprint_column(&tx, target)?;
    let existing = existing_fingerprints(&tx, target)?;

    let mut insert_columns: Vec<String> = column_names
        .iter()
        .map(|column| quote_identifier(column))
        .collect();
    insert_columns.push(quote_identifier(FINGERPRINT_COLUMN));
    if options.with_row_index {
        insert_columns.push(quote_identifier(ROW_INDEX_COLUMN));
    }
    let placeholders = (1..=insert_columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_identifier(target),
        insert_columns.join(", ")
    );

    let mut report = LoadReport {
        table: target.to_string(),
        rows_seen: table.len(),
        table_created: table_change.created,
        columns_added: table_change.columns_added,
        fingerprint_column_added: fingerprint_change.added,
        fingerprints_backfilled: fingerprint_change.backfilled,
        ..LoadReport::default()
    };

    {
        let mut statement = tx
            .prepare(&insert_sql)
            .with_context(|| format!("failed to prepare insert into {target}"))?;
        let mut batch: HashSet<String> = HashSet::new();

        for (row_index, row) in table.rows.iter().enumerate() {
            let fingerprint = fingerprint_row(
                data_columns
                    .iter()
                    .map(|&(index, column)| (column, row[index].as_deref())),
            );

            if existing.contains(&fingerprint) {
                report.duplicates_existing += 1;
                continue;
            }
            if batch.contains(&fingerprint) {
                report.duplicates_in_batch += 1;
                continue;
            }

            let mut values: Vec<Value> = data_columns
                .iter()
                .map(|&(index, _)| match &row[index] {
                    Some(value) => Value::Text(value.clone()),
                    None => Value::Null,
                })
                .collect();
            values.push(Value::Text(fingerprint.clone()));
            if options.with_row_index {
                values.push(Value::Integer(row_index as i64));
            }

            statement
                .execute(params_from_iter(values))
                .with_context(|| format!("failed to insert row {row_index} into {target}"))?;
            batch.insert(fingerprint);
            report.inserted += 1;
        }
    }

    tx.commit()
        .with_context(|| format!("failed to commit load into {target}"))?;

    info!(
        table = target,
        seen = report.rows_seen,
        duplicates = report.duplicates(),
        inserted = report.inserted,
        "load completed"
    );

    Ok(report)
}

fn existing_fingerprints(connection: &Connection, table: &str) -> Result<HashSet<String>> {
    let select_sql = format!(
        "SELECT {column} FROM {} WHERE {column} IS NOT NULL",
        quote_identifier(table),
        column = quote_identifier(FINGERPRINT_COLUMN)
    );
    let mut statement = connection
        .prepare(&select_sql)
        .with_context(|| format!("failed to read fingerprints of {table}"))?;

    let fingerprints = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()
        .with_context(|| format!("failed to read fingerprints of {table}"))?;
    Ok(fingerprints)
}

#[cfg(test)]
mod tests;
