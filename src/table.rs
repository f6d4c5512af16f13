use std::collections::HashSet;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub const SOURCE_COLUMN: &str = "source";
pub const LEVEL_COLUMN: &str = "level";
pub const ORIGIN_COLUMN: &str = "origin";
pub const SHEET_NAME_COLUMN: &str = "sheet_name";
pub const TABLE_BLOCK_COLUMN: &str = "table_block";

pub const PROVENANCE_COLUMNS: [&str; 3] = [SOURCE_COLUMN, ORIGIN_COLUMN, LEVEL_COLUMN];

pub type Row = Vec<Option<String>>;

/// Where a row came from: the file path, the ingestion channel, and the
/// confidentiality tag of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub origin: String,
    pub level: String,
}

/// A named rectangular table with unique column names, compared ignoring ASCII
/// case as SQLite compares identifiers. Every row has exactly one slot per
/// column; `None` marks an absent value.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalTable {
    pub name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl LogicalTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.to_ascii_lowercase()) {
                bail!("duplicate column name: {column}");
            }
        }

        Ok(Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        })
    }

    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "row has {} values but table {} has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    /// Sets `column` to `value` on every row, appending the column when the
    /// table has no column of that name in any letter case.
    pub fn set_constant_column(&mut self, column: &str, value: &str) {
        match self
            .columns
            .iter()
            .position(|existing| existing.eq_ignore_ascii_case(column))
        {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = Some(value.to_string());
                }
            }
            None => {
                self.columns.push(column.to_string());
                for row in &mut self.rows {
                    row.push(Some(value.to_string()));
                }
            }
        }
    }

    pub fn attach_provenance(&mut self, provenance: &Provenance, sheet_name: Option<&str>) {
        if let Some(sheet_name) = sheet_name {
            self.set_constant_column(SHEET_NAME_COLUMN, sheet_name);
        }
        self.set_constant_column(SOURCE_COLUMN, &provenance.source);
        self.set_constant_column(LEVEL_COLUMN, &provenance.level);
        self.set_constant_column(ORIGIN_COLUMN, &provenance.origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance {
            source: "/data/a.csv".to_string(),
            origin: "s3_bucket".to_string(),
            level: "2".to_string(),
        }
    }

    #[test]
    fn new_rejects_duplicate_columns() {
        let result = LogicalTable::new("t", vec!["a".to_string(), "a".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn new_rejects_columns_differing_only_in_case() {
        let result = LogicalTable::new("t", vec!["Name".to_string(), "name".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn constant_columns_reuse_a_differently_cased_column() {
        let mut table = LogicalTable::new("t", vec!["Source".to_string()])
            .expect("table should build");
        table
            .push_row(vec![Some("scanner".to_string())])
            .expect("row should insert");

        table.set_constant_column("source", "/data/a.csv");

        assert_eq!(table.columns(), &["Source"]);
        assert_eq!(table.value(0, "Source"), Some("/data/a.csv"));
    }

    #[test]
    fn push_row_enforces_header_width() {
        let mut table = LogicalTable::new("t", vec!["a".to_string(), "b".to_string()])
            .expect("table should build");
        assert!(table.push_row(vec![Some("1".to_string())]).is_err());
        table
            .push_row(vec![Some("1".to_string()), None])
            .expect("full-width row should be accepted");
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "a"), Some("1"));
        assert_eq!(table.value(0, "b"), None);
    }

    #[test]
    fn attach_provenance_appends_and_overwrites() {
        let mut table = LogicalTable::new("t", vec!["id".to_string(), "source".to_string()])
            .expect("table should build");
        table
            .push_row(vec![Some("1".to_string()), Some("stale".to_string())])
            .expect("row should insert");

        table.attach_provenance(&provenance(), Some("Sheet1"));

        assert_eq!(
            table.columns(),
            &["id", "source", "sheet_name", "level", "origin"]
        );
        assert_eq!(table.value(0, "source"), Some("/data/a.csv"));
        assert_eq!(table.value(0, "sheet_name"), Some("Sheet1"));
        assert_eq!(table.value(0, "origin"), Some("s3_bucket"));
    }
}
