//! Structural recovery of tables from free-form sheets.
//!
//! Two policies live here. [`normalize_sheet`] treats a sheet as one table
//! whose header is the widest row. [`split_by_anchor`] handles ledgers that
//! stack several tables in one sheet, each introduced by a header row that
//! carries a known key label. Both record the choices they made in a
//! [`SheetReport`] so that misfires can be reviewed from the run manifest.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::sheet::RawSheet;
use crate::table::{LogicalTable, Row, TABLE_BLOCK_COLUMN};

/// A grid with all-empty rows and columns removed. `source_rows` and
/// `source_columns` map every kept position back to the input grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrimmedGrid {
    pub rows: Vec<Row>,
    pub source_rows: Vec<usize>,
    pub source_columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSpan {
    pub index: usize,
    /// 1-based sheet row numbers.
    pub header_row: usize,
    pub last_row: usize,
    /// 1-based sheet column number of the anchor cell.
    pub anchor_column: usize,
    pub data_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetReport {
    pub sheet: String,
    pub merged_regions_flattened: usize,
    /// 1-based sheet row number of the chosen header, single-table mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockSpan>,
    #[serde(skip_serializing_if = "is_zero")]
    pub blocks_discarded: usize,
    pub rows: usize,
    pub columns: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

#[derive(Debug, Clone)]
pub struct NormalizedSheet {
    pub tables: Vec<LogicalTable>,
    pub report: SheetReport,
}

pub fn trim_empty(grid: &[Row]) -> TrimmedGrid {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let source_columns: Vec<usize> = (0..width)
        .filter(|&col| grid.iter().any(|row| row.get(col).is_some_and(is_filled)))
        .collect();

    let mut trimmed = TrimmedGrid {
        source_columns,
        ..TrimmedGrid::default()
    };
    for (index, row) in grid.iter().enumerate() {
        if !row.iter().any(is_filled) {
            continue;
        }
        trimmed.rows.push(
            trimmed
                .source_columns
                .iter()
                .map(|&col| row.get(col).cloned().flatten())
                .collect(),
        );
        trimmed.source_rows.push(index);
    }
    trimmed
}

/// Index of the row with the most non-empty cells; the first such row wins a
/// tie. `None` when every row is empty.
pub fn detect_header_row(rows: &[Row]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, row) in rows.iter().enumerate() {
        let filled = row.iter().filter(|cell| is_filled(cell)).count();
        if filled > 0 && best.is_none_or(|(_, count)| filled > count) {
            best = Some((index, filled));
        }
    }
    best.map(|(index, _)| index)
}

/// Appends `_1`, `_2`, ... to repeated labels in first-seen order, skipping
/// any suffix that would collide with a label already taken. Labels that
/// differ only in ASCII case count as repeats, since SQLite would reject them
/// as one column name.
pub fn dedupe_column_names(labels: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(labels.len());
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(labels.len());

    for label in labels {
        let key = label.to_ascii_lowercase();
        let name = if taken.contains(&key) {
            let suffix = next_suffix.entry(key).or_insert(1);
            loop {
                let candidate = format!("{label}_{suffix}");
                *suffix += 1;
                if !taken.contains(&candidate.to_ascii_lowercase()) {
                    break candidate;
                }
            }
        } else {
            label
        };
        taken.insert(name.to_ascii_lowercase());
        names.push(name);
    }

    names
}

/// Builds `<file stem>_<sheet>` names, lower-cased, with runs of
/// non-word characters collapsed to `_`.
#[derive(Debug, Clone)]
pub struct TableNamer {
    separators: Regex,
}

impl TableNamer {
    pub fn new() -> Result<Self> {
        let separators =
            Regex::new(r"[^\w]+").context("failed to compile table name separator regex")?;
        Ok(Self { separators })
    }

    pub fn name(&self, stem: &str, sheet: Option<&str>) -> String {
        let raw = match sheet {
            Some(sheet) => format!("{stem}_{sheet}"),
            None => stem.to_string(),
        };
        self.separators
            .replace_all(raw.trim(), "_")
            .trim_matches('_')
            .to_lowercase()
    }
}

/// Single-table policy: flatten merged regions, trim, take the widest row as
/// the header and every later non-empty row as data. Columns with no data
/// below the header are dropped. Yields no table when nothing usable remains.
pub fn normalize_sheet(mut sheet: RawSheet, table_name: &str) -> Result<NormalizedSheet> {
    let flattened = sheet.flatten_merged_regions();
    let trimmed = trim_empty(&sheet.to_text_grid());
    let header = detect_header_row(&trimmed.rows);

    let table = match header {
        Some(header) => table_below_header(table_name, &trimmed.rows, header)?,
        None => None,
    };
    debug!(sheet = %sheet.name, header_row = ?header, "header row selected");

    Ok(finish(
        &sheet.name,
        flattened,
        header.map(|index| trimmed.source_rows[index] + 1),
        Vec::new(),
        0,
        table.into_iter().collect(),
    ))
}

/// Header policy for delimited files: the first non-empty row is the header,
/// whatever its width, and every later non-empty row is data. Whole and
/// partitioned CSVs both go through here so a file keeps its columns when it
/// crosses the partition threshold.
pub fn normalize_with_leading_header(sheet: RawSheet, table_name: &str) -> Result<NormalizedSheet> {
    let trimmed = trim_empty(&sheet.to_text_grid());
    let header = (!trimmed.rows.is_empty()).then_some(0);

    let table = match header {
        Some(header) => table_below_header(table_name, &trimmed.rows, header)?,
        None => None,
    };

    Ok(finish(
        &sheet.name,
        0,
        header.map(|index| trimmed.source_rows[index] + 1),
        Vec::new(),
        0,
        table.into_iter().collect(),
    ))
}

/// Multi-table policy for stacked ledgers. A row with a cell containing `key`
/// opens a block and fixes that cell's column as the anchor; the block runs
/// until the anchor cell is empty. Each block with data becomes its own table
/// carrying a zero-based `table_block` index. Unlabeled columns are dropped.
pub fn split_by_anchor(mut sheet: RawSheet, key: &str, table_name: &str) -> Result<NormalizedSheet> {
    let flattened = sheet.flatten_merged_regions();
    let trimmed = trim_empty(&sheet.to_text_grid());
    let rows = &trimmed.rows;

    let mut tables = Vec::new();
    let mut spans = Vec::new();
    let mut discarded = 0;
    let mut index = 0;

    while index < rows.len() {
        let Some(anchor) = rows[index]
            .iter()
            .position(|cell| cell.as_deref().is_some_and(|value| value.contains(key)))
        else {
            index += 1;
            continue;
        };

        let mut end = index + 1;
        while end < rows.len() && is_filled(&rows[end][anchor]) {
            end += 1;
        }

        let body = &rows[index + 1..end];
        if body.is_empty() {
            discarded += 1;
            index = end;
            continue;
        }

        let block_index = tables.len();
        let header = &rows[index];
        let kept: Vec<usize> = (0..header.len())
            .filter(|&col| is_filled(&header[col]))
            .collect();
        let labels = dedupe_column_names(
            kept.iter()
                .map(|&col| header[col].clone().unwrap_or_default())
                .collect(),
        );

        let mut table = LogicalTable::new(format!("{table_name}_block{block_index}"), labels)?;
        for row in body {
            table.push_row(kept.iter().map(|&col| row[col].clone()).collect())?;
        }
        table.set_constant_column(TABLE_BLOCK_COLUMN, &block_index.to_string());

        spans.push(BlockSpan {
            index: block_index,
            header_row: trimmed.source_rows[index] + 1,
            last_row: trimmed.source_rows[end - 1] + 1,
            anchor_column: trimmed.source_columns[anchor] + 1,
            data_rows: body.len(),
        });
        tables.push(table);
        index = end;
    }

    debug!(
        sheet = %sheet.name,
        blocks = tables.len(),
        discarded,
        "anchor blocks located"
    );

    Ok(finish(&sheet.name, flattened, None, spans, discarded, tables))
}

fn table_below_header(name: &str, rows: &[Row], header: usize) -> Result<Option<LogicalTable>> {
    let labels: Vec<String> = rows[header]
        .iter()
        .enumerate()
        .map(|(col, cell)| match cell {
            Some(label) if !label.trim().is_empty() => label.trim().to_string(),
            _ => format!("column{}", col + 1),
        })
        .collect();
    let labels = dedupe_column_names(labels);

    let body: Vec<&Row> = rows[header + 1..]
        .iter()
        .filter(|row| row.iter().any(is_filled))
        .collect();
    let kept: Vec<usize> = (0..labels.len())
        .filter(|&col| body.iter().any(|row| is_filled(&row[col])))
        .collect();
    if body.is_empty() || kept.is_empty() {
        return Ok(None);
    }

    let mut table = LogicalTable::new(
        name,
        kept.iter().map(|&col| labels[col].clone()).collect(),
    )?;
    for row in body {
        let values: Row = kept.iter().map(|&col| row[col].clone()).collect();
        if values.iter().any(is_filled) {
            table.push_row(values)?;
        }
    }
    Ok(Some(table))
}

fn finish(
    sheet: &str,
    merged_regions_flattened: usize,
    header_row: Option<usize>,
    blocks: Vec<BlockSpan>,
    blocks_discarded: usize,
    tables: Vec<LogicalTable>,
) -> NormalizedSheet {
    let rows = tables.iter().map(LogicalTable::len).sum();
    let columns = tables
        .iter()
        .map(|table| table.columns().len())
        .max()
        .unwrap_or(0);

    NormalizedSheet {
        report: SheetReport {
            sheet: sheet.to_string(),
            merged_regions_flattened,
            header_row,
            blocks,
            blocks_discarded,
            rows,
            columns,
        },
        tables,
    }
}

fn is_filled(cell: &Option<String>) -> bool {
    cell.as_deref().is_some_and(|value| !value.trim().is_empty())
}
