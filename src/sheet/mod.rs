//! Raw sheet model shared by the CSV and workbook readers.
//!
//! A [`RawSheet`] is the grid exactly as read from one worksheet or one CSV
//! file, before any structural inference happens. Coordinates are 0-based.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

pub mod delimited;
pub mod xlsx;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(text) if text.trim().is_empty())
    }

    /// Trimmed text form used for every stored value.
    pub fn to_text(&self) -> String {
        self.to_string().trim().to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(text) => f.write_str(text),
            CellValue::Int(value) => write!(f, "{value}"),
            // Workbooks store every number as a double; integral values print
            // the way the same number reads in a CSV export.
            CellValue::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            CellValue::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Inclusive rectangle of cells that share the value of the top-left anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRegion {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    cells: Vec<Vec<Option<CellValue>>>,
    width: usize,
    merged: Vec<MergedRegion>,
    declared_height: usize,
}

impl RawSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: Vec::new(),
            width: 0,
            merged: Vec::new(),
            declared_height: 0,
        }
    }

    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Option<CellValue>>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let cells = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();

        Self {
            name: name.into(),
            cells,
            width,
            merged: Vec::new(),
            declared_height: 0,
        }
    }

    pub fn from_text_rows(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|value| Some(CellValue::Text(value)))
                    .collect()
            })
            .collect();
        Self::from_rows(name, rows)
    }

    pub fn with_merged_regions(mut self, regions: Vec<MergedRegion>) -> Self {
        self.merged = regions;
        self
    }

    /// Records the row count the source claims for itself, such as a
    /// worksheet's `<dimension>` reference. Formatted but empty rows count
    /// there while the cell grid stops at the last value.
    pub fn with_declared_height(mut self, rows: usize) -> Self {
        self.declared_height = rows;
        self
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    /// Rows the sheet spans, taking the larger of the value grid and the
    /// declared extent.
    pub fn row_extent(&self) -> usize {
        self.height().max(self.declared_height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn merged_regions(&self) -> &[MergedRegion] {
        &self.merged
    }

    /// Returns the value at `(row, col)` unless the cell is missing or blank.
    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.cells
            .get(row)?
            .get(col)?
            .as_ref()
            .filter(|value| !value.is_blank())
    }

    pub fn set(&mut self, row: usize, col: usize, value: Option<CellValue>) {
        self.ensure_extent(row + 1, col + 1);
        self.cells[row][col] = value;
    }

    /// Grows the grid with empty cells so it spans at least `height` rows and
    /// `width` columns.
    pub fn ensure_extent(&mut self, height: usize, width: usize) {
        if width > self.width {
            self.width = width;
            for existing in &mut self.cells {
                existing.resize(self.width, None);
            }
        }
        while self.cells.len() < height {
            self.cells.push(vec![None; self.width]);
        }
    }

    /// Copies each region's anchor value into every cell of the region and
    /// forgets the region afterwards. Regions whose anchor is empty are
    /// dropped untouched. Returns the number of regions flattened.
    pub fn flatten_merged_regions(&mut self) -> usize {
        let regions = std::mem::take(&mut self.merged);
        let mut flattened = 0;

        for region in regions {
            let Some(anchor) = self.get(region.min_row, region.min_col).cloned() else {
                continue;
            };
            for row in region.min_row..=region.max_row {
                for col in region.min_col..=region.max_col {
                    self.set(row, col, Some(anchor.clone()));
                }
            }
            flattened += 1;
        }

        flattened
    }

    /// Text grid with blank cells mapped to `None` and values trimmed.
    pub fn to_text_grid(&self) -> Vec<Vec<Option<String>>> {
        (0..self.height())
            .map(|row| {
                (0..self.width)
                    .map(|col| self.get(row, col).map(CellValue::to_text))
                    .collect()
            })
            .collect()
    }
}
