//! Positional extraction for fixed-form report workbooks.
//!
//! The layout is resolved once per file from the worksheet's row extent and
//! travels with the extracted record, so coverage can be audited per layout.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FileError;
use crate::sheet::{CellValue, RawSheet, xlsx};
use crate::table::LogicalTable;

pub mod layout;

use layout::{
    BASE_FIELDS, CASE_FIELDS, FieldSpec, LAYOUTS, LayoutSpec, TRIAD_COLUMNS, TRIAD_GROUPS,
    TRIAD_ROWS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutVariant {
    Standard,
    AnnualProject,
    Unrecognized,
}

impl LayoutVariant {
    pub fn resolve(row_extent: usize) -> Self {
        LAYOUTS
            .iter()
            .find(|layout| layout.row_extent == row_extent)
            .map(|layout| layout.variant)
            .unwrap_or(Self::Unrecognized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::AnnualProject => "annual_project",
            Self::Unrecognized => "unrecognized",
        }
    }

    fn spec(self) -> Option<&'static LayoutSpec> {
        LAYOUTS.iter().find(|layout| layout.variant == self)
    }
}

/// A named field read from one or more 1-based `(row, column)` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConfig {
    pub name: String,
    pub positions: Vec<(u32, u32)>,
}

impl From<&FieldSpec> for FieldConfig {
    fn from(spec: &FieldSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            positions: spec.coordinates.positions(),
        }
    }
}

/// Base fields followed by the variant's own fields, triads and case blocks.
pub fn fields_for(variant: LayoutVariant) -> Vec<FieldConfig> {
    let mut fields: Vec<FieldConfig> = BASE_FIELDS.iter().map(FieldConfig::from).collect();
    let Some(spec) = variant.spec() else {
        return fields;
    };

    fields.extend(spec.fields.iter().map(FieldConfig::from));

    for (group_index, group) in (0u32..).zip(TRIAD_GROUPS) {
        let first_row = spec.triads.first_row + group_index * TRIAD_ROWS;
        for (part, col_offset) in TRIAD_COLUMNS {
            fields.push(FieldConfig {
                name: format!("action_{group}_{part}"),
                positions: (first_row..first_row + TRIAD_ROWS)
                    .map(|row| (row, spec.triads.col + col_offset))
                    .collect(),
            });
        }
    }

    for case in 0..spec.cases.count {
        let origin_row = spec.cases.first_row + case * spec.cases.stride;
        for (suffix, row_offset, col_offset) in CASE_FIELDS {
            fields.push(FieldConfig {
                name: format!("case{}_{suffix}", case + 1),
                positions: vec![(origin_row + row_offset, spec.cases.col + col_offset)],
            });
        }
    }

    fields
}

/// Non-empty trimmed values joined by newlines; `None` when every cell is
/// empty.
pub fn extract_field(sheet: &RawSheet, field: &FieldConfig) -> Option<String> {
    let values: Vec<String> = field
        .positions
        .iter()
        .filter_map(|&(row, col)| cell_at(sheet, row, col))
        .map(CellValue::to_text)
        .filter(|value| !value.is_empty())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join("\n"))
    }
}

fn cell_at(sheet: &RawSheet, row: u32, col: u32) -> Option<&CellValue> {
    let row = (row as usize).checked_sub(1)?;
    let col = (col as usize).checked_sub(1)?;
    sheet.get(row, col)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionStats {
    pub found: usize,
    pub not_found: usize,
    pub total_fields: usize,
    pub success_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub layout: LayoutVariant,
    pub worksheet: String,
    /// `<rows>x<columns>` of the worksheet's used area.
    pub dimensions: String,
    pub low_confidence: bool,
    pub stats: ExtractionStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRecord {
    pub values: Vec<(String, Option<String>)>,
    pub report: ExtractionReport,
}

impl TemplateRecord {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// One-row table holding every field of the record.
    pub fn into_table(self, name: &str) -> Result<LogicalTable> {
        let (columns, row): (Vec<String>, Vec<Option<String>>) = self.values.into_iter().unzip();
        let mut table = LogicalTable::new(name, columns)?;
        table.push_row(row)?;
        Ok(table)
    }
}

pub fn extract_record(sheet: &RawSheet) -> TemplateRecord {
    let layout = LayoutVariant::resolve(sheet.row_extent());
    let fields = fields_for(layout);

    let values: Vec<(String, Option<String>)> = fields
        .iter()
        .map(|field| (field.name.clone(), extract_field(sheet, field)))
        .collect();

    let found = values.iter().filter(|(_, value)| value.is_some()).count();
    let total_fields = values.len();
    let stats = ExtractionStats {
        found,
        not_found: total_fields - found,
        total_fields,
        success_ratio: if total_fields == 0 {
            0.0
        } else {
            found as f64 / total_fields as f64
        },
    };

    let low_confidence = layout == LayoutVariant::Unrecognized;
    if low_confidence {
        warn!(
            worksheet = %sheet.name,
            rows = sheet.row_extent(),
            "unknown template row extent; extracting base fields only"
        );
    }
    debug!(
        worksheet = %sheet.name,
        layout = layout.as_str(),
        found = stats.found,
        total = stats.total_fields,
        "template fields extracted"
    );

    TemplateRecord {
        values,
        report: ExtractionReport {
            layout,
            worksheet: sheet.name.clone(),
            dimensions: format!("{}x{}", sheet.row_extent(), sheet.width()),
            low_confidence,
            stats,
        },
    }
}

pub fn extract_file(path: &Path) -> Result<TemplateRecord, FileError> {
    let sheet = xlsx::read_first_sheet(path)?;
    Ok(extract_record(&sheet))
}
