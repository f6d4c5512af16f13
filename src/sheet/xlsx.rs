use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx, XlsxError, open_workbook};
use chrono::NaiveTime;
use tracing::debug;

use crate::error::FileError;
use crate::sheet::{CellValue, MergedRegion, RawSheet};

type Workbook = Xlsx<BufReader<File>>;

/// Reads every worksheet of a workbook, in workbook order, together with its
/// merged-cell regions.
pub fn read_workbook(path: &Path) -> Result<Vec<RawSheet>, FileError> {
    let mut workbook = open(path)?;
    workbook
        .load_merged_regions()
        .map_err(|source| workbook_error(path, source))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let merged = merged_regions(&workbook, &name);
        let declared = declared_height(&mut workbook, &name, path)?;
        let range = workbook
            .worksheet_range(&name)
            .map_err(|source| workbook_error(path, source))?;
        let sheet = sheet_from_range(&name, &range)
            .with_merged_regions(merged)
            .with_declared_height(declared);
        debug!(
            sheet = %sheet.name,
            rows = sheet.height(),
            declared_rows = declared,
            columns = sheet.width(),
            merged = sheet.merged_regions().len(),
            "worksheet read"
        );
        sheets.push(sheet);
    }

    Ok(sheets)
}

/// Reads only the first worksheet. Merged regions are not loaded; fixed-form
/// templates address the anchor cells directly. The declared extent is kept
/// because template layouts are told apart by it.
pub fn read_first_sheet(path: &Path) -> Result<RawSheet, FileError> {
    let mut workbook = open(path)?;
    let Some(name) = workbook.sheet_names().into_iter().next() else {
        return Err(FileError::Structural {
            path: path.to_path_buf(),
        });
    };
    let declared = declared_height(&mut workbook, &name, path)?;
    let range = workbook
        .worksheet_range(&name)
        .map_err(|source| workbook_error(path, source))?;
    Ok(sheet_from_range(&name, &range).with_declared_height(declared))
}

fn open(path: &Path) -> Result<Workbook, FileError> {
    open_workbook::<Workbook, _>(path).map_err(|source| workbook_error(path, source))
}

fn workbook_error(path: &Path, source: XlsxError) -> FileError {
    FileError::Workbook {
        path: path.to_path_buf(),
        source,
    }
}

// Rows named by the worksheet's `<dimension ref>`. Excel counts formatted
// blank cells there; calamine's value range does not. A sheet without the
// element reports 0.
fn declared_height(workbook: &mut Workbook, sheet: &str, path: &Path) -> Result<usize, FileError> {
    let reader = workbook
        .worksheet_cells_reader(sheet)
        .map_err(|source| workbook_error(path, source))?;
    let dimensions = reader.dimensions();
    if dimensions.start == (0, 0) && dimensions.end == (0, 0) {
        return Ok(0);
    }
    Ok(dimensions.end.0 as usize + 1)
}

fn merged_regions(workbook: &Workbook, sheet: &str) -> Vec<MergedRegion> {
    workbook
        .merged_regions_by_sheet(sheet)
        .into_iter()
        .map(|(_, _, dimensions)| MergedRegion {
            min_row: dimensions.start.0 as usize,
            min_col: dimensions.start.1 as usize,
            max_row: dimensions.end.0 as usize,
            max_col: dimensions.end.1 as usize,
        })
        .collect()
}

// calamine ranges start at the first used cell; the sheet grid is anchored at
// A1 so that row and column numbers keep their worksheet meaning.
fn sheet_from_range(name: &str, range: &Range<Data>) -> RawSheet {
    let mut sheet = RawSheet::new(name);
    let (Some((start_row, start_col)), Some((end_row, end_col))) = (range.start(), range.end())
    else {
        return sheet;
    };

    sheet.ensure_extent(end_row as usize + 1, end_col as usize + 1);
    for (row, col, data) in range.used_cells() {
        sheet.set(
            start_row as usize + row,
            start_col as usize + col,
            cell_value(data),
        );
    }
    sheet
}

pub(crate) fn cell_value(data: &Data) -> Option<CellValue> {
    match data {
        Data::String(value) => Some(CellValue::Text(value.clone())),
        Data::Int(value) => Some(CellValue::Int(*value)),
        Data::Float(value) => Some(CellValue::Float(*value)),
        Data::Bool(value) => Some(CellValue::Bool(*value)),
        Data::DateTime(value) => value.as_datetime().map(|datetime| {
            if datetime.time() == NaiveTime::MIN {
                CellValue::Date(datetime.date())
            } else {
                CellValue::DateTime(datetime)
            }
        }),
        Data::DateTimeIso(value) | Data::DurationIso(value) => {
            Some(CellValue::Text(value.clone()))
        }
        // Error cells such as #N/A carry no usable value.
        _ => None,
    }
}
