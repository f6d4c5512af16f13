use std::error::Error as _;
use std::path::Path;

use tracing::{debug, warn};

use crate::classify::{Route, SourceFile};
use crate::cli::IngestMode;
use crate::config::DatasetJob;
use crate::error::FileError;
use crate::model::{FileOutcome, TableSummary};
use crate::normalize::{
    NormalizedSheet, SheetReport, TableNamer, normalize_sheet, normalize_with_leading_header,
    split_by_anchor,
};
use crate::sheet::RawSheet;
use crate::sheet::delimited::{CsvOptions, PartitionedCsvReader, file_stem, read_csv_sheet};
use crate::sheet::xlsx::read_workbook;
use crate::table::{LogicalTable, Provenance};
use crate::template::{ExtractionReport, extract_file};

/// Everything a worker needs to turn one file into tables. Shared read-only
/// across the worker pool.
pub(super) struct JobContext<'a> {
    pub job: &'a DatasetJob,
    pub csv: CsvOptions,
    pub namer: &'a TableNamer,
}

pub(super) struct ProcessedFile {
    pub outcome: FileOutcome,
    pub tables: Vec<LogicalTable>,
}

#[derive(Default)]
struct Extracted {
    encoding: Option<String>,
    sheets: Vec<SheetReport>,
    extraction: Option<ExtractionReport>,
    tables: Vec<LogicalTable>,
}

impl Extracted {
    fn absorb(&mut self, normalized: NormalizedSheet, provenance: &Provenance, sheet: Option<&str>) {
        self.sheets.push(normalized.report);
        for mut table in normalized.tables {
            table.attach_provenance(provenance, sheet);
            self.tables.push(table);
        }
    }
}

/// Never fails: a per-file error is logged and recorded on the outcome, and
/// the file contributes no tables.
pub(super) fn process_file(ctx: &JobContext<'_>, file: &SourceFile) -> ProcessedFile {
    let mut outcome = FileOutcome {
        path: file.path.display().to_string(),
        route: file.route.as_str().to_string(),
        ..FileOutcome::default()
    };

    match extract_tables(ctx, file) {
        Ok(extracted) => {
            debug!(
                path = %file.path.display(),
                tables = extracted.tables.len(),
                "file processed"
            );
            outcome.encoding = extracted.encoding;
            outcome.sheets = extracted.sheets;
            outcome.extraction = extracted.extraction;
            outcome.tables = extracted
                .tables
                .iter()
                .map(|table| TableSummary {
                    name: table.name.clone(),
                    rows: table.len(),
                    columns: table.columns().len(),
                })
                .collect();
            ProcessedFile {
                outcome,
                tables: extracted.tables,
            }
        }
        Err(err) => {
            let message = render_chain(&err);
            warn!(
                path = %file.path.display(),
                class = err.class(),
                error = %message,
                "file skipped"
            );
            outcome.failure_class = Some(err.class().to_string());
            outcome.failure = Some(message);
            ProcessedFile {
                outcome,
                tables: Vec::new(),
            }
        }
    }
}

fn extract_tables(ctx: &JobContext<'_>, file: &SourceFile) -> Result<Extracted, FileError> {
    let path = file.path.as_path();
    let provenance = ctx.job.provenance_for(path);
    let stem = file_stem(path);
    let mode = ctx.job.mode;
    let mut extracted = Extracted::default();

    match (file.route, mode) {
        (Route::Unsupported, _)
        | (Route::WholeCsv | Route::PartitionedCsv, IngestMode::Template) => {
            return Err(FileError::Unsupported {
                path: path.to_path_buf(),
            });
        }
        (Route::Workbook, IngestMode::Template) => {
            let record = extract_file(path)?;
            extracted.extraction = Some(record.report.clone());
            let mut table = record
                .into_table(&ctx.namer.name(&stem, None))
                .map_err(|err| FileError::shape(path, err))?;
            table.attach_provenance(&provenance, None);
            extracted.tables.push(table);
        }
        (Route::WholeCsv, _) => {
            let (sheet, encoding) = read_csv_sheet(path, &ctx.csv)?;
            extracted.encoding = Some(encoding.name().to_string());
            let name = ctx.namer.name(&stem, None);
            // Same header policy as the partitioned route.
            let normalized = match mode {
                IngestMode::Ledger => split_or_normalize(ctx, sheet, &name, path)?,
                IngestMode::Normalize | IngestMode::Template => {
                    normalize_with_leading_header(sheet, &name)
                        .map_err(|err| FileError::shape(path, err))?
                }
            };
            extracted.absorb(normalized, &provenance, None);
        }
        (Route::PartitionedCsv, _) => {
            let mut reader = PartitionedCsvReader::open(path, &ctx.csv)?;
            extracted.encoding = Some(reader.encoding().name().to_string());
            while let Some(partition) = reader.next_partition()? {
                let name = ctx.namer.name(&partition.name, None);
                let normalized = normalize_with_leading_header(partition, &name)
                    .map_err(|err| FileError::shape(path, err))?;
                extracted.absorb(normalized, &provenance, None);
            }
        }
        (Route::Workbook, _) => {
            for sheet in read_workbook(path)? {
                if mode == IngestMode::Ledger
                    && ctx
                        .job
                        .ledger_sheet
                        .as_deref()
                        .is_some_and(|wanted| wanted != sheet.name)
                {
                    continue;
                }
                let sheet_name = sheet.name.clone();
                let name = ctx.namer.name(&stem, Some(&sheet_name));
                let normalized = split_or_normalize(ctx, sheet, &name, path)?;
                extracted.absorb(normalized, &provenance, Some(&sheet_name));
            }
        }
    }

    if extracted.tables.is_empty() {
        return Err(FileError::Structural {
            path: path.to_path_buf(),
        });
    }
    Ok(extracted)
}

fn split_or_normalize(
    ctx: &JobContext<'_>,
    sheet: RawSheet,
    name: &str,
    path: &Path,
) -> Result<NormalizedSheet, FileError> {
    let normalized = match ctx.job.mode {
        IngestMode::Ledger => {
            split_by_anchor(sheet, ctx.job.ledger_key.as_deref().unwrap_or_default(), name)
        }
        IngestMode::Normalize | IngestMode::Template => normalize_sheet(sheet, name),
    };
    normalized.map_err(|err| FileError::shape(path, err))
}

fn render_chain(err: &FileError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
