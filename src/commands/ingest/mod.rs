use anyhow::{Context, Result};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::classify::FileClassifier;
use crate::cli::IngestArgs;
use crate::config::{DatasetJob, load_job_file};
use crate::loader::{LoadOptions, configure_connection, load_table};
use crate::model::{IngestPaths, IngestRunManifest, JobOutcome};
use crate::normalize::TableNamer;
use crate::unify::unify;
use crate::util::{RunStamp, command_line, ensure_parent_dir, now_utc_string, write_json_pretty};

mod pipeline;

use pipeline::{JobContext, ProcessedFile, process_file};

pub fn run(args: IngestArgs) -> Result<()> {
    let stamp = RunStamp::now();
    let run_id = stamp.run_id();
    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| stamp.manifest_path(&args.work_root));
    let db_path = args.resolved_db_path();

    let jobs = match &args.job_file {
        Some(path) => load_job_file(path)?,
        None => vec![DatasetJob::from_args(&args)?],
    };

    info!(
        work_root = %args.work_root.display(),
        run_id = %run_id,
        jobs = jobs.len(),
        "starting ingest"
    );

    ensure_parent_dir(&db_path)?;
    let mut connection = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;

    let namer = TableNamer::new()?;
    let mut warnings = Vec::new();
    let mut outcomes = Vec::with_capacity(jobs.len());
    for job in &jobs {
        outcomes.push(run_job(&mut connection, job, &namer, &mut warnings)?);
    }

    let clean = outcomes
        .iter()
        .all(|job| job.load_error.is_none() && job.files_failed == 0);
    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: (if clean { "completed" } else { "completed_with_errors" }).to_string(),
        started_at: stamp.started_at(),
        updated_at: now_utc_string(),
        command: command_line(),
        paths: IngestPaths {
            work_root: args.work_root.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        jobs: outcomes,
        warnings,
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote ingest run manifest");
    info!(
        run_id = %run_id,
        status = %manifest.status,
        inserted = manifest
            .jobs
            .iter()
            .filter_map(|job| job.load.as_ref())
            .map(|load| load.inserted)
            .sum::<usize>(),
        "ingest completed"
    );

    Ok(())
}

/// Classify, read, normalize, unify and load one dataset job. Per-file and
/// load failures are recorded on the outcome; only setup errors propagate.
pub(crate) fn run_job(
    connection: &mut Connection,
    job: &DatasetJob,
    namer: &TableNamer,
    warnings: &mut Vec<String>,
) -> Result<JobOutcome> {
    let classifier = FileClassifier::new(job.extensions(), &job.skip_files)
        .with_partitioning(job.partition_threshold_mb, job.force_partitioned);
    let files = classifier.classify(&job.source_dirs)?;

    info!(
        table = %job.table,
        mode = job.mode.as_str(),
        files = files.len(),
        parallel = job.parallel,
        "job started"
    );
    if files.is_empty() {
        warn!(table = %job.table, "no matching source files");
        warnings.push(format!("{}: no matching source files", job.table));
    }

    let ctx = JobContext {
        job,
        csv: job.csv_options()?,
        namer,
    };
    let processed: Vec<ProcessedFile> = if job.parallel {
        files.par_iter().map(|file| process_file(&ctx, file)).collect()
    } else {
        files.iter().map(|file| process_file(&ctx, file)).collect()
    };

    let mut tables = Vec::new();
    let mut file_outcomes = Vec::with_capacity(processed.len());
    for file in processed {
        if let Some(class) = &file.outcome.failure_class {
            warnings.push(format!("{}: {class} failure", file.outcome.path));
        }
        tables.extend(file.tables);
        file_outcomes.push(file.outcome);
    }
    let files_failed = file_outcomes
        .iter()
        .filter(|outcome| outcome.failure_class.is_some())
        .count();

    let unified = unify(&job.table, &tables);
    let (load, load_error) = if unified.is_empty() {
        warn!(table = %job.table, "nothing to load");
        warnings.push(format!("{}: no rows to load", job.table));
        (None, None)
    } else {
        let options = LoadOptions {
            with_row_index: job.with_row_index,
        };
        match load_table(connection, &job.table, &unified, options) {
            Ok(report) => (Some(report), None),
            Err(err) => {
                let message = format!("{err:#}");
                error!(table = %job.table, error = %message, "load failed; target unchanged");
                warnings.push(format!("{}: load failed", job.table));
                (None, Some(message))
            }
        }
    };

    Ok(JobOutcome {
        table: job.table.clone(),
        mode: job.mode.as_str().to_string(),
        files_discovered: files.len(),
        files_failed,
        tables_produced: tables.len(),
        rows_unified: unified.len(),
        files: file_outcomes,
        load,
        load_error,
    })
}
