use std::path::{Path, PathBuf};

use thiserror::Error;

/// Per-file failures. None of these abort a run; the pipeline records the
/// class in the run manifest and moves on to the next file.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("unsupported file type: {}", path.display())]
    Unsupported { path: PathBuf },

    #[error("no candidate encoding ({candidates}) could decode {}", path.display())]
    Decode { path: PathBuf, candidates: String },

    #[error("no usable table found in {}", path.display())]
    Structural { path: PathBuf },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse csv {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open workbook {}", path.display())]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::XlsxError,
    },

    #[error("invalid table shape in {}: {message}", path.display())]
    Shape { path: PathBuf, message: String },
}

impl FileError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Unsupported { .. } => "unsupported",
            Self::Decode { .. } => "decode",
            Self::Structural { .. } => "structural",
            Self::Io { .. } | Self::Csv { .. } | Self::Workbook { .. } => "read",
            Self::Shape { .. } => "shape",
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn shape(path: &Path, error: anyhow::Error) -> Self {
        Self::Shape {
            path: path.to_path_buf(),
            message: format!("{error:#}"),
        }
    }
}
