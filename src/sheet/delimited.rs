use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use csv::{ByteRecord, ReaderBuilder};
use encoding_rs::{DecoderResult, Encoding, UTF_8};
use tracing::debug;

use crate::error::FileError;
use crate::sheet::RawSheet;

pub const DEFAULT_ENCODINGS: [&str; 3] = ["utf-8", "windows-31j", "shift_jis"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const DECODE_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub skip_rows: usize,
    pub encodings: Vec<&'static Encoding>,
    pub partition_rows: usize,
}

/// Resolves WHATWG encoding labels in priority order, dropping labels that
/// name an encoding already in the list (`windows-31j` and `shift_jis` are the
/// same decoder).
pub fn resolve_encodings(labels: &[String]) -> Result<Vec<&'static Encoding>> {
    let mut encodings: Vec<&'static Encoding> = Vec::with_capacity(labels.len());
    for label in labels {
        let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) else {
            bail!("unknown text encoding label: {label}");
        };
        if !encodings.contains(&encoding) {
            encodings.push(encoding);
        }
    }

    if encodings.is_empty() {
        bail!("at least one csv encoding is required");
    }

    Ok(encodings)
}

pub fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let bytes = if encoding == UTF_8 {
        bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
    } else {
        bytes
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
}

/// Tries each candidate in order and returns the first clean decode.
pub fn decode_with_candidates(
    bytes: &[u8],
    encodings: &[&'static Encoding],
) -> Option<(String, &'static Encoding)> {
    for encoding in encodings {
        match decode_strict(bytes, encoding) {
            Some(text) => return Some((text, encoding)),
            None => debug!(encoding = encoding.name(), "encoding candidate rejected"),
        }
    }
    None
}

pub fn read_csv_sheet(
    path: &Path,
    options: &CsvOptions,
) -> Result<(RawSheet, &'static Encoding), FileError> {
    let bytes = fs::read(path).map_err(|source| FileError::io(path, source))?;
    let (text, encoding) = decode_with_candidates(&bytes, &options.encodings)
        .ok_or_else(|| decode_error(path, &options.encodings))?;

    let sheet = parse_csv_text(&file_stem(path), skip_lines(&text, options.skip_rows)).map_err(
        |source| FileError::Csv {
            path: path.to_path_buf(),
            source,
        },
    )?;

    Ok((sheet, encoding))
}

pub fn parse_csv_text(name: &str, text: &str) -> Result<RawSheet, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(ToOwned::to_owned).collect());
    }

    Ok(RawSheet::from_text_rows(name, rows))
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(index) => rest = &rest[index + 1..],
            None => return "",
        }
    }
    rest
}

/// Streams a large CSV in fixed-size partitions. The encoding is the first
/// candidate that decodes the entire file, the first record after the skipped
/// preamble is the header, and every partition is returned as a sheet whose
/// first row repeats that header.
pub struct PartitionedCsvReader {
    path: PathBuf,
    stem: String,
    reader: csv::Reader<BufReader<File>>,
    encoding: &'static Encoding,
    header: Vec<String>,
    partition_rows: usize,
    next_partition: usize,
    record: ByteRecord,
}

impl PartitionedCsvReader {
    pub fn open(path: &Path, options: &CsvOptions) -> Result<Self, FileError> {
        let encoding = detect_encoding(path, &options.encodings)?;

        let file = File::open(path).map_err(|source| FileError::io(path, source))?;
        let mut buffered = BufReader::new(file);
        skip_raw_lines(&mut buffered, options.skip_rows)
            .map_err(|source| FileError::io(path, source))?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(buffered);

        let mut record = ByteRecord::new();
        let has_header = reader
            .read_byte_record(&mut record)
            .map_err(|source| FileError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        if !has_header {
            return Err(FileError::Structural {
                path: path.to_path_buf(),
            });
        }
        let header = decode_record(&record, encoding)
            .ok_or_else(|| decode_error(path, &[encoding]))?;

        Ok(Self {
            path: path.to_path_buf(),
            stem: file_stem(path),
            reader,
            encoding,
            header,
            partition_rows: options.partition_rows.max(1),
            next_partition: 0,
            record,
        })
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn next_partition(&mut self) -> Result<Option<RawSheet>, FileError> {
        let mut rows = vec![self.header.clone()];

        while rows.len() <= self.partition_rows {
            let has_record = self
                .reader
                .read_byte_record(&mut self.record)
                .map_err(|source| FileError::Csv {
                    path: self.path.clone(),
                    source,
                })?;
            if !has_record {
                break;
            }
            let row = decode_record(&self.record, self.encoding)
                .ok_or_else(|| decode_error(&self.path, &[self.encoding]))?;
            rows.push(row);
        }

        if rows.len() == 1 {
            return Ok(None);
        }

        let name = format!("{}_part{}", self.stem, self.next_partition);
        self.next_partition += 1;
        Ok(Some(RawSheet::from_text_rows(name, rows)))
    }
}

/// First candidate that decodes the whole file without error. Each candidate
/// streams the file through its own decoder, so a character split across a
/// chunk boundary is carried over instead of being rejected.
fn detect_encoding(
    path: &Path,
    encodings: &[&'static Encoding],
) -> Result<&'static Encoding, FileError> {
    for encoding in encodings {
        if stream_decodes(path, encoding).map_err(|source| FileError::io(path, source))? {
            return Ok(encoding);
        }
        debug!(
            path = %path.display(),
            encoding = encoding.name(),
            "encoding candidate rejected"
        );
    }
    Err(decode_error(path, encodings))
}

fn stream_decodes(path: &Path, encoding: &'static Encoding) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    let mut decoder = encoding.new_decoder_with_bom_removal();
    let mut input = vec![0_u8; DECODE_CHUNK_BYTES];
    let mut output = String::with_capacity(
        decoder
            .max_utf8_buffer_length_without_replacement(DECODE_CHUNK_BYTES)
            .unwrap_or(DECODE_CHUNK_BYTES * 3),
    );

    loop {
        let read = file.read(&mut input)?;
        let last = read == 0;
        let mut pending = &input[..read];

        loop {
            output.clear();
            let (result, consumed) =
                decoder.decode_to_string_without_replacement(pending, &mut output, last);
            pending = &pending[consumed..];
            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => return Ok(false),
            }
        }

        if last {
            return Ok(true);
        }
    }
}

fn skip_raw_lines<R: BufRead>(reader: &mut R, count: usize) -> std::io::Result<()> {
    let mut sink = Vec::new();
    for _ in 0..count {
        sink.clear();
        if reader.read_until(b'\n', &mut sink)? == 0 {
            break;
        }
    }
    Ok(())
}

fn decode_record(record: &ByteRecord, encoding: &'static Encoding) -> Option<Vec<String>> {
    record
        .iter()
        .map(|field| decode_strict(field, encoding))
        .collect()
}

fn decode_error(path: &Path, encodings: &[&'static Encoding]) -> FileError {
    FileError::Decode {
        path: path.to_path_buf(),
        candidates: encodings
            .iter()
            .map(|encoding| encoding.name())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
