//! Minimal XLSX writer for fixtures: inline strings, numeric cells, styled
//! blanks, a dimension reference and merged ranges.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub struct XlsxFixture {
    name: String,
    rows: Vec<Vec<String>>,
    merges: Vec<String>,
    styled_blanks: Vec<(usize, usize)>,
    dimension: Option<String>,
}

impl XlsxFixture {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Vec::new(),
            merges: Vec::new(),
            styled_blanks: Vec::new(),
            dimension: None,
        }
    }

    pub fn row(mut self, cells: &[&str]) -> Self {
        self.rows
            .push(cells.iter().map(|cell| cell.to_string()).collect());
        self
    }

    /// Sets one cell by 1-based worksheet coordinates.
    pub fn cell(mut self, row: usize, col: usize, value: &str) -> Self {
        while self.rows.len() < row {
            self.rows.push(Vec::new());
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.to_string();
        self
    }

    pub fn merge(mut self, reference: &str) -> Self {
        self.merges.push(reference.to_string());
        self
    }

    /// A cell with a style index and no value, as Excel writes for a
    /// formatted blank. 1-based coordinates.
    pub fn styled_blank(mut self, row: usize, col: usize) -> Self {
        while self.rows.len() < row {
            self.rows.push(Vec::new());
        }
        self.styled_blanks.push((row, col));
        self
    }

    pub fn dimension(mut self, reference: &str) -> Self {
        self.dimension = Some(reference.to_string());
        self
    }

    fn worksheet_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        if let Some(reference) = &self.dimension {
            xml.push_str(&format!(r#"<dimension ref="{reference}"/>"#));
        }
        xml.push_str("<sheetData>");
        for (row_index, cells) in self.rows.iter().enumerate() {
            let row_number = row_index + 1;
            let blanks: Vec<usize> = self
                .styled_blanks
                .iter()
                .filter(|(row, _)| *row == row_number)
                .map(|(_, col)| *col)
                .collect();
            if cells.is_empty() && blanks.is_empty() {
                continue;
            }
            xml.push_str(&format!(r#"<row r="{row_number}">"#));
            for col in blanks {
                xml.push_str(&format!(
                    r#"<c r="{}{row_number}" s="0"/>"#,
                    column_letters(col - 1)
                ));
            }
            for (col_index, value) in cells.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let reference = format!("{}{row_number}", column_letters(col_index));
                if is_numeric(value) {
                    xml.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
                } else {
                    xml.push_str(&format!(
                        r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        escape(value)
                    ));
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");
        if !self.merges.is_empty() {
            xml.push_str(&format!(r#"<mergeCells count="{}">"#, self.merges.len()));
            for reference in &self.merges {
                xml.push_str(&format!(r#"<mergeCell ref="{reference}"/>"#));
            }
            xml.push_str("</mergeCells>");
        }
        xml.push_str("</worksheet>");
        xml
    }
}

pub fn write_xlsx(path: &Path, sheets: &[XlsxFixture]) {
    let file = File::create(path).expect("fixture workbook should be created");
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut relationships = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );

    for (index, sheet) in sheets.iter().enumerate() {
        let number = index + 1;
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{number}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{number}" r:id="rId{number}"/>"#,
            escape(&sheet.name)
        ));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{number}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{number}.xml"/>"#
        ));
    }
    content_types.push_str("</Types>");
    workbook.push_str("</sheets></workbook>");
    relationships.push_str("</Relationships>");

    let root_relationships = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

    let mut entries = vec![
        ("[Content_Types].xml".to_string(), content_types),
        ("_rels/.rels".to_string(), root_relationships.to_string()),
        ("xl/workbook.xml".to_string(), workbook),
        ("xl/_rels/workbook.xml.rels".to_string(), relationships),
    ];
    for (index, sheet) in sheets.iter().enumerate() {
        entries.push((
            format!("xl/worksheets/sheet{}.xml", index + 1),
            sheet.worksheet_xml(),
        ));
    }

    for (name, body) in entries {
        zip.start_file(name, options)
            .expect("fixture entry should start");
        zip.write_all(body.as_bytes())
            .expect("fixture entry should be written");
    }
    zip.finish().expect("fixture workbook should finish");
}

fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).expect("column letters are ascii")
}

fn is_numeric(value: &str) -> bool {
    value
        .chars()
        .all(|character| character.is_ascii_digit() || character == '.' || character == '-')
        && value.parse::<f64>().is_ok()
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
