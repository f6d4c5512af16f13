//! Coordinate tables for the fixed-form activity reports. All coordinates are
//! 1-based `(row, column)` worksheet positions. Adding a layout means adding a
//! [`LayoutSpec`] entry to [`LAYOUTS`].

use super::LayoutVariant;

#[derive(Debug, Clone, Copy)]
pub enum Coordinates {
    Cells(&'static [(u32, u32)]),
    /// Rows `start..end` (end exclusive) of one column.
    Column { start: u32, end: u32, col: u32 },
}

impl Coordinates {
    pub fn positions(self) -> Vec<(u32, u32)> {
        match self {
            Self::Cells(cells) => cells.to_vec(),
            Self::Column { start, end, col } => (start..end).map(|row| (row, col)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub coordinates: Coordinates,
}

const fn cells(name: &'static str, cells: &'static [(u32, u32)]) -> FieldSpec {
    FieldSpec {
        name,
        coordinates: Coordinates::Cells(cells),
    }
}

const fn column(name: &'static str, start: u32, end: u32, col: u32) -> FieldSpec {
    FieldSpec {
        name,
        coordinates: Coordinates::Column { start, end, col },
    }
}

/// Who/what/when action items: one group per party, each spanning
/// `TRIAD_ROWS` rows starting `TRIAD_ROWS` rows after the previous group.
#[derive(Debug, Clone, Copy)]
pub struct TriadSpec {
    pub first_row: u32,
    pub col: u32,
}

pub const TRIAD_GROUPS: [&str; 3] = ["customer", "manufacturer", "internal"];
pub const TRIAD_ROWS: u32 = 5;
/// Column offsets of the who, what and when cells from the triad column.
pub const TRIAD_COLUMNS: [(&str, u32); 3] = [("who", 0), ("what", 1), ("when", 5)];

/// Repeating deal ("case") blocks, `stride` rows apart.
#[derive(Debug, Clone, Copy)]
pub struct CaseBlocks {
    pub first_row: u32,
    pub count: u32,
    pub stride: u32,
    pub col: u32,
}

/// Field suffix with its row and column offset from the block origin.
pub const CASE_FIELDS: [(&str, u32, u32); 12] = [
    ("customer_name", 0, 0),
    ("customer_representative", 0, 1),
    ("occurrence_date", 0, 2),
    ("branch", 0, 3),
    ("application", 1, 0),
    ("manufacturer", 2, 0),
    ("product", 3, 0),
    ("competitive", 4, 0),
    ("amount", 5, 0),
    ("order_month", 6, 0),
    ("budget", 7, 0),
    ("probability", 8, 0),
];

#[derive(Debug, Clone, Copy)]
pub struct LayoutSpec {
    pub variant: LayoutVariant,
    pub row_extent: usize,
    pub fields: &'static [FieldSpec],
    pub triads: TriadSpec,
    pub cases: CaseBlocks,
}

pub const BASE_FIELDS: &[FieldSpec] = &[
    cells("reporter_name", &[(2, 4), (2, 5), (2, 6)]),
    cells("date", &[(3, 4), (3, 5)]),
    cells("location", &[(4, 4), (4, 5)]),
    column("customer_company_name", 7, 11, 4),
    column("customer_department", 7, 12, 5),
    column("customer_full_name", 7, 12, 6),
    cells("customer_number", &[(11, 4)]),
    column("manufacturer_company_name", 7, 11, 7),
    column("manufacturer_department", 7, 11, 8),
    column("manufacturer_full_name", 7, 11, 9),
    column("internal_contact", 7, 11, 10),
];

const STANDARD_FIELDS: &[FieldSpec] = &[
    cells("purpose", &[(12, 4), (13, 4), (16, 4)]),
    cells("free_description", &[(17, 4), (18, 4)]),
    cells("associated_customer_name", &[(35, 4)]),
    cells("competitive_information", &[(36, 4)]),
];

const ANNUAL_PROJECT_FIELDS: &[FieldSpec] = &[
    cells("annual_project_name", &[(17, 4), (17, 5), (17, 6)]),
    cells("annual_project_schedule", &[(18, 4), (18, 5), (18, 6)]),
    cells("annual_project_budget", &[(19, 4), (19, 5), (19, 6)]),
    cells("free_description", &[(20, 4), (20, 5)]),
    cells("associated_customer_name", &[(46, 4)]),
    cells("competitive_information", &[(47, 4)]),
];

pub const LAYOUTS: &[LayoutSpec] = &[
    LayoutSpec {
        variant: LayoutVariant::Standard,
        row_extent: 71,
        fields: STANDARD_FIELDS,
        triads: TriadSpec {
            first_row: 20,
            col: 5,
        },
        cases: CaseBlocks {
            first_row: 38,
            count: 3,
            stride: 10,
            col: 6,
        },
    },
    LayoutSpec {
        variant: LayoutVariant::AnnualProject,
        row_extent: 97,
        fields: ANNUAL_PROJECT_FIELDS,
        triads: TriadSpec {
            first_row: 31,
            col: 5,
        },
        cases: CaseBlocks {
            first_row: 49,
            count: 5,
            stride: 10,
            col: 6,
        },
    },
];
