use std::collections::HashMap;

use crate::table::{LogicalTable, Row};

/// Union-schema projection of several tables bound for one target. Columns
/// are addressed by name; their order is first-seen across the inputs.
/// Names equal ignoring ASCII case are one column, spelled as first seen.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnifiedTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl UnifiedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }
}

pub fn unify(name: &str, tables: &[LogicalTable]) -> UnifiedTable {
    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for table in tables {
        for column in table.columns() {
            let key = column.to_ascii_lowercase();
            if !positions.contains_key(&key) {
                positions.insert(key, columns.len());
                columns.push(column.clone());
            }
        }
    }

    let total_rows = tables.iter().map(LogicalTable::len).sum();
    let mut rows = Vec::with_capacity(total_rows);
    for table in tables {
        let targets: Vec<usize> = table
            .columns()
            .iter()
            .map(|column| positions[&column.to_ascii_lowercase()])
            .collect();
        for source in table.rows() {
            let mut row: Row = vec![None; columns.len()];
            for (value, &target) in source.iter().zip(&targets) {
                row[target] = value.clone();
            }
            rows.push(row);
        }
    }

    UnifiedTable {
        name: name.to_string(),
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, columns: &[&str], rows: &[&[Option<&str>]]) -> LogicalTable {
        let mut table = LogicalTable::new(
            name,
            columns.iter().map(|column| column.to_string()).collect(),
        )
        .expect("table should build");
        for row in rows {
            table
                .push_row(row.iter().map(|value| value.map(str::to_string)).collect())
                .expect("row should fit");
        }
        table
    }

    #[test]
    fn unify_produces_column_union_with_absent_markers() {
        let a = table("a", &["a", "b"], &[&[Some("1"), Some("2")]]);
        let b = table("b", &["b", "c"], &[&[Some("3"), Some("4")]]);

        let unified = unify("T", &[a, b]);

        let mut columns = unified.columns.clone();
        columns.sort();
        assert_eq!(columns, vec!["a", "b", "c"]);
        assert_eq!(unified.len(), 2);
        assert_eq!(unified.value(0, "a"), Some("1"));
        assert_eq!(unified.value(0, "c"), None);
        assert_eq!(unified.value(1, "a"), None);
        assert_eq!(unified.value(1, "b"), Some("3"));
    }

    #[test]
    fn unify_aligns_reordered_columns_by_name() {
        let a = table("a", &["x", "y"], &[&[Some("1"), Some("2")]]);
        let b = table("b", &["y", "x"], &[&[Some("20"), Some("10")]]);

        let unified = unify("T", &[a, b]);
        assert_eq!(unified.columns, vec!["x", "y"]);
        assert_eq!(unified.rows[1], vec![Some("10".to_string()), Some("20".to_string())]);
    }

    #[test]
    fn unify_folds_case_variants_onto_first_spelling() {
        let a = table("a", &["ID", "val"], &[&[Some("1"), Some("A")]]);
        let b = table("b", &["id", "VAL", "note"], &[&[Some("2"), Some("B"), Some("x")]]);

        let unified = unify("T", &[a, b]);
        assert_eq!(unified.columns, vec!["ID", "val", "note"]);
        assert_eq!(unified.value(1, "ID"), Some("2"));
        assert_eq!(unified.value(1, "val"), Some("B"));
    }

    #[test]
    fn unify_of_nothing_is_empty() {
        let unified = unify("T", &[]);
        assert!(unified.is_empty());
        assert!(unified.columns.is_empty());
    }
}
