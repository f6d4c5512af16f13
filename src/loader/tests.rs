use rusqlite::Connection;

use super::*;
use crate::loader::schema::{ensure_table, table_columns};

fn unified(columns: &[&str], rows: &[&[Option<&str>]]) -> UnifiedTable {
    UnifiedTable {
        name: "batch".to_string(),
        columns: columns.iter().map(|column| column.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|value| value.map(str::to_string)).collect())
            .collect(),
    }
}

fn count_rows(connection: &Connection, table: &str) -> i64 {
    connection
        .query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
            [],
            |row| row.get(0),
        )
        .expect("count should succeed")
}

#[test]
fn loading_the_same_table_twice_is_idempotent() {
    let mut connection = Connection::open_in_memory().expect("in-memory db should open");
    let batch = unified(
        &["id", "val", "source", "origin", "level"],
        &[
            &[Some("1"), Some("A"), Some("/in/a.csv"), Some("s3_bucket"), Some("1")],
            &[Some("2"), Some("B"), Some("/in/a.csv"), Some("s3_bucket"), Some("1")],
        ],
    );

    let first = load_table(&mut connection, "T", &batch, LoadOptions::default())
        .expect("first load should succeed");
    assert!(first.table_created);
    assert_eq!(first.inserted, 2);

    let second = load_table(&mut connection, "T", &batch, LoadOptions::default())
        .expect("second load should succeed");
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates_existing, 2);
    assert_eq!(count_rows(&connection, "T"), 2);
}

#[test]
fn rows_differing_only_in_provenance_collapse_within_a_batch() {
    let mut connection = Connection::open_in_memory().expect("in-memory db should open");
    let batch = unified(
        &["id", "val", "source"],
        &[
            &[Some("1"), Some("A"), Some("/in/file1.csv")],
            &[Some("1"), Some("A"), Some("/in/file2.csv")],
        ],
    );

    let report = load_table(&mut connection, "T", &batch, LoadOptions::default())
        .expect("load should succeed");
    assert_eq!(report.rows_seen, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates_in_batch, 1);

    let source: String = connection
        .query_row("SELECT source FROM T", [], |row| row.get(0))
        .expect("row should exist");
    assert_eq!(source, "/in/file1.csv");
}

#[test]
fn new_columns_are_added_and_old_fingerprints_still_match() {
    let mut connection = Connection::open_in_memory().expect("in-memory db should open");
    let first = unified(&["id", "val"], &[&[Some("1"), Some("A")]]);
    load_table(&mut connection, "T", &first, LoadOptions::default())
        .expect("first load should succeed");

    let second = unified(
        &["id", "val", "extra"],
        &[&[Some("1"), Some("A"), None], &[Some("2"), Some("B"), Some("x")]],
    );
    let report = load_table(&mut connection, "T", &second, LoadOptions::default())
        .expect("second load should succeed");

    assert_eq!(report.columns_added, vec!["extra".to_string()]);
    assert_eq!(report.duplicates_existing, 1);
    assert_eq!(report.inserted, 1);
    assert!(
        table_columns(&connection, "T")
            .expect("columns should read")
            .contains(&"extra".to_string())
    );
}

#[test]
fn fingerprint_column_is_added_and_backfilled_on_foreign_tables() {
    let mut connection = Connection::open_in_memory().expect("in-memory db should open");
    connection
        .execute_batch(
            "CREATE TABLE person_data (name TEXT, company TEXT, source TEXT, score REAL);
             INSERT INTO person_data VALUES ('Sato', 'Acme', '/old/a.csv', 3.0);
             INSERT INTO person_data VALUES ('Sato', 'Acme', '/old/b.csv', 3.0);
             INSERT INTO person_data VALUES ('Kato', 'Initech', '/old/a.csv', NULL);",
        )
        .expect("fixture table should be created");

    let batch = unified(
        &["name", "company", "score", "source"],
        &[
            &[Some("Sato"), Some("Acme"), Some("3"), Some("/new/c.csv")],
            &[Some("Ito"), Some("Globex"), None, Some("/new/c.csv")],
        ],
    );
    let report = load_table(&mut connection, "person_data", &batch, LoadOptions::default())
        .expect("load should succeed");

    assert!(report.fingerprint_column_added);
    assert_eq!(report.fingerprints_backfilled, 2);
    assert_eq!(report.duplicates_existing, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(count_rows(&connection, "person_data"), 4);

    let index_count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'person_data'",
            [],
            |row| row.get(0),
        )
        .expect("index lookup should succeed");
    assert_eq!(index_count, 1);
}

#[test]
fn row_index_is_persisted_when_requested() {
    let mut connection = Connection::open_in_memory().expect("in-memory db should open");
    let batch = unified(&["id"], &[&[Some("a")], &[Some("a")], &[Some("b")]]);

    load_table(
        &mut connection,
        "T",
        &batch,
        LoadOptions {
            with_row_index: true,
        },
    )
    .expect("load should succeed");

    let indexes: Vec<i64> = connection
        .prepare("SELECT row_index FROM T ORDER BY row_index")
        .expect("select should prepare")
        .query_map([], |row| row.get(0))
        .expect("select should run")
        .collect::<rusqlite::Result<_>>()
        .expect("rows should read");
    assert_eq!(indexes, vec![0, 2]);
}

#[test]
fn failed_insert_rolls_back_schema_changes() {
    let mut connection = Connection::open_in_memory().expect("in-memory db should open");
    connection
        .execute_batch("CREATE TABLE T (id TEXT NOT NULL)")
        .expect("fixture table should be created");

    let batch = unified(&["id", "val"], &[&[None, Some("A")]]);
    let result = load_table(&mut connection, "T", &batch, LoadOptions::default());
    assert!(result.is_err());

    let columns = table_columns(&connection, "T").expect("columns should read");
    assert_eq!(columns, vec!["id".to_string()]);
    assert_eq!(count_rows(&connection, "T"), 0);
}

#[test]
fn ensure_table_quotes_unusual_identifiers() {
    let connection = Connection::open_in_memory().expect("in-memory db should open");
    let columns = vec!["受注番号".to_string(), "say \"hi\"".to_string()];
    let change = ensure_table(&connection, "sales history", &columns, false)
        .expect("table should be created");
    assert!(change.created);

    let stored = table_columns(&connection, "sales history").expect("columns should read");
    assert_eq!(
        stored,
        vec![
            "受注番号".to_string(),
            "say \"hi\"".to_string(),
            FINGERPRINT_COLUMN.to_string(),
        ]
    );
}
