//! End-to-end export tests against an in-memory database

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook, Data, Reader, Xls, Xlsx};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlexcel::database::memory::MemoryTable;
use sqlexcel::database::{ColumnDescriptor, MemoryDatabase, SqlValue};
use sqlexcel::{export_with, ExportConfig, ExportError};
use tempfile::tempdir;

const AMOUNTS_SQL: &str = "SELECT id, amount FROM t";
const PEOPLE_SQL: &str = "SELECT name, active, born, score FROM people";
/// Excel serial day of 1990-05-17, the `born` value of the first person
const BORN_SERIAL: f64 = 33010.0;

fn amounts_table() -> MemoryTable {
    MemoryTable::new(vec![
        ColumnDescriptor::new(1, "id", "INT", 10, 0).with_label("ID"),
        ColumnDescriptor::new(2, "amount", "DECIMAL", 10, 2).with_label("AMOUNT"),
    ])
    .with_row(vec![
        SqlValue::Int(1),
        SqlValue::Decimal(Decimal::from_str("10.50").unwrap()),
    ])
    .with_row(vec![
        SqlValue::Int(2),
        SqlValue::Decimal(Decimal::from_str("1234567890123456.78").unwrap()),
    ])
}

fn mixed_table() -> MemoryTable {
    MemoryTable::new(vec![
        ColumnDescriptor::new(1, "name", "VARCHAR", 30, 0),
        ColumnDescriptor::new(2, "active", "BIT", 1, 0),
        ColumnDescriptor::new(3, "born", "DATE", 10, 0),
        ColumnDescriptor::new(4, "score", "DOUBLE", 17, 17),
    ])
    .with_row(vec![
        SqlValue::Text("Alice".into()),
        SqlValue::Bool(true),
        SqlValue::Date(NaiveDate::from_ymd_opt(1990, 5, 17).unwrap()),
        SqlValue::Double(99.5),
    ])
    .with_row(vec![
        SqlValue::Null,
        SqlValue::Bool(false),
        SqlValue::Null,
        SqlValue::Double(f64::NAN),
    ])
}

fn assert_date(cell: Option<&Data>, serial: f64) {
    match cell {
        Some(Data::DateTime(date)) => assert_eq!(date.as_f64(), serial),
        other => panic!("expected a date cell, got {:?}", other),
    }
}

fn config(json: &str) -> ExportConfig {
    ExportConfig::from_json(json).unwrap()
}

fn single_file_config(file_name: &Path, large: bool, sheets: &[(&str, &str)]) -> ExportConfig {
    let worksheets: Vec<String> = sheets
        .iter()
        .enumerate()
        .map(|(i, (sql, name))| {
            format!(
                r#"{{ "id": {}, "sqlQuery": "{}", "workSheetName": "{}" }}"#,
                i + 1,
                sql,
                name
            )
        })
        .collect();
    config(&format!(
        r#"{{
            "datasource": {{ "className": "memory", "jdbcUrl": "", "username": "", "password": "" }},
            "excelFile": [ {{
                "id": 1,
                "large": {},
                "fileName": {},
                "worksheet": [ {} ]
            }} ]
        }}"#,
        large,
        serde_json::to_string(&file_name.display().to_string()).unwrap(),
        worksheets.join(",")
    ))
}

fn read_part(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut part = archive.by_name(name).unwrap();
    let mut xml = String::new();
    part.read_to_string(&mut xml).unwrap();
    xml
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

#[test]
fn test_decimal_report_xlsx() {
    let dir = tempdir().unwrap();
    let config = single_file_config(
        &dir.path().join("report_##Date##.xlsx"),
        false,
        &[(AMOUNTS_SQL, "Amounts"), (PEOPLE_SQL, "People")],
    );
    let mut db = MemoryDatabase::new()
        .with_table(AMOUNTS_SQL, amounts_table())
        .with_table(PEOPLE_SQL, mixed_table());

    let report = export_with(&mut db, &config, today()).unwrap();
    let path = dir.path().join("report_20240630.xlsx");
    assert_eq!(report.files[0].path, path);
    assert_eq!(report.files[0].rows(), 4);

    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Amounts", "People"]);
    let range = workbook.worksheet_range("Amounts").unwrap();

    assert_eq!(range.get((0, 0)), Some(&Data::String("ID".to_string())));
    assert_eq!(range.get((0, 1)), Some(&Data::String("AMOUNT".to_string())));
    assert_eq!(range.get((1, 0)), Some(&Data::Float(1.0)));
    assert_eq!(range.get((1, 1)), Some(&Data::Float(10.5)));
    assert_eq!(range.get((2, 0)), Some(&Data::Float(2.0)));
    assert_eq!(
        range.get((2, 1)),
        Some(&Data::String("1234567890123456.78".to_string()))
    );

    let range = workbook.worksheet_range("People").unwrap();
    assert_eq!(range.get((1, 0)), Some(&Data::String("Alice".to_string())));
    assert_date(range.get((1, 2)), BORN_SERIAL);

    let styles = read_part(&path, "xl/styles.xml");
    assert!(styles.contains("numFmtId=\"2\""));
}

#[test]
fn test_decimal_report_streaming() {
    let dir = tempdir().unwrap();
    let config = single_file_config(
        &dir.path().join("large_##Date##.xlsx"),
        true,
        &[(AMOUNTS_SQL, "Amounts"), (PEOPLE_SQL, "People")],
    );
    let mut db = MemoryDatabase::new()
        .with_table(AMOUNTS_SQL, amounts_table())
        .with_table(PEOPLE_SQL, mixed_table());

    let report = export_with(&mut db, &config, today()).unwrap();
    let path = &report.files[0].path;

    let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Amounts", "People"]);

    let range = workbook.worksheet_range("Amounts").unwrap();
    assert_eq!(range.get((0, 1)), Some(&Data::String("AMOUNT".to_string())));
    assert_eq!(range.get((1, 1)), Some(&Data::Float(10.5)));
    assert_eq!(
        range.get((2, 1)),
        Some(&Data::String("1234567890123456.78".to_string()))
    );

    let range = workbook.worksheet_range("People").unwrap();
    assert_eq!(range.get((1, 0)), Some(&Data::String("Alice".to_string())));
    assert_eq!(range.get((1, 1)), Some(&Data::Bool(true)));
    assert_date(range.get((1, 2)), BORN_SERIAL);
    assert_eq!(range.get((1, 3)), Some(&Data::Float(99.5)));
    assert_eq!(range.get((2, 3)), Some(&Data::String("NaN".to_string())));

    let sheet = read_part(path, "xl/worksheets/sheet1.xml");
    assert!(sheet.contains("state=\"frozen\""));
    assert!(sheet.contains("<cols>"));
}

#[test]
fn test_legacy_xls_output() {
    let dir = tempdir().unwrap();
    let config = single_file_config(
        &dir.path().join("legacy.xls"),
        false,
        &[(AMOUNTS_SQL, "Amounts"), (PEOPLE_SQL, "People")],
    );
    let mut db = MemoryDatabase::new()
        .with_table(AMOUNTS_SQL, amounts_table())
        .with_table(PEOPLE_SQL, mixed_table());

    let report = export_with(&mut db, &config, today()).unwrap();
    assert_eq!(report.files[0].sheets.len(), 2);
    let path = &report.files[0].path;

    let bytes = std::fs::read(path).unwrap();
    assert_eq!(&bytes[0..8], &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);

    let mut workbook: Xls<_> = open_workbook(path).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Amounts", "People"]);

    let range = workbook.worksheet_range("Amounts").unwrap();
    assert_eq!(range.get((0, 0)), Some(&Data::String("ID".to_string())));
    assert_eq!(range.get((0, 1)), Some(&Data::String("AMOUNT".to_string())));
    assert_eq!(range.get((1, 0)), Some(&Data::Float(1.0)));
    assert_eq!(range.get((1, 1)), Some(&Data::Float(10.5)));
    assert_eq!(
        range.get((2, 1)),
        Some(&Data::String("1234567890123456.78".to_string()))
    );

    let range = workbook.worksheet_range("People").unwrap();
    assert_eq!(range.get((1, 0)), Some(&Data::String("Alice".to_string())));
    assert_eq!(range.get((1, 1)), Some(&Data::Bool(true)));
    assert_date(range.get((1, 2)), BORN_SERIAL);
    assert_eq!(range.get((1, 3)), Some(&Data::Float(99.5)));
}

#[test]
fn test_empty_result_keeps_header() {
    let dir = tempdir().unwrap();
    let sql = "SELECT id, amount FROM t WHERE 1 = 0";
    let config = single_file_config(&dir.path().join("empty.xlsx"), false, &[(sql, "Nothing")]);
    let table = MemoryTable::new(amounts_table().columns);
    let mut db = MemoryDatabase::new().with_table(sql, table);

    let report = export_with(&mut db, &config, today()).unwrap();
    assert_eq!(report.files[0].rows(), 0);
    assert!(!report.files[0].sheets[0].styled);

    let mut workbook: Xlsx<_> = open_workbook(&report.files[0].path).unwrap();
    let range = workbook.worksheet_range("Nothing").unwrap();
    assert_eq!(range.height(), 1);
    assert_eq!(range.get((0, 0)), Some(&Data::String("ID".to_string())));
}

#[test]
fn test_multiple_files_in_order() {
    let dir = tempdir().unwrap();
    let json = format!(
        r#"{{
            "datasource": {{ "className": "memory", "jdbcUrl": "" }},
            "excelFile": [
                {{ "id": "a", "fileName": {}, "worksheet": [
                    {{ "id": 1, "sqlQuery": "{sql}", "workSheetName": "One" }} ] }},
                {{ "id": "b", "fileName": {}, "preparationProcedureStatement": "{{ call prepare() }}",
                   "worksheet": [
                    {{ "id": 1, "sqlQuery": "{sql}", "workSheetName": "Two" }} ] }}
            ]
        }}"#,
        serde_json::to_string(&dir.path().join("a.xlsx").display().to_string()).unwrap(),
        serde_json::to_string(&dir.path().join("b.xls").display().to_string()).unwrap(),
        sql = AMOUNTS_SQL,
    );
    let config = config(&json);
    let mut db = MemoryDatabase::new().with_table(AMOUNTS_SQL, amounts_table());

    let report = export_with(&mut db, &config, today()).unwrap();
    let ids: Vec<&str> = report.files.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(report.paths().all(|p| p.exists()));
    assert_eq!(db.calls(), ["{ call prepare() }"]);
}

#[test]
fn test_unsupported_extension_fails() {
    let dir = tempdir().unwrap();
    let config = single_file_config(&dir.path().join("report.ods"), false, &[(AMOUNTS_SQL, "A")]);
    let mut db = MemoryDatabase::new().with_table(AMOUNTS_SQL, amounts_table());

    let err = export_with(&mut db, &config, today()).unwrap_err();
    assert!(matches!(err, ExportError::UnsupportedExtension { .. }));
    assert!(db.queries().is_empty());
}

#[test]
fn test_failing_query_reports_sheet() {
    let dir = tempdir().unwrap();
    let config = single_file_config(
        &dir.path().join("broken.xlsx"),
        false,
        &[("SELECT * FROM missing", "Broken")],
    );
    let mut db = MemoryDatabase::new();

    let err = export_with(&mut db, &config, today()).unwrap_err();
    assert!(err.to_string().contains("Broken"));
    assert!(!dir.path().join("broken.xlsx").exists());
}
