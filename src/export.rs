//! Export orchestration: one workbook per configured file

use crate::backend::{validate_sheet_name, BackendKind};
use crate::config::{ExcelFileConfig, ExportConfig};
use crate::database::{self, Database};
use crate::error::Result;
use crate::worksheet::{build_worksheet, SheetSummary};
use chrono::{Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of one written file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub id: String,
    pub path: PathBuf,
    pub sheets: Vec<SheetSummary>,
}

impl ExportedFile {
    /// Data rows over all sheets
    pub fn rows(&self) -> u64 {
        self.sheets.iter().map(|s| u64::from(s.rows)).sum()
    }
}

/// Files written by an export run, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub files: Vec<ExportedFile>,
}

impl ExportReport {
    /// Path of the last file written, if any
    pub fn last_path(&self) -> Option<&Path> {
        self.files.last().map(|f| f.path.as_path())
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.files.iter().map(|f| f.path.as_path())
    }
}

/// Connect to the configured datasource and export every file
///
/// The configuration is validated before any connection is opened. The
/// connection is closed whatever the outcome; a failure to close is logged
/// and never masks the export result.
pub fn run_export(config: &ExportConfig) -> Result<ExportReport> {
    validate(config).inspect_err(|e| log::error!("Invalid export configuration: {}", e))?;
    let mut db = database::connect(&config.datasource)?;

    let result = export_with(db.as_mut(), config, Local::now().date_naive());
    if let Err(e) = &result {
        log::error!("Error encountered while exporting data: {}", e);
    }

    if let Err(e) = db.close() {
        log::error!("Error encountered while closing the connection: {}", e);
    }

    if result.is_ok() {
        log::info!("Data has been successfully exported to excel files.");
    }
    result
}

/// Export every configured file through an open connection, naming files for `today`
pub fn export_with(
    db: &mut dyn Database,
    config: &ExportConfig,
    today: NaiveDate,
) -> Result<ExportReport> {
    let mut report = ExportReport::default();
    for file in &config.excel_files {
        report.files.push(export_file(db, file, today)?);
    }
    Ok(report)
}

fn export_file(db: &mut dyn Database, file: &ExcelFileConfig, today: NaiveDate) -> Result<ExportedFile> {
    log::info!("*ExcelFile {} Large: {}", file.id, file.large);

    let kind = BackendKind::select(&file.file_name, file.large).inspect_err(|_| {
        log::error!("File name can have extensions xls or xlsx only.");
    })?;
    let mut workbook = kind.open()?;

    if let Some(statement) = file.preparation_statement() {
        log::info!("**Stored procedure {}", statement);
        db.call(statement)?;
    }

    let mut sheets = Vec::with_capacity(file.worksheets.len());
    for worksheet in &file.worksheets {
        log::info!("**Worksheet {}", worksheet.id);
        let summary = {
            let mut cursor = db
                .query(&worksheet.sql_query)
                .map_err(|e| e.in_worksheet(&file.id, &worksheet.work_sheet_name))?;
            build_worksheet(&worksheet.work_sheet_name, workbook.as_mut(), cursor.as_mut())
                .map_err(|e| e.in_worksheet(&file.id, &worksheet.work_sheet_name))?
        };
        sheets.push(summary);
    }

    let path = PathBuf::from(file.resolved_file_name(today));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    workbook.save(&path)?;

    if sheets.is_empty() {
        log::warn!("File {} has no worksheets", file.id);
    }

    Ok(ExportedFile {
        id: file.id.clone(),
        path,
        sheets,
    })
}

/// Fail early on file and sheet names no backend can write
pub fn validate(config: &ExportConfig) -> Result<()> {
    for file in &config.excel_files {
        BackendKind::select(&file.file_name, file.large)?;
        for (i, worksheet) in file.worksheets.iter().enumerate() {
            let earlier = file.worksheets[..i].iter().map(|w| w.work_sheet_name.as_str());
            validate_sheet_name(&worksheet.work_sheet_name, earlier)
                .map_err(|e| e.in_worksheet(&file.id, &worksheet.work_sheet_name))?;
        }
    }
    Ok(())
}
