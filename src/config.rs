//! Export configuration loaded from a JSON document
//!
//! ```json
//! {
//!   "datasource": { "className": "org.postgresql.Driver",
//!                   "jdbcUrl": "jdbc:postgresql://localhost/db",
//!                   "username": "u", "password": "p" },
//!   "excelFile": [
//!     { "id": 1, "large": false, "fileName": "report_##Date##.xlsx",
//!       "preparationProcedureStatement": "{ call refresh() }",
//!       "worksheet": [ { "id": 1, "sqlQuery": "SELECT ...", "workSheetName": "Data" } ] }
//!   ]
//! }
//! ```

use crate::error::{ExportError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::Path;

/// Placeholder in file names replaced by the export date
pub const DATE_PLACEHOLDER: &str = "##Date##";

/// Top-level configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub datasource: DatasourceConfig,
    #[serde(rename = "excelFile", default)]
    pub excel_files: Vec<ExcelFileConfig>,
}

/// Connection settings
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceConfig {
    /// Driver identifier, e.g. `org.postgresql.Driver`
    pub class_name: String,
    pub jdbc_url: String,
    #[serde(alias = "userName", default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for DatasourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceConfig")
            .field("class_name", &self.class_name)
            .field("jdbc_url", &self.jdbc_url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One output spreadsheet
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcelFileConfig {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// Write through the streaming backend regardless of extension
    #[serde(default)]
    pub large: bool,
    /// Destination path, may contain `##Date##`
    pub file_name: String,
    #[serde(default)]
    pub preparation_procedure_statement: Option<String>,
    #[serde(rename = "worksheet", default)]
    pub worksheets: Vec<WorksheetConfig>,
}

impl ExcelFileConfig {
    /// The preparatory statement, if present and not blank
    pub fn preparation_statement(&self) -> Option<&str> {
        self.preparation_procedure_statement
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Output path for an export run on `date`
    pub fn resolved_file_name(&self, date: NaiveDate) -> String {
        resolve_file_name(&self.file_name, date)
    }
}

/// One sheet of an output file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetConfig {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub sql_query: String,
    pub work_sheet_name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
    Float(f64),
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Integer(i) => i.to_string(),
        RawId::Float(f) => f.to_string(),
    })
}

impl ExportConfig {
    /// Parse a configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse the configuration file at `path`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ExportError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ExportError::Config(format!("invalid configuration '{}': {}", path.display(), e))
        })
    }
}

/// Replace every `##Date##` in `template` with `date` as `yyyyMMdd`
pub fn resolve_file_name(template: &str, date: NaiveDate) -> String {
    template.replace(DATE_PLACEHOLDER, &date.format("%Y%m%d").to_string())
}
