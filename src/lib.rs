//! # sqlexcel
//!
//! Export the results of SQL queries to Excel workbooks.
//!
//! ## Features
//!
//! - **Declarative**: a JSON document lists output files and, per file, the
//!   worksheets to fill, each from one SQL query
//! - **Typed Cells**: numbers, dates and booleans stay typed, with a display
//!   format chosen from the column's declared SQL type
//! - **Exact Decimals**: values a double cannot represent faithfully are
//!   written as exact text
//! - **Three Backends**: streaming `.xlsx` for large outputs, in-memory
//!   `.xlsx`, and legacy `.xls`
//! - **Dated Names**: `##Date##` in a file name becomes today's `yyyyMMdd`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqlexcel::{run_export, ExportConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExportConfig::from_path("export.json")?;
//! let report = run_export(&config)?;
//!
//! for file in &report.files {
//!     println!("{}: {} rows", file.path.display(), file.rows());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Building a sheet directly
//!
//! ```rust
//! use sqlexcel::backend::{BackendKind, WorkbookBackend};
//! use sqlexcel::database::memory::MemoryTable;
//! use sqlexcel::database::{ColumnDescriptor, Database, MemoryDatabase, SqlValue};
//! use sqlexcel::worksheet::build_worksheet;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let table = MemoryTable::new(vec![ColumnDescriptor::new(1, "ID", "INT", 10, 0)])
//!     .with_row(vec![SqlValue::Int(1)]);
//! let mut db = MemoryDatabase::new().with_table("SELECT id FROM t", table);
//!
//! let mut workbook = BackendKind::select("out.xlsx", false)?.open()?;
//! let mut cursor = db.query("SELECT id FROM t")?;
//! let summary = build_worksheet("Ids", workbook.as_mut(), cursor.as_mut())?;
//! assert_eq!(summary.rows, 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod coerce;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod fast_writer;
pub mod format;
pub mod logging;
pub mod styles;
pub mod types;
pub mod worksheet;
pub mod writer;
pub mod xls;

pub use backend::{BackendKind, WorkbookBackend};
pub use config::{resolve_file_name, DatasourceConfig, ExcelFileConfig, ExportConfig, WorksheetConfig};
pub use error::{ExportError, Result};
pub use export::{export_with, run_export, ExportReport, ExportedFile};
pub use format::{resolve_format, TypeFormatRegistry, TypeKey};
pub use types::{CellValue, StyleId, StyledCell};
pub use worksheet::{build_worksheet, SheetSummary, WorksheetBuilder};
pub use writer::ExcelWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        assert_eq!(resolve_format("DECIMAL(10,2)"), "0.00");
        assert_eq!(BackendKind::select("x.xls", false).unwrap(), BackendKind::Xls);
        let _ = CellValue::from("text");
    }
}
