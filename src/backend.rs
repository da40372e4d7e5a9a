//! Workbook backends and their selection
//!
//! Three backends implement [`WorkbookBackend`]:
//!
//! - [`StreamingWorkbook`](crate::fast_writer::StreamingWorkbook): rows go to
//!   disk as they are written, for files flagged `large`
//! - [`ExcelWriter`](crate::writer::ExcelWriter): in-memory `.xlsx`
//! - [`XlsWorkbook`](crate::xls::XlsWorkbook): in-memory legacy `.xls`

use crate::error::{ExportError, Result};
use crate::fast_writer::StreamingWorkbook;
use crate::types::{StyleId, StyledCell};
use crate::writer::ExcelWriter;
use crate::xls::XlsWorkbook;
use std::path::Path;

/// Longest sheet name Excel accepts, in characters
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Characters Excel refuses anywhere in a sheet name
const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Check that Excel will accept `name` as a new sheet next to `existing`
///
/// Names are compared case-insensitively, the way Excel does.
pub fn validate_sheet_name<'a, I>(name: &str, existing: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let invalid = |reason: String| ExportError::InvalidSheetName {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("sheet name is blank".to_string()));
    }
    let len = name.chars().count();
    if len > MAX_SHEET_NAME_LEN {
        return Err(invalid(format!(
            "{} characters exceed the limit of {}",
            len, MAX_SHEET_NAME_LEN
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(invalid(format!("character '{}' is not allowed", c)));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(invalid("sheet name cannot start or end with an apostrophe".to_string()));
    }

    let lower = name.to_lowercase();
    if existing.into_iter().any(|other| other.to_lowercase() == lower) {
        return Err(invalid("a sheet with this name already exists".to_string()));
    }
    Ok(())
}

/// Sink for one workbook being populated sheet by sheet
///
/// Rows of a sheet are written in ascending order; the sheet most recently
/// added is the target of every row, freeze and autosize call.
pub trait WorkbookBackend {
    /// Start a new sheet and make it current
    ///
    /// Fails with [`ExportError::InvalidSheetName`] for names Excel refuses.
    fn add_sheet(&mut self, name: &str) -> Result<()>;

    /// Style used for header cells
    fn header_style(&mut self) -> Result<StyleId>;

    /// Register a display format and get the style applying it
    fn register_style(&mut self, format: &str) -> Result<StyleId>;

    /// Write a row at a 0-based row index of the current sheet
    fn write_row(&mut self, row: u32, cells: &[StyledCell]) -> Result<()>;

    /// Freeze the first row of the current sheet
    fn freeze_header(&mut self) -> Result<()>;

    /// Fit the first `columns` columns of the current sheet to their content
    fn autosize_columns(&mut self, columns: u16) -> Result<()>;

    /// Serialize the workbook to `path`
    fn save(self: Box<Self>, path: &Path) -> Result<()>;
}

/// Workbook flavour chosen for an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Streaming `.xlsx` with bounded memory
    Streaming,
    /// In-memory `.xlsx`
    Xlsx,
    /// Legacy binary `.xls`
    Xls,
}

impl BackendKind {
    /// Pick the backend for a file name template
    ///
    /// `large` always selects the streaming backend; otherwise the extension
    /// decides, case-insensitively.
    pub fn select(file_name: &str, large: bool) -> Result<Self> {
        if large {
            return Ok(BackendKind::Streaming);
        }

        let lower = file_name.to_lowercase();
        if lower.ends_with(".xlsx") {
            Ok(BackendKind::Xlsx)
        } else if lower.ends_with(".xls") {
            Ok(BackendKind::Xls)
        } else {
            Err(ExportError::UnsupportedExtension {
                file: file_name.to_string(),
            })
        }
    }

    /// Create an empty workbook of this kind
    pub fn open(self) -> Result<Box<dyn WorkbookBackend>> {
        Ok(match self {
            BackendKind::Streaming => Box::new(StreamingWorkbook::new()?),
            BackendKind::Xlsx => Box::new(ExcelWriter::new()),
            BackendKind::Xls => Box::new(XlsWorkbook::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_backend() {
        assert_eq!(BackendKind::select("a.xlsx", false).unwrap(), BackendKind::Xlsx);
        assert_eq!(BackendKind::select("A.XLS", false).unwrap(), BackendKind::Xls);
        assert_eq!(BackendKind::select("a.xls", true).unwrap(), BackendKind::Streaming);
        assert_eq!(BackendKind::select("a.csv", true).unwrap(), BackendKind::Streaming);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = BackendKind::select("report_##Date##.csv", false).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedExtension { .. }));
    }

    const NONE: [&str; 0] = [];

    #[test]
    fn test_sheet_name_rules() {
        assert!(validate_sheet_name("Amounts 2024", NONE).is_ok());
        assert!(validate_sheet_name(&"a".repeat(31), NONE).is_ok());
        assert!(validate_sheet_name("it's", NONE).is_ok());

        for bad in ["", "   ", "a[1]", "x:y", "why?", "a*b", "a/b", "a\\b", "'quoted'", "tail'"] {
            let err = validate_sheet_name(bad, NONE).unwrap_err();
            assert!(matches!(err, ExportError::InvalidSheetName { .. }), "{:?}", bad);
        }
        assert!(validate_sheet_name(&"a".repeat(32), NONE).is_err());
    }

    #[test]
    fn test_sheet_name_duplicates_ignore_case() {
        let existing = ["Amounts", "People"];
        let err = validate_sheet_name("AMOUNTS", existing).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(validate_sheet_name("Totals", existing).is_ok());
    }

    #[test]
    fn test_every_backend_rejects_duplicate_sheet() {
        for kind in [BackendKind::Streaming, BackendKind::Xlsx, BackendKind::Xls] {
            let mut workbook = kind.open().unwrap();
            workbook.add_sheet("Data").unwrap();
            assert!(workbook.add_sheet("data").is_err(), "{:?}", kind);
            assert!(workbook.add_sheet("bad/name").is_err(), "{:?}", kind);
            assert!(workbook.add_sheet(&"n".repeat(32)).is_err(), "{:?}", kind);
        }
    }
}
