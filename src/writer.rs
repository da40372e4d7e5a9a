//! In-memory `.xlsx` workbook built with `rust_xlsxwriter`

use crate::backend::{validate_sheet_name, WorkbookBackend};
use crate::error::{ExportError, Result};
use crate::styles::excel_format_code;
use crate::types::{date_to_serial, datetime_to_serial, CellValue, StyleId, StyledCell};
use indexmap::IndexMap;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

/// Excel writer that keeps the whole workbook in memory until saved
///
/// Sheets are built one at a time; adding a sheet pushes the previous one
/// into the workbook.
pub struct ExcelWriter {
    workbook: Workbook,
    current_sheet: Option<Worksheet>,
    /// Names of every sheet added, the current one last
    sheet_names: Vec<String>,
    /// Formats indexed by style id; 0 is the default, 1 the header
    formats: Vec<Format>,
    format_ids: IndexMap<String, StyleId>,
}

impl ExcelWriter {
    /// Create an empty workbook
    pub fn new() -> Self {
        ExcelWriter {
            workbook: Workbook::new(),
            current_sheet: None,
            sheet_names: Vec::new(),
            formats: vec![Format::new(), Format::new().set_bold()],
            format_ids: IndexMap::new(),
        }
    }

    fn sheet(&mut self) -> Result<&mut Worksheet> {
        self.current_sheet
            .as_mut()
            .ok_or_else(|| ExportError::WriteError("No active worksheet".to_string()))
    }

    /// Name of the sheet currently being written
    pub fn current_sheet_name(&self) -> Option<&str> {
        self.sheet_names.last().map(String::as_str)
    }

    fn write_cell(
        sheet: &mut Worksheet,
        row: u32,
        col: u16,
        cell: &StyledCell,
        format: Option<&Format>,
    ) -> Result<()> {
        let serial = match &cell.value {
            CellValue::Date(d) => date_to_serial(*d),
            CellValue::DateTime(dt) => datetime_to_serial(*dt),
            _ => None,
        };

        match (&cell.value, serial, format) {
            (CellValue::Empty, _, Some(format)) => {
                sheet.write_blank(row, col, format)?;
            }
            (CellValue::Empty, _, None) => {}
            (CellValue::Number(n), _, Some(format)) => {
                sheet.write_number_with_format(row, col, *n, format)?;
            }
            (CellValue::Number(n), _, None) => {
                sheet.write_number(row, col, *n)?;
            }
            (CellValue::Bool(b), _, Some(format)) => {
                sheet.write_boolean_with_format(row, col, *b, format)?;
            }
            (CellValue::Bool(b), _, None) => {
                sheet.write_boolean(row, col, *b)?;
            }
            (CellValue::Date(_) | CellValue::DateTime(_), Some(serial), Some(format)) => {
                sheet.write_number_with_format(row, col, serial, format)?;
            }
            (CellValue::Date(_) | CellValue::DateTime(_), Some(serial), None) => {
                sheet.write_number(row, col, serial)?;
            }
            (value, _, Some(format)) => {
                sheet.write_string_with_format(row, col, value.as_string(), format)?;
            }
            (value, _, None) => {
                sheet.write_string(row, col, value.as_string())?;
            }
        }
        Ok(())
    }
}

impl Default for ExcelWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkbookBackend for ExcelWriter {
    fn add_sheet(&mut self, name: &str) -> Result<()> {
        validate_sheet_name(name, self.sheet_names.iter().map(String::as_str))?;
        if let Some(sheet) = self.current_sheet.take() {
            self.workbook.push_worksheet(sheet);
        }

        let mut new_sheet = Worksheet::new();
        new_sheet.set_name(name)?;
        self.current_sheet = Some(new_sheet);
        self.sheet_names.push(name.to_string());
        Ok(())
    }

    fn header_style(&mut self) -> Result<StyleId> {
        Ok(StyleId(1))
    }

    fn register_style(&mut self, format: &str) -> Result<StyleId> {
        let code = excel_format_code(format);
        if let Some(id) = self.format_ids.get(code) {
            return Ok(*id);
        }

        let id = StyleId(self.formats.len() as u32);
        self.formats.push(Format::new().set_num_format(code));
        self.format_ids.insert(code.to_string(), id);
        Ok(id)
    }

    fn write_row(&mut self, row: u32, cells: &[StyledCell]) -> Result<()> {
        let sheet = self
            .current_sheet
            .as_mut()
            .ok_or_else(|| ExportError::WriteError("No active worksheet".to_string()))?;

        for (col, cell) in cells.iter().enumerate() {
            let format = cell
                .style
                .and_then(|style| self.formats.get(style.index() as usize));
            Self::write_cell(sheet, row, col as u16, cell, format)?;
        }
        Ok(())
    }

    fn freeze_header(&mut self) -> Result<()> {
        self.sheet()?.set_freeze_panes(1, 0)?;
        Ok(())
    }

    fn autosize_columns(&mut self, _columns: u16) -> Result<()> {
        self.sheet()?.autofit();
        Ok(())
    }

    fn save(mut self: Box<Self>, path: &Path) -> Result<()> {
        if let Some(sheet) = self.current_sheet.take() {
            self.workbook.push_worksheet(sheet);
        }

        self.workbook.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use tempfile::tempdir;

    #[test]
    fn test_register_style_dedupes() {
        let mut writer = ExcelWriter::new();
        let a = writer.register_style("0.00").unwrap();
        let b = writer.register_style("text").unwrap();
        let c = writer.register_style("0.00").unwrap();
        assert_eq!(a, StyleId(2));
        assert_eq!(b, StyleId(3));
        assert_eq!(a, c);
    }

    #[test]
    fn test_write_without_sheet_fails() {
        let mut writer = ExcelWriter::new();
        assert!(writer.write_row(0, &[CellValue::Number(1.0).into()]).is_err());
        assert!(writer.freeze_header().is_err());
    }

    #[test]
    fn test_duplicate_sheet_rejected_on_add() {
        let mut writer = ExcelWriter::new();
        writer.add_sheet("Totals").unwrap();
        let err = writer.add_sheet("totals").unwrap_err();
        assert!(matches!(err, ExportError::InvalidSheetName { .. }));
        assert!(writer.add_sheet("'Quoted'").is_err());
        assert_eq!(writer.current_sheet_name(), Some("Totals"));
    }

    #[test]
    fn test_two_sheets_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut writer = ExcelWriter::new();
        writer.add_sheet("First").unwrap();
        let header = writer.header_style().unwrap();
        writer
            .write_row(0, &[StyledCell::new("NAME".into(), header)])
            .unwrap();
        writer.write_row(1, &[CellValue::from("alpha").into()]).unwrap();
        writer.freeze_header().unwrap();
        writer.autosize_columns(1).unwrap();

        writer.add_sheet("Second").unwrap();
        let style = writer.register_style("0.00").unwrap();
        writer
            .write_row(0, &[StyledCell::new(CellValue::Number(2.5), style)])
            .unwrap();
        Box::new(writer).save(&path).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["First", "Second"]);
        let range = workbook.worksheet_range("Second").unwrap();
        assert_eq!(range.get((0, 0)), Some(&Data::Float(2.5)));
    }
}
