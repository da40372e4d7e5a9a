//! Legacy Excel 97-2003 (`.xls`) workbooks
//!
//! Cells are kept in memory until save, then serialized as a BIFF8
//! `Workbook` stream inside an OLE2 compound file. BIFF8 caps a sheet at
//! 65536 rows and 256 columns; writes beyond that fail.

pub mod biff;
pub mod cfb;

use crate::backend::{validate_sheet_name, WorkbookBackend};
use crate::error::{ExportError, Result};
use crate::styles::{StyleTable, HEADER_STYLE};
use crate::types::{column_width, date_to_serial, datetime_to_serial, CellValue, StyleId, StyledCell};
use indexmap::IndexSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Number of rows a BIFF8 sheet can hold
pub const MAX_ROWS: u32 = 65_536;
/// Number of columns a BIFF8 sheet can hold
pub const MAX_COLS: usize = 256;
/// Longest string a BIFF8 cell can hold, in UTF-16 code units
pub const MAX_STRING_LEN: usize = 32_767;

/// Cell XF of the default style; style ids map to `DEFAULT_CELL_XF + id`
const DEFAULT_CELL_XF: u16 = 15;
/// FONT index 4 does not exist in BIFF, so the fifth font record is index 5
const BOLD_FONT: u16 = 5;

#[derive(Debug, Clone, PartialEq)]
enum XlsCell {
    Blank,
    Number(f64),
    Bool(bool),
    Sst(u32),
}

#[derive(Debug)]
struct XlsSheet {
    name: String,
    cells: Vec<(u32, u16, u16, XlsCell)>,
    last_row: Option<u32>,
    max_col: u16,
    widths: Vec<usize>,
    frozen: bool,
    autosize: Option<u16>,
}

/// In-memory BIFF8 workbook
#[derive(Debug, Default)]
pub struct XlsWorkbook {
    sheets: Vec<XlsSheet>,
    styles: StyleTable,
    strings: IndexSet<String>,
    string_refs: u32,
}

impl XlsWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> Result<&mut XlsSheet> {
        self.sheets
            .last_mut()
            .ok_or_else(|| ExportError::WriteError("No active worksheet".to_string()))
    }

    fn xf_index(style: Option<StyleId>) -> u16 {
        DEFAULT_CELL_XF + style.map_or(0, |s| s.index() as u16)
    }

    fn intern(&mut self, s: &str) -> Result<u32> {
        if s.encode_utf16().count() > MAX_STRING_LEN {
            return Err(ExportError::WriteError(format!(
                "string of {} characters exceeds the .xls cell limit of {}",
                s.chars().count(),
                MAX_STRING_LEN
            )));
        }
        let (index, _) = self.strings.insert_full(s.to_string());
        self.string_refs += 1;
        Ok(index as u32)
    }

    fn write_globals(&self, out: &mut Vec<u8>) -> Result<Vec<usize>> {
        biff::write_bof(out, biff::BOF_WORKBOOK)?;
        biff::write_codepage(out, 1200)?;
        biff::write_window1(out)?;
        biff::write_date1904(out)?;

        for _ in 0..4 {
            biff::write_font(out, false)?;
        }
        biff::write_font(out, true)?;

        for (id, code) in self.styles.custom_formats() {
            biff::write_format(out, id, code)?;
        }

        // 15 style XFs, then the cell XFs: default, header, one per format
        biff::write_xf(out, 0, 0, true, 0)?;
        for _ in 1..15 {
            biff::write_xf(out, 0, 0, true, 0xF4)?;
        }
        biff::write_xf(out, 0, 0, false, 0)?;
        biff::write_xf(out, BOLD_FONT, 0, false, 0x08)?;
        for num_fmt_id in self.styles.cell_formats() {
            biff::write_xf(out, 0, num_fmt_id, false, 0x04)?;
        }
        biff::write_normal_style(out)?;

        let mut position_fields = Vec::with_capacity(self.sheets.len());
        for sheet in &self.sheets {
            let record_start = out.len();
            let offset = biff::write_boundsheet(out, &sheet.name)?;
            position_fields.push(record_start + offset);
        }

        let strings: Vec<&str> = self.strings.iter().map(String::as_str).collect();
        biff::write_sst(out, &strings, self.string_refs)?;
        biff::write_eof(out)?;
        Ok(position_fields)
    }

    fn write_sheet(out: &mut Vec<u8>, index: usize, sheet: &XlsSheet) -> Result<()> {
        biff::write_bof(out, biff::BOF_WORKSHEET)?;
        biff::write_wsbool(out)?;

        if let Some(columns) = sheet.autosize {
            for col in 0..columns.min(MAX_COLS as u16) {
                let chars = sheet.widths.get(col as usize).copied().unwrap_or(0);
                let width = (column_width(chars) * 256.0) as u16;
                biff::write_colinfo(out, col, width, DEFAULT_CELL_XF)?;
            }
        }

        match sheet.last_row {
            Some(last_row) => biff::write_dimensions(out, last_row + 1, sheet.max_col + 1)?,
            None => biff::write_dimensions(out, 0, 0)?,
        }

        for (row, col, xf, cell) in &sheet.cells {
            match cell {
                XlsCell::Blank => biff::write_blank(out, *row, *col, *xf)?,
                XlsCell::Number(n) => biff::write_number(out, *row, *col, *xf, *n)?,
                XlsCell::Bool(b) => biff::write_boolerr(out, *row, *col, *xf, *b)?,
                XlsCell::Sst(i) => biff::write_labelsst(out, *row, *col, *xf, *i)?,
            }
        }

        biff::write_window2(out, index == 0, sheet.frozen)?;
        if sheet.frozen {
            biff::write_pane(out, 1)?;
        }
        biff::write_eof(out)
    }

    /// Serialize the BIFF8 workbook stream
    pub fn to_biff(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let position_fields = self.write_globals(&mut out)?;

        for (index, sheet) in self.sheets.iter().enumerate() {
            let offset = out.len() as u32;
            let field = position_fields[index];
            out[field..field + 4].copy_from_slice(&offset.to_le_bytes());
            Self::write_sheet(&mut out, index, sheet)?;
        }
        Ok(out)
    }

    /// Write the compound file to `path`
    pub fn close<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let stream = self.to_biff()?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        cfb::write_single_stream(&mut writer, "Workbook", &stream)?;
        writer.flush()?;
        Ok(())
    }
}

impl WorkbookBackend for XlsWorkbook {
    fn add_sheet(&mut self, name: &str) -> Result<()> {
        validate_sheet_name(name, self.sheets.iter().map(|s| s.name.as_str()))?;
        self.sheets.push(XlsSheet {
            name: name.to_string(),
            cells: Vec::new(),
            last_row: None,
            max_col: 0,
            widths: Vec::new(),
            frozen: false,
            autosize: None,
        });
        Ok(())
    }

    fn header_style(&mut self) -> Result<StyleId> {
        Ok(HEADER_STYLE)
    }

    fn register_style(&mut self, format: &str) -> Result<StyleId> {
        Ok(self.styles.register(format))
    }

    fn write_row(&mut self, row: u32, cells: &[StyledCell]) -> Result<()> {
        self.current()?;
        if row >= MAX_ROWS {
            return Err(ExportError::WriteError(format!(
                "row {} exceeds the .xls limit of {} rows; mark the file as large to write .xlsx",
                row + 1,
                MAX_ROWS
            )));
        }
        if cells.len() > MAX_COLS {
            return Err(ExportError::WriteError(format!(
                "{} columns exceed the .xls limit of {}",
                cells.len(),
                MAX_COLS
            )));
        }

        let mut encoded = Vec::with_capacity(cells.len());
        for cell in cells {
            let serial = match &cell.value {
                CellValue::Date(d) => date_to_serial(*d),
                CellValue::DateTime(dt) => datetime_to_serial(*dt),
                _ => None,
            };
            let value = match (&cell.value, serial) {
                (CellValue::Empty, _) if cell.style.is_some() => Some(XlsCell::Blank),
                (CellValue::Empty, _) => None,
                (CellValue::Number(n), _) => Some(XlsCell::Number(*n)),
                (CellValue::Bool(b), _) => Some(XlsCell::Bool(*b)),
                (CellValue::Date(_) | CellValue::DateTime(_), Some(serial)) => {
                    Some(XlsCell::Number(serial))
                }
                (value, _) => Some(XlsCell::Sst(self.intern(&value.as_string())?)),
            };
            encoded.push((value, Self::xf_index(cell.style), cell.value.display_len()));
        }

        let sheet = self.current()?;
        for (col, (value, xf, len)) in encoded.into_iter().enumerate() {
            if sheet.widths.len() <= col {
                sheet.widths.resize(col + 1, 0);
            }
            sheet.widths[col] = sheet.widths[col].max(len);
            if let Some(value) = value {
                sheet.cells.push((row, col as u16, xf, value));
                sheet.max_col = sheet.max_col.max(col as u16);
            }
        }
        sheet.last_row = Some(sheet.last_row.map_or(row, |last| last.max(row)));
        Ok(())
    }

    fn freeze_header(&mut self) -> Result<()> {
        self.current()?.frozen = true;
        Ok(())
    }

    fn autosize_columns(&mut self, columns: u16) -> Result<()> {
        self.current()?.autosize = Some(columns);
        Ok(())
    }

    fn save(self: Box<Self>, path: &Path) -> Result<()> {
        self.close(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn find_record(stream: &[u8], wanted: u16) -> Vec<Vec<u8>> {
        let mut found = Vec::new();
        let mut pos = 0;
        while pos + 4 <= stream.len() {
            let ty = u16::from_le_bytes([stream[pos], stream[pos + 1]]);
            let len = u16::from_le_bytes([stream[pos + 2], stream[pos + 3]]) as usize;
            if ty == wanted {
                found.push(stream[pos + 4..pos + 4 + len].to_vec());
            }
            pos += 4 + len;
        }
        found
    }

    fn sample() -> XlsWorkbook {
        let mut book = XlsWorkbook::new();
        book.add_sheet("Data").unwrap();
        let header = book.header_style().unwrap();
        let money = book.register_style("0.00").unwrap();
        let date = book.register_style("dd.MM.yyyy").unwrap();
        book.write_row(
            0,
            &[
                StyledCell::new("ID".into(), header),
                StyledCell::new("AMOUNT".into(), header),
                StyledCell::new("DAY".into(), header),
            ],
        )
        .unwrap();
        book.write_row(
            1,
            &[
                StyledCell::new(CellValue::Number(1.0), money),
                StyledCell::new(CellValue::Number(10.5), money),
                StyledCell::new(
                    CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
                    date,
                ),
            ],
        )
        .unwrap();
        book.freeze_header().unwrap();
        book.autosize_columns(3).unwrap();
        book
    }

    #[test]
    fn test_biff_stream_structure() {
        let stream = sample().to_biff().unwrap();

        let sst = find_record(&stream, 0x00FC);
        assert_eq!(sst.len(), 1);
        assert_eq!(&sst[0][0..8], &[3, 0, 0, 0, 3, 0, 0, 0]);

        let formats = find_record(&stream, 0x041E);
        assert_eq!(formats.len(), 1);
        assert_eq!(&formats[0][0..2], &164u16.to_le_bytes());

        // 15 style XFs + default + header + two formats
        assert_eq!(find_record(&stream, 0x00E0).len(), 19);

        let numbers = find_record(&stream, 0x0203);
        assert_eq!(numbers.len(), 3);
        let serial = f64::from_le_bytes(numbers[2][6..14].try_into().unwrap());
        assert_eq!(serial, 45306.0);
        // date cell uses XF 15 + StyleId(3)
        assert_eq!(&numbers[2][4..6], &18u16.to_le_bytes());

        assert_eq!(find_record(&stream, 0x0041).len(), 1);
        assert_eq!(find_record(&stream, 0x007D).len(), 3);
    }

    #[test]
    fn test_boundsheet_points_at_sheet_bof() {
        let stream = sample().to_biff().unwrap();
        let boundsheet = &find_record(&stream, 0x0085)[0];
        let offset = u32::from_le_bytes(boundsheet[0..4].try_into().unwrap()) as usize;
        assert_eq!(&stream[offset..offset + 2], &0x0809u16.to_le_bytes());
        assert_eq!(&stream[offset + 6..offset + 8], &biff::BOF_WORKSHEET.to_le_bytes());
    }

    #[test]
    fn test_row_limit() {
        let mut book = XlsWorkbook::new();
        book.add_sheet("Big").unwrap();
        assert!(book.write_row(65_535, &[CellValue::Number(1.0).into()]).is_ok());
        assert!(book.write_row(65_536, &[CellValue::Number(1.0).into()]).is_err());
    }

    #[test]
    fn test_sheet_names_checked_on_add() {
        let mut book = XlsWorkbook::new();
        book.add_sheet("Data").unwrap();
        let err = book.add_sheet("data").unwrap_err();
        assert!(matches!(err, ExportError::InvalidSheetName { .. }));
        assert!(book.add_sheet(&"x".repeat(32)).is_err());
        assert!(book.add_sheet("a:b").is_err());
        assert_eq!(book.sheets.len(), 1);
    }

    #[test]
    fn test_save_writes_compound_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xls");
        Box::new(sample()).save(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], &[0xD0, 0xCF, 0x11, 0xE0]);
        assert_eq!(bytes.len() % 512, 0);
    }
}
