//! Streaming workbook: sheet rows go to temporary files as they are written
//! and are only assembled into the zip package on save

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use super::xml_writer::XmlWriter;
use crate::backend::{validate_sheet_name, WorkbookBackend};
use crate::error::{ExportError, Result};
use crate::styles::{StyleTable, HEADER_STYLE};
use crate::types::{col_to_letter, column_width, date_to_serial, datetime_to_serial};
use crate::types::{CellValue, StyleId, StyledCell};

/// Rows streamed between two forced flushes of a sheet's temp file
pub const DEFAULT_FLUSH_INTERVAL: u32 = 1000;
/// Number of rows an `.xlsx` sheet can hold
pub const MAX_ROWS: u32 = 1_048_576;
/// Number of columns an `.xlsx` sheet can hold
pub const MAX_COLS: usize = 16_384;

struct SheetPart {
    name: String,
    data: XmlWriter<BufWriter<File>>,
    rows_written: u32,
    last_row: Option<u32>,
    max_col: u32,
    /// Longest rendered length seen per column
    widths: Vec<usize>,
    frozen: bool,
    autosize: Option<u16>,
}

/// Workbook for large exports with memory bounded by the row buffer
pub struct StreamingWorkbook {
    sheets: Vec<SheetPart>,
    styles: StyleTable,
    cell_ref_cache: Vec<String>, // Column letters for the first 100 columns
    flush_interval: u32,
}

impl StreamingWorkbook {
    /// Create a new streaming workbook
    pub fn new() -> Result<Self> {
        let cell_ref_cache = (0..100).map(col_to_letter).collect();

        Ok(StreamingWorkbook {
            sheets: Vec::new(),
            styles: StyleTable::new(),
            cell_ref_cache,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        })
    }

    /// Set flush interval (rows between forced flushes to disk)
    pub fn set_flush_interval(&mut self, interval: u32) {
        self.flush_interval = interval;
    }

    /// Names of the sheets added so far
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    fn current(&mut self) -> Result<&mut SheetPart> {
        self.sheets
            .last_mut()
            .ok_or_else(|| ExportError::WriteError("No active worksheet".to_string()))
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(6))
            .large_file(true)
    }

    fn write_cell(
        data: &mut XmlWriter<BufWriter<File>>,
        reference: &str,
        row_ref: &str,
        cell: &StyledCell,
    ) -> Result<()> {
        let serial = match &cell.value {
            CellValue::Date(d) => date_to_serial(*d),
            CellValue::DateTime(dt) => datetime_to_serial(*dt),
            _ => None,
        };

        if cell.value.is_empty() && cell.style.is_none() {
            return Ok(());
        }

        data.write_raw(b"<c r=\"")?;
        data.write_str(reference)?;
        data.write_str(row_ref)?;
        data.write_raw(b"\"")?;
        if let Some(style) = cell.style {
            data.attribute_int("s", style.index() as i64)?;
        }

        match (&cell.value, serial) {
            (CellValue::Empty, _) => data.write_raw(b"/>")?,
            (CellValue::Number(n), _) => {
                data.write_raw(b"><v>")?;
                data.write_f64(*n)?;
                data.write_raw(b"</v></c>")?;
            }
            (CellValue::Bool(b), _) => {
                data.write_raw(b" t=\"b\"><v>")?;
                data.write_raw(if *b { b"1" } else { b"0" })?;
                data.write_raw(b"</v></c>")?;
            }
            (CellValue::Date(_) | CellValue::DateTime(_), Some(serial)) => {
                data.write_raw(b"><v>")?;
                data.write_f64(serial)?;
                data.write_raw(b"</v></c>")?;
            }
            (value, _) => {
                // Strings, and dates before the 1900 epoch as ISO text
                data.write_raw(b" t=\"inlineStr\"><is><t xml:space=\"preserve\">")?;
                data.write_escaped(&value.as_string())?;
                data.write_raw(b"</t></is></c>")?;
            }
        }
        Ok(())
    }

    fn write_sheet<W: Write + Seek>(
        zip: &mut ZipWriter<W>,
        index: usize,
        sheet: SheetPart,
    ) -> Result<()> {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", index + 1), Self::options())?;

        {
            let mut xml_writer = XmlWriter::new(&mut *zip);
            xml_writer.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
            xml_writer.start_element("worksheet")?;
            xml_writer.attribute(
                "xmlns",
                "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
            )?;
            xml_writer.attribute(
                "xmlns:r",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
            )?;
            xml_writer.close_start_tag()?;

            if let Some(last_row) = sheet.last_row {
                xml_writer.start_element("dimension")?;
                xml_writer.attribute(
                    "ref",
                    &format!("A1:{}{}", col_to_letter(sheet.max_col), last_row + 1),
                )?;
                xml_writer.write_raw(b"/>")?;
            }

            xml_writer.write_str("<sheetViews><sheetView")?;
            if index == 0 {
                xml_writer.attribute("tabSelected", "1")?;
            }
            xml_writer.attribute("workbookViewId", "0")?;
            if sheet.frozen {
                xml_writer.write_str(
                    "><pane ySplit=\"1\" topLeftCell=\"A2\" activePane=\"bottomLeft\" state=\"frozen\"/>\
<selection pane=\"bottomLeft\"/></sheetView></sheetViews>",
                )?;
            } else {
                xml_writer.write_str("/></sheetViews>")?;
            }
            xml_writer.write_str("<sheetFormatPr defaultRowHeight=\"15\"/>")?;

            if let Some(columns) = sheet.autosize.filter(|c| *c > 0) {
                xml_writer.start_element("cols")?;
                xml_writer.close_start_tag()?;
                for col in 0..columns as usize {
                    let chars = sheet.widths.get(col).copied().unwrap_or(0);
                    xml_writer.start_element("col")?;
                    xml_writer.attribute_int("min", (col + 1) as i64)?;
                    xml_writer.attribute_int("max", (col + 1) as i64)?;
                    xml_writer.attribute("width", &format!("{:.2}", column_width(chars)))?;
                    xml_writer.attribute("customWidth", "1")?;
                    xml_writer.write_raw(b"/>")?;
                }
                xml_writer.end_element("cols")?;
            }

            xml_writer.start_element("sheetData")?;
            xml_writer.close_start_tag()?;
            xml_writer.flush()?;
        }

        let buffered = sheet.data.into_inner()?;
        let mut file = buffered
            .into_inner()
            .map_err(|e| ExportError::IoError(e.into_error()))?;
        file.seek(SeekFrom::Start(0))?;
        io::copy(&mut file, zip)?;

        let mut xml_writer = XmlWriter::new(&mut *zip);
        xml_writer.end_element("sheetData")?;
        xml_writer.end_element("worksheet")?;
        xml_writer.flush()
    }

    /// Write the zip package to `path`
    pub fn close<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(64 * 1024, file); // 64KB buffer
        let mut zip = ZipWriter::new(writer);
        let options = Self::options();

        zip.start_file("[Content_Types].xml", options)?;
        Self::write_content_types(&mut zip, self.sheets.len())?;

        zip.start_file("_rels/.rels", options)?;
        Self::write_root_rels(&mut zip)?;

        zip.start_file("docProps/core.xml", options)?;
        Self::write_core_props(&mut zip)?;

        zip.start_file("docProps/app.xml", options)?;
        Self::write_app_props(&mut zip)?;

        zip.start_file("xl/workbook.xml", options)?;
        Self::write_workbook_xml(&mut zip, &self.sheets)?;

        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        Self::write_workbook_rels(&mut zip, self.sheets.len())?;

        zip.start_file("xl/styles.xml", options)?;
        {
            let mut xml_writer = XmlWriter::new(&mut zip);
            self.styles.write_xml(&mut xml_writer)?;
        }

        for (index, sheet) in self.sheets.into_iter().enumerate() {
            log::debug!("Streaming sheet '{}' ({} rows) into package", sheet.name, sheet.rows_written);
            Self::write_sheet(&mut zip, index, sheet)?;
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        Ok(())
    }

    fn write_content_types<W: Write>(writer: &mut W, sheet_count: usize) -> Result<()> {
        let mut xml_writer = XmlWriter::new(writer);
        xml_writer.write_str(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
"#,
        )?;
        for i in 1..=sheet_count {
            xml_writer.write_str(&format!(
                "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\n",
                i
            ))?;
        }
        xml_writer.write_str(
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
</Types>"#,
        )?;
        xml_writer.flush()
    }

    fn write_root_rels<W: Write>(writer: &mut W) -> Result<()> {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;
        writer.write_all(xml.as_bytes())?;
        Ok(())
    }

    fn write_core_props<W: Write>(writer: &mut W) -> Result<()> {
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>sqlexcel</dc:creator>
<cp:lastModifiedBy>sqlexcel</cp:lastModifiedBy>
<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>
</cp:coreProperties>"#
        );
        writer.write_all(xml.as_bytes())?;
        Ok(())
    }

    fn write_app_props<W: Write>(writer: &mut W) -> Result<()> {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>sqlexcel</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
<AppVersion>1.0</AppVersion>
</Properties>"#;
        writer.write_all(xml.as_bytes())?;
        Ok(())
    }

    fn write_workbook_xml<W: Write>(writer: &mut W, sheets: &[SheetPart]) -> Result<()> {
        let mut xml_writer = XmlWriter::new(writer);

        xml_writer.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
        xml_writer.start_element("workbook")?;
        xml_writer.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        xml_writer.attribute(
            "xmlns:r",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
        )?;
        xml_writer.close_start_tag()?;

        xml_writer.start_element("sheets")?;
        xml_writer.close_start_tag()?;

        for (i, sheet) in sheets.iter().enumerate() {
            let sheet_id = i + 1;
            xml_writer.start_element("sheet")?;
            xml_writer.attribute("name", &sheet.name)?;
            xml_writer.attribute_int("sheetId", sheet_id as i64)?;
            xml_writer.attribute("r:id", &format!("rId{}", sheet_id))?;
            xml_writer.write_raw(b"/>")?;
        }

        xml_writer.end_element("sheets")?;
        xml_writer.end_element("workbook")?;
        xml_writer.flush()
    }

    fn write_workbook_rels<W: Write>(writer: &mut W, sheet_count: usize) -> Result<()> {
        let mut xml_writer = XmlWriter::new(writer);

        xml_writer.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
        xml_writer.start_element("Relationships")?;
        xml_writer.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/package/2006/relationships",
        )?;
        xml_writer.close_start_tag()?;

        for i in 0..sheet_count {
            let rid = i + 1;
            xml_writer.start_element("Relationship")?;
            xml_writer.attribute("Id", &format!("rId{}", rid))?;
            xml_writer.attribute(
                "Type",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
            )?;
            xml_writer.attribute("Target", &format!("worksheets/sheet{}.xml", rid))?;
            xml_writer.write_raw(b"/>")?;
        }

        xml_writer.start_element("Relationship")?;
        xml_writer.attribute("Id", &format!("rId{}", sheet_count + 1))?;
        xml_writer.attribute(
            "Type",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
        )?;
        xml_writer.attribute("Target", "styles.xml")?;
        xml_writer.write_raw(b"/>")?;

        xml_writer.end_element("Relationships")?;
        xml_writer.flush()
    }
}

impl WorkbookBackend for StreamingWorkbook {
    fn add_sheet(&mut self, name: &str) -> Result<()> {
        validate_sheet_name(name, self.sheets.iter().map(|s| s.name.as_str()))?;
        let file = tempfile::tempfile()?;
        self.sheets.push(SheetPart {
            name: name.to_string(),
            data: XmlWriter::new(BufWriter::with_capacity(64 * 1024, file)),
            rows_written: 0,
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
        if row >= MAX_ROWS {
            return Err(ExportError::WriteError(format!(
                "row {} exceeds the .xlsx limit of {} rows",
                row + 1,
                MAX_ROWS
            )));
        }
        if cells.len() > MAX_COLS {
            return Err(ExportError::WriteError(format!(
                "{} columns exceed the .xlsx limit of {}",
                cells.len(),
                MAX_COLS
            )));
        }

        let flush_interval = self.flush_interval;
        let mut extra_refs = Vec::new();
        for col in self.cell_ref_cache.len()..cells.len() {
            extra_refs.push(col_to_letter(col as u32));
        }
        let cache = &self.cell_ref_cache;
        let sheet = self
            .sheets
            .last_mut()
            .ok_or_else(|| ExportError::WriteError("No active worksheet".to_string()))?;

        if sheet.last_row.is_some_and(|last| row <= last) {
            return Err(ExportError::WriteError(format!(
                "row {} written out of order in sheet '{}'",
                row, sheet.name
            )));
        }

        let mut row_buf = itoa::Buffer::new();
        let row_ref = row_buf.format(row + 1);

        sheet.data.write_raw(b"<row r=\"")?;
        sheet.data.write_str(row_ref)?;
        sheet.data.write_raw(b"\">")?;

        for (col_idx, cell) in cells.iter().enumerate() {
            let reference = match cache.get(col_idx) {
                Some(letter) => letter.as_str(),
                None => extra_refs[col_idx - cache.len()].as_str(),
            };
            Self::write_cell(&mut sheet.data, reference, row_ref, cell)?;

            let len = cell.value.display_len();
            if sheet.widths.len() <= col_idx {
                sheet.widths.resize(col_idx + 1, 0);
            }
            sheet.widths[col_idx] = sheet.widths[col_idx].max(len);
        }

        sheet.data.write_raw(b"</row>")?;
        sheet.rows_written += 1;
        sheet.last_row = Some(row);
        if !cells.is_empty() {
            sheet.max_col = sheet.max_col.max(cells.len() as u32 - 1);
        }

        if flush_interval > 0 && sheet.rows_written % flush_interval == 0 {
            sheet.data.flush()?;
        }
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
