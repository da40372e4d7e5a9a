//! Cell style registry shared by the hand-written workbook formats
//!
//! Styles are de-duplicated by number format. Index 0 is the default cell
//! style and index 1 the bold header style; every distinct format registered
//! afterwards gets the next index. Built-in Excel formats keep their built-in
//! ids, custom format codes are numbered from 164 upward.

use crate::fast_writer::xml_writer::XmlWriter;
use crate::error::Result;
use crate::format::TEXT_FORMAT;
use crate::types::StyleId;
use indexmap::IndexMap;
use std::io::Write;

/// Style index of the default cell style
pub const DEFAULT_STYLE: StyleId = StyleId(0);
/// Style index of the bold header style
pub const HEADER_STYLE: StyleId = StyleId(1);

/// First number format id available for custom format codes
pub const FIRST_CUSTOM_FORMAT_ID: u16 = 164;

const BUILTIN_FORMATS: &[(&str, u16)] = &[("General", 0), ("0", 1), ("0.00", 2), ("@", 49)];

/// Translate a display format into an Excel number format code
pub fn excel_format_code(format: &str) -> &str {
    if format == TEXT_FORMAT {
        "@"
    } else {
        format
    }
}

/// Registered number formats and the cell styles that use them
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    /// Custom format code -> number format id
    custom: IndexMap<String, u16>,
    /// Number format id -> style index, in registration order
    styles: IndexMap<u16, StyleId>,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display format and return the style that applies it
    pub fn register(&mut self, format: &str) -> StyleId {
        let code = excel_format_code(format);
        let num_fmt_id = match BUILTIN_FORMATS.iter().find(|(builtin, _)| *builtin == code) {
            Some((_, id)) => *id,
            None => {
                let next = FIRST_CUSTOM_FORMAT_ID + self.custom.len() as u16;
                *self.custom.entry(code.to_string()).or_insert(next)
            }
        };

        let next_style = StyleId(2 + self.styles.len() as u32);
        *self.styles.entry(num_fmt_id).or_insert(next_style)
    }

    /// Custom number formats as (id, format code)
    pub fn custom_formats(&self) -> impl Iterator<Item = (u16, &str)> + '_ {
        self.custom.iter().map(|(code, id)| (*id, code.as_str()))
    }

    /// Number format id of every registered style, in style index order
    pub fn cell_formats(&self) -> impl Iterator<Item = u16> + '_ {
        self.styles.keys().copied()
    }

    /// Number of registered data styles (excluding default and header)
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Write `xl/styles.xml`
    pub fn write_xml<W: Write>(&self, xml_writer: &mut XmlWriter<W>) -> Result<()> {
        xml_writer.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
        xml_writer.start_element("styleSheet")?;
        xml_writer.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        xml_writer.close_start_tag()?;

        if !self.custom.is_empty() {
            xml_writer.start_element("numFmts")?;
            xml_writer.attribute_int("count", self.custom.len() as i64)?;
            xml_writer.close_start_tag()?;
            for (id, code) in self.custom_formats() {
                xml_writer.start_element("numFmt")?;
                xml_writer.attribute_int("numFmtId", id as i64)?;
                xml_writer.attribute("formatCode", code)?;
                xml_writer.write_raw(b"/>")?;
            }
            xml_writer.end_element("numFmts")?;
        }

        xml_writer.write_str(
            "<fonts count=\"2\">\
<font><sz val=\"11\"/><name val=\"Calibri\"/></font>\
<font><b/><sz val=\"11\"/><name val=\"Calibri\"/></font>\
</fonts>\
<fills count=\"2\">\
<fill><patternFill patternType=\"none\"/></fill>\
<fill><patternFill patternType=\"gray125\"/></fill>\
</fills>\
<borders count=\"1\">\
<border><left/><right/><top/><bottom/><diagonal/></border>\
</borders>\
<cellStyleXfs count=\"1\">\
<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/>\
</cellStyleXfs>",
        )?;

        xml_writer.start_element("cellXfs")?;
        xml_writer.attribute_int("count", 2 + self.styles.len() as i64)?;
        xml_writer.close_start_tag()?;
        xml_writer.write_str("<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>")?;
        xml_writer.write_str(
            "<xf numFmtId=\"0\" fontId=\"1\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyFont=\"1\"/>",
        )?;
        for num_fmt_id in self.cell_formats() {
            xml_writer.start_element("xf")?;
            xml_writer.attribute_int("numFmtId", num_fmt_id as i64)?;
            xml_writer.write_str(
                " fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyNumberFormat=\"1\"/>",
            )?;
        }
        xml_writer.end_element("cellXfs")?;

        xml_writer.write_str(
            "<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>",
        )?;
        xml_writer.end_element("styleSheet")?;
        xml_writer.flush()
    }
}
