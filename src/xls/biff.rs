//! BIFF8 record writers
//!
//! Each BIFF record consists of:
//! - Record type (2 bytes)
//! - Record length (2 bytes), at most [`MAX_RECORD_DATA`]
//! - Record data
//!
//! Layouts follow "[MS-XLS]: Excel Binary File Format (.xls) Structure".

use crate::error::{ExportError, Result};
use std::io::Write;

/// Largest payload a single record may carry
pub const MAX_RECORD_DATA: usize = 8224;

/// BOF substream type of the workbook globals
pub const BOF_WORKBOOK: u16 = 0x0005;
/// BOF substream type of a worksheet
pub const BOF_WORKSHEET: u16 = 0x0010;

/// Write a BIFF record header
#[inline]
pub fn write_record_header<W: Write>(writer: &mut W, record_type: u16, data_len: u16) -> Result<()> {
    writer.write_all(&record_type.to_le_bytes())?;
    writer.write_all(&data_len.to_le_bytes())?;
    Ok(())
}

fn row_index(row: u32, record: &str) -> Result<u16> {
    u16::try_from(row).map_err(|_| {
        ExportError::WriteError(format!(
            "Row index {} exceeds BIFF8 limit 65535 for {} record",
            row, record
        ))
    })
}

/// Encode an XLUnicodeString body: flags byte then compressed or UTF-16LE chars
fn unicode_chars(s: &str) -> (u8, Vec<u8>, usize) {
    if s.chars().all(|c| (c as u32) < 0x100) {
        let bytes: Vec<u8> = s.chars().map(|c| c as u32 as u8).collect();
        let cch = bytes.len();
        (0x00, bytes, cch)
    } else {
        let utf16: Vec<u16> = s.encode_utf16().collect();
        let bytes = utf16.iter().flat_map(|u| u.to_le_bytes()).collect();
        (0x01, bytes, utf16.len())
    }
}

/// Write BOF (Beginning of File) record, type 0x0809
pub fn write_bof<W: Write>(writer: &mut W, substream_type: u16) -> Result<()> {
    write_record_header(writer, 0x0809, 16)?;
    writer.write_all(&0x0600u16.to_le_bytes())?; // BIFF8
    writer.write_all(&substream_type.to_le_bytes())?;
    writer.write_all(&0x0DBBu16.to_le_bytes())?; // build identifier
    writer.write_all(&0x07CCu16.to_le_bytes())?; // build year
    writer.write_all(&0u32.to_le_bytes())?; // file history flags
    writer.write_all(&6u32.to_le_bytes())?; // lowest BIFF version
    Ok(())
}

/// Write EOF record, type 0x000A
pub fn write_eof<W: Write>(writer: &mut W) -> Result<()> {
    write_record_header(writer, 0x000A, 0)
}

/// Write CODEPAGE record, type 0x0042
pub fn write_codepage<W: Write>(writer: &mut W, codepage: u16) -> Result<()> {
    write_record_header(writer, 0x0042, 2)?;
    writer.write_all(&codepage.to_le_bytes())?;
    Ok(())
}

/// Write DATE1904 record, type 0x0022 (always the 1900 date system)
pub fn write_date1904<W: Write>(writer: &mut W) -> Result<()> {
    write_record_header(writer, 0x0022, 2)?;
    writer.write_all(&0u16.to_le_bytes())?;
    Ok(())
}

/// Write WINDOW1 record, type 0x003D
pub fn write_window1<W: Write>(writer: &mut W) -> Result<()> {
    write_record_header(writer, 0x003D, 18)?;
    writer.write_all(&0u16.to_le_bytes())?; // xWn
    writer.write_all(&0u16.to_le_bytes())?; // yWn
    writer.write_all(&0x3000u16.to_le_bytes())?; // dxWn
    writer.write_all(&0x1E00u16.to_le_bytes())?; // dyWn
    writer.write_all(&0x0038u16.to_le_bytes())?; // grbit
    writer.write_all(&0u16.to_le_bytes())?; // itabCur
    writer.write_all(&0u16.to_le_bytes())?; // itabFirst
    writer.write_all(&1u16.to_le_bytes())?; // ctabSel
    writer.write_all(&0x0258u16.to_le_bytes())?; // wTabRatio
    Ok(())
}

/// Write FONT record, type 0x0031; 10pt Arial, regular or bold
pub fn write_font<W: Write>(writer: &mut W, bold: bool) -> Result<()> {
    let name = b"Arial";
    write_record_header(writer, 0x0031, (14 + 2 + name.len()) as u16)?;
    writer.write_all(&200u16.to_le_bytes())?; // height in twips
    writer.write_all(&0u16.to_le_bytes())?; // attributes
    writer.write_all(&0x7FFFu16.to_le_bytes())?; // automatic color
    let weight: u16 = if bold { 700 } else { 400 };
    writer.write_all(&weight.to_le_bytes())?;
    writer.write_all(&0u16.to_le_bytes())?; // escapement
    writer.write_all(&[0, 0, 0, 0])?; // underline, family, charset, reserved
    writer.write_all(&[name.len() as u8, 0x00])?;
    writer.write_all(name)?;
    Ok(())
}

/// Write FORMAT record, type 0x041E
pub fn write_format<W: Write>(writer: &mut W, index_code: u16, format_str: &str) -> Result<()> {
    let (flags, bytes, cch) = unicode_chars(format_str);
    write_record_header(writer, 0x041E, (2 + 2 + 1 + bytes.len()) as u16)?;
    writer.write_all(&index_code.to_le_bytes())?;
    writer.write_all(&(cch as u16).to_le_bytes())?;
    writer.write_all(&[flags])?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Write XF (extended format) record, type 0x00E0
///
/// Style XFs have no parent; cell XFs inherit from style XF 0 and flag the
/// attributes they override in `used_attributes`.
pub fn write_xf<W: Write>(
    writer: &mut W,
    font_index: u16,
    format_index: u16,
    is_style: bool,
    used_attributes: u8,
) -> Result<()> {
    write_record_header(writer, 0x00E0, 20)?;
    writer.write_all(&font_index.to_le_bytes())?;
    writer.write_all(&format_index.to_le_bytes())?;
    let xf_type: u16 = if is_style { 0xFFF5 } else { 0x0001 };
    writer.write_all(&xf_type.to_le_bytes())?;
    writer.write_all(&[0x20, 0, 0, used_attributes])?; // bottom aligned
    writer.write_all(&0u16.to_le_bytes())?; // borders
    writer.write_all(&0u16.to_le_bytes())?; // border palette
    writer.write_all(&0u32.to_le_bytes())?; // no fill pattern
    writer.write_all(&0x20C0u16.to_le_bytes())?; // default fill palette
    Ok(())
}

/// Write STYLE record for the built-in Normal style, type 0x0293
pub fn write_normal_style<W: Write>(writer: &mut W) -> Result<()> {
    write_record_header(writer, 0x0293, 4)?;
    writer.write_all(&0x8000u16.to_le_bytes())?; // XF 0, built-in
    writer.write_all(&[0x00, 0xFF])?;
    Ok(())
}

/// Write BOUNDSHEET8 record, type 0x0085
///
/// Returns the offset, relative to the record start, of the 4-byte stream
/// position field so the caller can patch it once sheet offsets are known.
/// Names longer than 31 characters are rejected.
pub fn write_boundsheet<W: Write>(writer: &mut W, name: &str) -> Result<usize> {
    let (flags, bytes, cch) = unicode_chars(name);
    if cch > 31 {
        return Err(ExportError::InvalidSheetName {
            name: name.to_string(),
            reason: format!("{} characters exceed the limit of 31", cch),
        });
    }
    write_record_header(writer, 0x0085, (4 + 2 + 2 + bytes.len()) as u16)?;
    writer.write_all(&0u32.to_le_bytes())?; // patched later
    writer.write_all(&0u16.to_le_bytes())?; // visible worksheet
    writer.write_all(&[cch as u8, flags])?;
    writer.write_all(&bytes)?;
    Ok(4)
}

/// Write SST (shared string table) with CONTINUE records as needed
///
/// Types 0x00FC and 0x003C. A string header never straddles a record
/// boundary; character data that does is continued with a fresh flags byte.
pub fn write_sst<W: Write>(writer: &mut W, strings: &[&str], total_refs: u32) -> Result<()> {
    let mut records: Vec<Vec<u8>> = Vec::new();
    let mut buffer: Vec<u8> = Vec::with_capacity(MAX_RECORD_DATA);
    buffer.extend_from_slice(&total_refs.to_le_bytes());
    buffer.extend_from_slice(&(strings.len() as u32).to_le_bytes());

    for s in strings {
        let (flags, bytes, cch) = unicode_chars(s);
        let unit = if flags == 0x01 { 2 } else { 1 };

        if MAX_RECORD_DATA - buffer.len() < 3 + unit {
            records.push(std::mem::take(&mut buffer));
        }
        buffer.extend_from_slice(&(cch as u16).to_le_bytes());
        buffer.push(flags);

        let mut written = 0;
        while written < bytes.len() {
            let mut room = (MAX_RECORD_DATA - buffer.len()).min(bytes.len() - written);
            room -= room % unit;
            if room == 0 {
                records.push(std::mem::take(&mut buffer));
                buffer.push(flags);
                continue;
            }
            buffer.extend_from_slice(&bytes[written..written + room]);
            written += room;
        }
    }
    records.push(buffer);

    for (i, record) in records.iter().enumerate() {
        let record_type = if i == 0 { 0x00FC } else { 0x003C };
        write_record_header(writer, record_type, record.len() as u16)?;
        writer.write_all(record)?;
    }
    Ok(())
}

/// Write WSBOOL record, type 0x0081
pub fn write_wsbool<W: Write>(writer: &mut W) -> Result<()> {
    write_record_header(writer, 0x0081, 2)?;
    writer.write_all(&0x04C1u16.to_le_bytes())?;
    Ok(())
}

/// Write COLINFO record for a single column, type 0x007D
pub fn write_colinfo<W: Write>(writer: &mut W, col: u16, width: u16, xf_index: u16) -> Result<()> {
    write_record_header(writer, 0x007D, 12)?;
    writer.write_all(&col.to_le_bytes())?;
    writer.write_all(&col.to_le_bytes())?;
    writer.write_all(&width.to_le_bytes())?; // 1/256 of a character
    writer.write_all(&xf_index.to_le_bytes())?;
    writer.write_all(&0u16.to_le_bytes())?; // options
    writer.write_all(&0u16.to_le_bytes())?; // reserved
    Ok(())
}

/// Write DIMENSIONS record, type 0x0200; `last_row` and `last_col` are exclusive
pub fn write_dimensions<W: Write>(writer: &mut W, last_row: u32, last_col: u16) -> Result<()> {
    write_record_header(writer, 0x0200, 14)?;
    writer.write_all(&0u32.to_le_bytes())?;
    writer.write_all(&last_row.to_le_bytes())?;
    writer.write_all(&0u16.to_le_bytes())?;
    writer.write_all(&last_col.to_le_bytes())?;
    writer.write_all(&0u16.to_le_bytes())?;
    Ok(())
}

/// Write NUMBER record, type 0x0203
pub fn write_number<W: Write>(writer: &mut W, row: u32, col: u16, xf_index: u16, value: f64) -> Result<()> {
    let row = row_index(row, "NUMBER")?;
    write_record_header(writer, 0x0203, 14)?;
    writer.write_all(&row.to_le_bytes())?;
    writer.write_all(&col.to_le_bytes())?;
    writer.write_all(&xf_index.to_le_bytes())?;
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Write LABELSST record, type 0x00FD
pub fn write_labelsst<W: Write>(writer: &mut W, row: u32, col: u16, xf_index: u16, sst_index: u32) -> Result<()> {
    let row = row_index(row, "LABELSST")?;
    write_record_header(writer, 0x00FD, 10)?;
    writer.write_all(&row.to_le_bytes())?;
    writer.write_all(&col.to_le_bytes())?;
    writer.write_all(&xf_index.to_le_bytes())?;
    writer.write_all(&sst_index.to_le_bytes())?;
    Ok(())
}

/// Write BOOLERR record holding a boolean, type 0x0205
pub fn write_boolerr<W: Write>(writer: &mut W, row: u32, col: u16, xf_index: u16, value: bool) -> Result<()> {
    let row = row_index(row, "BOOLERR")?;
    write_record_header(writer, 0x0205, 8)?;
    writer.write_all(&row.to_le_bytes())?;
    writer.write_all(&col.to_le_bytes())?;
    writer.write_all(&xf_index.to_le_bytes())?;
    writer.write_all(&[u8::from(value), 0])?;
    Ok(())
}

/// Write BLANK record (formatted empty cell), type 0x0201
pub fn write_blank<W: Write>(writer: &mut W, row: u32, col: u16, xf_index: u16) -> Result<()> {
    let row = row_index(row, "BLANK")?;
    write_record_header(writer, 0x0201, 6)?;
    writer.write_all(&row.to_le_bytes())?;
    writer.write_all(&col.to_le_bytes())?;
    writer.write_all(&xf_index.to_le_bytes())?;
    Ok(())
}

/// Write WINDOW2 record, type 0x023E
pub fn write_window2<W: Write>(writer: &mut W, selected: bool, frozen: bool) -> Result<()> {
    write_record_header(writer, 0x023E, 18)?;
    // gridlines, headings, zeros, default header color, outline symbols
    let mut grbit: u16 = 0x00B6;
    if selected {
        grbit |= 0x0600;
    }
    if frozen {
        grbit |= 0x0108;
    }
    writer.write_all(&grbit.to_le_bytes())?;
    writer.write_all(&0u16.to_le_bytes())?; // rwTop
    writer.write_all(&0u16.to_le_bytes())?; // colLeft
    writer.write_all(&0x0040u32.to_le_bytes())?; // icvHdr
    writer.write_all(&[0u8; 8])?; // zoom and reserved
    Ok(())
}

/// Write PANE record freezing the first `rows` rows, type 0x0041
pub fn write_pane<W: Write>(writer: &mut W, rows: u16) -> Result<()> {
    write_record_header(writer, 0x0041, 10)?;
    writer.write_all(&0u16.to_le_bytes())?; // x: no frozen columns
    writer.write_all(&rows.to_le_bytes())?; // y
    writer.write_all(&rows.to_le_bytes())?; // rwTop of the bottom pane
    writer.write_all(&0u16.to_le_bytes())?; // colLeft
    writer.write_all(&[2, 0])?; // bottom-left pane is active
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(data: &[u8]) -> Vec<(u16, Vec<u8>)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos + 4 <= data.len() {
            let ty = u16::from_le_bytes([data[pos], data[pos + 1]]);
            let len = u16::from_le_bytes([data[pos + 2], data[pos + 3]]) as usize;
            out.push((ty, data[pos + 4..pos + 4 + len].to_vec()));
            pos += 4 + len;
        }
        out
    }

    #[test]
    fn test_bof_length() {
        let mut buf = Vec::new();
        write_bof(&mut buf, BOF_WORKSHEET).unwrap();
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[6..8], &BOF_WORKSHEET.to_le_bytes());
    }

    #[test]
    fn test_number_row_limit() {
        let mut buf = Vec::new();
        assert!(write_number(&mut buf, 65535, 0, 15, 1.0).is_ok());
        assert!(write_number(&mut buf, 65536, 0, 15, 1.0).is_err());
    }

    #[test]
    fn test_small_sst_single_record() {
        let mut buf = Vec::new();
        write_sst(&mut buf, &["ID", "Zürich", "日本"], 5).unwrap();
        let recs = records(&buf);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].0, 0x00FC);
        let body = &recs[0].1;
        assert_eq!(&body[0..4], &5u32.to_le_bytes());
        assert_eq!(&body[4..8], &3u32.to_le_bytes());
        // "ID": cch 2, compressed
        assert_eq!(&body[8..13], &[2, 0, 0, b'I', b'D']);
        // "Zürich" stays compressed (Latin-1)
        assert_eq!(&body[13..16], &[6, 0, 0]);
        // "日本" is UTF-16LE
        assert_eq!(&body[22..25], &[2, 0, 1]);
    }

    #[test]
    fn test_large_sst_uses_continue() {
        let long = "x".repeat(10_000);
        let mut buf = Vec::new();
        write_sst(&mut buf, &[long.as_str()], 1).unwrap();
        let recs = records(&buf);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].1.len(), MAX_RECORD_DATA);
        assert_eq!(recs[1].0, 0x003C);
        // continuation starts with the flags byte
        assert_eq!(recs[1].1[0], 0);
        let chars = recs[0].1.len() - 11 + recs[1].1.len() - 1;
        assert_eq!(chars, 10_000);
    }

    #[test]
    fn test_window2_flags() {
        let mut buf = Vec::new();
        write_window2(&mut buf, true, true).unwrap();
        assert_eq!(u16::from_le_bytes([buf[4], buf[5]]), 0x07BE);
        assert_eq!(buf.len(), 22);
    }

    #[test]
    fn test_boundsheet_name_length() {
        let mut buf = Vec::new();
        let offset = write_boundsheet(&mut buf, &"a".repeat(31)).unwrap();
        assert_eq!(offset, 4);
        assert_eq!(buf[10], 31);

        let mut buf = Vec::new();
        assert!(write_boundsheet(&mut buf, &"a".repeat(40)).is_err());
        assert!(buf.is_empty());
    }
}
