//! Type definitions for spreadsheet cells

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::fmt;

/// Handle to a cell style registered with a workbook backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleId(pub u32);

impl StyleId {
    /// Get the style index
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Styled cell value (combines value with an optional style)
#[derive(Debug, Clone, PartialEq)]
pub struct StyledCell {
    /// The cell value
    pub value: CellValue,
    /// The cell style, `None` for the workbook default
    pub style: Option<StyleId>,
}

impl StyledCell {
    /// Create a new styled cell
    pub fn new(value: CellValue, style: StyleId) -> Self {
        StyledCell {
            value,
            style: Some(style),
        }
    }

    /// Create a cell with default style
    pub fn default_style(value: CellValue) -> Self {
        StyledCell { value, style: None }
    }
}

impl From<CellValue> for StyledCell {
    fn from(value: CellValue) -> Self {
        StyledCell::default_style(value)
    }
}

/// Represents a single cell value in a worksheet
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell
    Empty,
    /// String value
    String(String),
    /// Numeric value
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time of day, already in local time
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Convert cell value to string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        }
    }

    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Try to convert to float; dates yield their Excel serial number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Date(d) => date_to_serial(*d),
            CellValue::DateTime(dt) => datetime_to_serial(*dt),
            CellValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Approximate number of characters the cell occupies once rendered
    pub fn display_len(&self) -> usize {
        match self {
            CellValue::Empty => 0,
            CellValue::String(s) => s.chars().count(),
            CellValue::Number(n) => n.to_string().len(),
            CellValue::Bool(b) => if *b { 4 } else { 5 },
            CellValue::Date(_) => 10,
            CellValue::DateTime(_) => 23,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Number(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::DateTime(dt)
    }
}

/// Convert column index to Excel letter (0 -> A, 25 -> Z, 26 -> AA)
pub fn col_to_letter(col: u32) -> String {
    let mut result = String::new();
    let mut col = col + 1;

    while col > 0 {
        col -= 1;
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }

    result
}

/// Get Excel-style cell reference for 0-based coordinates (e.g. "A1", "B2")
pub fn cell_reference(row: u32, col: u32) -> String {
    format!("{}{}", col_to_letter(col), row + 1)
}

/// Column width in Excel character units for a rendered length
pub fn column_width(chars: usize) -> f64 {
    ((chars as f64) * 1.1 + 2.0).clamp(8.43, 255.0)
}

/// Excel 1900-system serial day number, `None` before 1900-01-01.
///
/// Serials below 61 are shifted by one to account for the fictitious
/// 1900-02-29 that Excel keeps for Lotus compatibility.
pub fn date_to_serial(date: NaiveDate) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let first = NaiveDate::from_ymd_opt(1900, 1, 1)?;
    if date < first {
        return None;
    }
    let mut days = (date - epoch).num_days();
    if days < 61 {
        days -= 1;
    }
    Some(days as f64)
}

/// Excel serial number with the time of day as the fractional part
pub fn datetime_to_serial(dt: NaiveDateTime) -> Option<f64> {
    let day = date_to_serial(dt.date())?;
    let time = dt.time();
    let seconds = time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 / 1e9;
    Some(day + seconds / 86_400.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_reference() {
        assert_eq!(cell_reference(0, 0), "A1");
        assert_eq!(cell_reference(0, 25), "Z1");
        assert_eq!(cell_reference(0, 26), "AA1");
        assert_eq!(cell_reference(9, 701), "ZZ10");
    }

    #[test]
    fn test_date_serial() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(date_to_serial(d(1900, 1, 1)), Some(1.0));
        assert_eq!(date_to_serial(d(1900, 2, 28)), Some(59.0));
        assert_eq!(date_to_serial(d(1900, 3, 1)), Some(61.0));
        assert_eq!(date_to_serial(d(2024, 1, 15)), Some(45306.0));
        assert_eq!(date_to_serial(d(1899, 12, 31)), None);
    }

    #[test]
    fn test_datetime_serial() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(datetime_to_serial(dt), Some(45306.5));
    }

    #[test]
    fn test_cell_value_conversions() {
        let val = CellValue::Number(42.0);
        assert_eq!(val.as_f64(), Some(42.0));
        assert_eq!(val.as_string(), "42");

        let val = CellValue::String("3.5".to_string());
        assert_eq!(val.as_f64(), Some(3.5));
        assert!(CellValue::Empty.is_empty());
        assert_eq!(CellValue::Bool(false).display_len(), 5);
    }
}
