//! Mapping of SQL runtime values onto spreadsheet cells
//!
//! Coercion never fails: every [`SqlValue`] has a cell representation.
//! Arbitrary-precision decimals are the only values that can lose
//! information on the way to a spreadsheet, so they go through
//! [`decimal_cell`], which falls back to exact text whenever a double would
//! misrepresent the value.

use crate::database::{ColumnDescriptor, SqlValue};
use crate::format::{TypeFormatRegistry, TypeKey};
use crate::types::CellValue;
use chrono::Local;
use rust_decimal::Decimal;

/// Doubles carry 15-17 significant decimal digits; anything shorter than
/// this round-trips through `f64` for display purposes.
const SAFE_SIGNIFICANT_DIGITS: u32 = 16;

/// Resolved value and display format for one cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellRenderResult {
    pub value: CellValue,
    /// Display format to apply, `None` for cells that stay unstyled
    pub format: Option<&'static str>,
}

/// Build the type key for a column and resolve its display format
pub fn resolve_column_format(column: &ColumnDescriptor) -> &'static str {
    let key = TypeKey::new(&column.type_name, column.precision, column.scale);
    let format = TypeFormatRegistry::global().resolve(&key);
    log::debug!(
        "Column {} columnType {} excelFormat={}",
        column.position.saturating_sub(1),
        key,
        format
    );
    format
}

/// Coerce a runtime value into a cell using an already resolved column format
pub fn coerce(value: SqlValue, format: &'static str) -> CellRenderResult {
    let value = match value {
        SqlValue::Null => {
            return CellRenderResult {
                value: CellValue::String(String::new()),
                format: None,
            }
        }
        SqlValue::Date(d) => CellValue::Date(d),
        SqlValue::Timestamp(ts) => CellValue::DateTime(ts),
        SqlValue::TimestampTz(ts) => CellValue::DateTime(ts.with_timezone(&Local).naive_local()),
        SqlValue::Text(s) => CellValue::String(s),
        SqlValue::Bool(b) => CellValue::Bool(b),
        SqlValue::Double(f) => return numeric_source(double_cell(f), format),
        SqlValue::Int(i) => CellValue::Number(f64::from(i)),
        SqlValue::Long(l) => CellValue::Number(l as f64),
        SqlValue::Decimal(d) => return numeric_source(decimal_cell(&d), format),
        SqlValue::NumericText(s) => return numeric_source(CellValue::String(s), format),
        SqlValue::Other(s) => CellValue::String(s),
    };

    CellRenderResult {
        value,
        format: Some(format),
    }
}

// A numeric value that fell back to text never carries a numeric format
fn numeric_source(value: CellValue, format: &'static str) -> CellRenderResult {
    let format = match value {
        CellValue::String(_) => None,
        _ => Some(format),
    };
    CellRenderResult { value, format }
}

/// Coerce a value, resolving the format from the column metadata
pub fn coerce_for_column(value: SqlValue, column: &ColumnDescriptor) -> CellRenderResult {
    coerce(value, resolve_column_format(column))
}

// NaN and infinities have no spreadsheet number representation
fn double_cell(f: f64) -> CellValue {
    if f.is_finite() {
        CellValue::Number(f)
    } else if f.is_nan() {
        CellValue::String("NaN".to_string())
    } else if f > 0.0 {
        CellValue::String("Infinity".to_string())
    } else {
        CellValue::String("-Infinity".to_string())
    }
}

/// Numeric cell when the double is faithful enough, exact plain text otherwise
pub fn decimal_cell(d: &Decimal) -> CellValue {
    let plain = d.to_string();
    match plain.parse::<f64>() {
        Ok(f) if f.is_finite() && (significant_digits(d) < SAFE_SIGNIFICANT_DIGITS || represents_exactly(d, f)) => {
            CellValue::Number(f)
        }
        _ => CellValue::String(plain),
    }
}

/// Number of significant decimal digits, ignoring trailing zeros after the point
pub fn significant_digits(d: &Decimal) -> u32 {
    let mut digits = d.normalize().mantissa().unsigned_abs();
    let mut count = 1;
    while digits >= 10 {
        digits /= 10;
        count += 1;
    }
    count
}

/// Whether `f` is exactly the value of `d`
pub fn represents_exactly(d: &Decimal, f: f64) -> bool {
    if !f.is_finite() {
        return false;
    }
    if f == 0.0 {
        return d.is_zero();
    }
    if d.is_sign_negative() != (f < 0.0) {
        return false;
    }

    let normalized = d.normalize();
    let digits = normalized.mantissa().unsigned_abs();
    let scale = normalized.scale();

    // |f| = m * 2^e with m odd
    let bits = f.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mut m, mut e) = if raw_exp == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), raw_exp - 1075)
    };
    let shift = m.trailing_zeros();
    m >>= shift;
    e += shift as i32;

    if e >= 0 {
        // Integral value: m << e, which must fit the 96-bit decimal mantissa
        let bit_len = 64 - m.leading_zeros() as i32;
        if scale != 0 || bit_len + e > 96 {
            return false;
        }
        digits == (m as u128) << e
    } else {
        // m / 2^k == m * 5^k / 10^k, already in lowest terms since m is odd
        let k = (-e) as u32;
        if k != scale {
            return false;
        }
        5u128
            .checked_pow(k)
            .and_then(|p| p.checked_mul(m as u128))
            .map_or(false, |scaled| scaled == digits)
    }
}
