//! PostgreSQL driver built on the blocking `postgres` client
//!
//! Results are streamed with `query_raw`, so rows are decoded one at a time
//! as the worksheet consumes them. Column type names are reported in their
//! SQL spelling (`INT`, `NUMERIC`, `VARCHAR`, ...) so the format rules apply.

use super::{translate_call_escape, ColumnDescriptor, Database, RowCursor, SqlValue};
use crate::config::DatasourceConfig;
use crate::error::{ExportError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::fallible_iterator::FallibleIterator;
use postgres::types::{FromSql, ToSql, Type};
use postgres::{Client, Column, Config, NoTls, Row, RowIter};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::str::FromStr;

type DecodeError = Box<dyn StdError + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Variable-length header stored in `atttypmod`
const VARHDRSZ: i32 = 4;

/// Live PostgreSQL connection
pub struct PostgresDatabase {
    client: Client,
}

impl PostgresDatabase {
    /// Connect using the datasource URL, with or without a `jdbc:` prefix
    pub fn connect(datasource: &DatasourceConfig) -> Result<Self> {
        let url = datasource
            .jdbc_url
            .strip_prefix("jdbc:")
            .unwrap_or(&datasource.jdbc_url);
        let mut config = Config::from_str(url).map_err(|e| {
            ExportError::Connection(format!("invalid connection url '{}': {}", url, e))
        })?;
        if !datasource.username.is_empty() {
            config.user(&datasource.username);
        }
        if !datasource.password.is_empty() {
            config.password(&datasource.password);
        }

        let client = config
            .connect(NoTls)
            .map_err(|e| ExportError::Connection(e.to_string()))?;
        Ok(PostgresDatabase { client })
    }

    /// `atttypmod` of every column of the tables behind a result, in one round trip
    fn type_modifiers(&mut self, columns: &[Column]) -> Result<TypeModifiers> {
        let tables = source_tables(columns.iter().map(|c| (c.table_oid(), c.column_id())));
        if tables.is_empty() {
            return Ok(TypeModifiers::new());
        }

        let rows = self.client.query(
            "SELECT attrelid, attnum, atttypmod FROM pg_catalog.pg_attribute \
             WHERE attrelid = ANY($1) AND attnum > 0",
            &[&tables],
        )?;
        let mut modifiers = TypeModifiers::with_capacity(rows.len());
        for row in rows {
            let table: u32 = row.try_get(0)?;
            let attnum: i16 = row.try_get(1)?;
            modifiers.insert((table, attnum), row.try_get(2)?);
        }
        log::debug!(
            "Loaded {} column type modifiers from {} table(s)",
            modifiers.len(),
            tables.len()
        );
        Ok(modifiers)
    }
}

/// `atttypmod` keyed by table oid and column number
type TypeModifiers = HashMap<(u32, i16), i32>;

/// Distinct tables that result columns come from, skipping computed columns
fn source_tables(sources: impl IntoIterator<Item = (Option<u32>, Option<i16>)>) -> Vec<u32> {
    let mut tables: Vec<u32> = sources
        .into_iter()
        .filter_map(|source| match source {
            (Some(table), Some(_)) if table != 0 => Some(table),
            _ => None,
        })
        .collect();
    tables.sort_unstable();
    tables.dedup();
    tables
}

fn typmod_of(modifiers: &TypeModifiers, table: Option<u32>, attnum: Option<i16>) -> i32 {
    match (table, attnum) {
        (Some(table), Some(attnum)) => modifiers.get(&(table, attnum)).copied().unwrap_or(-1),
        _ => -1,
    }
}

fn describe(position: usize, column: &Column, modifiers: &TypeModifiers) -> ColumnDescriptor {
    let typmod = typmod_of(modifiers, column.table_oid(), column.column_id());
    let (precision, scale) = precision_and_scale(column.type_(), typmod);
    ColumnDescriptor::new(
        position,
        column.name(),
        sql_type_name(column.type_()),
        precision,
        scale,
    )
}

impl Database for PostgresDatabase {
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>> {
        let statement = self.client.prepare(sql)?;

        let modifiers = self.type_modifiers(statement.columns())?;
        let columns = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| describe(i + 1, column, &modifiers))
            .collect();
        let types = statement.columns().iter().map(|c| c.type_().clone()).collect();

        let rows = self
            .client
            .query_raw(&statement, std::iter::empty::<&dyn ToSql>())?;
        Ok(Box::new(PostgresCursor {
            columns,
            types,
            rows,
        }))
    }

    fn call(&mut self, statement: &str) -> Result<()> {
        let statement = translate_call_escape(statement);
        self.client.batch_execute(&statement)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.client.close()?;
        Ok(())
    }
}

struct PostgresCursor<'a> {
    columns: Vec<ColumnDescriptor>,
    types: Vec<Type>,
    rows: RowIter<'a>,
}

impl RowCursor for PostgresCursor<'_> {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        let row = match self.rows.next()? {
            Some(row) => row,
            None => return Ok(None),
        };
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| decode(&row, i, ty))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    Ok(row.try_get::<_, Option<T>>(idx)?)
}

fn decode(row: &Row, idx: usize, ty: &Type) -> Result<SqlValue> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(SqlValue::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(|v| SqlValue::Int(i32::from(v))),
        Type::INT4 => get::<i32>(row, idx)?.map(SqlValue::Int),
        Type::INT8 => get::<i64>(row, idx)?.map(SqlValue::Long),
        Type::OID => get::<u32>(row, idx)?.map(|v| SqlValue::Long(i64::from(v))),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| SqlValue::Double(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(SqlValue::Double),
        Type::NUMERIC => get::<PgNumeric>(row, idx)?.map(PgNumeric::into_value),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx)?.map(SqlValue::Text)
        }
        Type::DATE => get::<NaiveDate>(row, idx)?.map(SqlValue::Date),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(SqlValue::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(SqlValue::TimestampTz),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(|t| SqlValue::Other(t.to_string())),
        _ => get::<RawText>(row, idx)?.map(|t| SqlValue::Other(t.0)),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// SQL spelling of a PostgreSQL type name
fn sql_type_name(ty: &Type) -> String {
    let name = match *ty {
        Type::BOOL => "BOOLEAN",
        Type::INT2 => "SMALLINT",
        Type::INT4 => "INT",
        Type::INT8 => "BIGINT",
        Type::FLOAT4 => "REAL",
        Type::FLOAT8 => "DOUBLE",
        Type::NUMERIC => "NUMERIC",
        Type::VARCHAR => "VARCHAR",
        Type::BPCHAR => "CHAR",
        Type::TEXT => "TEXT",
        Type::DATE => "DATE",
        Type::TIME => "TIME",
        Type::TIMESTAMP => "TIMESTAMP",
        Type::TIMESTAMPTZ => "TIMESTAMPTZ",
        _ => return ty.name().to_uppercase(),
    };
    name.to_string()
}

/// Precision and scale from the column's type modifier, or the type's fixed size
fn precision_and_scale(ty: &Type, typmod: i32) -> (i32, i32) {
    match *ty {
        Type::NUMERIC if typmod >= VARHDRSZ => {
            let packed = typmod - VARHDRSZ;
            ((packed >> 16) & 0xffff, packed & 0xffff)
        }
        Type::NUMERIC => (0, 0),
        Type::VARCHAR | Type::BPCHAR if typmod >= VARHDRSZ => (typmod - VARHDRSZ, 0),
        Type::VARCHAR | Type::BPCHAR | Type::TEXT => (i32::MAX, 0),
        Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::TIME => {
            let scale = if typmod >= 0 { typmod } else { 6 };
            let base = match *ty {
                Type::TIME => 8,
                Type::TIMESTAMP => 19,
                _ => 25,
            };
            (base + if scale > 0 { scale + 1 } else { 0 }, scale)
        }
        Type::BOOL => (1, 0),
        Type::INT2 => (5, 0),
        Type::INT4 => (10, 0),
        Type::INT8 => (19, 0),
        Type::OID => (10, 0),
        Type::FLOAT4 => (8, 8),
        Type::FLOAT8 => (17, 17),
        Type::DATE => (13, 0),
        _ => (0, 0),
    }
}

/// NUMERIC decoded from the binary wire format
#[derive(Debug, Clone, PartialEq)]
enum PgNumeric {
    Exact(Decimal),
    /// Values `Decimal` cannot hold, plus NaN and infinities
    Text(String),
}

impl PgNumeric {
    fn into_value(self) -> SqlValue {
        match self {
            PgNumeric::Exact(d) => SqlValue::Decimal(d),
            PgNumeric::Text(s) => SqlValue::NumericText(s),
        }
    }

    fn from_text(text: String) -> Self {
        match Decimal::from_str_exact(&text) {
            Ok(d) => PgNumeric::Exact(d),
            Err(_) => PgNumeric::Text(text),
        }
    }
}

fn read_u16(raw: &[u8], offset: usize) -> std::result::Result<u16, DecodeError> {
    raw.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated numeric value".into())
}

/// Plain decimal text of a binary NUMERIC
fn numeric_text(raw: &[u8]) -> std::result::Result<String, DecodeError> {
    let ndigits = read_u16(raw, 0)? as usize;
    let weight = read_u16(raw, 2)? as i16 as i32;
    let sign = read_u16(raw, 4)?;
    let dscale = read_u16(raw, 6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{:04x}", other).into()),
    }

    let mut digits = Vec::with_capacity(ndigits);
    for i in 0..ndigits {
        digits.push(read_u16(raw, 8 + i * 2)?);
    }
    let digit = |i: i32| -> u16 {
        if i < 0 {
            0
        } else {
            digits.get(i as usize).copied().unwrap_or(0)
        }
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for i in 1..=weight {
            text.push_str(&format!("{:04}", digit(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    if text == "-0" || (text.starts_with("-0") && text[1..].chars().all(|c| c == '0' || c == '.')) {
        text.remove(0);
    }
    Ok(text)
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, DecodeError> {
        Ok(PgNumeric::from_text(numeric_text(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Fallback for types without a dedicated mapping
struct RawText(String);

impl<'a> FromSql<'a> for RawText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, DecodeError> {
        // jsonb carries a one-byte version prefix
        let raw = if *ty == Type::JSONB { raw.get(1..).unwrap_or(&[]) } else { raw };
        if *ty == Type::UUID && raw.len() == 16 {
            let hex: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
            return Ok(RawText(format!(
                "{}-{}-{}-{}-{}",
                &hex[0..8],
                &hex[8..12],
                &hex[12..16],
                &hex[16..20],
                &hex[20..32]
            )));
        }
        match std::str::from_utf8(raw) {
            Ok(s) => Ok(RawText(s.to_string())),
            Err(_) => Ok(RawText(format!(
                "\\x{}",
                raw.iter().map(|b| format!("{:02x}", b)).collect::<String>()
            ))),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_numeric_text() {
        // 10.50
        assert_eq!(numeric_text(&numeric(2, 0, NUMERIC_POS, 2, &[10, 5000])).unwrap(), "10.50");
        // 1234567890123456.78
        let raw = numeric(5, 3, NUMERIC_POS, 2, &[1234, 5678, 9012, 3456, 7800]);
        assert_eq!(numeric_text(&raw).unwrap(), "1234567890123456.78");
        // -0.001
        assert_eq!(numeric_text(&numeric(1, -1, NUMERIC_NEG, 3, &[10])).unwrap(), "-0.001");
        // 0
        assert_eq!(numeric_text(&numeric(0, 0, NUMERIC_POS, 0, &[])).unwrap(), "0");
        // 20000
        assert_eq!(numeric_text(&numeric(1, 1, NUMERIC_POS, 0, &[2])).unwrap(), "20000");
        assert_eq!(numeric_text(&numeric(0, 0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert!(numeric_text(&[0, 1]).is_err());
    }

    #[test]
    fn test_numeric_overflow_falls_back_to_text() {
        let big = "123456789012345678901234567890.5".to_string();
        assert_eq!(PgNumeric::from_text(big.clone()), PgNumeric::Text(big.clone()));
        assert_eq!(PgNumeric::Text(big.clone()).into_value(), SqlValue::NumericText(big));
        assert_eq!(
            PgNumeric::from_text("NaN".to_string()).into_value(),
            SqlValue::NumericText("NaN".to_string())
        );
        assert_eq!(
            PgNumeric::from_text("10.50".to_string()),
            PgNumeric::Exact(Decimal::from_str("10.50").unwrap())
        );
    }

    #[test]
    fn test_source_tables_deduplicated() {
        let sources: [(Option<u32>, Option<i16>); 6] = [
            (Some(16384), Some(1)),
            (Some(16384), Some(2)),
            (None, None),
            (Some(0), Some(1)),
            (Some(16390), Some(1)),
            (Some(16390), None),
        ];
        assert_eq!(source_tables(sources), vec![16384, 16390]);
        assert!(source_tables(sources[2..4].iter().copied()).is_empty());
    }

    #[test]
    fn test_typmod_lookup() {
        let mut modifiers = TypeModifiers::new();
        modifiers.insert((16384, 2), ((10 << 16) | 2) + VARHDRSZ);
        assert_eq!(typmod_of(&modifiers, Some(16384), Some(2)), ((10 << 16) | 2) + VARHDRSZ);
        assert_eq!(typmod_of(&modifiers, Some(16384), Some(3)), -1);
        assert_eq!(typmod_of(&modifiers, None, Some(2)), -1);
    }

    #[test]
    fn test_precision_from_typmod() {
        // numeric(10,2)
        assert_eq!(precision_and_scale(&Type::NUMERIC, ((10 << 16) | 2) + 4), (10, 2));
        assert_eq!(precision_and_scale(&Type::NUMERIC, -1), (0, 0));
        assert_eq!(precision_and_scale(&Type::VARCHAR, 24), (20, 0));
        assert_eq!(precision_and_scale(&Type::INT4, -1), (10, 0));
        assert_eq!(precision_and_scale(&Type::TIMESTAMP, 3), (23, 3));
    }

    #[test]
    fn test_sql_type_names_match_rules() {
        use crate::format::{resolve_format, TypeKey};
        let key = TypeKey::new(&sql_type_name(&Type::INT4), 10, 0);
        assert_eq!(resolve_format(key.as_str()), "0");
        let key = TypeKey::new(&sql_type_name(&Type::VARCHAR), 20, 0);
        assert_eq!(resolve_format(key.as_str()), "text");
        let key = TypeKey::new(&sql_type_name(&Type::TIMESTAMP), 26, 6);
        assert_eq!(resolve_format(key.as_str()), "dd.MM.yyyy h:mm:ss.000");
    }
}
