//! Database access behind a narrow, driver-agnostic interface
//!
//! The exporter only needs two things from a database: run a query and walk
//! its rows forward once ([`RowCursor`]), and execute a preparatory call for
//! its side effects. Drivers implement [`Database`]; [`connect`] picks one
//! from the datasource configuration.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::config::DatasourceConfig;
use crate::error::{ExportError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;

pub use memory::MemoryDatabase;

/// Column metadata reported by a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// 1-based ordinal position
    pub position: usize,
    pub name: String,
    /// Display label, usually the alias from the select list
    pub label: String,
    /// Declared SQL type name as reported by the driver
    pub type_name: String,
    pub precision: i32,
    pub scale: i32,
}

impl ColumnDescriptor {
    pub fn new(
        position: usize,
        name: impl Into<String>,
        type_name: impl Into<String>,
        precision: i32,
        scale: i32,
    ) -> Self {
        let name = name.into();
        ColumnDescriptor {
            position,
            label: name.clone(),
            name,
            type_name: type_name.into(),
            precision,
            scale,
        }
    }

    /// Override the label when it differs from the column name
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Runtime value of a single result cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Date(NaiveDate),
    /// Timestamp without zone information
    Timestamp(NaiveDateTime),
    /// Absolute instant
    TimestampTz(DateTime<Utc>),
    Text(String),
    Bool(bool),
    Double(f64),
    Int(i32),
    Long(i64),
    Decimal(Decimal),
    /// Exact numeric outside the `Decimal` range, or NaN and infinities
    NumericText(String),
    /// Any other type, carried as its textual representation
    Other(String),
}

/// Forward-only cursor over a query result
pub trait RowCursor {
    /// Column metadata, in select-list order
    fn columns(&self) -> &[ColumnDescriptor];

    /// Fetch the next record, `None` once the result is exhausted
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>>;
}

/// A live database connection
pub trait Database {
    /// Run a query and return a cursor over its rows
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>>;

    /// Execute a procedure call for its side effects
    fn call(&mut self, statement: &str) -> Result<()>;

    /// Release the connection
    fn close(self: Box<Self>) -> Result<()>;
}

/// Open a connection for the configured datasource
pub fn connect(datasource: &DatasourceConfig) -> Result<Box<dyn Database>> {
    log::debug!("Loading driver class : {}", datasource.class_name);

    let driver = format!("{} {}", datasource.class_name, datasource.jdbc_url).to_lowercase();
    if driver.contains("postgres") {
        return connect_postgres(datasource);
    }

    Err(ExportError::Connection(format!(
        "no driver available for class '{}'",
        datasource.class_name
    )))
}

#[cfg(feature = "postgres")]
fn connect_postgres(datasource: &DatasourceConfig) -> Result<Box<dyn Database>> {
    log::debug!("Creating a connection to the database...");
    let db = postgres::PostgresDatabase::connect(datasource)?;
    Ok(Box::new(db))
}

#[cfg(not(feature = "postgres"))]
fn connect_postgres(_datasource: &DatasourceConfig) -> Result<Box<dyn Database>> {
    Err(ExportError::NotSupported(
        "PostgreSQL support requires the 'postgres' feature".to_string(),
    ))
}

/// Translate a JDBC call escape (`{ call proc(1) }`) into a plain statement
pub fn translate_call_escape(statement: &str) -> String {
    let trimmed = statement.trim();
    let inner = match trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
    {
        Some(inner) => inner.trim(),
        None => return trimmed.to_string(),
    };

    let inner = inner
        .strip_prefix("?=")
        .or_else(|| inner.strip_prefix("? ="))
        .map(str::trim)
        .unwrap_or(inner);

    match inner.get(..4) {
        Some(kw) if kw.eq_ignore_ascii_case("call") => {
            let rest = inner[4..].trim();
            if rest.contains('(') {
                format!("CALL {}", rest)
            } else {
                format!("CALL {}()", rest)
            }
        }
        _ => inner.to_string(),
    }
}
