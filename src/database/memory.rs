//! In-memory database used by tests and benchmarks

use super::{ColumnDescriptor, Database, RowCursor, SqlValue};
use crate::error::{ExportError, Result};
use std::collections::HashMap;
use std::collections::VecDeque;

/// Canned result set for one query
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl MemoryTable {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        MemoryTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<SqlValue>) -> Self {
        self.rows.push(row);
        self
    }
}

/// Database that answers queries from registered tables keyed by SQL text
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: HashMap<String, MemoryTable>,
    failing_calls: HashMap<String, String>,
    calls: Vec<String>,
    queries: Vec<String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the result returned for `sql`
    pub fn with_table(mut self, sql: &str, table: MemoryTable) -> Self {
        self.tables.insert(sql.trim().to_string(), table);
        self
    }

    /// Make a procedure call fail with `message`
    pub fn with_failing_call(mut self, statement: &str, message: &str) -> Self {
        self.failing_calls
            .insert(statement.trim().to_string(), message.to_string());
        self
    }

    /// Procedure calls executed so far, in order
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Queries executed so far, in order
    pub fn queries(&self) -> &[String] {
        &self.queries
    }
}

struct MemoryCursor {
    columns: Vec<ColumnDescriptor>,
    rows: VecDeque<Vec<SqlValue>>,
}

impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        Ok(self.rows.pop_front())
    }
}

impl Database for MemoryDatabase {
    fn query(&mut self, sql: &str) -> Result<Box<dyn RowCursor + '_>> {
        let key = sql.trim();
        self.queries.push(key.to_string());
        let table = self
            .tables
            .get(key)
            .ok_or_else(|| ExportError::Database(format!("no result registered for '{}'", key)))?;

        Ok(Box::new(MemoryCursor {
            columns: table.columns.clone(),
            rows: table.rows.iter().cloned().collect(),
        }))
    }

    fn call(&mut self, statement: &str) -> Result<()> {
        let key = statement.trim().to_string();
        if let Some(message) = self.failing_calls.get(&key) {
            return Err(ExportError::Database(message.clone()));
        }
        self.calls.push(key);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cursor_drains_in_order() {
        let table = MemoryTable::new(vec![ColumnDescriptor::new(1, "ID", "INT", 10, 0)])
            .with_row(vec![SqlValue::Int(1)])
            .with_row(vec![SqlValue::Int(2)]);
        let mut db = MemoryDatabase::new().with_table("SELECT id FROM t", table);

        let mut cursor = db.query("SELECT id FROM t").unwrap();
        assert_eq!(cursor.columns().len(), 1);
        assert_eq!(cursor.next_row().unwrap(), Some(vec![SqlValue::Int(1)]));
        assert_eq!(cursor.next_row().unwrap(), Some(vec![SqlValue::Int(2)]));
        assert_eq!(cursor.next_row().unwrap(), None);
    }

    #[test]
    fn test_unknown_query_fails() {
        let mut db = MemoryDatabase::new();
        assert!(matches!(db.query("SELECT 1"), Err(ExportError::Database(_))));
    }

    #[test]
    fn test_calls_are_recorded() {
        let mut db = MemoryDatabase::new().with_failing_call("{ call broken }", "boom");
        db.call("{ call proc123 }").unwrap();
        assert!(db.call("{ call broken }").is_err());
        assert_eq!(db.calls(), &["{ call proc123 }".to_string()]);
    }
}
