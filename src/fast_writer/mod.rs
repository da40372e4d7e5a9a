//! Streaming Excel writer for large exports
//!
//! This module provides the `.xlsx` writer used for files flagged `large`:
//! - Rows are serialized to XML as soon as they are written
//! - Each sheet is buffered in its own temporary file, flushed periodically
//! - Strings are written inline, so no shared string table grows in memory
//! - The zip package is assembled once, on save

pub mod workbook;
pub mod xml_writer;

pub use workbook::{StreamingWorkbook, DEFAULT_FLUSH_INTERVAL};
pub use xml_writer::XmlWriter;
