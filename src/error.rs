//! Error types for the exporter

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for all export operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// Missing, unreadable or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Output file name does not end in a supported extension
    #[error("Unsupported file extension for '{file}': expected .xls or .xlsx")]
    UnsupportedExtension { file: String },

    /// Sheet name Excel would refuse
    #[error("Invalid sheet name '{name}': {reason}")]
    InvalidSheetName { name: String, reason: String },

    /// Driver lookup or connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query, metadata or procedure call failure
    #[error("Database error: {0}")]
    Database(String),

    /// Error occurred while populating a worksheet
    #[error("Failed to export worksheet '{sheet}' of file '{file}': {source}")]
    Worksheet {
        file: String,
        sheet: String,
        #[source]
        source: Box<ExportError>,
    },

    /// Error occurred while writing a workbook
    #[error("Failed to write Excel file: {0}")]
    WriteError(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Feature not supported
    #[error("Feature not supported: {0}")]
    NotSupported(String),
}

impl ExportError {
    /// Attach file and worksheet context to an error raised while building a sheet
    pub fn in_worksheet(self, file: impl Into<String>, sheet: impl Into<String>) -> Self {
        ExportError::Worksheet {
            file: file.into(),
            sheet: sheet.into(),
            source: Box::new(self),
        }
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        ExportError::WriteError(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::WriteError(err.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Config(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<postgres::Error> for ExportError {
    fn from(err: postgres::Error) -> Self {
        ExportError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_worksheet_context() {
        let err = ExportError::Database("relation \"t\" does not exist".to_string())
            .in_worksheet("1", "Sheet A");
        let msg = err.to_string();
        assert!(msg.contains("Sheet A"));
        assert!(msg.contains("relation"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_unsupported_extension_message() {
        let err = ExportError::UnsupportedExtension {
            file: "out.csv".to_string(),
        };
        assert!(err.to_string().contains("out.csv"));
    }
}
