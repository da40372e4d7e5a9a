//! Population of one worksheet from a query result

use crate::backend::WorkbookBackend;
use crate::coerce::{coerce, resolve_column_format};
use crate::database::RowCursor;
use crate::error::{ExportError, Result};
use crate::types::{CellValue, StyleId, StyledCell};

/// Row index of the header
pub const HEADER_ROW: u32 = 0;
/// Row index of the first data row
pub const DATA_ROW: u32 = 1;

/// Progress of a sheet being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Empty,
    HeaderWritten,
    Populating,
    Done,
}

/// What was written to a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSummary {
    pub name: String,
    /// Data rows, excluding the header
    pub rows: u32,
    pub columns: usize,
    /// Whether per-column styles were resolved (only when at least one row exists)
    pub styled: bool,
}

/// Writes a header row, freezes it, streams the data rows and sizes the columns
pub struct WorksheetBuilder<'a> {
    workbook: &'a mut dyn WorkbookBackend,
    state: BuildState,
}

impl<'a> WorksheetBuilder<'a> {
    pub fn new(workbook: &'a mut dyn WorkbookBackend) -> Self {
        WorksheetBuilder {
            workbook,
            state: BuildState::Empty,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    fn transition(&mut self, next: BuildState, sheet_name: &str) {
        log::debug!("Worksheet '{}': {:?} -> {:?}", sheet_name, self.state, next);
        self.state = next;
    }

    /// Build a sheet named `sheet_name` from every row left in `cursor`
    pub fn build(mut self, sheet_name: &str, cursor: &mut dyn RowCursor) -> Result<SheetSummary> {
        let columns = cursor.columns().to_vec();
        if columns.len() > u16::MAX as usize {
            return Err(ExportError::NotSupported(format!(
                "{} columns in one sheet",
                columns.len()
            )));
        }

        self.workbook.add_sheet(sheet_name)?;

        let header_style = self.workbook.header_style()?;
        let header: Vec<StyledCell> = columns
            .iter()
            .map(|c| StyledCell::new(CellValue::String(c.label.clone()), header_style))
            .collect();
        self.workbook.write_row(HEADER_ROW, &header)?;
        self.workbook.freeze_header()?;
        self.transition(BuildState::HeaderWritten, sheet_name);

        // Resolved on the first data row, reused for every later row
        let mut column_styles: Option<Vec<(&'static str, StyleId)>> = None;
        let mut row_index = DATA_ROW;
        let mut cells: Vec<StyledCell> = Vec::with_capacity(columns.len());

        while let Some(values) = cursor.next_row()? {
            if column_styles.is_none() {
                let mut resolved = Vec::with_capacity(columns.len());
                for column in &columns {
                    let format = resolve_column_format(column);
                    resolved.push((format, self.workbook.register_style(format)?));
                }
                column_styles = Some(resolved);
                self.transition(BuildState::Populating, sheet_name);
            }
            let styles = column_styles.as_deref().unwrap_or(&[]);

            cells.clear();
            for (col, value) in values.into_iter().enumerate() {
                match styles.get(col) {
                    Some(&(format, style)) => {
                        let rendered = coerce(value, format);
                        cells.push(StyledCell {
                            value: rendered.value,
                            style: rendered.format.map(|_| style),
                        });
                    }
                    None => {
                        return Err(ExportError::Database(format!(
                            "row {} has more values than the {} described columns",
                            row_index,
                            columns.len()
                        )))
                    }
                }
            }

            self.workbook.write_row(row_index, &cells)?;
            row_index += 1;
        }

        self.workbook.autosize_columns(columns.len() as u16)?;
        self.transition(BuildState::Done, sheet_name);

        Ok(SheetSummary {
            name: sheet_name.to_string(),
            rows: row_index - DATA_ROW,
            columns: columns.len(),
            styled: column_styles.is_some(),
        })
    }
}

/// Build one sheet; see [`WorksheetBuilder::build`]
pub fn build_worksheet(
    sheet_name: &str,
    workbook: &mut dyn WorkbookBackend,
    cursor: &mut dyn RowCursor,
) -> Result<SheetSummary> {
    WorksheetBuilder::new(workbook).build(sheet_name, cursor)
}
