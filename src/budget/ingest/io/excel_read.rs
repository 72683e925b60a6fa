use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use tracing::debug;

use crate::budget::ingest::error::{IngestError, Result};
use crate::budget::ingest::model::{Cell, RawRow, SheetGrid};

/// Open `.xlsx` workbook handing out one sheet grid at a time.
pub struct WorkbookReader {
    workbook: Xlsx<BufReader<File>>,
    names: Vec<String>,
}

impl WorkbookReader {
    pub fn open(path: &Path) -> Result<Self> {
        let workbook: Xlsx<_> = open_workbook(path)?;
        let names = workbook.sheet_names().to_vec();
        Ok(Self { workbook, names })
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.names
    }

    /// See [`resolve_sheet`].
    pub fn resolve(&self, requested: &str) -> Option<&str> {
        resolve_sheet(&self.names, requested)
    }

    /// Reads the sheet matching `requested` (see [`resolve`](Self::resolve)).
    pub fn read_grid(&mut self, requested: &str) -> Result<SheetGrid> {
        let name = self
            .resolve(requested)
            .ok_or_else(|| IngestError::InvalidWorkbook(format!("missing sheet '{requested}'")))?
            .to_string();
        let range = self
            .workbook
            .worksheet_range(&name)
            .ok_or_else(|| IngestError::InvalidWorkbook(format!("missing sheet '{name}'")))?
            .map_err(IngestError::from)?;
        let grid = grid_from_range(&name, &range);
        debug!(sheet = %name, rows = grid.rows.len(), "sheet loaded");
        Ok(grid)
    }
}

/// Finds the sheet called `requested`, or failing that the first sheet
/// whose name contains it, ignoring case.
pub fn resolve_sheet<'a>(names: &'a [String], requested: &str) -> Option<&'a str> {
    if let Some(name) = names.iter().find(|name| name.as_str() == requested) {
        return Some(name);
    }
    let needle = requested.trim().to_lowercase();
    names
        .iter()
        .find(|name| name.to_lowercase().contains(&needle))
        .map(String::as_str)
}

/// Converts a calamine range into a grid addressed by absolute sheet
/// positions: a range starting at `C3` gets two blank rows and two empty
/// leading cells per row.
pub fn grid_from_range(name: &str, range: &Range<DataType>) -> SheetGrid {
    let (row_offset, column_offset) = range
        .start()
        .map(|(row, column)| (row as usize, column as usize))
        .unwrap_or_default();

    let mut rows = vec![RawRow::default(); row_offset];
    rows.extend(range.rows().map(|cells| {
        std::iter::repeat_n(None, column_offset)
            .chain(cells.iter().map(to_cell))
            .collect::<RawRow>()
    }));
    SheetGrid::new(name, rows)
}

fn to_cell(value: &DataType) -> Option<Cell> {
    match value {
        DataType::Int(value) => Some(Cell::Number(*value as f64)),
        DataType::Float(value) | DataType::DateTime(value) => Some(Cell::Number(*value)),
        DataType::Bool(value) => Some(Cell::Bool(*value)),
        DataType::String(value) if value.trim().is_empty() => None,
        DataType::String(value) => Some(Cell::Text(value.clone())),
        DataType::Error(_) | DataType::Empty => None,
        other => Some(Cell::Text(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_kept_absolute() {
        let mut range = Range::new((1, 2), (2, 3));
        range.set_value((1, 2), DataType::Int(5));
        range.set_value((2, 3), DataType::String("4.1 - VENDAS".into()));
        range.set_value((2, 2), DataType::String("  ".into()));

        let grid = grid_from_range("Base", &range);

        assert_eq!(grid.rows.len(), 3);
        assert!(grid.rows[0].is_blank());
        assert_eq!(grid.rows[1].get(2), Some(&Cell::Number(5.0)));
        assert_eq!(grid.rows[1].get(0), None);
        assert_eq!(grid.rows[2].get(2), None);
        assert_eq!(grid.rows[2].get(3), Some(&Cell::from("4.1 - VENDAS")));
    }

    #[test]
    fn exact_names_win_over_partial_matches() {
        let names = vec!["Base fixo Unibox 2025".to_string(), "Base fixo Unibox".to_string()];
        assert_eq!(resolve_sheet(&names, "Base fixo Unibox"), Some("Base fixo Unibox"));
        assert_eq!(resolve_sheet(&names, "unibox"), Some("Base fixo Unibox 2025"));
        assert_eq!(resolve_sheet(&names, "Uniplast"), None);
    }

    #[test]
    fn errors_and_blanks_are_empty_cells() {
        assert_eq!(to_cell(&DataType::Empty), None);
        assert_eq!(to_cell(&DataType::Error(calamine::CellErrorType::Div0)), None);
        assert_eq!(to_cell(&DataType::Float(2.5)), Some(Cell::Number(2.5)));
        assert_eq!(to_cell(&DataType::Bool(true)), Some(Cell::Bool(true)));
    }
}
