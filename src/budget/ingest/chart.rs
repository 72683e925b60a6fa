use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::budget::ingest::code::from_level_flag;
use crate::budget::ingest::error::{IngestError, Result};
use crate::budget::ingest::model::{AccountEntry, Cell, RawRow, SheetGrid};

/// Header labels of the chart columns, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartColumns {
    pub id: String,
    pub parent: String,
    pub level_flag: String,
    pub description: String,
}

impl Default for ChartColumns {
    fn default() -> Self {
        Self {
            id: "id".into(),
            parent: "idparent".into(),
            level_flag: "FlagNivel".into(),
            description: "descricao".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChartStats {
    pub rows_seen: usize,
    pub entries: usize,
    /// Rows skipped because their id is missing or not an integer.
    pub missing_id: usize,
    /// Entries kept without a code because their flag was empty or zero.
    pub unusable_flags: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartExtraction {
    pub entries: Vec<AccountEntry>,
    pub stats: ChartStats,
}

struct Positions {
    id: usize,
    parent: usize,
    level_flag: usize,
    description: usize,
}

/// Reads every account of a chart sheet. The first non-blank row is the
/// header; a missing column is an error.
#[instrument(level = "info", skip_all, fields(sheet = %grid.name))]
pub fn read_chart(grid: &SheetGrid, columns: &ChartColumns) -> Result<ChartExtraction> {
    let mut rows = grid.rows.iter().skip_while(|row| row.is_blank());
    let header = rows
        .next()
        .ok_or_else(|| IngestError::InvalidWorkbook(format!("sheet '{}' is empty", grid.name)))?;

    let locate = |label: &str| {
        find_column(header, label).ok_or_else(|| IngestError::MissingColumn {
            sheet: grid.name.clone(),
            column: label.to_string(),
        })
    };
    let positions = Positions {
        id: locate(columns.id.as_str())?,
        parent: locate(columns.parent.as_str())?,
        level_flag: locate(columns.level_flag.as_str())?,
        description: locate(columns.description.as_str())?,
    };

    let mut stats = ChartStats::default();
    let mut entries = Vec::new();
    for row in rows {
        if row.is_blank() {
            continue;
        }
        stats.rows_seen += 1;
        let Some(id) = row.get(positions.id).and_then(Cell::as_integer) else {
            stats.missing_id += 1;
            continue;
        };

        let level_flag = row.get(positions.level_flag).and_then(Cell::as_integer);
        let account_code = level_flag.and_then(from_level_flag);
        if account_code.is_none() {
            stats.unusable_flags += 1;
        }

        entries.push(AccountEntry {
            id,
            parent_id: row.get(positions.parent).and_then(Cell::as_integer),
            level_flag,
            account_code,
            description: row
                .get(positions.description)
                .map(|cell| cell.to_text().trim().to_string())
                .unwrap_or_default(),
        });
    }
    stats.entries = entries.len();

    info!(
        rows_seen = stats.rows_seen,
        entries = stats.entries,
        missing_id = stats.missing_id,
        unusable_flags = stats.unusable_flags,
        "chart of accounts read"
    );
    Ok(ChartExtraction { entries, stats })
}

fn find_column(header: &RawRow, label: &str) -> Option<usize> {
    (0..header.width()).find(|&column| {
        header
            .get(column)
            .is_some_and(|cell| cell.to_text().trim().eq_ignore_ascii_case(label.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: Vec<Option<Cell>>) -> RawRow {
        RawRow::new(cells)
    }

    fn header() -> RawRow {
        row(vec![
            Some(Cell::from("ID")),
            Some(Cell::from("IdParent")),
            Some(Cell::from("Descricao")),
            Some(Cell::from("FlagNivel")),
        ])
    }

    #[test]
    fn accounts_take_codes_from_level_flags() {
        let grid = SheetGrid::new(
            "plano de contas",
            vec![
                RawRow::default(),
                header(),
                row(vec![
                    Some(Cell::Number(1.0)),
                    None,
                    Some(Cell::from("RECEITAS ")),
                    Some(Cell::Number(1_000_000_000_000.0)),
                ]),
                row(vec![
                    Some(Cell::Number(2.0)),
                    Some(Cell::Number(1.0)),
                    Some(Cell::from("VENDAS")),
                    Some(Cell::Number(1_001_000_000_000.0)),
                ]),
            ],
        );
        let chart = read_chart(&grid, &ChartColumns::default()).unwrap();

        assert_eq!(chart.entries.len(), 2);
        assert_eq!(chart.entries[0].description, "RECEITAS");
        assert_eq!(chart.entries[0].parent_id, None);
        assert_eq!(chart.entries[1].parent_id, Some(1));
        let code = chart.entries[1].account_code.as_ref().unwrap();
        assert_eq!(code.to_string(), "1.1");
        assert_eq!(code.padded(), "001.001");
    }

    #[test]
    fn zero_flags_keep_the_entry_without_code() {
        let grid = SheetGrid::new(
            "plano de contas",
            vec![
                header(),
                row(vec![Some(Cell::Number(9.0)), None, Some(Cell::from("RAIZ")), Some(Cell::Number(0.0))]),
                row(vec![Some(Cell::from("total")), None, None, None]),
            ],
        );
        let chart = read_chart(&grid, &ChartColumns::default()).unwrap();

        assert_eq!(chart.entries.len(), 1);
        assert_eq!(chart.entries[0].account_code, None);
        assert_eq!(chart.entries[0].level_flag, Some(0));
        assert_eq!(chart.stats.unusable_flags, 1);
        assert_eq!(chart.stats.missing_id, 1);
    }

    #[test]
    fn missing_columns_are_reported() {
        let grid = SheetGrid::new("plano de contas", vec![row(vec![Some(Cell::from("id"))])]);
        let error = read_chart(&grid, &ChartColumns::default()).unwrap_err();
        assert!(matches!(
            error,
            IngestError::MissingColumn { ref column, .. } if column == "idparent"
        ));
    }
}
