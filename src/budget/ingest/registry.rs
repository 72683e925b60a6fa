use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::budget::ingest::assemble::{FillField, FillStats, ForwardFill};
use crate::budget::ingest::error::{IngestError, Result};
use crate::budget::ingest::model::{Cell, RevenueEntry, SheetGrid};

const ACCOUNT_NUMBER: usize = 0;
const LEDGER_ACCOUNT: usize = 1;
const COMPANY: usize = 2;
const COMPANY_NAME: usize = 3;
const PRODUCT_CODE: usize = 4;
const PRODUCT_NAME: usize = 5;
const SALE_CODES: usize = 6;

/// Where the registry table sits in its sheet and how its columns behave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryProfile {
    /// Row holding the column labels. Only used for logging.
    pub header_row: usize,
    /// First data row.
    pub data_start: usize,
    /// Account number, ledger account, company, company name, product code,
    /// product name and sale codes, in that order.
    pub fields: Vec<FillField>,
}

impl Default for RegistryProfile {
    fn default() -> Self {
        Self {
            header_row: 4,
            data_start: 5,
            fields: vec![
                FillField::new("NRO CONTA", 1)
                    .filled()
                    .numeric()
                    .keywords(["nro", "conta"]),
                FillField::new("CONTA CONTÁBIL", 2).filled(),
                FillField::new("EMPRESA", 3).filled(),
                FillField::new("NOME DA EMPRESA", 4).filled(),
                FillField::new("COD PRODUTO", 5)
                    .numeric()
                    .keywords(["cod", "produto"]),
                FillField::new("NOME DO PRODUTO", 6),
                FillField::new("COD DE VENDA", 7).filled(),
            ],
        }
    }
}

impl RegistryProfile {
    fn forward_fill(&self) -> Result<ForwardFill> {
        if self.fields.len() != SALE_CODES + 1 {
            return Err(IngestError::InvalidConfig(format!(
                "registry profile needs {} fields, got {}",
                SALE_CODES + 1,
                self.fields.len()
            )));
        }
        ForwardFill::new(self.fields.clone(), PRODUCT_CODE)
            .ok_or_else(|| IngestError::InvalidConfig("registry leaf field missing".into()))
    }
}

/// Registry entries of one sheet together with the row counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryExtraction {
    pub entries: Vec<RevenueEntry>,
    pub stats: FillStats,
}

/// Reads every product line of a registry sheet. Rows that only carry another
/// product inherit the account fields of the rows above them.
#[instrument(level = "info", skip_all, fields(sheet = %grid.name))]
pub fn extract_registry(grid: &SheetGrid, profile: &RegistryProfile) -> Result<RegistryExtraction> {
    let fill = profile.forward_fill()?;

    if let Some(header) = grid.rows.get(profile.header_row) {
        let labels: Vec<String> = fill
            .fields()
            .iter()
            .map(|field| header.get(field.column).map(Cell::to_text).unwrap_or_default())
            .collect();
        debug!(?labels, "registry header row");
    }

    let data = grid.rows.get(profile.data_start..).unwrap_or_default();
    let mut rows = fill.apply(data);
    let entries: Vec<RevenueEntry> = rows.by_ref().filter_map(|values| to_entry(&values)).collect();
    let stats = rows.stats();

    info!(
        rows_seen = stats.rows_seen,
        accepted = stats.accepted,
        restated_headers = stats.restated_headers,
        missing_leaf = stats.missing_leaf,
        non_numeric = stats.non_numeric,
        "registry sheet read"
    );
    Ok(RegistryExtraction { entries, stats })
}

fn to_entry(values: &[Option<Cell>]) -> Option<RevenueEntry> {
    let number = |index: usize| {
        values[index]
            .as_ref()
            .and_then(Cell::as_number)
            .map(|value| value.trunc() as i64)
    };
    let text = |index: usize| values[index].as_ref().map(Cell::to_text);

    Some(RevenueEntry {
        account_number: number(ACCOUNT_NUMBER),
        ledger_account: text(LEDGER_ACCOUNT),
        company: number(COMPANY),
        company_name: text(COMPANY_NAME),
        product_code: number(PRODUCT_CODE)?,
        product_name: text(PRODUCT_NAME),
        sale_codes: text(SALE_CODES),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ingest::model::RawRow;

    fn row(cells: &[Option<Cell>]) -> RawRow {
        let mut values = vec![None];
        values.extend_from_slice(cells);
        RawRow::new(values)
    }

    fn n(value: f64) -> Option<Cell> {
        Some(Cell::Number(value))
    }

    fn t(value: &str) -> Option<Cell> {
        Some(Cell::from(value))
    }

    fn grid() -> SheetGrid {
        let mut rows = vec![RawRow::default(); 4];
        rows.push(row(&[
            t("NRO CONTA"),
            t("CONTA CONTÁBIL"),
            t("EMPRESA"),
            t("NOME DA EMPRESA"),
            t("COD PRODUTO"),
            t("NOME DO PRODUTO"),
            t("COD DE VENDA"),
        ]));
        rows.push(row(&[
            n(301.0),
            t("3.1.01.001"),
            n(2.0),
            t("UNIBOX"),
            n(1001.0),
            t("CAIXA PARDA"),
            t("51; 52"),
        ]));
        rows.push(row(&[None, None, None, None, n(1002.0), t("CAIXA BRANCA")]));
        rows.push(RawRow::default());
        rows.push(row(&[t("RECEITAS INDUSTRIA")]));
        rows.push(row(&[
            t("NRO CONTA"),
            t("CONTA CONTÁBIL"),
            t("EMPRESA"),
            t("NOME DA EMPRESA"),
            t("COD PRODUTO"),
            t("NOME DO PRODUTO"),
            t("COD DE VENDA"),
        ]));
        rows.push(row(&[
            n(302.0),
            t("3.1.01.002"),
            n(4.0),
            t("UNIPLAST"),
            n(2001.0),
            t("FILME"),
            t("61"),
        ]));
        rows.push(row(&[None, None, None, None, n(2002.0), t("SACO")]));
        SheetGrid::new("CADASTRO RECEITA", rows)
    }

    #[test]
    fn products_inherit_account_fields() {
        let extraction = extract_registry(&grid(), &RegistryProfile::default()).unwrap();
        let entries = &extraction.entries;

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].product_code, 1002);
        assert_eq!(entries[1].account_number, Some(301));
        assert_eq!(entries[1].company_name.as_deref(), Some("UNIBOX"));
        assert_eq!(entries[1].sale_codes.as_deref(), Some("51; 52"));
        assert_eq!(entries[2].company, Some(4));
        assert_eq!(entries[2].product_name.as_deref(), Some("FILME"));
        assert_eq!(entries[3].account_number, Some(302));
        assert_eq!(entries[3].sale_codes.as_deref(), Some("61"));
    }

    #[test]
    fn titles_and_repeated_headers_are_counted() {
        let extraction = extract_registry(&grid(), &RegistryProfile::default()).unwrap();
        let stats = extraction.stats;

        assert_eq!(stats.rows_seen, 7);
        assert_eq!(stats.blank_rows, 1);
        assert_eq!(stats.missing_leaf, 1);
        assert_eq!(stats.restated_headers, 1);
        assert_eq!(stats.accepted, 4);
    }

    #[test]
    fn short_sheets_yield_nothing() {
        let grid = SheetGrid::new("CADASTRO RECEITA", vec![RawRow::default(); 2]);
        let extraction = extract_registry(&grid, &RegistryProfile::default()).unwrap();
        assert!(extraction.entries.is_empty());
        assert_eq!(extraction.stats.rows_seen, 0);
    }

    #[test]
    fn incomplete_profiles_are_rejected() {
        let mut profile = RegistryProfile::default();
        profile.fields.truncate(3);
        let grid = grid();
        assert!(matches!(
            extract_registry(&grid, &profile),
            Err(IngestError::InvalidConfig(_))
        ));
    }
}
