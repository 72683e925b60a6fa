use std::path::{Path, PathBuf};

use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Table, Workbook, Worksheet};

use crate::budget::ingest::error::{IngestError, Result};
use crate::budget::ingest::io::sink::RecordSink;
use crate::budget::ingest::model::FactRow;

pub const FACTS_SHEET: &str = "Lancamentos";

const HEADERS: [&str; 14] = [
    "id",
    "record_type",
    "account_code",
    "internal_code",
    "unit_code",
    "period",
    "year",
    "history",
    "amount",
    "active",
    "company",
    "created_at",
    "updated_at",
    "user_id",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exports the facts of a run to a single worksheet. The file is written by
/// [`finish`](RecordSink::finish).
pub struct XlsxFactSink {
    path: PathBuf,
    worksheet: Option<Worksheet>,
    rows: u32,
}

impl XlsxFactSink {
    pub fn new(path: &Path) -> Result<Self> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(FACTS_SHEET)?;
        for (col_idx, header) in HEADERS.iter().enumerate() {
            worksheet.write_string(0, col_idx as u16, *header)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            worksheet: Some(worksheet),
            rows: 0,
        })
    }

    /// Facts written so far.
    pub fn rows(&self) -> u32 {
        self.rows
    }
}

impl RecordSink<FactRow> for XlsxFactSink {
    fn append(&mut self, fact: &FactRow) -> Result<()> {
        let Some(worksheet) = self.worksheet.as_mut() else {
            return Err(IngestError::InvalidWorkbook(format!(
                "export {} already written",
                self.path.display()
            )));
        };
        let row = self.rows + 1;
        worksheet.write_number(row, 0, fact.id as f64)?;
        worksheet.write_string(row, 1, &fact.record_type)?;
        worksheet.write_string(row, 2, fact.account_code.to_string())?;
        worksheet.write_string(row, 3, &fact.internal_code)?;
        worksheet.write_number(row, 4, fact.unit_code as f64)?;
        worksheet.write_number(row, 5, f64::from(fact.period))?;
        worksheet.write_number(row, 6, f64::from(fact.year))?;
        worksheet.write_string(row, 7, &fact.history)?;
        worksheet.write_number(row, 8, fact.amount.to_f64().unwrap_or_default())?;
        worksheet.write_boolean(row, 9, fact.active)?;
        worksheet.write_number(row, 10, fact.company as f64)?;
        worksheet.write_string(row, 11, fact.created_at.format(TIMESTAMP_FORMAT).to_string())?;
        worksheet.write_string(row, 12, fact.updated_at.format(TIMESTAMP_FORMAT).to_string())?;
        worksheet.write_number(row, 13, fact.user_id as f64)?;
        self.rows = row;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut worksheet) = self.worksheet.take() else {
            return Ok(());
        };
        if self.rows > 0 {
            let mut table = Table::new();
            let table = table.set_autofilter(true);
            worksheet.add_table(0, 0, self.rows, (HEADERS.len() - 1) as u16, table)?;
        }

        let mut workbook = Workbook::new();
        workbook.push_worksheet(worksheet);
        workbook.save(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn fact(id: u64) -> FactRow {
        let timestamp = NaiveDate::from_ymd_opt(2026, 3, 1)
            .and_then(|date| date.and_hms_opt(8, 30, 0))
            .unwrap();
        FactRow {
            id,
            record_type: "Saldo Inicial".into(),
            account_code: "4.1.1".parse().unwrap(),
            internal_code: "10".into(),
            unit_code: 5,
            period: 1,
            year: 2026,
            history: "Saldo inicial previsto".into(),
            amount: Decimal::new(150025, 2),
            active: true,
            company: 2,
            created_at: timestamp,
            updated_at: timestamp,
            user_id: 1,
        }
    }

    #[test]
    fn facts_after_the_export_is_written_are_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("facts.xlsx");
        let mut sink = XlsxFactSink::new(&path).unwrap();
        sink.append(&fact(1)).unwrap();
        sink.finish().unwrap();
        assert!(path.exists());
        assert_eq!(sink.rows(), 1);

        let error = sink.append(&fact(2)).unwrap_err();
        assert!(matches!(error, IngestError::InvalidWorkbook(_)));
        assert_eq!(sink.rows(), 1);
    }
}
