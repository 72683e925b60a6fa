use std::iter;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::budget::ingest::assemble::{FillStats, SheetStats, extract_sheet};
use crate::budget::ingest::chart::{ChartColumns, ChartStats, read_chart};
use crate::budget::ingest::classify::{Columns, Layout};
use crate::budget::ingest::config::{FinancialProfile, ImportConfig, SheetEntry};
use crate::budget::ingest::error::{IngestError, Result};
use crate::budget::ingest::io::excel_read::{WorkbookReader, resolve_sheet};
use crate::budget::ingest::io::excel_write::XlsxFactSink;
use crate::budget::ingest::io::sink::{HighWaterMark, JsonLinesLedger, JsonLinesSink, RecordSink};
use crate::budget::ingest::model::{FactRow, LogicalRecord, SheetGrid};
use crate::budget::ingest::pivot::{PivotSettings, first_id_after, pivot_records};
use crate::budget::ingest::registry::{RegistryProfile, extract_registry};

/// Files taking part in a budget import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub input: PathBuf,
    /// Fact ledger. New facts are appended and ids continue from its highest.
    pub ledger: PathBuf,
    /// Optional JSON lines file receiving the wide records.
    pub records: Option<PathBuf>,
    /// Optional workbook receiving the facts of this run.
    pub export: Option<PathBuf>,
    /// Sheets to import. Empty means every configured sheet present in the
    /// workbook.
    pub sheets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub sheet: String,
    pub company: i64,
    pub stats: SheetStats,
    pub facts: u64,
    /// Id of the first fact of this sheet.
    pub start_id: u64,
    /// Id the next sheet continues from.
    pub next_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub start_id: u64,
    pub next_id: u64,
    pub sheets: Vec<SheetSummary>,
}

impl ImportSummary {
    pub fn records(&self) -> usize {
        self.sheets.iter().map(|sheet| sheet.stats.records).sum()
    }

    pub fn facts(&self) -> u64 {
        self.sheets.iter().map(|sheet| sheet.facts).sum()
    }
}

/// Settings shared by every fact of a run stamped at `timestamp`.
pub fn pivot_settings(config: &ImportConfig, timestamp: NaiveDateTime) -> PivotSettings {
    PivotSettings {
        year: config.year,
        record_type: config.record_type.clone(),
        history: config.history.clone(),
        user_id: config.user_id,
        timestamp,
    }
}

pub fn layout_for(entry: &SheetEntry, columns: &Columns) -> Layout {
    if entry.shifted_markers {
        Layout::grouped(columns.clone())
    } else {
        Layout::grouped_without_shifted_markers(columns.clone())
    }
}

/// Extracts one grouped sheet and hands every record, then its twelve facts,
/// to the sinks before reading further. Facts are numbered from `start_id`.
#[instrument(level = "info", skip_all, fields(sheet = %grid.name, company = company))]
pub fn ingest_sheet<R, F>(
    grid: &SheetGrid,
    company: i64,
    layout: &Layout,
    settings: &PivotSettings,
    start_id: u64,
    records: &mut R,
    facts: &mut F,
) -> Result<SheetSummary>
where
    R: RecordSink<LogicalRecord>,
    F: RecordSink<FactRow>,
{
    let mut extracted = extract_sheet(grid, layout, company);
    let mut next_id = start_id;
    let mut written = 0;

    for record in extracted.by_ref() {
        records.append(&record)?;
        let mut pivot = pivot_records(iter::once(record), next_id, settings);
        for fact in pivot.by_ref() {
            facts.append(&fact)?;
            written += 1;
        }
        next_id = pivot.next_id();
    }

    let stats = extracted.stats();
    info!(
        rows_seen = stats.rows_seen,
        unit_markers = stats.unit_markers,
        account_rows = stats.account_rows,
        noise_rows = stats.noise_rows,
        codes_dropped = stats.codes_dropped,
        malformed_amounts = stats.malformed_amounts,
        records = stats.records,
        facts = written,
        "sheet ingested"
    );

    Ok(SheetSummary {
        sheet: grid.name.clone(),
        company,
        stats,
        facts: written,
        start_id,
        next_id,
    })
}

/// Imports the grouped budget sheets of a workbook into the fact ledger.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %request.input.display(), ledger = %request.ledger.display())
)]
pub fn import_workbook(request: &ImportRequest, config: &ImportConfig) -> Result<ImportSummary> {
    config.validate()?;
    let ledger = JsonLinesLedger::new(&request.ledger);
    let start_id = first_id_after(ledger.high_water_mark()?);
    info!(start_id, "continuing ledger");

    let mut workbook = WorkbookReader::open(&request.input)?;
    let jobs = select_sheets(workbook.sheet_names(), &request.sheets, config)?;

    let mut records = request
        .records
        .as_deref()
        .map(JsonLinesSink::append_to)
        .transpose()?;
    let export = request.export.as_deref().map(XlsxFactSink::new).transpose()?;
    let mut facts = (ledger.appender()?, export);

    let settings = pivot_settings(config, Local::now().naive_local());
    let mut summary = ImportSummary {
        start_id,
        next_id: start_id,
        sheets: Vec::with_capacity(jobs.len()),
    };

    for (name, entry) in jobs {
        let grid = workbook.read_grid(&name)?;
        let layout = layout_for(&entry, &config.columns);
        let sheet = ingest_sheet(
            &grid,
            entry.company,
            &layout,
            &settings,
            summary.next_id,
            &mut records,
            &mut facts,
        )?;
        summary.next_id = sheet.next_id;
        summary.sheets.push(sheet);
    }

    RecordSink::<LogicalRecord>::finish(&mut records)?;
    RecordSink::<FactRow>::finish(&mut facts)?;

    info!(
        sheets = summary.sheets.len(),
        records = summary.records(),
        facts = summary.facts(),
        next_id = summary.next_id,
        "import finished"
    );
    Ok(summary)
}

/// Pairs each sheet to import with its configuration. Explicitly requested
/// sheets are resolved in the workbook first and then take the company of
/// the configured sheet with that exact name; configured sheets missing from
/// the workbook are skipped.
fn select_sheets(
    names: &[String],
    requested: &[String],
    config: &ImportConfig,
) -> Result<Vec<(String, SheetEntry)>> {
    if requested.is_empty() {
        let mut jobs = Vec::new();
        for entry in &config.sheets {
            match resolve_sheet(names, &entry.name) {
                Some(name) => jobs.push((name.to_string(), entry.clone())),
                None => warn!(sheet = %entry.name, "configured sheet not in workbook"),
            }
        }
        return Ok(jobs);
    }

    requested
        .iter()
        .map(|requested| {
            let name = resolve_sheet(names, requested).ok_or_else(|| {
                IngestError::InvalidWorkbook(format!("missing sheet '{requested}'"))
            })?;
            let key = name.trim().to_lowercase();
            let entry = config
                .sheets
                .iter()
                .find(|entry| entry.name.trim().to_lowercase() == key)
                .ok_or_else(|| {
                    IngestError::InvalidConfig(format!("no company configured for sheet '{name}'"))
                })?;
            Ok((name.to_string(), entry.clone()))
        })
        .collect()
}

/// Reads a chart-of-accounts sheet and writes its entries as JSON lines.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), sheet = %sheet, output = %output.display())
)]
pub fn import_chart(input: &Path, sheet: &str, output: &Path, columns: &ChartColumns) -> Result<ChartStats> {
    let grid = WorkbookReader::open(input)?.read_grid(sheet)?;
    let chart = read_chart(&grid, columns)?;
    write_all(output, &chart.entries)?;
    Ok(chart.stats)
}

/// Reads a revenue registry sheet and writes its entries as JSON lines.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), sheet = %sheet, output = %output.display())
)]
pub fn import_registry(
    input: &Path,
    sheet: &str,
    output: &Path,
    profile: &RegistryProfile,
) -> Result<FillStats> {
    let grid = WorkbookReader::open(input)?.read_grid(sheet)?;
    let registry = extract_registry(&grid, profile)?;
    write_all(output, &registry.entries)?;
    Ok(registry.stats)
}

/// Reads the financial budget sheet and writes its monthly records as JSON
/// lines. Records carry the profile's company and no unit.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), sheet = %sheet, output = %output.display())
)]
pub fn import_financial(
    input: &Path,
    sheet: &str,
    output: &Path,
    profile: &FinancialProfile,
) -> Result<SheetStats> {
    let grid = WorkbookReader::open(input)?.read_grid(sheet)?;
    let layout = Layout::financial(profile.columns.clone());
    let mut extracted = extract_sheet(&grid, &layout, profile.company);
    let mut sink = JsonLinesSink::create(output)?;
    for record in extracted.by_ref() {
        sink.append(&record)?;
    }
    RecordSink::<LogicalRecord>::finish(&mut sink)?;

    let stats = extracted.stats();
    info!(
        rows_seen = stats.rows_seen,
        noise_rows = stats.noise_rows,
        records = stats.records,
        "financial sheet read"
    );
    Ok(stats)
}

fn write_all<T: Serialize>(output: &Path, items: &[T]) -> Result<()> {
    let mut sink = JsonLinesSink::create(output)?;
    for item in items {
        sink.append(item)?;
    }
    RecordSink::<T>::finish(&mut sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ingest::io::sink::JsonLinesSink;
    use crate::budget::ingest::model::{Cell, RawRow};
    use chrono::NaiveDate;

    fn settings() -> PivotSettings {
        let timestamp = NaiveDate::from_ymd_opt(2026, 3, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap();
        pivot_settings(&ImportConfig::default(), timestamp)
    }

    fn account(internal: &str, code: &str, january: f64) -> RawRow {
        let mut cells = vec![None, Some(Cell::from(internal)), Some(Cell::from(code))];
        cells.resize(28, None);
        cells[5] = Some(Cell::Number(january));
        RawRow::new(cells)
    }

    fn grid() -> SheetGrid {
        SheetGrid::new(
            "Base fixo Unibox",
            vec![
                RawRow::new(vec![Some(Cell::Number(5.0))]),
                account("10", "4.1.1 - SALÁRIOS", 1500.25),
                account("11", "ref 4.1 - ajuste", 10.0),
                account("12", "4.1.2 - FÉRIAS", 20.0),
            ],
        )
    }

    #[test]
    fn records_and_facts_reach_the_sinks() {
        let settings = settings();
        let mut records: Vec<LogicalRecord> = Vec::new();
        let mut facts: Vec<FactRow> = Vec::new();

        let summary = ingest_sheet(&grid(), 2, &Layout::default(), &settings, 101, &mut records, &mut facts)
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(facts.len(), 24);
        assert_eq!(summary.facts, 24);
        assert_eq!(summary.stats.codes_dropped, 1);
        assert_eq!(summary.next_id, 125);
        assert_eq!(facts[0].id, 101);
        assert_eq!(facts[0].unit_code, 5);
        assert_eq!(facts[12].internal_code, "12");
        assert_eq!(facts[12].id, 113);
        assert_eq!(facts[0].company, 2);
    }

    #[test]
    fn sink_failures_stop_the_sheet() {
        struct Closed;

        impl std::io::Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::other("disk full"))
            }
        }

        let settings = settings();
        let mut records: Vec<LogicalRecord> = Vec::new();
        let mut facts = JsonLinesSink::new(Closed);
        let big = "x".repeat(16 * 1024);
        let mut rows = grid().rows;
        rows[1] = account(&big, "4.1.1 - SALÁRIOS", 1.0);
        let grid = SheetGrid::new("Base fixo Unibox", rows);

        let error = ingest_sheet(&grid, 2, &Layout::default(), &settings, 1, &mut records, &mut facts)
            .unwrap_err();
        assert!(matches!(error, IngestError::Sink { written: 0, .. }));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn requested_sheets_take_the_company_of_the_sheet_they_resolve_to() {
        let names = vec!["Base fixo Uniplast".to_string(), "Base fixo Unibox".to_string()];
        let config = ImportConfig::default();

        let jobs = select_sheets(&names, &["base fixo uni".to_string()], &config).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, "Base fixo Uniplast");
        assert_eq!(jobs[0].1.company, 4);

        let jobs = select_sheets(&names, &[], &config).unwrap();
        let companies: Vec<_> = jobs.iter().map(|(name, entry)| (name.as_str(), entry.company)).collect();
        assert_eq!(companies, vec![("Base fixo Unibox", 2), ("Base fixo Uniplast", 4)]);

        let error = select_sheets(&["Resumo".to_string()], &["resumo".to_string()], &config).unwrap_err();
        assert!(matches!(error, IngestError::InvalidConfig(_)));
    }
}
