//! Folding classified rows into complete records.
//!
//! Grouped sheets are read one row at a time: [`Assembler::step`] threads the
//! unit context and the sheet statistics through an explicit fold and yields
//! a [`LogicalRecord`] for every account row whose code normalizes.
//!
//! Registry sheets spread one record over several rows: the first row holds
//! the shared fields and the following rows only repeat the leaf field.
//! [`ForwardFill`] carries the shared fields down onto those rows.

use std::slice;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::budget::ingest::classify::{Layout, RowTag, UnitContext, classify};
use crate::budget::ingest::model::{Cell, LogicalRecord, RawRow, SheetGrid};

/// Row and record counts for one grouped sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SheetStats {
    pub rows_seen: usize,
    pub unit_markers: usize,
    pub account_rows: usize,
    pub noise_rows: usize,
    /// Account rows dropped because their code did not normalize.
    pub codes_dropped: usize,
    /// Amount cells that were populated but not numeric.
    pub malformed_amounts: usize,
    pub records: usize,
}

/// State carried from one row to the next while scanning a sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pub unit: UnitContext,
    pub stats: SheetStats,
}

/// Turns account rows of one sheet into [`LogicalRecord`]s.
#[derive(Debug, Clone, Copy)]
pub struct Assembler<'a> {
    layout: &'a Layout,
    source: &'a str,
    company: i64,
}

impl<'a> Assembler<'a> {
    pub fn new(layout: &'a Layout, source: &'a str, company: i64) -> Self {
        Self {
            layout,
            source,
            company,
        }
    }

    /// Consumes one row. Returns the record it completes, if any, together
    /// with the state for the next row.
    pub fn step(&self, row: &RawRow, state: ScanState) -> (Option<LogicalRecord>, ScanState) {
        let tag = classify(row, self.layout, &state.unit);
        let mut stats = state.stats;
        stats.rows_seen += 1;
        let unit = state.unit.advance(&tag);

        let record = match tag {
            RowTag::UnitMarker(_) => {
                stats.unit_markers += 1;
                None
            }
            RowTag::Noise => {
                stats.noise_rows += 1;
                None
            }
            RowTag::AccountRecord(payload) => {
                stats.account_rows += 1;
                stats.malformed_amounts += payload.malformed_amounts;
                match payload.code {
                    Some(account_code) => {
                        stats.records += 1;
                        Some(LogicalRecord {
                            internal_code: payload.internal_code,
                            unit_code: state.unit.current(),
                            account_code,
                            description: payload.description,
                            monthly_amounts: payload.amounts,
                            source: self.source.to_string(),
                            company: self.company,
                        })
                    }
                    None => {
                        stats.codes_dropped += 1;
                        debug!(raw_code = %payload.raw_code, "dropping row with unparseable account code");
                        None
                    }
                }
            }
        };

        (record, ScanState { unit, stats })
    }
}

/// Lazy record stream over one sheet. See [`extract_sheet`].
#[derive(Debug, Clone)]
pub struct SheetRecords<'a> {
    assembler: Assembler<'a>,
    rows: slice::Iter<'a, RawRow>,
    state: ScanState,
}

impl SheetRecords<'_> {
    /// Counts for the rows consumed so far.
    pub fn stats(&self) -> SheetStats {
        self.state.stats
    }
}

impl Iterator for SheetRecords<'_> {
    type Item = LogicalRecord;

    fn next(&mut self) -> Option<Self::Item> {
        for row in self.rows.by_ref() {
            let (record, state) = self.assembler.step(row, self.state);
            self.state = state;
            if record.is_some() {
                return record;
            }
        }
        None
    }
}

/// Reads the records of one grouped sheet, starting from an empty unit
/// context. Records are produced as the iterator is advanced.
pub fn extract_sheet<'a>(grid: &'a SheetGrid, layout: &'a Layout, company: i64) -> SheetRecords<'a> {
    SheetRecords {
        assembler: Assembler::new(layout, &grid.name, company),
        rows: grid.rows.iter(),
        state: ScanState::default(),
    }
}

/// One column of a multi-row registry layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillField {
    /// Header label of the column.
    pub label: String,
    pub column: usize,
    /// Whether empty cells inherit the value above.
    #[serde(default)]
    pub forward_fill: bool,
    /// Whether a populated value must parse as a number.
    #[serde(default)]
    pub numeric: bool,
    /// Extra words that, besides the label itself, mark a restated header.
    #[serde(default)]
    pub header_keywords: Vec<String>,
}

impl FillField {
    pub fn new(label: impl Into<String>, column: usize) -> Self {
        Self {
            label: label.into(),
            column,
            forward_fill: false,
            numeric: false,
            header_keywords: Vec::new(),
        }
    }

    pub fn filled(mut self) -> Self {
        self.forward_fill = true;
        self
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// True when the value is text that repeats this column's header.
    fn restates_header(&self, value: &Cell) -> bool {
        let Cell::Text(text) = value else {
            return false;
        };
        let text = text.to_lowercase();
        std::iter::once(&self.label)
            .chain(&self.header_keywords)
            .any(|word| text.contains(&word.to_lowercase()))
    }
}

/// Column-wise forward-fill over a registry sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardFill {
    fields: Vec<FillField>,
    leaf: usize,
}

impl ForwardFill {
    /// `leaf` indexes into `fields` and names the field every accepted row
    /// must carry itself. The leaf is always required to be numeric. Returns
    /// `None` when `leaf` is out of range.
    pub fn new(fields: Vec<FillField>, leaf: usize) -> Option<Self> {
        (leaf < fields.len()).then_some(Self { fields, leaf })
    }

    pub fn fields(&self) -> &[FillField] {
        &self.fields
    }

    /// Fills and filters `rows`, yielding one value per field for each
    /// accepted row.
    pub fn apply<'a>(&'a self, rows: &'a [RawRow]) -> FilledRows<'a> {
        FilledRows {
            fill: self,
            rows: rows.iter(),
            carried: vec![None; self.fields.len()],
            stats: FillStats::default(),
        }
    }
}

/// Row counts for one forward-filled sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FillStats {
    pub rows_seen: usize,
    pub blank_rows: usize,
    pub missing_leaf: usize,
    pub non_numeric: usize,
    pub restated_headers: usize,
    pub accepted: usize,
}

/// Lazy stream of forward-filled rows. See [`ForwardFill::apply`].
#[derive(Debug, Clone)]
pub struct FilledRows<'a> {
    fill: &'a ForwardFill,
    rows: slice::Iter<'a, RawRow>,
    carried: Vec<Option<Cell>>,
    stats: FillStats,
}

impl FilledRows<'_> {
    pub fn stats(&self) -> FillStats {
        self.stats
    }
}

impl Iterator for FilledRows<'_> {
    type Item = Vec<Option<Cell>>;

    fn next(&mut self) -> Option<Self::Item> {
        let fill = self.fill;
        for row in self.rows.by_ref() {
            self.stats.rows_seen += 1;
            if fill.fields.iter().all(|field| !row.is_populated(field.column)) {
                self.stats.blank_rows += 1;
                continue;
            }

            let values = fill_row(&fill.fields, &mut self.carried, row);
            match &values[fill.leaf] {
                None => {
                    self.stats.missing_leaf += 1;
                    continue;
                }
                Some(cell) if cell.as_number().is_none() => {
                    if fill.fields[fill.leaf].restates_header(cell) {
                        self.stats.restated_headers += 1;
                    } else {
                        self.stats.non_numeric += 1;
                    }
                    continue;
                }
                Some(_) => {}
            }

            let restated = fill.fields.iter().zip(&values).any(|(field, value)| {
                value.as_ref().is_some_and(|cell| field.restates_header(cell))
            });
            if restated {
                self.stats.restated_headers += 1;
                continue;
            }

            let malformed = fill.fields.iter().zip(&values).any(|(field, value)| {
                field.numeric && value.as_ref().is_some_and(|cell| cell.as_number().is_none())
            });
            if malformed {
                self.stats.non_numeric += 1;
                continue;
            }

            self.stats.accepted += 1;
            return Some(values);
        }
        None
    }
}

/// Reads the configured fields of `row`, taking carried values for empty
/// forward-filled cells and remembering populated ones.
fn fill_row(fields: &[FillField], carried: &mut [Option<Cell>], row: &RawRow) -> Vec<Option<Cell>> {
    fields
        .iter()
        .zip(carried.iter_mut())
        .map(|(field, carried)| match row.get(field.column) {
            Some(cell) => {
                if field.forward_fill {
                    *carried = Some(cell.clone());
                }
                Some(cell.clone())
            }
            None if field.forward_fill => carried.clone(),
            None => None,
        })
        .collect()
}
