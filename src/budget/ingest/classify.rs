//! Row classification for grouped budget sheets.
//!
//! A grouped sheet interleaves unit marker rows (a bare unit number) with
//! account rows (`COD | 004.001.001 - DESCRIPTION | ... monthly amounts`) and
//! any amount of titles, totals and blank rows. Each row is tagged by an
//! ordered chain of [`Rule`]s; the first rule that returns a tag wins.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::budget::ingest::code::split_free_text;
use crate::budget::ingest::model::{Cell, HierarchicalCode, MONTHS, RawRow};

/// At least two dotted groups of one to three digits, anywhere in the text.
static ACCOUNT_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{1,3}\.[0-9]{1,3}").expect("valid regex"));

/// Fixed column positions of a grouped sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    /// Column holding the unit number on marker rows.
    pub unit: usize,
    /// Column holding the internal account code; also the secondary unit
    /// column on sheets that shift markers one column right.
    pub internal: usize,
    /// Column holding the `code - description` text.
    pub account: usize,
    /// January to December amount columns.
    pub months: [usize; MONTHS],
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            unit: 0,
            internal: 1,
            account: 2,
            months: [5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 25, 27],
        }
    }
}

impl Columns {
    /// Positions of the financial budget sheet: integer code, description,
    /// then the planned amount of each month followed by its actual.
    pub fn financial() -> Self {
        Self {
            unit: 0,
            internal: 0,
            account: 1,
            months: [2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24],
        }
    }
}

/// Unit code in effect while scanning one sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitContext {
    current: Option<i64>,
}

impl UnitContext {
    pub fn current(&self) -> Option<i64> {
        self.current
    }

    /// Returns the context that follows a row with the given tag. Only unit
    /// markers change it.
    pub fn advance(self, tag: &RowTag) -> Self {
        match tag {
            RowTag::UnitMarker(code) => Self {
                current: Some(*code),
            },
            _ => self,
        }
    }
}

/// Fields of an account row, before its code is normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountPayload {
    pub internal_code: String,
    /// Code part of the account text, as written.
    pub raw_code: String,
    /// `raw_code` normalized, `None` when it does not parse.
    pub code: Option<HierarchicalCode>,
    pub description: String,
    pub amounts: [Option<Decimal>; MONTHS],
    /// Number of amount cells that were populated but not numeric.
    pub malformed_amounts: usize,
}

/// Classification of a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowTag {
    UnitMarker(i64),
    AccountRecord(AccountPayload),
    Noise,
}

/// One step of the classification chain. Returns `None` to defer to the next
/// rule.
pub type Rule = fn(&RawRow, &Columns, &UnitContext) -> Option<RowTag>;

/// Rules and column positions used to read one family of sheets.
#[derive(Debug, Clone)]
pub struct Layout {
    pub columns: Columns,
    rules: Vec<Rule>,
}

impl Layout {
    /// The grouped layout: primary markers, shifted markers, account rows.
    pub fn grouped(columns: Columns) -> Self {
        Self::with_rules(columns, vec![unit_marker, shifted_unit_marker, account_row])
    }

    /// A grouped layout that never looks for markers in the internal-code
    /// column.
    pub fn grouped_without_shifted_markers(columns: Columns) -> Self {
        Self::with_rules(columns, vec![unit_marker, account_row])
    }

    /// The financial budget layout: one account per row keyed by an integer
    /// code, without unit markers.
    pub fn financial(columns: Columns) -> Self {
        Self::with_rules(columns, vec![financial_row])
    }

    pub fn with_rules(columns: Columns, rules: Vec<Rule>) -> Self {
        Self { columns, rules }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::grouped(Columns::default())
    }
}

/// Tags a row. Rows no rule claims are [`RowTag::Noise`].
pub fn classify(row: &RawRow, layout: &Layout, context: &UnitContext) -> RowTag {
    layout
        .rules
        .iter()
        .find_map(|rule| rule(row, &layout.columns, context))
        .unwrap_or(RowTag::Noise)
}

/// True when the text contains something shaped like `4.1` or `004.001`.
pub fn looks_like_account(text: &str) -> bool {
    ACCOUNT_SHAPE.is_match(text)
}

/// Unit number alone in the unit column. A non-integer there makes the row
/// noise.
pub fn unit_marker(row: &RawRow, columns: &Columns, _: &UnitContext) -> Option<RowTag> {
    let cell = row.get(columns.unit)?;
    if row.is_populated(columns.internal) {
        return None;
    }
    Some(cell.as_integer().map_or(RowTag::Noise, RowTag::UnitMarker))
}

/// Unit number shifted into the internal-code column, recognised because the
/// account column next to it holds a unit name rather than an account code.
pub fn shifted_unit_marker(row: &RawRow, columns: &Columns, _: &UnitContext) -> Option<RowTag> {
    if row.is_populated(columns.unit) {
        return None;
    }
    let code = row.get(columns.internal)?.as_integer()?;
    let neighbour = row
        .get(columns.account)
        .map(|cell| cell.to_text())
        .unwrap_or_default();
    (!looks_like_account(&neighbour)).then_some(RowTag::UnitMarker(code))
}

/// Internal code plus an account-shaped `code - description` text.
pub fn account_row(row: &RawRow, columns: &Columns, _: &UnitContext) -> Option<RowTag> {
    let internal = row.get(columns.internal)?;
    let text = row.get(columns.account)?.to_text();
    if !looks_like_account(&text) {
        return None;
    }

    let split = split_free_text(&text);
    let code = split.and_then(|(code, _)| HierarchicalCode::from_groups(code.split('.')));
    let (raw_code, description) = match split {
        Some((code, description)) if !description.is_empty() => {
            (code.to_string(), description.to_string())
        }
        Some((code, _)) => (code.to_string(), text.trim().to_string()),
        None => (text.trim().to_string(), text.trim().to_string()),
    };

    let (amounts, malformed_amounts) = read_amounts(row, columns);
    Some(RowTag::AccountRecord(AccountPayload {
        internal_code: internal.to_text().trim().to_string(),
        raw_code,
        code,
        description,
        amounts,
        malformed_amounts,
    }))
}

/// Financial budget row: a non-negative integer code and a description. The
/// code is used both as the internal code and as a single-level account code.
pub fn financial_row(row: &RawRow, columns: &Columns, _: &UnitContext) -> Option<RowTag> {
    let number = row
        .get(columns.internal)
        .and_then(Cell::as_integer)
        .filter(|number| *number >= 0)?;
    let description = row.get(columns.account)?.to_text().trim().to_string();
    if description.is_empty() {
        return None;
    }

    let raw_code = number.to_string();
    let (amounts, malformed_amounts) = read_amounts(row, columns);
    Some(RowTag::AccountRecord(AccountPayload {
        internal_code: raw_code.clone(),
        code: HierarchicalCode::from_groups([raw_code.as_str()]),
        raw_code,
        description,
        amounts,
        malformed_amounts,
    }))
}

fn read_amounts(row: &RawRow, columns: &Columns) -> ([Option<Decimal>; MONTHS], usize) {
    let mut malformed = 0;
    let mut amounts = [None; MONTHS];
    for (slot, column) in amounts.iter_mut().zip(columns.months) {
        if let Some(cell) = row.get(column) {
            *slot = cell.as_decimal();
            if slot.is_none() {
                malformed += 1;
            }
        }
    }
    (amounts, malformed)
}
