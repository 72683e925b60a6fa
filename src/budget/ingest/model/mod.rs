use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of monthly amount slots carried by a budget record.
pub const MONTHS: usize = 12;

/// Scalar value held by a populated spreadsheet cell.
///
/// Absent cells are modelled as `None` at the row level, so a `Cell` always
/// carries something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Numeric cell. Spreadsheets store integers as floats as well.
    Number(f64),
    /// Boolean cell.
    Bool(bool),
    /// Text cell.
    Text(String),
}

impl Cell {
    /// Renders the cell as text. Integral numbers drop the fractional part so
    /// that a code typed as `5` is read back as `"5"` and not `"5.0"`.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                format!("{}", *value as i64)
            }
            Cell::Number(value) => value.to_string(),
            Cell::Bool(value) => value.to_string(),
            Cell::Text(value) => value.clone(),
        }
    }

    /// Returns the cell as an integer when it holds one exactly: an integral
    /// finite number, or text that parses as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Number(value)
                if value.is_finite()
                    && value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value <= i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            Cell::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the cell as a finite floating point number.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(value) => *value,
            Cell::Text(value) => value.trim().parse().ok()?,
            Cell::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Returns the cell as an amount rounded to cents, half away from zero.
    pub fn as_decimal(&self) -> Option<Decimal> {
        let amount = match self {
            Cell::Number(value) => Decimal::from_f64(*value)?,
            Cell::Text(value) => value.trim().parse().ok()?,
            Cell::Bool(_) => return None,
        };
        Some(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// One spreadsheet row addressed by absolute column position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<Option<Cell>>,
}

impl RawRow {
    pub fn new(cells: Vec<Option<Cell>>) -> Self {
        Self { cells }
    }

    /// Returns the cell at `column`, treating positions past the end as empty.
    pub fn get(&self, column: usize) -> Option<&Cell> {
        self.cells.get(column).and_then(Option::as_ref)
    }

    pub fn is_populated(&self, column: usize) -> bool {
        self.get(column).is_some()
    }

    /// True when no cell of the row holds a value.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    pub fn width(&self) -> usize {
        self.cells.len()
    }
}

impl FromIterator<Option<Cell>> for RawRow {
    fn from_iter<T: IntoIterator<Item = Option<Cell>>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The rows of one worksheet. Row 0 and column 0 correspond to cell `A1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<RawRow>,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// Raised when a dotted code string is not a valid hierarchical code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid hierarchical code '{0}'")]
pub struct ParseCodeError(pub String);

/// Position in a chart of accounts: dotted digit groups, most significant
/// first.
///
/// Groups are never empty and carry no leading zeros (`"0"` itself is kept),
/// so two spellings of the same code compare equal once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HierarchicalCode {
    groups: Vec<String>,
}

impl HierarchicalCode {
    /// Builds a code from raw digit groups, canonicalising each one. Returns
    /// `None` when there are no groups or when a group is empty or holds
    /// anything but ASCII digits.
    pub fn from_groups<I, S>(groups: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let groups = groups
            .into_iter()
            .map(|group| canonical_group(group.as_ref()))
            .collect::<Option<Vec<_>>>()?;
        if groups.is_empty() {
            return None;
        }
        Some(Self { groups })
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// Number of levels in the code.
    pub fn depth(&self) -> usize {
        self.groups.len()
    }

    /// The code one level up, or `None` for a top-level code.
    pub fn parent(&self) -> Option<Self> {
        (self.groups.len() > 1).then(|| Self {
            groups: self.groups[..self.groups.len() - 1].to_vec(),
        })
    }

    /// Legacy rendering with every group zero-padded to three digits, as in
    /// `001.001.001`.
    pub fn padded(&self) -> String {
        self.groups
            .iter()
            .map(|group| format!("{group:0>3}"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn canonical_group(group: &str) -> Option<String> {
    if group.is_empty() || !group.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let trimmed = group.trim_start_matches('0');
    Some(if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    })
}

impl fmt::Display for HierarchicalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.groups.join("."))
    }
}

impl FromStr for HierarchicalCode {
    type Err = ParseCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_groups(value.trim().split('.')).ok_or_else(|| ParseCodeError(value.to_string()))
    }
}

impl Serialize for HierarchicalCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HierarchicalCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// One budget line recovered from a grouped sheet, still in its wide form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalRecord {
    /// Spreadsheet-local account identifier (the `COD` column).
    pub internal_code: String,
    /// Organizational unit in effect when the row was read; `None` when the
    /// row came before any unit marker.
    pub unit_code: Option<i64>,
    pub account_code: HierarchicalCode,
    pub description: String,
    /// January to December. `None` marks an empty or non-numeric cell.
    pub monthly_amounts: [Option<Decimal>; MONTHS],
    /// Name of the sheet the record was read from.
    pub source: String,
    pub company: i64,
}

/// One narrow, per-period budget entry ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub id: u64,
    pub record_type: String,
    pub account_code: HierarchicalCode,
    pub internal_code: String,
    /// `0` when the source record had no unit.
    pub unit_code: i64,
    /// Month number, 1 to 12.
    pub period: u8,
    pub year: i32,
    pub history: String,
    pub amount: Decimal,
    pub active: bool,
    pub company: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub user_id: i64,
}

/// One line of the chart of accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub id: i64,
    pub parent_id: Option<i64>,
    /// Raw 15-digit level flag the code was derived from.
    pub level_flag: Option<i64>,
    pub account_code: Option<HierarchicalCode>,
    pub description: String,
}

/// One product line of the revenue registry after forward-fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueEntry {
    pub account_number: Option<i64>,
    pub ledger_account: Option<String>,
    pub company: Option<i64>,
    pub company_name: Option<String>,
    pub product_code: i64,
    pub product_name: Option<String>,
    pub sale_codes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_canonicalise_leading_zeros() {
        let code: HierarchicalCode = "004.001.000".parse().unwrap();
        assert_eq!(code.to_string(), "4.1.0");
        assert_eq!(code.padded(), "004.001.000");
        assert_eq!(code.parent().unwrap().to_string(), "4.1");
    }

    #[test]
    fn codes_reject_empty_groups() {
        assert!("4..1".parse::<HierarchicalCode>().is_err());
        assert!(".4".parse::<HierarchicalCode>().is_err());
        assert!("".parse::<HierarchicalCode>().is_err());
        assert!("4.a".parse::<HierarchicalCode>().is_err());
    }

    #[test]
    fn integer_cells_require_exact_values() {
        assert_eq!(Cell::Number(5.0).as_integer(), Some(5));
        assert_eq!(Cell::Number(5.5).as_integer(), None);
        assert_eq!(Cell::from(" 12 ").as_integer(), Some(12));
        assert_eq!(Cell::from("Gestão").as_integer(), None);
        assert_eq!(Cell::Bool(true).as_integer(), None);
    }

    #[test]
    fn text_rendering_drops_integral_fraction() {
        assert_eq!(Cell::Number(110.0).to_text(), "110");
        assert_eq!(Cell::Number(4.1).to_text(), "4.1");
    }

    #[test]
    fn decimal_cells_round_to_cents() {
        assert_eq!(Cell::Number(1500.25).as_decimal(), Some(Decimal::new(150025, 2)));
        assert_eq!(Cell::Number(0.125).as_decimal(), Some(Decimal::new(13, 2)));
        assert_eq!(Cell::from("1234.5").as_decimal(), Some(Decimal::new(12345, 1)));
        assert_eq!(Cell::from("n/a").as_decimal(), None);
    }

    #[test]
    fn rows_treat_missing_columns_as_empty() {
        let row = RawRow::new(vec![Some(Cell::Number(1.0)), None]);
        assert!(row.is_populated(0));
        assert!(!row.is_populated(1));
        assert!(!row.is_populated(40));
        assert!(!row.is_blank());
    }
}
