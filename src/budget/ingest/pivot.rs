use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::budget::ingest::model::{FactRow, LogicalRecord, MONTHS};

/// Fields every fact of a run shares.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotSettings {
    pub year: i32,
    pub record_type: String,
    pub history: String,
    pub user_id: i64,
    /// Creation and update time stamped on every fact.
    pub timestamp: NaiveDateTime,
}

/// First id to hand out given the highest id already persisted (`0` when
/// nothing is).
pub fn first_id_after(high_water_mark: u64) -> u64 {
    high_water_mark + 1
}

/// Lazy fact stream. See [`pivot_records`].
#[derive(Debug, Clone)]
pub struct Pivot<'s, I> {
    records: I,
    settings: &'s PivotSettings,
    next_id: u64,
    current: Option<LogicalRecord>,
    period: usize,
}

impl<I> Pivot<'_, I> {
    /// The id the next fact will receive, or the one to resume from once the
    /// stream is exhausted.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }
}

impl<I> Iterator for Pivot<'_, I>
where
    I: Iterator<Item = LogicalRecord>,
{
    type Item = FactRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.period == MONTHS {
            self.current = None;
        }
        if self.current.is_none() {
            self.current = Some(self.records.next()?);
            self.period = 0;
        }
        let record = self.current.as_ref()?;

        let fact = FactRow {
            id: self.next_id,
            record_type: self.settings.record_type.clone(),
            account_code: record.account_code.clone(),
            internal_code: record.internal_code.clone(),
            unit_code: record.unit_code.unwrap_or(0),
            period: (self.period + 1) as u8,
            year: self.settings.year,
            history: self.settings.history.clone(),
            amount: record.monthly_amounts[self.period].unwrap_or(Decimal::ZERO),
            active: true,
            company: record.company,
            created_at: self.settings.timestamp,
            updated_at: self.settings.timestamp,
            user_id: self.settings.user_id,
        };
        self.next_id += 1;
        self.period += 1;
        Some(fact)
    }
}

/// Expands `records` into twelve facts each, in record order and period
/// order, numbering them from `start_id` without gaps. The counter comes
/// back out through [`Pivot::next_id`] so a run over several sheets can
/// continue it.
pub fn pivot_records<I>(records: I, start_id: u64, settings: &PivotSettings) -> Pivot<'_, I::IntoIter>
where
    I: IntoIterator<Item = LogicalRecord>,
{
    Pivot {
        records: records.into_iter(),
        settings,
        next_id: start_id,
        current: None,
        period: 0,
    }
}
