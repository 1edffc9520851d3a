//! Compensation gap computation.
//!
//! `compute_gap` turns two salary observations plus an inflation index into an
//! inflation-adjusted salary, the signed gap against it, and a severity band.
//! The function is pure: given the same lookup answers it yields the same
//! result, bit for bit, apart from `calculation_date`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gap::index::{DateRange, IndexLookup};
use crate::gap::severity::{Severity, SeverityBands};

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GapError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No inflation index published at or before {date}")]
    IndexUnavailable { date: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalaryObservation {
    pub amount: f64,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapResult {
    /// Historical salary expressed in current-index money.
    pub adjusted_salary: f64,
    /// Signed, in percent of `adjusted_salary`. Negative means purchasing power was lost.
    pub percentage_gap: f64,
    /// Signed, `current.amount - adjusted_salary`.
    pub dollar_gap: f64,
    /// Cumulative inflation over the span, in percent.
    pub inflation_rate: f64,
    /// Compound yearly inflation over the span, in percent. Zero for a same-day span.
    pub annualized_inflation_rate: f64,
    pub years_elapsed: f64,
    pub historical_index: f64,
    pub current_index: f64,
    pub severity: Severity,
    pub calculation_date: DateTime<Utc>,
}

impl GapResult {
    /// True when the current salary fell behind inflation.
    pub fn is_shortfall(&self) -> bool {
        self.dollar_gap < 0.0
    }
}

/// Computes the inflation-adjusted gap between two salary observations.
///
/// Errors:
/// - `InvalidInput` when an amount is not a positive finite number or the dates are reversed
/// - `IndexUnavailable` when the lookup has no value at or before a requested date
pub fn compute_gap(
    historical: &SalaryObservation,
    current: &SalaryObservation,
    index: &dyn IndexLookup,
    bands: &SeverityBands,
) -> Result<GapResult, GapError> {
    check_amount("historical", historical.amount)?;
    check_amount("current", current.amount)?;
    if historical.as_of > current.as_of {
        return Err(GapError::InvalidInput(format!(
            "historical date {} is after current date {}",
            historical.as_of, current.as_of
        )));
    }

    let pair = index.lookup(&DateRange {
        start: historical.as_of,
        end: current.as_of,
    })?;
    let historical_index = checked_index(pair.historical.value, historical.as_of)?;
    let current_index = checked_index(pair.current.value, current.as_of)?;

    let ratio = current_index / historical_index;
    let adjusted_salary = historical.amount * ratio;
    let dollar_gap = current.amount - adjusted_salary;
    let percentage_gap = dollar_gap / adjusted_salary * 100.0;

    let days = (current.as_of - historical.as_of).num_days() as f64;
    let years_elapsed = days / DAYS_PER_YEAR;
    let inflation_rate = (ratio - 1.0) * 100.0;
    let annualized_inflation_rate = if years_elapsed > 0.0 {
        (ratio.powf(1.0 / years_elapsed) - 1.0) * 100.0
    } else {
        0.0
    };

    Ok(GapResult {
        adjusted_salary,
        percentage_gap,
        dollar_gap,
        inflation_rate,
        annualized_inflation_rate,
        years_elapsed,
        historical_index,
        current_index,
        severity: bands.classify(percentage_gap),
        calculation_date: Utc::now(),
    })
}

fn check_amount(which: &str, amount: f64) -> Result<(), GapError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(GapError::InvalidInput(format!(
            "{which} salary must be a positive amount, got {amount}"
        )));
    }
    Ok(())
}

// A lookup that hands back garbage is as good as no lookup at all.
fn checked_index(value: f64, date: NaiveDate) -> Result<f64, GapError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(GapError::IndexUnavailable { date });
    }
    Ok(value)
}
