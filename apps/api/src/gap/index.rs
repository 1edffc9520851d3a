//! Inflation index lookup.
//!
//! The engine only sees the [`IndexLookup`] trait. [`IndexSeries`] is the bundled
//! implementation: a monthly (or irregular) series loaded from JSON that answers
//! every date with the latest value published at or before it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gap::engine::GapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Index values answering a [`DateRange`]: one for each end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexPair {
    pub historical: IndexPoint,
    pub current: IndexPoint,
}

/// A published index value. `date` is the publication date actually used,
/// which may precede the requested date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub date: NaiveDate,
    pub value: f64,
}

pub trait IndexLookup: Send + Sync {
    fn lookup(&self, range: &DateRange) -> Result<IndexPair, GapError>;
}

/// In-memory index series keyed by publication date.
#[derive(Debug, Clone, Default)]
pub struct IndexSeries {
    points: BTreeMap<NaiveDate, f64>,
}

impl IndexSeries {
    /// Builds a series, rejecting duplicate dates and values that are not positive.
    pub fn from_points(points: Vec<IndexPoint>) -> Result<Self, GapError> {
        let mut map = BTreeMap::new();
        for point in points {
            if !point.value.is_finite() || point.value <= 0.0 {
                return Err(GapError::InvalidInput(format!(
                    "index value for {} must be positive, got {}",
                    point.date, point.value
                )));
            }
            if map.insert(point.date, point.value).is_some() {
                return Err(GapError::InvalidInput(format!(
                    "duplicate index value for {}",
                    point.date
                )));
            }
        }
        Ok(Self { points: map })
    }

    /// Loads a JSON array of `{"date": "YYYY-MM-DD", "value": f64}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read index series at {}", path.display()))?;
        let points: Vec<IndexPoint> = serde_json::from_str(&raw)
            .with_context(|| format!("Index series at {} is not valid JSON", path.display()))?;
        Ok(Self::from_points(points)?)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<IndexPoint> {
        self.points
            .iter()
            .next_back()
            .map(|(date, value)| IndexPoint {
                date: *date,
                value: *value,
            })
    }

    /// Latest published value at or before `date`. No interpolation, no extrapolation
    /// backwards past the first point.
    pub fn at_or_before(&self, date: NaiveDate) -> Result<IndexPoint, GapError> {
        let (found, value) = self
            .points
            .range(..=date)
            .next_back()
            .ok_or(GapError::IndexUnavailable { date })?;
        debug!("Index lookup for {date} resolved to {found} = {value}");
        Ok(IndexPoint {
            date: *found,
            value: *value,
        })
    }
}

impl IndexLookup for IndexSeries {
    fn lookup(&self, range: &DateRange) -> Result<IndexPair, GapError> {
        Ok(IndexPair {
            historical: self.at_or_before(range.start)?,
            current: self.at_or_before(range.end)?,
        })
    }
}
