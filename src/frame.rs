//! Daily frame
//!
//! A date-indexed table of metric columns. Rows are consecutive calendar days
//! from the first to the last input date, so a window of N rows is a window of
//! N days. Missing measurements are `None`.

use crate::error::ComputeError;
use crate::stats::Series;
use crate::types::{Column, Metric};
use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upstream parser output: ISO date -> metric name -> value
pub type DailyRecords = BTreeMap<String, BTreeMap<String, Option<f64>>>;

/// Date-indexed table of metric columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyFrame {
    dates: Vec<NaiveDate>,
    columns: IndexMap<Column, Series>,
}

impl DailyFrame {
    /// Build a frame from upstream records
    ///
    /// Unknown metric names are skipped with a warning and non-finite values
    /// are treated as missing.
    pub fn from_records(records: &DailyRecords) -> Result<Self, ComputeError> {
        let mut parsed: BTreeMap<NaiveDate, Vec<(Metric, f64)>> = BTreeMap::new();
        let mut skipped: Vec<String> = Vec::new();

        for (date_str, metrics) in records {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| ComputeError::DateParseError(format!("{date_str}: {e}")))?;
            let row = parsed.entry(date).or_default();
            for (name, value) in metrics {
                let metric = match name.parse::<Metric>() {
                    Ok(m) if m.is_raw() => m,
                    _ => {
                        if !skipped.contains(name) {
                            skipped.push(name.clone());
                        }
                        continue;
                    }
                };
                if let Some(v) = value.filter(|v| v.is_finite()) {
                    row.push((metric, v));
                }
            }
        }

        if !skipped.is_empty() {
            tracing::warn!(metrics = ?skipped, "ignoring metrics outside the daily vocabulary");
        }

        let (Some(first), Some(last)) = (
            parsed.keys().next().copied(),
            parsed.keys().next_back().copied(),
        ) else {
            return Ok(Self::default());
        };

        let dates = calendar(first, last);
        let mut frame = Self {
            dates,
            columns: IndexMap::new(),
        };

        for metric in Metric::RAW {
            if parsed
                .values()
                .any(|row| row.iter().any(|(m, _)| *m == metric))
            {
                frame
                    .columns
                    .insert(Column::Raw(metric), vec![None; frame.dates.len()]);
            }
        }

        for (date, row) in &parsed {
            let idx = (*date - first).num_days() as usize;
            for (metric, value) in row {
                if let Some(series) = frame.columns.get_mut(&Column::Raw(*metric)) {
                    series[idx] = Some(*value);
                }
            }
        }

        tracing::debug!(
            rows = frame.len(),
            observed_days = parsed.len(),
            columns = frame.columns.len(),
            "built daily frame"
        );
        Ok(frame)
    }

    /// Parse upstream records JSON into a frame
    pub fn from_records_json(json: &str) -> Result<Self, ComputeError> {
        let records: DailyRecords = serde_json::from_str(json)?;
        Self::from_records(&records)
    }

    /// Build a frame from explicit columns; every column must match the dates
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: Vec<(Column, Series)>,
    ) -> Result<Self, ComputeError> {
        let mut frame = Self {
            dates,
            columns: IndexMap::new(),
        };
        frame.check_dates()?;
        for (column, values) in columns {
            frame = frame.with_column(column, values)?;
        }
        Ok(frame)
    }

    /// Load a serialized frame (the `trend` command's output)
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let frame: DailyFrame = serde_json::from_str(json)?;
        frame.check_dates()?;
        for (column, values) in &frame.columns {
            if values.len() != frame.dates.len() {
                return Err(ComputeError::ParseError(format!(
                    "column {column} has {} rows, frame has {}",
                    values.len(),
                    frame.dates.len()
                )));
            }
        }
        Ok(frame)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Return a new frame with `column` set to `values`
    pub fn with_column(mut self, column: Column, values: Series) -> Result<Self, ComputeError> {
        if values.len() != self.dates.len() {
            return Err(ComputeError::ParseError(format!(
                "column {column} has {} rows, frame has {}",
                values.len(),
                self.dates.len()
            )));
        }
        self.columns.insert(column, values);
        Ok(self)
    }

    pub(crate) fn set_column(&mut self, column: Column, values: Series) {
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.insert(column, values);
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> impl Iterator<Item = &Column> {
        self.columns.keys()
    }

    pub fn has(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    pub fn column(&self, column: Column) -> Option<&[Option<f64>]> {
        self.columns.get(&column).map(Vec::as_slice)
    }

    /// Column values, or `MissingColumn`
    pub fn require(&self, column: Column) -> Result<&[Option<f64>], ComputeError> {
        self.column(column)
            .ok_or_else(|| ComputeError::MissingColumn(column.to_string()))
    }

    /// Column a metric resolves to: its trend when present, else the raw column
    pub fn resolve_column(&self, metric: Metric) -> Option<Column> {
        [Column::Trend(metric), Column::Raw(metric)]
            .into_iter()
            .find(|c| self.has(*c))
    }

    /// Values of the column a metric resolves to
    pub fn resolve(&self, metric: Metric) -> Option<&[Option<f64>]> {
        self.resolve_column(metric).and_then(|c| self.column(c))
    }

    /// Index of the last row where `column` is defined
    pub fn last_valid_index(&self, column: Column) -> Option<usize> {
        self.column(column)?.iter().rposition(Option::is_some)
    }

    /// Date of the last row with any defined raw measurement
    pub fn last_observation_date(&self) -> Option<NaiveDate> {
        let idx = self
            .columns
            .iter()
            .filter(|(c, _)| !c.is_trend() && c.metric().is_raw())
            .filter_map(|(_, values)| values.iter().rposition(Option::is_some))
            .max()?;
        self.dates.get(idx).copied()
    }

    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        let first = self.first_date()?;
        let offset = (date - first).num_days();
        usize::try_from(offset)
            .ok()
            .filter(|idx| *idx < self.dates.len())
    }

    fn check_dates(&self) -> Result<(), ComputeError> {
        let consecutive = self
            .dates
            .windows(2)
            .all(|pair| pair[1] - pair[0] == Duration::days(1));
        if consecutive {
            Ok(())
        } else {
            Err(ComputeError::ParseError(
                "frame dates must be consecutive calendar days".to_string(),
            ))
        }
    }
}

/// Every calendar day from `first` to `last` inclusive
pub fn calendar(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .collect()
}
