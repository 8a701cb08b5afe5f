//! Data models for observation telemetry and aggregates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AggregateError, Result};
use crate::interval::{IntervalLabel, IntervalLength};

// ---

pub const VALUE_COLUMN: &str = "value";
pub const QUALITY_FLAG_COLUMN: &str = "quality_flag";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// One timestamp of an observation index.
///
/// Feeds may deliver timestamps without an offset. They are kept as
/// `Naive` so the engine can reject them instead of guessing a timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SampleTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl SampleTime {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            SampleTime::Aware(t) => Some(t.with_timezone(&Utc)),
            SampleTime::Naive(_) => None,
        }
    }

    /// Ordering key; naive values sort by their wall-clock reading.
    fn sort_key(&self) -> NaiveDateTime {
        match self {
            SampleTime::Aware(t) => t.naive_utc(),
            SampleTime::Naive(t) => *t,
        }
    }
}

impl FromStr for SampleTime {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Ok(SampleTime::Aware(t));
        }
        if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Ok(SampleTime::Aware(t));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(SampleTime::Naive)
            .ok_or_else(|| AggregateError::InvalidTimestamp(s.to_string()))
    }
}

impl TryFrom<String> for SampleTime {
    type Error = AggregateError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SampleTime> for String {
    fn from(t: SampleTime) -> Self {
        t.to_string()
    }
}

impl From<DateTime<FixedOffset>> for SampleTime {
    fn from(t: DateTime<FixedOffset>) -> Self {
        SampleTime::Aware(t)
    }
}

impl From<DateTime<Utc>> for SampleTime {
    fn from(t: DateTime<Utc>) -> Self {
        SampleTime::Aware(t.fixed_offset())
    }
}

impl fmt::Display for SampleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleTime::Aware(t) => write!(f, "{}", t.to_rfc3339()),
            SampleTime::Naive(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

// ---

/// A time-indexed table of numeric columns for one observation.
///
/// Contributors to an aggregate carry `value` and `quality_flag` columns;
/// other columns are allowed and ignored. Rows need not be sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationFrame {
    index: Vec<SampleTime>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl ObservationFrame {
    pub fn new(index: Vec<SampleTime>) -> Self {
        Self {
            index,
            columns: BTreeMap::new(),
        }
    }

    /// Add or replace a column. Its length must match the index.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<Self> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(AggregateError::ColumnLength {
                column: name,
                expected: self.index.len(),
                found: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(self)
    }

    pub fn from_columns(
        index: Vec<SampleTime>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self> {
        columns
            .into_iter()
            .try_fold(Self::new(index), |frame, (name, values)| {
                frame.with_column(name, values)
            })
    }

    /// Build a frame with the standard `value` and `quality_flag` columns.
    pub fn from_observations(
        index: Vec<DateTime<FixedOffset>>,
        values: Vec<Option<f64>>,
        flags: Vec<u32>,
    ) -> Result<Self> {
        let flags = flags.into_iter().map(|f| Some(f64::from(f))).collect();
        Self::new(index.into_iter().map(SampleTime::Aware).collect())
            .with_column(VALUE_COLUMN, values)?
            .with_column(QUALITY_FLAG_COLUMN, flags)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[SampleTime] {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// The index as UTC instants; fails if any timestamp is naive.
    pub fn utc_index(&self) -> Result<Vec<DateTime<Utc>>> {
        self.index
            .iter()
            .map(|t| t.to_utc().ok_or(AggregateError::NotLocalized))
            .collect()
    }

    /// Earliest and latest instant of the index, `None` when empty.
    pub fn envelope(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let index = self.utc_index()?;
        Ok(index
            .iter()
            .min()
            .copied()
            .zip(index.iter().max().copied()))
    }

    /// Copy of the frame with rows in ascending time order.
    pub fn sorted(&self) -> Self {
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by_key(|&i| self.index[i].sort_key());
        self.take_rows(&order)
    }

    /// Copy of the frame keeping rows where `keep` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Self {
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.then_some(i))
            .collect();
        self.take_rows(&rows)
    }

    fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), rows.iter().map(|&i| values[i]).collect()))
                .collect(),
        }
    }

    /// Typed view of the `value` and `quality_flag` columns.
    pub(crate) fn observation_series(&self, observation_id: &str) -> Result<ObservationSeries> {
        // ---
        let missing = |column| AggregateError::MissingColumn {
            observation_id: observation_id.to_string(),
            column,
        };
        let values = self.column(VALUE_COLUMN).ok_or_else(|| missing(VALUE_COLUMN))?;
        let flags = self
            .column(QUALITY_FLAG_COLUMN)
            .ok_or_else(|| missing(QUALITY_FLAG_COLUMN))?;

        let quality_flag = flags
            .iter()
            .map(|flag| match *flag {
                None => Ok(0),
                Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) => {
                    Ok(f as u32)
                }
                Some(f) => Err(AggregateError::InvalidQualityFlag {
                    observation_id: observation_id.to_string(),
                    flag: f,
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ObservationSeries {
            times: self.utc_index()?,
            value: values.iter().map(|v| v.filter(|v| !v.is_nan())).collect(),
            quality_flag,
        })
    }
}

/// Validated `value`/`quality_flag` series with UTC timestamps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObservationSeries {
    pub times: Vec<DateTime<Utc>>,
    pub value: Vec<Option<f64>>,
    pub quality_flag: Vec<u32>,
}

// ---

/// Observation values as exchanged with the data service:
/// `{"values": [{"timestamp": ..., "value": ..., "quality_flag": ...}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuesPayload {
    pub values: Vec<ValueRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueRow {
    pub timestamp: SampleTime,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Option<f64>>,
}

impl From<ValuesPayload> for ObservationFrame {
    /// Columns are the union of all row fields; a field absent from a row
    /// reads as missing.
    fn from(payload: ValuesPayload) -> Self {
        let rows = payload.values.len();
        let mut columns: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for (i, row) in payload.values.iter().enumerate() {
            for (name, value) in &row.fields {
                columns.entry(name.clone()).or_insert_with(|| vec![None; rows])[i] = *value;
            }
        }
        Self {
            index: payload.values.into_iter().map(|row| row.timestamp).collect(),
            columns,
        }
    }
}

// ---

/// One lifecycle window of an observation's participation in an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateObservation {
    pub observation_id: String,
    pub effective_from: DateTime<Utc>,
    #[serde(default)]
    pub effective_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub observation_deleted_at: Option<DateTime<Utc>>,
}

impl AggregateObservation {
    pub fn new(observation_id: impl Into<String>, effective_from: DateTime<Utc>) -> Self {
        Self {
            observation_id: observation_id.into(),
            effective_from,
            effective_until: None,
            observation_deleted_at: None,
        }
    }

    pub fn until(mut self, effective_until: DateTime<Utc>) -> Self {
        self.effective_until = Some(effective_until);
        self
    }

    pub fn deleted_at(mut self, deleted_at: DateTime<Utc>) -> Self {
        self.observation_deleted_at = Some(deleted_at);
        self
    }

    /// Whether `t` falls inside this window; both ends are inclusive.
    pub fn covers(&self, t: &DateTime<Utc>) -> bool {
        self.effective_from <= *t && self.effective_until.map_or(true, |until| *t <= until)
    }

    /// Whether the observation was taken out of the aggregate no later than
    /// its deletion.
    pub fn retired_before_deletion(&self) -> bool {
        match (self.effective_until, self.observation_deleted_at) {
            (Some(until), Some(deleted)) => until <= deleted,
            _ => false,
        }
    }
}

// ---

/// Aggregate values on a regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub interval_length: IntervalLength,
    pub interval_label: IntervalLabel,
    pub index: Vec<DateTime<Tz>>,
    pub value: Vec<Option<f64>>,
    pub quality_flag: Vec<u32>,
}

/// One serialized row of an [`AggregateResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub timestamp: DateTime<FixedOffset>,
    pub value: Option<f64>,
    pub quality_flag: u32,
}

impl AggregateResult {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = AggregateRow> + '_ {
        self.index
            .iter()
            .zip(&self.value)
            .zip(&self.quality_flag)
            .map(|((t, value), flag)| AggregateRow {
                timestamp: t.fixed_offset(),
                value: *value,
                quality_flag: *flag,
            })
    }
}
