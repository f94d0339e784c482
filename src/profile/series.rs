//! Fixed-cadence interval series and simulation windows.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Interval cadence in minutes.
pub const INTERVAL_MINUTES: i64 = 15;

/// Duration of one interval in hours, used to convert kW to kWh.
pub const INTERVAL_HOURS: f64 = 0.25;

/// Number of 15-minute intervals in one simulated (non-leap) year.
pub const INTERVALS_PER_YEAR: usize = 35_040;

/// A simulation window: a start timestamp and an interval count.
///
/// Every sample index maps to the absolute timestamp
/// `start + index * 15 min`.
///
/// # Examples
///
/// ```
/// use community_sim::profile::series::Window;
///
/// let w = Window::one_day(Window::default_start());
/// assert_eq!(w.num_intervals, 96);
/// assert_eq!(w.end(), w.timestamp(95));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Timestamp of the first sample.
    pub start: NaiveDateTime,
    /// Number of samples.
    pub num_intervals: usize,
}

impl Window {
    pub fn new(start: NaiveDateTime, num_intervals: usize) -> Self {
        Self {
            start,
            num_intervals,
        }
    }

    /// 2025-01-01 00:00, the start of the reference simulation year.
    pub fn default_start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default()
    }

    /// One simulated year starting at [`Window::default_start`].
    pub fn full_year() -> Self {
        Self::new(Self::default_start(), INTERVALS_PER_YEAR)
    }

    /// A single day of 96 intervals.
    pub fn one_day(start: NaiveDateTime) -> Self {
        Self::new(start, 96)
    }

    /// Absolute timestamp of sample `index`.
    pub fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::minutes(INTERVAL_MINUTES * index as i64)
    }

    /// Timestamp of the last sample (equal to `start` for empty windows).
    pub fn end(&self) -> NaiveDateTime {
        self.timestamp(self.num_intervals.saturating_sub(1))
    }

    /// Maps a timestamp back to its sample index, if it lies on the grid.
    pub fn index_of(&self, ts: NaiveDateTime) -> Option<usize> {
        let seconds = (ts - self.start).num_seconds();
        let step = INTERVAL_MINUTES * 60;
        if seconds < 0 || seconds % step != 0 {
            return None;
        }
        let idx = (seconds / step) as usize;
        (idx < self.num_intervals).then_some(idx)
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::full_year()
    }
}

/// Consumption and production power samples over a [`Window`].
///
/// Both columns are in kW and always have the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSeries {
    pub start: NaiveDateTime,
    pub consumption_kw: Vec<f64>,
    pub production_kw: Vec<f64>,
}

impl IntervalSeries {
    /// An all-zero series covering `window`.
    pub fn zeros(window: &Window) -> Self {
        Self {
            start: window.start,
            consumption_kw: vec![0.0; window.num_intervals],
            production_kw: vec![0.0; window.num_intervals],
        }
    }

    /// Builds a series from two columns, zero-padding the shorter one.
    pub fn from_columns(
        start: NaiveDateTime,
        consumption_kw: Vec<f64>,
        production_kw: Vec<f64>,
    ) -> Self {
        let len = consumption_kw.len().max(production_kw.len());
        let mut series = Self {
            start,
            consumption_kw,
            production_kw,
        };
        series.consumption_kw.resize(len, 0.0);
        series.production_kw.resize(len, 0.0);
        series
    }

    pub fn len(&self) -> usize {
        self.consumption_kw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumption_kw.is_empty()
    }

    /// Truncates or zero-pads both columns to exactly `len` samples.
    ///
    /// Non-finite samples are replaced with zero.
    pub fn fit_to(mut self, len: usize) -> Self {
        for col in [&mut self.consumption_kw, &mut self.production_kw] {
            col.resize(len, 0.0);
            for v in col.iter_mut() {
                if !v.is_finite() {
                    *v = 0.0;
                }
            }
        }
        self
    }

    /// Total consumed energy in kWh.
    pub fn consumption_kwh(&self) -> f64 {
        self.consumption_kw.iter().sum::<f64>() * INTERVAL_HOURS
    }

    /// Total produced energy in kWh.
    pub fn production_kwh(&self) -> f64 {
        self.production_kw.iter().sum::<f64>() * INTERVAL_HOURS
    }
}
