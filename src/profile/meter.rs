//! Metered interval readings: quality scoring and alignment to a window.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::series::{INTERVAL_HOURS, INTERVAL_MINUTES, IntervalSeries, Window};

/// Any single reading above this many kWh per interval is an outlier.
pub const OUTLIER_THRESHOLD_KWH: f64 = 20.0;

/// Minimum coverage for a series to be usable in a simulation.
pub const MIN_USABLE_COVERAGE: f64 = 0.70;

/// One stored meter row for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub timestamp: NaiveDateTime,
    pub consumption_kwh: f64,
    pub production_kwh: f64,
    pub feed_in_kwh: f64,
}

impl MeterReading {
    pub fn new(
        timestamp: NaiveDateTime,
        consumption_kwh: f64,
        production_kwh: f64,
        feed_in_kwh: f64,
    ) -> Self {
        Self {
            timestamp,
            consumption_kwh,
            production_kwh,
            feed_in_kwh,
        }
    }

    fn values(&self) -> [f64; 3] {
        [self.consumption_kwh, self.production_kwh, self.feed_in_kwh]
    }

    fn is_negative(&self) -> bool {
        self.values().iter().any(|&v| v < 0.0)
    }

    fn is_outlier(&self) -> bool {
        self.values().iter().any(|&v| v > OUTLIER_THRESHOLD_KWH)
    }
}

/// Usability verdict for a set of meter readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterQuality {
    pub usable_for_simulation: bool,
    /// Distinct timestamps over expected points, capped at 1.
    pub coverage_ratio: f64,
    /// Coverage minus capped penalties, in `[0, 1]`.
    pub quality_score: f64,
    pub gap_count: usize,
    pub duplicate_count: usize,
    pub negative_count: usize,
    pub outlier_count: usize,
    pub total_points: usize,
    pub expected_points: usize,
}

impl MeterQuality {
    fn empty(expected_points: usize) -> Self {
        Self {
            usable_for_simulation: false,
            coverage_ratio: 0.0,
            quality_score: 0.0,
            gap_count: 0,
            duplicate_count: 0,
            negative_count: 0,
            outlier_count: 0,
            total_points: 0,
            expected_points,
        }
    }

    /// Negative or outlier readings disqualify a series regardless of coverage.
    pub fn has_critical_issues(&self) -> bool {
        self.negative_count > 0 || self.outlier_count > 0
    }
}

/// Scores whether meter readings are usable for simulation.
///
/// # Arguments
///
/// * `readings` - Raw rows in any order, duplicates allowed
/// * `interval_minutes` - Expected cadence (15 for this system)
/// * `expected_points` - Points the requested window should contain; when
///   `None` it is derived from the span of the readings
///
/// # Returns
///
/// A [`MeterQuality`]; `usable_for_simulation` requires coverage of at
/// least 70 % and no negative or outlier readings.
pub fn score_readings(
    readings: &[MeterReading],
    interval_minutes: i64,
    expected_points: Option<usize>,
) -> MeterQuality {
    if readings.is_empty() {
        return MeterQuality::empty(expected_points.unwrap_or(0));
    }

    let interval_seconds = interval_minutes.max(1) * 60;
    let mut distinct: Vec<NaiveDateTime> = readings
        .iter()
        .map(|r| r.timestamp)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    distinct.sort_unstable();
    let duplicate_count = readings.len() - distinct.len();

    let max_step = interval_seconds as f64 * 1.5;
    let gap_count = distinct
        .windows(2)
        .filter(|pair| (pair[1] - pair[0]).num_seconds() as f64 > max_step)
        .count();

    let negative_count = readings.iter().filter(|r| r.is_negative()).count();
    let outlier_count = readings.iter().filter(|r| r.is_outlier()).count();

    let expected_points = expected_points
        .unwrap_or_else(|| {
            let span = match (distinct.first(), distinct.last()) {
                (Some(first), Some(last)) => (*last - *first).num_seconds().max(0),
                _ => 0,
            };
            (span / interval_seconds) as usize + 1
        })
        .max(1);

    let total_points = distinct.len();
    let coverage_ratio = (total_points as f64 / expected_points as f64).min(1.0);

    let mut quality_score = coverage_ratio;
    quality_score -= (gap_count as f64 * 0.01).min(0.2);
    quality_score -= (duplicate_count as f64 * 0.005).min(0.1);
    quality_score -= (negative_count as f64 * 0.1).min(0.4);
    quality_score -= (outlier_count as f64 * 0.05).min(0.3);
    let quality_score = quality_score.clamp(0.0, 1.0);

    let mut quality = MeterQuality {
        usable_for_simulation: false,
        coverage_ratio: round4(coverage_ratio),
        quality_score: round4(quality_score),
        gap_count,
        duplicate_count,
        negative_count,
        outlier_count,
        total_points,
        expected_points,
    };
    quality.usable_for_simulation =
        coverage_ratio >= MIN_USABLE_COVERAGE && !quality.has_critical_issues();
    quality
}

/// Scores readings against the points expected in `window`.
pub fn score_for_window(readings: &[MeterReading], window: &Window) -> MeterQuality {
    score_readings(readings, INTERVAL_MINUTES, Some(window.num_intervals))
}

/// Aligns readings onto the grid of `window`, converting kWh to kW.
///
/// Duplicate timestamps keep the last row seen; readings off the grid or
/// outside the window are dropped and missing intervals are zero.
pub fn align_to_window(readings: &[MeterReading], window: &Window) -> IntervalSeries {
    let mut by_index: BTreeMap<usize, &MeterReading> = BTreeMap::new();
    for reading in readings {
        if let Some(idx) = window.index_of(reading.timestamp) {
            by_index.insert(idx, reading);
        }
    }

    let mut series = IntervalSeries::zeros(window);
    for (idx, reading) in by_index {
        series.consumption_kw[idx] = finite_or_zero(reading.consumption_kwh) / INTERVAL_HOURS;
        series.production_kw[idx] = finite_or_zero(reading.production_kwh) / INTERVAL_HOURS;
    }
    series
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
