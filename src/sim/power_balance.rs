//! Community power balance: elementwise aggregation of member profiles.

use crate::profile::series::{INTERVAL_HOURS, IntervalSeries};

/// Net load of one interval in kW.
///
/// Positive values are grid import, negative values are export.
///
/// # Arguments
///
/// * `consumption_kw` - Aggregate community demand
/// * `production_kw` - Aggregate community PV output (positive)
pub fn net_load_kw(consumption_kw: f64, production_kw: f64) -> f64 {
    consumption_kw - production_kw
}

/// Summed consumption and production of a community over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityBalance {
    pub consumption_kw: Vec<f64>,
    pub production_kw: Vec<f64>,
}

impl CommunityBalance {
    /// An all-zero balance of `len` intervals.
    pub fn new(len: usize) -> Self {
        Self {
            consumption_kw: vec![0.0; len],
            production_kw: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.consumption_kw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumption_kw.is_empty()
    }

    /// Adds one member series, truncating or zero-padding it to this length.
    pub fn add(&mut self, series: &IntervalSeries) {
        for (acc, v) in self.consumption_kw.iter_mut().zip(&series.consumption_kw) {
            if v.is_finite() {
                *acc += v;
            }
        }
        for (acc, v) in self.production_kw.iter_mut().zip(&series.production_kw) {
            if v.is_finite() {
                *acc += v;
            }
        }
    }

    pub fn total_consumption_kwh(&self) -> f64 {
        self.consumption_kw.iter().sum::<f64>() * INTERVAL_HOURS
    }

    pub fn total_production_kwh(&self) -> f64 {
        self.production_kw.iter().sum::<f64>() * INTERVAL_HOURS
    }

    /// Energy drawn from the grid: positive net load summed over the window.
    pub fn grid_import_kwh(&self) -> f64 {
        self.net_load_iter().filter(|&n| n > 0.0).sum::<f64>() * INTERVAL_HOURS
    }

    /// Energy exported to the grid: negative net load summed over the window.
    pub fn grid_export_kwh(&self) -> f64 {
        -self.net_load_iter().filter(|&n| n < 0.0).sum::<f64>() * INTERVAL_HOURS
    }

    /// Largest single-interval import in kW (zero if the community never imports).
    pub fn peak_import_kw(&self) -> f64 {
        self.net_load_iter().fold(0.0, f64::max)
    }

    fn net_load_iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.consumption_kw
            .iter()
            .zip(&self.production_kw)
            .map(|(&c, &p)| net_load_kw(c, p))
    }
}
