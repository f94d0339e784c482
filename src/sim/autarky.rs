//! Autarky (self-sufficiency) of a candidate community.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::power_balance::CommunityBalance;
use crate::profile::resolver::{ProfileResolution, ProfileSource};

/// Which kinds of profiles fed a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMix {
    /// Every profile was metered.
    Real,
    /// Metered and synthetic or provided profiles mixed.
    Hybrid,
    /// No metered profile at all.
    Mock,
}

impl DataMix {
    /// Provided profiles count as mock-like: only metered data is "real".
    pub fn classify(counts: &SourceCounts) -> Self {
        let mock_like = counts.mock + counts.provided;
        match (counts.real > 0, mock_like > 0) {
            (true, false) => Self::Real,
            (true, true) => Self::Hybrid,
            _ => Self::Mock,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Hybrid => "hybrid",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for DataMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of contributing profiles per source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub real: usize,
    pub mock: usize,
    pub provided: usize,
}

impl SourceCounts {
    pub fn record(&mut self, source: ProfileSource) {
        match source {
            ProfileSource::Real => self.real += 1,
            ProfileSource::Mock => self.mock += 1,
            ProfileSource::Provided => self.provided += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.real + self.mock + self.provided
    }
}

/// Self-sufficiency of one community over one window.
///
/// Computed post-hoc from the resolved member profiles; serialised as-is
/// into the simulation cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutarkyResult {
    /// Share of consumption covered by own production, in `[0, 1]`.
    pub autarky_score: f64,
    pub total_consumption_kwh: f64,
    pub total_production_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    /// Largest single-interval grid draw in kW.
    pub peak_import_kw: f64,
    /// Mean profile confidence scaled to 0-100, rounded to 2 decimals.
    pub confidence_percent: f64,
    pub profile_data_mix: DataMix,
    pub source_counts: SourceCounts,
}

impl AutarkyResult {
    /// Result for a community with no members.
    pub fn empty() -> Self {
        Self {
            autarky_score: 0.0,
            total_consumption_kwh: 0.0,
            total_production_kwh: 0.0,
            grid_import_kwh: 0.0,
            grid_export_kwh: 0.0,
            peak_import_kw: 0.0,
            confidence_percent: 0.0,
            profile_data_mix: DataMix::Mock,
            source_counts: SourceCounts::default(),
        }
    }

    /// Simulates a community from its resolved member profiles.
    ///
    /// # Arguments
    ///
    /// * `profiles` - One resolution per member, in any order
    /// * `num_intervals` - Window length every profile is fitted to
    ///
    /// # Returns
    ///
    /// An `AutarkyResult`. When the community consumes nothing, the score
    /// and confidence are zero and the mix is `Mock`; source counts and
    /// production are still reported.
    pub fn from_profiles(profiles: &[ProfileResolution], num_intervals: usize) -> Self {
        if profiles.is_empty() {
            return Self::empty();
        }

        let mut balance = CommunityBalance::new(num_intervals);
        let mut counts = SourceCounts::default();
        let mut confidence_sum = 0.0;
        for profile in profiles {
            balance.add(&profile.series);
            counts.record(profile.source);
            confidence_sum += profile.quality_score.clamp(0.0, 1.0);
        }

        let total_consumption_kwh = balance.total_consumption_kwh();
        let total_production_kwh = balance.total_production_kwh();
        if total_consumption_kwh <= 0.0 {
            return Self {
                total_production_kwh,
                grid_export_kwh: balance.grid_export_kwh(),
                source_counts: counts,
                ..Self::empty()
            };
        }

        let grid_import_kwh = balance.grid_import_kwh();
        let autarky_score =
            ((total_consumption_kwh - grid_import_kwh) / total_consumption_kwh).clamp(0.0, 1.0);
        let confidence_percent = confidence_sum / profiles.len() as f64 * 100.0;

        Self {
            autarky_score,
            total_consumption_kwh,
            total_production_kwh,
            grid_import_kwh,
            grid_export_kwh: balance.grid_export_kwh(),
            peak_import_kw: balance.peak_import_kw(),
            confidence_percent: (confidence_percent * 100.0).round() / 100.0,
            profile_data_mix: DataMix::classify(&counts),
            source_counts: counts,
        }
    }

    pub fn autarky_percent(&self) -> f64 {
        self.autarky_score * 100.0
    }
}

impl fmt::Display for AutarkyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Autarky:        {:.1}%", self.autarky_percent())?;
        writeln!(f, "Consumption:    {:.1} kWh", self.total_consumption_kwh)?;
        writeln!(f, "Production:     {:.1} kWh", self.total_production_kwh)?;
        writeln!(f, "Grid import:    {:.1} kWh", self.grid_import_kwh)?;
        writeln!(f, "Grid export:    {:.1} kWh", self.grid_export_kwh)?;
        writeln!(f, "Peak import:    {:.1} kW", self.peak_import_kw)?;
        write!(
            f,
            "Confidence:     {:.1}% ({}; real={} mock={} provided={})",
            self.confidence_percent,
            self.profile_data_mix,
            self.source_counts.real,
            self.source_counts.mock,
            self.source_counts.provided
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::series::{IntervalSeries, Window};

    fn resolution(c: Vec<f64>, p: Vec<f64>, source: ProfileSource, q: f64) -> ProfileResolution {
        ProfileResolution {
            series: IntervalSeries::from_columns(Window::default_start(), c, p),
            source,
            quality_score: q,
            coverage_ratio: q,
            meter_quality: None,
            archetype: None,
        }
    }

    #[test]
    fn empty_community_is_zero() {
        let r = AutarkyResult::from_profiles(&[], 96);
        assert_eq!(r, AutarkyResult::empty());
    }

    #[test]
    fn zero_consumption_scores_zero_but_keeps_counts() {
        let profiles = [resolution(vec![0.0; 4], vec![2.0; 4], ProfileSource::Real, 1.0)];
        let r = AutarkyResult::from_profiles(&profiles, 4);
        assert_eq!(r.autarky_score, 0.0);
        assert_eq!(r.confidence_percent, 0.0);
        assert_eq!(r.profile_data_mix, DataMix::Mock);
        assert_eq!(r.source_counts.real, 1);
        assert_eq!(r.total_production_kwh, 2.0);
        assert_eq!(r.grid_export_kwh, 2.0);
        assert_eq!(r.peak_import_kw, 0.0);
    }

    #[test]
    fn autarky_from_net_load() {
        // Member a consumes 4 kW flat, member b produces 8 kW in half the slots.
        let profiles = [
            resolution(vec![4.0; 4], vec![0.0; 4], ProfileSource::Real, 1.0),
            resolution(vec![0.0; 4], vec![8.0, 8.0, 0.0, 0.0], ProfileSource::Mock, 0.45),
        ];
        let r = AutarkyResult::from_profiles(&profiles, 4);
        assert_eq!(r.total_consumption_kwh, 4.0);
        assert_eq!(r.grid_import_kwh, 2.0);
        // Half the slots export 4 kW for a quarter hour each.
        assert_eq!(r.grid_export_kwh, 2.0);
        assert_eq!(r.peak_import_kw, 4.0);
        assert!((r.autarky_score - 0.5).abs() < 1e-12);
        assert_eq!(r.confidence_percent, 72.5);
        assert_eq!(r.profile_data_mix, DataMix::Hybrid);
    }

    #[test]
    fn oversupply_caps_at_one() {
        let profiles = [resolution(vec![1.0; 4], vec![10.0; 4], ProfileSource::Real, 0.9)];
        let r = AutarkyResult::from_profiles(&profiles, 4);
        assert_eq!(r.autarky_score, 1.0);
        assert_eq!(r.profile_data_mix, DataMix::Real);
        assert_eq!(r.peak_import_kw, 0.0);
        assert_eq!(r.grid_export_kwh, 9.0);
    }

    #[test]
    fn display_shows_export_and_peak_import() {
        let production = vec![8.0, 0.0, 0.0, 0.0];
        let profiles = [resolution(vec![4.0; 4], production, ProfileSource::Real, 1.0)];
        let text = AutarkyResult::from_profiles(&profiles, 4).to_string();
        assert!(text.contains("Grid export:    1.0 kWh"));
        assert!(text.contains("Peak import:    4.0 kW"));
    }

    #[test]
    fn provided_profiles_are_mock_like() {
        let mut counts = SourceCounts::default();
        counts.record(ProfileSource::Provided);
        assert_eq!(DataMix::classify(&counts), DataMix::Mock);
        counts.record(ProfileSource::Real);
        assert_eq!(DataMix::classify(&counts), DataMix::Hybrid);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn result_round_trips_through_json() {
        let profiles = [resolution(vec![2.0; 8], vec![1.0; 8], ProfileSource::Mock, 0.45)];
        let r = AutarkyResult::from_profiles(&profiles, 8);
        let json = serde_json::to_string(&r).expect("serialize");
        assert!(json.contains("\"profile_data_mix\":\"mock\""));
        assert!(json.contains("\"peak_import_kw\""));
        let back: AutarkyResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, r);
    }
}
