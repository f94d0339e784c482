//! Synthetic consumption/production profiles by building archetype.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::series::{INTERVAL_HOURS, IntervalSeries, Window};
use crate::sim::clock::{Clock, Slot};

/// Day of year of the PV seasonal peak (around the summer solstice).
const PV_PEAK_DAY_OF_YEAR: f64 = 172.0;

/// Coarse building-usage category that shapes a synthetic profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Archetype {
    /// Single-family home.
    #[serde(rename = "EFH")]
    Efh,
    /// Multi-family home.
    #[serde(rename = "MFH")]
    Mfh,
    #[serde(rename = "office")]
    Office,
    #[serde(rename = "small_business")]
    SmallBusiness,
    #[serde(rename = "default")]
    Default,
}

impl Archetype {
    /// Classifies a free-text building type from upstream systems.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Anything unrecognised, including a missing value, maps to
    /// [`Archetype::Default`].
    ///
    /// # Examples
    ///
    /// ```
    /// use community_sim::profile::archetype::Archetype;
    ///
    /// assert_eq!(Archetype::classify(Some(" SFH ")), Archetype::Efh);
    /// assert_eq!(Archetype::classify(Some("Büro Nord")), Archetype::Office);
    /// assert_eq!(Archetype::classify(Some("barn")), Archetype::Default);
    /// assert_eq!(Archetype::classify(None), Archetype::Default);
    /// ```
    pub fn classify(building_type: Option<&str>) -> Self {
        let Some(raw) = building_type else {
            return Self::Default;
        };
        let value = raw.trim().to_lowercase();
        match value.as_str() {
            "efh" | "single_family_home" | "single-family-home" | "single family home" | "sfh" => {
                Self::Efh
            }
            "mfh" | "apartment" | "apartment_building" | "multi_family" | "multi-family"
            | "mfh_wohnhaus" => Self::Mfh,
            v if ["office", "buero", "büro"].iter().any(|k| v.contains(k)) => Self::Office,
            v if ["small_business", "business", "commercial", "gewerbe"]
                .iter()
                .any(|k| v.contains(k)) =>
            {
                Self::SmallBusiness
            }
            _ => Self::Default,
        }
    }

    /// Canonical tag used in signatures and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Efh => "EFH",
            Self::Mfh => "MFH",
            Self::Office => "office",
            Self::SmallBusiness => "small_business",
            Self::Default => "default",
        }
    }

    fn is_commercial(&self) -> bool {
        matches!(self, Self::Office | Self::SmallBusiness)
    }

    /// Dimensionless consumption weight for one interval.
    fn consumption_shape(&self, slot: &Slot) -> f64 {
        let h = slot.hour_of_day;
        match self {
            Self::Efh => {
                let base = 0.18 + 1.8 * gaussian(h, 7.5, 2.0) + 2.6 * gaussian(h, 19.5, 2.8);
                base * if slot.is_weekend() { 1.12 } else { 1.0 }
            }
            Self::Mfh => {
                let base = 0.28 + 1.4 * gaussian(h, 7.0, 2.5) + 1.8 * gaussian(h, 20.0, 3.0);
                base * if slot.is_weekend() { 1.06 } else { 1.0 }
            }
            Self::Office => {
                let weekday = indicator(slot.weekday < 5);
                let work_hours = indicator((8.0..=18.0).contains(&h));
                0.12 + 2.3 * work_hours * weekday + 0.6 * gaussian(h, 12.0, 2.0) * weekday
            }
            Self::SmallBusiness => {
                // Open Monday to Saturday.
                let open_day = indicator(slot.weekday < 6);
                let work_hours = indicator((7.0..=19.0).contains(&h));
                0.15 + 1.8 * work_hours * open_day + 0.5 * gaussian(h, 10.5, 2.5)
            }
            Self::Default => {
                let bell = ((h - 13.5) * (PI / 12.0)).cos().powi(2);
                if !(6.0..=22.0).contains(&h) {
                    bell * 0.5
                } else {
                    bell
                }
            }
        }
    }

    /// Dimensionless PV weight for one interval, before normalisation.
    fn production_shape(&self, slot: &Slot) -> f64 {
        let season_angle = (f64::from(slot.day_of_year) - PV_PEAK_DAY_OF_YEAR) * (2.0 * PI / 365.0);
        let seasonal = 1.0 + 0.5 * season_angle.cos();
        let angle = ((slot.hour_of_day - 6.0) * (PI / 12.0)).max(0.0);
        let daylight = angle.sin().max(0.0).powf(1.5);
        let mut shape = daylight * seasonal;
        if self.is_commercial() && slot.is_weekend() {
            shape *= 0.85;
        }
        shape
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn gaussian(x: f64, mean: f64, sigma: f64) -> f64 {
    (-0.5 * ((x - mean) / sigma).powi(2)).exp()
}

fn indicator(cond: bool) -> f64 {
    if cond { 1.0 } else { 0.0 }
}

/// Generates a synthetic 15-minute profile for one participant.
///
/// The consumption column sums (times 0.25 h) to `annual_consumption_kwh`
/// over the window; the production column peaks at `potential_pv_kwp`.
/// Negative or non-finite magnitudes are treated as zero, and a zero
/// magnitude or an all-zero shape yields an all-zero column.
///
/// # Arguments
///
/// * `annual_consumption_kwh` - Energy to distribute over the window
/// * `potential_pv_kwp` - Peak PV power
/// * `archetype` - Building archetype selecting the consumption shape
/// * `window` - Start timestamp and interval count
pub fn generate_profile(
    annual_consumption_kwh: f64,
    potential_pv_kwp: f64,
    archetype: Archetype,
    window: &Window,
) -> IntervalSeries {
    let mut consumption_shape = Vec::with_capacity(window.num_intervals);
    let mut production_shape = Vec::with_capacity(window.num_intervals);

    Clock::new(*window).run(|slot| {
        consumption_shape.push(archetype.consumption_shape(&slot));
        production_shape.push(archetype.production_shape(&slot));
    });

    let shape_sum: f64 = consumption_shape.iter().sum();
    let energy_kwh = non_negative(annual_consumption_kwh);
    let consumption_scale = if shape_sum > 0.0 {
        energy_kwh / INTERVAL_HOURS / shape_sum
    } else {
        0.0
    };

    let shape_max = production_shape.iter().copied().fold(0.0_f64, f64::max);
    let kwp = non_negative(potential_pv_kwp);
    let production_scale = if shape_max > 0.0 { kwp / shape_max } else { 0.0 };

    IntervalSeries {
        start: window.start,
        consumption_kw: consumption_shape
            .into_iter()
            .map(|w| w * consumption_scale)
            .collect(),
        production_kw: production_shape
            .into_iter()
            .map(|w| w * production_scale)
            .collect(),
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year() -> Window {
        Window::full_year()
    }

    #[test]
    fn classify_known_aliases() {
        assert_eq!(Archetype::classify(Some("EFH")), Archetype::Efh);
        assert_eq!(Archetype::classify(Some("single family home")), Archetype::Efh);
        assert_eq!(Archetype::classify(Some("Apartment")), Archetype::Mfh);
        assert_eq!(Archetype::classify(Some("mfh_wohnhaus")), Archetype::Mfh);
        assert_eq!(Archetype::classify(Some("Head Office")), Archetype::Office);
        assert_eq!(Archetype::classify(Some("Gewerbe")), Archetype::SmallBusiness);
        assert_eq!(Archetype::classify(Some("commercial unit")), Archetype::SmallBusiness);
        assert_eq!(Archetype::classify(Some("")), Archetype::Default);
    }

    #[test]
    fn annual_consumption_preserved_over_full_year() {
        for archetype in [
            Archetype::Efh,
            Archetype::Mfh,
            Archetype::Office,
            Archetype::SmallBusiness,
            Archetype::Default,
        ] {
            let s = generate_profile(4_500.0, 6.0, archetype, &year());
            assert_eq!(s.len(), 35_040);
            let total: f64 = s.consumption_kw.iter().sum::<f64>() * 0.25;
            assert!(
                (total - 4_500.0).abs() < 1e-6,
                "{archetype}: consumption sums to {total}"
            );
        }
    }

    #[test]
    fn production_peaks_at_kwp() {
        let s = generate_profile(3_000.0, 8.0, Archetype::Efh, &year());
        let peak = s.production_kw.iter().copied().fold(0.0_f64, f64::max);
        assert!((peak - 8.0).abs() < 1e-9);
        assert!(s.production_kw.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn no_production_at_night() {
        let w = Window::one_day(Window::default_start());
        let s = generate_profile(3_000.0, 8.0, Archetype::Default, &w);
        // 00:00-06:00 and after 18:00
        assert!(s.production_kw[..25].iter().all(|&p| p == 0.0));
        assert!(s.production_kw[73..].iter().all(|&p| p == 0.0));
        assert!(s.production_kw[48] > 0.0);
    }

    #[test]
    fn zero_magnitudes_yield_zero_series() {
        let s = generate_profile(0.0, 0.0, Archetype::Office, &year());
        assert!(s.consumption_kw.iter().all(|&v| v == 0.0));
        assert!(s.production_kw.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn negative_and_nan_magnitudes_clamped() {
        let w = Window::one_day(Window::default_start());
        let s = generate_profile(-100.0, f64::NAN, Archetype::Mfh, &w);
        assert!(s.consumption_kw.iter().all(|&v| v == 0.0));
        assert!(s.production_kw.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn night_only_window_has_zero_pv_shape() {
        // 20:00 to 04:00: PV shape is zero everywhere, must not divide by zero.
        let start = Window::default_start() + chrono::Duration::hours(20);
        let w = Window::new(start, 32);
        let s = generate_profile(100.0, 5.0, Archetype::Efh, &w);
        assert!(s.production_kw.iter().all(|&v| v == 0.0));
        assert!((s.consumption_kwh() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn archetype_shapes_differ() {
        let w = Window::one_day(Window::default_start());
        let office = generate_profile(12_000.0, 5.0, Archetype::Office, &w);
        let efh = generate_profile(12_000.0, 5.0, Archetype::Efh, &w);
        assert_ne!(office.consumption_kw, efh.consumption_kw);
    }

    #[test]
    fn office_weekend_pv_is_damped() {
        // 2025-01-04 is a Saturday, 2025-01-03 a Friday.
        let friday = Window::one_day(Window::default_start() + chrono::Duration::days(2));
        let week = Window::new(friday.start, 192);
        let s = generate_profile(1_000.0, 10.0, Archetype::Office, &week);
        let fri_noon = s.production_kw[48];
        let sat_noon = s.production_kw[96 + 48];
        assert!(sat_noon < fri_noon * 0.9);
    }
}
