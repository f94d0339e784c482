//! Chooses between metered and synthetic profiles for one participant.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::archetype::{Archetype, generate_profile};
use super::meter::{MeterQuality, align_to_window, score_for_window};
use super::series::{IntervalSeries, Window};
use crate::participant::Participant;
use crate::store::MeterStore;

/// Confidence assigned to archetype-generated profiles.
pub const MOCK_PROFILE_CONFIDENCE: f64 = 0.45;

/// Confidence (and nominal coverage) of caller-supplied profiles.
pub const PROVIDED_PROFILE_CONFIDENCE: f64 = 0.6;

/// How a profile should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Real meter data when usable, archetype profile otherwise.
    #[default]
    Hybrid,
    /// Same lookup order as `Hybrid`.
    RealFirst,
    /// Never consult the meter store.
    ArchetypeOnly,
}

impl ResolutionStrategy {
    fn tries_meter_data(self) -> bool {
        matches!(self, Self::Hybrid | Self::RealFirst)
    }
}

/// Where a resolved profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    Real,
    Mock,
    Provided,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Real => "real",
            Self::Mock => "mock",
            Self::Provided => "provided",
        })
    }
}

/// A participant's profile together with its provenance and confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileResolution {
    pub series: IntervalSeries,
    pub source: ProfileSource,
    pub quality_score: f64,
    pub coverage_ratio: f64,
    /// Meter scoring report, when meter data was examined.
    pub meter_quality: Option<MeterQuality>,
    /// Archetype used for synthetic profiles.
    pub archetype: Option<Archetype>,
}

impl ProfileResolution {
    /// Wraps a caller-supplied profile, repairing its length to `window`.
    pub fn provided(series: IntervalSeries, window: &Window) -> Self {
        Self {
            series: series.fit_to(window.num_intervals),
            source: ProfileSource::Provided,
            quality_score: PROVIDED_PROFILE_CONFIDENCE,
            coverage_ratio: PROVIDED_PROFILE_CONFIDENCE,
            meter_quality: None,
            archetype: None,
        }
    }
}

/// Resolves the profile of `participant` over `window`.
///
/// Under `Hybrid` and `RealFirst`, stored meter rows are scored first and
/// used when they are usable for simulation. Anything else, including a
/// failing store, falls back to the archetype generator with
/// [`MOCK_PROFILE_CONFIDENCE`]. This function never fails.
pub fn resolve_participant_profile(
    participant: &Participant,
    window: &Window,
    strategy: ResolutionStrategy,
    meters: &dyn MeterStore,
) -> ProfileResolution {
    let mut meter_quality = None;

    if strategy.tries_meter_data() && !participant.id.is_empty() {
        match meters.meter_rows(&participant.id, window.start, window.end()) {
            Ok(rows) if !rows.is_empty() => {
                let quality = score_for_window(&rows, window);
                if quality.usable_for_simulation {
                    debug!(
                        participant = %participant.id,
                        quality = quality.quality_score,
                        "using metered profile"
                    );
                    return ProfileResolution {
                        series: align_to_window(&rows, window),
                        source: ProfileSource::Real,
                        quality_score: quality.quality_score,
                        coverage_ratio: quality.coverage_ratio,
                        meter_quality: Some(quality),
                        archetype: None,
                    };
                }
                debug!(
                    participant = %participant.id,
                    coverage = quality.coverage_ratio,
                    negatives = quality.negative_count,
                    outliers = quality.outlier_count,
                    "meter data unusable, falling back to archetype"
                );
                meter_quality = Some(quality);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(participant = %participant.id, error = %e, "meter store read failed");
            }
        }
    }

    let archetype = participant.archetype();
    ProfileResolution {
        series: generate_profile(
            participant.annual_consumption_kwh,
            participant.potential_pv_kwp,
            archetype,
            window,
        ),
        source: ProfileSource::Mock,
        quality_score: MOCK_PROFILE_CONFIDENCE,
        coverage_ratio: 0.0,
        meter_quality,
        archetype: Some(archetype),
    }
}
