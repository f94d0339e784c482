//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use community_sim::community::CommunityEngine;
use community_sim::participant::{EARTH_RADIUS_M, Participant};
use community_sim::profile::meter::MeterReading;
use community_sim::profile::series::{INTERVAL_MINUTES, Window};
use community_sim::sim::cache::{AutarkyCache, MemoryCache};
use community_sim::store::MeterStore;

/// Centre of the test neighbourhoods.
pub const ORIGIN: (f64, f64) = (47.3769, 8.5417);

/// Participant placed `north_m` / `east_m` meters from [`ORIGIN`].
pub fn participant_at(
    id: &str,
    north_m: f64,
    east_m: f64,
    category: Option<&str>,
    kwh: f64,
    kwp: f64,
) -> Participant {
    let lat = ORIGIN.0 + (north_m / EARTH_RADIUS_M).to_degrees();
    let lon = ORIGIN.1 + (east_m / (EARTH_RADIUS_M * ORIGIN.0.to_radians().cos())).to_degrees();
    Participant::new(id, lat, lon, category, kwh, kwp)
}

/// Two neighbourhoods about 2 km apart plus one isolated house.
///
/// `north` has a large PV owner and two consumers, `south` four
/// small businesses without PV.
pub fn two_neighbourhoods() -> Vec<Participant> {
    vec![
        participant_at("n1", 0.0, 0.0, Some("EFH"), 4_500.0, 12.0),
        participant_at("n2", 40.0, 0.0, Some("MFH"), 15_000.0, 0.0),
        participant_at("n3", 0.0, 60.0, Some("EFH"), 5_000.0, 0.0),
        participant_at("s1", -2_000.0, 0.0, Some("Gewerbe"), 20_000.0, 0.0),
        participant_at("s2", -2_050.0, 0.0, Some("Gewerbe"), 20_000.0, 0.0),
        participant_at("s3", -2_000.0, 50.0, Some("Laden"), 18_000.0, 0.0),
        participant_at("s4", -2_050.0, 50.0, Some("Büro"), 30_000.0, 0.0),
        participant_at("lonely", 5_000.0, 5_000.0, None, 3_000.0, 4.0),
    ]
}

/// One week starting at the default year start.
pub fn week_window() -> Window {
    Window::new(Window::default_start(), 96 * 7)
}

/// Engine over `meters` with an in-memory cache of one hour.
pub fn engine_with(meters: Arc<dyn MeterStore>) -> (CommunityEngine, Arc<AutarkyCache>) {
    let cache = Arc::new(AutarkyCache::new(
        Arc::new(MemoryCache::new()),
        Duration::from_secs(3_600),
    ));
    let engine = CommunityEngine::new(meters, Arc::clone(&cache)).with_window(week_window());
    (engine, cache)
}

/// Complete quarter-hour readings with constant energy per interval.
pub fn constant_readings(
    start: NaiveDateTime,
    intervals: usize,
    consumption_kwh: f64,
    production_kwh: f64,
) -> Vec<MeterReading> {
    (0..intervals)
        .map(|i| {
            let ts = start + chrono::Duration::minutes(INTERVAL_MINUTES * i as i64);
            MeterReading::new(ts, consumption_kwh, production_kwh, 0.0)
        })
        .collect()
}
