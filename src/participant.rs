//! Participant records and the seeded demo population.

use std::path::Path;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};
use crate::profile::archetype::Archetype;

/// Mean earth radius in meters, shared by clustering and coordinate math.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One candidate community member as read from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Free-text building type from the upstream system.
    #[serde(default)]
    pub building_category: Option<String>,
    #[serde(default)]
    pub annual_consumption_kwh: f64,
    #[serde(default)]
    pub potential_pv_kwp: f64,
}

impl Participant {
    pub fn new(
        id: impl Into<String>,
        lat: f64,
        lon: f64,
        building_category: Option<&str>,
        annual_consumption_kwh: f64,
        potential_pv_kwp: f64,
    ) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            building_category: building_category.map(str::to_string),
            annual_consumption_kwh,
            potential_pv_kwp,
        }
    }

    /// Normalized archetype of this participant's building.
    pub fn archetype(&self) -> Archetype {
        Archetype::classify(self.building_category.as_deref())
    }
}

/// Reads participants from a CSV file with a header row.
///
/// Required columns: `id,lat,lon`; optional: `building_category`,
/// `annual_consumption_kwh`, `potential_pv_kwp`.
///
/// # Errors
///
/// Returns a `DataError` if the file cannot be read, a row fails to parse,
/// or a coordinate is not finite.
pub fn load_participants_csv(path: &Path) -> DataResult<Vec<Participant>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    read_participants(&mut rdr)
}

/// Reads participants from any CSV source.
pub fn read_participants<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
) -> DataResult<Vec<Participant>> {
    let mut participants = Vec::new();
    for record in rdr.deserialize::<Participant>() {
        let mut p = record?;
        if !p.lat.is_finite() || !p.lon.is_finite() {
            return Err(DataError::Invalid(format!(
                "participant `{}` has non-finite coordinates",
                p.id
            )));
        }
        if p.building_category.as_deref().is_some_and(str::is_empty) {
            p.building_category = None;
        }
        participants.push(p);
    }
    Ok(participants)
}

/// Parameters for a synthetic participant population.
#[derive(Debug, Clone)]
pub struct PopulationSpec {
    pub count: usize,
    pub seed: u64,
    pub center_lat: f64,
    pub center_lon: f64,
    /// Standard deviation of the scatter around the centre, in meters.
    pub spread_m: f64,
}

const DEMO_CATEGORIES: &[(&str, f64, f64)] = &[
    // (building type, mean annual kWh, mean kWp)
    ("EFH", 4_500.0, 8.0),
    ("MFH", 18_000.0, 25.0),
    ("office", 30_000.0, 40.0),
    ("small_business", 15_000.0, 15.0),
    ("barn", 2_000.0, 30.0),
];

/// Generates a reproducible demo population scattered around a centre.
///
/// Participants are placed in a few neighbourhoods plus isolated
/// outliers so that clustering yields both communities and noise.
pub fn synthetic_population(spec: &PopulationSpec) -> Vec<Participant> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let neighbourhoods = (spec.count / 12).max(1);
    let centres: Vec<(f64, f64)> = (0..neighbourhoods)
        .map(|_| {
            let dn = gaussian_noise(&mut rng, spec.spread_m * 3.0);
            let de = gaussian_noise(&mut rng, spec.spread_m * 3.0);
            offset_m(spec.center_lat, spec.center_lon, dn, de)
        })
        .collect();

    (0..spec.count)
        .map(|i| {
            let isolated = rng.random::<f64>() < 0.1;
            let (lat, lon) = if isolated {
                let dn = gaussian_noise(&mut rng, spec.spread_m * 10.0);
                let de = gaussian_noise(&mut rng, spec.spread_m * 10.0);
                offset_m(spec.center_lat, spec.center_lon, dn, de)
            } else {
                let (clat, clon) = centres[rng.random_range(0..centres.len())];
                let dn = gaussian_noise(&mut rng, spec.spread_m * 0.1);
                let de = gaussian_noise(&mut rng, spec.spread_m * 0.1);
                offset_m(clat, clon, dn, de)
            };
            let (category, kwh, kwp) = DEMO_CATEGORIES[rng.random_range(0..DEMO_CATEGORIES.len())];
            let scale = 0.6 + 0.8 * rng.random::<f64>();
            let pv_scale = if rng.random::<f64>() < 0.25 {
                0.0
            } else {
                0.5 + rng.random::<f64>()
            };
            Participant::new(
                format!("p{i:04}"),
                lat,
                lon,
                Some(category),
                (kwh * scale).round(),
                (kwp * pv_scale * 10.0).round() / 10.0,
            )
        })
        .collect()
}

/// Shifts a coordinate by north/east offsets in meters.
fn offset_m(lat: f64, lon: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let dlon = (east_m / (EARTH_RADIUS_M * lat.to_radians().cos())).to_degrees();
    (lat + dlat, lon + dlon)
}

/// Gaussian noise via the Box-Muller transform.
fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
