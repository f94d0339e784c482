//! TOML-based run configuration and preset definitions.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

use crate::billing::{AllocationPolicy, BillingParams, NetworkLevel};
use crate::participant::PopulationSpec;
use crate::profile::resolver::ResolutionStrategy;
use crate::profile::series::{INTERVALS_PER_YEAR, Window};
use crate::sim::signature::SIM_VERSION;

/// Accepted formats of `simulation.start`.
const START_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Top-level configuration parsed from TOML.
///
/// All fields have defaults matching the baseline preset. Load from TOML
/// with [`CommunityConfig::from_toml_file`] or use
/// [`CommunityConfig::baseline`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommunityConfig {
    /// Spatial clustering parameters.
    #[serde(default)]
    pub clustering: ClusteringConfig,
    /// Simulation window and profile resolution.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Autarky result cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Tariffs and allocation policy for billing runs.
    #[serde(default)]
    pub billing: BillingConfig,
    /// Synthetic population used when no participant file is given.
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Spatial clustering parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusteringConfig {
    /// Neighbourhood radius (meters, > 0).
    pub radius_m: f64,
    /// Minimum community size (>= 2).
    pub min_community_size: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius_m: 150.0,
            min_community_size: 3,
        }
    }
}

/// Simulation window and profile resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// First interval, e.g. `"2025-01-01T00:00:00"`.
    pub start: String,
    /// Number of 15-minute intervals (must be > 0).
    pub num_intervals: usize,
    /// Profile strategy: `hybrid`, `real_first` or `archetype_only`.
    pub strategy: ResolutionStrategy,
    /// Model version tag mixed into cache keys.
    pub sim_version: String,
    /// Tenant scope mixed into cache keys.
    pub scope: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: "2025-01-01T00:00:00".to_string(),
            num_intervals: INTERVALS_PER_YEAR,
            strategy: ResolutionStrategy::Hybrid,
            sim_version: SIM_VERSION.to_string(),
            scope: "default".to_string(),
        }
    }
}

/// Autarky result cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry lifetime in seconds; 0 keeps entries forever.
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 86_400,
        }
    }
}

/// Tariffs and allocation policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BillingConfig {
    /// Grid usage fee (CHF/kWh, >= 0).
    pub grid_fee_per_kwh: f64,
    /// Internal community price (CHF/kWh, >= 0).
    pub internal_price_per_kwh: f64,
    pub network_level: NetworkLevel,
    pub policy: AllocationPolicy,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            grid_fee_per_kwh: 0.10,
            internal_price_per_kwh: 0.20,
            network_level: NetworkLevel::Same,
            policy: AllocationPolicy::Proportional,
        }
    }
}

/// Synthetic demo population.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub participants: usize,
    pub seed: u64,
    pub center_lat: f64,
    pub center_lon: f64,
    /// Scatter of neighbourhoods around the centre (meters).
    pub spread_m: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            participants: 60,
            seed: 42,
            center_lat: 47.4733,
            center_lon: 8.3063,
            spread_m: 300.0,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Error, Debug)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"clustering.radius_m"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl CommunityConfig {
    /// Returns the baseline configuration.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Dense town centre: tighter radius, larger communities, more people.
    pub fn dense_town() -> Self {
        Self {
            clustering: ClusteringConfig {
                radius_m: 100.0,
                min_community_size: 4,
            },
            demo: DemoConfig {
                participants: 200,
                spread_m: 150.0,
                ..DemoConfig::default()
            },
            ..Self::default()
        }
    }

    /// One simulated week and a small population, for fast iterations.
    pub fn quick() -> Self {
        Self {
            simulation: SimulationConfig {
                num_intervals: 96 * 7,
                ..SimulationConfig::default()
            },
            demo: DemoConfig {
                participants: 30,
                ..DemoConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "dense_town", "quick"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "dense_town" => Ok(Self::dense_town()),
            "quick" => Ok(Self::quick()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Simulation window described by `[simulation]`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `simulation.start` cannot be parsed.
    pub fn window(&self) -> Result<Window, ConfigError> {
        let raw = self.simulation.start.trim();
        START_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|start| Window::new(start, self.simulation.num_intervals))
            .ok_or_else(|| {
                ConfigError::new(
                    "simulation.start",
                    format!("cannot parse \"{raw}\" as YYYY-MM-DDTHH:MM:SS"),
                )
            })
    }

    /// Cache entry lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }

    pub fn billing_params(&self) -> BillingParams {
        BillingParams {
            grid_fee_per_kwh: self.billing.grid_fee_per_kwh,
            internal_price_per_kwh: self.billing.internal_price_per_kwh,
            network_level: self.billing.network_level,
            policy: self.billing.policy,
        }
    }

    pub fn population_spec(&self) -> PopulationSpec {
        PopulationSpec {
            count: self.demo.participants,
            seed: self.demo.seed,
            center_lat: self.demo.center_lat,
            center_lon: self.demo.center_lon,
            spread_m: self.demo.spread_m,
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let c = &self.clustering;
        if !(c.radius_m > 0.0 && c.radius_m.is_finite()) {
            errors.push(ConfigError::new("clustering.radius_m", "must be > 0"));
        }
        if c.min_community_size < 2 {
            errors.push(ConfigError::new("clustering.min_community_size", "must be >= 2"));
        }

        let s = &self.simulation;
        if s.num_intervals == 0 {
            errors.push(ConfigError::new("simulation.num_intervals", "must be > 0"));
        }
        if let Err(e) = self.window() {
            errors.push(e);
        }
        if s.sim_version.trim().is_empty() {
            errors.push(ConfigError::new("simulation.sim_version", "must not be empty"));
        }

        let b = &self.billing;
        if b.grid_fee_per_kwh.is_nan() || b.grid_fee_per_kwh < 0.0 {
            errors.push(ConfigError::new("billing.grid_fee_per_kwh", "must be >= 0"));
        }
        if b.internal_price_per_kwh.is_nan() || b.internal_price_per_kwh < 0.0 {
            errors.push(ConfigError::new("billing.internal_price_per_kwh", "must be >= 0"));
        }

        let d = &self.demo;
        if !(-90.0..=90.0).contains(&d.center_lat) {
            errors.push(ConfigError::new("demo.center_lat", "must be in [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&d.center_lon) {
            errors.push(ConfigError::new("demo.center_lon", "must be in [-180, 180]"));
        }
        if d.spread_m < 0.0 {
            errors.push(ConfigError::new("demo.spread_m", "must be >= 0"));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for name in CommunityConfig::PRESETS {
            let cfg = CommunityConfig::from_preset(name).expect("preset should exist");
            let errors = cfg.validate();
            assert!(errors.is_empty(), "{name} should be valid: {errors:?}");
        }
    }

    #[test]
    fn from_preset_unknown() {
        let e = CommunityConfig::from_preset("nonexistent").unwrap_err();
        assert_eq!(e.field, "preset");
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn baseline_window_is_full_year() {
        let w = CommunityConfig::baseline().window().expect("window");
        assert_eq!(w, Window::full_year());
        assert_eq!(CommunityConfig::quick().window().map(|w| w.num_intervals).ok(), Some(672));
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[clustering]
radius_m = 200.0
min_community_size = 4

[simulation]
start = "2024-06-01 00:00:00"
num_intervals = 96
strategy = "archetype_only"
scope = "baden"

[cache]
enabled = false
ttl_seconds = 60

[billing]
grid_fee_per_kwh = 0.12
internal_price_per_kwh = 0.18
network_level = "cross"
policy = "equal_capped"
"#;
        let cfg = CommunityConfig::from_toml_str(toml).expect("valid TOML should parse");
        assert_eq!(cfg.clustering.min_community_size, 4);
        assert_eq!(cfg.simulation.strategy, ResolutionStrategy::ArchetypeOnly);
        assert_eq!(cfg.billing.policy, AllocationPolicy::EqualCapped);
        assert_eq!(cfg.billing.network_level, NetworkLevel::Cross);
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.demo.participants, 60);
        let w = cfg.window().expect("window");
        assert_eq!(w.start.to_string(), "2024-06-01 00:00:00");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
[clustering]
radius_m = 150.0
bogus_field = true
"#;
        assert!(CommunityConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let toml = "[simulation]\nstrategy = \"psychic\"\n";
        assert!(CommunityConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_reports_dotted_paths() {
        let mut cfg = CommunityConfig::baseline();
        cfg.clustering.radius_m = 0.0;
        cfg.clustering.min_community_size = 1;
        cfg.simulation.start = "yesterday".into();
        cfg.billing.grid_fee_per_kwh = -0.1;
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"clustering.radius_m".to_string()));
        assert!(fields.contains(&"clustering.min_community_size".to_string()));
        assert!(fields.contains(&"simulation.start".to_string()));
        assert!(fields.contains(&"billing.grid_fee_per_kwh".to_string()));
    }

    #[test]
    fn error_display_includes_field() {
        let e = ConfigError::new("cache.ttl_seconds", "must be > 0");
        assert_eq!(e.to_string(), "config error: cache.ttl_seconds: must be > 0");
    }
}
