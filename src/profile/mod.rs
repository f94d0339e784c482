//! Per-participant energy profiles: synthetic archetypes, metered data and
//! the resolver that picks between them.

pub mod archetype;
pub mod meter;
pub mod resolver;
pub mod series;

pub use archetype::{Archetype, generate_profile};
pub use meter::{MeterQuality, MeterReading, score_readings};
pub use resolver::{ProfileResolution, ProfileSource, ResolutionStrategy};
pub use series::{IntervalSeries, Window};
