//! Energy community discovery, autarky simulation and billing.
//!
//! Participants are clustered by distance, each cluster is simulated over
//! a window of 15-minute intervals and ranked by autarky. Confirmed
//! communities are billed by allocating production among members.

#[cfg(feature = "api")]
pub mod api;
pub mod billing;
pub mod cluster;
pub mod community;
pub mod config;
pub mod error;
pub mod io;
pub mod jobs;
pub mod logging;
pub mod participant;
/// Load profiles: archetypes, meter quality and source resolution.
pub mod profile;
/// Autarky simulation, community signatures and result caching.
pub mod sim;
pub mod store;
