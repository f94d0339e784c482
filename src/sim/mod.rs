pub mod autarky;
/// Simulation result cache and its get-or-compute wrapper.
pub mod cache;
/// Calendar walk over a simulation window.
pub mod clock;
pub mod power_balance;
pub mod signature;

pub use autarky::{AutarkyResult, DataMix, SourceCounts};
pub use cache::{AutarkyCache, CacheStore, CachedAutarky, MemoryCache, NoCache};
pub use signature::{SIM_VERSION, community_signature};
