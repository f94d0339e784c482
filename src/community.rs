//! Community discovery: cluster participants, simulate each cluster through
//! the cache and rank the results.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cluster::{NOISE, cluster_participants};
use crate::participant::Participant;
use crate::profile::resolver::{self, ProfileResolution, ResolutionStrategy};
use crate::profile::series::{IntervalSeries, Window};
use crate::sim::autarky::{AutarkyResult, DataMix};
use crate::sim::cache::{AutarkyCache, CachedAutarky};
use crate::sim::signature::{SIM_VERSION, community_signature};
use crate::store::{MeterStore, NoMeterData};

/// Location of one community member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberLocation {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

/// One ranked candidate community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityRanking {
    /// Cluster label from the clustering run.
    pub community_id: i32,
    pub num_members: usize,
    pub members: Vec<MemberLocation>,
    pub autarky_percent: f64,
    pub total_consumption_mwh: f64,
    pub total_production_mwh: f64,
    pub grid_export_mwh: f64,
    pub peak_import_kw: f64,
    pub confidence_percent: f64,
    pub profile_data_mix: DataMix,
    pub cache_hit: bool,
    pub cache_key: String,
}

impl CommunityRanking {
    fn from_cached(community_id: i32, members: &[&Participant], cached: CachedAutarky) -> Self {
        let CachedAutarky {
            result,
            cache_hit,
            cache_key,
        } = cached;
        Self {
            community_id,
            num_members: members.len(),
            members: members
                .iter()
                .map(|p| MemberLocation {
                    id: p.id.clone(),
                    lat: p.lat,
                    lon: p.lon,
                })
                .collect(),
            autarky_percent: result.autarky_percent(),
            total_consumption_mwh: result.total_consumption_kwh / 1_000.0,
            total_production_mwh: result.total_production_kwh / 1_000.0,
            grid_export_mwh: result.grid_export_kwh / 1_000.0,
            peak_import_kw: result.peak_import_kw,
            confidence_percent: result.confidence_percent,
            profile_data_mix: result.profile_data_mix,
            cache_hit,
            cache_key,
        }
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.id.as_str())
    }
}

/// A participant together with its cluster label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledParticipant {
    #[serde(flatten)]
    pub participant: Participant,
    /// Cluster label, `-1` for noise.
    pub cluster: i32,
}

/// Output of one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    /// Communities ordered by autarky, best first.
    pub ranked: Vec<CommunityRanking>,
    /// Every input participant with its label, in input order.
    pub labeled: Vec<LabeledParticipant>,
}

impl CommunityReport {
    pub fn community(&self, community_id: i32) -> Option<&CommunityRanking> {
        self.ranked.iter().find(|c| c.community_id == community_id)
    }

    pub fn noise_count(&self) -> usize {
        self.labeled.iter().filter(|p| p.cluster == NOISE).count()
    }
}

impl fmt::Display for CommunityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Community Ranking ---")?;
        writeln!(
            f,
            "{} communities, {} participants ({} unclustered)",
            self.ranked.len(),
            self.labeled.len(),
            self.noise_count()
        )?;
        for (rank, c) in self.ranked.iter().enumerate() {
            writeln!(
                f,
                "#{:<3} community {:<4} members={:<3} autarky={:>5.1}% \
                 cons={:.1} MWh prod={:.1} MWh export={:.1} MWh peak={:.1} kW \
                 conf={:.0}% mix={}",
                rank + 1,
                c.community_id,
                c.num_members,
                c.autarky_percent,
                c.total_consumption_mwh,
                c.total_production_mwh,
                c.grid_export_mwh,
                c.peak_import_kw,
                c.confidence_percent,
                c.profile_data_mix,
            )?;
        }
        Ok(())
    }
}

/// Runs profile resolution, simulation and ranking against injected
/// storage and cache collaborators.
#[derive(Clone)]
pub struct CommunityEngine {
    meters: Arc<dyn MeterStore>,
    cache: Arc<AutarkyCache>,
    window: Window,
    strategy: ResolutionStrategy,
    scope: String,
    sim_version: String,
}

impl CommunityEngine {
    pub fn new(meters: Arc<dyn MeterStore>, cache: Arc<AutarkyCache>) -> Self {
        Self {
            meters,
            cache,
            window: Window::full_year(),
            strategy: ResolutionStrategy::Hybrid,
            scope: String::new(),
            sim_version: SIM_VERSION.to_string(),
        }
    }

    /// An engine with no meter data and no cache.
    pub fn standalone() -> Self {
        Self::new(Arc::new(NoMeterData), Arc::new(AutarkyCache::disabled()))
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Tenant scope included in cache keys.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_sim_version(mut self, sim_version: impl Into<String>) -> Self {
        self.sim_version = sim_version.into();
        self
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn cache(&self) -> &AutarkyCache {
        &self.cache
    }

    /// Resolves one participant's profile with this engine's window and strategy.
    pub fn resolve_participant_profile(&self, participant: &Participant) -> ProfileResolution {
        resolver::resolve_participant_profile(
            participant,
            &self.window,
            self.strategy,
            self.meters.as_ref(),
        )
    }

    /// Cache key of a candidate community under this engine's scope.
    pub fn cache_key(&self, members: &[&Participant]) -> String {
        let signature = community_signature(members, &self.scope, &self.sim_version, &self.window);
        AutarkyCache::key_for(&self.scope, &signature)
    }

    /// Simulates a community through the cache.
    ///
    /// Repeated calls for the same composition return the stored result
    /// with `cache_hit = true` while the cache entry lives.
    pub fn compute_autarky(&self, members: &[&Participant]) -> CachedAutarky {
        let key = self.cache_key(members);
        self.cache
            .get_or_compute(&key, || self.simulate(members, &HashMap::new()))
    }

    /// Simulates a community without the cache.
    ///
    /// Members with an entry in `provided` use that profile instead of the
    /// resolver. Provided profiles are not part of the cache key, so
    /// what-if runs go through here rather than [`Self::compute_autarky`].
    pub fn simulate(
        &self,
        members: &[&Participant],
        provided: &HashMap<String, IntervalSeries>,
    ) -> AutarkyResult {
        let profiles: Vec<ProfileResolution> = members
            .iter()
            .map(|p| match provided.get(&p.id) {
                Some(series) => ProfileResolution::provided(series.clone(), &self.window),
                None => self.resolve_participant_profile(p),
            })
            .collect();
        AutarkyResult::from_profiles(&profiles, self.window.num_intervals)
    }

    /// Clusters all participants and ranks the resulting communities.
    ///
    /// # Arguments
    ///
    /// * `participants` - Full population; repeated ids keep only their first entry
    /// * `radius_m` - Clustering radius in meters
    /// * `min_size` - Minimum community size
    ///
    /// # Returns
    ///
    /// A [`CommunityReport`]. With fewer participants than `min_size` the
    /// ranking is empty and everyone is labelled noise.
    pub fn find_communities(
        &self,
        participants: &[Participant],
        radius_m: f64,
        min_size: usize,
    ) -> CommunityReport {
        let participants = unique_by_id(participants);
        let clustering = cluster_participants(&participants, radius_m, min_size);
        let groups = clustering.groups();
        info!(
            scope = %self.scope,
            participants = participants.len(),
            communities = groups.len(),
            noise = clustering.noise_count(),
            "clustered participants"
        );

        let by_id: HashMap<&str, &Participant> =
            participants.iter().map(|p| (p.id.as_str(), p)).collect();

        let mut ranked: Vec<CommunityRanking> = groups
            .iter()
            .map(|(&label, ids)| {
                let members: Vec<&Participant> =
                    ids.iter().filter_map(|id| by_id.get(id).copied()).collect();
                let cached = self.compute_autarky(&members);
                debug!(
                    community = label,
                    members = members.len(),
                    autarky = cached.result.autarky_score,
                    cache_hit = cached.cache_hit,
                    "simulated community"
                );
                CommunityRanking::from_cached(label, &members, cached)
            })
            .collect();
        // Stable: equal scores keep label order.
        ranked.sort_by(|a, b| b.autarky_percent.total_cmp(&a.autarky_percent));

        let labeled = participants
            .iter()
            .zip(&clustering.assignments)
            .map(|(p, a)| LabeledParticipant {
                participant: p.clone(),
                cluster: a.label,
            })
            .collect();

        CommunityReport { ranked, labeled }
    }
}

/// Drops repeated participant ids, keeping the first occurrence of each.
fn unique_by_id(participants: &[Participant]) -> Cow<'_, [Participant]> {
    let mut seen = HashSet::with_capacity(participants.len());
    if participants.iter().all(|p| seen.insert(p.id.as_str())) {
        return Cow::Borrowed(participants);
    }

    let mut seen = HashSet::with_capacity(participants.len());
    let unique: Vec<Participant> = participants
        .iter()
        .filter(|p| seen.insert(p.id.as_str()))
        .cloned()
        .collect();
    warn!(
        dropped = participants.len() - unique.len(),
        "duplicate participant ids, keeping the first occurrence of each"
    );
    Cow::Owned(unique)
}
