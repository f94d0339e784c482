//! API response and query types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::community::CommunityRanking;

/// Ranked communities of one completed run.
#[derive(Debug, Serialize)]
pub struct CommunitiesResponse {
    pub tenant: String,
    pub run_id: u64,
    pub completed_at: DateTime<Utc>,
    pub communities: Vec<CommunityRanking>,
}

/// Optional filters for `GET /participants`.
#[derive(Debug, Default, Deserialize)]
pub struct ParticipantQuery {
    /// Only participants with this cluster label (`-1` for noise).
    pub cluster: Option<i32>,
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
