//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use super::AppState;
use super::types::{CommunitiesResponse, ErrorResponse, ParticipantQuery};
use crate::community::{CommunityRanking, LabeledParticipant};
use crate::jobs::{CommunitySnapshot, JobStatus};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn latest(state: &AppState) -> Result<Arc<CommunitySnapshot>, ApiError> {
    state.scheduler.latest(&state.tenant).ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "no completed discovery run yet",
        )
    })
}

/// `GET /communities` → 200 + ranked communities, 503 before the first run.
pub async fn list_communities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CommunitiesResponse>, ApiError> {
    let snapshot = latest(&state)?;
    Ok(Json(CommunitiesResponse {
        tenant: snapshot.tenant.clone(),
        run_id: snapshot.run_id,
        completed_at: snapshot.completed_at,
        communities: snapshot.report.ranked.clone(),
    }))
}

/// `GET /communities/{id}` → 200 + one community, 404 for unknown labels.
pub async fn get_community(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<CommunityRanking>, ApiError> {
    let snapshot = latest(&state)?;
    snapshot
        .report
        .community(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("community {id} not found")))
}

/// `GET /participants[?cluster=N]` → 200 + labeled participants.
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ParticipantQuery>,
) -> Result<Json<Vec<LabeledParticipant>>, ApiError> {
    let snapshot = latest(&state)?;
    let participants = snapshot
        .report
        .labeled
        .iter()
        .filter(|p| query.cluster.is_none_or(|c| p.cluster == c))
        .cloned()
        .collect();
    Ok(Json(participants))
}

/// `GET /status` → 200 + scheduler state.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<JobStatus> {
    Json(state.scheduler.status(&state.tenant))
}
