//! Background discovery runs with per-tenant coalescing.
//!
//! Each tenant has at most one run in flight. Submitting while a run is
//! active parks the request as the tenant's single pending follow-up; a
//! newer submission replaces an older pending one. Finished runs publish an
//! immutable snapshot by swapping an `Arc`, so readers always see either
//! the previous or the new ranking, never a mix. A run that panics is
//! logged and recorded as finished without a snapshot; the tenant moves on
//! to its pending follow-up, if any.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{error, info};

use crate::community::{CommunityEngine, CommunityReport};
use crate::participant::Participant;

/// Inputs of one discovery run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub participants: Vec<Participant>,
    pub radius_m: f64,
    pub min_size: usize,
}

/// Published result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct CommunitySnapshot {
    pub tenant: String,
    pub run_id: u64,
    pub completed_at: DateTime<Utc>,
    pub report: CommunityReport,
}

/// Scheduler state of one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Nothing running. `last_run` is the newest completed run, if any.
    Idle { last_run: Option<u64> },
    /// A run is active; `pending` is set when a follow-up is queued.
    Running { run_id: u64, pending: Option<u64> },
}

#[derive(Default)]
struct TenantState {
    next_run_id: u64,
    running: Option<u64>,
    pending: Option<(u64, RunRequest)>,
    /// Newest run that published a snapshot.
    last_completed: Option<u64>,
    /// Newest run that ended, successfully or not.
    last_finished: Option<u64>,
    latest: Option<Arc<CommunitySnapshot>>,
}

impl TenantState {
    fn allocate_run_id(&mut self) -> u64 {
        self.next_run_id += 1;
        self.next_run_id
    }

    /// Records the end of `run_id` and promotes the pending follow-up.
    ///
    /// Returns the next run to execute, or `None` when the tenant is idle.
    fn finish(&mut self, run_id: u64) -> Option<(u64, RunRequest)> {
        self.last_finished = Some(run_id);
        let next = self.pending.take();
        self.running = next.as_ref().map(|(id, _)| *id);
        next
    }
}

struct Shared {
    engine: CommunityEngine,
    tenants: Mutex<HashMap<String, TenantState>>,
    finished: Condvar,
}

/// Runs [`CommunityEngine::find_communities`] off the caller's thread.
#[derive(Clone)]
pub struct BatchScheduler {
    shared: Arc<Shared>,
}

impl BatchScheduler {
    /// Creates a scheduler; each tenant's runs use `engine` scoped to the tenant.
    pub fn new(engine: CommunityEngine) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                tenants: Mutex::new(HashMap::new()),
                finished: Condvar::new(),
            }),
        }
    }

    /// Queues a run for `tenant` and returns its run id.
    ///
    /// If the tenant is idle the run starts immediately on a worker thread.
    /// Otherwise the request becomes the pending follow-up, replacing and
    /// taking over the id of any request already pending.
    pub fn submit(&self, tenant: &str, request: RunRequest) -> u64 {
        let mut tenants = self.shared.tenants.lock();
        let state = tenants.entry(tenant.to_string()).or_default();

        if state.running.is_some() {
            let run_id = match state.pending.take() {
                Some((id, _)) => id,
                None => state.allocate_run_id(),
            };
            info!(tenant, run_id, "discovery run coalesced into pending follow-up");
            state.pending = Some((run_id, request));
            return run_id;
        }

        let run_id = state.allocate_run_id();
        state.running = Some(run_id);
        drop(tenants);

        self.spawn_worker(tenant.to_string(), run_id, request);
        run_id
    }

    pub fn status(&self, tenant: &str) -> JobStatus {
        let tenants = self.shared.tenants.lock();
        match tenants.get(tenant) {
            Some(TenantState {
                running: Some(run_id),
                pending,
                ..
            }) => JobStatus::Running {
                run_id: *run_id,
                pending: pending.as_ref().map(|(id, _)| *id),
            },
            Some(state) => JobStatus::Idle {
                last_run: state.last_completed,
            },
            None => JobStatus::Idle { last_run: None },
        }
    }

    /// Latest published snapshot of `tenant`.
    pub fn latest(&self, tenant: &str) -> Option<Arc<CommunitySnapshot>> {
        self.shared
            .tenants
            .lock()
            .get(tenant)
            .and_then(|s| s.latest.clone())
    }

    /// Blocks until run `run_id` of `tenant` (or a later one) has finished.
    ///
    /// Returns the newest snapshot if it is from `run_id` or later. Returns
    /// `None` if the run id was never issued, or if the run failed and no
    /// later run has published yet.
    pub fn wait(&self, tenant: &str, run_id: u64) -> Option<Arc<CommunitySnapshot>> {
        let mut tenants = self.shared.tenants.lock();
        loop {
            let state = tenants.get(tenant)?;
            if run_id > state.next_run_id {
                return None;
            }
            if state.last_finished.is_some_and(|done| done >= run_id) {
                return state.latest.clone().filter(|s| s.run_id >= run_id);
            }
            self.shared.finished.wait(&mut tenants);
        }
    }

    fn spawn_worker(&self, tenant: String, run_id: u64, request: RunRequest) {
        let shared = Arc::clone(&self.shared);
        let name = format!("discovery-{tenant}");
        let spawned = thread::Builder::new()
            .name(name)
            .spawn({
                let tenant = tenant.clone();
                move || worker_loop(&shared, &tenant, run_id, request)
            });

        if let Err(e) = spawned {
            error!(tenant = %tenant, run_id, error = %e, "could not start discovery worker");
            let mut tenants = self.shared.tenants.lock();
            if let Some(state) = tenants.get_mut(&tenant) {
                // Anything queued meanwhile has a higher id; fail it as well.
                let last = state.pending.take().map_or(run_id, |(id, _)| id);
                state.finish(last);
            }
            self.shared.finished.notify_all();
        }
    }
}

fn worker_loop(shared: &Shared, tenant: &str, mut run_id: u64, mut request: RunRequest) {
    let engine = shared.engine.clone().with_scope(tenant);
    loop {
        info!(
            tenant,
            run_id,
            participants = request.participants.len(),
            "discovery run started"
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            engine.find_communities(&request.participants, request.radius_m, request.min_size)
        }));

        let mut tenants = shared.tenants.lock();
        let Some(state) = tenants.get_mut(tenant) else {
            return;
        };
        match outcome {
            Ok(report) => {
                info!(
                    tenant,
                    run_id,
                    communities = report.ranked.len(),
                    "discovery run published"
                );
                state.latest = Some(Arc::new(CommunitySnapshot {
                    tenant: tenant.to_string(),
                    run_id,
                    completed_at: Utc::now(),
                    report,
                }));
                state.last_completed = Some(run_id);
            }
            Err(cause) => {
                let reason = cause
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| cause.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tenant, run_id, reason = %reason, "discovery run panicked");
            }
        }

        let next = state.finish(run_id);
        drop(tenants);
        shared.finished.notify_all();
        match next {
            Some((next_id, next_request)) => {
                run_id = next_id;
                request = next_request;
            }
            None => return,
        }
    }
}
