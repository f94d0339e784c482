//! Order-independent digests of community composition, used as cache keys.

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::participant::Participant;
use crate::profile::series::{INTERVAL_MINUTES, Window};

/// Version tag of the simulation model. Bump it to invalidate cached results.
pub const SIM_VERSION: &str = "v2";

/// Computes the cache key of a candidate community.
///
/// Members are reduced to `{id, annual_consumption_kwh, potential_pv_kwp,
/// archetype}` (magnitudes rounded to 3 decimals) and sorted by id, so the
/// same group yields the same key in any order. Scope, model version and
/// window parameters are part of the digest.
///
/// # Returns
///
/// A 64-character lowercase hex SHA-256 digest.
///
/// # Examples
///
/// ```
/// use community_sim::participant::Participant;
/// use community_sim::profile::series::Window;
/// use community_sim::sim::signature::{community_signature, SIM_VERSION};
///
/// let a = Participant::new("a", 47.0, 8.0, Some("EFH"), 4500.0, 6.0);
/// let b = Participant::new("b", 47.0, 8.0, Some("office"), 30000.0, 40.0);
/// let w = Window::full_year();
///
/// let k1 = community_signature(&[&a, &b], "baden", SIM_VERSION, &w);
/// let k2 = community_signature(&[&b, &a], "baden", SIM_VERSION, &w);
/// assert_eq!(k1, k2);
/// assert_eq!(k1.len(), 64);
/// ```
pub fn community_signature(
    members: &[&Participant],
    scope: &str,
    sim_version: &str,
    window: &Window,
) -> String {
    let mut rows: Vec<_> = members
        .iter()
        .map(|p| {
            (
                p.id.as_str(),
                json!({
                    "id": p.id,
                    "annual_consumption_kwh": round3(p.annual_consumption_kwh),
                    "potential_pv_kwp": round3(p.potential_pv_kwp),
                    "archetype": p.archetype().as_str(),
                }),
            )
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    // serde_json maps are key-sorted, so the encoding is canonical.
    let payload = json!({
        "scope": scope,
        "sim_version": sim_version,
        "interval_minutes": INTERVAL_MINUTES,
        "num_intervals": window.num_intervals,
        "start": window.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "rows": rows.into_iter().map(|(_, row)| row).collect::<Vec<_>>(),
    });

    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn round3(v: f64) -> f64 {
    if v.is_finite() {
        (v * 1_000.0).round() / 1_000.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<Participant> {
        vec![
            Participant::new("c", 47.0, 8.0, Some("MFH"), 18_000.0, 25.0),
            Participant::new("a", 47.0, 8.0, Some("EFH"), 4_500.0, 6.0),
            Participant::new("b", 47.0, 8.0, None, 2_000.0, 0.0),
        ]
    }

    fn key(ps: &[&Participant]) -> String {
        community_signature(ps, "tenant-1", SIM_VERSION, &Window::full_year())
    }

    #[test]
    fn permutations_share_a_signature() {
        let m = members();
        let base = key(&[&m[0], &m[1], &m[2]]);
        assert_eq!(base, key(&[&m[2], &m[1], &m[0]]));
        assert_eq!(base, key(&[&m[1], &m[0], &m[2]]));
    }

    #[test]
    fn composition_changes_signature() {
        let m = members();
        let base = key(&[&m[0], &m[1], &m[2]]);
        assert_ne!(base, key(&[&m[0], &m[1]]));

        let mut bigger = m[1].clone();
        bigger.annual_consumption_kwh += 1.0;
        assert_ne!(base, key(&[&m[0], &bigger, &m[2]]));
    }

    #[test]
    fn sub_rounding_changes_are_ignored() {
        let m = members();
        let mut jitter = m[1].clone();
        jitter.annual_consumption_kwh += 1e-5;
        assert_eq!(key(&[&m[0], &m[1]]), key(&[&m[0], &jitter]));
    }

    #[test]
    fn archetype_alias_does_not_change_signature() {
        let a = Participant::new("a", 47.0, 8.0, Some("EFH"), 4_500.0, 6.0);
        let alias = Participant::new("a", 47.1, 8.1, Some(" sfh "), 4_500.0, 6.0);
        assert_eq!(key(&[&a]), key(&[&alias]));
    }

    #[test]
    fn scope_version_and_window_are_part_of_the_key() {
        let m = members();
        let refs = [&m[0], &m[1]];
        let w = Window::full_year();
        let base = community_signature(&refs, "tenant-1", SIM_VERSION, &w);
        assert_ne!(base, community_signature(&refs, "tenant-2", SIM_VERSION, &w));
        assert_ne!(base, community_signature(&refs, "tenant-1", "v3", &w));
        let week = Window::new(w.start, 96 * 7);
        assert_ne!(base, community_signature(&refs, "tenant-1", SIM_VERSION, &week));
    }
}
