//! Density-based spatial clustering on great-circle distance.
//!
//! A participant is a *core* point when at least `min_size` participants,
//! itself included, lie within `radius_m` of it. Clusters are grown from
//! core points in input order; non-core points reached by a cluster join
//! the first cluster that reaches them, and everything else is noise.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::participant::{EARTH_RADIUS_M, Participant};

/// Label of participants that belong to no cluster.
pub const NOISE: i32 = -1;

/// Cluster label of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub id: String,
    pub label: i32,
}

/// Labels for every participant of one clustering run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clustering {
    pub assignments: Vec<ClusterAssignment>,
}

impl Clustering {
    fn all_noise(participants: &[Participant]) -> Self {
        Self {
            assignments: participants
                .iter()
                .map(|p| ClusterAssignment {
                    id: p.id.clone(),
                    label: NOISE,
                })
                .collect(),
        }
    }

    /// Number of distinct non-noise labels.
    pub fn num_clusters(&self) -> usize {
        self.groups().len()
    }

    pub fn noise_count(&self) -> usize {
        self.assignments.iter().filter(|a| a.label == NOISE).count()
    }

    /// Member ids per non-noise label, labels ascending, ids in input order.
    pub fn groups(&self) -> BTreeMap<i32, Vec<&str>> {
        let mut groups: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        for a in self.assignments.iter().filter(|a| a.label != NOISE) {
            groups.entry(a.label).or_default().push(&a.id);
        }
        groups
    }
}

/// Great-circle distance between two coordinates, in meters.
///
/// # Examples
///
/// ```
/// use community_sim::cluster::haversine_m;
///
/// // One degree of latitude is about 111.2 km.
/// let d = haversine_m(47.0, 8.0, 48.0, 8.0);
/// assert!((d - 111_195.0).abs() < 10.0);
/// ```
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    angular_distance(
        (lat1.to_radians(), lon1.to_radians()),
        (lat2.to_radians(), lon2.to_radians()),
    ) * EARTH_RADIUS_M
}

fn angular_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dlat = b.0 - a.0;
    let dlon = b.1 - a.1;
    let h = (dlat / 2.0).sin().powi(2) + a.0.cos() * b.0.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().clamp(0.0, 1.0).asin()
}

/// Clusters participants by proximity.
///
/// # Arguments
///
/// * `participants` - Points to cluster; labels follow this order
/// * `radius_m` - Neighbourhood radius in meters
/// * `min_size` - Minimum neighbourhood size (self included) of a core point
///
/// # Returns
///
/// A [`Clustering`] with labels `0..k` in discovery order and [`NOISE`] for
/// the rest. Fewer participants than `min_size` yields all noise.
pub fn cluster_participants(
    participants: &[Participant],
    radius_m: f64,
    min_size: usize,
) -> Clustering {
    let n = participants.len();
    if n == 0 || n < min_size || radius_m.is_nan() || radius_m < 0.0 {
        return Clustering::all_noise(participants);
    }

    let eps = radius_m / EARTH_RADIUS_M;
    let coords: Vec<(f64, f64)> = participants
        .iter()
        .map(|p| (p.lat.to_radians(), p.lon.to_radians()))
        .collect();

    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| angular_distance(coords[i], coords[j]) <= eps)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= min_size).collect();

    let mut labels = vec![NOISE; n];
    let mut next_label = 0;
    let mut queue = VecDeque::new();

    for seed in 0..n {
        if labels[seed] != NOISE || !is_core[seed] {
            continue;
        }
        labels[seed] = next_label;
        queue.push_back(seed);
        while let Some(point) = queue.pop_front() {
            if !is_core[point] {
                continue;
            }
            for &nb in &neighbours[point] {
                if labels[nb] == NOISE {
                    labels[nb] = next_label;
                    queue.push_back(nb);
                }
            }
        }
        next_label += 1;
    }

    Clustering {
        assignments: participants
            .iter()
            .zip(labels)
            .map(|(p, label)| ClusterAssignment {
                id: p.id.clone(),
                label,
            })
            .collect(),
    }
}
