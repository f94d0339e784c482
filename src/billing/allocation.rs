//! Per-interval allocation of community production to members.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Leftover production below this many kWh is not redistributed.
const REDISTRIBUTION_EPSILON_KWH: f64 = 1e-9;

/// Grid-fee discount rate when producer and consumer share a network level.
pub const DISCOUNT_SAME_LEVEL: f64 = 0.40;

/// Grid-fee discount rate across network levels.
pub const DISCOUNT_CROSS_LEVEL: f64 = 0.20;

/// How production is split among members within one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// By each member's share of total consumption.
    #[default]
    Proportional,
    /// Equal split capped at consumption, leftover by unmet need.
    EqualCapped,
}

impl FromStr for AllocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proportional" => Ok(Self::Proportional),
            "equal_capped" | "equal-capped" | "equal" | "einfach" => Ok(Self::EqualCapped),
            other => Err(format!("unknown allocation policy `{other}`")),
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Proportional => "proportional",
            Self::EqualCapped => "equal_capped",
        })
    }
}

/// Network level relation between producers and consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkLevel {
    #[default]
    Same,
    Cross,
}

impl NetworkLevel {
    pub fn discount_rate(&self) -> f64 {
        match self {
            Self::Same => DISCOUNT_SAME_LEVEL,
            Self::Cross => DISCOUNT_CROSS_LEVEL,
        }
    }
}

impl FromStr for NetworkLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "same" => Ok(Self::Same),
            "cross" => Ok(Self::Cross),
            other => Err(format!("unknown network level `{other}`")),
        }
    }
}

impl fmt::Display for NetworkLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Same => "same",
            Self::Cross => "cross",
        })
    }
}

/// Grid-fee discount earned on locally allocated energy, in CHF.
///
/// # Examples
///
/// ```
/// use community_sim::billing::allocation::{compute_network_discount, NetworkLevel};
///
/// assert!((compute_network_discount(100.0, 0.10, NetworkLevel::Same) - 4.0).abs() < 1e-12);
/// assert!((compute_network_discount(100.0, 0.10, NetworkLevel::Cross) - 2.0).abs() < 1e-12);
/// assert_eq!(compute_network_discount(0.0, 0.10, NetworkLevel::Same), 0.0);
/// ```
pub fn compute_network_discount(
    allocated_kwh: f64,
    grid_fee_per_kwh: f64,
    level: NetworkLevel,
) -> f64 {
    if allocated_kwh <= 0.0 {
        return 0.0;
    }
    allocated_kwh * grid_fee_per_kwh * level.discount_rate()
}

/// Interval consumption (kWh) of each member, keyed by member id.
///
/// Members keep insertion order; inserting an existing id replaces its series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumptionTable {
    members: Vec<(String, Vec<f64>)>,
}

impl ConsumptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, member_id: impl Into<String>, consumption_kwh: Vec<f64>) {
        let member_id = member_id.into();
        match self.members.iter_mut().find(|(id, _)| *id == member_id) {
            Some((_, series)) => *series = consumption_kwh,
            None => self.members.push((member_id, consumption_kwh)),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(id, _)| id.as_str())
    }

    pub fn series(&self, member_id: &str) -> Option<&[f64]> {
        self.members
            .iter()
            .find(|(id, _)| id == member_id)
            .map(|(_, s)| s.as_slice())
    }

    /// Consumption of every member in `interval`; missing or negative values are zero.
    fn interval(&self, interval: usize) -> Vec<f64> {
        self.members
            .iter()
            .map(|(_, s)| s.get(interval).copied().map_or(0.0, clean_kwh))
            .collect()
    }

    /// Consumption of the `member`-th member over the first `intervals` intervals.
    pub(crate) fn total_kwh(&self, member: usize, intervals: usize) -> f64 {
        self.members[member].1.iter().take(intervals).copied().map(clean_kwh).sum()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<f64>)> for ConsumptionTable {
    fn from_iter<I: IntoIterator<Item = (S, Vec<f64>)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (id, series) in iter {
            table.insert(id, series);
        }
        table
    }
}

fn clean_kwh(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

/// Allocation of one interval's production among its consumers.
///
/// Returns the per-member allocation (same order as `consumption`) and the
/// unallocated surplus. Every share is at most the member's consumption and
/// the shares never sum to more than `production`.
pub fn allocate_interval(
    production: f64,
    consumption: &[f64],
    policy: AllocationPolicy,
) -> (Vec<f64>, f64) {
    let production = clean_kwh(production);
    let consumption: Vec<f64> = consumption.iter().copied().map(clean_kwh).collect();
    let total: f64 = consumption.iter().sum();

    if production <= 0.0 || total <= 0.0 {
        return (vec![0.0; consumption.len()], production);
    }

    let shares = match policy {
        AllocationPolicy::Proportional => {
            let available = production.min(total);
            consumption
                .iter()
                .map(|&c| (c / total * available).min(c))
                .collect::<Vec<_>>()
        }
        AllocationPolicy::EqualCapped => {
            let equal_share = production / consumption.len() as f64;
            let mut shares: Vec<f64> = consumption.iter().map(|&c| c.min(equal_share)).collect();
            let leftover = production - shares.iter().sum::<f64>();
            if leftover > REDISTRIBUTION_EPSILON_KWH {
                let unmet: Vec<f64> = consumption
                    .iter()
                    .zip(&shares)
                    .map(|(&c, &s)| (c - s).max(0.0))
                    .collect();
                let unmet_total: f64 = unmet.iter().sum();
                if unmet_total > 0.0 {
                    for (share, need) in shares.iter_mut().zip(&unmet) {
                        *share += (need / unmet_total * leftover).min(*need);
                    }
                }
            }
            shares
        }
    };

    let allocated: f64 = shares.iter().sum();
    debug_assert!(shares.iter().zip(&consumption).all(|(s, c)| *s <= *c + 1e-9));
    debug_assert!(allocated <= production + 1e-9);
    (shares, (production - allocated).max(0.0))
}

/// Allocation over a whole period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub policy: AllocationPolicy,
    pub member_ids: Vec<String>,
    /// `allocated_kwh[member][interval]`, members in table order.
    pub allocated_kwh: Vec<Vec<f64>>,
    /// Production left over in each interval.
    pub surplus_kwh: Vec<f64>,
}

impl Allocation {
    pub fn num_intervals(&self) -> usize {
        self.surplus_kwh.len()
    }

    /// Total energy allocated to one member.
    pub fn member_total(&self, member_id: &str) -> Option<f64> {
        self.member_ids
            .iter()
            .position(|id| id == member_id)
            .map(|i| self.allocated_kwh[i].iter().sum())
    }

    pub fn total_allocated_kwh(&self) -> f64 {
        self.allocated_kwh.iter().flatten().sum()
    }

    pub fn total_surplus_kwh(&self) -> f64 {
        self.surplus_kwh.iter().sum()
    }
}

/// Splits interval production among the members of `table`.
///
/// # Arguments
///
/// * `production_kwh` - Produced energy per interval; its length sets the period
/// * `table` - Member consumption per interval; short series count as zero
/// * `policy` - Allocation policy applied in every interval
pub fn allocate_energy(
    production_kwh: &[f64],
    table: &ConsumptionTable,
    policy: AllocationPolicy,
) -> Allocation {
    let mut allocated_kwh = vec![Vec::with_capacity(production_kwh.len()); table.len()];
    let mut surplus_kwh = Vec::with_capacity(production_kwh.len());

    for (i, &production) in production_kwh.iter().enumerate() {
        let (shares, surplus) = allocate_interval(production, &table.interval(i), policy);
        for (member, share) in allocated_kwh.iter_mut().zip(shares) {
            member.push(share);
        }
        surplus_kwh.push(surplus);
    }

    Allocation {
        policy,
        member_ids: table.member_ids().map(str::to_string).collect(),
        allocated_kwh,
        surplus_kwh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn proportional_exact_supply() {
        let (s, surplus) = allocate_interval(10.0, &[6.0, 4.0], AllocationPolicy::Proportional);
        approx(&s, &[6.0, 4.0]);
        assert_eq!(surplus, 0.0);
    }

    #[test]
    fn proportional_oversupply_caps_at_consumption() {
        let (s, surplus) = allocate_interval(20.0, &[6.0, 4.0], AllocationPolicy::Proportional);
        approx(&s, &[6.0, 4.0]);
        assert!((surplus - 10.0).abs() < 1e-9);
    }

    #[test]
    fn proportional_undersupply_splits_by_share() {
        let (s, _) = allocate_interval(5.0, &[6.0, 4.0], AllocationPolicy::Proportional);
        approx(&s, &[3.0, 2.0]);
    }

    #[test]
    fn equal_capped_redistributes_leftover() {
        let (s, surplus) = allocate_interval(10.0, &[3.0, 8.0], AllocationPolicy::EqualCapped);
        approx(&s, &[3.0, 7.0]);
        assert!(surplus.abs() < 1e-9);
    }

    #[test]
    fn equal_capped_reports_surplus_when_everyone_is_full() {
        let (s, surplus) = allocate_interval(10.0, &[1.0, 2.0], AllocationPolicy::EqualCapped);
        approx(&s, &[1.0, 2.0]);
        assert!((surplus - 7.0).abs() < 1e-9);
    }

    #[test]
    fn equal_capped_three_members_partial() {
        // Equal share 4: a gets 1, b and c 4 each; leftover 3 split by unmet need 2:6.
        let (s, surplus) =
            allocate_interval(12.0, &[1.0, 6.0, 10.0], AllocationPolicy::EqualCapped);
        approx(&s, &[1.0, 4.75, 6.25]);
        assert!(surplus.abs() < 1e-9);
    }

    #[test]
    fn zero_production_or_consumption_allocates_nothing() {
        for policy in [AllocationPolicy::Proportional, AllocationPolicy::EqualCapped] {
            let (s, surplus) = allocate_interval(0.0, &[1.0, 2.0], policy);
            approx(&s, &[0.0, 0.0]);
            assert_eq!(surplus, 0.0);

            let (s, surplus) = allocate_interval(5.0, &[0.0, 0.0], policy);
            approx(&s, &[0.0, 0.0]);
            assert_eq!(surplus, 5.0);
        }
    }

    #[test]
    fn negative_inputs_are_clamped() {
        let (s, _) = allocate_interval(4.0, &[-3.0, 2.0], AllocationPolicy::Proportional);
        approx(&s, &[0.0, 2.0]);
        let (s, surplus) = allocate_interval(-1.0, &[1.0], AllocationPolicy::EqualCapped);
        approx(&s, &[0.0]);
        assert_eq!(surplus, 0.0);
    }

    #[test]
    fn allocate_energy_over_period() {
        let table: ConsumptionTable = [("a", vec![6.0, 1.0, 2.0]), ("b", vec![4.0, 1.0])]
            .into_iter()
            .collect();
        let a = allocate_energy(&[10.0, 1.0, 5.0], &table, AllocationPolicy::Proportional);
        assert_eq!(a.num_intervals(), 3);
        approx(&a.allocated_kwh[0], &[6.0, 0.5, 2.0]);
        approx(&a.allocated_kwh[1], &[4.0, 0.5, 0.0]);
        approx(&a.surplus_kwh, &[0.0, 0.0, 3.0]);
        assert!((a.member_total("a").unwrap() - 8.5).abs() < 1e-9);
        assert_eq!(a.member_total("zz"), None);
        assert!((a.total_allocated_kwh() + a.total_surplus_kwh() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn table_insert_replaces_by_id() {
        let mut table = ConsumptionTable::new();
        table.insert("a", vec![1.0]);
        table.insert("b", vec![2.0]);
        table.insert("a", vec![3.0]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.series("a"), Some(&[3.0][..]));
        assert_eq!(table.member_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn parse_policy_and_level() {
        assert_eq!("equal-capped".parse(), Ok(AllocationPolicy::EqualCapped));
        assert_eq!("Proportional".parse(), Ok(AllocationPolicy::Proportional));
        assert!("random".parse::<AllocationPolicy>().is_err());
        assert_eq!("cross".parse(), Ok(NetworkLevel::Cross));
        assert_eq!(NetworkLevel::Same.discount_rate(), 0.40);
    }
}
