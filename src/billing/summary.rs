//! Period billing summary built on top of an allocation.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::allocation::{
    AllocationPolicy, ConsumptionTable, NetworkLevel, allocate_energy, compute_network_discount,
};

/// Tariff inputs of a billing period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillingParams {
    /// Grid usage fee in CHF per kWh.
    pub grid_fee_per_kwh: f64,
    /// Internal community price in CHF per kWh.
    pub internal_price_per_kwh: f64,
    pub network_level: NetworkLevel,
    pub policy: AllocationPolicy,
}

/// Period figures of one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberBilling {
    pub member_id: String,
    pub consumption_kwh: f64,
    pub allocated_kwh: f64,
    /// Allocated over consumed energy, 0 when nothing was consumed.
    pub self_supply_ratio: f64,
    pub internal_cost_chf: f64,
    pub network_discount_chf: f64,
}

/// Period totals and per-member figures. Energy and CHF values are
/// rounded to 2 decimals, ratios to 4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub policy: AllocationPolicy,
    pub network_level: NetworkLevel,
    pub num_intervals: usize,
    pub total_production_kwh: f64,
    pub total_consumption_kwh: f64,
    pub total_allocated_kwh: f64,
    /// Production no member could absorb.
    pub total_surplus_kwh: f64,
    pub total_internal_revenue_chf: f64,
    pub total_network_discount_chf: f64,
    pub members: Vec<MemberBilling>,
}

/// Allocates production over a period and prices the result.
///
/// # Arguments
///
/// * `production_kwh` - Produced energy per interval
/// * `consumption` - Member consumption per interval
/// * `params` - Tariffs, network level and allocation policy
///
/// # Returns
///
/// A [`BillingSummary`]; surplus is reported explicitly rather than
/// assumed to net to zero.
pub fn billing_summary(
    production_kwh: &[f64],
    consumption: &ConsumptionTable,
    params: &BillingParams,
) -> BillingSummary {
    let allocation = allocate_energy(production_kwh, consumption, params.policy);
    let intervals = allocation.num_intervals();

    let members: Vec<MemberBilling> = allocation
        .member_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let allocated: f64 = allocation.allocated_kwh[i].iter().sum();
            let consumed = consumption.total_kwh(i, intervals);
            let ratio = if consumed > 0.0 { allocated / consumed } else { 0.0 };
            MemberBilling {
                member_id: id.clone(),
                consumption_kwh: round2(consumed),
                allocated_kwh: round2(allocated),
                self_supply_ratio: round4(ratio),
                internal_cost_chf: round2(allocated * params.internal_price_per_kwh),
                network_discount_chf: round2(compute_network_discount(
                    allocated,
                    params.grid_fee_per_kwh,
                    params.network_level,
                )),
            }
        })
        .collect();

    let total_production: f64 = production_kwh
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0))
        .sum();
    let total_allocated = allocation.total_allocated_kwh();
    let total_consumption: f64 = (0..consumption.len())
        .map(|i| consumption.total_kwh(i, intervals))
        .sum();

    BillingSummary {
        policy: params.policy,
        network_level: params.network_level,
        num_intervals: intervals,
        total_production_kwh: round2(total_production),
        total_consumption_kwh: round2(total_consumption),
        total_allocated_kwh: round2(total_allocated),
        total_surplus_kwh: round2((total_production - total_allocated).max(0.0)),
        total_internal_revenue_chf: round2(total_allocated * params.internal_price_per_kwh),
        total_network_discount_chf: round2(compute_network_discount(
            total_allocated,
            params.grid_fee_per_kwh,
            params.network_level,
        )),
        members,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

impl fmt::Display for BillingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Billing Summary ({}, {} level) ---", self.policy, self.network_level)?;
        writeln!(f, "Production:      {:.2} kWh", self.total_production_kwh)?;
        writeln!(f, "Consumption:     {:.2} kWh", self.total_consumption_kwh)?;
        writeln!(f, "Allocated:       {:.2} kWh", self.total_allocated_kwh)?;
        writeln!(f, "Surplus:         {:.2} kWh", self.total_surplus_kwh)?;
        writeln!(f, "Internal revenue {:.2} CHF", self.total_internal_revenue_chf)?;
        writeln!(f, "Grid discount    {:.2} CHF", self.total_network_discount_chf)?;
        for m in &self.members {
            writeln!(
                f,
                "  {:<12} cons={:>10.2} alloc={:>10.2} self={:>6.1}% cost={:>8.2} disc={:>8.2}",
                m.member_id,
                m.consumption_kwh,
                m.allocated_kwh,
                m.self_supply_ratio * 100.0,
                m.internal_cost_chf,
                m.network_discount_chf
            )?;
        }
        Ok(())
    }
}
