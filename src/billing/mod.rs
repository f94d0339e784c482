//! Energy allocation among confirmed community members and period billing.

pub mod allocation;
pub mod summary;

pub use allocation::{
    Allocation, AllocationPolicy, ConsumptionTable, NetworkLevel, allocate_energy,
    compute_network_discount,
};
pub use summary::{BillingParams, BillingSummary, MemberBilling, billing_summary};
