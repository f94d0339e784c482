//! File import and export.

pub mod billing_input;
pub mod export;
pub mod meter_csv;
