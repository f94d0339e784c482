//! Reader for billing-period input tables.
//!
//! The wide layout has one row per interval: an optional interval or
//! timestamp column, one production column and one column per member.
//!
//! ```text
//! interval,production_kwh,house_a,house_b
//! 0,10.0,3.0,8.0
//! 1,5.0,3.0,0.0
//! ```

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::billing::ConsumptionTable;
use crate::error::{DataError, DataResult};
use crate::io::meter_csv::parse_decimal;

/// Production per interval plus member consumption for one period.
#[derive(Debug, Clone, Default)]
pub struct BillingInput {
    pub production_kwh: Vec<f64>,
    pub consumption: ConsumptionTable,
}

/// Index columns are matched on the whole header name, so members such as
/// `Zeitler` or `Candidate` stay members.
fn is_index_column(name: &str) -> bool {
    let n = name.trim().to_lowercase();
    matches!(
        n.as_str(),
        "interval" | "timestamp" | "zeitstempel" | "zeit" | "uhrzeit" | "datum" | "date" | "time"
    )
}

fn is_production_column(name: &str) -> bool {
    let n = name.to_lowercase();
    n.contains("production") || n.contains("produktion")
}

/// Loads a billing input table from `path`.
///
/// # Errors
///
/// See [`read_billing_input`].
pub fn load_billing_input(path: &Path) -> DataResult<BillingInput> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    read_billing_input(&mut reader)
}

/// Reads a billing input table.
///
/// # Errors
///
/// Returns a `DataError` when no production column exists, no member
/// column exists, a member header repeats, or a cell is not a number. Negative values are kept as
/// given; the allocator treats them as zero.
pub fn read_billing_input<R: Read>(reader: &mut csv::Reader<R>) -> DataResult<BillingInput> {
    let headers = reader.headers()?.clone();
    let production_col = headers
        .iter()
        .position(is_production_column)
        .ok_or_else(|| DataError::Invalid("billing input needs a production column".into()))?;
    let member_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|&(i, h)| i != production_col && !is_index_column(h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();
    if member_cols.is_empty() {
        return Err(DataError::Invalid("billing input has no member columns".into()));
    }
    let mut seen = HashSet::new();
    if let Some((_, id)) = member_cols.iter().find(|(_, id)| !seen.insert(id.as_str())) {
        return Err(DataError::Invalid(format!("member column `{id}` appears twice")));
    }

    let mut production = Vec::new();
    let mut members: Vec<Vec<f64>> = vec![Vec::new(); member_cols.len()];
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let value = |col: usize| -> DataResult<f64> {
            let raw = record.get(col).unwrap_or_default();
            parse_decimal(raw).map_err(|message| DataError::InvalidRecord { line, message })
        };
        production.push(value(production_col)?);
        for (series, (col, _)) in members.iter_mut().zip(&member_cols) {
            series.push(value(*col)?);
        }
    }

    let consumption = member_cols
        .into_iter()
        .map(|(_, id)| id)
        .zip(members)
        .collect();
    Ok(BillingInput {
        production_kwh: production,
        consumption,
    })
}
