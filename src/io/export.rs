//! CSV export of community rankings, labeled participants and billing.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::billing::BillingSummary;
use crate::community::{CommunityRanking, LabeledParticipant};

const RANKING_HEADER: &str = "rank,community_id,num_members,autarky_percent,\
                              total_consumption_mwh,total_production_mwh,\
                              grid_export_mwh,peak_import_kw,\
                              confidence_percent,profile_data_mix,cache_hit,members";

const LABELED_HEADER: &str = "id,lat,lon,building_category,annual_consumption_kwh,\
                              potential_pv_kwp,cluster";

const BILLING_HEADER: &str = "member_id,consumption_kwh,allocated_kwh,self_supply_ratio,\
                              internal_cost_chf,network_discount_chf";

fn header(spec: &str) -> impl Iterator<Item = &str> {
    spec.split(',').map(str::trim)
}

fn create(path: &Path) -> io::Result<io::BufWriter<File>> {
    Ok(io::BufWriter::new(File::create(path)?))
}

/// Exports ranked communities to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_ranking_csv(ranked: &[CommunityRanking], path: &Path) -> io::Result<()> {
    write_ranking_csv(ranked, create(path)?)
}

/// Writes ranked communities as CSV, one row per community in rank order.
///
/// Member ids are joined with `;` in the last column.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_ranking_csv(ranked: &[CommunityRanking], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(header(RANKING_HEADER))?;

    for (rank, c) in ranked.iter().enumerate() {
        let members: Vec<&str> = c.member_ids().collect();
        wtr.write_record(&[
            (rank + 1).to_string(),
            c.community_id.to_string(),
            c.num_members.to_string(),
            format!("{:.1}", c.autarky_percent),
            format!("{:.3}", c.total_consumption_mwh),
            format!("{:.3}", c.total_production_mwh),
            format!("{:.3}", c.grid_export_mwh),
            format!("{:.2}", c.peak_import_kw),
            format!("{:.1}", c.confidence_percent),
            c.profile_data_mix.to_string(),
            c.cache_hit.to_string(),
            members.join(";"),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports participants with their cluster label (`-1` for noise).
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_labeled_csv(labeled: &[LabeledParticipant], path: &Path) -> io::Result<()> {
    write_labeled_csv(labeled, create(path)?)
}

/// Writes participants with their cluster label as CSV.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_labeled_csv(labeled: &[LabeledParticipant], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(header(LABELED_HEADER))?;

    for l in labeled {
        let p = &l.participant;
        wtr.write_record(&[
            p.id.clone(),
            format!("{:.6}", p.lat),
            format!("{:.6}", p.lon),
            p.building_category.clone().unwrap_or_default(),
            format!("{:.1}", p.annual_consumption_kwh),
            format!("{:.2}", p.potential_pv_kwp),
            l.cluster.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports per-member billing figures to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_billing_csv(summary: &BillingSummary, path: &Path) -> io::Result<()> {
    write_billing_csv(summary, create(path)?)
}

/// Writes per-member billing figures as CSV.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_billing_csv(summary: &BillingSummary, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(header(BILLING_HEADER))?;

    for m in &summary.members {
        wtr.write_record(&[
            m.member_id.clone(),
            format!("{:.2}", m.consumption_kwh),
            format!("{:.2}", m.allocated_kwh),
            format!("{:.4}", m.self_supply_ratio),
            format!("{:.2}", m.internal_cost_chf),
            format!("{:.2}", m.network_discount_chf),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
