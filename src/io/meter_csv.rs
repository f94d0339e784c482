//! Import of smart-meter CSV exports from Swiss utilities.
//!
//! Exports differ in delimiter, header language, decimal style and
//! timestamp layout. The parser detects all four and reports bad lines
//! individually instead of failing the whole file.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::error::{DataError, DataResult};
use crate::profile::meter::MeterReading;
use crate::store::MemoryMeterStore;

const DELIMITERS: &[u8] = b";,\t";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M",
];

/// Readings parsed from one export plus per-line problems.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterImport {
    pub readings: Vec<MeterReading>,
    /// Human-readable messages, one per rejected line.
    pub errors: Vec<String>,
}

/// Column positions found in a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Columns {
    participant: Option<usize>,
    /// Full timestamp, or only the date when `time` is set.
    timestamp: usize,
    /// Separate time-of-day column (CKW style `Datum;Zeit`).
    time: Option<usize>,
    consumption: Option<usize>,
    production: Option<usize>,
    feed_in: Option<usize>,
}

impl Columns {
    /// Maps header cells to columns by keyword, German or English.
    ///
    /// A header named exactly `Zeit`, `Uhrzeit` or `Time` next to a date
    /// column is a split layout; its cells are joined with the date.
    fn detect(header: &[String]) -> Option<Self> {
        let mut participant = None;
        let mut stamp = None;
        let mut date = None;
        let mut time = None;
        let mut consumption = None;
        let mut production = None;
        let mut feed_in = None;

        for (i, cell) in header.iter().enumerate() {
            let h = cell.trim().to_lowercase();
            let has = |keys: &[&str]| keys.iter().any(|k| h.contains(k));
            if has(&["participant", "building_id", "teilnehmer"]) {
                participant = Some(i);
            } else if matches!(h.as_str(), "zeit" | "uhrzeit" | "time") {
                time = Some(i);
            } else if has(&["zeit", "timestamp"]) {
                stamp = Some(i);
            } else if has(&["datum", "date"]) {
                date = Some(i);
            } else if has(&["verbrauch", "consumption", "bezug"]) {
                consumption = Some(i);
            } else if has(&["produktion", "production", "erzeugung"]) {
                production = Some(i);
            } else if has(&["einspeisung", "feed-in", "feed_in", "rücklieferung"]) {
                feed_in = Some(i);
            }
        }

        if consumption.is_none() && production.is_none() {
            return None;
        }
        let (timestamp, time) = match (stamp, date) {
            (Some(stamp), _) => (stamp, None),
            (None, Some(date)) => (date, time),
            (None, None) => (time?, None),
        };
        Some(Self {
            participant,
            timestamp,
            time,
            consumption,
            production,
            feed_in,
        })
    }
}

/// Parses a timestamp in any of the layouts seen in utility exports.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parses a number written in European or Swiss notation.
///
/// Empty cells and `-` read as zero.
///
/// # Examples
///
/// ```
/// use community_sim::io::meter_csv::parse_decimal;
///
/// assert_eq!(parse_decimal("0,25"), Ok(0.25));
/// assert_eq!(parse_decimal("1.234,56"), Ok(1234.56));
/// assert_eq!(parse_decimal("1'234.5"), Ok(1234.5));
/// assert_eq!(parse_decimal("-"), Ok(0.0));
/// assert!(parse_decimal("n/a").is_err());
/// ```
pub fn parse_decimal(value: &str) -> Result<f64, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(0.0);
    }
    let mut cleaned: String = trimmed.chars().filter(|c| *c != '\'' && *c != ' ').collect();
    if cleaned.contains(',') && cleaned.contains('.') {
        cleaned = cleaned.replace('.', "").replace(',', ".");
    } else if cleaned.contains(',') {
        cleaned = cleaned.replace(',', ".");
    }
    cleaned
        .parse::<f64>()
        .map_err(|_| format!("invalid number `{trimmed}`"))
}

/// One CSV row with its 1-based line number in the file.
struct Row {
    line: u64,
    cells: Vec<String>,
}

fn read_rows(content: &str, delimiter: u8) -> Vec<Row> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
        .records()
        .filter_map(Result::ok)
        .map(|r| Row {
            line: r.position().map_or(0, |p| p.line()),
            cells: r.iter().map(str::to_string).collect(),
        })
        .collect()
}

/// Finds the first delimiter whose header row maps to known columns.
fn detect_layout(content: &str) -> Option<(u8, Columns, Vec<Row>)> {
    DELIMITERS.iter().find_map(|&delimiter| {
        let rows = read_rows(content, delimiter);
        let header = &rows.first()?.cells;
        if header.len() < 2 {
            return None;
        }
        let columns = Columns::detect(header)?;
        Some((delimiter, columns, rows))
    })
}

fn cell<'a>(row: &'a [String], idx: usize, name: &str) -> Result<&'a str, String> {
    row.get(idx)
        .map(String::as_str)
        .ok_or_else(|| format!("missing {name} column"))
}

fn optional_value(row: &[String], idx: Option<usize>, name: &str) -> Result<f64, String> {
    match idx {
        Some(i) => parse_decimal(cell(row, i, name)?),
        None => Ok(0.0),
    }
}

fn parse_row(row: &[String], columns: &Columns) -> Result<MeterReading, String> {
    let raw_ts = match columns.time {
        Some(time) => Cow::Owned(format!(
            "{} {}",
            cell(row, columns.timestamp, "date")?.trim(),
            cell(row, time, "time")?.trim()
        )),
        None => Cow::Borrowed(cell(row, columns.timestamp, "timestamp")?),
    };
    let timestamp =
        parse_timestamp(&raw_ts).ok_or_else(|| format!("invalid timestamp `{}`", raw_ts.trim()))?;
    Ok(MeterReading::new(
        timestamp,
        optional_value(row, columns.consumption, "consumption")?,
        optional_value(row, columns.production, "production")?,
        optional_value(row, columns.feed_in, "feed-in")?,
    ))
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

/// Parses a single-meter export.
///
/// Error messages carry the line number in the file. A file
/// without a recognisable header yields no readings and one error.
pub fn parse_meter_csv(content: &str) -> MeterImport {
    let Some((delimiter, columns, rows)) = detect_layout(content) else {
        return MeterImport {
            readings: Vec::new(),
            errors: vec!["no timestamp and consumption/production header found".to_string()],
        };
    };
    debug!(delimiter = %(delimiter as char), ?columns, "detected meter export layout");

    let mut import = MeterImport::default();
    for row in rows.iter().skip(1) {
        if is_blank(&row.cells) {
            continue;
        }
        match parse_row(&row.cells, &columns) {
            Ok(reading) => import.readings.push(reading),
            Err(e) => import.errors.push(format!("line {}: {e}", row.line)),
        }
    }
    if import.readings.is_empty() && import.errors.is_empty() {
        import.errors.push("file contains no readings".to_string());
    }
    import
}

/// Loads a long-form readings file into a [`MemoryMeterStore`].
///
/// Expected columns: a participant id column (`participant_id`) plus the
/// columns understood by [`parse_meter_csv`]. Bad lines are skipped and
/// returned as messages.
///
/// # Errors
///
/// Returns a `DataError` if the file cannot be read or has no participant
/// id or usable header.
pub fn load_meter_store(path: &Path) -> DataResult<(MemoryMeterStore, Vec<String>)> {
    let content = std::fs::read_to_string(path)?;
    let (_, columns, rows) = detect_layout(&content)
        .ok_or_else(|| DataError::Invalid("meter readings header not recognised".into()))?;
    let participant_col = columns
        .participant
        .ok_or_else(|| DataError::Invalid("meter readings need a participant_id column".into()))?;

    let mut grouped: HashMap<String, Vec<MeterReading>> = HashMap::new();
    let mut errors = Vec::new();
    for row in rows.iter().skip(1) {
        if is_blank(&row.cells) {
            continue;
        }
        let parsed = cell(&row.cells, participant_col, "participant")
            .map(|id| id.trim().to_string())
            .and_then(|id| parse_row(&row.cells, &columns).map(|r| (id, r)));
        match parsed {
            Ok((id, reading)) if !id.is_empty() => grouped.entry(id).or_default().push(reading),
            Ok(_) => errors.push(format!("line {}: empty participant id", row.line)),
            Err(e) => errors.push(format!("line {}: {e}", row.line)),
        }
    }

    let mut store = MemoryMeterStore::new();
    let rows_loaded: usize = grouped.values().map(Vec::len).sum();
    for (id, readings) in grouped {
        store.insert(id, readings);
    }
    info!(
        participants = store.participant_count(),
        rows = rows_loaded,
        rejected = errors.len(),
        "loaded meter readings"
    );
    Ok((store, errors))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::store::MeterStore;

    #[test]
    fn parses_semicolon_export_with_european_decimals() {
        let csv = "Zeitstempel;Verbrauch (kWh);Produktion (kWh);Einspeisung (kWh)\n\
                   01.01.2025 00:00;0,25;0;0\n\
                   01.01.2025 00:15;1.234,5;0,1;-\n";
        let import = parse_meter_csv(csv);
        assert!(import.errors.is_empty(), "{:?}", import.errors);
        assert_eq!(import.readings.len(), 2);
        assert_eq!(import.readings[0].consumption_kwh, 0.25);
        assert_eq!(import.readings[1].consumption_kwh, 1234.5);
        assert_eq!(import.readings[1].production_kwh, 0.1);
        assert_eq!(import.readings[1].feed_in_kwh, 0.0);
        assert_eq!(import.readings[1].timestamp.to_string(), "2025-01-01 00:15:00");
    }

    #[test]
    fn parses_comma_export_with_english_headers() {
        let csv = "Timestamp,Consumption (kWh),Feed-in (kWh)\n\
                   2025-01-01T00:00:00,0.5,0.0\n\
                   2025-01-01 00:15,0.4,0.1\n";
        let import = parse_meter_csv(csv);
        assert_eq!(import.readings.len(), 2);
        assert_eq!(import.readings[1].feed_in_kwh, 0.1);
        assert_eq!(import.readings[1].production_kwh, 0.0);
    }

    #[test]
    fn parses_tab_export_with_slash_dates() {
        let csv = "Datum\tBezug\n01/02/2025 12:00\t0,3\n";
        let import = parse_meter_csv(csv);
        assert_eq!(import.readings.len(), 1);
        assert_eq!(import.readings[0].timestamp.to_string(), "2025-02-01 12:00:00");
    }

    #[test]
    fn joins_separate_date_and_time_columns() {
        let csv = "Datum;Zeit;Bezug;Rücklieferung\n\
                   01.01.2025;00:15;0,25;0\n\
                   01.01.2025;00:30:00;0,5;0,1\n\
                   01.01.2025;;0,5;0\n";
        let import = parse_meter_csv(csv);
        assert_eq!(import.readings.len(), 2, "{:?}", import.errors);
        assert_eq!(import.readings[0].timestamp.to_string(), "2025-01-01 00:15:00");
        assert_eq!(import.readings[0].consumption_kwh, 0.25);
        assert_eq!(import.readings[1].timestamp.to_string(), "2025-01-01 00:30:00");
        assert_eq!(import.readings[1].feed_in_kwh, 0.1);
        assert_eq!(import.errors, vec!["line 4: invalid timestamp `01.01.2025`"]);
    }

    #[test]
    fn combined_timestamp_column_wins_over_date() {
        let csv = "Datum;Zeitstempel;Verbrauch\n\
                   Montag;01.01.2025 00:15;0,25\n";
        let import = parse_meter_csv(csv);
        assert!(import.errors.is_empty(), "{:?}", import.errors);
        assert_eq!(import.readings[0].timestamp.to_string(), "2025-01-01 00:15:00");
    }

    #[test]
    fn bad_lines_are_reported_not_fatal() {
        let csv = "Zeitstempel;Verbrauch\n\
                   01.01.2025 00:00;0,25\n\
                   gestern;0,25\n\
                   \n\
                   01.01.2025 00:30;viel\n\
                   01.01.2025 00:45\n\
                   01.01.2025 01:00;0,1\n";
        let import = parse_meter_csv(csv);
        assert_eq!(import.readings.len(), 2);
        assert_eq!(import.errors.len(), 3);
        assert!(import.errors[0].starts_with("line 3:"));
        assert!(import.errors[1].starts_with("line 5:"));
        assert!(import.errors[2].starts_with("line 6:"));
        assert!(import.errors[2].contains("missing consumption"));
    }

    #[test]
    fn unrecognised_header_is_one_error() {
        let import = parse_meter_csv("foo;bar\n1;2\n");
        assert!(import.readings.is_empty());
        assert_eq!(import.errors.len(), 1);
    }

    #[test]
    fn loads_long_form_store() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "participant_id,timestamp,consumption_kwh,production_kwh,feed_in_kwh\n\
             a,2025-01-01 00:00:00,0.25,0,0\n\
             a,2025-01-01 00:15:00,0.25,0,0\n\
             b,2025-01-01 00:00:00,1.0,0.5,0\n\
             ,2025-01-01 00:00:00,1.0,0.5,0\n"
        )
        .expect("write");
        let (store, errors) = load_meter_store(file.path()).expect("store");
        assert_eq!(store.participant_count(), 2);
        assert_eq!(errors.len(), 1);
        let start = parse_timestamp("2025-01-01 00:00").expect("ts");
        let end = parse_timestamp("2025-01-01 23:45").expect("ts");
        assert_eq!(store.meter_rows("a", start, end).map(|r| r.len()).ok(), Some(2));
    }

    #[test]
    fn long_form_requires_participant_column() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "timestamp,consumption_kwh\n2025-01-01 00:00,1\n").expect("write");
        assert!(load_meter_store(file.path()).is_err());
    }
}
