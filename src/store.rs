//! Storage collaborator for metered interval rows.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::error::StoreError;
use crate::profile::meter::MeterReading;

/// Read access to stored meter rows.
///
/// Implementations may fail; the profile resolver treats any error as
/// "no usable meter data" and falls back to a synthetic profile.
pub trait MeterStore: Send + Sync {
    /// Returns the rows of `participant_id` with `start <= timestamp <= end`.
    fn meter_rows(
        &self,
        participant_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MeterReading>, StoreError>;
}

/// A store with no meter data at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMeterData;

impl MeterStore for NoMeterData {
    fn meter_rows(
        &self,
        _participant_id: &str,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> Result<Vec<MeterReading>, StoreError> {
        Ok(Vec::new())
    }
}

/// In-memory meter rows keyed by participant id.
#[derive(Debug, Default, Clone)]
pub struct MemoryMeterStore {
    rows: HashMap<String, Vec<MeterReading>>,
}

impl MemoryMeterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows for one participant.
    pub fn insert(&mut self, participant_id: impl Into<String>, readings: Vec<MeterReading>) {
        self.rows
            .entry(participant_id.into())
            .or_default()
            .extend(readings);
    }

    /// Number of participants with at least one row.
    pub fn participant_count(&self) -> usize {
        self.rows.len()
    }
}

impl MeterStore for MemoryMeterStore {
    /// Fails with [`StoreError::MalformedRow`] when a row in range carries a
    /// non-finite value.
    fn meter_rows(
        &self,
        participant_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MeterReading>, StoreError> {
        let Some(rows) = self.rows.get(participant_id) else {
            return Ok(Vec::new());
        };
        rows.iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .map(|r| {
                if [r.consumption_kwh, r.production_kwh, r.feed_in_kwh]
                    .iter()
                    .all(|v| v.is_finite())
                {
                    Ok(r.clone())
                } else {
                    Err(StoreError::MalformedRow {
                        participant_id: participant_id.to_string(),
                        reason: format!("non-finite value at {}", r.timestamp),
                    })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::series::Window;

    #[test]
    fn memory_store_filters_by_window() {
        let w = Window::one_day(Window::default_start());
        let mut store = MemoryMeterStore::new();
        store.insert(
            "b1",
            vec![
                MeterReading::new(w.timestamp(0), 0.1, 0.0, 0.0),
                MeterReading::new(w.timestamp(95), 0.1, 0.0, 0.0),
                MeterReading::new(w.timestamp(96), 0.1, 0.0, 0.0),
            ],
        );
        let rows = store.meter_rows("b1", w.start, w.end()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(store.meter_rows("missing", w.start, w.end()).unwrap().is_empty());
        assert_eq!(store.participant_count(), 1);
    }

    #[test]
    fn non_finite_row_is_malformed() {
        let w = Window::one_day(Window::default_start());
        let mut store = MemoryMeterStore::new();
        store.insert(
            "b1",
            vec![
                MeterReading::new(w.timestamp(0), 0.1, 0.0, 0.0),
                MeterReading::new(w.timestamp(1), f64::NAN, 0.0, 0.0),
                MeterReading::new(w.timestamp(200), f64::INFINITY, 0.0, 0.0),
            ],
        );
        let err = store.meter_rows("b1", w.start, w.end()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MalformedRow { ref participant_id, .. } if participant_id == "b1"
        ));
        // Bad rows outside the requested range do not matter.
        assert_eq!(store.meter_rows("b1", w.start, w.start).unwrap().len(), 1);
    }
}
