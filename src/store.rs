use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePlateStore;

/// The best plate reading known for one vehicle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlateRecord {
    pub car_id: i64,
    pub license_number: String,
    pub score: f32,
    pub timestamp: DateTime<Utc>,
    pub video_source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// first reading for this vehicle
    Inserted,
    /// reading replaced a lower-scored one
    Updated,
    /// stored reading scored at least as high
    Kept,
    /// invalid car id, empty text or non-finite score, nothing written
    Rejected,
}

/// Keeps the highest-scored reading per vehicle.
///
/// Shared by every concurrent run: implementations make the read-compare-write of
/// `upsert` atomic per `car_id`.
pub trait PlateStore: Send + Sync {
    /// Inserts the reading, or overwrites plate text, score and timestamp when `score`
    /// strictly beats the stored one. `video_source` is only written on insert.
    fn upsert(
        &self,
        car_id: i64,
        license_number: &str,
        score: f32,
        video_source: &str,
    ) -> Result<UpsertOutcome, Error>;

    /// All records, most recent first.
    fn list(&self) -> Result<Vec<PlateRecord>, Error>;
}

#[inline]
pub(crate) fn is_valid_reading(car_id: i64, license_number: &str, score: f32) -> bool {
    car_id > 0 && !license_number.is_empty() && score.is_finite()
}

#[derive(Debug, Default)]
pub struct MemoryPlateStore {
    records: Mutex<HashMap<i64, PlateRecord>>,
}

impl MemoryPlateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, car_id: i64) -> Option<PlateRecord> {
        self.records.lock().get(&car_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl PlateStore for MemoryPlateStore {
    fn upsert(
        &self,
        car_id: i64,
        license_number: &str,
        score: f32,
        video_source: &str,
    ) -> Result<UpsertOutcome, Error> {
        if !is_valid_reading(car_id, license_number, score) {
            return Ok(UpsertOutcome::Rejected);
        }

        let now = Utc::now();
        let mut records = self.records.lock();

        match records.entry(car_id) {
            Entry::Vacant(slot) => {
                slot.insert(PlateRecord {
                    car_id,
                    license_number: license_number.to_string(),
                    score,
                    timestamp: now,
                    video_source: video_source.to_string(),
                });

                Ok(UpsertOutcome::Inserted)
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if score > record.score {
                    record.license_number = license_number.to_string();
                    record.score = score;
                    record.timestamp = now;

                    Ok(UpsertOutcome::Updated)
                } else {
                    Ok(UpsertOutcome::Kept)
                }
            }
        }
    }

    fn list(&self) -> Result<Vec<PlateRecord>, Error> {
        let mut records: Vec<_> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.car_id.cmp(&a.car_id))
        });

        Ok(records)
    }
}
