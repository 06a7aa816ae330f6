use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{is_valid_reading, PlateRecord, PlateStore, UpsertOutcome};
use crate::error::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS plates (
    car_id          INTEGER PRIMARY KEY,
    license_number  TEXT NOT NULL,
    score           REAL NOT NULL,
    timestamp       TEXT NOT NULL,
    video_source    TEXT NOT NULL
)";

/// SQLite-backed plate table, one row per `car_id`.
///
/// The score comparison and the write run in one IMMEDIATE transaction, so other
/// processes sharing the database file cannot interleave with it either.
pub struct SqlitePlateStore {
    conn: Mutex<Connection>,
}

impl SqlitePlateStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute(SCHEMA, [])?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    // fixed width so that text order equals time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {s:?}: {e}")))
}

impl PlateStore for SqlitePlateStore {
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

        let now = format_ts(&Utc::now());
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<f64> = tx
            .query_row(
                "SELECT score FROM plates WHERE car_id = ?1",
                params![car_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match current {
            None => {
                tx.execute(
                    "INSERT INTO plates (car_id, license_number, score, timestamp, video_source)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![car_id, license_number, score as f64, now, video_source],
                )?;
                UpsertOutcome::Inserted
            }
            Some(stored) if score as f64 > stored => {
                tx.execute(
                    "UPDATE plates SET license_number = ?1, score = ?2, timestamp = ?3
                     WHERE car_id = ?4",
                    params![license_number, score as f64, now, car_id],
                )?;
                UpsertOutcome::Updated
            }
            Some(_) => UpsertOutcome::Kept,
        };

        tx.commit()?;

        Ok(outcome)
    }

    fn list(&self) -> Result<Vec<PlateRecord>, Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT car_id, license_number, score, timestamp, video_source
             FROM plates ORDER BY timestamp DESC, car_id DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (car_id, license_number, score, timestamp, video_source) = row?;
            records.push(PlateRecord {
                car_id,
                license_number,
                score: score as f32,
                timestamp: parse_ts(&timestamp)?,
                video_source,
            });
        }

        Ok(records)
    }
}
