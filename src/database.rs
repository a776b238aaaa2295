//! SQLite activity cache
//!
//! Owns the `activity` and `streams` tables populated by the sync/import
//! layer and exposes the read queries the analysis pipeline is built on.
//! Stream sample vectors are stored as JSON arrays in a TEXT column, one row
//! per (activity id, stream type).

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

use crate::error::{DatabaseError, Result, RunTrendError, StreamError};
use crate::models::{Activity, AlignedStreams, Sample, SportType, StreamType};

/// Handle to the activity cache; one per pipeline run, read-only during
/// analysis, released on drop
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create or open a cache database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(&db_path).map_err(|_| {
            RunTrendError::Database(DatabaseError::ConnectionFailed {
                path: db_path.as_ref().to_path_buf(),
            })
        })?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory cache, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Sqlite)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;

                CREATE TABLE IF NOT EXISTS activity (
                    id INTEGER PRIMARY KEY,
                    start_date TEXT NOT NULL,
                    sport_type TEXT NOT NULL,
                    distance REAL,
                    moving_time REAL,
                    total_elevation_gain REAL,
                    average_speed REAL,
                    max_speed REAL,
                    average_cadence REAL,
                    average_watts REAL,
                    kilojoules REAL,
                    has_heartrate INTEGER,
                    average_heartrate REAL,
                    max_heartrate REAL,
                    elev_high REAL,
                    elev_low REAL
                );

                CREATE TABLE IF NOT EXISTS streams (
                    id INTEGER,
                    stream_type TEXT,
                    stream_value TEXT,
                    PRIMARY KEY (id, stream_type),
                    CONSTRAINT fk_activity FOREIGN KEY (id) REFERENCES activity(id)
                );

                CREATE INDEX IF NOT EXISTS idx_activity_start_date
                    ON activity (start_date);
                "#,
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    // ----- write path (sync/import layer) -----

    /// Insert an activity, or backfill missing summary fields of an existing
    /// one. Existing non-null values are never overwritten; the id, start
    /// date and sport type of a cached record are immutable.
    pub fn upsert_activity(&self, activity: &Activity) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO activity (
                    id, start_date, sport_type, distance, moving_time,
                    total_elevation_gain, average_speed, max_speed,
                    average_cadence, average_watts, kilojoules, has_heartrate,
                    average_heartrate, max_heartrate, elev_high, elev_low
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(id) DO UPDATE SET
                    distance = COALESCE(activity.distance, excluded.distance),
                    moving_time = COALESCE(activity.moving_time, excluded.moving_time),
                    total_elevation_gain = COALESCE(activity.total_elevation_gain, excluded.total_elevation_gain),
                    average_speed = COALESCE(activity.average_speed, excluded.average_speed),
                    max_speed = COALESCE(activity.max_speed, excluded.max_speed),
                    average_cadence = COALESCE(activity.average_cadence, excluded.average_cadence),
                    average_watts = COALESCE(activity.average_watts, excluded.average_watts),
                    kilojoules = COALESCE(activity.kilojoules, excluded.kilojoules),
                    has_heartrate = COALESCE(activity.has_heartrate, excluded.has_heartrate),
                    average_heartrate = COALESCE(activity.average_heartrate, excluded.average_heartrate),
                    max_heartrate = COALESCE(activity.max_heartrate, excluded.max_heartrate),
                    elev_high = COALESCE(activity.elev_high, excluded.elev_high),
                    elev_low = COALESCE(activity.elev_low, excluded.elev_low)
                "#,
                params![
                    activity.id,
                    activity.start_date,
                    activity.sport_type.as_str(),
                    activity.distance,
                    activity.moving_time,
                    activity.total_elevation_gain,
                    activity.average_speed,
                    activity.max_speed,
                    activity.average_cadence,
                    activity.average_watts,
                    activity.kilojoules,
                    activity.has_heartrate,
                    activity.average_heartrate,
                    activity.max_heartrate,
                    activity.elev_high,
                    activity.elev_low,
                ],
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    /// Store one stream for an activity; a stream already cached for this
    /// (id, type) key is left untouched
    pub fn insert_stream(
        &self,
        activity_id: i64,
        stream_type: StreamType,
        samples: &[Sample],
    ) -> Result<()> {
        let payload = serde_json::to_string(samples)
            .map_err(|e| RunTrendError::Internal(e.to_string()))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO streams (id, stream_type, stream_value) VALUES (?1, ?2, ?3)",
                params![activity_id, stream_type.as_str(), payload],
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    // ----- stream store adapter -----

    /// Raw sample sequence for (activity id, stream type); an absent stream
    /// yields an empty sequence, not an error
    pub fn get_stream(&self, activity_id: i64, stream_type: StreamType) -> Result<Vec<Sample>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT stream_value FROM streams WHERE id = ?1 AND stream_type = ?2",
                params![activity_id, stream_type.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Sqlite)?;

        match payload {
            None => Ok(Vec::new()),
            Some(text) => serde_json::from_str(&text).map_err(|_| {
                RunTrendError::Stream(StreamError::Undecodable {
                    activity_id,
                    stream_type: stream_type.to_string(),
                })
            }),
        }
    }

    /// Fetch a set of streams for one activity as a single aligned structure.
    ///
    /// Returns `Ok(None)` when any requested stream is absent or empty;
    /// streams present but of differing lengths violate the alignment
    /// invariant and are reported as [`StreamError::Misaligned`].
    pub fn get_stream_set(
        &self,
        activity_id: i64,
        stream_types: &[StreamType],
    ) -> Result<Option<AlignedStreams>> {
        let mut columns = std::collections::HashMap::new();
        for &stream_type in stream_types {
            let samples = self.get_stream(activity_id, stream_type)?;
            if samples.is_empty() {
                debug!(activity_id, %stream_type, "stream absent or empty, set unavailable");
                return Ok(None);
            }
            columns.insert(stream_type, samples);
        }
        AlignedStreams::new(activity_id, columns)
            .map(Some)
            .map_err(|lengths| {
                RunTrendError::Stream(StreamError::Misaligned {
                    activity_id,
                    lengths,
                })
            })
    }

    /// Ids of activities for which every required stream type exists, is
    /// non-null and non-empty, ordered by id for deterministic pooling
    pub fn activity_ids_with_streams(&self, required: &[StreamType]) -> Result<Vec<i64>> {
        let placeholders = vec!["?"; required.len()].join(",");
        let sql = format!(
            "SELECT id FROM streams \
             WHERE stream_type IN ({placeholders}) \
               AND stream_value IS NOT NULL AND stream_value != '[]' \
             GROUP BY id \
             HAVING COUNT(DISTINCT stream_type) = {} \
             ORDER BY id",
            required.len()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(DatabaseError::Sqlite)?;
        let ids = stmt
            .query_map(
                rusqlite::params_from_iter(required.iter().map(|t| t.as_str())),
                |row| row.get(0),
            )
            .map_err(DatabaseError::Sqlite)?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(DatabaseError::Sqlite)?;
        Ok(ids)
    }

    // ----- activity metadata -----

    pub fn get_activity(&self, activity_id: i64) -> Result<Option<Activity>> {
        self.conn
            .query_row(
                "SELECT * FROM activity WHERE id = ?1",
                params![activity_id],
                activity_from_row,
            )
            .optional()
            .map_err(DatabaseError::Sqlite)
            .map_err(Into::into)
    }

    /// All cached activities in chronological order
    pub fn list_activities(&self) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM activity ORDER BY start_date ASC")
            .map_err(DatabaseError::Sqlite)?;
        let activities = stmt
            .query_map([], activity_from_row)
            .map_err(DatabaseError::Sqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(DatabaseError::Sqlite)?;
        Ok(activities)
    }

    /// Start date for labeling and reporting; never used for ordering inside
    /// the windowing/regression math
    pub fn get_start_date(&self, activity_id: i64) -> Result<Option<NaiveDate>> {
        let date: Option<NaiveDateTime> = self
            .conn
            .query_row(
                "SELECT start_date FROM activity WHERE id = ?1",
                params![activity_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Sqlite)?;
        Ok(date.map(|d| d.date()))
    }

    // ----- global statistics -----

    /// Total number of cached activities
    pub fn activity_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM activity", [], |row| row.get(0))
            .map_err(DatabaseError::Sqlite)
            .map_err(Into::into)
    }

    /// Total moving time in whole hours
    pub fn total_moving_time_hours(&self) -> Result<i64> {
        let seconds: Option<f64> = self
            .conn
            .query_row("SELECT SUM(moving_time) FROM activity", [], |row| {
                row.get(0)
            })
            .map_err(DatabaseError::Sqlite)?;
        Ok((seconds.unwrap_or(0.0) / 3600.0) as i64)
    }

    /// Total distance in whole kilometers
    pub fn total_distance_km(&self) -> Result<i64> {
        let meters: Option<f64> = self
            .conn
            .query_row("SELECT SUM(distance) FROM activity", [], |row| row.get(0))
            .map_err(DatabaseError::Sqlite)?;
        Ok((meters.unwrap_or(0.0) / 1000.0) as i64)
    }

    pub fn first_activity_date(&self) -> Result<Option<NaiveDate>> {
        self.activity_date_at_extreme("ASC")
    }

    pub fn last_activity_date(&self) -> Result<Option<NaiveDate>> {
        self.activity_date_at_extreme("DESC")
    }

    fn activity_date_at_extreme(&self, order: &str) -> Result<Option<NaiveDate>> {
        let date: Option<NaiveDateTime> = self
            .conn
            .query_row(
                &format!("SELECT start_date FROM activity ORDER BY start_date {order} LIMIT 1"),
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Sqlite)?;
        Ok(date.map(|d| d.date()))
    }
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let sport: String = row.get("sport_type")?;
    Ok(Activity {
        id: row.get("id")?,
        start_date: row.get("start_date")?,
        sport_type: SportType::from(sport.as_str()),
        distance: row.get("distance")?,
        moving_time: row.get("moving_time")?,
        total_elevation_gain: row.get("total_elevation_gain")?,
        average_speed: row.get("average_speed")?,
        max_speed: row.get("max_speed")?,
        average_cadence: row.get("average_cadence")?,
        average_watts: row.get("average_watts")?,
        kilojoules: row.get("kilojoules")?,
        has_heartrate: row.get("has_heartrate")?,
        average_heartrate: row.get("average_heartrate")?,
        max_heartrate: row.get("max_heartrate")?,
        elev_high: row.get("elev_high")?,
        elev_low: row.get("elev_low")?,
    })
}
