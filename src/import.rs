//! JSON export importer
//!
//! Loads an activity export file (an array of activity records with summary
//! fields and a `streams` map) into the cache. Only running sports are kept;
//! a malformed record is counted and skipped, never fatal to the batch.
//! Network sync against the fitness API lives outside this crate; this is
//! the offline half of ingestion.

use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::error::{Result, RunTrendError};
use crate::models::{Activity, Sample, SportType, StreamType};

/// One activity record in the export file
#[derive(Debug, Deserialize)]
struct ActivityRecord {
    id: i64,
    start_date: String,
    sport_type: String,
    #[serde(default)]
    distance: Option<f64>,
    #[serde(default)]
    moving_time: Option<f64>,
    #[serde(default)]
    total_elevation_gain: Option<f64>,
    #[serde(default)]
    average_speed: Option<f64>,
    #[serde(default)]
    max_speed: Option<f64>,
    #[serde(default)]
    average_cadence: Option<f64>,
    #[serde(default)]
    average_watts: Option<f64>,
    #[serde(default)]
    kilojoules: Option<f64>,
    #[serde(default)]
    has_heartrate: Option<bool>,
    #[serde(default)]
    average_heartrate: Option<f64>,
    #[serde(default)]
    max_heartrate: Option<f64>,
    #[serde(default)]
    elev_high: Option<f64>,
    #[serde(default)]
    elev_low: Option<f64>,
    #[serde(default)]
    streams: HashMap<String, Vec<Sample>>,
}

/// Outcome counts of one import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    /// Activities inserted or backfilled
    pub imported: usize,
    /// Records skipped because the sport is not a running sport
    pub skipped_sport: usize,
    /// Records skipped as malformed
    pub failed: usize,
}

/// Import an activity export file into the cache
pub fn import_json<P: AsRef<Path>>(db: &Database, path: P) -> Result<ImportSummary> {
    let text = std::fs::read_to_string(&path)?;
    let records: Vec<ActivityRecord> = serde_json::from_str(&text)
        .map_err(|e| RunTrendError::Import(format!("invalid export file: {e}")))?;
    info!(
        path = %path.as_ref().display(),
        records = records.len(),
        "importing activity export"
    );

    let progress = ProgressBar::new(records.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut summary = ImportSummary::default();
    for record in records {
        progress.inc(1);

        let sport_type = SportType::from(record.sport_type.as_str());
        if !sport_type.is_running() {
            debug!(id = record.id, sport = %sport_type, "skipping non-running activity");
            summary.skipped_sport += 1;
            continue;
        }
        let Some(start_date) = parse_start_date(&record.start_date) else {
            warn!(id = record.id, start_date = %record.start_date, "unparseable start date");
            summary.failed += 1;
            continue;
        };

        let activity = Activity {
            id: record.id,
            start_date,
            sport_type,
            distance: record.distance,
            moving_time: record.moving_time,
            total_elevation_gain: record.total_elevation_gain,
            average_speed: record.average_speed,
            max_speed: record.max_speed,
            average_cadence: record.average_cadence,
            average_watts: record.average_watts,
            kilojoules: record.kilojoules,
            has_heartrate: record.has_heartrate,
            average_heartrate: record.average_heartrate,
            max_heartrate: record.max_heartrate,
            elev_high: record.elev_high,
            elev_low: record.elev_low,
        };
        db.upsert_activity(&activity)?;

        for (tag, samples) in &record.streams {
            match StreamType::from_str(tag) {
                Ok(stream_type) => db.insert_stream(record.id, stream_type, samples)?,
                Err(_) => debug!(id = record.id, tag, "ignoring unknown stream type"),
            }
        }
        summary.imported += 1;
    }
    progress.finish_and_clear();

    info!(
        imported = summary.imported,
        skipped_sport = summary.skipped_sport,
        failed = summary.failed,
        "import finished"
    );
    Ok(summary)
}

/// Start dates arrive either with a space or a `T` separator, with or
/// without a trailing UTC marker
fn parse_start_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
