//! Trend metrics over activity summaries
//!
//! Works off the cached summary fields only (no raw streams): global
//! statistics, chronological per-activity metric series with a linear trend,
//! heart-rate/speed correlation with an elevation cutoff, and monthly
//! distance totals.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::database::Database;
use crate::error::{CalculationError, Result};
use crate::models::Activity;
use crate::regression::fit_polynomial;

/// Whole-history statistics of the cache
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStats {
    pub activity_count: i64,
    pub total_time_hours: i64,
    pub total_distance_km: i64,
    pub first_activity_date: Option<NaiveDate>,
    pub last_activity_date: Option<NaiveDate>,
}

impl GlobalStats {
    pub fn collect(db: &Database) -> Result<Self> {
        Ok(Self {
            activity_count: db.activity_count()?,
            total_time_hours: db.total_moving_time_hours()?,
            total_distance_km: db.total_distance_km()?,
            first_activity_date: db.first_activity_date()?,
            last_activity_date: db.last_activity_date()?,
        })
    }
}

/// Per-activity summary metric tracked over time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendMetric {
    /// Average heart rate, bpm
    HeartRate,
    /// Average speed, km/h
    Speed,
    /// Average pace, min/km
    Pace,
    /// Cardiovascular cost per distance: avg HR × avg pace, beats/km
    Efficiency,
    /// Total elevation gain, m
    ElevationGain,
}

impl TrendMetric {
    pub fn label(&self) -> &'static str {
        match self {
            TrendMetric::HeartRate => "average heart rate (bpm)",
            TrendMetric::Speed => "average speed (km/h)",
            TrendMetric::Pace => "average pace (min/km)",
            TrendMetric::Efficiency => "efficiency (beats/km)",
            TrendMetric::ElevationGain => "elevation gain (m)",
        }
    }

    fn value_for(&self, activity: &Activity) -> Option<f64> {
        match self {
            TrendMetric::HeartRate => activity.average_heartrate,
            TrendMetric::Speed => activity.average_speed_kmh(),
            TrendMetric::Pace => activity.average_pace_min_per_km(),
            TrendMetric::Efficiency => Some(
                activity.average_heartrate? * activity.average_pace_min_per_km()?,
            ),
            TrendMetric::ElevationGain => activity.total_elevation_gain,
        }
    }
}

/// Chronological metric values with their activity dates
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub metric: TrendMetric,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl TrendSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Slope and intercept of a metric regressed against activity index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    /// Change in the metric per activity
    pub slope: f64,
    pub intercept: f64,
}

/// Build the chronological series of one metric.
///
/// Only activities carrying elevation gain, heart rate and speed summaries
/// participate, so every metric is computed over the same activity set and
/// series of different metrics stay comparable.
pub fn trend_series(db: &Database, metric: TrendMetric) -> Result<TrendSeries> {
    let mut dates = Vec::new();
    let mut values = Vec::new();
    for activity in db.list_activities()? {
        if activity.total_elevation_gain.is_none()
            || activity.average_heartrate.is_none()
            || activity.average_speed.is_none()
        {
            continue;
        }
        if let Some(value) = metric.value_for(&activity) {
            dates.push(activity.start_date.date());
            values.push(value);
        }
    }
    Ok(TrendSeries {
        metric,
        dates,
        values,
    })
}

/// Degree-1 fit of the series values against their index
pub fn linear_trend(series: &TrendSeries) -> Result<LinearTrend> {
    let index: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
    let line = fit_polynomial(&index, &series.values, 1)?;
    let coefficients = line.coefficients();
    Ok(LinearTrend {
        slope: coefficients[1],
        intercept: coefficients[0],
    })
}

/// Pearson correlation coefficient
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(CalculationError::LengthMismatch {
            calculation: "correlation".to_string(),
            left: x.len(),
            right: y.len(),
        }
        .into());
    }
    if x.len() < 2 {
        return Err(CalculationError::InsufficientData {
            calculation: "correlation".to_string(),
            reason: format!("{} samples", x.len()),
        }
        .into());
    }
    let mean_x = x.iter().sum::<f64>() / x.len() as f64;
    let mean_y = y.iter().sum::<f64>() / y.len() as f64;
    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    let mut variance_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        covariance += (xi - mean_x) * (yi - mean_y);
        variance_x += (xi - mean_x) * (xi - mean_x);
        variance_y += (yi - mean_y) * (yi - mean_y);
    }
    let denominator = (variance_x * variance_y).sqrt();
    if denominator == 0.0 {
        return Err(CalculationError::InsufficientData {
            calculation: "correlation".to_string(),
            reason: "zero variance".to_string(),
        }
        .into());
    }
    Ok(covariance / denominator)
}

/// Correlation of average heart rate against average speed, optionally
/// restricted to activities below an elevation-gain limit (flat-ish runs
/// isolate the fitness signal from the terrain signal)
pub fn hr_speed_correlation(db: &Database, elevation_gain_limit: Option<f64>) -> Result<f64> {
    let speed = trend_series(db, TrendMetric::Speed)?;
    let heart_rate = trend_series(db, TrendMetric::HeartRate)?;
    let elevation = trend_series(db, TrendMetric::ElevationGain)?;

    match elevation_gain_limit {
        None => pearson_correlation(&speed.values, &heart_rate.values),
        Some(limit) => {
            let mut x = Vec::new();
            let mut y = Vec::new();
            for i in 0..elevation.len() {
                if elevation.values[i] < limit {
                    x.push(speed.values[i]);
                    y.push(heart_rate.values[i]);
                }
            }
            pearson_correlation(&x, &y)
        }
    }
}

/// Total distance per calendar month, as ("MM-YYYY", km) pairs in
/// chronological order
pub fn monthly_distance(activities: &[Activity]) -> Vec<(String, f64)> {
    let mut buckets: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for activity in activities {
        let date = activity.start_date.date();
        let km = activity.distance.unwrap_or(0.0) / 1000.0;
        *buckets.entry((date.year(), date.month())).or_insert(0.0) += km;
    }
    buckets
        .into_iter()
        .map(|((year, month), km)| (format!("{month:02}-{year}"), km))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SportType;
    use chrono::NaiveDate;

    fn activity(id: i64, date: &str, hr: f64, speed_ms: f64, elevation: f64) -> Activity {
        let mut a = Activity::new(
            id,
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            SportType::Run,
        );
        a.average_heartrate = Some(hr);
        a.average_speed = Some(speed_ms);
        a.total_elevation_gain = Some(elevation);
        a
    }

    fn seeded_db(activities: &[Activity]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for a in activities {
            db.upsert_activity(a).unwrap();
        }
        db
    }

    #[test]
    fn test_trend_series_filters_incomplete_summaries() {
        let complete = activity(1, "2025-01-05", 150.0, 3.0, 40.0);
        let mut incomplete = activity(2, "2025-01-12", 150.0, 3.0, 40.0);
        incomplete.average_heartrate = None;
        let db = seeded_db(&[complete, incomplete]);

        let series = trend_series(&db, TrendMetric::Speed).unwrap();
        assert_eq!(series.len(), 1);
        assert!((series.values[0] - 10.8).abs() < 1e-9);
    }

    #[test]
    fn test_trend_series_is_chronological() {
        // inserted out of order; the series must come back by date
        let db = seeded_db(&[
            activity(2, "2025-03-01", 155.0, 3.0, 40.0),
            activity(1, "2025-01-01", 150.0, 3.0, 40.0),
        ]);
        let series = trend_series(&db, TrendMetric::HeartRate).unwrap();
        assert_eq!(series.values, vec![150.0, 155.0]);
    }

    #[test]
    fn test_linear_trend_recovers_slope() {
        let activities: Vec<Activity> = (0..10)
            .map(|i| {
                activity(
                    i + 1,
                    &format!("2025-01-{:02}", i + 1),
                    150.0 - i as f64, // one bpm lower each run
                    3.0,
                    40.0,
                )
            })
            .collect();
        let db = seeded_db(&activities);

        let series = trend_series(&db, TrendMetric::HeartRate).unwrap();
        let trend = linear_trend(&series).unwrap();
        assert!((trend.slope + 1.0).abs() < 1e-9);
        assert!((trend.intercept - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_metric() {
        // 10.8 km/h is 5.555 min/km; 150 bpm costs 833.3 beats/km
        let db = seeded_db(&[activity(1, "2025-01-05", 150.0, 3.0, 40.0)]);
        let series = trend_series(&db, TrendMetric::Efficiency).unwrap();
        assert!((series.values[0] - 150.0 * (1000.0 / 3.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_with_elevation_cutoff() {
        // below the cutoff HR tracks speed perfectly; the two hilly runs
        // break the pattern and are excluded by the filter
        let db = seeded_db(&[
            activity(1, "2025-01-01", 140.0, 2.8, 10.0),
            activity(2, "2025-01-08", 150.0, 3.0, 20.0),
            activity(3, "2025-01-15", 160.0, 3.2, 15.0),
            activity(4, "2025-01-22", 180.0, 2.5, 600.0),
            activity(5, "2025-01-29", 175.0, 2.4, 700.0),
        ]);
        let filtered = hr_speed_correlation(&db, Some(100.0)).unwrap();
        assert!((filtered - 1.0).abs() < 1e-9);
        let unfiltered = hr_speed_correlation(&db, None).unwrap();
        assert!(unfiltered < filtered);
    }

    #[test]
    fn test_correlation_zero_variance_is_an_error() {
        assert!(pearson_correlation(&[1.0, 1.0], &[2.0, 3.0]).is_err());
    }

    #[test]
    fn test_monthly_distance_buckets() {
        let mut january_a = activity(1, "2025-01-05", 150.0, 3.0, 40.0);
        january_a.distance = Some(10_000.0);
        let mut january_b = activity(2, "2025-01-20", 150.0, 3.0, 40.0);
        january_b.distance = Some(12_000.0);
        let mut december = activity(3, "2024-12-28", 150.0, 3.0, 40.0);
        december.distance = Some(8_000.0);

        let totals = monthly_distance(&[january_a, january_b, december]);
        assert_eq!(
            totals,
            vec![
                ("12-2024".to_string(), 8.0),
                ("01-2025".to_string(), 22.0),
            ]
        );
    }
}
